//! MusicPlayer2000 (M4A) opcode table.
//!
//! Bytes below 0x80 are arguments; when one appears where an opcode is
//! expected the previous note or parameter command repeats with it
//! (running status). Pointers are absolute GBA addresses.

use rp_ir::{Command, EngineFormat};

use super::{centered, ByteReader, Decoded, EventStreamReader, ReaderContext, StreamView};
use crate::error::DecodeError;

/// Ticks for wait opcodes 0x80..=0xB0.
const WAIT_TICKS: [u8; 49] = [
    0, 1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12, 13, 14, 15, 16, 17, 18, 19, 20, 21, 22, 23, 24, 28,
    30, 32, 36, 40, 42, 44, 48, 52, 54, 56, 60, 64, 66, 68, 72, 76, 78, 80, 84, 88, 90, 92, 96,
];

/// Ticks for timed-note opcodes 0xD0..=0xFF.
const NOTE_TICKS: [u8; 48] = [
    1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12, 13, 14, 15, 16, 17, 18, 19, 20, 21, 22, 23, 24, 28, 30,
    32, 36, 40, 42, 44, 48, 52, 54, 56, 60, 64, 66, 68, 72, 76, 78, 80, 84, 88, 90, 92, 96,
];

const FINE: u8 = 0xB1;
const GOTO: u8 = 0xB2;
const PATT: u8 = 0xB3;
const PEND: u8 = 0xB4;
const REPT: u8 = 0xB5;
const MEMACC: u8 = 0xB9;
const PRIO: u8 = 0xBA;
const TEMPO: u8 = 0xBB;
const KEYSH: u8 = 0xBC;
const VOICE: u8 = 0xBD;
const VOL: u8 = 0xBE;
const PAN: u8 = 0xBF;
const BEND: u8 = 0xC0;
const BENDR: u8 = 0xC1;
const XCMD: u8 = 0xCD;
const EOT: u8 = 0xCE;
const TIE: u8 = 0xCF;
const NOTE_FIRST: u8 = 0xD0;

/// Decoder for MusicPlayer2000 tracks.
#[derive(Clone, Copy, Debug, Default)]
pub struct M4aReader;

impl EventStreamReader for M4aReader {
    fn format(&self) -> EngineFormat {
        EngineFormat::M4a
    }

    fn decode(
        &self,
        stream: StreamView<'_>,
        cursor: usize,
        ctx: &mut ReaderContext,
    ) -> Result<Decoded, DecodeError> {
        let mut r = ByteReader::new(stream.data, cursor);
        let first = r.read_u8()?;

        let op = if first < 0x80 {
            // Running status: re-read the byte as the argument.
            if !repeats(ctx.last_command) {
                return Err(DecodeError::UnknownOpcode { opcode: first, offset: cursor });
            }
            r = ByteReader::new(stream.data, cursor);
            ctx.last_command
        } else {
            if repeats(first) {
                ctx.last_command = first;
            }
            first
        };

        let command = match op {
            0x80..=0xB0 => Command::Wait(WAIT_TICKS[(op - 0x80) as usize] as u32),
            FINE => Command::EndOfTrack,
            GOTO => Command::Jump(stream.resolve(r.read_u32_le()?, cursor)?),
            PATT => Command::Loop {
                target: stream.resolve(r.read_u32_le()?, cursor)?,
                count: Some(1),
            },
            PEND => Command::Return,
            REPT => {
                let count = r.read_u8()?;
                let target = stream.resolve(r.read_u32_le()?, cursor)?;
                match count {
                    0 => Command::Jump(target),
                    count => Command::Repeat { target, count },
                }
            }
            MEMACC => {
                r.read_bytes::<3>()?;
                Command::Nop
            }
            PRIO => {
                r.read_u8()?;
                Command::Nop
            }
            TEMPO => Command::Tempo(r.read_u8()? as u16 * 2),
            KEYSH => Command::Transpose(r.read_i8()?),
            VOICE => Command::SetInstrument(r.read_u8()?),
            VOL => Command::SetVolume(r.read_u8()?.min(127)),
            PAN => Command::SetPan(centered(r.read_u8()?)),
            BEND => Command::PitchBend((r.read_u8()?.min(127) as i16 - 64) * 128),
            BENDR => Command::BendRange(r.read_u8()?),
            // LFO speed/delay, modulation, tune: parsed, not rendered.
            0xC2..=0xC5 | 0xC8 => {
                r.read_u8()?;
                Command::Nop
            }
            XCMD => {
                r.read_bytes::<2>()?;
                Command::Nop
            }
            EOT => {
                let key = r.read_optional_arg();
                if let Some(key) = key {
                    ctx.last_key = key;
                }
                Command::NoteOff { key }
            }
            TIE => {
                read_note_args(&mut r, ctx, false);
                Command::NoteOn { key: ctx.last_key, velocity: ctx.last_velocity, duration: None }
            }
            NOTE_FIRST..=0xFF => {
                let gate = read_note_args(&mut r, ctx, true);
                let ticks = NOTE_TICKS[(op - NOTE_FIRST) as usize] as u32 + gate as u32;
                Command::NoteOn {
                    key: ctx.last_key,
                    velocity: ctx.last_velocity,
                    duration: Some(ticks),
                }
            }
            other => return Err(DecodeError::UnknownOpcode { opcode: other, offset: cursor }),
        };
        r.done(command)
    }
}

/// Opcodes that running status can repeat.
fn repeats(op: u8) -> bool {
    op >= KEYSH
}

/// Optional key, velocity and (timed notes only) gate. Returns the gate.
fn read_note_args(r: &mut ByteReader<'_>, ctx: &mut ReaderContext, timed: bool) -> u8 {
    let Some(key) = r.read_optional_arg() else {
        return 0;
    };
    ctx.last_key = key;
    let Some(velocity) = r.read_optional_arg() else {
        return 0;
    };
    ctx.last_velocity = velocity;
    if timed {
        r.read_optional_arg().unwrap_or(0)
    } else {
        0
    }
}

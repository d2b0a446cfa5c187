//! Procyon DSE (SMD) opcode table.
//!
//! Note opcodes are the velocity; the following byte packs the duration
//! width, an octave change and the pitch class. The current octave and the
//! last note/pause lengths are running state.

use rp_ir::{Command, EngineFormat};

use super::{centered, ByteReader, Decoded, EventStreamReader, ReaderContext, StreamView};
use crate::error::DecodeError;

/// Ticks for fixed pauses 0x80..=0x8F.
const PAUSE_TICKS: [u8; 16] = [96, 72, 64, 48, 36, 32, 24, 18, 16, 12, 9, 8, 6, 4, 3, 2];

const REPEAT_PAUSE: u8 = 0x90;
const ADD_PAUSE: u8 = 0x91;
const PAUSE8: u8 = 0x92;
const PAUSE16: u8 = 0x93;
const PAUSE24: u8 = 0x94;
const PAUSE_UNTIL_RELEASE: u8 = 0x95;
const END: u8 = 0x98;
const LOOP_POINT: u8 = 0x99;
const SET_OCTAVE: u8 = 0xA0;
const ADD_OCTAVE: u8 = 0xA1;
const TEMPO: u8 = 0xA4;
const TEMPO2: u8 = 0xA5;
const PROGRAM: u8 = 0xAC;
const BEND: u8 = 0xD7;
const VOLUME: u8 = 0xE0;
const EXPRESSION: u8 = 0xE3;
const PAN: u8 = 0xE8;

/// Decoder for DSE tracks.
#[derive(Clone, Copy, Debug, Default)]
pub struct DseReader;

impl EventStreamReader for DseReader {
    fn format(&self) -> EngineFormat {
        EngineFormat::Dse
    }

    fn decode(
        &self,
        stream: StreamView<'_>,
        cursor: usize,
        ctx: &mut ReaderContext,
    ) -> Result<Decoded, DecodeError> {
        let mut r = ByteReader::new(stream.data, cursor);
        let op = r.read_u8()?;
        let command = match op {
            0x00..=0x7F => {
                let packed = r.read_u8()?;
                let width = (packed >> 6) as usize;
                let octave_shift = ((packed >> 4) & 3) as i16 - 2;
                let pitch_class = (packed & 0x0F) as i16;
                let octave = (ctx.octave as i16 + octave_shift).clamp(0, 10);
                ctx.octave = octave as u8;
                if width > 0 {
                    ctx.last_duration = r.read_be(width)?;
                }
                let key = (octave * 12 + pitch_class).clamp(0, 127) as u8;
                ctx.last_key = key;
                ctx.last_velocity = op;
                Command::NoteOn { key, velocity: op, duration: Some(ctx.last_duration) }
            }
            0x80..=0x8F => pause(ctx, PAUSE_TICKS[(op - 0x80) as usize] as u32),
            REPEAT_PAUSE => Command::Wait(ctx.last_wait),
            ADD_PAUSE => {
                let ticks = ctx.last_wait + r.read_u8()? as u32;
                pause(ctx, ticks)
            }
            PAUSE8 | PAUSE_UNTIL_RELEASE => pause(ctx, r.read_u8()? as u32),
            PAUSE16 => pause(ctx, r.read_u16_le()? as u32),
            PAUSE24 => pause(ctx, r.read_u24_le()?),
            END => Command::EndOfTrack,
            LOOP_POINT => Command::LoopPoint,
            SET_OCTAVE => {
                ctx.octave = r.read_u8()?.min(10);
                Command::Nop
            }
            ADD_OCTAVE => {
                let shift = r.read_i8()? as i16;
                ctx.octave = (ctx.octave as i16 + shift).clamp(0, 10) as u8;
                Command::Nop
            }
            TEMPO | TEMPO2 => Command::Tempo(r.read_u8()? as u16),
            PROGRAM => Command::SetInstrument(r.read_u8()?),
            BEND => Command::PitchBend(r.read_i16_be()? >> 2),
            VOLUME => Command::SetVolume(r.read_u8()?.min(127)),
            EXPRESSION => Command::SetExpression(r.read_u8()?.min(127)),
            PAN => Command::SetPan(centered(r.read_u8()?)),
            0xA9 | 0xAA | 0xAB | 0xBE | 0xBF | 0xDB | 0xF6 => {
                r.read_u8()?;
                Command::Nop
            }
            other => return Err(DecodeError::UnknownOpcode { opcode: other, offset: cursor }),
        };
        r.done(command)
    }
}

fn pause(ctx: &mut ReaderContext, ticks: u32) -> Command {
    ctx.last_wait = ticks;
    Command::Wait(ticks)
}

//! Mario & Luigi: Superstar Saga driver opcode table.
//!
//! Notes carry their own length; jumps are signed 16-bit displacements from
//! the end of the jump command.

use rp_ir::{Command, EngineFormat};

use super::{centered, ByteReader, Decoded, EventStreamReader, ReaderContext, StreamView};
use crate::error::DecodeError;

const VOICE: u8 = 0xF0;
const VOLUME: u8 = 0xF1;
const PAN: u8 = 0xF2;
const BEND: u8 = 0xF3;
const BEND_RANGE: u8 = 0xF4;
const REST: u8 = 0xF6;
const LONG_REST: u8 = 0xF7;
const JUMP: u8 = 0xF8;
const REPEAT: u8 = 0xF9;
const RETURN: u8 = 0xFA;
const TEMPO: u8 = 0xFB;
const END: u8 = 0xFF;

/// Decoder for MLSS tracks.
#[derive(Clone, Copy, Debug, Default)]
pub struct MlssReader;

impl EventStreamReader for MlssReader {
    fn format(&self) -> EngineFormat {
        EngineFormat::Mlss
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
                let length = r.read_u8()?;
                ctx.last_key = op;
                Command::NoteOn {
                    key: op,
                    velocity: ctx.last_velocity,
                    duration: Some(length as u32),
                }
            }
            VOICE => Command::SetInstrument(r.read_u8()?),
            VOLUME => Command::SetVolume(r.read_u8()?.min(127)),
            PAN => Command::SetPan(centered(r.read_u8()?)),
            BEND => Command::PitchBend((r.read_i8()? as i16) << 6),
            BEND_RANGE => Command::BendRange(r.read_u8()?),
            REST => Command::Wait(r.read_u8()? as u32),
            LONG_REST => Command::Wait(r.read_u16_le()? as u32),
            JUMP => {
                let delta = r.read_i16_le()?;
                let from = cursor + r.consumed();
                Command::Jump(stream.resolve_relative(from, delta as i32, cursor)?)
            }
            REPEAT => {
                let count = r.read_u8()?;
                let delta = r.read_i16_le()?;
                let from = cursor + r.consumed();
                let target = stream.resolve_relative(from, delta as i32, cursor)?;
                match count {
                    0 => Command::Jump(target),
                    count => Command::Repeat { target, count },
                }
            }
            RETURN => Command::Return,
            TEMPO => Command::Tempo(r.read_u8()? as u16),
            END => Command::EndOfTrack,
            other => return Err(DecodeError::UnknownOpcode { opcode: other, offset: cursor }),
        };
        r.done(command)
    }
}

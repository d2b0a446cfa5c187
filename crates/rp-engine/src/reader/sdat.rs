//! NitroComposer SSEQ opcode table.
//!
//! Offsets in jump and call commands are relative to the start of the SSEQ
//! data block, which the loader maps to `StreamView::base_address`.

use rp_ir::{Command, EngineFormat, EnvelopeParam};

use super::{centered, ByteReader, Decoded, EventStreamReader, ReaderContext, StreamView};
use crate::error::DecodeError;

const REST: u8 = 0x80;
const PROGRAM: u8 = 0x81;
const OPEN_TRACK: u8 = 0x93;
const JUMP: u8 = 0x94;
const CALL: u8 = 0x95;
const PAN: u8 = 0xC0;
const VOLUME: u8 = 0xC1;
const MASTER_VOLUME: u8 = 0xC2;
const TRANSPOSE: u8 = 0xC3;
const BEND: u8 = 0xC4;
const BEND_RANGE: u8 = 0xC5;
const ATTACK: u8 = 0xD0;
const DECAY: u8 = 0xD1;
const SUSTAIN: u8 = 0xD2;
const RELEASE: u8 = 0xD3;
const LOOP_START: u8 = 0xD4;
const EXPRESSION: u8 = 0xD5;
const PRINT: u8 = 0xD6;
const MOD_DELAY: u8 = 0xE0;
const TEMPO: u8 = 0xE1;
const SWEEP: u8 = 0xE3;
const LOOP_END: u8 = 0xFC;
const RETURN: u8 = 0xFD;
const TRACK_MASK: u8 = 0xFE;
const END: u8 = 0xFF;

/// Decoder for SSEQ tracks.
#[derive(Clone, Copy, Debug, Default)]
pub struct SdatReader;

impl EventStreamReader for SdatReader {
    fn format(&self) -> EngineFormat {
        EngineFormat::Sdat
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
                let velocity = r.read_u8()?.min(127);
                let duration = r.read_varlen()?;
                ctx.last_key = op;
                ctx.last_velocity = velocity;
                Command::NoteOn { key: op, velocity, duration: Some(duration) }
            }
            REST => Command::Wait(r.read_varlen()?),
            PROGRAM => Command::SetInstrument(u8::try_from(r.read_varlen()?).unwrap_or(u8::MAX)),
            OPEN_TRACK => {
                r.read_u8()?;
                r.read_u24_le()?;
                Command::Nop
            }
            JUMP => Command::Jump(stream.resolve(r.read_u24_le()?, cursor)?),
            CALL => Command::Loop {
                target: stream.resolve(r.read_u24_le()?, cursor)?,
                count: Some(1),
            },
            // Variable arithmetic.
            0xB0..=0xBD => {
                r.read_u8()?;
                r.read_bytes::<2>()?;
                Command::Nop
            }
            PAN => Command::SetPan(centered(r.read_u8()?)),
            VOLUME => Command::SetVolume(r.read_u8()?.min(127)),
            TRANSPOSE => Command::Transpose(r.read_i8()?),
            BEND => Command::PitchBend((r.read_i8()? as i16) << 6),
            BEND_RANGE => Command::BendRange(r.read_u8()?),
            // Priority, mono/poly, tie, portamento, modulation.
            MASTER_VOLUME | 0xC6..=0xCF => {
                r.read_u8()?;
                Command::Nop
            }
            ATTACK => Command::Envelope(EnvelopeParam::Attack, r.read_u8()?),
            DECAY => Command::Envelope(EnvelopeParam::Decay, r.read_u8()?),
            SUSTAIN => Command::Envelope(EnvelopeParam::Sustain, r.read_u8()?),
            RELEASE => Command::Envelope(EnvelopeParam::Release, r.read_u8()?),
            LOOP_START => {
                let count = r.read_u8()?;
                Command::LoopStart((count > 0).then_some(count))
            }
            EXPRESSION => Command::SetExpression(r.read_u8()?.min(127)),
            PRINT => {
                r.read_u8()?;
                Command::Nop
            }
            MOD_DELAY | SWEEP | TRACK_MASK => {
                r.read_bytes::<2>()?;
                Command::Nop
            }
            TEMPO => Command::Tempo(r.read_u16_le()?),
            LOOP_END => Command::LoopEnd,
            RETURN => Command::Return,
            END => Command::EndOfTrack,
            other => return Err(DecodeError::UnknownOpcode { opcode: other, offset: cursor }),
        };
        r.done(command)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decode(data: &[u8]) -> Result<Decoded, DecodeError> {
        let mut ctx = ReaderContext::new();
        SdatReader.decode(StreamView::new(data, 0), 0, &mut ctx)
    }

    #[test]
    fn note_with_varlen_duration() {
        let d = decode(&[64, 100, 0x81, 0x00]).unwrap();
        assert_eq!(d.command, Command::NoteOn { key: 64, velocity: 100, duration: Some(128) });
        assert_eq!(d.length, 4);
    }

    #[test]
    fn rest_and_program() {
        assert_eq!(decode(&[0x80, 48]).unwrap().command, Command::Wait(48));
        assert_eq!(decode(&[0x81, 5]).unwrap().command, Command::SetInstrument(5));
    }

    #[test]
    fn open_track_is_skipped() {
        let d = decode(&[0x93, 1, 0x10, 0x00, 0x00]).unwrap();
        assert_eq!(d, Decoded { command: Command::Nop, length: 5 });
    }

    #[test]
    fn jump_within_block() {
        let data = [0x94, 0x02, 0x00, 0x00, 0xFF];
        assert_eq!(decode(&data).unwrap().command, Command::Jump(2));
    }

    #[test]
    fn call_past_block_is_invalid() {
        let data = [0x95, 0xFF, 0x00, 0x00];
        assert!(matches!(decode(&data), Err(DecodeError::InvalidJump { .. })));
    }

    #[test]
    fn envelope_overrides() {
        assert_eq!(
            decode(&[0xD2, 90]).unwrap().command,
            Command::Envelope(EnvelopeParam::Sustain, 90)
        );
    }

    #[test]
    fn loop_start_zero_is_infinite() {
        assert_eq!(decode(&[0xD4, 0]).unwrap().command, Command::LoopStart(None));
        assert_eq!(decode(&[0xD4, 2]).unwrap().command, Command::LoopStart(Some(2)));
        assert_eq!(decode(&[0xFC]).unwrap().command, Command::LoopEnd);
    }

    #[test]
    fn tempo_is_u16() {
        assert_eq!(decode(&[0xE1, 0x2C, 0x01]).unwrap().command, Command::Tempo(300));
    }

    #[test]
    fn random_prefix_is_unsupported() {
        assert_eq!(
            decode(&[0xA0, 0x80, 0x00]),
            Err(DecodeError::UnknownOpcode { opcode: 0xA0, offset: 0 })
        );
    }
}

//! Engine error types.

use thiserror::Error;

/// A track's event stream could not be interpreted. Fatal to that track only.
#[derive(Clone, Copy, Debug, Error, PartialEq, Eq)]
pub enum DecodeError {
    /// Opcode outside the format's table.
    #[error("unknown opcode {opcode:#04x} at offset {offset:#x}")]
    UnknownOpcode { opcode: u8, offset: usize },

    /// Stream ended in the middle of a command.
    #[error("event stream ended inside a command at offset {offset:#x}")]
    UnexpectedEnd { offset: usize },

    /// Jump or call target outside the stream.
    #[error("jump target {target:#x} at offset {offset:#x} is outside the stream")]
    InvalidJump { target: u32, offset: usize },

    /// Loops or calls nested deeper than the loop stack.
    #[error("loop stack overflow at offset {offset:#x}")]
    LoopStackOverflow { offset: usize },

    /// Too many commands without a wait in one tick.
    #[error("more than {limit} commands in one tick at offset {offset:#x}")]
    CommandLimit { limit: u32, offset: usize },
}

/// A note referenced data the bank does not have. The note stays silent.
#[derive(Clone, Copy, Debug, Error, PartialEq, Eq)]
pub enum ResourceError {
    #[error("no instrument for program {program} key {key}")]
    MissingInstrument { program: u8, key: u8 },

    #[error("program {program} references a missing sample")]
    MissingSample { program: u8 },
}

/// A song the sequencer cannot take. Nothing is torn down when this is
/// returned.
#[derive(Clone, Copy, Debug, Error, PartialEq, Eq)]
pub enum SongError {
    #[error("song has no tracks")]
    NoTracks,

    #[error("song has {count} tracks, at most {max} are supported")]
    TooManyTracks { count: usize, max: usize },
}

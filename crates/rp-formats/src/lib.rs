//! Format loaders for retroplay.
//!
//! Locates songs and instrument banks inside game images and turns them
//! into `rp_ir::Song`s.

mod m4a;

pub use m4a::{M4aRom, SongTableEntry, GBA_ROM_BASE, GBA_ROM_CAPACITY};

use thiserror::Error;

/// Error type for format parsing.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum FormatError {
    /// Read past the end of the image
    #[error("unexpected end of data at {offset:#x}")]
    UnexpectedEof { offset: usize },
    /// Pointer outside the image
    #[error("pointer {pointer:#010x} is outside the image")]
    InvalidPointer { pointer: u32 },
    /// Song index past the end of the table
    #[error("song {index} out of range ({count} songs)")]
    SongIndexOutOfRange { index: usize, count: usize },
    /// No usable entries at the table address
    #[error("no songs found in the song table")]
    EmptySongTable,
    /// Structure parse failure
    #[error("parse error: {0}")]
    Parse(String),
}

impl From<binrw::Error> for FormatError {
    fn from(e: binrw::Error) -> Self {
        FormatError::Parse(e.to_string())
    }
}

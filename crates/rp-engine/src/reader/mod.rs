//! Event-stream readers: one opcode table per sound driver.
//!
//! A reader turns the bytes at a cursor into one `Command` and its encoded
//! length. It never touches playback state; the only state it carries is
//! the driver's running status, kept per track in a `ReaderContext`.

mod dse;
mod m4a;
mod mlss;
mod sdat;

use rp_ir::{Command, EngineFormat};

use crate::error::DecodeError;

pub use dse::DseReader;
pub use m4a::M4aReader;
pub use mlss::MlssReader;
pub use sdat::SdatReader;

/// One decoded command.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Decoded {
    pub command: Command,
    /// Encoded length in bytes.
    pub length: usize,
}

/// Running status remembered between commands of one track.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ReaderContext {
    /// Last opcode eligible for running status (M4A)
    pub last_command: u8,
    pub last_key: u8,
    pub last_velocity: u8,
    /// Duration of the last note (DSE)
    pub last_duration: u32,
    /// Length of the last pause (DSE)
    pub last_wait: u32,
    /// Current octave (DSE)
    pub octave: u8,
}

impl ReaderContext {
    pub const fn new() -> Self {
        Self {
            last_command: 0,
            last_key: 60,
            last_velocity: 127,
            last_duration: 0,
            last_wait: 0,
            octave: 4,
        }
    }
}

impl Default for ReaderContext {
    fn default() -> Self {
        Self::new()
    }
}

/// Bytes of one event stream plus the address the format gives `data[0]`.
#[derive(Clone, Copy, Debug)]
pub struct StreamView<'a> {
    pub data: &'a [u8],
    pub base_address: u32,
}

impl<'a> StreamView<'a> {
    pub fn new(data: &'a [u8], base_address: u32) -> Self {
        Self { data, base_address }
    }

    /// Translate a format address into a stream offset.
    fn resolve(&self, address: u32, at: usize) -> Result<u32, DecodeError> {
        let target = address.wrapping_sub(self.base_address);
        if (target as usize) < self.data.len() {
            Ok(target)
        } else {
            Err(DecodeError::InvalidJump { target: address, offset: at })
        }
    }

    /// Translate a jump relative to `from` into a stream offset.
    fn resolve_relative(&self, from: usize, delta: i32, at: usize) -> Result<u32, DecodeError> {
        let target = from as i64 + delta as i64;
        if target >= 0 && (target as usize) < self.data.len() {
            Ok(target as u32)
        } else {
            Err(DecodeError::InvalidJump { target: target as u32, offset: at })
        }
    }
}

/// Decodes one driver's opcode table.
pub trait EventStreamReader: Sync {
    /// Driver this table belongs to.
    fn format(&self) -> EngineFormat;

    /// Decode the command at `cursor`.
    fn decode(
        &self,
        stream: StreamView<'_>,
        cursor: usize,
        ctx: &mut ReaderContext,
    ) -> Result<Decoded, DecodeError>;
}

static M4A: M4aReader = M4aReader;
static MLSS: MlssReader = MlssReader;
static DSE: DseReader = DseReader;
static SDAT: SdatReader = SdatReader;

/// The opcode table for `format`.
pub fn reader_for(format: EngineFormat) -> &'static dyn EventStreamReader {
    match format {
        EngineFormat::M4a => &M4A,
        EngineFormat::Mlss => &MLSS,
        EngineFormat::Dse => &DSE,
        EngineFormat::Sdat => &SDAT,
    }
}

// ---------------------------------------------------------------------------
// ByteReader: cursor over one command's bytes
// ---------------------------------------------------------------------------

struct ByteReader<'a> {
    data: &'a [u8],
    start: usize,
    pos: usize,
}

impl<'a> ByteReader<'a> {
    fn new(data: &'a [u8], pos: usize) -> Self {
        Self { data, start: pos, pos }
    }

    fn eof(&self) -> DecodeError {
        DecodeError::UnexpectedEnd { offset: self.start }
    }

    fn consumed(&self) -> usize {
        self.pos - self.start
    }

    fn peek_u8(&self) -> Option<u8> {
        self.data.get(self.pos).copied()
    }

    fn read_u8(&mut self) -> Result<u8, DecodeError> {
        let v = self.peek_u8().ok_or_else(|| self.eof())?;
        self.pos += 1;
        Ok(v)
    }

    fn read_i8(&mut self) -> Result<i8, DecodeError> {
        Ok(self.read_u8()? as i8)
    }

    fn read_bytes<const N: usize>(&mut self) -> Result<[u8; N], DecodeError> {
        let bytes = self
            .data
            .get(self.pos..self.pos + N)
            .ok_or_else(|| self.eof())?;
        let mut out = [0u8; N];
        out.copy_from_slice(bytes);
        self.pos += N;
        Ok(out)
    }

    fn read_u16_le(&mut self) -> Result<u16, DecodeError> {
        Ok(u16::from_le_bytes(self.read_bytes::<2>()?))
    }

    fn read_i16_le(&mut self) -> Result<i16, DecodeError> {
        Ok(i16::from_le_bytes(self.read_bytes::<2>()?))
    }

    fn read_i16_be(&mut self) -> Result<i16, DecodeError> {
        Ok(i16::from_be_bytes(self.read_bytes::<2>()?))
    }

    fn read_u24_le(&mut self) -> Result<u32, DecodeError> {
        let [a, b, c] = self.read_bytes::<3>()?;
        Ok(u32::from_le_bytes([a, b, c, 0]))
    }

    fn read_u32_le(&mut self) -> Result<u32, DecodeError> {
        Ok(u32::from_le_bytes(self.read_bytes::<4>()?))
    }

    /// Big-endian integer of `n` (0..=4) bytes.
    fn read_be(&mut self, n: usize) -> Result<u32, DecodeError> {
        let mut v = 0u32;
        for _ in 0..n {
            v = (v << 8) | self.read_u8()? as u32;
        }
        Ok(v)
    }

    /// MIDI-style variable-length quantity (at most 4 bytes).
    fn read_varlen(&mut self) -> Result<u32, DecodeError> {
        let mut v = 0u32;
        for _ in 0..4 {
            let b = self.read_u8()?;
            v = (v << 7) | (b & 0x7F) as u32;
            if b & 0x80 == 0 {
                return Ok(v);
            }
        }
        Ok(v)
    }

    /// Read a byte only if it is an argument (below 0x80).
    fn read_optional_arg(&mut self) -> Option<u8> {
        match self.peek_u8() {
            Some(b) if b < 0x80 => {
                self.pos += 1;
                Some(b)
            }
            _ => None,
        }
    }

    fn done(&self, command: Command) -> Result<Decoded, DecodeError> {
        Ok(Decoded { command, length: self.consumed() })
    }
}

/// Center-0x40 pan byte to -64..=63.
fn centered(v: u8) -> i8 {
    (v.min(127) as i16 - 64) as i8
}

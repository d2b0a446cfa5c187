//! WAV encoding for 16-bit stereo PCM.

use rp_engine::Frame;
use std::io::Write;

const CHANNELS: u16 = 2;
const BITS_PER_SAMPLE: u16 = 16;
const BLOCK_ALIGN: u16 = CHANNELS * BITS_PER_SAMPLE / 8;
/// RIFF size field counts everything after itself except the data bytes.
const HEADER_OVERHEAD: u32 = 36;

/// Write `frames` as a canonical 44-byte-header WAV file.
pub fn write_wav(w: &mut impl Write, frames: &[Frame], sample_rate: u32) -> std::io::Result<()> {
    let data_size = frames.len() as u32 * BLOCK_ALIGN as u32;
    write_header(w, sample_rate, data_size)?;
    for frame in frames {
        w.write_all(&frame.left.to_le_bytes())?;
        w.write_all(&frame.right.to_le_bytes())?;
    }
    Ok(())
}

/// Encode `frames` into an in-memory WAV file.
pub fn frames_to_wav(frames: &[Frame], sample_rate: u32) -> Vec<u8> {
    let mut buf = Vec::with_capacity(44 + frames.len() * BLOCK_ALIGN as usize);
    // Writing into a Vec cannot fail.
    let _ = write_wav(&mut buf, frames, sample_rate);
    buf
}

fn write_header(w: &mut impl Write, sample_rate: u32, data_size: u32) -> std::io::Result<()> {
    let byte_rate = sample_rate * BLOCK_ALIGN as u32;
    w.write_all(b"RIFF")?;
    w.write_all(&(HEADER_OVERHEAD + data_size).to_le_bytes())?;
    w.write_all(b"WAVEfmt ")?;
    w.write_all(&16u32.to_le_bytes())?;
    w.write_all(&1u16.to_le_bytes())?;
    w.write_all(&CHANNELS.to_le_bytes())?;
    w.write_all(&sample_rate.to_le_bytes())?;
    w.write_all(&byte_rate.to_le_bytes())?;
    w.write_all(&BLOCK_ALIGN.to_le_bytes())?;
    w.write_all(&BITS_PER_SAMPLE.to_le_bytes())?;
    w.write_all(b"data")?;
    w.write_all(&data_size.to_le_bytes())
}

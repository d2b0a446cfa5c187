//! PCM sample data.

use alloc::vec::Vec;
use arrayvec::ArrayString;

slotmap::new_key_type! {
    /// Key for referencing samples in an instrument bank.
    pub struct SampleKey;
}

/// A PCM sample as stored by the sound driver.
#[derive(Clone, Debug)]
pub struct Sample {
    /// Sample name (diagnostics only)
    pub name: ArrayString<24>,
    /// Audio data
    pub data: SampleData,
    /// Loop start position (in samples)
    pub loop_start: u32,
    /// Loops from `loop_start` to the end when set
    pub looped: bool,
    /// Playback rate in Hz at the instrument's root key
    pub rate: u32,
}

impl Default for Sample {
    fn default() -> Self {
        Self {
            name: ArrayString::new(),
            data: SampleData::Pcm8(Vec::new()),
            loop_start: 0,
            looped: false,
            rate: 13379,
        }
    }
}

impl Sample {
    /// Create a new empty sample.
    pub fn new(name: &str) -> Self {
        let mut sample = Self::default();
        let _ = sample.name.try_push_str(name);
        sample
    }

    /// Create a one-shot 8-bit sample.
    pub fn pcm8(name: &str, data: Vec<i8>, rate: u32) -> Self {
        let mut sample = Self::new(name);
        sample.data = SampleData::Pcm8(data);
        sample.rate = rate;
        sample
    }

    /// Create a one-shot 16-bit sample.
    pub fn pcm16(name: &str, data: Vec<i16>, rate: u32) -> Self {
        let mut sample = Self::new(name);
        sample.data = SampleData::Pcm16(data);
        sample.rate = rate;
        sample
    }

    /// Builder: loop from `start` to the end.
    pub fn with_loop(mut self, start: u32) -> Self {
        self.looped = true;
        self.loop_start = start;
        self
    }

    /// Get the length of the sample in frames.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Returns true if the sample has no data.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Returns true if the sample has a usable loop.
    pub fn has_loop(&self) -> bool {
        self.looped && (self.loop_start as usize) < self.len()
    }
}

/// Sample audio data.
#[derive(Clone, Debug)]
pub enum SampleData {
    /// Signed 8-bit (GBA DirectSound, NDS PCM8)
    Pcm8(Vec<i8>),
    /// Signed 16-bit (NDS PCM16, decoded ADPCM)
    Pcm16(Vec<i16>),
}

impl SampleData {
    /// Get the number of sample frames.
    pub fn len(&self) -> usize {
        match self {
            SampleData::Pcm8(v) => v.len(),
            SampleData::Pcm16(v) => v.len(),
        }
    }

    /// Returns true if empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Sample value at `pos` widened to 16 bits; 0 past the end.
    pub fn get(&self, pos: usize) -> i16 {
        match self {
            SampleData::Pcm8(v) => v.get(pos).copied().unwrap_or(0) as i16 * 256,
            SampleData::Pcm16(v) => v.get(pos).copied().unwrap_or(0),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::vec;

    #[test]
    fn pcm8_widens_to_16_bit() {
        let data = SampleData::Pcm8(vec![1, -1, 127]);
        assert_eq!(data.get(0), 256);
        assert_eq!(data.get(1), -256);
        assert_eq!(data.get(2), 32512);
    }

    #[test]
    fn reads_past_end_are_silent() {
        let data = SampleData::Pcm16(vec![1000]);
        assert_eq!(data.get(1), 0);
        assert_eq!(data.get(usize::MAX), 0);
    }

    #[test]
    fn loop_past_end_is_not_a_loop() {
        let s = Sample::pcm8("s", vec![0; 4], 8000).with_loop(4);
        assert!(!s.has_loop());
        let s = Sample::pcm8("s", vec![0; 4], 8000).with_loop(2);
        assert!(s.has_loop());
    }
}

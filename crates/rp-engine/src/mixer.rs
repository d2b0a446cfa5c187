//! Mixer: sums the voice pool into output frames and applies master volume.

use rp_ir::InstrumentBank;

use crate::frame::Frame;
use crate::voice_pool::VoicePool;

/// Unity master gain (Q8).
const UNITY: u32 = 256;

/// Final mix stage.
#[derive(Clone, Debug)]
pub struct Mixer {
    /// Master gain, Q8 (0..=256).
    master: u32,
}

impl Mixer {
    pub fn new(master_volume: f32) -> Self {
        let mut mixer = Self { master: UNITY };
        mixer.set_master_volume(master_volume);
        mixer
    }

    /// Set master volume, 0.0..=1.0. Out-of-range values are clamped; NaN mutes.
    pub fn set_master_volume(&mut self, volume: f32) {
        let volume = if volume.is_nan() { 0.0 } else { volume.clamp(0.0, 1.0) };
        self.master = (volume * UNITY as f32) as u32;
    }

    pub fn master_volume(&self) -> f32 {
        self.master as f32 / UNITY as f32
    }

    /// Render and sum one frame of every voice.
    pub fn mix_frame(&self, pool: &mut VoicePool, bank: &InstrumentBank) -> Frame {
        let (left, right) = pool.render_frame(bank);
        let m = self.master as i64;
        Frame::saturating(((left as i64 * m) >> 8) as i32, ((right as i64 * m) >> 8) as i32)
    }
}

impl Default for Mixer {
    fn default() -> Self {
        Self::new(1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rp_ir::{Adsr, EnvelopeModel, Instrument, Sample, VoiceSource};

    use crate::envelope_state::EnvelopeState;
    use crate::voice::Voice;

    const SR: u32 = 48000;

    fn loud_pool(bank: &mut InstrumentBank, voices: usize) -> VoicePool {
        let key = bank.add_sample(Sample::pcm8("s", vec![127; 64], SR));
        let inst = Instrument::new("pcm", VoiceSource::Pcm(key));
        let mut pool = VoicePool::new(16);
        for _ in 0..voices {
            let env = EnvelopeState::new(EnvelopeModel::Linear, Adsr::default());
            let mut v = Voice::new(&inst, SR, 0, 60, 60, 127, env);
            v.retune(0, 2, SR);
            v.set_mix(127, 0);
            pool.allocate(v);
        }
        pool
    }

    #[test]
    fn master_volume_scales_output() {
        let mut bank = InstrumentBank::new();
        let mut full = loud_pool(&mut bank, 1);
        let mut half = loud_pool(&mut bank, 1);
        let a = Mixer::new(1.0).mix_frame(&mut full, &bank);
        let b = Mixer::new(0.5).mix_frame(&mut half, &bank);
        assert_eq!(b.left as i32, a.left as i32 / 2);
    }

    #[test]
    fn zero_volume_is_silent() {
        let mut bank = InstrumentBank::new();
        let mut pool = loud_pool(&mut bank, 2);
        assert!(Mixer::new(0.0).mix_frame(&mut pool, &bank).is_silent());
    }

    #[test]
    fn many_voices_saturate_instead_of_wrapping() {
        let mut bank = InstrumentBank::new();
        let mut pool = loud_pool(&mut bank, 16);
        let f = Mixer::default().mix_frame(&mut pool, &bank);
        assert_eq!(f.left, i16::MAX);
        assert_eq!(f.right, i16::MAX);
    }

    #[test]
    fn volume_is_clamped() {
        let mut m = Mixer::default();
        m.set_master_volume(3.0);
        assert_eq!(m.master_volume(), 1.0);
        m.set_master_volume(-1.0);
        assert_eq!(m.master_volume(), 0.0);
        m.set_master_volume(f32::NAN);
        assert_eq!(m.master_volume(), 0.0);
    }
}

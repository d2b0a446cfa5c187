//! Voice: one sounding note on one synthesis source.

use rp_ir::{DutyCycle, Instrument, InstrumentBank, NoiseMode, PsgChannel, VoiceSource};

use crate::envelope_state::EnvelopeState;
use crate::frequency::{bend_offset, note_pitch, pcm_increment, psg_phase_increment, PITCH_UNITS};

/// Peak level of the square and noise generators.
const PSG_AMPLITUDE: i32 = 0x3000;

/// Noise LFSR clocks per oscillator cycle.
const NOISE_CLOCK_MUL: u64 = 8;

/// Fraction bits of a PCM position.
const POSITION_FRAC_BITS: u32 = 16;
const POSITION_FRAC_MASK: u64 = (1 << POSITION_FRAC_BITS) - 1;

/// A single voice producing audio from an instrument.
#[derive(Clone, Debug)]
pub struct Voice {
    /// What this voice plays.
    pub source: VoiceSource,
    /// Hardware channel class, if any.
    pub psg_channel: Option<PsgChannel>,
    /// Owning track index.
    pub track: u8,
    /// Key as the track wrote it (after transpose); matched by note-off.
    pub key: u8,
    /// Key that sets the pitch (after fixed-key mapping).
    sounding_key: u8,
    root_key: u8,
    /// PCM rate at the root key.
    rate: u32,
    /// Current position in sample (48.16 fixed-point).
    pub position: u64,
    /// Playback increment (16.16 fixed-point).
    pub increment: u32,
    /// Oscillator phase for PSG sources (full cycle = 2^32).
    phase: u32,
    phase_increment: u32,
    lfsr: u16,
    /// Is the voice currently producing audio?
    pub playing: bool,
    /// Amplitude envelope.
    pub envelope: EnvelopeState,
    /// Silenced by track mute; keeps running.
    pub muted: bool,
    velocity: u8,
    /// Instrument pan that overrides the track's.
    fixed_pan: Option<i8>,
    left_vol: i32,
    right_vol: i32,
}

impl Voice {
    /// Create a voice for `instrument` at `sounding_key`.
    ///
    /// `rate` is the PCM sample's native rate and is ignored by PSG sources.
    /// Pitch and mix are set by `retune` and `set_mix`.
    pub fn new(
        instrument: &Instrument,
        rate: u32,
        track: u8,
        key: u8,
        sounding_key: u8,
        velocity: u8,
        envelope: EnvelopeState,
    ) -> Self {
        let lfsr = match instrument.source {
            VoiceSource::Noise(NoiseMode::Short) => 0x7F,
            _ => 0x7FFF,
        };
        Self {
            source: instrument.source,
            psg_channel: instrument.psg_channel,
            track,
            key,
            sounding_key,
            root_key: instrument.root_key,
            rate,
            position: 0,
            increment: 0,
            phase: 0,
            phase_increment: 0,
            lfsr,
            playing: true,
            envelope,
            muted: false,
            velocity: velocity.min(127),
            fixed_pan: instrument.pan,
            left_vol: 0,
            right_vol: 0,
        }
    }

    /// Recompute pitch from the track's bend state.
    pub fn retune(&mut self, bend: i16, bend_range: u8, sample_rate: u32) {
        match self.source {
            VoiceSource::Pcm(_) => {
                let pitch = note_pitch(self.sounding_key, self.root_key, 0, bend, bend_range);
                self.increment = pcm_increment(self.rate, pitch, sample_rate);
            }
            VoiceSource::Wave(_) | VoiceSource::Square(_) | VoiceSource::Noise(_) => {
                let pitch = self.sounding_key as i32 * PITCH_UNITS + bend_offset(bend, bend_range);
                self.phase_increment = psg_phase_increment(pitch, sample_rate);
            }
        }
    }

    /// Recompute left/right levels from track volume (0-127, already
    /// multiplied with expression) and pan (-64..=63).
    pub fn set_mix(&mut self, volume: u8, pan: i8) {
        let vol = (volume.min(127) as i32 * self.velocity as i32) / 127;
        let pan = self.fixed_pan.unwrap_or(pan);
        let pan_right = (pan as i32).clamp(-64, 63) + 64; // 0..127
        self.left_vol = ((128 - pan_right) * vol) >> 7;
        self.right_vol = (pan_right * vol) >> 7;
    }

    /// Current left/right levels (0-127).
    pub fn levels(&self) -> (i32, i32) {
        (self.left_vol, self.right_vol)
    }

    /// Render one frame and return its stereo contribution.
    pub fn render(&mut self, bank: &InstrumentBank) -> (i32, i32) {
        if !self.playing {
            return (0, 0);
        }
        let value = match self.source {
            VoiceSource::Pcm(key) => match bank.sample(key) {
                Some(sample) => {
                    let index = (self.position >> POSITION_FRAC_BITS) as usize;
                    let value = sample.data.get(index) as i32;
                    self.position += self.increment as u64;
                    let pos = self.position >> POSITION_FRAC_BITS;
                    let len = sample.len() as u64;
                    if sample.has_loop() && pos >= len {
                        let loop_start = sample.loop_start as u64;
                        let over = (pos - loop_start) % (len - loop_start);
                        self.position = ((loop_start + over) << POSITION_FRAC_BITS)
                            | (self.position & POSITION_FRAC_MASK);
                    } else if pos >= len {
                        self.playing = false;
                    }
                    value
                }
                None => {
                    self.playing = false;
                    return (0, 0);
                }
            },
            VoiceSource::Wave(key) => match bank.sample(key) {
                Some(sample) if !sample.is_empty() => {
                    let index = ((self.phase as u64 * sample.len() as u64) >> 32) as usize;
                    self.phase = self.phase.wrapping_add(self.phase_increment);
                    sample.data.get(index) as i32
                }
                _ => {
                    self.playing = false;
                    return (0, 0);
                }
            },
            VoiceSource::Square(duty) => {
                let value = square_level(self.phase, duty);
                self.phase = self.phase.wrapping_add(self.phase_increment);
                value
            }
            VoiceSource::Noise(mode) => {
                let value = if self.lfsr & 1 == 0 { PSG_AMPLITUDE } else { -PSG_AMPLITUDE };
                self.clock_noise(mode);
                value
            }
        };

        if self.muted {
            return (0, 0);
        }
        let gain = self.envelope.gain() as i32;
        let left = (((value * self.left_vol) >> 7) * gain) >> 15;
        let right = (((value * self.right_vol) >> 7) * gain) >> 15;
        (left, right)
    }

    fn clock_noise(&mut self, mode: NoiseMode) {
        let total = self.phase as u64 + self.phase_increment as u64 * NOISE_CLOCK_MUL;
        self.phase = total as u32;
        for _ in 0..(total >> 32).min(64) {
            let bit = (self.lfsr ^ (self.lfsr >> 1)) & 1;
            self.lfsr = (self.lfsr >> 1) | (bit << 14);
            if mode == NoiseMode::Short {
                self.lfsr = (self.lfsr & !(1 << 6)) | (bit << 6);
            }
        }
    }

    /// Voice can be reclaimed: envelope finished or source ran out.
    pub fn is_finished(&self) -> bool {
        !self.playing || self.envelope.is_done()
    }
}

fn square_level(phase: u32, duty: DutyCycle) -> i32 {
    if (phase >> 29) < duty.eighths() {
        PSG_AMPLITUDE
    } else {
        -PSG_AMPLITUDE
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rp_ir::{Adsr, EnvelopeModel, Sample};

    const SR: u32 = 48000;

    fn pcm_bank(data: Vec<i8>, loop_start: Option<u32>) -> (InstrumentBank, Instrument) {
        let mut bank = InstrumentBank::new();
        let mut sample = Sample::pcm8("s", data, SR);
        if let Some(start) = loop_start {
            sample = sample.with_loop(start);
        }
        let key = bank.add_sample(sample);
        (bank, Instrument::new("pcm", VoiceSource::Pcm(key)))
    }

    fn voice_for(inst: &Instrument, key: u8) -> Voice {
        let env = EnvelopeState::new(EnvelopeModel::Linear, Adsr::default());
        let mut v = Voice::new(inst, SR, 0, key, key, 127, env);
        v.retune(0, 2, SR);
        v.set_mix(127, 0);
        v
    }

    #[test]
    fn root_key_steps_one_sample_per_frame() {
        let (bank, inst) = pcm_bank(vec![64; 100], None);
        let mut v = voice_for(&inst, 60);
        v.render(&bank);
        assert_eq!(v.position, 1 << 16);
    }

    #[test]
    fn center_pan_is_balanced() {
        let (bank, inst) = pcm_bank(vec![64; 100], None);
        let mut v = voice_for(&inst, 60);
        let (l, r) = v.render(&bank);
        assert!(l > 0);
        assert!((l - r).abs() <= 1);
    }

    #[test]
    fn hard_left_silences_right() {
        let (bank, inst) = pcm_bank(vec![64; 100], None);
        let mut v = voice_for(&inst, 60);
        v.set_mix(127, -64);
        let (l, r) = v.render(&bank);
        assert!(l > 0);
        assert_eq!(r, 0);
    }

    #[test]
    fn hard_right_silences_left() {
        let (bank, inst) = pcm_bank(vec![64; 100], None);
        let mut v = voice_for(&inst, 60);
        v.set_mix(127, 63);
        let (l, r) = v.render(&bank);
        assert_eq!(l, 0);
        assert!(r > 0);
    }

    #[test]
    fn one_shot_stops_at_end() {
        let (bank, inst) = pcm_bank(vec![64; 4], None);
        let mut v = voice_for(&inst, 60);
        for _ in 0..10 {
            v.render(&bank);
        }
        assert!(!v.playing);
        assert!(v.is_finished());
    }

    #[test]
    fn long_one_shot_plays_to_its_last_frame() {
        const FRAMES: usize = 70_000;
        let (bank, inst) = pcm_bank(vec![64; FRAMES], None);
        let mut v = voice_for(&inst, 60);
        let mut sounded = 0;
        for _ in 0..100_000 {
            if !v.playing {
                break;
            }
            v.render(&bank);
            sounded += 1;
        }
        assert!(!v.playing);
        assert_eq!(sounded, FRAMES);
        assert_eq!(v.position >> 16, FRAMES as u64);
    }

    #[test]
    fn long_loop_wraps_past_the_sixteen_bit_range() {
        let (bank, inst) = pcm_bank(vec![64; 70_000], Some(69_000));
        let mut v = voice_for(&inst, 60);
        for _ in 0..75_000 {
            v.render(&bank);
        }
        assert!(v.playing);
        let pos = v.position >> 16;
        assert!((69_000..70_000).contains(&pos), "position {pos} outside loop");
    }

    #[test]
    fn looped_sample_keeps_playing_inside_loop() {
        let (bank, inst) = pcm_bank(vec![100, 50, 25, 10], Some(1));
        let mut v = voice_for(&inst, 60);
        for _ in 0..10 {
            v.render(&bank);
        }
        assert!(v.playing);
        let pos = v.position >> 16;
        assert!((1..4).contains(&pos), "position {pos} outside loop");
    }

    #[test]
    fn missing_sample_stops_voice() {
        let (bank, inst) = pcm_bank(vec![64; 4], None);
        let empty = InstrumentBank::new();
        let mut v = voice_for(&inst, 60);
        assert_eq!(v.render(&empty), (0, 0));
        assert!(!v.playing);
        drop(bank);
    }

    #[test]
    fn muted_voice_advances_silently() {
        let (bank, inst) = pcm_bank(vec![64; 100], None);
        let mut v = voice_for(&inst, 60);
        v.muted = true;
        assert_eq!(v.render(&bank), (0, 0));
        assert_eq!(v.position, 1 << 16);
    }

    #[test]
    fn square_wave_alternates() {
        let bank = InstrumentBank::new();
        let inst = Instrument::new("sq", VoiceSource::Square(DutyCycle::Half));
        let mut v = voice_for(&inst, 69);
        let mut positive = 0;
        let mut negative = 0;
        for _ in 0..SR / 10 {
            let (l, _) = v.render(&bank);
            if l > 0 {
                positive += 1;
            } else if l < 0 {
                negative += 1;
            }
        }
        assert!(positive > 0 && negative > 0);
        assert!((positive as i32 - negative as i32).abs() < 200);
    }

    #[test]
    fn quarter_duty_is_mostly_low() {
        assert_eq!(square_level(0, DutyCycle::Quarter), PSG_AMPLITUDE);
        assert_eq!(square_level(0x4000_0000, DutyCycle::Quarter), -PSG_AMPLITUDE);
        assert_eq!(square_level(0x3FFF_FFFF, DutyCycle::Quarter), PSG_AMPLITUDE);
    }

    #[test]
    fn noise_is_deterministic() {
        let bank = InstrumentBank::new();
        let inst = Instrument::new("n", VoiceSource::Noise(NoiseMode::Long));
        let mut a = voice_for(&inst, 60);
        let mut b = voice_for(&inst, 60);
        for _ in 0..1000 {
            assert_eq!(a.render(&bank), b.render(&bank));
        }
    }

    #[test]
    fn wave_channel_reads_cycle() {
        let mut bank = InstrumentBank::new();
        let key = bank.add_sample(Sample::pcm8("w", vec![127, -128], SR));
        let inst = Instrument::new("wave", VoiceSource::Wave(key));
        let mut v = voice_for(&inst, 69);
        let (first, _) = v.render(&bank);
        assert!(first > 0);
    }

    #[test]
    fn instrument_pan_overrides_track_pan() {
        let (bank, mut inst) = pcm_bank(vec![64; 100], None);
        inst.pan = Some(-64);
        let mut v = voice_for(&inst, 60);
        v.set_mix(127, 63);
        let (_, r) = v.render(&bank);
        assert_eq!(r, 0);
    }

    #[test]
    fn bend_raises_pcm_increment() {
        let (_, inst) = pcm_bank(vec![64; 100], None);
        let mut v = voice_for(&inst, 60);
        let base = v.increment;
        v.retune(8191, 2, SR);
        assert!(v.increment > base);
    }
}

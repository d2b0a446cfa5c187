//! Runtime ADSR envelope.
//!
//! Stepped at the format's envelope rate, not per output frame. The
//! resulting gain is cached as Q15 (0..=0x8000) so the render loop only
//! multiplies.

use rp_ir::{Adsr, EnvelopeModel, ATTENUATION_FLOOR};

/// Unity gain in Q15.
pub const FULL_GAIN: u32 = 0x8000;

const LINEAR_MAX: i32 = 255;

/// Attack multipliers for attack values 109..=127, indexed by `127 - attack`.
const ATTACK_CURVE: [u8; 19] = [
    0, 1, 5, 14, 26, 38, 51, 63, 73, 84, 92, 100, 109, 116, 123, 127, 132, 137, 143,
];

/// Attenuation units per table step (0.1 dB); the floor sits at -72.3 dB.
const STEP_SHIFT: u32 = 7;

/// Table steps from full level down to the floor.
const GAIN_STEPS: usize = (-(ATTENUATION_FLOOR >> STEP_SHIFT)) as usize + 1;

/// 10^(-1/200) in 0.32 fixed point: the gain ratio of one 0.1 dB step.
const GAIN_STEP_RATIO: u64 = 0xFD11_D0CC;

/// Q15 gain per 0.1 dB of attenuation.
const GAIN_TABLE: [u16; GAIN_STEPS] = gain_table();

/// Sustain 0..=127 to attenuation in 0.1 dB (squared amplitude curve).
#[rustfmt::skip]
const SUSTAIN_TABLE: [i16; 128] = [
    -723, -723, -721, -651, -601, -562, -530, -503, -480, -460, -442, -425, -410, -396, -383, -371,
    -360, -349, -339, -330, -321, -313, -305, -297, -289, -282, -276, -269, -263, -257, -251, -245,
    -239, -234, -229, -224, -219, -214, -210, -205, -201, -196, -192, -188, -184, -180, -176, -173,
    -169, -165, -162, -158, -155, -152, -149, -145, -142, -139, -136, -133, -130, -127, -125, -122,
    -119, -116, -114, -111, -109, -106, -103, -101, -99, -96, -94, -91, -89, -87, -85, -82,
    -80, -78, -76, -74, -72, -70, -68, -66, -64, -62, -60, -58, -56, -54, -52, -50,
    -49, -47, -45, -43, -42, -40, -38, -36, -35, -33, -31, -30, -28, -27, -25, -23,
    -22, -20, -19, -17, -16, -14, -13, -11, -10, -8, -7, -6, -4, -3, -1, 0,
];

/// Envelope phase.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EnvelopePhase {
    Attack,
    Decay,
    Sustain,
    Release,
    /// Released to silence; the voice can be reclaimed.
    Done,
}

/// Runtime state for one voice's envelope.
#[derive(Clone, Debug)]
pub struct EnvelopeState {
    model: EnvelopeModel,
    adsr: Adsr,
    phase: EnvelopePhase,
    /// Linear: 0..=255. Attenuation: `ATTENUATION_FLOOR..=0`.
    level: i32,
    sustain_level: i32,
    gain: u32,
}

impl EnvelopeState {
    /// Start a new envelope. The first attack step is applied immediately,
    /// so an instant attack is audible on the first frame.
    pub fn new(model: EnvelopeModel, adsr: Adsr) -> Self {
        let (level, sustain_level) = match model {
            EnvelopeModel::Linear => (0, adsr.sustain as i32),
            EnvelopeModel::Attenuation => (ATTENUATION_FLOOR, sustain_attenuation(adsr.sustain)),
        };
        let mut env = Self {
            model,
            adsr,
            phase: EnvelopePhase::Attack,
            level,
            sustain_level,
            gain: 0,
        };
        env.step();
        env
    }

    pub fn phase(&self) -> EnvelopePhase {
        self.phase
    }

    /// Current gain, Q15.
    pub fn gain(&self) -> u32 {
        self.gain
    }

    pub fn is_released(&self) -> bool {
        matches!(self.phase, EnvelopePhase::Release | EnvelopePhase::Done)
    }

    pub fn is_done(&self) -> bool {
        self.phase == EnvelopePhase::Done
    }

    /// Enter the release phase from wherever the envelope is. A zero
    /// linear release rate silences at once.
    pub fn release(&mut self) {
        if self.is_released() {
            return;
        }
        self.phase = EnvelopePhase::Release;
        if self.model == EnvelopeModel::Linear && self.adsr.release == 0 {
            self.level = 0;
            self.phase = EnvelopePhase::Done;
            self.gain = 0;
        }
    }

    /// Advance one envelope tick.
    pub fn step(&mut self) {
        match self.model {
            EnvelopeModel::Linear => self.step_linear(),
            EnvelopeModel::Attenuation => self.step_attenuation(),
        }
        self.gain = self.compute_gain();
    }

    fn step_linear(&mut self) {
        match self.phase {
            EnvelopePhase::Attack => {
                self.level = (self.level + self.adsr.attack as i32).min(LINEAR_MAX);
                if self.level >= LINEAR_MAX {
                    self.phase = EnvelopePhase::Decay;
                    if self.level <= self.sustain_level {
                        self.phase = EnvelopePhase::Sustain;
                    }
                }
            }
            EnvelopePhase::Decay => {
                self.level = (self.level * self.adsr.decay as i32) >> 8;
                if self.level <= self.sustain_level {
                    self.level = self.sustain_level;
                    self.phase = EnvelopePhase::Sustain;
                }
            }
            EnvelopePhase::Sustain => {}
            EnvelopePhase::Release => {
                self.level = (self.level * self.adsr.release as i32) >> 8;
                if self.level <= 0 {
                    self.level = 0;
                    self.phase = EnvelopePhase::Done;
                }
            }
            EnvelopePhase::Done => {}
        }
    }

    fn step_attenuation(&mut self) {
        match self.phase {
            EnvelopePhase::Attack => {
                let mul = attack_multiplier(self.adsr.attack) as i64;
                self.level = -(((-(self.level as i64)) * mul) >> 8) as i32;
                if self.level >= 0 {
                    self.level = 0;
                    self.phase = EnvelopePhase::Decay;
                    if self.level <= self.sustain_level {
                        self.phase = EnvelopePhase::Sustain;
                    }
                }
            }
            EnvelopePhase::Decay => {
                self.level -= fall_rate(self.adsr.decay);
                if self.level <= self.sustain_level {
                    self.level = self.sustain_level;
                    self.phase = EnvelopePhase::Sustain;
                }
            }
            EnvelopePhase::Sustain => {}
            EnvelopePhase::Release => {
                self.level -= fall_rate(self.adsr.release);
                if self.level <= ATTENUATION_FLOOR {
                    self.level = ATTENUATION_FLOOR;
                    self.phase = EnvelopePhase::Done;
                }
            }
            EnvelopePhase::Done => {}
        }
    }

    fn compute_gain(&self) -> u32 {
        if self.phase == EnvelopePhase::Done {
            return 0;
        }
        match self.model {
            EnvelopeModel::Linear => (self.level.clamp(0, LINEAR_MAX) as u32 * FULL_GAIN) / 255,
            EnvelopeModel::Attenuation => attenuation_gain(self.level),
        }
    }
}

/// Attack multiplier (n/256 of the remaining attenuation kept per step).
fn attack_multiplier(attack: u8) -> u32 {
    let attack = attack.min(127);
    if attack < 109 {
        255 - attack as u32
    } else {
        ATTACK_CURVE[(127 - attack) as usize] as u32
    }
}

/// Attenuation removed per step by a decay or release rate.
fn fall_rate(rate: u8) -> i32 {
    match rate.min(127) {
        127 => 0xFFFF,
        126 => 0x3C00,
        r if r < 50 => r as i32 * 2 + 1,
        r => 0x1E00 / (126 - r as i32),
    }
}

const fn gain_table() -> [u16; GAIN_STEPS] {
    let mut table = [0u16; GAIN_STEPS];
    // Q31 running gain
    let mut gain: u64 = 1 << 31;
    let mut i = 0;
    while i < GAIN_STEPS {
        table[i] = (gain >> 16) as u16;
        gain = (gain * GAIN_STEP_RATIO) >> 32;
        i += 1;
    }
    table
}

/// Attenuation of a 0..=127 sustain level.
fn sustain_attenuation(sustain: u8) -> i32 {
    match sustain.min(127) {
        0 => ATTENUATION_FLOOR,
        s => (SUSTAIN_TABLE[s as usize] as i32) << STEP_SHIFT,
    }
}

/// Q15 gain of an attenuation level.
fn attenuation_gain(level: i32) -> u32 {
    if level <= ATTENUATION_FLOOR {
        return 0;
    }
    if level >= 0 {
        return FULL_GAIN;
    }
    GAIN_TABLE[(-(level >> STEP_SHIFT)) as usize] as u32
}

#[cfg(test)]
mod tests {
    use super::*;

    fn linear(adsr: Adsr) -> EnvelopeState {
        EnvelopeState::new(EnvelopeModel::Linear, adsr)
    }

    fn nds(adsr: Adsr) -> EnvelopeState {
        EnvelopeState::new(EnvelopeModel::Attenuation, adsr)
    }

    #[test]
    fn instant_attack_is_full_on_first_frame() {
        let env = linear(Adsr::default());
        assert_eq!(env.gain(), FULL_GAIN);
        assert_eq!(env.phase(), EnvelopePhase::Sustain);
    }

    #[test]
    fn slow_attack_ramps() {
        let mut env = linear(Adsr::new(64, 0, 255, 0));
        let first = env.gain();
        env.step();
        assert!(env.gain() > first);
        env.step();
        env.step();
        assert_eq!(env.gain(), FULL_GAIN);
    }

    #[test]
    fn linear_decay_stops_at_sustain() {
        let mut env = linear(Adsr::new(255, 128, 100, 0));
        assert_eq!(env.phase(), EnvelopePhase::Decay);
        for _ in 0..10 {
            env.step();
        }
        assert_eq!(env.phase(), EnvelopePhase::Sustain);
        assert_eq!(env.gain(), 100 * FULL_GAIN / 255);
    }

    #[test]
    fn zero_release_is_instant() {
        let mut env = linear(Adsr::default());
        env.release();
        assert!(env.is_done());
        env.step();
        assert!(env.is_done());
        assert_eq!(env.gain(), 0);
    }

    #[test]
    fn linear_release_decays_geometrically() {
        let mut env = linear(Adsr::new(255, 0, 255, 200));
        env.release();
        env.step();
        assert_eq!(env.phase(), EnvelopePhase::Release);
        assert_eq!(env.gain(), (255 * 200 >> 8) as u32 * FULL_GAIN / 255);
        for _ in 0..100 {
            env.step();
        }
        assert!(env.is_done());
    }

    #[test]
    fn release_is_sticky() {
        let mut env = linear(Adsr::new(255, 0, 255, 250));
        env.release();
        env.step();
        let phase = env.phase();
        env.release();
        assert_eq!(env.phase(), phase);
    }

    #[test]
    fn nds_instant_attack() {
        let env = nds(Adsr::new(127, 127, 127, 127));
        assert_eq!(env.gain(), FULL_GAIN);
    }

    #[test]
    fn nds_attack_multiplier_table() {
        assert_eq!(attack_multiplier(0), 255);
        assert_eq!(attack_multiplier(108), 147);
        assert_eq!(attack_multiplier(109), 143);
        assert_eq!(attack_multiplier(127), 0);
    }

    #[test]
    fn nds_fall_rates() {
        assert_eq!(fall_rate(127), 0xFFFF);
        assert_eq!(fall_rate(126), 0x3C00);
        assert_eq!(fall_rate(0), 1);
        assert_eq!(fall_rate(49), 99);
        assert_eq!(fall_rate(96), 0x1E00 / 30);
    }

    #[test]
    fn nds_sustain_levels() {
        assert_eq!(sustain_attenuation(127), 0);
        assert_eq!(sustain_attenuation(0), ATTENUATION_FLOOR);
        assert_eq!(sustain_attenuation(1), ATTENUATION_FLOOR);
        assert_eq!(sustain_attenuation(2), -721 << 7);
        assert_eq!(sustain_attenuation(3), -651 << 7);
        assert_eq!(sustain_attenuation(64), -119 << 7);
        assert_eq!(sustain_attenuation(126), -1 << 7);
    }

    #[test]
    fn nds_gain_table_values() {
        assert_eq!(GAIN_TABLE.len(), 724);
        assert_eq!(GAIN_TABLE[0] as u32, FULL_GAIN);
        assert_eq!(GAIN_TABLE[1], 32392);
        assert_eq!(GAIN_TABLE[10], 29204);
        // about 6 dB halves the gain
        assert_eq!(GAIN_TABLE[60], 16422);
        assert_eq!(GAIN_TABLE[200], 3276);
        assert_eq!(GAIN_TABLE[400], 327);
        assert_eq!(GAIN_TABLE[723], 7);
        assert!(GAIN_TABLE.windows(2).all(|w| w[1] <= w[0]));
    }

    #[test]
    fn nds_gain_steps_every_tenth_of_a_decibel() {
        assert_eq!(attenuation_gain(-1), 32392);
        assert_eq!(attenuation_gain(-128), 32392);
        assert_eq!(attenuation_gain(-129), 32022);
        assert_eq!(attenuation_gain(-60 << 7), 16422);
        assert_eq!(attenuation_gain(ATTENUATION_FLOOR + 1), 7);
    }

    #[test]
    fn nds_decay_reaches_sustain() {
        let mut env = nds(Adsr::new(127, 120, 64, 127));
        for _ in 0..100 {
            env.step();
        }
        assert_eq!(env.phase(), EnvelopePhase::Sustain);
        assert!(env.gain() < FULL_GAIN && env.gain() > 0);
    }

    #[test]
    fn nds_fast_release_finishes() {
        let mut env = nds(Adsr::new(127, 127, 127, 127));
        env.release();
        env.step();
        env.step();
        assert!(env.is_done());
        assert_eq!(env.gain(), 0);
    }

    #[test]
    fn nds_gain_is_monotonic_in_level() {
        assert_eq!(attenuation_gain(0), FULL_GAIN);
        assert!(attenuation_gain(-1280) < FULL_GAIN);
        assert!(attenuation_gain(-12800) < attenuation_gain(-1280));
        assert_eq!(attenuation_gain(ATTENUATION_FLOOR), 0);
    }
}

//! Pitch-to-increment conversion.
//!
//! Pitch is expressed in 1/256 semitone units. PCM voices turn a pitch
//! offset from the instrument's root key into a 16.16 step through the
//! sample; PSG voices turn an absolute pitch into a 32-bit phase step.

/// Pitch units per semitone.
pub const PITCH_UNITS: i32 = 256;

const UNITS_PER_OCTAVE: i32 = PITCH_UNITS * 12;

/// MIDI key of A4 (440 Hz), the PSG tuning reference.
const A4_KEY: i32 = 69;
const A4_HZ: u64 = 440;

/// Multipliers for 0-12 semitones, scaled by 65536 (16.16 fixed-point).
/// `SEMITONE_MUL[n] = round(2^(n/12) * 65536)`; entry 12 closes the octave
/// for interpolation.
const SEMITONE_MUL: [u32; 13] = [
    65536,  // 0:  1.0
    69433,  // 1:  2^(1/12)
    73562,  // 2:  2^(2/12)
    77936,  // 3:  2^(3/12)
    82570,  // 4:  2^(4/12)
    87480,  // 5:  2^(5/12)
    92682,  // 6:  2^(6/12)
    98193,  // 7:  2^(7/12)
    104032, // 8:  2^(8/12)
    110218, // 9:  2^(9/12)
    116772, // 10: 2^(10/12)
    123715, // 11: 2^(11/12)
    131072, // 12: 2.0
];

/// Frequency ratio for a pitch offset, 16.16 fixed-point.
///
/// Whole octaves shift; the fraction of a semitone is interpolated
/// linearly between table entries.
pub fn pitch_ratio(pitch: i32) -> u32 {
    let octaves = pitch.div_euclid(UNITS_PER_OCTAVE).clamp(-16, 10);
    let within = pitch.rem_euclid(UNITS_PER_OCTAVE);
    let semi = (within / PITCH_UNITS) as usize;
    let frac = (within % PITCH_UNITS) as u32;

    let lo = SEMITONE_MUL[semi];
    let hi = SEMITONE_MUL[semi + 1];
    let mul = lo + (((hi - lo) * frac) >> 8);

    if octaves >= 0 {
        mul << octaves as u32
    } else {
        mul >> (-octaves) as u32
    }
}

/// Pitch of a note relative to its instrument's root key.
///
/// `bend` is normalized to -8192..=8191 of `bend_range` semitones.
pub fn note_pitch(key: u8, root_key: u8, transpose: i8, bend: i16, bend_range: u8) -> i32 {
    let semis = key as i32 + transpose as i32 - root_key as i32;
    semis * PITCH_UNITS + bend_offset(bend, bend_range)
}

/// Pitch-bend offset in pitch units.
pub fn bend_offset(bend: i16, bend_range: u8) -> i32 {
    (bend as i32 * bend_range as i32 * PITCH_UNITS) / 8192
}

/// 16.16 step through a PCM sample recorded at `rate` Hz, played at
/// `pitch` above its root, mixed at `sample_rate`.
pub fn pcm_increment(rate: u32, pitch: i32, sample_rate: u32) -> u32 {
    if sample_rate == 0 || rate == 0 {
        return 0;
    }
    let step = (rate as u64 * pitch_ratio(pitch) as u64) / sample_rate as u64;
    step.min(u32::MAX as u64) as u32
}

/// 32-bit phase step of a PSG oscillator playing absolute `pitch`
/// (key * 256 + fraction) at `sample_rate`.
pub fn psg_phase_increment(pitch: i32, sample_rate: u32) -> u32 {
    if sample_rate == 0 {
        return 0;
    }
    let ratio = pitch_ratio(pitch - A4_KEY * PITCH_UNITS) as u64;
    // 440 * ratio is Hz in 16.16; another << 16 scales to 2^32 per cycle.
    let step = ((A4_HZ * ratio) << 16) / sample_rate as u64;
    step.min(u32::MAX as u64) as u32
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE_RATE: u32 = 48000;

    #[test]
    fn zero_pitch_is_unity() {
        assert_eq!(pitch_ratio(0), 65536);
    }

    #[test]
    fn octave_up_doubles() {
        assert_eq!(pitch_ratio(12 * 256), 131072);
        assert_eq!(pitch_ratio(24 * 256), 262144);
    }

    #[test]
    fn octave_down_halves() {
        assert_eq!(pitch_ratio(-12 * 256), 32768);
    }

    #[test]
    fn semitone_matches_table() {
        assert_eq!(pitch_ratio(256), 69433);
        assert_eq!(pitch_ratio(-256), 123715 / 2);
    }

    #[test]
    fn fraction_interpolates() {
        // halfway between 65536 and 69433
        assert_eq!(pitch_ratio(128), 65536 + (3897 * 128 >> 8));
    }

    #[test]
    fn native_rate_at_root_steps_one_sample() {
        assert_eq!(pcm_increment(SAMPLE_RATE, 0, SAMPLE_RATE), 1 << 16);
    }

    #[test]
    fn half_rate_sample_steps_half() {
        assert_eq!(pcm_increment(24000, 0, SAMPLE_RATE), 1 << 15);
    }

    #[test]
    fn zero_rates_give_zero() {
        assert_eq!(pcm_increment(0, 0, SAMPLE_RATE), 0);
        assert_eq!(pcm_increment(SAMPLE_RATE, 0, 0), 0);
        assert_eq!(psg_phase_increment(60 * 256, 0), 0);
    }

    #[test]
    fn note_pitch_applies_transpose_and_bend() {
        assert_eq!(note_pitch(72, 60, 0, 0, 2), 12 * 256);
        assert_eq!(note_pitch(60, 60, -1, 0, 2), -256);
        // full downward bend spans the whole range
        assert_eq!(note_pitch(60, 60, 0, -8192, 2), -512);
    }

    #[test]
    fn a4_phase_step() {
        let expected = (440u64 << 32) / SAMPLE_RATE as u64;
        assert_eq!(psg_phase_increment(69 * 256, SAMPLE_RATE) as u64, expected);
    }

    #[test]
    fn psg_octave_doubles_phase_step() {
        let a4 = psg_phase_increment(69 * 256, SAMPLE_RATE);
        let a5 = psg_phase_increment(81 * 256, SAMPLE_RATE);
        assert!((a5 as i64 - a4 as i64 * 2).abs() <= 1);
    }
}

//! Sound engine formats and their fixed hardware/driver constants.

/// The sound driver a song was authored for. Selects the opcode table,
/// timing resolution, polyphony and envelope arithmetic.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum EngineFormat {
    /// GBA MusicPlayer2000 ("Sappy").
    M4a,
    /// GBA Mario & Luigi: Superstar Saga driver.
    Mlss,
    /// NDS Procyon "DSE" (SMD sequences).
    Dse,
    /// NDS NitroComposer (SSEQ inside SDAT).
    Sdat,
}

/// How envelope levels are represented and stepped.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EnvelopeModel {
    /// Linear level 0..=255; attack adds, decay/release multiply by n/256.
    Linear,
    /// Attenuation in 1/128 of 0.1 dB (0 = full, `ATTENUATION_FLOOR` = silent).
    Attenuation,
}

/// Lowest attenuation an `EnvelopeModel::Attenuation` envelope reaches (-72.3 dB).
pub const ATTENUATION_FLOOR: i32 = -92544;

/// Per-format constants the engine needs at load time.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FormatProfile {
    /// Sequencer ticks per quarter note.
    pub ticks_per_quarter: u32,
    /// Hardware channel count the driver mixes.
    pub max_voices: usize,
    /// Envelope update rate in millihertz.
    pub envelope_rate_mhz: u32,
    /// Envelope arithmetic.
    pub envelope_model: EnvelopeModel,
    /// Tempo (BPM) before the first tempo command.
    pub default_tempo: u16,
    /// Pitch bend range in semitones before the first range command.
    pub default_bend_range: u8,
    /// Nesting depth of calls and loops the driver supports.
    pub loop_stack_depth: u8,
}

/// GBA VBlank rate (59.7275 Hz).
const GBA_FRAME_MHZ: u32 = 59_727;

/// NDS sequencer interrupt rate (64 * 2728 cycles at 33.514 MHz).
const NDS_SEQ_MHZ: u32 = 191_952;

impl EngineFormat {
    /// Constants for this format.
    pub const fn profile(self) -> FormatProfile {
        match self {
            EngineFormat::M4a => FormatProfile {
                ticks_per_quarter: 24,
                max_voices: 12,
                envelope_rate_mhz: GBA_FRAME_MHZ,
                envelope_model: EnvelopeModel::Linear,
                default_tempo: 150,
                default_bend_range: 2,
                loop_stack_depth: 3,
            },
            EngineFormat::Mlss => FormatProfile {
                ticks_per_quarter: 24,
                max_voices: 12,
                envelope_rate_mhz: GBA_FRAME_MHZ,
                envelope_model: EnvelopeModel::Linear,
                default_tempo: 120,
                default_bend_range: 2,
                loop_stack_depth: 4,
            },
            EngineFormat::Dse => FormatProfile {
                ticks_per_quarter: 48,
                max_voices: 16,
                envelope_rate_mhz: NDS_SEQ_MHZ,
                envelope_model: EnvelopeModel::Attenuation,
                default_tempo: 120,
                default_bend_range: 2,
                loop_stack_depth: 4,
            },
            EngineFormat::Sdat => FormatProfile {
                ticks_per_quarter: 48,
                max_voices: 16,
                envelope_rate_mhz: NDS_SEQ_MHZ,
                envelope_model: EnvelopeModel::Attenuation,
                default_tempo: 120,
                default_bend_range: 2,
                loop_stack_depth: 3,
            },
        }
    }

    /// Short display name.
    pub const fn name(self) -> &'static str {
        match self {
            EngineFormat::M4a => "M4A/MP2K",
            EngineFormat::Mlss => "MLSS",
            EngineFormat::Dse => "DSE",
            EngineFormat::Sdat => "SDAT",
        }
    }
}

impl FormatProfile {
    /// Output frames between envelope steps at `sample_rate` (at least 1).
    pub fn envelope_step_frames(&self, sample_rate: u32) -> u32 {
        let frames = (sample_rate as u64 * 1000) / self.envelope_rate_mhz as u64;
        (frames as u32).max(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gba_formats_use_linear_envelopes() {
        assert_eq!(EngineFormat::M4a.profile().envelope_model, EnvelopeModel::Linear);
        assert_eq!(EngineFormat::Mlss.profile().envelope_model, EnvelopeModel::Linear);
    }

    #[test]
    fn nds_formats_have_sixteen_voices() {
        assert_eq!(EngineFormat::Sdat.profile().max_voices, 16);
        assert_eq!(EngineFormat::Dse.profile().max_voices, 16);
    }

    #[test]
    fn gba_envelope_steps_once_per_frame() {
        // 48000 / 59.7275 = 803.6
        assert_eq!(EngineFormat::M4a.profile().envelope_step_frames(48000), 803);
    }

    #[test]
    fn envelope_step_never_zero() {
        assert_eq!(EngineFormat::Sdat.profile().envelope_step_frames(1), 1);
    }
}

//! Instruments, programs and the instrument bank.

use alloc::vec::Vec;
use arrayvec::ArrayString;
use slotmap::SlotMap;

use crate::command::EnvelopeParam;
use crate::sample::{Sample, SampleKey};

/// Envelope parameters in the format's native units.
///
/// `EnvelopeModel::Linear`: attack is added per step (255 = instant), decay
/// and release multiply by n/256, sustain is a level 0..=255.
/// `EnvelopeModel::Attenuation`: all four are 0..=127 rates/levels
/// (127 = instant attack/decay/release, full sustain).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Adsr {
    pub attack: u8,
    pub decay: u8,
    pub sustain: u8,
    pub release: u8,
}

impl Adsr {
    pub const fn new(attack: u8, decay: u8, sustain: u8, release: u8) -> Self {
        Self { attack, decay, sustain, release }
    }

    /// Replace one parameter.
    pub fn with(mut self, param: EnvelopeParam, value: u8) -> Self {
        match param {
            EnvelopeParam::Attack => self.attack = value,
            EnvelopeParam::Decay => self.decay = value,
            EnvelopeParam::Sustain => self.sustain = value,
            EnvelopeParam::Release => self.release = value,
        }
        self
    }
}

impl Default for Adsr {
    /// Instant attack, full sustain, instant release (linear units).
    fn default() -> Self {
        Self::new(255, 0, 255, 0)
    }
}

/// Square wave duty cycle.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum DutyCycle {
    /// 12.5%
    Eighth,
    /// 25%
    Quarter,
    /// 50%
    #[default]
    Half,
    /// 75%
    ThreeQuarters,
}

impl DutyCycle {
    /// High portion of the cycle in eighths.
    pub const fn eighths(self) -> u32 {
        match self {
            DutyCycle::Eighth => 1,
            DutyCycle::Quarter => 2,
            DutyCycle::Half => 4,
            DutyCycle::ThreeQuarters => 6,
        }
    }

    /// Decode the two-bit duty field used by GBA and NDS PSG registers.
    pub const fn from_bits(bits: u8) -> Self {
        match bits & 3 {
            0 => DutyCycle::Eighth,
            1 => DutyCycle::Quarter,
            2 => DutyCycle::Half,
            _ => DutyCycle::ThreeQuarters,
        }
    }
}

/// Noise LFSR width.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum NoiseMode {
    /// 15-bit LFSR
    #[default]
    Long,
    /// 7-bit LFSR (metallic)
    Short,
}

/// What a voice plays.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum VoiceSource {
    /// PCM sample, `Sample::rate` at the root key.
    Pcm(SampleKey),
    /// Single-cycle looped waveform (GBA programmable wave channel).
    Wave(SampleKey),
    /// Square wave.
    Square(DutyCycle),
    /// LFSR noise.
    Noise(NoiseMode),
}

/// GBA PSG channel an instrument is bound to. Each channel holds one voice.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PsgChannel {
    Square1,
    Square2,
    Wave,
    Noise,
}

/// A playable instrument.
#[derive(Clone, Debug)]
pub struct Instrument {
    /// Instrument name (diagnostics only)
    pub name: ArrayString<24>,
    /// Sound source
    pub source: VoiceSource,
    /// Key at which the source plays at its native rate
    pub root_key: u8,
    /// Play every note at this key (drums, fixed-frequency samples)
    pub fixed_key: Option<u8>,
    /// Pan override (-64..63); the track's pan applies when `None`
    pub pan: Option<i8>,
    /// Envelope
    pub adsr: Adsr,
    /// Dedicated hardware channel, if any
    pub psg_channel: Option<PsgChannel>,
}

impl Instrument {
    /// Create an instrument playing `source` rooted at middle C.
    pub fn new(name: &str, source: VoiceSource) -> Self {
        let mut inst = Self {
            name: ArrayString::new(),
            source,
            root_key: 60,
            fixed_key: None,
            pan: None,
            adsr: Adsr::default(),
            psg_channel: None,
        };
        let _ = inst.name.try_push_str(name);
        inst
    }

    /// Builder: set the envelope.
    pub fn with_adsr(mut self, adsr: Adsr) -> Self {
        self.adsr = adsr;
        self
    }

    /// Builder: bind to a PSG channel.
    pub fn on_psg(mut self, channel: PsgChannel) -> Self {
        self.psg_channel = Some(channel);
        self
    }

    /// Builder: always play at `key`.
    pub fn fixed_at(mut self, key: u8) -> Self {
        self.fixed_key = Some(key);
        self
    }
}

/// A key range of a split program: keys up to and including `high_key`.
#[derive(Clone, Debug)]
pub struct KeyRegion {
    pub high_key: u8,
    pub instrument: Instrument,
}

/// What a program number selects.
#[derive(Clone, Debug)]
pub enum Program {
    /// One instrument for every key.
    Single(Instrument),
    /// Instrument chosen by key range; regions sorted by `high_key`.
    KeySplit(Vec<KeyRegion>),
    /// Instrument chosen per key (index = key).
    Drumkit(Vec<Option<Instrument>>),
}

impl Program {
    /// Instrument that plays `key`.
    pub fn instrument_for(&self, key: u8) -> Option<&Instrument> {
        match self {
            Program::Single(inst) => Some(inst),
            Program::KeySplit(regions) => regions
                .iter()
                .find(|r| key <= r.high_key)
                .map(|r| &r.instrument),
            Program::Drumkit(keys) => keys.get(key as usize).and_then(|i| i.as_ref()),
        }
    }
}

/// Samples plus the program table a song's tracks select from.
#[derive(Clone, Debug, Default)]
pub struct InstrumentBank {
    /// Sample storage
    pub samples: SlotMap<SampleKey, Sample>,
    programs: Vec<Option<Program>>,
}

impl InstrumentBank {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a sample and return its key.
    pub fn add_sample(&mut self, sample: Sample) -> SampleKey {
        self.samples.insert(sample)
    }

    /// Look up a sample.
    pub fn sample(&self, key: SampleKey) -> Option<&Sample> {
        self.samples.get(key)
    }

    /// Assign a program number.
    pub fn set_program(&mut self, id: u8, program: Program) {
        let idx = id as usize;
        if self.programs.len() <= idx {
            self.programs.resize_with(idx + 1, || None);
        }
        self.programs[idx] = Some(program);
    }

    /// Look up a program.
    pub fn program(&self, id: u8) -> Option<&Program> {
        self.programs.get(id as usize).and_then(|p| p.as_ref())
    }

    /// Number of assigned programs.
    pub fn program_count(&self) -> usize {
        self.programs.iter().filter(|p| p.is_some()).count()
    }

    /// Resolve a note to its instrument and the key it sounds at.
    pub fn resolve(&self, program: u8, key: u8) -> Option<(&Instrument, u8)> {
        let inst = self.program(program)?.instrument_for(key)?;
        Some((inst, inst.fixed_key.unwrap_or(key)))
    }
}

//! Core data types for the retroplay sequencer.
//!
//! Loaders produce these types, the engine consumes them. Nothing in here
//! knows how to parse a ROM or render audio.
//!
//! Designed to be `no_std` compatible with the `alloc` crate.

#![cfg_attr(not(feature = "std"), no_std)]

extern crate alloc;

mod command;
mod format;
mod instrument;
mod sample;
mod song;
mod state;

pub use command::{Command, EnvelopeParam};
pub use format::{EngineFormat, EnvelopeModel, FormatProfile, ATTENUATION_FLOOR};
pub use instrument::{
    Adsr, DutyCycle, Instrument, InstrumentBank, KeyRegion, NoiseMode, Program, PsgChannel,
    VoiceSource,
};
pub use sample::{Sample, SampleData, SampleKey};
pub use song::{Song, TrackSource};
pub use state::{PausePolicy, PlaybackState, TrackState};

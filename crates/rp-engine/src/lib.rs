//! Sequencer and mixer engine for retroplay.
//!
//! Interprets per-track event streams tick by tick, allocates voices from a
//! fixed pool and mixes them into 16-bit stereo frames. The render path
//! never allocates, blocks or logs.

#![cfg_attr(not(feature = "std"), no_std)]

extern crate alloc;

mod envelope_state;
mod error;
mod frame;
mod frequency;
mod mixer;
mod notification;
pub mod reader;
mod sequencer;
mod snapshot;
mod track;
mod voice;
mod voice_pool;

pub use envelope_state::{EnvelopePhase, EnvelopeState, FULL_GAIN};
pub use error::{DecodeError, ResourceError, SongError};
pub use frame::Frame;
pub use frequency::{note_pitch, pcm_increment, pitch_ratio, psg_phase_increment, PITCH_UNITS};
pub use mixer::Mixer;
pub use notification::{Notification, Notifications, NOTIFICATION_CAPACITY};
pub use reader::{reader_for, Decoded, EventStreamReader, ReaderContext, StreamView};
pub use sequencer::{EngineConfig, Sequencer, DEFAULT_COMMAND_LIMIT, DEFAULT_MAX_SEEK_TICKS};
pub use snapshot::{SongSnapshot, TrackSnapshot, MAX_TRACKS};
pub use track::{Track, LOOP_STACK_CAPACITY, MAX_TRACK_NOTES};
pub use voice::Voice;
pub use voice_pool::{VoiceHandle, VoicePool};

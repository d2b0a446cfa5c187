//! Read-only view of playback state for displays.
//!
//! A snapshot is allocated once by the host and refilled in place, so taking
//! one never allocates.

use arrayvec::ArrayVec;
use rp_ir::{EngineFormat, PlaybackState, TrackState};

use crate::error::DecodeError;
use crate::track::{Track, MAX_TRACK_NOTES};
use crate::voice_pool::VoicePool;

/// Tracks a song may have.
pub const MAX_TRACKS: usize = 32;

/// One track at the moment of capture.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TrackSnapshot {
    pub index: u8,
    pub state: TrackState,
    /// Offset of the next command in the stream
    pub cursor: usize,
    pub program: u8,
    pub volume: u8,
    pub pan: i8,
    pub bend: i16,
    /// Keys currently held (not yet released)
    pub keys: ArrayVec<u8, MAX_TRACK_NOTES>,
    pub loop_count: u32,
    pub muted: bool,
    pub error: Option<DecodeError>,
}

impl TrackSnapshot {
    pub(crate) fn capture(track: &Track, pool: &VoicePool) -> Self {
        Self {
            index: track.index(),
            state: track.state(),
            cursor: track.cursor(),
            program: track.program(),
            volume: track.volume(),
            pan: track.pan(),
            bend: track.bend(),
            keys: track.sounding_keys(pool).collect(),
            loop_count: track.loop_count(),
            muted: track.is_muted(),
            error: track.error(),
        }
    }
}

/// Whole-song state at the moment of capture.
#[derive(Clone, Debug, PartialEq)]
pub struct SongSnapshot {
    pub state: PlaybackState,
    pub song_index: Option<usize>,
    pub format: EngineFormat,
    /// Ticks played since the song start
    pub tick: u64,
    pub tempo: u16,
    pub master_volume: f32,
    pub active_voices: usize,
    pub song_loops: u32,
    pub tracks: ArrayVec<TrackSnapshot, MAX_TRACKS>,
}

impl SongSnapshot {
    pub fn new() -> Self {
        Self {
            state: PlaybackState::Stopped,
            song_index: None,
            format: EngineFormat::M4a,
            tick: 0,
            tempo: 0,
            master_volume: 1.0,
            active_voices: 0,
            song_loops: 0,
            tracks: ArrayVec::new(),
        }
    }

    /// Total held keys across tracks.
    pub fn held_keys(&self) -> usize {
        self.tracks.iter().map(|t| t.keys.len()).sum()
    }
}

impl Default for SongSnapshot {
    fn default() -> Self {
        Self::new()
    }
}

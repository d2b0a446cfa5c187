//! Song definition handed from a loader to the sequencer.

use alloc::sync::Arc;
use alloc::vec::Vec;

use crate::format::EngineFormat;
use crate::instrument::InstrumentBank;

/// Where one track's events live.
///
/// Tracks of a song usually share one blob (the ROM image or the SSEQ
/// data block); `data` is reference-counted so they can.
#[derive(Clone, Debug)]
pub struct TrackSource {
    /// Event stream bytes
    pub data: Arc<[u8]>,
    /// Address the format uses for `data[0]` (GBA pointers start at 0x0800_0000)
    pub base_address: u32,
    /// Offset of the track's first event within `data`
    pub start: u32,
}

impl TrackSource {
    /// A standalone stream starting at offset 0.
    pub fn from_bytes(bytes: &[u8]) -> Self {
        Self {
            data: Arc::from(bytes),
            base_address: 0,
            start: 0,
        }
    }

    /// A track starting at `start` inside a shared blob.
    pub fn shared(data: Arc<[u8]>, base_address: u32, start: u32) -> Self {
        Self { data, base_address, start }
    }
}

/// An immutable, loaded song.
#[derive(Clone, Debug)]
pub struct Song {
    /// Index in the song table it was loaded from
    pub index: usize,
    /// Opcode table and driver constants
    pub format: EngineFormat,
    /// Tempo (BPM) at the start
    pub initial_tempo: u16,
    /// Track event streams in track order
    pub tracks: Vec<TrackSource>,
    /// Programs and samples
    pub bank: Arc<InstrumentBank>,
}

impl Song {
    /// Create an empty song using the format's default tempo.
    pub fn new(format: EngineFormat, bank: InstrumentBank) -> Self {
        Self {
            index: 0,
            format,
            initial_tempo: format.profile().default_tempo,
            tracks: Vec::new(),
            bank: Arc::new(bank),
        }
    }

    /// Builder: set the starting tempo.
    pub fn with_tempo(mut self, bpm: u16) -> Self {
        self.initial_tempo = bpm;
        self
    }

    /// Append a track.
    pub fn add_track(&mut self, source: TrackSource) -> usize {
        self.tracks.push(source);
        self.tracks.len() - 1
    }
}

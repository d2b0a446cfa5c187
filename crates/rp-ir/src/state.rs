//! Playback state machines shared by the engine and its hosts.

/// Transport state of the loaded song.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum PlaybackState {
    #[default]
    Stopped,
    Playing,
    Paused,
}

/// Lifecycle of one track's interpreter.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum TrackState {
    /// Loaded, cursor at the start, not ticked yet.
    #[default]
    Idle,
    /// Interpreting events.
    Running,
    /// Inside a loop body, or replaying after a backward jump.
    Looping,
    /// End of track, stream exhausted, or a decode error.
    Finished,
}

/// What `pause` does to sounding voices.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum PausePolicy {
    /// Keep voices; they resume where they were.
    #[default]
    Sustain,
    /// Cut every voice immediately.
    CutVoices,
}

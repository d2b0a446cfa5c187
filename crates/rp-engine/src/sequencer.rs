//! Sequencer: owns the loaded song's tracks and drives them in tick lockstep.
//!
//! Timing is an integer accumulator: every output frame adds
//! `tempo * ticks_per_quarter`, and a tick fires at the start of a frame
//! once the accumulator has reached `sample_rate * 60`. Envelopes step on
//! their own frame counter at the format's driver rate.

use alloc::sync::Arc;
use alloc::vec::Vec;
use rp_ir::{EngineFormat, FormatProfile, InstrumentBank, PausePolicy, PlaybackState, Song};

use crate::error::SongError;
use crate::frame::Frame;
use crate::mixer::Mixer;
use crate::notification::{Notification, Notifications};
use crate::snapshot::{SongSnapshot, TrackSnapshot, MAX_TRACKS};
use crate::track::{TickEnv, Track};
use crate::voice_pool::VoicePool;

/// Commands a track may run in one tick before it is failed.
pub const DEFAULT_COMMAND_LIMIT: u32 = 1000;

/// Furthest tick a seek replays to; about 90 minutes at 120 BPM and 24 ppq.
pub const DEFAULT_MAX_SEEK_TICKS: u64 = 1 << 18;

/// Engine settings chosen by the host.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct EngineConfig {
    /// Output rate in Hz
    pub sample_rate: u32,
    /// Per-track, per-tick command ceiling
    pub command_limit: u32,
    /// End the song after this many loops; `None` loops forever
    pub loop_limit: Option<u32>,
    /// Seek targets are clamped to this tick
    pub max_seek_ticks: u64,
    /// 0.0..=1.0
    pub master_volume: f32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            sample_rate: 48000,
            command_limit: DEFAULT_COMMAND_LIMIT,
            loop_limit: None,
            max_seek_ticks: DEFAULT_MAX_SEEK_TICKS,
            master_volume: 1.0,
        }
    }
}

impl EngineConfig {
    pub fn with_sample_rate(mut self, sample_rate: u32) -> Self {
        self.sample_rate = sample_rate.max(1);
        self
    }

    pub fn with_loop_limit(mut self, loops: Option<u32>) -> Self {
        self.loop_limit = loops;
        self
    }

    pub fn with_max_seek_ticks(mut self, ticks: u64) -> Self {
        self.max_seek_ticks = ticks;
        self
    }
}

/// The top-level playback state machine.
pub struct Sequencer {
    config: EngineConfig,
    format: EngineFormat,
    profile: FormatProfile,
    song_index: Option<usize>,
    bank: Arc<InstrumentBank>,
    tracks: Vec<Track>,
    pool: VoicePool,
    mixer: Mixer,
    notifications: Notifications,
    state: PlaybackState,
    initial_tempo: u16,
    tempo: u16,
    /// Ticks played since the song start
    tick: u64,
    tick_acc: u64,
    envelope_counter: u32,
    envelope_period: u32,
    song_loops: u32,
}

impl Sequencer {
    /// An empty sequencer; renders silence until a song is loaded.
    pub fn new(config: EngineConfig) -> Self {
        let config = EngineConfig { sample_rate: config.sample_rate.max(1), ..config };
        let format = EngineFormat::M4a;
        let profile = format.profile();
        Self {
            config,
            format,
            profile,
            song_index: None,
            bank: Arc::new(InstrumentBank::new()),
            tracks: Vec::new(),
            pool: VoicePool::new(profile.max_voices),
            mixer: Mixer::new(config.master_volume),
            notifications: Notifications::new(),
            state: PlaybackState::Stopped,
            initial_tempo: profile.default_tempo,
            tempo: profile.default_tempo,
            tick: 0,
            tick_acc: 0,
            envelope_counter: 0,
            envelope_period: profile.envelope_step_frames(config.sample_rate),
            song_loops: 0,
        }
    }

    /// Replace the current song. On error nothing changes.
    pub fn load(&mut self, song: &Song) -> Result<(), SongError> {
        if song.tracks.is_empty() {
            return Err(SongError::NoTracks);
        }
        if song.tracks.len() > MAX_TRACKS {
            return Err(SongError::TooManyTracks { count: song.tracks.len(), max: MAX_TRACKS });
        }

        self.pool.kill_all();
        self.format = song.format;
        self.profile = song.format.profile();
        self.song_index = Some(song.index);
        self.bank = Arc::clone(&song.bank);
        self.tracks = song
            .tracks
            .iter()
            .enumerate()
            .map(|(i, source)| Track::for_format(i as u8, source.clone(), song.format))
            .collect();
        self.pool = VoicePool::new(self.profile.max_voices);
        self.envelope_period = self.profile.envelope_step_frames(self.config.sample_rate);
        self.initial_tempo = song.initial_tempo.max(1);
        self.state = PlaybackState::Stopped;
        self.rewind();

        tracing::debug!(
            index = song.index,
            format = song.format.name(),
            tracks = self.tracks.len(),
            tempo = self.initial_tempo,
            "song loaded"
        );
        Ok(())
    }

    /// Start or resume. A song that ran to its end starts over.
    pub fn play(&mut self) {
        match self.state {
            PlaybackState::Playing => {}
            PlaybackState::Paused => self.state = PlaybackState::Playing,
            PlaybackState::Stopped => {
                if self.tracks.is_empty() {
                    return;
                }
                if self.tracks.iter().all(Track::is_finished) {
                    self.rewind();
                }
                // First tick lands on the next frame.
                self.tick_acc = self.tick_threshold();
                self.state = PlaybackState::Playing;
            }
        }
    }

    /// Hold position. With `CutVoices` every voice is silenced at once.
    pub fn pause(&mut self, policy: PausePolicy) {
        if self.state != PlaybackState::Playing {
            return;
        }
        self.state = PlaybackState::Paused;
        if policy == PausePolicy::CutVoices {
            self.cut_voices();
        }
    }

    /// Stop and return to the song start.
    pub fn stop(&mut self) {
        self.state = PlaybackState::Stopped;
        self.rewind();
    }

    /// Jump to an absolute tick by replaying the song silently. Returns the
    /// tick reached, which is earlier when the song ends first or the target
    /// lies past `max_seek_ticks`.
    pub fn seek(&mut self, tick: u64) -> u64 {
        let tick = tick.min(self.config.max_seek_ticks);
        let resume = self.state;
        self.rewind();
        self.state = PlaybackState::Playing;
        while self.tick < tick && self.state == PlaybackState::Playing {
            self.run_tick(false);
            self.cut_voices();
        }
        if self.state == PlaybackState::Playing {
            self.state = resume;
        }
        self.tick_acc = self.tick_threshold();
        self.tick
    }

    /// Fill `out` with the next frames. Silence unless playing.
    pub fn advance(&mut self, out: &mut [Frame]) {
        for frame in out {
            *frame = self.next_frame();
        }
    }

    /// Fill an interleaved stereo buffer. A trailing odd sample is zeroed.
    pub fn advance_interleaved(&mut self, out: &mut [i16]) {
        let mut chunks = out.chunks_exact_mut(2);
        for pair in &mut chunks {
            let frame = self.next_frame();
            pair[0] = frame.left;
            pair[1] = frame.right;
        }
        for sample in chunks.into_remainder() {
            *sample = 0;
        }
    }

    fn next_frame(&mut self) -> Frame {
        if self.state != PlaybackState::Playing {
            return Frame::silence();
        }

        let threshold = self.tick_threshold();
        while self.tick_acc >= threshold {
            self.tick_acc -= threshold;
            self.run_tick(true);
            if self.state != PlaybackState::Playing {
                return Frame::silence();
            }
        }

        let frame = self.mixer.mix_frame(&mut self.pool, &self.bank);
        self.tick_acc += self.tempo as u64 * self.profile.ticks_per_quarter as u64;

        self.envelope_counter += 1;
        if self.envelope_counter >= self.envelope_period {
            self.envelope_counter = 0;
            self.pool.step_envelopes();
            self.pool.reap_finished();
        }
        frame
    }

    fn tick_threshold(&self) -> u64 {
        self.config.sample_rate as u64 * 60
    }

    fn run_tick(&mut self, notify_loops: bool) {
        let Self { tracks, pool, bank, notifications, tempo, config, .. } = self;
        let mut env = TickEnv {
            pool,
            bank: &**bank,
            sample_rate: config.sample_rate,
            command_limit: config.command_limit,
            tempo,
            notifications,
        };
        for track in tracks.iter_mut() {
            track.tick(&mut env);
        }
        self.tick += 1;

        if self.tracks.iter().all(Track::is_finished) {
            self.wrap_or_end();
        } else {
            self.count_song_loops(notify_loops);
        }
    }

    /// Every track ran out: restart at loop points, or end the song.
    fn wrap_or_end(&mut self) {
        let mut restarted = false;
        for track in &mut self.tracks {
            restarted |= track.restart_at_loop_point();
        }
        if !restarted {
            self.end_song();
            return;
        }
        self.song_loops += 1;
        self.notifications.push(Notification::LoopWrapped(self.song_loops));
        self.check_loop_limit();
    }

    fn count_song_loops(&mut self, notify: bool) {
        let loops = self
            .tracks
            .iter()
            .filter(|t| !t.is_finished())
            .map(Track::loop_count)
            .min()
            .unwrap_or(0);
        if loops <= self.song_loops {
            return;
        }
        self.song_loops = loops;
        if notify {
            self.notifications.push(Notification::LoopWrapped(loops));
        }
        self.check_loop_limit();
    }

    fn check_loop_limit(&mut self) {
        if self.config.loop_limit.is_some_and(|limit| self.song_loops >= limit) {
            self.end_song();
        }
    }

    fn end_song(&mut self) {
        self.cut_voices();
        self.state = PlaybackState::Stopped;
        self.notifications.push(Notification::SongEnded);
    }

    fn cut_voices(&mut self) {
        self.pool.kill_all();
        for track in &mut self.tracks {
            track.clear_notes();
        }
    }

    fn rewind(&mut self) {
        self.cut_voices();
        for track in &mut self.tracks {
            track.reset();
        }
        self.tempo = self.initial_tempo;
        self.tick = 0;
        self.tick_acc = 0;
        self.envelope_counter = 0;
        self.song_loops = 0;
    }

    pub fn set_master_volume(&mut self, volume: f32) {
        self.mixer.set_master_volume(volume);
    }

    pub fn master_volume(&self) -> f32 {
        self.mixer.master_volume()
    }

    /// Mute or unmute one track. False when there is no such track.
    pub fn set_track_muted(&mut self, track: usize, muted: bool) -> bool {
        match self.tracks.get_mut(track) {
            Some(t) => {
                t.set_muted(muted, &mut self.pool);
                true
            }
            None => false,
        }
    }

    pub fn pop_notification(&mut self) -> Option<Notification> {
        self.notifications.pop()
    }

    /// Refill `snapshot` with the current state.
    pub fn snapshot_into(&self, snapshot: &mut SongSnapshot) {
        snapshot.state = self.state;
        snapshot.song_index = self.song_index;
        snapshot.format = self.format;
        snapshot.tick = self.tick;
        snapshot.tempo = self.tempo;
        snapshot.master_volume = self.mixer.master_volume();
        snapshot.active_voices = self.pool.active_count();
        snapshot.song_loops = self.song_loops;
        snapshot.tracks.clear();
        for track in &self.tracks {
            snapshot.tracks.push(TrackSnapshot::capture(track, &self.pool));
        }
    }

    pub fn state(&self) -> PlaybackState {
        self.state
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn sample_rate(&self) -> u32 {
        self.config.sample_rate
    }

    pub fn format(&self) -> EngineFormat {
        self.format
    }

    pub fn song_index(&self) -> Option<usize> {
        self.song_index
    }

    pub fn tick(&self) -> u64 {
        self.tick
    }

    pub fn tempo(&self) -> u16 {
        self.tempo
    }

    pub fn song_loops(&self) -> u32 {
        self.song_loops
    }

    pub fn tracks(&self) -> &[Track] {
        &self.tracks
    }

    pub fn active_voices(&self) -> usize {
        self.pool.active_count()
    }

    pub fn voice_capacity(&self) -> usize {
        self.pool.capacity()
    }
}

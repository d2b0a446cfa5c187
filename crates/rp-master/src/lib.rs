//! Host-side controller for the retroplay engine.
//!
//! A [`Session`] lives on the control thread and owns the song source; its
//! [`RenderHandle`] goes to the audio callback. Both share one sequencer
//! behind a mutex. The render side only ever `try_lock`s it and emits
//! silence for that buffer if the control side holds the lock, so the audio
//! callback never blocks. Engine notifications travel back through a
//! lock-free ring buffer.

mod source;
mod wav;

use parking_lot::Mutex;
use ringbuf::traits::{Consumer, Producer, Split};
use ringbuf::{HeapCons, HeapProd, HeapRb};
use std::sync::Arc;
use thiserror::Error;

pub use rp_engine::{
    EngineConfig, Frame, Notification, Sequencer, SongError, SongSnapshot, TrackSnapshot,
    NOTIFICATION_CAPACITY,
};
pub use rp_formats::{FormatError, M4aRom};
pub use rp_ir::{PausePolicy, PlaybackState, Song};

pub use source::{SongList, SongSource};
pub use wav::{frames_to_wav, write_wav};

/// Why a song could not be loaded into a session.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum LoadError {
    #[error("song {index} out of range ({count} songs)")]
    IndexOutOfRange { index: usize, count: usize },
    #[error(transparent)]
    Song(#[from] SongError),
    #[error(transparent)]
    Format(#[from] FormatError),
}

/// Frames rendered per step when rendering offline.
const RENDER_BLOCK: usize = 1024;

type SongEndHandler = Box<dyn FnMut(Notification) + Send>;

/// Control-thread side of a playback session.
pub struct Session {
    source: Box<dyn SongSource + Send>,
    shared: Arc<Mutex<Sequencer>>,
    notifications: HeapCons<Notification>,
    song_end_handler: Option<SongEndHandler>,
}

/// Audio-thread side of a playback session.
pub struct RenderHandle {
    shared: Arc<Mutex<Sequencer>>,
    notifications: HeapProd<Notification>,
}

impl Session {
    pub fn new(
        source: impl SongSource + Send + 'static,
        config: EngineConfig,
    ) -> (Self, RenderHandle) {
        let shared = Arc::new(Mutex::new(Sequencer::new(config)));
        let (prod, cons) = HeapRb::<Notification>::new(NOTIFICATION_CAPACITY * 2).split();
        let session = Self {
            source: Box::new(source),
            shared: Arc::clone(&shared),
            notifications: cons,
            song_end_handler: None,
        };
        (session, RenderHandle { shared, notifications: prod })
    }

    pub fn song_count(&self) -> usize {
        self.source.song_count()
    }

    /// Decode song `index` and hand it to the engine, replacing whatever
    /// was loaded. On error the current song is left untouched.
    pub fn load_song(&mut self, index: usize) -> Result<(), LoadError> {
        let count = self.source.song_count();
        if index >= count {
            return Err(LoadError::IndexOutOfRange { index, count });
        }
        let song = self.source.load(index).inspect_err(|e| {
            tracing::warn!(index, error = %e, "song failed to load");
        })?;
        self.shared.lock().load(&song)?;
        tracing::info!(index, tracks = song.tracks.len(), format = ?song.format, "song loaded");
        Ok(())
    }

    pub fn play(&self) {
        self.shared.lock().play();
    }

    pub fn pause(&self, policy: PausePolicy) {
        self.shared.lock().pause(policy);
    }

    pub fn stop(&self) {
        self.shared.lock().stop();
    }

    /// Jump to `tick`; returns the tick actually reached.
    pub fn seek(&self, tick: u64) -> u64 {
        self.shared.lock().seek(tick)
    }

    pub fn set_master_volume(&self, volume: f32) {
        self.shared.lock().set_master_volume(volume);
    }

    pub fn set_track_muted(&self, track: usize, muted: bool) -> bool {
        self.shared.lock().set_track_muted(track, muted)
    }

    pub fn state(&self) -> PlaybackState {
        self.shared.lock().state()
    }

    /// Refill `snapshot` without waiting. Returns `false` (leaving it as it
    /// was) when the render side holds the engine.
    pub fn try_snapshot(&self, snapshot: &mut SongSnapshot) -> bool {
        match self.shared.try_lock() {
            Some(seq) => {
                seq.snapshot_into(snapshot);
                true
            }
            None => false,
        }
    }

    /// Called for every `SongEnded` and `LoopWrapped`.
    pub fn set_song_end_handler(&mut self, handler: impl FnMut(Notification) + Send + 'static) {
        self.song_end_handler = Some(Box::new(handler));
    }

    /// Drain pending notifications, log them and run the song end handler.
    ///
    /// Events raised by control calls (a seek that runs off the end, say)
    /// are picked up here too when the engine is free.
    pub fn poll_notifications(&mut self) -> Vec<Notification> {
        let mut pending: Vec<Notification> = self.notifications.pop_iter().collect();
        if let Some(mut seq) = self.shared.try_lock() {
            while let Some(n) = seq.pop_notification() {
                pending.push(n);
            }
        }
        for n in &pending {
            match *n {
                Notification::SongEnded => tracing::info!("song ended"),
                Notification::LoopWrapped(loops) => tracing::debug!(loops, "song looped"),
                Notification::TrackFailed { track, error } => {
                    tracing::error!(track, %error, "track stopped");
                }
                Notification::ResourceMissing { track, error } => {
                    tracing::warn!(track, %error, "note skipped");
                }
            }
            if matches!(n, Notification::SongEnded | Notification::LoopWrapped(_)) {
                if let Some(handler) = self.song_end_handler.as_mut() {
                    handler(*n);
                }
            }
        }
        pending
    }
}

impl RenderHandle {
    /// Fill an interleaved stereo buffer. Never blocks.
    pub fn render(&mut self, out: &mut [i16]) {
        #[cfg(feature = "alloc_check")]
        assert_no_alloc::assert_no_alloc(|| self.render_interleaved(out));
        #[cfg(not(feature = "alloc_check"))]
        self.render_interleaved(out);
    }

    /// Fill a frame buffer. Never blocks.
    pub fn render_frames(&mut self, out: &mut [Frame]) {
        #[cfg(feature = "alloc_check")]
        assert_no_alloc::assert_no_alloc(|| self.render_into_frames(out));
        #[cfg(not(feature = "alloc_check"))]
        self.render_into_frames(out);
    }

    fn render_interleaved(&mut self, out: &mut [i16]) {
        let Some(mut seq) = self.shared.try_lock() else {
            out.fill(0);
            return;
        };
        seq.advance_interleaved(out);
        forward_notifications(&mut seq, &mut self.notifications);
    }

    fn render_into_frames(&mut self, out: &mut [Frame]) {
        let Some(mut seq) = self.shared.try_lock() else {
            out.fill(Frame::silence());
            return;
        };
        seq.advance(out);
        forward_notifications(&mut seq, &mut self.notifications);
    }
}

fn forward_notifications(seq: &mut Sequencer, prod: &mut HeapProd<Notification>) {
    while let Some(n) = seq.pop_notification() {
        // a full ring means the control side stopped polling; drop the event
        let _ = prod.try_push(n);
    }
}

/// Render song `index` offline until it ends or `max_seconds` pass.
pub fn render_frames(
    source: &dyn SongSource,
    index: usize,
    config: EngineConfig,
    max_seconds: u32,
) -> Result<Vec<Frame>, LoadError> {
    let count = source.song_count();
    if index >= count {
        return Err(LoadError::IndexOutOfRange { index, count });
    }
    let song = source.load(index)?;
    let max_frames = config.sample_rate as usize * max_seconds as usize;
    let mut seq = Sequencer::new(config);
    seq.load(&song)?;
    seq.play();

    let mut frames = Vec::with_capacity(max_frames.min(config.sample_rate as usize * 60));
    let mut block = [Frame::silence(); RENDER_BLOCK];
    while frames.len() < max_frames && seq.state() == PlaybackState::Playing {
        let n = (max_frames - frames.len()).min(RENDER_BLOCK);
        seq.advance(&mut block[..n]);
        frames.extend_from_slice(&block[..n]);
    }
    tracing::debug!(index, frames = frames.len(), loops = seq.song_loops(), "offline render done");
    Ok(frames)
}

/// Render song `index` offline and encode it as WAV.
///
/// `loops` caps how many times a looping song repeats; `None` plays until
/// the time limit.
pub fn render_to_wav(
    source: &dyn SongSource,
    index: usize,
    sample_rate: u32,
    loops: Option<u32>,
    max_seconds: u32,
) -> Result<Vec<u8>, LoadError> {
    let config = EngineConfig::default()
        .with_sample_rate(sample_rate)
        .with_loop_limit(loops);
    let frames = render_frames(source, index, config, max_seconds)?;
    Ok(frames_to_wav(&frames, sample_rate))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rp_ir::{
        DutyCycle, EngineFormat, Instrument, InstrumentBank, Program, TrackSource, VoiceSource,
    };
    use std::sync::atomic::{AtomicU32, Ordering};

    // TIE Cn4 v100, W04, EOT, FINE
    const FOUR_TICKS: &[u8] = &[0xCF, 60, 100, 0x84, 0xCE, 0xB1];
    // W01, GOTO 0
    const ENDLESS: &[u8] = &[0x81, 0xB2, 0, 0, 0, 0];

    fn song(track: &[u8]) -> Song {
        let mut bank = InstrumentBank::new();
        bank.set_program(
            0,
            Program::Single(Instrument::new("sq", VoiceSource::Square(DutyCycle::Half))),
        );
        let mut song = Song::new(EngineFormat::M4a, bank).with_tempo(120);
        song.add_track(TrackSource::from_bytes(track));
        song
    }

    fn session() -> (Session, RenderHandle) {
        let source = SongList::new(vec![song(FOUR_TICKS), song(ENDLESS)]);
        Session::new(source, EngineConfig::default())
    }

    #[test]
    fn load_out_of_range_keeps_current_song() {
        let (mut session, _render) = session();
        session.load_song(0).unwrap();
        let err = session.load_song(9).unwrap_err();
        assert_eq!(err, LoadError::IndexOutOfRange { index: 9, count: 2 });
        let mut snap = SongSnapshot::new();
        assert!(session.try_snapshot(&mut snap));
        assert_eq!(snap.song_index, Some(0));
    }

    #[test]
    fn render_produces_audio_while_playing() {
        let (mut session, mut render) = session();
        session.load_song(0).unwrap();
        session.play();
        let mut buf = vec![0i16; 512];
        render.render(&mut buf);
        assert!(buf.iter().any(|&s| s != 0));
    }

    #[test]
    fn render_is_silent_while_control_holds_the_engine() {
        let (mut session, mut render) = session();
        session.load_song(0).unwrap();
        session.play();
        let guard = session.shared.lock();
        let mut buf = vec![1i16; 256];
        render.render(&mut buf);
        assert!(buf.iter().all(|&s| s == 0));
        assert_eq!(guard.tick(), 0);
    }

    #[test]
    fn snapshot_fails_without_blocking_while_rendering_holds_the_engine() {
        let (session, render) = session();
        let _guard = render.shared.lock();
        let mut snap = SongSnapshot::new();
        assert!(!session.try_snapshot(&mut snap));
    }

    #[test]
    fn notifications_reach_the_song_end_handler_once() {
        let (mut session, mut render) = session();
        let ended = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&ended);
        session.set_song_end_handler(move |n| {
            if n == Notification::SongEnded {
                counter.fetch_add(1, Ordering::Relaxed);
            }
        });
        session.load_song(0).unwrap();
        session.play();
        let mut buf = vec![Frame::silence(); 6000];
        render.render_frames(&mut buf);
        render.render_frames(&mut buf);
        let seen = session.poll_notifications();
        assert_eq!(seen, vec![Notification::SongEnded]);
        assert_eq!(ended.load(Ordering::Relaxed), 1);
        assert_eq!(session.state(), PlaybackState::Stopped);
        assert!(session.poll_notifications().is_empty());
    }

    #[test]
    fn loop_wraps_are_reported() {
        let (mut session, mut render) = session();
        session.load_song(1).unwrap();
        session.play();
        let mut buf = vec![Frame::silence(); 2001];
        render.render_frames(&mut buf);
        let seen = session.poll_notifications();
        assert_eq!(seen, vec![Notification::LoopWrapped(1), Notification::LoopWrapped(2)]);
    }

    #[test]
    fn seek_past_end_is_reported_on_poll() {
        let (mut session, _render) = session();
        session.load_song(0).unwrap();
        session.play();
        assert_eq!(session.seek(100), 5);
        assert_eq!(session.poll_notifications(), vec![Notification::SongEnded]);
    }

    #[test]
    fn seek_into_endless_song_returns_promptly() {
        let config = EngineConfig::default().with_max_seek_ticks(1000);
        let (mut session, mut render) = Session::new(SongList::new(vec![song(ENDLESS)]), config);
        session.load_song(0).unwrap();
        session.play();
        assert_eq!(session.seek(50_000_000), 1000);
        assert_eq!(session.state(), PlaybackState::Playing);
        let mut snap = SongSnapshot::new();
        assert!(session.try_snapshot(&mut snap));
        assert_eq!(snap.tick, 1000);
        let mut buf = vec![0i16; 512];
        render.render(&mut buf);
        assert!(session.try_snapshot(&mut snap));
        assert!(snap.tick > 1000);
    }

    #[test]
    fn offline_render_stops_at_song_end() {
        let source = SongList::new(vec![song(FOUR_TICKS)]);
        let frames = render_frames(&source, 0, EngineConfig::default(), 10).unwrap();
        assert!(frames.len() >= 4000);
        assert!(frames.len() < 48000);
    }

    #[test]
    fn offline_render_respects_time_limit() {
        let source = SongList::new(vec![song(ENDLESS)]);
        let wav = render_to_wav(&source, 0, 48000, None, 1).unwrap();
        assert_eq!(wav.len(), 44 + 48000 * 4);
    }

    #[test]
    fn offline_render_rejects_bad_index() {
        let source = SongList::default();
        let err = render_to_wav(&source, 0, 48000, Some(1), 1).unwrap_err();
        assert_eq!(err, LoadError::IndexOutOfRange { index: 0, count: 0 });
    }
}

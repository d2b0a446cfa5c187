//! Track: one event stream's interpreter.
//!
//! Each tick counts down timed notes and the pending wait, then executes
//! commands until the next non-zero wait. All state lives in fixed-size
//! buffers so ticking never allocates.

use heapless::Vec as FixedVec;
use rp_ir::{
    Adsr, Command, EnvelopeParam, FormatProfile, InstrumentBank, TrackSource, TrackState,
    VoiceSource,
};

use crate::envelope_state::EnvelopeState;
use crate::error::{DecodeError, ResourceError};
use crate::notification::{Notification, Notifications};
use crate::reader::{reader_for, EventStreamReader, ReaderContext, StreamView};
use crate::voice::Voice;
use crate::voice_pool::{VoiceHandle, VoicePool};

/// Loop/call nesting a track can hold; profiles may allow less.
pub const LOOP_STACK_CAPACITY: usize = 4;

/// Notes one track can hold at once; the oldest is released to make room.
pub const MAX_TRACK_NOTES: usize = 16;

const DEFAULT_VOLUME: u8 = 100;
const DEFAULT_EXPRESSION: u8 = 127;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum LoopKind {
    /// Body at `target`, resumes at `resume` when done.
    Call { resume: u32 },
    /// Body starts right after the `LoopStart`.
    InPlace,
}

#[derive(Clone, Copy, Debug)]
struct LoopFrame {
    kind: LoopKind,
    target: u32,
    /// Passes left including the current one; `None` repeats forever.
    remaining: Option<u8>,
}

#[derive(Clone, Copy, Debug)]
struct ActiveNote {
    handle: VoiceHandle,
    key: u8,
    /// Ticks until release; `None` holds until note-off.
    remaining: Option<u32>,
}

/// What the command loop does after one command.
enum Flow {
    Continue,
    Yield,
    Stop,
}

/// Shared state a track needs while ticking.
pub(crate) struct TickEnv<'a> {
    pub pool: &'a mut VoicePool,
    pub bank: &'a InstrumentBank,
    pub sample_rate: u32,
    pub command_limit: u32,
    pub tempo: &'a mut u16,
    pub notifications: &'a mut Notifications,
}

/// Per-track sequencing state.
pub struct Track {
    index: u8,
    source: TrackSource,
    reader: &'static dyn EventStreamReader,
    ctx: ReaderContext,
    profile: FormatProfile,
    state: TrackState,
    cursor: usize,
    wait: u32,
    loop_stack: FixedVec<LoopFrame, LOOP_STACK_CAPACITY>,
    notes: FixedVec<ActiveNote, MAX_TRACK_NOTES>,
    program: u8,
    volume: u8,
    expression: u8,
    pan: i8,
    bend: i16,
    bend_range: u8,
    transpose: i8,
    envelope_override: [Option<u8>; 4],
    /// Times the pending `Repeat` has been reached.
    repeat_count: u8,
    loop_count: u32,
    loop_point: Option<u32>,
    muted: bool,
    error: Option<DecodeError>,
}

impl Track {
    pub fn new(
        index: u8,
        source: TrackSource,
        profile: FormatProfile,
        reader: &'static dyn EventStreamReader,
    ) -> Self {
        let cursor = source.start as usize;
        Self {
            index,
            source,
            reader,
            ctx: ReaderContext::new(),
            profile,
            state: TrackState::Idle,
            cursor,
            wait: 0,
            loop_stack: FixedVec::new(),
            notes: FixedVec::new(),
            program: 0,
            volume: DEFAULT_VOLUME,
            expression: DEFAULT_EXPRESSION,
            pan: 0,
            bend: 0,
            bend_range: profile.default_bend_range,
            transpose: 0,
            envelope_override: [None; 4],
            repeat_count: 0,
            loop_count: 0,
            loop_point: None,
            muted: false,
            error: None,
        }
    }

    /// Track for `format`'s opcode table.
    pub fn for_format(index: u8, source: TrackSource, format: rp_ir::EngineFormat) -> Self {
        Self::new(index, source, format.profile(), reader_for(format))
    }

    pub fn index(&self) -> u8 {
        self.index
    }

    pub fn state(&self) -> TrackState {
        self.state
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn program(&self) -> u8 {
        self.program
    }

    pub fn volume(&self) -> u8 {
        self.volume
    }

    pub fn pan(&self) -> i8 {
        self.pan
    }

    pub fn bend(&self) -> i16 {
        self.bend
    }

    /// Backward jumps and infinite loop passes taken so far.
    pub fn loop_count(&self) -> u32 {
        self.loop_count
    }

    pub fn loop_point(&self) -> Option<u32> {
        self.loop_point
    }

    pub fn is_muted(&self) -> bool {
        self.muted
    }

    pub fn error(&self) -> Option<DecodeError> {
        self.error
    }

    pub fn is_finished(&self) -> bool {
        self.state == TrackState::Finished
    }

    /// Keys of notes still sounding.
    pub fn sounding_keys<'a>(&'a self, pool: &'a VoicePool) -> impl Iterator<Item = u8> + 'a {
        self.notes
            .iter()
            .filter(|n| pool.get(n.handle).is_some_and(|v| !v.envelope.is_released()))
            .map(|n| n.key)
    }

    /// Back to the start of the stream with default parameters.
    pub fn reset(&mut self) {
        let muted = self.muted;
        *self = Self::new(self.index, self.source.clone(), self.profile, self.reader);
        self.muted = muted;
    }

    /// Continue from the recorded loop point after the song ran out.
    pub fn restart_at_loop_point(&mut self) -> bool {
        let Some(point) = self.loop_point else {
            return false;
        };
        if self.error.is_some() {
            return false;
        }
        self.cursor = point as usize;
        self.wait = 0;
        self.loop_stack.clear();
        self.repeat_count = 0;
        self.loop_count += 1;
        self.state = TrackState::Looping;
        true
    }

    /// Silence (or unsilence) this track's voices without stopping it.
    pub fn set_muted(&mut self, muted: bool, pool: &mut VoicePool) {
        self.muted = muted;
        for voice in pool.track_voices_mut(self.index) {
            voice.muted = muted;
        }
    }

    /// Drop note bookkeeping (voices were cut elsewhere).
    pub fn clear_notes(&mut self) {
        self.notes.clear();
    }

    /// Release every note this track holds.
    pub fn release_all(&mut self, pool: &mut VoicePool) {
        for note in self.notes.iter() {
            pool.release(note.handle);
        }
        self.notes.clear();
    }

    /// Run one tick.
    pub(crate) fn tick(&mut self, env: &mut TickEnv<'_>) {
        match self.state {
            TrackState::Finished => return,
            TrackState::Idle => self.state = TrackState::Running,
            TrackState::Running | TrackState::Looping => {}
        }

        self.count_down_notes(env.pool);

        if self.wait > 0 {
            self.wait -= 1;
            if self.wait > 0 {
                return;
            }
        }

        let mut executed = 0u32;
        loop {
            if self.cursor >= self.source.data.len() {
                self.finish(env.pool);
                return;
            }
            executed += 1;
            if executed > env.command_limit {
                let error = DecodeError::CommandLimit {
                    limit: env.command_limit,
                    offset: self.cursor,
                };
                self.fail(error, env);
                return;
            }

            let at = self.cursor;
            let view = StreamView::new(&self.source.data, self.source.base_address);
            let decoded = match self.reader.decode(view, at, &mut self.ctx) {
                Ok(d) => d,
                Err(error) => {
                    self.fail(error, env);
                    return;
                }
            };
            self.cursor = at + decoded.length;

            match self.execute(decoded.command, at, env) {
                Flow::Continue => {}
                Flow::Yield | Flow::Stop => return,
            }
        }
    }

    fn execute(&mut self, command: Command, at: usize, env: &mut TickEnv<'_>) -> Flow {
        match command {
            Command::NoteOn { key, velocity, duration } => {
                self.note_on(key, velocity, duration, env);
            }
            Command::NoteOff { key } => self.note_off(key, env.pool),
            Command::SetInstrument(program) => self.program = program,
            Command::SetVolume(volume) => {
                self.volume = volume;
                self.update_mix(env.pool);
            }
            Command::SetExpression(expression) => {
                self.expression = expression;
                self.update_mix(env.pool);
            }
            Command::SetPan(pan) => {
                self.pan = pan;
                self.update_mix(env.pool);
            }
            Command::PitchBend(bend) => {
                self.bend = bend;
                self.update_pitch(env);
            }
            Command::BendRange(range) => {
                self.bend_range = range;
                self.update_pitch(env);
            }
            Command::Transpose(semitones) => self.transpose = semitones,
            Command::Tempo(bpm) => *env.tempo = bpm.max(1),
            Command::Wait(0) => {}
            Command::Wait(ticks) => {
                self.wait = ticks;
                return Flow::Yield;
            }
            Command::Jump(target) => {
                if target as usize <= at {
                    self.loop_count += 1;
                }
                self.cursor = target as usize;
            }
            Command::Loop { target, count } => {
                let frame = LoopFrame {
                    kind: LoopKind::Call { resume: self.cursor as u32 },
                    target,
                    remaining: count,
                };
                if let Err(error) = self.push_loop(frame, at) {
                    self.fail(error, env);
                    return Flow::Stop;
                }
                self.cursor = target as usize;
            }
            Command::Return => self.return_from_call(),
            Command::Repeat { target, count } => {
                self.repeat_count += 1;
                if self.repeat_count < count {
                    self.cursor = target as usize;
                } else {
                    self.repeat_count = 0;
                }
            }
            Command::LoopStart(count) => {
                let frame = LoopFrame {
                    kind: LoopKind::InPlace,
                    target: self.cursor as u32,
                    remaining: count,
                };
                if let Err(error) = self.push_loop(frame, at) {
                    self.fail(error, env);
                    return Flow::Stop;
                }
            }
            Command::LoopEnd => self.end_in_place_loop(),
            Command::LoopPoint => self.loop_point = Some(self.cursor as u32),
            Command::Envelope(param, value) => {
                let slot = match param {
                    EnvelopeParam::Attack => 0,
                    EnvelopeParam::Decay => 1,
                    EnvelopeParam::Sustain => 2,
                    EnvelopeParam::Release => 3,
                };
                self.envelope_override[slot] = Some(value);
            }
            Command::Nop => {}
            Command::EndOfTrack => {
                self.finish(env.pool);
                return Flow::Stop;
            }
        }
        self.refresh_state();
        Flow::Continue
    }

    fn push_loop(&mut self, frame: LoopFrame, at: usize) -> Result<(), DecodeError> {
        let depth = (self.profile.loop_stack_depth as usize).min(LOOP_STACK_CAPACITY);
        if self.loop_stack.len() >= depth {
            return Err(DecodeError::LoopStackOverflow { offset: at });
        }
        self.loop_stack
            .push(frame)
            .map_err(|_| DecodeError::LoopStackOverflow { offset: at })
    }

    /// End of one pass through a called body.
    fn return_from_call(&mut self) {
        // In-place loops left open inside the body are abandoned.
        while let Some(top) = self.loop_stack.last() {
            if matches!(top.kind, LoopKind::Call { .. }) {
                break;
            }
            self.loop_stack.pop();
        }
        let Some(top) = self.loop_stack.last_mut() else {
            return;
        };
        let LoopKind::Call { resume } = top.kind else {
            return;
        };
        match top.remaining {
            Some(n) if n > 1 => {
                top.remaining = Some(n - 1);
                self.cursor = top.target as usize;
            }
            Some(_) => {
                self.loop_stack.pop();
                self.cursor = resume as usize;
            }
            None => {
                self.cursor = top.target as usize;
                self.loop_count += 1;
            }
        }
    }

    fn end_in_place_loop(&mut self) {
        let Some(top) = self.loop_stack.last_mut() else {
            return;
        };
        if top.kind != LoopKind::InPlace {
            return;
        }
        match top.remaining {
            Some(n) if n > 1 => {
                top.remaining = Some(n - 1);
                self.cursor = top.target as usize;
            }
            Some(_) => {
                self.loop_stack.pop();
            }
            None => {
                self.cursor = top.target as usize;
                self.loop_count += 1;
            }
        }
    }

    fn refresh_state(&mut self) {
        if self.state == TrackState::Finished {
            return;
        }
        self.state = if self.loop_stack.is_empty() && self.loop_count == 0 {
            TrackState::Running
        } else {
            TrackState::Looping
        };
    }

    fn note_on(&mut self, key: u8, velocity: u8, duration: Option<u32>, env: &mut TickEnv<'_>) {
        let key = (key as i16 + self.transpose as i16).clamp(0, 127) as u8;
        let bank = env.bank;
        let Some((instrument, sounding_key)) = bank.resolve(self.program, key) else {
            let missing = ResourceError::MissingInstrument { program: self.program, key };
            self.report_missing(missing, env);
            return;
        };
        let rate = match instrument.source {
            VoiceSource::Pcm(sample) | VoiceSource::Wave(sample) => match bank.sample(sample) {
                Some(s) => s.rate,
                None => {
                    let missing = ResourceError::MissingSample { program: self.program };
                    self.report_missing(missing, env);
                    return;
                }
            },
            VoiceSource::Square(_) | VoiceSource::Noise(_) => 0,
        };

        let adsr = self.apply_envelope_override(instrument.adsr);
        let envelope = EnvelopeState::new(self.profile.envelope_model, adsr);
        let mut voice =
            Voice::new(instrument, rate, self.index, key, sounding_key, velocity, envelope);
        voice.retune(self.bend, self.bend_range, env.sample_rate);
        voice.set_mix(self.mix_volume(), self.pan);
        voice.muted = self.muted;

        if self.notes.is_full() {
            let oldest = self.notes.remove(0);
            env.pool.release(oldest.handle);
        }
        let handle = env.pool.allocate(voice);
        let _ = self.notes.push(ActiveNote {
            handle,
            key,
            remaining: duration.map(|d| d.max(1)),
        });
    }

    fn note_off(&mut self, key: Option<u8>, pool: &mut VoicePool) {
        let mut i = 0;
        while i < self.notes.len() {
            let note = self.notes[i];
            let matches = note.remaining.is_none() && key.map_or(true, |k| k == note.key);
            if matches {
                pool.release(note.handle);
                self.notes.remove(i);
            } else {
                i += 1;
            }
        }
    }

    /// Release timed notes whose duration ran out; forget reclaimed voices.
    fn count_down_notes(&mut self, pool: &mut VoicePool) {
        let mut i = 0;
        while i < self.notes.len() {
            let note = &mut self.notes[i];
            let expired = match note.remaining.as_mut() {
                Some(ticks) => {
                    *ticks -= 1;
                    *ticks == 0
                }
                None => false,
            };
            let handle = note.handle;
            if expired || pool.get(handle).is_none() {
                pool.release(handle);
                self.notes.remove(i);
            } else {
                i += 1;
            }
        }
    }

    fn apply_envelope_override(&self, adsr: Adsr) -> Adsr {
        let params = [
            EnvelopeParam::Attack,
            EnvelopeParam::Decay,
            EnvelopeParam::Sustain,
            EnvelopeParam::Release,
        ];
        params
            .iter()
            .zip(self.envelope_override.iter())
            .fold(adsr, |adsr, (param, value)| match value {
                Some(v) => adsr.with(*param, *v),
                None => adsr,
            })
    }

    /// Volume times expression, 0-127.
    fn mix_volume(&self) -> u8 {
        ((self.volume as u32 * self.expression as u32) / 127) as u8
    }

    fn update_mix(&mut self, pool: &mut VoicePool) {
        let volume = self.mix_volume();
        for voice in pool.track_voices_mut(self.index) {
            voice.set_mix(volume, self.pan);
        }
    }

    fn update_pitch(&mut self, env: &mut TickEnv<'_>) {
        for voice in env.pool.track_voices_mut(self.index) {
            voice.retune(self.bend, self.bend_range, env.sample_rate);
        }
    }

    fn report_missing(&self, error: ResourceError, env: &mut TickEnv<'_>) {
        env.notifications.push(Notification::ResourceMissing { track: self.index, error });
    }

    fn finish(&mut self, pool: &mut VoicePool) {
        self.release_all(pool);
        self.loop_stack.clear();
        self.state = TrackState::Finished;
    }

    fn fail(&mut self, error: DecodeError, env: &mut TickEnv<'_>) {
        self.error = Some(error);
        self.finish(env.pool);
        env.notifications.push(Notification::TrackFailed { track: self.index, error });
    }
}

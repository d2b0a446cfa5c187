//! VoicePool: fixed-capacity voice allocation and lifecycle management.

use alloc::vec::Vec;
use rp_ir::{InstrumentBank, PsgChannel};

use crate::voice::Voice;

/// Identifies one allocation. A handle outlives its voice harmlessly: once
/// the slot is reused the serial no longer matches and lookups miss.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct VoiceHandle {
    slot: u16,
    serial: u64,
}

impl VoiceHandle {
    /// Slot index inside the pool.
    pub fn slot(&self) -> usize {
        self.slot as usize
    }
}

#[derive(Clone, Debug)]
struct Slot {
    voice: Voice,
    serial: u64,
}

/// Pool of voices with a hard capacity.
pub struct VoicePool {
    /// Voice slots (None = free).
    slots: Vec<Option<Slot>>,
    next_serial: u64,
}

impl VoicePool {
    /// Create an empty pool with `capacity` slots.
    pub fn new(capacity: usize) -> Self {
        Self {
            slots: (0..capacity.clamp(1, u16::MAX as usize)).map(|_| None).collect(),
            next_serial: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Allocate a slot for `voice`.
    ///
    /// A voice bound to a PSG channel replaces whatever holds that channel.
    /// Otherwise a free slot is used, and when none is left a victim is cut:
    /// released voices before sustaining ones, oldest first.
    pub fn allocate(&mut self, voice: Voice) -> VoiceHandle {
        let slot = voice
            .psg_channel
            .and_then(|ch| self.find_channel(ch))
            .or_else(|| self.slots.iter().position(|s| s.is_none()))
            .unwrap_or_else(|| self.find_steal_candidate());
        let serial = self.next_serial;
        self.next_serial += 1;
        self.slots[slot] = Some(Slot { voice, serial });
        VoiceHandle { slot: slot as u16, serial }
    }

    fn find_channel(&self, channel: PsgChannel) -> Option<usize> {
        self.slots.iter().position(|s| {
            s.as_ref().is_some_and(|s| s.voice.psg_channel == Some(channel))
        })
    }

    /// Slot to cut when the pool is full.
    fn find_steal_candidate(&self) -> usize {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(i, slot)| {
                slot.as_ref()
                    .map(|s| (i, (!s.voice.envelope.is_released(), s.serial)))
            })
            .min_by_key(|(_, priority)| *priority)
            .map(|(i, _)| i)
            .unwrap_or(0)
    }

    /// Get a reference to a voice.
    pub fn get(&self, handle: VoiceHandle) -> Option<&Voice> {
        match self.slots.get(handle.slot as usize) {
            Some(Some(s)) if s.serial == handle.serial => Some(&s.voice),
            _ => None,
        }
    }

    /// Get a mutable reference to a voice.
    pub fn get_mut(&mut self, handle: VoiceHandle) -> Option<&mut Voice> {
        match self.slots.get_mut(handle.slot as usize) {
            Some(Some(s)) if s.serial == handle.serial => Some(&mut s.voice),
            _ => None,
        }
    }

    /// Start the release phase. The voice keeps sounding until its
    /// envelope finishes.
    pub fn release(&mut self, handle: VoiceHandle) {
        if let Some(voice) = self.get_mut(handle) {
            voice.envelope.release();
        }
    }

    /// Remove a voice immediately.
    pub fn kill(&mut self, handle: VoiceHandle) {
        if let Some(slot) = self.slots.get_mut(handle.slot as usize) {
            if slot.as_ref().is_some_and(|s| s.serial == handle.serial) {
                *slot = None;
            }
        }
    }

    /// Remove every voice.
    pub fn kill_all(&mut self) {
        for slot in &mut self.slots {
            *slot = None;
        }
    }

    /// Voices owned by `track`.
    pub fn track_voices_mut(&mut self, track: u8) -> impl Iterator<Item = &mut Voice> {
        self.slots
            .iter_mut()
            .flatten()
            .map(|s| &mut s.voice)
            .filter(move |v| v.track == track)
    }

    /// Active voices.
    pub fn iter(&self) -> impl Iterator<Item = &Voice> {
        self.slots.iter().flatten().map(|s| &s.voice)
    }

    /// Advance every envelope one step.
    pub fn step_envelopes(&mut self) {
        for s in self.slots.iter_mut().flatten() {
            s.voice.envelope.step();
        }
    }

    /// Remove voices that have gone silent or ran out of sample data.
    pub fn reap_finished(&mut self) {
        for slot in &mut self.slots {
            if slot.as_ref().is_some_and(|s| s.voice.is_finished()) {
                *slot = None;
            }
        }
    }

    /// Count of active (occupied) voice slots.
    pub fn active_count(&self) -> usize {
        self.slots.iter().filter(|s| s.is_some()).count()
    }

    /// Render one frame of every active voice, summed.
    pub fn render_frame(&mut self, bank: &InstrumentBank) -> (i32, i32) {
        let mut left = 0;
        let mut right = 0;
        for s in self.slots.iter_mut().flatten() {
            let (l, r) = s.voice.render(bank);
            left += l;
            right += r;
        }
        (left, right)
    }
}

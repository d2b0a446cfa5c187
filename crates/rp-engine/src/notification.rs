//! Events the engine raises for its host.
//!
//! Queued in a fixed-capacity deque on the render path and drained by the
//! control side; nothing here allocates.

use heapless::Deque;

use crate::error::{DecodeError, ResourceError};

/// Pending notifications kept before the oldest are dropped.
pub const NOTIFICATION_CAPACITY: usize = 32;

/// Something the host may want to react to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Notification {
    /// The song finished on its own (or hit its loop limit) and playback stopped.
    SongEnded,
    /// The song wrapped around; carries the completed loop count.
    LoopWrapped(u32),
    /// A track hit a decode error and stopped; the others continue.
    TrackFailed { track: u8, error: DecodeError },
    /// A note could not be voiced.
    ResourceMissing { track: u8, error: ResourceError },
}

/// Bounded notification queue. When full, the oldest entry is dropped.
#[derive(Debug, Default)]
pub struct Notifications {
    queue: Deque<Notification, NOTIFICATION_CAPACITY>,
}

impl Notifications {
    pub fn new() -> Self {
        Self { queue: Deque::new() }
    }

    pub fn push(&mut self, notification: Notification) {
        if self.queue.is_full() {
            self.queue.pop_front();
        }
        let _ = self.queue.push_back(notification);
    }

    pub fn pop(&mut self) -> Option<Notification> {
        self.queue.pop_front()
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    pub fn clear(&mut self) {
        self.queue.clear();
    }
}

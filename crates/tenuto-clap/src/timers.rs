//! Timers registered by the plugin.
//!
//! Timers fire from the host's idle pass on the main thread. Ids are handed
//! out in increasing order and never reused while the process runs.

use crate::INVALID_ID;
use smallvec::SmallVec;
use std::collections::BTreeMap;
use std::time::{Duration, Instant};

pub type TimerId = u32;

/// Shortest period the host honors.
const MIN_PERIOD: Duration = Duration::from_millis(1);

#[derive(Debug, Clone, Copy)]
struct Timer {
    period: Duration,
    next_due: Instant,
}

#[derive(Debug, Default)]
pub struct TimerRegistry {
    next_id: TimerId,
    timers: BTreeMap<TimerId, Timer>,
}

impl TimerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Arm a periodic timer. Returns `None` once the id space is exhausted.
    pub fn register(&mut self, period_ms: u32, now: Instant) -> Option<TimerId> {
        let id = self.next_id;
        if id == INVALID_ID {
            return None;
        }
        self.next_id += 1;

        let period = Duration::from_millis(u64::from(period_ms)).max(MIN_PERIOD);
        self.timers.insert(
            id,
            Timer {
                period,
                next_due: now + period,
            },
        );
        Some(id)
    }

    pub fn unregister(&mut self, id: TimerId) -> bool {
        self.timers.remove(&id).is_some()
    }

    pub fn contains(&self, id: TimerId) -> bool {
        self.timers.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.timers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timers.is_empty()
    }

    pub fn period(&self, id: TimerId) -> Option<Duration> {
        self.timers.get(&id).map(|t| t.period)
    }

    /// Ids of timers whose deadline has passed, in id order. Each returned
    /// timer is re-armed one period later; missed ticks are not replayed.
    pub fn take_due(&mut self, now: Instant) -> SmallVec<[TimerId; 8]> {
        let mut due = SmallVec::new();
        for (&id, timer) in self.timers.iter_mut() {
            if timer.next_due <= now {
                due.push(id);
                timer.next_due += timer.period;
                if timer.next_due <= now {
                    timer.next_due = now + timer.period;
                }
            }
        }
        due
    }

    /// Earliest pending deadline, for hosts that sleep between idle passes.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.timers.values().map(|t| t.next_due).min()
    }

    pub(crate) fn clear(&mut self) {
        self.timers.clear();
    }
}

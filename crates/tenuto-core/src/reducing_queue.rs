//! Keyed queues that coalesce updates instead of preserving every write.
//!
//! Parameter traffic between the main thread and the audio thread is bursty:
//! a knob drag can produce hundreds of writes to one parameter between two
//! audio blocks. A [`ReducingQueue`] keeps at most one pending entry per key
//! and folds newer updates into it with [`Reduce::reduce`], so its size is
//! bounded by the number of distinct keys rather than by the write rate.
//!
//! Producers call [`ReducingQueue::push`] (or [`ReducingQueue::try_push`] on
//! the audio thread); the single consumer calls
//! [`ReducingQueue::drain_and_consume`]. The consumer swaps the pending map
//! with a spare one, so producers never wait on the consumer's callback.

use hashbrown::HashMap;
use parking_lot::Mutex;
use std::hash::Hash;

/// Merge rule applied when a newer update for a key arrives before a drain.
pub trait Reduce {
    /// Fold `newer` into `self`. After the call `self` represents both.
    fn reduce(&mut self, newer: Self);
}

macro_rules! latest_wins {
    ($($ty:ty),*) => {
        $(
            impl Reduce for $ty {
                #[inline]
                fn reduce(&mut self, newer: Self) {
                    *self = newer;
                }
            }
        )*
    };
}

latest_wins!(f32, f64, i32, i64, u32, u64, bool);

/// A keyed queue that keeps one merged entry per key until drained.
pub struct ReducingQueue<K, V> {
    pending: Mutex<HashMap<K, V>>,
    spare: Mutex<HashMap<K, V>>,
}

impl<K: Eq + Hash, V: Reduce> ReducingQueue<K, V> {
    pub fn new() -> Self {
        Self {
            pending: Mutex::new(HashMap::new()),
            spare: Mutex::new(HashMap::new()),
        }
    }

    /// Create a queue that can hold `capacity` distinct keys without allocating.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            pending: Mutex::new(HashMap::with_capacity(capacity)),
            spare: Mutex::new(HashMap::with_capacity(capacity)),
        }
    }

    /// Grow both maps so `capacity` distinct keys fit without reallocation.
    ///
    /// Main thread only. Called whenever the key space changes (parameter scan).
    pub fn reserve(&self, capacity: usize) {
        for map in [&self.pending, &self.spare] {
            let mut map = map.lock();
            let len = map.len();
            if capacity > len {
                map.reserve(capacity - len);
            }
        }
    }

    /// Insert or merge an update. The lock is held for a single map insert.
    pub fn push(&self, key: K, value: V) {
        Self::merge_into(&mut self.pending.lock(), key, value);
    }

    /// Like [`push`](Self::push) but never waits. Returns the update back if
    /// the queue is momentarily held by another thread.
    pub fn try_push(&self, key: K, value: V) -> Result<(), (K, V)> {
        match self.pending.try_lock() {
            Some(mut pending) => {
                Self::merge_into(&mut pending, key, value);
                Ok(())
            }
            None => Err((key, value)),
        }
    }

    /// Take every pending entry and hand each to `consume` once.
    ///
    /// Returns the number of entries delivered. Entries pushed while
    /// `consume` runs stay queued for the next drain.
    pub fn drain_and_consume(&self, consume: impl FnMut(K, V)) -> usize {
        let mut spare = self.spare.lock();
        {
            let mut pending = self.pending.lock();
            if pending.is_empty() {
                return 0;
            }
            std::mem::swap(&mut *pending, &mut *spare);
        }
        Self::consume_all(&mut spare, consume)
    }

    /// Non-blocking drain for the audio thread.
    ///
    /// Returns `None` when a producer currently holds the queue; the pending
    /// entries are then delivered by a later drain.
    pub fn try_drain_and_consume(&self, consume: impl FnMut(K, V)) -> Option<usize> {
        let mut spare = self.spare.try_lock()?;
        {
            let mut pending = self.pending.try_lock()?;
            if pending.is_empty() {
                return Some(0);
            }
            std::mem::swap(&mut *pending, &mut *spare);
        }
        Some(Self::consume_all(&mut spare, consume))
    }

    /// Drop every pending entry without delivering it.
    pub fn clear(&self) {
        self.pending.lock().clear();
    }

    pub fn len(&self) -> usize {
        self.pending.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.lock().is_empty()
    }

    fn merge_into(map: &mut HashMap<K, V>, key: K, value: V) {
        match map.get_mut(&key) {
            Some(existing) => existing.reduce(value),
            None => {
                map.insert(key, value);
            }
        }
    }

    fn consume_all(map: &mut HashMap<K, V>, mut consume: impl FnMut(K, V)) -> usize {
        let count = map.len();
        for (key, value) in map.drain() {
            consume(key, value);
        }
        count
    }
}

impl<K: Eq + Hash, V: Reduce> Default for ReducingQueue<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

/// Thread-local staging area in front of a [`ReducingQueue`].
///
/// The audio thread cannot wait for the queue lock. Updates that lose the
/// race for it are merged here and forwarded by a later
/// [`flush_into`](Self::flush_into), so nothing is dropped.
pub struct ReducingStage<K, V> {
    staged: HashMap<K, V>,
}

impl<K: Eq + Hash, V: Reduce> ReducingStage<K, V> {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            staged: HashMap::with_capacity(capacity),
        }
    }

    pub fn reserve(&mut self, capacity: usize) {
        let len = self.staged.len();
        if capacity > len {
            self.staged.reserve(capacity - len);
        }
    }

    /// Push through to `queue`, staging locally on contention.
    pub fn push(&mut self, queue: &ReducingQueue<K, V>, key: K, value: V) {
        if !self.staged.is_empty() {
            self.stage(key, value);
            self.flush_into(queue);
            return;
        }
        if let Err((key, value)) = queue.try_push(key, value) {
            self.stage(key, value);
        }
    }

    /// Merge an update into the local stage without touching the queue.
    pub fn stage(&mut self, key: K, value: V) {
        ReducingQueue::merge_into(&mut self.staged, key, value);
    }

    /// Move every staged entry into `queue` if its lock is free.
    ///
    /// Returns `true` when the stage is empty afterwards.
    pub fn flush_into(&mut self, queue: &ReducingQueue<K, V>) -> bool {
        if self.staged.is_empty() {
            return true;
        }
        let Some(mut pending) = queue.pending.try_lock() else {
            return false;
        };
        for (key, value) in self.staged.drain() {
            ReducingQueue::merge_into(&mut pending, key, value);
        }
        true
    }

    pub fn is_empty(&self) -> bool {
        self.staged.is_empty()
    }
}

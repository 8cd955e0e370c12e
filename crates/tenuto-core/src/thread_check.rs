//! Thread identity guards.
//!
//! Plugin protocols split their API into main-thread and audio-thread calls.
//! [`MainThread`] remembers which thread owns the host; audio threads (the
//! real-time callback and pool workers) tag themselves with
//! [`mark_audio_thread`]. Violations are contract breaches and panic.

use std::cell::Cell;
use std::thread::{self, ThreadId};

thread_local! {
    static IS_AUDIO_THREAD: Cell<bool> = const { Cell::new(false) };
}

/// Tag the calling thread as an audio-processing thread.
pub fn mark_audio_thread() {
    IS_AUDIO_THREAD.with(|flag| flag.set(true));
}

/// Remove the audio tag from the calling thread.
pub fn unmark_audio_thread() {
    IS_AUDIO_THREAD.with(|flag| flag.set(false));
}

pub fn is_audio_thread() -> bool {
    IS_AUDIO_THREAD.with(Cell::get)
}

/// Panic unless the calling thread is tagged as an audio thread.
#[track_caller]
pub fn assert_audio_thread(operation: &str) {
    if !is_audio_thread() {
        panic!(
            "`{operation}` must be called from the audio thread (called from {:?})",
            thread::current().name().unwrap_or("<unnamed>")
        );
    }
}

/// Identity of the thread that owns a host instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MainThread {
    id: ThreadId,
}

impl MainThread {
    /// Capture the calling thread as the main thread.
    pub fn current() -> Self {
        Self {
            id: thread::current().id(),
        }
    }

    pub fn id(&self) -> ThreadId {
        self.id
    }

    pub fn is_current(&self) -> bool {
        thread::current().id() == self.id
    }

    /// Panic unless called from the captured main thread.
    #[track_caller]
    pub fn assert_current(&self, operation: &str) {
        if !self.is_current() {
            panic!(
                "`{operation}` must be called from the main thread (called from {:?})",
                thread::current().name().unwrap_or("<unnamed>")
            );
        }
    }
}

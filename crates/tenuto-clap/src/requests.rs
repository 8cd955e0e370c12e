//! Delayed actions requested from inside callbacks.
//!
//! The protocol forbids acting on most requests from within the callback
//! that makes them. Each request sets a bit here; the main thread's idle
//! pass and the audio thread's process pass take the bits they own. Taking
//! a bit is a single atomic read-modify-write, so a request raised while the
//! previous one is being handled is never lost, and one raised once is
//! handled once.

use std::sync::atomic::{AtomicU32, Ordering};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Request(u32);

impl Request {
    /// Deactivate and re-activate with the last settings.
    pub const RESTART: Request = Request(1 << 0);
    /// Wake the audio path.
    pub const PROCESS: Request = Request(1 << 1);
    /// Call `on_main_thread`.
    pub const CALLBACK: Request = Request(1 << 2);
    /// The audio thread should let go of the plugin.
    pub const DEACTIVATE: Request = Request(1 << 3);
    /// Deliver queued parameter changes through `params.flush`.
    pub const PARAM_FLUSH: Request = Request(1 << 4);
    pub const PARAMS_RESCAN: Request = Request(1 << 5);
    pub const PARAMS_CLEAR: Request = Request(1 << 6);
    pub const QUICK_CONTROLS_CHANGED: Request = Request(1 << 7);
    pub const QUICK_CONTROLS_SUGGESTED: Request = Request(1 << 8);
    pub const STATE_DIRTY: Request = Request(1 << 9);
    pub const GUI_RESIZE_HINTS: Request = Request(1 << 10);
    pub const GUI_RESIZE: Request = Request(1 << 11);
    pub const GUI_SHOW: Request = Request(1 << 12);
    pub const GUI_HIDE: Request = Request(1 << 13);
    pub const GUI_CLOSED: Request = Request(1 << 14);
    /// A process or start-processing call failed on the audio thread.
    pub const PROCESSING_FAILED: Request = Request(1 << 15);
    /// The audio side let go while the main thread held the plugin; the
    /// main thread stops processing itself before deactivating.
    pub const RELINQUISHED: Request = Request(1 << 16);

    pub const fn bits(self) -> u32 {
        self.0
    }

    pub const fn union(self, other: Request) -> Request {
        Request(self.0 | other.0)
    }
}

/// Pending-request bit set.
#[derive(Debug, Default)]
pub struct HostRequests(AtomicU32);

impl HostRequests {
    pub fn new() -> Self {
        Self(AtomicU32::new(0))
    }

    #[inline]
    pub fn set(&self, request: Request) {
        self.0.fetch_or(request.0, Ordering::AcqRel);
    }

    #[inline]
    pub fn is_set(&self, request: Request) -> bool {
        self.0.load(Ordering::Acquire) & request.0 != 0
    }

    /// Clear `request` and report whether it was pending.
    #[inline]
    pub fn take(&self, request: Request) -> bool {
        self.0.fetch_and(!request.0, Ordering::AcqRel) & request.0 != 0
    }

    #[inline]
    pub fn clear(&self, request: Request) {
        self.0.fetch_and(!request.0, Ordering::AcqRel);
    }

    pub fn clear_all(&self) {
        self.0.store(0, Ordering::Release);
    }

    pub fn pending(&self) -> u32 {
        self.0.load(Ordering::Acquire)
    }
}

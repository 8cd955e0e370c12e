//! Plugin lifecycle state.
//!
//! One state per loaded plugin. The main thread moves it between the
//! inactive states and into `ActiveAndSleeping`; the audio thread moves it
//! between the active states. Every change goes through
//! [`AtomicPluginState::transition`], which rejects edges not in the table
//! below.
//!
//! ```text
//! Inactive ──activate──▶ ActiveAndSleeping ◀──▶ ActiveAndProcessing
//!    ▲  └─fail─▶ InactiveWithError   │                │
//!    │                               ▼                ▼
//!    └──── ActiveAndReadyToDeactivate ◀── ActiveWithError
//! ```

use std::sync::atomic::{AtomicU8, Ordering};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum PluginState {
    /// Only the main thread uses the plugin.
    Inactive,
    /// The last activation failed.
    InactiveWithError,
    /// Active; the audio thread may start processing.
    ActiveAndSleeping,
    /// The audio thread is processing.
    ActiveAndProcessing,
    /// A process call failed; the audio thread outputs silence.
    ActiveWithError,
    /// The audio thread has let go and waits for the main thread to deactivate.
    ActiveAndReadyToDeactivate,
}

impl PluginState {
    pub fn is_active(self) -> bool {
        matches!(
            self,
            PluginState::ActiveAndSleeping
                | PluginState::ActiveAndProcessing
                | PluginState::ActiveWithError
                | PluginState::ActiveAndReadyToDeactivate
        )
    }

    pub fn is_processing(self) -> bool {
        self == PluginState::ActiveAndProcessing
    }

    pub fn is_sleeping(self) -> bool {
        self == PluginState::ActiveAndSleeping
    }

    /// Whether `self -> next` is a legal edge.
    pub fn can_transition_to(self, next: PluginState) -> bool {
        use PluginState::*;
        matches!(
            (self, next),
            (Inactive | InactiveWithError, ActiveAndSleeping)
                | (Inactive | InactiveWithError, InactiveWithError)
                | (InactiveWithError, Inactive)
                | (ActiveAndSleeping, ActiveAndProcessing)
                | (ActiveAndProcessing, ActiveAndSleeping)
                | (ActiveAndSleeping | ActiveAndProcessing, ActiveWithError)
                | (
                    ActiveAndSleeping | ActiveAndProcessing | ActiveWithError,
                    ActiveAndReadyToDeactivate
                )
                | (ActiveAndReadyToDeactivate, Inactive)
        )
    }

    fn from_u8(raw: u8) -> Self {
        match raw {
            0 => PluginState::Inactive,
            1 => PluginState::InactiveWithError,
            2 => PluginState::ActiveAndSleeping,
            3 => PluginState::ActiveAndProcessing,
            4 => PluginState::ActiveWithError,
            _ => PluginState::ActiveAndReadyToDeactivate,
        }
    }
}

/// Lifecycle state shared between the main and audio threads.
#[derive(Debug)]
pub struct AtomicPluginState(AtomicU8);

impl AtomicPluginState {
    pub fn new(state: PluginState) -> Self {
        Self(AtomicU8::new(state as u8))
    }

    #[inline]
    pub fn load(&self) -> PluginState {
        PluginState::from_u8(self.0.load(Ordering::Acquire))
    }

    /// Move from `from` to `to`.
    ///
    /// Fails with the observed state if it is not `from` or if the edge is
    /// illegal. Never allocates; safe on the audio thread.
    pub fn transition(&self, from: PluginState, to: PluginState) -> Result<(), PluginState> {
        if !from.can_transition_to(to) {
            return Err(self.load());
        }
        self.0
            .compare_exchange(from as u8, to as u8, Ordering::AcqRel, Ordering::Acquire)
            .map(|_| ())
            .map_err(PluginState::from_u8)
    }

    /// Move from whatever the current state is to `to`.
    pub fn transition_from_current(&self, to: PluginState) -> Result<PluginState, PluginState> {
        let from = self.load();
        self.transition(from, to).map(|()| from)
    }

    /// Unchecked store for unloading, where the plugin no longer exists.
    pub(crate) fn reset(&self) {
        self.0.store(PluginState::Inactive as u8, Ordering::Release);
    }
}

impl Default for AtomicPluginState {
    fn default() -> Self {
        Self::new(PluginState::Inactive)
    }
}

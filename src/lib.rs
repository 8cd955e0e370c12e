//! # Tenuto - In-process CLAP plugin host
//!
//! Umbrella crate over the hosting subsystems.
//!
//! ## Architecture
//!
//! - **tenuto-core** - Real-time primitives (reducing queues, worker pool, thread identity)
//! - **tenuto-clap** - CLAP hosting (loading, lifecycle, parameters, host callbacks, GUI, state)
//!
//! ## Quick Start
//!
//! ```ignore
//! use tenuto::prelude::*;
//!
//! let mut host = PluginHost::new(HostConfig::default().name("My Host"))?;
//! host.load("/usr/lib/clap/gain.clap".as_ref(), 0)?;
//! host.activate(48000.0, 512)?;
//!
//! let mut processor = host.take_processor().unwrap();
//! processor.set_ports(2, 2, 512);
//! // Hand `processor` to the audio callback, call `host.idle()` from the UI loop.
//! ```
//!
//! ## Feature Flags
//!
//! - `default` - CLAP hosting
//! - `clap` - CLAP hosting (`tenuto-clap`)

/// Re-export of tenuto-core for direct access
pub use tenuto_core as core;

pub use tenuto_core::{MainThread, Reduce, ReducingQueue, ReducingStage, ThreadPool};

// CLAP hosting
#[cfg(feature = "clap")]
pub use tenuto_clap as clap;

#[cfg(feature = "clap")]
pub use tenuto_clap::{
    EditorWindow, HostConfig, HostError, HostEvent, PageId, ParamId, PluginHost,
    PluginMetadata, PluginProcessor, PluginState, ProcessError, ProcessStatus, WindowHandle,
    INVALID_ID,
};

/// Convenience prelude for common imports
pub mod prelude {
    #[cfg(feature = "clap")]
    pub use crate::clap::{
        HostConfig, HostError, HostEvent, PluginHost, PluginProcessor, PluginState,
        ProcessError, ProcessStatus, WindowHandle,
    };

    pub use crate::core::ReducingQueue;
}

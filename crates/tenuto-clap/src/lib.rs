//! In-process CLAP plugin hosting.
//!
//! Loads a CLAP plugin, drives its lifecycle and exchanges parameter changes
//! and events with it in real time, implementing the host-side extensions a
//! modern plugin expects (log, thread checks, params, remote controls,
//! timers, POSIX fds, thread pool, GUI, state, preset load).
//!
//! The host is split in two halves:
//!
//! - [`PluginHost`] lives on the main thread. It loads the plugin, owns the
//!   parameter and quick-controls catalogs and runs the plugin's deferred
//!   requests from [`PluginHost::idle`].
//! - [`PluginProcessor`] lives on the audio thread and runs one block at a
//!   time through `process_begin` / `process` / `process_end`.
//!
//! Parameter changes cross between them through reducing queues: only the
//! most recent change per parameter is delivered.
//!
//! ## Usage
//!
//! ```ignore
//! use tenuto_clap::{HostConfig, PluginHost};
//!
//! let mut host = PluginHost::new(HostConfig::default())?;
//! host.load("/usr/lib/clap/gain.clap".as_ref(), 0)?;
//! host.activate(48000.0, 512)?;
//!
//! let mut processor = host.take_processor().unwrap();
//! processor.set_ports(2, 2, 512);
//! std::thread::spawn(move || loop {
//!     processor.process_begin(512)?;
//!     processor.process()?;
//!     processor.process_end(512)?;
//! });
//!
//! loop {
//!     host.idle()?;
//! }
//! ```

/// Parameter identifier assigned by the plugin.
pub type ParamId = u32;

/// Quick-controls page identifier assigned by the plugin.
pub type PageId = u32;

/// "No id", for pages and cleared selections.
pub const INVALID_ID: u32 = clap_sys::id::CLAP_INVALID_ID;

pub mod error;
pub use error::{HostError, LoadStage, ProcessError, Result};

mod config;
pub use config::HostConfig;

mod metadata;
pub use metadata::{AudioIO, PluginDescriptor, PluginMetadata};

mod events;
pub use events::{EventList, PluginEvent};

mod params;
pub use params::{Cookie, ParamCatalog, ParamFlags, ParamInfo, PluginParam, RescanFlags, ScanReport};

mod quick_controls;
pub use quick_controls::{QuickControls, QuickControlsPage, QUICK_CONTROLS_SLOTS};

mod state;
pub use state::PluginState;

mod requests;

mod timers;
pub use timers::{TimerId, TimerRegistry};

mod posix_fd;
pub use posix_fd::{FdEvent, FdRegistry, FdWatchers, RawFd};

mod gui;
pub use gui::{platform_api, EditorWindow, WindowHandle};

mod state_file;
pub use state_file::StateFile;

mod library;
pub use library::PluginLibrary;

pub mod scan;

mod stream;
mod plugin;
mod callbacks;
mod context;

mod processor;
pub use processor::{PluginProcessor, ProcessStatus};

mod host;
pub use host::{HostEvent, PluginHost};

//! Error types for plugin hosting

use crate::{PageId, ParamId};
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadStage {
    Opening,
    EntryInit,
    Factory,
    IndexLookup,
    Instantiation,
    Initialization,
}

impl std::fmt::Display for LoadStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LoadStage::Opening => write!(f, "opening library"),
            LoadStage::EntryInit => write!(f, "initializing entry"),
            LoadStage::Factory => write!(f, "getting factory"),
            LoadStage::IndexLookup => write!(f, "looking up plugin index"),
            LoadStage::Instantiation => write!(f, "creating instance"),
            LoadStage::Initialization => write!(f, "initializing plugin"),
        }
    }
}

#[derive(Error, Debug)]
pub enum HostError {
    #[error("Plugin load failed at {stage} stage: {path}\n  Reason: {reason}")]
    LoadFailed {
        path: PathBuf,
        stage: LoadStage,
        reason: String,
    },

    #[error("Invalid host configuration: {0}")]
    Config(String),

    #[error("No plugin is loaded")]
    NotLoaded,

    #[error("Plugin activation failed: {0}")]
    ActivationFailed(String),

    #[error("Plugin is already active")]
    AlreadyActive,

    #[error("Operation `{operation}` not allowed in state {state:?}")]
    InvalidState {
        operation: &'static str,
        state: crate::PluginState,
    },

    #[error("Plugin processing failed {count} time(s) since the last idle")]
    ProcessingFailed { count: u32 },

    #[error("Unknown parameter id {0}")]
    UnknownParam(ParamId),

    #[error("Value {value} out of range [{min}, {max}] for parameter {id}")]
    ParamValueOutOfRange {
        id: ParamId,
        value: f64,
        min: f64,
        max: f64,
    },

    #[error("Parameter {0} is read-only")]
    ReadOnlyParam(ParamId),

    #[error("Unknown quick-controls page id {0}")]
    UnknownQuickControlsPage(PageId),

    #[error("Protocol violation in {function}: {reason}")]
    ProtocolViolation {
        function: &'static str,
        reason: String,
    },

    #[error("Plugin does not support the {0} extension")]
    Unsupported(&'static str),

    #[error("Plugin editor error: {0}")]
    Gui(String),

    #[error("Failed to save plugin state: {0}")]
    StateSave(String),

    #[error("Failed to restore plugin state: {0}")]
    StateRestore(String),

    #[error("Failed to load preset {path}: {reason}")]
    PresetLoad { path: PathBuf, reason: String },

    #[error("Timeout after {duration_ms}ms: {operation}")]
    Timeout {
        operation: &'static str,
        duration_ms: u64,
    },

    #[error("Thread pool error: {0}")]
    ThreadPool(#[from] tenuto_core::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] bincode::Error),
}

impl HostError {
    pub(crate) fn violation(function: &'static str, reason: impl Into<String>) -> Self {
        HostError::ProtocolViolation {
            function,
            reason: reason.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, HostError>;

/// Audio-thread failures. `Copy` so reporting one never allocates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ProcessError {
    #[error("plugin is not active")]
    NotActive,

    #[error("block transaction step called out of order")]
    OutOfOrder,

    #[error("block of {frames} frames exceeds the activated maximum of {max}")]
    BlockTooLarge { frames: u32, max: u32 },

    #[error("sample offset {offset} outside block of {frames} frames")]
    SampleOffsetOutOfBlock { offset: u32, frames: u32 },

    #[error("event list is full")]
    EventListFull,

    #[error("plugin is being activated or deactivated")]
    PluginBusy,

    #[error("plugin failed to start processing")]
    StartFailed,

    #[error("plugin process call failed")]
    Failed,
}

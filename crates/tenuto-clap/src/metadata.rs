//! Plugin descriptions
//!
//! [`PluginDescriptor`] is what a factory advertises before any instance
//! exists; [`PluginMetadata`] adds what only a live instance can report.

use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use std::ffi::{c_char, CStr};

/// One entry of a plugin factory.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct PluginDescriptor {
    /// Index inside the factory
    pub index: u32,

    /// Reverse-DNS plugin identifier
    pub id: String,

    pub name: String,
    pub vendor: String,
    pub version: String,
    pub description: String,

    /// Feature tags ("instrument", "audio-effect", ...)
    pub features: SmallVec<[String; 4]>,
}

impl PluginDescriptor {
    /// Copy a descriptor out of the plugin's memory.
    ///
    /// # Safety
    /// `desc` must point to a valid descriptor whose strings are
    /// null-terminated or null.
    pub(crate) unsafe fn from_raw(index: u32, desc: &clap_sys::plugin::clap_plugin_descriptor) -> Self {
        let mut features = SmallVec::new();
        if !desc.features.is_null() {
            let mut cursor = desc.features;
            while !(*cursor).is_null() {
                features.push(c_string(*cursor));
                cursor = cursor.add(1);
            }
        }

        Self {
            index,
            id: c_string(desc.id),
            name: c_string(desc.name),
            vendor: c_string(desc.vendor),
            version: c_string(desc.version),
            description: c_string(desc.description),
            features,
        }
    }

    pub fn has_feature(&self, feature: &str) -> bool {
        self.features.iter().any(|f| f == feature)
    }
}

/// Audio I/O configuration
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct AudioIO {
    /// Channel count of the main input port
    pub inputs: usize,
    /// Channel count of the main output port
    pub outputs: usize,
}

impl AudioIO {
    /// Stereo in, stereo out
    pub fn stereo() -> Self {
        Self {
            inputs: 2,
            outputs: 2,
        }
    }
}

/// What the host knows about a loaded plugin.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct PluginMetadata {
    pub descriptor: PluginDescriptor,

    /// Audio I/O configuration reported by the audio-ports extension
    pub audio_io: AudioIO,

    /// Does this plugin have a GUI for the current platform?
    pub has_editor: bool,

    #[serde(default)]
    pub has_state: bool,

    #[serde(default)]
    pub param_count: usize,
}

impl PluginMetadata {
    pub fn new(descriptor: PluginDescriptor) -> Self {
        Self {
            descriptor,
            audio_io: AudioIO::stereo(),
            ..Self::default()
        }
    }

    pub fn audio_io(mut self, inputs: usize, outputs: usize) -> Self {
        self.audio_io = AudioIO { inputs, outputs };
        self
    }

    pub fn editor(mut self, has_editor: bool) -> Self {
        self.has_editor = has_editor;
        self
    }

    pub fn state(mut self, has_state: bool) -> Self {
        self.has_state = has_state;
        self
    }

    pub fn params(mut self, count: usize) -> Self {
        self.param_count = count;
        self
    }
}

/// Read a plugin-owned C string, mapping null to an empty string.
///
/// # Safety
/// `ptr` must be null or point to a null-terminated string.
pub(crate) unsafe fn c_string(ptr: *const c_char) -> String {
    if ptr.is_null() {
        return String::new();
    }
    CStr::from_ptr(ptr).to_string_lossy().into_owned()
}

/// Read a fixed-size, null-padded name buffer.
pub(crate) fn c_buffer_string(buffer: &[c_char]) -> String {
    let bytes: Vec<u8> = buffer
        .iter()
        .take_while(|&&c| c != 0)
        .map(|&c| c as u8)
        .collect();
    String::from_utf8_lossy(&bytes).into_owned()
}

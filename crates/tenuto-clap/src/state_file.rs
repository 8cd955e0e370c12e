//! On-disk container for a plugin's opaque state blob.
//!
//! The blob is wrapped with a magic tag, a format version and the plugin id,
//! so truncated files, foreign files and files saved by another plugin are
//! rejected before any byte reaches the plugin.

use crate::error::{HostError, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::Path;

const MAGIC: [u8; 4] = *b"TNST";
const FORMAT_VERSION: u16 = 1;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateFile {
    magic: [u8; 4],
    version: u16,
    pub plugin_id: String,
    pub data: Vec<u8>,
}

impl StateFile {
    pub fn new(plugin_id: impl Into<String>, data: Vec<u8>) -> Self {
        Self {
            magic: MAGIC,
            version: FORMAT_VERSION,
            plugin_id: plugin_id.into(),
            data,
        }
    }

    pub fn encode(&self) -> Result<Vec<u8>> {
        Ok(bincode::serialize(self)?)
    }

    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let file: StateFile = bincode::deserialize(bytes)
            .map_err(|e| HostError::StateRestore(format!("malformed state file: {e}")))?;
        if file.magic != MAGIC {
            return Err(HostError::StateRestore("not a state file".into()));
        }
        if file.version != FORMAT_VERSION {
            return Err(HostError::StateRestore(format!(
                "unsupported state format version {}",
                file.version
            )));
        }
        Ok(file)
    }

    /// Write atomically: the file at `path` is either the old one or the new one.
    pub fn save(&self, path: &Path) -> Result<()> {
        let bytes = self.encode()?;
        let Some(name) = path.file_name() else {
            let err = io::Error::new(io::ErrorKind::InvalidInput, "state path has no file name");
            return Err(err.into());
        };
        let mut tmp_name = name.to_os_string();
        tmp_name.push(".tmp");
        let tmp = path.with_file_name(tmp_name);
        fs::write(&tmp, bytes)?;
        fs::rename(&tmp, path)?;
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self> {
        Self::decode(&fs::read(path)?)
    }

    /// Reject a file saved by a different plugin.
    pub fn check_plugin(&self, plugin_id: &str) -> Result<()> {
        if self.plugin_id != plugin_id {
            return Err(HostError::StateRestore(format!(
                "state belongs to {}, not {}",
                self.plugin_id, plugin_id
            )));
        }
        Ok(())
    }
}

//! Plugin binaries and their entry points.

use crate::error::{HostError, LoadStage, Result};
use crate::metadata::PluginDescriptor;
use clap_sys::entry::clap_plugin_entry;
use clap_sys::factory::plugin_factory::{clap_plugin_factory, CLAP_PLUGIN_FACTORY_ID};
use clap_sys::version::clap_version_is_compatible;
use std::ffi::CString;
use std::path::{Path, PathBuf};
use std::ptr::NonNull;

/// A plugin binary whose entry point has been initialized.
///
/// Dropping it de-initializes the entry and then unloads the library.
pub struct PluginLibrary {
    path: PathBuf,
    entry: NonNull<clap_plugin_entry>,
    // Declared last: the library must outlive the entry deinit in `Drop`.
    _library: Option<libloading::Library>,
}

// Safety: the entry table is immutable and documented as thread-safe; the
// library handle is only used to keep the binary mapped.
unsafe impl Send for PluginLibrary {}

impl PluginLibrary {
    /// Open a `.clap` binary and initialize its entry point.
    pub fn open(path: &Path) -> Result<Self> {
        let fail = |stage, reason: String| HostError::LoadFailed {
            path: path.to_path_buf(),
            stage,
            reason,
        };

        let library = unsafe {
            libloading::Library::new(path)
                .map_err(|e| fail(LoadStage::Opening, format!("Failed to load library: {e}")))?
        };

        // `clap_entry` is a data symbol: the entry table itself.
        let entry = unsafe {
            let symbol: libloading::Symbol<*const clap_plugin_entry> = library
                .get(b"clap_entry\0")
                .map_err(|e| fail(LoadStage::Opening, format!("No clap_entry symbol: {e}")))?;
            *symbol
        };
        let entry = NonNull::new(entry as *mut clap_plugin_entry)
            .ok_or_else(|| fail(LoadStage::Opening, "clap_entry is null".to_string()))?;

        Self::init(path, entry, Some(library))
    }

    /// Use an entry table linked into the current binary.
    pub fn from_static(entry: &'static clap_plugin_entry, label: &str) -> Result<Self> {
        Self::init(Path::new(label), NonNull::from(entry), None)
    }

    fn init(
        path: &Path,
        entry: NonNull<clap_plugin_entry>,
        library: Option<libloading::Library>,
    ) -> Result<Self> {
        let fail = |reason: String| HostError::LoadFailed {
            path: path.to_path_buf(),
            stage: LoadStage::EntryInit,
            reason,
        };

        let table = unsafe { entry.as_ref() };
        if !clap_version_is_compatible(table.clap_version) {
            let v = table.clap_version;
            return Err(fail(format!(
                "Incompatible CLAP version {}.{}.{}",
                v.major, v.minor, v.revision
            )));
        }

        let init = table.init.ok_or_else(|| fail("No init function".to_string()))?;
        let c_path = CString::new(path.to_string_lossy().as_bytes())
            .map_err(|e| fail(format!("Path contains a null byte: {e}")))?;
        if !unsafe { init(c_path.as_ptr()) } {
            return Err(fail("Entry init failed".to_string()));
        }

        tracing::debug!(path = %path.display(), "Plugin entry initialized");
        Ok(Self {
            path: path.to_path_buf(),
            entry,
            _library: library,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub(crate) fn factory(&self) -> Result<&clap_plugin_factory> {
        let fail = |reason: &str| HostError::LoadFailed {
            path: self.path.clone(),
            stage: LoadStage::Factory,
            reason: reason.to_string(),
        };

        let table = unsafe { self.entry.as_ref() };
        let get_factory = table
            .get_factory
            .ok_or_else(|| fail("No get_factory function"))?;
        let factory = unsafe { get_factory(CLAP_PLUGIN_FACTORY_ID.as_ptr()) };
        if factory.is_null() {
            return Err(fail("No plugin factory"));
        }
        Ok(unsafe { &*(factory as *const clap_plugin_factory) })
    }

    pub(crate) fn plugin_count(&self) -> Result<u32> {
        let factory = self.factory()?;
        let count = factory.get_plugin_count.ok_or_else(|| HostError::LoadFailed {
            path: self.path.clone(),
            stage: LoadStage::Factory,
            reason: "No get_plugin_count function".to_string(),
        })?;
        Ok(unsafe { count(factory) })
    }

    /// Describe the plugin at `index` without instantiating it.
    pub fn descriptor(&self, index: u32) -> Result<PluginDescriptor> {
        let fail = |reason: String| HostError::LoadFailed {
            path: self.path.clone(),
            stage: LoadStage::IndexLookup,
            reason,
        };

        let count = self.plugin_count()?;
        if index >= count {
            return Err(fail(format!(
                "Plugin index {index} out of range ({count} plugins)"
            )));
        }

        let factory = self.factory()?;
        let get_descriptor = factory
            .get_plugin_descriptor
            .ok_or_else(|| fail("No get_plugin_descriptor function".to_string()))?;
        let desc = unsafe { get_descriptor(factory, index) };
        if desc.is_null() {
            return Err(fail(format!("No descriptor for plugin {index}")));
        }
        let desc = unsafe { PluginDescriptor::from_raw(index, &*desc) };
        if desc.id.is_empty() {
            return Err(fail(format!("Plugin {index} has no id")));
        }
        Ok(desc)
    }

    /// Every plugin the binary's factory exposes.
    pub fn descriptors(&self) -> Result<Vec<PluginDescriptor>> {
        (0..self.plugin_count()?)
            .map(|index| self.descriptor(index))
            .collect()
    }
}

impl Drop for PluginLibrary {
    fn drop(&mut self) {
        let table = unsafe { self.entry.as_ref() };
        if let Some(deinit) = table.deinit {
            unsafe { deinit() };
        }
        tracing::debug!(path = %self.path.display(), "Plugin entry de-initialized");
    }
}

impl std::fmt::Debug for PluginLibrary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PluginLibrary")
            .field("path", &self.path)
            .field("dynamic", &self._library.is_some())
            .finish()
    }
}

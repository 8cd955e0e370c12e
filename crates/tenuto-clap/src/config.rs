//! Host configuration

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Settings for a [`PluginHost`](crate::PluginHost).
///
/// The identity strings are what the plugin sees in the host descriptor.
/// Fields missing from a serialized config take their [`Default`] values.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HostConfig {
    pub name: String,
    pub vendor: String,
    pub url: String,
    pub version: String,

    /// Worker count for plugin thread-pool requests. `0` uses the number of
    /// available cores.
    pub thread_pool_size: usize,

    /// Pass the plugin-supplied cookie along with parameter events.
    pub provide_param_cookies: bool,

    /// How long `deactivate()` waits for the audio thread to hand the
    /// plugin back.
    pub deactivate_timeout_ms: u64,

    /// Preallocated capacity of each per-block event list.
    pub event_capacity: usize,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            name: "Tenuto".to_string(),
            vendor: "Tenuto Project".to_string(),
            url: "https://github.com/PoHsuanLai/Tenuto".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            thread_pool_size: 0,
            provide_param_cookies: true,
            deactivate_timeout_ms: 1000,
            event_capacity: 1024,
        }
    }
}

impl HostConfig {
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn vendor(mut self, vendor: impl Into<String>) -> Self {
        self.vendor = vendor.into();
        self
    }

    pub fn url(mut self, url: impl Into<String>) -> Self {
        self.url = url.into();
        self
    }

    pub fn version(mut self, version: impl Into<String>) -> Self {
        self.version = version.into();
        self
    }

    pub fn thread_pool_size(mut self, size: usize) -> Self {
        self.thread_pool_size = size;
        self
    }

    pub fn provide_param_cookies(mut self, provide: bool) -> Self {
        self.provide_param_cookies = provide;
        self
    }

    pub fn deactivate_timeout(mut self, timeout: Duration) -> Self {
        self.deactivate_timeout_ms = timeout.as_millis() as u64;
        self
    }

    pub fn event_capacity(mut self, capacity: usize) -> Self {
        self.event_capacity = capacity;
        self
    }

    /// Resolved worker count.
    pub fn worker_count(&self) -> usize {
        if self.thread_pool_size > 0 {
            return self.thread_pool_size;
        }
        std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1)
    }

    pub fn deactivate_timeout_duration(&self) -> Duration {
        Duration::from_millis(self.deactivate_timeout_ms)
    }
}

//! State shared between the host façade, the audio processor and the
//! plugin's callbacks.
//!
//! The plugin reaches it through `clap_host.host_data`. Callbacks never act
//! on the plugin directly: they record a request or pending data here and
//! the main thread acts on it during `idle()`.

use crate::config::HostConfig;
use crate::params::{AppToEngineValue, EngineToAppValue};
use crate::plugin::{Ext, PluginInstance};
use crate::posix_fd::FdRegistry;
use crate::requests::HostRequests;
use crate::state::AtomicPluginState;
use crate::timers::TimerRegistry;
use crate::{callbacks, PageId, ParamId, INVALID_ID};
use arc_swap::ArcSwapOption;
use clap_sys::ext::params::clap_plugin_params;
use clap_sys::host::clap_host;
use clap_sys::version::CLAP_VERSION;
use parking_lot::Mutex;
use std::ffi::{c_void, CString, NulError};
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use tenuto_core::{MainThread, ReducingQueue, ThreadPool};

/// What the audio thread needs to run the plugin. Present while active.
#[derive(Clone, Copy)]
pub(crate) struct AudioSlot {
    pub plugin: PluginInstance,
    pub params: Option<Ext<clap_plugin_params>>,
    pub max_frames: u32,
}

pub(crate) struct HostContext {
    pub config: HostConfig,
    pub main_thread: MainThread,
    pub state: AtomicPluginState,
    pub requests: HostRequests,

    /// Union of the flags of every rescan requested since the last idle.
    pub rescan_flags: AtomicU32,
    pub param_clears: Mutex<Vec<(ParamId, u32)>>,
    pub suggested_page: AtomicU32,

    /// Requested editor size, width in the high half.
    pub gui_resize: AtomicU64,
    pub gui_closed_destroyed: AtomicBool,

    pub timers: Mutex<TimerRegistry>,
    pub fds: Mutex<FdRegistry>,
    pub thread_pool: ArcSwapOption<ThreadPool>,

    pub app_to_engine_values: ReducingQueue<ParamId, AppToEngineValue>,
    pub app_to_engine_mods: ReducingQueue<ParamId, AppToEngineValue>,
    pub engine_to_app: ReducingQueue<ParamId, EngineToAppValue>,

    /// Locked by the main thread only to install or remove the slot; the
    /// audio thread only ever try-locks it.
    pub audio: Mutex<Option<AudioSlot>>,

    /// Audio-thread failures not yet reported by `idle()`.
    pub process_failures: AtomicU32,
    pub preset_error: Mutex<Option<String>>,
    pub preset_loaded: AtomicBool,
}

impl HostContext {
    pub(crate) fn new(config: HostConfig) -> Self {
        let capacity = config.event_capacity;
        Self {
            config,
            main_thread: MainThread::current(),
            state: AtomicPluginState::default(),
            requests: HostRequests::new(),
            rescan_flags: AtomicU32::new(0),
            param_clears: Mutex::new(Vec::new()),
            suggested_page: AtomicU32::new(INVALID_ID),
            gui_resize: AtomicU64::new(0),
            gui_closed_destroyed: AtomicBool::new(false),
            timers: Mutex::new(TimerRegistry::new()),
            fds: Mutex::new(FdRegistry::new()),
            thread_pool: ArcSwapOption::empty(),
            app_to_engine_values: ReducingQueue::with_capacity(capacity),
            app_to_engine_mods: ReducingQueue::with_capacity(capacity),
            engine_to_app: ReducingQueue::with_capacity(capacity),
            audio: Mutex::new(None),
            process_failures: AtomicU32::new(0),
            preset_error: Mutex::new(None),
            preset_loaded: AtomicBool::new(false),
        }
    }

    /// Size the queues for the current parameter set.
    pub(crate) fn reserve_params(&self, count: usize) {
        self.app_to_engine_values.reserve(count);
        self.app_to_engine_mods.reserve(count);
        self.engine_to_app.reserve(count);
    }

    pub(crate) fn take_rescan_flags(&self) -> u32 {
        self.rescan_flags.swap(0, Ordering::AcqRel)
    }

    pub(crate) fn take_suggested_page(&self) -> PageId {
        self.suggested_page.swap(INVALID_ID, Ordering::AcqRel)
    }

    pub(crate) fn set_gui_resize(&self, width: u32, height: u32) {
        self.gui_resize
            .store(((width as u64) << 32) | height as u64, Ordering::Release);
    }

    pub(crate) fn gui_resize(&self) -> (u32, u32) {
        let packed = self.gui_resize.load(Ordering::Acquire);
        ((packed >> 32) as u32, packed as u32)
    }

    pub(crate) fn record_process_failure(&self) {
        self.process_failures.fetch_add(1, Ordering::AcqRel);
    }

    pub(crate) fn take_process_failures(&self) -> u32 {
        self.process_failures.swap(0, Ordering::AcqRel)
    }

    /// Forget everything tied to the plugin instance being unloaded.
    pub(crate) fn reset(&self) {
        self.state.reset();
        self.requests.clear_all();
        self.rescan_flags.store(0, Ordering::Release);
        self.param_clears.lock().clear();
        self.suggested_page.store(INVALID_ID, Ordering::Release);
        self.timers.lock().clear();
        self.fds.lock().clear();
        self.thread_pool.store(None);
        self.app_to_engine_values.clear();
        self.app_to_engine_mods.clear();
        self.engine_to_app.clear();
        *self.audio.lock() = None;
        self.process_failures.store(0, Ordering::Release);
        *self.preset_error.lock() = None;
        self.preset_loaded.store(false, Ordering::Release);
    }
}

/// The `clap_host` handed to the plugin, with the strings it points to.
pub(crate) struct HostHandle {
    raw: Box<clap_host>,
    _strings: [CString; 4],
}

// Safety: the table is immutable after construction and its strings are owned.
unsafe impl Send for HostHandle {}

impl HostHandle {
    pub(crate) fn new(context: &Arc<HostContext>) -> Result<Self, NulError> {
        let config = &context.config;
        let strings = [
            CString::new(config.name.as_str())?,
            CString::new(config.vendor.as_str())?,
            CString::new(config.url.as_str())?,
            CString::new(config.version.as_str())?,
        ];

        let raw = Box::new(clap_host {
            clap_version: CLAP_VERSION,
            host_data: Arc::as_ptr(context) as *mut c_void,
            name: strings[0].as_ptr(),
            vendor: strings[1].as_ptr(),
            url: strings[2].as_ptr(),
            version: strings[3].as_ptr(),
            get_extension: Some(callbacks::get_extension),
            request_restart: Some(callbacks::request_restart),
            request_process: Some(callbacks::request_process),
            request_callback: Some(callbacks::request_callback),
        });

        Ok(Self {
            raw,
            _strings: strings,
        })
    }

    pub(crate) fn as_raw(&self) -> *const clap_host {
        &*self.raw
    }
}

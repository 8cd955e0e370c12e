//! Safe-ish handles over a plugin instance and its extensions.
//!
//! Every entry of a plugin's function table is optional at the ABI level.
//! The wrappers here check for presence before each call and fall back to
//! the protocol's "not supported" answer.

use crate::events::{InputEvents, OutputEvents};
use crate::metadata::c_string;
use crate::params::ParamInfo;
use crate::quick_controls::QuickControlsPage;
use crate::stream::{InputStream, OutputStream};
use crate::ParamId;
use clap_sys::ext::audio_ports::{clap_audio_port_info, clap_plugin_audio_ports, CLAP_EXT_AUDIO_PORTS};
use clap_sys::ext::gui::{clap_plugin_gui, clap_window, CLAP_EXT_GUI};
use clap_sys::ext::params::{clap_param_info, clap_plugin_params, CLAP_EXT_PARAMS};
use clap_sys::ext::posix_fd_support::{clap_plugin_posix_fd_support, CLAP_EXT_POSIX_FD_SUPPORT};
use clap_sys::ext::preset_load::{clap_plugin_preset_load, CLAP_EXT_PRESET_LOAD};
use clap_sys::ext::remote_controls::{
    clap_plugin_remote_controls, clap_remote_controls_page, CLAP_EXT_REMOTE_CONTROLS,
};
use clap_sys::ext::state::{clap_plugin_state, CLAP_EXT_STATE};
use clap_sys::ext::thread_pool::{clap_plugin_thread_pool, CLAP_EXT_THREAD_POOL};
use clap_sys::ext::timer_support::{clap_plugin_timer_support, CLAP_EXT_TIMER_SUPPORT};
use clap_sys::plugin::clap_plugin;
use clap_sys::process::{clap_process, clap_process_status, CLAP_PROCESS_ERROR};
use std::ffi::{c_char, CStr, CString};
use std::mem::MaybeUninit;
use std::ptr::NonNull;

/// `location_kind` for presets stored in a file.
const PRESET_LOCATION_FILE: u32 = 0;

/// Size of the text buffer offered to `value_to_text`.
const PARAM_TEXT_SIZE: usize = 256;

/// A created plugin instance.
///
/// Copyable: ownership of the instance lives with the host, which destroys
/// it exactly once.
#[derive(Clone, Copy)]
pub(crate) struct PluginInstance(NonNull<clap_plugin>);

// Safety: the protocol defines which thread may call each function; the host
// upholds those rules, not the type system.
unsafe impl Send for PluginInstance {}
unsafe impl Sync for PluginInstance {}

impl PluginInstance {
    pub(crate) fn new(raw: *const clap_plugin) -> Option<Self> {
        NonNull::new(raw as *mut clap_plugin).map(PluginInstance)
    }

    pub(crate) fn as_ptr(self) -> *const clap_plugin {
        self.0.as_ptr()
    }

    fn table(&self) -> &clap_plugin {
        unsafe { self.0.as_ref() }
    }

    pub(crate) fn init(self) -> bool {
        match self.table().init {
            Some(init) => unsafe { init(self.as_ptr()) },
            None => false,
        }
    }

    pub(crate) fn destroy(self) {
        if let Some(destroy) = self.table().destroy {
            unsafe { destroy(self.as_ptr()) };
        }
    }

    pub(crate) fn activate(self, sample_rate: f64, min_frames: u32, max_frames: u32) -> bool {
        match self.table().activate {
            Some(activate) => unsafe { activate(self.as_ptr(), sample_rate, min_frames, max_frames) },
            None => false,
        }
    }

    pub(crate) fn deactivate(self) {
        if let Some(deactivate) = self.table().deactivate {
            unsafe { deactivate(self.as_ptr()) };
        }
    }

    pub(crate) fn start_processing(self) -> bool {
        match self.table().start_processing {
            Some(start) => unsafe { start(self.as_ptr()) },
            None => false,
        }
    }

    pub(crate) fn stop_processing(self) {
        if let Some(stop) = self.table().stop_processing {
            unsafe { stop(self.as_ptr()) };
        }
    }

    pub(crate) fn process(self, process: &clap_process) -> clap_process_status {
        match self.table().process {
            Some(run) => unsafe { run(self.as_ptr(), process) },
            None => CLAP_PROCESS_ERROR,
        }
    }

    pub(crate) fn on_main_thread(self) {
        if let Some(callback) = self.table().on_main_thread {
            unsafe { callback(self.as_ptr()) };
        }
    }

    fn extension<T>(self, id: &CStr) -> Option<Ext<T>> {
        let get = self.table().get_extension?;
        let ptr = unsafe { get(self.as_ptr(), id.as_ptr()) };
        NonNull::new(ptr as *mut T).map(Ext)
    }
}

/// A plugin extension table. Valid for the instance's lifetime.
pub(crate) struct Ext<T>(NonNull<T>);

impl<T> Clone for Ext<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for Ext<T> {}

// Safety: extension tables are immutable function-pointer structs.
unsafe impl<T> Send for Ext<T> {}
unsafe impl<T> Sync for Ext<T> {}

impl<T> std::ops::Deref for Ext<T> {
    type Target = T;

    fn deref(&self) -> &T {
        unsafe { self.0.as_ref() }
    }
}

/// Extensions queried once after `init`. `None` means unsupported.
#[derive(Clone, Copy, Default)]
pub(crate) struct PluginExtensions {
    pub params: Option<Ext<clap_plugin_params>>,
    pub remote_controls: Option<Ext<clap_plugin_remote_controls>>,
    pub audio_ports: Option<Ext<clap_plugin_audio_ports>>,
    pub gui: Option<Ext<clap_plugin_gui>>,
    pub timer_support: Option<Ext<clap_plugin_timer_support>>,
    pub posix_fd_support: Option<Ext<clap_plugin_posix_fd_support>>,
    pub thread_pool: Option<Ext<clap_plugin_thread_pool>>,
    pub preset_load: Option<Ext<clap_plugin_preset_load>>,
    pub state: Option<Ext<clap_plugin_state>>,
}

impl PluginExtensions {
    pub(crate) fn query(plugin: PluginInstance) -> Self {
        Self {
            params: plugin.extension(CLAP_EXT_PARAMS),
            remote_controls: plugin.extension(CLAP_EXT_REMOTE_CONTROLS),
            audio_ports: plugin.extension(CLAP_EXT_AUDIO_PORTS),
            gui: plugin.extension(CLAP_EXT_GUI),
            timer_support: plugin.extension(CLAP_EXT_TIMER_SUPPORT),
            posix_fd_support: plugin.extension(CLAP_EXT_POSIX_FD_SUPPORT),
            thread_pool: plugin.extension(CLAP_EXT_THREAD_POOL),
            preset_load: plugin.extension(CLAP_EXT_PRESET_LOAD),
            state: plugin.extension(CLAP_EXT_STATE),
        }
    }

    /// Names of the supported extensions, for logging.
    pub(crate) fn supported(&self) -> Vec<&'static str> {
        let table = [
            ("params", self.params.is_some()),
            ("remote-controls", self.remote_controls.is_some()),
            ("audio-ports", self.audio_ports.is_some()),
            ("gui", self.gui.is_some()),
            ("timer-support", self.timer_support.is_some()),
            ("posix-fd-support", self.posix_fd_support.is_some()),
            ("thread-pool", self.thread_pool.is_some()),
            ("preset-load", self.preset_load.is_some()),
            ("state", self.state.is_some()),
        ];
        table
            .into_iter()
            .filter_map(|(name, present)| present.then_some(name))
            .collect()
    }
}

impl Ext<clap_plugin_params> {
    pub(crate) fn count(&self, plugin: PluginInstance) -> u32 {
        match self.count {
            Some(count) => unsafe { count(plugin.as_ptr()) },
            None => 0,
        }
    }

    pub(crate) fn info(&self, plugin: PluginInstance, index: u32) -> Option<ParamInfo> {
        let get_info = self.get_info?;
        let mut info = MaybeUninit::<clap_param_info>::zeroed();
        if unsafe { get_info(plugin.as_ptr(), index, info.as_mut_ptr()) } {
            Some(ParamInfo::from_raw(unsafe { info.assume_init_ref() }))
        } else {
            None
        }
    }

    pub(crate) fn value(&self, plugin: PluginInstance, id: ParamId) -> Option<f64> {
        let get_value = self.get_value?;
        let mut value = 0.0;
        unsafe { get_value(plugin.as_ptr(), id, &mut value) }.then_some(value)
    }

    pub(crate) fn value_to_text(&self, plugin: PluginInstance, id: ParamId, value: f64) -> Option<String> {
        let to_text = self.value_to_text?;
        let mut buffer = [0 as c_char; PARAM_TEXT_SIZE];
        let ok = unsafe {
            to_text(
                plugin.as_ptr(),
                id,
                value,
                buffer.as_mut_ptr(),
                PARAM_TEXT_SIZE as u32,
            )
        };
        if !ok {
            return None;
        }
        // Force termination in case the plugin filled the whole buffer.
        buffer[PARAM_TEXT_SIZE - 1] = 0;
        Some(crate::metadata::c_buffer_string(&buffer))
    }

    pub(crate) fn text_to_value(&self, plugin: PluginInstance, id: ParamId, text: &str) -> Option<f64> {
        let to_value = self.text_to_value?;
        let text = CString::new(text).ok()?;
        let mut value = 0.0;
        unsafe { to_value(plugin.as_ptr(), id, text.as_ptr(), &mut value) }.then_some(value)
    }

    pub(crate) fn flush(&self, plugin: PluginInstance, input: &InputEvents<'_>, output: &OutputEvents<'_>) {
        if let Some(flush) = self.flush {
            unsafe { flush(plugin.as_ptr(), input.as_raw(), output.as_raw()) };
        }
    }
}

impl Ext<clap_plugin_remote_controls> {
    pub(crate) fn pages(&self, plugin: PluginInstance) -> Vec<QuickControlsPage> {
        let (Some(count), Some(get)) = (self.count, self.get) else {
            return Vec::new();
        };
        let count = unsafe { count(plugin.as_ptr()) };
        (0..count)
            .filter_map(|index| {
                let mut page = MaybeUninit::<clap_remote_controls_page>::zeroed();
                unsafe { get(plugin.as_ptr(), index, page.as_mut_ptr()) }
                    .then(|| QuickControlsPage::from_raw(unsafe { page.assume_init_ref() }))
            })
            .collect()
    }
}

impl Ext<clap_plugin_audio_ports> {
    /// Channel count of the first port in each direction.
    pub(crate) fn main_channels(&self, plugin: PluginInstance, is_input: bool) -> usize {
        let (Some(count), Some(get)) = (self.count, self.get) else {
            return 0;
        };
        if unsafe { count(plugin.as_ptr(), is_input) } == 0 {
            return 0;
        }
        let mut info = MaybeUninit::<clap_audio_port_info>::zeroed();
        if unsafe { get(plugin.as_ptr(), 0, is_input, info.as_mut_ptr()) } {
            unsafe { info.assume_init_ref() }.channel_count as usize
        } else {
            0
        }
    }
}

impl Ext<clap_plugin_thread_pool> {
    pub(crate) fn exec(&self, plugin: PluginInstance, task_index: u32) {
        if let Some(exec) = self.exec {
            unsafe { exec(plugin.as_ptr(), task_index) };
        }
    }
}

impl Ext<clap_plugin_timer_support> {
    pub(crate) fn on_timer(&self, plugin: PluginInstance, timer_id: u32) {
        if let Some(on_timer) = self.on_timer {
            unsafe { on_timer(plugin.as_ptr(), timer_id) };
        }
    }
}

impl Ext<clap_plugin_posix_fd_support> {
    pub(crate) fn on_fd(&self, plugin: PluginInstance, fd: i32, flags: u32) {
        if let Some(on_fd) = self.on_fd {
            unsafe { on_fd(plugin.as_ptr(), fd, flags) };
        }
    }
}

impl Ext<clap_plugin_state> {
    pub(crate) fn save(&self, plugin: PluginInstance) -> Option<Vec<u8>> {
        let save = self.save?;
        let mut buffer = Vec::new();
        let ok = {
            let stream = OutputStream::new(&mut buffer);
            unsafe { save(plugin.as_ptr(), stream.as_raw()) }
        };
        ok.then_some(buffer)
    }

    pub(crate) fn load(&self, plugin: PluginInstance, data: &[u8]) -> bool {
        let Some(load) = self.load else {
            return false;
        };
        let stream = InputStream::new(data);
        unsafe { load(plugin.as_ptr(), stream.as_raw()) }
    }
}

impl Ext<clap_plugin_preset_load> {
    pub(crate) fn from_file(&self, plugin: PluginInstance, path: &CStr) -> bool {
        match self.from_location {
            Some(load) => unsafe {
                load(
                    plugin.as_ptr(),
                    PRESET_LOCATION_FILE,
                    path.as_ptr(),
                    std::ptr::null(),
                )
            },
            None => false,
        }
    }
}

impl Ext<clap_plugin_gui> {
    pub(crate) fn is_api_supported(&self, plugin: PluginInstance, api: &CStr, floating: bool) -> bool {
        match self.is_api_supported {
            Some(f) => unsafe { f(plugin.as_ptr(), api.as_ptr(), floating) },
            None => false,
        }
    }

    pub(crate) fn create(&self, plugin: PluginInstance, api: &CStr, floating: bool) -> bool {
        match self.create {
            Some(f) => unsafe { f(plugin.as_ptr(), api.as_ptr(), floating) },
            None => false,
        }
    }

    pub(crate) fn destroy(&self, plugin: PluginInstance) {
        if let Some(f) = self.destroy {
            unsafe { f(plugin.as_ptr()) };
        }
    }

    pub(crate) fn size(&self, plugin: PluginInstance) -> Option<(u32, u32)> {
        let get_size = self.get_size?;
        let (mut width, mut height) = (0, 0);
        unsafe { get_size(plugin.as_ptr(), &mut width, &mut height) }.then_some((width, height))
    }

    pub(crate) fn can_resize(&self, plugin: PluginInstance) -> bool {
        match self.can_resize {
            Some(f) => unsafe { f(plugin.as_ptr()) },
            None => false,
        }
    }

    pub(crate) fn set_size(&self, plugin: PluginInstance, width: u32, height: u32) -> bool {
        match self.set_size {
            Some(f) => unsafe { f(plugin.as_ptr(), width, height) },
            None => false,
        }
    }

    pub(crate) fn set_parent(&self, plugin: PluginInstance, window: &clap_window) -> bool {
        match self.set_parent {
            Some(f) => unsafe { f(plugin.as_ptr(), window) },
            None => false,
        }
    }

    pub(crate) fn show(&self, plugin: PluginInstance) -> bool {
        match self.show {
            Some(f) => unsafe { f(plugin.as_ptr()) },
            None => false,
        }
    }

    pub(crate) fn hide(&self, plugin: PluginInstance) -> bool {
        match self.hide {
            Some(f) => unsafe { f(plugin.as_ptr()) },
            None => false,
        }
    }
}

/// Plugin id from the instance's own descriptor.
pub(crate) fn instance_id(plugin: PluginInstance) -> String {
    let desc = plugin.table().desc;
    if desc.is_null() {
        return String::new();
    }
    unsafe { c_string((*desc).id) }
}

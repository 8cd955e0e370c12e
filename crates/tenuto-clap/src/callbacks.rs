//! Host-side implementation of the plugin's callback surface.
//!
//! Every callback resolves its [`HostContext`] from `host_data` and only
//! records what was asked: flags, pending ids or registrations. Callbacks
//! the protocol restricts to the main thread assert it; a violation panics,
//! which aborts the process at the `extern "C"` boundary.

use crate::context::HostContext;
use crate::metadata::c_string;
use crate::requests::Request;
use clap_sys::ext::gui::{clap_host_gui, CLAP_EXT_GUI};
use clap_sys::ext::log::{
    clap_host_log, clap_log_severity, CLAP_EXT_LOG, CLAP_LOG_DEBUG, CLAP_LOG_ERROR,
    CLAP_LOG_FATAL, CLAP_LOG_HOST_MISBEHAVING, CLAP_LOG_INFO, CLAP_LOG_PLUGIN_MISBEHAVING,
    CLAP_LOG_WARNING,
};
use clap_sys::ext::params::{clap_host_params, CLAP_EXT_PARAMS};
use clap_sys::ext::posix_fd_support::{clap_host_posix_fd_support, CLAP_EXT_POSIX_FD_SUPPORT};
use clap_sys::ext::preset_load::{clap_host_preset_load, CLAP_EXT_PRESET_LOAD};
use clap_sys::ext::remote_controls::{clap_host_remote_controls, CLAP_EXT_REMOTE_CONTROLS};
use clap_sys::ext::state::{clap_host_state, CLAP_EXT_STATE};
use clap_sys::ext::thread_check::{clap_host_thread_check, CLAP_EXT_THREAD_CHECK};
use clap_sys::ext::thread_pool::{clap_host_thread_pool, CLAP_EXT_THREAD_POOL};
use clap_sys::ext::timer_support::{clap_host_timer_support, CLAP_EXT_TIMER_SUPPORT};
use clap_sys::host::clap_host;
use std::ffi::{c_char, c_void, CStr};
use std::ptr;
use std::sync::atomic::Ordering;
use std::time::Instant;
use tenuto_core::thread_check;

/// One host extension, as handed out by `get_extension`.
#[derive(Clone, Copy)]
enum HostExtension {
    Log(&'static clap_host_log),
    ThreadCheck(&'static clap_host_thread_check),
    Params(&'static clap_host_params),
    RemoteControls(&'static clap_host_remote_controls),
    TimerSupport(&'static clap_host_timer_support),
    PosixFdSupport(&'static clap_host_posix_fd_support),
    ThreadPool(&'static clap_host_thread_pool),
    Gui(&'static clap_host_gui),
    State(&'static clap_host_state),
    PresetLoad(&'static clap_host_preset_load),
}

impl HostExtension {
    fn as_ptr(self) -> *const c_void {
        match self {
            HostExtension::Log(ext) => ext as *const _ as *const c_void,
            HostExtension::ThreadCheck(ext) => ext as *const _ as *const c_void,
            HostExtension::Params(ext) => ext as *const _ as *const c_void,
            HostExtension::RemoteControls(ext) => ext as *const _ as *const c_void,
            HostExtension::TimerSupport(ext) => ext as *const _ as *const c_void,
            HostExtension::PosixFdSupport(ext) => ext as *const _ as *const c_void,
            HostExtension::ThreadPool(ext) => ext as *const _ as *const c_void,
            HostExtension::Gui(ext) => ext as *const _ as *const c_void,
            HostExtension::State(ext) => ext as *const _ as *const c_void,
            HostExtension::PresetLoad(ext) => ext as *const _ as *const c_void,
        }
    }
}

static HOST_LOG: clap_host_log = clap_host_log { log: Some(log) };

static HOST_THREAD_CHECK: clap_host_thread_check = clap_host_thread_check {
    is_main_thread: Some(is_main_thread),
    is_audio_thread: Some(is_audio_thread),
};

static HOST_PARAMS: clap_host_params = clap_host_params {
    rescan: Some(params_rescan),
    clear: Some(params_clear),
    request_flush: Some(params_request_flush),
};

static HOST_REMOTE_CONTROLS: clap_host_remote_controls = clap_host_remote_controls {
    changed: Some(remote_controls_changed),
    suggest_page: Some(remote_controls_suggest_page),
};

static HOST_TIMER_SUPPORT: clap_host_timer_support = clap_host_timer_support {
    register_timer: Some(register_timer),
    unregister_timer: Some(unregister_timer),
};

static HOST_POSIX_FD_SUPPORT: clap_host_posix_fd_support = clap_host_posix_fd_support {
    register_fd: Some(register_fd),
    modify_fd: Some(modify_fd),
    unregister_fd: Some(unregister_fd),
};

static HOST_THREAD_POOL: clap_host_thread_pool = clap_host_thread_pool {
    request_exec: Some(request_exec),
};

static HOST_GUI: clap_host_gui = clap_host_gui {
    resize_hints_changed: Some(gui_resize_hints_changed),
    request_resize: Some(gui_request_resize),
    request_show: Some(gui_request_show),
    request_hide: Some(gui_request_hide),
    closed: Some(gui_closed),
};

static HOST_STATE: clap_host_state = clap_host_state {
    mark_dirty: Some(state_mark_dirty),
};

static HOST_PRESET_LOAD: clap_host_preset_load = clap_host_preset_load {
    on_error: Some(preset_on_error),
    loaded: Some(preset_loaded),
};

/// Every extension the host implements, keyed by extension id.
static HOST_EXTENSIONS: [(&CStr, HostExtension); 10] = [
    (CLAP_EXT_LOG, HostExtension::Log(&HOST_LOG)),
    (CLAP_EXT_THREAD_CHECK, HostExtension::ThreadCheck(&HOST_THREAD_CHECK)),
    (CLAP_EXT_PARAMS, HostExtension::Params(&HOST_PARAMS)),
    (
        CLAP_EXT_REMOTE_CONTROLS,
        HostExtension::RemoteControls(&HOST_REMOTE_CONTROLS),
    ),
    (
        CLAP_EXT_TIMER_SUPPORT,
        HostExtension::TimerSupport(&HOST_TIMER_SUPPORT),
    ),
    (
        CLAP_EXT_POSIX_FD_SUPPORT,
        HostExtension::PosixFdSupport(&HOST_POSIX_FD_SUPPORT),
    ),
    (CLAP_EXT_THREAD_POOL, HostExtension::ThreadPool(&HOST_THREAD_POOL)),
    (CLAP_EXT_GUI, HostExtension::Gui(&HOST_GUI)),
    (CLAP_EXT_STATE, HostExtension::State(&HOST_STATE)),
    (CLAP_EXT_PRESET_LOAD, HostExtension::PresetLoad(&HOST_PRESET_LOAD)),
];

/// Resolve the context behind a host pointer handed back by the plugin.
unsafe fn context<'a>(host: *const clap_host) -> Option<&'a HostContext> {
    if host.is_null() {
        return None;
    }
    ((*host).host_data as *const HostContext).as_ref()
}

fn lookup(id: &CStr) -> Option<HostExtension> {
    HOST_EXTENSIONS
        .iter()
        .find(|(ext_id, _)| *ext_id == id)
        .map(|&(_, ext)| ext)
}

pub(crate) unsafe extern "C" fn get_extension(
    _host: *const clap_host,
    extension_id: *const c_char,
) -> *const c_void {
    if extension_id.is_null() {
        return ptr::null();
    }
    match lookup(CStr::from_ptr(extension_id)) {
        Some(ext) => ext.as_ptr(),
        None => ptr::null(),
    }
}

pub(crate) unsafe extern "C" fn request_restart(host: *const clap_host) {
    if let Some(ctx) = context(host) {
        ctx.requests.set(Request::RESTART);
    }
}

pub(crate) unsafe extern "C" fn request_process(host: *const clap_host) {
    if let Some(ctx) = context(host) {
        ctx.requests.set(Request::PROCESS);
    }
}

pub(crate) unsafe extern "C" fn request_callback(host: *const clap_host) {
    if let Some(ctx) = context(host) {
        ctx.requests.set(Request::CALLBACK);
    }
}

unsafe extern "C" fn log(_host: *const clap_host, severity: clap_log_severity, msg: *const c_char) {
    let message = c_string(msg);
    match severity {
        CLAP_LOG_DEBUG => tracing::debug!(target: "tenuto_clap::plugin", "{message}"),
        CLAP_LOG_INFO => tracing::info!(target: "tenuto_clap::plugin", "{message}"),
        CLAP_LOG_WARNING => tracing::warn!(target: "tenuto_clap::plugin", "{message}"),
        CLAP_LOG_ERROR | CLAP_LOG_FATAL => {
            tracing::error!(target: "tenuto_clap::plugin", "{message}")
        }
        CLAP_LOG_HOST_MISBEHAVING => {
            tracing::error!(target: "tenuto_clap::plugin", misbehaving = "host", "{message}")
        }
        CLAP_LOG_PLUGIN_MISBEHAVING => {
            tracing::error!(target: "tenuto_clap::plugin", misbehaving = "plugin", "{message}")
        }
        other => tracing::info!(target: "tenuto_clap::plugin", severity = other, "{message}"),
    }
}

unsafe extern "C" fn is_main_thread(host: *const clap_host) -> bool {
    context(host).is_some_and(|ctx| ctx.main_thread.is_current())
}

unsafe extern "C" fn is_audio_thread(_host: *const clap_host) -> bool {
    thread_check::is_audio_thread()
}

unsafe extern "C" fn params_rescan(host: *const clap_host, flags: u32) {
    let Some(ctx) = context(host) else { return };
    ctx.main_thread.assert_current("clap_host_params.rescan");
    ctx.rescan_flags.fetch_or(flags, Ordering::AcqRel);
    ctx.requests.set(Request::PARAMS_RESCAN);
}

unsafe extern "C" fn params_clear(host: *const clap_host, param_id: u32, flags: u32) {
    let Some(ctx) = context(host) else { return };
    ctx.main_thread.assert_current("clap_host_params.clear");
    ctx.param_clears.lock().push((param_id, flags));
    ctx.requests.set(Request::PARAMS_CLEAR);
}

unsafe extern "C" fn params_request_flush(host: *const clap_host) {
    let Some(ctx) = context(host) else { return };
    if ctx.state.load().is_active() {
        ctx.requests.set(Request::PROCESS);
    } else {
        ctx.requests.set(Request::PARAM_FLUSH);
    }
}

unsafe extern "C" fn remote_controls_changed(host: *const clap_host) {
    let Some(ctx) = context(host) else { return };
    ctx.main_thread.assert_current("clap_host_remote_controls.changed");
    ctx.requests.set(Request::QUICK_CONTROLS_CHANGED);
}

unsafe extern "C" fn remote_controls_suggest_page(host: *const clap_host, page_id: u32) {
    let Some(ctx) = context(host) else { return };
    ctx.main_thread.assert_current("clap_host_remote_controls.suggest_page");
    ctx.suggested_page.store(page_id, Ordering::Release);
    ctx.requests.set(Request::QUICK_CONTROLS_SUGGESTED);
}

unsafe extern "C" fn register_timer(host: *const clap_host, period_ms: u32, timer_id: *mut u32) -> bool {
    let Some(ctx) = context(host) else { return false };
    ctx.main_thread.assert_current("clap_host_timer_support.register_timer");
    if timer_id.is_null() {
        return false;
    }
    match ctx.timers.lock().register(period_ms, Instant::now()) {
        Some(id) => {
            *timer_id = id;
            tracing::debug!(id, period_ms, "Timer registered");
            true
        }
        None => {
            tracing::warn!(period_ms, "Timer ids exhausted");
            false
        }
    }
}

unsafe extern "C" fn unregister_timer(host: *const clap_host, timer_id: u32) -> bool {
    let Some(ctx) = context(host) else { return false };
    ctx.main_thread.assert_current("clap_host_timer_support.unregister_timer");
    ctx.timers.lock().unregister(timer_id)
}

unsafe extern "C" fn register_fd(host: *const clap_host, fd: i32, flags: u32) -> bool {
    let Some(ctx) = context(host) else { return false };
    ctx.main_thread.assert_current("clap_host_posix_fd_support.register_fd");
    let ok = ctx.fds.lock().register(fd, flags);
    if !ok {
        tracing::warn!(fd, flags, "Rejected posix fd registration");
    }
    ok
}

unsafe extern "C" fn modify_fd(host: *const clap_host, fd: i32, flags: u32) -> bool {
    let Some(ctx) = context(host) else { return false };
    ctx.main_thread.assert_current("clap_host_posix_fd_support.modify_fd");
    ctx.fds.lock().modify(fd, flags)
}

unsafe extern "C" fn unregister_fd(host: *const clap_host, fd: i32) -> bool {
    let Some(ctx) = context(host) else { return false };
    ctx.main_thread.assert_current("clap_host_posix_fd_support.unregister_fd");
    ctx.fds.lock().unregister(fd)
}

unsafe extern "C" fn request_exec(host: *const clap_host, num_tasks: u32) -> bool {
    let Some(ctx) = context(host) else { return false };
    thread_check::assert_audio_thread("clap_host_thread_pool.request_exec");
    match &*ctx.thread_pool.load() {
        Some(pool) => pool.exec(num_tasks).is_ok(),
        None => false,
    }
}

unsafe extern "C" fn gui_resize_hints_changed(host: *const clap_host) {
    if let Some(ctx) = context(host) {
        ctx.requests.set(Request::GUI_RESIZE_HINTS);
    }
}

unsafe extern "C" fn gui_request_resize(host: *const clap_host, width: u32, height: u32) -> bool {
    let Some(ctx) = context(host) else { return false };
    ctx.set_gui_resize(width, height);
    ctx.requests.set(Request::GUI_RESIZE);
    true
}

unsafe extern "C" fn gui_request_show(host: *const clap_host) -> bool {
    let Some(ctx) = context(host) else { return false };
    ctx.requests.set(Request::GUI_SHOW);
    true
}

unsafe extern "C" fn gui_request_hide(host: *const clap_host) -> bool {
    let Some(ctx) = context(host) else { return false };
    ctx.requests.set(Request::GUI_HIDE);
    true
}

unsafe extern "C" fn gui_closed(host: *const clap_host, was_destroyed: bool) {
    let Some(ctx) = context(host) else { return };
    ctx.main_thread.assert_current("clap_host_gui.closed");
    ctx.gui_closed_destroyed.store(was_destroyed, Ordering::Release);
    ctx.requests.set(Request::GUI_CLOSED);
}

unsafe extern "C" fn state_mark_dirty(host: *const clap_host) {
    let Some(ctx) = context(host) else { return };
    ctx.main_thread.assert_current("clap_host_state.mark_dirty");
    ctx.requests.set(Request::STATE_DIRTY);
}

unsafe extern "C" fn preset_on_error(
    host: *const clap_host,
    _location_kind: u32,
    location: *const c_char,
    _load_key: *const c_char,
    os_error: i32,
    msg: *const c_char,
) {
    let Some(ctx) = context(host) else { return };
    ctx.main_thread.assert_current("clap_host_preset_load.on_error");
    let location = c_string(location);
    let message = c_string(msg);
    tracing::warn!(%location, os_error, "Preset load failed: {message}");
    *ctx.preset_error.lock() = Some(if os_error != 0 {
        format!("{message} (os error {os_error})")
    } else {
        message
    });
}

unsafe extern "C" fn preset_loaded(
    host: *const clap_host,
    _location_kind: u32,
    _location: *const c_char,
    _load_key: *const c_char,
) {
    let Some(ctx) = context(host) else { return };
    ctx.main_thread.assert_current("clap_host_preset_load.loaded");
    ctx.preset_loaded.store(true, Ordering::Release);
}

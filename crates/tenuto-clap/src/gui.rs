//! Plugin editor embedding.
//!
//! The embedding shell supplies a native window handle. The host asks the
//! plugin to embed into it using the platform's window API and falls back to
//! a floating window when the plugin only supports that.

use clap_sys::ext::gui::{
    clap_window, clap_window_handle, CLAP_WINDOW_API_COCOA, CLAP_WINDOW_API_WIN32,
    CLAP_WINDOW_API_X11,
};
use std::ffi::{c_void, CStr};

/// A native parent window owned by the embedding shell.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowHandle {
    /// X11 window id
    X11(u64),
    /// `NSView*`
    Cocoa(*mut c_void),
    /// `HWND`
    Win32(*mut c_void),
}

// Safety: the handle is an opaque token for the windowing system, only
// dereferenced by the plugin on the main thread.
unsafe impl Send for WindowHandle {}

impl WindowHandle {
    pub(crate) fn api(self) -> &'static CStr {
        match self {
            WindowHandle::X11(_) => CLAP_WINDOW_API_X11,
            WindowHandle::Cocoa(_) => CLAP_WINDOW_API_COCOA,
            WindowHandle::Win32(_) => CLAP_WINDOW_API_WIN32,
        }
    }

    pub(crate) fn to_raw(self) -> clap_window {
        let specific = match self {
            WindowHandle::X11(id) => clap_window_handle { x11: id },
            WindowHandle::Cocoa(view) => clap_window_handle { cocoa: view },
            WindowHandle::Win32(hwnd) => clap_window_handle { win32: hwnd },
        };
        clap_window {
            api: self.api().as_ptr(),
            specific,
        }
    }
}

/// Window API of the platform this host was built for.
pub fn platform_api() -> &'static CStr {
    #[cfg(target_os = "macos")]
    let api = CLAP_WINDOW_API_COCOA;
    #[cfg(target_os = "windows")]
    let api = CLAP_WINDOW_API_WIN32;
    #[cfg(not(any(target_os = "macos", target_os = "windows")))]
    let api = CLAP_WINDOW_API_X11;
    api
}

/// How the plugin's editor ended up being shown.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EditorWindow {
    /// Embedded in the shell's window at this size.
    Embedded { width: u32, height: u32 },
    /// The plugin manages its own top-level window.
    Floating,
}

impl EditorWindow {
    pub fn is_floating(self) -> bool {
        self == EditorWindow::Floating
    }
}

/// Bookkeeping for a created editor.
#[derive(Debug, Clone, Copy)]
pub(crate) struct EditorSession {
    pub parent: WindowHandle,
    pub window: EditorWindow,
    pub visible: bool,
}

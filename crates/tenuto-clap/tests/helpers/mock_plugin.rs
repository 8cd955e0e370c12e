//! A CLAP plugin compiled into the test binary.
//!
//! Factory index 0 is a stereo gain, index 1 refuses to activate, index 2
//! fails every process call. Each instance shares a [`Probe`] with the test
//! that created it: the probe records what the plugin received and lets the
//! test call host callbacks the way a plugin would.

use clap_sys::entry::clap_plugin_entry;
use clap_sys::events::{
    clap_event_header, clap_event_note, clap_event_param_gesture, clap_event_param_mod,
    clap_event_param_value, clap_input_events, clap_output_events, CLAP_CORE_EVENT_SPACE_ID,
    CLAP_EVENT_NOTE_ON, CLAP_EVENT_PARAM_GESTURE_BEGIN, CLAP_EVENT_PARAM_GESTURE_END,
    CLAP_EVENT_PARAM_MOD, CLAP_EVENT_PARAM_VALUE,
};
use clap_sys::ext::audio_ports::{
    clap_audio_port_info, clap_plugin_audio_ports, CLAP_AUDIO_PORT_IS_MAIN, CLAP_EXT_AUDIO_PORTS,
    CLAP_PORT_STEREO,
};
use clap_sys::ext::gui::{clap_plugin_gui, clap_window, CLAP_EXT_GUI, CLAP_WINDOW_API_X11};
use clap_sys::ext::params::{
    clap_host_params, clap_param_info, clap_plugin_params, CLAP_EXT_PARAMS,
    CLAP_PARAM_IS_AUTOMATABLE, CLAP_PARAM_IS_MODULATABLE, CLAP_PARAM_IS_READONLY,
};
use clap_sys::ext::posix_fd_support::{
    clap_host_posix_fd_support, clap_plugin_posix_fd_support, CLAP_EXT_POSIX_FD_SUPPORT,
};
use clap_sys::ext::preset_load::{clap_host_preset_load, clap_plugin_preset_load, CLAP_EXT_PRESET_LOAD};
use clap_sys::ext::remote_controls::{
    clap_host_remote_controls, clap_plugin_remote_controls, clap_remote_controls_page,
    CLAP_EXT_REMOTE_CONTROLS, CLAP_REMOTE_CONTROLS_COUNT,
};
use clap_sys::ext::state::{clap_host_state, clap_plugin_state, CLAP_EXT_STATE};
use clap_sys::ext::thread_check::{clap_host_thread_check, CLAP_EXT_THREAD_CHECK};
use clap_sys::ext::thread_pool::{clap_host_thread_pool, clap_plugin_thread_pool, CLAP_EXT_THREAD_POOL};
use clap_sys::ext::timer_support::{
    clap_host_timer_support, clap_plugin_timer_support, CLAP_EXT_TIMER_SUPPORT,
};
use clap_sys::factory::plugin_factory::{clap_plugin_factory, CLAP_PLUGIN_FACTORY_ID};
use clap_sys::host::clap_host;
use clap_sys::id::CLAP_INVALID_ID;
use clap_sys::plugin::{clap_plugin, clap_plugin_descriptor};
use clap_sys::process::{
    clap_process, clap_process_status, CLAP_PROCESS_CONTINUE, CLAP_PROCESS_ERROR,
};
use clap_sys::stream::{clap_istream, clap_ostream};
use clap_sys::version::CLAP_VERSION;
use parking_lot::Mutex;
use std::cell::RefCell;
use std::ffi::{c_char, c_void, CStr};
use std::mem::size_of;
use std::ptr;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;

pub const GAIN: u32 = 1;
pub const MIX: u32 = 2;
pub const METER: u32 = 3;

pub const PAGE_MAIN: u32 = 10;
pub const PAGE_EXTRA: u32 = 11;

pub const GAIN_INDEX: u32 = 0;
pub const FAILS_ACTIVATE_INDEX: u32 = 1;
pub const FAILS_PROCESS_INDEX: u32 = 2;

/// Distinct non-null cookie per parameter.
pub fn cookie_for(id: u32) -> usize {
    0x1000 + id as usize
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MockKind {
    Gain,
    FailsActivate,
    FailsProcess,
}

#[derive(Debug, Clone)]
pub struct MockParam {
    pub id: u32,
    pub name: &'static str,
    pub min: f64,
    pub max: f64,
    pub default: f64,
    pub flags: u32,
    pub value: f64,
}

impl MockParam {
    pub fn new(id: u32, name: &'static str, min: f64, max: f64, default: f64, flags: u32) -> Self {
        Self {
            id,
            name,
            min,
            max,
            default,
            flags,
            value: default,
        }
    }
}

fn default_params() -> Vec<MockParam> {
    vec![
        MockParam::new(GAIN, "Gain", 0.0, 2.0, 1.0, CLAP_PARAM_IS_AUTOMATABLE),
        MockParam::new(
            MIX,
            "Mix",
            0.0,
            1.0,
            0.5,
            CLAP_PARAM_IS_AUTOMATABLE | CLAP_PARAM_IS_MODULATABLE,
        ),
        MockParam::new(METER, "Meter", 0.0, 1.0, 0.0, CLAP_PARAM_IS_READONLY),
    ]
}

fn default_pages() -> Vec<(u32, &'static str, [u32; CLAP_REMOTE_CONTROLS_COUNT])> {
    let mut main = [CLAP_INVALID_ID; CLAP_REMOTE_CONTROLS_COUNT];
    main[0] = GAIN;
    main[1] = MIX;
    let mut extra = [CLAP_INVALID_ID; CLAP_REMOTE_CONTROLS_COUNT];
    extra[0] = METER;
    vec![(PAGE_MAIN, "Main", main), (PAGE_EXTRA, "Extra", extra)]
}

/// What one plugin instance saw, and a back door to its host.
pub struct Probe {
    host: *const clap_host,
    pub kind: MockKind,
    pub params: Mutex<Vec<MockParam>>,
    pub pages: Mutex<Vec<(u32, &'static str, [u32; CLAP_REMOTE_CONTROLS_COUNT])>>,

    /// Parameter values delivered by process or flush, in order.
    pub received: Mutex<Vec<(u32, f64)>>,
    pub received_cookies: Mutex<Vec<usize>>,
    pub modulations: Mutex<Vec<(u32, f64)>>,
    pub notes: AtomicU32,

    pub activations: AtomicU32,
    pub deactivations: AtomicU32,
    pub starts: AtomicU32,
    pub stops: AtomicU32,
    pub processed: AtomicU32,
    pub flushes: AtomicU32,
    pub main_thread_calls: AtomicU32,
    pub timer_fires: AtomicU32,
    pub fd_fires: AtomicU32,
    pub destroyed: AtomicBool,

    /// Tasks to request from the host pool during the next process call.
    pub pool_tasks: AtomicU32,
    pub pool_granted: AtomicBool,
    pub tasks_run: AtomicU32,

    pub gui_created: AtomicBool,
    pub gui_visible: AtomicBool,
    pub gui_size: Mutex<(u32, u32)>,
}

// Safety: the host pointer is only used to reach the host's function tables.
unsafe impl Send for Probe {}
unsafe impl Sync for Probe {}

impl Probe {
    fn new(host: *const clap_host, kind: MockKind) -> Self {
        Self {
            host,
            kind,
            params: Mutex::new(default_params()),
            pages: Mutex::new(default_pages()),
            received: Mutex::new(Vec::new()),
            received_cookies: Mutex::new(Vec::new()),
            modulations: Mutex::new(Vec::new()),
            notes: AtomicU32::new(0),
            activations: AtomicU32::new(0),
            deactivations: AtomicU32::new(0),
            starts: AtomicU32::new(0),
            stops: AtomicU32::new(0),
            processed: AtomicU32::new(0),
            flushes: AtomicU32::new(0),
            main_thread_calls: AtomicU32::new(0),
            timer_fires: AtomicU32::new(0),
            fd_fires: AtomicU32::new(0),
            destroyed: AtomicBool::new(false),
            pool_tasks: AtomicU32::new(0),
            pool_granted: AtomicBool::new(false),
            tasks_run: AtomicU32::new(0),
            gui_created: AtomicBool::new(false),
            gui_visible: AtomicBool::new(false),
            gui_size: Mutex::new((640, 480)),
        }
    }

    pub fn value(&self, id: u32) -> Option<f64> {
        self.params.lock().iter().find(|p| p.id == id).map(|p| p.value)
    }

    pub fn set_value(&self, id: u32, value: f64) {
        if let Some(param) = self.params.lock().iter_mut().find(|p| p.id == id) {
            param.value = value;
        }
    }

    pub fn count(counter: &AtomicU32) -> u32 {
        counter.load(Ordering::SeqCst)
    }

    fn host_ext<T>(&self, id: &CStr) -> &T {
        unsafe {
            let get_extension = (*self.host).get_extension.unwrap();
            let ext = get_extension(self.host, id.as_ptr()) as *const T;
            assert!(!ext.is_null(), "host lacks {id:?}");
            &*ext
        }
    }

    // Calls a plugin would make on its host.

    pub fn request_restart(&self) {
        unsafe { (*self.host).request_restart.unwrap()(self.host) }
    }

    pub fn request_process(&self) {
        unsafe { (*self.host).request_process.unwrap()(self.host) }
    }

    pub fn request_callback(&self) {
        unsafe { (*self.host).request_callback.unwrap()(self.host) }
    }

    pub fn is_main_thread(&self) -> bool {
        let ext: &clap_host_thread_check = self.host_ext(CLAP_EXT_THREAD_CHECK);
        unsafe { ext.is_main_thread.unwrap()(self.host) }
    }

    pub fn is_audio_thread(&self) -> bool {
        let ext: &clap_host_thread_check = self.host_ext(CLAP_EXT_THREAD_CHECK);
        unsafe { ext.is_audio_thread.unwrap()(self.host) }
    }

    pub fn rescan(&self, flags: u32) {
        let ext: &clap_host_params = self.host_ext(CLAP_EXT_PARAMS);
        unsafe { ext.rescan.unwrap()(self.host, flags) }
    }

    pub fn clear(&self, id: u32, flags: u32) {
        let ext: &clap_host_params = self.host_ext(CLAP_EXT_PARAMS);
        unsafe { ext.clear.unwrap()(self.host, id, flags) }
    }

    pub fn request_flush(&self) {
        let ext: &clap_host_params = self.host_ext(CLAP_EXT_PARAMS);
        unsafe { ext.request_flush.unwrap()(self.host) }
    }

    pub fn remote_controls_changed(&self) {
        let ext: &clap_host_remote_controls = self.host_ext(CLAP_EXT_REMOTE_CONTROLS);
        unsafe { ext.changed.unwrap()(self.host) }
    }

    pub fn suggest_page(&self, page: u32) {
        let ext: &clap_host_remote_controls = self.host_ext(CLAP_EXT_REMOTE_CONTROLS);
        unsafe { ext.suggest_page.unwrap()(self.host, page) }
    }

    pub fn register_timer(&self, period_ms: u32) -> Option<u32> {
        let ext: &clap_host_timer_support = self.host_ext(CLAP_EXT_TIMER_SUPPORT);
        let mut id = CLAP_INVALID_ID;
        unsafe { ext.register_timer.unwrap()(self.host, period_ms, &mut id) }.then_some(id)
    }

    pub fn unregister_timer(&self, id: u32) -> bool {
        let ext: &clap_host_timer_support = self.host_ext(CLAP_EXT_TIMER_SUPPORT);
        unsafe { ext.unregister_timer.unwrap()(self.host, id) }
    }

    pub fn register_fd(&self, fd: i32, flags: u32) -> bool {
        let ext: &clap_host_posix_fd_support = self.host_ext(CLAP_EXT_POSIX_FD_SUPPORT);
        unsafe { ext.register_fd.unwrap()(self.host, fd, flags) }
    }

    pub fn modify_fd(&self, fd: i32, flags: u32) -> bool {
        let ext: &clap_host_posix_fd_support = self.host_ext(CLAP_EXT_POSIX_FD_SUPPORT);
        unsafe { ext.modify_fd.unwrap()(self.host, fd, flags) }
    }

    pub fn unregister_fd(&self, fd: i32) -> bool {
        let ext: &clap_host_posix_fd_support = self.host_ext(CLAP_EXT_POSIX_FD_SUPPORT);
        unsafe { ext.unregister_fd.unwrap()(self.host, fd) }
    }

    pub fn mark_dirty(&self) {
        let ext: &clap_host_state = self.host_ext(CLAP_EXT_STATE);
        unsafe { ext.mark_dirty.unwrap()(self.host) }
    }

    pub fn gui_request_resize(&self, width: u32, height: u32) -> bool {
        let ext: &clap_sys::ext::gui::clap_host_gui = self.host_ext(CLAP_EXT_GUI);
        unsafe { ext.request_resize.unwrap()(self.host, width, height) }
    }

    pub fn gui_closed(&self, was_destroyed: bool) {
        let ext: &clap_sys::ext::gui::clap_host_gui = self.host_ext(CLAP_EXT_GUI);
        unsafe { ext.closed.unwrap()(self.host, was_destroyed) }
    }

    fn preset_error(&self, location: *const c_char, message: &CStr) {
        let ext: &clap_host_preset_load = self.host_ext(CLAP_EXT_PRESET_LOAD);
        unsafe { ext.on_error.unwrap()(self.host, 0, location, ptr::null(), 0, message.as_ptr()) }
    }

    fn preset_loaded(&self, location: *const c_char) {
        let ext: &clap_host_preset_load = self.host_ext(CLAP_EXT_PRESET_LOAD);
        unsafe { ext.loaded.unwrap()(self.host, 0, location, ptr::null()) }
    }
}

thread_local! {
    static LAST_CREATED: RefCell<Option<Arc<Probe>>> = const { RefCell::new(None) };
}

/// Probe of the instance most recently created on this thread.
pub fn last_probe() -> Arc<Probe> {
    LAST_CREATED.with(|last| last.borrow().clone().expect("no mock instance created"))
}

// ---------------------------------------------------------------------------
// Entry and factory
// ---------------------------------------------------------------------------

struct SyncDescriptor(clap_plugin_descriptor);
unsafe impl Sync for SyncDescriptor {}

struct Features([*const c_char; 2]);
unsafe impl Sync for Features {}

static FEATURES: Features = Features([c"audio-effect".as_ptr(), ptr::null()]);

macro_rules! descriptor {
    ($id:literal, $name:literal) => {
        SyncDescriptor(clap_plugin_descriptor {
            clap_version: CLAP_VERSION,
            id: $id.as_ptr(),
            name: $name.as_ptr(),
            vendor: c"Tenuto Tests".as_ptr(),
            url: ptr::null(),
            manual_url: ptr::null(),
            support_url: ptr::null(),
            version: c"1.0.0".as_ptr(),
            description: c"Test plugin".as_ptr(),
            features: FEATURES.0.as_ptr(),
        })
    };
}

static DESCRIPTORS: [SyncDescriptor; 3] = [
    descriptor!(c"org.tenuto.mock.gain", c"Mock Gain"),
    descriptor!(c"org.tenuto.mock.fails-activate", c"Mock Fails Activate"),
    descriptor!(c"org.tenuto.mock.fails-process", c"Mock Fails Process"),
];

const KINDS: [MockKind; 3] = [MockKind::Gain, MockKind::FailsActivate, MockKind::FailsProcess];

pub static MOCK_ENTRY: clap_plugin_entry = clap_plugin_entry {
    clap_version: CLAP_VERSION,
    init: Some(entry_init),
    deinit: Some(entry_deinit),
    get_factory: Some(entry_get_factory),
};

static FACTORY: clap_plugin_factory = clap_plugin_factory {
    get_plugin_count: Some(factory_count),
    get_plugin_descriptor: Some(factory_descriptor),
    create_plugin: Some(factory_create),
};

unsafe extern "C" fn entry_init(_path: *const c_char) -> bool {
    true
}

unsafe extern "C" fn entry_deinit() {}

unsafe extern "C" fn entry_get_factory(id: *const c_char) -> *const c_void {
    if CStr::from_ptr(id) == CLAP_PLUGIN_FACTORY_ID {
        &FACTORY as *const _ as *const c_void
    } else {
        ptr::null()
    }
}

unsafe extern "C" fn factory_count(_factory: *const clap_plugin_factory) -> u32 {
    DESCRIPTORS.len() as u32
}

unsafe extern "C" fn factory_descriptor(
    _factory: *const clap_plugin_factory,
    index: u32,
) -> *const clap_plugin_descriptor {
    match DESCRIPTORS.get(index as usize) {
        Some(desc) => &desc.0,
        None => ptr::null(),
    }
}

unsafe extern "C" fn factory_create(
    _factory: *const clap_plugin_factory,
    host: *const clap_host,
    plugin_id: *const c_char,
) -> *const clap_plugin {
    let plugin_id = CStr::from_ptr(plugin_id);
    let Some(index) = DESCRIPTORS
        .iter()
        .position(|d| CStr::from_ptr(d.0.id) == plugin_id)
    else {
        return ptr::null();
    };

    let probe = Arc::new(Probe::new(host, KINDS[index]));
    LAST_CREATED.with(|last| *last.borrow_mut() = Some(Arc::clone(&probe)));

    let instance = Box::into_raw(Box::new(Instance {
        raw: clap_plugin {
            desc: &DESCRIPTORS[index].0,
            plugin_data: ptr::null_mut(),
            init: Some(plugin_init),
            destroy: Some(plugin_destroy),
            activate: Some(plugin_activate),
            deactivate: Some(plugin_deactivate),
            start_processing: Some(plugin_start_processing),
            stop_processing: Some(plugin_stop_processing),
            reset: Some(plugin_reset),
            process: Some(plugin_process),
            get_extension: Some(plugin_get_extension),
            on_main_thread: Some(plugin_on_main_thread),
        },
        probe,
    }));
    (*instance).raw.plugin_data = instance as *mut c_void;
    &(*instance).raw
}

// ---------------------------------------------------------------------------
// Plugin
// ---------------------------------------------------------------------------

struct Instance {
    raw: clap_plugin,
    probe: Arc<Probe>,
}

unsafe fn probe<'a>(plugin: *const clap_plugin) -> &'a Probe {
    &(*((*plugin).plugin_data as *const Instance)).probe
}

unsafe extern "C" fn plugin_init(_plugin: *const clap_plugin) -> bool {
    true
}

unsafe extern "C" fn plugin_destroy(plugin: *const clap_plugin) {
    let instance = Box::from_raw((*plugin).plugin_data as *mut Instance);
    instance.probe.destroyed.store(true, Ordering::SeqCst);
}

unsafe extern "C" fn plugin_activate(
    plugin: *const clap_plugin,
    _sample_rate: f64,
    _min_frames: u32,
    _max_frames: u32,
) -> bool {
    let probe = probe(plugin);
    if probe.kind == MockKind::FailsActivate {
        return false;
    }
    probe.activations.fetch_add(1, Ordering::SeqCst);
    true
}

unsafe extern "C" fn plugin_deactivate(plugin: *const clap_plugin) {
    probe(plugin).deactivations.fetch_add(1, Ordering::SeqCst);
}

unsafe extern "C" fn plugin_start_processing(plugin: *const clap_plugin) -> bool {
    probe(plugin).starts.fetch_add(1, Ordering::SeqCst);
    true
}

unsafe extern "C" fn plugin_stop_processing(plugin: *const clap_plugin) {
    probe(plugin).stops.fetch_add(1, Ordering::SeqCst);
}

unsafe extern "C" fn plugin_reset(_plugin: *const clap_plugin) {}

unsafe extern "C" fn plugin_on_main_thread(plugin: *const clap_plugin) {
    probe(plugin).main_thread_calls.fetch_add(1, Ordering::SeqCst);
}

fn header<T>(type_: u16) -> clap_event_header {
    clap_event_header {
        size: size_of::<T>() as u32,
        time: 0,
        space_id: CLAP_CORE_EVENT_SPACE_ID,
        type_,
        flags: 0,
    }
}

/// Apply incoming events; a note-on is answered with a gesture on `MIX`
/// setting it to the note's velocity.
unsafe fn handle_events(
    probe: &Probe,
    input: *const clap_input_events,
    output: *const clap_output_events,
) {
    let size = (*input).size.unwrap()(input);
    for index in 0..size {
        let event = (*input).get.unwrap()(input, index);
        if (*event).space_id != CLAP_CORE_EVENT_SPACE_ID {
            continue;
        }
        match (*event).type_ {
            CLAP_EVENT_PARAM_VALUE => {
                let e = &*(event as *const clap_event_param_value);
                probe.set_value(e.param_id, e.value);
                probe.received.lock().push((e.param_id, e.value));
                probe.received_cookies.lock().push(e.cookie as usize);
            }
            CLAP_EVENT_PARAM_MOD => {
                let e = &*(event as *const clap_event_param_mod);
                probe.modulations.lock().push((e.param_id, e.amount));
            }
            CLAP_EVENT_NOTE_ON => {
                let e = &*(event as *const clap_event_note);
                probe.notes.fetch_add(1, Ordering::SeqCst);
                probe.set_value(MIX, e.velocity);

                let try_push = (*output).try_push.unwrap();
                let begin = clap_event_param_gesture {
                    header: header::<clap_event_param_gesture>(CLAP_EVENT_PARAM_GESTURE_BEGIN),
                    param_id: MIX,
                };
                let value = clap_event_param_value {
                    header: header::<clap_event_param_value>(CLAP_EVENT_PARAM_VALUE),
                    param_id: MIX,
                    cookie: ptr::null_mut(),
                    note_id: -1,
                    port_index: -1,
                    channel: -1,
                    key: -1,
                    value: e.velocity,
                };
                let end = clap_event_param_gesture {
                    header: header::<clap_event_param_gesture>(CLAP_EVENT_PARAM_GESTURE_END),
                    param_id: MIX,
                };
                try_push(output, &begin.header);
                try_push(output, &value.header);
                try_push(output, &end.header);
            }
            _ => {}
        }
    }
}

unsafe extern "C" fn plugin_process(
    plugin: *const clap_plugin,
    process: *const clap_process,
) -> clap_process_status {
    let probe = probe(plugin);
    probe.processed.fetch_add(1, Ordering::SeqCst);
    if probe.kind == MockKind::FailsProcess {
        return CLAP_PROCESS_ERROR;
    }
    let process = &*process;
    handle_events(probe, process.in_events, process.out_events);

    let tasks = probe.pool_tasks.swap(0, Ordering::SeqCst);
    if tasks > 0 {
        let pool: &clap_host_thread_pool = probe.host_ext(CLAP_EXT_THREAD_POOL);
        let granted = pool.request_exec.unwrap()(probe.host, tasks);
        probe.pool_granted.store(granted, Ordering::SeqCst);
    }

    let gain = probe.value(GAIN).unwrap_or(1.0) as f32;
    let frames = process.frames_count as usize;
    if process.audio_outputs_count > 0 {
        let outputs = &*process.audio_outputs;
        let inputs = (process.audio_inputs_count > 0).then(|| &*process.audio_inputs);
        for channel in 0..outputs.channel_count as usize {
            let out = *outputs.data32.add(channel);
            let input = inputs
                .filter(|i| (channel as u32) < i.channel_count)
                .map(|i| *i.data32.add(channel));
            for frame in 0..frames {
                let sample = input.map_or(0.0, |i| *i.add(frame));
                *out.add(frame) = sample * gain;
            }
        }
    }
    CLAP_PROCESS_CONTINUE
}

unsafe extern "C" fn plugin_get_extension(
    _plugin: *const clap_plugin,
    id: *const c_char,
) -> *const c_void {
    let id = CStr::from_ptr(id);
    let table: [(&CStr, *const c_void); 9] = [
        (CLAP_EXT_PARAMS, &PARAMS as *const _ as *const c_void),
        (CLAP_EXT_STATE, &STATE as *const _ as *const c_void),
        (CLAP_EXT_AUDIO_PORTS, &AUDIO_PORTS as *const _ as *const c_void),
        (CLAP_EXT_REMOTE_CONTROLS, &REMOTE_CONTROLS as *const _ as *const c_void),
        (CLAP_EXT_THREAD_POOL, &THREAD_POOL as *const _ as *const c_void),
        (CLAP_EXT_TIMER_SUPPORT, &TIMER_SUPPORT as *const _ as *const c_void),
        (CLAP_EXT_POSIX_FD_SUPPORT, &POSIX_FD_SUPPORT as *const _ as *const c_void),
        (CLAP_EXT_PRESET_LOAD, &PRESET_LOAD as *const _ as *const c_void),
        (CLAP_EXT_GUI, &GUI as *const _ as *const c_void),
    ];
    table
        .iter()
        .find(|(ext_id, _)| *ext_id == id)
        .map_or(ptr::null(), |&(_, ext)| ext)
}

// ---------------------------------------------------------------------------
// Extensions
// ---------------------------------------------------------------------------

static PARAMS: clap_plugin_params = clap_plugin_params {
    count: Some(params_count),
    get_info: Some(params_get_info),
    get_value: Some(params_get_value),
    value_to_text: Some(params_value_to_text),
    text_to_value: Some(params_text_to_value),
    flush: Some(params_flush),
};

fn write_str(dst: &mut [c_char], text: &str) {
    let len = text.len().min(dst.len() - 1);
    for (d, s) in dst.iter_mut().zip(text.bytes().take(len)) {
        *d = s as c_char;
    }
    dst[len] = 0;
}

unsafe extern "C" fn params_count(plugin: *const clap_plugin) -> u32 {
    probe(plugin).params.lock().len() as u32
}

unsafe extern "C" fn params_get_info(
    plugin: *const clap_plugin,
    index: u32,
    info: *mut clap_param_info,
) -> bool {
    let params = probe(plugin).params.lock();
    let Some(param) = params.get(index as usize) else {
        return false;
    };
    let info = &mut *info;
    info.id = param.id;
    info.flags = param.flags;
    info.cookie = cookie_for(param.id) as *mut c_void;
    write_str(&mut info.name, param.name);
    write_str(&mut info.module, "Main");
    info.min_value = param.min;
    info.max_value = param.max;
    info.default_value = param.default;
    true
}

unsafe extern "C" fn params_get_value(plugin: *const clap_plugin, id: u32, out: *mut f64) -> bool {
    match probe(plugin).value(id) {
        Some(value) => {
            *out = value;
            true
        }
        None => false,
    }
}

unsafe extern "C" fn params_value_to_text(
    _plugin: *const clap_plugin,
    id: u32,
    value: f64,
    buffer: *mut c_char,
    capacity: u32,
) -> bool {
    if id != GAIN || capacity == 0 {
        return false;
    }
    let buffer = std::slice::from_raw_parts_mut(buffer, capacity as usize);
    write_str(buffer, &format!("{value:.2}x"));
    true
}

unsafe extern "C" fn params_text_to_value(
    _plugin: *const clap_plugin,
    id: u32,
    text: *const c_char,
    out: *mut f64,
) -> bool {
    if id != GAIN {
        return false;
    }
    let text = CStr::from_ptr(text).to_string_lossy();
    match text.trim_end_matches('x').trim().parse() {
        Ok(value) => {
            *out = value;
            true
        }
        Err(_) => false,
    }
}

unsafe extern "C" fn params_flush(
    plugin: *const clap_plugin,
    input: *const clap_input_events,
    output: *const clap_output_events,
) {
    let probe = probe(plugin);
    probe.flushes.fetch_add(1, Ordering::SeqCst);
    handle_events(probe, input, output);
}

static STATE: clap_plugin_state = clap_plugin_state {
    save: Some(state_save),
    load: Some(state_load),
};

/// State layout: per parameter, its id then its value, little endian.
unsafe extern "C" fn state_save(plugin: *const clap_plugin, stream: *const clap_ostream) -> bool {
    let mut bytes = Vec::new();
    for param in probe(plugin).params.lock().iter() {
        bytes.extend_from_slice(&param.id.to_le_bytes());
        bytes.extend_from_slice(&param.value.to_le_bytes());
    }
    let write = (*stream).write.unwrap();
    let mut written = 0;
    while written < bytes.len() {
        let n = write(
            stream,
            bytes[written..].as_ptr() as *const c_void,
            (bytes.len() - written) as u64,
        );
        if n <= 0 {
            return false;
        }
        written += n as usize;
    }
    true
}

unsafe extern "C" fn state_load(plugin: *const clap_plugin, stream: *const clap_istream) -> bool {
    let read = (*stream).read.unwrap();
    let mut bytes = Vec::new();
    let mut chunk = [0u8; 7];
    loop {
        let n = read(stream, chunk.as_mut_ptr() as *mut c_void, chunk.len() as u64);
        if n < 0 {
            return false;
        }
        if n == 0 {
            break;
        }
        bytes.extend_from_slice(&chunk[..n as usize]);
    }
    if bytes.len() % 12 != 0 {
        return false;
    }
    let probe = probe(plugin);
    for record in bytes.chunks_exact(12) {
        let id = u32::from_le_bytes([record[0], record[1], record[2], record[3]]);
        let mut value = [0u8; 8];
        value.copy_from_slice(&record[4..]);
        probe.set_value(id, f64::from_le_bytes(value));
    }
    true
}

static AUDIO_PORTS: clap_plugin_audio_ports = clap_plugin_audio_ports {
    count: Some(audio_ports_count),
    get: Some(audio_ports_get),
};

unsafe extern "C" fn audio_ports_count(_plugin: *const clap_plugin, _is_input: bool) -> u32 {
    1
}

unsafe extern "C" fn audio_ports_get(
    _plugin: *const clap_plugin,
    index: u32,
    _is_input: bool,
    info: *mut clap_audio_port_info,
) -> bool {
    if index != 0 {
        return false;
    }
    let info = &mut *info;
    info.id = 0;
    write_str(&mut info.name, "Main");
    info.flags = CLAP_AUDIO_PORT_IS_MAIN;
    info.channel_count = 2;
    info.port_type = CLAP_PORT_STEREO.as_ptr();
    info.in_place_pair = CLAP_INVALID_ID;
    true
}

static REMOTE_CONTROLS: clap_plugin_remote_controls = clap_plugin_remote_controls {
    count: Some(remote_controls_count),
    get: Some(remote_controls_get),
};

unsafe extern "C" fn remote_controls_count(plugin: *const clap_plugin) -> u32 {
    probe(plugin).pages.lock().len() as u32
}

unsafe extern "C" fn remote_controls_get(
    plugin: *const clap_plugin,
    index: u32,
    page: *mut clap_remote_controls_page,
) -> bool {
    let pages = probe(plugin).pages.lock();
    let Some(&(id, name, param_ids)) = pages.get(index as usize) else {
        return false;
    };
    let page = &mut *page;
    write_str(&mut page.section_name, "Mock");
    page.page_id = id;
    write_str(&mut page.page_name, name);
    page.param_ids = param_ids;
    page.is_for_preset = false;
    true
}

static THREAD_POOL: clap_plugin_thread_pool = clap_plugin_thread_pool {
    exec: Some(thread_pool_exec),
};

unsafe extern "C" fn thread_pool_exec(plugin: *const clap_plugin, _task_index: u32) {
    probe(plugin).tasks_run.fetch_add(1, Ordering::SeqCst);
}

static TIMER_SUPPORT: clap_plugin_timer_support = clap_plugin_timer_support {
    on_timer: Some(timer_on_timer),
};

unsafe extern "C" fn timer_on_timer(plugin: *const clap_plugin, _timer_id: u32) {
    probe(plugin).timer_fires.fetch_add(1, Ordering::SeqCst);
}

static POSIX_FD_SUPPORT: clap_plugin_posix_fd_support = clap_plugin_posix_fd_support {
    on_fd: Some(posix_on_fd),
};

unsafe extern "C" fn posix_on_fd(plugin: *const clap_plugin, _fd: i32, _flags: u32) {
    probe(plugin).fd_fires.fetch_add(1, Ordering::SeqCst);
}

static PRESET_LOAD: clap_plugin_preset_load = clap_plugin_preset_load {
    from_location: Some(preset_from_location),
};

/// A preset file holds the gain as plain text.
unsafe extern "C" fn preset_from_location(
    plugin: *const clap_plugin,
    _location_kind: u32,
    location: *const c_char,
    _load_key: *const c_char,
) -> bool {
    let probe = probe(plugin);
    let path = CStr::from_ptr(location).to_string_lossy().into_owned();
    let gain = std::fs::read_to_string(&path)
        .ok()
        .and_then(|text| text.trim().parse::<f64>().ok());
    match gain {
        Some(gain) => {
            probe.set_value(GAIN, gain);
            probe.preset_loaded(location);
            true
        }
        None => {
            probe.preset_error(location, c"not a gain preset");
            false
        }
    }
}

static GUI: clap_plugin_gui = clap_plugin_gui {
    is_api_supported: Some(gui_is_api_supported),
    get_preferred_api: None,
    create: Some(gui_create),
    destroy: Some(gui_destroy),
    set_scale: None,
    get_size: Some(gui_get_size),
    can_resize: Some(gui_can_resize),
    get_resize_hints: None,
    adjust_size: None,
    set_size: Some(gui_set_size),
    set_parent: Some(gui_set_parent),
    set_transient: None,
    suggest_title: None,
    show: Some(gui_show),
    hide: Some(gui_hide),
};

unsafe extern "C" fn gui_is_api_supported(
    _plugin: *const clap_plugin,
    api: *const c_char,
    is_floating: bool,
) -> bool {
    !is_floating && CStr::from_ptr(api) == CLAP_WINDOW_API_X11
}

unsafe extern "C" fn gui_create(plugin: *const clap_plugin, api: *const c_char, is_floating: bool) -> bool {
    if !gui_is_api_supported(plugin, api, is_floating) {
        return false;
    }
    probe(plugin).gui_created.store(true, Ordering::SeqCst);
    true
}

unsafe extern "C" fn gui_destroy(plugin: *const clap_plugin) {
    let probe = probe(plugin);
    probe.gui_created.store(false, Ordering::SeqCst);
    probe.gui_visible.store(false, Ordering::SeqCst);
}

unsafe extern "C" fn gui_get_size(plugin: *const clap_plugin, width: *mut u32, height: *mut u32) -> bool {
    let (w, h) = *probe(plugin).gui_size.lock();
    *width = w;
    *height = h;
    true
}

unsafe extern "C" fn gui_can_resize(_plugin: *const clap_plugin) -> bool {
    true
}

unsafe extern "C" fn gui_set_size(plugin: *const clap_plugin, width: u32, height: u32) -> bool {
    *probe(plugin).gui_size.lock() = (width, height);
    true
}

unsafe extern "C" fn gui_set_parent(plugin: *const clap_plugin, window: *const clap_window) -> bool {
    probe(plugin).gui_created.load(Ordering::SeqCst)
        && CStr::from_ptr((*window).api) == CLAP_WINDOW_API_X11
}

unsafe extern "C" fn gui_show(plugin: *const clap_plugin) -> bool {
    probe(plugin).gui_visible.store(true, Ordering::SeqCst);
    true
}

unsafe extern "C" fn gui_hide(plugin: *const clap_plugin) -> bool {
    probe(plugin).gui_visible.store(false, Ordering::SeqCst);
    true
}

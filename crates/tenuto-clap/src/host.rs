//! The main-thread half of the host.
//!
//! [`PluginHost`] loads a plugin, keeps its parameter and quick-controls
//! catalogs, drives activation, and runs the delayed actions the plugin
//! requested from its callbacks during [`PluginHost::idle`]. The audio
//! thread's half is the [`PluginProcessor`] obtained from
//! [`PluginHost::take_processor`].

use crate::config::HostConfig;
use crate::context::{AudioSlot, HostContext, HostHandle};
use crate::error::{HostError, LoadStage, Result};
use crate::events::{EventList, PluginEvent};
use crate::gui::{platform_api, EditorSession, EditorWindow, WindowHandle};
use crate::library::PluginLibrary;
use crate::metadata::PluginMetadata;
use crate::params::{AppToEngineValue, ParamCatalog, ParamInfo, RescanFlags};
use crate::plugin::{PluginExtensions, PluginInstance};
use crate::posix_fd::{FdWatchers, RawFd};
use crate::processor::PluginProcessor;
use crate::quick_controls::QuickControls;
use crate::requests::Request;
use crate::state::PluginState;
use crate::state_file::StateFile;
use crate::{PageId, ParamId};
use clap_sys::entry::clap_plugin_entry;
use clap_sys::events::CLAP_EVENT_PARAM_GESTURE_BEGIN;
use clap_sys::ext::params::{CLAP_PARAM_CLEAR_ALL, CLAP_PARAM_CLEAR_MODULATIONS};
use crossbeam_channel::{Receiver, Sender};
use std::ffi::CString;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tenuto_core::ThreadPool;

/// Change notifications for the embedding shell.
#[derive(Debug, Clone, PartialEq)]
pub enum HostEvent {
    /// The parameter catalog was rebuilt or its values refreshed.
    ParamsChanged,
    /// The plugin changed one parameter's value.
    ParamAdjusted { id: ParamId, value: f64 },
    /// The plugin began or ended a gesture on a parameter.
    ParamGesture { id: ParamId, begin: bool },
    QuickControlsPagesChanged,
    QuickControlsSelectedPageChanged(PageId),
    GuiResizeHintsChanged,
    GuiResizeRequested { width: u32, height: u32 },
    GuiShowRequested,
    GuiHideRequested,
    GuiClosed { was_destroyed: bool },
    StateDirty,
    /// The plugin was deactivated and re-activated at its own request.
    Restarted,
}

struct LoadedPlugin {
    plugin: PluginInstance,
    ext: PluginExtensions,
    metadata: PluginMetadata,
    // Dropped after the instance is destroyed in `unload`.
    _library: PluginLibrary,
}

/// Hosts one plugin at a time. Main thread only: every method asserts it.
pub struct PluginHost {
    ctx: Arc<HostContext>,
    host: HostHandle,
    loaded: Option<LoadedPlugin>,
    params: ParamCatalog,
    quick_controls: QuickControls,
    processor: Option<PluginProcessor>,
    events_tx: Sender<HostEvent>,
    events_rx: Receiver<HostEvent>,
    last_activation: Option<(f64, u32)>,
    // A restart whose deactivation is still waiting on the audio thread.
    restart_pending: bool,
    state_dirty: bool,
    editor: Option<EditorSession>,
}

impl PluginHost {
    /// Create a host bound to the calling thread as its main thread.
    pub fn new(config: HostConfig) -> Result<Self> {
        let ctx = Arc::new(HostContext::new(config));
        let host = HostHandle::new(&ctx)
            .map_err(|e| HostError::Config(format!("host strings contain a null byte: {e}")))?;
        let (events_tx, events_rx) = crossbeam_channel::unbounded();
        let processor = PluginProcessor::new(Arc::clone(&ctx));

        Ok(Self {
            ctx,
            host,
            loaded: None,
            params: ParamCatalog::new(),
            quick_controls: QuickControls::new(),
            processor: Some(processor),
            events_tx,
            events_rx,
            last_activation: None,
            restart_pending: false,
            state_dirty: false,
            editor: None,
        })
    }

    pub fn config(&self) -> &HostConfig {
        &self.ctx.config
    }

    fn assert_main_thread(&self, operation: &str) {
        self.ctx.main_thread.assert_current(operation);
    }

    fn notify(&self, event: HostEvent) {
        // The host keeps a receiver, so the channel never disconnects.
        let _ = self.events_tx.send(event);
    }

    fn loaded(&self) -> Result<&LoadedPlugin> {
        self.loaded.as_ref().ok_or(HostError::NotLoaded)
    }

    fn plugin(&self) -> Result<(PluginInstance, PluginExtensions)> {
        self.loaded().map(|l| (l.plugin, l.ext))
    }

    // ---------------------------------------------------------------------
    // Loading
    // ---------------------------------------------------------------------

    /// Load plugin `index` of the binary at `path`, replacing any loaded one.
    pub fn load(&mut self, path: &Path, index: u32) -> Result<()> {
        self.assert_main_thread("PluginHost::load");
        self.unload();
        let library = PluginLibrary::open(path)?;
        self.instantiate(library, index)
    }

    /// Load plugin `index` from an entry table linked into this binary.
    pub fn load_entry(&mut self, entry: &'static clap_plugin_entry, index: u32) -> Result<()> {
        self.assert_main_thread("PluginHost::load_entry");
        self.unload();
        let library = PluginLibrary::from_static(entry, "<static>")?;
        self.instantiate(library, index)
    }

    fn instantiate(&mut self, library: PluginLibrary, index: u32) -> Result<()> {
        let fail = |stage, reason: String| HostError::LoadFailed {
            path: library.path().to_path_buf(),
            stage,
            reason,
        };

        let descriptor = library.descriptor(index)?;
        let factory = library.factory()?;
        let create = factory
            .create_plugin
            .ok_or_else(|| fail(LoadStage::Instantiation, "No create_plugin function".into()))?;
        let plugin_id = CString::new(descriptor.id.as_str())
            .map_err(|e| fail(LoadStage::Instantiation, format!("Invalid plugin id: {e}")))?;

        let raw = unsafe { create(factory, self.host.as_raw(), plugin_id.as_ptr()) };
        let plugin = PluginInstance::new(raw).ok_or_else(|| {
            fail(
                LoadStage::Instantiation,
                format!("Factory returned no instance for {}", descriptor.id),
            )
        })?;

        if !plugin.init() {
            plugin.destroy();
            return Err(fail(LoadStage::Initialization, "Plugin init failed".into()));
        }

        let ext = PluginExtensions::query(plugin);
        let (inputs, outputs) = match ext.audio_ports {
            Some(ports) => (
                ports.main_channels(plugin, true),
                ports.main_channels(plugin, false),
            ),
            None => (0, 0),
        };
        let param_count = ext.params.map_or(0, |p| p.count(plugin) as usize);
        let metadata = PluginMetadata::new(descriptor)
            .audio_io(inputs, outputs)
            .editor(ext.gui.is_some())
            .state(ext.state.is_some())
            .params(param_count);

        tracing::info!(
            id = %metadata.descriptor.id,
            name = %metadata.descriptor.name,
            path = %library.path().display(),
            extensions = ?ext.supported(),
            "Loaded CLAP plugin"
        );

        self.loaded = Some(LoadedPlugin {
            plugin,
            ext,
            metadata,
            _library: library,
        });

        if let Err(e) = self.scan_params() {
            tracing::warn!("Initial parameter scan failed: {e}");
        }
        self.scan_quick_controls();
        Ok(())
    }

    /// Destroy the plugin and unload its binary. Deactivates first, forcing
    /// the audio thread off the plugin if it does not let go in time.
    pub fn unload(&mut self) {
        self.assert_main_thread("PluginHost::unload");
        if self.loaded.is_none() {
            return;
        }

        if let Err(e) = self.deactivate() {
            tracing::warn!("Forcing deactivation before unload: {e}");
            self.force_deactivate();
        }
        self.destroy_editor();

        if let Some(loaded) = self.loaded.take() {
            tracing::info!(id = %loaded.metadata.descriptor.id, "Unloading plugin");
            loaded.plugin.destroy();
        }

        self.ctx.reset();
        self.params.clear();
        if self.quick_controls.clear() {
            self.notify(HostEvent::QuickControlsSelectedPageChanged(
                self.quick_controls.selected(),
            ));
        }
        self.last_activation = None;
        self.restart_pending = false;
        self.state_dirty = false;
        self.notify(HostEvent::ParamsChanged);
        self.notify(HostEvent::QuickControlsPagesChanged);
    }

    pub fn is_loaded(&self) -> bool {
        self.loaded.is_some()
    }

    pub fn metadata(&self) -> Option<&PluginMetadata> {
        self.loaded.as_ref().map(|l| &l.metadata)
    }

    pub fn plugin_state(&self) -> PluginState {
        self.ctx.state.load()
    }

    // ---------------------------------------------------------------------
    // Activation
    // ---------------------------------------------------------------------

    pub fn can_activate(&self) -> bool {
        self.loaded.is_some() && !self.ctx.state.load().is_active()
    }

    /// Activate for blocks of at most `block_size` frames.
    ///
    /// Any failure leaves the plugin in [`PluginState::InactiveWithError`],
    /// except [`HostError::AlreadyActive`], which changes nothing.
    pub fn activate(&mut self, sample_rate: f64, block_size: u32) -> Result<()> {
        self.assert_main_thread("PluginHost::activate");

        let state = self.ctx.state.load();
        if state.is_active() {
            return Err(HostError::AlreadyActive);
        }
        let fail = |err: HostError| {
            let _ = self.ctx.state.transition(state, PluginState::InactiveWithError);
            Err(err)
        };

        let Ok((plugin, ext)) = self.plugin() else {
            return fail(HostError::NotLoaded);
        };
        if !(sample_rate.is_finite() && sample_rate > 0.0) || block_size == 0 {
            return fail(HostError::ActivationFailed(format!(
                "invalid settings: {sample_rate} Hz, {block_size} frames"
            )));
        }

        if !plugin.activate(sample_rate, 1, block_size) {
            return fail(HostError::ActivationFailed(
                "plugin refused to activate".into(),
            ));
        }

        let pool = match ext.thread_pool {
            Some(thread_pool) => {
                let job = move |task: u32| thread_pool.exec(plugin, task);
                match ThreadPool::new("tenuto-pool", self.ctx.config.worker_count(), job) {
                    Ok(pool) => Some(Arc::new(pool)),
                    Err(e) => {
                        plugin.deactivate();
                        return fail(e.into());
                    }
                }
            }
            None => None,
        };
        self.ctx.thread_pool.store(pool);

        *self.ctx.audio.lock() = Some(AudioSlot {
            plugin,
            params: ext.params,
            max_frames: block_size,
        });
        let _ = self
            .ctx
            .state
            .transition(state, PluginState::ActiveAndSleeping);
        self.ctx
            .requests
            .clear(Request::DEACTIVATE.union(Request::RELINQUISHED));
        self.ctx.requests.set(Request::PROCESS);
        self.last_activation = Some((sample_rate, block_size));

        tracing::info!(sample_rate, block_size, "Plugin activated");
        Ok(())
    }

    /// Deactivate the plugin.
    ///
    /// If the audio thread is processing, it is asked to let go and this
    /// waits up to the configured timeout. On [`HostError::Timeout`] the
    /// request stays pending and `idle()` completes it once the audio thread
    /// has let go.
    pub fn deactivate(&mut self) -> Result<()> {
        self.assert_main_thread("PluginHost::deactivate");
        self.restart_pending = false;
        let Ok((plugin, _)) = self.plugin() else {
            return Ok(());
        };
        if !self.ctx.state.load().is_active() {
            return Ok(());
        }

        self.ctx.requests.set(Request::DEACTIVATE);
        let timeout = self.ctx.config.deactivate_timeout_duration();
        let deadline = Instant::now() + timeout;
        loop {
            if self.try_finish_deactivation(plugin) {
                return Ok(());
            }
            if Instant::now() >= deadline {
                return Err(HostError::Timeout {
                    operation: "deactivate",
                    duration_ms: timeout.as_millis() as u64,
                });
            }
            std::thread::sleep(Duration::from_millis(1));
        }
    }

    /// Deactivate unless the audio thread is still processing. Returns
    /// `true` once the plugin is inactive.
    fn try_finish_deactivation(&self, plugin: PluginInstance) -> bool {
        let mut slot = self.ctx.audio.lock();
        let mut state = self.ctx.state.load();
        if state == PluginState::ActiveAndProcessing
            && self.ctx.requests.take(Request::RELINQUISHED)
        {
            // The audio side already let go but could not stop the plugin.
            plugin.stop_processing();
            let _ = self
                .ctx
                .state
                .transition(PluginState::ActiveAndProcessing, PluginState::ActiveAndSleeping);
            state = PluginState::ActiveAndSleeping;
        }
        match state {
            PluginState::ActiveAndProcessing => false,
            s if !s.is_active() => true,
            _ => {
                if state != PluginState::ActiveAndReadyToDeactivate {
                    let _ = self
                        .ctx
                        .state
                        .transition(state, PluginState::ActiveAndReadyToDeactivate);
                }
                plugin.deactivate();
                *slot = None;
                self.ctx.thread_pool.store(None);
                let _ = self
                    .ctx
                    .state
                    .transition(PluginState::ActiveAndReadyToDeactivate, PluginState::Inactive);
                self.ctx.requests.clear(Request::DEACTIVATE);
                tracing::info!("Plugin deactivated");
                true
            }
        }
    }

    /// Stop processing from the main thread. Only used when the audio
    /// thread failed to let go before an unload.
    fn force_deactivate(&mut self) {
        let Ok((plugin, _)) = self.plugin() else {
            return;
        };
        {
            let _slot = self.ctx.audio.lock();
            if self.ctx.state.load() == PluginState::ActiveAndProcessing {
                tracing::warn!("Stopping processing from the main thread");
                plugin.stop_processing();
                let _ = self
                    .ctx
                    .state
                    .transition(PluginState::ActiveAndProcessing, PluginState::ActiveAndSleeping);
            }
        }
        self.try_finish_deactivation(plugin);
    }

    /// The audio-thread half. Available once per host.
    pub fn take_processor(&mut self) -> Option<PluginProcessor> {
        self.processor.take()
    }

    // ---------------------------------------------------------------------
    // Idle pass
    // ---------------------------------------------------------------------

    /// Main-thread housekeeping; call regularly from the event loop.
    ///
    /// Applies what the plugin and the audio thread requested since the
    /// last pass. Returns [`HostError::ProcessingFailed`] if the audio
    /// thread recorded failures in the meantime.
    pub fn idle(&mut self) -> Result<()> {
        self.assert_main_thread("PluginHost::idle");

        self.drain_engine_changes();

        let Ok((plugin, ext)) = self.plugin() else {
            return Ok(());
        };
        let ctx = Arc::clone(&self.ctx);
        let requests = &ctx.requests;

        if requests.is_set(Request::DEACTIVATE) && self.try_finish_deactivation(plugin) {
            tracing::debug!("Completed pending deactivation");
        }

        if requests.take(Request::RESTART) || self.restart_pending {
            self.restart();
        }

        if requests.is_set(Request::PARAM_FLUSH) && !self.ctx.state.load().is_active() {
            requests.clear(Request::PARAM_FLUSH);
            self.flush_params_inactive(plugin, ext);
        }

        if requests.take(Request::CALLBACK) {
            plugin.on_main_thread();
        }

        if requests.take(Request::PARAMS_RESCAN) {
            let flags = self.ctx.take_rescan_flags();
            if let Err(e) = self.rescan_params(flags) {
                tracing::warn!("Rejected parameter rescan: {e}");
            }
        }

        if requests.take(Request::PARAMS_CLEAR) {
            self.apply_param_clears();
        }

        if requests.take(Request::QUICK_CONTROLS_CHANGED) {
            self.scan_quick_controls();
        }

        if requests.take(Request::QUICK_CONTROLS_SUGGESTED) {
            let page = self.ctx.take_suggested_page();
            match self.quick_controls.select(page) {
                Ok(true) => self.notify(HostEvent::QuickControlsSelectedPageChanged(page)),
                Ok(false) => {}
                Err(e) => tracing::warn!("Ignoring suggested page: {e}"),
            }
        }

        self.handle_gui_requests(plugin, ext);

        if requests.take(Request::STATE_DIRTY) {
            self.state_dirty = true;
            self.notify(HostEvent::StateDirty);
        }

        self.fire_timers(plugin, ext);
        self.fire_fds(plugin, ext);

        if requests.take(Request::PROCESSING_FAILED) {
            let count = self.ctx.take_process_failures();
            if count > 0 {
                tracing::error!(count, "Plugin processing failed");
                return Err(HostError::ProcessingFailed { count });
            }
        }
        Ok(())
    }

    /// Apply value changes and gestures the plugin reported from the audio
    /// thread.
    fn drain_engine_changes(&mut self) {
        let ctx = Arc::clone(&self.ctx);
        let params = &mut self.params;
        let events = &self.events_tx;
        ctx.engine_to_app.drain_and_consume(|id, change| {
            if !params.contains(id) {
                tracing::warn!(id, "Plugin reported a change for an unknown parameter");
                return;
            }
            if let Some(begin) = change.gesture {
                // A begin and end within one drain coalesce to the end.
                if let Err(e) = params.set_adjusting(id, begin) {
                    tracing::debug!("{e}");
                }
                let _ = events.send(HostEvent::ParamGesture { id, begin });
            }
            if let Some(value) = change.value {
                params.set_value(id, value);
                let _ = events.send(HostEvent::ParamAdjusted { id, value });
            }
        });
    }

    fn restart(&mut self) {
        let Some((sample_rate, block_size)) = self.last_activation else {
            return;
        };
        let Ok((plugin, _)) = self.plugin() else {
            return;
        };
        if !self.restart_pending && !self.ctx.state.load().is_active() {
            return;
        }
        // Never wait on the audio thread here; a later idle pass retries.
        self.restart_pending = true;
        self.ctx.requests.set(Request::DEACTIVATE);
        if !self.try_finish_deactivation(plugin) {
            tracing::debug!("Restart waits for the audio thread to let go");
            return;
        }
        self.restart_pending = false;
        match self.activate(sample_rate, block_size) {
            Ok(()) => self.notify(HostEvent::Restarted),
            Err(e) => tracing::error!("Restart failed: {e}"),
        }
    }

    /// Deliver queued host changes through `params.flush` while inactive.
    fn flush_params_inactive(&mut self, plugin: PluginInstance, ext: PluginExtensions) {
        let Some(params_ext) = ext.params else {
            return;
        };
        let use_cookies = self.ctx.config.provide_param_cookies;
        let cookie = |change: &AppToEngineValue| {
            if use_cookies {
                change.cookie
            } else {
                Default::default()
            }
        };
        let mut pending = Vec::new();
        self.ctx.app_to_engine_values.drain_and_consume(|id, change| {
            pending.push(PluginEvent::param_value(0, id, cookie(&change), change.value));
        });
        self.ctx.app_to_engine_mods.drain_and_consume(|id, change| {
            pending.push(PluginEvent::param_mod(0, id, cookie(&change), change.value));
        });

        // The main thread may allocate, so every drained change fits.
        let capacity = self
            .ctx
            .config
            .event_capacity
            .max(self.params.len() * 2)
            .max(pending.len());
        let mut input = EventList::with_capacity(capacity);
        let mut output = EventList::with_capacity(capacity);
        for event in pending {
            if input.push(event).is_err() {
                tracing::warn!("Dropped a parameter change during flush");
            }
        }

        params_ext.flush(plugin, &input.as_input(), &output.as_output());
        tracing::debug!(sent = input.len(), received = output.len(), "Flushed parameters");

        for event in output.iter() {
            match event {
                PluginEvent::ParamValue(e) if self.params.contains(e.param_id) => {
                    self.params.set_value(e.param_id, e.value);
                    self.notify(HostEvent::ParamAdjusted {
                        id: e.param_id,
                        value: e.value,
                    });
                }
                PluginEvent::ParamGesture(e) if self.params.contains(e.param_id) => {
                    let begin = e.header.type_ == CLAP_EVENT_PARAM_GESTURE_BEGIN;
                    if let Err(err) = self.params.set_adjusting(e.param_id, begin) {
                        tracing::warn!("{err}");
                    }
                }
                _ => {}
            }
        }
    }

    fn apply_param_clears(&mut self) {
        let clears = std::mem::take(&mut *self.ctx.param_clears.lock());
        for (id, flags) in clears {
            if !self.params.contains(id) {
                tracing::warn!(id, "Plugin asked to clear an unknown parameter");
                continue;
            }
            if flags & (CLAP_PARAM_CLEAR_ALL | CLAP_PARAM_CLEAR_MODULATIONS) != 0 {
                self.params.set_modulation(id, 0.0);
            }
            tracing::debug!(id, flags, "Cleared parameter references");
        }
    }

    fn handle_gui_requests(&mut self, plugin: PluginInstance, ext: PluginExtensions) {
        let ctx = Arc::clone(&self.ctx);
        let requests = &ctx.requests;

        if requests.take(Request::GUI_RESIZE_HINTS) {
            self.notify(HostEvent::GuiResizeHintsChanged);
        }
        if requests.take(Request::GUI_RESIZE) {
            let (width, height) = self.ctx.gui_resize();
            self.notify(HostEvent::GuiResizeRequested { width, height });
        }
        if requests.take(Request::GUI_SHOW) {
            if let Err(e) = self.set_plugin_window_visibility(true) {
                tracing::warn!("Cannot show editor: {e}");
            }
            self.notify(HostEvent::GuiShowRequested);
        }
        if requests.take(Request::GUI_HIDE) {
            if let Err(e) = self.set_plugin_window_visibility(false) {
                tracing::warn!("Cannot hide editor: {e}");
            }
            self.notify(HostEvent::GuiHideRequested);
        }
        if requests.take(Request::GUI_CLOSED) {
            let was_destroyed = self
                .ctx
                .gui_closed_destroyed
                .load(std::sync::atomic::Ordering::Acquire);
            if was_destroyed {
                if let (Some(gui), Some(_)) = (ext.gui, self.editor.take()) {
                    gui.destroy(plugin);
                }
            } else if let Some(editor) = &mut self.editor {
                editor.visible = false;
            }
            self.notify(HostEvent::GuiClosed { was_destroyed });
        }
    }

    fn fire_timers(&mut self, plugin: PluginInstance, ext: PluginExtensions) {
        let due = self.ctx.timers.lock().take_due(Instant::now());
        let Some(timer_support) = ext.timer_support else {
            return;
        };
        for id in due {
            // The plugin may unregister a timer from another timer's callback.
            if self.ctx.timers.lock().contains(id) {
                timer_support.on_timer(plugin, id);
            }
        }
    }

    fn fire_fds(&mut self, plugin: PluginInstance, ext: PluginExtensions) {
        let Some(fd_support) = ext.posix_fd_support else {
            return;
        };
        let ready = match self.ctx.fds.lock().poll_ready() {
            Ok(ready) => ready,
            Err(e) => {
                tracing::warn!("Polling plugin file descriptors failed: {e}");
                return;
            }
        };
        for event in ready {
            if self.ctx.fds.lock().watchers(event.fd).is_some() {
                fd_support.on_fd(plugin, event.fd, event.flags);
            }
        }
    }

    /// Earliest timer deadline, for event loops that sleep between passes.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.ctx.timers.lock().next_deadline()
    }

    pub fn timer_count(&self) -> usize {
        self.ctx.timers.lock().len()
    }

    /// Descriptors the plugin registered, for integration into an external
    /// event loop.
    pub fn posix_fds(&self) -> Vec<(RawFd, FdWatchers)> {
        self.ctx.fds.lock().iter().collect()
    }

    // ---------------------------------------------------------------------
    // Parameters and quick controls
    // ---------------------------------------------------------------------

    pub fn params(&self) -> &ParamCatalog {
        &self.params
    }

    pub fn quick_controls(&self) -> &QuickControls {
        &self.quick_controls
    }

    fn param_infos(&self, plugin: PluginInstance, ext: PluginExtensions) -> Vec<ParamInfo> {
        let Some(params) = ext.params else {
            return Vec::new();
        };
        (0..params.count(plugin))
            .filter_map(|index| {
                let info = params.info(plugin, index);
                if info.is_none() {
                    tracing::warn!(index, "Plugin has no info for parameter index");
                }
                info
            })
            .collect()
    }

    /// Rebuild the parameter catalog from the plugin.
    pub fn scan_params(&mut self) -> Result<()> {
        self.assert_main_thread("PluginHost::scan_params");
        let (plugin, ext) = self.plugin()?;
        let infos = self.param_infos(plugin, ext);
        let report = self.params.apply_full_scan(infos)?;
        self.ctx.reserve_params(self.params.len());

        tracing::debug!(
            total = self.params.len(),
            added = report.added.len(),
            removed = report.removed.len(),
            "Scanned parameters"
        );
        self.notify(HostEvent::ParamsChanged);
        Ok(())
    }

    fn rescan_params(&mut self, bits: u32) -> Result<()> {
        let flags = RescanFlags::new(bits)?;
        let (plugin, ext) = self.plugin()?;

        if flags.is_all() {
            if self.ctx.state.load().is_active() {
                return Err(HostError::violation(
                    "clap_host_params.rescan",
                    "CLAP_PARAM_RESCAN_ALL while the plugin is active",
                ));
            }
            self.scan_params()?;
            self.refresh_param_values(plugin, ext);
            return Ok(());
        }

        if flags.may_info_change() {
            let infos = self.param_infos(plugin, ext);
            self.params.apply_info_rescan(infos)?;
        }
        if flags.may_value_change() {
            self.refresh_param_values(plugin, ext);
        }
        self.notify(HostEvent::ParamsChanged);
        Ok(())
    }

    fn refresh_param_values(&mut self, plugin: PluginInstance, ext: PluginExtensions) {
        let Some(params_ext) = ext.params else {
            return;
        };
        let ids = self.params.ids().to_vec();
        for id in ids {
            if let Some(value) = params_ext.value(plugin, id) {
                self.params.set_value(id, value);
            }
        }
        self.notify(HostEvent::ParamsChanged);
    }

    fn scan_quick_controls(&mut self) {
        let Ok((plugin, ext)) = self.plugin() else {
            return;
        };
        let pages = ext
            .remote_controls
            .map(|rc| rc.pages(plugin))
            .unwrap_or_default();
        match self.quick_controls.apply_scan(pages) {
            Ok(selection_changed) => {
                self.notify(HostEvent::QuickControlsPagesChanged);
                if selection_changed {
                    self.notify(HostEvent::QuickControlsSelectedPageChanged(
                        self.quick_controls.selected(),
                    ));
                }
            }
            Err(e) => tracing::warn!("Rejected quick-controls pages: {e}"),
        }
    }

    /// Queue a value change for the plugin.
    ///
    /// The catalog is updated at once; the plugin sees the change in the next
    /// processed block, or on the next `idle()` while inactive.
    pub fn set_param_value_by_host(&mut self, id: ParamId, value: f64) -> Result<()> {
        self.assert_main_thread("PluginHost::set_param_value_by_host");
        let cookie = self.params.check_value(id, value)?.info().cookie;
        self.params.set_value(id, value);
        self.ctx
            .app_to_engine_values
            .push(id, AppToEngineValue { cookie, value });
        self.request_delivery();
        Ok(())
    }

    /// Queue a modulation amount for the plugin.
    pub fn set_param_modulation_by_host(&mut self, id: ParamId, amount: f64) -> Result<()> {
        self.assert_main_thread("PluginHost::set_param_modulation_by_host");
        let cookie = self.params.check_modulation(id, amount)?.info().cookie;
        self.params.set_modulation(id, amount);
        self.ctx.app_to_engine_mods.push(
            id,
            AppToEngineValue {
                cookie,
                value: amount,
            },
        );
        self.request_delivery();
        Ok(())
    }

    fn request_delivery(&self) {
        if !self.ctx.state.load().is_active() {
            self.ctx.requests.set(Request::PARAM_FLUSH);
        }
    }

    /// Select a quick-controls page. `INVALID_ID` clears the selection.
    pub fn set_quick_controls_selected_page_by_host(&mut self, page: PageId) -> Result<()> {
        self.assert_main_thread("PluginHost::set_quick_controls_selected_page_by_host");
        if self.quick_controls.select(page)? {
            self.notify(HostEvent::QuickControlsSelectedPageChanged(page));
        }
        Ok(())
    }

    /// Display text for a value. Falls back to the plain number when the
    /// plugin cannot format it.
    pub fn param_value_to_text(&self, id: ParamId, value: f64) -> Result<String> {
        self.assert_main_thread("PluginHost::param_value_to_text");
        if !self.params.contains(id) {
            return Err(HostError::UnknownParam(id));
        }
        let (plugin, ext) = self.plugin()?;
        Ok(ext
            .params
            .and_then(|p| p.value_to_text(plugin, id, value))
            .unwrap_or_else(|| value.to_string()))
    }

    /// Parse display text through the plugin. `None` if it cannot.
    pub fn param_text_to_value(&self, id: ParamId, text: &str) -> Result<Option<f64>> {
        self.assert_main_thread("PluginHost::param_text_to_value");
        if !self.params.contains(id) {
            return Err(HostError::UnknownParam(id));
        }
        let (plugin, ext) = self.plugin()?;
        let params = ext.params.ok_or(HostError::Unsupported("params"))?;
        Ok(params.text_to_value(plugin, id, text))
    }

    // ---------------------------------------------------------------------
    // State and presets
    // ---------------------------------------------------------------------

    pub fn is_state_dirty(&self) -> bool {
        self.state_dirty
    }

    /// Write the plugin's state to `path`.
    pub fn save_state_to_file(&mut self, path: &Path) -> Result<()> {
        self.assert_main_thread("PluginHost::save_state_to_file");
        let loaded = self.loaded()?;
        let state = loaded.ext.state.ok_or(HostError::Unsupported("state"))?;
        let data = state
            .save(loaded.plugin)
            .ok_or_else(|| HostError::StateSave("plugin refused to save its state".into()))?;

        StateFile::new(loaded.metadata.descriptor.id.clone(), data).save(path)?;
        tracing::info!(path = %path.display(), "Saved plugin state");
        self.state_dirty = false;
        Ok(())
    }

    /// Restore state saved by [`save_state_to_file`](Self::save_state_to_file).
    ///
    /// The file is validated before the plugin sees it; on any failure the
    /// catalog is left untouched.
    pub fn load_state_from_file(&mut self, path: &Path) -> Result<()> {
        self.assert_main_thread("PluginHost::load_state_from_file");
        let loaded = self.loaded()?;
        let (plugin, ext) = (loaded.plugin, loaded.ext);
        let state = ext.state.ok_or(HostError::Unsupported("state"))?;

        let file = StateFile::load(path)?;
        file.check_plugin(&loaded.metadata.descriptor.id)?;
        if !state.load(plugin, &file.data) {
            return Err(HostError::StateRestore(
                "plugin rejected the state".into(),
            ));
        }

        tracing::info!(path = %path.display(), "Restored plugin state");
        self.refresh_param_values(plugin, ext);
        self.state_dirty = false;
        Ok(())
    }

    /// Load a preset in the plugin's own file format.
    pub fn load_native_plugin_preset(&mut self, path: &Path) -> Result<()> {
        self.assert_main_thread("PluginHost::load_native_plugin_preset");
        let (plugin, ext) = self.plugin()?;
        let preset_load = ext.preset_load.ok_or(HostError::Unsupported("preset-load"))?;
        let fail = |reason: String| HostError::PresetLoad {
            path: path.to_path_buf(),
            reason,
        };

        std::fs::metadata(path)?;
        let location = CString::new(path.to_string_lossy().as_bytes())
            .map_err(|e| fail(format!("invalid path: {e}")))?;

        *self.ctx.preset_error.lock() = None;
        self.ctx
            .preset_loaded
            .store(false, std::sync::atomic::Ordering::Release);

        let accepted = preset_load.from_file(plugin, &location);
        if let Some(reason) = self.ctx.preset_error.lock().take() {
            return Err(fail(reason));
        }
        if !accepted {
            return Err(fail("plugin could not load the preset".into()));
        }

        tracing::info!(path = %path.display(), "Loaded native preset");
        self.refresh_param_values(plugin, ext);
        Ok(())
    }

    // ---------------------------------------------------------------------
    // Editor
    // ---------------------------------------------------------------------

    /// Create the plugin's editor inside `parent`, or as a floating window
    /// when the plugin cannot embed into that window API.
    pub fn set_parent_window(&mut self, parent: WindowHandle) -> Result<EditorWindow> {
        self.assert_main_thread("PluginHost::set_parent_window");
        let (plugin, ext) = self.plugin()?;
        let gui = ext.gui.ok_or(HostError::Unsupported("gui"))?;
        self.destroy_editor();

        let api = parent.api();
        let window = if gui.is_api_supported(plugin, api, false) {
            if !gui.create(plugin, api, false) {
                return Err(HostError::Gui("could not create the editor".into()));
            }
            if !gui.set_parent(plugin, &parent.to_raw()) {
                gui.destroy(plugin);
                return Err(HostError::Gui("could not embed the editor".into()));
            }
            let Some((width, height)) = gui.size(plugin) else {
                gui.destroy(plugin);
                return Err(HostError::Gui("editor reported no size".into()));
            };
            EditorWindow::Embedded { width, height }
        } else if gui.is_api_supported(plugin, platform_api(), true) {
            if !gui.create(plugin, platform_api(), true) {
                return Err(HostError::Gui("could not create a floating editor".into()));
            }
            EditorWindow::Floating
        } else {
            return Err(HostError::Gui("no supported window API".into()));
        };

        let visible = gui.show(plugin);
        self.editor = Some(EditorSession {
            parent,
            window,
            visible,
        });
        tracing::debug!(?window, "Editor created");
        Ok(window)
    }

    /// Destroy and create the editor again in the same parent.
    pub fn recreate_plugin_window(&mut self) -> Result<EditorWindow> {
        self.assert_main_thread("PluginHost::recreate_plugin_window");
        let parent = self
            .editor
            .map(|e| e.parent)
            .ok_or_else(|| HostError::Gui("no editor to recreate".into()))?;
        self.set_parent_window(parent)
    }

    pub fn set_plugin_window_visibility(&mut self, visible: bool) -> Result<()> {
        self.assert_main_thread("PluginHost::set_plugin_window_visibility");
        let (plugin, ext) = self.plugin()?;
        let gui = ext.gui.ok_or(HostError::Unsupported("gui"))?;
        let editor = self
            .editor
            .as_mut()
            .ok_or_else(|| HostError::Gui("no editor".into()))?;
        let ok = if visible {
            gui.show(plugin)
        } else {
            gui.hide(plugin)
        };
        if !ok {
            return Err(HostError::Gui(format!(
                "plugin refused to {} its editor",
                if visible { "show" } else { "hide" }
            )));
        }
        editor.visible = visible;
        Ok(())
    }

    /// Resize an embedded editor, e.g. after a `GuiResizeRequested`.
    pub fn set_editor_size(&mut self, width: u32, height: u32) -> Result<()> {
        self.assert_main_thread("PluginHost::set_editor_size");
        let (plugin, ext) = self.plugin()?;
        let gui = ext.gui.ok_or(HostError::Unsupported("gui"))?;
        let editor = self
            .editor
            .as_mut()
            .ok_or_else(|| HostError::Gui("no editor".into()))?;
        if editor.window.is_floating() {
            return Err(HostError::Gui("a floating editor sizes itself".into()));
        }
        if !gui.can_resize(plugin) || !gui.set_size(plugin, width, height) {
            return Err(HostError::Gui(format!("cannot resize to {width}x{height}")));
        }
        editor.window = EditorWindow::Embedded { width, height };
        Ok(())
    }

    pub fn editor_window(&self) -> Option<EditorWindow> {
        self.editor.map(|e| e.window)
    }

    pub fn is_editor_visible(&self) -> bool {
        self.editor.is_some_and(|e| e.visible)
    }

    /// Destroy the editor if there is one.
    pub fn close_editor(&mut self) {
        self.assert_main_thread("PluginHost::close_editor");
        self.destroy_editor();
    }

    fn destroy_editor(&mut self) {
        let Some(editor) = self.editor.take() else {
            return;
        };
        if let Ok((plugin, ext)) = self.plugin() {
            if let Some(gui) = ext.gui {
                if editor.visible {
                    gui.hide(plugin);
                }
                gui.destroy(plugin);
            }
        }
    }

    // ---------------------------------------------------------------------
    // Notifications
    // ---------------------------------------------------------------------

    /// Receiver for change notifications. Clones share one queue.
    pub fn events(&self) -> Receiver<HostEvent> {
        self.events_rx.clone()
    }
}

impl Drop for PluginHost {
    fn drop(&mut self) {
        self.unload();
    }
}

//! The audio-thread half of the host.
//!
//! One block is one transaction:
//!
//! ```text
//! process_begin(frames) -> process_note_*/process_cc/... -> process() -> process_end(frames)
//! ```
//!
//! Nothing here allocates, logs or waits on a lock the main thread may hold
//! for long. Failures are returned as [`ProcessError`] values and counted
//! for the main thread, which reports them on its next `idle()`.

use crate::context::{AudioSlot, HostContext};
use crate::error::ProcessError;
use crate::events::{EventList, PluginEvent};
use crate::params::{AppToEngineValue, Cookie, EngineToAppValue};
use crate::requests::Request;
use crate::state::PluginState;
use crate::ParamId;
use clap_sys::audio_buffer::clap_audio_buffer;
use clap_sys::events::{CLAP_EVENT_PARAM_GESTURE_BEGIN, CLAP_NOTE_EXPRESSION_PRESSURE};
use clap_sys::process::{
    clap_process, CLAP_PROCESS_CONTINUE_IF_NOT_QUIET, CLAP_PROCESS_ERROR, CLAP_PROCESS_SLEEP,
    CLAP_PROCESS_TAIL,
};
use std::ptr;
use std::sync::Arc;
use tenuto_core::{thread_check, ReducingQueue, ReducingStage};

/// What the plugin reported for a block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessStatus {
    Continue,
    ContinueIfNotQuiet,
    Tail,
    /// The plugin is sleeping; outputs hold silence.
    Sleep,
    /// The plugin was not run (error state or pending deactivation); outputs
    /// hold silence.
    Silenced,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BlockPhase {
    Idle,
    Open,
    Processed,
}

/// Drives the plugin from the audio callback. Obtained once from
/// [`PluginHost::take_processor`](crate::PluginHost::take_processor).
pub struct PluginProcessor {
    ctx: Arc<HostContext>,
    phase: BlockPhase,
    frames: u32,
    steady_time: i64,

    input_events: EventList,
    output_events: EventList,

    // Host changes that did not fit into a block's event list.
    value_stage: ReducingStage<ParamId, AppToEngineValue>,
    mod_stage: ReducingStage<ParamId, AppToEngineValue>,
    // Plugin changes that lost the race for the main thread's queue.
    engine_stage: ReducingStage<ParamId, EngineToAppValue>,

    max_frames: u32,
    inputs: Vec<Vec<f32>>,
    outputs: Vec<Vec<f32>>,
    input_ptrs: Vec<*mut f32>,
    output_ptrs: Vec<*mut f32>,
}

// Safety: the raw pointers point into the processor's own buffers.
unsafe impl Send for PluginProcessor {}

impl PluginProcessor {
    pub(crate) fn new(ctx: Arc<HostContext>) -> Self {
        let capacity = ctx.config.event_capacity;
        Self {
            ctx,
            phase: BlockPhase::Idle,
            frames: 0,
            steady_time: 0,
            input_events: EventList::with_capacity(capacity),
            output_events: EventList::with_capacity(capacity),
            value_stage: ReducingStage::with_capacity(capacity),
            mod_stage: ReducingStage::with_capacity(capacity),
            engine_stage: ReducingStage::with_capacity(capacity),
            max_frames: 0,
            inputs: Vec::new(),
            outputs: Vec::new(),
            input_ptrs: Vec::new(),
            output_ptrs: Vec::new(),
        }
    }

    /// Bind the audio buffers. Allocates; call outside the audio callback.
    pub fn set_ports(&mut self, input_channels: usize, output_channels: usize, max_frames: u32) {
        let len = max_frames as usize;
        self.inputs = vec![vec![0.0; len]; input_channels];
        self.outputs = vec![vec![0.0; len]; output_channels];
        self.input_ptrs = self.inputs.iter_mut().map(|b| b.as_mut_ptr()).collect();
        self.output_ptrs = self.outputs.iter_mut().map(|b| b.as_mut_ptr()).collect();
        self.max_frames = max_frames;
    }

    pub fn input_channels(&self) -> usize {
        self.inputs.len()
    }

    pub fn output_channels(&self) -> usize {
        self.outputs.len()
    }

    /// Input channel to fill before `process()`.
    pub fn input_mut(&mut self, channel: usize) -> Option<&mut [f32]> {
        self.inputs.get_mut(channel).map(|b| b.as_mut_slice())
    }

    /// Output of the last processed block.
    pub fn output(&self, channel: usize) -> Option<&[f32]> {
        let frames = self.frames as usize;
        self.outputs.get(channel).map(|b| &b[..frames.min(b.len())])
    }

    /// Events the plugin produced in the last block. Valid until the next
    /// `process_begin`.
    pub fn output_events(&self) -> &EventList {
        &self.output_events
    }

    /// Open a block of `frames` samples.
    pub fn process_begin(&mut self, frames: u32) -> Result<(), ProcessError> {
        thread_check::mark_audio_thread();
        if self.phase != BlockPhase::Idle {
            return Err(ProcessError::OutOfOrder);
        }
        if frames > self.max_frames {
            return Err(ProcessError::BlockTooLarge {
                frames,
                max: self.max_frames,
            });
        }
        self.input_events.clear();
        self.output_events.clear();
        self.frames = frames;
        self.phase = BlockPhase::Open;
        Ok(())
    }

    fn add_event(&mut self, offset: u32, event: PluginEvent) -> Result<(), ProcessError> {
        if self.phase != BlockPhase::Open {
            return Err(ProcessError::OutOfOrder);
        }
        if offset >= self.frames {
            return Err(ProcessError::SampleOffsetOutOfBlock {
                offset,
                frames: self.frames,
            });
        }
        self.input_events.insert(event)
    }

    pub fn process_note_on(
        &mut self,
        offset: u32,
        channel: u8,
        key: u8,
        velocity: u8,
    ) -> Result<(), ProcessError> {
        let event = PluginEvent::note_on(
            offset,
            0,
            channel as i16,
            key as i16,
            velocity as f64 / 127.0,
        );
        self.add_event(offset, event)
    }

    pub fn process_note_off(
        &mut self,
        offset: u32,
        channel: u8,
        key: u8,
        velocity: u8,
    ) -> Result<(), ProcessError> {
        let event = PluginEvent::note_off(
            offset,
            0,
            channel as i16,
            key as i16,
            velocity as f64 / 127.0,
        );
        self.add_event(offset, event)
    }

    /// Polyphonic aftertouch, sent as a pressure note expression.
    pub fn process_note_at(
        &mut self,
        offset: u32,
        channel: u8,
        key: u8,
        pressure: u8,
    ) -> Result<(), ProcessError> {
        let event = PluginEvent::note_expression(
            offset,
            CLAP_NOTE_EXPRESSION_PRESSURE,
            0,
            channel as i16,
            key as i16,
            pressure as f64 / 127.0,
        );
        self.add_event(offset, event)
    }

    /// `value` is the 14-bit bend amount, 8192 being centered.
    pub fn process_pitch_bend(&mut self, offset: u32, channel: u8, value: u16) -> Result<(), ProcessError> {
        let data = [
            0xE0 | (channel & 0x0F),
            (value & 0x7F) as u8,
            ((value >> 7) & 0x7F) as u8,
        ];
        self.add_event(offset, PluginEvent::midi(offset, 0, data))
    }

    pub fn process_cc(
        &mut self,
        offset: u32,
        channel: u8,
        controller: u8,
        value: u8,
    ) -> Result<(), ProcessError> {
        let data = [0xB0 | (channel & 0x0F), controller & 0x7F, value & 0x7F];
        self.add_event(offset, PluginEvent::midi(offset, 0, data))
    }

    /// Run the plugin on the open block.
    ///
    /// Outputs hold silence whenever the plugin is not run or fails.
    pub fn process(&mut self) -> Result<ProcessStatus, ProcessError> {
        if self.phase != BlockPhase::Open {
            return Err(ProcessError::OutOfOrder);
        }
        self.phase = BlockPhase::Processed;

        let ctx = Arc::clone(&self.ctx);
        let Some(guard) = ctx.audio.try_lock() else {
            self.silence_outputs();
            return Err(ProcessError::PluginBusy);
        };
        ctx.requests.clear(Request::RELINQUISHED);
        let Some(slot) = *guard else {
            self.silence_outputs();
            return Err(ProcessError::NotActive);
        };

        let state = ctx.state.load();
        if !state.is_active() {
            self.silence_outputs();
            return Err(ProcessError::NotActive);
        }
        if self.frames > slot.max_frames {
            self.silence_outputs();
            return Err(ProcessError::BlockTooLarge {
                frames: self.frames,
                max: slot.max_frames,
            });
        }

        if ctx.requests.is_set(Request::DEACTIVATE) {
            if state == PluginState::ActiveAndProcessing {
                slot.plugin.stop_processing();
            }
            let _ = ctx
                .state
                .transition_from_current(PluginState::ActiveAndReadyToDeactivate);
            self.silence_outputs();
            return Ok(ProcessStatus::Silenced);
        }
        if matches!(
            state,
            PluginState::ActiveWithError | PluginState::ActiveAndReadyToDeactivate
        ) {
            self.silence_outputs();
            return Ok(ProcessStatus::Silenced);
        }

        self.drain_host_changes(&ctx, slot);

        let wake = ctx.requests.take(Request::PROCESS);
        if state == PluginState::ActiveAndSleeping {
            if !wake && self.input_events.is_empty() {
                self.silence_outputs();
                return Ok(ProcessStatus::Sleep);
            }
            if !slot.plugin.start_processing() {
                let _ = ctx
                    .state
                    .transition(PluginState::ActiveAndSleeping, PluginState::ActiveWithError);
                Self::report_failure(&ctx);
                self.silence_outputs();
                return Err(ProcessError::StartFailed);
            }
            let _ = ctx
                .state
                .transition(PluginState::ActiveAndSleeping, PluginState::ActiveAndProcessing);
        }

        let status = self.run_plugin(slot);
        self.forward_plugin_changes(&ctx);

        match status {
            CLAP_PROCESS_ERROR => {
                slot.plugin.stop_processing();
                let _ = ctx
                    .state
                    .transition(PluginState::ActiveAndProcessing, PluginState::ActiveWithError);
                Self::report_failure(&ctx);
                self.silence_outputs();
                Err(ProcessError::Failed)
            }
            CLAP_PROCESS_SLEEP => {
                slot.plugin.stop_processing();
                let _ = ctx
                    .state
                    .transition(PluginState::ActiveAndProcessing, PluginState::ActiveAndSleeping);
                Ok(ProcessStatus::Sleep)
            }
            CLAP_PROCESS_CONTINUE_IF_NOT_QUIET => Ok(ProcessStatus::ContinueIfNotQuiet),
            CLAP_PROCESS_TAIL => Ok(ProcessStatus::Tail),
            _ => Ok(ProcessStatus::Continue),
        }
    }

    /// Close the block opened by `process_begin`.
    ///
    /// A processed block closed with the wrong frame count is still closed,
    /// so the next `process_begin` can start over.
    pub fn process_end(&mut self, frames: u32) -> Result<(), ProcessError> {
        if self.phase != BlockPhase::Processed {
            return Err(ProcessError::OutOfOrder);
        }
        if frames != self.frames {
            self.engine_stage.flush_into(&self.ctx.engine_to_app);
            self.input_events.clear();
            self.phase = BlockPhase::Idle;
            return Err(ProcessError::OutOfOrder);
        }
        self.engine_stage.flush_into(&self.ctx.engine_to_app);
        self.input_events.clear();
        self.steady_time += i64::from(frames);
        self.phase = BlockPhase::Idle;
        Ok(())
    }

    /// Stop processing and hand the plugin back to the main thread.
    ///
    /// Called when the audio callback shuts down; the main thread can then
    /// deactivate without waiting. Also runs on drop. Never blocks: if the
    /// main thread holds the plugin, stopping is left to its next
    /// deactivation.
    pub fn relinquish(&mut self) {
        let ctx = Arc::clone(&self.ctx);
        match ctx.audio.try_lock() {
            Some(guard) => {
                if let Some(slot) = *guard {
                    if ctx.state.load() == PluginState::ActiveAndProcessing {
                        slot.plugin.stop_processing();
                        let _ = ctx.state.transition(
                            PluginState::ActiveAndProcessing,
                            PluginState::ActiveAndSleeping,
                        );
                    }
                }
            }
            None => ctx.requests.set(Request::RELINQUISHED),
        }
        self.engine_stage.flush_into(&ctx.engine_to_app);
        self.phase = BlockPhase::Idle;
    }

    /// Move queued host-side value and modulation changes into the block's
    /// input events at offset zero.
    fn drain_host_changes(&mut self, ctx: &HostContext, slot: AudioSlot) {
        // Without a params extension there is nobody to deliver changes to.
        if slot.params.is_none() {
            return;
        }
        let use_cookies = ctx.config.provide_param_cookies;
        let cookie = move |change: &AppToEngineValue| {
            if use_cookies {
                change.cookie
            } else {
                Cookie::NULL
            }
        };
        Self::drain_queue(
            &ctx.app_to_engine_values,
            &mut self.value_stage,
            &mut self.input_events,
            |id, change| PluginEvent::param_value(0, id, cookie(&change), change.value),
        );
        Self::drain_queue(
            &ctx.app_to_engine_mods,
            &mut self.mod_stage,
            &mut self.input_events,
            |id, change| PluginEvent::param_mod(0, id, cookie(&change), change.value),
        );
    }

    fn drain_queue(
        queue: &ReducingQueue<ParamId, AppToEngineValue>,
        stage: &mut ReducingStage<ParamId, AppToEngineValue>,
        events: &mut EventList,
        to_event: impl Fn(ParamId, AppToEngineValue) -> PluginEvent,
    ) {
        // Leftovers from a full block go back in front of newer changes.
        stage.flush_into(queue);
        let _ = queue.try_drain_and_consume(|id, change| {
            if events.insert(to_event(id, change)).is_err() {
                stage.stage(id, change);
            }
        });
    }

    fn run_plugin(&mut self, slot: AudioSlot) -> i32 {
        let inputs = clap_audio_buffer {
            data32: self.input_ptrs.as_mut_ptr(),
            data64: ptr::null_mut(),
            channel_count: self.input_ptrs.len() as u32,
            latency: 0,
            constant_mask: 0,
        };
        let mut outputs = clap_audio_buffer {
            data32: self.output_ptrs.as_mut_ptr(),
            data64: ptr::null_mut(),
            channel_count: self.output_ptrs.len() as u32,
            latency: 0,
            constant_mask: 0,
        };
        let has_inputs = !self.input_ptrs.is_empty();
        let has_outputs = !self.output_ptrs.is_empty();

        let in_events = self.input_events.as_input();
        let out_events = self.output_events.as_output();
        let process = clap_process {
            steady_time: self.steady_time,
            frames_count: self.frames,
            transport: ptr::null(),
            audio_inputs: if has_inputs { &inputs } else { ptr::null() },
            audio_outputs: if has_outputs { &mut outputs } else { ptr::null_mut() },
            audio_inputs_count: has_inputs as u32,
            audio_outputs_count: has_outputs as u32,
            in_events: in_events.as_raw(),
            out_events: out_events.as_raw(),
        };
        slot.plugin.process(&process)
    }

    /// Queue the plugin's parameter output for the main thread.
    fn forward_plugin_changes(&mut self, ctx: &HostContext) {
        for event in self.output_events.iter() {
            match event {
                PluginEvent::ParamValue(e) => {
                    self.engine_stage.push(
                        &ctx.engine_to_app,
                        e.param_id,
                        EngineToAppValue::value(e.value),
                    );
                }
                PluginEvent::ParamGesture(e) => {
                    let begin = e.header.type_ == CLAP_EVENT_PARAM_GESTURE_BEGIN;
                    self.engine_stage.push(
                        &ctx.engine_to_app,
                        e.param_id,
                        EngineToAppValue::gesture(begin),
                    );
                }
                _ => {}
            }
        }
    }

    fn report_failure(ctx: &HostContext) {
        ctx.record_process_failure();
        ctx.requests
            .set(Request::PROCESSING_FAILED.union(Request::DEACTIVATE));
    }

    fn silence_outputs(&mut self) {
        let frames = self.frames as usize;
        for buffer in &mut self.outputs {
            let end = frames.min(buffer.len());
            buffer[..end].fill(0.0);
        }
    }
}

impl Drop for PluginProcessor {
    fn drop(&mut self) {
        self.relinquish();
    }
}

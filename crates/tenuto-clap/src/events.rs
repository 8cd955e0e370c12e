//! Per-block event lists exchanged with the plugin.
//!
//! The input list is kept sorted by sample offset as events are inserted, so
//! host-level note and controller calls may arrive in any order within a
//! block. The output list is append-only and filled by the plugin through
//! `clap_output_events::try_push`. Both lists have a fixed capacity chosen at
//! construction: the audio thread never grows them.

use crate::error::ProcessError;
use crate::params::Cookie;
use crate::ParamId;
use clap_sys::events::{
    clap_event_header, clap_event_midi, clap_event_note, clap_event_note_expression,
    clap_event_param_gesture, clap_event_param_mod, clap_event_param_value, clap_input_events,
    clap_output_events, CLAP_CORE_EVENT_SPACE_ID, CLAP_EVENT_MIDI, CLAP_EVENT_NOTE_CHOKE,
    CLAP_EVENT_NOTE_END, CLAP_EVENT_NOTE_EXPRESSION, CLAP_EVENT_NOTE_OFF, CLAP_EVENT_NOTE_ON,
    CLAP_EVENT_PARAM_GESTURE_BEGIN, CLAP_EVENT_PARAM_GESTURE_END, CLAP_EVENT_PARAM_MOD,
    CLAP_EVENT_PARAM_VALUE,
};
use std::ffi::c_void;
use std::marker::PhantomData;
use std::mem::size_of;
use std::ptr;

/// Wildcard for note id, port, channel or key fields.
const ANY: i16 = -1;

/// One event in a block, stored in its ABI layout.
///
/// Each variant's struct starts with a `clap_event_header`, so a pointer to
/// the payload is also a pointer to the header.
#[allow(clippy::large_enum_variant)]
pub enum PluginEvent {
    Note(clap_event_note),
    NoteExpression(clap_event_note_expression),
    ParamValue(clap_event_param_value),
    ParamMod(clap_event_param_mod),
    ParamGesture(clap_event_param_gesture),
    Midi(clap_event_midi),
}

// Safety: the only pointer inside an event is the parameter cookie, an opaque
// token the plugin hands out for use on any thread.
unsafe impl Send for PluginEvent {}

fn header<T>(time: u32, type_: u16) -> clap_event_header {
    clap_event_header {
        size: size_of::<T>() as u32,
        time,
        space_id: CLAP_CORE_EVENT_SPACE_ID,
        type_,
        flags: 0,
    }
}

impl PluginEvent {
    pub fn note_on(time: u32, port: i16, channel: i16, key: i16, velocity: f64) -> Self {
        Self::note(CLAP_EVENT_NOTE_ON, time, port, channel, key, velocity)
    }

    pub fn note_off(time: u32, port: i16, channel: i16, key: i16, velocity: f64) -> Self {
        Self::note(CLAP_EVENT_NOTE_OFF, time, port, channel, key, velocity)
    }

    fn note(type_: u16, time: u32, port: i16, channel: i16, key: i16, velocity: f64) -> Self {
        PluginEvent::Note(clap_event_note {
            header: header::<clap_event_note>(time, type_),
            note_id: -1,
            port_index: port,
            channel,
            key,
            velocity,
        })
    }

    pub fn note_expression(
        time: u32,
        expression_id: i32,
        port: i16,
        channel: i16,
        key: i16,
        value: f64,
    ) -> Self {
        PluginEvent::NoteExpression(clap_event_note_expression {
            header: header::<clap_event_note_expression>(time, CLAP_EVENT_NOTE_EXPRESSION),
            expression_id,
            note_id: -1,
            port_index: port,
            channel,
            key,
            value,
        })
    }

    pub fn param_value(time: u32, param_id: ParamId, cookie: Cookie, value: f64) -> Self {
        PluginEvent::ParamValue(clap_event_param_value {
            header: header::<clap_event_param_value>(time, CLAP_EVENT_PARAM_VALUE),
            param_id,
            cookie: cookie.as_ptr(),
            note_id: -1,
            port_index: ANY,
            channel: ANY,
            key: ANY,
            value,
        })
    }

    pub fn param_mod(time: u32, param_id: ParamId, cookie: Cookie, amount: f64) -> Self {
        PluginEvent::ParamMod(clap_event_param_mod {
            header: header::<clap_event_param_mod>(time, CLAP_EVENT_PARAM_MOD),
            param_id,
            cookie: cookie.as_ptr(),
            note_id: -1,
            port_index: ANY,
            channel: ANY,
            key: ANY,
            amount,
        })
    }

    pub fn param_gesture(time: u32, param_id: ParamId, begin: bool) -> Self {
        let type_ = if begin {
            CLAP_EVENT_PARAM_GESTURE_BEGIN
        } else {
            CLAP_EVENT_PARAM_GESTURE_END
        };
        PluginEvent::ParamGesture(clap_event_param_gesture {
            header: header::<clap_event_param_gesture>(time, type_),
            param_id,
        })
    }

    pub fn midi(time: u32, port: u16, data: [u8; 3]) -> Self {
        PluginEvent::Midi(clap_event_midi {
            header: header::<clap_event_midi>(time, CLAP_EVENT_MIDI),
            port_index: port,
            data,
        })
    }

    pub fn header(&self) -> &clap_event_header {
        match self {
            PluginEvent::Note(e) => &e.header,
            PluginEvent::NoteExpression(e) => &e.header,
            PluginEvent::ParamValue(e) => &e.header,
            PluginEvent::ParamMod(e) => &e.header,
            PluginEvent::ParamGesture(e) => &e.header,
            PluginEvent::Midi(e) => &e.header,
        }
    }

    pub fn time(&self) -> u32 {
        self.header().time
    }

    pub fn event_type(&self) -> u16 {
        self.header().type_
    }

    /// Copy a plugin-provided event into host memory.
    ///
    /// Returns `None` for events outside the core namespace, of an unknown
    /// type, or whose declared size is too small for their type.
    ///
    /// # Safety
    /// `event` must point to a readable event of at least `header.size` bytes.
    pub(crate) unsafe fn from_raw(event: *const clap_event_header) -> Option<Self> {
        unsafe fn read<T>(event: *const clap_event_header) -> Option<T> {
            if ((*event).size as usize) < size_of::<T>() {
                return None;
            }
            Some(ptr::read_unaligned(event as *const T))
        }

        if event.is_null() || (*event).space_id != CLAP_CORE_EVENT_SPACE_ID {
            return None;
        }

        match (*event).type_ {
            CLAP_EVENT_NOTE_ON | CLAP_EVENT_NOTE_OFF | CLAP_EVENT_NOTE_CHOKE
            | CLAP_EVENT_NOTE_END => read(event).map(PluginEvent::Note),
            CLAP_EVENT_NOTE_EXPRESSION => read(event).map(PluginEvent::NoteExpression),
            CLAP_EVENT_PARAM_VALUE => read(event).map(PluginEvent::ParamValue),
            CLAP_EVENT_PARAM_MOD => read(event).map(PluginEvent::ParamMod),
            CLAP_EVENT_PARAM_GESTURE_BEGIN | CLAP_EVENT_PARAM_GESTURE_END => {
                read(event).map(PluginEvent::ParamGesture)
            }
            CLAP_EVENT_MIDI => read(event).map(PluginEvent::Midi),
            _ => None,
        }
    }
}

impl std::fmt::Debug for PluginEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PluginEvent::Note(e) => f
                .debug_struct("Note")
                .field("time", &e.header.time)
                .field("type", &e.header.type_)
                .field("channel", &e.channel)
                .field("key", &e.key)
                .field("velocity", &e.velocity)
                .finish(),
            PluginEvent::NoteExpression(e) => f
                .debug_struct("NoteExpression")
                .field("time", &e.header.time)
                .field("expression_id", &e.expression_id)
                .field("key", &e.key)
                .field("value", &e.value)
                .finish(),
            PluginEvent::ParamValue(e) => f
                .debug_struct("ParamValue")
                .field("time", &e.header.time)
                .field("param_id", &e.param_id)
                .field("value", &e.value)
                .finish(),
            PluginEvent::ParamMod(e) => f
                .debug_struct("ParamMod")
                .field("time", &e.header.time)
                .field("param_id", &e.param_id)
                .field("amount", &e.amount)
                .finish(),
            PluginEvent::ParamGesture(e) => f
                .debug_struct("ParamGesture")
                .field("time", &e.header.time)
                .field("param_id", &e.param_id)
                .field("begin", &(e.header.type_ == CLAP_EVENT_PARAM_GESTURE_BEGIN))
                .finish(),
            PluginEvent::Midi(e) => f
                .debug_struct("Midi")
                .field("time", &e.header.time)
                .field("data", &e.data)
                .finish(),
        }
    }
}

/// A fixed-capacity list of events for one processing block.
pub struct EventList {
    events: Vec<PluginEvent>,
}

impl EventList {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            events: Vec::with_capacity(capacity),
        }
    }

    pub fn capacity(&self) -> usize {
        self.events.capacity()
    }

    /// Insert keeping sample offsets non-decreasing. Events with equal
    /// offsets keep their insertion order.
    pub fn insert(&mut self, event: PluginEvent) -> Result<(), ProcessError> {
        if self.events.len() == self.events.capacity() {
            return Err(ProcessError::EventListFull);
        }
        let time = event.time();
        let index = self.events.partition_point(|e| e.time() <= time);
        self.events.insert(index, event);
        Ok(())
    }

    /// Append without reordering. Used for plugin output.
    pub fn push(&mut self, event: PluginEvent) -> Result<(), ProcessError> {
        if self.events.len() == self.events.capacity() {
            return Err(ProcessError::EventListFull);
        }
        self.events.push(event);
        Ok(())
    }

    pub fn clear(&mut self) {
        self.events.clear();
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&PluginEvent> {
        self.events.get(index)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, PluginEvent> {
        self.events.iter()
    }

    /// Whether sample offsets are non-decreasing.
    pub fn is_sorted(&self) -> bool {
        self.events.windows(2).all(|w| w[0].time() <= w[1].time())
    }

    /// Borrow the list as a `clap_input_events` table.
    pub(crate) fn as_input(&self) -> InputEvents<'_> {
        InputEvents {
            raw: clap_input_events {
                ctx: self as *const EventList as *mut c_void,
                size: Some(input_size),
                get: Some(input_get),
            },
            _list: PhantomData,
        }
    }

    /// Borrow the list as a `clap_output_events` sink.
    pub(crate) fn as_output(&mut self) -> OutputEvents<'_> {
        OutputEvents {
            raw: clap_output_events {
                ctx: self as *mut EventList as *mut c_void,
                try_push: Some(output_try_push),
            },
            _list: PhantomData,
        }
    }
}

impl<'a> IntoIterator for &'a EventList {
    type Item = &'a PluginEvent;
    type IntoIter = std::slice::Iter<'a, PluginEvent>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

pub(crate) struct InputEvents<'a> {
    raw: clap_input_events,
    _list: PhantomData<&'a EventList>,
}

impl InputEvents<'_> {
    pub(crate) fn as_raw(&self) -> *const clap_input_events {
        &self.raw
    }
}

pub(crate) struct OutputEvents<'a> {
    raw: clap_output_events,
    _list: PhantomData<&'a mut EventList>,
}

impl OutputEvents<'_> {
    pub(crate) fn as_raw(&self) -> *const clap_output_events {
        &self.raw
    }
}

unsafe extern "C" fn input_size(list: *const clap_input_events) -> u32 {
    let events = &*((*list).ctx as *const EventList);
    events.len() as u32
}

unsafe extern "C" fn input_get(
    list: *const clap_input_events,
    index: u32,
) -> *const clap_event_header {
    let events = &*((*list).ctx as *const EventList);
    match events.get(index as usize) {
        Some(event) => event.header(),
        None => ptr::null(),
    }
}

unsafe extern "C" fn output_try_push(
    list: *const clap_output_events,
    event: *const clap_event_header,
) -> bool {
    let events = &mut *((*list).ctx as *mut EventList);
    match PluginEvent::from_raw(event) {
        Some(event) => events.push(event).is_ok(),
        // Unknown event types are accepted and dropped.
        None => !event.is_null(),
    }
}

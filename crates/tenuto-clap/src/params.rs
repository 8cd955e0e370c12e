//! Parameter catalog and the values queued across the thread boundary.
//!
//! The catalog is owned by the main thread. The audio thread never reads it;
//! it only sees values through the reducing queues ([`AppToEngineValue`] in
//! one direction, [`EngineToAppValue`] in the other).

use crate::error::{HostError, Result};
use crate::metadata::c_buffer_string;
use crate::ParamId;
use clap_sys::ext::params::{
    clap_param_info, CLAP_PARAM_IS_AUTOMATABLE, CLAP_PARAM_IS_BYPASS, CLAP_PARAM_IS_HIDDEN,
    CLAP_PARAM_IS_PERIODIC, CLAP_PARAM_IS_READONLY, CLAP_PARAM_IS_STEPPED,
    CLAP_PARAM_RESCAN_ALL, CLAP_PARAM_RESCAN_INFO, CLAP_PARAM_RESCAN_TEXT,
    CLAP_PARAM_RESCAN_VALUES,
};
use hashbrown::{HashMap, HashSet};
use std::ffi::c_void;
use tenuto_core::Reduce;

/// Opaque per-parameter token the plugin asks to receive with every event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cookie(*mut c_void);

// Safety: the cookie is never dereferenced by the host; the plugin defines it
// as usable from any thread.
unsafe impl Send for Cookie {}
unsafe impl Sync for Cookie {}

impl Cookie {
    pub const NULL: Cookie = Cookie(std::ptr::null_mut());

    pub(crate) fn from_ptr(ptr: *mut c_void) -> Self {
        Cookie(ptr)
    }

    pub fn as_ptr(self) -> *mut c_void {
        self.0
    }

    pub fn is_null(self) -> bool {
        self.0.is_null()
    }
}

impl Default for Cookie {
    fn default() -> Self {
        Cookie::NULL
    }
}

/// Parameter flags reported by the plugin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ParamFlags(u32);

impl ParamFlags {
    pub fn from_bits(bits: u32) -> Self {
        ParamFlags(bits)
    }

    pub fn bits(self) -> u32 {
        self.0
    }

    pub fn is_stepped(self) -> bool {
        self.0 & CLAP_PARAM_IS_STEPPED != 0
    }

    pub fn is_periodic(self) -> bool {
        self.0 & CLAP_PARAM_IS_PERIODIC != 0
    }

    pub fn is_hidden(self) -> bool {
        self.0 & CLAP_PARAM_IS_HIDDEN != 0
    }

    pub fn is_read_only(self) -> bool {
        self.0 & CLAP_PARAM_IS_READONLY != 0
    }

    pub fn is_bypass(self) -> bool {
        self.0 & CLAP_PARAM_IS_BYPASS != 0
    }

    pub fn is_automatable(self) -> bool {
        self.0 & CLAP_PARAM_IS_AUTOMATABLE != 0
    }
}

/// Static description of one parameter.
#[derive(Debug, Clone, PartialEq)]
pub struct ParamInfo {
    pub id: ParamId,
    pub name: String,
    /// Slash-separated group path, e.g. `"Oscillators/Osc 1"`
    pub module: String,
    pub min_value: f64,
    pub max_value: f64,
    pub default_value: f64,
    pub flags: ParamFlags,
    pub cookie: Cookie,
}

impl ParamInfo {
    pub(crate) fn from_raw(info: &clap_param_info) -> Self {
        Self {
            id: info.id,
            name: c_buffer_string(&info.name),
            module: c_buffer_string(&info.module),
            min_value: info.min_value,
            max_value: info.max_value,
            default_value: info.default_value,
            flags: ParamFlags::from_bits(info.flags),
            cookie: Cookie::from_ptr(info.cookie),
        }
    }

    pub fn contains(&self, value: f64) -> bool {
        value >= self.min_value && value <= self.max_value
    }

    pub fn range(&self) -> f64 {
        self.max_value - self.min_value
    }
}

/// A parameter as seen by the host application.
#[derive(Debug, Clone)]
pub struct PluginParam {
    info: ParamInfo,
    value: f64,
    modulation: f64,
    is_adjusting: bool,
}

impl PluginParam {
    fn new(info: ParamInfo) -> Self {
        Self {
            value: info.default_value,
            info,
            modulation: 0.0,
            is_adjusting: false,
        }
    }

    pub fn info(&self) -> &ParamInfo {
        &self.info
    }

    pub fn id(&self) -> ParamId {
        self.info.id
    }

    pub fn value(&self) -> f64 {
        self.value
    }

    pub fn modulation(&self) -> f64 {
        self.modulation
    }

    /// Whether the plugin is inside a begin/end gesture for this parameter.
    pub fn is_adjusting(&self) -> bool {
        self.is_adjusting
    }
}

/// Which subset of the catalog a plugin-initiated rescan touches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RescanFlags(u32);

impl RescanFlags {
    const KNOWN: u32 = CLAP_PARAM_RESCAN_VALUES
        | CLAP_PARAM_RESCAN_TEXT
        | CLAP_PARAM_RESCAN_INFO
        | CLAP_PARAM_RESCAN_ALL;

    /// Validate raw rescan flags. Zero or unknown bits are malformed.
    pub fn new(bits: u32) -> Result<Self> {
        if bits == 0 {
            return Err(HostError::violation("clap_host_params.rescan", "empty flags"));
        }
        if bits & !Self::KNOWN != 0 {
            return Err(HostError::violation(
                "clap_host_params.rescan",
                format!("unknown flag bits {:#x}", bits & !Self::KNOWN),
            ));
        }
        Ok(RescanFlags(bits))
    }

    pub fn bits(self) -> u32 {
        self.0
    }

    pub fn is_all(self) -> bool {
        self.0 & CLAP_PARAM_RESCAN_ALL != 0
    }

    pub fn may_value_change(self) -> bool {
        self.0 & (CLAP_PARAM_RESCAN_ALL | CLAP_PARAM_RESCAN_VALUES) != 0
    }

    pub fn may_info_change(self) -> bool {
        self.0 & (CLAP_PARAM_RESCAN_ALL | CLAP_PARAM_RESCAN_INFO) != 0
    }

    pub fn text_changed(self) -> bool {
        self.0 & (CLAP_PARAM_RESCAN_ALL | CLAP_PARAM_RESCAN_TEXT) != 0
    }
}

/// Outcome of applying a scan to the catalog.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ScanReport {
    pub added: Vec<ParamId>,
    pub removed: Vec<ParamId>,
    pub updated: usize,
}

/// The cached model of every parameter the plugin exposes.
#[derive(Debug, Default)]
pub struct ParamCatalog {
    params: HashMap<ParamId, PluginParam>,
    /// Ids in plugin declaration order
    order: Vec<ParamId>,
}

impl ParamCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn get(&self, id: ParamId) -> Option<&PluginParam> {
        self.params.get(&id)
    }

    pub fn contains(&self, id: ParamId) -> bool {
        self.params.contains_key(&id)
    }

    /// Parameters in the order the plugin declared them.
    pub fn iter(&self) -> impl Iterator<Item = &PluginParam> {
        self.order.iter().filter_map(|id| self.params.get(id))
    }

    pub fn ids(&self) -> &[ParamId] {
        &self.order
    }

    /// Replace the catalog with a full scan.
    ///
    /// Ids absent from `infos` are dropped, new ids start at their default
    /// value, and ids present before keep their current value with refreshed
    /// metadata. Duplicate ids reject the whole scan.
    pub fn apply_full_scan(&mut self, infos: Vec<ParamInfo>) -> Result<ScanReport> {
        Self::check_unique(&infos)?;

        let mut report = ScanReport::default();
        let mut params = HashMap::with_capacity(infos.len());
        let mut order = Vec::with_capacity(infos.len());

        for info in infos {
            let id = info.id;
            let param = match self.params.remove(&id) {
                Some(mut existing) => {
                    report.updated += 1;
                    existing.info = info;
                    existing
                }
                None => {
                    report.added.push(id);
                    PluginParam::new(info)
                }
            };
            order.push(id);
            params.insert(id, param);
        }

        report.removed = self
            .order
            .iter()
            .copied()
            .filter(|id| self.params.contains_key(id))
            .collect();

        self.params = params;
        self.order = order;
        Ok(report)
    }

    /// Refresh metadata in place. The id set must be unchanged: only a full
    /// rescan may add or remove parameters.
    pub fn apply_info_rescan(&mut self, infos: Vec<ParamInfo>) -> Result<usize> {
        Self::check_unique(&infos)?;
        if infos.len() != self.params.len() || infos.iter().any(|i| !self.contains(i.id)) {
            return Err(HostError::violation(
                "clap_host_params.rescan",
                "parameter set changed without CLAP_PARAM_RESCAN_ALL",
            ));
        }

        let count = infos.len();
        for info in infos {
            if let Some(param) = self.params.get_mut(&info.id) {
                param.info = info;
            }
        }
        Ok(count)
    }

    fn check_unique(infos: &[ParamInfo]) -> Result<()> {
        let mut seen = HashSet::with_capacity(infos.len());
        for info in infos {
            if !seen.insert(info.id) {
                return Err(HostError::violation(
                    "clap_plugin_params.get_info",
                    format!("duplicate parameter id {}", info.id),
                ));
            }
        }
        Ok(())
    }

    /// Validate a host-side value change without applying it.
    pub fn check_value(&self, id: ParamId, value: f64) -> Result<&PluginParam> {
        let param = self.params.get(&id).ok_or(HostError::UnknownParam(id))?;
        if param.info.flags.is_read_only() {
            return Err(HostError::ReadOnlyParam(id));
        }
        if !param.info.contains(value) {
            return Err(HostError::ParamValueOutOfRange {
                id,
                value,
                min: param.info.min_value,
                max: param.info.max_value,
            });
        }
        Ok(param)
    }

    /// Validate a modulation amount: its magnitude may span the full range.
    pub fn check_modulation(&self, id: ParamId, amount: f64) -> Result<&PluginParam> {
        let param = self.params.get(&id).ok_or(HostError::UnknownParam(id))?;
        let span = param.info.range();
        // Written so that NaN fails the check.
        if !(amount.abs() <= span) {
            return Err(HostError::ParamValueOutOfRange {
                id,
                value: amount,
                min: -span,
                max: span,
            });
        }
        Ok(param)
    }

    /// Store a value. Returns `true` if it differs from the cached one.
    pub(crate) fn set_value(&mut self, id: ParamId, value: f64) -> bool {
        match self.params.get_mut(&id) {
            Some(param) if param.value != value => {
                param.value = value;
                true
            }
            _ => false,
        }
    }

    pub(crate) fn set_modulation(&mut self, id: ParamId, amount: f64) {
        if let Some(param) = self.params.get_mut(&id) {
            param.modulation = amount;
        }
    }

    /// Record a gesture edge from the plugin.
    ///
    /// A begin while already adjusting, or an end while not adjusting, is a
    /// malformed sequence; the state is still updated to follow the plugin.
    pub(crate) fn set_adjusting(&mut self, id: ParamId, begin: bool) -> Result<()> {
        let param = self.params.get_mut(&id).ok_or(HostError::UnknownParam(id))?;
        let was = std::mem::replace(&mut param.is_adjusting, begin);
        if was == begin {
            let edge = if begin { "begin" } else { "end" };
            return Err(HostError::violation(
                "clap_output_events.try_push",
                format!("gesture {edge} repeated for parameter {id}"),
            ));
        }
        Ok(())
    }

    pub(crate) fn clear(&mut self) {
        self.params.clear();
        self.order.clear();
    }
}

/// A host-side change waiting for the audio thread (value or modulation).
///
/// The cookie always follows the most recent update.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AppToEngineValue {
    pub cookie: Cookie,
    pub value: f64,
}

impl Reduce for AppToEngineValue {
    fn reduce(&mut self, newer: Self) {
        *self = newer;
    }
}

/// A plugin-side change waiting for the main thread.
///
/// Merging is additive: a pending value survives a later gesture-only update
/// and the other way round.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct EngineToAppValue {
    pub value: Option<f64>,
    /// `Some(true)` for gesture begin, `Some(false)` for end
    pub gesture: Option<bool>,
}

impl EngineToAppValue {
    pub fn value(value: f64) -> Self {
        Self {
            value: Some(value),
            gesture: None,
        }
    }

    pub fn gesture(begin: bool) -> Self {
        Self {
            value: None,
            gesture: Some(begin),
        }
    }
}

impl Reduce for EngineToAppValue {
    fn reduce(&mut self, newer: Self) {
        if newer.value.is_some() {
            self.value = newer.value;
        }
        if newer.gesture.is_some() {
            self.gesture = newer.gesture;
        }
    }
}

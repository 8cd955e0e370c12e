//! Quick-control pages: small, ordered bundles of parameter slots for
//! hardware controllers.

use crate::error::{HostError, Result};
use crate::metadata::c_buffer_string;
use crate::{PageId, ParamId, INVALID_ID};
use clap_sys::ext::remote_controls::clap_remote_controls_page;
use hashbrown::HashMap;

/// Number of parameter slots on one page.
pub const QUICK_CONTROLS_SLOTS: usize = 8;

#[derive(Debug, Clone, PartialEq)]
pub struct QuickControlsPage {
    pub id: PageId,
    pub name: String,
    pub section: String,
    /// `INVALID_ID` marks an empty slot.
    pub param_ids: [ParamId; QUICK_CONTROLS_SLOTS],
    pub is_for_preset: bool,
}

impl QuickControlsPage {
    pub(crate) fn from_raw(page: &clap_remote_controls_page) -> Self {
        let mut param_ids = [INVALID_ID; QUICK_CONTROLS_SLOTS];
        for (slot, id) in param_ids.iter_mut().zip(page.param_ids.iter()) {
            *slot = *id;
        }
        Self {
            id: page.page_id,
            name: c_buffer_string(&page.page_name),
            section: c_buffer_string(&page.section_name),
            param_ids,
            is_for_preset: page.is_for_preset,
        }
    }

    /// Bound parameter ids, skipping empty slots.
    pub fn bound_params(&self) -> impl Iterator<Item = ParamId> + '_ {
        self.param_ids.iter().copied().filter(|&id| id != INVALID_ID)
    }
}

/// Page list indexed both by position and by id, plus the selection.
#[derive(Debug)]
pub struct QuickControls {
    pages: Vec<QuickControlsPage>,
    index: HashMap<PageId, usize>,
    selected: PageId,
}

impl Default for QuickControls {
    fn default() -> Self {
        Self {
            pages: Vec::new(),
            index: HashMap::new(),
            selected: INVALID_ID,
        }
    }
}

impl QuickControls {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pages(&self) -> &[QuickControlsPage] {
        &self.pages
    }

    pub fn page(&self, id: PageId) -> Option<&QuickControlsPage> {
        self.index.get(&id).map(|&i| &self.pages[i])
    }

    pub fn selected(&self) -> PageId {
        self.selected
    }

    pub fn selected_page(&self) -> Option<&QuickControlsPage> {
        self.page(self.selected)
    }

    /// Replace every page. The previous selection is kept if its page still
    /// exists, otherwise the first page (or none) is selected.
    ///
    /// Returns `true` if the selection changed.
    pub fn apply_scan(&mut self, pages: Vec<QuickControlsPage>) -> Result<bool> {
        let mut index = HashMap::with_capacity(pages.len());
        for (i, page) in pages.iter().enumerate() {
            if page.id == INVALID_ID {
                return Err(HostError::violation(
                    "clap_plugin_remote_controls.get",
                    format!("page {i} uses the invalid id"),
                ));
            }
            if index.insert(page.id, i).is_some() {
                return Err(HostError::violation(
                    "clap_plugin_remote_controls.get",
                    format!("duplicate page id {}", page.id),
                ));
            }
        }

        self.pages = pages;
        self.index = index;

        let next = if self.index.contains_key(&self.selected) {
            self.selected
        } else {
            self.pages.first().map_or(INVALID_ID, |p| p.id)
        };
        Ok(self.set_selected(next))
    }

    /// Select a page by id. `INVALID_ID` clears the selection.
    ///
    /// Returns `true` if the selection changed.
    pub fn select(&mut self, id: PageId) -> Result<bool> {
        if id != INVALID_ID && !self.index.contains_key(&id) {
            return Err(HostError::UnknownQuickControlsPage(id));
        }
        Ok(self.set_selected(id))
    }

    fn set_selected(&mut self, id: PageId) -> bool {
        std::mem::replace(&mut self.selected, id) != id
    }

    pub(crate) fn clear(&mut self) -> bool {
        self.pages.clear();
        self.index.clear();
        self.set_selected(INVALID_ID)
    }
}

//! Canonical value of every control for every (owner, page) pair.
//!
//! Values resolve through three tiers: a `live` value set during this session
//! wins; otherwise the owner's declared initial value applies, but only until
//! the page has been visited once; otherwise the stored default.

use std::collections::BTreeMap;
use std::sync::Arc;

use log::{debug, trace, warn};
use parking_lot::Mutex;

use super::descriptor::{ControlDescriptor, PageKey, Slot, ValueRange};
use super::visit::VisitMarker;
use crate::core::error::{PanelError, Result};
use crate::core::util::HashMap;
use crate::persistence::snapshot::PersistedSnapshot;
use crate::render::dirty::{DirtyRegion, DirtyTracker, Layer};

pub type SharedStore = Arc<Mutex<ParameterStore>>;

#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum ValueSource {
    Live,
    Initial,
    Default,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ParamRecord {
    pub current_value: f32,
    pub source: ValueSource,
    /// Differs from the last persisted value.
    pub dirty: bool,
}

impl ParamRecord {
    fn defaulted(value: f32) -> Self {
        Self {
            current_value: value,
            source: ValueSource::Default,
            dirty: false,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Resolved {
    pub value: f32,
    pub source: ValueSource,
}

/// Read-side view of one control, handed to render code.
#[derive(Clone, Debug, PartialEq)]
pub struct ControlState {
    pub descriptor: ControlDescriptor,
    pub value: f32,
    pub source: ValueSource,
}

impl ControlState {
    pub fn display_value(&self) -> String {
        self.descriptor.display_value(self.value)
    }
}

#[derive(Debug, Default)]
struct PageParams {
    descriptors: BTreeMap<Slot, ControlDescriptor>,
    records: BTreeMap<Slot, ParamRecord>,
    initial: BTreeMap<Slot, f32>,
}

#[derive(Debug)]
pub struct ParameterStore {
    pages: HashMap<PageKey, PageParams>,
    visits: VisitMarker,
    tracker: DirtyTracker,
}

impl ParameterStore {
    pub fn new(tracker: DirtyTracker) -> Self {
        Self {
            pages: HashMap::default(),
            visits: VisitMarker::new(),
            tracker,
        }
    }

    pub fn shared(self) -> SharedStore {
        Arc::new(Mutex::new(self))
    }

    pub fn tracker(&self) -> &DirtyTracker {
        &self.tracker
    }

    /// Replaces the page's descriptors. Existing records survive a rebuild
    /// (clamped into the new range); slots seen for the first time get a
    /// default record.
    pub fn rebuild_page(
        &mut self,
        key: &PageKey,
        descriptors: Vec<ControlDescriptor>,
    ) -> Result<()> {
        for descriptor in &descriptors {
            validate_descriptor(key, descriptor)?;
        }

        let page = self.pages.entry(key.clone()).or_default();
        page.descriptors.clear();

        for mut descriptor in descriptors {
            descriptor.page = key.clone();
            install_descriptor(page, descriptor);
        }

        trace!(
            "rebuilt {} with {} controls",
            key,
            page.descriptors.len()
        );

        Ok(())
    }

    /// Adds a control after the initial rebuild, e.g. one owned by a custom
    /// widget. When the page has already been visited the control is resolved
    /// immediately since initial values no longer apply.
    pub fn register_control(
        &mut self,
        key: &PageKey,
        mut descriptor: ControlDescriptor,
    ) -> Result<()> {
        validate_descriptor(key, &descriptor)?;
        descriptor.page = key.clone();
        let slot = descriptor.slot;

        let page = self.pages.entry(key.clone()).or_default();
        install_descriptor(page, descriptor);

        if self.visits.contains(key) {
            debug!(
                "{} registered after {} was visited; initial values skipped",
                slot, key
            );
            self.apply_resolution(key, slot);
        }

        Ok(())
    }

    pub fn relabel(
        &mut self,
        key: &PageKey,
        slot: Slot,
        label: &str,
    ) -> Result<()> {
        let descriptor = self
            .pages
            .get_mut(key)
            .and_then(|page| page.descriptors.get_mut(&slot))
            .ok_or_else(|| unknown_control(key, slot))?;
        descriptor.label = label.to_string();
        Ok(())
    }

    pub fn declare_initial(&mut self, key: &PageKey, slot: Slot, value: f32) {
        self.pages
            .entry(key.clone())
            .or_default()
            .initial
            .insert(slot, value);
    }

    pub fn declare_initial_table(
        &mut self,
        key: &PageKey,
        table: impl IntoIterator<Item = (Slot, f32)>,
    ) {
        let page = self.pages.entry(key.clone()).or_default();
        page.initial.extend(table);
    }

    pub fn descriptor(
        &self,
        key: &PageKey,
        slot: Slot,
    ) -> Option<&ControlDescriptor> {
        self.pages.get(key)?.descriptors.get(&slot)
    }

    pub fn descriptors(&self, key: &PageKey) -> Vec<ControlDescriptor> {
        self.pages
            .get(key)
            .map(|page| page.descriptors.values().cloned().collect())
            .unwrap_or_default()
    }

    pub fn record(&self, key: &PageKey, slot: Slot) -> Option<&ParamRecord> {
        self.pages.get(key)?.records.get(&slot)
    }

    pub fn value(&self, key: &PageKey, slot: Slot) -> Option<f32> {
        self.record(key, slot).map(|r| r.current_value)
    }

    pub fn set(
        &mut self,
        owner: &str,
        page: &str,
        slot: Slot,
        value: f32,
    ) -> Result<bool> {
        self.set_value(&PageKey::new(owner, page), slot, value)
    }

    /// Clamps `value` into the control's range and stores it as a live value.
    /// Returns false (and marks nothing) when the effective value is unchanged.
    pub fn set_value(
        &mut self,
        key: &PageKey,
        slot: Slot,
        value: f32,
    ) -> Result<bool> {
        let previous = self.resolve_key(key, slot);
        let page = self
            .pages
            .get_mut(key)
            .ok_or_else(|| unknown_control(key, slot))?;
        let descriptor = page
            .descriptors
            .get(&slot)
            .ok_or_else(|| unknown_control(key, slot))?;

        let clamped = descriptor.clamp(value);
        let rect = descriptor.rect;
        let record = page
            .records
            .entry(slot)
            .or_insert_with(|| ParamRecord::defaulted(descriptor.default));

        let changed = previous.value != clamped;
        if !changed && record.source == ValueSource::Live {
            return Ok(false);
        }

        record.current_value = clamped;
        record.source = ValueSource::Live;
        record.dirty = true;
        if !changed {
            return Ok(false);
        }

        trace!("{} {} = {}", key, slot, clamped);

        self.tracker.mark(DirtyRegion::new(
            rect,
            Layer::Controls,
            slot_priority(slot),
            Some(key.clone()),
        ));

        Ok(true)
    }

    /// Relative change, as produced by drags and endless encoders.
    pub fn nudge(
        &mut self,
        key: &PageKey,
        slot: Slot,
        delta: f32,
    ) -> Result<bool> {
        let current = self.resolve_key(key, slot).value;
        self.set_value(key, slot, current + delta)
    }

    /// Advances a discrete control to its next state, wrapping around.
    pub fn toggle(&mut self, key: &PageKey, slot: Slot) -> Result<bool> {
        let descriptor = self
            .descriptor(key, slot)
            .ok_or_else(|| unknown_control(key, slot))?;
        let (_, max) = descriptor.range.bounds();
        let next = match descriptor.range {
            ValueRange::Discrete(_) => {
                let current = self.resolve_key(key, slot).value;
                if current >= max { 0.0 } else { current + 1.0 }
            }
            ValueRange::Continuous { min, max } => {
                let current = self.resolve_key(key, slot).value;
                if current > min { min } else { max }
            }
        };
        self.set_value(key, slot, next)
    }

    pub fn resolve(&self, owner: &str, page: &str, slot: Slot) -> Resolved {
        self.resolve_key(&PageKey::new(owner, page), slot)
    }

    pub fn resolve_key(&self, key: &PageKey, slot: Slot) -> Resolved {
        let Some(page) = self.pages.get(key) else {
            return Resolved {
                value: 0.0,
                source: ValueSource::Default,
            };
        };

        let record = page.records.get(&slot);
        if let Some(record) = record {
            if record.source == ValueSource::Live {
                return Resolved {
                    value: record.current_value,
                    source: ValueSource::Live,
                };
            }
        }

        if !self.visits.contains(key) {
            if let Some(initial) = page.initial.get(&slot) {
                let value = page
                    .descriptors
                    .get(&slot)
                    .map(|d| d.clamp(*initial))
                    .unwrap_or(*initial);
                return Resolved {
                    value,
                    source: ValueSource::Initial,
                };
            }
        }

        let value = record
            .map(|r| r.current_value)
            .or_else(|| page.descriptors.get(&slot).map(|d| d.default))
            .unwrap_or(0.0);

        Resolved {
            value,
            source: ValueSource::Default,
        }
    }

    /// Resolves every registered control of the page and writes the result
    /// into its record. Initial and default applications are not mutations:
    /// they neither mark the record dirty nor emit dirty regions.
    pub fn resolve_page(&mut self, key: &PageKey) -> usize {
        let slots: Vec<Slot> = match self.pages.get(key) {
            Some(page) => page.descriptors.keys().copied().collect(),
            None => return 0,
        };

        for slot in &slots {
            self.apply_resolution(key, *slot);
        }

        slots.len()
    }

    fn apply_resolution(&mut self, key: &PageKey, slot: Slot) {
        let resolved = self.resolve_key(key, slot);
        let Some(page) = self.pages.get_mut(key) else {
            return;
        };
        let record = page
            .records
            .entry(slot)
            .or_insert_with(|| ParamRecord::defaulted(resolved.value));
        if record.source != ValueSource::Live {
            record.current_value = resolved.value;
            record.source = resolved.source;
        }
    }

    /// Records that the page has been shown. Must only be called once every
    /// control of the page (late registrations included) has been resolved.
    pub fn mark_visited(&mut self, key: &PageKey) -> bool {
        if let Some(page) = self.pages.get_mut(key) {
            for record in page.records.values_mut() {
                if record.source == ValueSource::Initial {
                    record.source = ValueSource::Default;
                }
            }
        }
        self.visits.mark(key)
    }

    pub fn is_visited(&self, key: &PageKey) -> bool {
        self.visits.contains(key)
    }

    /// Resolved view of every control on the page, in slot order.
    pub fn page_controls(&self, key: &PageKey) -> Vec<ControlState> {
        let Some(page) = self.pages.get(key) else {
            return Vec::new();
        };
        page.descriptors
            .values()
            .map(|descriptor| {
                let resolved = self.resolve_key(key, descriptor.slot);
                ControlState {
                    descriptor: descriptor.clone(),
                    value: resolved.value,
                    source: resolved.source,
                }
            })
            .collect()
    }

    /// Drops every live value on the page back to the control default. A
    /// declared initial value for a reset slot is discarded too: once a live
    /// value has been set, the initial value never applies again.
    pub fn reset_page(&mut self, key: &PageKey) -> usize {
        let Some(page) = self.pages.get_mut(key) else {
            return 0;
        };

        let mut reset = 0;
        for (slot, record) in page.records.iter_mut() {
            if record.source != ValueSource::Live {
                continue;
            }
            let Some(descriptor) = page.descriptors.get(slot) else {
                continue;
            };
            page.initial.remove(slot);
            record.current_value = descriptor.default;
            record.source = ValueSource::Default;
            record.dirty = true;
            reset += 1;
            self.tracker.mark(DirtyRegion::new(
                descriptor.rect,
                Layer::Controls,
                slot_priority(*slot),
                Some(key.clone()),
            ));
        }

        reset
    }

    /// Serializes every live record.
    pub fn commit_snapshot(&self) -> PersistedSnapshot {
        let mut snapshot = PersistedSnapshot::new();
        for (key, page) in &self.pages {
            for (slot, record) in &page.records {
                if record.source == ValueSource::Live {
                    snapshot.insert(key, *slot, record.current_value);
                }
            }
        }
        snapshot
    }

    /// Seeds live values from disk. Expected once at startup, before any page
    /// has been visited.
    pub fn load_snapshot(&mut self, snapshot: &PersistedSnapshot) -> usize {
        if !self.visits.is_empty() {
            warn!(
                "loading snapshot after {} pages were visited",
                self.visits.len()
            );
        }

        let mut loaded = 0;
        for (key, slot, value) in snapshot.entries() {
            let page = self.pages.entry(key).or_default();
            let value = page
                .descriptors
                .get(&slot)
                .map(|d| d.clamp(value))
                .unwrap_or(value);
            page.records.insert(
                slot,
                ParamRecord {
                    current_value: value,
                    source: ValueSource::Live,
                    dirty: false,
                },
            );
            loaded += 1;
        }

        debug!("loaded {} persisted values", loaded);
        loaded
    }

    /// Clears the dirty flag of every record whose state matches what was just
    /// written. Records changed since the snapshot was taken stay dirty.
    pub fn mark_persisted(&mut self, snapshot: &PersistedSnapshot) -> usize {
        let mut cleared = 0;
        for (key, page) in self.pages.iter_mut() {
            for (slot, record) in page.records.iter_mut() {
                if !record.dirty {
                    continue;
                }
                let persisted = snapshot.get(key, *slot);
                let current = match record.source {
                    ValueSource::Live => Some(record.current_value),
                    _ => None,
                };
                if persisted == current {
                    record.dirty = false;
                    cleared += 1;
                }
            }
        }
        cleared
    }

    pub fn has_unpersisted(&self) -> bool {
        self.pages
            .values()
            .any(|page| page.records.values().any(|r| r.dirty))
    }
}

fn install_descriptor(page: &mut PageParams, descriptor: ControlDescriptor) {
    let slot = descriptor.slot;
    match page.records.get_mut(&slot) {
        Some(record) => {
            let clamped = descriptor.clamp(record.current_value);
            if clamped != record.current_value {
                record.current_value = clamped;
                if record.source == ValueSource::Live {
                    record.dirty = true;
                }
            }
        }
        None => {
            page.records
                .insert(slot, ParamRecord::defaulted(descriptor.default));
        }
    }
    page.descriptors.insert(slot, descriptor);
}

fn validate_descriptor(
    key: &PageKey,
    descriptor: &ControlDescriptor,
) -> Result<()> {
    if !descriptor.slot.is_valid() {
        return Err(PanelError::Configuration(format!(
            "{} declares out-of-range slot {:?}",
            key, descriptor.slot
        )));
    }
    if let ValueRange::Discrete(states) = &descriptor.range {
        if states.is_empty() {
            return Err(PanelError::Configuration(format!(
                "{} {} declares no states",
                key, descriptor.slot
            )));
        }
    }
    Ok(())
}

fn unknown_control(key: &PageKey, slot: Slot) -> PanelError {
    PanelError::UnknownControl {
        owner: key.owner.clone(),
        page: key.page.clone(),
        slot: slot.to_string(),
    }
}

fn slot_priority(slot: Slot) -> u8 {
    match slot {
        Slot::Dial(i) => i,
        Slot::Button(i) => 16 + i,
    }
}

use crate::params::descriptor::{Slot, ValueRange};

/// How a producer expresses a new control value.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum RawValue {
    /// Already in the control's own units.
    Value(f32),
    /// Normalized 0..=1.
    Unit(f32),
    /// 7-bit MIDI data byte.
    Midi(u8),
}

impl RawValue {
    pub fn to_range(self, range: &ValueRange) -> f32 {
        match self {
            RawValue::Value(v) => v,
            RawValue::Unit(u) => range.from_unit(u),
            RawValue::Midi(b) => range.from_unit(f32::from(b.min(127)) / 127.0),
        }
    }
}

/// A unit of work for the event worker. Each is dispatched exactly once, in
/// enqueue order within its batch, and never persisted.
#[derive(Clone, Debug, PartialEq)]
pub enum PendingEvent {
    /// Absolute change on whatever page currently shows `owner`'s controls.
    ControlChanged {
        owner: String,
        slot: Slot,
        raw: RawValue,
    },
    ControlNudged {
        owner: String,
        slot: Slot,
        delta: f32,
    },
    ButtonToggled {
        owner: String,
        slot: Slot,
    },
    PageChangeRequested(String),
    ModeChangeRequested(String),
    NextPage,
    PreviousPage,
    ForceFullRedraw,
    ResetPage {
        owner: String,
    },
    /// Application-defined event, dispatched to the handler registered for
    /// `tag`.
    Custom {
        tag: String,
        payload: serde_json::Value,
    },
}

impl PendingEvent {
    pub fn control(owner: &str, slot: Slot, raw: RawValue) -> Self {
        PendingEvent::ControlChanged {
            owner: owner.to_string(),
            slot,
            raw,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            PendingEvent::ControlChanged { .. } => "control_changed",
            PendingEvent::ControlNudged { .. } => "control_nudged",
            PendingEvent::ButtonToggled { .. } => "button_toggled",
            PendingEvent::PageChangeRequested(_) => "page_change_requested",
            PendingEvent::ModeChangeRequested(_) => "mode_change_requested",
            PendingEvent::NextPage => "next_page",
            PendingEvent::PreviousPage => "previous_page",
            PendingEvent::ForceFullRedraw => "force_full_redraw",
            PendingEvent::ResetPage { .. } => "reset_page",
            PendingEvent::Custom { .. } => "custom",
        }
    }
}

use std::fmt;
use std::str::FromStr;

use serde::de::{self, Deserializer};
use serde::{Deserialize, Serialize, Serializer};

use crate::core::util::{constrain, lerp};
use crate::geometry::Rect;

pub const MAX_DIALS: u8 = 8;
pub const MAX_BUTTONS: u8 = 10;

/// Identifies a page's parameter namespace: the device or module that owns the
/// controls plus the page they appear on.
#[derive(Clone, Debug, Default, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct PageKey {
    pub owner: String,
    pub page: String,
}

impl PageKey {
    pub fn new(owner: impl Into<String>, page: impl Into<String>) -> Self {
        Self {
            owner: owner.into(),
            page: page.into(),
        }
    }
}

impl fmt::Display for PageKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.owner, self.page)
    }
}

/// Fixed control position. Dials are numbered 1-8 and buttons 1-10, so the
/// kind is part of the identity.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub enum Slot {
    Dial(u8),
    Button(u8),
}

impl Slot {
    pub fn index(&self) -> u8 {
        match self {
            Slot::Dial(i) | Slot::Button(i) => *i,
        }
    }

    pub fn is_valid(&self) -> bool {
        match self {
            Slot::Dial(i) => (1..=MAX_DIALS).contains(i),
            Slot::Button(i) => (1..=MAX_BUTTONS).contains(i),
        }
    }

    pub fn dials() -> impl Iterator<Item = Slot> {
        (1..=MAX_DIALS).map(Slot::Dial)
    }

    pub fn buttons() -> impl Iterator<Item = Slot> {
        (1..=MAX_BUTTONS).map(Slot::Button)
    }
}

impl fmt::Display for Slot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Slot::Dial(i) => write!(f, "dial_{}", i),
            Slot::Button(i) => write!(f, "button_{}", i),
        }
    }
}

impl FromStr for Slot {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (kind, index) = s
            .split_once('_')
            .ok_or_else(|| format!("malformed slot '{}'", s))?;
        let index: u8 = index
            .parse()
            .map_err(|_| format!("malformed slot index in '{}'", s))?;
        let slot = match kind {
            "dial" => Slot::Dial(index),
            "button" => Slot::Button(index),
            _ => return Err(format!("unknown slot kind in '{}'", s)),
        };
        if !slot.is_valid() {
            return Err(format!("slot '{}' is out of range", s));
        }
        Ok(slot)
    }
}

// Slots are map keys in the persisted snapshot, so they travel as strings.
impl Serialize for Slot {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Slot {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(de::Error::custom)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum ValueRange {
    Continuous { min: f32, max: f32 },
    /// Discrete states; the stored value is the state index.
    Discrete(Vec<String>),
}

impl ValueRange {
    pub fn toggle() -> Self {
        ValueRange::Discrete(vec!["off".to_string(), "on".to_string()])
    }

    pub fn bounds(&self) -> (f32, f32) {
        match self {
            ValueRange::Continuous { min, max } => (*min, *max),
            ValueRange::Discrete(states) => {
                (0.0, states.len().saturating_sub(1) as f32)
            }
        }
    }

    pub fn clamp(&self, value: f32) -> f32 {
        let (min, max) = self.bounds();
        let value = constrain::clamp(value, min, max);
        match self {
            ValueRange::Continuous { .. } => value,
            ValueRange::Discrete(_) => value.round(),
        }
    }

    /// Maps a normalized 0..=1 input (e.g. a 7-bit CC scaled down) onto the
    /// range.
    pub fn from_unit(&self, unit: f32) -> f32 {
        let (min, max) = self.bounds();
        self.clamp(lerp(min, max, constrain::clamp(unit, 0.0, 1.0)))
    }

    pub fn span(&self) -> f32 {
        let (min, max) = self.bounds();
        (max - min).abs()
    }
}

/// Static metadata for one control slot. Immutable once a page is configured;
/// recreated whenever the page is rebuilt.
#[derive(Clone, Debug, PartialEq)]
pub struct ControlDescriptor {
    pub slot: Slot,
    pub label: String,
    pub range: ValueRange,
    pub default: f32,
    pub rect: Rect,
    /// Filled in by the parameter store when the control is registered.
    pub page: PageKey,
}

impl ControlDescriptor {
    pub fn dial(index: u8, label: &str, min: f32, max: f32) -> Self {
        let slot = Slot::Dial(index);
        Self {
            slot,
            label: label.to_string(),
            range: ValueRange::Continuous { min, max },
            default: ValueRange::Continuous { min, max }.clamp(0.0),
            rect: default_slot_rect(slot),
            page: PageKey::default(),
        }
    }

    pub fn button(index: u8, label: &str) -> Self {
        let slot = Slot::Button(index);
        Self {
            slot,
            label: label.to_string(),
            range: ValueRange::toggle(),
            default: 0.0,
            rect: default_slot_rect(slot),
            page: PageKey::default(),
        }
    }

    /// Generic placeholder used while a page is being rebuilt, before its
    /// configuration has supplied real labels.
    pub fn placeholder(slot: Slot) -> Self {
        match slot {
            Slot::Dial(i) => Self::dial(i, &format!("Dial {}", i), 0.0, 127.0),
            Slot::Button(i) => Self::button(i, &format!("Button {}", i)),
        }
    }

    pub fn with_states(mut self, states: &[&str]) -> Self {
        self.range = ValueRange::Discrete(
            states.iter().map(|s| s.to_string()).collect(),
        );
        self.default = self.range.clamp(self.default);
        self
    }

    pub fn with_default(mut self, default: f32) -> Self {
        self.default = self.range.clamp(default);
        self
    }

    pub fn with_rect(mut self, rect: Rect) -> Self {
        self.rect = rect;
        self
    }

    pub fn clamp(&self, value: f32) -> f32 {
        self.range.clamp(value)
    }

    pub fn display_value(&self, value: f32) -> String {
        match &self.range {
            ValueRange::Continuous { .. } => format!("{:.0}", value),
            ValueRange::Discrete(states) => {
                let index = self.clamp(value) as usize;
                states.get(index).cloned().unwrap_or_default()
            }
        }
    }
}

const SCREEN_W: i32 = 800;
const DIAL_W: u32 = 200;
const DIAL_H: u32 = 160;
const BUTTON_W: u32 = 80;
const BUTTON_H: u32 = 80;
const BUTTON_ROW_Y: i32 = 340;

/// Default layout for an 800x480 panel: dials on a 4x2 grid across the top,
/// buttons in a single row beneath. Pages with custom layouts override the
/// rectangle per control.
pub fn default_slot_rect(slot: Slot) -> Rect {
    match slot {
        Slot::Dial(i) => {
            let i = i.saturating_sub(1) as i32;
            let col = i % 4;
            let row = i / 4;
            Rect::new(col * DIAL_W as i32, row * DIAL_H as i32, DIAL_W, DIAL_H)
        }
        Slot::Button(i) => {
            let i = i.saturating_sub(1) as i32;
            let x = (i * BUTTON_W as i32).min(SCREEN_W - BUTTON_W as i32);
            Rect::new(x, BUTTON_ROW_Y, BUTTON_W, BUTTON_H)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slot_round_trips_through_string_form() {
        for slot in Slot::dials().chain(Slot::buttons()) {
            let parsed: Slot = slot.to_string().parse().expect("parse slot");
            assert_eq!(parsed, slot);
        }
        assert!("dial_9".parse::<Slot>().is_err());
        assert!("button_0".parse::<Slot>().is_err());
        assert!("fader_1".parse::<Slot>().is_err());
    }

    #[test]
    fn discrete_range_clamps_to_state_index() {
        let d = ControlDescriptor::button(1, "Mode")
            .with_states(&["saw", "square", "tri"]);
        assert_eq!(d.clamp(1.4), 1.0);
        assert_eq!(d.clamp(7.0), 2.0);
        assert_eq!(d.clamp(-3.0), 0.0);
        assert_eq!(d.display_value(2.0), "tri");
    }

    #[test]
    fn from_unit_scales_onto_range() {
        let range = ValueRange::Continuous {
            min: -10.0,
            max: 10.0,
        };
        assert_eq!(range.from_unit(0.5), 0.0);
        assert_eq!(range.from_unit(2.0), 10.0);
    }

    #[test]
    fn default_layout_keeps_slots_apart() {
        let rects: Vec<Rect> = Slot::dials()
            .chain(Slot::buttons())
            .map(default_slot_rect)
            .collect();
        for (i, a) in rects.iter().enumerate() {
            for b in rects.iter().skip(i + 1) {
                assert!(!a.intersects(b), "{:?} overlaps {:?}", a, b);
            }
        }
    }
}

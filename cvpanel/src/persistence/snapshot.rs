use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::params::descriptor::{PageKey, Slot};

pub const SNAPSHOT_VERSION: &str = "1";

type PageValues = BTreeMap<Slot, f32>;

/// On-disk form of every live parameter value:
/// `{ "values": { owner: { page: { "dial_1": 64.0 } } } }`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PersistedSnapshot {
    pub version: String,
    #[serde(default)]
    pub saved_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub values: BTreeMap<String, BTreeMap<String, PageValues>>,
}

impl Default for PersistedSnapshot {
    fn default() -> Self {
        Self::new()
    }
}

impl PersistedSnapshot {
    pub fn new() -> Self {
        Self {
            version: SNAPSHOT_VERSION.to_string(),
            saved_at: None,
            values: BTreeMap::new(),
        }
    }

    pub fn insert(&mut self, key: &PageKey, slot: Slot, value: f32) {
        self.values
            .entry(key.owner.clone())
            .or_default()
            .entry(key.page.clone())
            .or_default()
            .insert(slot, value);
    }

    pub fn get(&self, key: &PageKey, slot: Slot) -> Option<f32> {
        self.values
            .get(&key.owner)?
            .get(&key.page)?
            .get(&slot)
            .copied()
    }

    pub fn entries(&self) -> impl Iterator<Item = (PageKey, Slot, f32)> + '_ {
        self.values.iter().flat_map(|(owner, pages)| {
            pages.iter().flat_map(move |(page, slots)| {
                slots.iter().map(move |(slot, value)| {
                    (PageKey::new(owner.as_str(), page.as_str()), *slot, *value)
                })
            })
        })
    }

    pub fn len(&self) -> usize {
        self.values
            .values()
            .flat_map(|pages| pages.values())
            .map(|slots| slots.len())
            .sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Same values, ignoring when they were written.
    pub fn same_values(&self, other: &PersistedSnapshot) -> bool {
        self.values == other.values
    }

    pub fn stamped(mut self) -> Self {
        self.saved_at = Some(Utc::now());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nests_values_by_owner_then_page() {
        let mut snapshot = PersistedSnapshot::new();
        snapshot.insert(&PageKey::new("synth", "P1"), Slot::Dial(5), 64.0);
        snapshot.insert(&PageKey::new("synth", "P2"), Slot::Button(1), 1.0);

        let json = serde_json::to_value(&snapshot).expect("serialize");
        assert_eq!(json["values"]["synth"]["P1"]["dial_5"], 64.0);
        assert_eq!(json["values"]["synth"]["P2"]["button_1"], 1.0);
        assert_eq!(snapshot.len(), 2);
    }

    #[test]
    fn entries_flatten_in_key_order() {
        let mut snapshot = PersistedSnapshot::new();
        snapshot.insert(&PageKey::new("b", "x"), Slot::Dial(1), 1.0);
        snapshot.insert(&PageKey::new("a", "y"), Slot::Dial(2), 2.0);

        let entries: Vec<_> = snapshot.entries().collect();
        assert_eq!(
            entries,
            vec![
                (PageKey::new("a", "y"), Slot::Dial(2), 2.0),
                (PageKey::new("b", "x"), Slot::Dial(1), 1.0),
            ]
        );
    }

    #[test]
    fn unknown_slot_names_fail_to_parse() {
        let json = r#"{"version":"1","values":{"s":{"p":{"dial_99":1.0}}}}"#;
        assert!(serde_json::from_str::<PersistedSnapshot>(json).is_err());
    }
}

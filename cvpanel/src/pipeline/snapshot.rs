use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;

use parking_lot::RwLock;

use crate::params::descriptor::PageKey;

/// Read-only view of the UI assembled by the render thread once per tick and
/// handed to the event worker. The worker never reads render-thread state
/// any other way.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct UiSnapshot {
    pub frame: u64,
    pub active_page: Option<PageKey>,
    pub active_mode: Option<String>,
    pub transitioning: Option<PageKey>,
    /// Page most recently shown for each owner.
    pub owner_pages: BTreeMap<String, String>,
    /// Fallback for owners none of whose pages has been shown yet.
    pub home_pages: Arc<BTreeMap<String, String>>,
    pub taken_at: Option<Instant>,
}

impl UiSnapshot {
    /// The page whose controls an owner's hardware currently drives: the
    /// active page when it belongs to the owner, else the owner's last shown
    /// page, else its home page.
    pub fn page_for_owner(&self, owner: &str) -> Option<PageKey> {
        if let Some(active) = &self.active_page {
            if active.owner == owner {
                return Some(active.clone());
            }
        }
        self.owner_pages
            .get(owner)
            .or_else(|| self.home_pages.get(owner))
            .map(|page| PageKey::new(owner, page.as_str()))
    }
}

#[derive(Clone, Debug, Default)]
pub struct SnapshotCell {
    inner: Arc<RwLock<Arc<UiSnapshot>>>,
}

impl SnapshotCell {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn publish(&self, snapshot: UiSnapshot) {
        *self.inner.write() = Arc::new(snapshot);
    }

    pub fn load(&self) -> Arc<UiSnapshot> {
        self.inner.read().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn owner_routes_to_active_page_first() {
        let mut snapshot = UiSnapshot {
            active_page: Some(PageKey::new("synth", "P2")),
            ..UiSnapshot::default()
        };
        snapshot.owner_pages.insert("synth".into(), "P1".into());
        snapshot.owner_pages.insert("drums".into(), "Kit".into());

        assert_eq!(
            snapshot.page_for_owner("synth"),
            Some(PageKey::new("synth", "P2"))
        );
        assert_eq!(
            snapshot.page_for_owner("drums"),
            Some(PageKey::new("drums", "Kit"))
        );
        assert_eq!(snapshot.page_for_owner("fx"), None);
    }

    #[test]
    fn unvisited_owner_falls_back_to_its_home_page() {
        let homes: BTreeMap<String, String> =
            [("fx", "Reverb"), ("synth", "P1")]
                .into_iter()
                .map(|(o, p)| (o.to_string(), p.to_string()))
                .collect();
        let mut snapshot = UiSnapshot {
            active_page: Some(PageKey::new("drums", "Kit")),
            home_pages: Arc::new(homes),
            ..UiSnapshot::default()
        };
        snapshot.owner_pages.insert("synth".into(), "P3".into());

        assert_eq!(
            snapshot.page_for_owner("fx"),
            Some(PageKey::new("fx", "Reverb"))
        );
        assert_eq!(
            snapshot.page_for_owner("synth"),
            Some(PageKey::new("synth", "P3"))
        );
        assert_eq!(snapshot.page_for_owner("lights"), None);
    }

    #[test]
    fn readers_keep_their_snapshot_across_publishes() {
        let cell = SnapshotCell::new();
        cell.publish(UiSnapshot {
            frame: 1,
            ..UiSnapshot::default()
        });
        let held = cell.load();
        cell.publish(UiSnapshot {
            frame: 2,
            ..UiSnapshot::default()
        });
        assert_eq!(held.frame, 1);
        assert_eq!(cell.load().frame, 2);
    }
}

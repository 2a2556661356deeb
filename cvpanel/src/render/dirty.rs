//! Accumulates the screen regions that need redrawing.
//!
//! The tracker is a cheap clonable handle; the parameter store, the mode
//! controller and the frame scheduler all hold one. It also owns the per-page
//! transition scope, since a mark against a page that is mid-transition must
//! not refresh burst mode.

use std::sync::Arc;
use std::time::Instant;

use parking_lot::Mutex;

use crate::core::util::HashSet;
use crate::geometry::Rect;
use crate::params::descriptor::PageKey;

/// Past this many pending regions a partial redraw stops paying off and the
/// tracker collapses everything into full invalidations.
pub const MAX_REGIONS: usize = 48;

#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub enum Layer {
    Background,
    Controls,
    Widgets,
    Overlay,
}

#[derive(Clone, Debug, PartialEq)]
pub struct DirtyRegion {
    pub rect: Rect,
    pub layer: Layer,
    /// Lower values redraw first within a layer.
    pub priority: u8,
    /// `None` for regions that belong to no page, e.g. the status strip.
    pub page: Option<PageKey>,
}

impl DirtyRegion {
    pub fn new(
        rect: Rect,
        layer: Layer,
        priority: u8,
        page: Option<PageKey>,
    ) -> Self {
        Self {
            rect,
            layer,
            priority,
            page,
        }
    }

    pub fn overlay(rect: Rect) -> Self {
        Self::new(rect, Layer::Overlay, 0, None)
    }

    fn full(screen: Rect, page: Option<PageKey>) -> Self {
        Self::new(screen, Layer::Background, 0, page)
    }
}

/// Regions taken out of the tracker for one render pass, ordered by layer then
/// priority.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct DirtySet {
    pub full: bool,
    pub regions: Vec<DirtyRegion>,
}

impl DirtySet {
    pub fn is_empty(&self) -> bool {
        !self.full && self.regions.is_empty()
    }

    pub fn for_page<'a>(
        &'a self,
        key: &'a PageKey,
    ) -> impl Iterator<Item = &'a DirtyRegion> + 'a {
        self.regions
            .iter()
            .filter(move |r| r.page.as_ref() == Some(key))
    }

    pub fn unowned(&self) -> impl Iterator<Item = &DirtyRegion> {
        self.regions.iter().filter(|r| r.page.is_none())
    }

    /// Regions that may reach the screen while `key` is shown: its own and
    /// the unowned ones.
    pub fn visible<'a>(
        &'a self,
        key: &'a PageKey,
    ) -> impl Iterator<Item = &'a DirtyRegion> + 'a {
        self.regions
            .iter()
            .filter(move |r| r.page.as_ref().is_none_or(|p| p == key))
    }
}

#[derive(Debug)]
struct TrackerState {
    screen: Rect,
    regions: Vec<DirtyRegion>,
    transitioning: HashSet<PageKey>,
    /// Page on screen. While set, marks for any other page are dropped.
    shown: Option<PageKey>,
    last_activity: Option<Instant>,
    marks: u64,
}

impl TrackerState {
    fn insert(&mut self, mut region: DirtyRegion, now: Instant) -> bool {
        if let (Some(page), Some(shown)) = (&region.page, &self.shown) {
            if page != shown {
                return false;
            }
        }
        let Some(rect) = self.screen.intersection(&region.rect) else {
            return false;
        };
        region.rect = rect;

        let refreshes = match &region.page {
            Some(page) => !self.transitioning.contains(page),
            None => true,
        };

        let merged = self.regions.iter_mut().find(|existing| {
            existing.layer == region.layer
                && existing.page == region.page
                && existing.rect.intersects(&region.rect)
        });

        match merged {
            Some(existing) => {
                existing.rect = existing.rect.union(&region.rect);
                existing.priority = existing.priority.min(region.priority);
            }
            None => self.regions.push(region),
        }

        if self.regions.len() > MAX_REGIONS {
            self.collapse();
        }

        self.marks += 1;
        if refreshes {
            self.last_activity = Some(now);
        }

        true
    }

    fn collapse(&mut self) {
        let mut pages: Vec<Option<PageKey>> = Vec::new();
        for region in &self.regions {
            if !pages.contains(&region.page) {
                pages.push(region.page.clone());
            }
        }
        let screen = self.screen;
        self.regions = pages
            .into_iter()
            .map(|page| DirtyRegion::full(screen, page))
            .collect();
    }
}

#[derive(Clone, Debug)]
pub struct DirtyTracker {
    state: Arc<Mutex<TrackerState>>,
}

impl DirtyTracker {
    pub fn new(screen: Rect) -> Self {
        Self {
            state: Arc::new(Mutex::new(TrackerState {
                screen,
                regions: Vec::new(),
                transitioning: HashSet::default(),
                shown: None,
                last_activity: None,
                marks: 0,
            })),
        }
    }

    pub fn screen(&self) -> Rect {
        self.state.lock().screen
    }

    /// Records a region. Returns false when the region falls entirely
    /// off-screen or belongs to a page that is not shown.
    pub fn mark(&self, region: DirtyRegion) -> bool {
        self.mark_at(region, Instant::now())
    }

    pub fn mark_at(&self, region: DirtyRegion, now: Instant) -> bool {
        self.state.lock().insert(region, now)
    }

    /// Invalidates the whole screen for `page` (or for page-less content).
    pub fn invalidate_all(&self, page: Option<PageKey>) {
        self.invalidate_all_at(page, Instant::now());
    }

    pub fn invalidate_all_at(&self, page: Option<PageKey>, now: Instant) {
        let mut state = self.state.lock();
        let screen = state.screen;
        state.regions.retain(|r| r.page != page);
        state.insert(DirtyRegion::full(screen, page), now);
    }

    pub fn is_dirty(&self) -> bool {
        !self.state.lock().regions.is_empty()
    }

    pub fn len(&self) -> usize {
        self.state.lock().regions.len()
    }

    pub fn is_empty(&self) -> bool {
        !self.is_dirty()
    }

    /// Takes pending regions for rendering. Regions owned by `blocked` stay
    /// queued so they render once its transition completes.
    pub fn take(&self, blocked: Option<&PageKey>) -> DirtySet {
        let mut state = self.state.lock();
        let screen = state.screen;

        let pending = std::mem::take(&mut state.regions);
        let (mut taken, kept): (Vec<_>, Vec<_>) = pending
            .into_iter()
            .partition(|r| blocked.is_none() || r.page.as_ref() != blocked);
        state.regions = kept;

        taken.sort_by(|a, b| {
            a.layer.cmp(&b.layer).then(a.priority.cmp(&b.priority))
        });

        DirtySet {
            full: taken.iter().any(|r| r.rect == screen),
            regions: taken,
        }
    }

    pub fn clear(&self) {
        self.state.lock().regions.clear();
    }

    /// Drops pending regions of a page that is no longer shown.
    pub fn discard_page(&self, page: &PageKey) -> usize {
        let mut state = self.state.lock();
        let before = state.regions.len();
        state.regions.retain(|r| r.page.as_ref() != Some(page));
        before - state.regions.len()
    }

    /// Sets the page on screen and drops pending regions of every other
    /// page. `None` accepts marks for any page.
    pub fn show_page(&self, page: Option<PageKey>) -> usize {
        let mut state = self.state.lock();
        let before = state.regions.len();
        if let Some(shown) = &page {
            state
                .regions
                .retain(|r| r.page.as_ref().is_none_or(|p| p == shown));
        }
        state.shown = page;
        before - state.regions.len()
    }

    pub fn shown_page(&self) -> Option<PageKey> {
        self.state.lock().shown.clone()
    }

    pub fn begin_transition(&self, page: &PageKey) -> bool {
        self.state.lock().transitioning.insert(page.clone())
    }

    pub fn end_transition(&self, page: &PageKey) -> bool {
        self.state.lock().transitioning.remove(page)
    }

    pub fn is_transitioning(&self, page: &PageKey) -> bool {
        self.state.lock().transitioning.contains(page)
    }

    pub fn last_activity(&self) -> Option<Instant> {
        self.state.lock().last_activity
    }

    /// Total regions accepted since creation.
    pub fn mark_count(&self) -> u64 {
        self.state.lock().marks
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    fn tracker() -> DirtyTracker {
        DirtyTracker::new(Rect::from_size(800, 480))
    }

    fn page(name: &str) -> PageKey {
        PageKey::new("synth", name)
    }

    #[test]
    fn overlapping_regions_in_one_layer_merge() {
        let t = tracker();
        let key = page("A");
        t.mark(DirtyRegion::new(
            Rect::new(0, 0, 100, 100),
            Layer::Controls,
            3,
            Some(key.clone()),
        ));
        t.mark(DirtyRegion::new(
            Rect::new(50, 50, 100, 100),
            Layer::Controls,
            1,
            Some(key.clone()),
        ));
        t.mark(DirtyRegion::new(
            Rect::new(50, 50, 10, 10),
            Layer::Widgets,
            0,
            Some(key),
        ));

        let set = t.take(None);
        assert_eq!(set.regions.len(), 2);
        assert_eq!(set.regions[0].rect, Rect::new(0, 0, 150, 150));
        assert_eq!(set.regions[0].priority, 1);
        assert_eq!(set.regions[1].layer, Layer::Widgets);
        assert!(!set.full);
        assert!(t.is_empty());
    }

    #[test]
    fn take_orders_by_layer_then_priority() {
        let t = tracker();
        t.mark(DirtyRegion::overlay(Rect::new(0, 440, 800, 40)));
        t.mark(DirtyRegion::new(
            Rect::new(200, 0, 10, 10),
            Layer::Controls,
            5,
            None,
        ));
        t.mark(DirtyRegion::new(
            Rect::new(0, 0, 10, 10),
            Layer::Controls,
            2,
            None,
        ));

        let set = t.take(None);
        let order: Vec<(Layer, u8)> =
            set.regions.iter().map(|r| (r.layer, r.priority)).collect();
        assert_eq!(
            order,
            vec![
                (Layer::Controls, 2),
                (Layer::Controls, 5),
                (Layer::Overlay, 0)
            ]
        );
    }

    #[test]
    fn offscreen_regions_are_dropped_and_edges_clipped() {
        let t = tracker();
        assert!(!t.mark(DirtyRegion::overlay(Rect::new(900, 0, 10, 10))));
        assert!(t.mark(DirtyRegion::overlay(Rect::new(790, 470, 50, 50))));
        let set = t.take(None);
        assert_eq!(set.regions[0].rect, Rect::new(790, 470, 10, 10));
    }

    #[test]
    fn invalidate_all_reports_full() {
        let t = tracker();
        let key = page("A");
        t.mark(DirtyRegion::new(
            Rect::new(0, 0, 10, 10),
            Layer::Controls,
            0,
            Some(key.clone()),
        ));
        t.invalidate_all(Some(key));
        let set = t.take(None);
        assert!(set.full);
        assert_eq!(set.regions.len(), 1);
    }

    #[test]
    fn too_many_regions_collapse_to_full() {
        let t = tracker();
        for i in 0..(MAX_REGIONS as i32 + 1) {
            t.mark(DirtyRegion::new(
                Rect::new((i % 40) * 20, (i / 40) * 20, 5, 5),
                Layer::Controls,
                0,
                None,
            ));
        }
        let set = t.take(None);
        assert!(set.full);
        assert_eq!(set.regions.len(), 1);
    }

    #[test]
    fn blocked_page_regions_stay_queued() {
        let t = tracker();
        let a = page("A");
        t.invalidate_all(Some(a.clone()));
        t.mark(DirtyRegion::overlay(Rect::new(0, 440, 800, 40)));

        let set = t.take(Some(&a));
        assert_eq!(set.regions.len(), 1);
        assert!(set.regions[0].page.is_none());
        assert_eq!(t.len(), 1);

        let set = t.take(None);
        assert!(set.full);
    }

    #[test]
    fn marks_for_hidden_pages_are_dropped() {
        let t = tracker();
        let (a, b) = (page("A"), page("B"));
        let rect = Rect::new(0, 0, 10, 10);
        let region = |p: &PageKey| {
            DirtyRegion::new(rect, Layer::Controls, 0, Some(p.clone()))
        };
        let start = Instant::now();
        t.mark_at(region(&b), start);
        t.mark_at(DirtyRegion::overlay(Rect::new(0, 440, 800, 40)), start);

        assert_eq!(t.show_page(Some(a.clone())), 1);
        assert_eq!(t.shown_page(), Some(a.clone()));

        let later = start + Duration::from_millis(5);
        assert!(!t.mark_at(region(&b), later));
        assert_eq!(t.last_activity(), Some(start));
        assert!(t.mark_at(region(&a), later));
        assert_eq!(t.last_activity(), Some(later));

        let set = t.take(None);
        assert_eq!(set.regions.len(), 2);
        assert!(set.regions.iter().all(|r| r.page.as_ref() != Some(&b)));
    }

    #[test]
    fn marks_on_transitioning_page_do_not_refresh_activity() {
        let t = tracker();
        let a = page("A");
        let start = Instant::now();
        t.begin_transition(&a);

        t.mark_at(
            DirtyRegion::new(
                Rect::new(0, 0, 10, 10),
                Layer::Controls,
                0,
                Some(a.clone()),
            ),
            start,
        );
        assert_eq!(t.last_activity(), None);
        assert!(t.is_dirty());

        t.end_transition(&a);
        let later = start + Duration::from_millis(5);
        t.mark_at(
            DirtyRegion::new(
                Rect::new(0, 0, 10, 10),
                Layer::Controls,
                0,
                Some(a),
            ),
            later,
        );
        assert_eq!(t.last_activity(), Some(later));
    }
}

//! Decides, once per tick, whether to render nothing, a partial frame, or a
//! full frame, and at which rate.
//!
//! Activity comes from the [`DirtyTracker`]: any accepted mark outside a
//! transition scope enters (or refreshes) `Burst`, which targets the highest
//! configured rate. Once the grace period passes without new marks the
//! scheduler falls back to `Idle` and the page's own rate tier.

use std::time::{Duration, Instant};

use log::debug;
use serde::{Deserialize, Serialize};

use super::dirty::{DirtyRegion, DirtySet, DirtyTracker, Layer};
use super::frame_clock::FrameClock;
use crate::config::PanelSettings;
use crate::geometry::Rect;
use crate::params::descriptor::PageKey;
use crate::{debug_throttled, warn_throttled};

#[derive(
    Clone, Copy, Debug, Default, Eq, Hash, PartialEq, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum RateTier {
    Low,
    #[default]
    Normal,
    High,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum SchedulerState {
    Idle,
    Burst,
    /// The active page is blocked from rendering.
    Transitioning,
}

/// What a page declares about how it wants to be scheduled.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct PageCapabilities {
    pub tier: RateTier,
    pub partial_redraw: bool,
    /// Animating content that must be polled every tick.
    pub continuous: bool,
}

impl Default for PageCapabilities {
    fn default() -> Self {
        Self {
            tier: RateTier::Normal,
            partial_redraw: true,
            continuous: false,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RateConfig {
    pub low: f32,
    pub normal: f32,
    pub high: f32,
    /// Applied on top of the fastest tier while bursting. Defaults to 1.0.
    pub burst_multiplier: f32,
}

impl RateConfig {
    pub fn fps(&self, tier: RateTier) -> f32 {
        match tier {
            RateTier::Low => self.low,
            RateTier::Normal => self.normal,
            RateTier::High => self.high,
        }
    }

    pub fn burst_fps(&self) -> f32 {
        let fastest = self.low.max(self.normal).max(self.high);
        fastest * self.burst_multiplier.max(1.0)
    }

    /// One frame at the slowest configured rate; the budget a page transition
    /// has before it becomes a visible stutter.
    pub fn slowest_frame(&self) -> Duration {
        let slowest = self.low.min(self.normal).min(self.high).max(1.0);
        Duration::from_secs_f32(1.0 / slowest)
    }
}

impl Default for RateConfig {
    fn default() -> Self {
        Self {
            low: 10.0,
            normal: 30.0,
            high: 60.0,
            burst_multiplier: 1.0,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum FrameDecision {
    /// Not time to render yet.
    Skip,
    /// The active page is mid-transition. Only page-less regions (overlays)
    /// may render.
    Blocked { overlay: Vec<DirtyRegion> },
    Partial(DirtySet),
    Full(DirtySet),
    /// Nothing dirty: refresh the always-live strip only.
    Idle,
}

impl FrameDecision {
    pub fn kind(&self) -> FrameKind {
        match self {
            FrameDecision::Skip => FrameKind::Skipped,
            FrameDecision::Blocked { .. } => FrameKind::Blocked,
            FrameDecision::Partial(_) => FrameKind::Partial,
            FrameDecision::Full(_) => FrameKind::Full,
            FrameDecision::Idle => FrameKind::Idle,
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum FrameKind {
    Skipped,
    Blocked,
    Partial,
    Full,
    Idle,
}

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct FrameStats {
    pub skipped: u64,
    pub blocked: u64,
    pub partial: u64,
    pub full: u64,
    pub idle: u64,
    pub fallbacks: u64,
}

impl FrameStats {
    fn record(&mut self, kind: FrameKind) {
        match kind {
            FrameKind::Skipped => self.skipped += 1,
            FrameKind::Blocked => self.blocked += 1,
            FrameKind::Partial => self.partial += 1,
            FrameKind::Full => self.full += 1,
            FrameKind::Idle => self.idle += 1,
        }
    }

    pub fn rendered(&self) -> u64 {
        self.blocked + self.partial + self.full + self.idle
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum Activity {
    Idle,
    Burst,
}

pub struct FrameScheduler {
    tracker: DirtyTracker,
    clock: FrameClock,
    rates: RateConfig,
    grace: Duration,
    stalled_tick_limit: u32,
    activity: Activity,
    last_seen_activity: Option<Instant>,
    stalled_ticks: u32,
    degraded: Option<PageKey>,
    stats: FrameStats,
}

impl FrameScheduler {
    pub fn new(
        tracker: DirtyTracker,
        rates: RateConfig,
        grace: Duration,
        stalled_tick_limit: u32,
    ) -> Self {
        let now = Instant::now();
        Self::with_start(tracker, rates, grace, stalled_tick_limit, now)
    }

    pub fn with_start(
        tracker: DirtyTracker,
        rates: RateConfig,
        grace: Duration,
        stalled_tick_limit: u32,
        now: Instant,
    ) -> Self {
        Self {
            tracker,
            clock: FrameClock::with_start(rates.normal, now),
            rates,
            grace,
            stalled_tick_limit: stalled_tick_limit.max(1),
            activity: Activity::Idle,
            last_seen_activity: None,
            stalled_ticks: 0,
            degraded: None,
            stats: FrameStats::default(),
        }
    }

    pub fn from_settings(
        tracker: DirtyTracker,
        settings: &PanelSettings,
    ) -> Self {
        Self::new(
            tracker,
            settings.rates(),
            Duration::from_millis(settings.burst_grace_ms),
            settings.stalled_tick_limit,
        )
    }

    pub fn state(&self, page: Option<&PageKey>) -> SchedulerState {
        if page.is_some_and(|p| self.tracker.is_transitioning(p)) {
            return SchedulerState::Transitioning;
        }
        match self.activity {
            Activity::Idle => SchedulerState::Idle,
            Activity::Burst => SchedulerState::Burst,
        }
    }

    pub fn rates(&self) -> RateConfig {
        self.rates
    }

    pub fn target_fps(&self, caps: &PageCapabilities) -> f32 {
        match self.activity {
            Activity::Burst => self.rates.burst_fps(),
            Activity::Idle => self.rates.fps(caps.tier),
        }
    }

    pub fn stats(&self) -> FrameStats {
        self.stats
    }

    pub fn average_fps(&self) -> f32 {
        self.clock.average_fps()
    }

    pub fn next_deadline(&self) -> Instant {
        self.clock.next_deadline()
    }

    /// Renders on the next tick regardless of the target rate.
    pub fn request_frame(&mut self) {
        self.clock.force_render();
    }

    /// Forgets per-page diagnostics; called whenever the active page changes.
    pub fn page_changed(&mut self) {
        self.stalled_ticks = 0;
        self.degraded = None;
    }

    /// Runs one scheduler tick.
    ///
    /// `poll` is the active page's dirty predicate. It is invoked every tick
    /// for continuous pages, not only in response to input, so animating
    /// content keeps burst mode alive on its own.
    pub fn tick(
        &mut self,
        now: Instant,
        page: Option<&PageKey>,
        caps: PageCapabilities,
        poll: impl FnOnce(Instant) -> Vec<Rect>,
    ) -> FrameDecision {
        let transitioning =
            page.is_some_and(|p| self.tracker.is_transitioning(p));

        let mut force_full = false;
        if let (Some(key), true, false) = (page, caps.continuous, transitioning)
        {
            force_full = self.poll_continuous(now, key, poll);
        }

        self.update_activity(now);
        self.clock.set_fps(self.target_fps(&caps));

        let pace = self.clock.tick(now);
        if !pace.due {
            self.stats.record(FrameKind::Skipped);
            return FrameDecision::Skip;
        }
        if pace.slots > 1 {
            debug_throttled!(
                Duration::from_secs(1),
                "dropped {} frames",
                pace.slots - 1
            );
        }

        let decision = if transitioning {
            let set = self.tracker.take(page);
            FrameDecision::Blocked {
                overlay: set.regions,
            }
        } else {
            let set = self.tracker.take(None);
            let needs_full = set.full || !caps.partial_redraw;
            if force_full || (!set.is_empty() && needs_full) {
                FrameDecision::Full(set)
            } else if !set.is_empty() {
                FrameDecision::Partial(set)
            } else {
                FrameDecision::Idle
            }
        };

        self.stats.record(decision.kind());
        decision
    }

    fn poll_continuous(
        &mut self,
        now: Instant,
        key: &PageKey,
        poll: impl FnOnce(Instant) -> Vec<Rect>,
    ) -> bool {
        let rects = poll(now);

        if self.degraded.as_ref() == Some(key) {
            // Fallback mode: keep the page animating with full frames.
            self.tracker.invalidate_all_at(Some(key.clone()), now);
            return true;
        }

        if !rects.is_empty() {
            self.stalled_ticks = 0;
            for rect in rects {
                self.tracker.mark_at(
                    DirtyRegion::new(
                        rect,
                        Layer::Widgets,
                        0,
                        Some(key.clone()),
                    ),
                    now,
                );
            }
            return false;
        }

        self.stalled_ticks += 1;
        if self.stalled_ticks <= self.stalled_tick_limit {
            return false;
        }

        warn_throttled!(
            Duration::from_secs(5),
            "page {} is continuous but reported no dirty regions for {} ticks; \
            falling back to full-frame rendering",
            key,
            self.stalled_ticks
        );
        self.stats.fallbacks += 1;
        self.stalled_ticks = 0;
        self.degraded = Some(key.clone());
        self.tracker.invalidate_all_at(Some(key.clone()), now);
        true
    }

    fn update_activity(&mut self, now: Instant) {
        let last = self.tracker.last_activity();

        if last.is_some() && last != self.last_seen_activity {
            self.last_seen_activity = last;
            if self.activity != Activity::Burst {
                debug!("scheduler: idle -> burst");
                self.activity = Activity::Burst;
            }
        }

        if self.activity == Activity::Burst {
            let quiet = last
                .map(|at| now.saturating_duration_since(at))
                .unwrap_or(Duration::MAX);
            if quiet > self.grace {
                debug!("scheduler: burst -> idle after {:?}", quiet);
                self.activity = Activity::Idle;
            }
        }
    }
}

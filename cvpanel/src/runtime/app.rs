//! The render/input thread.
//!
//! One cooperative loop polls input, applies runtime commands, publishes the
//! worker's UI snapshot, asks the frame scheduler what to draw and draws it.
//! The event worker and the autosave worker run beside it on their own task
//! handles; neither ever touches the mode controller.

use std::panic::{self, AssertUnwindSafe};
use std::time::{Duration, Instant};

use log::{debug, error, info, warn};

use super::events::{
    RuntimeCommand, RuntimeCommandReceiver, RuntimeCommandSender,
    RuntimeEvent, RuntimeEventSender, command_channel,
};
use crate::config::PanelSettings;
use crate::core::error::{PanelError, Result};
use crate::core::util::panic_message;
use crate::geometry::Rect;
use crate::hardware::ingress::HardwareIngress;
use crate::pages::controller::{ModeController, TransitionReport};
use crate::pages::page::{
    InputContext, InputEvent, RenderContext, default_input,
};
use crate::pages::registry::PageRegistry;
use crate::params::store::{ParameterStore, SharedStore};
use crate::persistence::autosave::{AutosaveWorker, save_if_dirty};
use crate::persistence::storage::SnapshotStorage;
use crate::pipeline::queue::EventQueue;
use crate::pipeline::snapshot::{SnapshotCell, UiSnapshot};
use crate::pipeline::worker::{
    CoreDispatcher, EventHandler, EventWorker, WorkerStats,
};
use crate::render::dirty::{DirtyRegion, DirtySet, DirtyTracker};
use crate::render::scheduler::{
    FrameDecision, FrameKind, FrameScheduler, FrameStats,
};
use crate::render::surface::Surface;
use crate::task::StopSignal;
use crate::theme::{ThemeCache, ThemeLookup};
use crate::warn_throttled;

pub const STATUS_STRIP_HEIGHT: u32 = 40;

/// Theme owner used for chrome that belongs to no page.
const CHROME_OWNER: &str = "panel";

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct RuntimeStats {
    pub frames: FrameStats,
    pub average_fps: f32,
    pub transitions: u64,
    pub worker: WorkerStats,
    pub queue_high_water: usize,
    pub backlog_episodes: u64,
}

pub struct PanelRuntime {
    settings: PanelSettings,
    controller: ModeController,
    scheduler: FrameScheduler,
    tracker: DirtyTracker,
    store: SharedStore,
    storage: SnapshotStorage,
    queue: EventQueue,
    snapshot: SnapshotCell,
    theme: ThemeCache,
    command_tx: RuntimeCommandSender,
    command_rx: RuntimeCommandReceiver,
    event_tx: Option<RuntimeEventSender>,
    worker: Option<EventWorker>,
    worker_stats: WorkerStats,
    autosave: Option<AutosaveWorker>,
    frame: u64,
    quit_requested: bool,
    stopped: bool,
}

impl PanelRuntime {
    /// Builds every component and seeds the parameter store from the
    /// persisted snapshot, before any page is visited. No page is active
    /// and no worker runs until [`start`](Self::start).
    pub fn new(
        registry: PageRegistry,
        settings: PanelSettings,
        theme: impl ThemeLookup + 'static,
    ) -> Result<Self> {
        settings.validate()?;
        if registry.is_empty() {
            return Err(PanelError::Configuration(
                "no pages registered".to_string(),
            ));
        }

        let tracker = DirtyTracker::new(settings.screen());
        let mut store = ParameterStore::new(tracker.clone());

        let storage = SnapshotStorage::in_dir(&settings.storage_path());
        match storage.load_if_exists() {
            Ok(Some(snapshot)) => {
                let loaded = store.load_snapshot(&snapshot);
                info!(
                    "restored {} values from {}",
                    loaded,
                    storage.path().display()
                );
            }
            Ok(None) => debug!("no snapshot at {}", storage.path().display()),
            Err(e) => error!("ignoring unreadable snapshot: {}", e),
        }

        let store = store.shared();
        let scheduler =
            FrameScheduler::from_settings(tracker.clone(), &settings);
        let controller = ModeController::new(
            registry,
            store.clone(),
            tracker.clone(),
            settings.rates().slowest_frame(),
        );
        let (command_tx, command_rx) = command_channel();

        Ok(Self {
            queue: EventQueue::new(settings.queue_backlog_threshold),
            settings,
            controller,
            scheduler,
            tracker,
            store,
            storage,
            snapshot: SnapshotCell::new(),
            theme: ThemeCache::new(theme),
            command_tx,
            command_rx,
            event_tx: None,
            worker: None,
            worker_stats: WorkerStats::default(),
            autosave: None,
            frame: 0,
            quit_requested: false,
            stopped: false,
        })
    }

    pub fn with_events(mut self, event_tx: RuntimeEventSender) -> Self {
        self.event_tx = Some(event_tx);
        self
    }

    /// Activates `initial`, or the first page of the first enabled mode, or
    /// the first registered page.
    pub fn start(&mut self, initial: Option<&str>) -> Result<()> {
        let first_mode = self
            .controller
            .registry()
            .modes()
            .iter()
            .find(|m| m.enabled)
            .map(|m| m.name.clone());

        let report = match (initial, first_mode) {
            (Some(name), _) => self.controller.switch_to(name),
            (None, Some(mode)) => self.controller.switch_mode(&mode),
            (None, None) => {
                let first = self
                    .controller
                    .registry()
                    .first_page_name()
                    .map(str::to_string)
                    .ok_or_else(|| {
                        PanelError::Configuration(
                            "no pages registered".to_string(),
                        )
                    })?;
                self.controller.switch_to(&first)
            }
        }?;

        self.page_activated(report);
        self.publish_snapshot(Instant::now());
        Ok(())
    }

    /// A dispatcher wired to this runtime's store and command channel.
    /// Register custom handlers on it, then pass it to
    /// [`start_workers_with`](Self::start_workers_with).
    pub fn dispatcher(&self) -> CoreDispatcher {
        CoreDispatcher::new(self.store.clone(), self.command_tx.clone())
    }

    pub fn start_workers(&mut self) -> Result<()> {
        let dispatcher = self.dispatcher();
        self.start_workers_with(dispatcher)
    }

    pub fn start_workers_with(
        &mut self,
        handler: impl EventHandler + 'static,
    ) -> Result<()> {
        if self.worker.is_some() {
            return Err(PanelError::Worker(
                "workers already running".to_string(),
            ));
        }

        self.worker = Some(EventWorker::spawn(
            self.queue.clone(),
            self.snapshot.clone(),
            handler,
            self.settings.worker_hz,
        )?);
        self.autosave = Some(AutosaveWorker::spawn(
            self.store.clone(),
            self.storage.clone(),
            Duration::from_millis(self.settings.autosave_interval_ms),
        )?);
        Ok(())
    }

    pub fn ingress(&self) -> HardwareIngress {
        HardwareIngress::new(self.queue.clone())
    }

    pub fn queue(&self) -> &EventQueue {
        &self.queue
    }

    pub fn command_sender(&self) -> RuntimeCommandSender {
        self.command_tx.clone()
    }

    pub fn store(&self) -> &SharedStore {
        &self.store
    }

    pub fn tracker(&self) -> &DirtyTracker {
        &self.tracker
    }

    pub fn controller(&self) -> &ModeController {
        &self.controller
    }

    pub fn scheduler(&self) -> &FrameScheduler {
        &self.scheduler
    }

    pub fn settings(&self) -> &PanelSettings {
        &self.settings
    }

    pub fn ui_snapshot(&self) -> SnapshotCell {
        self.snapshot.clone()
    }

    pub fn frame(&self) -> u64 {
        self.frame
    }

    pub fn quit_requested(&self) -> bool {
        self.quit_requested
    }

    pub fn status_strip(&self) -> Rect {
        let screen = self.settings.screen();
        let h = STATUS_STRIP_HEIGHT.min(screen.h);
        Rect::new(0, screen.bottom() - h as i32, screen.w, h)
    }

    /// Offers a touch or encoder event to the active page: its widgets
    /// first, then the page, then the default control-grid handling.
    pub fn handle_input(&mut self, event: InputEvent) -> bool {
        let Some(active) = self.controller.active_mut() else {
            return false;
        };
        let mut store = self.store.lock();
        let mut ctx = InputContext {
            key: &active.key,
            store: &mut store,
            events: &self.queue,
        };

        let page = &mut active.page;
        let widgets = &mut active.widgets;
        let handled = panic::catch_unwind(AssertUnwindSafe(|| {
            widgets.handle_input(&event, &mut ctx)
                || page.handle_input(&event, &mut ctx)
                || default_input(&event, &mut ctx)
        }));

        handled.unwrap_or_else(|payload| {
            warn_throttled!(
                Duration::from_secs(5),
                "input handling on {} panicked: {}",
                active.key,
                panic_message(payload.as_ref())
            );
            false
        })
    }

    /// Runs one iteration of the loop and reports what kind of frame, if
    /// any, was drawn.
    pub fn step(
        &mut self,
        now: Instant,
        surface: &mut dyn Surface,
    ) -> FrameKind {
        self.process_commands();
        self.publish_snapshot(now);

        let key = self.controller.active_key().cloned();
        let caps = self.controller.capabilities();
        let active = self.controller.active_mut();
        let decision = self.scheduler.tick(now, key.as_ref(), caps, |at| {
            let Some(active) = active else {
                return Vec::new();
            };
            let page = &mut active.page;
            let widgets = &mut active.widgets;
            let polled = panic::catch_unwind(AssertUnwindSafe(|| {
                let mut rects = page.poll_dirty(at);
                rects.extend(widgets.poll_dirty(at));
                rects
            }));

            // A panicking poll counts as a silent one, which leads to the
            // full-frame fallback if it keeps happening.
            polled.unwrap_or_else(|payload| {
                warn_throttled!(
                    Duration::from_secs(5),
                    "polling {} panicked: {}",
                    active.key,
                    panic_message(payload.as_ref())
                );
                Vec::new()
            })
        });

        let kind = decision.kind();
        match decision {
            FrameDecision::Skip => return kind,
            FrameDecision::Blocked { overlay } => {
                self.render_chrome(surface, now, &overlay)
            }
            FrameDecision::Idle => self.render_chrome(surface, now, &[]),
            FrameDecision::Partial(set) => {
                self.render_page(surface, now, set, false)
            }
            FrameDecision::Full(set) => {
                self.render_page(surface, now, set, true)
            }
        }

        kind
    }

    /// Steps until a quit command arrives or `stop` is signalled, pacing to
    /// the scheduler's deadline, then shuts down.
    pub fn run(
        &mut self,
        surface: &mut dyn Surface,
        stop: &StopSignal,
    ) -> Result<RuntimeStats> {
        info!("panel runtime running");
        while !self.quit_requested && !stop.is_stopped() {
            self.step(Instant::now(), surface);
            stop.wait_until(self.scheduler.next_deadline());
        }
        self.shutdown()
    }

    /// Stops the workers within the configured timeout (the event worker
    /// drains once more, autosave flushes), tears down the active page and
    /// reports final statistics. Safe to call more than once.
    pub fn shutdown(&mut self) -> Result<RuntimeStats> {
        if self.stopped {
            return Ok(self.stats());
        }
        self.stopped = true;

        let timeout = Duration::from_millis(self.settings.shutdown_timeout_ms);
        let mut first_error = None;

        if let Some(mut worker) = self.worker.take() {
            if let Err(e) = worker.stop(timeout) {
                error!("event worker did not stop cleanly: {}", e);
                first_error.get_or_insert(e);
            }
            self.worker_stats = worker.stats();
        }

        self.controller.deactivate();

        match self.autosave.take() {
            Some(mut autosave) => {
                if let Err(e) = autosave.stop(timeout) {
                    error!("autosave did not stop cleanly: {}", e);
                    first_error.get_or_insert(e);
                }
            }
            None => {
                if let Err(e) = save_if_dirty(&self.store, &self.storage) {
                    error!("final save failed: {}", e);
                    first_error.get_or_insert(e);
                }
            }
        }

        self.emit(RuntimeEvent::Stopped);
        info!("panel runtime stopped after {} frames", self.frame);

        match first_error {
            Some(e) => Err(e),
            None => Ok(self.stats()),
        }
    }

    pub fn stats(&self) -> RuntimeStats {
        RuntimeStats {
            frames: self.scheduler.stats(),
            average_fps: self.scheduler.average_fps(),
            transitions: self.controller.transitions(),
            worker: self
                .worker
                .as_ref()
                .map(EventWorker::stats)
                .unwrap_or(self.worker_stats),
            queue_high_water: self.queue.high_water(),
            backlog_episodes: self.queue.backlog_episodes(),
        }
    }

    fn process_commands(&mut self) {
        while let Ok(command) = self.command_rx.try_recv() {
            debug!("runtime command: {:?}", command);
            let (target, result) = match command {
                RuntimeCommand::SwitchPage(name) => {
                    let result = self.controller.switch_to(&name);
                    (name, result)
                }
                RuntimeCommand::SwitchMode(mode) => {
                    let result = self.controller.switch_mode(&mode);
                    (mode, result)
                }
                RuntimeCommand::NextPage => {
                    ("next".to_string(), self.controller.next_page())
                }
                RuntimeCommand::PreviousPage => {
                    ("previous".to_string(), self.controller.previous_page())
                }
                RuntimeCommand::ForceFullRedraw => {
                    self.tracker
                        .invalidate_all(self.controller.active_key().cloned());
                    self.scheduler.request_frame();
                    continue;
                }
                RuntimeCommand::Quit => {
                    self.quit_requested = true;
                    continue;
                }
            };

            match result {
                Ok(report) => self.page_activated(report),
                Err(e) => {
                    warn!("page change to '{}' failed: {}", target, e);
                    self.emit(RuntimeEvent::TransitionFailed {
                        page: target,
                        error: e.to_string(),
                    });
                }
            }
        }
    }

    fn page_activated(&mut self, report: TransitionReport) {
        self.theme.clear();
        self.scheduler.page_changed();
        self.scheduler.request_frame();
        self.tracker.mark(DirtyRegion::overlay(self.status_strip()));

        if let Some(e) = &report.configure_error {
            warn!(
                "{} is shown with incomplete configuration: {}",
                report.to, e
            );
        }
        self.emit(RuntimeEvent::PageSwitched(report.to));
    }

    fn publish_snapshot(&self, now: Instant) {
        let active_page = self.controller.active_key().cloned();
        let transitioning = active_page
            .clone()
            .filter(|key| self.controller.is_transitioning(key));

        self.snapshot.publish(UiSnapshot {
            frame: self.frame,
            active_page,
            active_mode: self.controller.active_mode().map(str::to_string),
            transitioning,
            owner_pages: self.controller.owner_pages().clone(),
            home_pages: self.controller.home_pages().clone(),
            taken_at: Some(now),
        });
    }

    fn render_page(
        &mut self,
        surface: &mut dyn Surface,
        now: Instant,
        set: DirtySet,
        full: bool,
    ) {
        let screen = self.settings.screen();
        let strip = self.status_strip();
        let Some(active) = self.controller.active_mut() else {
            self.render_chrome(surface, now, &set.regions);
            return;
        };

        // Regions of other pages are never presented.
        let page_regions: Vec<DirtyRegion> =
            set.for_page(&active.key).cloned().collect();
        let visible: Vec<Rect> =
            set.visible(&active.key).map(|r| r.rect).collect();
        let clip = visible.iter().copied().reduce(|a, b| a.union(&b));
        let mut presented: Vec<Rect> =
            if full { vec![screen] } else { visible };

        surface.set_clip(if full { None } else { clip });

        let drawn = {
            let store = self.store.lock();
            let mut ctx = RenderContext {
                key: &active.key,
                store: &store,
                theme: &mut self.theme,
                screen,
                frame: self.frame,
                now,
                full,
            };

            if full {
                let background = ctx.color("background");
                surface.fill_rect(screen, background);
            }

            let page = &mut active.page;
            let widgets = &mut active.widgets;
            let rendered = panic::catch_unwind(AssertUnwindSafe(|| {
                let mut drawn = page.render(surface, &mut ctx, &page_regions);
                let dirty: Vec<Rect> =
                    page_regions.iter().map(|r| r.rect).collect();
                drawn.extend(widgets.render(surface, &mut ctx, &dirty));
                drawn
            }));

            match rendered {
                Ok(drawn) => drawn,
                Err(payload) => {
                    warn_throttled!(
                        Duration::from_secs(5),
                        "rendering {} panicked: {}",
                        active.key,
                        panic_message(payload.as_ref())
                    );
                    Vec::new()
                }
            }
        };

        for rect in drawn {
            if !presented.contains(&rect) {
                presented.push(rect);
            }
        }

        let strip_dirty = set.unowned().any(|r| r.rect.intersects(&strip));
        if full || strip_dirty {
            surface.set_clip(Some(strip));
            self.draw_status(surface);
            if !full && !presented.contains(&strip) {
                presented.push(strip);
            }
        }

        self.present(surface, &presented, full);
    }

    /// Draws only content that belongs to no page: the status strip.
    fn render_chrome(
        &mut self,
        surface: &mut dyn Surface,
        _now: Instant,
        overlay: &[DirtyRegion],
    ) {
        let strip = self.status_strip();
        let mut presented: Vec<Rect> = overlay
            .iter()
            .filter(|r| r.page.is_none())
            .map(|r| r.rect)
            .collect();
        if !presented.contains(&strip) {
            presented.push(strip);
        }

        surface.set_clip(Some(strip));
        self.draw_status(surface);
        self.present(surface, &presented, false);
    }

    fn draw_status(&mut self, surface: &mut dyn Surface) {
        let strip = self.status_strip();
        let background = self.theme.color(CHROME_OWNER, "status");
        let label = self.theme.color(CHROME_OWNER, "label");
        let error = self.theme.color(CHROME_OWNER, "error");

        surface.fill_rect(strip, background);

        let location = match (
            self.controller.active_mode(),
            self.controller.active(),
        ) {
            (Some(mode), Some(active)) => {
                format!("{} / {}", mode, active.config.display_name)
            }
            (None, Some(active)) => active.config.display_name.to_string(),
            (_, None) => "-".to_string(),
        };
        surface.text(strip.x + 8, strip.y + 12, &location, label);

        let rate = format!("{:.0} fps", self.scheduler.average_fps());
        surface.text(strip.right() - 96, strip.y + 12, &rate, label);

        if let Some(e) = self
            .controller
            .active()
            .and_then(|a| a.configure_error.as_deref())
        {
            surface.text(strip.x + 240, strip.y + 12, e, error);
        }
    }

    fn present(
        &mut self,
        surface: &mut dyn Surface,
        regions: &[Rect],
        full: bool,
    ) {
        surface.set_clip(None);
        surface.present(regions);
        self.frame += 1;
        self.emit(RuntimeEvent::FrameRendered {
            frame: self.frame,
            full,
            regions: regions.len(),
        });
    }

    fn emit(&self, event: RuntimeEvent) {
        if let Some(tx) = &self.event_tx {
            if tx.send(event).is_err() {
                debug!("runtime event receiver dropped");
            }
        }
    }
}

impl Drop for PanelRuntime {
    fn drop(&mut self) {
        if !self.stopped {
            if let Err(e) = self.shutdown() {
                error!("shutdown on drop failed: {}", e);
            }
        }
    }
}

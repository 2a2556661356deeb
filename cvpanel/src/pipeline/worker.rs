//! Background consumer of the [`EventQueue`].
//!
//! Each iteration swaps the whole queue out and dispatches the batch against
//! the latest [`UiSnapshot`]. A failing or panicking handler costs only its
//! own event.

use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::{Duration, Instant};

use log::{error, info, trace};
use parking_lot::Mutex;
use serde_json::Value;

use super::events::PendingEvent;
use super::queue::{Envelope, EventQueue};
use super::snapshot::{SnapshotCell, UiSnapshot};
use crate::core::error::{PanelError, Result};
use crate::core::util::{HashMap, panic_message};
use crate::params::descriptor::PageKey;
use crate::params::store::SharedStore;
use crate::runtime::events::{RuntimeCommand, RuntimeCommandSender};
use crate::task::TaskHandle;

pub trait EventHandler: Send {
    fn dispatch(&mut self, event: &PendingEvent, ui: &UiSnapshot) -> Result<()>;
}

impl<F> EventHandler for F
where
    F: FnMut(&PendingEvent, &UiSnapshot) -> Result<()> + Send,
{
    fn dispatch(
        &mut self,
        event: &PendingEvent,
        ui: &UiSnapshot,
    ) -> Result<()> {
        self(event, ui)
    }
}

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct BatchReport {
    pub dispatched: usize,
    pub failed: usize,
    pub panicked: usize,
}

impl BatchReport {
    pub fn total(&self) -> usize {
        self.dispatched + self.failed + self.panicked
    }
}

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct WorkerStats {
    pub batches: u64,
    pub dispatched: u64,
    pub failed: u64,
    pub panicked: u64,
    pub largest_batch: usize,
}

impl WorkerStats {
    fn record(&mut self, report: &BatchReport) {
        self.batches += 1;
        self.dispatched += report.dispatched as u64;
        self.failed += report.failed as u64;
        self.panicked += report.panicked as u64;
        self.largest_batch = self.largest_batch.max(report.total());
    }
}

/// Dispatches every envelope in order. Errors and panics are logged per event
/// and never stop the batch.
pub fn dispatch_batch(
    handler: &mut dyn EventHandler,
    batch: Vec<Envelope>,
    ui: &UiSnapshot,
) -> BatchReport {
    let mut report = BatchReport::default();

    for envelope in batch {
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
            handler.dispatch(&envelope.event, ui)
        }));

        match outcome {
            Ok(Ok(())) => report.dispatched += 1,
            Ok(Err(e)) => {
                report.failed += 1;
                error!(
                    "dispatch of {} #{} failed: {}",
                    envelope.event.kind(),
                    envelope.seq,
                    e
                );
            }
            Err(payload) => {
                report.panicked += 1;
                error!(
                    "dispatch of {} #{} panicked: {}",
                    envelope.event.kind(),
                    envelope.seq,
                    panic_message(payload.as_ref())
                );
            }
        }
    }

    report
}

/// Drains the queue once. Returns `None` when it was empty.
pub fn run_once(
    queue: &EventQueue,
    snapshot: &SnapshotCell,
    handler: &mut dyn EventHandler,
) -> Option<BatchReport> {
    let batch = queue.drain();
    if batch.is_empty() {
        return None;
    }

    let size = batch.len();
    let oldest = batch[0].enqueued_at;
    let ui = snapshot.load();
    let report = dispatch_batch(handler, batch, &ui);

    trace!(
        "dispatched batch of {} (oldest waited {:?})",
        size,
        oldest.elapsed()
    );

    Some(report)
}

pub struct EventWorker {
    task: TaskHandle,
    stats: Arc<Mutex<WorkerStats>>,
}

impl EventWorker {
    pub fn spawn(
        queue: EventQueue,
        snapshot: SnapshotCell,
        mut handler: impl EventHandler + 'static,
        hz: f32,
    ) -> Result<Self> {
        let period = Duration::from_secs_f32(1.0 / hz.max(1.0));
        let stats = Arc::new(Mutex::new(WorkerStats::default()));
        let task_stats = stats.clone();

        info!("event worker draining at {:.0} Hz", 1.0 / period.as_secs_f32());

        let task = TaskHandle::spawn("cvpanel-events", move |stop| {
            let mut next = Instant::now() + period;
            loop {
                let stopped = stop.wait_until(next);

                // A stop still drains whatever was queued before it.
                if let Some(report) = run_once(&queue, &snapshot, &mut handler)
                {
                    task_stats.lock().record(&report);
                }

                if stopped {
                    break;
                }

                next += period;
                let now = Instant::now();
                if next < now {
                    next = now + period;
                }
            }
        })?;

        Ok(Self { task, stats })
    }

    pub fn stats(&self) -> WorkerStats {
        *self.stats.lock()
    }

    /// Signals stop, lets the worker drain the queue one last time, and joins
    /// within `timeout`.
    pub fn stop(&mut self, timeout: Duration) -> Result<()> {
        self.task.stop(timeout)
    }
}

type CustomHandler =
    Box<dyn FnMut(&Value, &UiSnapshot) -> Result<()> + Send + 'static>;

/// Applies control events to the parameter store and forwards navigation to
/// the render thread as [`RuntimeCommand`]s.
pub struct CoreDispatcher {
    store: SharedStore,
    commands: RuntimeCommandSender,
    custom: HashMap<String, CustomHandler>,
}

impl CoreDispatcher {
    pub fn new(store: SharedStore, commands: RuntimeCommandSender) -> Self {
        Self {
            store,
            commands,
            custom: HashMap::default(),
        }
    }

    pub fn on_custom<F>(mut self, tag: &str, handler: F) -> Self
    where
        F: FnMut(&Value, &UiSnapshot) -> Result<()> + Send + 'static,
    {
        self.custom.insert(tag.to_string(), Box::new(handler));
        self
    }

    fn target(&self, owner: &str, ui: &UiSnapshot) -> Result<PageKey> {
        ui.page_for_owner(owner).ok_or_else(|| {
            PanelError::Dispatch(format!("no page shown for owner '{}'", owner))
        })
    }

    fn send(&self, command: RuntimeCommand) -> Result<()> {
        self.commands.send(command).map_err(|e| {
            PanelError::Dispatch(format!("runtime is gone: {}", e))
        })
    }
}

impl EventHandler for CoreDispatcher {
    fn dispatch(
        &mut self,
        event: &PendingEvent,
        ui: &UiSnapshot,
    ) -> Result<()> {
        match event {
            PendingEvent::ControlChanged { owner, slot, raw } => {
                let key = self.target(owner, ui)?;
                let mut store = self.store.lock();
                let range = store
                    .descriptor(&key, *slot)
                    .map(|d| d.range.clone())
                    .ok_or_else(|| PanelError::UnknownControl {
                        owner: key.owner.clone(),
                        page: key.page.clone(),
                        slot: slot.to_string(),
                    })?;
                store.set_value(&key, *slot, raw.to_range(&range))?;
            }
            PendingEvent::ControlNudged { owner, slot, delta } => {
                let key = self.target(owner, ui)?;
                self.store.lock().nudge(&key, *slot, *delta)?;
            }
            PendingEvent::ButtonToggled { owner, slot } => {
                let key = self.target(owner, ui)?;
                self.store.lock().toggle(&key, *slot)?;
            }
            PendingEvent::ResetPage { owner } => {
                let key = self.target(owner, ui)?;
                self.store.lock().reset_page(&key);
            }
            PendingEvent::PageChangeRequested(page) => {
                self.send(RuntimeCommand::SwitchPage(page.clone()))?;
            }
            PendingEvent::ModeChangeRequested(mode) => {
                self.send(RuntimeCommand::SwitchMode(mode.clone()))?;
            }
            PendingEvent::NextPage => self.send(RuntimeCommand::NextPage)?,
            PendingEvent::PreviousPage => {
                self.send(RuntimeCommand::PreviousPage)?
            }
            PendingEvent::ForceFullRedraw => {
                self.send(RuntimeCommand::ForceFullRedraw)?
            }
            PendingEvent::Custom { tag, payload } => {
                let handler = self.custom.get_mut(tag).ok_or_else(|| {
                    PanelError::Dispatch(format!("no handler for '{}'", tag))
                })?;
                handler(payload, ui)?;
            }
        }
        Ok(())
    }
}

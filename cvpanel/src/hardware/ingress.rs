use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use log::trace;

use crate::params::descriptor::Slot;
use crate::pipeline::events::{PendingEvent, RawValue};
use crate::pipeline::queue::EventQueue;

/// Entry point for hardware listener threads. Every call wraps its input in
/// a [`PendingEvent`] and enqueues it; nothing here touches the parameter
/// store or the page being shown.
#[derive(Clone, Debug)]
pub struct HardwareIngress {
    queue: EventQueue,
    received: Arc<AtomicU64>,
}

impl HardwareIngress {
    pub fn new(queue: EventQueue) -> Self {
        Self {
            queue,
            received: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn on_control_change(
        &self,
        owner: &str,
        slot: Slot,
        raw: RawValue,
    ) -> u64 {
        trace!("{} {} <- {:?}", owner, slot, raw);
        self.enqueue(PendingEvent::control(owner, slot, raw))
    }

    /// Relative change from an endless encoder.
    pub fn on_nudge(&self, owner: &str, slot: Slot, delta: f32) -> u64 {
        self.enqueue(PendingEvent::ControlNudged {
            owner: owner.to_string(),
            slot,
            delta,
        })
    }

    pub fn on_button(&self, owner: &str, slot: Slot) -> u64 {
        self.enqueue(PendingEvent::ButtonToggled {
            owner: owner.to_string(),
            slot,
        })
    }

    pub fn request_page(&self, page: &str) -> u64 {
        self.enqueue(PendingEvent::PageChangeRequested(page.to_string()))
    }

    pub fn request_mode(&self, mode: &str) -> u64 {
        self.enqueue(PendingEvent::ModeChangeRequested(mode.to_string()))
    }

    pub fn next_page(&self) -> u64 {
        self.enqueue(PendingEvent::NextPage)
    }

    pub fn previous_page(&self) -> u64 {
        self.enqueue(PendingEvent::PreviousPage)
    }

    /// The `on_control_change(owner, slot, raw)` callback in a form that can
    /// be moved into a listener thread.
    pub fn callback(
        &self,
    ) -> impl Fn(&str, Slot, RawValue) + Send + Sync + 'static {
        let ingress = self.clone();
        move |owner: &str, slot: Slot, raw: RawValue| {
            ingress.on_control_change(owner, slot, raw);
        }
    }

    /// Events accepted since creation, across all clones.
    pub fn received(&self) -> u64 {
        self.received.load(Ordering::Relaxed)
    }

    fn enqueue(&self, event: PendingEvent) -> u64 {
        self.received.fetch_add(1, Ordering::Relaxed);
        self.queue.push(event)
    }
}

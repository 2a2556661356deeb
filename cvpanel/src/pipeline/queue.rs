//! Unbounded multi-producer queue drained by the event worker.
//!
//! The lock is held only to push one envelope or to swap the whole list out,
//! never while an event is dispatched.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use super::events::PendingEvent;
use crate::warn_throttled;

#[derive(Clone, Debug, PartialEq)]
pub struct Envelope {
    pub seq: u64,
    pub event: PendingEvent,
    pub enqueued_at: Instant,
}

#[derive(Debug)]
struct QueueInner {
    pending: Mutex<Vec<Envelope>>,
    next_seq: AtomicU64,
    backlog_threshold: usize,
    in_backlog: AtomicBool,
    backlog_episodes: AtomicU64,
    high_water: AtomicUsize,
}

/// Cloning yields another producer handle onto the same queue.
#[derive(Clone, Debug)]
pub struct EventQueue {
    inner: Arc<QueueInner>,
}

impl EventQueue {
    pub fn new(backlog_threshold: usize) -> Self {
        Self {
            inner: Arc::new(QueueInner {
                pending: Mutex::new(Vec::new()),
                next_seq: AtomicU64::new(0),
                backlog_threshold: backlog_threshold.max(1),
                in_backlog: AtomicBool::new(false),
                backlog_episodes: AtomicU64::new(0),
                high_water: AtomicUsize::new(0),
            }),
        }
    }

    /// Never blocks beyond the push itself and never drops. Returns the
    /// event's sequence number.
    pub fn push(&self, event: PendingEvent) -> u64 {
        let (seq, depth) = {
            let mut pending = self.inner.pending.lock();
            let seq = self.inner.next_seq.fetch_add(1, Ordering::Relaxed);
            pending.push(Envelope {
                seq,
                event,
                enqueued_at: Instant::now(),
            });
            (seq, pending.len())
        };

        self.inner.high_water.fetch_max(depth, Ordering::Relaxed);

        if depth > self.inner.backlog_threshold
            && !self.inner.in_backlog.swap(true, Ordering::Relaxed)
        {
            self.inner.backlog_episodes.fetch_add(1, Ordering::Relaxed);
            warn_throttled!(
                Duration::from_secs(1),
                "event queue backlog: {} pending (threshold {})",
                depth,
                self.inner.backlog_threshold
            );
        }

        seq
    }

    pub fn push_all(&self, events: impl IntoIterator<Item = PendingEvent>) {
        for event in events {
            self.push(event);
        }
    }

    /// Takes everything queued so far, in enqueue order.
    pub fn drain(&self) -> Vec<Envelope> {
        let batch = std::mem::take(&mut *self.inner.pending.lock());
        self.inner.in_backlog.store(false, Ordering::Relaxed);
        batch
    }

    pub fn len(&self) -> usize {
        self.inner.pending.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn backlog_threshold(&self) -> usize {
        self.inner.backlog_threshold
    }

    /// Number of times the depth crossed the backlog threshold.
    pub fn backlog_episodes(&self) -> u64 {
        self.inner.backlog_episodes.load(Ordering::Relaxed)
    }

    pub fn high_water(&self) -> usize {
        self.inner.high_water.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use std::thread;

    use super::*;

    #[test]
    fn drain_preserves_enqueue_order() {
        let queue = EventQueue::new(16);
        queue.push(PendingEvent::NextPage);
        queue.push(PendingEvent::ForceFullRedraw);
        queue.push(PendingEvent::PreviousPage);

        let batch = queue.drain();
        let seqs: Vec<u64> = batch.iter().map(|e| e.seq).collect();
        assert_eq!(seqs, vec![0, 1, 2]);
        assert_eq!(batch[1].event, PendingEvent::ForceFullRedraw);
        assert!(queue.is_empty());
    }

    #[test]
    fn backlog_is_reported_once_per_episode() {
        let queue = EventQueue::new(4);
        for _ in 0..10 {
            queue.push(PendingEvent::ForceFullRedraw);
        }
        assert_eq!(queue.backlog_episodes(), 1);
        assert_eq!(queue.len(), 10);
        assert_eq!(queue.high_water(), 10);

        queue.drain();
        for _ in 0..5 {
            queue.push(PendingEvent::ForceFullRedraw);
        }
        assert_eq!(queue.backlog_episodes(), 2);
    }

    #[test]
    fn concurrent_producers_keep_per_producer_fifo() {
        let queue = EventQueue::new(10_000);
        let handles: Vec<_> = (0..4)
            .map(|producer| {
                let queue = queue.clone();
                thread::spawn(move || {
                    for i in 0..250 {
                        queue.push(PendingEvent::Custom {
                            tag: producer.to_string(),
                            payload: serde_json::json!(i),
                        });
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().expect("producer");
        }

        let batch = queue.drain();
        assert_eq!(batch.len(), 1000);
        for producer in 0..4 {
            let seen: Vec<i64> = batch
                .iter()
                .filter_map(|e| match &e.event {
                    PendingEvent::Custom { tag, payload }
                        if *tag == producer.to_string() =>
                    {
                        payload.as_i64()
                    }
                    _ => None,
                })
                .collect();
            assert_eq!(seen, (0..250).collect::<Vec<i64>>());
        }
    }
}

//! Named background threads with an explicit stop signal and a bounded join.
//!
//! Every long-lived loop in the panel (event worker, autosave) runs inside a
//! [`TaskHandle`]. Stopping is cooperative: the loop sleeps on its
//! [`StopSignal`] between iterations and exits once the signal is raised.

use std::sync::Arc;
use std::sync::mpsc::{self, RecvTimeoutError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use log::{debug, warn};
use parking_lot::{Condvar, Mutex};

use crate::core::error::{PanelError, Result};

#[derive(Clone, Debug, Default)]
pub struct StopSignal {
    inner: Arc<(Mutex<bool>, Condvar)>,
}

impl StopSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stop(&self) {
        let (stopped, condvar) = &*self.inner;
        *stopped.lock() = true;
        condvar.notify_all();
    }

    pub fn is_stopped(&self) -> bool {
        *self.inner.0.lock()
    }

    /// Sleeps until `deadline` or until stop is signalled, whichever comes
    /// first. Returns true when stopped.
    pub fn wait_until(&self, deadline: Instant) -> bool {
        let (stopped, condvar) = &*self.inner;
        let mut stopped = stopped.lock();
        while !*stopped {
            if condvar.wait_until(&mut stopped, deadline).timed_out() {
                break;
            }
        }
        *stopped
    }

    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        self.wait_until(Instant::now() + timeout)
    }
}

/// Notifies the owning handle when the task body returns or unwinds.
struct DoneGuard(mpsc::Sender<()>);

impl Drop for DoneGuard {
    fn drop(&mut self) {
        let _ = self.0.send(());
    }
}

#[derive(Debug)]
pub struct TaskHandle {
    name: String,
    stop: StopSignal,
    done: mpsc::Receiver<()>,
    thread: Option<JoinHandle<()>>,
}

impl TaskHandle {
    pub fn spawn<F>(name: &str, body: F) -> Result<Self>
    where
        F: FnOnce(StopSignal) + Send + 'static,
    {
        let stop = StopSignal::new();
        let (done_tx, done_rx) = mpsc::channel();
        let task_stop = stop.clone();

        let thread = thread::Builder::new()
            .name(name.to_string())
            .spawn(move || {
                let _guard = DoneGuard(done_tx);
                body(task_stop);
            })
            .map_err(|e| {
                PanelError::Worker(format!("failed to spawn {}: {}", name, e))
            })?;

        debug!("started task {}", name);

        Ok(Self {
            name: name.to_string(),
            stop,
            done: done_rx,
            thread: Some(thread),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn stop_signal(&self) -> StopSignal {
        self.stop.clone()
    }

    pub fn is_finished(&self) -> bool {
        self.thread.as_ref().is_none_or(|t| t.is_finished())
    }

    /// Signals stop and waits up to `timeout` for the task to exit. A task
    /// that overruns is detached and reported as an error; it still sees the
    /// stop signal and will exit on its own.
    pub fn stop(&mut self, timeout: Duration) -> Result<()> {
        self.stop.stop();

        let Some(thread) = self.thread.take() else {
            return Ok(());
        };

        match self.done.recv_timeout(timeout) {
            Ok(()) | Err(RecvTimeoutError::Disconnected) => {
                thread.join().map_err(|_| {
                    PanelError::Worker(format!("{} panicked", self.name))
                })?;
                debug!("stopped task {}", self.name);
                Ok(())
            }
            Err(RecvTimeoutError::Timeout) => {
                warn!(
                    "task {} did not stop within {:?}; detaching",
                    self.name, timeout
                );
                Err(PanelError::Worker(format!(
                    "{} did not stop within {:?}",
                    self.name, timeout
                )))
            }
        }
    }
}

impl Drop for TaskHandle {
    fn drop(&mut self) {
        self.stop.stop();
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    #[test]
    fn stop_wakes_a_sleeping_task() {
        let iterations = Arc::new(AtomicUsize::new(0));
        let counter = iterations.clone();
        let mut task = TaskHandle::spawn("sleeper", move |stop| {
            while !stop.wait_timeout(Duration::from_secs(60)) {
                counter.fetch_add(1, Ordering::Relaxed);
            }
        })
        .expect("spawn");

        let started = Instant::now();
        task.stop(Duration::from_secs(5)).expect("stop");
        assert!(started.elapsed() < Duration::from_secs(5));
        assert!(task.is_finished());
        assert_eq!(iterations.load(Ordering::Relaxed), 0);
    }

    #[test]
    fn stuck_task_reports_timeout() {
        let release = StopSignal::new();
        let gate = release.clone();
        let mut task = TaskHandle::spawn("stuck", move |_stop| {
            gate.wait_timeout(Duration::from_secs(10));
        })
        .expect("spawn");

        let result = task.stop(Duration::from_millis(20));
        assert!(matches!(result, Err(PanelError::Worker(_))));
        release.stop();
    }

    #[test]
    fn panicking_task_is_reported() {
        let mut task = TaskHandle::spawn("panics", |_stop| {
            panic!("boom");
        })
        .expect("spawn");
        let result = task.stop(Duration::from_secs(5));
        assert!(matches!(result, Err(PanelError::Worker(_))));
    }

    #[test]
    fn wait_returns_immediately_once_stopped() {
        let signal = StopSignal::new();
        signal.stop();
        assert!(signal.wait_timeout(Duration::from_secs(60)));
        assert!(signal.is_stopped());
    }
}

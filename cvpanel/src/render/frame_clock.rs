use std::collections::VecDeque;
use std::time::{Duration, Instant};

const RATE_WINDOW: usize = 90;
const MIN_INTERVAL: Duration = Duration::from_micros(1);

/// Outcome of one [`FrameClock::tick`].
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct Pace {
    pub due: bool,
    /// Frame slots consumed by this tick. More than one means the loop fell
    /// behind; the skipped slots are counted as dropped, never replayed.
    pub slots: u32,
}

/// Paces the render loop against a target rate that the scheduler may change
/// on every tick.
///
/// The clock keeps the start of the current frame slot. A frame is due once
/// a whole interval at the current rate has passed since then, so lowering
/// the rate mid-slot simply pushes the deadline out.
#[derive(Debug)]
pub struct FrameClock {
    interval: Duration,
    slot_start: Instant,
    forced: bool,
    rendered: u64,
    dropped: u64,
    recent: VecDeque<Instant>,
}

impl FrameClock {
    pub fn with_start(fps: f32, now: Instant) -> Self {
        Self {
            interval: interval_for(fps),
            slot_start: now,
            forced: false,
            rendered: 0,
            dropped: 0,
            recent: VecDeque::with_capacity(RATE_WINDOW),
        }
    }

    pub fn set_fps(&mut self, fps: f32) {
        self.interval = interval_for(fps);
    }

    pub fn rendered(&self) -> u64 {
        self.rendered
    }

    pub fn dropped(&self) -> u64 {
        self.dropped
    }

    /// Makes the next tick due regardless of the rate.
    pub fn force_render(&mut self) {
        self.forced = true;
    }

    /// When the render loop should wake up next.
    pub fn next_deadline(&self) -> Instant {
        if self.forced {
            self.slot_start
        } else {
            self.slot_start + self.interval
        }
    }

    /// Measured render rate over the last few dozen frames.
    pub fn average_fps(&self) -> f32 {
        let (Some(first), Some(last)) =
            (self.recent.front(), self.recent.back())
        else {
            return 0.0;
        };
        let span = last.saturating_duration_since(*first);
        if span.is_zero() {
            return 0.0;
        }
        (self.recent.len() - 1) as f32 / span.as_secs_f32()
    }

    pub fn tick(&mut self, now: Instant) -> Pace {
        let since = now.saturating_duration_since(self.slot_start);
        let slots = (since.as_nanos() / self.interval.as_nanos()) as u32;

        if slots == 0 && !self.forced {
            return Pace::default();
        }

        if slots == 0 {
            self.slot_start = now;
        } else {
            self.slot_start += self.interval * slots;
            self.dropped += u64::from(slots - 1);
        }
        self.forced = false;
        self.note_render(now);

        Pace {
            due: true,
            slots: slots.max(1),
        }
    }

    fn note_render(&mut self, now: Instant) {
        self.rendered += 1;
        if self.recent.len() == RATE_WINDOW {
            self.recent.pop_front();
        }
        self.recent.push_back(now);
    }
}

fn interval_for(fps: f32) -> Duration {
    Duration::from_secs_f64(1.0 / f64::from(fps.max(1.0))).max(MIN_INTERVAL)
}

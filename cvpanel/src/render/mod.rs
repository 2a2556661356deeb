pub mod dirty;
pub mod frame_clock;
pub mod scheduler;
pub mod surface;

pub use dirty::{DirtyRegion, DirtySet, DirtyTracker, Layer};
pub use frame_clock::FrameClock;
pub use scheduler::{
    FrameDecision, FrameKind, FrameScheduler, FrameStats, PageCapabilities,
    RateConfig, RateTier, SchedulerState,
};
pub use surface::{Color, RecordingSurface, Surface};

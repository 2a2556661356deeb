pub mod events;
pub mod queue;
pub mod snapshot;
pub mod worker;

pub use events::{PendingEvent, RawValue};
pub use queue::{Envelope, EventQueue};
pub use snapshot::{SnapshotCell, UiSnapshot};
pub use worker::{
    BatchReport, CoreDispatcher, EventHandler, EventWorker, WorkerStats,
    dispatch_batch,
};

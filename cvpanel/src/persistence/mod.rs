pub mod autosave;
pub mod snapshot;
pub mod storage;

pub use autosave::{AutosaveWorker, save_if_dirty};
pub use snapshot::PersistedSnapshot;
pub use storage::{SnapshotStorage, write_atomic};

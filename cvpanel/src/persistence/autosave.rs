use std::time::{Duration, Instant};

use log::{debug, error, info};

use super::storage::SnapshotStorage;
use crate::core::error::Result;
use crate::params::store::SharedStore;
use crate::task::TaskHandle;

/// Writes the store's live values if anything changed since the last write.
/// The store lock is not held during file I/O.
pub fn save_if_dirty(
    store: &SharedStore,
    storage: &SnapshotStorage,
) -> Result<bool> {
    let snapshot = {
        let store = store.lock();
        if !store.has_unpersisted() {
            return Ok(false);
        }
        store.commit_snapshot()
    };

    storage.save(&snapshot.clone().stamped())?;

    let cleared = store.lock().mark_persisted(&snapshot);
    debug!(
        "autosaved {} values to {} ({} records settled)",
        snapshot.len(),
        storage.path().display(),
        cleared
    );
    Ok(true)
}

pub struct AutosaveWorker {
    task: TaskHandle,
}

impl AutosaveWorker {
    pub fn spawn(
        store: SharedStore,
        storage: SnapshotStorage,
        interval: Duration,
    ) -> Result<Self> {
        let interval = interval.max(Duration::from_millis(10));
        info!(
            "autosave every {:?} to {}",
            interval,
            storage.path().display()
        );

        let task = TaskHandle::spawn("cvpanel-autosave", move |stop| {
            let mut next = Instant::now() + interval;
            while !stop.wait_until(next) {
                next += interval;
                if let Err(e) = save_if_dirty(&store, &storage) {
                    error!("autosave failed, retrying next cycle: {}", e);
                }
            }

            // Final flush so values changed in the last interval survive.
            if let Err(e) = save_if_dirty(&store, &storage) {
                error!("final autosave failed: {}", e);
            }
        })?;

        Ok(Self { task })
    }

    pub fn stop(&mut self, timeout: Duration) -> Result<()> {
        self.task.stop(timeout)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::Rect;
    use crate::params::descriptor::{ControlDescriptor, PageKey, Slot};
    use crate::params::store::ParameterStore;
    use crate::render::dirty::DirtyTracker;

    fn store() -> (SharedStore, PageKey) {
        let key = PageKey::new("synth", "P1");
        let mut store =
            ParameterStore::new(DirtyTracker::new(Rect::from_size(800, 480)));
        let cutoff = ControlDescriptor::dial(1, "Cutoff", 0.0, 127.0);
        store.rebuild_page(&key, vec![cutoff]).expect("rebuild");
        (store.shared(), key)
    }

    #[test]
    fn saves_only_when_something_changed() {
        let dir = tempfile::tempdir().expect("tempdir");
        let storage = SnapshotStorage::in_dir(dir.path());
        let (store, key) = store();

        assert!(!save_if_dirty(&store, &storage).expect("save"));

        store.lock().set_value(&key, Slot::Dial(1), 42.0).expect("set");
        assert!(save_if_dirty(&store, &storage).expect("save"));
        assert!(!store.lock().has_unpersisted());
        assert!(!save_if_dirty(&store, &storage).expect("save"));

        let loaded = storage.load().expect("load");
        assert_eq!(loaded.get(&key, Slot::Dial(1)), Some(42.0));
    }

    #[test]
    fn worker_flushes_on_stop() {
        let dir = tempfile::tempdir().expect("tempdir");
        let storage = SnapshotStorage::in_dir(dir.path());
        let (store, key) = store();

        let mut worker = AutosaveWorker::spawn(
            store.clone(),
            storage.clone(),
            Duration::from_secs(3600),
        )
        .expect("spawn");

        store.lock().set_value(&key, Slot::Dial(1), 7.0).expect("set");
        worker.stop(Duration::from_secs(5)).expect("stop");

        let loaded = storage.load().expect("load");
        assert_eq!(loaded.get(&key, Slot::Dial(1)), Some(7.0));
    }
}

use std::fs::{self, File};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use log::{debug, warn};

use super::snapshot::PersistedSnapshot;
use crate::core::error::{PanelError, Result};

pub const SNAPSHOT_FILE: &str = "parameters.json";

/// Writes `bytes` to a sibling temp file, syncs it, then renames it over
/// `path`. Readers see either the old file or the new one, never a prefix.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let parent = path.parent().unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(parent)?;

    let file_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| {
            PanelError::Persistence(format!(
                "invalid file path: {}",
                path.display()
            ))
        })?;
    let temp = parent.join(format!(".{}.tmp", file_name));

    let result = (|| -> std::io::Result<()> {
        let mut file = File::create(&temp)?;
        file.write_all(bytes)?;
        file.sync_all()?;
        fs::rename(&temp, path)
    })();

    if let Err(e) = result {
        let _ = fs::remove_file(&temp);
        return Err(e.into());
    }

    Ok(())
}

#[derive(Clone, Debug)]
pub struct SnapshotStorage {
    path: PathBuf,
}

impl SnapshotStorage {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn in_dir(dir: &Path) -> Self {
        Self::new(dir.join(SNAPSHOT_FILE))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn load(&self) -> Result<PersistedSnapshot> {
        let json = fs::read_to_string(&self.path)?;
        let snapshot = serde_json::from_str::<PersistedSnapshot>(&json)?;
        debug!(
            "loaded {} values from {}",
            snapshot.len(),
            self.path.display()
        );
        Ok(snapshot)
    }

    /// A missing file is not an error. A corrupt one is, so the caller can
    /// decide whether to start empty.
    pub fn load_if_exists(&self) -> Result<Option<PersistedSnapshot>> {
        match self.load() {
            Ok(snapshot) => Ok(Some(snapshot)),
            Err(PanelError::Io(e)) if e.kind() == ErrorKind::NotFound => {
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    /// Like [`load_if_exists`](Self::load_if_exists) but logs and falls back
    /// to an empty snapshot on any failure.
    pub fn load_or_default(&self) -> PersistedSnapshot {
        match self.load_if_exists() {
            Ok(snapshot) => snapshot.unwrap_or_default(),
            Err(e) => {
                warn!(
                    "ignoring unreadable snapshot {}: {}",
                    self.path.display(),
                    e
                );
                PersistedSnapshot::new()
            }
        }
    }

    pub fn save(&self, snapshot: &PersistedSnapshot) -> Result<()> {
        let json = serde_json::to_string_pretty(snapshot)?;
        write_atomic(&self.path, json.as_bytes()).map_err(|e| {
            PanelError::Persistence(format!(
                "failed to write {}: {}",
                self.path.display(),
                e
            ))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::descriptor::{PageKey, Slot};

    #[test]
    fn save_replaces_file_and_leaves_no_temp() {
        let dir = tempfile::tempdir().expect("tempdir");
        let storage = SnapshotStorage::in_dir(dir.path());

        let mut first = PersistedSnapshot::new();
        first.insert(&PageKey::new("synth", "P1"), Slot::Dial(1), 10.0);
        storage.save(&first).expect("save first");

        let mut second = PersistedSnapshot::new();
        second.insert(&PageKey::new("synth", "P1"), Slot::Dial(1), 20.0);
        storage.save(&second).expect("save second");

        let loaded = storage.load().expect("load");
        assert!(loaded.same_values(&second));

        let names: Vec<_> = fs::read_dir(dir.path())
            .expect("read dir")
            .filter_map(|e| e.ok())
            .map(|e| e.file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec![SNAPSHOT_FILE.to_string()]);
    }

    #[test]
    fn missing_file_loads_as_none() {
        let dir = tempfile::tempdir().expect("tempdir");
        let storage = SnapshotStorage::in_dir(dir.path());
        assert!(storage.load_if_exists().expect("load").is_none());
    }

    #[test]
    fn corrupt_file_is_an_error_but_load_or_default_recovers() {
        let dir = tempfile::tempdir().expect("tempdir");
        let storage = SnapshotStorage::in_dir(dir.path());
        fs::write(storage.path(), "{ not json").expect("write");

        assert!(matches!(storage.load_if_exists(), Err(PanelError::Json(_))));
        assert!(storage.load_or_default().is_empty());
    }

    #[test]
    fn failed_write_keeps_previous_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let storage = SnapshotStorage::in_dir(dir.path());
        let mut snapshot = PersistedSnapshot::new();
        snapshot.insert(&PageKey::new("synth", "P1"), Slot::Dial(1), 10.0);
        storage.save(&snapshot).expect("save");

        // A directory squatting on the temp path makes the write fail.
        fs::create_dir(dir.path().join(format!(".{}.tmp", SNAPSHOT_FILE)))
            .expect("mkdir");
        let mut next = PersistedSnapshot::new();
        next.insert(&PageKey::new("synth", "P1"), Slot::Dial(1), 99.0);
        assert!(storage.save(&next).is_err());

        let loaded = storage.load().expect("load");
        assert!(loaded.same_values(&snapshot));
    }
}

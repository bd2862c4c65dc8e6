// Snapshot Storage
//
// One JSON array per collection, keyed by collection id. A collection
// that has never been saved loads as an empty snapshot.

use std::collections::HashMap;
use std::path::PathBuf;

use super::Snapshot;
use crate::fsutil;

#[derive(Debug, thiserror::Error)]
pub enum SnapshotError {
    #[error("snapshot io error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("corrupt snapshot {path}: {reason}")]
    Corrupt { path: PathBuf, reason: String },
}

/// Storage backend for membership snapshots.
///
/// `save` fully replaces prior content. There is no append mode.
pub trait SnapshotStore {
    fn load(&self, collection_id: &str) -> Result<Snapshot, SnapshotError>;

    fn save(&mut self, collection_id: &str, snapshot: &Snapshot) -> Result<(), SnapshotError>;
}

/// Snapshots kept as `<dir>/<prefix>_<collection_id>.json`.
#[derive(Debug, Clone)]
pub struct JsonSnapshotStore {
    dir: PathBuf,
    prefix: String,
}

impl JsonSnapshotStore {
    pub fn new(dir: impl Into<PathBuf>, prefix: impl Into<String>) -> Self {
        Self {
            dir: dir.into(),
            prefix: prefix.into(),
        }
    }

    pub fn path_for(&self, collection_id: &str) -> PathBuf {
        self.dir
            .join(format!("{}_{}.json", self.prefix, collection_id))
    }
}

impl SnapshotStore for JsonSnapshotStore {
    fn load(&self, collection_id: &str) -> Result<Snapshot, SnapshotError> {
        let path = self.path_for(collection_id);
        let data = fsutil::read_optional(&path).map_err(|source| SnapshotError::Io {
            path: path.clone(),
            source,
        })?;

        match data {
            None => Ok(Snapshot::default()),
            Some(data) => serde_json::from_str(&data).map_err(|e| SnapshotError::Corrupt {
                path,
                reason: e.to_string(),
            }),
        }
    }

    fn save(&mut self, collection_id: &str, snapshot: &Snapshot) -> Result<(), SnapshotError> {
        let path = self.path_for(collection_id);
        let data = serde_json::to_vec(snapshot).map_err(|e| SnapshotError::Corrupt {
            path: path.clone(),
            reason: e.to_string(),
        })?;

        fsutil::atomic_write(&path, &data).map_err(|source| SnapshotError::Io { path, source })
    }
}

#[derive(Debug, Default)]
pub struct InMemorySnapshotStore {
    snapshots: HashMap<String, Snapshot>,
}

impl SnapshotStore for InMemorySnapshotStore {
    fn load(&self, collection_id: &str) -> Result<Snapshot, SnapshotError> {
        Ok(self
            .snapshots
            .get(collection_id)
            .cloned()
            .unwrap_or_default())
    }

    fn save(&mut self, collection_id: &str, snapshot: &Snapshot) -> Result<(), SnapshotError> {
        self.snapshots
            .insert(collection_id.to_string(), snapshot.clone());
        Ok(())
    }
}

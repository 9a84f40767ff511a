//! Persistent storage for the desired region set.
//!
//! The set is stored as a pretty-printed JSON array of versioned region
//! records. A missing file is an empty set.

use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::debug;

use crate::region::TrackedRegion;

/// Errors raised by region stores.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The store file could not be read.
    #[error("Failed to read {}: {source}", path.display())]
    ReadError {
        /// File path.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// The store file could not be written.
    #[error("Failed to write {}: {source}", path.display())]
    WriteError {
        /// File path.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// The parent directory could not be created.
    #[error("Failed to create directory {}: {source}", path.display())]
    CreateDirError {
        /// Directory path.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// The store file holds invalid region records.
    #[error("Failed to parse {}: {source}", path.display())]
    ParseError {
        /// File path.
        path: PathBuf,
        /// Underlying JSON error.
        source: serde_json::Error,
    },

    /// The regions could not be serialized.
    #[error("Failed to serialize regions: {0}")]
    SerializeError(#[from] serde_json::Error),
}

/// Result type for store operations.
pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Where the desired region set lives between runs.
pub trait RegionStore {
    /// Loads the stored regions, in stored order.
    ///
    /// # Errors
    ///
    /// Returns an error if the backing data cannot be read or decoded.
    fn load(&self) -> StoreResult<Vec<TrackedRegion>>;

    /// Replaces the stored regions.
    ///
    /// # Errors
    ///
    /// Returns an error if the backing data cannot be written.
    fn save(&mut self, regions: &[TrackedRegion]) -> StoreResult<()>;
}

/// JSON file store.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    /// Creates a store backed by `path`. Nothing is touched until load or save.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Backing file path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl RegionStore for JsonFileStore {
    fn load(&self) -> StoreResult<Vec<TrackedRegion>> {
        if !self.path.exists() {
            debug!(path = %self.path.display(), "No region store yet, starting empty");
            return Ok(Vec::new());
        }
        let content = std::fs::read_to_string(&self.path).map_err(|source| StoreError::ReadError {
            path: self.path.clone(),
            source,
        })?;
        serde_json::from_str(&content).map_err(|source| StoreError::ParseError {
            path: self.path.clone(),
            source,
        })
    }

    fn save(&mut self, regions: &[TrackedRegion]) -> StoreResult<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(|source| StoreError::CreateDirError {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        let content = serde_json::to_string_pretty(regions)?;
        std::fs::write(&self.path, content).map_err(|source| StoreError::WriteError {
            path: self.path.clone(),
            source,
        })?;
        debug!(path = %self.path.display(), count = regions.len(), "Saved desired regions");
        Ok(())
    }
}

/// In-memory store.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    regions: Vec<TrackedRegion>,
}

impl MemoryStore {
    /// Creates a store pre-populated with `regions`.
    #[must_use]
    pub const fn with_regions(regions: Vec<TrackedRegion>) -> Self {
        Self { regions }
    }
}

impl RegionStore for MemoryStore {
    fn load(&self) -> StoreResult<Vec<TrackedRegion>> {
        Ok(self.regions.clone())
    }

    fn save(&mut self, regions: &[TrackedRegion]) -> StoreResult<()> {
        self.regions = regions.to_vec();
        Ok(())
    }
}

/// Default data directory.
///
/// On Linux: `/var/lib/beaconwatch/`
/// Elsewhere: the platform data dir (e.g. `~/Library/Application Support/beaconwatch`).
#[must_use]
pub fn default_data_dir() -> PathBuf {
    #[cfg(target_os = "linux")]
    {
        PathBuf::from("/var/lib/beaconwatch")
    }
    #[cfg(not(target_os = "linux"))]
    {
        directories::ProjectDirs::from("", "", "beaconwatch").map_or_else(
            || PathBuf::from("./data"),
            |dirs| dirs.data_dir().to_path_buf(),
        )
    }
}

/// Default location of the region store file.
#[must_use]
pub fn default_regions_path() -> PathBuf {
    default_data_dir().join("regions.json")
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use uuid::Uuid;

    fn region(major: u16, label: &str) -> TrackedRegion {
        TrackedRegion::new(Uuid::nil(), Some(major), None, label).unwrap()
    }

    #[test]
    fn test_missing_file_loads_empty() {
        let dir = TempDir::new().unwrap();
        let store = JsonFileStore::new(dir.path().join("regions.json"));
        assert!(store.load().unwrap().is_empty());
    }

    #[test]
    fn test_save_creates_parent_and_preserves_order() {
        let dir = TempDir::new().unwrap();
        let mut store = JsonFileStore::new(dir.path().join("a").join("b").join("regions.json"));
        let regions = vec![region(2, "Kitchen"), region(1, "Hall")];

        store.save(&regions).unwrap();
        let loaded = store.load().unwrap();

        assert_eq!(loaded.len(), 2);
        assert!(TrackedRegion::is_same(&loaded[0], &regions[0]));
        assert!(TrackedRegion::is_same(&loaded[1], &regions[1]));
    }

    #[test]
    fn test_file_holds_versioned_records() {
        let dir = TempDir::new().unwrap();
        let mut store = JsonFileStore::new(dir.path().join("regions.json"));
        store.save(&[region(1, "Hall")]).unwrap();

        let raw: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(store.path()).unwrap()).unwrap();
        assert_eq!(raw[0]["type"], "BeaconConfig");
        assert_eq!(raw[0]["version"], 1);
    }

    #[test]
    fn test_corrupt_file_is_parse_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("regions.json");
        std::fs::write(&path, "not json").unwrap();

        let err = JsonFileStore::new(&path).load().unwrap_err();
        assert!(matches!(err, StoreError::ParseError { .. }));
    }

    #[test]
    fn test_memory_store() {
        let mut store = MemoryStore::default();
        assert!(store.load().unwrap().is_empty());
        store.save(&[region(1, "Hall")]).unwrap();
        assert_eq!(store.load().unwrap().len(), 1);
    }
}

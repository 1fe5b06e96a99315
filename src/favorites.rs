use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use thiserror::Error;
use tracing::{debug, instrument, warn};

use crate::models::StationRecord;

/// Storage key the favorite records are filed under.
pub const FAVORITES_KEY: &str = "favoriteRivers";
pub const FAVORITES_FILE: &str = "favorites.json";

#[derive(Error, Debug)]
pub enum FavoritesError {
    #[error("Favorites I/O error at {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Favorites serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Favorites store lock poisoned")]
    Poisoned,

    #[error("Favorites save task failed: {0}")]
    Task(String),
}

/// Local cache of favorite-flagged station records.
///
/// `load` never fails: a missing, unreadable or outdated blob reads as no favorites.
pub trait FavoritesStore: Send + Sync {
    fn save(&self, records: &[StationRecord]) -> Result<(), FavoritesError>;
    fn load(&self) -> Vec<StationRecord>;
}

/// JSON file holding `{ "favoriteRivers": [...] }`.
#[derive(Debug, Clone)]
pub struct JsonFileFavoritesStore {
    path: PathBuf,
}

impl JsonFileFavoritesStore {
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self {
            path: dir.as_ref().join(FAVORITES_FILE),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn io_error(&self, source: std::io::Error) -> FavoritesError {
        FavoritesError::Io {
            path: self.path.display().to_string(),
            source,
        }
    }
}

impl FavoritesStore for JsonFileFavoritesStore {
    #[instrument(skip(self, records), fields(path = %self.path.display(), count = records.len()))]
    fn save(&self, records: &[StationRecord]) -> Result<(), FavoritesError> {
        let mut blob = HashMap::new();
        blob.insert(FAVORITES_KEY, records);
        let json = serde_json::to_vec_pretty(&blob)?;

        if let Some(dir) = self.path.parent() {
            fs::create_dir_all(dir).map_err(|e| self.io_error(e))?;
        }
        // Written beside the target, then renamed over it.
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, json).map_err(|e| self.io_error(e))?;
        fs::rename(&tmp, &self.path).map_err(|e| self.io_error(e))?;
        debug!("Saved {} favorites", records.len());
        Ok(())
    }

    #[instrument(skip(self), fields(path = %self.path.display()))]
    fn load(&self) -> Vec<StationRecord> {
        let bytes = match fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Vec::new(),
            Err(e) => {
                warn!("Could not read favorites: {}", e);
                return Vec::new();
            }
        };

        match serde_json::from_slice::<HashMap<String, Vec<StationRecord>>>(&bytes) {
            Ok(mut blob) => blob.remove(FAVORITES_KEY).unwrap_or_default(),
            Err(e) => {
                warn!("Discarding unreadable favorites: {}", e);
                Vec::new()
            }
        }
    }
}

/// Process-local store for tests and for running without a favorites directory.
#[derive(Debug, Default)]
pub struct InMemoryFavoritesStore {
    records: Mutex<Vec<StationRecord>>,
}

impl InMemoryFavoritesStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_records(records: Vec<StationRecord>) -> Self {
        Self {
            records: Mutex::new(records),
        }
    }
}

impl FavoritesStore for InMemoryFavoritesStore {
    fn save(&self, records: &[StationRecord]) -> Result<(), FavoritesError> {
        let mut stored = self.records.lock().map_err(|_| FavoritesError::Poisoned)?;
        *stored = records.to_vec();
        Ok(())
    }

    fn load(&self) -> Vec<StationRecord> {
        self.records.lock().map(|r| r.clone()).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Agency;
    use tempfile::TempDir;

    fn favorite(site: &str) -> StationRecord {
        let mut record = StationRecord::new(Agency::Usgs, format!("USGS {site}"), "COLORADO RIVER NEAR KREMMLING, CO");
        record.is_favorite = true;
        record
    }

    #[test]
    fn test_file_store_round_trip() {
        let dir = TempDir::new().unwrap();
        let store = JsonFileFavoritesStore::new(dir.path());

        assert!(store.load().is_empty());
        store.save(&[favorite("09058000"), favorite("07087050")]).unwrap();

        let loaded = store.load();
        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded[0].site_number, "USGS 09058000");
        assert!(loaded.iter().all(|r| r.is_favorite));
    }

    #[test]
    fn test_file_store_uses_fixed_key() {
        let dir = TempDir::new().unwrap();
        let store = JsonFileFavoritesStore::new(dir.path());
        store.save(&[favorite("09058000")]).unwrap();

        let raw: serde_json::Value = serde_json::from_str(&fs::read_to_string(store.path()).unwrap()).unwrap();
        assert!(raw[FAVORITES_KEY].is_array());
    }

    #[test]
    fn test_corrupt_file_loads_as_empty() {
        let dir = TempDir::new().unwrap();
        let store = JsonFileFavoritesStore::new(dir.path());
        fs::write(store.path(), b"{\"favoriteRivers\": [{\"legacy\": true}]}").unwrap();
        assert!(store.load().is_empty());

        fs::write(store.path(), b"not json at all").unwrap();
        assert!(store.load().is_empty());
    }

    #[test]
    fn test_save_creates_missing_directory() {
        let dir = TempDir::new().unwrap();
        let store = JsonFileFavoritesStore::new(dir.path().join("nested").join("state"));
        store.save(&[favorite("09058000")]).unwrap();
        assert_eq!(store.load().len(), 1);
    }

    #[test]
    fn test_in_memory_store_replaces_contents() {
        let store = InMemoryFavoritesStore::with_records(vec![favorite("1")]);
        store.save(&[favorite("2"), favorite("3")]).unwrap();
        let sites: Vec<String> = store.load().into_iter().map(|r| r.site_number).collect();
        assert_eq!(sites, vec!["USGS 2", "USGS 3"]);
    }
}

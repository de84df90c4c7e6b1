// # File Tracking Store
//
// File-based implementation of TrackingStore with crash recovery.
//
// ## Purpose
//
// Keeps trackings and their last known snapshots across daemon restarts,
// so a restart does not re-announce every known event.
//
// ## Crash Recovery
//
// - Atomic writes: write-then-rename
// - Corruption detection: JSON validated on load
// - Backup: `.backup` holds the previous good file
// - Recovery: falls back to the backup if the main file is corrupted
//
// ## File Format
//
// ```json
// {
//   "version": "1.0",
//   "next_id": 2,
//   "trackings": [
//     {
//       "id": 1,
//       "user_id": 42,
//       "tracking_number": "TRACK123",
//       "display_name": "shoes",
//       "tracking_infos": [],
//       "last_polled_at": null
//     }
//   ]
// }
// ```

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::RwLock;

use super::TrackingTable;
use crate::Error;
use crate::config::StoreConfig;
use crate::model::Tracking;
use crate::traits::tracking_store::{TrackingStore, TrackingStoreFactory};

/// Store file format version
const STORE_FILE_VERSION: &str = "1.0";

/// File-based tracking store with crash recovery
///
/// Every write is one transaction: the table is mutated and the file
/// rewritten while the write lock is held, so concurrent writers never
/// interleave and readers never observe a row that is not on disk.
///
/// # Example
///
/// ```rust,no_run
/// use parcels_core::model::Tracking;
/// use parcels_core::state::FileTrackingStore;
/// use parcels_core::traits::TrackingStore;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let store = FileTrackingStore::new("/var/lib/parcels/trackings.json").await?;
///
///     // Atomically written to disk
///     store.save(&Tracking::new(42, "TRACK123", None)).await?;
///
///     Ok(())
/// }
/// ```
#[derive(Debug)]
pub struct FileTrackingStore {
    path: PathBuf,
    table: RwLock<TrackingTable>,
}

/// Serializable store file format
#[derive(Debug, serde::Serialize, serde::Deserialize)]
struct StoreFileFormat {
    version: String,
    #[serde(default)]
    next_id: i64,
    #[serde(default)]
    trackings: Vec<Tracking>,
}

impl FileTrackingStore {
    /// Create or load a file tracking store
    ///
    /// This will:
    /// 1. Try to load the existing store file
    /// 2. If corruption is detected, try to load from backup
    /// 3. If both fail, start empty
    /// 4. Create parent directories if needed
    pub async fn new<P: AsRef<Path>>(path: P) -> Result<Self, Error> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
            && !parent.exists()
        {
            fs::create_dir_all(parent).await.map_err(|e| {
                Error::config(format!(
                    "Failed to create store directory {}: {}",
                    parent.display(),
                    e
                ))
            })?;
        }

        let table = Self::load_with_recovery(&path).await?;

        Ok(Self {
            path,
            table: RwLock::new(table),
        })
    }

    /// Load the table with automatic recovery
    ///
    /// Recovery strategy:
    /// 1. Try the main file
    /// 2. If it does not parse, try the backup (and restore it)
    /// 3. If the backup is missing or also broken, start empty
    async fn load_with_recovery(path: &Path) -> Result<TrackingTable, Error> {
        let err = match Self::load(path).await {
            Ok(table) => {
                tracing::debug!("Loaded {} tracking(s) from {}", table.len(), path.display());
                return Ok(table);
            }
            Err(e @ Error::Json(_)) => e,
            Err(e) => return Err(e),
        };

        tracing::warn!("Store file appears corrupted: {}. Attempting recovery from backup.", err);

        let backup_path = Self::backup_path(path);
        if !backup_path.exists() {
            tracing::warn!("No backup file found. Starting with an empty store.");
            return Ok(TrackingTable::default());
        }

        match Self::load(&backup_path).await {
            Ok(table) => {
                tracing::info!("Recovered {} tracking(s) from backup", table.len());
                if let Err(restore_err) = fs::copy(&backup_path, path).await {
                    tracing::error!("Failed to restore store file from backup: {}", restore_err);
                }
                Ok(table)
            }
            Err(backup_err) => {
                tracing::error!(
                    "Backup also corrupted: {}. Starting with an empty store.",
                    backup_err
                );
                Ok(TrackingTable::default())
            }
        }
    }

    /// Load the table from a file
    async fn load(path: &Path) -> Result<TrackingTable, Error> {
        if !path.exists() {
            tracing::debug!("Store file does not exist: {}", path.display());
            return Ok(TrackingTable::default());
        }

        let content = fs::read_to_string(path)
            .await
            .inspect_err(|e| tracing::error!("Failed to read store file {}: {}", path.display(), e))?;

        let file: StoreFileFormat = serde_json::from_str(&content)?;

        if file.version != STORE_FILE_VERSION {
            tracing::warn!(
                "Store file version mismatch: expected {}, got {}. Attempting to load anyway.",
                STORE_FILE_VERSION,
                file.version
            );
        }

        Ok(TrackingTable::from_rows(file.next_id, file.trackings))
    }

    /// Write the table to disk atomically
    ///
    /// Callers hold the write lock.
    async fn write(&self, table: &TrackingTable) -> Result<(), Error> {
        let file = StoreFileFormat {
            version: STORE_FILE_VERSION.to_string(),
            next_id: table.next_id(),
            trackings: table.rows().cloned().collect(),
        };

        let json = serde_json::to_string_pretty(&file)
            .map_err(|e| Error::store(format!("Failed to serialize trackings: {}", e)))?;

        let temp_path = self.temp_path();
        {
            let mut temp = fs::File::create(&temp_path).await.map_err(|e| {
                Error::store(format!("Failed to create temp file {}: {}", temp_path.display(), e))
            })?;

            temp.write_all(json.as_bytes()).await.map_err(|e| {
                Error::store(format!("Failed to write temp file {}: {}", temp_path.display(), e))
            })?;

            temp.flush().await.map_err(|e| {
                Error::store(format!("Failed to flush temp file {}: {}", temp_path.display(), e))
            })?;
        }

        if self.path.exists()
            && let Err(e) = fs::copy(&self.path, Self::backup_path(&self.path)).await
        {
            tracing::warn!("Failed to create backup: {}", e);
        }

        fs::rename(&temp_path, &self.path).await.map_err(|e| {
            Error::store(format!(
                "Failed to rename {} to {}: {}",
                temp_path.display(),
                self.path.display(),
                e
            ))
        })?;

        tracing::trace!("Trackings written to {}", self.path.display());
        Ok(())
    }

    /// Get path to temporary file for atomic writes
    fn temp_path(&self) -> PathBuf {
        let mut temp = self.path.clone();
        temp.set_extension("tmp");
        temp
    }

    /// Get path to backup file
    fn backup_path(path: &Path) -> PathBuf {
        let mut backup = path.to_path_buf();
        backup.set_extension("backup");
        backup
    }
}

#[async_trait]
impl TrackingStore for FileTrackingStore {
    async fn save(&self, tracking: &Tracking) -> Result<Tracking, Error> {
        let mut table = self.table.write().await;

        // Mutate a copy so a failed write leaves memory and disk in agreement
        let mut next = table.clone();
        let saved = next.upsert(tracking)?;
        self.write(&next).await?;
        *table = next;

        Ok(saved)
    }

    async fn get(&self, user_id: i64, tracking_number: &str) -> Result<Option<Tracking>, Error> {
        let table = self.table.read().await;
        Ok(table.get(user_id, tracking_number).cloned())
    }

    async fn list_by_user(&self, user_id: i64) -> Result<Vec<Tracking>, Error> {
        let table = self.table.read().await;
        Ok(table.by_user(user_id))
    }

    async fn list_due_for_poll(&self, cutoff: DateTime<Utc>) -> Result<Vec<Tracking>, Error> {
        let table = self.table.read().await;
        Ok(table.due(cutoff))
    }

    async fn delete(&self, user_id: i64, tracking_number: &str) -> Result<(), Error> {
        let mut table = self.table.write().await;

        let mut next = table.clone();
        if !next.remove(user_id, tracking_number) {
            return Ok(());
        }
        self.write(&next).await?;
        *table = next;

        Ok(())
    }

    async fn flush(&self) -> Result<(), Error> {
        // Every write already hit the disk
        Ok(())
    }
}

/// Factory for [`FileTrackingStore`]
pub struct FileTrackingStoreFactory;

#[async_trait]
impl TrackingStoreFactory for FileTrackingStoreFactory {
    async fn create(&self, config: &StoreConfig) -> Result<Box<dyn TrackingStore>, Error> {
        match config {
            StoreConfig::File { path } => Ok(Box::new(FileTrackingStore::new(path).await?)),
            _ => Err(Error::config("Invalid config for file tracking store")),
        }
    }
}

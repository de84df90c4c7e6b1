// # Tracking Store Implementations
//
// This module provides implementations of the TrackingStore trait for
// different persistence strategies. Both share `TrackingTable`, which
// holds the upsert rules.

pub mod file;
pub mod memory;

pub use file::{FileTrackingStore, FileTrackingStoreFactory};
pub use memory::{MemoryTrackingStore, MemoryTrackingStoreFactory};

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Utc};

use crate::error::{Error, Result};
use crate::model::{Tracking, TrackingKey};

/// In-memory table of trackings, keyed by id with a unique index on
/// `(user_id, tracking_number)`
#[derive(Debug, Clone, Default)]
pub(crate) struct TrackingTable {
    next_id: i64,
    rows: BTreeMap<i64, Tracking>,
    index: HashMap<TrackingKey, i64>,
}

impl TrackingTable {
    /// Rebuild a table from persisted rows
    ///
    /// Rows with a duplicate key keep the lowest id.
    pub(crate) fn from_rows(next_id: i64, rows: Vec<Tracking>) -> Self {
        let mut table = Self::default();
        for row in rows {
            let key = row.key();
            if table.index.contains_key(&key) {
                tracing::warn!(tracking_id = row.id, %key, "Dropping duplicate tracking row");
                continue;
            }
            table.next_id = table.next_id.max(row.id);
            table.index.insert(key, row.id);
            table.rows.insert(row.id, row);
        }
        table.next_id = table.next_id.max(next_id);
        table
    }

    pub(crate) fn next_id(&self) -> i64 {
        self.next_id
    }

    pub(crate) fn rows(&self) -> impl Iterator<Item = &Tracking> {
        self.rows.values()
    }

    pub(crate) fn len(&self) -> usize {
        self.rows.len()
    }

    /// Apply one save
    ///
    /// A tracking with an assigned id only ever updates the row it was read
    /// from; it is never inserted again once that row is deleted.
    pub(crate) fn upsert(&mut self, tracking: &Tracking) -> Result<Tracking> {
        let key = tracking.key();

        match self.index.get(&key).copied() {
            Some(id) if tracking.id == 0 || tracking.id == id => {
                let row = self
                    .rows
                    .get_mut(&id)
                    .ok_or_else(|| Error::store(format!("Index points at missing row {id}")))?;
                row.display_name = tracking.display_name.clone();
                if tracking.id != 0 {
                    row.tracking_infos = tracking.tracking_infos.clone();
                    row.last_polled_at = tracking.last_polled_at;
                }
                Ok(row.clone())
            }
            None if tracking.id == 0 => {
                self.next_id += 1;
                let mut row = tracking.clone();
                row.id = self.next_id;
                self.index.insert(key, row.id);
                self.rows.insert(row.id, row.clone());
                Ok(row)
            }
            _ => Err(Error::tracking_not_found(key.user_id, key.tracking_number)),
        }
    }

    pub(crate) fn get(&self, user_id: i64, tracking_number: &str) -> Option<&Tracking> {
        self.index
            .get(&TrackingKey::new(user_id, tracking_number))
            .and_then(|id| self.rows.get(id))
    }

    pub(crate) fn by_user(&self, user_id: i64) -> Vec<Tracking> {
        self.rows
            .values()
            .filter(|t| t.user_id == user_id)
            .cloned()
            .collect()
    }

    pub(crate) fn due(&self, cutoff: DateTime<Utc>) -> Vec<Tracking> {
        self.rows
            .values()
            .filter(|t| t.is_due(cutoff))
            .cloned()
            .collect()
    }

    pub(crate) fn remove(&mut self, user_id: i64, tracking_number: &str) -> bool {
        match self.index.remove(&TrackingKey::new(user_id, tracking_number)) {
            Some(id) => self.rows.remove(&id).is_some(),
            None => false,
        }
    }
}

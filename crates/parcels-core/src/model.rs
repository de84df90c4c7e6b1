// # Tracking Data Model
//
// A `Tracking` is one user's subscription to one tracking number. Its
// snapshot is the ordered list of `TrackingInfo` blocks last reported by
// the provider, one block per carrier that has seen the parcel.
//
// ## Wire Format
//
// Provider responses are a JSON array of info blocks:
//
// ```json
// [
//   {
//     "apiName": "cainiao",
//     "events": [
//       { "time": "2024-03-01T08:00:00Z", "status": "accepted", "description": "Parcel accepted" }
//     ]
//   }
// ]
// ```
//
// PascalCase keys (`ApiName`, `Events`, ...) are accepted as well.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::FetchError;

/// One status entry in a provider's timeline
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackingEvent {
    /// When the provider recorded the status
    #[serde(alias = "Time")]
    pub time: DateTime<Utc>,
    /// Status code or label
    #[serde(alias = "Status")]
    pub status: String,
    /// Human-readable description (not part of the event identity)
    #[serde(default, alias = "Description")]
    pub description: String,
}

impl TrackingEvent {
    /// Create a new tracking event
    pub fn new(
        time: DateTime<Utc>,
        status: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            time,
            status: status.into(),
            description: description.into(),
        }
    }

    /// Two events are the same event iff status and time match exactly
    pub fn same_event(&self, other: &TrackingEvent) -> bool {
        self.status == other.status && self.time == other.time
    }
}

/// One provider's view of a parcel's journey
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackingInfo {
    /// Provider/source identifier; blocks are matched across fetches by this alone
    #[serde(alias = "ApiName")]
    pub api_name: String,
    /// Timeline in provider order
    #[serde(default, alias = "Events")]
    pub events: Vec<TrackingEvent>,
}

impl TrackingInfo {
    /// Create a new info block
    pub fn new(api_name: impl Into<String>, events: Vec<TrackingEvent>) -> Self {
        Self {
            api_name: api_name.into(),
            events,
        }
    }
}

/// Unique identity of a tracking: one number per user
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TrackingKey {
    /// Owner
    pub user_id: i64,
    /// External tracking number
    pub tracking_number: String,
}

impl TrackingKey {
    /// Create a new key
    pub fn new(user_id: i64, tracking_number: impl Into<String>) -> Self {
        Self {
            user_id,
            tracking_number: tracking_number.into(),
        }
    }
}

impl std::fmt::Display for TrackingKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.user_id, self.tracking_number)
    }
}

/// One user's subscription to one tracking number
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tracking {
    /// Store-assigned id; `0` until the first save
    pub id: i64,
    /// Owner
    pub user_id: i64,
    /// External tracking number (opaque)
    pub tracking_number: String,
    /// Optional name the user gave the parcel
    #[serde(default)]
    pub display_name: Option<String>,
    /// Last known snapshot
    #[serde(default)]
    pub tracking_infos: Vec<TrackingInfo>,
    /// When the snapshot last changed
    #[serde(default)]
    pub last_polled_at: Option<DateTime<Utc>>,
}

impl Tracking {
    /// Create a fresh, unsaved tracking with an empty snapshot
    pub fn new(user_id: i64, tracking_number: impl Into<String>, display_name: Option<String>) -> Self {
        Self {
            id: 0,
            user_id,
            tracking_number: tracking_number.into(),
            display_name,
            tracking_infos: Vec::new(),
            last_polled_at: None,
        }
    }

    /// Identity of this tracking
    pub fn key(&self) -> TrackingKey {
        TrackingKey::new(self.user_id, self.tracking_number.clone())
    }

    /// Whether the tracking should be re-polled given the cutoff
    ///
    /// Never-polled trackings are always due.
    pub fn is_due(&self, cutoff: DateTime<Utc>) -> bool {
        match self.last_polled_at {
            None => true,
            Some(polled) => polled < cutoff,
        }
    }
}

/// Output of one reconciliation, handed to the notification consumer
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TrackingUpdate {
    /// Tracking number the update is about
    pub tracking_number: String,
    /// Owner to notify
    pub user_id: i64,
    /// Display name at the time of the update
    pub display_name: Option<String>,
    /// Provider blocks not previously seen
    pub new_tracking_infos: Vec<TrackingInfo>,
    /// New events within previously seen providers, in fetched order
    pub new_tracking_events: Vec<TrackingEvent>,
    /// Set when the fetch failed on a user-initiated track request
    pub error: Option<FetchError>,
}

impl TrackingUpdate {
    /// An update carrying only identity fields and the fetch error
    pub fn failed(tracking: &Tracking, error: FetchError) -> Self {
        Self {
            tracking_number: tracking.tracking_number.clone(),
            user_id: tracking.user_id,
            display_name: tracking.display_name.clone(),
            error: Some(error),
            ..Default::default()
        }
    }

    /// Whether there is new tracking information to tell the user
    pub fn has_news(&self) -> bool {
        !self.new_tracking_infos.is_empty() || !self.new_tracking_events.is_empty()
    }

    /// Whether this update reports a failed fetch
    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }
}

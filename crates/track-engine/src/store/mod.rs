// Copyright 2025 Chris Custine
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Track state store.
//!
//! Holds the last authoritative report for every tracked aircraft. Each batch
//! replaces the whole population: ids missing from the newest batch are gone.
//! The live set is an immutable map behind an `Arc`, swapped under a lock, so
//! readers always see either the previous or the new population in full.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use chrono::{DateTime, Utc};
use tokio::time::Instant;

use crate::protocol::Track;

/// A track paired with the moment it was ingested.
#[derive(Debug, Clone)]
pub struct BaseState {
    /// The reported track, shared between snapshots.
    pub track: Arc<Track>,
    /// Monotonic ingestion time used for extrapolation.
    pub received_at: Instant,
    /// Wall-clock ingestion time.
    pub received_wall: DateTime<Utc>,
}

/// Immutable view of the live set at one point in time.
pub type Snapshot = Arc<HashMap<String, BaseState>>;

/// Result of applying one batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchSummary {
    /// Number of tracks in the store after the swap.
    pub tracks: usize,
    /// Ids that were not present before.
    pub added: usize,
    /// Ids dropped because the batch omitted them.
    pub removed: usize,
}

/// Store of the latest state per aircraft.
#[derive(Debug, Default)]
pub struct TrackStore {
    live: RwLock<Snapshot>,
}

impl TrackStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the live set with `tracks`, stamped with the current time.
    pub fn apply_batch(&self, tracks: Vec<Track>) -> BatchSummary {
        self.apply_batch_at(tracks, Instant::now(), Utc::now())
    }

    /// Replace the live set with `tracks`, stamped with the given times.
    ///
    /// When a batch repeats an id the last occurrence wins.
    pub fn apply_batch_at(
        &self,
        tracks: Vec<Track>,
        received_at: Instant,
        received_wall: DateTime<Utc>,
    ) -> BatchSummary {
        let mut next = HashMap::with_capacity(tracks.len());
        for track in tracks {
            next.insert(
                track.id.clone(),
                BaseState {
                    track: Arc::new(track),
                    received_at,
                    received_wall,
                },
            );
        }
        let next = Arc::new(next);

        // Only the pointer swap happens under the write lock.
        let previous = {
            let mut live = self.live.write().unwrap_or_else(PoisonError::into_inner);
            std::mem::replace(&mut *live, Arc::clone(&next))
        };

        let added = next.keys().filter(|id| !previous.contains_key(*id)).count();
        let removed = previous.keys().filter(|id| !next.contains_key(*id)).count();

        BatchSummary {
            tracks: next.len(),
            added,
            removed,
        }
    }

    /// Get the state of a single aircraft.
    #[must_use]
    pub fn get(&self, id: &str) -> Option<BaseState> {
        self.all().get(id).cloned()
    }

    /// Get a consistent snapshot of every tracked aircraft.
    #[must_use]
    pub fn all(&self) -> Snapshot {
        Arc::clone(&self.live.read().unwrap_or_else(PoisonError::into_inner))
    }

    /// Get the number of tracked aircraft.
    #[must_use]
    pub fn len(&self) -> usize {
        self.all().len()
    }

    /// Check if there are no tracked aircraft.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.all().is_empty()
    }
}

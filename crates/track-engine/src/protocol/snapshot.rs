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

//! JSON snapshot parser.
//!
//! Message format:
//! ```text
//! {"type": "update", "data": [{"id": "a1b2c3", "latitude": 34.0, "longitude": -118.5, ...}]}
//! ```
//!
//! A frame whose envelope is wrong is rejected as a whole. Inside a valid
//! envelope, entries that do not decode to a usable [`Track`] are skipped so a
//! single bad report cannot take the rest of the batch down with it.

use log::warn;
use serde::Deserialize;
use serde_json::Value;

use super::{ParseError, Protocol, Track};

#[derive(Debug, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "lowercase")]
enum Envelope {
    Update(Vec<Value>),
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum BulkBody {
    List(Vec<Value>),
    Envelope(Envelope),
}

/// Parser for push feed frames.
#[derive(Debug, Default)]
pub struct SnapshotParser {
    skipped_entries: u64,
}

impl SnapshotParser {
    /// Create a new snapshot parser.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Total number of individual entries dropped from otherwise valid frames.
    #[must_use]
    pub fn skipped_entries(&self) -> u64 {
        self.skipped_entries
    }
}

impl Protocol for SnapshotParser {
    type Message = Vec<Track>;
    type Error = ParseError;

    fn parse(&mut self, input: &[u8]) -> Result<Option<Vec<Track>>, ParseError> {
        let text = std::str::from_utf8(input)
            .map_err(|e| ParseError::InvalidFormat(format!("invalid UTF-8: {e}")))?;

        if text.trim().is_empty() {
            return Ok(None);
        }

        let Envelope::Update(entries) = serde_json::from_str::<Envelope>(text)?;
        let (tracks, skipped) = decode_entries(entries);
        self.skipped_entries += skipped;

        Ok(Some(tracks))
    }
}

/// Decoded body of a bulk fetch.
#[derive(Debug, Clone, Default)]
pub struct BulkSnapshot {
    pub tracks: Vec<Track>,
    /// Entries dropped because they did not decode to a usable track.
    pub skipped_entries: u64,
}

/// Parse the body of a bulk fetch.
///
/// Accepts a bare array of tracks or the push feed envelope.
pub fn parse_bulk(body: &[u8]) -> Result<BulkSnapshot, ParseError> {
    let entries = match serde_json::from_slice::<BulkBody>(body)? {
        BulkBody::List(entries) | BulkBody::Envelope(Envelope::Update(entries)) => entries,
    };

    let (tracks, skipped_entries) = decode_entries(entries);
    Ok(BulkSnapshot {
        tracks,
        skipped_entries,
    })
}

fn decode_entries(entries: Vec<Value>) -> (Vec<Track>, u64) {
    let mut tracks = Vec::with_capacity(entries.len());
    let mut skipped = 0;

    for entry in entries {
        match serde_json::from_value::<Track>(entry) {
            Ok(track) if track.is_valid() => tracks.push(track),
            Ok(track) => {
                skipped += 1;
                warn!(
                    "Dropping track '{}' with unusable position ({}, {})",
                    track.id, track.latitude, track.longitude
                );
            }
            Err(e) => {
                skipped += 1;
                warn!("Dropping malformed track entry: {}", e);
            }
        }
    }

    (tracks, skipped)
}

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

//! Protocol layer for snapshot feed messages.
//!
//! The feed delivers complete populations, never deltas. A push frame is a JSON
//! object `{"type": "update", "data": [Track, ...]}`; the bulk endpoint returns
//! either a bare array of tracks or the same envelope.

mod snapshot;

pub use snapshot::{parse_bulk, BulkSnapshot, SnapshotParser};

use serde::{Deserialize, Deserializer, Serialize};
use thiserror::Error;

/// Errors that can occur during message parsing.
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("invalid message format: {0}")]
    InvalidFormat(String),

    #[error("malformed JSON message: {0}")]
    Json(#[from] serde_json::Error),
}

/// One tracked aircraft as reported by the feed.
///
/// A track is always replaced wholesale when a newer snapshot arrives, so
/// every optional field reflects only the most recent report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Track {
    /// Stable unique identifier (typically the ICAO 24-bit address).
    pub id: String,
    /// Latitude in degrees.
    pub latitude: f64,
    /// Longitude in degrees.
    pub longitude: f64,
    /// Altitude in meters.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub altitude: Option<f64>,
    /// Ground speed in meters per second.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub velocity: Option<f64>,
    /// Track angle in degrees clockwise from north.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub heading: Option<f64>,
    /// Vertical rate in meters per second.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vertical_rate: Option<f64>,
    /// Emitter category. Some feeds send a numeric code, others a label.
    #[serde(
        default,
        deserialize_with = "string_or_number",
        skip_serializing_if = "Option::is_none"
    )]
    pub category: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub origin_country: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub callsign: Option<String>,
    /// Whether the aircraft reports being on the ground.
    #[serde(default, deserialize_with = "null_as_false")]
    pub on_ground: bool,
}

impl Track {
    /// Create an airborne track with only a position set.
    #[must_use]
    pub fn new(id: impl Into<String>, latitude: f64, longitude: f64) -> Self {
        Self {
            id: id.into(),
            latitude,
            longitude,
            altitude: None,
            velocity: None,
            heading: None,
            vertical_rate: None,
            category: None,
            origin_country: None,
            callsign: None,
            on_ground: false,
        }
    }

    /// Check that the track has an id and a usable position.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        !self.id.trim().is_empty()
            && self.latitude.is_finite()
            && self.longitude.is_finite()
            && (-90.0..=90.0).contains(&self.latitude)
            && (-180.0..=180.0).contains(&self.longitude)
    }

    /// Altitude used for ranking; unknown altitude ranks as sea level.
    #[must_use]
    pub fn rank_altitude(&self) -> f64 {
        self.altitude.filter(|a| a.is_finite()).unwrap_or(0.0)
    }
}

fn string_or_number<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Text(String),
        Number(serde_json::Number),
    }

    Ok(Option::<Raw>::deserialize(deserializer)?.map(|raw| match raw {
        Raw::Text(s) => s,
        Raw::Number(n) => n.to_string(),
    }))
}

fn null_as_false<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<bool>::deserialize(deserializer)?.unwrap_or(false))
}

/// Trait for feed parsers.
///
/// Implement this trait to add support for other snapshot encodings.
pub trait Protocol {
    /// The message type produced by this parser.
    type Message;
    /// The error type for parsing failures.
    type Error;

    /// Parse input bytes into a message.
    ///
    /// Returns `Ok(Some(message))` if parsing succeeded,
    /// `Ok(None)` if the input is valid but doesn't produce a message,
    /// or `Err(error)` if parsing failed.
    fn parse(&mut self, input: &[u8]) -> Result<Option<Self::Message>, Self::Error>;
}

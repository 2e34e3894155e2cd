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

//! Console output for the visible aircraft set.

use chrono::{DateTime, Utc};
use serde::Serialize;
use track_engine::{ConnectionState, EngineStatus, VisibleTrack};

/// How visible sets are written to stdout
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputMode {
    /// Periodic one-line summary plus the top aircraft
    Summary,
    /// One JSON object per aircraft per report
    JsonLines,
}

/// One aircraft as emitted in JSON lines mode
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VisibleRecord<'a> {
    pub timestamp: DateTime<Utc>,
    pub rank: usize,
    pub id: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub callsign: Option<&'a str>,
    pub latitude: f64,
    pub longitude: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub altitude: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub velocity: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub heading: Option<f64>,
    pub on_ground: bool,
}

impl<'a> VisibleRecord<'a> {
    pub fn new(timestamp: DateTime<Utc>, rank: usize, visible: &'a VisibleTrack) -> Self {
        let track = &visible.track;
        Self {
            timestamp,
            rank,
            id: &visible.id,
            callsign: track.callsign.as_deref().map(str::trim),
            latitude: visible.position.lat,
            longitude: visible.position.lon,
            altitude: track.altitude,
            velocity: track.velocity,
            heading: track.heading,
            on_ground: track.on_ground,
        }
    }
}

/// Renders visible sets and engine status as text
#[derive(Debug, Clone)]
pub struct ConsoleRenderer {
    mode: OutputMode,
    top: usize,
}

impl ConsoleRenderer {
    pub fn new(mode: OutputMode, top: usize) -> Self {
        Self { mode, top }
    }

    /// Format a visible set as output lines
    pub fn render(&self, visible: &[VisibleTrack], now: DateTime<Utc>) -> Vec<String> {
        match self.mode {
            OutputMode::JsonLines => visible
                .iter()
                .enumerate()
                .filter_map(|(rank, v)| serde_json::to_string(&VisibleRecord::new(now, rank, v)).ok())
                .collect(),
            OutputMode::Summary => {
                let mut lines = Vec::with_capacity(self.top.min(visible.len()) + 1);
                lines.push(format!(
                    "{} visible aircraft at {}",
                    visible.len(),
                    now.format("%H:%M:%S")
                ));
                lines.extend(visible.iter().take(self.top).map(format_row));
                lines
            }
        }
    }

    /// One line describing connection health and counters
    pub fn status_line(status: &EngineStatus, now: DateTime<Utc>) -> String {
        let connection = match status.connection {
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
            ConnectionState::Disconnected => "disconnected",
        };
        let last_batch = status.last_batch_at.map_or_else(
            || "never".to_string(),
            |at| format!("{}s ago", (now - at).num_seconds().max(0)),
        );
        format!(
            "feed {connection} | tracks {} | visible {} | ticks {} | last batch {last_batch} | push {} poll {} | malformed {} skipped {} | connect failures {}",
            status.tracks,
            status.visible,
            status.ticks,
            status.transport.push_batches,
            status.transport.poll_batches,
            status.transport.malformed_frames,
            status.transport.skipped_entries,
            status.transport.connect_failures,
        )
    }
}

fn format_row(visible: &VisibleTrack) -> String {
    let track = &visible.track;
    let callsign = track.callsign.as_deref().map_or("", str::trim);
    let altitude = if track.on_ground {
        "GND".to_string()
    } else {
        track
            .altitude
            .map_or_else(|| "-".to_string(), |alt| format!("{alt:.0}"))
    };
    let speed = track
        .velocity
        .map_or_else(|| "-".to_string(), |v| format!("{v:.0}"));
    let heading = track
        .heading
        .map_or_else(|| "-".to_string(), |h| format!("{h:03.0}"));

    format!(
        "  {:<8} {:<8} {:>9.4} {:>10.4} {:>7} {:>5} {:>4}",
        visible.id, callsign, visible.position.lat, visible.position.lon, altitude, speed, heading
    )
}

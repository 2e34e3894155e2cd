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

//! Application configuration management.
//!
//! Configuration is persisted in TOML format via confy. Every field has a
//! serde default so older or hand-edited files load without migration.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use track_engine::{EngineConfig, ExtrapolationConfig, TransportConfig, Viewport, ViewportConfig};

const APP_NAME: &str = "airtrack";
const CONFIG_NAME: &str = "config";

/// Default websocket feed address
pub const DEFAULT_FEED_URL: &str = "ws://localhost:8080/ws";

/// Default HTTP API base address
pub const DEFAULT_API_URL: &str = "http://localhost:8080";

/// Viewport bounds as stored in the config file
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq)]
pub struct ViewportBounds {
    pub south: f64,
    pub north: f64,
    pub west: f64,
    pub east: f64,
}

impl ViewportBounds {
    /// Parse "south,north,west,east" in degrees
    pub fn parse(value: &str) -> Result<Self, String> {
        let parts: Vec<f64> = value
            .split(',')
            .map(|p| {
                p.trim()
                    .parse::<f64>()
                    .map_err(|e| format!("invalid coordinate '{}': {e}", p.trim()))
            })
            .collect::<Result<_, _>>()?;

        let [south, north, west, east] = parts[..] else {
            return Err(format!(
                "expected 4 values (south,north,west,east), got {}",
                parts.len()
            ));
        };

        if !(-90.0..=90.0).contains(&south) || !(-90.0..=90.0).contains(&north) {
            return Err("latitudes must be within [-90, 90]".to_string());
        }
        if south > north {
            return Err("south must not be greater than north".to_string());
        }
        if !(-180.0..=180.0).contains(&west) || !(-180.0..=180.0).contains(&east) {
            return Err("longitudes must be within [-180, 180]".to_string());
        }

        Ok(Self {
            south,
            north,
            west,
            east,
        })
    }
}

impl From<ViewportBounds> for Viewport {
    fn from(b: ViewportBounds) -> Self {
        Viewport::new(b.south, b.north, b.west, b.east)
    }
}

/// Application configuration stored in TOML format
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct AppConfig {
    /// Configuration schema version
    #[serde(default = "default_config_version")]
    pub config_version: u32,

    /// Websocket URL of the snapshot push feed
    #[serde(default = "default_feed_url")]
    pub feed_url: String,

    /// Base URL of the HTTP API serving /entities
    #[serde(default = "default_api_url")]
    pub api_url: String,

    /// Extrapolation tick interval in milliseconds
    #[serde(default = "default_tick_interval_ms")]
    pub tick_interval_ms: u64,

    /// Delay before reconnecting the push feed, in milliseconds
    #[serde(default = "default_reconnect_delay_ms")]
    pub reconnect_delay_ms: u64,

    /// Fallback poll interval in milliseconds
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Poll delay after a failed reconnect, in milliseconds
    #[serde(default = "default_retry_poll_interval_ms")]
    pub retry_poll_interval_ms: u64,

    /// Keep polling while the push feed is connected
    #[serde(default = "default_true")]
    pub poll_when_connected: bool,

    /// Minimum ground speed (m/s) for extrapolation
    #[serde(default = "default_min_speed_mps")]
    pub min_speed_mps: f64,

    /// Extrapolation horizon in seconds
    #[serde(default = "default_horizon_secs")]
    pub horizon_secs: u64,

    /// Degrees added on each side of the viewport before filtering
    #[serde(default = "default_buffer_degrees")]
    pub buffer_degrees: f64,

    /// Maximum number of aircraft in the visible set
    #[serde(default = "default_max_visible")]
    pub max_visible: usize,

    /// Viewport to start with (whole globe if absent)
    #[serde(default)]
    pub viewport: Option<ViewportBounds>,

    /// How often the console renderer prints a summary, in seconds
    #[serde(default = "default_report_interval_secs")]
    pub report_interval_secs: u64,
}

// Default value functions for serde
fn default_config_version() -> u32 {
    1
}

fn default_feed_url() -> String {
    DEFAULT_FEED_URL.to_string()
}

fn default_api_url() -> String {
    DEFAULT_API_URL.to_string()
}

fn default_tick_interval_ms() -> u64 {
    100
}

fn default_reconnect_delay_ms() -> u64 {
    5_000
}

fn default_poll_interval_ms() -> u64 {
    15_000
}

fn default_retry_poll_interval_ms() -> u64 {
    10_000
}

fn default_true() -> bool {
    true
}

fn default_min_speed_mps() -> f64 {
    10.0
}

fn default_horizon_secs() -> u64 {
    15
}

fn default_buffer_degrees() -> f64 {
    2.0
}

fn default_max_visible() -> usize {
    250
}

fn default_report_interval_secs() -> u64 {
    5
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            config_version: default_config_version(),
            feed_url: default_feed_url(),
            api_url: default_api_url(),
            tick_interval_ms: default_tick_interval_ms(),
            reconnect_delay_ms: default_reconnect_delay_ms(),
            poll_interval_ms: default_poll_interval_ms(),
            retry_poll_interval_ms: default_retry_poll_interval_ms(),
            poll_when_connected: true,
            min_speed_mps: default_min_speed_mps(),
            horizon_secs: default_horizon_secs(),
            buffer_degrees: default_buffer_degrees(),
            max_visible: default_max_visible(),
            viewport: None,
            report_interval_secs: default_report_interval_secs(),
        }
    }
}

impl AppConfig {
    /// Load configuration from disk, creating it with defaults if missing
    pub fn load() -> Result<Self, confy::ConfyError> {
        confy::load(APP_NAME, CONFIG_NAME)
    }

    /// Save configuration to disk
    pub fn save(&self) -> Result<(), confy::ConfyError> {
        confy::store(APP_NAME, CONFIG_NAME, self)
    }

    /// Get the config file path for display to user
    pub fn get_config_path() -> Result<std::path::PathBuf, confy::ConfyError> {
        confy::get_configuration_file_path(APP_NAME, CONFIG_NAME)
    }

    /// Build the engine configuration
    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            transport: TransportConfig {
                feed_url: self.feed_url.clone(),
                api_url: self.api_url.clone(),
                reconnect_delay: Duration::from_millis(self.reconnect_delay_ms),
                poll_interval: Duration::from_millis(self.poll_interval_ms),
                retry_poll_interval: Duration::from_millis(self.retry_poll_interval_ms),
                poll_when_connected: self.poll_when_connected,
                ..Default::default()
            },
            extrapolation: ExtrapolationConfig {
                min_speed_mps: self.min_speed_mps,
                horizon: Duration::from_secs(self.horizon_secs),
                ..Default::default()
            },
            viewport: ViewportConfig {
                buffer_degrees: self.buffer_degrees,
                max_visible: self.max_visible,
            },
            tick_interval: Duration::from_millis(self.tick_interval_ms.max(1)),
            initial_viewport: self.viewport.map(Viewport::from),
        }
    }
}

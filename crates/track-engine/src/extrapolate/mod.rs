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

//! Dead-reckoning extrapolation.
//!
//! Predicts where each aircraft is *now* from its last report, its ground speed
//! and its heading. Predictions are planar: one degree of latitude is a fixed
//! distance and a degree of longitude shrinks with `cos(latitude)`. Elapsed
//! time is capped at the extrapolation horizon so stale reports stop drifting.
//!
//! Slow, grounded or heading-less aircraft are held at their reported position.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;

use crate::protocol::Track;
use crate::store::{BaseState, Snapshot};

/// Meters per degree of latitude.
pub const METERS_PER_DEGREE_LAT: f64 = 111_320.0;

/// Configuration for the extrapolation engine.
#[derive(Debug, Clone)]
pub struct ExtrapolationConfig {
    /// Aircraft slower than this (m/s) are not extrapolated.
    pub min_speed_mps: f64,
    /// Maximum elapsed time that dead reckoning is trusted for.
    pub horizon: Duration,
    /// Meters per degree of latitude.
    pub meters_per_degree_lat: f64,
    /// Lower bound for `cos(latitude)` when scaling longitude near the poles.
    pub min_cos_lat: f64,
}

impl Default for ExtrapolationConfig {
    fn default() -> Self {
        Self {
            min_speed_mps: 10.0,
            horizon: Duration::from_secs(15),
            meters_per_degree_lat: METERS_PER_DEGREE_LAT,
            min_cos_lat: 0.01,
        }
    }
}

/// Predicted position of one aircraft.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PredictedPosition {
    pub lat: f64,
    pub lon: f64,
}

/// A prediction together with the track it was computed from.
#[derive(Debug, Clone)]
pub struct Prediction {
    pub track: Arc<Track>,
    pub position: PredictedPosition,
}

/// All predictions for one tick, keyed by track id.
pub type Predictions = HashMap<String, Prediction>;

/// Stateless dead-reckoning calculator.
#[derive(Debug, Clone, Default)]
pub struct Extrapolator {
    config: ExtrapolationConfig,
}

impl Extrapolator {
    #[must_use]
    pub fn new(config: ExtrapolationConfig) -> Self {
        Self { config }
    }

    #[must_use]
    pub fn config(&self) -> &ExtrapolationConfig {
        &self.config
    }

    /// Predict the position of a single aircraft at `now`.
    #[must_use]
    pub fn predict(&self, state: &BaseState, now: Instant) -> PredictedPosition {
        let elapsed = now.saturating_duration_since(state.received_at);
        self.predict_elapsed(&state.track, elapsed)
    }

    /// Predict the position of a track after `elapsed` time has passed.
    #[must_use]
    pub fn predict_elapsed(&self, track: &Track, elapsed: Duration) -> PredictedPosition {
        let reported = PredictedPosition {
            lat: track.latitude,
            lon: track.longitude,
        };

        if track.on_ground {
            return reported;
        }
        let (Some(speed), Some(heading)) = (track.velocity, track.heading) else {
            return reported;
        };
        if !speed.is_finite() || !heading.is_finite() || speed < self.config.min_speed_mps {
            return reported;
        }

        let elapsed = elapsed.min(self.config.horizon).as_secs_f64();
        let distance = speed * elapsed;
        let heading_rad = heading.to_radians();

        let delta_lat = distance * heading_rad.cos() / self.config.meters_per_degree_lat;

        let cos_lat = track.latitude.to_radians().cos().max(self.config.min_cos_lat);
        let meters_per_degree_lon = self.config.meters_per_degree_lat * cos_lat;
        let delta_lon = distance * heading_rad.sin() / meters_per_degree_lon;

        PredictedPosition {
            lat: (track.latitude + delta_lat).clamp(-90.0, 90.0),
            lon: normalize_longitude(track.longitude + delta_lon),
        }
    }

    /// Recompute predictions for every tracked aircraft.
    #[must_use]
    pub fn extrapolate(&self, snapshot: &Snapshot, now: Instant) -> Predictions {
        snapshot
            .iter()
            .map(|(id, state)| {
                (
                    id.clone(),
                    Prediction {
                        track: Arc::clone(&state.track),
                        position: self.predict(state, now),
                    },
                )
            })
            .collect()
    }
}

/// Wrap a longitude into [-180, 180).
#[must_use]
pub fn normalize_longitude(lon: f64) -> f64 {
    if (-180.0..180.0).contains(&lon) {
        lon
    } else {
        (lon + 180.0).rem_euclid(360.0) - 180.0
    }
}

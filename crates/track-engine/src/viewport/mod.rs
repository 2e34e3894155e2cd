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

//! Viewport culling and display prioritization.
//!
//! Reduces the full set of predictions to what the renderer should draw:
//! aircraft inside the buffered viewport, airborne before grounded, highest
//! first, truncated to a hard cap.

use std::cmp::Ordering;
use std::sync::Arc;

use crate::extrapolate::{Predictions, PredictedPosition};
use crate::protocol::Track;

/// Spatial bounds of the area the consumer is looking at, in degrees.
///
/// A viewport with `west > east` spans the antimeridian.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Viewport {
    pub south: f64,
    pub north: f64,
    /// Western edge. Greater than `east` when the viewport crosses the antimeridian.
    pub west: f64,
    pub east: f64,
}

impl Viewport {
    /// Bounds in degrees. `west > east` means the viewport crosses the
    /// antimeridian, e.g. `Viewport::new(-50.0, -30.0, 170.0, -170.0)` covers
    /// longitudes 170..180 and -180..-170.
    #[must_use]
    pub fn new(south: f64, north: f64, west: f64, east: f64) -> Self {
        Self {
            south,
            north,
            west,
            east,
        }
    }

    /// The whole globe.
    #[must_use]
    pub fn world() -> Self {
        Self::new(-90.0, 90.0, -180.0, 180.0)
    }

    /// Check whether a position is inside the viewport widened by `buffer` degrees.
    #[must_use]
    pub fn contains_buffered(&self, lat: f64, lon: f64, buffer: f64) -> bool {
        if lat < self.south - buffer || lat > self.north + buffer {
            return false;
        }

        let span = if self.west <= self.east {
            self.east - self.west
        } else {
            self.east + 360.0 - self.west
        };
        if span + 2.0 * buffer >= 360.0 {
            return true;
        }

        // Distance eastward from the buffered west edge, in [0, 360).
        let west = self.west - buffer;
        let offset = (lon - west).rem_euclid(360.0);
        offset <= span + 2.0 * buffer
    }
}

impl Default for Viewport {
    fn default() -> Self {
        Self::world()
    }
}

/// Configuration for the viewport filter.
#[derive(Debug, Clone)]
pub struct ViewportConfig {
    /// Margin added on every side of the viewport, in degrees.
    pub buffer_degrees: f64,
    /// Maximum number of aircraft handed to the renderer.
    pub max_visible: usize,
}

impl Default for ViewportConfig {
    fn default() -> Self {
        Self {
            buffer_degrees: 2.0,
            max_visible: 250,
        }
    }
}

/// An aircraft selected for display.
#[derive(Debug, Clone)]
pub struct VisibleTrack {
    pub id: String,
    pub position: PredictedPosition,
    pub track: Arc<Track>,
}

/// Filters and ranks predictions for display.
#[derive(Debug, Clone, Default)]
pub struct ViewportFilter {
    config: ViewportConfig,
}

impl ViewportFilter {
    #[must_use]
    pub fn new(config: ViewportConfig) -> Self {
        Self { config }
    }

    #[must_use]
    pub fn config(&self) -> &ViewportConfig {
        &self.config
    }

    /// Select the ranked, capped set of aircraft visible in `viewport`.
    #[must_use]
    pub fn select(&self, predictions: &Predictions, viewport: &Viewport) -> Vec<VisibleTrack> {
        let mut visible: Vec<VisibleTrack> = predictions
            .iter()
            .filter(|(_, p)| {
                viewport.contains_buffered(p.position.lat, p.position.lon, self.config.buffer_degrees)
            })
            .map(|(id, p)| VisibleTrack {
                id: id.clone(),
                position: p.position,
                track: Arc::clone(&p.track),
            })
            .collect();

        visible.sort_by(|a, b| display_priority(&a.track, &b.track).then_with(|| a.id.cmp(&b.id)));
        visible.truncate(self.config.max_visible);
        visible
    }
}

/// Airborne before grounded, then higher altitude first.
#[must_use]
pub fn display_priority(a: &Track, b: &Track) -> Ordering {
    a.on_ground
        .cmp(&b.on_ground)
        .then_with(|| b.rank_altitude().total_cmp(&a.rank_altitude()))
}

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

//! Real-time aircraft tracking engine.
//!
//! This library ingests snapshot batches of aircraft positions, predicts where
//! each aircraft is between reports, and reduces the population to a bounded,
//! prioritized set for a renderer. It is made of layers that can be used
//! independently or composed through [`Engine`]:
//!
//! - **Protocol layer**: JSON snapshot parsing (`{"type":"update","data":[...]}`)
//! - **Transport layer**: websocket push feed with reconnection and HTTP polling fallback
//! - **Store layer**: last known state per aircraft, replaced batch by batch
//! - **Extrapolation layer**: dead reckoning from speed, heading and elapsed time
//! - **Viewport layer**: culling, ranking and capping for display
//!
//! # Quick Start
//!
//! ```no_run
//! use track_engine::{Engine, EngineConfig, TransportConfig, Viewport};
//!
//! #[tokio::main]
//! async fn main() {
//!     let engine = Engine::spawn(EngineConfig {
//!         transport: TransportConfig {
//!             feed_url: "ws://localhost:8080/ws".to_string(),
//!             api_url: "http://localhost:8080".to_string(),
//!             ..Default::default()
//!         },
//!         ..Default::default()
//!     })
//!     .expect("failed to build HTTP client");
//!
//!     engine.set_viewport(Viewport::new(32.0, 36.0, -120.0, -116.0));
//!
//!     engine.subscribe(|visible| {
//!         for aircraft in visible {
//!             println!("{} at {:.4}, {:.4}", aircraft.id, aircraft.position.lat, aircraft.position.lon);
//!         }
//!     });
//!
//!     tokio::signal::ctrl_c().await.ok();
//!     engine.shutdown_and_wait().await;
//! }
//! ```
//!
//! # Using Individual Layers
//!
//! ```
//! use std::time::Duration;
//! use track_engine::extrapolate::Extrapolator;
//! use track_engine::protocol::Track;
//!
//! let mut track = Track::new("A1B2C3", 34.0, -118.0);
//! track.velocity = Some(200.0);
//! track.heading = Some(90.0);
//!
//! let predicted = Extrapolator::default().predict_elapsed(&track, Duration::from_secs(5));
//! assert!(predicted.lon > track.longitude);
//! ```

pub mod extrapolate;
pub mod protocol;
pub mod status;
pub mod store;
pub mod transport;
pub mod viewport;

use std::cell::Cell;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::Duration;

use chrono::{DateTime, Utc};
use log::{debug, error, info, warn};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

pub use extrapolate::{ExtrapolationConfig, Extrapolator, PredictedPosition};
pub use protocol::{ParseError, Protocol, SnapshotParser, Track};
pub use status::{EngineStatus, TransportStatsSnapshot};
pub use store::{BaseState, BatchSummary, TrackStore};
pub use transport::{
    BatchSource, ConnectionState, Connector, Poller, Transport, TransportConfig, TransportError,
    TransportEvent,
};
pub use viewport::{Viewport, ViewportConfig, ViewportFilter, VisibleTrack};

use status::TransportStats;

/// Configuration for the full engine.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Transport configuration.
    pub transport: TransportConfig,
    /// Dead-reckoning parameters.
    pub extrapolation: ExtrapolationConfig,
    /// Viewport buffer and display cap.
    pub viewport: ViewportConfig,
    /// Interval between extrapolation ticks.
    pub tick_interval: Duration,
    /// Viewport used until the consumer sets one. Defaults to the whole globe.
    pub initial_viewport: Option<Viewport>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            transport: TransportConfig::default(),
            extrapolation: ExtrapolationConfig::default(),
            viewport: ViewportConfig::default(),
            tick_interval: Duration::from_millis(100),
            initial_viewport: None,
        }
    }
}

/// Identifies a callback registered with [`Engine::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

type Callback = Arc<dyn Fn(&[VisibleTrack]) + Send + Sync>;

#[derive(Default)]
struct Subscribers {
    next_id: u64,
    callbacks: Vec<(SubscriptionId, Callback)>,
}

thread_local! {
    // True while this thread is running subscriber callbacks.
    static DELIVERING: Cell<bool> = const { Cell::new(false) };
}

struct DeliveryMark;

impl DeliveryMark {
    fn enter() -> Self {
        DELIVERING.with(|d| d.set(true));
        Self
    }

    fn is_delivering() -> bool {
        DELIVERING.with(Cell::get)
    }
}

impl Drop for DeliveryMark {
    fn drop(&mut self) {
        DELIVERING.with(|d| d.set(false));
    }
}

struct EngineShared {
    store: TrackStore,
    extrapolator: Extrapolator,
    filter: ViewportFilter,
    subscribers: Mutex<Subscribers>,
    // Held for reading while callbacks run; shutdown takes it for writing.
    delivery_gate: RwLock<()>,
    visible_tx: watch::Sender<Arc<Vec<VisibleTrack>>>,
    ticks: AtomicU64,
    last_batch_at: RwLock<Option<DateTime<Utc>>>,
    cancel_token: CancellationToken,
}

impl EngineShared {
    fn apply_batch(&self, source: BatchSource, tracks: Vec<Track>) {
        let summary = self.store.apply_batch(tracks);
        *self
            .last_batch_at
            .write()
            .unwrap_or_else(PoisonError::into_inner) = Some(Utc::now());
        debug!(
            "Applied {:?} batch: {} tracks ({} added, {} removed)",
            source, summary.tracks, summary.added, summary.removed
        );
    }

    /// Recompute predictions and the visible set, then publish it.
    fn refresh(&self, viewport: &Viewport) {
        let predictions = self.extrapolator.extrapolate(&self.store.all(), Instant::now());
        let visible = Arc::new(self.filter.select(&predictions, viewport));
        self.visible_tx.send_replace(Arc::clone(&visible));
        self.deliver(&visible);
    }

    fn deliver(&self, visible: &[VisibleTrack]) {
        let _gate = self
            .delivery_gate
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        if self.cancel_token.is_cancelled() {
            return;
        }

        let callbacks: Vec<Callback> = self
            .subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .callbacks
            .iter()
            .map(|(_, cb)| Arc::clone(cb))
            .collect();

        let _mark = DeliveryMark::enter();
        for callback in callbacks {
            if self.cancel_token.is_cancelled() {
                break;
            }
            callback(visible);
        }
    }
}

/// Full-stack engine that wires all layers together.
///
/// The engine owns three background activities: transport ingestion, the
/// fixed-rate extrapolation tick, and viewport change handling. They share one
/// cancellation token and stop together on [`Engine::shutdown`] or drop.
pub struct Engine {
    shared: Arc<EngineShared>,
    viewport_tx: watch::Sender<Viewport>,
    state_rx: watch::Receiver<ConnectionState>,
    stats: Arc<TransportStats>,
    tasks: Vec<JoinHandle<()>>,
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("tracks", &self.shared.store.len())
            .field("viewport", &*self.viewport_tx.borrow())
            .field("connection", &*self.state_rx.borrow())
            .finish_non_exhaustive()
    }
}

impl Engine {
    /// Spawn an engine using the websocket feed and HTTP API from `config`.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn spawn(config: EngineConfig) -> Result<Self, TransportError> {
        let transport = Transport::spawn(config.transport.clone())?;
        Ok(Self::start(config, transport))
    }

    /// Spawn an engine with custom transport implementations.
    #[must_use]
    pub fn spawn_with<C: Connector, P: Poller>(config: EngineConfig, connector: C, poller: P) -> Self {
        let transport = Transport::spawn_with(config.transport.clone(), connector, poller);
        Self::start(config, transport)
    }

    fn start(config: EngineConfig, transport: Transport) -> Self {
        let (visible_tx, _) = watch::channel(Arc::new(Vec::new()));
        let viewport = config.initial_viewport.unwrap_or_default();
        let (viewport_tx, viewport_rx) = watch::channel(viewport);

        let shared = Arc::new(EngineShared {
            store: TrackStore::new(),
            extrapolator: Extrapolator::new(config.extrapolation),
            filter: ViewportFilter::new(config.viewport),
            subscribers: Mutex::new(Subscribers::default()),
            delivery_gate: RwLock::new(()),
            visible_tx,
            ticks: AtomicU64::new(0),
            last_batch_at: RwLock::new(None),
            cancel_token: transport.cancel_token(),
        });

        let state_rx = transport.watch_state();
        let stats = transport.stats();

        info!(
            "Starting track engine (tick {} ms, cap {}, buffer {}°)",
            config.tick_interval.as_millis(),
            shared.filter.config().max_visible,
            shared.filter.config().buffer_degrees
        );

        let tasks = vec![
            tokio::spawn(ingest_loop(transport, Arc::clone(&shared))),
            tokio::spawn(tick_loop(
                Arc::clone(&shared),
                viewport_rx,
                config.tick_interval,
            )),
        ];

        Self {
            shared,
            viewport_tx,
            state_rx,
            stats,
            tasks,
        }
    }

    /// Register a callback invoked with the visible set on every tick and
    /// every viewport change.
    ///
    /// Callbacks run on the engine's tick task and should return quickly. They
    /// may call [`Engine::unsubscribe`] and [`Engine::shutdown`].
    pub fn subscribe<F>(&self, callback: F) -> SubscriptionId
    where
        F: Fn(&[VisibleTrack]) + Send + Sync + 'static,
    {
        let mut subscribers = self
            .shared
            .subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let id = SubscriptionId(subscribers.next_id);
        subscribers.next_id += 1;
        subscribers.callbacks.push((id, Arc::new(callback)));
        id
    }

    /// Remove a callback. Returns `false` if it was not registered.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut subscribers = self
            .shared
            .subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let before = subscribers.callbacks.len();
        subscribers.callbacks.retain(|(existing, _)| *existing != id);
        subscribers.callbacks.len() != before
    }

    /// Watch the latest visible set.
    #[must_use]
    pub fn watch(&self) -> watch::Receiver<Arc<Vec<VisibleTrack>>> {
        self.shared.visible_tx.subscribe()
    }

    /// Latest visible set.
    #[must_use]
    pub fn visible(&self) -> Arc<Vec<VisibleTrack>> {
        Arc::clone(&self.shared.visible_tx.borrow())
    }

    /// Replace the viewport. The visible set is recomputed immediately.
    pub fn set_viewport(&self, viewport: Viewport) {
        self.viewport_tx.send_replace(viewport);
    }

    /// Current viewport.
    #[must_use]
    pub fn viewport(&self) -> Viewport {
        *self.viewport_tx.borrow()
    }

    /// Get the last reported state of an aircraft.
    #[must_use]
    pub fn get(&self, id: &str) -> Option<BaseState> {
        self.shared.store.get(id)
    }

    /// Predict the current position of an aircraft.
    #[must_use]
    pub fn predict(&self, id: &str) -> Option<PredictedPosition> {
        self.shared
            .store
            .get(id)
            .map(|state| self.shared.extrapolator.predict(&state, Instant::now()))
    }

    /// Get the number of tracked aircraft.
    #[must_use]
    pub fn track_count(&self) -> usize {
        self.shared.store.len()
    }

    /// Get the current push connection state.
    #[must_use]
    pub fn connection_state(&self) -> ConnectionState {
        *self.state_rx.borrow()
    }

    /// Get a status summary for diagnostics.
    #[must_use]
    pub fn status(&self) -> EngineStatus {
        EngineStatus {
            connection: self.connection_state(),
            tracks: self.shared.store.len(),
            visible: self.shared.visible_tx.borrow().len(),
            ticks: self.shared.ticks.load(Ordering::Relaxed),
            last_batch_at: *self
                .shared
                .last_batch_at
                .read()
                .unwrap_or_else(PoisonError::into_inner),
            transport: self.stats.snapshot(),
        }
    }

    /// Stop ticking, cancel transport timers and close the push connection.
    ///
    /// Once this returns no subscriber callback will start. Called from inside
    /// a callback it cancels without waiting, and the remaining callbacks of
    /// that delivery are skipped.
    pub fn shutdown(&self) {
        if !self.shared.cancel_token.is_cancelled() {
            info!("Shutting down track engine");
        }
        self.shared.cancel_token.cancel();
        if DeliveryMark::is_delivering() {
            warn!("Engine shut down from a subscriber callback");
            return;
        }
        // Wait out any delivery already in progress.
        drop(
            self.shared
                .delivery_gate
                .write()
                .unwrap_or_else(PoisonError::into_inner),
        );
    }

    /// Shut down and wait for the background tasks to finish.
    pub async fn shutdown_and_wait(mut self) {
        self.shutdown();
        for task in self.tasks.drain(..) {
            if let Err(e) = task.await {
                error!("Engine task failed: {}", e);
            }
        }
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        self.shared.cancel_token.cancel();
    }
}

async fn ingest_loop(mut transport: Transport, shared: Arc<EngineShared>) {
    while let Some(event) = transport.recv().await {
        match event {
            TransportEvent::Connected => info!("Push feed connected"),
            TransportEvent::Disconnected => warn!("Push feed lost, relying on polling"),
            TransportEvent::SnapshotBatch { source, tracks } => shared.apply_batch(source, tracks),
        }
    }

    transport.shutdown_and_wait().await;
    debug!("Ingestion stopped");
}

async fn tick_loop(
    shared: Arc<EngineShared>,
    mut viewport_rx: watch::Receiver<Viewport>,
    tick_interval: Duration,
) {
    let mut interval = tokio::time::interval(tick_interval);
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            biased;

            () = shared.cancel_token.cancelled() => break,

            changed = viewport_rx.changed() => {
                if changed.is_err() {
                    break;
                }
                debug!("Viewport changed to {:?}", *viewport_rx.borrow());
            }

            _ = interval.tick() => {
                shared.ticks.fetch_add(1, Ordering::Relaxed);
            }
        }

        let viewport = *viewport_rx.borrow_and_update();
        shared.refresh(&viewport);
    }

    debug!("Extrapolation ticks stopped");
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::Ordering as AtomicOrdering;

    use super::*;
    use crate::transport::testing::{MockConnector, MockPoller};
    use tokio::time::sleep;

    fn airborne(id: &str, altitude: f64) -> Track {
        let mut track = Track::new(id, 34.0, -118.0);
        track.altitude = Some(altitude);
        track
    }

    fn grounded(id: &str) -> Track {
        let mut track = Track::new(id, 34.0, -118.0);
        track.altitude = Some(0.0);
        track.on_ground = true;
        track
    }

    fn update_frame(tracks: &[Track]) -> Vec<u8> {
        serde_json::json!({"type": "update", "data": tracks})
            .to_string()
            .into_bytes()
    }

    fn ids(visible: &[VisibleTrack]) -> Vec<String> {
        visible.iter().map(|v| v.id.clone()).collect()
    }

    #[tokio::test(start_paused = true)]
    async fn test_subscriber_receives_each_tick() {
        let (connector, _handoff) = MockConnector::new();
        let poller = MockPoller::with_tracks(vec![airborne("A1", 1000.0), airborne("B2", 2000.0)]);
        let engine = Engine::spawn_with(EngineConfig::default(), connector, poller);

        let calls = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&calls);
        engine.subscribe(move |visible| sink.lock().unwrap().push(ids(visible)));

        sleep(Duration::from_millis(350)).await;

        // Ticks at 0, 100, 200 and 300 ms.
        let calls = calls.lock().unwrap().clone();
        assert_eq!(calls.len(), 4);
        assert_eq!(calls.last().unwrap(), &vec!["B2".to_string(), "A1".to_string()]);
        assert_eq!(engine.track_count(), 2);
        assert_eq!(engine.status().ticks, 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_bounded_prioritized_output() {
        let mut population = Vec::new();
        for i in 0..100 {
            population.push(grounded(&format!("GND{i:03}")));
        }
        for i in 0..200_u32 {
            population.push(airborne(&format!("AIR{i:03}"), 500.0 + f64::from(i) * 10.0));
        }

        let (connector, _handoff) = MockConnector::new();
        let engine = Engine::spawn_with(
            EngineConfig::default(),
            connector,
            MockPoller::with_tracks(population),
        );
        engine.set_viewport(Viewport::new(33.0, 35.0, -119.0, -117.0));

        sleep(Duration::from_millis(150)).await;

        let visible = engine.visible();
        assert_eq!(visible.len(), 250);
        assert!(visible[..200].iter().all(|v| !v.track.on_ground));
        assert!(visible[200..].iter().all(|v| v.track.on_ground));
        assert_eq!(visible[0].id, "AIR199");
        assert!(visible
            .windows(2)
            .filter(|w| !w[1].track.on_ground)
            .all(|w| w[0].track.rank_altitude() >= w[1].track.rank_altitude()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_push_batch_replaces_population() {
        let (connector, mut handoff) = MockConnector::new();
        let poller = MockPoller::with_tracks(vec![airborne("A1", 1000.0), airborne("B2", 2000.0)]);
        let engine = Engine::spawn_with(EngineConfig::default(), connector, poller);

        let frames = handoff.recv().await.unwrap();
        assert_eq!(engine.connection_state(), ConnectionState::Connected);
        frames.send(Ok(update_frame(&[airborne("B2", 2500.0)]))).unwrap();

        sleep(Duration::from_millis(150)).await;

        assert!(engine.get("A1").is_none());
        assert_eq!(engine.get("B2").unwrap().track.altitude, Some(2500.0));
        assert_eq!(ids(&engine.visible()), vec!["B2".to_string()]);
        assert_eq!(engine.status().transport.push_batches, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_viewport_change_recomputes_immediately() {
        let (connector, _handoff) = MockConnector::new();
        let poller = MockPoller::with_tracks(vec![airborne("LAX", 1000.0)]);
        let config = EngineConfig {
            tick_interval: Duration::from_secs(3600),
            ..Default::default()
        };
        let engine = Engine::spawn_with(config, connector, poller);
        let mut visible_rx = engine.watch();

        // Let the seed land, then force one recompute so LAX is visible.
        sleep(Duration::from_millis(10)).await;
        visible_rx.borrow_and_update();
        engine.set_viewport(Viewport::world());
        visible_rx.changed().await.unwrap();
        assert_eq!(visible_rx.borrow_and_update().len(), 1);

        engine.set_viewport(Viewport::new(50.0, 55.0, 0.0, 5.0));
        visible_rx.changed().await.unwrap();
        assert!(visible_rx.borrow_and_update().is_empty());
        assert!(engine.status().ticks <= 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_positions_advance_until_horizon() {
        let mut mover = Track::new("MOVER", 34.0, -118.0);
        mover.velocity = Some(200.0);
        mover.heading = Some(90.0);
        mover.altitude = Some(9000.0);

        // Re-polls would restamp the track, so only the seed is applied.
        let config = EngineConfig {
            transport: TransportConfig {
                poll_when_connected: false,
                ..Default::default()
            },
            ..Default::default()
        };
        let (connector, _handoff) = MockConnector::new();
        let engine = Engine::spawn_with(config, connector, MockPoller::with_tracks(vec![mover.clone()]));

        sleep(Duration::from_millis(1050)).await;
        let after_one = engine.visible()[0].position;
        assert!(after_one.lon > mover.longitude);
        assert!((after_one.lat - mover.latitude).abs() < 1e-9);

        sleep(Duration::from_secs(20)).await;
        let clamped = engine.visible()[0].position;
        let expected = Extrapolator::default().predict_elapsed(&mover, Duration::from_secs(15));
        assert!((clamped.lon - expected.lon).abs() < 1e-12);
        assert!(clamped.lon > after_one.lon);

        let predicted = engine.predict("MOVER").unwrap();
        assert!((predicted.lon - expected.lon).abs() < 1e-12);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unsubscribe_stops_callbacks() {
        let (connector, _handoff) = MockConnector::new();
        let engine = Engine::spawn_with(EngineConfig::default(), connector, MockPoller::default());

        let count = Arc::new(AtomicU64::new(0));
        let counter = Arc::clone(&count);
        let id = engine.subscribe(move |_| {
            counter.fetch_add(1, AtomicOrdering::SeqCst);
        });

        sleep(Duration::from_millis(250)).await;
        assert!(engine.unsubscribe(id));
        assert!(!engine.unsubscribe(id));

        let seen = count.load(AtomicOrdering::SeqCst);
        sleep(Duration::from_secs(1)).await;
        assert_eq!(count.load(AtomicOrdering::SeqCst), seen);
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_releases_everything() {
        let (connector, mut handoff) = MockConnector::new();
        let log = Arc::clone(&connector.log);
        let engine = Engine::spawn_with(EngineConfig::default(), connector, MockPoller::default());

        let count = Arc::new(AtomicU64::new(0));
        let counter = Arc::clone(&count);
        engine.subscribe(move |_| {
            counter.fetch_add(1, AtomicOrdering::SeqCst);
        });

        let _frames = handoff.recv().await.unwrap();
        sleep(Duration::from_millis(250)).await;
        assert_eq!(log.open.load(AtomicOrdering::SeqCst), 1);

        engine.shutdown();
        let seen = count.load(AtomicOrdering::SeqCst);
        assert!(seen > 0);

        engine.shutdown_and_wait().await;
        assert_eq!(log.open.load(AtomicOrdering::SeqCst), 0);

        sleep(Duration::from_secs(30)).await;
        assert_eq!(count.load(AtomicOrdering::SeqCst), seen);
        assert_eq!(log.attempts().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_from_callback_does_not_hang() {
        let (connector, _handoff) = MockConnector::new();
        let engine = Arc::new(Engine::spawn_with(
            EngineConfig::default(),
            connector,
            MockPoller::default(),
        ));

        let first = Arc::new(AtomicU64::new(0));
        let second = Arc::new(AtomicU64::new(0));

        let weak = Arc::downgrade(&engine);
        let counter = Arc::clone(&first);
        engine.subscribe(move |_| {
            counter.fetch_add(1, AtomicOrdering::SeqCst);
            if let Some(engine) = weak.upgrade() {
                engine.shutdown();
            }
        });
        let counter = Arc::clone(&second);
        engine.subscribe(move |_| {
            counter.fetch_add(1, AtomicOrdering::SeqCst);
        });

        sleep(Duration::from_secs(1)).await;

        assert!(engine.shared.cancel_token.is_cancelled());
        assert_eq!(first.load(AtomicOrdering::SeqCst), 1);
        assert_eq!(second.load(AtomicOrdering::SeqCst), 0);
        assert_eq!(engine.status().ticks, 1);

        // Shutting down again from outside still returns.
        engine.shutdown();
    }
}

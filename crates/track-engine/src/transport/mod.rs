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

//! Snapshot transport with push connection, reconnection and polling fallback.
//!
//! Two background tasks feed one event channel:
//!
//! - the **push loop** owns the single push connection. It connects, forwards
//!   every complete snapshot frame, and after a close or failure waits a fixed
//!   delay before the next attempt. Attempts are strictly sequential.
//! - the **poll loop** seeds the population with a bulk fetch before the first
//!   push connection is attempted, then re-fetches on a fixed interval. A failed
//!   connect attempt pulls the next poll forward.
//!
//! Malformed frames are logged and dropped. Transport failures never leave this
//! module as errors; consumers only see state changes and snapshot batches.

mod http;
mod ws;

pub use http::HttpPoller;
pub use ws::WsConnector;

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use futures_util::{Stream, StreamExt};
use log::{debug, error, info, warn};
use thiserror::Error;
use tokio::sync::{mpsc, oneshot, watch, Notify};
use tokio::task::JoinHandle;
use tokio::time::{sleep, Instant};
use tokio_util::sync::CancellationToken;

use crate::protocol::{BulkSnapshot, ParseError, Protocol, SnapshotParser, Track};
use crate::status::TransportStats;

/// Errors raised inside the transport. They are logged, never propagated.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("websocket error: {0}")]
    WebSocket(Box<tokio_tungstenite::tungstenite::Error>),

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("bulk response rejected: {0}")]
    Parse(#[from] ParseError),

    #[error("connection failed: {0}")]
    Connect(String),
}

impl From<tokio_tungstenite::tungstenite::Error> for TransportError {
    fn from(e: tokio_tungstenite::tungstenite::Error) -> Self {
        Self::WebSocket(Box::new(e))
    }
}

/// Configuration for the snapshot transport.
#[derive(Debug, Clone)]
pub struct TransportConfig {
    /// Websocket URL of the push feed.
    pub feed_url: String,
    /// Base URL of the HTTP API serving `GET /entities`.
    pub api_url: String,
    /// Delay before reconnecting after a close or failed attempt.
    pub reconnect_delay: Duration,
    /// Interval between fallback polls.
    pub poll_interval: Duration,
    /// Delay of the next poll after a failed connect attempt.
    pub retry_poll_interval: Duration,
    /// Keep polling while the push connection is up.
    pub poll_when_connected: bool,
    /// Timeout for a single bulk fetch.
    pub request_timeout: Duration,
    /// Channel buffer size for transport events.
    pub buffer_size: usize,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            feed_url: "ws://localhost:8080/ws".to_string(),
            api_url: "http://localhost:8080".to_string(),
            reconnect_delay: Duration::from_secs(5),
            poll_interval: Duration::from_secs(15),
            retry_poll_interval: Duration::from_secs(10),
            poll_when_connected: true,
            request_timeout: Duration::from_secs(10),
            buffer_size: 64,
        }
    }
}

/// Push connection state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Attempting to connect.
    Connecting,
    /// Push connection open.
    Connected,
    /// No push connection; polling keeps data fresh.
    Disconnected,
}

/// Where a snapshot batch came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchSource {
    Push,
    Poll,
}

/// Events emitted by the transport.
#[derive(Debug, Clone)]
pub enum TransportEvent {
    /// The push connection opened.
    Connected,
    /// The push connection closed or failed.
    Disconnected,
    /// A complete population was received.
    SnapshotBatch {
        source: BatchSource,
        tracks: Vec<Track>,
    },
}

/// Opens push connections.
///
/// Each successful `connect` yields a stream of raw frames; dropping the
/// stream closes the connection.
pub trait Connector: Send + Sync + 'static {
    type Frames: Stream<Item = Result<Vec<u8>, TransportError>> + Send + Unpin + 'static;

    fn connect(&self) -> impl Future<Output = Result<Self::Frames, TransportError>> + Send;
}

/// Performs one bulk fetch of the complete population.
pub trait Poller: Send + Sync + 'static {
    fn fetch(&self) -> impl Future<Output = Result<BulkSnapshot, TransportError>> + Send;
}

struct Shared {
    config: TransportConfig,
    event_tx: mpsc::Sender<TransportEvent>,
    state_tx: watch::Sender<ConnectionState>,
    reconnect_failed: Notify,
    stats: Arc<TransportStats>,
    cancel_token: CancellationToken,
}

impl Shared {
    /// Send an event unless the transport has been shut down.
    async fn emit(&self, event: TransportEvent) -> bool {
        if self.cancel_token.is_cancelled() {
            return false;
        }
        tokio::select! {
            biased;
            () = self.cancel_token.cancelled() => false,
            result = self.event_tx.send(event) => result.is_ok(),
        }
    }

    fn set_state(&self, state: ConnectionState) {
        self.state_tx.send_replace(state);
    }
}

/// Handle to the running transport tasks.
pub struct Transport {
    event_rx: mpsc::Receiver<TransportEvent>,
    shared: Arc<Shared>,
    tasks: Vec<JoinHandle<()>>,
}

impl std::fmt::Debug for Transport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transport")
            .field("feed_url", &self.shared.config.feed_url)
            .field("state", &self.state())
            .field("cancel_token", &self.shared.cancel_token)
            .finish_non_exhaustive()
    }
}

impl Transport {
    /// Spawn a websocket + HTTP transport with the given configuration.
    pub fn spawn(config: TransportConfig) -> Result<Self, TransportError> {
        let connector = WsConnector::new(config.feed_url.clone());
        let poller = HttpPoller::new(&config.api_url, config.request_timeout)?;
        Ok(Self::spawn_with(config, connector, poller))
    }

    /// Spawn the transport with custom connector and poller implementations.
    #[must_use]
    pub fn spawn_with<C: Connector, P: Poller>(
        config: TransportConfig,
        connector: C,
        poller: P,
    ) -> Self {
        let (event_tx, event_rx) = mpsc::channel(config.buffer_size.max(1));
        let (state_tx, _) = watch::channel(ConnectionState::Disconnected);
        let (seeded_tx, seeded_rx) = oneshot::channel();

        let shared = Arc::new(Shared {
            config,
            event_tx,
            state_tx,
            reconnect_failed: Notify::new(),
            stats: Arc::new(TransportStats::default()),
            cancel_token: CancellationToken::new(),
        });

        let tasks = vec![
            tokio::spawn(poll_loop(poller, Arc::clone(&shared), seeded_tx)),
            tokio::spawn(push_loop(connector, Arc::clone(&shared), seeded_rx)),
        ];

        Self {
            event_rx,
            shared,
            tasks,
        }
    }

    /// Receive the next event.
    ///
    /// Returns `None` once the transport has been shut down.
    pub async fn recv(&mut self) -> Option<TransportEvent> {
        if self.shared.cancel_token.is_cancelled() {
            return None;
        }
        tokio::select! {
            biased;
            () = self.shared.cancel_token.cancelled() => None,
            event = self.event_rx.recv() => event,
        }
    }

    /// Current push connection state.
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        *self.shared.state_tx.borrow()
    }

    /// Subscribe to connection state changes.
    #[must_use]
    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.shared.state_tx.subscribe()
    }

    /// Shared transport counters.
    #[must_use]
    pub fn stats(&self) -> Arc<TransportStats> {
        Arc::clone(&self.shared.stats)
    }

    /// Cancellation token shared by all transport tasks.
    #[must_use]
    pub fn cancel_token(&self) -> CancellationToken {
        self.shared.cancel_token.clone()
    }

    /// Cancel all timers and close the push connection.
    pub fn shutdown(&self) {
        self.shared.cancel_token.cancel();
    }

    /// Shut down and wait for the background tasks to finish.
    pub async fn shutdown_and_wait(mut self) {
        self.shutdown();
        for task in self.tasks.drain(..) {
            if let Err(e) = task.await {
                error!("Transport task failed: {}", e);
            }
        }
    }
}

impl Drop for Transport {
    fn drop(&mut self) {
        self.shared.cancel_token.cancel();
    }
}

enum ReconnectReason {
    ConnectionClosed,
    Failed(TransportError),
    Cancelled,
}

async fn push_loop<C: Connector>(
    connector: C,
    shared: Arc<Shared>,
    seeded: oneshot::Receiver<()>,
) {
    let cancel_token = shared.cancel_token.clone();
    let feed_url = shared.config.feed_url.clone();
    let reconnect_delay = shared.config.reconnect_delay;

    // The first connect waits for the seed fetch (successful or not).
    tokio::select! {
        _ = seeded => {}
        () = cancel_token.cancelled() => return,
    }

    let mut parser = SnapshotParser::new();
    // Set once Disconnected has been emitted; repeated failed attempts stay quiet.
    let mut reported_down = false;

    loop {
        if cancel_token.is_cancelled() {
            info!("Push connection cancelled");
            return;
        }

        shared.set_state(ConnectionState::Connecting);
        shared.stats.record_connect_attempt();
        info!("Connecting to {}...", feed_url);

        let attempt = tokio::select! {
            result = connector.connect() => result,
            () = cancel_token.cancelled() => {
                info!("Push connection cancelled while connecting");
                return;
            }
        };

        match attempt {
            Ok(frames) => {
                info!("Connected to {}", feed_url);
                shared.set_state(ConnectionState::Connected);
                reported_down = false;
                if !shared.emit(TransportEvent::Connected).await {
                    return;
                }

                let reason = process_frames(frames, &mut parser, &shared).await;

                shared.set_state(ConnectionState::Disconnected);
                match reason {
                    ReconnectReason::ConnectionClosed => info!("Push connection closed by server"),
                    ReconnectReason::Failed(e) => error!("Push connection error: {}", e),
                    ReconnectReason::Cancelled => {
                        info!("Push connection cancelled");
                        return;
                    }
                }

                reported_down = true;
                if !shared.emit(TransportEvent::Disconnected).await {
                    return;
                }
            }
            Err(e) => {
                warn!("Connect to {} failed: {}", feed_url, e);
                shared.stats.record_connect_failure();
                shared.set_state(ConnectionState::Disconnected);
                shared.reconnect_failed.notify_one();
                if !reported_down {
                    reported_down = true;
                    if !shared.emit(TransportEvent::Disconnected).await {
                        return;
                    }
                }
            }
        }

        warn!("Reconnecting in {} seconds...", reconnect_delay.as_secs());

        tokio::select! {
            () = sleep(reconnect_delay) => {}
            () = cancel_token.cancelled() => {
                info!("Push connection cancelled during reconnect delay");
                return;
            }
        }
    }
}

async fn process_frames<S>(
    mut frames: S,
    parser: &mut SnapshotParser,
    shared: &Shared,
) -> ReconnectReason
where
    S: Stream<Item = Result<Vec<u8>, TransportError>> + Unpin,
{
    loop {
        tokio::select! {
            frame = frames.next() => match frame {
                Some(Ok(data)) => {
                    shared.stats.record_frame();
                    let skipped_before = parser.skipped_entries();
                    let parsed = parser.parse(&data);
                    shared.stats.record_skipped_entries(parser.skipped_entries() - skipped_before);
                    match parsed {
                        Ok(Some(tracks)) => {
                            shared.stats.record_push_batch();
                            let event = TransportEvent::SnapshotBatch {
                                source: BatchSource::Push,
                                tracks,
                            };
                            if !shared.emit(event).await {
                                return ReconnectReason::Cancelled;
                            }
                        }
                        Ok(None) => {}
                        Err(e) => {
                            shared.stats.record_malformed();
                            warn!("Dropping malformed frame: {}", e);
                        }
                    }
                }
                Some(Err(e)) => return ReconnectReason::Failed(e),
                None => return ReconnectReason::ConnectionClosed,
            },

            () = shared.cancel_token.cancelled() => return ReconnectReason::Cancelled,
        }
    }
}

async fn poll_loop<P: Poller>(poller: P, shared: Arc<Shared>, seeded: oneshot::Sender<()>) {
    let cancel_token = shared.cancel_token.clone();
    let poll_interval = shared.config.poll_interval;
    let retry_poll_interval = shared.config.retry_poll_interval;
    let state_rx = shared.state_tx.subscribe();

    if !poll_once(&poller, &shared).await {
        return;
    }
    let _ = seeded.send(());

    let next_poll = sleep(poll_interval);
    tokio::pin!(next_poll);

    loop {
        tokio::select! {
            () = &mut next_poll => {
                let connected = *state_rx.borrow() == ConnectionState::Connected;
                if shared.config.poll_when_connected || !connected {
                    if !poll_once(&poller, &shared).await {
                        return;
                    }
                } else {
                    debug!("Skipping poll while push connection is up");
                }
                next_poll.as_mut().reset(Instant::now() + poll_interval);
            }

            () = shared.reconnect_failed.notified() => {
                let retry_at = Instant::now() + retry_poll_interval;
                if retry_at < next_poll.deadline() {
                    debug!("Connect failed, polling again in {} seconds", retry_poll_interval.as_secs());
                    next_poll.as_mut().reset(retry_at);
                }
            }

            () = cancel_token.cancelled() => {
                info!("Polling cancelled");
                return;
            }
        }
    }
}

/// Run one bulk fetch. Returns `false` if the transport was shut down.
async fn poll_once<P: Poller>(poller: &P, shared: &Shared) -> bool {
    let result = tokio::select! {
        result = poller.fetch() => result,
        () = shared.cancel_token.cancelled() => return false,
    };

    match result {
        Ok(BulkSnapshot {
            tracks,
            skipped_entries,
        }) => {
            debug!("Poll returned {} tracks", tracks.len());
            shared.stats.record_poll_batch();
            shared.stats.record_skipped_entries(skipped_entries);
            shared
                .emit(TransportEvent::SnapshotBatch {
                    source: BatchSource::Poll,
                    tracks,
                })
                .await
        }
        Err(e) => {
            shared.stats.record_poll_failure();
            warn!("Poll failed: {}", e);
            !shared.cancel_token.is_cancelled()
        }
    }
}


#[cfg(test)]
mod tests {
    use std::sync::atomic::Ordering;
    use std::sync::Arc;

    use super::testing::{MockConnector, MockPoller};
    use super::*;

    fn update_frame(ids: &[&str]) -> Vec<u8> {
        let data: Vec<_> = ids
            .iter()
            .map(|id| serde_json::json!({"id": id, "latitude": 34.0, "longitude": -118.0}))
            .collect();
        serde_json::json!({"type": "update", "data": data})
            .to_string()
            .into_bytes()
    }

    async fn expect_event(transport: &mut Transport) -> TransportEvent {
        transport.recv().await.expect("transport closed unexpectedly")
    }

    #[tokio::test(start_paused = true)]
    async fn test_seed_then_connect_then_batches() {
        let (connector, mut handoff) = MockConnector::new();
        let poller = MockPoller::with_tracks(vec![Track::new("SEED01", 1.0, 2.0)]);
        let mut transport = Transport::spawn_with(TransportConfig::default(), connector, poller);

        match expect_event(&mut transport).await {
            TransportEvent::SnapshotBatch { source, tracks } => {
                assert_eq!(source, BatchSource::Poll);
                assert_eq!(tracks[0].id, "SEED01");
            }
            other => panic!("expected seed batch, got {other:?}"),
        }
        assert!(matches!(expect_event(&mut transport).await, TransportEvent::Connected));
        assert_eq!(transport.state(), ConnectionState::Connected);

        let frames = handoff.recv().await.unwrap();
        frames.send(Ok(update_frame(&["A1", "B2"]))).unwrap();

        match expect_event(&mut transport).await {
            TransportEvent::SnapshotBatch { source, tracks } => {
                assert_eq!(source, BatchSource::Push);
                assert_eq!(tracks.len(), 2);
            }
            other => panic!("expected push batch, got {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_malformed_frame_keeps_connection() {
        let (connector, mut handoff) = MockConnector::new();
        let log = Arc::clone(&connector.log);
        let mut transport =
            Transport::spawn_with(TransportConfig::default(), connector, MockPoller::default());

        expect_event(&mut transport).await; // seed
        expect_event(&mut transport).await; // connected

        let frames = handoff.recv().await.unwrap();
        frames.send(Ok(b"{not json".to_vec())).unwrap();
        frames.send(Ok(br#"{"type":"snapshot","data":[]}"#.to_vec())).unwrap();
        frames.send(Ok(update_frame(&["A1"]))).unwrap();

        match expect_event(&mut transport).await {
            TransportEvent::SnapshotBatch { source, tracks } => {
                assert_eq!(source, BatchSource::Push);
                assert_eq!(tracks[0].id, "A1");
            }
            other => panic!("expected push batch, got {other:?}"),
        }

        let stats = transport.stats().snapshot();
        assert_eq!(stats.malformed_frames, 2);
        assert_eq!(stats.frames_received, 3);
        assert_eq!(log.attempts().len(), 1);
        assert_eq!(transport.state(), ConnectionState::Connected);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reconnect_after_fixed_delay() {
        let (connector, mut handoff) = MockConnector::new();
        let log = Arc::clone(&connector.log);
        let mut transport =
            Transport::spawn_with(TransportConfig::default(), connector, MockPoller::default());

        expect_event(&mut transport).await; // seed
        assert!(matches!(expect_event(&mut transport).await, TransportEvent::Connected));

        let frames = handoff.recv().await.unwrap();
        drop(frames);

        assert!(matches!(expect_event(&mut transport).await, TransportEvent::Disconnected));
        let closed_at = Instant::now();
        assert_eq!(log.attempts().len(), 1);

        sleep(Duration::from_millis(4999)).await;
        assert_eq!(log.attempts().len(), 1, "reconnected before the delay elapsed");

        sleep(Duration::from_millis(2)).await;
        let attempts = log.attempts();
        assert_eq!(attempts.len(), 2);
        assert_eq!(attempts[1] - closed_at, Duration::from_secs(5));

        assert!(matches!(expect_event(&mut transport).await, TransportEvent::Connected));
        assert_eq!(log.max_open.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_connect_pulls_poll_forward() {
        let (connector, _handoff) = MockConnector::new();
        connector.log.fail.store(true, Ordering::SeqCst);
        let log = Arc::clone(&connector.log);
        let poller = MockPoller::default();
        let fetches = Arc::clone(&poller.fetches);
        let mut transport = Transport::spawn_with(TransportConfig::default(), connector, poller);

        let start = Instant::now();
        expect_event(&mut transport).await; // seed

        sleep(Duration::from_millis(10_500)).await;

        let fetches = fetches.lock().unwrap().clone();
        assert_eq!(fetches.len(), 2);
        assert_eq!(fetches[0] - start, Duration::ZERO);
        assert_eq!(fetches[1] - start, Duration::from_secs(10));

        // Connect attempts at 0s, 5s and 10s; never overlapping.
        assert_eq!(log.attempts().len(), 3);
        assert_eq!(transport.stats().snapshot().connect_failures, 3);
        assert_eq!(log.max_open.load(Ordering::SeqCst), 0);
        assert_eq!(transport.state(), ConnectionState::Disconnected);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_connect_emits_disconnected_once() {
        let (connector, _handoff) = MockConnector::new();
        connector.log.fail.store(true, Ordering::SeqCst);
        let log = Arc::clone(&connector.log);
        let mut transport =
            Transport::spawn_with(TransportConfig::default(), connector, MockPoller::default());

        let start = Instant::now();
        let mut events = Vec::new();
        while let Ok(Some(event)) =
            tokio::time::timeout_at(start + Duration::from_secs(12), transport.recv()).await
        {
            events.push(event);
        }

        // Attempts at 0s, 5s and 10s all fail; the drop is reported once.
        assert_eq!(log.attempts().len(), 3);
        let disconnects = events
            .iter()
            .filter(|e| matches!(e, TransportEvent::Disconnected))
            .count();
        assert_eq!(disconnects, 1, "events: {events:?}");
        assert!(events.iter().any(|e| matches!(
            e,
            TransportEvent::SnapshotBatch {
                source: BatchSource::Poll,
                ..
            }
        )));

        // A successful reconnect re-arms the report.
        log.fail.store(false, Ordering::SeqCst);
        loop {
            if matches!(expect_event(&mut transport).await, TransportEvent::Connected) {
                break;
            }
        }
        assert_eq!(transport.state(), ConnectionState::Connected);
    }

    #[tokio::test(start_paused = true)]
    async fn test_skipped_entries_are_counted() {
        let (connector, mut handoff) = MockConnector::new();
        let mut poller = MockPoller::with_tracks(vec![Track::new("SEED01", 1.0, 2.0)]);
        poller.skipped_entries = 2;
        let mut transport = Transport::spawn_with(TransportConfig::default(), connector, poller);

        expect_event(&mut transport).await; // seed
        expect_event(&mut transport).await; // connected
        assert_eq!(transport.stats().snapshot().skipped_entries, 2);

        let frames = handoff.recv().await.unwrap();
        let frame = br#"{"type":"update","data":[
            {"id":"A1","latitude":34.0,"longitude":-118.0},
            {"id":"BAD","latitude":120.0,"longitude":-118.0}
        ]}"#;
        frames.send(Ok(frame.to_vec())).unwrap();

        match expect_event(&mut transport).await {
            TransportEvent::SnapshotBatch { tracks, .. } => assert_eq!(tracks.len(), 1),
            other => panic!("expected push batch, got {other:?}"),
        }

        let stats = transport.stats().snapshot();
        assert_eq!(stats.skipped_entries, 3);
        assert_eq!(stats.malformed_frames, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_poll_interval_while_connected() {
        let (connector, _handoff) = MockConnector::new();
        let poller = MockPoller::default();
        let fetches = Arc::clone(&poller.fetches);
        let mut transport = Transport::spawn_with(TransportConfig::default(), connector, poller);

        let start = Instant::now();
        expect_event(&mut transport).await; // seed
        expect_event(&mut transport).await; // connected

        sleep(Duration::from_millis(30_500)).await;

        let offsets: Vec<_> = fetches.lock().unwrap().iter().map(|t| *t - start).collect();
        assert_eq!(
            offsets,
            vec![Duration::ZERO, Duration::from_secs(15), Duration::from_secs(30)]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_polling_while_connected_when_disabled() {
        let (connector, _handoff) = MockConnector::new();
        let poller = MockPoller::default();
        let fetches = Arc::clone(&poller.fetches);
        let config = TransportConfig {
            poll_when_connected: false,
            ..Default::default()
        };
        let mut transport = Transport::spawn_with(config, connector, poller);

        expect_event(&mut transport).await; // seed
        expect_event(&mut transport).await; // connected

        sleep(Duration::from_secs(61)).await;
        assert_eq!(fetches.lock().unwrap().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_closes_connection_and_stops_events() {
        let (connector, mut handoff) = MockConnector::new();
        let log = Arc::clone(&connector.log);
        let poller = MockPoller::default();
        let fetches = Arc::clone(&poller.fetches);
        let mut transport = Transport::spawn_with(TransportConfig::default(), connector, poller);

        expect_event(&mut transport).await; // seed
        expect_event(&mut transport).await; // connected
        let frames = handoff.recv().await.unwrap();
        assert_eq!(log.open.load(Ordering::SeqCst), 1);

        transport.shutdown();
        assert!(transport.recv().await.is_none());

        transport.shutdown_and_wait().await;
        assert_eq!(log.open.load(Ordering::SeqCst), 0);

        sleep(Duration::from_secs(60)).await;
        assert_eq!(log.attempts().len(), 1);
        assert_eq!(fetches.lock().unwrap().len(), 1);
    }
}

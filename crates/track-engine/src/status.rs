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

//! Ingestion statistics and engine status.

use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};

use crate::transport::ConnectionState;

/// Counters updated by the transport tasks.
#[derive(Debug, Default)]
pub struct TransportStats {
    connect_attempts: AtomicU64,
    connect_failures: AtomicU64,
    frames_received: AtomicU64,
    malformed_frames: AtomicU64,
    skipped_entries: AtomicU64,
    push_batches: AtomicU64,
    poll_batches: AtomicU64,
    poll_failures: AtomicU64,
}

/// Point-in-time copy of [`TransportStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TransportStatsSnapshot {
    pub connect_attempts: u64,
    pub connect_failures: u64,
    pub frames_received: u64,
    pub malformed_frames: u64,
    /// Entries dropped from otherwise valid push frames and poll bodies.
    pub skipped_entries: u64,
    pub push_batches: u64,
    pub poll_batches: u64,
    pub poll_failures: u64,
}

impl TransportStats {
    pub(crate) fn record_connect_attempt(&self) {
        self.connect_attempts.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_connect_failure(&self) {
        self.connect_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_frame(&self) {
        self.frames_received.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_malformed(&self) {
        self.malformed_frames.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_skipped_entries(&self, count: u64) {
        if count > 0 {
            self.skipped_entries.fetch_add(count, Ordering::Relaxed);
        }
    }

    pub(crate) fn record_push_batch(&self) {
        self.push_batches.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_poll_batch(&self) {
        self.poll_batches.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_poll_failure(&self) {
        self.poll_failures.fetch_add(1, Ordering::Relaxed);
    }

    #[must_use]
    pub fn snapshot(&self) -> TransportStatsSnapshot {
        TransportStatsSnapshot {
            connect_attempts: self.connect_attempts.load(Ordering::Relaxed),
            connect_failures: self.connect_failures.load(Ordering::Relaxed),
            frames_received: self.frames_received.load(Ordering::Relaxed),
            malformed_frames: self.malformed_frames.load(Ordering::Relaxed),
            skipped_entries: self.skipped_entries.load(Ordering::Relaxed),
            push_batches: self.push_batches.load(Ordering::Relaxed),
            poll_batches: self.poll_batches.load(Ordering::Relaxed),
            poll_failures: self.poll_failures.load(Ordering::Relaxed),
        }
    }
}

/// Overall engine status for diagnostics.
#[derive(Debug, Clone)]
pub struct EngineStatus {
    /// Current push connection state.
    pub connection: ConnectionState,
    /// Number of aircraft in the store.
    pub tracks: usize,
    /// Number of aircraft in the latest visible set.
    pub visible: usize,
    /// Extrapolation ticks run so far.
    pub ticks: u64,
    /// When the last batch was applied.
    pub last_batch_at: Option<DateTime<Utc>>,
    /// Transport counters.
    pub transport: TransportStatsSnapshot,
}

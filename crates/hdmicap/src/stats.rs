// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 hdmicap developers

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

/// Counters shared by the pipeline threads.
#[derive(Debug, Default)]
pub struct Stats {
    sessions_started: AtomicU64,
    frames_captured: AtomicU64,
    frames_submitted: AtomicU64,
    frames_dropped: AtomicU64,
    send_retries: AtomicU64,
    requeue_failures: AtomicU64,
    packets: AtomicU64,
    bytes: AtomicU64,
}

/// Point-in-time copy of [`Stats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    pub sessions_started: u64,
    pub frames_captured: u64,
    pub frames_submitted: u64,
    pub frames_dropped: u64,
    pub send_retries: u64,
    pub requeue_failures: u64,
    pub packets: u64,
    pub bytes: u64,
}

impl Stats {
    pub(crate) fn session_started(&self) {
        self.sessions_started.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn frame_captured(&self) {
        self.frames_captured.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn frame_submitted(&self) {
        self.frames_submitted.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn frame_dropped(&self) {
        self.frames_dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn send_retried(&self) {
        self.send_retries.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn requeue_failed(&self) {
        self.requeue_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn packet(&self, len: usize) {
        self.packets.fetch_add(1, Ordering::Relaxed);
        self.bytes.fetch_add(len as u64, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            sessions_started: self.sessions_started.load(Ordering::Relaxed),
            frames_captured: self.frames_captured.load(Ordering::Relaxed),
            frames_submitted: self.frames_submitted.load(Ordering::Relaxed),
            frames_dropped: self.frames_dropped.load(Ordering::Relaxed),
            send_retries: self.send_retries.load(Ordering::Relaxed),
            requeue_failures: self.requeue_failures.load(Ordering::Relaxed),
            packets: self.packets.load(Ordering::Relaxed),
            bytes: self.bytes.load(Ordering::Relaxed),
        }
    }
}

// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 hdmicap developers

//! Input signal format detection.
//!
//! The `format-detect` thread runs for the life of the process:
//!
//! ```text
//! subscribe ─► query ─► classify ─► publish + report ─► [restart session] ─► wait event ─┐
//!                ▲                                                                          │
//!                └──────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! A failed subscription or event dequeue ends the thread, leaving the rest
//! of the pipeline running on the last published state.

use crate::{
    cancel::CancelToken,
    config::VideoConfig,
    device::SignalSource,
    format::{classify, Detection, FormatState, SharedFormat},
    sink::FormatReporter,
    streamer::Streamer,
    Error,
};
use log::{error, info, warn};
use std::{
    sync::Arc,
    thread::{self, JoinHandle},
    time::Duration,
};

/// Handle to the running detector thread.
pub struct FormatDetector {
    token: CancelToken,
    thread: Option<JoinHandle<()>>,
}

struct DetectorLoop {
    source: Box<dyn SignalSource>,
    format: SharedFormat,
    reporter: Arc<dyn FormatReporter>,
    streamer: Arc<Streamer>,
    event_poll: Duration,
    query_retry: Duration,
}

impl FormatDetector {
    pub fn spawn(
        config: &VideoConfig,
        source: Box<dyn SignalSource>,
        format: SharedFormat,
        reporter: Arc<dyn FormatReporter>,
        streamer: Arc<Streamer>,
    ) -> Result<Self, Error> {
        let token = CancelToken::new();
        let mut detector = DetectorLoop {
            source,
            format,
            reporter,
            streamer,
            event_poll: config.event_poll(),
            query_retry: config.query_retry(),
        };
        let thread_token = token.clone();
        let thread = thread::Builder::new()
            .name("format-detect".into())
            .spawn(move || detector.run(&thread_token))
            .map_err(Error::ThreadSpawn)?;
        Ok(FormatDetector {
            token,
            thread: Some(thread),
        })
    }

    /// Whether the detector thread has exited.
    pub fn is_finished(&self) -> bool {
        self.thread.as_ref().map_or(true, |thread| thread.is_finished())
    }

    /// Cancel the thread and wait for it.
    pub fn stop(&mut self) {
        self.token.cancel();
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                error!("format-detect thread panicked");
            }
        }
    }
}

impl Drop for FormatDetector {
    fn drop(&mut self) {
        self.stop();
    }
}

impl DetectorLoop {
    fn run(&mut self, token: &CancelToken) {
        if let Err(err) = self.source.subscribe_source_change() {
            error!("failed to subscribe to source-change events: {}", err);
            return;
        }
        info!("format detector running");

        while !token.is_cancelled() {
            match classify(self.source.query_timings()) {
                Detection::Present(timings) => {
                    let state = FormatState::present(&timings);
                    info!(
                        "signal present: {}x{} @ {:.2} fps",
                        state.width, state.height, state.fps
                    );
                    self.publish(state);
                    if let Err(err) = self.streamer.restart_if_streaming() {
                        error!("failed to restart streaming: {}", err);
                    }
                }
                Detection::Absent(reason) => {
                    info!("no signal: {}", reason);
                    self.publish(FormatState::absent(reason));
                }
                Detection::Retry(err) => {
                    warn!("DV timings query failed: {}", err);
                    token.sleep(self.query_retry);
                    continue;
                }
            }

            if !self.wait_for_event(token) {
                break;
            }
        }
        info!("format detector stopped");
    }

    fn publish(&self, state: FormatState) {
        self.format.set(state);
        self.reporter.on_format(&state);
    }

    /// Block until the next source-change event. `false` ends the loop.
    fn wait_for_event(&mut self, token: &CancelToken) -> bool {
        while !token.is_cancelled() {
            match self.source.wait_event(self.event_poll) {
                Ok(true) => return true,
                Ok(false) => continue,
                Err(err) => {
                    error!("failed to dequeue subdevice event: {}", err);
                    return false;
                }
            }
        }
        false
    }
}

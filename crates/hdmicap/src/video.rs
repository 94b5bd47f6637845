// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 hdmicap developers

//! Process-level entry points.
//!
//! [`Video`] ties the pipeline together for a host process: it owns the
//! memory pool, the `format-detect` thread and the streaming orchestrator,
//! and exposes the handful of operations a control plane needs.

use crate::{
    capture::CaptureEngine,
    config::VideoConfig,
    detect::FormatDetector,
    device::{CaptureBackend, SignalSource},
    format::{FormatState, SharedFormat},
    mpi::{Mpi, RockitMpi},
    pool::BufferPool,
    quality::QualityFactor,
    sink::{FormatReporter, StreamSink},
    stats::{Stats, StatsSnapshot},
    streamer::Streamer,
    v4l2::{V4l2Backend, V4l2Subdev},
    Error,
};
use log::{debug, info};
use std::sync::Arc;

/// The hardware the pipeline drives.
///
/// Production code uses [`Hardware::rockit`]; anything implementing the
/// device traits can be substituted.
pub struct Hardware {
    pub mpi: Arc<dyn Mpi>,
    pub capture: Arc<dyn CaptureBackend>,
    pub signal: Box<dyn SignalSource>,
}

impl Hardware {
    /// Rockit MPI plus the V4L2 devices named in `config`.
    ///
    /// Initialises the media process system and opens the control
    /// subdevice. The capture device itself is opened per session.
    pub fn rockit(config: &VideoConfig) -> Result<Self, Error> {
        let mpi = RockitMpi::new()?;
        let signal = V4l2Subdev::open(&config.subdevice)?;
        Ok(Hardware {
            mpi: Arc::new(mpi),
            capture: Arc::new(V4l2Backend::new(&config.capture_device)),
            signal: Box::new(signal),
        })
    }
}

struct Running {
    streamer: Arc<Streamer>,
    detector: FormatDetector,
}

/// A running capture pipeline.
pub struct Video {
    running: Option<Running>,
    format: SharedFormat,
    quality: Arc<QualityFactor>,
    stats: Arc<Stats>,
}

impl Video {
    /// Create the memory pool and start format detection.
    ///
    /// Streaming does not begin until [`Video::start_streaming`]. A pool
    /// creation failure is returned as-is; nothing is retried.
    pub fn init(
        config: VideoConfig,
        hardware: Hardware,
        sink: Arc<dyn StreamSink>,
        reporter: Arc<dyn FormatReporter>,
    ) -> Result<Self, Error> {
        config.validate()?;
        let Hardware {
            mpi,
            capture,
            signal,
        } = hardware;

        let pool = BufferPool::create(mpi, config.block_size(), config.buffer_count)?;
        let format = SharedFormat::default();
        let quality = Arc::new(QualityFactor::new(config.quality));
        let stats = Arc::new(Stats::default());

        let engine = Arc::new(CaptureEngine {
            config: config.clone(),
            pool,
            backend: capture,
            format: format.clone(),
            quality: Arc::clone(&quality),
            sink,
            stats: Arc::clone(&stats),
        });
        let streamer = Arc::new(Streamer::new(engine));
        let detector = FormatDetector::spawn(
            &config,
            signal,
            format.clone(),
            reporter,
            Arc::clone(&streamer),
        )?;
        info!("video pipeline initialised");

        Ok(Video {
            running: Some(Running { streamer, detector }),
            format,
            quality,
            stats,
        })
    }

    fn streamer(&self) -> Result<&Streamer, Error> {
        self.running
            .as_ref()
            .map(|running| running.streamer.as_ref())
            .ok_or_else(|| Error::InvalidArgument("video pipeline is shut down".into()))
    }

    /// Begin capture sessions. No-op if already streaming.
    pub fn start_streaming(&self) -> Result<(), Error> {
        self.streamer()?.start()
    }

    /// End the current session and wait for its teardown. No-op if idle.
    pub fn stop_streaming(&self) {
        if let Ok(streamer) = self.streamer() {
            streamer.stop();
        }
    }

    /// Store a new quality factor, clamped to `[0, 1]`.
    ///
    /// An active session is restarted so its encoder picks up the new
    /// bitrate.
    pub fn set_quality_factor(&self, factor: f32) -> Result<(), Error> {
        let stored = self.quality.set(factor);
        info!("quality factor set to {:.2}", stored);
        if let Some(running) = &self.running {
            running.streamer.restart_if_streaming()?;
        }
        Ok(())
    }

    pub fn quality_factor(&self) -> f32 {
        self.quality.get()
    }

    /// The most recently detected input format.
    pub fn format(&self) -> FormatState {
        self.format.get()
    }

    pub fn is_streaming(&self) -> bool {
        self.running
            .as_ref()
            .map_or(false, |running| running.streamer.is_streaming())
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    /// Whether the detector thread is still running.
    pub fn is_detecting(&self) -> bool {
        self.running
            .as_ref()
            .map_or(false, |running| !running.detector.is_finished())
    }

    /// Stop everything and release the hardware. Safe to call repeatedly.
    ///
    /// The detector is stopped first so it cannot restart a session that
    /// is being torn down. The pool is destroyed once the last session
    /// reference is gone.
    pub fn shutdown(&mut self) {
        let Some(Running {
            streamer,
            mut detector,
        }) = self.running.take()
        else {
            return;
        };
        detector.stop();
        streamer.stop();
        drop(streamer);
        debug!("video pipeline shut down");
    }
}

impl Drop for Video {
    fn drop(&mut self) {
        self.shutdown();
    }
}

// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 hdmicap developers

use crate::Error;
use serde::{Deserialize, Serialize};
use std::{
    fs,
    path::{Path, PathBuf},
    time::Duration,
};

/// Write the raw YUYV bytes of one captured frame to a file.
///
/// Frame numbers count from zero within each session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrameDump {
    pub frame: u32,
    pub path: PathBuf,
}

/// Pipeline configuration.
///
/// Every field has a default matching the RV1106 HDMI-in board, so an empty
/// JSON object is a valid configuration.
///
/// ```
/// use hdmicap::config::VideoConfig;
///
/// let config = VideoConfig::default()
///     .with_capture_device("/dev/video1")
///     .with_quality(0.5);
/// assert_eq!(config.buffer_count, 3);
/// assert_eq!(config.quality, 0.5);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VideoConfig {
    /// Multi-planar V4L2 capture node.
    pub capture_device: PathBuf,
    /// HDMI receiver control subdevice.
    pub subdevice: PathBuf,
    pub buffer_count: u32,
    /// Pool block geometry; one block holds the largest supported frame.
    pub max_width: u32,
    pub max_height: u32,
    pub bytes_per_pixel: u32,
    pub quality: f32,
    pub channel: i32,
    pub gop: u32,

    pub no_signal_backoff_ms: u64,
    pub open_retry_ms: u64,
    pub format_retry_ms: u64,
    pub ready_timeout_ms: u64,
    pub send_timeout_ms: u32,
    pub send_retry_backoff_ms: u64,
    pub stream_timeout_ms: u32,
    pub event_poll_ms: u64,
    pub query_retry_ms: u64,

    pub frame_dump: Option<FrameDump>,
}

impl Default for VideoConfig {
    fn default() -> Self {
        VideoConfig {
            capture_device: PathBuf::from("/dev/video0"),
            subdevice: PathBuf::from("/dev/v4l-subdev2"),
            buffer_count: 3,
            max_width: 1920,
            max_height: 1080,
            bytes_per_pixel: 3,
            quality: 1.0,
            channel: 0,
            gop: 60,
            no_signal_backoff_ms: 100,
            open_retry_ms: 1000,
            format_retry_ms: 100,
            ready_timeout_ms: 1000,
            send_timeout_ms: 2000,
            send_retry_backoff_ms: 1,
            stream_timeout_ms: 200,
            event_poll_ms: 200,
            query_retry_ms: 1000,
            frame_dump: None,
        }
    }
}

impl VideoConfig {
    /// Load a JSON configuration file; missing fields take their defaults.
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self, Error> {
        let text = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&text)?)
    }

    /// Size in bytes of each pool block.
    pub fn block_size(&self) -> u64 {
        u64::from(self.max_width) * u64::from(self.max_height) * u64::from(self.bytes_per_pixel)
    }

    pub fn with_capture_device<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.capture_device = path.into();
        self
    }

    pub fn with_subdevice<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.subdevice = path.into();
        self
    }

    pub fn with_quality(mut self, quality: f32) -> Self {
        self.quality = quality;
        self
    }

    pub fn with_buffer_count(mut self, count: u32) -> Self {
        self.buffer_count = count;
        self
    }

    pub fn with_frame_dump<P: Into<PathBuf>>(mut self, frame: u32, path: P) -> Self {
        self.frame_dump = Some(FrameDump {
            frame,
            path: path.into(),
        });
        self
    }

    pub fn validate(&self) -> Result<(), Error> {
        if self.buffer_count == 0 {
            return Err(Error::InvalidArgument("buffer_count must be at least 1".into()));
        }
        if self.block_size() == 0 {
            return Err(Error::InvalidArgument("pool block size must be non-zero".into()));
        }
        if self.gop == 0 {
            return Err(Error::InvalidArgument("gop must be at least 1".into()));
        }
        Ok(())
    }

    pub(crate) fn no_signal_backoff(&self) -> Duration {
        Duration::from_millis(self.no_signal_backoff_ms)
    }

    pub(crate) fn open_retry(&self) -> Duration {
        Duration::from_millis(self.open_retry_ms)
    }

    pub(crate) fn format_retry(&self) -> Duration {
        Duration::from_millis(self.format_retry_ms)
    }

    pub(crate) fn ready_timeout(&self) -> Duration {
        Duration::from_millis(self.ready_timeout_ms)
    }

    pub(crate) fn send_retry_backoff(&self) -> Duration {
        Duration::from_millis(self.send_retry_backoff_ms)
    }

    pub(crate) fn event_poll(&self) -> Duration {
        Duration::from_millis(self.event_poll_ms)
    }

    pub(crate) fn query_retry(&self) -> Duration {
        Duration::from_millis(self.query_retry_ms)
    }
}

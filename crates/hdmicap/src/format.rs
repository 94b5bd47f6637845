// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 hdmicap developers

//! Detected input format and its classification.
//!
//! The control subdevice answers a timings query either with the detected
//! digital-video timings or with an errno that says why there are none.
//! [`classify`] turns that answer into a [`Detection`]; the detector thread
//! publishes the result as a [`FormatState`].

use serde::{Deserialize, Serialize};
use std::{
    fmt, io,
    sync::{Arc, RwLock},
};

/// Digital-video timings reported by the HDMI receiver.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DvTimings {
    pub width: u32,
    pub height: u32,
    pub pixelclock: u64,
    pub hfrontporch: u32,
    pub hsync: u32,
    pub hbackporch: u32,
    pub vfrontporch: u32,
    pub vsync: u32,
    pub vbackporch: u32,
}

impl DvTimings {
    /// Total line length including horizontal blanking.
    pub fn total_width(&self) -> u64 {
        u64::from(self.width)
            + u64::from(self.hfrontporch)
            + u64::from(self.hsync)
            + u64::from(self.hbackporch)
    }

    /// Total frame height including vertical blanking.
    pub fn total_height(&self) -> u64 {
        u64::from(self.height)
            + u64::from(self.vfrontporch)
            + u64::from(self.vsync)
            + u64::from(self.vbackporch)
    }

    /// Frame rate derived from the pixel clock; 0 for degenerate timings.
    pub fn fps(&self) -> f64 {
        let total = self.total_width() * self.total_height();
        if total == 0 {
            return 0.0;
        }
        self.pixelclock as f64 / total as f64
    }
}

/// Why no signal is present.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalReason {
    #[default]
    #[serde(rename = "")]
    None,
    /// ENOLINK: nothing connected or no TMDS clock.
    NoSignal,
    /// ENOLCK: a signal is present but the receiver cannot lock to it.
    NoLock,
    /// ERANGE: the timings are outside what the receiver supports.
    OutOfRange,
}

impl SignalReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            SignalReason::None => "",
            SignalReason::NoSignal => "no_signal",
            SignalReason::NoLock => "no_lock",
            SignalReason::OutOfRange => "out_of_range",
        }
    }
}

impl fmt::Display for SignalReason {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The detector's view of the input, as reported to the format reporter.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct FormatState {
    pub signal_present: bool,
    pub reason: SignalReason,
    pub width: u32,
    pub height: u32,
    pub fps: f64,
}

impl FormatState {
    pub fn present(timings: &DvTimings) -> Self {
        FormatState {
            signal_present: true,
            reason: SignalReason::None,
            width: timings.width,
            height: timings.height,
            fps: timings.fps(),
        }
    }

    pub fn absent(reason: SignalReason) -> Self {
        FormatState {
            signal_present: false,
            reason,
            ..Default::default()
        }
    }
}

/// Outcome of one timings query.
#[derive(Debug)]
pub enum Detection {
    Present(DvTimings),
    Absent(SignalReason),
    /// Unclassified failure; the caller logs and queries again later.
    Retry(io::Error),
}

/// Classify the result of a timings query.
pub fn classify(result: Result<DvTimings, io::Error>) -> Detection {
    match result {
        Ok(timings) => Detection::Present(timings),
        Err(err) => match err.raw_os_error() {
            Some(libc::ENOLINK) => Detection::Absent(SignalReason::NoSignal),
            Some(libc::ENOLCK) => Detection::Absent(SignalReason::NoLock),
            Some(libc::ERANGE) => Detection::Absent(SignalReason::OutOfRange),
            _ => Detection::Retry(err),
        },
    }
}

/// Format state shared between the detector and the capture engine.
///
/// The detector is the only writer.
#[derive(Debug, Clone, Default)]
pub struct SharedFormat(Arc<RwLock<FormatState>>);

impl SharedFormat {
    pub fn get(&self) -> FormatState {
        *self.0.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub(crate) fn set(&self, state: FormatState) {
        *self.0.write().unwrap_or_else(|poisoned| poisoned.into_inner()) = state;
    }
}

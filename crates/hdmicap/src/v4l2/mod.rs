// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 hdmicap developers

//! Kernel V4L2 implementations of the device interfaces.
//!
//! - [`V4l2Backend`] / [`V4l2Capture`]: the multi-planar capture node
//!   (`/dev/video0` on RV1106 HDMI-in boards), importing DMA-buf memory
//!   from the rockit pool.
//! - [`V4l2Subdev`]: the HDMI receiver subdevice, used for DV timings
//!   queries and source-change events.
//!
//! Readiness waits use `poll(2)` with a timeout: `POLLIN` for captured
//! frames, `POLLPRI` for pending events.

mod capture;
mod subdev;
pub mod sys;

pub use capture::{V4l2Backend, V4l2Capture};
pub use subdev::V4l2Subdev;

use crate::Error;
use nix::{
    errno::Errno,
    poll::{poll, PollFd, PollFlags, PollTimeout},
};
use std::{os::fd::AsFd, time::Duration};

/// Outcome of a single `poll(2)` on one descriptor.
pub(crate) enum PollOutcome {
    Ready,
    TimedOut,
    Interrupted,
}

pub(crate) fn poll_one<F: AsFd>(
    fd: &F,
    events: PollFlags,
    timeout: Duration,
) -> Result<PollOutcome, Error> {
    let ms = u16::try_from(timeout.as_millis()).unwrap_or(u16::MAX);
    let mut fds = [PollFd::new(fd.as_fd(), events)];
    match poll(&mut fds, PollTimeout::from(ms)) {
        Ok(0) => Ok(PollOutcome::TimedOut),
        Ok(_) => Ok(PollOutcome::Ready),
        Err(Errno::EINTR) => Ok(PollOutcome::Interrupted),
        Err(err) => Err(err.into()),
    }
}

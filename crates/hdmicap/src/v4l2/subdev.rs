// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 hdmicap developers

use super::{poll_one, sys, PollOutcome};
use crate::{device::SignalSource, format::DvTimings, Error};
use log::{debug, trace};
use nix::poll::PollFlags;
use std::{
    fs::{File, OpenOptions},
    io,
    os::fd::AsRawFd,
    path::Path,
    time::Duration,
};

/// The HDMI receiver's V4L2 subdevice.
#[derive(Debug)]
pub struct V4l2Subdev {
    file: File,
}

impl V4l2Subdev {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, Error> {
        let path = path.as_ref();
        let file = OpenOptions::new().read(true).write(true).open(path)?;
        debug!("opened control subdevice {}", path.display());
        Ok(V4l2Subdev { file })
    }
}

impl SignalSource for V4l2Subdev {
    fn subscribe_source_change(&mut self) -> Result<(), Error> {
        let mut sub: sys::v4l2_event_subscription = unsafe { sys::zeroed() };
        sub.type_ = sys::V4L2_EVENT_SOURCE_CHANGE;
        unsafe { sys::vidioc_subscribe_event(self.file.as_raw_fd(), &sub) }?;
        Ok(())
    }

    fn query_timings(&mut self) -> Result<DvTimings, io::Error> {
        let mut timings: sys::v4l2_dv_timings = unsafe { sys::zeroed() };
        unsafe { sys::vidioc_query_dv_timings(self.file.as_raw_fd(), &mut timings) }
            .map_err(io::Error::from)?;
        let bt = unsafe { timings.__bindgen_anon_1.bt };
        Ok(DvTimings {
            width: bt.width,
            height: bt.height,
            pixelclock: bt.pixelclock,
            hfrontporch: bt.hfrontporch,
            hsync: bt.hsync,
            hbackporch: bt.hbackporch,
            vfrontporch: bt.vfrontporch,
            vsync: bt.vsync,
            vbackporch: bt.vbackporch,
        })
    }

    fn wait_event(&mut self, timeout: Duration) -> Result<bool, Error> {
        match poll_one(&self.file, PollFlags::POLLPRI, timeout)? {
            PollOutcome::Ready => {}
            PollOutcome::TimedOut | PollOutcome::Interrupted => return Ok(false),
        }
        let mut event: sys::v4l2_event = unsafe { sys::zeroed() };
        unsafe { sys::vidioc_dqevent(self.file.as_raw_fd(), &mut event) }?;
        trace!("subdevice event type {} sequence {}", event.type_, event.sequence);
        Ok(true)
    }
}

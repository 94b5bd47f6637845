// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 hdmicap developers

//! Capture device and control subdevice interfaces.
//!
//! The capture engine and format detector only talk to hardware through
//! these traits. [`crate::v4l2`] implements them with kernel ioctls.

use crate::{format::DvTimings, fourcc::FourCC, Error};
use std::{io, time::Duration};
use unix_ts::Timestamp;

/// The plane descriptor reported by the driver for one buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlaneInfo {
    pub index: u32,
    pub length: u32,
}

/// A buffer handed back by the driver.
#[derive(Debug, Clone, Copy)]
pub struct DequeuedPlane {
    pub index: u32,
    /// The DMA-buf fd the buffer was queued with.
    pub fd: i32,
    pub bytesused: u32,
    pub sequence: u32,
    pub timestamp: Timestamp,
}

/// Result of waiting for a captured frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Readiness {
    Ready,
    TimedOut,
    Interrupted,
}

/// An open multi-planar capture device. Dropping it closes the device.
pub trait CaptureDevice: Send {
    fn set_format(&mut self, width: u32, height: u32, fourcc: FourCC) -> Result<(), Error>;
    /// Request `count` DMA-buf buffers; returns the number granted.
    fn request_buffers(&mut self, count: u32) -> Result<u32, Error>;
    fn query_plane(&mut self, index: u32) -> Result<PlaneInfo, Error>;
    /// Queue buffer `index` backed by the DMA-buf `fd`.
    fn queue(&mut self, index: u32, fd: i32, length: u32) -> Result<(), Error>;
    fn dequeue(&mut self) -> Result<DequeuedPlane, Error>;
    fn stream_on(&mut self) -> Result<(), Error>;
    fn stream_off(&mut self) -> Result<(), Error>;
    fn wait_ready(&mut self, timeout: Duration) -> Result<Readiness, Error>;
}

/// Opens capture devices. One device is opened per streaming session.
pub trait CaptureBackend: Send + Sync {
    fn open(&self) -> Result<Box<dyn CaptureDevice>, Error>;
}

/// The HDMI receiver's control subdevice.
pub trait SignalSource: Send {
    fn subscribe_source_change(&mut self) -> Result<(), Error>;
    /// The detected timings, or the driver's errno when there are none.
    fn query_timings(&mut self) -> Result<DvTimings, io::Error>;
    /// Wait up to `timeout` for the next event.
    ///
    /// `Ok(true)` when an event was dequeued, `Ok(false)` on timeout.
    fn wait_event(&mut self, timeout: Duration) -> Result<bool, Error>;
}

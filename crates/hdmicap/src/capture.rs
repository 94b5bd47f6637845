// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 hdmicap developers

//! Capture session engine.
//!
//! [`CaptureEngine::run`] is the body of the `video-stream` thread. Each pass
//! through its loop is one capture session:
//!
//! 1. wait for the detector to report a signal,
//! 2. open the capture device,
//! 3. negotiate YUYV at the detected resolution,
//! 4. request DMA-buf buffers and back each one with a pool block,
//! 5. STREAMON and start an encoder channel sized for this resolution,
//! 6. dequeue, submit and requeue frames until the session ends,
//! 7. tear everything down (see [`Session`]).
//!
//! Buffer ownership is tracked by the types: a [`Dequeued`] guard mutably
//! borrows the [`CaptureBuffers`] it came from, so a second dequeue cannot
//! happen while one frame is out, and the only way to reach a frame's memory
//! block is through its guard.

use crate::{
    cancel::CancelToken,
    config::{FrameDump, VideoConfig},
    device::{CaptureBackend, CaptureDevice, DequeuedPlane, PlaneInfo, Readiness},
    format::{FormatState, SharedFormat},
    fourcc::FourCC,
    monotonic_us,
    mpi::{ChannelAttributes, MemoryBlock, VideoFrame},
    pool::{BufferPool, PooledBlock},
    quality::{self, QualityFactor},
    retry::Retry,
    sink::StreamSink,
    stats::Stats,
    venc::{EncoderSettings, VencChannel},
    Error,
};
use dma_buf::DmaBuf;
use log::{debug, error, info, warn};
use std::{
    fmt, fs, io,
    os::fd::{BorrowedFd, FromRawFd, IntoRawFd},
    sync::Arc,
    time::Duration,
};

/// Why a capture session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEnd {
    /// The session's cancel token was triggered.
    Cancelled,
    /// The detector reported loss of signal.
    SignalLost,
    /// No frame arrived within the readiness timeout.
    Stalled,
    /// Waiting for or dequeuing a frame failed.
    CaptureFailed,
    /// A buffer could not be given back to the driver.
    RequeueFailed,
}

impl fmt::Display for SessionEnd {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let reason = match self {
            SessionEnd::Cancelled => "stopped",
            SessionEnd::SignalLost => "signal lost",
            SessionEnd::Stalled => "capture stalled",
            SessionEnd::CaptureFailed => "capture failed",
            SessionEnd::RequeueFailed => "requeue failed",
        };
        f.write_str(reason)
    }
}

struct Slot {
    plane: PlaneInfo,
    block: PooledBlock,
    fd: i32,
    queued: bool,
}

/// The capture device and its pool-backed buffers for one session.
///
/// Dropping issues STREAMOFF if the driver still holds any buffer, releases
/// every block back to the pool and then closes the device.
pub struct CaptureBuffers {
    // Field order is drop order: blocks before the device.
    slots: Vec<Slot>,
    device: Box<dyn CaptureDevice>,
    requeue_retry: Retry,
    streaming: bool,
}

impl CaptureBuffers {
    /// Request `count` DMA-buf buffers, back each with a pool block and queue
    /// them all.
    ///
    /// On failure any buffer already queued is taken back with STREAMOFF,
    /// then the blocks acquired so far are released and the device is closed.
    pub fn allocate(
        device: Box<dyn CaptureDevice>,
        pool: &Arc<BufferPool>,
        count: u32,
        requeue_retry: Retry,
    ) -> Result<Self, Error> {
        let mut buffers = CaptureBuffers {
            slots: Vec::with_capacity(count as usize),
            device,
            requeue_retry,
            streaming: false,
        };

        let granted = buffers.device.request_buffers(count)?;
        if granted < count {
            return Err(Error::InvalidArgument(format!(
                "driver granted {} of {} capture buffers",
                granted, count
            )));
        }

        for index in 0..count {
            let plane = buffers.device.query_plane(index)?;
            let block = pool.acquire(u64::from(plane.length))?;
            let fd = block.fd()?;
            buffers.slots.push(Slot {
                plane,
                block,
                fd,
                queued: false,
            });
        }

        for slot in &mut buffers.slots {
            buffers
                .device
                .queue(slot.plane.index, slot.fd, slot.plane.length)?;
            slot.queued = true;
        }
        debug!("queued {} capture buffers", count);

        Ok(buffers)
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Number of buffers currently owned by the driver.
    pub fn queued(&self) -> usize {
        self.slots.iter().filter(|slot| slot.queued).count()
    }

    pub fn stream_on(&mut self) -> Result<(), Error> {
        self.device.stream_on()?;
        self.streaming = true;
        Ok(())
    }

    /// STREAMOFF if streaming or if the driver holds any buffer; failure is
    /// logged.
    ///
    /// STREAMOFF also empties the driver's incoming queue when STREAMON never
    /// succeeded.
    pub fn stream_off(&mut self) {
        if !self.streaming && self.queued() == 0 {
            return;
        }
        self.streaming = false;
        if let Err(err) = self.device.stream_off() {
            error!("VIDIOC_STREAMOFF failed: {}", err);
        }
        // The driver returns every buffer on STREAMOFF.
        for slot in &mut self.slots {
            slot.queued = false;
        }
    }

    pub fn wait_ready(&mut self, timeout: Duration) -> Result<Readiness, Error> {
        self.device.wait_ready(timeout)
    }

    /// Take the next filled buffer from the driver.
    pub fn dequeue(&mut self) -> Result<Dequeued<'_>, Error> {
        let plane = self.device.dequeue()?;
        let slot = self
            .slots
            .iter()
            .position(|slot| slot.fd == plane.fd)
            .or_else(|| self.slots.iter().position(|slot| slot.plane.index == plane.index))
            .ok_or_else(|| {
                Error::InvalidArgument(format!(
                    "driver returned unknown buffer {} (fd {})",
                    plane.index, plane.fd
                ))
            })?;
        if !self.slots[slot].queued {
            return Err(Error::InvalidArgument(format!(
                "driver returned buffer {} which was not queued",
                plane.index
            )));
        }
        self.slots[slot].queued = false;
        Ok(Dequeued {
            buffers: self,
            slot,
            plane,
            done: false,
        })
    }

    fn requeue_slot(&mut self, slot: usize) -> Result<(), Error> {
        let (index, fd, length) = {
            let slot = &self.slots[slot];
            (slot.plane.index, slot.fd, slot.plane.length)
        };
        let device = &mut self.device;
        let what = format!("requeue of buffer {}", index);
        self.requeue_retry
            .run(&what, || device.queue(index, fd, length))?;
        self.slots[slot].queued = true;
        Ok(())
    }
}

impl Drop for CaptureBuffers {
    fn drop(&mut self) {
        self.stream_off();
    }
}

/// A buffer between dequeue and requeue.
///
/// Dropping the guard requeues the buffer; call [`Dequeued::requeue`] to
/// observe the outcome.
pub struct Dequeued<'a> {
    buffers: &'a mut CaptureBuffers,
    slot: usize,
    plane: DequeuedPlane,
    done: bool,
}

impl Dequeued<'_> {
    /// The pool block holding this frame.
    pub fn block(&self) -> MemoryBlock {
        self.buffers.slots[self.slot].block.block()
    }

    pub fn plane(&self) -> &DequeuedPlane {
        &self.plane
    }

    /// The DMA-buf fd holding this frame.
    pub fn fd(&self) -> i32 {
        self.buffers.slots[self.slot].fd
    }

    /// Give the buffer back to the driver, retrying once.
    pub fn requeue(mut self) -> Result<(), Error> {
        self.done = true;
        self.buffers.requeue_slot(self.slot)
    }
}

impl Drop for Dequeued<'_> {
    fn drop(&mut self) {
        if !self.done {
            if let Err(err) = self.buffers.requeue_slot(self.slot) {
                error!("failed to requeue buffer {}: {}", self.plane.index, err);
            }
        }
    }
}

/// All hardware held by one streaming session.
///
/// Dropping a session tears it down in a fixed order: STREAMOFF, encoder
/// stop (stop reception, join reader, destroy channel), block release,
/// device close. Each step is logged on failure and never skipped.
pub struct Session {
    buffers: CaptureBuffers,
    encoder: Option<VencChannel>,
}

impl Drop for Session {
    fn drop(&mut self) {
        self.buffers.stream_off();
        if let Some(encoder) = self.encoder.take() {
            encoder.stop();
        }
    }
}

/// Runs capture sessions until cancelled.
pub struct CaptureEngine {
    pub(crate) config: VideoConfig,
    pub(crate) pool: Arc<BufferPool>,
    pub(crate) backend: Arc<dyn CaptureBackend>,
    pub(crate) format: SharedFormat,
    pub(crate) quality: Arc<QualityFactor>,
    pub(crate) sink: Arc<dyn StreamSink>,
    pub(crate) stats: Arc<Stats>,
}

impl CaptureEngine {
    /// The session loop. Returns once `token` is cancelled.
    pub fn run(&self, token: &CancelToken) {
        info!("capture loop started");
        while !token.is_cancelled() {
            let state = self.format.get();
            if !state.signal_present {
                token.sleep(self.config.no_signal_backoff());
                continue;
            }

            let mut device = match self.backend.open() {
                Ok(device) => device,
                Err(err) => {
                    warn!(
                        "failed to open capture device {}: {}",
                        self.config.capture_device.display(),
                        err
                    );
                    token.sleep(self.config.open_retry());
                    continue;
                }
            };

            if let Err(err) = device.set_format(state.width, state.height, FourCC::YUYV) {
                warn!(
                    "failed to set capture format {}x{}: {}",
                    state.width, state.height, err
                );
                drop(device);
                token.sleep(self.config.format_retry());
                continue;
            }

            match self.run_session(device, &state, token) {
                Ok(end) => info!("capture session ended: {}", end),
                Err(err) => {
                    error!("capture session failed to start: {}", err);
                    token.sleep(self.config.open_retry());
                }
            }
        }
        info!("capture loop stopped");
    }

    fn run_session(
        &self,
        device: Box<dyn CaptureDevice>,
        state: &FormatState,
        token: &CancelToken,
    ) -> Result<SessionEnd, Error> {
        let (width, height) = (state.width, state.height);
        let requeue_retry = Retry::once(self.config.send_retry_backoff());
        let buffers =
            CaptureBuffers::allocate(device, &self.pool, self.config.buffer_count, requeue_retry)?;
        let mut session = Session {
            buffers,
            encoder: None,
        };

        session.buffers.stream_on()?;

        let factor = self.quality.get();
        let bitrate = quality::bitrate(factor, width, height);
        let attrs = ChannelAttributes::h264_vbr(
            bitrate,
            quality::max_bitrate(bitrate),
            width,
            height,
            self.config.gop,
        );
        session.encoder = Some(VencChannel::start(
            Arc::clone(self.pool.mpi()),
            EncoderSettings::from(&self.config),
            attrs,
            Arc::clone(&self.sink),
            Arc::clone(&self.stats),
        )?);
        self.stats.session_started();
        info!(
            "capture session started: {}x{} @ {:.2} fps, quality {:.2}",
            width, height, state.fps, factor
        );

        Ok(self.capture_frames(&mut session, &attrs, token))
    }

    fn capture_frames(
        &self,
        session: &mut Session,
        attrs: &ChannelAttributes,
        token: &CancelToken,
    ) -> SessionEnd {
        let ready_timeout = self.config.ready_timeout();
        let mut sequence: u32 = 0;
        let mut last_driver_seq: Option<u32> = None;

        while !token.is_cancelled() {
            if !self.format.get().signal_present {
                return SessionEnd::SignalLost;
            }

            match session.buffers.wait_ready(ready_timeout) {
                Ok(Readiness::Ready) => {}
                Ok(Readiness::Interrupted) => continue,
                Ok(Readiness::TimedOut) => {
                    warn!("no frame within {:?}", ready_timeout);
                    return SessionEnd::Stalled;
                }
                Err(err) => {
                    error!("waiting for capture failed: {}", err);
                    return SessionEnd::CaptureFailed;
                }
            }

            let frame = match session.buffers.dequeue() {
                Ok(frame) => frame,
                Err(err) => {
                    error!("VIDIOC_DQBUF failed: {}", err);
                    return SessionEnd::CaptureFailed;
                }
            };
            self.stats.frame_captured();

            let plane = *frame.plane();
            if let Some(last) = last_driver_seq {
                let skipped = plane.sequence.wrapping_sub(last).wrapping_sub(1);
                if skipped > 0 {
                    debug!("driver skipped {} frames before {}", skipped, plane.sequence);
                }
            }
            last_driver_seq = Some(plane.sequence);

            if let Some(dump) = &self.config.frame_dump {
                if dump.frame == sequence {
                    dump_frame(dump, frame.fd(), plane.bytesused);
                }
            }

            let video_frame = VideoFrame {
                block: frame.block(),
                width: attrs.width,
                height: attrs.height,
                vir_width: attrs.vir_width,
                vir_height: attrs.vir_height,
                time_ref: sequence,
                pts_us: frame_pts_us(&plane),
            };
            if let Some(encoder) = &session.encoder {
                encoder.submit_frame(&video_frame);
            }
            sequence = sequence.wrapping_add(1);

            if let Err(err) = frame.requeue() {
                self.stats.requeue_failed();
                error!("buffer lost to failed requeue, restarting session: {}", err);
                return SessionEnd::RequeueFailed;
            }
        }
        SessionEnd::Cancelled
    }
}

/// The driver's capture time in microseconds, or the current monotonic time
/// when the driver left the timestamp unset.
fn frame_pts_us(plane: &DequeuedPlane) -> u64 {
    match u64::try_from(plane.timestamp.at_precision(6)) {
        Ok(0) | Err(_) => monotonic_us(),
        Ok(us) => us,
    }
}

fn copy_frame(data: &[u8], len: Option<usize>) -> Result<Vec<u8>, Box<dyn std::error::Error>> {
    let len = len.unwrap_or(data.len()).min(data.len());
    Ok(data[..len].to_vec())
}

fn dump_frame(dump: &FrameDump, fd: i32, bytesused: u32) {
    let result = (|| -> Result<(), Error> {
        // DmaBuf closes its fd on drop, so hand it a duplicate.
        let owned = unsafe { BorrowedFd::borrow_raw(fd) }.try_clone_to_owned()?;
        let dma = unsafe { DmaBuf::from_raw_fd(owned.into_raw_fd()) };
        let mem = dma.memory_map().map_err(|e| {
            Error::Io(io::Error::new(io::ErrorKind::Other, format!("DMA map error: {}", e)))
        })?;
        let data = mem.read(copy_frame, Some(bytesused as usize)).map_err(|e| {
            Error::Io(io::Error::new(io::ErrorKind::Other, format!("DMA read error: {}", e)))
        })?;
        fs::write(&dump.path, &data)?;
        info!(
            "frame {} ({} bytes) written to {}",
            dump.frame,
            data.len(),
            dump.path.display()
        );
        Ok(())
    })();
    if let Err(err) = result {
        error!("failed to dump frame {}: {}", dump.frame, err);
    }
}

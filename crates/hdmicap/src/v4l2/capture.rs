// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 hdmicap developers

use super::{poll_one, sys, PollOutcome};
use crate::{
    device::{CaptureBackend, CaptureDevice, DequeuedPlane, PlaneInfo, Readiness},
    fourcc::FourCC,
    Error,
};
use log::{debug, warn};
use nix::poll::PollFlags;
use std::{
    fs::{File, OpenOptions},
    os::{fd::AsRawFd, raw::c_int},
    path::{Path, PathBuf},
    time::Duration,
};
use unix_ts::Timestamp;

/// Opens [`V4l2Capture`] devices at a fixed path.
#[derive(Debug, Clone)]
pub struct V4l2Backend {
    path: PathBuf,
}

impl V4l2Backend {
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        V4l2Backend { path: path.into() }
    }
}

impl CaptureBackend for V4l2Backend {
    fn open(&self) -> Result<Box<dyn CaptureDevice>, Error> {
        Ok(Box::new(V4l2Capture::open(&self.path)?))
    }
}

/// A multi-planar V4L2 capture device using DMA-buf memory.
#[derive(Debug)]
pub struct V4l2Capture {
    file: File,
    path: PathBuf,
}

impl V4l2Capture {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, Error> {
        let path = path.as_ref();
        let file = OpenOptions::new().read(true).write(true).open(path)?;
        debug!("opened capture device {}", path.display());
        Ok(V4l2Capture {
            file,
            path: path.to_path_buf(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn fd(&self) -> c_int {
        self.file.as_raw_fd()
    }

    fn buffer(plane: &mut sys::v4l2_plane) -> sys::v4l2_buffer {
        let mut buf: sys::v4l2_buffer = unsafe { sys::zeroed() };
        buf.type_ = sys::BUF_TYPE_CAPTURE_MPLANE;
        buf.memory = sys::MEMORY_DMABUF;
        buf.length = 1;
        buf.m.planes = plane as *mut sys::v4l2_plane;
        buf
    }
}

impl CaptureDevice for V4l2Capture {
    fn set_format(&mut self, width: u32, height: u32, fourcc: FourCC) -> Result<(), Error> {
        let mut fmt: sys::v4l2_format = unsafe { sys::zeroed() };
        fmt.type_ = sys::BUF_TYPE_CAPTURE_MPLANE;
        // Zeroed field is V4L2_FIELD_ANY.
        let mut pix_mp = unsafe { fmt.fmt.pix_mp };
        pix_mp.width = width;
        pix_mp.height = height;
        pix_mp.pixelformat = fourcc.as_u32();
        pix_mp.num_planes = 1;
        fmt.fmt.pix_mp = pix_mp;
        unsafe { sys::vidioc_s_fmt(self.fd(), &mut fmt) }?;

        let granted = unsafe { fmt.fmt.pix_mp };
        let (got_width, got_height) = (granted.width, granted.height);
        if (got_width, got_height) != (width, height) {
            warn!(
                "driver adjusted capture format {}x{} to {}x{}",
                width, height, got_width, got_height
            );
        }
        Ok(())
    }

    fn request_buffers(&mut self, count: u32) -> Result<u32, Error> {
        let mut req: sys::v4l2_requestbuffers = unsafe { sys::zeroed() };
        req.count = count;
        req.type_ = sys::BUF_TYPE_CAPTURE_MPLANE;
        req.memory = sys::MEMORY_DMABUF;
        unsafe { sys::vidioc_reqbufs(self.fd(), &mut req) }?;
        Ok(req.count)
    }

    fn query_plane(&mut self, index: u32) -> Result<PlaneInfo, Error> {
        let mut plane: sys::v4l2_plane = unsafe { sys::zeroed() };
        let mut buf = Self::buffer(&mut plane);
        buf.index = index;
        unsafe { sys::vidioc_querybuf(self.fd(), &mut buf) }?;
        Ok(PlaneInfo {
            index,
            length: plane.length,
        })
    }

    fn queue(&mut self, index: u32, fd: i32, length: u32) -> Result<(), Error> {
        let mut plane: sys::v4l2_plane = unsafe { sys::zeroed() };
        plane.length = length;
        plane.m.fd = fd;
        let mut buf = Self::buffer(&mut plane);
        buf.index = index;
        unsafe { sys::vidioc_qbuf(self.fd(), &mut buf) }?;
        Ok(())
    }

    fn dequeue(&mut self) -> Result<DequeuedPlane, Error> {
        let mut plane: sys::v4l2_plane = unsafe { sys::zeroed() };
        let mut buf = Self::buffer(&mut plane);
        unsafe { sys::vidioc_dqbuf(self.fd(), &mut buf) }?;
        let usec = (buf.timestamp.tv_usec as i64).clamp(0, 999_999) as u32;
        Ok(DequeuedPlane {
            index: buf.index,
            fd: unsafe { plane.m.fd },
            bytesused: plane.bytesused,
            sequence: buf.sequence,
            timestamp: Timestamp::new(buf.timestamp.tv_sec as i64, usec * 1000),
        })
    }

    fn stream_on(&mut self) -> Result<(), Error> {
        let ty = sys::BUF_TYPE_CAPTURE_MPLANE as c_int;
        unsafe { sys::vidioc_streamon(self.fd(), &ty) }?;
        Ok(())
    }

    fn stream_off(&mut self) -> Result<(), Error> {
        let ty = sys::BUF_TYPE_CAPTURE_MPLANE as c_int;
        unsafe { sys::vidioc_streamoff(self.fd(), &ty) }?;
        Ok(())
    }

    fn wait_ready(&mut self, timeout: Duration) -> Result<Readiness, Error> {
        Ok(match poll_one(&self.file, PollFlags::POLLIN, timeout)? {
            PollOutcome::Ready => Readiness::Ready,
            PollOutcome::TimedOut => Readiness::TimedOut,
            PollOutcome::Interrupted => Readiness::Interrupted,
        })
    }
}

impl Drop for V4l2Capture {
    fn drop(&mut self) {
        debug!("closing capture device {}", self.path.display());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn open_missing_device() {
        let err = V4l2Capture::open("/nonexistent/video0").unwrap_err();
        assert_eq!(err.raw_os_error(), Some(libc::ENOENT));
        assert!(V4l2Backend::new("/nonexistent/video0").open().is_err());
    }

    #[test]
    fn ioctl_on_non_v4l2_file_fails() {
        let mut dev = V4l2Capture::open("/dev/null").unwrap();
        assert!(dev.request_buffers(3).is_err());
        assert!(dev.set_format(1920, 1080, FourCC::YUYV).is_err());
    }

    #[test]
    #[ignore = "test requires an HDMI capture device at /dev/video0"]
    fn request_dmabuf_buffers() -> Result<(), Error> {
        let mut dev = V4l2Capture::open("/dev/video0")?;
        dev.set_format(1920, 1080, FourCC::YUYV)?;
        assert_eq!(dev.request_buffers(3)?, 3);
        let plane = dev.query_plane(0)?;
        assert!(plane.length >= 1920 * 1080 * 2);
        dev.request_buffers(0)?;
        Ok(())
    }
}

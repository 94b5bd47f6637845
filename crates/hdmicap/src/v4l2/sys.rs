// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 hdmicap developers
//
// videodev2.h structures come from the v4l crate's generated bindings; this
// module adds the ioctl wrappers the capture path issues.

#![allow(unsafe_op_in_unsafe_fn)]

use std::{mem, os::raw::c_int};
use v4l::{buffer::Type, memory::Memory};

pub use v4l::v4l_sys::{
    v4l2_buffer, v4l2_dv_timings, v4l2_event, v4l2_event_subscription, v4l2_format, v4l2_plane,
    v4l2_requestbuffers, V4L2_EVENT_SOURCE_CHANGE,
};

pub const BUF_TYPE_CAPTURE_MPLANE: u32 = Type::VideoCaptureMplane as u32;
pub const MEMORY_DMABUF: u32 = Memory::DmaBuf as u32;

/// An all-zero uAPI struct, the initial state the kernel expects.
///
/// # Safety
///
/// `T` must be one of the re-exported plain-old-data uAPI types.
pub unsafe fn zeroed<T: Copy>() -> T {
    mem::zeroed()
}

nix::ioctl_readwrite!(vidioc_s_fmt, b'V', 5, v4l2_format);
nix::ioctl_readwrite!(vidioc_reqbufs, b'V', 8, v4l2_requestbuffers);
nix::ioctl_readwrite!(vidioc_querybuf, b'V', 9, v4l2_buffer);
nix::ioctl_readwrite!(vidioc_qbuf, b'V', 15, v4l2_buffer);
nix::ioctl_readwrite!(vidioc_dqbuf, b'V', 17, v4l2_buffer);
nix::ioctl_write_ptr!(vidioc_streamon, b'V', 18, c_int);
nix::ioctl_write_ptr!(vidioc_streamoff, b'V', 19, c_int);
nix::ioctl_read!(vidioc_dqevent, b'V', 89, v4l2_event);
nix::ioctl_write_ptr!(vidioc_subscribe_event, b'V', 90, v4l2_event_subscription);
nix::ioctl_read!(vidioc_query_dv_timings, b'V', 99, v4l2_dv_timings);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kernel_enum_values() {
        assert_eq!(BUF_TYPE_CAPTURE_MPLANE, 9);
        assert_eq!(MEMORY_DMABUF, 4);
        assert_eq!(V4L2_EVENT_SOURCE_CHANGE, 5);
    }

    #[test]
    fn zeroed_buffer_has_no_planes() {
        let buf: v4l2_buffer = unsafe { zeroed() };
        assert_eq!(buf.index, 0);
        assert!(unsafe { buf.m.planes }.is_null());
    }
}

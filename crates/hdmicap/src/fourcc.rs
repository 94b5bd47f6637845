// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 hdmicap developers
#![forbid(unsafe_code)]

use core::fmt;

/// A V4L2 pixel format code.
///
/// V4L2 packs the four characters little-endian regardless of host byte
/// order (`v4l2_fourcc(a, b, c, d)` in `videodev2.h`).
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct FourCC(pub [u8; 4]);

impl FourCC {
    /// Packed YUV 4:2:2, the only format the HDMI receiver delivers.
    pub const YUYV: FourCC = FourCC(*b"YUYV");

    pub const fn new(code: &[u8; 4]) -> Self {
        FourCC(*code)
    }

    /// The `pixelformat` value as the kernel expects it.
    pub const fn as_u32(self) -> u32 {
        (self.0[0] as u32)
            | (self.0[1] as u32) << 8
            | (self.0[2] as u32) << 16
            | (self.0[3] as u32) << 24
    }

    pub const fn from_u32(val: u32) -> Self {
        FourCC([
            (val & 0xff) as u8,
            (val >> 8 & 0xff) as u8,
            (val >> 16 & 0xff) as u8,
            (val >> 24 & 0xff) as u8,
        ])
    }
}

impl From<&[u8; 4]> for FourCC {
    fn from(buf: &[u8; 4]) -> FourCC {
        FourCC(*buf)
    }
}

impl From<u32> for FourCC {
    fn from(val: u32) -> FourCC {
        FourCC::from_u32(val)
    }
}

impl From<FourCC> for u32 {
    fn from(val: FourCC) -> Self {
        val.as_u32()
    }
}

impl fmt::Display for FourCC {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match core::str::from_utf8(&self.0) {
            Ok(s) => f.write_str(s),
            Err(_) => {
                for b in self.0 {
                    write!(f, "{}", core::ascii::escape_default(b))?;
                }
                Ok(())
            }
        }
    }
}

impl fmt::Debug for FourCC {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FourCC({})", self)
    }
}

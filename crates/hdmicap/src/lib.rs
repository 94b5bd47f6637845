// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 hdmicap developers

//! hdmicap - HDMI capture-to-encode pipeline
//!
//! The capture path of a KVM-style appliance: an HDMI receiver exposed as a
//! V4L2 multi-planar capture device and a control subdevice, feeding the
//! Rockchip VENC hardware encoder through DMA memory blocks. The compressed
//! H.264 access units are handed to an external [`sink::StreamSink`].
//!
//! The pipeline survives signal loss and restoration, resolution changes, and
//! quality changes by tearing the whole capture/encode session down and
//! building a new one, never by reconfiguring live hardware.
//!
//! # Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use hdmicap::{config::VideoConfig, format::FormatState, video::{Hardware, Video}};
//!
//! let config = VideoConfig::default();
//! let hardware = Hardware::rockit(&config)?;
//! let video = Video::init(
//!     config,
//!     hardware,
//!     Arc::new(|unit: &[u8]| println!("access unit: {} bytes", unit.len())),
//!     Arc::new(|state: &FormatState| println!("format: {:?}", state)),
//! )?;
//! video.start_streaming()?;
//! # Ok::<(), hdmicap::Error>(())
//! ```
//!
//! # Threads
//!
//! - `format-detect` lives for the whole process and classifies the input signal.
//! - `video-stream` runs one capture session loop, recreated on every restart.
//! - `venc-reader` drains encoded packets, nested inside a capture session.

use std::{error, fmt, io, num::TryFromIntError};

/// Error type for pipeline operations
#[derive(Debug)]
pub enum Error {
    /// The rockit library (librockit.so) could not be loaded at runtime
    LibraryNotLoaded(rockit_sys::libloading::Error),

    /// The rockit library is loaded but lacks a required symbol
    SymbolNotFound(&'static str),

    /// I/O error from underlying system calls (ioctl, poll, open)
    Io(io::Error),

    /// A rockit MPI call returned a non-success code
    Mpi {
        /// The failing MPI entry point
        call: &'static str,
        /// Raw return code, see `rk_errno.h`
        code: i32,
    },

    /// Null pointer returned from the rockit library where a handle was expected
    NullPointer,

    /// Integer conversion error (try_from failed)
    TryFromInt(TryFromIntError),

    /// A caller-supplied value is outside what the hardware accepts
    InvalidArgument(String),

    /// The memory-block pool has no free block of the requested size
    PoolExhausted,

    /// A worker thread could not be spawned
    ThreadSpawn(io::Error),

    /// Configuration file could not be parsed
    Json(serde_json::Error),
}

impl Error {
    /// Whether this error is the VENC "no packet within timeout" condition.
    ///
    /// The encoder reader treats it as an idle poll, not a failure.
    pub fn is_buffer_empty(&self) -> bool {
        matches!(self, Error::Mpi { code, .. } if *code == rockit_sys::RK_ERR_VENC_BUF_EMPTY)
    }

    /// The errno carried by an I/O error, if any.
    pub fn raw_os_error(&self) -> Option<i32> {
        match self {
            Error::Io(err) | Error::ThreadSpawn(err) => err.raw_os_error(),
            _ => None,
        }
    }

    pub(crate) fn mpi(call: &'static str, code: i32) -> Self {
        Error::Mpi { call, code }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::LibraryNotLoaded(err) => {
                write!(f, "rockit library could not be loaded: {}", err)
            }
            Error::SymbolNotFound(sym) => write!(f, "rockit symbol not found: {}", sym),
            Error::Io(err) => write!(f, "I/O error: {}", err),
            Error::Mpi { call, code } => write!(f, "{} failed: {:#x}", call, code),
            Error::NullPointer => write!(f, "Null pointer returned from rockit library"),
            Error::TryFromInt(err) => write!(f, "Integer conversion error: {}", err),
            Error::InvalidArgument(msg) => write!(f, "Invalid argument: {}", msg),
            Error::PoolExhausted => write!(f, "memory block pool exhausted"),
            Error::ThreadSpawn(err) => write!(f, "failed to spawn thread: {}", err),
            Error::Json(err) => write!(f, "configuration error: {}", err),
        }
    }
}

impl error::Error for Error {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match self {
            Error::LibraryNotLoaded(err) => Some(err),
            Error::Io(err) => Some(err),
            Error::TryFromInt(err) => Some(err),
            Error::ThreadSpawn(err) => Some(err),
            Error::Json(err) => Some(err),
            Error::SymbolNotFound(_)
            | Error::Mpi { .. }
            | Error::NullPointer
            | Error::InvalidArgument(_)
            | Error::PoolExhausted => None,
        }
    }
}

impl From<rockit_sys::libloading::Error> for Error {
    fn from(err: rockit_sys::libloading::Error) -> Self {
        Error::LibraryNotLoaded(err)
    }
}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Self {
        Error::Io(err)
    }
}

impl From<nix::errno::Errno> for Error {
    fn from(err: nix::errno::Errno) -> Self {
        Error::Io(io::Error::from(err))
    }
}

impl From<TryFromIntError> for Error {
    fn from(err: TryFromIntError) -> Self {
        Error::TryFromInt(err)
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Json(err)
    }
}

/// Call a rockit MPI entry point, checking the symbol was resolved first.
///
/// Expands to a `Result<return type, Error>`; the caller interprets the
/// return code.
#[macro_export]
macro_rules! rockit {
    ($fn_name:ident($($args:expr),*)) => {
        {
            #[allow(clippy::macro_metavars_in_unsafe)]
            let result = {
                let lib = rockit_sys::init()?;
                if lib.$fn_name.is_err() {
                    Err($crate::Error::SymbolNotFound(stringify!($fn_name)))
                } else {
                    Ok(unsafe { lib.$fn_name($($args),*) })
                }
            };
            result
        }
    };
}

/// Cooperative cancellation shared by the pipeline threads.
pub mod cancel;

/// Bounded retry helper for "retry once" hardware calls.
pub mod retry;

/// Pipeline configuration.
pub mod config;

/// Pipeline counters.
pub mod stats;

/// The fourcc module provides portable handling of fourcc codes.
pub mod fourcc;

/// Detected input format and its classification.
pub mod format;

/// Quality factor to bitrate mapping.
pub mod quality;

/// Consumer interfaces for encoded units and format reports.
pub mod sink;

/// The media process interface: memory-block pools and the VENC encoder.
pub mod mpi;

/// Preallocated DMA memory-block pool.
pub mod pool;

/// Hardware encoder channel and its packet reader.
pub mod venc;

/// Capture device and control subdevice interfaces.
pub mod device;

/// Kernel V4L2 implementations of the device interfaces.
pub mod v4l2;

/// Capture session engine.
pub mod capture;

/// Streaming session orchestration.
pub mod streamer;

/// Input signal format detection.
pub mod detect;

/// Process-level entry points.
pub mod video;

pub use video::{Hardware, Video};

/// Current CLOCK_MONOTONIC time in microseconds.
pub fn monotonic_us() -> u64 {
    match nix::time::clock_gettime(nix::time::ClockId::CLOCK_MONOTONIC) {
        Ok(ts) => (ts.tv_sec() as u64) * 1_000_000 + (ts.tv_nsec() as u64) / 1_000,
        Err(_) => 0,
    }
}

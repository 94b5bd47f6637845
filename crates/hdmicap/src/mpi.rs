// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 hdmicap developers

//! The media process interface.
//!
//! [`Mpi`] is the subset of the Rockchip media process API the pipeline
//! consumes: DMA memory-block pools and one VENC encoder channel.
//! [`RockitMpi`] implements it over the runtime-loaded `librockit.so`; test
//! doubles implement it in memory.

use crate::{rockit, Error};
use log::{debug, error, info};
use rockit_sys::{
    MB_BLK, MB_INVALID_POOLID, MB_POOL_CONFIG_S, RK_FALSE, RK_SUCCESS, RK_TRUE,
    VENC_CHN_ATTR_S, VENC_PACK_S, VENC_RECV_PIC_PARAM_S, VENC_STREAM_S, VIDEO_FRAME_INFO_S,
};
use std::{os::raw::c_void, slice};

/// Opaque handle to a pool memory block.
///
/// The value is the vendor `MB_BLK` pointer; it is only dereferenced by the
/// vendor library.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MemoryBlock(usize);

impl MemoryBlock {
    pub const fn from_raw(raw: usize) -> Self {
        MemoryBlock(raw)
    }

    pub const fn as_raw(self) -> usize {
        self.0
    }

    fn as_ptr(self) -> MB_BLK {
        self.0 as MB_BLK
    }
}

/// Identifier of a memory-block pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PoolId(pub u32);

/// Encoder channel attributes; immutable once the channel is created.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelAttributes {
    /// Target bitrate in kbit/s.
    pub bitrate: u32,
    pub max_bitrate: u32,
    pub gop: u32,
    pub width: u32,
    pub height: u32,
    pub vir_width: u32,
    pub vir_height: u32,
    pub stream_buffers: u32,
    pub buffer_size: u32,
}

impl ChannelAttributes {
    fn to_raw(self) -> VENC_CHN_ATTR_S {
        let mut attr = VENC_CHN_ATTR_S::default();
        attr.stRcAttr.enRcMode = rockit_sys::VENC_RC_MODE_H264VBR;
        attr.stRcAttr.u.stH264Vbr = rockit_sys::VENC_H264_VBR_S {
            u32Gop: self.gop,
            u32BitRate: self.bitrate,
            u32MaxBitRate: self.max_bitrate,
            ..Default::default()
        };
        attr.stVencAttr.enType = rockit_sys::RK_VIDEO_ID_AVC;
        attr.stVencAttr.enPixelFormat = rockit_sys::RK_FMT_YUV422_YUYV;
        attr.stVencAttr.u32Profile = rockit_sys::H264E_PROFILE_HIGH;
        attr.stVencAttr.u32PicWidth = self.width;
        attr.stVencAttr.u32PicHeight = self.height;
        attr.stVencAttr.u32VirWidth = self.vir_width;
        attr.stVencAttr.u32VirHeight = self.vir_height;
        attr.stVencAttr.u32StreamBufCnt = self.stream_buffers;
        attr.stVencAttr.u32BufSize = self.buffer_size;
        attr.stVencAttr.enMirror = rockit_sys::MIRROR_NONE;
        attr
    }
}

/// One captured YUYV frame handed to the encoder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VideoFrame {
    pub block: MemoryBlock,
    pub width: u32,
    pub height: u32,
    pub vir_width: u32,
    pub vir_height: u32,
    /// Frame number within the session.
    pub time_ref: u32,
    /// Monotonic capture time in microseconds.
    pub pts_us: u64,
}

impl VideoFrame {
    fn to_raw(self) -> VIDEO_FRAME_INFO_S {
        let mut info = VIDEO_FRAME_INFO_S::default();
        let frame = &mut info.stVFrame;
        frame.pMbBlk = self.block.as_ptr();
        frame.u32Width = self.width;
        frame.u32Height = self.height;
        frame.u32VirWidth = self.vir_width;
        frame.u32VirHeight = self.vir_height;
        frame.u32TimeRef = self.time_ref;
        frame.u64PTS = self.pts_us;
        frame.enPixelFormat = rockit_sys::RK_FMT_YUV422_YUYV;
        frame.enCompressMode = rockit_sys::COMPRESS_MODE_NONE;
        info
    }
}

/// One encoded packet, borrowed from the encoder until released.
#[derive(Debug, Clone, Copy)]
pub struct StreamPacket {
    pub block: MemoryBlock,
    pub len: u32,
    pub pts: u64,
    pub seq: u32,
    pub frame_end: bool,
    raw: RawStream,
}

/// The stream descriptor as `RK_MPI_VENC_GetStream` filled it.
#[derive(Debug, Clone, Copy)]
struct RawStream {
    pack: VENC_PACK_S,
    pack_count: u32,
    reserved: [u32; 16],
}

// SAFETY: the pack's block pointer is an opaque vendor handle, only
// dereferenced inside librockit.
unsafe impl Send for RawStream {}
unsafe impl Sync for RawStream {}

impl StreamPacket {
    /// A single-pack packet built from its fields.
    pub fn new(block: MemoryBlock, len: u32, pts: u64, seq: u32, frame_end: bool) -> Self {
        let pack = VENC_PACK_S {
            pMbBlk: block.as_ptr(),
            u32Len: len,
            u64PTS: pts,
            bFrameEnd: if frame_end { RK_TRUE } else { RK_FALSE },
            ..Default::default()
        };
        StreamPacket {
            block,
            len,
            pts,
            seq,
            frame_end,
            raw: RawStream {
                pack,
                pack_count: 1,
                reserved: [0; 16],
            },
        }
    }

    fn from_raw(stream: &VENC_STREAM_S, pack: &VENC_PACK_S) -> Self {
        StreamPacket {
            block: MemoryBlock(pack.pMbBlk as usize),
            len: pack.u32Len,
            pts: pack.u64PTS,
            seq: stream.u32Seq,
            frame_end: pack.bFrameEnd != RK_FALSE,
            raw: RawStream {
                pack: *pack,
                pack_count: stream.u32PackCount,
                reserved: stream._reserved,
            },
        }
    }

    /// The descriptor to hand back on release; `pack` must outlive the
    /// returned stream.
    fn to_raw(self, pack: &mut VENC_PACK_S) -> VENC_STREAM_S {
        *pack = self.raw.pack;
        VENC_STREAM_S {
            pstPack: pack,
            u32PackCount: self.raw.pack_count,
            u32Seq: self.seq,
            _reserved: self.raw.reserved,
        }
    }
}

/// Media process operations consumed by the pipeline.
///
/// Every method maps onto one vendor call. Errors carry the vendor return
/// code; blocking calls take their timeout in milliseconds.
pub trait Mpi: Send + Sync {
    fn create_pool(&self, block_size: u64, count: u32) -> Result<PoolId, Error>;
    fn destroy_pool(&self, pool: PoolId) -> Result<(), Error>;
    fn get_block(&self, pool: PoolId, size: u64) -> Result<MemoryBlock, Error>;
    fn release_block(&self, block: MemoryBlock) -> Result<(), Error>;
    /// The DMA-buf fd backing `block`; owned by the vendor library.
    fn block_to_fd(&self, block: MemoryBlock) -> Result<i32, Error>;
    /// Map `block` and pass its first `len` bytes to `f`.
    fn with_block_data(
        &self,
        block: MemoryBlock,
        len: usize,
        f: &mut dyn FnMut(&[u8]),
    ) -> Result<(), Error>;

    fn create_channel(&self, channel: i32, attrs: &ChannelAttributes) -> Result<(), Error>;
    fn destroy_channel(&self, channel: i32) -> Result<(), Error>;
    fn start_recv(&self, channel: i32) -> Result<(), Error>;
    fn stop_recv(&self, channel: i32) -> Result<(), Error>;
    fn send_frame(&self, channel: i32, frame: &VideoFrame, timeout_ms: u32) -> Result<(), Error>;
    /// Fails with a buffer-empty error (see [`Error::is_buffer_empty`]) when
    /// nothing was encoded within the timeout.
    fn get_stream(&self, channel: i32, timeout_ms: u32) -> Result<StreamPacket, Error>;
    fn release_stream(&self, channel: i32, packet: &StreamPacket) -> Result<(), Error>;
}

fn check(call: &'static str, ret: i32) -> Result<(), Error> {
    if ret == RK_SUCCESS {
        Ok(())
    } else {
        Err(Error::mpi(call, ret))
    }
}

fn timeout_arg(timeout_ms: u32) -> Result<i32, Error> {
    Ok(i32::try_from(timeout_ms)?)
}

/// [`Mpi`] over the vendor library.
///
/// Creating it initialises the media process system; dropping it shuts the
/// system down. Only one should exist per process.
#[derive(Debug)]
pub struct RockitMpi {
    _private: (),
}

impl RockitMpi {
    pub fn new() -> Result<Self, Error> {
        let ret = rockit!(RK_MPI_SYS_Init())?;
        check("RK_MPI_SYS_Init", ret)?;
        info!("media process system initialised");
        Ok(RockitMpi { _private: () })
    }
}

impl Drop for RockitMpi {
    fn drop(&mut self) {
        if let Some(lib) = rockit_sys::try_library() {
            if lib.RK_MPI_SYS_Exit.is_ok() {
                let ret = unsafe { lib.RK_MPI_SYS_Exit() };
                if ret != RK_SUCCESS {
                    error!("RK_MPI_SYS_Exit failed: {:#x}", ret);
                }
            }
        }
    }
}

impl Mpi for RockitMpi {
    fn create_pool(&self, block_size: u64, count: u32) -> Result<PoolId, Error> {
        let mut cfg = MB_POOL_CONFIG_S {
            u64MBSize: block_size,
            u32MBCnt: count,
            enAllocType: rockit_sys::MB_ALLOC_TYPE_DMA,
            bPreAlloc: RK_TRUE,
            ..Default::default()
        };
        let pool = rockit!(RK_MPI_MB_CreatePool(&mut cfg))?;
        if pool == MB_INVALID_POOLID {
            return Err(Error::mpi("RK_MPI_MB_CreatePool", rockit_sys::RK_FAILURE));
        }
        Ok(PoolId(pool))
    }

    fn destroy_pool(&self, pool: PoolId) -> Result<(), Error> {
        check("RK_MPI_MB_DestroyPool", rockit!(RK_MPI_MB_DestroyPool(pool.0))?)
    }

    fn get_block(&self, pool: PoolId, size: u64) -> Result<MemoryBlock, Error> {
        let blk = rockit!(RK_MPI_MB_GetMB(pool.0, size, RK_TRUE))?;
        if blk.is_null() {
            return Err(Error::PoolExhausted);
        }
        Ok(MemoryBlock(blk as usize))
    }

    fn release_block(&self, block: MemoryBlock) -> Result<(), Error> {
        check("RK_MPI_MB_ReleaseMB", rockit!(RK_MPI_MB_ReleaseMB(block.as_ptr()))?)
    }

    fn block_to_fd(&self, block: MemoryBlock) -> Result<i32, Error> {
        let fd = rockit!(RK_MPI_MB_Handle2Fd(block.as_ptr()))?;
        if fd < 0 {
            return Err(Error::mpi("RK_MPI_MB_Handle2Fd", fd));
        }
        Ok(fd)
    }

    fn with_block_data(
        &self,
        block: MemoryBlock,
        len: usize,
        f: &mut dyn FnMut(&[u8]),
    ) -> Result<(), Error> {
        let addr: *mut c_void = rockit!(RK_MPI_MB_Handle2VirAddr(block.as_ptr()))?;
        if addr.is_null() {
            return Err(Error::NullPointer);
        }
        // SAFETY: the block stays mapped until it is released, which cannot
        // happen while the caller holds it; `len` comes from the encoder.
        let data = unsafe { slice::from_raw_parts(addr as *const u8, len) };
        f(data);
        Ok(())
    }

    fn create_channel(&self, channel: i32, attrs: &ChannelAttributes) -> Result<(), Error> {
        let raw = attrs.to_raw();
        debug!("VENC_CreateChn {} {:?}", channel, attrs);
        check("RK_MPI_VENC_CreateChn", rockit!(RK_MPI_VENC_CreateChn(channel, &raw))?)
    }

    fn destroy_channel(&self, channel: i32) -> Result<(), Error> {
        check("RK_MPI_VENC_DestroyChn", rockit!(RK_MPI_VENC_DestroyChn(channel))?)
    }

    fn start_recv(&self, channel: i32) -> Result<(), Error> {
        let param = VENC_RECV_PIC_PARAM_S { s32RecvPicNum: -1 };
        check(
            "RK_MPI_VENC_StartRecvFrame",
            rockit!(RK_MPI_VENC_StartRecvFrame(channel, &param))?,
        )
    }

    fn stop_recv(&self, channel: i32) -> Result<(), Error> {
        check("RK_MPI_VENC_StopRecvFrame", rockit!(RK_MPI_VENC_StopRecvFrame(channel))?)
    }

    fn send_frame(&self, channel: i32, frame: &VideoFrame, timeout_ms: u32) -> Result<(), Error> {
        let raw = frame.to_raw();
        let timeout = timeout_arg(timeout_ms)?;
        check(
            "RK_MPI_VENC_SendFrame",
            rockit!(RK_MPI_VENC_SendFrame(channel, &raw, timeout))?,
        )
    }

    fn get_stream(&self, channel: i32, timeout_ms: u32) -> Result<StreamPacket, Error> {
        let mut pack = VENC_PACK_S::default();
        let mut stream = VENC_STREAM_S {
            pstPack: &mut pack,
            u32PackCount: 1,
            ..Default::default()
        };
        let timeout = timeout_arg(timeout_ms)?;
        check(
            "RK_MPI_VENC_GetStream",
            rockit!(RK_MPI_VENC_GetStream(channel, &mut stream, timeout))?,
        )?;
        Ok(StreamPacket::from_raw(&stream, &pack))
    }

    fn release_stream(&self, channel: i32, packet: &StreamPacket) -> Result<(), Error> {
        let mut pack = VENC_PACK_S::default();
        let mut stream = packet.to_raw(&mut pack);
        check(
            "RK_MPI_VENC_ReleaseStream",
            rockit!(RK_MPI_VENC_ReleaseStream(channel, &mut stream))?,
        )
    }
}

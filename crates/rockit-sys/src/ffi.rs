// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 hdmicap developers
//
// Declarations mirror rk_type.h, rk_comm_mb.h, rk_comm_video.h,
// rk_comm_venc.h and rk_errno.h from the RV1106 rockit SDK. Only the
// subset consumed by hdmicap is declared; unions are represented by their
// largest member or by an opaque reserve of matching size.

use std::os::raw::{c_int, c_void};

pub type RK_S32 = i32;
pub type RK_U32 = u32;
pub type RK_U64 = u64;
pub type RK_BOOL = c_int;
pub type RK_FR32 = i32;

pub const RK_TRUE: RK_BOOL = 1;
pub const RK_FALSE: RK_BOOL = 0;
pub const RK_SUCCESS: RK_S32 = 0;
pub const RK_FAILURE: RK_S32 = -1;

pub type MB_POOL = RK_U32;
pub type MB_BLK = *mut c_void;
pub type VENC_CHN = RK_S32;

pub const MB_INVALID_POOLID: MB_POOL = u32::MAX;

pub const RK_MAX_COLOR_COMPONENT: usize = 2;

// MB_REMAP_MODE_E
pub const MB_REMAP_MODE_NONE: u32 = 0;
pub const MB_REMAP_MODE_NOCACHE: u32 = 0x200;
pub const MB_REMAP_MODE_CACHED: u32 = 0x400;

// MB_ALLOC_TYPE_E
pub const MB_ALLOC_TYPE_DMA: u32 = 0;
pub const MB_ALLOC_TYPE_MALLOC: u32 = 1;

// MB_DMA_TYPE_E
pub const MB_DMA_TYPE_NONE: u32 = 0;
pub const MB_DMA_TYPE_CMA: u32 = 1;

// RK_CODEC_ID_E
pub const RK_VIDEO_ID_AVC: u32 = 8;
pub const RK_VIDEO_ID_HEVC: u32 = 12;

// PIXEL_FORMAT_E
pub const RK_FMT_YUV420SP: u32 = 0;
pub const RK_FMT_YUV422_YUYV: u32 = 9;

// H264E_PROFILE
pub const H264E_PROFILE_BASELINE: u32 = 66;
pub const H264E_PROFILE_MAIN: u32 = 77;
pub const H264E_PROFILE_HIGH: u32 = 100;

// VENC_RC_MODE_E
pub const VENC_RC_MODE_H264CBR: u32 = 1;
pub const VENC_RC_MODE_H264VBR: u32 = 2;
pub const VENC_RC_MODE_H264AVBR: u32 = 3;

// MIRROR_E
pub const MIRROR_NONE: u32 = 0;

// COMPRESS_MODE_E
pub const COMPRESS_MODE_NONE: u32 = 0;

// VIDEO_FIELD_E
pub const VIDEO_FIELD_FRAME: u32 = 3;

// MOD_ID_E / ERR_LEVEL_E / common error ids (rk_errno.h)
pub const RK_ERR_APPID: u32 = 0x8000_0000 | 0x2000_0000;
pub const RK_ID_VENC: u32 = 4;
pub const RK_ERR_LEVEL_ERROR: u32 = 4;
pub const RK_ERR_BUF_EMPTY: u32 = 15;
pub const RK_ERR_BUF_FULL: u32 = 16;

pub const fn rk_def_err(module: u32, level: u32, errid: u32) -> RK_S32 {
    (RK_ERR_APPID | (module << 16) | (level << 13) | errid) as RK_S32
}

pub const RK_ERR_VENC_BUF_EMPTY: RK_S32 = rk_def_err(RK_ID_VENC, RK_ERR_LEVEL_ERROR, RK_ERR_BUF_EMPTY);
pub const RK_ERR_VENC_BUF_FULL: RK_S32 = rk_def_err(RK_ID_VENC, RK_ERR_LEVEL_ERROR, RK_ERR_BUF_FULL);

#[repr(C)]
#[derive(Debug, Default, Copy, Clone)]
pub struct MB_POOL_CONFIG_S {
    pub u64MBSize: RK_U64,
    pub u32MBCnt: RK_U32,
    pub enRemapMode: u32,
    pub enAllocType: u32,
    pub enDmaType: u32,
    pub bPreAlloc: RK_BOOL,
    pub bNotDelete: RK_BOOL,
}

#[repr(C)]
#[derive(Debug, Default, Copy, Clone)]
pub struct VENC_ATTR_H264_S {
    pub u32Level: RK_U32,
    pub u32Reserved: [RK_U32; 4],
}

#[repr(C)]
#[derive(Debug, Default, Copy, Clone)]
pub struct VENC_ATTR_S {
    pub enType: u32,
    pub enPixelFormat: u32,
    pub u32Profile: RK_U32,
    pub u32PicWidth: RK_U32,
    pub u32PicHeight: RK_U32,
    pub u32VirWidth: RK_U32,
    pub u32VirHeight: RK_U32,
    pub u32StreamBufCnt: RK_U32,
    pub u32BufSize: RK_U32,
    pub enMirror: u32,
    pub stAttrH264e: VENC_ATTR_H264_S,
}

#[repr(C)]
#[derive(Debug, Default, Copy, Clone)]
pub struct VENC_H264_VBR_S {
    pub u32Gop: RK_U32,
    pub u32SrcFrameRateNum: RK_U32,
    pub u32SrcFrameRateDen: RK_U32,
    pub fr32DstFrameRateNum: RK_FR32,
    pub fr32DstFrameRateDen: RK_FR32,
    pub u32BitRate: RK_U32,
    pub u32MaxBitRate: RK_U32,
    pub u32MinBitRate: RK_U32,
    pub u32StatTime: RK_U32,
}

/// Rate-control union; the H.264 VBR arm is the only one populated here.
#[repr(C)]
#[derive(Copy, Clone)]
pub union VENC_RC_ATTR_U {
    pub stH264Vbr: VENC_H264_VBR_S,
    pub _reserved: [RK_U32; 16],
}

impl Default for VENC_RC_ATTR_U {
    fn default() -> Self {
        VENC_RC_ATTR_U {
            _reserved: [0; 16],
        }
    }
}

#[repr(C)]
#[derive(Copy, Clone, Default)]
pub struct VENC_RC_ATTR_S {
    pub enRcMode: u32,
    pub u: VENC_RC_ATTR_U,
}

#[repr(C)]
#[derive(Debug, Default, Copy, Clone)]
pub struct VENC_GOP_ATTR_S {
    pub enGopMode: u32,
    pub s32VirIdrLen: RK_S32,
    pub u32MaxLtrCount: RK_U32,
    pub u32TsvcPreload: RK_U32,
}

#[repr(C)]
#[derive(Copy, Clone, Default)]
pub struct VENC_CHN_ATTR_S {
    pub stVencAttr: VENC_ATTR_S,
    pub stRcAttr: VENC_RC_ATTR_S,
    pub stGopAttr: VENC_GOP_ATTR_S,
}

#[repr(C)]
#[derive(Debug, Default, Copy, Clone)]
pub struct VENC_RECV_PIC_PARAM_S {
    pub s32RecvPicNum: RK_S32,
}

#[repr(C)]
#[derive(Debug, Copy, Clone)]
pub struct VIDEO_FRAME_S {
    pub pMbBlk: MB_BLK,
    pub u32Width: RK_U32,
    pub u32Height: RK_U32,
    pub u32VirWidth: RK_U32,
    pub u32VirHeight: RK_U32,
    pub enField: u32,
    pub enPixelFormat: u32,
    pub enVideoFormat: u32,
    pub enCompressMode: u32,
    pub enDynamicRange: u32,
    pub enColorGamut: u32,
    pub pVirAddr: [*mut c_void; RK_MAX_COLOR_COMPONENT],
    pub u32TimeRef: RK_U32,
    pub u64PTS: RK_U64,
    pub u64PrivateData: RK_U64,
    pub u32FrameFlag: RK_U32,
}

impl Default for VIDEO_FRAME_S {
    fn default() -> Self {
        VIDEO_FRAME_S {
            pMbBlk: std::ptr::null_mut(),
            u32Width: 0,
            u32Height: 0,
            u32VirWidth: 0,
            u32VirHeight: 0,
            enField: 0,
            enPixelFormat: 0,
            enVideoFormat: 0,
            enCompressMode: 0,
            enDynamicRange: 0,
            enColorGamut: 0,
            pVirAddr: [std::ptr::null_mut(); RK_MAX_COLOR_COMPONENT],
            u32TimeRef: 0,
            u64PTS: 0,
            u64PrivateData: 0,
            u32FrameFlag: 0,
        }
    }
}

#[repr(C)]
#[derive(Debug, Default, Copy, Clone)]
pub struct VIDEO_FRAME_INFO_S {
    pub stVFrame: VIDEO_FRAME_S,
}

#[repr(C)]
#[derive(Debug, Default, Copy, Clone)]
pub struct VENC_PACK_INFO_S {
    pub u32PackType: RK_U32,
    pub u32PackOffset: RK_U32,
    pub u32PackLength: RK_U32,
}

#[repr(C)]
#[derive(Debug, Copy, Clone)]
pub struct VENC_PACK_S {
    pub pMbBlk: MB_BLK,
    pub u32Len: RK_U32,
    pub u64PTS: RK_U64,
    pub bFrameEnd: RK_BOOL,
    pub bStreamEnd: RK_BOOL,
    pub DataType: RK_U32,
    pub u32Offset: RK_U32,
    pub u32DataNum: RK_U32,
    pub stPackInfo: [VENC_PACK_INFO_S; 8],
}

impl Default for VENC_PACK_S {
    fn default() -> Self {
        VENC_PACK_S {
            pMbBlk: std::ptr::null_mut(),
            u32Len: 0,
            u64PTS: 0,
            bFrameEnd: RK_FALSE,
            bStreamEnd: RK_FALSE,
            DataType: 0,
            u32Offset: 0,
            u32DataNum: 0,
            stPackInfo: [VENC_PACK_INFO_S::default(); 8],
        }
    }
}

#[repr(C)]
#[derive(Debug, Copy, Clone)]
pub struct VENC_STREAM_S {
    pub pstPack: *mut VENC_PACK_S,
    pub u32PackCount: RK_U32,
    pub u32Seq: RK_U32,
    pub _reserved: [RK_U32; 16],
}

impl Default for VENC_STREAM_S {
    fn default() -> Self {
        VENC_STREAM_S {
            pstPack: std::ptr::null_mut(),
            u32PackCount: 0,
            u32Seq: 0,
            _reserved: [0; 16],
        }
    }
}

pub struct RockitLibrary {
    __library: ::libloading::Library,
    pub RK_MPI_SYS_Init: Result<unsafe extern "C" fn() -> RK_S32, ::libloading::Error>,
    pub RK_MPI_SYS_Exit: Result<unsafe extern "C" fn() -> RK_S32, ::libloading::Error>,
    pub RK_MPI_MB_CreatePool:
        Result<unsafe extern "C" fn(pstMbPoolCfg: *mut MB_POOL_CONFIG_S) -> MB_POOL, ::libloading::Error>,
    pub RK_MPI_MB_DestroyPool: Result<unsafe extern "C" fn(pool: MB_POOL) -> RK_S32, ::libloading::Error>,
    pub RK_MPI_MB_GetMB: Result<
        unsafe extern "C" fn(pool: MB_POOL, u64Size: RK_U64, bBlock: RK_BOOL) -> MB_BLK,
        ::libloading::Error,
    >,
    pub RK_MPI_MB_ReleaseMB: Result<unsafe extern "C" fn(mb: MB_BLK) -> RK_S32, ::libloading::Error>,
    pub RK_MPI_MB_Handle2Fd: Result<unsafe extern "C" fn(mb: MB_BLK) -> RK_S32, ::libloading::Error>,
    pub RK_MPI_MB_Handle2VirAddr:
        Result<unsafe extern "C" fn(mb: MB_BLK) -> *mut c_void, ::libloading::Error>,
    pub RK_MPI_VENC_CreateChn: Result<
        unsafe extern "C" fn(VeChn: VENC_CHN, pstAttr: *const VENC_CHN_ATTR_S) -> RK_S32,
        ::libloading::Error,
    >,
    pub RK_MPI_VENC_DestroyChn: Result<unsafe extern "C" fn(VeChn: VENC_CHN) -> RK_S32, ::libloading::Error>,
    pub RK_MPI_VENC_StartRecvFrame: Result<
        unsafe extern "C" fn(VeChn: VENC_CHN, pstRecvParam: *const VENC_RECV_PIC_PARAM_S) -> RK_S32,
        ::libloading::Error,
    >,
    pub RK_MPI_VENC_StopRecvFrame:
        Result<unsafe extern "C" fn(VeChn: VENC_CHN) -> RK_S32, ::libloading::Error>,
    pub RK_MPI_VENC_SendFrame: Result<
        unsafe extern "C" fn(
            VeChn: VENC_CHN,
            pstFrame: *const VIDEO_FRAME_INFO_S,
            s32MilliSec: RK_S32,
        ) -> RK_S32,
        ::libloading::Error,
    >,
    pub RK_MPI_VENC_GetStream: Result<
        unsafe extern "C" fn(VeChn: VENC_CHN, pstStream: *mut VENC_STREAM_S, s32MilliSec: RK_S32) -> RK_S32,
        ::libloading::Error,
    >,
    pub RK_MPI_VENC_ReleaseStream: Result<
        unsafe extern "C" fn(VeChn: VENC_CHN, pstStream: *mut VENC_STREAM_S) -> RK_S32,
        ::libloading::Error,
    >,
}

impl RockitLibrary {
    pub unsafe fn new<P>(path: P) -> Result<Self, ::libloading::Error>
    where
        P: ::libloading::AsFilename,
    {
        let library = unsafe { ::libloading::Library::new(path)? };
        unsafe { Self::from_library(library) }
    }

    pub unsafe fn from_library<L>(library: L) -> Result<Self, ::libloading::Error>
    where
        L: Into<::libloading::Library>,
    {
        let __library = library.into();
        unsafe {
            let RK_MPI_SYS_Init = __library.get(b"RK_MPI_SYS_Init\0").map(|sym| *sym);
            let RK_MPI_SYS_Exit = __library.get(b"RK_MPI_SYS_Exit\0").map(|sym| *sym);
            let RK_MPI_MB_CreatePool = __library.get(b"RK_MPI_MB_CreatePool\0").map(|sym| *sym);
            let RK_MPI_MB_DestroyPool = __library.get(b"RK_MPI_MB_DestroyPool\0").map(|sym| *sym);
            let RK_MPI_MB_GetMB = __library.get(b"RK_MPI_MB_GetMB\0").map(|sym| *sym);
            let RK_MPI_MB_ReleaseMB = __library.get(b"RK_MPI_MB_ReleaseMB\0").map(|sym| *sym);
            let RK_MPI_MB_Handle2Fd = __library.get(b"RK_MPI_MB_Handle2Fd\0").map(|sym| *sym);
            let RK_MPI_MB_Handle2VirAddr = __library.get(b"RK_MPI_MB_Handle2VirAddr\0").map(|sym| *sym);
            let RK_MPI_VENC_CreateChn = __library.get(b"RK_MPI_VENC_CreateChn\0").map(|sym| *sym);
            let RK_MPI_VENC_DestroyChn = __library.get(b"RK_MPI_VENC_DestroyChn\0").map(|sym| *sym);
            let RK_MPI_VENC_StartRecvFrame =
                __library.get(b"RK_MPI_VENC_StartRecvFrame\0").map(|sym| *sym);
            let RK_MPI_VENC_StopRecvFrame = __library.get(b"RK_MPI_VENC_StopRecvFrame\0").map(|sym| *sym);
            let RK_MPI_VENC_SendFrame = __library.get(b"RK_MPI_VENC_SendFrame\0").map(|sym| *sym);
            let RK_MPI_VENC_GetStream = __library.get(b"RK_MPI_VENC_GetStream\0").map(|sym| *sym);
            let RK_MPI_VENC_ReleaseStream = __library.get(b"RK_MPI_VENC_ReleaseStream\0").map(|sym| *sym);
            Ok(RockitLibrary {
                __library,
                RK_MPI_SYS_Init,
                RK_MPI_SYS_Exit,
                RK_MPI_MB_CreatePool,
                RK_MPI_MB_DestroyPool,
                RK_MPI_MB_GetMB,
                RK_MPI_MB_ReleaseMB,
                RK_MPI_MB_Handle2Fd,
                RK_MPI_MB_Handle2VirAddr,
                RK_MPI_VENC_CreateChn,
                RK_MPI_VENC_DestroyChn,
                RK_MPI_VENC_StartRecvFrame,
                RK_MPI_VENC_StopRecvFrame,
                RK_MPI_VENC_SendFrame,
                RK_MPI_VENC_GetStream,
                RK_MPI_VENC_ReleaseStream,
            })
        }
    }

    pub unsafe fn RK_MPI_SYS_Init(&self) -> RK_S32 {
        unsafe { (self.RK_MPI_SYS_Init.as_ref().expect("Expected function, got error."))() }
    }

    pub unsafe fn RK_MPI_SYS_Exit(&self) -> RK_S32 {
        unsafe { (self.RK_MPI_SYS_Exit.as_ref().expect("Expected function, got error."))() }
    }

    pub unsafe fn RK_MPI_MB_CreatePool(&self, pstMbPoolCfg: *mut MB_POOL_CONFIG_S) -> MB_POOL {
        unsafe {
            (self
                .RK_MPI_MB_CreatePool
                .as_ref()
                .expect("Expected function, got error."))(pstMbPoolCfg)
        }
    }

    pub unsafe fn RK_MPI_MB_DestroyPool(&self, pool: MB_POOL) -> RK_S32 {
        unsafe {
            (self
                .RK_MPI_MB_DestroyPool
                .as_ref()
                .expect("Expected function, got error."))(pool)
        }
    }

    pub unsafe fn RK_MPI_MB_GetMB(&self, pool: MB_POOL, u64Size: RK_U64, bBlock: RK_BOOL) -> MB_BLK {
        unsafe {
            (self.RK_MPI_MB_GetMB.as_ref().expect("Expected function, got error."))(
                pool, u64Size, bBlock,
            )
        }
    }

    pub unsafe fn RK_MPI_MB_ReleaseMB(&self, mb: MB_BLK) -> RK_S32 {
        unsafe { (self.RK_MPI_MB_ReleaseMB.as_ref().expect("Expected function, got error."))(mb) }
    }

    pub unsafe fn RK_MPI_MB_Handle2Fd(&self, mb: MB_BLK) -> RK_S32 {
        unsafe { (self.RK_MPI_MB_Handle2Fd.as_ref().expect("Expected function, got error."))(mb) }
    }

    pub unsafe fn RK_MPI_MB_Handle2VirAddr(&self, mb: MB_BLK) -> *mut c_void {
        unsafe {
            (self
                .RK_MPI_MB_Handle2VirAddr
                .as_ref()
                .expect("Expected function, got error."))(mb)
        }
    }

    pub unsafe fn RK_MPI_VENC_CreateChn(&self, VeChn: VENC_CHN, pstAttr: *const VENC_CHN_ATTR_S) -> RK_S32 {
        unsafe {
            (self
                .RK_MPI_VENC_CreateChn
                .as_ref()
                .expect("Expected function, got error."))(VeChn, pstAttr)
        }
    }

    pub unsafe fn RK_MPI_VENC_DestroyChn(&self, VeChn: VENC_CHN) -> RK_S32 {
        unsafe {
            (self
                .RK_MPI_VENC_DestroyChn
                .as_ref()
                .expect("Expected function, got error."))(VeChn)
        }
    }

    pub unsafe fn RK_MPI_VENC_StartRecvFrame(
        &self,
        VeChn: VENC_CHN,
        pstRecvParam: *const VENC_RECV_PIC_PARAM_S,
    ) -> RK_S32 {
        unsafe {
            (self
                .RK_MPI_VENC_StartRecvFrame
                .as_ref()
                .expect("Expected function, got error."))(VeChn, pstRecvParam)
        }
    }

    pub unsafe fn RK_MPI_VENC_StopRecvFrame(&self, VeChn: VENC_CHN) -> RK_S32 {
        unsafe {
            (self
                .RK_MPI_VENC_StopRecvFrame
                .as_ref()
                .expect("Expected function, got error."))(VeChn)
        }
    }

    pub unsafe fn RK_MPI_VENC_SendFrame(
        &self,
        VeChn: VENC_CHN,
        pstFrame: *const VIDEO_FRAME_INFO_S,
        s32MilliSec: RK_S32,
    ) -> RK_S32 {
        unsafe {
            (self
                .RK_MPI_VENC_SendFrame
                .as_ref()
                .expect("Expected function, got error."))(VeChn, pstFrame, s32MilliSec)
        }
    }

    pub unsafe fn RK_MPI_VENC_GetStream(
        &self,
        VeChn: VENC_CHN,
        pstStream: *mut VENC_STREAM_S,
        s32MilliSec: RK_S32,
    ) -> RK_S32 {
        unsafe {
            (self
                .RK_MPI_VENC_GetStream
                .as_ref()
                .expect("Expected function, got error."))(VeChn, pstStream, s32MilliSec)
        }
    }

    pub unsafe fn RK_MPI_VENC_ReleaseStream(&self, VeChn: VENC_CHN, pstStream: *mut VENC_STREAM_S) -> RK_S32 {
        unsafe {
            (self
                .RK_MPI_VENC_ReleaseStream
                .as_ref()
                .expect("Expected function, got error."))(VeChn, pstStream)
        }
    }
}

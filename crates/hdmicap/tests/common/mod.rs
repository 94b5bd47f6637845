// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 hdmicap developers
//
// In-memory hardware for pipeline tests.
//
// FakeMpi, FakeBackend/FakeDevice and FakeSubdev share one Sim. The Sim
// tracks every buffer's owner (driver queue, dequeued, idle) and records a
// violation whenever the pipeline breaks the capture or encoder protocol:
// submitting a buffer that is not dequeued, queueing a buffer twice,
// releasing a block the driver still holds, overlapping sessions, or
// destroying a channel while its reader is inside get_stream.

#![allow(dead_code)]

use hdmicap::{
    config::VideoConfig,
    device::{CaptureBackend, CaptureDevice, DequeuedPlane, PlaneInfo, Readiness, SignalSource},
    format::{DvTimings, FormatState},
    fourcc::FourCC,
    mpi::{ChannelAttributes, MemoryBlock, Mpi, PoolId, StreamPacket, VideoFrame},
    Error, Hardware,
};
use std::{
    collections::{HashMap, VecDeque},
    io,
    sync::{Arc, Mutex, MutexGuard},
    thread,
    time::{Duration, Instant},
};
use unix_ts::Timestamp;

const FD_BASE: i32 = 1000;
const PACKET_BASE: usize = 0x10_0000;
const FRAME_INTERVAL: Duration = Duration::from_millis(2);
/// Driver timestamp step between captured frames, 60 fps.
pub const FRAME_PERIOD_US: i64 = 16_667;

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Default configuration with every loop timing scaled down for simulated
/// hardware.
pub fn fast_config() -> VideoConfig {
    VideoConfig {
        no_signal_backoff_ms: 5,
        open_retry_ms: 20,
        format_retry_ms: 5,
        ready_timeout_ms: 200,
        send_timeout_ms: 50,
        stream_timeout_ms: 10,
        event_poll_ms: 10,
        query_retry_ms: 20,
        ..VideoConfig::default()
    }
}

/// CEA-861 1080p60.
pub fn timings_1080p60() -> DvTimings {
    DvTimings {
        width: 1920,
        height: 1080,
        pixelclock: 148_500_000,
        hfrontporch: 88,
        hsync: 44,
        hbackporch: 148,
        vfrontporch: 4,
        vsync: 5,
        vbackporch: 36,
    }
}

/// CEA-861 720p60.
pub fn timings_720p60() -> DvTimings {
    DvTimings {
        width: 1280,
        height: 720,
        pixelclock: 74_250_000,
        hfrontporch: 110,
        hsync: 40,
        hbackporch: 220,
        vfrontporch: 5,
        vsync: 5,
        vbackporch: 20,
    }
}

/// Poll `cond` until it holds or `timeout` passes.
pub fn wait_until<F: FnMut() -> bool>(timeout: Duration, mut cond: F) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if cond() {
            return true;
        }
        thread::sleep(Duration::from_millis(2));
    }
    cond()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufferState {
    Idle,
    Queued,
    Dequeued,
}

#[derive(Debug, Default)]
pub struct SimState {
    pub violations: Vec<String>,

    // pool
    pub pool_created: bool,
    pub pool_destroyed: bool,
    pub fail_pool: bool,
    next_block: usize,
    pub blocks_out: usize,

    // capture device
    pub opens: u32,
    pub fail_opens: u32,
    pub open_devices: u32,
    pub formats: Vec<(u32, u32)>,
    pub streaming: bool,
    pub stream_offs: u32,
    pub stall: bool,
    pub fail_queues: u32,
    /// Fail the next queue of this buffer index, once.
    pub fail_queue_index: Option<u32>,
    pub fail_stream_on: u32,
    buffers: HashMap<i32, (u32, BufferState)>,
    ready: VecDeque<i32>,
    sequence: u32,

    // encoder
    pub channels_created: Vec<ChannelAttributes>,
    pub fail_create_channel: u32,
    pub channels_destroyed: u32,
    pub channel_live: bool,
    pub receiving: bool,
    pub send_attempts: u32,
    pub sends_ok: u32,
    pub fail_sends: u32,
    /// PTS of every accepted frame.
    pub pts: Vec<u64>,
    pub fail_get_stream: bool,
    pub get_stream_failures: u32,
    readers_in_get: u32,
    pending: VecDeque<StreamPacket>,
    payloads: HashMap<usize, Vec<u8>>,
    next_packet: usize,

    // subdevice
    timings: Option<Result<DvTimings, i32>>,
    pub events: u32,
    pub subscribed: bool,
    pub fail_subscribe: bool,
    pub event_waits: u32,
    pub fail_event_wait: bool,
    pub queries: u32,
}

impl SimState {
    fn violation(&mut self, msg: String) {
        self.violations.push(msg);
    }

    pub fn buffers_with(&self, state: BufferState) -> usize {
        self.buffers.values().filter(|(_, s)| *s == state).count()
    }
}

/// Shared simulation state.
#[derive(Debug, Clone, Default)]
pub struct Sim(Arc<Mutex<SimState>>);

impl Sim {
    pub fn new() -> Self {
        Sim::default()
    }

    pub fn lock(&self) -> MutexGuard<'_, SimState> {
        self.0.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn hardware(&self) -> Hardware {
        Hardware {
            mpi: Arc::new(FakeMpi { sim: self.clone() }),
            capture: Arc::new(FakeBackend { sim: self.clone() }),
            signal: Box::new(FakeSubdev { sim: self.clone() }),
        }
    }

    /// Publish a signal and raise a source-change event.
    pub fn set_signal(&self, timings: DvTimings) {
        let mut state = self.lock();
        state.timings = Some(Ok(timings));
        state.events += 1;
    }

    /// Drop the signal with the given errno and raise a source-change event.
    pub fn lose_signal(&self, errno: i32) {
        let mut state = self.lock();
        state.timings = Some(Err(errno));
        state.events += 1;
    }

    pub fn violations(&self) -> Vec<String> {
        self.lock().violations.clone()
    }

    pub fn sends_ok(&self) -> u32 {
        self.lock().sends_ok
    }

    pub fn channels_created(&self) -> usize {
        self.lock().channels_created.len()
    }

    /// No device open, no channel, every block back in the pool.
    pub fn is_idle(&self) -> bool {
        let state = self.lock();
        state.open_devices == 0 && !state.channel_live && state.blocks_out == 0
    }
}

pub struct FakeMpi {
    sim: Sim,
}

fn block_fd(block: MemoryBlock) -> i32 {
    FD_BASE + block.as_raw() as i32
}

impl Mpi for FakeMpi {
    fn create_pool(&self, block_size: u64, count: u32) -> Result<PoolId, Error> {
        let mut state = self.sim.lock();
        if state.fail_pool {
            return Err(Error::Mpi {
                call: "RK_MPI_MB_CreatePool",
                code: -1,
            });
        }
        assert!(block_size > 0 && count > 0);
        state.pool_created = true;
        Ok(PoolId(7))
    }

    fn destroy_pool(&self, pool: PoolId) -> Result<(), Error> {
        let mut state = self.sim.lock();
        assert_eq!(pool, PoolId(7));
        if state.blocks_out != 0 {
            let out = state.blocks_out;
            state.violation(format!("pool destroyed with {} blocks out", out));
        }
        state.pool_destroyed = true;
        Ok(())
    }

    fn get_block(&self, _pool: PoolId, _size: u64) -> Result<MemoryBlock, Error> {
        let mut state = self.sim.lock();
        state.next_block += 1;
        state.blocks_out += 1;
        Ok(MemoryBlock::from_raw(state.next_block))
    }

    fn release_block(&self, block: MemoryBlock) -> Result<(), Error> {
        let mut state = self.sim.lock();
        let fd = block_fd(block);
        if matches!(state.buffers.get(&fd), Some((_, BufferState::Queued))) {
            state.violation(format!("block {} released while queued", fd));
        }
        state.buffers.remove(&fd);
        state.blocks_out -= 1;
        Ok(())
    }

    fn block_to_fd(&self, block: MemoryBlock) -> Result<i32, Error> {
        Ok(block_fd(block))
    }

    fn with_block_data(
        &self,
        block: MemoryBlock,
        len: usize,
        f: &mut dyn FnMut(&[u8]),
    ) -> Result<(), Error> {
        let data = self
            .sim
            .lock()
            .payloads
            .get(&block.as_raw())
            .cloned()
            .ok_or(Error::NullPointer)?;
        f(&data[..len]);
        Ok(())
    }

    fn create_channel(&self, _channel: i32, attrs: &ChannelAttributes) -> Result<(), Error> {
        let mut state = self.sim.lock();
        if state.fail_create_channel > 0 {
            state.fail_create_channel -= 1;
            return Err(Error::Mpi {
                call: "RK_MPI_VENC_CreateChn",
                code: -1,
            });
        }
        if state.channel_live {
            state.violation("channel created twice".into());
        }
        state.channel_live = true;
        state.channels_created.push(*attrs);
        Ok(())
    }

    fn destroy_channel(&self, _channel: i32) -> Result<(), Error> {
        let mut state = self.sim.lock();
        if state.readers_in_get > 0 {
            state.violation("channel destroyed while reader active".into());
        }
        state.channel_live = false;
        state.channels_destroyed += 1;
        state.pending.clear();
        Ok(())
    }

    fn start_recv(&self, _channel: i32) -> Result<(), Error> {
        self.sim.lock().receiving = true;
        Ok(())
    }

    fn stop_recv(&self, _channel: i32) -> Result<(), Error> {
        self.sim.lock().receiving = false;
        Ok(())
    }

    fn send_frame(&self, _channel: i32, frame: &VideoFrame, _timeout_ms: u32) -> Result<(), Error> {
        let mut state = self.sim.lock();
        state.send_attempts += 1;
        let fd = block_fd(frame.block);
        match state.buffers.get(&fd) {
            Some((_, BufferState::Dequeued)) => {}
            other => {
                let msg = format!("frame {} submitted from buffer in state {:?}", fd, other);
                state.violation(msg);
            }
        }
        if !state.receiving {
            state.violation("frame sent to a channel that is not receiving".into());
        }
        if state.fail_sends > 0 {
            state.fail_sends -= 1;
            return Err(Error::Mpi {
                call: "RK_MPI_VENC_SendFrame",
                code: -1,
            });
        }
        state.sends_ok += 1;
        state.pts.push(frame.pts_us);

        state.next_packet += 1;
        let block = MemoryBlock::from_raw(PACKET_BASE + state.next_packet);
        let payload = frame.time_ref.to_le_bytes().to_vec();
        state.payloads.insert(block.as_raw(), payload);
        let packet = StreamPacket::new(block, 4, frame.pts_us, frame.time_ref, true);
        state.pending.push_back(packet);
        Ok(())
    }

    fn get_stream(&self, _channel: i32, timeout_ms: u32) -> Result<StreamPacket, Error> {
        {
            let mut state = self.sim.lock();
            if !state.channel_live {
                state.violation("get_stream on a destroyed channel".into());
            }
            if state.fail_get_stream {
                state.get_stream_failures += 1;
                return Err(Error::Mpi {
                    call: "RK_MPI_VENC_GetStream",
                    code: -1,
                });
            }
            if let Some(packet) = state.pending.pop_front() {
                return Ok(packet);
            }
            state.readers_in_get += 1;
        }
        thread::sleep(Duration::from_millis(u64::from(timeout_ms.min(2))));
        self.sim.lock().readers_in_get -= 1;
        Err(Error::Mpi {
            call: "RK_MPI_VENC_GetStream",
            code: rockit_sys::RK_ERR_VENC_BUF_EMPTY,
        })
    }

    fn release_stream(&self, _channel: i32, packet: &StreamPacket) -> Result<(), Error> {
        self.sim.lock().payloads.remove(&packet.block.as_raw());
        Ok(())
    }
}

pub struct FakeBackend {
    sim: Sim,
}

impl CaptureBackend for FakeBackend {
    fn open(&self) -> Result<Box<dyn CaptureDevice>, Error> {
        let mut state = self.sim.lock();
        state.opens += 1;
        if state.fail_opens > 0 {
            state.fail_opens -= 1;
            return Err(Error::Io(io::Error::from_raw_os_error(libc::EBUSY)));
        }
        if state.open_devices > 0 {
            state.violation("capture device opened twice".into());
        }
        state.open_devices += 1;
        Ok(Box::new(FakeDevice {
            sim: self.sim.clone(),
            width: 0,
            height: 0,
        }))
    }
}

pub struct FakeDevice {
    sim: Sim,
    width: u32,
    height: u32,
}

impl CaptureDevice for FakeDevice {
    fn set_format(&mut self, width: u32, height: u32, fourcc: FourCC) -> Result<(), Error> {
        assert_eq!(fourcc, FourCC::YUYV);
        self.width = width;
        self.height = height;
        self.sim.lock().formats.push((width, height));
        Ok(())
    }

    fn request_buffers(&mut self, count: u32) -> Result<u32, Error> {
        Ok(count)
    }

    fn query_plane(&mut self, index: u32) -> Result<PlaneInfo, Error> {
        Ok(PlaneInfo {
            index,
            length: self.width * self.height * 2,
        })
    }

    fn queue(&mut self, index: u32, fd: i32, _length: u32) -> Result<(), Error> {
        let mut state = self.sim.lock();
        if state.fail_queues > 0 {
            state.fail_queues -= 1;
            return Err(Error::Io(io::Error::from_raw_os_error(libc::EINVAL)));
        }
        if state.fail_queue_index == Some(index) {
            state.fail_queue_index = None;
            return Err(Error::Io(io::Error::from_raw_os_error(libc::ENOMEM)));
        }
        if matches!(state.buffers.get(&fd), Some((_, BufferState::Queued))) {
            state.violation(format!("buffer {} queued twice", fd));
        }
        state.buffers.insert(fd, (index, BufferState::Queued));
        state.ready.push_back(fd);
        Ok(())
    }

    fn dequeue(&mut self) -> Result<DequeuedPlane, Error> {
        let mut state = self.sim.lock();
        let fd = state
            .ready
            .pop_front()
            .ok_or_else(|| Error::Io(io::Error::from_raw_os_error(libc::EAGAIN)))?;
        let index = match state.buffers.get(&fd) {
            Some((index, BufferState::Queued)) => *index,
            other => {
                let msg = format!("driver handed out buffer {} in state {:?}", fd, other);
                state.violation(msg);
                0
            }
        };
        state.buffers.insert(fd, (index, BufferState::Dequeued));
        state.sequence += 1;
        Ok(DequeuedPlane {
            index,
            fd,
            bytesused: self.width * self.height * 2,
            sequence: state.sequence,
            timestamp: Timestamp::from_micros(i64::from(state.sequence) * FRAME_PERIOD_US),
        })
    }

    fn stream_on(&mut self) -> Result<(), Error> {
        let mut state = self.sim.lock();
        if state.fail_stream_on > 0 {
            state.fail_stream_on -= 1;
            return Err(Error::Io(io::Error::from_raw_os_error(libc::EIO)));
        }
        state.streaming = true;
        Ok(())
    }

    fn stream_off(&mut self) -> Result<(), Error> {
        let mut state = self.sim.lock();
        state.streaming = false;
        state.stream_offs += 1;
        state.ready.clear();
        for (_, buffer) in state.buffers.values_mut() {
            *buffer = BufferState::Idle;
        }
        Ok(())
    }

    fn wait_ready(&mut self, timeout: Duration) -> Result<Readiness, Error> {
        let ready = {
            let state = self.sim.lock();
            state.streaming && !state.stall && !state.ready.is_empty()
        };
        if ready {
            thread::sleep(FRAME_INTERVAL);
            Ok(Readiness::Ready)
        } else {
            thread::sleep(timeout);
            Ok(Readiness::TimedOut)
        }
    }
}

impl Drop for FakeDevice {
    fn drop(&mut self) {
        let mut state = self.sim.lock();
        if state.streaming {
            state.violation("device closed while streaming".into());
        }
        state.open_devices -= 1;
    }
}

pub struct FakeSubdev {
    sim: Sim,
}

impl SignalSource for FakeSubdev {
    fn subscribe_source_change(&mut self) -> Result<(), Error> {
        let mut state = self.sim.lock();
        if state.fail_subscribe {
            return Err(Error::Io(io::Error::from_raw_os_error(libc::ENOTTY)));
        }
        state.subscribed = true;
        Ok(())
    }

    fn query_timings(&mut self) -> Result<DvTimings, io::Error> {
        let mut state = self.sim.lock();
        state.queries += 1;
        match state.timings {
            Some(Ok(timings)) => Ok(timings),
            Some(Err(errno)) => Err(io::Error::from_raw_os_error(errno)),
            None => Err(io::Error::from_raw_os_error(libc::ENOLINK)),
        }
    }

    fn wait_event(&mut self, timeout: Duration) -> Result<bool, Error> {
        {
            let mut state = self.sim.lock();
            state.event_waits += 1;
            if state.fail_event_wait {
                return Err(Error::Io(io::Error::from_raw_os_error(libc::ENODEV)));
            }
            if state.events > 0 {
                state.events -= 1;
                return Ok(true);
            }
        }
        thread::sleep(timeout.min(Duration::from_millis(2)));
        Ok(false)
    }
}

/// Collects encoded units in arrival order.
#[derive(Debug, Default)]
pub struct CollectingSink(Mutex<Vec<Vec<u8>>>);

impl CollectingSink {
    pub fn units(&self) -> Vec<Vec<u8>> {
        self.0.lock().unwrap().clone()
    }

    pub fn len(&self) -> usize {
        self.0.lock().unwrap().len()
    }
}

impl hdmicap::sink::StreamSink for CollectingSink {
    fn on_encoded_unit(&self, unit: &[u8]) {
        self.0.lock().unwrap().push(unit.to_vec());
    }
}

/// Collects format reports in arrival order.
#[derive(Debug, Default)]
pub struct CollectingReporter(Mutex<Vec<FormatState>>);

impl CollectingReporter {
    pub fn reports(&self) -> Vec<FormatState> {
        self.0.lock().unwrap().clone()
    }

    pub fn last(&self) -> Option<FormatState> {
        self.0.lock().unwrap().last().copied()
    }
}

impl hdmicap::sink::FormatReporter for CollectingReporter {
    fn on_format(&self, state: &FormatState) {
        self.0.lock().unwrap().push(*state);
    }
}

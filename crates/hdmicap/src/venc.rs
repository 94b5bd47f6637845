// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 hdmicap developers

//! Hardware encoder channel and its packet reader.
//!
//! A [`VencChannel`] lives for exactly one streaming session:
//!
//! ```text
//! create ─► start_recv ─► [submit_frame]* ─► stop_recv ─► join reader ─► destroy
//!                 └── venc-reader: get_stream ─► sink ─► release_stream
//! ```
//!
//! Attributes are fixed at creation. Changing bitrate or resolution means
//! stopping this channel and starting a new one.

use crate::{
    cancel::CancelToken,
    config::VideoConfig,
    mpi::{ChannelAttributes, Mpi, VideoFrame},
    retry::Retry,
    sink::StreamSink,
    stats::Stats,
    Error,
};
use log::{debug, error, info, warn};
use std::{
    sync::Arc,
    thread::{self, JoinHandle},
};

const STREAM_BUFFERS: u32 = 3;

fn align2(value: u32) -> u32 {
    value.saturating_add(1) & !1
}

impl ChannelAttributes {
    /// H.264 High profile VBR attributes for YUYV 4:2:2 input.
    pub fn h264_vbr(bitrate: u32, max_bitrate: u32, width: u32, height: u32, gop: u32) -> Self {
        let buffer_size = u64::from(width) * u64::from(height) * 3 / 2;
        ChannelAttributes {
            bitrate,
            max_bitrate,
            gop,
            width,
            height,
            vir_width: align2(width),
            vir_height: align2(height),
            stream_buffers: STREAM_BUFFERS,
            buffer_size: u32::try_from(buffer_size).unwrap_or(u32::MAX),
        }
    }
}

/// Per-channel timing settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EncoderSettings {
    pub channel: i32,
    pub send_timeout_ms: u32,
    pub stream_timeout_ms: u32,
    pub send_retry: Retry,
}

impl From<&VideoConfig> for EncoderSettings {
    fn from(config: &VideoConfig) -> Self {
        EncoderSettings {
            channel: config.channel,
            send_timeout_ms: config.send_timeout_ms,
            stream_timeout_ms: config.stream_timeout_ms,
            send_retry: Retry::once(config.send_retry_backoff()),
        }
    }
}

/// A created, receiving encoder channel with its reader thread.
///
/// Dropping the channel performs the same teardown as [`VencChannel::stop`].
pub struct VencChannel {
    mpi: Arc<dyn Mpi>,
    settings: EncoderSettings,
    attrs: ChannelAttributes,
    stats: Arc<Stats>,
    token: CancelToken,
    reader: Option<JoinHandle<()>>,
    active: bool,
}

impl VencChannel {
    /// Create the channel, start reception and spawn the reader.
    ///
    /// On failure everything created so far is torn down before the error
    /// is returned.
    pub fn start(
        mpi: Arc<dyn Mpi>,
        settings: EncoderSettings,
        attrs: ChannelAttributes,
        sink: Arc<dyn StreamSink>,
        stats: Arc<Stats>,
    ) -> Result<Self, Error> {
        let channel = settings.channel;
        if let Err(err) = mpi.create_channel(channel, &attrs) {
            error!("failed to create encoder channel {}: {}", channel, err);
            return Err(err);
        }

        if let Err(err) = mpi.start_recv(channel) {
            error!("failed to start encoder reception: {}", err);
            if let Err(err) = mpi.destroy_channel(channel) {
                error!("failed to destroy encoder channel {}: {}", channel, err);
            }
            return Err(err);
        }

        let token = CancelToken::new();
        let reader = {
            let mpi = Arc::clone(&mpi);
            let token = token.clone();
            let stats = Arc::clone(&stats);
            let timeout = settings.stream_timeout_ms;
            thread::Builder::new()
                .name("venc-reader".into())
                .spawn(move || read_packets(mpi.as_ref(), channel, timeout, sink.as_ref(), &stats, &token))
        };
        let reader = match reader {
            Ok(handle) => handle,
            Err(err) => {
                error!("failed to spawn encoder reader: {}", err);
                if let Err(err) = mpi.stop_recv(channel) {
                    error!("failed to stop encoder reception: {}", err);
                }
                if let Err(err) = mpi.destroy_channel(channel) {
                    error!("failed to destroy encoder channel {}: {}", channel, err);
                }
                return Err(Error::ThreadSpawn(err));
            }
        };

        info!(
            "encoder started: {}x{} bitrate {} max {}",
            attrs.width, attrs.height, attrs.bitrate, attrs.max_bitrate
        );
        Ok(VencChannel {
            mpi,
            settings,
            attrs,
            stats,
            token,
            reader: Some(reader),
            active: true,
        })
    }

    pub fn attributes(&self) -> &ChannelAttributes {
        &self.attrs
    }

    /// Hand one frame to the encoder.
    ///
    /// A failed send is retried once after the configured backoff; a second
    /// failure drops the frame. Both outcomes are counted in [`Stats`].
    pub fn submit_frame(&self, frame: &VideoFrame) {
        let mut attempt = 0;
        let what = format!("frame {} submission", frame.time_ref);
        let result = self.settings.send_retry.run(&what, || {
            attempt += 1;
            if attempt > 1 {
                self.stats.send_retried();
            }
            self.mpi
                .send_frame(self.settings.channel, frame, self.settings.send_timeout_ms)
        });
        match result {
            Ok(()) => self.stats.frame_submitted(),
            Err(err) => {
                warn!("dropped frame {}: {}", frame.time_ref, err);
                self.stats.frame_dropped();
            }
        }
    }

    /// Stop reception, join the reader, destroy the channel.
    pub fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        if !self.active {
            return;
        }
        self.active = false;
        let channel = self.settings.channel;

        if let Err(err) = self.mpi.stop_recv(channel) {
            error!("failed to stop encoder reception: {}", err);
        }

        self.token.cancel();
        if let Some(reader) = self.reader.take() {
            if reader.join().is_err() {
                error!("encoder reader thread panicked");
            }
        }

        if let Err(err) = self.mpi.destroy_channel(channel) {
            error!("failed to destroy encoder channel {}: {}", channel, err);
        }
        debug!("encoder channel {} destroyed", channel);
    }
}

impl Drop for VencChannel {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn read_packets(
    mpi: &dyn Mpi,
    channel: i32,
    timeout_ms: u32,
    sink: &dyn StreamSink,
    stats: &Stats,
    token: &CancelToken,
) {
    debug!("encoder reader running");
    while !token.is_cancelled() {
        let packet = match mpi.get_stream(channel, timeout_ms) {
            Ok(packet) => packet,
            Err(err) if err.is_buffer_empty() => continue,
            Err(err) => {
                error!("encoder get-stream failed, reader exiting: {}", err);
                break;
            }
        };

        let len = packet.len as usize;
        match mpi.with_block_data(packet.block, len, &mut |data| sink.on_encoded_unit(data)) {
            Ok(()) => stats.packet(len),
            Err(err) => error!("failed to map encoded packet {}: {}", packet.seq, err),
        }

        if let Err(err) = mpi.release_stream(channel, &packet) {
            warn!("failed to release encoded packet {}: {}", packet.seq, err);
        }
    }
    debug!("encoder reader stopped");
}

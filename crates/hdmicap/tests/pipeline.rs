// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 hdmicap developers
//
// Pipeline Tests
//
// TESTING LAYERS:
//
// Layer 2 (Simulated hardware - no device required):
//   The full Video pipeline (detector, orchestrator, capture engine, encoder
//   bridge, pool) driven through the in-memory hardware in common/mod.rs.
//   Every test also checks the simulation recorded no protocol violation.
//
// Layer 3 (Hardware Integration - Requires RV1106 with HDMI receiver):
//   - test_hardware_stream: live capture into VENC with an HDMI source
//
// REQUIREMENTS for Layer 3 tests (marked with #[ignore]):
//   - librockit.so on the loader path (or ROCKIT_LIBRARY)
//   - Capture device: /dev/video0
//   - Receiver subdevice: /dev/v4l-subdev2
//   - A connected HDMI source
//
// RUN LAYER 2:
//   cargo test --test pipeline
//
// RUN LAYER 3 (on hardware):
//   cargo test --test pipeline -- --ignored --nocapture

mod common;

use common::*;
use hdmicap::{
    config::VideoConfig,
    format::SignalReason,
    quality,
    sink::{FormatReporter, StreamSink},
    Error, Hardware, Video,
};
use rand::Rng;
use serial_test::serial;
use std::{
    sync::Arc,
    thread,
    time::{Duration, Instant},
};

const WAIT: Duration = Duration::from_secs(5);

struct Pipeline {
    sim: Sim,
    video: Video,
    sink: Arc<CollectingSink>,
    reporter: Arc<CollectingReporter>,
}

fn pipeline_with(sim: Sim, config: VideoConfig) -> Pipeline {
    init_logging();
    let sink = Arc::new(CollectingSink::default());
    let reporter = Arc::new(CollectingReporter::default());
    let video = Video::init(
        config,
        sim.hardware(),
        sink.clone() as Arc<dyn StreamSink>,
        reporter.clone() as Arc<dyn FormatReporter>,
    )
    .expect("init with simulated hardware");
    Pipeline {
        sim,
        video,
        sink,
        reporter,
    }
}

/// A pipeline with a 1080p60 signal already detected and the detector
/// parked waiting for the next event.
fn pipeline() -> Pipeline {
    let sim = Sim::new();
    sim.set_signal(timings_1080p60());
    let p = pipeline_with(sim, fast_config());
    settle(&p.sim);
    assert!(p.video.format().signal_present);
    p
}

/// Wait until the detector has handled every pending event and gone back
/// to waiting.
fn settle(sim: &Sim) {
    assert!(wait_until(WAIT, || sim.lock().events == 0));
    let waits = sim.lock().event_waits;
    assert!(wait_until(WAIT, || sim.lock().event_waits > waits));
}

fn wait_for_frames(p: &Pipeline, frames: u32) {
    let start = p.sim.sends_ok();
    assert!(
        wait_until(WAIT, || p.sim.sends_ok() >= start + frames),
        "no frames encoded"
    );
}

fn assert_clean(p: &mut Pipeline) {
    p.video.shutdown();
    assert!(p.sim.is_idle(), "hardware left in use: {:?}", p.sim.lock());
    assert!(p.sim.lock().pool_destroyed);
    assert_eq!(p.sim.violations(), Vec::<String>::new());
}

#[test]
#[serial]
fn start_twice_runs_one_session() {
    let mut p = pipeline();
    p.video.start_streaming().unwrap();
    p.video.start_streaming().unwrap();
    assert!(p.video.is_streaming());
    wait_for_frames(&p, 10);

    assert_eq!(p.sim.lock().opens, 1);
    assert_eq!(p.sim.channels_created(), 1);
    assert_eq!(p.video.stats().sessions_started, 1);
    assert_clean(&mut p);
}

#[test]
#[serial]
fn stop_without_session_is_noop() {
    let mut p = pipeline();
    let start = Instant::now();
    p.video.stop_streaming();
    p.video.stop_streaming();
    assert!(start.elapsed() < Duration::from_millis(50));
    assert!(!p.video.is_streaming());
    assert_eq!(p.sim.lock().opens, 0);
    assert_clean(&mut p);
}

#[test]
#[serial]
fn session_starts_at_detected_format() {
    let mut p = pipeline();
    p.video.start_streaming().unwrap();
    wait_for_frames(&p, 3);

    assert_eq!(p.sim.lock().formats, vec![(1920, 1080)]);
    let attrs = p.sim.lock().channels_created[0];
    assert_eq!((attrs.width, attrs.height), (1920, 1080));
    assert_eq!(attrs.bitrate, 2000);
    assert_eq!(attrs.max_bitrate, 4000);
    assert_eq!(attrs.gop, 60);
    assert_clean(&mut p);
}

#[test]
#[serial]
fn encoded_units_reach_sink_in_order() {
    let mut p = pipeline();
    p.video.start_streaming().unwrap();
    assert!(wait_until(WAIT, || p.sink.len() >= 20));
    p.video.stop_streaming();

    let frames: Vec<u32> = p
        .sink
        .units()
        .iter()
        .map(|unit| u32::from_le_bytes([unit[0], unit[1], unit[2], unit[3]]))
        .collect();
    assert_eq!(frames[0], 0);
    assert!(frames.windows(2).all(|pair| pair[0] < pair[1]), "{:?}", frames);

    let stats = p.video.stats();
    assert_eq!(stats.packets, frames.len() as u64);
    assert_eq!(stats.bytes, 4 * frames.len() as u64);
    assert_clean(&mut p);
}

#[test]
#[serial]
fn signal_loss_ends_session_until_signal_returns() {
    let mut p = pipeline();
    p.video.start_streaming().unwrap();
    wait_for_frames(&p, 5);

    p.sim.lose_signal(libc::ENOLINK);
    assert!(wait_until(WAIT, || p.sim.is_idle()), "session not torn down");
    let state = p.video.format();
    assert!(!state.signal_present);
    assert_eq!(state.reason, SignalReason::NoSignal);

    let attempts = p.sim.lock().send_attempts;
    thread::sleep(Duration::from_millis(100));
    assert_eq!(p.sim.lock().send_attempts, attempts);
    assert!(p.sim.is_idle());
    assert!(p.video.is_streaming());

    p.sim.set_signal(timings_720p60());
    wait_for_frames(&p, 5);
    assert_eq!(p.sim.lock().formats.last(), Some(&(1280, 720)));
    let attrs = *p.sim.lock().channels_created.last().unwrap();
    assert_eq!((attrs.width, attrs.height), (1280, 720));
    assert_eq!(attrs.bitrate, quality::bitrate(1.0, 1280, 720));
    assert_clean(&mut p);
}

#[test]
#[serial]
fn quality_change_restarts_once_with_new_bitrate() {
    let mut p = pipeline();
    p.video.start_streaming().unwrap();
    wait_for_frames(&p, 5);
    assert_eq!(p.sim.channels_created(), 1);

    p.video.set_quality_factor(0.5).unwrap();
    assert_eq!(p.video.quality_factor(), 0.5);
    assert!(wait_until(WAIT, || p.sim.channels_created() == 2));
    wait_for_frames(&p, 5);

    let state = p.sim.lock();
    assert_eq!(state.channels_created.len(), 2);
    assert_eq!(state.channels_destroyed, 1);
    let attrs = state.channels_created[1];
    assert_eq!(attrs.bitrate, quality::bitrate(0.5, 1920, 1080));
    assert_eq!(attrs.bitrate, 1256);
    assert_eq!(attrs.max_bitrate, 2512);
    drop(state);

    assert_eq!(p.video.stats().sessions_started, 2);
    assert_clean(&mut p);
}

#[test]
#[serial]
fn quality_change_while_idle_does_not_start() {
    let mut p = pipeline();
    p.video.set_quality_factor(7.0).unwrap();
    assert_eq!(p.video.quality_factor(), 1.0);
    thread::sleep(Duration::from_millis(20));
    assert!(!p.video.is_streaming());
    assert_eq!(p.sim.lock().opens, 0);
    assert_clean(&mut p);
}

#[test]
#[serial]
fn double_send_failure_drops_one_frame() {
    let mut p = pipeline();
    p.video.start_streaming().unwrap();
    wait_for_frames(&p, 5);
    let before = p.video.stats();

    p.sim.lock().fail_sends = 2;
    assert!(wait_until(WAIT, || p.video.stats().frames_dropped == 1));
    wait_for_frames(&p, 5);

    let after = p.video.stats();
    assert_eq!(after.send_retries, before.send_retries + 1);
    assert_eq!(after.frames_dropped, 1);
    assert!(after.frames_submitted > before.frames_submitted);
    assert_eq!(after.sessions_started, 1);
    assert_clean(&mut p);
}

#[test]
#[serial]
fn single_send_failure_is_retried() {
    let mut p = pipeline();
    p.video.start_streaming().unwrap();
    wait_for_frames(&p, 3);
    let before = p.video.stats();

    p.sim.lock().fail_sends = 1;
    assert!(wait_until(WAIT, || p.video.stats().send_retries == before.send_retries + 1));
    wait_for_frames(&p, 3);
    assert_eq!(p.video.stats().frames_dropped, 0);
    assert_clean(&mut p);
}

#[test]
#[serial]
fn requeue_failure_restarts_session() {
    let mut p = pipeline();
    p.video.start_streaming().unwrap();
    wait_for_frames(&p, 5);

    p.sim.lock().fail_queues = 2;
    assert!(wait_until(WAIT, || p.video.stats().requeue_failures == 1));
    assert!(wait_until(WAIT, || p.video.stats().sessions_started == 2));
    wait_for_frames(&p, 5);
    assert_clean(&mut p);
}

#[test]
#[serial]
fn stalled_capture_restarts_session() {
    let mut p = pipeline();
    p.video.start_streaming().unwrap();
    wait_for_frames(&p, 3);

    p.sim.lock().stall = true;
    assert!(wait_until(WAIT, || p.sim.lock().opens >= 2));
    p.sim.lock().stall = false;
    wait_for_frames(&p, 3);
    assert!(p.video.stats().sessions_started >= 2);
    assert_clean(&mut p);
}

#[test]
#[serial]
fn open_failures_are_retried() {
    let mut p = pipeline();
    p.sim.lock().fail_opens = 2;
    p.video.start_streaming().unwrap();
    wait_for_frames(&p, 3);
    assert_eq!(p.sim.lock().opens, 3);
    assert_eq!(p.video.stats().sessions_started, 1);
    assert_clean(&mut p);
}

#[test]
#[serial]
fn no_device_opened_without_signal() {
    let sim = Sim::new();
    sim.lose_signal(libc::ENOLINK);
    let mut p = pipeline_with(sim, fast_config());
    settle(&p.sim);
    p.video.start_streaming().unwrap();
    thread::sleep(Duration::from_millis(50));
    assert_eq!(p.sim.lock().opens, 0);
    assert!(p.video.is_streaming());
    assert_clean(&mut p);
}

#[test]
#[serial]
fn detector_reports_each_classification() {
    let mut p = pipeline();
    let state = p.reporter.last().unwrap();
    assert!(state.signal_present);
    assert_eq!((state.width, state.height), (1920, 1080));
    assert!((state.fps - 60.0).abs() < 1e-9);

    let last_reason = |p: &Pipeline| p.reporter.last().map(|state| state.reason);
    p.sim.lose_signal(libc::ENOLCK);
    assert!(wait_until(WAIT, || last_reason(&p) == Some(SignalReason::NoLock)));
    p.sim.lose_signal(libc::ERANGE);
    assert!(wait_until(WAIT, || last_reason(&p) == Some(SignalReason::OutOfRange)));
    assert!(!p.video.format().signal_present);

    p.sim.set_signal(timings_720p60());
    assert!(wait_until(WAIT, || p.video.format().width == 1280));
    assert!(p.reporter.reports().len() >= 4);
    assert_clean(&mut p);
}

#[test]
#[serial]
fn subscribe_failure_stops_only_the_detector() {
    let sim = Sim::new();
    sim.lock().fail_subscribe = true;
    let mut p = pipeline_with(sim, fast_config());
    assert!(wait_until(WAIT, || !p.video.is_detecting()));
    assert!(p.reporter.reports().is_empty());

    p.video.start_streaming().unwrap();
    assert!(p.video.is_streaming());
    p.video.stop_streaming();
    assert!(!p.video.is_streaming());
    assert_clean(&mut p);
}

#[test]
#[serial]
fn resolution_change_restarts_once_at_new_size() {
    let mut p = pipeline();
    p.video.start_streaming().unwrap();
    wait_for_frames(&p, 5);

    p.sim.set_signal(timings_720p60());
    settle(&p.sim);
    assert!(wait_until(WAIT, || p.sim.channels_created() == 2));
    wait_for_frames(&p, 5);

    let state = p.sim.lock();
    assert_eq!(state.formats, vec![(1920, 1080), (1280, 720)]);
    assert_eq!(state.channels_created.len(), 2);
    let attrs = state.channels_created[1];
    assert_eq!((attrs.width, attrs.height), (1280, 720));
    assert_eq!(attrs.bitrate, quality::bitrate(1.0, 1280, 720));
    drop(state);

    assert_eq!(p.video.stats().sessions_started, 2);
    assert_clean(&mut p);
}

#[test]
#[serial]
fn frame_pts_comes_from_driver_timestamp() {
    let mut p = pipeline();
    p.video.start_streaming().unwrap();
    wait_for_frames(&p, 5);
    p.video.stop_streaming();

    let pts = p.sim.lock().pts.clone();
    assert!(pts.len() >= 5);
    assert!(pts.iter().all(|&us| us % FRAME_PERIOD_US as u64 == 0), "{:?}", pts);
    assert!(pts.windows(2).all(|pair| pair[0] < pair[1]), "{:?}", pts);
    assert_clean(&mut p);
}

#[test]
#[serial]
fn stream_on_failure_returns_queued_buffers() {
    let mut p = pipeline();
    p.sim.lock().fail_stream_on = 2;
    p.video.start_streaming().unwrap();
    wait_for_frames(&p, 3);

    let state = p.sim.lock();
    assert_eq!(state.opens, 3);
    assert_eq!(state.channels_created.len(), 1);
    assert!(state.stream_offs >= 2);
    drop(state);
    assert_eq!(p.video.stats().sessions_started, 1);
    assert_clean(&mut p);
}

#[test]
#[serial]
fn partial_queue_failure_returns_queued_buffers() {
    let mut p = pipeline();
    p.sim.lock().fail_queue_index = Some(2);
    p.video.start_streaming().unwrap();
    wait_for_frames(&p, 3);

    assert_eq!(p.sim.lock().opens, 2);
    assert_eq!(p.video.stats().sessions_started, 1);
    assert_clean(&mut p);
}

#[test]
#[serial]
fn channel_create_failure_unwinds_session() {
    let mut p = pipeline();
    p.sim.lock().fail_create_channel = 1;
    p.video.start_streaming().unwrap();
    wait_for_frames(&p, 3);

    let state = p.sim.lock();
    assert_eq!(state.opens, 2);
    assert_eq!(state.channels_created.len(), 1);
    assert_eq!(state.channels_destroyed, 0);
    drop(state);
    assert_eq!(p.video.stats().sessions_started, 1);
    assert_clean(&mut p);
}

#[test]
#[serial]
fn get_stream_failure_ends_only_the_reader() {
    let mut p = pipeline();
    p.video.start_streaming().unwrap();
    assert!(wait_until(WAIT, || p.sink.len() >= 5));

    p.sim.lock().fail_get_stream = true;
    assert!(wait_until(WAIT, || p.sim.lock().get_stream_failures == 1));
    let units = p.sink.len();
    wait_for_frames(&p, 5);

    assert_eq!(p.sim.lock().get_stream_failures, 1);
    assert_eq!(p.sink.len(), units);
    assert!(p.video.is_streaming());
    assert_eq!(p.video.stats().sessions_started, 1);
    assert_clean(&mut p);
}

#[test]
#[serial]
fn event_failure_stops_only_the_detector() {
    let mut p = pipeline();
    p.sim.lock().fail_event_wait = true;
    assert!(wait_until(WAIT, || !p.video.is_detecting()));

    p.video.start_streaming().unwrap();
    wait_for_frames(&p, 3);
    assert!(p.video.format().signal_present);
    assert_clean(&mut p);
}

#[test]
#[serial]
fn unclassified_query_error_is_retried() {
    let mut p = pipeline();
    let reports = p.reporter.reports().len();

    p.sim.lose_signal(libc::EIO);
    assert!(wait_until(WAIT, || p.sim.lock().events == 0));
    let queries = p.sim.lock().queries;
    assert!(wait_until(WAIT, || p.sim.lock().queries >= queries + 3));
    assert_eq!(p.sim.lock().events, 0);
    assert_eq!(p.reporter.reports().len(), reports);
    assert!(p.video.format().signal_present);

    p.sim.set_signal(timings_720p60());
    assert!(wait_until(WAIT, || p.video.format().width == 1280));
    assert!(p.video.is_detecting());
    assert_clean(&mut p);
}

#[test]
#[serial]
fn pool_failure_is_fatal() {
    init_logging();
    let sim = Sim::new();
    sim.lock().fail_pool = true;
    let result = Video::init(
        VideoConfig::default(),
        sim.hardware(),
        Arc::new(hdmicap::sink::NullSink),
        Arc::new(hdmicap::sink::NullReporter),
    );
    assert!(matches!(result, Err(Error::Mpi { .. })));
    assert!(!sim.lock().subscribed);
}

#[test]
#[serial]
fn shutdown_is_idempotent() {
    let mut p = pipeline();
    p.video.start_streaming().unwrap();
    wait_for_frames(&p, 3);
    p.video.shutdown();
    p.video.shutdown();
    assert!(!p.video.is_streaming());
    assert!(p.video.start_streaming().is_err());
    assert_clean(&mut p);
}

#[test]
#[serial]
fn random_control_sequence_keeps_buffer_protocol() {
    let mut p = pipeline();
    let mut rng = rand::rng();
    for _ in 0..40 {
        match rng.random_range(0..7) {
            0 => p.video.start_streaming().unwrap(),
            1 => p.video.stop_streaming(),
            2 => p.video.set_quality_factor(rng.random_range(0.0..=1.0)).unwrap(),
            3 => p.sim.lose_signal(libc::ENOLINK),
            4 => p.sim.set_signal(timings_720p60()),
            5 => p.sim.set_signal(timings_1080p60()),
            _ => p.sim.lock().fail_sends = rng.random_range(0..3),
        }
        thread::sleep(Duration::from_millis(rng.random_range(0..15)));
    }
    assert_clean(&mut p);
    let stats = p.video.stats();
    assert!(stats.frames_submitted + stats.frames_dropped <= stats.frames_captured);
}

#[test]
#[ignore = "test requires RV1106 hardware with an HDMI source"]
#[serial]
fn test_hardware_stream() {
    init_logging();
    let config = VideoConfig::default();
    let hardware = Hardware::rockit(&config).expect("rockit hardware");
    let sink = Arc::new(CollectingSink::default());
    let mut video = Video::init(
        config,
        hardware,
        sink.clone() as Arc<dyn StreamSink>,
        Arc::new(hdmicap::sink::NullReporter),
    )
    .expect("init");
    assert!(wait_until(WAIT, || video.format().signal_present), "no HDMI signal");
    video.start_streaming().unwrap();
    assert!(wait_until(WAIT, || sink.len() > 30), "no encoded units");
    println!("stats: {:?}", video.stats());
    video.shutdown();
}

// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 hdmicap developers

use crate::error::CliError;
use crate::utils;
use clap::Args as ClapArgs;
use hdmicap::{
    cancel::CancelToken,
    format::FormatState,
    sink::{FormatReporter, StreamSink},
    stats::StatsSnapshot,
    Hardware, Video,
};
use std::{
    fs::File,
    io::{self, BufWriter, Write},
    os::unix::net::UnixStream,
    path::PathBuf,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Mutex,
    },
    time::{Duration, Instant},
};

#[derive(ClapArgs, Debug)]
pub struct Args {
    /// Output for the H.264 stream: a file path, '-' for stdout, or a socket path with --socket
    output: String,

    /// Treat OUTPUT as a Unix stream socket to connect to
    #[arg(long)]
    socket: bool,

    /// JSON configuration file (flags override its values)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Capture device
    #[arg(short, long)]
    device: Option<PathBuf>,

    /// HDMI receiver control subdevice
    #[arg(long)]
    subdevice: Option<PathBuf>,

    /// Quality factor between 0 and 1
    #[arg(short = 'Q', long, value_parser = utils::parse_quality)]
    quality: Option<f32>,

    /// Number of capture buffers
    #[arg(short, long)]
    buffers: Option<u32>,

    /// Stop after this many seconds (0 = until interrupted)
    #[arg(short = 't', long, default_value = "0")]
    duration: u64,

    /// Write the raw YUYV bytes of this frame number to --dump-path
    #[arg(long, requires = "dump_path")]
    dump_frame: Option<u32>,

    /// Destination of the raw frame dump
    #[arg(long, requires = "dump_frame")]
    dump_path: Option<PathBuf>,
}

/// Writes encoded units to the chosen output.
struct UnitWriter {
    out: Mutex<Box<dyn Write + Send>>,
    failed: AtomicBool,
}

impl UnitWriter {
    fn new(out: Box<dyn Write + Send>) -> Self {
        UnitWriter {
            out: Mutex::new(out),
            failed: AtomicBool::new(false),
        }
    }

    fn flush(&self) {
        let mut out = self.out.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        if let Err(e) = out.flush() {
            log::warn!("Failed to flush output: {}", e);
        }
    }
}

impl StreamSink for UnitWriter {
    fn on_encoded_unit(&self, unit: &[u8]) {
        if self.failed.load(Ordering::Relaxed) {
            return;
        }
        let mut out = self.out.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        if let Err(e) = out.write_all(unit) {
            log::error!("Output write failed, discarding further units: {}", e);
            self.failed.store(true, Ordering::Relaxed);
        }
    }
}

/// Prints each format report as one JSON line.
struct FormatPrinter {
    to_stderr: bool,
}

impl FormatReporter for FormatPrinter {
    fn on_format(&self, state: &FormatState) {
        match serde_json::to_string(state) {
            Ok(line) if self.to_stderr => eprintln!("{}", line),
            Ok(line) => println!("{}", line),
            Err(e) => log::warn!("Failed to serialize format report: {}", e),
        }
    }
}

fn open_output(args: &Args) -> Result<Box<dyn Write + Send>, CliError> {
    if args.socket {
        log::info!("Connecting to socket {}", args.output);
        let stream = UnixStream::connect(&args.output).map_err(|e| {
            CliError::SocketError(format!("cannot connect to {}: {}", args.output, e))
        })?;
        return Ok(Box::new(stream));
    }
    if args.output == "-" {
        return Ok(Box::new(io::stdout()));
    }
    let file = File::create(&args.output).map_err(|e| {
        CliError::InvalidArgs(format!("cannot create output {}: {}", args.output, e))
    })?;
    Ok(Box::new(BufWriter::new(file)))
}

pub fn execute(args: Args, json: bool) -> Result<(), CliError> {
    log::debug!("Stream parameters: {:?}", args);

    let mut config = utils::load_config(args.config.as_deref())?;
    if let Some(device) = &args.device {
        config = config.with_capture_device(device);
    }
    if let Some(subdevice) = &args.subdevice {
        config = config.with_subdevice(subdevice);
    }
    if let Some(quality) = args.quality {
        config = config.with_quality(quality);
    }
    if let Some(buffers) = args.buffers {
        config = config.with_buffer_count(buffers);
    }
    if let (Some(frame), Some(path)) = (args.dump_frame, &args.dump_path) {
        config = config.with_frame_dump(frame, path);
    }
    config.validate()?;

    let token = CancelToken::new();
    utils::install_signal_handler(&token)?;

    let to_stdout = !args.socket && args.output == "-";
    let writer = Arc::new(UnitWriter::new(open_output(&args)?));
    let reporter = Arc::new(FormatPrinter {
        to_stderr: to_stdout,
    });

    log::info!(
        "Opening {} and {}",
        config.capture_device.display(),
        config.subdevice.display()
    );
    let hardware = Hardware::rockit(&config)?;
    let mut video = Video::init(
        config,
        hardware,
        writer.clone() as Arc<dyn StreamSink>,
        reporter,
    )?;
    video.start_streaming()?;

    let deadline = match args.duration {
        0 => None,
        secs => Some(Instant::now() + Duration::from_secs(secs)),
    };
    log::info!("Streaming (Ctrl+C to stop)...");
    while !token.is_cancelled() {
        if deadline.map_or(false, |deadline| Instant::now() >= deadline) {
            break;
        }
        token.sleep(Duration::from_millis(100));
    }

    if token.is_cancelled() {
        log::info!("Received signal, stopping...");
    }
    video.shutdown();
    writer.flush();

    let stats = video.stats();
    print_stats(&stats, json, to_stdout)?;
    Ok(())
}

fn print_stats(stats: &StatsSnapshot, json: bool, to_stdout: bool) -> Result<(), CliError> {
    let text = if json {
        serde_json::to_string_pretty(stats)
            .map_err(|e| CliError::General(format!("Failed to output JSON stats: {}", e)))?
    } else {
        format!(
            "sessions: {}\nframes captured: {}\nframes submitted: {}\nframes dropped: {}\n\
             send retries: {}\nrequeue failures: {}\nencoded units: {} ({} bytes)",
            stats.sessions_started,
            stats.frames_captured,
            stats.frames_submitted,
            stats.frames_dropped,
            stats.send_retries,
            stats.requeue_failures,
            stats.packets,
            stats.bytes
        )
    };
    // Keep the encoded stream on stdout clean.
    if to_stdout {
        eprintln!("{}", text);
    } else {
        println!("{}", text);
    }
    Ok(())
}

// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 hdmicap developers

mod bitrate;
mod detect;
mod error;
mod stream;
mod utils;

use clap::{Parser, Subcommand};
use error::result_to_exit_code;
use std::process::ExitCode;

/// hdmicap - HDMI capture, hardware H.264 encoding, and signal detection
#[derive(Parser)]
#[command(name = "hdmicap")]
#[command(version)]
#[command(about = "hdmicap - HDMI capture, hardware H.264 encoding, and signal detection")]
#[command(long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Enable verbose logging (use RUST_LOG=debug for more)
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Suppress non-error output
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Machine-readable JSON output
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Capture HDMI input and write the encoded H.264 stream
    Stream(stream::Args),

    /// Query the HDMI receiver for the current input format
    Detect(detect::Args),

    /// Show the encoder bitrate for a quality factor and resolution
    Bitrate(bitrate::Args),
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    init_logging(cli.verbose, cli.quiet);

    let result = match cli.command {
        Commands::Stream(args) => stream::execute(args, cli.json),
        Commands::Detect(args) => detect::execute(args, cli.json),
        Commands::Bitrate(args) => bitrate::execute(args, cli.json),
    };

    result_to_exit_code(result)
}

/// Initialize env_logger based on verbosity flags
fn init_logging(verbose: bool, quiet: bool) {
    let env = env_logger::Env::default();

    let env = if quiet {
        env.default_filter_or("error")
    } else if verbose {
        env.default_filter_or("debug")
    } else {
        env.default_filter_or("info")
    };

    env_logger::Builder::from_env(env)
        .format_timestamp(None)
        .format_target(false)
        .init();

    log::debug!("Logging initialized");
}

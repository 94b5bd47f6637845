// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 hdmicap developers

use crate::error::CliError;
use crate::utils;
use clap::Args as ClapArgs;
use hdmicap::quality;
use serde::Serialize;

#[derive(ClapArgs, Debug)]
pub struct Args {
    /// Quality factor; values outside 0..1 are clamped
    #[arg(allow_negative_numbers = true)]
    factor: f32,

    /// Resolution in WxH format
    #[arg(short, long, default_value = "1920x1080")]
    resolution: String,
}

#[derive(Debug, Serialize)]
struct BitrateReport {
    factor: f32,
    width: u32,
    height: u32,
    /// kbit/s
    bitrate: u32,
    max_bitrate: u32,
}

pub fn execute(args: Args, json: bool) -> Result<(), CliError> {
    let (width, height) = utils::parse_resolution(&args.resolution)?;
    let factor = quality::clamp_factor(args.factor);
    if factor != args.factor {
        log::warn!("Quality factor {} clamped to {}", args.factor, factor);
    }

    let bitrate = quality::bitrate(factor, width, height);
    let report = BitrateReport {
        factor,
        width,
        height,
        bitrate,
        max_bitrate: quality::max_bitrate(bitrate),
    };

    if json {
        let text = serde_json::to_string_pretty(&report)
            .map_err(|e| CliError::General(format!("Failed to output JSON: {}", e)))?;
        println!("{}", text);
    } else {
        println!(
            "{}x{} at quality {:.2}: bitrate {} kbps, max {} kbps",
            report.width, report.height, report.factor, report.bitrate, report.max_bitrate
        );
    }
    Ok(())
}

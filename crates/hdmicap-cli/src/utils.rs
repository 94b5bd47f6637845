// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 hdmicap developers

use crate::error::CliError;
use hdmicap::{cancel::CancelToken, config::VideoConfig};
use signal_hook::consts::{SIGINT, SIGTERM};
use signal_hook::flag;
use std::path::Path;

/// Parse resolution string in format "WxH" or "W*H"
pub fn parse_resolution(s: &str) -> Result<(u32, u32), CliError> {
    let (width_str, height_str) = s
        .split_once('x')
        .or_else(|| s.split_once('*'))
        .ok_or_else(|| {
            CliError::InvalidArgs(format!(
                "Invalid resolution format (expected WxH or W*H): {}",
                s
            ))
        })?;

    let width = width_str
        .parse::<u32>()
        .map_err(|_| CliError::InvalidArgs(format!("Invalid width in resolution: {}", s)))?;
    let height = height_str
        .parse::<u32>()
        .map_err(|_| CliError::InvalidArgs(format!("Invalid height in resolution: {}", s)))?;

    if width == 0 || height == 0 {
        return Err(CliError::InvalidArgs(format!(
            "Resolution dimensions must be positive: {}",
            s
        )));
    }

    Ok((width, height))
}

/// clap value parser for a quality factor in `[0, 1]`
pub fn parse_quality(s: &str) -> Result<f32, String> {
    let value: f32 = s
        .parse()
        .map_err(|_| format!("not a number: {}", s))?;
    if !(0.0..=1.0).contains(&value) {
        return Err(format!("quality must be between 0 and 1, got {}", s));
    }
    Ok(value)
}

/// Load `--config` if given, otherwise the defaults.
pub fn load_config(path: Option<&Path>) -> Result<VideoConfig, CliError> {
    match path {
        Some(path) => {
            log::debug!("Loading configuration from {}", path.display());
            VideoConfig::from_json_file(path).map_err(|e| {
                CliError::InvalidArgs(format!("cannot load config {}: {}", path.display(), e))
            })
        }
        None => Ok(VideoConfig::default()),
    }
}

/// Cancel `token` on SIGINT or SIGTERM.
pub fn install_signal_handler(token: &CancelToken) -> Result<(), CliError> {
    for signal in [SIGINT, SIGTERM] {
        flag::register(signal, token.flag())
            .map_err(|e| CliError::General(format!("Failed to register signal handler: {}", e)))?;
    }
    log::debug!("Installed SIGINT/SIGTERM handlers");
    Ok(())
}

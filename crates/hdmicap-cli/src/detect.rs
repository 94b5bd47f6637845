// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 hdmicap developers

use crate::error::CliError;
use crate::utils;
use clap::Args as ClapArgs;
use hdmicap::{
    cancel::CancelToken,
    config::VideoConfig,
    device::SignalSource,
    format::{classify, Detection, FormatState},
    v4l2::V4l2Subdev,
};
use std::{path::PathBuf, time::Duration};

const EVENT_POLL: Duration = Duration::from_millis(200);
const QUERY_RETRY: Duration = Duration::from_secs(1);

#[derive(ClapArgs, Debug)]
pub struct Args {
    /// HDMI receiver control subdevice
    #[arg(short, long, default_value_os_t = VideoConfig::default().subdevice)]
    subdevice: PathBuf,

    /// Keep running and print every source change
    #[arg(short, long)]
    watch: bool,
}

fn print_state(state: &FormatState, json: bool) -> Result<(), CliError> {
    if json {
        let line = serde_json::to_string(state)
            .map_err(|e| CliError::General(format!("Failed to output JSON: {}", e)))?;
        println!("{}", line);
    } else if state.signal_present {
        println!("{}x{} @ {:.2} fps", state.width, state.height, state.fps);
    } else {
        println!("no signal ({})", state.reason);
    }
    Ok(())
}

pub fn execute(args: Args, json: bool) -> Result<(), CliError> {
    log::debug!("Opening subdevice {}", args.subdevice.display());
    let mut subdev = V4l2Subdev::open(&args.subdevice)?;

    let token = CancelToken::new();
    if args.watch {
        utils::install_signal_handler(&token)?;
        subdev.subscribe_source_change()?;
    }

    loop {
        match classify(subdev.query_timings()) {
            Detection::Present(timings) => print_state(&FormatState::present(&timings), json)?,
            Detection::Absent(reason) => print_state(&FormatState::absent(reason), json)?,
            Detection::Retry(err) if args.watch => {
                log::warn!("DV timings query failed: {}", err);
                if !token.sleep(QUERY_RETRY) {
                    return Ok(());
                }
                continue;
            }
            Detection::Retry(err) => return Err(err.into()),
        }

        if !args.watch {
            return Ok(());
        }

        // Wait for the next source change.
        loop {
            if token.is_cancelled() {
                return Ok(());
            }
            if subdev.wait_event(EVENT_POLL)? {
                break;
            }
        }
    }
}

// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 hdmicap developers

use log::{error, warn};
use std::{fmt::Display, thread, time::Duration};

/// Bounded retry with a fixed backoff.
///
/// `attempts` counts retries, not calls: `Retry::once` makes at most two
/// calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Retry {
    pub attempts: u32,
    pub backoff: Duration,
}

impl Retry {
    pub const fn once(backoff: Duration) -> Self {
        Retry {
            attempts: 1,
            backoff,
        }
    }

    /// Run `op` until it succeeds or the retries are used up.
    ///
    /// Each retried failure is logged as a warning and the final one as an
    /// error; the final error is returned.
    pub fn run<T, E, F>(&self, what: &str, mut op: F) -> Result<T, E>
    where
        E: Display,
        F: FnMut() -> Result<T, E>,
    {
        let mut remaining = self.attempts;
        loop {
            match op() {
                Ok(value) => return Ok(value),
                Err(err) if remaining > 0 => {
                    warn!("{} failed, retrying: {}", what, err);
                    remaining -= 1;
                    if !self.backoff.is_zero() {
                        thread::sleep(self.backoff);
                    }
                }
                Err(err) => {
                    error!("{} failed: {}", what, err);
                    return Err(err);
                }
            }
        }
    }
}

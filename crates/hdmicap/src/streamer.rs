// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 hdmicap developers

use crate::{capture::CaptureEngine, cancel::CancelToken, Error};
use log::{debug, error, info};
use std::{
    sync::{Arc, Mutex, MutexGuard},
    thread::{self, JoinHandle},
};

struct SessionHandle {
    token: CancelToken,
    thread: JoinHandle<()>,
}

/// Owns the `video-stream` thread; the single answer to "is a session
/// running".
///
/// All operations serialise on one lock, and [`Streamer::stop`] joins the
/// thread before releasing it, so two sessions never overlap.
pub struct Streamer {
    engine: Arc<CaptureEngine>,
    session: Mutex<Option<SessionHandle>>,
}

impl Streamer {
    pub fn new(engine: Arc<CaptureEngine>) -> Self {
        Streamer {
            engine,
            session: Mutex::new(None),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Option<SessionHandle>> {
        self.session.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Start a session thread; no-op if one is running.
    pub fn start(&self) -> Result<(), Error> {
        let mut session = self.lock();
        self.start_locked(&mut session)
    }

    /// Stop the session thread and wait for its teardown; no-op if none.
    pub fn stop(&self) {
        let mut session = self.lock();
        Self::stop_locked(&mut session);
    }

    /// Stop then start, as one operation.
    pub fn restart(&self) -> Result<(), Error> {
        let mut session = self.lock();
        Self::stop_locked(&mut session);
        self.start_locked(&mut session)
    }

    /// Restart only if a session is running; returns whether it was.
    pub fn restart_if_streaming(&self) -> Result<bool, Error> {
        let mut session = self.lock();
        if session.is_none() {
            return Ok(false);
        }
        info!("restarting streaming session");
        Self::stop_locked(&mut session);
        self.start_locked(&mut session)?;
        Ok(true)
    }

    pub fn is_streaming(&self) -> bool {
        self.lock().is_some()
    }

    fn start_locked(&self, session: &mut Option<SessionHandle>) -> Result<(), Error> {
        if session.is_some() {
            debug!("streaming already active");
            return Ok(());
        }
        let token = CancelToken::new();
        let engine = Arc::clone(&self.engine);
        let thread_token = token.clone();
        let thread = thread::Builder::new()
            .name("video-stream".into())
            .spawn(move || engine.run(&thread_token))
            .map_err(Error::ThreadSpawn)?;
        *session = Some(SessionHandle { token, thread });
        info!("streaming started");
        Ok(())
    }

    fn stop_locked(session: &mut Option<SessionHandle>) {
        let Some(handle) = session.take() else {
            return;
        };
        handle.token.cancel();
        if handle.thread.join().is_err() {
            error!("video-stream thread panicked");
        }
        info!("streaming stopped");
    }
}

impl Drop for Streamer {
    fn drop(&mut self) {
        self.stop();
    }
}

// (c) Copyright 2025 Mikołaj Kuranowski
// SPDX-License-Identifier: MIT

//! A routing worker thread.
//!
//! Route computation can take a while, so interactive callers hand requests
//! to a [Session] instead of calling [Router::build_route] directly. The
//! session owns one worker thread with one [Router]; requests travel over a
//! channel and each carries its own cancellation flag plus a reply channel.
//! Issuing a new request raises the previous request's flag, so a user
//! dragging a map pin only ever waits for the newest position. A cancelled
//! computation produces no reply: its receiver reports
//! [RouterError::Cancelled] once the worker moves on.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc};
use std::thread;

use crate::profile::VehicleProfile;
use crate::route::Route;
use crate::router::Router;
use crate::{LatLon, RouterError};

struct Request {
    start: LatLon,
    finish: LatLon,
    cancel: Arc<AtomicBool>,
    reply: mpsc::Sender<Result<Route, RouterError>>,
}

/// Handle to one queued route request.
pub struct RouteRequest {
    result: mpsc::Receiver<Result<Route, RouterError>>,
    cancel: Arc<AtomicBool>,
}

impl RouteRequest {
    /// Raises the cancellation flag. The worker notices at its next
    /// cooperative check.
    pub fn cancel(&self) {
        self.cancel.store(true, Ordering::Relaxed);
    }

    /// Blocks until the request finishes.
    pub fn wait(self) -> Result<Route, RouterError> {
        self.result.recv().unwrap_or(Err(RouterError::Cancelled))
    }

    /// The result, when it is already available.
    pub fn try_result(&self) -> Option<Result<Route, RouterError>> {
        self.result.try_recv().ok()
    }
}

pub struct Session {
    requests: Option<mpsc::Sender<Request>>,
    last_cancel: Option<Arc<AtomicBool>>,
    worker: Option<thread::JoinHandle<()>>,
}

impl Session {
    /// Opens the map directory and spawns the worker thread.
    pub fn new(
        dir: impl Into<PathBuf>,
        profile: &'static VehicleProfile<'static>,
    ) -> Result<Self, RouterError> {
        // Opened on the caller's thread, so a bad directory fails fast.
        let mut router = Router::new(dir, profile)?;

        let (tx, rx) = mpsc::channel::<Request>();
        let worker = thread::spawn(move || {
            while let Ok(req) = rx.recv() {
                let result = router.build_route(req.start, req.finish, &req.cancel);
                if matches!(result, Err(RouterError::Cancelled)) {
                    continue;
                }
                // The requester may have stopped listening already.
                let _ = req.reply.send(result);
            }
        });

        Ok(Self {
            requests: Some(tx),
            last_cancel: None,
            worker: Some(worker),
        })
    }

    /// Queues a route request, cancelling the previously queued one.
    pub fn request_route(&mut self, start: LatLon, finish: LatLon) -> RouteRequest {
        if let Some(prev) = self.last_cancel.take() {
            prev.store(true, Ordering::Relaxed);
        }

        let cancel = Arc::new(AtomicBool::new(false));
        self.last_cancel = Some(cancel.clone());
        let (reply_tx, reply_rx) = mpsc::channel();

        if let Some(requests) = &self.requests {
            let _ = requests.send(Request {
                start,
                finish,
                cancel: cancel.clone(),
                reply: reply_tx,
            });
        }

        RouteRequest {
            result: reply_rx,
            cancel,
        }
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        if let Some(cancel) = self.last_cancel.take() {
            cancel.store(true, Ordering::Relaxed);
        }
        // Closing the request channel lets the worker drain and exit.
        self.requests.take();
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}

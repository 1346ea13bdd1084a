//! Connection — client-side multiplexer for many sessions on one transport.
//!
//! DESIGN
//! ======
//! Outbound frames from every session share the transport's sender, so
//! per-direction order is the order each `SendHalf` pushed its frames.
//! Inbound frames are routed by `call_id` by a single demux task into a
//! bounded per-call channel. A route is dropped once its terminal frame is
//! delivered, or when the call's receive direction is dropped, whichever
//! comes first. Calls that end locally (abort, deadline, bad frame) hear
//! nothing more from the peer, so the second path is what releases them.
//!
//! A slow receiver applies backpressure to the whole connection: the demux
//! task waits for room in that call's channel before reading further.
//!
//! ERROR HANDLING
//! ==============
//! When the transport ends, every route is dropped, so each open receive
//! direction observes a `Transport` error instead of waiting forever.
//! `open` after that point fails immediately.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use frames::{Frame, Status};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::SessionError;
use crate::session::Session;
use crate::transport::Transport;

const DEFAULT_SESSION_CAPACITY: usize = 64;

#[derive(Default)]
struct Routes {
    calls: HashMap<String, mpsc::Sender<Frame>>,
    closed: bool,
}

type SharedRoutes = Arc<Mutex<Routes>>;

fn lock(routes: &SharedRoutes) -> std::sync::MutexGuard<'_, Routes> {
    routes.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Removes one call's route when dropped. Owned by the call's receive half.
pub(crate) struct RouteGuard {
    call_id: String,
    routes: SharedRoutes,
}

impl Drop for RouteGuard {
    fn drop(&mut self) {
        if lock(&self.routes).calls.remove(&self.call_id).is_some() {
            debug!(call_id = %self.call_id, "connection: route released");
        }
    }
}

#[derive(Clone)]
pub struct Connection {
    outbound: mpsc::Sender<Frame>,
    routes: SharedRoutes,
    shutdown: CancellationToken,
    capacity: usize,
}

impl Connection {
    /// Start demultiplexing `transport`. Must be called inside a Tokio runtime.
    #[must_use]
    pub fn new(transport: Transport) -> Self {
        Self::with_capacity(transport, DEFAULT_SESSION_CAPACITY)
    }

    #[must_use]
    pub fn with_capacity(transport: Transport, capacity: usize) -> Self {
        let routes = SharedRoutes::default();
        let shutdown = CancellationToken::new();
        tokio::spawn(demux(transport.inbound, routes.clone(), shutdown.clone()));
        Self { outbound: transport.outbound, routes, shutdown, capacity: capacity.max(1) }
    }

    /// Open a new session for `method`.
    ///
    /// # Errors
    ///
    /// `Transport` if the connection is closed.
    pub async fn open(&self, method: &str) -> Result<Session, SessionError> {
        let call_id = Uuid::new_v4().to_string();
        let (tx, rx) = mpsc::channel(self.capacity);
        {
            let mut routes = lock(&self.routes);
            if routes.closed {
                return Err(SessionError::connection_closed());
            }
            routes.calls.insert(call_id.clone(), tx);
        }

        if self.outbound.send(Frame::request(&call_id, method)).await.is_err() {
            lock(&self.routes).calls.remove(&call_id);
            return Err(SessionError::connection_closed());
        }

        info!(%call_id, %method, "connection: session opened");
        let route = RouteGuard { call_id: call_id.clone(), routes: self.routes.clone() };
        Ok(Session::new(call_id, method, self.outbound.clone(), rx, self.shutdown.child_token()).with_route(route))
    }

    /// Calls that still have a route.
    #[must_use]
    pub fn open_calls(&self) -> usize {
        lock(&self.routes).calls.len()
    }

    /// Cancel every session and stop routing.
    pub fn close(&self) {
        self.shutdown.cancel();
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        lock(&self.routes).closed
    }
}

async fn demux(mut inbound: mpsc::Receiver<Frame>, routes: SharedRoutes, shutdown: CancellationToken) {
    loop {
        let frame = tokio::select! {
            () = shutdown.cancelled() => break,
            frame = inbound.recv() => frame,
        };
        let Some(frame) = frame else { break };

        let route = lock(&routes).calls.get(&frame.call_id).cloned();
        let Some(route) = route else {
            debug!(call_id = %frame.call_id, status = ?frame.status, "connection: frame for unknown call dropped");
            continue;
        };

        let call_id = frame.call_id.clone();
        let terminal = matches!(frame.status, Status::Done | Status::Error | Status::Cancel);
        let delivered = tokio::select! {
            () = shutdown.cancelled() => break,
            sent = route.send(frame) => sent.is_ok(),
        };
        if terminal || !delivered {
            lock(&routes).calls.remove(&call_id);
        }
    }

    let mut table = lock(&routes);
    table.closed = true;
    table.calls.clear();
    info!("connection: closed");
}

#[cfg(test)]
#[path = "connection_test.rs"]
mod tests;

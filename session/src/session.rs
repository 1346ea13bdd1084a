//! Session — one call-scoped duplex channel.
//!
//! DESIGN
//! ======
//! A session is built from the connection's shared outbound frame sender,
//! a per-call inbound frame receiver, and a per-call cancellation token.
//! `split` hands out one half per direction. Neither half is `Clone`, so at
//! most one activity can send and at most one can receive.
//!
//! LIFECYCLE
//! =========
//! Send direction:    Open → HalfClosed (`close_send`, peer sees `Done`)
//!                    Open → Closed     (`fail`, transport error, cancel)
//! Receive direction: Open → Closed     (`Done` observed)
//!                    Open → Failed     (error terminal, cancel, bad frame)
//!
//! Frames on each direction carry a sequence number starting at 0. A gap
//! or replay fails the receive direction instead of reordering silently.

use std::marker::PhantomData;

use frames::{Frame, Status};
use futures::Stream;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::connection::RouteGuard;
use crate::error::{ProtocolError, RemoteError, SessionError};

// =============================================================================
// SESSION
// =============================================================================

pub struct Session {
    call_id: String,
    method: String,
    outbound: mpsc::Sender<Frame>,
    inbound: mpsc::Receiver<Frame>,
    cancel: CancellationToken,
    route: Option<RouteGuard>,
}

impl Session {
    pub fn new(
        call_id: impl Into<String>,
        method: impl Into<String>,
        outbound: mpsc::Sender<Frame>,
        inbound: mpsc::Receiver<Frame>,
        cancel: CancellationToken,
    ) -> Self {
        Self { call_id: call_id.into(), method: method.into(), outbound, inbound, cancel, route: None }
    }

    /// Release the connection's route for this call when the receive
    /// direction is dropped.
    pub(crate) fn with_route(mut self, route: RouteGuard) -> Self {
        self.route = Some(route);
        self
    }

    #[must_use]
    pub fn call_id(&self) -> &str {
        &self.call_id
    }

    #[must_use]
    pub fn method(&self) -> &str {
        &self.method
    }

    /// Handle that can abort the call from any task.
    #[must_use]
    pub fn abort_handle(&self) -> AbortHandle {
        AbortHandle {
            call_id: self.call_id.clone(),
            method: self.method.clone(),
            outbound: self.outbound.clone(),
            cancel: self.cancel.clone(),
        }
    }

    /// Hand out the two directions. `Out` is what this side sends, `In` is
    /// what it receives.
    #[must_use]
    pub fn split<Out, In>(self) -> (SendHalf<Out>, RecvHalf<In>) {
        let send = SendHalf {
            call_id: self.call_id.clone(),
            method: self.method.clone(),
            seq: 0,
            sent: 0,
            state: SendState::Open,
            outbound: self.outbound,
            cancel: self.cancel.clone(),
            _marker: PhantomData,
        };
        let recv = RecvHalf {
            call_id: self.call_id,
            method: self.method,
            expected: 0,
            received: 0,
            state: RecvState::Open,
            inbound: self.inbound,
            cancel: self.cancel,
            _route: self.route,
            _marker: PhantomData,
        };
        (send, recv)
    }
}

// =============================================================================
// ABORT
// =============================================================================

/// Cancels a call: both local directions return `Cancelled` promptly and the
/// peer is told with a `Cancel` frame.
#[derive(Clone, Debug)]
pub struct AbortHandle {
    call_id: String,
    method: String,
    outbound: mpsc::Sender<Frame>,
    cancel: CancellationToken,
}

impl AbortHandle {
    pub fn abort(&self) {
        if self.cancel.is_cancelled() {
            return;
        }
        self.cancel.cancel();
        notify_cancel(&self.outbound, &self.call_id, &self.method);
        debug!(call_id = %self.call_id, method = %self.method, "session: aborted");
    }

    #[must_use]
    pub fn is_aborted(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Completes once the call is cancelled from either side.
    pub async fn cancelled(&self) {
        self.cancel.cancelled().await;
    }
}

/// Queue a `Cancel` frame for the peer. When the shared queue is full the
/// frame is handed to a task that waits for room.
fn notify_cancel(outbound: &mpsc::Sender<Frame>, call_id: &str, method: &str) {
    match outbound.try_send(Frame::cancel(call_id, method)) {
        Ok(()) => {}
        Err(TrySendError::Full(frame)) => match Handle::try_current() {
            Ok(runtime) => {
                let outbound = outbound.clone();
                runtime.spawn(async move {
                    if outbound.send(frame).await.is_err() {
                        debug!("session: deferred cancel frame not delivered");
                    }
                });
            }
            Err(_) => warn!(%call_id, "session: cancel frame dropped outside a runtime"),
        },
        Err(TrySendError::Closed(_)) => debug!(%call_id, "session: cancel frame not delivered"),
    }
}

// =============================================================================
// SEND DIRECTION
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendState {
    Open,
    HalfClosed,
    Closed,
}

pub struct SendHalf<T> {
    call_id: String,
    method: String,
    seq: u64,
    sent: usize,
    state: SendState,
    outbound: mpsc::Sender<Frame>,
    cancel: CancellationToken,
    _marker: PhantomData<fn(T)>,
}

impl<T> SendHalf<T> {
    #[must_use]
    pub fn state(&self) -> SendState {
        self.state
    }

    /// Number of messages accepted so far.
    #[must_use]
    pub fn sent(&self) -> usize {
        self.sent
    }

    #[must_use]
    pub fn call_id(&self) -> &str {
        &self.call_id
    }

    pub(crate) fn token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Send the clean end-of-stream marker. No-op unless the direction is open.
    ///
    /// # Errors
    ///
    /// `Transport` if the connection is gone, `Cancelled` if the call was aborted.
    pub async fn close_send(&mut self) -> Result<(), SessionError> {
        if self.state != SendState::Open {
            return Ok(());
        }
        let frame = Frame::new(&self.call_id, &self.method, self.seq, Status::Done, Value::Object(Map::new()));
        self.push(frame).await?;
        self.state = SendState::HalfClosed;
        debug!(call_id = %self.call_id, sent = self.sent, "session: send closed");
        Ok(())
    }

    /// Send an error terminal instead of a clean end.
    ///
    /// # Errors
    ///
    /// `SendAfterClose` if the direction is no longer open, otherwise the
    /// same failures as [`SendHalf::close_send`].
    pub async fn fail(&mut self, err: &RemoteError) -> Result<(), SessionError> {
        if self.state != SendState::Open {
            return Err(ProtocolError::SendAfterClose.into());
        }
        let frame = Frame::error(&self.call_id, &self.method, self.seq, err.code.as_str(), &err.message);
        self.push(frame).await?;
        self.state = SendState::Closed;
        Ok(())
    }

    async fn push(&mut self, frame: Frame) -> Result<(), SessionError> {
        let result = tokio::select! {
            biased;
            () = self.cancel.cancelled() => Err(SessionError::Cancelled),
            sent = self.outbound.send(frame) => sent.map_err(|_| SessionError::connection_closed()),
        };
        match result {
            Ok(()) => self.seq += 1,
            Err(_) => self.state = SendState::Closed,
        }
        result
    }
}

impl<T: Serialize> SendHalf<T> {
    /// Send one message. Suspends until the connection accepts the frame.
    ///
    /// # Errors
    ///
    /// `SendAfterClose` once the direction left `Open`; `Transport`,
    /// `Cancelled` or `Encode` otherwise. Any failure closes the direction.
    pub async fn send(&mut self, message: &T) -> Result<(), SessionError> {
        if self.state != SendState::Open {
            return Err(ProtocolError::SendAfterClose.into());
        }
        let data = serde_json::to_value(message).map_err(|e| ProtocolError::Encode(e.to_string()))?;
        let frame = Frame::new(&self.call_id, &self.method, self.seq, Status::Item, data);
        self.push(frame).await?;
        self.sent += 1;
        Ok(())
    }
}

impl<T> Drop for SendHalf<T> {
    fn drop(&mut self) {
        if self.state != SendState::Open || self.cancel.is_cancelled() {
            return;
        }
        // Released without a terminal: the peer must not wait forever.
        self.cancel.cancel();
        notify_cancel(&self.outbound, &self.call_id, &self.method);
        warn!(call_id = %self.call_id, method = %self.method, "session: send half dropped while open");
    }
}

// =============================================================================
// RECEIVE DIRECTION
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecvState {
    Open,
    Closed,
    Failed,
}

/// Outcome of one successful `receive`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Received<T> {
    Message(T),
    End,
}

pub struct RecvHalf<T> {
    call_id: String,
    method: String,
    expected: u64,
    received: usize,
    state: RecvState,
    inbound: mpsc::Receiver<Frame>,
    cancel: CancellationToken,
    _route: Option<RouteGuard>,
    _marker: PhantomData<fn() -> T>,
}

impl<T> RecvHalf<T> {
    #[must_use]
    pub fn state(&self) -> RecvState {
        self.state
    }

    /// Number of messages delivered so far.
    #[must_use]
    pub fn received(&self) -> usize {
        self.received
    }

    #[must_use]
    pub fn call_id(&self) -> &str {
        &self.call_id
    }

    fn failed(&mut self, err: SessionError) -> SessionError {
        self.state = RecvState::Failed;
        debug!(call_id = %self.call_id, method = %self.method, error = %err, "session: receive failed");
        err
    }
}

impl<T: DeserializeOwned> RecvHalf<T> {
    /// Wait for the next message or the end of the stream.
    ///
    /// After `End` every further call returns `End` again without waiting.
    ///
    /// # Errors
    ///
    /// The peer's error terminal as `Remote`, `Cancelled` on abort,
    /// `Transport` if the connection drops, protocol errors for bad frames,
    /// and `ReceiveAfterClose` once the direction has failed.
    pub async fn receive(&mut self) -> Result<Received<T>, SessionError> {
        match self.state {
            RecvState::Open => {}
            RecvState::Closed => return Ok(Received::End),
            RecvState::Failed => return Err(ProtocolError::ReceiveAfterClose.into()),
        }

        let frame = tokio::select! {
            biased;
            () = self.cancel.cancelled() => return Err(self.failed(SessionError::Cancelled)),
            frame = self.inbound.recv() => frame,
        };
        let Some(frame) = frame else {
            return Err(self.failed(SessionError::connection_closed()));
        };
        self.accept(frame)
    }

    fn accept(&mut self, frame: Frame) -> Result<Received<T>, SessionError> {
        match frame.status {
            Status::Cancel => {
                self.cancel.cancel();
                return Err(self.failed(SessionError::Cancelled));
            }
            Status::Request => {
                return Err(self.failed(ProtocolError::UnexpectedFrame(Status::Request).into()));
            }
            Status::Item | Status::Done | Status::Error => {}
        }

        if frame.seq != self.expected {
            let err = ProtocolError::OutOfOrder { expected: self.expected, got: frame.seq };
            return Err(self.failed(err.into()));
        }
        self.expected += 1;

        match frame.status {
            Status::Item => match serde_json::from_value(frame.data) {
                Ok(message) => {
                    self.received += 1;
                    Ok(Received::Message(message))
                }
                Err(e) => Err(self.failed(ProtocolError::Decode(e.to_string()).into())),
            },
            Status::Done => {
                self.state = RecvState::Closed;
                debug!(call_id = %self.call_id, received = self.received, "session: receive closed");
                Ok(Received::End)
            }
            _ => Err(self.failed(RemoteError::from_frame(&frame).into())),
        }
    }

    /// Consume the direction as a lazy, finite stream. Ends after `Done`;
    /// yields one error and then ends on failure.
    pub fn into_stream(self) -> impl Stream<Item = Result<T, SessionError>> {
        futures::stream::unfold(Some(self), |recv| async move {
            let mut recv = recv?;
            match recv.receive().await {
                Ok(Received::Message(message)) => Some((Ok(message), Some(recv))),
                Ok(Received::End) => None,
                Err(e) => Some((Err(e), None)),
            }
        })
    }
}

#[cfg(test)]
#[path = "session_test.rs"]
mod tests;

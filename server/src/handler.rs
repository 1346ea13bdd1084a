//! Stream Handler — server side of one call.
//!
//! DESIGN
//! ======
//! A handler owns both halves of a server session and moves through
//! `Receiving -> Draining -> Terminal`:
//!
//! - `Receiving`: inbound messages are read and applied one at a time.
//! - `Draining`: the client's send direction has ended; the handler
//!   produces its reply (one aggregate message, or a stream).
//! - `Terminal`: the reply direction is closed or failed.
//!
//! Unary and server-streaming calls read exactly one request with
//! [`StreamHandler::request`], which leaves the handler in `Draining`.
//!
//! ERROR HANDLING
//! ==============
//! Per-record storage failures during [`StreamHandler::ingest`] are counted,
//! not returned. A fatal storage failure, a session failure or a bad request
//! ends the call: [`StreamHandler::abort`] sends the categorised error
//! terminal when the peer can still hear it. Nothing is retried here.
//!
//! Storage work runs through [`StreamHandler::cancellable`], so a client
//! `Cancel` ends the call without waiting for a slow query to return.

use std::future::Future;

use serde::Serialize;
use serde::de::DeserializeOwned;
use session::{
    AbortHandle, Code, ErrorCode, Received, RecvHalf, RemoteError, SendHalf, SendState, Session, SessionError,
};
use tracing::{debug, warn};

use crate::storage::StorageError;

// =============================================================================
// TYPES
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Receiving,
    Draining,
    Terminal,
}

#[derive(Debug, thiserror::Error)]
pub enum HandlerError {
    #[error(transparent)]
    Session(#[from] SessionError),
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error("invalid request: {0}")]
    Invalid(String),
}

impl ErrorCode for HandlerError {
    fn code(&self) -> Code {
        match self {
            Self::Session(e) => e.code(),
            Self::Storage(e) => e.code(),
            Self::Invalid(_) => Code::Invalid,
        }
    }
}

/// Outcome of draining a client stream into storage.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Ingest {
    pub received: usize,
    pub failed: usize,
}

impl Ingest {
    /// True when every received message was stored.
    #[must_use]
    pub fn ok(&self) -> bool {
        self.failed == 0
    }
}

// =============================================================================
// HANDLER
// =============================================================================

pub struct StreamHandler<In, Out> {
    call_id: String,
    method: String,
    recv: RecvHalf<In>,
    send: SendHalf<Out>,
    abort: AbortHandle,
    phase: Phase,
}

impl<In, Out> StreamHandler<In, Out>
where
    In: DeserializeOwned,
    Out: Serialize,
{
    pub fn new(session: Session) -> Self {
        let call_id = session.call_id().to_owned();
        let method = session.method().to_owned();
        let abort = session.abort_handle();
        let (send, recv) = session.split::<Out, In>();
        Self { call_id, method, recv, send, abort, phase: Phase::Receiving }
    }

    #[must_use]
    pub fn phase(&self) -> Phase {
        self.phase
    }

    #[must_use]
    pub fn call_id(&self) -> &str {
        &self.call_id
    }

    /// Await `work` unless the call is cancelled first, in which case `work`
    /// is dropped and the call fails with `Cancelled`.
    ///
    /// # Errors
    ///
    /// `Cancelled` if the call was cancelled before `work` completed.
    pub async fn cancellable<F: Future>(&self, work: F) -> Result<F::Output, HandlerError> {
        tokio::select! {
            biased;
            () = self.abort.cancelled() => Err(SessionError::Cancelled.into()),
            output = work => Ok(output),
        }
    }

    /// Next inbound message, or `None` once the client closed its send
    /// direction (the handler is then `Draining`).
    ///
    /// # Errors
    ///
    /// Any receive failure.
    pub async fn next(&mut self) -> Result<Option<In>, HandlerError> {
        match self.recv.receive().await? {
            Received::Message(message) => Ok(Some(message)),
            Received::End => {
                self.phase = Phase::Draining;
                Ok(None)
            }
        }
    }

    /// Read the single request of a unary or server-streaming call.
    ///
    /// # Errors
    ///
    /// `Invalid` if the client sent no request or more than one.
    pub async fn request(&mut self) -> Result<In, HandlerError> {
        let Some(request) = self.next().await? else {
            return Err(HandlerError::Invalid("missing request".into()));
        };
        if self.next().await?.is_some() {
            return Err(HandlerError::Invalid("expected a single request".into()));
        }
        Ok(request)
    }

    /// Apply every inbound message to `apply` until the client's end of
    /// stream. Per-record storage failures are counted and the loop goes on.
    ///
    /// # Errors
    ///
    /// Receive failures, cancellation, and fatal storage failures.
    pub async fn ingest<F, Fut>(&mut self, mut apply: F) -> Result<Ingest, HandlerError>
    where
        F: FnMut(In) -> Fut,
        Fut: Future<Output = Result<(), StorageError>>,
    {
        let mut ingest = Ingest::default();
        while let Some(message) = self.next().await? {
            ingest.received += 1;
            match self.cancellable(apply(message)).await? {
                Ok(()) => {}
                Err(e) if e.is_fatal() => return Err(e.into()),
                Err(e) => {
                    ingest.failed += 1;
                    warn!(call_id = %self.call_id, method = %self.method, error = %e, "handler: record not stored");
                }
            }
        }
        debug!(call_id = %self.call_id, received = ingest.received, failed = ingest.failed, "handler: ingest complete");
        Ok(ingest)
    }

    /// Send one reply message without closing.
    ///
    /// # Errors
    ///
    /// Any send failure.
    pub async fn emit(&mut self, message: &Out) -> Result<(), HandlerError> {
        self.send.send(message).await?;
        Ok(())
    }

    /// Close the reply direction cleanly.
    ///
    /// # Errors
    ///
    /// Any send failure.
    pub async fn finish(&mut self) -> Result<(), HandlerError> {
        self.send.close_send().await?;
        self.phase = Phase::Terminal;
        Ok(())
    }

    /// Send the single terminal reply and close.
    ///
    /// # Errors
    ///
    /// Any send failure.
    pub async fn reply(&mut self, message: &Out) -> Result<(), HandlerError> {
        self.emit(message).await?;
        self.finish().await
    }

    /// End the call with `err`. The error terminal is sent unless the call
    /// was cancelled, the transport is gone, or the reply already closed.
    pub async fn abort(&mut self, err: &HandlerError) {
        self.phase = Phase::Terminal;
        let silent = matches!(err, HandlerError::Session(SessionError::Cancelled | SessionError::Transport(_)));
        if silent || self.send.state() != SendState::Open {
            debug!(call_id = %self.call_id, error = %err, "handler: aborted without error terminal");
            return;
        }
        if let Err(e) = self.send.fail(&RemoteError::from_error(err)).await {
            debug!(call_id = %self.call_id, error = %e, "handler: error terminal not delivered");
        }
    }

    /// Settle the call with a handler body's result.
    pub async fn settle(&mut self, result: Result<(), HandlerError>) {
        match result {
            Ok(()) => debug!(call_id = %self.call_id, method = %self.method, "handler: complete"),
            Err(e) => {
                warn!(
                    call_id = %self.call_id,
                    method = %self.method,
                    phase = ?self.phase,
                    code = %e.code(),
                    error = %e,
                    "handler: failed"
                );
                self.abort(&e).await;
            }
        }
    }
}

#[cfg(test)]
#[path = "handler_test.rs"]
mod tests;

//! Client call shapes: unary, client streaming, server streaming, bidi.
//!
//! DESIGN
//! ======
//! Every shape opens one session on a [`Connection`] and splits it. The
//! streaming shapes run the [`Driver`] (send direction) and the receive
//! loop (receive direction) concurrently with `tokio::join!`, so a call
//! returns only after the send direction is closed AND the receive
//! direction reached its terminal signal. If the receive side fails first,
//! the call is aborted so the driver stops instead of pacing on.
//!
//! A single-reply call that sees `End` without a reply, or a second reply,
//! fails: partial exchanges are never reported as success.

use std::future::Future;
use std::time::Duration;

use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{info, warn};

use crate::connection::Connection;
use crate::driver::{Driver, Pacing};
use crate::error::{ProtocolError, SessionError};
use crate::receiver::StreamReceiver;
use crate::session::{AbortHandle, Received, RecvHalf};

/// Per-call policy.
#[derive(Debug, Clone, Copy, Default)]
pub struct CallOptions {
    /// Delay between outbound messages on streaming calls.
    pub pacing: Pacing,
    /// Abort the call with `Cancelled` once this much time has passed.
    pub deadline: Option<Duration>,
}

impl CallOptions {
    #[must_use]
    pub fn with_pacing(mut self, pacing: Pacing) -> Self {
        self.pacing = pacing;
        self
    }

    #[must_use]
    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = Some(deadline);
        self
    }
}

/// Message counts of a finished bidirectional call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Exchange {
    pub sent: usize,
    pub received: usize,
}

// =============================================================================
// SHAPES
// =============================================================================

/// One request, one reply.
///
/// # Errors
///
/// Any session failure, or `MissingReply`/`ExtraReply` if the peer does
/// not answer with exactly one message.
pub async fn unary<Req, Resp>(
    conn: &Connection,
    method: &str,
    request: &Req,
    options: &CallOptions,
) -> Result<Resp, SessionError>
where
    Req: Serialize,
    Resp: DeserializeOwned,
{
    let session = conn.open(method).await?;
    let abort = session.abort_handle();
    let (mut send, mut recv) = session.split::<Req, Resp>();

    let call = async {
        send.send(request).await?;
        send.close_send().await?;
        single_reply(&mut recv).await
    };
    finish(method, with_deadline(&abort, options.deadline, call).await)
}

/// Many requests, one reply.
///
/// # Errors
///
/// The reply failure if the receive side failed, otherwise the driver's.
pub async fn client_streaming<Req, Resp, I>(
    conn: &Connection,
    method: &str,
    messages: I,
    options: &CallOptions,
) -> Result<Resp, SessionError>
where
    Req: Serialize,
    Resp: DeserializeOwned,
    I: IntoIterator<Item = Req>,
{
    let session = conn.open(method).await?;
    let abort = session.abort_handle();
    let (send, mut recv) = session.split::<Req, Resp>();

    let call = async {
        let driver = Driver::new(options.pacing).run(send, messages);
        let reply = abort_on_failure(&abort, single_reply(&mut recv));
        let (sent, reply) = tokio::join!(driver, reply);
        let reply = reply?;
        sent?;
        Ok(reply)
    };
    finish(method, with_deadline(&abort, options.deadline, call).await)
}

/// One request, a stream of replies handed to `consumer`. Returns the
/// number of replies.
///
/// # Errors
///
/// Any session failure; replies consumed before the failure stay consumed.
pub async fn server_streaming<Req, Resp, F>(
    conn: &Connection,
    method: &str,
    request: &Req,
    consumer: F,
    options: &CallOptions,
) -> Result<usize, SessionError>
where
    Req: Serialize,
    Resp: DeserializeOwned,
    F: FnMut(Resp),
{
    let session = conn.open(method).await?;
    let abort = session.abort_handle();
    let (mut send, mut recv) = session.split::<Req, Resp>();

    let call = async {
        send.send(request).await?;
        send.close_send().await?;
        StreamReceiver::new(consumer).run(&mut recv).await
    };
    finish(method, with_deadline(&abort, options.deadline, call).await)
}

/// Both directions stream independently.
///
/// # Errors
///
/// The receive failure if the receive side failed, otherwise the driver's.
pub async fn bidi_streaming<Req, Resp, I, F>(
    conn: &Connection,
    method: &str,
    messages: I,
    consumer: F,
    options: &CallOptions,
) -> Result<Exchange, SessionError>
where
    Req: Serialize,
    Resp: DeserializeOwned,
    I: IntoIterator<Item = Req>,
    F: FnMut(Resp),
{
    let session = conn.open(method).await?;
    let abort = session.abort_handle();
    let (send, mut recv) = session.split::<Req, Resp>();

    let call = async {
        let driver = Driver::new(options.pacing).run(send, messages);
        let receiver = abort_on_failure(&abort, StreamReceiver::new(consumer).run(&mut recv));
        let (sent, received) = tokio::join!(driver, receiver);
        let received = received?;
        let sent = sent?;
        Ok(Exchange { sent, received })
    };
    finish(method, with_deadline(&abort, options.deadline, call).await)
}

// =============================================================================
// HELPERS
// =============================================================================

async fn single_reply<T: DeserializeOwned>(recv: &mut RecvHalf<T>) -> Result<T, SessionError> {
    let Received::Message(reply) = recv.receive().await? else {
        return Err(ProtocolError::MissingReply.into());
    };
    match recv.receive().await? {
        Received::End => Ok(reply),
        Received::Message(_) => Err(ProtocolError::ExtraReply.into()),
    }
}

async fn abort_on_failure<T>(
    abort: &AbortHandle,
    fut: impl Future<Output = Result<T, SessionError>>,
) -> Result<T, SessionError> {
    let result = fut.await;
    if result.is_err() {
        abort.abort();
    }
    result
}

/// Race `call` against the deadline. The call future stays alive until the
/// abort has been issued, so its halves observe cancellation rather than
/// being dropped open.
async fn with_deadline<T>(
    abort: &AbortHandle,
    deadline: Option<Duration>,
    call: impl Future<Output = Result<T, SessionError>>,
) -> Result<T, SessionError> {
    let Some(deadline) = deadline else {
        return call.await;
    };
    let call = std::pin::pin!(call);
    tokio::select! {
        result = call => result,
        () = tokio::time::sleep(deadline) => {
            abort.abort();
            Err(SessionError::Cancelled)
        }
    }
}

fn finish<T>(method: &str, result: Result<T, SessionError>) -> Result<T, SessionError> {
    match &result {
        Ok(_) => info!(%method, "call: complete"),
        Err(e) => warn!(%method, error = %e, "call: failed"),
    }
    result
}

#[cfg(test)]
#[path = "call_test.rs"]
mod tests;

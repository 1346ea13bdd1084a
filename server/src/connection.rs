//! Connection dispatcher — server side of one transport.
//!
//! DESIGN
//! ======
//! A single loop reads inbound frames and routes them by `call_id`:
//!
//! - `Request` for a method the service accepts opens a call: a bounded
//!   inbound queue, a child cancellation token, and a task running
//!   [`Service::call`] on the new session.
//! - `Item`/`Done`/`Error` go to that call's queue. After `Done` or `Error`
//!   the queue is dropped; the call stays registered so a later `Cancel`
//!   still reaches it.
//! - `Cancel` cancels the call's token.
//!
//! A call is forgotten when its task finishes, including by panic. Tasks
//! are tracked by task id, so a finished task only removes the entry it
//! registered. Frames for unknown or finished calls are dropped.
//!
//! ERROR HANDLING
//! ==============
//! Unknown methods and duplicate call ids are rejected with an `E_INVALID`
//! error frame; a duplicate also cancels the call it collided with. When
//! the transport ends, every call is cancelled and awaited.

use std::collections::HashMap;
use std::sync::Arc;

use frames::{Frame, Status};
use session::{Code, Session, Transport};
use tokio::sync::mpsc;
use tokio::task::{self, JoinError, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::services::Service;

struct Call {
    /// `None` once the client's send direction is terminal.
    inbound: Option<mpsc::Sender<Frame>>,
    cancel: CancellationToken,
    task: task::Id,
}

struct Dispatcher<S> {
    service: Arc<S>,
    outbound: mpsc::Sender<Frame>,
    calls: HashMap<String, Call>,
    tasks: JoinSet<()>,
    /// Call id each running task was spawned for.
    owners: HashMap<task::Id, String>,
    shutdown: CancellationToken,
    capacity: usize,
}

/// Serve calls arriving on `transport` until it ends.
pub async fn serve_connection<S: Service>(transport: Transport, service: Arc<S>, capacity: usize) {
    let Transport { outbound, mut inbound } = transport;
    let mut dispatcher = Dispatcher {
        service,
        outbound,
        calls: HashMap::new(),
        tasks: JoinSet::new(),
        owners: HashMap::new(),
        shutdown: CancellationToken::new(),
        capacity: capacity.max(1),
    };

    loop {
        tokio::select! {
            frame = inbound.recv() => {
                let Some(frame) = frame else { break };
                dispatcher.on_frame(frame).await;
            }
            Some(joined) = dispatcher.tasks.join_next_with_id() => dispatcher.on_call_finished(joined),
        }
    }

    let open = dispatcher.calls.len();
    dispatcher.shutdown.cancel();
    while let Some(joined) = dispatcher.tasks.join_next_with_id().await {
        dispatcher.on_call_finished(joined);
    }
    info!(cancelled = open, "connection: transport closed");
}

impl<S: Service> Dispatcher<S> {
    async fn on_frame(&mut self, frame: Frame) {
        debug!(call_id = %frame.call_id, seq = frame.seq, status = ?frame.status, "connection: recv frame");
        match frame.status {
            Status::Request => self.open(frame).await,
            Status::Cancel => match self.calls.remove(&frame.call_id) {
                Some(call) => {
                    call.cancel.cancel();
                    info!(call_id = %frame.call_id, method = %frame.method, "connection: call cancelled by client");
                }
                None => debug!(call_id = %frame.call_id, "connection: cancel for unknown call dropped"),
            },
            Status::Item | Status::Done | Status::Error => self.deliver(frame).await,
        }
    }

    async fn open(&mut self, frame: Frame) {
        if !self.service.accepts(&frame.method) {
            let message = format!("unknown method: {}", frame.method);
            self.reject(&frame, &message).await;
            return;
        }
        if let Some(existing) = self.calls.remove(&frame.call_id) {
            existing.cancel.cancel();
            self.reject(&frame, "duplicate call id").await;
            return;
        }

        let (tx, rx) = mpsc::channel(self.capacity);
        let cancel = self.shutdown.child_token();
        let session = Session::new(&frame.call_id, &frame.method, self.outbound.clone(), rx, cancel.clone());

        let service = self.service.clone();
        let task = self.tasks.spawn(async move { service.call(session).await }).id();
        self.owners.insert(task, frame.call_id.clone());
        self.calls.insert(frame.call_id.clone(), Call { inbound: Some(tx), cancel, task });
        info!(call_id = %frame.call_id, method = %frame.method, "connection: call opened");
    }

    async fn deliver(&mut self, frame: Frame) {
        let Some(call) = self.calls.get_mut(&frame.call_id) else {
            debug!(call_id = %frame.call_id, status = ?frame.status, "connection: frame for unknown call dropped");
            return;
        };
        let Some(inbound) = call.inbound.clone() else {
            debug!(call_id = %frame.call_id, status = ?frame.status, "connection: frame after client end dropped");
            return;
        };

        let terminal = frame.status.is_terminal();
        let delivered = inbound.send(frame).await.is_ok();
        if terminal || !delivered {
            call.inbound = None;
        }
    }

    async fn reject(&self, frame: &Frame, message: &str) {
        warn!(call_id = %frame.call_id, method = %frame.method, message, "connection: call rejected");
        let error = Frame::error(&frame.call_id, &frame.method, 0, Code::Invalid.as_str(), message);
        if self.outbound.send(error).await.is_err() {
            debug!(call_id = %frame.call_id, "connection: rejection not delivered");
        }
    }

    fn on_call_finished(&mut self, joined: Result<(task::Id, ()), JoinError>) {
        let (task, failure) = match joined {
            Ok((task, ())) => (task, None),
            Err(e) => (e.id(), Some(e)),
        };
        let Some(call_id) = self.owners.remove(&task) else {
            return;
        };
        if self.calls.get(&call_id).is_some_and(|call| call.task == task) {
            self.calls.remove(&call_id);
        }
        match failure {
            None => debug!(%call_id, "connection: call finished"),
            Some(e) => warn!(%call_id, error = %e, "connection: call task failed"),
        }
    }
}

#[cfg(test)]
#[path = "connection_test.rs"]
mod tests;

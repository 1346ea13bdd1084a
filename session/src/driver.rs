//! Stream Driver — pushes an ordered sequence onto a send direction.
//!
//! The driver owns the [`SendHalf`] for the whole run and always calls
//! `close_send` exactly once on the way out, whether the sequence was
//! exhausted or a send failed. A failed send stops the run; nothing is
//! retried. If the driver future itself is dropped, the half's `Drop`
//! notifies the peer instead.

use std::time::Duration;

use serde::Serialize;
use tracing::{debug, warn};

use crate::error::SessionError;
use crate::session::SendHalf;

/// Delay policy between consecutive messages.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Pacing {
    #[default]
    Immediate,
    /// Wait this long between two sends. No delay after the last one.
    Fixed(Duration),
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Driver {
    pacing: Pacing,
}

impl Driver {
    #[must_use]
    pub fn new(pacing: Pacing) -> Self {
        Self { pacing }
    }

    /// Send every message in order, then close the send direction.
    /// Returns how many messages were accepted.
    ///
    /// # Errors
    ///
    /// The first send failure, or the close failure if every send succeeded.
    pub async fn run<T, I>(self, mut send: SendHalf<T>, messages: I) -> Result<usize, SessionError>
    where
        T: Serialize,
        I: IntoIterator<Item = T>,
    {
        let pumped = self.pump(&mut send, messages).await;
        let closed = send.close_send().await;

        let sent = pumped.inspect_err(|e| {
            warn!(call_id = %send.call_id(), sent = send.sent(), error = %e, "driver: stopped early");
        })?;
        closed?;
        debug!(call_id = %send.call_id(), sent, "driver: complete");
        Ok(sent)
    }

    async fn pump<T, I>(&self, send: &mut SendHalf<T>, messages: I) -> Result<usize, SessionError>
    where
        T: Serialize,
        I: IntoIterator<Item = T>,
    {
        for (index, message) in messages.into_iter().enumerate() {
            if index > 0 {
                self.pause(send).await?;
            }
            send.send(&message).await?;
        }
        Ok(send.sent())
    }

    async fn pause<T>(&self, send: &SendHalf<T>) -> Result<(), SessionError> {
        let Pacing::Fixed(delay) = self.pacing else {
            return Ok(());
        };
        tokio::select! {
            biased;
            () = send.token().cancelled() => Err(SessionError::Cancelled),
            () = tokio::time::sleep(delay) => Ok(()),
        }
    }
}

#[cfg(test)]
#[path = "driver_test.rs"]
mod tests;

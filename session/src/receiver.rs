//! Stream Receiver — drains a receive direction into a consumer.

use serde::de::DeserializeOwned;
use tracing::debug;

use crate::error::SessionError;
use crate::session::{Received, RecvHalf};

/// Hands each inbound message to `consumer` before asking for the next one.
pub struct StreamReceiver<F> {
    consumer: F,
}

impl<F> StreamReceiver<F> {
    pub fn new(consumer: F) -> Self {
        Self { consumer }
    }

    /// Loop until the peer's terminal signal. Returns the number of
    /// messages consumed on a clean end.
    ///
    /// # Errors
    ///
    /// Any receive failure; the direction is not retried.
    pub async fn run<T>(mut self, recv: &mut RecvHalf<T>) -> Result<usize, SessionError>
    where
        T: DeserializeOwned,
        F: FnMut(T),
    {
        let mut consumed = 0_usize;
        loop {
            match recv.receive().await? {
                Received::Message(message) => {
                    (self.consumer)(message);
                    consumed += 1;
                }
                Received::End => {
                    debug!(call_id = %recv.call_id(), consumed, "receiver: end of stream");
                    return Ok(consumed);
                }
            }
        }
    }
}

//! Duplex frame transport shared by every session on one connection.
//!
//! The websocket adapters in `server` and `cli` turn a socket into a
//! [`Transport`]; tests use [`pair`] to connect both peers in memory.

use frames::Frame;
use tokio::sync::mpsc;

/// Frames leave through `outbound` and arrive on `inbound`.
pub struct Transport {
    pub outbound: mpsc::Sender<Frame>,
    pub inbound: mpsc::Receiver<Frame>,
}

impl Transport {
    #[must_use]
    pub fn new(outbound: mpsc::Sender<Frame>, inbound: mpsc::Receiver<Frame>) -> Self {
        Self { outbound, inbound }
    }
}

/// Build an in-memory loopback: whatever one end sends, the other receives.
#[must_use]
pub fn pair(capacity: usize) -> (Transport, Transport) {
    let (a_tx, a_rx) = mpsc::channel(capacity);
    let (b_tx, b_rx) = mpsc::channel(capacity);
    (Transport::new(a_tx, b_rx), Transport::new(b_tx, a_rx))
}

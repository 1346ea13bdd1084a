//! Streaming session protocol built on top of the `frames` wire model.
//!
//! ARCHITECTURE
//! ============
//! A [`Session`] is one call: a duplex, ordered channel carrying frames
//! that share a `call_id`. It is split into a [`SendHalf`] and a
//! [`RecvHalf`], each owned by exactly one activity. On the client side a
//! [`Driver`] owns the send direction and a [`StreamReceiver`] owns the
//! receive direction; the [`call`] shapes run both concurrently and only
//! return once both directions are terminal.
//!
//! [`Connection`] multiplexes many sessions over one [`Transport`].

pub mod call;
mod connection;
mod driver;
mod error;
mod receiver;
mod session;
pub mod transport;

pub use call::{CallOptions, Exchange};
pub use connection::Connection;
pub use driver::{Driver, Pacing};
pub use error::{Code, ErrorCode, ProtocolError, RemoteError, SessionError};
pub use receiver::StreamReceiver;
pub use session::{AbortHandle, RecvHalf, RecvState, Received, SendHalf, SendState, Session};
pub use transport::Transport;

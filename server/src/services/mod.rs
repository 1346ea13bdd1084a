//! Call services dispatched by the connection layer.
//!
//! ARCHITECTURE
//! ============
//! The connection layer owns framing and call routing; a [`Service`] owns
//! what happens inside one call. It is handed a ready [`Session`] per
//! accepted `Request` and runs it to completion on its own task.

pub mod test_service;

use session::Session;

#[async_trait::async_trait]
pub trait Service: Send + Sync + 'static {
    /// Whether `method` names a call this service implements.
    fn accepts(&self, method: &str) -> bool;

    /// Run one call. Returns once the call is terminal on the server side.
    async fn call(&self, session: Session);
}

//! WebSocket handler — binary frame bridge.
//!
//! DESIGN
//! ======
//! On upgrade the socket is split. A reader task decodes binary messages
//! into frames for the connection dispatcher; a writer task encodes the
//! dispatcher's outbound frames back onto the socket. Reading never waits
//! on writing, so a call blocked on a slow client does not stop frames for
//! other calls from being routed.
//!
//! LIFECYCLE
//! =========
//! 1. Upgrade → spawn reader and writer
//! 2. `serve_connection` runs calls until the reader ends
//! 3. Dispatcher returns → every outbound sender drops → writer closes socket

use axum::extract::State;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::response::Response;
use frames::{Frame, Status, decode_frame, encode_frame};
use futures::{SinkExt, StreamExt};
use session::Transport;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::connection::serve_connection;
use crate::state::AppState;

pub async fn handle_ws(State(state): State<AppState>, ws: WebSocketUpgrade) -> Response {
    ws.on_upgrade(move |socket| run_ws(socket, state))
}

async fn run_ws(socket: WebSocket, state: AppState) {
    let connection_id = Uuid::new_v4();
    let (mut sink, mut stream) = socket.split();
    let (inbound_tx, inbound_rx) = mpsc::channel::<Frame>(state.config.session_inbound_capacity);
    let (outbound_tx, mut outbound_rx) = mpsc::channel::<Frame>(state.config.connection_outbound_capacity);

    info!(%connection_id, "ws: client connected");

    let writer = tokio::spawn(async move {
        while let Some(frame) = outbound_rx.recv().await {
            log_outbound(&frame);
            if sink.send(Message::Binary(encode_frame(&frame).into())).await.is_err() {
                break;
            }
        }
        let _ = sink.close().await;
    });

    let reader = tokio::spawn(async move {
        while let Some(Ok(message)) = stream.next().await {
            match message {
                Message::Binary(bytes) => match decode_frame(&bytes) {
                    Ok(frame) => {
                        if inbound_tx.send(frame).await.is_err() {
                            break;
                        }
                    }
                    Err(e) => warn!(%connection_id, error = %e, "ws: invalid inbound frame"),
                },
                Message::Close(_) => break,
                _ => {}
            }
        }
    });

    let transport = Transport::new(outbound_tx, inbound_rx);
    serve_connection(transport, state.service.clone(), state.config.session_inbound_capacity).await;

    reader.abort();
    let _ = writer.await;
    info!(%connection_id, "ws: client disconnected");
}

fn log_outbound(frame: &Frame) {
    if frame.status == Status::Error {
        let code = frame.data_str("code").unwrap_or("-");
        let message = frame.data_str("message").unwrap_or("-");
        warn!(call_id = %frame.call_id, method = %frame.method, code, message, "ws: send frame status=Error");
    } else {
        debug!(call_id = %frame.call_id, seq = frame.seq, status = ?frame.status, "ws: send frame");
    }
}

#[cfg(test)]
#[path = "ws_test.rs"]
mod tests;

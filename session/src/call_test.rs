use super::*;
use crate::error::{Code, ErrorCode, RemoteError};
use crate::transport::{self, Transport};
use frames::{Frame, Status};
use serde_json::{Value, json};
use tokio::time::timeout;

/// Scripted server end of an in-memory transport.
struct Peer {
    transport: Transport,
}

impl Peer {
    async fn next(&mut self) -> Frame {
        timeout(Duration::from_secs(2), self.transport.inbound.recv())
            .await
            .expect("peer timed out waiting for a frame")
            .expect("client hung up")
    }

    async fn expect(&mut self, status: Status) -> Frame {
        let frame = self.next().await;
        assert_eq!(frame.status, status, "unexpected frame: {frame:?}");
        frame
    }

    async fn reply(&self, call: &Frame, seq: u64, status: Status, data: Value) {
        self.transport
            .outbound
            .send(Frame::new(&call.call_id, &call.method, seq, status, data))
            .await
            .expect("reply");
    }
}

fn setup() -> (Connection, Peer) {
    let (client, server) = transport::pair(64);
    (Connection::new(client), Peer { transport: server })
}

// =============================================================================
// UNARY
// =============================================================================

#[tokio::test]
async fn unary_returns_single_reply() {
    let (conn, mut peer) = setup();
    let call = tokio::spawn(async move {
        unary::<Value, Value>(&conn, "TestService/GetTest", &json!({"id": "t1"}), &CallOptions::default()).await
    });

    let open = peer.expect(Status::Request).await;
    assert_eq!(open.method, "TestService/GetTest");
    let item = peer.expect(Status::Item).await;
    assert_eq!(item.data, json!({"id": "t1"}));
    peer.expect(Status::Done).await;

    peer.reply(&open, 0, Status::Item, json!({"id": "t1", "name": "Golang"})).await;
    peer.reply(&open, 1, Status::Done, json!({})).await;

    let reply = call.await.expect("join").expect("unary");
    assert_eq!(reply, json!({"id": "t1", "name": "Golang"}));
}

#[tokio::test]
async fn unary_end_without_reply_is_an_error() {
    let (conn, mut peer) = setup();
    let call = tokio::spawn(async move {
        unary::<Value, Value>(&conn, "TestService/GetTest", &json!({}), &CallOptions::default()).await
    });

    let open = peer.expect(Status::Request).await;
    peer.reply(&open, 0, Status::Done, json!({})).await;

    let err = call.await.expect("join").expect_err("no reply");
    assert_eq!(err, SessionError::Protocol(ProtocolError::MissingReply));
}

#[tokio::test]
async fn unary_surfaces_categorised_remote_error() {
    let (conn, mut peer) = setup();
    let call = tokio::spawn(async move {
        unary::<Value, Value>(&conn, "TestService/GetTest", &json!({"id": "t1"}), &CallOptions::default()).await
    });

    let open = peer.expect(Status::Request).await;
    peer.reply(&open, 0, Status::Error, json!({"code": "E_NOT_FOUND", "message": "test not found: t1"}))
        .await;

    let err = call.await.expect("join").expect_err("not found");
    assert_eq!(err, SessionError::Remote(RemoteError::new(Code::NotFound, "test not found: t1")));
}

// =============================================================================
// STREAMING
// =============================================================================

#[tokio::test]
async fn server_streaming_hands_every_item_to_consumer() {
    let (conn, mut peer) = setup();
    let call = tokio::spawn(async move {
        let mut seen = Vec::new();
        let count = server_streaming::<Value, u32, _>(
            &conn,
            "TestService/GetStudentsPerTest",
            &json!({"test_id": "t1"}),
            |n| seen.push(n),
            &CallOptions::default(),
        )
        .await;
        (count, seen)
    });

    let open = peer.expect(Status::Request).await;
    for seq in 0..3_u32 {
        peer.reply(&open, u64::from(seq), Status::Item, json!(seq * 10)).await;
    }
    peer.reply(&open, 3, Status::Done, json!({})).await;

    let (count, seen) = call.await.expect("join");
    assert_eq!(count, Ok(3));
    assert_eq!(seen, vec![0, 10, 20]);
}

#[tokio::test]
async fn bidi_waits_for_receive_terminal_after_send_closed() {
    let (conn, mut peer) = setup();
    let options = CallOptions::default().with_pacing(Pacing::Fixed(Duration::from_millis(10)));
    let call = tokio::spawn(async move {
        bidi_streaming::<String, String, _, _>(
            &conn,
            "TestService/TakeTest",
            vec!["42".to_owned(); 4],
            |_| {},
            &options,
        )
        .await
    });

    let open = peer.expect(Status::Request).await;
    for _ in 0..4 {
        peer.expect(Status::Item).await;
    }
    peer.expect(Status::Done).await;

    // Send direction is closed; the receive direction is still open.
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(!call.is_finished(), "call must not complete before the receive terminal");

    peer.reply(&open, 0, Status::Item, json!("ok")).await;
    peer.reply(&open, 1, Status::Done, json!({})).await;

    let exchange = timeout(Duration::from_secs(1), call)
        .await
        .expect("call completes once both directions are terminal")
        .expect("join")
        .expect("bidi");
    assert_eq!(exchange, Exchange { sent: 4, received: 1 });
}

#[tokio::test]
async fn bidi_waits_for_send_close_after_receive_terminal() {
    let (conn, mut peer) = setup();
    let options = CallOptions::default().with_pacing(Pacing::Fixed(Duration::from_millis(40)));
    let call = tokio::spawn(async move {
        bidi_streaming::<String, String, _, _>(
            &conn,
            "TestService/TakeTest",
            vec!["42".to_owned(); 4],
            |_| {},
            &options,
        )
        .await
    });

    let open = peer.expect(Status::Request).await;
    peer.reply(&open, 0, Status::Done, json!({})).await;

    // Receive direction is terminal; the driver is still pacing.
    peer.expect(Status::Item).await;
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(!call.is_finished(), "call must not complete before the send direction closes");

    for _ in 0..3 {
        peer.expect(Status::Item).await;
    }
    peer.expect(Status::Done).await;

    let exchange = timeout(Duration::from_secs(1), call)
        .await
        .expect("call completes")
        .expect("join")
        .expect("bidi");
    assert_eq!(exchange, Exchange { sent: 4, received: 0 });
}

#[tokio::test]
async fn early_server_error_stops_the_driver() {
    let (conn, mut peer) = setup();
    let options = CallOptions::default().with_pacing(Pacing::Fixed(Duration::from_secs(5)));
    let call = tokio::spawn(async move {
        client_streaming::<u32, Value, _>(&conn, "TestService/SetQuestion", 0..5, &options).await
    });

    let open = peer.expect(Status::Request).await;
    peer.expect(Status::Item).await;
    peer.reply(&open, 0, Status::Error, json!({"code": "E_UNAVAILABLE", "message": "storage down"}))
        .await;

    let err = timeout(Duration::from_millis(500), call)
        .await
        .expect("driver must not keep pacing")
        .expect("join")
        .expect_err("remote error");
    assert_eq!(err.code(), Code::Unavailable);
    peer.expect(Status::Cancel).await;
}

// =============================================================================
// CANCELLATION
// =============================================================================

#[tokio::test]
async fn deadline_cancels_and_notifies_peer() {
    let (conn, mut peer) = setup();
    let options = CallOptions::default().with_deadline(Duration::from_millis(50));
    let call = tokio::spawn(async move {
        server_streaming::<Value, Value, _>(&conn, "TestService/GetStudentsPerTest", &json!({}), |_| {}, &options)
            .await
    });

    peer.expect(Status::Request).await;
    peer.expect(Status::Item).await;
    peer.expect(Status::Done).await;

    let result = timeout(Duration::from_millis(500), call).await.expect("deadline").expect("join");
    assert_eq!(result, Err(SessionError::Cancelled));
    let cancel = peer.expect(Status::Cancel).await;
    assert_eq!(cancel.method, "TestService/GetStudentsPerTest");
}

#[tokio::test]
async fn lost_transport_is_unavailable() {
    let (conn, mut peer) = setup();
    let call = tokio::spawn(async move {
        unary::<Value, Value>(&conn, "TestService/GetTest", &json!({}), &CallOptions::default()).await
    });

    peer.expect(Status::Request).await;
    peer.expect(Status::Item).await;
    peer.expect(Status::Done).await;
    drop(peer);

    let err = timeout(Duration::from_millis(500), call)
        .await
        .expect("no hang")
        .expect("join")
        .expect_err("transport");
    assert_eq!(err.code(), Code::Unavailable);
}

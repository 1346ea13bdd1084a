use super::*;
use frames::{Frame, Status};
use tokio::sync::mpsc;
use tokio::time::{Duration, timeout};
use tokio_util::sync::CancellationToken;

const METHOD: &str = "TestService/SetQuestion";

/// Client session and server handler wired back to back.
fn linked() -> (Session, StreamHandler<String, bool>) {
    let (to_server, server_rx) = mpsc::channel(32);
    let (to_client, client_rx) = mpsc::channel(32);
    let client = Session::new("call-h", METHOD, to_server, client_rx, CancellationToken::new());
    let server = Session::new("call-h", METHOD, to_client, server_rx, CancellationToken::new());
    (client, StreamHandler::new(server))
}

async fn send_all(send: &mut SendHalf<String>, items: &[&str]) {
    for item in items {
        send.send(&(*item).to_owned()).await.expect("send");
    }
    send.close_send().await.expect("close");
}

async fn recv_next(recv: &mut RecvHalf<bool>) -> Result<Received<bool>, SessionError> {
    timeout(Duration::from_secs(1), recv.receive()).await.expect("client receive timed out")
}

#[tokio::test]
async fn ingest_counts_failures_and_keeps_going() {
    let (client, mut handler) = linked();
    let (mut send, _recv) = client.split::<String, bool>();
    send_all(&mut send, &["q8t1", "q9t1", "q10t1"]).await;

    let mut attempted = Vec::new();
    let ingest = handler
        .ingest(|id: String| {
            attempted.push(id.clone());
            async move {
                if id == "q9t1" { Err(StorageError::Invalid(id)) } else { Ok(()) }
            }
        })
        .await
        .expect("ingest");

    assert_eq!(ingest, Ingest { received: 3, failed: 1 });
    assert!(!ingest.ok());
    assert_eq!(attempted, vec!["q8t1", "q9t1", "q10t1"]);
    assert_eq!(handler.phase(), Phase::Draining);
}

#[tokio::test]
async fn fatal_storage_failure_aborts_with_error_terminal() {
    let (client, mut handler) = linked();
    let (mut send, mut recv) = client.split::<String, bool>();
    send_all(&mut send, &["a", "b", "c"]).await;

    let mut calls = 0;
    let err = handler
        .ingest(|_| {
            calls += 1;
            let fail = calls == 2;
            async move {
                if fail { Err(StorageError::Unavailable("down".into())) } else { Ok(()) }
            }
        })
        .await
        .expect_err("fatal");
    assert_eq!(calls, 2);
    assert_eq!(err.code(), Code::Unavailable);

    handler.abort(&err).await;
    assert_eq!(handler.phase(), Phase::Terminal);
    let received = recv_next(&mut recv).await.expect_err("error terminal");
    assert_eq!(received.code(), Code::Unavailable);
}

#[tokio::test]
async fn reply_sends_one_message_then_end() {
    let (client, mut handler) = linked();
    let (mut send, mut recv) = client.split::<String, bool>();
    send_all(&mut send, &[]).await;

    let ingest = handler.ingest(|_| async { Ok(()) }).await.expect("ingest");
    assert_eq!(ingest, Ingest::default());
    handler.reply(&ingest.ok()).await.expect("reply");

    assert_eq!(handler.phase(), Phase::Terminal);
    assert_eq!(recv_next(&mut recv).await, Ok(Received::Message(true)));
    assert_eq!(recv_next(&mut recv).await, Ok(Received::End));
}

#[tokio::test]
async fn request_reads_exactly_one_message() {
    let (client, mut handler) = linked();
    let (mut send, _recv) = client.split::<String, bool>();
    send_all(&mut send, &["t1"]).await;

    assert_eq!(handler.request().await.expect("request"), "t1");
    assert_eq!(handler.phase(), Phase::Draining);
}

#[tokio::test]
async fn request_rejects_missing_and_extra_messages() {
    let (client, mut handler) = linked();
    let (mut send, _recv) = client.split::<String, bool>();
    send_all(&mut send, &[]).await;
    let err = handler.request().await.expect_err("missing");
    assert_eq!(err.code(), Code::Invalid);

    let (client, mut handler) = linked();
    let (mut send, _recv) = client.split::<String, bool>();
    send_all(&mut send, &["a", "b"]).await;
    let err = handler.request().await.expect_err("extra");
    assert_eq!(err.code(), Code::Invalid);
}

#[tokio::test]
async fn cancelled_call_is_aborted_silently() {
    let (to_client, mut client_rx) = mpsc::channel::<Frame>(8);
    let (to_server, server_rx) = mpsc::channel::<Frame>(8);
    let server = Session::new("call-h", METHOD, to_client, server_rx, CancellationToken::new());
    let mut handler: StreamHandler<String, bool> = StreamHandler::new(server);

    to_server.send(Frame::cancel("call-h", METHOD)).await.expect("cancel");
    let err = handler.next().await.expect_err("cancelled");
    assert_eq!(err.code(), Code::Cancelled);

    handler.settle(Err(err)).await;
    assert_eq!(handler.phase(), Phase::Terminal);
    drop(handler);
    assert!(client_rx.try_recv().is_err(), "no frame after cancel");
}

#[tokio::test]
async fn invalid_request_reaches_client_as_error_frame() {
    let (to_client, mut client_rx) = mpsc::channel::<Frame>(8);
    let (to_server, server_rx) = mpsc::channel::<Frame>(8);
    let server = Session::new("call-h", METHOD, to_client, server_rx, CancellationToken::new());
    let mut handler: StreamHandler<String, bool> = StreamHandler::new(server);

    to_server
        .send(Frame::new("call-h", METHOD, 0, Status::Done, serde_json::json!({})))
        .await
        .expect("done");
    let result = handler.request().await.map(|_| ());
    handler.settle(result).await;

    let frame = client_rx.try_recv().expect("error frame");
    assert_eq!(frame.status, Status::Error);
    assert_eq!(frame.data_str("code"), Some("E_INVALID"));
    assert_eq!(frame.seq, 0);
}

#[tokio::test]
async fn cancel_interrupts_slow_storage() {
    let (to_client, _client_rx) = mpsc::channel::<Frame>(8);
    let (to_server, server_rx) = mpsc::channel::<Frame>(8);
    let cancel = CancellationToken::new();
    let server = Session::new("call-h", METHOD, to_client, server_rx, cancel.clone());
    let mut handler: StreamHandler<String, bool> = StreamHandler::new(server);
    to_server
        .send(Frame::new("call-h", METHOD, 0, Status::Item, serde_json::json!("q8t1")))
        .await
        .expect("item");

    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        cancel.cancel();
    });
    let err = timeout(
        Duration::from_secs(1),
        handler.ingest(|_| async {
            tokio::time::sleep(Duration::from_secs(30)).await;
            Ok(())
        }),
    )
    .await
    .expect("ingest must stop once cancelled")
    .expect_err("cancelled");
    assert_eq!(err.code(), Code::Cancelled);
}

#[tokio::test]
async fn cancellable_passes_through_when_not_cancelled() {
    let (_client, handler) = linked();
    let value = handler.cancellable(async { 7 }).await.expect("not cancelled");
    assert_eq!(value, 7);
}

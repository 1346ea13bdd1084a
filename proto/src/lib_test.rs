use super::*;
use frames::{Frame, Status};
use serde_json::json;
use session::{Code, Connection, ErrorCode, transport};

#[test]
fn every_method_has_a_shape() {
    assert_eq!(method::shape(method::GET_TEST), Some(Shape::Unary));
    assert_eq!(method::shape(method::SET_TEST), Some(Shape::Unary));
    assert_eq!(method::shape(method::SET_STUDENT), Some(Shape::Unary));
    assert_eq!(method::shape(method::SET_QUESTION), Some(Shape::ClientStreaming));
    assert_eq!(method::shape(method::ENROLL_STUDENTS), Some(Shape::ClientStreaming));
    assert_eq!(method::shape(method::GET_STUDENTS_PER_TEST), Some(Shape::ServerStreaming));
    assert_eq!(method::shape(method::TAKE_TEST), Some(Shape::Bidi));
    assert_eq!(method::shape("TestService/Nope"), None);
}

#[test]
fn shape_direction_flags() {
    assert!(!Shape::Unary.client_streams() && !Shape::Unary.server_streams());
    assert!(Shape::ClientStreaming.client_streams() && !Shape::ClientStreaming.server_streams());
    assert!(!Shape::ServerStreaming.client_streams() && Shape::ServerStreaming.server_streams());
    assert!(Shape::Bidi.client_streams() && Shape::Bidi.server_streams());
}

#[test]
fn question_uses_snake_case_fields() {
    let q = &sample_questions()[0];
    assert_eq!(
        serde_json::to_value(q).expect("encode"),
        json!({"id": "q8t1", "answer": "azul", "question": "Color se asocia a Golang", "test_id": "t1"})
    );
}

#[test]
fn sample_questions_belong_to_t1() {
    let ids: Vec<_> = sample_questions().into_iter().map(|q| q.id).collect();
    assert_eq!(ids, vec!["q8t1", "q9t1", "q10t1"]);
    assert!(sample_questions().iter().all(|q| q.test_id == "t1"));
}

#[test]
fn unmatched_answer_result_omits_question() {
    let result = AnswerResult { question_id: None, question: None, answer: "42".into(), correct: false };
    let value = serde_json::to_value(&result).expect("encode");
    assert_eq!(value, json!({"answer": "42", "correct": false}));

    let back: AnswerResult = serde_json::from_value(value).expect("decode");
    assert_eq!(back, result);
}

#[tokio::test]
async fn client_get_test_maps_not_found() {
    let (client, mut peer) = transport::pair(8);
    let stub = TestServiceClient::new(Connection::new(client));
    let call = tokio::spawn(async move { stub.get_test("t1").await });

    let open = peer.inbound.recv().await.expect("request");
    assert_eq!(open.status, Status::Request);
    assert_eq!(open.method, method::GET_TEST);
    let item = peer.inbound.recv().await.expect("item");
    assert_eq!(item.data, json!({"id": "t1"}));

    peer.outbound
        .send(Frame::error(&open.call_id, &open.method, 0, "E_NOT_FOUND", "test not found: t1"))
        .await
        .expect("reply");

    let err = call.await.expect("join").expect_err("missing test");
    assert_eq!(err.code(), Code::NotFound);
}

#[test]
fn every_listed_method_has_a_shape() {
    assert!(method::ALL.iter().all(|name| method::shape(name).is_some()));
}

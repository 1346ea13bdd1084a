use super::*;

fn sample_frame() -> Frame {
    Frame {
        id: "id-1".to_owned(),
        call_id: "call-1".to_owned(),
        seq: 3,
        ts: 42,
        method: "TestService/TakeTest".to_owned(),
        status: Status::Item,
        data: serde_json::json!({
            "score": 1.25,
            "ok": true,
            "tags": ["a", "b"],
            "nested": {"k": "v"},
            "nil": null
        }),
    }
}

fn wire_bytes(status: i32, data: Option<prost_types::Value>) -> Vec<u8> {
    let wire = WireFrame {
        id: "id-1".to_owned(),
        call_id: "call-1".to_owned(),
        seq: 0,
        ts: 1,
        method: "TestService/GetTest".to_owned(),
        status,
        data,
    };
    let mut bytes = Vec::new();
    wire.encode(&mut bytes).expect("encode");
    bytes
}

#[test]
fn status_numeric_mapping_matches_wire_enum() {
    assert_eq!(Status::Request.as_i32(), 0);
    assert_eq!(Status::Item.as_i32(), 1);
    assert_eq!(Status::Done.as_i32(), 2);
    assert_eq!(Status::Error.as_i32(), 3);
    assert_eq!(Status::Cancel.as_i32(), 4);
}

#[test]
fn status_round_trips_from_wire_values() {
    for status in [Status::Request, Status::Item, Status::Done, Status::Error, Status::Cancel] {
        assert_eq!(Status::from_i32(status.as_i32()).expect("status"), status);
    }
}

#[test]
fn status_from_wire_rejects_out_of_range_value() {
    let err = Status::from_i32(99).expect_err("status should be invalid");
    assert!(matches!(err, CodecError::InvalidStatus(99)));
}

#[test]
fn terminal_statuses() {
    assert!(Status::Done.is_terminal());
    assert!(Status::Error.is_terminal());
    assert!(Status::Cancel.is_terminal());
    assert!(!Status::Request.is_terminal());
    assert!(!Status::Item.is_terminal());
}

#[test]
fn encode_decode_preserves_frame() {
    let frame = sample_frame();
    let decoded = decode_frame(&encode_frame(&frame)).expect("decode should succeed");
    assert_eq!(decoded, frame);
}

#[test]
fn decode_frame_rejects_malformed_bytes() {
    let err = decode_frame(&[0xff, 0x00, 0x01]).expect_err("bytes should fail");
    assert!(matches!(err, CodecError::Decode(_)));
}

#[test]
fn decode_frame_rejects_invalid_wire_status() {
    let bytes = wire_bytes(77, Some(json_to_proto_value(&serde_json::json!({}))));
    let err = decode_frame(&bytes).expect_err("status should fail");
    assert!(matches!(err, CodecError::InvalidStatus(77)));
}

#[test]
fn decode_frame_defaults_missing_data_to_empty_object() {
    let frame = decode_frame(&wire_bytes(Status::Request.as_i32(), None)).expect("decode");
    assert_eq!(frame.data, serde_json::json!({}));
}

#[test]
fn decode_frame_converts_nan_number_to_json_null() {
    let data = prost_types::Value { kind: Some(prost_types::value::Kind::NumberValue(f64::NAN)) };
    let frame = decode_frame(&wire_bytes(Status::Item.as_i32(), Some(data))).expect("decode");
    assert_eq!(frame.data, Value::Null);
}

#[test]
fn integral_numbers_come_back_as_integers() {
    let mut frame = sample_frame();
    frame.data = serde_json::json!({"age": 21, "delta": -4, "ratio": 0.5});

    let decoded = decode_frame(&encode_frame(&frame)).expect("decode");
    assert_eq!(decoded.data.get("age").and_then(Value::as_u64), Some(21));
    assert_eq!(decoded.data.get("delta").and_then(Value::as_i64), Some(-4));
    assert_eq!(decoded.data.get("ratio").and_then(Value::as_f64), Some(0.5));
}

#[test]
fn request_frame_opens_call() {
    let frame = Frame::request("call-9", "TestService/SetQuestion");
    assert_eq!(frame.status, Status::Request);
    assert_eq!(frame.call_id, "call-9");
    assert_eq!(frame.seq, 0);
    assert!(frame.ts > 0);
    assert!(!frame.id.is_empty());
}

#[test]
fn error_frame_carries_code_and_message() {
    let frame = Frame::error("call-1", "TestService/GetTest", 2, "E_NOT_FOUND", "test not found: t1");
    assert_eq!(frame.status, Status::Error);
    assert_eq!(frame.seq, 2);
    assert_eq!(frame.data_str(FRAME_CODE), Some("E_NOT_FOUND"));
    assert_eq!(frame.data_str(FRAME_MESSAGE), Some("test not found: t1"));
}

#[test]
fn cancel_frame_targets_call() {
    let frame = Frame::cancel("call-1", "TestService/TakeTest");
    assert_eq!(frame.status, Status::Cancel);
    assert_eq!(frame.call_id, "call-1");
    assert!(frame.status.is_terminal());
}

#[test]
fn status_serializes_as_lowercase_json() {
    assert_eq!(serde_json::to_string(&Status::Request).expect("serialize"), "\"request\"");
    assert_eq!(serde_json::to_string(&Status::Cancel).expect("serialize"), "\"cancel\"");
    assert_eq!(serde_json::from_str::<Status>("\"error\"").expect("deserialize"), Status::Error);
    assert!(serde_json::from_str::<Status>("\"Error\"").is_err());
}

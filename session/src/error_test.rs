use super::*;

#[test]
fn code_wire_form_round_trips() {
    for code in [Code::NotFound, Code::Invalid, Code::Unavailable, Code::Cancelled, Code::Internal] {
        assert_eq!(Code::parse(code.as_str()), code);
    }
}

#[test]
fn unknown_code_is_internal() {
    assert_eq!(Code::parse("E_TEAPOT"), Code::Internal);
}

#[test]
fn remote_error_reads_error_frame() {
    let frame = Frame::error("call-1", "TestService/GetTest", 0, "E_NOT_FOUND", "test not found: t1");
    let err = RemoteError::from_frame(&frame);
    assert_eq!(err.code, Code::NotFound);
    assert_eq!(err.message, "test not found: t1");
}

#[test]
fn remote_error_tolerates_empty_payload() {
    let frame = Frame::new("call-1", "TestService/GetTest", 0, Status::Error, serde_json::json!({}));
    let err = RemoteError::from_frame(&frame);
    assert_eq!(err.code, Code::Internal);
    assert_eq!(err.message, "unknown remote error");
}

#[test]
fn session_errors_are_categorised() {
    assert_eq!(SessionError::connection_closed().code(), Code::Unavailable);
    assert_eq!(SessionError::Protocol(ProtocolError::SendAfterClose).code(), Code::Internal);
    assert_eq!(SessionError::Cancelled.code(), Code::Cancelled);
    assert_eq!(SessionError::Remote(RemoteError::new(Code::NotFound, "gone")).code(), Code::NotFound);
}

#[test]
fn from_error_uses_display_and_code() {
    let err = RemoteError::from_error(&SessionError::Cancelled);
    assert_eq!(err.code, Code::Cancelled);
    assert_eq!(err.message, "call cancelled");
}

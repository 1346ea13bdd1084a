//! Method names and their call shapes.

pub const GET_TEST: &str = "TestService/GetTest";
pub const SET_TEST: &str = "TestService/SetTest";
pub const SET_STUDENT: &str = "TestService/SetStudent";
pub const SET_QUESTION: &str = "TestService/SetQuestion";
pub const ENROLL_STUDENTS: &str = "TestService/EnrollStudents";
pub const GET_STUDENTS_PER_TEST: &str = "TestService/GetStudentsPerTest";
pub const TAKE_TEST: &str = "TestService/TakeTest";

/// Every method the service exposes, in declaration order.
pub const ALL: [&str; 7] =
    [GET_TEST, SET_TEST, SET_STUDENT, SET_QUESTION, ENROLL_STUDENTS, GET_STUDENTS_PER_TEST, TAKE_TEST];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Shape {
    Unary,
    ClientStreaming,
    ServerStreaming,
    Bidi,
}

impl Shape {
    /// Whether the caller sends more than one message.
    #[must_use]
    pub fn client_streams(self) -> bool {
        matches!(self, Self::ClientStreaming | Self::Bidi)
    }

    /// Whether the callee replies with more than one message.
    #[must_use]
    pub fn server_streams(self) -> bool {
        matches!(self, Self::ServerStreaming | Self::Bidi)
    }
}

/// Shape of a known method, `None` for anything else.
#[must_use]
pub fn shape(method: &str) -> Option<Shape> {
    match method {
        GET_TEST | SET_TEST | SET_STUDENT => Some(Shape::Unary),
        SET_QUESTION | ENROLL_STUDENTS => Some(Shape::ClientStreaming),
        GET_STUDENTS_PER_TEST => Some(Shape::ServerStreaming),
        TAKE_TEST => Some(Shape::Bidi),
        _ => None,
    }
}

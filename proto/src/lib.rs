//! Typed messages and call table for `TestService`.
//!
//! Both peers agree on these records and on the method names; the session
//! layer carries them as JSON payloads and never inspects them.

mod client;
pub mod method;

pub use client::TestServiceClient;
pub use method::Shape;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Test {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GetTestRequest {
    pub id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SetTestResponse {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Question {
    pub id: String,
    pub answer: String,
    pub question: String,
    pub test_id: String,
}

/// Aggregate acknowledgement for a client stream: `ok` is false if any
/// message of the stream failed to persist.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SetQuestionResponse {
    pub ok: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Student {
    pub id: String,
    pub name: String,
    pub age: i32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SetStudentResponse {
    pub id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnrollmentRequest {
    pub student_id: String,
    pub test_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GetStudentsPerTestRequest {
    pub test_id: String,
}

/// One student enrolled in a test.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StudentAnswer {
    pub student_id: String,
    pub name: String,
    pub age: i32,
    pub test_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Answer {
    pub test_id: String,
    pub student_id: String,
    pub answer: String,
}

/// Grade for one `Answer`. `question_id` and `question` are absent when the
/// answer has no matching question.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnswerResult {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub question_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub question: Option<String>,
    pub answer: String,
    pub correct: bool,
}

/// The questions the sample client submits for test `t1`.
#[must_use]
pub fn sample_questions() -> Vec<Question> {
    [
        ("q8t1", "azul", "Color se asocia a Golang"),
        ("q9t1", "platzi", "Donde aprendiste gRPC"),
        ("q10t1", "Backend", "Especialidad de Golang"),
    ]
    .into_iter()
    .map(|(id, answer, question)| Question {
        id: id.to_owned(),
        answer: answer.to_owned(),
        question: question.to_owned(),
        test_id: "t1".to_owned(),
    })
    .collect()
}

#[cfg(test)]
#[path = "lib_test.rs"]
mod tests;

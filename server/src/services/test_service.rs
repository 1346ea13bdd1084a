//! `TestService` — tests, questions, students, and test taking.
//!
//! DESIGN
//! ======
//! One [`StreamHandler`] per call; each method below is the handler body
//! for one call shape:
//!
//! - unary (`GetTest`, `SetTest`, `SetStudent`): read one request, reply once.
//! - client streaming (`SetQuestion`, `EnrollStudents`): ingest every
//!   message, then reply with `ok = false` if any record was not stored.
//! - server streaming (`GetStudentsPerTest`): read one request, stream one
//!   reply per stored record, close.
//! - bidi (`TakeTest`): grade each answer as it arrives and reply with one
//!   result per answer.
//!
//! Storage is injected at construction as `Arc<dyn Repository>`.

use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::sync::Arc;

use futures::StreamExt;
use proto::{
    Answer, AnswerResult, EnrollmentRequest, GetStudentsPerTestRequest, GetTestRequest, Question,
    SetQuestionResponse, SetStudentResponse, SetTestResponse, Student, StudentAnswer, Test, method,
};
use session::Session;
use tracing::{info, warn};

use crate::handler::{HandlerError, StreamHandler};
use crate::services::Service;
use crate::storage::{GradedAnswer, Repository};

pub struct TestServer {
    repo: Arc<dyn Repository>,
}

impl TestServer {
    #[must_use]
    pub fn new(repo: Arc<dyn Repository>) -> Self {
        Self { repo }
    }

    // =========================================================================
    // UNARY
    // =========================================================================

    async fn get_test(&self, h: &mut StreamHandler<GetTestRequest, Test>) -> Result<(), HandlerError> {
        let request = h.request().await?;
        let test = h.cancellable(self.repo.get_test(&request.id)).await??;
        h.reply(&test).await
    }

    async fn set_test(&self, h: &mut StreamHandler<Test, SetTestResponse>) -> Result<(), HandlerError> {
        let test = h.request().await?;
        if test.id.trim().is_empty() {
            return Err(HandlerError::Invalid("test id is required".into()));
        }
        h.cancellable(self.repo.set_test(&test)).await??;
        h.reply(&SetTestResponse { id: test.id, name: test.name }).await
    }

    async fn set_student(&self, h: &mut StreamHandler<Student, SetStudentResponse>) -> Result<(), HandlerError> {
        let student = h.request().await?;
        if student.id.trim().is_empty() {
            return Err(HandlerError::Invalid("student id is required".into()));
        }
        h.cancellable(self.repo.set_student(&student)).await??;
        h.reply(&SetStudentResponse { id: student.id }).await
    }

    // =========================================================================
    // CLIENT STREAMING
    // =========================================================================

    async fn set_question(&self, h: &mut StreamHandler<Question, SetQuestionResponse>) -> Result<(), HandlerError> {
        let repo = &self.repo;
        let ingest = h
            .ingest(|question: Question| async move { repo.set_question(&question).await })
            .await?;
        info!(call_id = %h.call_id(), received = ingest.received, failed = ingest.failed, "set_question: stored");
        h.reply(&SetQuestionResponse { ok: ingest.ok() }).await
    }

    async fn enroll_students(
        &self,
        h: &mut StreamHandler<EnrollmentRequest, SetQuestionResponse>,
    ) -> Result<(), HandlerError> {
        let repo = &self.repo;
        let ingest = h
            .ingest(|enrollment: EnrollmentRequest| async move { repo.set_enrollment(&enrollment).await })
            .await?;
        info!(call_id = %h.call_id(), received = ingest.received, failed = ingest.failed, "enroll_students: stored");
        h.reply(&SetQuestionResponse { ok: ingest.ok() }).await
    }

    // =========================================================================
    // SERVER STREAMING
    // =========================================================================

    async fn get_students_per_test(
        &self,
        h: &mut StreamHandler<GetStudentsPerTestRequest, StudentAnswer>,
    ) -> Result<(), HandlerError> {
        let request = h.request().await?;
        let mut students = self.repo.list_students_for_test(&request.test_id);
        while let Some(student) = h.cancellable(students.next()).await? {
            h.emit(&student?).await?;
        }
        h.finish().await
    }

    // =========================================================================
    // BIDI
    // =========================================================================

    async fn take_test(&self, h: &mut StreamHandler<Answer, AnswerResult>) -> Result<(), HandlerError> {
        // Per test: its questions and the index of the next one to grade.
        let mut sheets: HashMap<String, (Vec<Question>, usize)> = HashMap::new();

        while let Some(answer) = h.next().await? {
            let (questions, next) = match sheets.entry(answer.test_id.clone()) {
                Entry::Occupied(sheet) => sheet.into_mut(),
                Entry::Vacant(slot) => {
                    let questions = h.cancellable(self.repo.get_questions_for_test(&answer.test_id)).await??;
                    slot.insert((questions, 0))
                }
            };
            let result = grade(&answer, questions.get(*next));
            *next += 1;

            let graded = GradedAnswer {
                test_id: answer.test_id,
                student_id: answer.student_id,
                question_id: result.question_id.clone(),
                answer: result.answer.clone(),
                correct: result.correct,
            };
            match h.cancellable(self.repo.set_answer(&graded)).await? {
                Ok(()) => {}
                Err(e) if e.is_fatal() => return Err(e.into()),
                Err(e) => warn!(call_id = %h.call_id(), error = %e, "take_test: answer not stored"),
            }
            h.emit(&result).await?;
        }
        h.finish().await
    }
}

/// Grade `answer` against `question`. Comparison ignores surrounding
/// whitespace and ASCII case.
pub(crate) fn grade(answer: &Answer, question: Option<&Question>) -> AnswerResult {
    let correct = question.is_some_and(|q| q.answer.trim().eq_ignore_ascii_case(answer.answer.trim()));
    AnswerResult {
        question_id: question.map(|q| q.id.clone()),
        question: question.map(|q| q.question.clone()),
        answer: answer.answer.clone(),
        correct,
    }
}

/// Run one handler body on a fresh [`StreamHandler`] and settle the call.
macro_rules! serve {
    ($server:ident, $session:ident, $body:ident) => {{
        let mut handler = StreamHandler::new($session);
        let result = $server.$body(&mut handler).await;
        handler.settle(result).await;
    }};
}

#[async_trait::async_trait]
impl Service for TestServer {
    fn accepts(&self, name: &str) -> bool {
        method::shape(name).is_some()
    }

    async fn call(&self, session: Session) {
        let name = session.method().to_owned();
        match name.as_str() {
            method::GET_TEST => serve!(self, session, get_test),
            method::SET_TEST => serve!(self, session, set_test),
            method::SET_STUDENT => serve!(self, session, set_student),
            method::SET_QUESTION => serve!(self, session, set_question),
            method::ENROLL_STUDENTS => serve!(self, session, enroll_students),
            method::GET_STUDENTS_PER_TEST => serve!(self, session, get_students_per_test),
            method::TAKE_TEST => serve!(self, session, take_test),
            other => warn!(method = %other, "test_service: method not implemented"),
        }
    }
}

#[cfg(test)]
#[path = "test_service_test.rs"]
mod tests;

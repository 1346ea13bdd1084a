use session::{CallOptions, Connection, Exchange, SessionError, call};

use crate::method;
use crate::{
    Answer, AnswerResult, EnrollmentRequest, GetStudentsPerTestRequest, GetTestRequest, Question,
    SetQuestionResponse, SetStudentResponse, SetTestResponse, Student, StudentAnswer, Test,
};

/// Typed stub over a [`Connection`]. Every method opens a fresh session.
#[derive(Clone)]
pub struct TestServiceClient {
    conn: Connection,
    options: CallOptions,
}

impl TestServiceClient {
    #[must_use]
    pub fn new(conn: Connection) -> Self {
        Self { conn, options: CallOptions::default() }
    }

    /// Options applied to every subsequent call.
    #[must_use]
    pub fn with_options(mut self, options: CallOptions) -> Self {
        self.options = options;
        self
    }

    #[must_use]
    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    /// # Errors
    ///
    /// `Remote` with `Code::NotFound` if no test has this id.
    pub async fn get_test(&self, id: &str) -> Result<Test, SessionError> {
        let request = GetTestRequest { id: id.to_owned() };
        call::unary(&self.conn, method::GET_TEST, &request, &self.options).await
    }

    /// # Errors
    ///
    /// Any session failure or the server's storage error.
    pub async fn set_test(&self, test: &Test) -> Result<SetTestResponse, SessionError> {
        call::unary(&self.conn, method::SET_TEST, test, &self.options).await
    }

    /// # Errors
    ///
    /// Any session failure or the server's storage error.
    pub async fn set_student(&self, student: &Student) -> Result<SetStudentResponse, SessionError> {
        call::unary(&self.conn, method::SET_STUDENT, student, &self.options).await
    }

    /// Stream questions; the reply reports whether every one was stored.
    ///
    /// # Errors
    ///
    /// Any session failure. Per-question storage failures are not errors;
    /// they show up as `ok == false`.
    pub async fn set_questions<I>(&self, questions: I) -> Result<SetQuestionResponse, SessionError>
    where
        I: IntoIterator<Item = Question>,
    {
        call::client_streaming(&self.conn, method::SET_QUESTION, questions, &self.options).await
    }

    /// # Errors
    ///
    /// Same as [`TestServiceClient::set_questions`].
    pub async fn enroll_students<I>(&self, enrollments: I) -> Result<SetQuestionResponse, SessionError>
    where
        I: IntoIterator<Item = EnrollmentRequest>,
    {
        call::client_streaming(&self.conn, method::ENROLL_STUDENTS, enrollments, &self.options).await
    }

    /// Hand every student enrolled in `test_id` to `consumer`. Returns how
    /// many were received.
    ///
    /// # Errors
    ///
    /// Any session failure.
    pub async fn get_students_per_test<F>(&self, test_id: &str, consumer: F) -> Result<usize, SessionError>
    where
        F: FnMut(StudentAnswer),
    {
        let request = GetStudentsPerTestRequest { test_id: test_id.to_owned() };
        call::server_streaming(&self.conn, method::GET_STUDENTS_PER_TEST, &request, consumer, &self.options).await
    }

    /// Send answers while grades stream back.
    ///
    /// # Errors
    ///
    /// Any session failure on either direction.
    pub async fn take_test<I, F>(&self, answers: I, consumer: F) -> Result<Exchange, SessionError>
    where
        I: IntoIterator<Item = Answer>,
        F: FnMut(AnswerResult),
    {
        call::bidi_streaming(&self.conn, method::TAKE_TEST, answers, consumer, &self.options).await
    }
}

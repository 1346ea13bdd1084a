//! Storage collaborator — the records behind `TestService`.
//!
//! DESIGN
//! ======
//! Handlers see storage only through [`Repository`], injected as
//! `Arc<dyn Repository>`. Two variants exist: [`PostgresRepository`] for the
//! running server and [`MemoryRepository`] for tests and for running
//! without a database.
//!
//! ERROR HANDLING
//! ==============
//! A [`StorageError`] is either per-record (missing test, invalid record)
//! or fatal (store unreachable). Streaming handlers aggregate per-record
//! failures and abort only on fatal ones; see [`StorageError::is_fatal`].

mod memory;
mod postgres;

pub use memory::MemoryRepository;
pub use postgres::PostgresRepository;

use futures::stream::BoxStream;
use proto::{EnrollmentRequest, Question, Student, StudentAnswer, Test};
use session::{Code, ErrorCode};

// =============================================================================
// TYPES
// =============================================================================

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("test not found: {0}")]
    TestNotFound(String),
    #[error("invalid record: {0}")]
    Invalid(String),
    #[error("storage unavailable: {0}")]
    Unavailable(String),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl StorageError {
    /// Whether the store itself is unusable, as opposed to one record failing.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        match self {
            Self::Unavailable(_) => true,
            Self::Database(e) => matches!(
                e,
                sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) | sqlx::Error::Tls(_)
            ),
            Self::TestNotFound(_) | Self::Invalid(_) => false,
        }
    }
}

impl ErrorCode for StorageError {
    fn code(&self) -> Code {
        match self {
            Self::TestNotFound(_) => Code::NotFound,
            Self::Invalid(_) => Code::Invalid,
            Self::Unavailable(_) => Code::Unavailable,
            Self::Database(_) if self.is_fatal() => Code::Unavailable,
            Self::Database(_) => Code::Internal,
        }
    }
}

/// One graded answer as persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GradedAnswer {
    pub test_id: String,
    pub student_id: String,
    pub question_id: Option<String>,
    pub answer: String,
    pub correct: bool,
}

// =============================================================================
// REPOSITORY
// =============================================================================

#[async_trait::async_trait]
pub trait Repository: Send + Sync {
    /// # Errors
    ///
    /// `TestNotFound` if no test has this id.
    async fn get_test(&self, id: &str) -> Result<Test, StorageError>;

    /// Insert or replace a test.
    async fn set_test(&self, test: &Test) -> Result<(), StorageError>;

    /// Insert or replace a question. Its test must exist.
    async fn set_question(&self, question: &Question) -> Result<(), StorageError>;

    async fn set_student(&self, student: &Student) -> Result<(), StorageError>;

    /// Enroll a student in a test. Both must exist; repeating is a no-op.
    async fn set_enrollment(&self, enrollment: &EnrollmentRequest) -> Result<(), StorageError>;

    /// Students enrolled in `test_id`, lazily. An unknown test yields an
    /// empty stream.
    fn list_students_for_test<'a>(&'a self, test_id: &'a str) -> BoxStream<'a, Result<StudentAnswer, StorageError>>;

    /// Questions of `test_id` in the order they were first stored.
    async fn get_questions_for_test(&self, test_id: &str) -> Result<Vec<Question>, StorageError>;

    async fn set_answer(&self, answer: &GradedAnswer) -> Result<(), StorageError>;
}

#[cfg(test)]
#[path = "mod_test.rs"]
mod tests;

//! Postgres repository.
//!
//! SYSTEM CONTEXT
//! ==============
//! Backed by the pool from `db::init_pool`; the schema lives in
//! `src/db/migrations`. Foreign-key violations surface as per-record
//! `Invalid` errors so streaming handlers can keep going.

use futures::StreamExt;
use futures::stream::BoxStream;
use proto::{EnrollmentRequest, Question, Student, StudentAnswer, Test};
use sqlx::PgPool;

use super::{GradedAnswer, Repository, StorageError};

pub struct PostgresRepository {
    pool: PgPool,
}

impl PostgresRepository {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn classify(err: sqlx::Error) -> StorageError {
    if let sqlx::Error::Database(db) = &err {
        if db.is_foreign_key_violation() || db.is_check_violation() {
            return StorageError::Invalid(db.message().to_owned());
        }
    }
    StorageError::Database(err)
}

#[async_trait::async_trait]
impl Repository for PostgresRepository {
    async fn get_test(&self, id: &str) -> Result<Test, StorageError> {
        let row = sqlx::query_as::<_, (String, String)>("SELECT id, name FROM tests WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.map(|(id, name)| Test { id, name })
            .ok_or_else(|| StorageError::TestNotFound(id.to_owned()))
    }

    async fn set_test(&self, test: &Test) -> Result<(), StorageError> {
        sqlx::query("INSERT INTO tests (id, name) VALUES ($1, $2) ON CONFLICT (id) DO UPDATE SET name = EXCLUDED.name")
            .bind(&test.id)
            .bind(&test.name)
            .execute(&self.pool)
            .await
            .map_err(classify)?;
        Ok(())
    }

    async fn set_question(&self, question: &Question) -> Result<(), StorageError> {
        sqlx::query(
            "INSERT INTO questions (id, test_id, question, answer) VALUES ($1, $2, $3, $4) \
             ON CONFLICT (id) DO UPDATE SET \
                 test_id = EXCLUDED.test_id, question = EXCLUDED.question, answer = EXCLUDED.answer",
        )
        .bind(&question.id)
        .bind(&question.test_id)
        .bind(&question.question)
        .bind(&question.answer)
        .execute(&self.pool)
        .await
        .map_err(classify)?;
        Ok(())
    }

    async fn set_student(&self, student: &Student) -> Result<(), StorageError> {
        sqlx::query(
            "INSERT INTO students (id, name, age) VALUES ($1, $2, $3) \
             ON CONFLICT (id) DO UPDATE SET name = EXCLUDED.name, age = EXCLUDED.age",
        )
        .bind(&student.id)
        .bind(&student.name)
        .bind(student.age)
        .execute(&self.pool)
        .await
        .map_err(classify)?;
        Ok(())
    }

    async fn set_enrollment(&self, enrollment: &EnrollmentRequest) -> Result<(), StorageError> {
        sqlx::query("INSERT INTO enrollments (student_id, test_id) VALUES ($1, $2) ON CONFLICT DO NOTHING")
            .bind(&enrollment.student_id)
            .bind(&enrollment.test_id)
            .execute(&self.pool)
            .await
            .map_err(classify)?;
        Ok(())
    }

    fn list_students_for_test<'a>(&'a self, test_id: &'a str) -> BoxStream<'a, Result<StudentAnswer, StorageError>> {
        sqlx::query_as::<_, (String, String, i32)>(
            "SELECT s.id, s.name, s.age
             FROM enrollments e
             JOIN students s ON s.id = e.student_id
             WHERE e.test_id = $1
             ORDER BY e.created_at, s.id",
        )
        .bind(test_id)
        .fetch(&self.pool)
        .map(move |row| -> Result<StudentAnswer, StorageError> {
            let (student_id, name, age) = row?;
            Ok(StudentAnswer { student_id, name, age, test_id: test_id.to_owned() })
        })
        .boxed()
    }

    async fn get_questions_for_test(&self, test_id: &str) -> Result<Vec<Question>, StorageError> {
        let rows = sqlx::query_as::<_, (String, String, String)>(
            "SELECT id, question, answer FROM questions WHERE test_id = $1 ORDER BY created_at, id",
        )
        .bind(test_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|(id, question, answer)| Question { id, answer, question, test_id: test_id.to_owned() })
            .collect())
    }

    async fn set_answer(&self, answer: &GradedAnswer) -> Result<(), StorageError> {
        sqlx::query(
            "INSERT INTO answers (test_id, student_id, question_id, answer, correct) VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(&answer.test_id)
        .bind(&answer.student_id)
        .bind(answer.question_id.as_deref())
        .bind(&answer.answer)
        .bind(answer.correct)
        .execute(&self.pool)
        .await
        .map_err(classify)?;
        Ok(())
    }
}

#[cfg(all(test, feature = "live-db-tests"))]
#[path = "postgres_test.rs"]
mod tests;

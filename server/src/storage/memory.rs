//! In-memory repository with failure injection and write counters.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use futures::StreamExt;
use futures::stream::{self, BoxStream};
use proto::{EnrollmentRequest, Question, Student, StudentAnswer, Test};

use super::{GradedAnswer, Repository, StorageError};

#[derive(Default)]
struct Tables {
    tests: HashMap<String, Test>,
    /// Per test, in first-insert order.
    questions: HashMap<String, Vec<Question>>,
    students: HashMap<String, Student>,
    /// (`student_id`, `test_id`) in enrollment order.
    enrollments: Vec<(String, String)>,
    answers: Vec<GradedAnswer>,
    failing_questions: HashSet<String>,
}

#[derive(Default)]
pub struct MemoryRepository {
    tables: Mutex<Tables>,
    unavailable: AtomicBool,
    latency_ms: AtomicU64,
    question_writes: AtomicUsize,
    enrollment_writes: AtomicUsize,
    answer_writes: AtomicUsize,
}

impl MemoryRepository {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn tables(&self) -> MutexGuard<'_, Tables> {
        self.tables.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn check_available(&self) -> Result<(), StorageError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StorageError::Unavailable("memory store switched off".into()));
        }
        Ok(())
    }

    /// Make every later `set_question` for this id fail with `Invalid`.
    pub fn fail_question(&self, question_id: &str) {
        self.tables().failing_questions.insert(question_id.to_owned());
    }

    /// Make every operation fail with `Unavailable` until switched back.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Delay every async operation by `latency`, like a slow database.
    pub fn set_latency(&self, latency: Duration) {
        let millis = u64::try_from(latency.as_millis()).unwrap_or(u64::MAX);
        self.latency_ms.store(millis, Ordering::SeqCst);
    }

    async fn lag(&self) {
        let millis = self.latency_ms.load(Ordering::SeqCst);
        if millis > 0 {
            tokio::time::sleep(Duration::from_millis(millis)).await;
        }
    }

    /// `set_question` calls attempted, including failed ones.
    #[must_use]
    pub fn question_writes(&self) -> usize {
        self.question_writes.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn enrollment_writes(&self) -> usize {
        self.enrollment_writes.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn answer_writes(&self) -> usize {
        self.answer_writes.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn answers(&self) -> Vec<GradedAnswer> {
        self.tables().answers.clone()
    }
}

#[async_trait::async_trait]
impl Repository for MemoryRepository {
    async fn get_test(&self, id: &str) -> Result<Test, StorageError> {
        self.lag().await;
        self.check_available()?;
        self.tables()
            .tests
            .get(id)
            .cloned()
            .ok_or_else(|| StorageError::TestNotFound(id.to_owned()))
    }

    async fn set_test(&self, test: &Test) -> Result<(), StorageError> {
        self.lag().await;
        self.check_available()?;
        self.tables().tests.insert(test.id.clone(), test.clone());
        Ok(())
    }

    async fn set_question(&self, question: &Question) -> Result<(), StorageError> {
        self.question_writes.fetch_add(1, Ordering::SeqCst);
        self.lag().await;
        self.check_available()?;

        let mut tables = self.tables();
        if tables.failing_questions.contains(&question.id) {
            return Err(StorageError::Invalid(format!("question rejected: {}", question.id)));
        }
        if !tables.tests.contains_key(&question.test_id) {
            return Err(StorageError::Invalid(format!("unknown test: {}", question.test_id)));
        }

        // A question belongs to one test; re-sending it under another test moves it.
        for (test_id, questions) in &mut tables.questions {
            if *test_id != question.test_id {
                questions.retain(|q| q.id != question.id);
            }
        }
        let questions = tables.questions.entry(question.test_id.clone()).or_default();
        match questions.iter_mut().find(|q| q.id == question.id) {
            Some(existing) => *existing = question.clone(),
            None => questions.push(question.clone()),
        }
        Ok(())
    }

    async fn set_student(&self, student: &Student) -> Result<(), StorageError> {
        self.lag().await;
        self.check_available()?;
        self.tables().students.insert(student.id.clone(), student.clone());
        Ok(())
    }

    async fn set_enrollment(&self, enrollment: &EnrollmentRequest) -> Result<(), StorageError> {
        self.enrollment_writes.fetch_add(1, Ordering::SeqCst);
        self.lag().await;
        self.check_available()?;

        let mut tables = self.tables();
        if !tables.students.contains_key(&enrollment.student_id) {
            return Err(StorageError::Invalid(format!("unknown student: {}", enrollment.student_id)));
        }
        if !tables.tests.contains_key(&enrollment.test_id) {
            return Err(StorageError::Invalid(format!("unknown test: {}", enrollment.test_id)));
        }
        let key = (enrollment.student_id.clone(), enrollment.test_id.clone());
        if !tables.enrollments.contains(&key) {
            tables.enrollments.push(key);
        }
        Ok(())
    }

    fn list_students_for_test<'a>(&'a self, test_id: &'a str) -> BoxStream<'a, Result<StudentAnswer, StorageError>> {
        if let Err(e) = self.check_available() {
            return stream::once(async move { Err(e) }).boxed();
        }

        let tables = self.tables();
        let rows: Vec<_> = tables
            .enrollments
            .iter()
            .filter(|(_, t)| t == test_id)
            .filter_map(|(s, _)| tables.students.get(s))
            .map(|student| {
                Ok(StudentAnswer {
                    student_id: student.id.clone(),
                    name: student.name.clone(),
                    age: student.age,
                    test_id: test_id.to_owned(),
                })
            })
            .collect();
        stream::iter(rows).boxed()
    }

    async fn get_questions_for_test(&self, test_id: &str) -> Result<Vec<Question>, StorageError> {
        self.lag().await;
        self.check_available()?;
        Ok(self.tables().questions.get(test_id).cloned().unwrap_or_default())
    }

    async fn set_answer(&self, answer: &GradedAnswer) -> Result<(), StorageError> {
        self.answer_writes.fetch_add(1, Ordering::SeqCst);
        self.lag().await;
        self.check_available()?;
        self.tables().answers.push(answer.clone());
        Ok(())
    }
}

#[cfg(test)]
#[path = "memory_test.rs"]
mod tests;

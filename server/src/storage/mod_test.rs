use super::*;

#[test]
fn per_record_errors_are_not_fatal() {
    assert!(!StorageError::TestNotFound("t1".into()).is_fatal());
    assert!(!StorageError::Invalid("q9t1".into()).is_fatal());
    assert!(!StorageError::Database(sqlx::Error::RowNotFound).is_fatal());
}

#[test]
fn unreachable_store_is_fatal() {
    assert!(StorageError::Unavailable("down".into()).is_fatal());
    assert!(StorageError::Database(sqlx::Error::PoolTimedOut).is_fatal());
    assert!(StorageError::Database(sqlx::Error::PoolClosed).is_fatal());
}

#[test]
fn error_codes_follow_classification() {
    assert_eq!(StorageError::TestNotFound("t1".into()).code(), Code::NotFound);
    assert_eq!(StorageError::Invalid("x".into()).code(), Code::Invalid);
    assert_eq!(StorageError::Unavailable("x".into()).code(), Code::Unavailable);
    assert_eq!(StorageError::Database(sqlx::Error::PoolTimedOut).code(), Code::Unavailable);
    assert_eq!(StorageError::Database(sqlx::Error::RowNotFound).code(), Code::Internal);
}

#[test]
fn not_found_message_names_the_test() {
    assert_eq!(StorageError::TestNotFound("t1".into()).to_string(), "test not found: t1");
}

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use mocket::{record, Catcher, Conn, Error, Expectation, FaultHooks};
use pretty_assertions::assert_eq;

#[derive(Debug, thiserror::Error)]
#[error("constraint violated")]
struct Constraint;

#[test]
fn test_exception_hooks_beat_registered_error() {
    let catcher = Arc::new(Catcher::new());
    catcher
        .register(
            Expectation::new()
                .with_query("UPDATE users")
                .with_error(Constraint)
                .with_exec_exception(|| true),
        )
        .register(
            Expectation::new()
                .with_query("SELECT * FROM users")
                .with_error(Constraint)
                .with_query_exception(|| true),
        );
    let conn = Conn::new(catcher);

    let err = conn.exec("UPDATE users SET a = 1", &[]).unwrap_err();
    assert!(err.is_bad_connection());
    let err = conn.query("SELECT * FROM users", &[]).unwrap_err();
    assert!(err.is_bad_connection());
    assert_eq!(err.to_string(), "bad connection");
}

#[test]
fn test_hooks_are_direction_specific() {
    let catcher = Arc::new(Catcher::new());
    catcher.register(
        Expectation::new()
            .with_query("users")
            .with_reply([record! { "id" => 1 }])
            .with_rows_affected(2)
            .with_exec_exception(|| true),
    );
    let conn = Conn::new(catcher);

    assert!(matches!(
        conn.exec("DELETE FROM users", &[]),
        Err(Error::BadConnection)
    ));
    let rows = conn.query("SELECT * FROM users", &[]).unwrap().collect_rows().unwrap();
    assert_eq!(rows.len(), 1);
}

#[test]
fn test_flaky_hook_recovers() {
    let broken = Arc::new(AtomicBool::new(true));
    let calls = Arc::new(AtomicUsize::new(0));
    let flag = broken.clone();
    let counter = calls.clone();

    let catcher = Arc::new(Catcher::new());
    catcher.register(
        Expectation::new()
            .with_query("UPDATE")
            .with_rows_affected(1)
            .with_exec_exception(move || flag.load(Ordering::SeqCst))
            .with_callback(move |_, _| {
                counter.fetch_add(1, Ordering::SeqCst);
            }),
    );
    let conn = Conn::new(catcher);

    assert!(conn.exec("UPDATE jobs SET done = 1", &[]).is_err());
    assert_eq!(calls.load(Ordering::SeqCst), 0);

    broken.store(false, Ordering::SeqCst);
    assert_eq!(conn.exec("UPDATE jobs SET done = 1", &[]).unwrap().rows_affected(), 1);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[test]
fn test_connection_fault_policy() {
    let catcher = Arc::new(Catcher::new());
    catcher.register(Expectation::new().with_query("users").with_rows_affected(5));

    let conn = Conn::new(catcher.clone()).with_faults(
        FaultHooks::new()
            .on_exec(|sql| sql.starts_with("DELETE"))
            .on_query(|sql| sql.contains("secrets")),
    );

    assert!(conn.exec("DELETE FROM users", &[]).unwrap_err().is_bad_connection());
    assert_eq!(conn.exec("UPDATE users SET a = 1", &[]).unwrap().rows_affected(), 5);
    assert!(conn
        .query("SELECT * FROM secrets", &[])
        .unwrap_err()
        .is_bad_connection());
    assert!(conn.query("SELECT * FROM users", &[]).is_ok());

    // other connections on the same catcher keep their own policy
    let healthy = Conn::new(catcher);
    assert_eq!(healthy.exec("DELETE FROM users", &[]).unwrap().rows_affected(), 5);
}

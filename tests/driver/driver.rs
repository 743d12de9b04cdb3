use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use mocket::{record, Catcher, Conn, Error, Expectation, Record, Row, Value};
use pretty_assertions::assert_eq;
use tracing_subscriber::EnvFilter;

fn init_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn setup() -> (Arc<Catcher>, Conn) {
    init_logging();
    let catcher = Arc::new(Catcher::new());
    let conn = Conn::new(catcher.clone());
    (catcher, conn)
}

#[test]
fn test_select_users() {
    let (catcher, conn) = setup();
    catcher.register(
        Expectation::new()
            .with_query("SELECT * FROM users")
            .with_reply([
                record! { "id" => 1, "name" => "a" },
                record! { "id" => 2, "name" => "b" },
            ]),
    );

    let mut cursor = conn.query("SELECT * FROM users", &[]).unwrap();
    assert_eq!(cursor.columns(), ["id", "name"]);
    assert_eq!(
        cursor.next_row().unwrap(),
        Some(Row::from_iter([Value::from(1), Value::from("a")]))
    );
    assert_eq!(
        cursor.next_row().unwrap(),
        Some(Row::from_iter([Value::from(2), Value::from("b")]))
    );
    assert_eq!(cursor.next_row().unwrap(), None);
}

#[test]
fn test_update_with_bound_argument() {
    let (catcher, conn) = setup();
    catcher.register(
        Expectation::new()
            .with_query("UPDATE users SET name=?")
            .with_rows_affected(3),
    );

    let result = conn.exec("UPDATE users SET name=?", &["bob".into()]).unwrap();
    assert_eq!(result.rows_affected(), 3);
    assert!(matches!(
        result.last_insert_id(),
        Err(Error::LastInsertIdUnsupported)
    ));
}

#[test]
fn test_unmatched_degrades_to_empty() {
    let (catcher, conn) = setup();
    catcher.register(Expectation::new().with_query("orders").with_rows_affected(9));

    let mut cursor = conn.query("SELECT * FROM users", &[]).unwrap();
    assert!(cursor.columns().is_empty());
    assert_eq!(cursor.next_row().unwrap(), None);

    let result = conn.exec("DELETE FROM users", &[]).unwrap();
    assert_eq!(result.rows_affected(), 0);
    assert_eq!(catcher.misses(), 2);
}

#[test]
fn test_insert_ids() {
    let (catcher, conn) = setup();
    catcher
        .register(Expectation::new().with_query("INSERT INTO orders").with_id(77))
        .register(Expectation::new().with_query("INSERT INTO users"));

    for _ in 0..3 {
        let result = conn.exec("INSERT INTO orders VALUES (?)", &[1.into()]).unwrap();
        assert_eq!(result.last_insert_id().unwrap(), 77);
        assert_eq!(result.rows_affected(), 1);
    }

    let first = conn.exec("INSERT INTO users VALUES (?)", &[1.into()]).unwrap();
    let second = conn.exec("INSERT INTO users VALUES (?)", &[2.into()]).unwrap();
    assert_ne!(
        first.last_insert_id().unwrap(),
        second.last_insert_id().unwrap()
    );
}

#[test]
fn test_registered_error_skips_callback() {
    let (catcher, conn) = setup();
    let fired = Arc::new(AtomicUsize::new(0));
    let counter = fired.clone();

    #[derive(Debug, thiserror::Error)]
    #[error("duplicate key")]
    struct DuplicateKey;

    catcher.register(
        Expectation::new()
            .with_query("INSERT INTO users")
            .with_error(DuplicateKey)
            .with_callback(move |_, _| {
                counter.fetch_add(1, Ordering::SeqCst);
            }),
    );

    let err = conn.exec("INSERT INTO users VALUES (1)", &[]).unwrap_err();
    assert_eq!(err.to_string(), "duplicate key");
    assert!(err
        .registered()
        .is_some_and(|e| e.downcast_ref::<DuplicateKey>().is_some()));

    let err = conn.query("INSERT INTO users VALUES (1)", &[]).unwrap_err();
    assert!(matches!(err, Error::Registered(_)));
    assert_eq!(fired.load(Ordering::SeqCst), 0);
}

#[test]
fn test_callback_sees_resolved_sql() {
    let (catcher, conn) = setup();
    let seen = Arc::new(Mutex::new(vec![]));
    let sink = seen.clone();
    catcher.register(
        Expectation::new()
            .with_query("FROM users WHERE id = 5")
            .with_callback(move |sql, args| {
                sink.lock().unwrap().push((sql.to_owned(), args.to_vec()));
            })
            .with_reply([record! { "id" => 5 }]),
    );

    let stmt = conn.prepare("SELECT id FROM users WHERE id = ?").unwrap();
    assert_eq!(stmt.num_input(), 1);
    let rows = stmt.query(&[5.into()]).unwrap().collect_rows().unwrap();
    assert_eq!(rows.len(), 1);

    assert_eq!(
        *seen.lock().unwrap(),
        vec![(
            "SELECT id FROM users WHERE id = 5".to_owned(),
            vec![Value::Integer(5)]
        )]
    );
}

#[test]
fn test_closed_statement() {
    let (catcher, conn) = setup();
    let fired = Arc::new(AtomicUsize::new(0));
    let counter = fired.clone();
    catcher.register(Expectation::new().with_callback(move |_, _| {
        counter.fetch_add(1, Ordering::SeqCst);
    }));

    let mut stmt = conn.prepare("UPDATE users SET name = ?").unwrap();
    stmt.exec(&["a".into()]).unwrap();
    assert_eq!(fired.load(Ordering::SeqCst), 1);

    stmt.close();
    stmt.close();
    for _ in 0..2 {
        assert!(matches!(stmt.exec(&["a".into()]), Err(Error::StatementClosed)));
        assert!(matches!(stmt.query(&[]), Err(Error::StatementClosed)));
    }
    assert_eq!(fired.load(Ordering::SeqCst), 1);
}

#[test]
fn test_loose_rows() {
    let (catcher, conn) = setup();
    catcher.register(
        Expectation::new()
            .with_query("FROM events")
            .with_reply(
                Record::list_from_json(serde_json::json!([
                    {"kind": "login", "at": 10},
                    {"at": 11},
                    {"kind": "logout", "at": 12, "ip": "10.0.0.1"},
                ]))
                .unwrap(),
            ),
    );

    let mut cursor = conn.query("SELECT * FROM events", &[]).unwrap();
    assert_eq!(cursor.columns(), ["kind", "at"]);
    let rows = cursor
        .collect_rows()
        .unwrap()
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>();
    assert_eq!(rows, ["login 10", "NULL 11", "logout 12"]);
}

#[test]
fn test_row_error() {
    let (catcher, conn) = setup();

    #[derive(Debug, thiserror::Error)]
    #[error("row decode failed")]
    struct Decode;

    catcher.register(
        Expectation::new()
            .with_query("FROM users")
            .with_reply((1..=3).map(|id| record! { "id" => id }))
            .with_row_error(1, Decode),
    );

    let mut cursor = conn.query("SELECT * FROM users", &[]).unwrap();
    assert!(cursor.next_row().unwrap().is_some());
    let err = cursor.next_row().unwrap_err();
    assert_eq!(err.to_string(), "row decode failed");
    assert_eq!(cursor.error_position(), Some(1));
    assert_eq!(cursor.next_row().unwrap(), Some(Row::from_iter([3])));
    assert_eq!(cursor.next_row().unwrap(), None);
}

type Seen = Arc<Mutex<Vec<(String, Vec<Value>)>>>;

fn record_into(seen: &Seen) -> impl Fn(&str, &[Value]) + Send + Sync + 'static {
    let sink = seen.clone();
    move |sql, args| sink.lock().unwrap().push((sql.to_owned(), args.to_vec()))
}

#[test]
fn test_chained_exec_splits_arguments() {
    let (catcher, conn) = setup();
    let seen = Seen::default();
    catcher
        .register(
            Expectation::new()
                .with_query("INSERT INTO audit")
                .with_args(["renamed"])
                .with_id(4)
                .with_callback(record_into(&seen)),
        )
        .register(
            Expectation::new()
                .with_query("UPDATE users")
                .with_args_matching(|args| args.len() == 2)
                .with_rows_affected(2)
                .with_callback(record_into(&seen)),
        );

    let stmt = conn
        .prepare("INSERT INTO audit (msg) VALUES (?)")
        .unwrap()
        .then(conn.prepare("UPDATE users SET name = ? WHERE id = ?").unwrap());
    let result = stmt
        .exec(&["renamed".into(), "bob".into(), 7.into()])
        .unwrap();

    assert_eq!(result.rows_affected(), 2);
    assert!(matches!(
        result.last_insert_id(),
        Err(Error::LastInsertIdUnsupported)
    ));
    assert_eq!(
        *seen.lock().unwrap(),
        vec![
            (
                "INSERT INTO audit (msg) VALUES (?)".to_owned(),
                vec![Value::from("renamed")]
            ),
            (
                "UPDATE users SET name = ? WHERE id = ?".to_owned(),
                vec![Value::from("bob"), Value::from(7)]
            ),
        ]
    );
    assert_eq!(catcher.misses(), 0);
}

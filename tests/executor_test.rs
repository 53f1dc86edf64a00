//! Executor and pooled-client tests against a recording fake driver.
//!
//! The fake counts check-outs and check-ins and logs every driver call, so
//! these tests pin down connection discipline without a database server.

use async_trait::async_trait;
use dbcnx::db::executor::QueryExecutor;
use dbcnx::db::pool::PoolRegistry;
use dbcnx::db::session::{ConnectionSource, Session};
use dbcnx::models::RowSet;
use dbcnx::{DbError, DbResult, PoolDb, QueryData, QueryParam, Setup};
use serde_json::json;
use std::sync::{Arc, Mutex};

#[derive(Debug, Default)]
struct Recorder {
    events: Vec<String>,
    checkouts: usize,
    checkins: usize,
}

/// Fake pool. `fail_on` names the driver call that should fail.
#[derive(Debug, Clone, Default)]
struct FakeSource {
    recorder: Arc<Mutex<Recorder>>,
    rows: RowSet,
    fail_on: Option<&'static str>,
}

impl FakeSource {
    fn with_rows(rows: RowSet) -> Self {
        Self {
            rows,
            ..Self::default()
        }
    }

    fn failing(call: &'static str) -> Self {
        Self {
            fail_on: Some(call),
            ..Self::default()
        }
    }

    fn events(&self) -> Vec<String> {
        self.recorder.lock().unwrap().events.clone()
    }

    fn counts(&self) -> (usize, usize) {
        let r = self.recorder.lock().unwrap();
        (r.checkouts, r.checkins)
    }
}

struct FakeSession {
    recorder: Arc<Mutex<Recorder>>,
    rows: RowSet,
    fail_on: Option<&'static str>,
    released: bool,
}

impl FakeSession {
    fn call(&self, name: &str) -> DbResult<()> {
        self.recorder.lock().unwrap().events.push(name.to_string());
        if self.fail_on == Some(name) {
            return Err(DbError::database(
                format!("{} failed", name),
                None,
                "fake driver failure",
            ));
        }
        Ok(())
    }

    fn release(&mut self, how: &str) {
        if self.released {
            return;
        }
        self.released = true;
        let mut r = self.recorder.lock().unwrap();
        r.events.push(how.to_string());
        r.checkins += 1;
    }
}

#[async_trait]
impl Session for FakeSession {
    async fn begin(&mut self) -> DbResult<()> {
        self.call("begin")
    }

    async fn fetch_all(&mut self, _sql: &str, _params: &[QueryParam]) -> DbResult<RowSet> {
        self.call("fetch")?;
        Ok(self.rows.clone())
    }

    async fn execute(&mut self, _sql: &str, _params: &[QueryParam]) -> DbResult<u64> {
        self.call("execute")?;
        Ok(1)
    }

    async fn prepare(&mut self, _sql: &str) -> DbResult<()> {
        self.call("prepare")
    }

    async fn commit(&mut self) -> DbResult<()> {
        self.call("commit")
    }

    async fn rollback(&mut self) -> DbResult<()> {
        self.call("rollback")
    }

    async fn close(mut self) {
        self.release("release");
    }
}

impl Drop for FakeSession {
    fn drop(&mut self) {
        self.release("drop");
    }
}

#[async_trait]
impl ConnectionSource for FakeSource {
    type Session = FakeSession;

    async fn acquire(&self) -> DbResult<FakeSession> {
        {
            let mut r = self.recorder.lock().unwrap();
            r.events.push("acquire".to_string());
            if self.fail_on == Some("acquire") {
                return Err(DbError::connection("pool exhausted", "retry later"));
            }
            r.checkouts += 1;
        }
        Ok(FakeSession {
            recorder: Arc::clone(&self.recorder),
            rows: self.rows.clone(),
            fail_on: self.fail_on,
            released: false,
        })
    }
}

fn people() -> RowSet {
    RowSet::new(
        vec!["id".to_string(), "name".to_string()],
        vec![
            vec![json!(1), json!("ada")],
            vec![json!(2), json!("grace")],
        ],
    )
}

fn pg_setup() -> Setup {
    Setup::new()
        .with("host", "db")
        .with("port", "5432")
        .with("sdi", "app")
        .with("user", "u")
        .with("password", "p")
        .with("driver", "pg")
        .with("pool_size", "2")
}

#[tokio::test]
async fn test_read_dict_rows_keyed_by_uppercase_columns() {
    let source = FakeSource::with_rows(people());
    let data = QueryExecutor::new(&source)
        .read_data("SELECT id, name FROM people", &[], "dict")
        .await
        .unwrap();

    let QueryData::Dict(rows) = data else {
        panic!("expected dict result");
    };
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0]["ID"], json!(1));
    assert_eq!(rows[1]["NAME"], json!("grace"));
    assert_eq!(
        source.events(),
        vec!["acquire", "begin", "fetch", "commit", "release"]
    );
}

#[tokio::test]
async fn test_read_list_is_columns_and_rows() {
    let source = FakeSource::with_rows(people());
    let data = QueryExecutor::new(&source)
        .read_data("SELECT id, name FROM people", &[], "LIST")
        .await
        .unwrap();

    let QueryData::List(columns, rows) = data else {
        panic!("expected list result");
    };
    assert_eq!(columns, vec!["ID", "NAME"]);
    assert_eq!(rows.len(), 2);
    assert!(rows.iter().all(|row| row.len() == columns.len()));
    assert_eq!(rows[0], vec![json!(1), json!("ada")]);
}

#[tokio::test]
async fn test_invalid_datatype_never_checks_out() {
    let source = FakeSource::with_rows(people());
    let err = QueryExecutor::new(&source)
        .read_data("SELECT id FROM people", &[], "tuple")
        .await
        .unwrap_err();

    assert!(matches!(err, DbError::InvalidInput { .. }));
    assert_eq!(source.counts(), (0, 0));
    assert!(source.events().is_empty());
}

#[tokio::test]
async fn test_empty_dict_read_is_empty_not_error() {
    let registry = PoolRegistry::new();
    let source = FakeSource::default();
    let db = PoolDb::with_factory(&registry, pg_setup(), 2, {
        let source = source.clone();
        move |_, _| async move { Ok(source) }
    })
    .await;

    let data = db
        .read_data("SELECT id, name FROM t", &[], "dict")
        .await
        .unwrap();
    assert_eq!(data, QueryData::Dict(vec![]));
    assert_eq!(source.counts(), (1, 1));
}

#[tokio::test]
async fn test_execute_many_prepares_once_and_commits_once() {
    let source = FakeSource::default();
    let values: Vec<Vec<QueryParam>> = vec![
        vec![QueryParam::Int(1), QueryParam::from("a")],
        vec![QueryParam::Int(2), QueryParam::from("b")],
        vec![QueryParam::Int(3), QueryParam::from("c")],
    ];

    let total = QueryExecutor::new(&source)
        .execute_many("INSERT INTO t (id, name) VALUES ($1, $2)", &values)
        .await
        .unwrap();

    assert_eq!(total, 3);
    assert_eq!(
        source.events(),
        vec![
            "acquire", "begin", "prepare", "execute", "execute", "execute", "commit", "release"
        ]
    );
    assert_eq!(source.counts(), (1, 1));
}

#[tokio::test]
async fn test_execute_many_with_no_values_still_commits() {
    let source = FakeSource::default();
    let total = QueryExecutor::new(&source)
        .execute_many("INSERT INTO t VALUES ($1)", &[])
        .await
        .unwrap();

    assert_eq!(total, 0);
    assert_eq!(
        source.events(),
        vec!["acquire", "begin", "prepare", "commit", "release"]
    );
}

#[tokio::test]
async fn test_failed_execute_rolls_back_and_releases() {
    let source = FakeSource::failing("execute");
    let err = QueryExecutor::new(&source)
        .execute("UPDATE t SET name = $1", &[QueryParam::from("x")])
        .await
        .unwrap_err();

    assert!(matches!(err, DbError::Database { .. }));
    assert_eq!(
        source.events(),
        vec!["acquire", "begin", "execute", "rollback", "release"]
    );
    assert_eq!(source.counts(), (1, 1));
}

#[tokio::test]
async fn test_failed_commit_rolls_back() {
    let source = FakeSource::failing("commit");
    let result = QueryExecutor::new(&source)
        .execute("DELETE FROM t", &[])
        .await;

    assert!(result.is_err());
    assert_eq!(
        source.events(),
        vec!["acquire", "begin", "execute", "commit", "rollback", "release"]
    );
}

#[tokio::test]
async fn test_failed_acquire_has_nothing_to_release() {
    let source = FakeSource::failing("acquire");
    let err = QueryExecutor::new(&source)
        .read_data("SELECT 1", &[], "dict")
        .await
        .unwrap_err();

    assert!(matches!(err, DbError::Connection { .. }));
    assert_eq!(source.counts(), (0, 0));
}

#[tokio::test]
async fn test_checkouts_match_checkins_across_mixed_calls() {
    let ok = FakeSource::with_rows(people());
    let failing_fetch = FakeSource {
        recorder: Arc::clone(&ok.recorder),
        fail_on: Some("fetch"),
        ..FakeSource::default()
    };
    let failing_begin = FakeSource {
        recorder: Arc::clone(&ok.recorder),
        fail_on: Some("begin"),
        ..FakeSource::default()
    };

    for _ in 0..3 {
        let _ = QueryExecutor::new(&ok).read_data("SELECT 1", &[], "dict").await;
        let _ = QueryExecutor::new(&ok).execute("DELETE FROM t", &[]).await;
        let _ = QueryExecutor::new(&failing_fetch)
            .read_data("SELECT 1", &[], "list")
            .await;
        let _ = QueryExecutor::new(&failing_begin)
            .execute_many("INSERT INTO t VALUES (?)", &[vec![QueryParam::Int(1)]])
            .await;
        let _ = QueryExecutor::new(&ok).read_data("SELECT 1", &[], "bogus").await;
    }

    let (checkouts, checkins) = ok.counts();
    assert_eq!(checkouts, 12);
    assert_eq!(checkouts, checkins);
}

#[tokio::test]
async fn test_dropped_session_checks_in() {
    let source = FakeSource::default();
    let session = source.acquire().await.unwrap();
    drop(session);

    assert_eq!(source.counts(), (1, 1));
    assert_eq!(source.events(), vec!["acquire", "drop"]);
}

#[tokio::test]
async fn test_second_configuration_is_ignored() {
    let registry = PoolRegistry::new();
    let first = FakeSource::default();
    let second = FakeSource::default();

    let a = PoolDb::with_factory(&registry, pg_setup(), 2, {
        let first = first.clone();
        move |_, _| async move { Ok(first) }
    })
    .await;
    let other_setup = pg_setup().with("host", "elsewhere");
    let b = PoolDb::with_factory(&registry, other_setup, 9, {
        let second = second.clone();
        move |_, _| async move { Ok(second) }
    })
    .await;

    assert_eq!(b.setup().get("host"), Some("db"));
    assert_eq!(b.pool_size(), 2);
    assert_eq!(a.setup(), b.setup());

    b.execute_query("DELETE FROM t", &[]).await.unwrap();
    assert_eq!(first.counts(), (1, 1));
    assert_eq!(second.counts(), (0, 0));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_first_construction_builds_one_pool() {
    let registry: Arc<PoolRegistry<FakeSource>> = Arc::new(PoolRegistry::new());
    let builds = Arc::new(Mutex::new(0usize));

    let mut handles = Vec::new();
    for i in 0..8 {
        let registry = Arc::clone(&registry);
        let builds = Arc::clone(&builds);
        handles.push(tokio::spawn(async move {
            let setup = pg_setup().with("host", format!("host-{}", i));
            let db = PoolDb::with_factory(&registry, setup, 2, move |_, _| async move {
                *builds.lock().unwrap() += 1;
                tokio::task::yield_now().await;
                Ok(FakeSource::default())
            })
            .await;
            db.setup().get("host").map(str::to_string)
        }));
    }

    let mut hosts = Vec::new();
    for handle in handles {
        hosts.push(handle.await.unwrap());
    }

    assert_eq!(*builds.lock().unwrap(), 1);
    assert!(hosts.windows(2).all(|w| w[0] == w[1]));
}

#[tokio::test]
async fn test_failed_pool_creation_makes_calls_unavailable() {
    let registry: PoolRegistry<FakeSource> = PoolRegistry::new();
    let db = PoolDb::with_factory(&registry, pg_setup(), 2, |_, _| async {
        Err(DbError::connection("connection refused", "start the server"))
    })
    .await;

    assert!(!db.is_available());
    let err = db.read_data("SELECT 1", &[], "dict").await.unwrap_err();
    assert!(matches!(err, DbError::PoolUnavailable));
    let err = db.execute_query("DELETE FROM t", &[]).await.unwrap_err();
    assert!(matches!(err, DbError::PoolUnavailable));
    let err = db.execute_many("DELETE FROM t", &[]).await.unwrap_err();
    assert!(matches!(err, DbError::PoolUnavailable));

    // The datatype is still checked first
    let err = db.read_data("SELECT 1", &[], "nope").await.unwrap_err();
    assert!(matches!(err, DbError::InvalidInput { .. }));
}

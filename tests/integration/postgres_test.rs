//! Postgres target integration tests.
//!
//! Runs scripts through the target factory against a live database.

use sql_runner::config::Target;
use sql_runner::db::{self, PostgresTarget, QueryRunner, SharedBuffer};
use sql_runner::error::RunnerError;
use sql_runner::query::ReadyQuery;

/// Helper to get test database URL from environment.
fn get_test_database_url() -> Option<String> {
    std::env::var("DATABASE_URL").ok()
}

/// Helper to create a test runner.
async fn get_test_runner() -> Option<Box<dyn QueryRunner>> {
    let url = get_test_database_url()?;
    let target = Target::from_connection_string("test", &url).ok()?;
    db::connect(&target).await.ok()
}

async fn run(runner: &dyn QueryRunner, script: &str) -> sql_runner::query::QueryStatus {
    runner
        .run_query(ReadyQuery::new("q", script, "q.sql"), false, false)
        .await
}

#[tokio::test]
async fn test_multi_statement_script_sums_rows() {
    let Some(runner) = get_test_runner().await else {
        eprintln!("Skipping test: DATABASE_URL not set");
        return;
    };

    let status = run(
        runner.as_ref(),
        "DROP TABLE IF EXISTS sql_runner_multi_t;
         CREATE TABLE sql_runner_multi_t (id INT, note TEXT);
         INSERT INTO sql_runner_multi_t VALUES (1, 'a;b'), (2, NULL);
         UPDATE sql_runner_multi_t SET note = 'x' WHERE id = 2;",
    )
    .await;

    assert!(status.is_success(), "{:?}", status.error);
    assert_eq!(status.rows_affected, 3);

    run(runner.as_ref(), "DROP TABLE sql_runner_multi_t;").await;
    runner.close().await.unwrap();
}

#[tokio::test]
async fn test_failed_statement_reports_zero_rows() {
    let Some(runner) = get_test_runner().await else {
        eprintln!("Skipping test: DATABASE_URL not set");
        return;
    };

    let status = run(
        runner.as_ref(),
        "SELECT 1; SELECT * FROM sql_runner_table_that_does_not_exist;",
    )
    .await;

    assert_eq!(status.rows_affected, 0);
    let Some(RunnerError::Query(message)) = &status.error else {
        panic!("expected a query error, got {:?}", status.error);
    };
    assert!(message.starts_with("ERROR: "));

    runner.close().await.unwrap();
}

#[tokio::test]
async fn test_capture_output_logs_values() {
    let Some(runner) = get_test_runner().await else {
        eprintln!("Skipping test: DATABASE_URL not set");
        return;
    };

    let logs = SharedBuffer::new();
    let writer = logs.clone();
    let subscriber = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .with_ansi(false)
        .with_writer(move || writer.clone())
        .finish();
    let _guard = tracing::subscriber::set_default(subscriber);

    let query = ReadyQuery::new("out", "SELECT NULL::text AS a, 42 AS b;", "out.sql");
    let status = runner.run_query(query, false, true).await;
    assert!(status.is_success(), "{:?}", status.error);
    assert_eq!(status.path, "out.sql");
    assert!(logs.contents().contains("QUERY OUTPUT: NULL, 42"));

    let query = ReadyQuery::new("none", "SELECT 1 WHERE false;", "none.sql");
    let status = runner.run_query(query, false, true).await;
    assert!(status.is_success(), "{:?}", status.error);
    assert!(logs.contents().contains("QUERY OUTPUT: No output returned."));

    runner.close().await.unwrap();
}

#[tokio::test]
async fn test_bad_password_is_connection_error() {
    let Some(url) = get_test_database_url() else {
        eprintln!("Skipping test: DATABASE_URL not set");
        return;
    };

    let mut target = Target::from_connection_string("test", &url).unwrap();
    target.username = Some("sql_runner_no_such_user".to_string());
    target.password = Some("wrong".to_string());
    let runner = PostgresTarget::connect(target).unwrap();

    let status = run(&runner, "SELECT 1;").await;
    assert!(matches!(status.error, Some(RunnerError::Connection(_))));

    runner.close().await.unwrap();
}

//! Snowflake target integration tests.
//!
//! Drives `SnowflakeTarget` through the public runner interface over a mock
//! session.

use std::sync::Arc;

use sql_runner::config::{Target, TargetKind};
use sql_runner::db::snowflake::account_url;
use sql_runner::db::{
    ColumnInfo, MockSession, QueryRunner, RowSet, SharedBuffer, SnowflakeTarget,
};
use sql_runner::error::RunnerError;
use sql_runner::query::ReadyQuery;

fn target() -> Target {
    let mut target = Target::new("snow", TargetKind::Snowflake);
    target.account = Some("acme".to_string());
    target
}

#[tokio::test]
async fn test_script_with_quoted_semicolons_splits_correctly() {
    let session = Arc::new(
        MockSession::new()
            .with_rows_affected("INSERT INTO notes VALUES ('a; b')", 1)
            .with_rows_affected("DELETE FROM notes WHERE body = ''", 4),
    );
    let runner = SnowflakeTarget::with_session(target(), Box::new(Arc::clone(&session)));

    let script = "INSERT INTO notes VALUES ('a; b');\n\
                  DELETE FROM notes WHERE body = '';\n\
                  -- done; nothing else to send\n";
    let status = runner
        .run_query(ReadyQuery::new("notes", script, "notes.sql"), false, false)
        .await;

    assert!(status.is_success(), "{:?}", status.error);
    assert_eq!(status.rows_affected, 5);
    assert_eq!(session.calls().len(), 2);
}

#[tokio::test]
async fn test_failure_keeps_partial_count() {
    let session = Arc::new(
        MockSession::new()
            .with_rows_affected("UPDATE a SET x = 1", 10)
            .fail_on("UPDATE b SET x = 1", RunnerError::query("boom")),
    );
    let runner = SnowflakeTarget::with_session(target(), Box::new(Arc::clone(&session)));

    let status = runner
        .run_query(
            ReadyQuery::new("upd", "UPDATE a SET x = 1; UPDATE b SET x = 1;", "upd.sql"),
            false,
            false,
        )
        .await;

    assert_eq!(status.rows_affected, 10);
    assert_eq!(status.error, Some(RunnerError::query("boom")));
}

#[tokio::test]
async fn test_capture_prints_table() {
    let rows = RowSet::with_data(
        vec![ColumnInfo::new("N", "fixed")],
        vec![vec![Some("7".to_string())]],
    );
    let session = Arc::new(MockSession::new().with_result("SELECT 7 AS n", rows));
    let buffer = SharedBuffer::new();
    let runner = SnowflakeTarget::with_session(target(), Box::new(Arc::clone(&session)))
        .with_output(buffer.clone());

    let status = runner
        .run_query(ReadyQuery::new("seven", "SELECT 7 AS n;", "seven.sql"), false, true)
        .await;

    assert!(status.is_success());
    assert_eq!(buffer.contents(), "---N|\n---7|\n");

    runner.close().await.unwrap();
    assert!(session.is_closed());
}

#[test]
fn test_account_url_from_target() {
    let url = account_url(&target()).unwrap();
    assert_eq!(url.host_str(), Some("acme.snowflakecomputing.com"));
}

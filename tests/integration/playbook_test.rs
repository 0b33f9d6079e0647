//! Playbook integration tests.
//!
//! Loads playbooks from disk, resolves their SQL files and runs them through
//! the orchestrator against mock runners.

use std::fs;
use std::path::Path;

use sql_runner::config::Playbook;
use sql_runner::db::{self, MockRunner, QueryRunner};
use sql_runner::error::RunnerError;
use sql_runner::orchestrator::{self, EXIT_NOTHING_RUN, EXIT_OK, EXIT_QUERY_FAILED};
use sql_runner::query::resolve_steps;
use tempfile::TempDir;

const PLAYBOOK: &str = r#"
[[targets]]
name = "primary"
kind = "postgres"
host = "localhost"
database = "app"

[[targets]]
name = "replica"
kind = "postgres"
host = "localhost"
port = 5433
database = "app"

[[steps]]
name = "create"
queries = [{ name = "tables", file = "create/tables.sql" }]

[[steps]]
name = "load"
queries = [
  { name = "users", file = "load/users.sql" },
  { name = "orders", file = "load/orders.sql" },
]

[[steps]]
name = "report"
queries = [{ name = "counts", file = "report/counts.sql", output = true }]
"#;

fn write(root: &Path, relative: &str, content: &str) {
    let path = root.join(relative);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, content).unwrap();
}

fn setup() -> (TempDir, Playbook) {
    let dir = TempDir::new().unwrap();
    let root = dir.path();

    write(root, "playbook.toml", PLAYBOOK);
    write(root, "create/tables.sql", "CREATE TABLE users (id INT);");
    write(root, "load/users.sql", "INSERT INTO users VALUES (1), (2);");
    write(root, "load/orders.sql", "INSERT INTO orders SELECT 1;");
    write(root, "report/counts.sql", "SELECT count(*) FROM users;");

    let playbook = Playbook::load_from_file(&root.join("playbook.toml")).unwrap();
    playbook.validate().unwrap();
    (dir, playbook)
}

fn runners(playbook: &Playbook, failing: Option<(&str, &str)>) -> Vec<Box<dyn QueryRunner>> {
    playbook
        .targets
        .iter()
        .map(|target| {
            let mut runner = MockRunner::new(target.clone()).with_rows("users", 2);
            if let Some((name, query)) = failing {
                if target.name == name {
                    runner = runner.failing(query);
                }
            }
            Box::new(runner) as Box<dyn QueryRunner>
        })
        .collect()
}

#[tokio::test]
async fn test_full_playbook_succeeds() {
    let (dir, playbook) = setup();
    let steps = resolve_steps(&playbook.steps, dir.path(), None).await.unwrap();

    assert_eq!(steps.len(), 3);
    assert!(steps[2].queries[0].capture_output);
    assert_eq!(
        steps[1].queries[0].query.script,
        "INSERT INTO users VALUES (1), (2);"
    );

    let report = orchestrator::run(&runners(&playbook, None), &steps, false).await;

    assert_eq!(report.exit_code(), EXIT_OK);
    assert_eq!(report.query_count(), 8);
    for target in &report.targets {
        let users = target
            .statuses
            .iter()
            .find(|s| s.query.name == "users")
            .unwrap();
        assert_eq!(users.rows_affected, 2);
    }
}

#[tokio::test]
async fn test_failure_skips_later_steps_for_that_target() {
    let (dir, playbook) = setup();
    let steps = resolve_steps(&playbook.steps, dir.path(), None).await.unwrap();

    let report = orchestrator::run(&runners(&playbook, Some(("replica", "orders"))), &steps, false)
        .await;

    assert_eq!(report.exit_code(), EXIT_QUERY_FAILED);
    assert_eq!(report.failure_count(), 1);

    let primary = &report.targets[0];
    let replica = &report.targets[1];
    assert_eq!(primary.statuses.len(), 4);
    // create plus both load queries; report never runs.
    assert_eq!(replica.statuses.len(), 3);
    assert!(replica.statuses.iter().all(|s| s.query.name != "counts"));
}

#[tokio::test]
async fn test_from_step_skips_earlier_steps() {
    let (dir, playbook) = setup();
    let steps = resolve_steps(&playbook.steps, dir.path(), Some("report"))
        .await
        .unwrap();

    assert_eq!(steps.len(), 1);
    let report = orchestrator::run(&runners(&playbook, None), &steps, false).await;
    assert_eq!(report.query_count(), 2);
}

#[tokio::test]
async fn test_unknown_step_is_config_error() {
    let (dir, playbook) = setup();
    let err = resolve_steps(&playbook.steps, dir.path(), Some("missing"))
        .await
        .unwrap_err();
    assert!(matches!(err, RunnerError::Config(_)));
}

#[tokio::test]
async fn test_missing_sql_file_is_config_error() {
    let (dir, playbook) = setup();
    fs::remove_file(dir.path().join("load/orders.sql")).unwrap();

    let err = resolve_steps(&playbook.steps, dir.path(), None)
        .await
        .unwrap_err();
    assert!(matches!(err, RunnerError::Config(_)));
    assert!(err.to_string().contains("orders.sql"));
}

#[tokio::test]
async fn test_target_filter() {
    let (dir, mut playbook) = setup();
    playbook.retain_targets(&["replica".to_string()]).unwrap();
    assert_eq!(playbook.targets.len(), 1);

    let steps = resolve_steps(&playbook.steps, dir.path(), None).await.unwrap();
    let report = orchestrator::run(&runners(&playbook, None), &steps, true).await;
    assert_eq!(report.targets[0].target, "replica");
    assert_eq!(report.exit_code(), EXIT_OK);

    let err = playbook.retain_targets(&["nope".to_string()]).unwrap_err();
    assert!(matches!(err, RunnerError::Config(_)));
}

#[tokio::test]
async fn test_playbook_without_steps_runs_nothing() {
    let dir = TempDir::new().unwrap();
    write(
        dir.path(),
        "playbook.toml",
        "[[targets]]\nname = \"pg\"\nkind = \"postgres\"\nhost = \"localhost\"\n",
    );
    let playbook = Playbook::load_from_file(&dir.path().join("playbook.toml")).unwrap();

    let steps = resolve_steps(&playbook.steps, dir.path(), None).await.unwrap();
    let report = orchestrator::run(&runners(&playbook, None), &steps, false).await;
    assert_eq!(report.exit_code(), EXIT_NOTHING_RUN);
}

#[tokio::test]
async fn test_dry_run_with_unreachable_snowflake() {
    let dir = TempDir::new().unwrap();
    write(
        dir.path(),
        "playbook.toml",
        r#"
[[targets]]
name = "snow"
kind = "snowflake"
account = "acme"
host = "127.0.0.1"
port = 1

[[steps]]
name = "load"
queries = [{ name = "users", file = "users.sql", output = true }]
"#,
    );
    write(dir.path(), "users.sql", "DELETE FROM users; SELECT 1;");

    let playbook = Playbook::load_from_file(&dir.path().join("playbook.toml")).unwrap();
    playbook.validate().unwrap();
    let steps = resolve_steps(&playbook.steps, dir.path(), None).await.unwrap();

    let runners = db::connect_all(&playbook.targets, true).await.unwrap();
    let report = orchestrator::run(&runners, &steps, true).await;
    db::close_all(&runners).await;

    assert_eq!(report.exit_code(), EXIT_OK);
    assert_eq!(report.query_count(), 1);
}

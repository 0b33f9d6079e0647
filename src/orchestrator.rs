//! Runs resolved steps against every target.
//!
//! Targets run concurrently with each other. Within a target, steps run in
//! playbook order and the queries of one step run concurrently.

use futures::future::join_all;
use tracing::{error, info, warn};

use crate::db::QueryRunner;
use crate::query::{QueryStatus, ReadyStep};

/// Exit code when every query succeeded.
pub const EXIT_OK: i32 = 0;
/// Exit code for configuration, resolution and connection failures.
pub const EXIT_FATAL: i32 = 1;
/// Exit code when nothing was executed.
pub const EXIT_NOTHING_RUN: i32 = 3;
/// Exit code when at least one query failed.
pub const EXIT_QUERY_FAILED: i32 = 6;

/// Statuses collected for one target.
#[derive(Debug, Clone)]
pub struct TargetReport {
    pub target: String,
    pub statuses: Vec<QueryStatus>,
}

impl TargetReport {
    pub fn failures(&self) -> impl Iterator<Item = &QueryStatus> {
        self.statuses.iter().filter(|s| !s.is_success())
    }
}

/// Outcome of a whole run.
#[derive(Debug, Clone, Default)]
pub struct RunReport {
    pub targets: Vec<TargetReport>,
}

impl RunReport {
    /// Total number of queries that were run.
    pub fn query_count(&self) -> usize {
        self.targets.iter().map(|t| t.statuses.len()).sum()
    }

    pub fn failure_count(&self) -> usize {
        self.targets.iter().map(|t| t.failures().count()).sum()
    }

    /// Process exit code for this run.
    pub fn exit_code(&self) -> i32 {
        if self.query_count() == 0 {
            EXIT_NOTHING_RUN
        } else if self.failure_count() > 0 {
            EXIT_QUERY_FAILED
        } else {
            EXIT_OK
        }
    }
}

/// Runs every step against every runner.
pub async fn run(runners: &[Box<dyn QueryRunner>], steps: &[ReadyStep], dry_run: bool) -> RunReport {
    let targets = join_all(
        runners
            .iter()
            .map(|runner| run_target(runner.as_ref(), steps, dry_run)),
    )
    .await;

    RunReport { targets }
}

async fn run_target(runner: &dyn QueryRunner, steps: &[ReadyStep], dry_run: bool) -> TargetReport {
    let target = runner.target().name.clone();
    let mut statuses = Vec::new();

    for (index, step) in steps.iter().enumerate() {
        info!("[{}] Step '{}'", target, step.name);

        let step_statuses = join_all(step.queries.iter().map(|planned| {
            runner.run_query(planned.query.clone(), dry_run, planned.capture_output)
        }))
        .await;

        let mut failed = false;
        for status in &step_statuses {
            match &status.error {
                None => info!(
                    "[{}] {}: {} rows affected",
                    target, status.path, status.rows_affected
                ),
                Some(e) => {
                    failed = true;
                    error!("[{}] {}: {}", target, status.path, e);
                }
            }
        }
        statuses.extend(step_statuses);

        if failed {
            let skipped = steps.len() - index - 1;
            if skipped > 0 {
                warn!(
                    "[{}] Step '{}' failed, skipping {} remaining step(s)",
                    target, step.name, skipped
                );
            }
            break;
        }
    }

    TargetReport { target, statuses }
}

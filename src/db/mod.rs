//! Target connectors for sql-runner.
//!
//! Provides a trait-based interface for running queries, allowing Postgres,
//! Redshift and Snowflake targets to be driven interchangeably even though
//! they batch statements and return rows in different ways.

mod dry_run;
pub mod mock;
mod postgres;
pub mod snowflake;
mod tabular;
mod types;

pub use dry_run::DryRunTarget;
pub use mock::{MockRunner, MockSession, SharedBuffer};
pub use postgres::PostgresTarget;
pub use snowflake::{SnowflakeTarget, StatementSession};
pub use tabular::TabularOutput;
pub use types::{text_value, ColumnInfo, ParamList, ResultRow, RowSet, NULL_TEXT};

use crate::config::{Target, TargetKind};
use crate::error::Result;
use crate::query::{QueryStatus, ReadyQuery};
use async_trait::async_trait;
use tracing::{info, warn};

/// Creates a runner for the given target.
///
/// This is the central factory function for target connections. Postgres and
/// Redshift pools connect lazily, so their connection problems surface on the
/// first query; Snowflake logs in here and fails immediately.
pub async fn connect(target: &Target) -> Result<Box<dyn QueryRunner>> {
    match target.kind {
        TargetKind::Postgres | TargetKind::Redshift => {
            let runner = PostgresTarget::connect(target.clone())?;
            Ok(Box::new(runner))
        }
        TargetKind::Snowflake => {
            let runner = SnowflakeTarget::connect(target.clone()).await?;
            Ok(Box::new(runner))
        }
    }
}

/// Opens a runner for every target, in order.
///
/// A dry run gets [`DryRunTarget`]s, so no pool, login or logout ever
/// reaches the network. If any target fails to connect, the runners already
/// opened are closed and the error is returned.
pub async fn connect_all(targets: &[Target], dry_run: bool) -> Result<Vec<Box<dyn QueryRunner>>> {
    let mut runners: Vec<Box<dyn QueryRunner>> = Vec::with_capacity(targets.len());

    for target in targets {
        info!("Target: {}", target.display_string());
        let opened = if dry_run {
            DryRunTarget::new(target.clone()).map(|r| Box::new(r) as Box<dyn QueryRunner>)
        } else {
            connect(target).await
        };

        match opened {
            Ok(runner) => runners.push(runner),
            Err(e) => {
                close_all(&runners).await;
                return Err(e);
            }
        }
    }

    Ok(runners)
}

/// Closes every runner, logging failures.
pub async fn close_all(runners: &[Box<dyn QueryRunner>]) {
    for runner in runners {
        if let Err(e) = runner.close().await {
            warn!("Failed to close {}: {}", runner.target().name, e);
        }
    }
}

/// Trait defining the interface for query runners.
///
/// Failures while running a query are reported inside the returned
/// [`QueryStatus`], never as an `Err`.
#[async_trait]
pub trait QueryRunner: Send + Sync {
    /// The target this runner executes against.
    fn target(&self) -> &Target;

    /// Runs one query.
    ///
    /// With `dry_run` set nothing is sent and the status reports zero rows.
    /// With `capture_output` set, rows returned by the script are logged or
    /// printed instead of discarded.
    async fn run_query(&self, query: ReadyQuery, dry_run: bool, capture_output: bool)
        -> QueryStatus;

    /// Closes the underlying connection or session.
    async fn close(&self) -> Result<()>;
}

//! Snowflake target implementation.
//!
//! Snowflake executes exactly one statement per request, so scripts are split
//! and sent statement by statement. Affected-row counts are summed across the
//! statements, and the first failure stops the script.

mod client;

pub use client::{account_url, SnowflakeSession, LOGIN_TIMEOUT};

use std::io::{self, Write};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tracing::{debug, error};

use crate::config::Target;
use crate::db::{text_value, QueryRunner, RowSet, TabularOutput};
use crate::error::{Result, RunnerError};
use crate::query::{split_statements, QueryStatus, ReadyQuery};

/// One-statement-per-call execution against a Snowflake session.
#[async_trait]
pub trait StatementSession: Send + Sync {
    /// Executes a single statement and returns its affected-row count.
    async fn execute(&self, sql: &str) -> Result<u64>;

    /// Executes a single row-returning statement.
    async fn query(&self, sql: &str) -> Result<RowSet>;

    /// Ends the session.
    async fn close(&self) -> Result<()>;
}

#[async_trait]
impl<S: StatementSession + ?Sized> StatementSession for Arc<S> {
    async fn execute(&self, sql: &str) -> Result<u64> {
        (**self).execute(sql).await
    }

    async fn query(&self, sql: &str) -> Result<RowSet> {
        (**self).query(sql).await
    }

    async fn close(&self) -> Result<()> {
        (**self).close().await
    }
}

/// Snowflake target.
pub struct SnowflakeTarget {
    target: Target,
    session: Box<dyn StatementSession>,
    output: Mutex<Box<dyn Write + Send>>,
}

impl SnowflakeTarget {
    /// Logs in and creates a runner.
    ///
    /// Fails if the account URL cannot be built or the login is rejected.
    pub async fn connect(target: Target) -> Result<Self> {
        let session = SnowflakeSession::login(&target).await?;
        debug!("Logged in to {}", target.display_string());
        Ok(Self::with_session(target, Box::new(session)))
    }

    /// Creates a runner over an existing session, printing tables to stdout.
    pub fn with_session(target: Target, session: Box<dyn StatementSession>) -> Self {
        Self {
            target,
            session,
            output: Mutex::new(Box::new(io::stdout())),
        }
    }

    /// Sends captured tables to `output` instead of stdout.
    pub fn with_output(mut self, output: impl Write + Send + 'static) -> Self {
        self.output = Mutex::new(Box::new(output));
        self
    }

    /// Runs every statement of a script, stopping at the first failure.
    ///
    /// Returns the rows affected so far together with the error, if any.
    async fn run_script(&self, script: &str, capture_output: bool) -> (u64, Option<RunnerError>) {
        let mut affected = 0;

        for statement in split_statements(script) {
            debug!("Sending statement to {}: {}", self.target.name, statement);

            if capture_output {
                if let Err(e) = self.print_rows(statement).await {
                    return (affected, Some(e));
                }
            } else {
                match self.session.execute(statement).await {
                    Ok(rows) => affected += rows,
                    Err(e) => return (affected, Some(e)),
                }
            }
        }

        (affected, None)
    }

    /// Runs a row-returning statement and writes its rows as one table.
    async fn print_rows(&self, statement: &str) -> Result<()> {
        let result = self.session.query(statement).await?;

        if result.columns.is_empty() {
            error!("ERROR: Unable to read columns");
            return Err(RunnerError::scan("Unable to read columns"));
        }

        let mut table = TabularOutput::new();
        table.push_line(result.column_names());

        for (index, row) in result.rows.iter().enumerate() {
            if row.len() != result.columns.len() {
                return Err(RunnerError::scan(format!(
                    "Row {} has {} values, expected {}",
                    index + 1,
                    row.len(),
                    result.columns.len()
                )));
            }
            table.push_line(
                row.iter()
                    .map(|value| text_value(value.as_deref().map(str::as_bytes)))
                    .collect(),
            );
        }

        let mut output = self
            .output
            .lock()
            .map_err(|_| RunnerError::internal("Output sink lock poisoned"))?;
        table
            .write_to(&mut **output)
            .map_err(|e| RunnerError::internal(format!("Failed to write query output: {e}")))
    }
}

#[async_trait]
impl QueryRunner for SnowflakeTarget {
    fn target(&self) -> &Target {
        &self.target
    }

    async fn run_query(
        &self,
        query: ReadyQuery,
        dry_run: bool,
        capture_output: bool,
    ) -> QueryStatus {
        if dry_run {
            return QueryStatus::success(query, 0);
        }

        let (affected, error) = self.run_script(&query.script, capture_output).await;
        match error {
            None => QueryStatus::success(query, affected),
            Some(e) => QueryStatus::failure(query, affected, e),
        }
    }

    async fn close(&self) -> Result<()> {
        self.session.close().await
    }
}

//! Mock sessions and runners for testing.
//!
//! Provides in-memory stand-ins for a Snowflake session and for a whole
//! target, so runners and the orchestrator can be tested headless.

use std::collections::{HashMap, HashSet};
use std::io::{self, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use super::{ColumnInfo, QueryRunner, RowSet, StatementSession};
use crate::config::Target;
use crate::error::{Result, RunnerError};
use crate::query::{QueryStatus, ReadyQuery};

/// A statement session that returns predefined results and records calls.
#[derive(Default)]
pub struct MockSession {
    rows_affected: HashMap<String, u64>,
    results: HashMap<String, RowSet>,
    failures: HashMap<String, RunnerError>,
    calls: Mutex<Vec<String>>,
    closed: AtomicBool,
}

impl MockSession {
    /// Creates a session where every statement succeeds.
    ///
    /// Commands affect no rows and queries return one `RESULT` column.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the affected-row count reported for `statement`.
    pub fn with_rows_affected(mut self, statement: &str, rows: u64) -> Self {
        self.rows_affected.insert(statement.to_string(), rows);
        self
    }

    /// Sets the rows returned for `statement`.
    pub fn with_result(mut self, statement: &str, rows: RowSet) -> Self {
        self.results.insert(statement.to_string(), rows);
        self
    }

    /// Makes `statement` fail with `error`.
    pub fn fail_on(mut self, statement: &str, error: RunnerError) -> Self {
        self.failures.insert(statement.to_string(), error);
        self
    }

    /// Statements received so far, in order.
    pub fn calls(&self) -> Vec<String> {
        self.calls
            .lock()
            .map(|calls| calls.clone())
            .unwrap_or_default()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    fn record(&self, sql: &str) -> Result<()> {
        self.calls
            .lock()
            .map_err(|_| RunnerError::internal("Mock call log poisoned"))?
            .push(sql.to_string());

        match self.failures.get(sql) {
            Some(error) => Err(error.clone()),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl StatementSession for MockSession {
    async fn execute(&self, sql: &str) -> Result<u64> {
        self.record(sql)?;
        Ok(self.rows_affected.get(sql).copied().unwrap_or(0))
    }

    async fn query(&self, sql: &str) -> Result<RowSet> {
        self.record(sql)?;

        if let Some(rows) = self.results.get(sql) {
            return Ok(rows.clone());
        }

        Ok(RowSet::with_data(
            vec![ColumnInfo::new("RESULT", "text")],
            vec![vec![Some(format!("Mock result for: {sql}"))]],
        ))
    }

    async fn close(&self) -> Result<()> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

/// A cloneable in-memory writer for capturing printed output.
#[derive(Debug, Clone, Default)]
pub struct SharedBuffer(Arc<Mutex<Vec<u8>>>);

impl SharedBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything written so far, as text.
    pub fn contents(&self) -> String {
        self.0
            .lock()
            .map(|bytes| String::from_utf8_lossy(&bytes).into_owned())
            .unwrap_or_default()
    }
}

impl Write for SharedBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0
            .lock()
            .map_err(|_| io::Error::other("buffer lock poisoned"))?
            .extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// A runner that executes nothing and records which queries it was given.
pub struct MockRunner {
    target: Target,
    rows: HashMap<String, u64>,
    failing: HashSet<String>,
    close_error: Option<RunnerError>,
    calls: Mutex<Vec<String>>,
    closed: AtomicBool,
}

impl MockRunner {
    pub fn new(target: Target) -> Self {
        Self {
            target,
            rows: HashMap::new(),
            failing: HashSet::new(),
            close_error: None,
            calls: Mutex::new(Vec::new()),
            closed: AtomicBool::new(false),
        }
    }

    /// Sets the affected-row count reported for the query named `name`.
    pub fn with_rows(mut self, name: &str, rows: u64) -> Self {
        self.rows.insert(name.to_string(), rows);
        self
    }

    /// Makes the query named `name` fail.
    pub fn failing(mut self, name: &str) -> Self {
        self.failing.insert(name.to_string());
        self
    }

    /// Makes `close` fail with `error`.
    pub fn failing_close(mut self, error: RunnerError) -> Self {
        self.close_error = Some(error);
        self
    }

    /// Names of the queries run so far, in order.
    pub fn calls(&self) -> Vec<String> {
        self.calls
            .lock()
            .map(|calls| calls.clone())
            .unwrap_or_default()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl QueryRunner for MockRunner {
    fn target(&self) -> &Target {
        &self.target
    }

    async fn run_query(
        &self,
        query: ReadyQuery,
        dry_run: bool,
        _capture_output: bool,
    ) -> QueryStatus {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(query.name.clone());
        }

        if dry_run {
            return QueryStatus::success(query, 0);
        }

        if self.failing.contains(&query.name) {
            let error = RunnerError::query(format!("Mock failure for: {}", query.name));
            return QueryStatus::failure(query, 0, error);
        }

        let rows = self.rows.get(&query.name).copied().unwrap_or(0);
        QueryStatus::success(query, rows)
    }

    async fn close(&self) -> Result<()> {
        self.closed.store(true, Ordering::SeqCst);
        match &self.close_error {
            Some(error) => Err(error.clone()),
            None => Ok(()),
        }
    }
}

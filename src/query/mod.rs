//! Queries and their execution results.
//!
//! A [`ReadyQuery`] is a resolved SQL script plus where it came from; running
//! it against a target always yields exactly one [`QueryStatus`].

pub mod resolve;
mod split;

pub use resolve::{resolve_steps, PlannedQuery, ReadyStep};
pub use split::split_statements;

use crate::error::RunnerError;

/// A resolved SQL script, ready to run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadyQuery {
    /// Query name from the playbook.
    pub name: String,

    /// SQL body; may hold several `;`-separated statements.
    pub script: String,

    /// Origin of the script, for reporting.
    pub path: String,
}

impl ReadyQuery {
    /// Creates a new ready query.
    pub fn new(
        name: impl Into<String>,
        script: impl Into<String>,
        path: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            script: script.into(),
            path: path.into(),
        }
    }
}

/// Outcome of running one [`ReadyQuery`] against one target.
///
/// `rows_affected` is only meaningful when `error` is `None`; when a split
/// script fails part-way it holds the total of the statements that ran.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryStatus {
    pub query: ReadyQuery,
    pub path: String,
    pub rows_affected: u64,
    pub error: Option<RunnerError>,
}

impl QueryStatus {
    /// A successful status.
    pub fn success(query: ReadyQuery, rows_affected: u64) -> Self {
        let path = query.path.clone();
        Self {
            query,
            path,
            rows_affected,
            error: None,
        }
    }

    /// A failed status carrying whatever was affected before the failure.
    pub fn failure(query: ReadyQuery, rows_affected: u64, error: RunnerError) -> Self {
        let path = query.path.clone();
        Self {
            query,
            path,
            rows_affected,
            error: Some(error),
        }
    }

    /// Builds a status from an execution outcome.
    pub fn from_result(query: ReadyQuery, result: crate::error::Result<u64>) -> Self {
        match result {
            Ok(rows) => Self::success(query, rows),
            Err(e) => Self::failure(query, 0, e),
        }
    }

    /// Returns true if the query ran without error.
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

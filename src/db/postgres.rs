//! Postgres and Redshift target implementation.
//!
//! Provides the `PostgresTarget` struct that implements the `QueryRunner` trait
//! for Postgres-wire-protocol databases using sqlx. Scripts are sent whole over
//! the simple-query protocol, which accepts any number of `;`-separated
//! statements in one round trip.

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use futures::TryStreamExt;
use sqlx::postgres::{PgConnectOptions, PgPool, PgPoolOptions, PgSslMode};
use sqlx::{Either, Executor};
use tracing::{debug, info};

use crate::config::{Target, TargetKind};
use crate::db::{QueryRunner, ResultRow};
use crate::error::{Result, RunnerError};
use crate::query::{QueryStatus, ReadyQuery};

/// How long to wait for a connection before giving up.
const DIAL_TIMEOUT: Duration = Duration::from_secs(10);

/// How long a single script may run; warehouse loads can take hours.
const READ_TIMEOUT: Duration = Duration::from_secs(8 * 60 * 60);

/// Maximum pooled connections per target.
const MAX_CONNECTIONS: u32 = 10;

/// Sets the server-side keep-alive idle interval for the session.
///
/// Server side only; sqlx offers no client socket keep-alive.
const ENABLE_KEEPALIVE: &str = "SET tcp_keepalives_idle = 60";

/// Postgres/Redshift target.
#[derive(Debug)]
pub struct PostgresTarget {
    target: Target,
    pool: PgPool,
}

impl PostgresTarget {
    /// Creates a runner with a lazily connecting pool.
    ///
    /// No connection is opened here; an unreachable server is reported by the
    /// first query that needs it.
    pub fn connect(target: Target) -> Result<Self> {
        let options = connect_options(&target)?;

        let mut pool_options = PgPoolOptions::new()
            .max_connections(MAX_CONNECTIONS)
            .acquire_timeout(DIAL_TIMEOUT);

        if let Some(setting) = keepalive_setting(target.kind) {
            pool_options = pool_options.after_connect(move |conn, _meta| {
                Box::pin(async move {
                    conn.execute(setting).await?;
                    Ok(())
                })
            });
        }

        let pool = pool_options.connect_lazy_with(options);
        debug!("Created connection pool for {}", target.display_string());

        Ok(Self { target, pool })
    }

    /// Runs the script as a command and returns the combined affected count.
    async fn exec(&self, script: &str) -> Result<u64> {
        with_read_timeout(async {
            sqlx::raw_sql(script)
                .execute(&self.pool)
                .await
                .map(|done| done.rows_affected())
                .map_err(|e| self.map_error(e))
        })
        .await
    }

    /// Runs the script, scanning any returned rows, and logs what came back.
    async fn capture(&self, script: &str) -> Result<u64> {
        let mut results = ResultRow::new();
        results.init();

        let outcome = with_read_timeout(self.collect_output(script, &mut results)).await;

        info!("{}", output_summary(&results));
        outcome
    }

    async fn collect_output(&self, script: &str, results: &mut ResultRow) -> Result<u64> {
        let mut affected = 0;
        let mut stream = sqlx::raw_sql(script).fetch_many(&self.pool);

        while let Some(item) = stream.try_next().await.map_err(|e| self.map_error(e))? {
            match item {
                Either::Left(done) => affected += done.rows_affected(),
                Either::Right(row) => results.scan_row(&row)?,
            }
        }

        Ok(affected)
    }

    /// Maps sqlx errors, separating unreachable servers from failing statements.
    fn map_error(&self, error: sqlx::Error) -> RunnerError {
        let is_connection = match &error {
            sqlx::Error::Io(_) | sqlx::Error::Tls(_) | sqlx::Error::PoolTimedOut => true,
            // SQLSTATE class 28: invalid authorization
            sqlx::Error::Database(db) => db.code().is_some_and(|code| code.starts_with("28")),
            _ => false,
        };

        if is_connection {
            map_connection_error(error, &self.target)
        } else {
            RunnerError::query(format_query_error(error))
        }
    }
}

#[async_trait]
impl QueryRunner for PostgresTarget {
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

        debug!("Running {} against {}", query.path, self.target.name);
        let result = if capture_output {
            self.capture(&query.script).await
        } else {
            self.exec(&query.script).await
        };

        QueryStatus::from_result(query, result)
    }

    async fn close(&self) -> Result<()> {
        self.pool.close().await;
        Ok(())
    }
}

/// Keep-alive statement run on every new connection, when the backend has one.
///
/// sqlx exposes no socket-level keep-alive, so the server side of the socket
/// is configured instead. Redshift rejects `tcp_keepalives_*` and has no session-level
/// equivalent; its connections rely on the host's TCP defaults.
fn keepalive_setting(kind: TargetKind) -> Option<&'static str> {
    match kind {
        TargetKind::Postgres => Some(ENABLE_KEEPALIVE),
        TargetKind::Redshift | TargetKind::Snowflake => None,
    }
}

/// Log line for the values a captured script returned.
fn output_summary(results: &ResultRow) -> String {
    if results.is_empty() {
        "QUERY OUTPUT: No output returned.".to_string()
    } else {
        format!("QUERY OUTPUT: {}", results.joined())
    }
}

/// Builds connect options from the target's fields.
pub(crate) fn connect_options(target: &Target) -> Result<PgConnectOptions> {
    let host = target.host.as_deref().ok_or_else(|| {
        RunnerError::config(format!("Target '{}' has no host", target.name))
    })?;

    // Require encrypts without verifying the certificate, so self-signed
    // cluster certificates are accepted.
    let ssl_mode = if target.ssl {
        PgSslMode::Require
    } else {
        PgSslMode::Disable
    };

    let mut options = PgConnectOptions::new()
        .host(host)
        .port(target.port())
        .ssl_mode(ssl_mode);

    if let Some(user) = &target.username {
        options = options.username(user);
    }
    if let Some(password) = &target.password {
        options = options.password(password);
    }
    if let Some(database) = &target.database {
        options = options.database(database);
    }

    Ok(options)
}

async fn with_read_timeout<T>(fut: impl Future<Output = Result<T>>) -> Result<T> {
    tokio::time::timeout(READ_TIMEOUT, fut)
        .await
        .map_err(|_| {
            RunnerError::query(format!(
                "Query timed out after {} hours",
                READ_TIMEOUT.as_secs() / 3600
            ))
        })?
}

/// Maps sqlx connection errors to user-friendly messages.
fn map_connection_error(error: sqlx::Error, target: &Target) -> RunnerError {
    let host = target.host.as_deref().unwrap_or("localhost");
    let port = target.port();
    let user = target.username.as_deref().unwrap_or("unknown");

    let error_str = error.to_string().to_lowercase();

    if error_str.contains("connection refused") {
        RunnerError::connection(format!(
            "Cannot connect to {host}:{port}. Check that the server is running."
        ))
    } else if error_str.contains("password authentication failed") {
        RunnerError::connection(format!(
            "Authentication failed for user '{user}'. Check your credentials."
        ))
    } else if matches!(error, sqlx::Error::PoolTimedOut) || error_str.contains("timed out") {
        RunnerError::connection(format!(
            "Connection to {host}:{port} timed out after {}s.",
            DIAL_TIMEOUT.as_secs()
        ))
    } else {
        RunnerError::connection(error.to_string())
    }
}

/// Formats a query error with the server's detail and hint, if any.
fn format_query_error(error: sqlx::Error) -> String {
    let Some(db_error) = error.as_database_error() else {
        return error.to_string();
    };

    let mut result = String::from("ERROR: ");
    result.push_str(db_error.message());

    if let Some(pg_error) = db_error.try_downcast_ref::<sqlx::postgres::PgDatabaseError>() {
        if let Some(detail) = pg_error.detail() {
            result.push_str("\n  DETAIL: ");
            result.push_str(detail);
        }

        if let Some(hint) = pg_error.hint() {
            result.push_str("\n  HINT: ");
            result.push_str(hint);
        }
    }

    result
}

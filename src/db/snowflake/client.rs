//! Snowflake session client.
//!
//! Speaks the session protocol the official drivers use: a password login
//! that yields a session token, then one JSON request per statement.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::RwLock;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex as AsyncMutex;
use tracing::{debug, warn};
use url::Url;
use uuid::Uuid;

use super::StatementSession;
use crate::config::Target;
use crate::db::{ColumnInfo, RowSet};
use crate::error::{Result, RunnerError};

/// Login timeout; the backend's own default is 60 seconds.
pub const LOGIN_TIMEOUT: Duration = Duration::from_secs(5);

/// Client identifier sent at login.
const CLIENT_APP_ID: &str = "sql-runner";

/// Response codes meaning the statement is still running.
const QUERY_IN_PROGRESS: &str = "333333";
const QUERY_IN_PROGRESS_ASYNC: &str = "333334";

/// Response code for an expired session token.
const SESSION_EXPIRED: &str = "390112";

const ACCEPT_SNOWFLAKE: &str = "application/snowflake";

/// Statement type ids for DML (insert, update, delete, merge, multi-insert).
const DML_STATEMENT_TYPES: std::ops::Range<i64> = 0x3000..0x4000;

/// Region served from the account-only hostname.
const DEFAULT_REGION: &str = "us-west-2";

/// Builds the account URL for a target.
///
/// An explicit `host` wins; otherwise the host is derived from the account
/// and region.
pub fn account_url(target: &Target) -> Result<Url> {
    let host = match (&target.host, &target.account) {
        (Some(host), _) => host.clone(),
        (None, Some(account)) => match target.region.as_deref() {
            None | Some("") | Some(DEFAULT_REGION) => format!("{account}.snowflakecomputing.com"),
            Some(region) => format!("{account}.{region}.snowflakecomputing.com"),
        },
        (None, None) => {
            return Err(RunnerError::connection(format!(
                "Target '{}' has neither an account nor a host",
                target.name
            )))
        }
    };

    let mut url = Url::parse(&format!("https://{host}/"))
        .map_err(|e| RunnerError::connection(format!("Invalid Snowflake host '{host}': {e}")))?;
    if target.port.is_some() {
        url.set_port(Some(target.port()))
            .map_err(|_| RunnerError::connection(format!("Invalid port for '{host}'")))?;
    }

    Ok(url)
}

/// Standard response envelope.
#[derive(Debug, Deserialize)]
struct Envelope<T> {
    data: Option<T>,
    #[serde(default)]
    success: bool,
    message: Option<String>,
    code: Option<String>,
}

impl<T> Envelope<T> {
    fn is_in_progress(&self) -> bool {
        matches!(
            self.code.as_deref(),
            Some(QUERY_IN_PROGRESS) | Some(QUERY_IN_PROGRESS_ASYNC)
        )
    }

    fn is_session_expired(&self) -> bool {
        self.code.as_deref() == Some(SESSION_EXPIRED)
    }

    fn error_text(&self) -> String {
        let code = self.code.as_deref().unwrap_or("unknown");
        let message = self.message.as_deref().unwrap_or("no message");
        format!("{code}: {message}")
    }
}

#[derive(Debug, Serialize)]
struct LoginRequest<'a> {
    data: LoginRequestData<'a>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
struct LoginRequestData<'a> {
    client_app_id: &'a str,
    client_app_version: &'a str,
    account_name: &'a str,
    login_name: &'a str,
    password: &'a str,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LoginResponseData {
    token: Option<String>,
    master_token: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct RenewRequest<'a> {
    old_session_token: &'a str,
    request_type: &'a str,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RenewResponseData {
    session_token: Option<String>,
    master_token: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct QueryRequest<'a> {
    sql_text: &'a str,
    async_exec: bool,
    sequence_id: u64,
    is_internal: bool,
}

/// Result data of one statement.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct QueryData {
    #[serde(default)]
    rowtype: Vec<RowType>,
    #[serde(default)]
    rowset: Vec<Vec<Option<String>>>,
    #[serde(default)]
    rowset_base64: Option<String>,
    #[serde(default)]
    chunks: Vec<Chunk>,
    #[serde(default)]
    chunk_headers: HashMap<String, String>,
    statement_type_id: Option<i64>,
    get_result_url: Option<String>,
    query_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RowType {
    name: String,
    #[serde(rename = "type")]
    data_type: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Chunk {
    url: String,
    row_count: usize,
}

impl QueryData {
    /// Affected rows for DML statements: the sum of the first row's counts.
    fn rows_affected(&self) -> u64 {
        let is_dml = self
            .statement_type_id
            .is_some_and(|id| DML_STATEMENT_TYPES.contains(&id));
        if !is_dml {
            return 0;
        }

        self.rowset
            .first()
            .map(|row| {
                row.iter()
                    .flatten()
                    .filter_map(|count| count.parse::<u64>().ok())
                    .sum()
            })
            .unwrap_or(0)
    }
}

/// Parses a result chunk body, which holds rows without the outer brackets.
fn parse_chunk(body: &str) -> Result<Vec<Vec<Option<String>>>> {
    serde_json::from_str(&format!("[{body}]"))
        .map_err(|e| RunnerError::scan(format!("Malformed result chunk: {e}")))
}

/// Session and master tokens; the master token renews an expired session.
#[derive(Debug)]
struct Tokens {
    session: String,
    master: Option<String>,
}

/// Authenticated Snowflake session.
pub struct SnowflakeSession {
    client: Client,
    base_url: Url,
    tokens: RwLock<Tokens>,
    renewal: AsyncMutex<()>,
    sequence: AtomicU64,
}

impl SnowflakeSession {
    /// Logs in with the target's user and password.
    pub async fn login(target: &Target) -> Result<Self> {
        Self::login_at(account_url(target)?, target).await
    }

    /// Logs in against an explicit base URL.
    async fn login_at(base_url: Url, target: &Target) -> Result<Self> {
        let account = target.account.as_deref().ok_or_else(|| {
            RunnerError::connection(format!("Target '{}' has no account", target.name))
        })?;
        let user = target.username.as_deref().unwrap_or_default();
        let password = target.password.as_deref().unwrap_or_default();

        let client = Client::builder()
            .connect_timeout(LOGIN_TIMEOUT)
            .build()
            .map_err(|e| RunnerError::connection(format!("Failed to create HTTP client: {e}")))?;

        let mut url = join(&base_url, "session/v1/login-request")?;
        {
            let mut query = url.query_pairs_mut();
            query.append_pair("requestId", &Uuid::new_v4().to_string());
            if let Some(database) = &target.database {
                query.append_pair("databaseName", database);
            }
            if let Some(warehouse) = &target.warehouse {
                query.append_pair("warehouse", warehouse);
            }
        }

        let request = LoginRequest {
            data: LoginRequestData {
                client_app_id: CLIENT_APP_ID,
                client_app_version: env!("CARGO_PKG_VERSION"),
                account_name: account,
                login_name: user,
                password,
            },
        };

        debug!("Logging in to {} as '{}'", base_url, user);
        let response = client
            .post(url)
            .timeout(LOGIN_TIMEOUT)
            .json(&request)
            .send()
            .await
            .map_err(|e| RunnerError::connection(format!("Login to {base_url} failed: {e}")))?;

        let envelope: Envelope<LoginResponseData> = read_envelope(response)
            .await
            .map_err(|e| RunnerError::connection(format!("Login to {base_url} failed: {e}")))?;

        if !envelope.success {
            return Err(RunnerError::connection(format!(
                "Login to {base_url} rejected: {}",
                envelope.error_text()
            )));
        }

        let data = envelope
            .data
            .ok_or_else(|| RunnerError::connection("Login response carried no data"))?;
        let session = data
            .token
            .ok_or_else(|| RunnerError::connection("Login response carried no session token"))?;

        Ok(Self {
            client,
            base_url,
            tokens: RwLock::new(Tokens {
                session,
                master: data.master_token,
            }),
            renewal: AsyncMutex::new(()),
            sequence: AtomicU64::new(0),
        })
    }

    fn session_token(&self) -> Result<String> {
        self.tokens
            .read()
            .map(|tokens| tokens.session.clone())
            .map_err(|_| RunnerError::internal("Session token lock poisoned"))
    }

    /// Sends an authorized request, renewing the session once if it expired.
    async fn send<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<Envelope<T>> {
        let retry = request.try_clone();
        let sent = self.session_token()?;
        let envelope = self.send_once(request, &sent).await?;

        match retry {
            Some(retry) if envelope.is_session_expired() => {
                self.renew(&sent).await?;
                let current = self.session_token()?;
                self.send_once(retry, &current).await
            }
            _ => Ok(envelope),
        }
    }

    async fn send_once<T: DeserializeOwned>(
        &self,
        request: RequestBuilder,
        token: &str,
    ) -> Result<Envelope<T>> {
        let response = request
            .header("Authorization", format!("Snowflake Token=\"{token}\""))
            .header("Accept", ACCEPT_SNOWFLAKE)
            .send()
            .await
            .map_err(|e| RunnerError::query(format!("Request failed: {e}")))?;
        read_envelope(response).await
    }

    /// Exchanges the master token for a fresh session token.
    ///
    /// Renewals are serialized. If `expired` was already replaced by a
    /// concurrent renewal, the current token is kept.
    async fn renew(&self, expired: &str) -> Result<()> {
        let _renewing = self.renewal.lock().await;
        let (old_session, master) = {
            let tokens = self
                .tokens
                .read()
                .map_err(|_| RunnerError::internal("Session token lock poisoned"))?;
            (tokens.session.clone(), tokens.master.clone())
        };
        if old_session != expired {
            debug!("Session token already renewed");
            return Ok(());
        }
        let master = master.ok_or_else(|| {
            RunnerError::connection("Session expired and no master token is available")
        })?;

        let mut url = join(&self.base_url, "session/token-request")?;
        url.query_pairs_mut()
            .append_pair("requestId", &Uuid::new_v4().to_string());

        debug!("Session token expired, renewing");
        let response = self
            .client
            .post(url)
            .header("Authorization", format!("Snowflake Token=\"{master}\""))
            .header("Accept", ACCEPT_SNOWFLAKE)
            .json(&RenewRequest {
                old_session_token: &old_session,
                request_type: "RENEW",
            })
            .send()
            .await
            .map_err(|e| RunnerError::connection(format!("Session renewal failed: {e}")))?;

        let envelope: Envelope<RenewResponseData> = read_envelope(response)
            .await
            .map_err(|e| RunnerError::connection(format!("Session renewal failed: {e}")))?;
        if !envelope.success {
            return Err(RunnerError::connection(format!(
                "Session renewal rejected: {}",
                envelope.error_text()
            )));
        }

        let data = envelope
            .data
            .ok_or_else(|| RunnerError::connection("Renewal response carried no data"))?;
        let session = data
            .session_token
            .ok_or_else(|| RunnerError::connection("Renewal response carried no session token"))?;

        let mut tokens = self
            .tokens
            .write()
            .map_err(|_| RunnerError::internal("Session token lock poisoned"))?;
        tokens.session = session;
        if let Some(master) = data.master_token {
            tokens.master = Some(master);
        }
        Ok(())
    }

    /// Submits one statement and waits for its result.
    async fn submit(&self, sql: &str) -> Result<QueryData> {
        let mut url = join(&self.base_url, "queries/v1/query-request")?;
        url.query_pairs_mut()
            .append_pair("requestId", &Uuid::new_v4().to_string());

        let request = QueryRequest {
            sql_text: sql,
            async_exec: false,
            sequence_id: self.sequence.fetch_add(1, Ordering::Relaxed) + 1,
            is_internal: false,
        };

        let mut envelope: Envelope<QueryData> =
            self.send(self.client.post(url).json(&request)).await?;

        while envelope.is_in_progress() {
            let result_url = envelope
                .data
                .as_ref()
                .and_then(|d| d.get_result_url.as_deref())
                .ok_or_else(|| RunnerError::query("Statement still running but no result URL"))?;
            debug!("Statement still running, polling {}", result_url);

            let url = join(&self.base_url, result_url)?;
            envelope = self.send(self.client.get(url)).await?;
        }

        if !envelope.success {
            return Err(RunnerError::query(envelope.error_text()));
        }

        let data = envelope
            .data
            .ok_or_else(|| RunnerError::query("Response carried no result data"))?;
        if let Some(id) = &data.query_id {
            debug!("Statement finished as query {}", id);
        }
        Ok(data)
    }

    /// Downloads the remaining result chunks in order.
    async fn fetch_chunks(&self, data: &QueryData) -> Result<Vec<Vec<Option<String>>>> {
        let mut rows = Vec::new();

        for chunk in &data.chunks {
            let mut request = self.client.get(&chunk.url);
            for (name, value) in &data.chunk_headers {
                request = request.header(name, value);
            }

            let body = request
                .send()
                .await
                .and_then(|r| r.error_for_status())
                .map_err(|e| RunnerError::scan(format!("Failed to fetch result chunk: {e}")))?
                .text()
                .await
                .map_err(|e| RunnerError::scan(format!("Failed to read result chunk: {e}")))?;

            let chunk_rows = parse_chunk(&body)?;
            if chunk_rows.len() != chunk.row_count {
                warn!(
                    "Result chunk had {} rows, expected {}",
                    chunk_rows.len(),
                    chunk.row_count
                );
            }
            rows.extend(chunk_rows);
        }

        Ok(rows)
    }
}

#[async_trait]
impl StatementSession for SnowflakeSession {
    async fn execute(&self, sql: &str) -> Result<u64> {
        let data = self.submit(sql).await?;
        Ok(data.rows_affected())
    }

    async fn query(&self, sql: &str) -> Result<RowSet> {
        let mut data = self.submit(sql).await?;

        if data.rowset_base64.as_deref().is_some_and(|s| !s.is_empty()) {
            return Err(RunnerError::scan("Arrow result format is not supported"));
        }

        let columns = data
            .rowtype
            .iter()
            .map(|col| ColumnInfo::new(&col.name, &col.data_type))
            .collect();

        let mut rows = std::mem::take(&mut data.rowset);
        rows.extend(self.fetch_chunks(&data).await?);

        Ok(RowSet::with_data(columns, rows))
    }

    async fn close(&self) -> Result<()> {
        let mut url = join(&self.base_url, "session")?;
        url.query_pairs_mut().append_pair("delete", "true");

        let envelope: Envelope<serde_json::Value> = self.send(self.client.post(url)).await?;
        if !envelope.success {
            return Err(RunnerError::connection(format!(
                "Failed to close session: {}",
                envelope.error_text()
            )));
        }
        Ok(())
    }
}

fn join(base: &Url, path: &str) -> Result<Url> {
    base.join(path)
        .map_err(|e| RunnerError::internal(format!("Invalid request path '{path}': {e}")))
}

async fn read_envelope<T: DeserializeOwned>(response: reqwest::Response) -> Result<Envelope<T>> {
    let status = response.status();
    let body = response
        .text()
        .await
        .map_err(|e| RunnerError::query(format!("Failed to read response: {e}")))?;

    if !status.is_success() {
        return Err(RunnerError::query(format!(
            "Snowflake returned HTTP {status}: {body}"
        )));
    }

    serde_json::from_str(&body)
        .map_err(|e| RunnerError::query(format!("Failed to parse response: {e}")))
}

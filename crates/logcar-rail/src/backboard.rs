//! GraphQL client for the platform's log-search endpoint

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, warn};

use crate::deadline::Deadline;
use crate::error::{RailError, Result};

/// Default public endpoint of the log-search GraphQL API
pub const DEFAULT_BACKBOARD_URL: &str = "https://backboard.railway.app/graphql/v2";

/// A log-search request: a platform filter expression and a fetch limit.
#[derive(Debug, Clone)]
pub struct LogQuery {
    /// Platform filter expression (`@key:"value"` terms joined with `AND`)
    pub filter: String,
    /// Maximum log entries to return
    pub limit: usize,
    /// Optional lower bound on entry time
    pub start_date: Option<DateTime<Utc>>,
    /// Optional upper bound on entry time
    pub end_date: Option<DateTime<Utc>>,
}

impl LogQuery {
    /// A query with just a filter and limit.
    pub fn new(filter: String, limit: usize) -> Self {
        Self {
            filter,
            limit,
            start_date: None,
            end_date: None,
        }
    }
}

/// One log entry returned by the search backend.
///
/// The backend's attribute list is flattened into a map on ingest, and each
/// attribute value (a JSON-encoded string on the wire) is decoded; values
/// that do not parse stay plain strings.
#[derive(Debug, Clone)]
pub struct LogEntry {
    /// Platform receipt timestamp, the durable ordering axis
    pub timestamp: DateTime<Utc>,
    /// Entry severity as reported by the platform
    pub severity: String,
    /// Raw log message
    pub message: String,
    /// Flattened, JSON-decoded attributes
    pub attributes: HashMap<String, Value>,
}

/// The log-search seam the read path consumes.
///
/// Production uses [`BackboardClient`]; tests substitute an in-memory index.
#[async_trait]
pub trait LogSearch: Send + Sync {
    /// Runs one filtered query against the log index.
    async fn fetch(&self, query: &LogQuery) -> Result<Vec<LogEntry>>;
}

/// Which platform scope searches run against.
#[derive(Debug, Clone)]
pub enum SearchScope {
    /// Search the logs of one deployment
    Deployment(String),
    /// Search the logs of a whole environment
    Environment(String),
}

/// Configuration for [`BackboardClient`].
#[derive(Debug, Clone)]
pub struct BackboardConfig {
    /// GraphQL endpoint URL
    pub url: String,
    /// Deployment or environment scope
    pub scope: SearchScope,
    /// Per-request deadline
    pub request_timeout: Duration,
    /// Retries for transient backend failures
    pub max_retries: u32,
    /// Initial retry backoff, doubled per attempt
    pub initial_backoff: Duration,
}

impl BackboardConfig {
    /// Defaults for the given scope against the public endpoint.
    pub fn new(scope: SearchScope) -> Self {
        Self {
            url: DEFAULT_BACKBOARD_URL.to_string(),
            scope,
            request_timeout: Duration::from_secs(30),
            max_retries: 2,
            initial_backoff: Duration::from_millis(100),
        }
    }
}

const DEPLOYMENT_LOGS_QUERY: &str = "query DeploymentLogs($deploymentId: String!, $filter: String, $limit: Int, $startDate: DateTime, $endDate: DateTime) { logs: deploymentLogs(deploymentId: $deploymentId, filter: $filter, limit: $limit, startDate: $startDate, endDate: $endDate) { timestamp message severity attributes { key value } } }";

const ENVIRONMENT_LOGS_QUERY: &str = "query EnvironmentLogs($environmentId: String!, $filter: String, $limit: Int, $startDate: DateTime, $endDate: DateTime) { logs: environmentLogs(environmentId: $environmentId, filter: $filter, limit: $limit, startDate: $startDate, endDate: $endDate) { timestamp message severity attributes { key value } } }";

/// GraphQL-over-HTTP client for the platform log-search API.
pub struct BackboardClient {
    http: reqwest::Client,
    config: BackboardConfig,
}

impl BackboardClient {
    /// Builds a client; fails if the HTTP client cannot be constructed.
    pub fn new(config: BackboardConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| RailError::SearchBackendError(e.to_string()))?;
        Ok(Self { http, config })
    }

    fn document(&self) -> &'static str {
        match self.config.scope {
            SearchScope::Deployment(_) => DEPLOYMENT_LOGS_QUERY,
            SearchScope::Environment(_) => ENVIRONMENT_LOGS_QUERY,
        }
    }

    fn variables(&self, query: &LogQuery) -> Value {
        let mut vars = json!({
            "filter": query.filter,
            "limit": query.limit,
            "startDate": query.start_date.map(|d| d.to_rfc3339()),
            "endDate": query.end_date.map(|d| d.to_rfc3339()),
        });
        match &self.config.scope {
            SearchScope::Deployment(id) => vars["deploymentId"] = json!(id),
            SearchScope::Environment(id) => vars["environmentId"] = json!(id),
        }
        vars
    }

    async fn fetch_once(&self, query: &LogQuery) -> Result<Vec<LogEntry>> {
        let body = json!({
            "query": self.document(),
            "variables": self.variables(query),
        });
        let response = self
            .http
            .post(&self.config.url)
            .json(&body)
            .send()
            .await
            .map_err(map_reqwest)?;
        let status = response.status();
        if !status.is_success() {
            return Err(RailError::SearchBackendError(format!(
                "backend returned HTTP {status}"
            )));
        }
        let payload: GqlResponse = response.json().await.map_err(map_reqwest)?;
        if let Some(errors) = payload.errors {
            if !errors.is_empty() {
                let messages: Vec<String> = errors.into_iter().map(|e| e.message).collect();
                return Err(RailError::SearchBackendError(messages.join("; ")));
            }
        }
        let data = payload
            .data
            .ok_or_else(|| RailError::SearchBackendError("response carried no data".to_string()))?;
        let mut entries = Vec::with_capacity(data.logs.len());
        for log in data.logs {
            match parse_entry(log) {
                Some(entry) => entries.push(entry),
                None => warn!("log entry with unparsable timestamp skipped"),
            }
        }
        Ok(entries)
    }
}

#[async_trait]
impl LogSearch for BackboardClient {
    async fn fetch(&self, query: &LogQuery) -> Result<Vec<LogEntry>> {
        let deadline = Deadline::after(self.config.request_timeout);
        let mut backoff = self.config.initial_backoff;
        let mut attempt = 0u32;
        loop {
            deadline.check()?;
            match self.fetch_once(query).await {
                Ok(entries) => {
                    debug!(
                        filter = %query.filter,
                        limit = query.limit,
                        entries = entries.len(),
                        "log search fetch"
                    );
                    return Ok(entries);
                }
                Err(RailError::SearchBackendError(msg)) if attempt < self.config.max_retries => {
                    attempt += 1;
                    warn!(error = %msg, attempt, "transient backend failure, retrying");
                    tokio::time::sleep(backoff).await;
                    backoff *= 2;
                }
                Err(err) => return Err(err),
            }
        }
    }
}

fn map_reqwest(err: reqwest::Error) -> RailError {
    if err.is_timeout() {
        RailError::Timeout
    } else {
        RailError::SearchBackendError(err.to_string())
    }
}

fn parse_entry(log: GqlLog) -> Option<LogEntry> {
    let timestamp = DateTime::parse_from_rfc3339(&log.timestamp)
        .ok()?
        .with_timezone(&Utc);
    let attributes = log
        .attributes
        .into_iter()
        .map(|attr| {
            let value =
                serde_json::from_str::<Value>(&attr.value).unwrap_or(Value::String(attr.value));
            (attr.key, value)
        })
        .collect();
    Some(LogEntry {
        timestamp,
        severity: log.severity.unwrap_or_default(),
        message: log.message.unwrap_or_default(),
        attributes,
    })
}

#[derive(Debug, Deserialize)]
struct GqlResponse {
    data: Option<GqlData>,
    errors: Option<Vec<GqlError>>,
}

#[derive(Debug, Deserialize)]
struct GqlData {
    logs: Vec<GqlLog>,
}

#[derive(Debug, Deserialize)]
struct GqlError {
    message: String,
}

#[derive(Debug, Deserialize)]
struct GqlLog {
    timestamp: String,
    severity: Option<String>,
    message: Option<String>,
    #[serde(default)]
    attributes: Vec<GqlAttr>,
}

#[derive(Debug, Deserialize)]
struct GqlAttr {
    key: String,
    value: String,
}

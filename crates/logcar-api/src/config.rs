//! Store configuration and its environment loader

use std::time::Duration;

use logcar_chunk::DEFAULT_MAX_CHUNK_LENGTH;
use logcar_rail::{SearchScope, DEFAULT_BACKBOARD_URL, DEFAULT_MAX_FRAGMENTS_PER_RECORD, DEFAULT_MAX_LOG_REQUEST_SIZE};
use serde::{Deserialize, Serialize};

use crate::error::{ApiError, Result};

/// Configuration for the whole store: chunking, encryption, search scope
/// and the HTTP surface.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Per-fragment maximum virtual length
    pub max_chunk_length: usize,
    /// Lower bound of the internal search fetch limit
    pub max_log_request_size: usize,
    /// Cap on fragments per write group
    pub max_fragments_per_record: usize,
    /// Encrypt every write with the process-wide key
    pub encryption_enabled: bool,
    /// Process-wide cipher input (64-hex raw key or passphrase)
    pub encryption_key: Option<String>,
    /// Deployment scope for log search
    pub deployment_id: Option<String>,
    /// Environment scope for log search, used when no deployment id is set
    pub environment_id: Option<String>,
    /// Log-search GraphQL endpoint
    pub backboard_url: String,
    /// Per-request search deadline in seconds
    pub request_timeout_secs: u64,
    /// Bind address of the HTTP surface
    pub http_bind: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            max_chunk_length: DEFAULT_MAX_CHUNK_LENGTH,
            max_log_request_size: DEFAULT_MAX_LOG_REQUEST_SIZE,
            max_fragments_per_record: DEFAULT_MAX_FRAGMENTS_PER_RECORD,
            encryption_enabled: false,
            encryption_key: None,
            deployment_id: None,
            environment_id: None,
            backboard_url: DEFAULT_BACKBOARD_URL.to_string(),
            request_timeout_secs: 30,
            http_bind: "0.0.0.0:3000".to_string(),
        }
    }
}

impl StoreConfig {
    /// Loads configuration from `LOGCAR_*` environment variables, falling
    /// back to the platform's own `RAILWAY_*` scope variables.
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();
        if let Some(v) = env_var("LOGCAR_MAX_CHUNK_LENGTH") {
            config.max_chunk_length = parse_num("LOGCAR_MAX_CHUNK_LENGTH", &v)?;
        }
        if let Some(v) = env_var("LOGCAR_MAX_LOG_REQUEST_SIZE") {
            config.max_log_request_size = parse_num("LOGCAR_MAX_LOG_REQUEST_SIZE", &v)?;
        }
        if let Some(v) = env_var("LOGCAR_MAX_FRAGMENTS_PER_RECORD") {
            config.max_fragments_per_record = parse_num("LOGCAR_MAX_FRAGMENTS_PER_RECORD", &v)?;
        }
        if let Some(v) = env_var("LOGCAR_ENCRYPTION_ENABLED") {
            config.encryption_enabled = parse_bool("LOGCAR_ENCRYPTION_ENABLED", &v)?;
        }
        config.encryption_key = env_var("LOGCAR_ENCRYPTION_KEY");
        config.deployment_id =
            env_var("LOGCAR_DEPLOYMENT_ID").or_else(|| env_var("RAILWAY_DEPLOYMENT_ID"));
        config.environment_id =
            env_var("LOGCAR_ENVIRONMENT_ID").or_else(|| env_var("RAILWAY_ENVIRONMENT_ID"));
        if let Some(v) = env_var("LOGCAR_BACKBOARD_URL") {
            config.backboard_url = v;
        }
        if let Some(v) = env_var("LOGCAR_REQUEST_TIMEOUT_SECS") {
            config.request_timeout_secs = parse_num("LOGCAR_REQUEST_TIMEOUT_SECS", &v)?;
        }
        if let Some(v) = env_var("LOGCAR_HTTP_BIND") {
            config.http_bind = v;
        }
        config.validate()?;
        Ok(config)
    }

    /// Cross-field validation.
    pub fn validate(&self) -> Result<()> {
        if self.max_chunk_length == 0 {
            return Err(ApiError::Config(
                "max_chunk_length must be at least 1".to_string(),
            ));
        }
        if self.max_fragments_per_record == 0 {
            return Err(ApiError::Config(
                "max_fragments_per_record must be at least 1".to_string(),
            ));
        }
        if self.encryption_enabled && self.encryption_key.is_none() {
            return Err(ApiError::Config(
                "encryption is enabled but no encryption_key is configured".to_string(),
            ));
        }
        Ok(())
    }

    /// The search scope, deployment winning over environment.
    pub fn scope(&self) -> Option<SearchScope> {
        if let Some(id) = &self.deployment_id {
            Some(SearchScope::Deployment(id.clone()))
        } else {
            self.environment_id
                .as_ref()
                .map(|id| SearchScope::Environment(id.clone()))
        }
    }

    /// Per-request search deadline.
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

fn env_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}

fn parse_num<T: std::str::FromStr>(name: &str, raw: &str) -> Result<T> {
    raw.parse()
        .map_err(|_| ApiError::Config(format!("{name} must be a number, got {raw:?}")))
}

fn parse_bool(name: &str, raw: &str) -> Result<bool> {
    match raw {
        "true" | "1" | "yes" => Ok(true),
        "false" | "0" | "no" => Ok(false),
        _ => Err(ApiError::Config(format!(
            "{name} must be a boolean, got {raw:?}"
        ))),
    }
}

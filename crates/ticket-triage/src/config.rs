//! Configuration surface for the reporter binary.
//!
//! Everything here is validated before a pass ever starts; the engine
//! consumes the result as already-valid and never re-checks it. Credentials
//! can come from the TOML file or from the environment, with the
//! environment winning.

use crate::engine::{TriagePolicy, Verbosity};
use crate::tracker::Credentials;
use reqwest::Url;
use serde::Deserialize;
use std::path::Path;
use thiserror::Error;

/// Environment override for `tracker.username`.
pub const USERNAME_ENV: &str = "TICKET_TRIAGE_USERNAME";
/// Environment override for `tracker.password`.
pub const PASSWORD_ENV: &str = "TICKET_TRIAGE_PASSWORD";

/// Issue type used when the file does not set one ("1" = Bug in a stock
/// JIRA instance).
const DEFAULT_ISSUE_TYPE_ID: &str = "1";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("{field} must not be empty")]
    MissingField { field: &'static str },
    #[error("tracker.server_address is not a valid URL: {0}")]
    InvalidUrl(String),
}

#[derive(Debug, Clone, Deserialize)]
struct RawConfig {
    tracker: RawTracker,
    triage: RawTriage,
}

#[derive(Debug, Clone, Deserialize)]
struct RawTracker {
    server_address: String,
    #[serde(default)]
    username: String,
    #[serde(default)]
    password: String,
    #[serde(default = "default_issue_type_id")]
    issue_type_id: String,
}

fn default_issue_type_id() -> String {
    DEFAULT_ISSUE_TYPE_ID.to_string()
}

#[derive(Debug, Clone, Deserialize)]
struct RawTriage {
    project_key: String,
    #[serde(default)]
    create_all: bool,
    #[serde(default)]
    debug: bool,
    #[serde(default)]
    verbose_debug: bool,
}

/// Validated configuration: tracker coordinates plus the pass policy.
#[derive(Debug, Clone)]
pub struct ReporterConfig {
    /// Tracker base URL, normalized to a trailing slash.
    pub server_address: String,
    pub credentials: Credentials,
    pub issue_type_id: String,
    pub policy: TriagePolicy,
}

impl ReporterConfig {
    /// Load from a TOML file, apply environment overrides, and validate.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let raw: RawConfig = toml::from_str(&raw)?;
        Self::from_raw(raw)
    }

    fn from_raw(raw: RawConfig) -> Result<Self, ConfigError> {
        if raw.triage.project_key.is_empty() {
            return Err(ConfigError::MissingField {
                field: "triage.project_key",
            });
        }
        if raw.tracker.server_address.is_empty() {
            return Err(ConfigError::MissingField {
                field: "tracker.server_address",
            });
        }

        let server_address = normalize_endpoint(&raw.tracker.server_address);
        Url::parse(&server_address).map_err(|e| ConfigError::InvalidUrl(e.to_string()))?;

        let username = std::env::var(USERNAME_ENV).unwrap_or(raw.tracker.username);
        let password = std::env::var(PASSWORD_ENV).unwrap_or(raw.tracker.password);

        Ok(Self {
            server_address,
            credentials: Credentials { username, password },
            issue_type_id: raw.tracker.issue_type_id,
            policy: TriagePolicy {
                project_key: raw.triage.project_key,
                create_all: raw.triage.create_all,
                verbosity: Verbosity::from_flags(raw.triage.debug, raw.triage.verbose_debug),
            },
        })
    }
}

/// Every consumer joins relative resources onto the endpoint, so it must
/// always carry a trailing slash.
pub fn normalize_endpoint(address: &str) -> String {
    if address.ends_with('/') {
        address.to_string()
    } else {
        format!("{address}/")
    }
}

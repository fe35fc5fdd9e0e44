//! Load test configuration types

use crate::error::{LoadTestError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Placeholder substituted with an item id in the detail endpoint
pub const ID_PLACEHOLDER: &str = "{id}";

/// Complete load test configuration
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct LoadTestConfig {
    /// Target service and credentials
    #[serde(default)]
    pub target: TargetConfig,

    /// Duration and concurrency of the run
    #[serde(default)]
    pub run: RunConfig,

    /// Per-user flow shape
    #[serde(default)]
    pub flow: FlowConfig,
}

/// Target service settings
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TargetConfig {
    /// Base URL of the service, e.g. `https://ctf.example.org`
    #[serde(default)]
    pub base_url: String,

    /// API access token sent as `Authorization: Token <token>`
    #[serde(default)]
    pub api_token: String,

    /// Pre-captured storage-state JSON
    #[serde(default = "default_session_bundle")]
    pub session_bundle: PathBuf,

    /// Skip TLS certificate validation
    #[serde(default = "default_accept_invalid_certs")]
    pub accept_invalid_certs: bool,

    /// Per-call timeout in seconds
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

fn default_session_bundle() -> PathBuf {
    PathBuf::from("auth.json")
}

fn default_accept_invalid_certs() -> bool {
    true
}

fn default_request_timeout_secs() -> u64 {
    30
}

impl Default for TargetConfig {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            api_token: String::new(),
            session_bundle: default_session_bundle(),
            accept_invalid_certs: default_accept_invalid_certs(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

/// Run shape
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RunConfig {
    /// Total run duration in seconds
    #[serde(default = "default_duration_secs")]
    pub duration_secs: u64,

    /// Number of flows kept in flight
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,

    /// Pause before a finished flow's slot is reused, in milliseconds
    #[serde(default = "default_relaunch_delay_ms")]
    pub relaunch_delay_ms: u64,
}

fn default_duration_secs() -> u64 {
    300
}

fn default_concurrency() -> usize {
    50
}

fn default_relaunch_delay_ms() -> u64 {
    50
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            duration_secs: default_duration_secs(),
            concurrency: default_concurrency(),
            relaunch_delay_ms: default_relaunch_delay_ms(),
        }
    }
}

/// Flow shape: which endpoints are called and how they are paced
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FlowConfig {
    /// Think time between call groups in milliseconds; detail calls use half
    #[serde(default = "default_pacing_ms")]
    pub pacing_ms: u64,

    /// Number of listed items to fetch details for
    #[serde(default = "default_detail_count")]
    pub detail_count: usize,

    #[serde(default = "default_listing_endpoint")]
    pub listing_endpoint: String,

    /// Detail endpoint template containing `{id}`
    #[serde(default = "default_detail_endpoint")]
    pub detail_endpoint: String,

    /// Endpoints called in order after the detail calls
    #[serde(default = "default_auxiliary_endpoints")]
    pub auxiliary_endpoints: Vec<String>,

    /// Accepted status codes per endpoint (or detail template); any 2xx otherwise
    #[serde(default)]
    pub expected_status: HashMap<String, Vec<u16>>,
}

fn default_pacing_ms() -> u64 {
    500
}

fn default_detail_count() -> usize {
    3
}

fn default_listing_endpoint() -> String {
    "/api/v1/challenges".to_string()
}

fn default_detail_endpoint() -> String {
    "/api/v1/challenges/{id}".to_string()
}

fn default_auxiliary_endpoints() -> Vec<String> {
    vec![
        "/api/v1/scoreboard".to_string(),
        "/api/v1/users".to_string(),
        "/api/v1/notifications".to_string(),
    ]
}

impl Default for FlowConfig {
    fn default() -> Self {
        Self {
            pacing_ms: default_pacing_ms(),
            detail_count: default_detail_count(),
            listing_endpoint: default_listing_endpoint(),
            detail_endpoint: default_detail_endpoint(),
            auxiliary_endpoints: default_auxiliary_endpoints(),
            expected_status: HashMap::new(),
        }
    }
}

impl FlowConfig {
    pub fn pacing(&self) -> Duration {
        Duration::from_millis(self.pacing_ms)
    }

    pub fn detail_pacing(&self) -> Duration {
        Duration::from_millis(self.pacing_ms / 2)
    }

    /// Concrete detail path for an item id
    pub fn detail_path(&self, id: &str) -> String {
        self.detail_endpoint.replace(ID_PLACEHOLDER, id)
    }

    /// Whether `status` counts as success for `endpoint`
    pub fn accepts_status(&self, endpoint: &str, status: u16) -> bool {
        match self.expected_status.get(endpoint) {
            Some(codes) => codes.contains(&status),
            None => (200..300).contains(&status),
        }
    }
}

impl LoadTestConfig {
    /// Parse a TOML configuration file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            LoadTestError::config(format!("cannot read {}: {}", path.display(), e))
        })?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| LoadTestError::config(e.to_string()))
    }

    pub fn duration(&self) -> Duration {
        Duration::from_secs(self.run.duration_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.target.request_timeout_secs)
    }

    pub fn relaunch_delay(&self) -> Duration {
        Duration::from_millis(self.run.relaunch_delay_ms)
    }

    /// Reject settings the run cannot start with
    pub fn validate(&self) -> Result<()> {
        let base_url = self.target.base_url.trim();
        if base_url.is_empty() {
            return Err(LoadTestError::config(
                "missing base URL (set CTFD_BASE_URL or --base-url)",
            ));
        }
        if !(base_url.starts_with("http://") || base_url.starts_with("https://")) {
            return Err(LoadTestError::config(format!(
                "base URL must start with http:// or https://, got {}",
                base_url
            )));
        }
        if self.target.api_token.trim().is_empty() {
            return Err(LoadTestError::config(
                "missing API token (set CTFD_API_ACCESS_TOKEN or --api-token)",
            ));
        }
        if self.target.request_timeout_secs == 0 {
            return Err(LoadTestError::config("request timeout must be positive"));
        }
        if self.run.concurrency == 0 {
            return Err(LoadTestError::config("concurrency must be at least 1"));
        }
        if self.flow.detail_count > 0 && !self.flow.detail_endpoint.contains(ID_PLACEHOLDER) {
            return Err(LoadTestError::config(format!(
                "detail endpoint {} has no {} placeholder",
                self.flow.detail_endpoint, ID_PLACEHOLDER
            )));
        }
        Ok(())
    }
}

//! Per-call and per-flow result records

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Instant;

/// Outcome status of a single API call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CallStatus {
    /// HTTP response received with this status code
    Http(u16),
    /// Timeout or connection failure; no status code available
    NetworkError,
}

impl CallStatus {
    /// HTTP status code, if a response was received
    pub fn code(&self) -> Option<u16> {
        match self {
            Self::Http(code) => Some(*code),
            Self::NetworkError => None,
        }
    }

    pub fn is_network_error(&self) -> bool {
        matches!(self, Self::NetworkError)
    }
}

impl fmt::Display for CallStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Http(code) => write!(f, "{}", code),
            Self::NetworkError => write!(f, "NETWORK_ERROR"),
        }
    }
}

/// Timing and outcome of one API call
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallMetric {
    pub endpoint: String,
    pub method: String,
    pub duration_ms: u64,
    pub status: CallStatus,
    pub ok: bool,
    is_error: bool,
}

impl CallMetric {
    /// Build a metric; `is_error` is derived from `ok` and `status`
    pub fn new(
        endpoint: impl Into<String>,
        method: impl Into<String>,
        duration_ms: u64,
        status: CallStatus,
        ok: bool,
    ) -> Self {
        let is_error = !ok
            || status.is_network_error()
            || status.code().map_or(false, |code| code >= 400);

        Self {
            endpoint: endpoint.into(),
            method: method.into(),
            duration_ms,
            status,
            ok,
            is_error,
        }
    }

    /// Record a transport failure
    pub fn network_error(
        endpoint: impl Into<String>,
        method: impl Into<String>,
        duration_ms: u64,
    ) -> Self {
        Self::new(endpoint, method, duration_ms, CallStatus::NetworkError, false)
    }

    pub fn is_error(&self) -> bool {
        self.is_error
    }
}

/// Result of one simulated user flow
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlowResult {
    pub user_id: u64,
    pub success: bool,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub total_duration_ms: u64,
    pub call_metrics: Vec<CallMetric>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl FlowResult {
    /// Result for a flow that ran its call sequence; success iff no call errored
    pub fn completed(user_id: u64, clock: FlowClock, call_metrics: Vec<CallMetric>) -> Self {
        let (start_time, end_time, total_duration_ms) = clock.finish();
        let success = !call_metrics.iter().any(CallMetric::is_error);

        Self {
            user_id,
            success,
            start_time,
            end_time,
            total_duration_ms,
            call_metrics,
            error: None,
        }
    }

    /// Result for a flow that failed before or outside its call sequence
    pub fn failed(user_id: u64, clock: FlowClock, error: impl Into<String>) -> Self {
        let (start_time, end_time, total_duration_ms) = clock.finish();

        Self {
            user_id,
            success: false,
            start_time,
            end_time,
            total_duration_ms,
            call_metrics: Vec::new(),
            error: Some(error.into()),
        }
    }

    /// Calls recorded as errors
    pub fn failed_calls(&self) -> impl Iterator<Item = &CallMetric> {
        self.call_metrics.iter().filter(|m| m.is_error())
    }
}

/// Wall-clock start stamp paired with a monotonic timer
///
/// The end time is always `start + elapsed`, so a flow's duration cannot go
/// negative when the system clock is adjusted mid-run.
#[derive(Debug, Clone, Copy)]
pub struct FlowClock {
    started_at: DateTime<Utc>,
    started: Instant,
}

impl FlowClock {
    pub fn start() -> Self {
        Self {
            started_at: Utc::now(),
            started: Instant::now(),
        }
    }

    fn finish(self) -> (DateTime<Utc>, DateTime<Utc>, u64) {
        let elapsed = self.started.elapsed();
        let elapsed_ms = elapsed.as_millis() as u64;
        let end_time = self.started_at + chrono::Duration::milliseconds(elapsed_ms as i64);
        (self.started_at, end_time, elapsed_ms)
    }
}

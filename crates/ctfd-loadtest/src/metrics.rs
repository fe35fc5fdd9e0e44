//! Reduction of flow results into run statistics

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::types::{CallMetric, FlowResult};

/// Percentiles reported for individual call durations
pub const REPORTED_PERCENTILES: [f64; 3] = [90.0, 95.0, 99.0];

/// Value at percentile `p` (0-100) of `samples`, linearly interpolated.
///
/// Sorts a copy ascending and takes fractional rank `p/100 * (n-1)`; a
/// whole rank returns that order statistic, otherwise the two neighbours are
/// blended by the fractional part. Empty input yields `0.0`.
pub fn percentile(samples: &[f64], p: f64) -> f64 {
    if samples.is_empty() {
        return 0.0;
    }

    let mut sorted = samples.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));

    let rank = (p.clamp(0.0, 100.0) / 100.0) * (sorted.len() - 1) as f64;
    let lower = rank.floor() as usize;
    let upper = rank.ceil() as usize;
    let fraction = rank - rank.floor();

    if lower == upper {
        sorted[lower]
    } else {
        sorted[lower] + (sorted[upper] - sorted[lower]) * fraction
    }
}

/// One percentile row of the report
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PercentileValue {
    pub percentile: f64,
    pub value_ms: f64,
}

/// A flow that did not succeed, with its failing calls
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FailedFlow {
    pub user_id: u64,
    pub error: Option<String>,
    pub failed_calls: Vec<CallMetric>,
}

/// Aggregate statistics for one run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoadTestSummary {
    pub attempted: usize,
    pub succeeded: usize,
    pub failed: usize,

    /// Mean flow duration over successful flows
    pub mean_flow_duration_ms: Option<f64>,
    /// Mean call duration over calls made by successful flows
    pub mean_call_duration_ms: Option<f64>,
    /// Percentiles over calls made by successful flows
    pub call_percentiles: Vec<PercentileValue>,

    pub total_calls: usize,
    pub successful_calls: usize,
    pub error_calls: usize,
    /// Percentage of calls across all flows that returned an expected status
    pub call_success_rate: Option<f64>,

    pub failed_flows: Vec<FailedFlow>,
    pub elapsed_secs: f64,
}

impl LoadTestSummary {
    /// Reduce a run's results; empty input yields zeros and `None` rates
    pub fn from_results(results: &[FlowResult], elapsed: Duration) -> Self {
        let successful: Vec<&FlowResult> = results.iter().filter(|r| r.success).collect();

        let call_durations: Vec<f64> = successful
            .iter()
            .flat_map(|r| r.call_metrics.iter())
            .map(|m| m.duration_ms as f64)
            .collect();

        let flow_durations: Vec<f64> = successful
            .iter()
            .map(|r| r.total_duration_ms as f64)
            .collect();

        let total_calls: usize = results.iter().map(|r| r.call_metrics.len()).sum();
        let error_calls: usize = results.iter().map(|r| r.failed_calls().count()).sum();
        let successful_calls: usize = results
            .iter()
            .flat_map(|r| r.call_metrics.iter())
            .filter(|m| m.ok)
            .count();

        let call_success_rate = if total_calls > 0 {
            Some(successful_calls as f64 / total_calls as f64 * 100.0)
        } else {
            None
        };

        let call_percentiles = REPORTED_PERCENTILES
            .iter()
            .map(|&p| PercentileValue {
                percentile: p,
                value_ms: percentile(&call_durations, p),
            })
            .collect();

        let failed_flows = results
            .iter()
            .filter(|r| !r.success)
            .map(|r| FailedFlow {
                user_id: r.user_id,
                error: r.error.clone(),
                failed_calls: r.failed_calls().cloned().collect(),
            })
            .collect();

        Self {
            attempted: results.len(),
            succeeded: successful.len(),
            failed: results.len() - successful.len(),
            mean_flow_duration_ms: mean(&flow_durations),
            mean_call_duration_ms: mean(&call_durations),
            call_percentiles,
            total_calls,
            successful_calls,
            error_calls,
            call_success_rate,
            failed_flows,
            elapsed_secs: elapsed.as_secs_f64(),
        }
    }

    /// Value for a reported percentile, if it was computed
    pub fn percentile_ms(&self, p: f64) -> Option<f64> {
        self.call_percentiles
            .iter()
            .find(|v| v.percentile == p)
            .map(|v| v.value_ms)
    }
}

fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        None
    } else {
        Some(values.iter().sum::<f64>() / values.len() as f64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{CallStatus, FlowClock};

    fn call(endpoint: &str, duration_ms: u64, status: CallStatus) -> CallMetric {
        let ok = matches!(status, CallStatus::Http(code) if code < 300);
        CallMetric::new(endpoint, "GET", duration_ms, status, ok)
    }

    fn flow(user_id: u64, duration_ms: u64, calls: Vec<CallMetric>) -> FlowResult {
        let mut result = FlowResult::completed(user_id, FlowClock::start(), calls);
        result.total_duration_ms = duration_ms;
        result
    }

    #[test]
    fn test_percentile_interpolates() {
        assert_eq!(percentile(&[10.0, 20.0, 30.0, 40.0], 50.0), 25.0);
        assert_eq!(percentile(&[40.0, 10.0, 30.0, 20.0], 50.0), 25.0);
        assert_eq!(percentile(&[10.0, 20.0, 30.0], 50.0), 20.0);
        assert_eq!(percentile(&[5.0], 99.0), 5.0);
        assert_eq!(percentile(&[10.0, 20.0, 30.0, 40.0], 100.0), 40.0);
        assert_eq!(percentile(&[10.0, 20.0, 30.0, 40.0], 0.0), 10.0);

        let samples: Vec<f64> = (1..=100).map(f64::from).collect();
        // rank 0.9 * 99 = 89.1 -> 90 + 0.1 * (91 - 90)
        assert!((percentile(&samples, 90.0) - 90.1).abs() < 1e-9);
    }

    #[test]
    fn test_percentile_empty_is_zero() {
        for p in [0.0, 50.0, 90.0, 95.0, 99.0, 100.0] {
            assert_eq!(percentile(&[], p), 0.0);
        }
    }

    #[test]
    fn test_empty_results() {
        let summary = LoadTestSummary::from_results(&[], Duration::from_secs(1));
        assert_eq!(summary.attempted, 0);
        assert_eq!(summary.succeeded, 0);
        assert_eq!(summary.failed, 0);
        assert!(summary.mean_flow_duration_ms.is_none());
        assert!(summary.mean_call_duration_ms.is_none());
        assert!(summary.call_success_rate.is_none());
        assert_eq!(summary.percentile_ms(99.0), Some(0.0));
    }

    #[test]
    fn test_summary_counts_and_means() {
        let results = vec![
            flow(
                1,
                1000,
                vec![
                    call("/api/v1/challenges", 10, CallStatus::Http(200)),
                    call("/api/v1/users", 30, CallStatus::Http(200)),
                ],
            ),
            flow(2, 2000, vec![call("/api/v1/challenges", 20, CallStatus::Http(200))]),
            flow(
                3,
                5000,
                vec![
                    call("/api/v1/challenges", 500, CallStatus::Http(200)),
                    call("/api/v1/scoreboard", 900, CallStatus::Http(502)),
                    CallMetric::network_error("/api/v1/users", "GET", 30_000),
                ],
            ),
            FlowResult::failed(4, FlowClock::start(), "session bundle missing"),
        ];

        let summary = LoadTestSummary::from_results(&results, Duration::from_secs(10));

        assert_eq!(summary.attempted, 4);
        assert_eq!(summary.succeeded, 2);
        assert_eq!(summary.failed, 2);
        assert_eq!(summary.mean_flow_duration_ms, Some(1500.0));
        // Only calls from successful flows: 10, 30, 20
        assert_eq!(summary.mean_call_duration_ms, Some(20.0));
        assert_eq!(summary.percentile_ms(90.0), Some(28.0));

        assert_eq!(summary.total_calls, 6);
        assert_eq!(summary.error_calls, 2);
        assert_eq!(summary.successful_calls, 4);
        let rate = summary.call_success_rate.unwrap();
        assert!((rate - 66.666).abs() < 0.01);

        assert_eq!(summary.failed_flows.len(), 2);
        let flow3 = &summary.failed_flows[0];
        assert_eq!(flow3.user_id, 3);
        assert!(flow3.error.is_none());
        assert_eq!(flow3.failed_calls.len(), 2);
        let flow4 = &summary.failed_flows[1];
        assert_eq!(flow4.error.as_deref(), Some("session bundle missing"));
        assert!(flow4.failed_calls.is_empty());
    }

    #[test]
    fn test_accepted_error_status_counts_as_successful_call() {
        // A 404 the endpoint is configured to expect is ok but still an error
        let not_found = CallMetric::new("/api/v1/users", "GET", 15, CallStatus::Http(404), true);
        assert!(not_found.is_error());

        let results = vec![flow(
            1,
            100,
            vec![
                not_found,
                call("/api/v1/challenges", 10, CallStatus::Http(200)),
            ],
        )];
        let summary = LoadTestSummary::from_results(&results, Duration::from_secs(1));

        assert_eq!(summary.total_calls, 2);
        assert_eq!(summary.successful_calls, 2);
        assert_eq!(summary.error_calls, 1);
        assert_eq!(summary.call_success_rate, Some(100.0));
    }
}

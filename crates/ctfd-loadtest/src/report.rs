//! Human-readable run report

use std::fmt::Write;

use crate::metrics::LoadTestSummary;

const RULE: &str = "═══════════════════════════════════════════════════════════════";
const THIN_RULE: &str = "───────────────────────────────────────────────────────────────";

fn ms_or_na(value: Option<f64>) -> String {
    value
        .map(|v| format!("{:.2}ms", v))
        .unwrap_or_else(|| "N/A".to_string())
}

impl LoadTestSummary {
    /// Render the report as text
    pub fn render(&self) -> String {
        let mut out = String::new();
        // Writing to a String cannot fail
        let _ = self.write_report(&mut out);
        out
    }

    /// Print the report to stdout
    pub fn print_report(&self) {
        println!("{}", self.render());
    }

    fn write_report(&self, out: &mut String) -> std::fmt::Result {
        writeln!(out, "{}", RULE)?;
        writeln!(out, "                  CTFD API LOAD TEST SUMMARY")?;
        writeln!(out, "{}", RULE)?;
        writeln!(out, "  Run Duration:            {:>10.2}s", self.elapsed_secs)?;
        writeln!(out, "  Flows Attempted:         {:>10}", self.attempted)?;
        writeln!(out, "  Flows Succeeded:         {:>10}", self.succeeded)?;
        writeln!(out, "  Flows Failed:            {:>10}", self.failed)?;

        writeln!(out, "{}", THIN_RULE)?;
        writeln!(out, "  SUCCESSFUL FLOWS")?;
        writeln!(
            out,
            "  Mean Flow Duration:      {:>10}",
            ms_or_na(self.mean_flow_duration_ms)
        )?;
        writeln!(
            out,
            "  Mean Call Duration:      {:>10}",
            ms_or_na(self.mean_call_duration_ms)
        )?;
        writeln!(out)?;
        writeln!(out, "  {:>10} {:>14}", "Percentile", "Call (ms)")?;
        for row in &self.call_percentiles {
            writeln!(
                out,
                "  {:>10} {:>14.2}",
                format!("P{}", row.percentile),
                row.value_ms
            )?;
        }

        writeln!(out, "{}", THIN_RULE)?;
        writeln!(out, "  API CALLS (ALL FLOWS)")?;
        writeln!(out, "  Attempted:               {:>10}", self.total_calls)?;
        writeln!(out, "  Successful:              {:>10}", self.successful_calls)?;
        writeln!(out, "  Errors (4xx/5xx/network):{:>10}", self.error_calls)?;
        let rate = self
            .call_success_rate
            .map(|r| format!("{:.2}%", r))
            .unwrap_or_else(|| "N/A".to_string());
        writeln!(out, "  Success Rate:            {:>10}", rate)?;

        if !self.failed_flows.is_empty() {
            writeln!(out, "{}", THIN_RULE)?;
            writeln!(out, "  FAILED FLOWS")?;
            for flow in &self.failed_flows {
                let reason = flow.error.as_deref().unwrap_or("internal API errors");
                writeln!(out, "  User {}: failed due to: {}", flow.user_id, reason)?;
                for call in &flow.failed_calls {
                    writeln!(
                        out,
                        "    - {} {} Status: {} Duration: {}ms",
                        call.method, call.endpoint, call.status, call.duration_ms
                    )?;
                }
            }
        }

        writeln!(out, "{}", RULE)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crate::metrics::LoadTestSummary;
    use crate::types::{CallMetric, CallStatus, FlowClock, FlowResult};
    use std::time::Duration;

    #[test]
    fn test_render_empty_run() {
        let text = LoadTestSummary::from_results(&[], Duration::from_millis(1500)).render();

        assert!(text.contains("Flows Attempted:                  0"));
        assert!(text.contains("Mean Flow Duration:             N/A"));
        assert!(text.contains("Success Rate:                   N/A"));
        assert!(text.contains("P90"));
        assert!(text.contains("P99"));
        assert!(!text.contains("FAILED FLOWS"));
    }

    #[test]
    fn test_render_lists_every_failed_call() {
        let calls = vec![
            CallMetric::new("/api/v1/challenges", "GET", 12, CallStatus::Http(200), true),
            CallMetric::new("/api/v1/scoreboard", "GET", 340, CallStatus::Http(503), false),
            CallMetric::network_error("/api/v1/users", "GET", 30_000),
        ];
        let results = vec![
            FlowResult::completed(7, FlowClock::start(), calls),
            FlowResult::failed(8, FlowClock::start(), "Failed to load session bundle"),
        ];

        let text = LoadTestSummary::from_results(&results, Duration::from_secs(2)).render();

        assert!(text.contains("User 7: failed due to: internal API errors"));
        assert!(text.contains("- GET /api/v1/scoreboard Status: 503 Duration: 340ms"));
        assert!(text.contains("- GET /api/v1/users Status: NETWORK_ERROR Duration: 30000ms"));
        assert!(!text.contains("/api/v1/challenges Status"));
        assert!(text.contains("User 8: failed due to: Failed to load session bundle"));
        assert!(text.contains("33.33%"));
    }
}

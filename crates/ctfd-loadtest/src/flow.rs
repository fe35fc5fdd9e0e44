//! Simulated user flow
//!
//! One flow walks the API the way a player browsing the platform would:
//! list challenges, open a few at random, then look at the scoreboard, the
//! user list and notifications, with think time between steps.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde_json::Value;
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

use crate::config::{FlowConfig, LoadTestConfig};
use crate::controller::UserFlow;
use crate::error::{LoadTestError, Result};
use crate::sampling::sample_without_replacement;
use crate::transport::{ApiResponse, ApiSession, SessionProvider};
use crate::types::{CallMetric, CallStatus, FlowClock, FlowResult};

const METHOD_GET: &str = "GET";
const BODY_SNIPPET_CHARS: usize = 200;

/// Runs the challenge-browsing flow for one user at a time
pub struct FlowSimulator {
    sessions: Arc<dyn SessionProvider>,
    flow: FlowConfig,
    request_timeout: Duration,
}

impl FlowSimulator {
    pub fn new(
        sessions: Arc<dyn SessionProvider>,
        flow: FlowConfig,
        request_timeout: Duration,
    ) -> Self {
        Self {
            sessions,
            flow,
            request_timeout,
        }
    }

    pub fn from_config(sessions: Arc<dyn SessionProvider>, config: &LoadTestConfig) -> Self {
        Self::new(sessions, config.flow.clone(), config.request_timeout())
    }

    /// Run the full call sequence for `user_id`
    pub async fn execute(&self, user_id: u64) -> FlowResult {
        let clock = FlowClock::start();
        info!("[User {}] Starting API flow with pre-authenticated session", user_id);

        let session = match self.sessions.open(user_id).await {
            Ok(session) => session,
            Err(e) => {
                error!("[User {}] Session setup failed: {}", user_id, e);
                return FlowResult::failed(user_id, clock, e.to_string());
            }
        };

        let mut calls =
            CallRecorder::new(user_id, session.as_ref(), &self.flow, self.request_timeout);
        let pacing = self.flow.pacing();

        let listing = calls
            .get(&self.flow.listing_endpoint, &self.flow.listing_endpoint)
            .await;
        sleep(pacing).await;

        let items = listing.as_ref().map(listed_items).unwrap_or_default();
        if items.is_empty() {
            warn!(
                "[User {}] No items listed by {}; skipping detail calls",
                user_id, self.flow.listing_endpoint
            );
        } else {
            let chosen: Vec<Value> = {
                let mut rng = StdRng::from_entropy();
                sample_without_replacement(&items, self.flow.detail_count, &mut rng)
                    .into_iter()
                    .cloned()
                    .collect()
            };

            for item in chosen {
                match item_id(&item) {
                    Some(id) => {
                        let path = self.flow.detail_path(&id);
                        calls.get(&path, &self.flow.detail_endpoint).await;
                    }
                    None => warn!(
                        "[User {}] Skipped detail call for item without id: {}",
                        user_id, item
                    ),
                }
                sleep(self.flow.detail_pacing()).await;
            }
        }
        sleep(pacing).await;

        for endpoint in &self.flow.auxiliary_endpoints {
            calls.get(endpoint, endpoint).await;
            sleep(pacing).await;
        }

        let metrics = calls.finish();
        let result = FlowResult::completed(user_id, clock, metrics);
        info!(
            "[User {}] API flow completed in {}ms. Success: {}",
            user_id, result.total_duration_ms, result.success
        );
        result
    }
}

#[async_trait]
impl UserFlow for FlowSimulator {
    async fn execute(&self, user_id: u64) -> Result<FlowResult> {
        Ok(FlowSimulator::execute(self, user_id).await)
    }
}

/// Times each call and keeps its metric, whatever the outcome
struct CallRecorder<'a> {
    user_id: u64,
    session: &'a dyn ApiSession,
    flow: &'a FlowConfig,
    timeout: Duration,
    metrics: Vec<CallMetric>,
}

impl<'a> CallRecorder<'a> {
    fn new(
        user_id: u64,
        session: &'a dyn ApiSession,
        flow: &'a FlowConfig,
        timeout: Duration,
    ) -> Self {
        Self {
            user_id,
            session,
            flow,
            timeout,
            metrics: Vec::new(),
        }
    }

    /// GET `endpoint`; `expect_key` selects the expected-status entry
    async fn get(&mut self, endpoint: &str, expect_key: &str) -> Option<ApiResponse> {
        let started = Instant::now();
        let outcome = self.session.get(endpoint, self.timeout).await;
        let duration_ms = started.elapsed().as_millis() as u64;

        match outcome {
            Ok(response) => {
                let ok = self.flow.accepts_status(expect_key, response.status);
                debug!(
                    "[User {}] API {} {} finished with status {} in {}ms",
                    self.user_id, METHOD_GET, endpoint, response.status, duration_ms
                );
                if !ok {
                    let e = LoadTestError::Protocol {
                        endpoint: endpoint.to_string(),
                        status: response.status,
                    };
                    warn!(
                        "[User {}] API {} {} failed: {}, body: {}",
                        self.user_id,
                        METHOD_GET,
                        endpoint,
                        e,
                        response.body.snippet(BODY_SNIPPET_CHARS)
                    );
                }
                self.metrics.push(CallMetric::new(
                    endpoint,
                    METHOD_GET,
                    duration_ms,
                    CallStatus::Http(response.status),
                    ok,
                ));
                Some(response)
            }
            Err(e) => {
                warn!(
                    "[User {}] API {} {} failed with network error: {}",
                    self.user_id, METHOD_GET, endpoint, e
                );
                self.metrics
                    .push(CallMetric::network_error(endpoint, METHOD_GET, duration_ms));
                None
            }
        }
    }

    fn finish(self) -> Vec<CallMetric> {
        self.metrics
    }
}

/// Items in the listing body's `data` array
fn listed_items(response: &ApiResponse) -> Vec<Value> {
    response
        .body
        .as_json()
        .and_then(|body| body.get("data"))
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default()
}

/// Item id rendered for a URL path
fn item_id(item: &Value) -> Option<String> {
    match item.get("id")? {
        Value::Number(n) => Some(n.to_string()),
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        _ => None,
    }
}

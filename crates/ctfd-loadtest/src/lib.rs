//! # CTFd API Load Testing
//!
//! Sustained concurrent load against a CTFd-style API with latency and error
//! statistics.
//!
//! ## Components
//!
//! - **Admission Controller** ([`controller`]): keeps a target number of user
//!   flows in flight until a deadline, then drains
//! - **Flow Simulator** ([`flow`]): one user's paced sequence of API calls
//! - **Metrics Aggregator** ([`metrics`], [`report`]): counts, means,
//!   interpolated percentiles and the text report
//! - **Session / Transport** ([`session`], [`transport`]): pre-captured
//!   storage state and the HTTP client each flow uses
//!
//! ## Usage
//!
//! ```bash
//! export CTFD_BASE_URL=https://ctf.example.org
//! export CTFD_API_ACCESS_TOKEN=ctfd_...
//! cargo run --package ctfd-loadtest -- --duration 300 --concurrency 50 --session-bundle auth.json
//! ```

pub mod config;
pub mod controller;
pub mod error;
pub mod flow;
pub mod metrics;
pub mod report;
pub mod sampling;
pub mod session;
pub mod transport;
pub mod types;

pub use config::{FlowConfig, LoadTestConfig, RunConfig, TargetConfig};
pub use controller::{AdmissionController, FlowFn, RunState, UserFlow};
pub use error::{LoadTestError, Result, TransportError};
pub use flow::FlowSimulator;
pub use metrics::{percentile, FailedFlow, LoadTestSummary, PercentileValue};
pub use sampling::sample_without_replacement;
pub use session::{SessionBundle, SessionCookie};
pub use transport::{
    ApiResponse, ApiSession, HttpSession, HttpSessionProvider, ResponseBody, SessionProvider,
};
pub use types::{CallMetric, CallStatus, FlowClock, FlowResult};

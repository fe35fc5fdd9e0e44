//! # CTFd API Load Test CLI
//!
//! Runs simulated user flows against a CTFd instance for a fixed duration
//! and prints a latency/error summary.
//!
//! ## Usage
//!
//! ```bash
//! # Five minutes at 50 concurrent users, credentials from the environment
//! CTFD_BASE_URL=https://ctf.example.org CTFD_API_ACCESS_TOKEN=ctfd_... \
//!     ctfd-loadtest --duration 300 --concurrency 50
//!
//! # Settings from a file, overridden on the command line
//! ctfd-loadtest --config loadtest.toml --concurrency 10 --json
//! ```

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use clap::Parser;
use ctfd_loadtest::*;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "ctfd-loadtest")]
#[command(version)]
#[command(about = "Duration-bounded API load test for CTFd", long_about = None)]
struct Cli {
    /// TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Target base URL
    #[arg(long, env = "CTFD_BASE_URL")]
    base_url: Option<String>,

    /// API access token
    #[arg(long, env = "CTFD_API_ACCESS_TOKEN", hide_env_values = true)]
    api_token: Option<String>,

    /// Pre-captured session bundle (storage-state JSON)
    #[arg(long, env = "CTFD_SESSION_BUNDLE")]
    session_bundle: Option<PathBuf>,

    /// Test duration in seconds
    #[arg(short, long)]
    duration: Option<u64>,

    /// Concurrent user flows
    #[arg(short = 'n', long)]
    concurrency: Option<usize>,

    /// Think time between call groups in milliseconds
    #[arg(long)]
    pacing_ms: Option<u64>,

    /// Challenge details fetched per flow
    #[arg(long)]
    detail_count: Option<usize>,

    /// Per-call timeout in seconds
    #[arg(long)]
    timeout: Option<u64>,

    /// Delay before a finished flow's slot is reused, in milliseconds
    #[arg(long)]
    relaunch_delay_ms: Option<u64>,

    /// Verify TLS certificates instead of accepting any
    #[arg(long)]
    strict_tls: bool,

    /// Print the summary as JSON instead of the text report
    #[arg(long)]
    json: bool,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,
}

impl Cli {
    /// Defaults, then the config file, then environment and flags
    fn load_config(&self) -> Result<LoadTestConfig> {
        let mut config = match &self.config {
            Some(path) => LoadTestConfig::from_file(path)?,
            None => LoadTestConfig::default(),
        };

        if let Some(base_url) = &self.base_url {
            config.target.base_url = base_url.clone();
        }
        if let Some(api_token) = &self.api_token {
            config.target.api_token = api_token.clone();
        }
        if let Some(bundle) = &self.session_bundle {
            config.target.session_bundle = bundle.clone();
        }
        if let Some(timeout) = self.timeout {
            config.target.request_timeout_secs = timeout;
        }
        if self.strict_tls {
            config.target.accept_invalid_certs = false;
        }
        if let Some(duration) = self.duration {
            config.run.duration_secs = duration;
        }
        if let Some(concurrency) = self.concurrency {
            config.run.concurrency = concurrency;
        }
        if let Some(delay) = self.relaunch_delay_ms {
            config.run.relaunch_delay_ms = delay;
        }
        if let Some(pacing) = self.pacing_ms {
            config.flow.pacing_ms = pacing;
        }
        if let Some(count) = self.detail_count {
            config.flow.detail_count = count;
        }

        config.validate()?;
        Ok(config)
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Logs go to stderr so the report on stdout stays clean
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if cli.verbose {
            EnvFilter::new("debug")
        } else {
            EnvFilter::new("info")
        }
    });

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();

    let config = match cli.load_config() {
        Ok(config) => config,
        Err(e) => {
            error!("{}", e);
            std::process::exit(exit_code(&e));
        }
    };

    if let Err(e) = run(config, cli.json).await {
        error!("Load test failed: {:#}", e);
        std::process::exit(1);
    }
}

/// 2 for errors that stop the run before it starts, 1 otherwise
fn exit_code(err: &LoadTestError) -> i32 {
    if err.is_fatal() {
        2
    } else {
        1
    }
}

async fn run(config: LoadTestConfig, json: bool) -> anyhow::Result<()> {
    if !config.target.session_bundle.exists() {
        warn!(
            "Session bundle {} not found; every flow will fail setup",
            config.target.session_bundle.display()
        );
    }

    info!(
        "Starting API load test against {} for {}s with {} concurrent users",
        config.target.base_url, config.run.duration_secs, config.run.concurrency
    );

    let sessions = Arc::new(HttpSessionProvider::new(config.target.clone()));
    let simulator = Arc::new(FlowSimulator::from_config(sessions, &config));
    let controller = AdmissionController::from_config(&config);

    let started = Instant::now();
    let results = controller.run(simulator).await;
    let elapsed = started.elapsed();
    info!(
        "API load test completed in {:.2} seconds",
        elapsed.as_secs_f64()
    );

    let summary = LoadTestSummary::from_results(&results, elapsed);
    if json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        summary.print_report();
    }

    Ok(())
}

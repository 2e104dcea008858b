use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, ValueEnum};
use tokio::io::BufReader;
use tokio::signal;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use windowgate::config::{LoggingConfig, WindowgateConfig};
use windowgate::replay::{replay, OutputFormat};
use windowgate::{FixedWindowLimiter, LockPolicy, MonotonicClock};

/// Reads one key per line from stdin and prints whether each request is admitted.
#[derive(Parser, Debug)]
#[command(name = "windowgate", version, about)]
struct Args {
    /// YAML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Maximum admitted requests per key per window
    #[arg(long)]
    max_requests: Option<u64>,

    /// Window length in milliseconds
    #[arg(long)]
    window_ms: Option<u64>,

    /// Locking policy
    #[arg(long, value_enum)]
    policy: Option<PolicyArg>,

    /// Decision output format
    #[arg(long, value_enum, default_value = "text")]
    format: FormatArg,

    /// Log as JSON lines
    #[arg(long)]
    json_logs: bool,
}

/// Command-line names for [`LockPolicy`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum PolicyArg {
    #[value(name = "coarse")]
    Coarse,
    #[value(name = "per_key")]
    PerKey,
}

impl From<PolicyArg> for LockPolicy {
    fn from(arg: PolicyArg) -> Self {
        match arg {
            PolicyArg::Coarse => LockPolicy::Coarse,
            PolicyArg::PerKey => LockPolicy::PerKey,
        }
    }
}

/// Command-line names for [`OutputFormat`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum FormatArg {
    Text,
    Json,
}

impl From<FormatArg> for OutputFormat {
    fn from(arg: FormatArg) -> Self {
        match arg {
            FormatArg::Text => OutputFormat::Text,
            FormatArg::Json => OutputFormat::Json,
        }
    }
}

impl Args {
    fn apply_to(&self, config: &mut WindowgateConfig) {
        if let Some(max) = self.max_requests {
            config.limiter.window_max_size = max;
        }
        if let Some(ms) = self.window_ms {
            config.limiter.window_length = ms;
            config.limiter.window_unit = windowgate::config::TimeUnit::Milliseconds;
        }
        if let Some(policy) = self.policy {
            config.limiter.policy = policy.into();
        }
        if self.json_logs {
            config.logging.json = true;
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => WindowgateConfig::from_file(path)?,
        None => WindowgateConfig::default(),
    };
    args.apply_to(&mut config);

    init_tracing(&config.logging);

    info!("Starting windowgate");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));
    debug!(config = ?config, "Configuration loaded");

    let limiter = Arc::new(FixedWindowLimiter::<String, _>::from_config(
        &config.limiter,
        MonotonicClock,
    )?);

    if let Some(max_idle) = config.limiter.idle_eviction() {
        spawn_eviction(Arc::clone(&limiter), max_idle);
    }

    let summary = replay(
        limiter.as_ref(),
        BufReader::new(tokio::io::stdin()),
        tokio::io::stdout(),
        args.format.into(),
        shutdown_signal(),
    )
    .await?;

    info!(
        admitted = summary.admitted,
        rejected = summary.rejected,
        keys = limiter.tracked_keys(),
        "windowgate stopped"
    );
    Ok(())
}

/// Install the log subscriber. `RUST_LOG` takes precedence over the configured filter.
fn init_tracing(logging: &LoggingConfig) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&logging.filter));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_thread_ids(true);

    if logging.json {
        builder.json().init();
    } else {
        builder.init();
    }
}

/// Periodically forget keys that have been idle for `max_idle`.
fn spawn_eviction(limiter: Arc<FixedWindowLimiter<String>>, max_idle: Duration) {
    let period = max_idle.max(Duration::from_secs(1));
    info!(max_idle = ?max_idle, "Idle key eviction enabled");

    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        // The first tick completes immediately.
        ticker.tick().await;
        loop {
            ticker.tick().await;
            limiter.evict_idle(max_idle);
        }
    });
}

/// Wait for a shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, initiating graceful shutdown");
        }
        _ = terminate => {
            info!("Received SIGTERM, initiating graceful shutdown");
        }
    }
}

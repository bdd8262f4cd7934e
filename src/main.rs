use std::sync::Arc;

use clap::Parser;
use serde::Serialize;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::signal;
use tokio_stream::wrappers::LinesStream;
use tokio_stream::StreamExt;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use slidegate::config::{SlidegateConfig, StorageBackend};
use slidegate::error::SlidegateError;
use slidegate::ratelimit::{Metadata, RateLimiter};
use slidegate::storage::{ClusterStore, MemoryStore, Storage};

/// Sliding window admission checks for identities read from stdin.
#[derive(Debug, Parser)]
#[command(name = "slidegate", version, about)]
struct Args {
    /// Path to a YAML configuration file
    #[arg(short, long)]
    config: Option<String>,

    /// Log level used when RUST_LOG is not set
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Log output format
    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

/// One line of output per identity checked.
#[derive(Debug, Serialize)]
struct Verdict<'a> {
    identity: &'a str,
    allowed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    metadata: Option<Metadata>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
    checked_at: String,
}

enum Backend {
    Memory(Arc<MemoryStore>),
    Cluster(Arc<ClusterStore>),
}

impl Backend {
    fn storage(&self) -> Arc<dyn Storage> {
        match self {
            Backend::Memory(store) => store.clone() as Arc<dyn Storage>,
            Backend::Cluster(store) => store.clone() as Arc<dyn Storage>,
        }
    }

    async fn close(self) -> anyhow::Result<()> {
        match self {
            Backend::Memory(store) => store.close(),
            Backend::Cluster(store) => match Arc::try_unwrap(store) {
                Ok(store) => store.shutdown().await?,
                Err(_) => warn!("Cluster store still referenced, skipping shutdown"),
            },
        }
        Ok(())
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_tracing(&args);

    info!("Starting Slidegate");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    let config = SlidegateConfig::load(args.config.as_deref())?;
    info!(
        max = config.limiter.max,
        window_secs = config.limiter.window_secs,
        backend = ?config.storage.backend,
        "Configuration loaded"
    );

    let backend = match config.storage.backend {
        StorageBackend::Memory => Backend::Memory(Arc::new(MemoryStore::with_gc_interval(
            config.storage.gc_interval(),
        ))),
        StorageBackend::Cluster => {
            let cluster_config = config
                .storage
                .cluster
                .to_cluster_config(config.storage.gc_interval());
            Backend::Cluster(Arc::new(ClusterStore::start(cluster_config).await?))
        }
    };

    let limiter = RateLimiter::from_settings(backend.storage(), &config.limiter)?;
    info!("Rate limiter initialized");

    tokio::select! {
        result = run(&limiter) => result?,
        _ = shutdown_signal() => {}
    }

    drop(limiter);
    backend.close().await?;

    info!("Slidegate stopped");
    Ok(())
}

fn init_tracing(args: &Args) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&args.log_level));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(true)
        .with_writer(std::io::stderr);

    match args.log_format {
        LogFormat::Text => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}

/// Check every identity read from stdin until EOF.
async fn run(limiter: &RateLimiter) -> anyhow::Result<()> {
    let stdin = BufReader::new(tokio::io::stdin());
    let mut lines = LinesStream::new(stdin.lines());

    while let Some(line) = lines.next().await {
        let line = line?;
        let identity = line.trim();
        if identity.is_empty() {
            continue;
        }

        let checked_at = chrono::Utc::now().to_rfc3339();
        let verdict = match limiter.check_key(identity).await {
            Ok(decision) => Verdict {
                identity,
                allowed: decision.is_allowed(),
                metadata: limiter.metadata(&decision),
                error: None,
                checked_at,
            },
            Err(e) => {
                error!(error = %e, "Admission check failed");
                Verdict {
                    identity,
                    allowed: false,
                    metadata: None,
                    error: Some(error_label(&e).to_string()),
                    checked_at,
                }
            }
        };

        println!("{}", serde_json::to_string(&verdict)?);
    }
    Ok(())
}

/// Short error text for a verdict. Failures are reported apart from quota
/// rejections.
fn error_label(e: &SlidegateError) -> &'static str {
    if e.is_identity() {
        "identity unavailable"
    } else if e.is_unavailable() {
        "service unavailable"
    } else {
        "internal error"
    }
}

/// Wait for a shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down");
        }
        _ = terminate => {
            info!("Received SIGTERM, shutting down");
        }
    }
}

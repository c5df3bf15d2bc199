use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use nexus_client::{ChannelNotifier, ReqwestFetcher, ReqwestTransport, SelectorExtractor};
use nexus_core::automation::{AutomationEngine, PassSummary, TracingEngineReporter};
use nexus_core::config::{HubConfig, StorageKind};
use nexus_core::throttle::{ThrottleConfig, ThrottledFetcher};
use nexus_store::StoreFactory;

const BANNER_PATH: &str = "scripts/banner.txt";
const DEFAULT_BANNER: &str = "HEX Control Nexus - Multi-Language Automation Hub";

#[derive(Parser)]
#[command(name = "nexus", version, about = "HEX Control Nexus automation engine")]
struct Cli {
    /// Config file path
    #[arg(short, long, env = "NEXUS_CONFIG", default_value = "config/config.json")]
    config: PathBuf,

    /// Run a single target by name
    #[arg(short, long, conflicts_with = "daemon")]
    target: Option<String>,

    /// Run every target once and exit.
    ///
    /// This is already what happens without `--daemon`; the flag only spells
    /// it out for scripts and cron entries.
    #[arg(long, conflicts_with = "daemon")]
    once: bool,

    /// Keep running, sleeping `daemon_interval` seconds between passes
    #[arg(long)]
    daemon: bool,

    /// Log what would run without fetching or writing anything
    #[arg(long, conflicts_with = "daemon")]
    dry_run: bool,

    /// Force the output format of every target (csv, jsonl, sqlite)
    #[arg(long)]
    export: Option<StorageKind>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("nexus=info".parse()?))
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    print_banner();

    let config = HubConfig::load(&cli.config)
        .with_context(|| format!("Failed to load config {}", cli.config.display()))?;
    tracing::info!(
        path = %cli.config.display(),
        targets = config.targets.len(),
        "Configuration loaded"
    );

    let user_agent = config.pick_user_agent().to_string();
    let fetcher = ThrottledFetcher::new(
        ReqwestFetcher::with_options(&user_agent, config.http.timeout())
            .context("Failed to create HTTP client")?,
        ThrottleConfig::from(&config.rate_limit),
    );
    let transport =
        ReqwestTransport::with_user_agent(&user_agent).context("Failed to create HTTP client")?;
    let notifications = config.notifications.clone().merge_env();
    let notifier = ChannelNotifier::from_config(&notifications, &config.http, transport.clone())
        .context("Invalid notification settings")?;
    if let Some(kind) = cli.export {
        tracing::info!(?kind, "Export format overridden");
    }

    let engine = AutomationEngine::new(
        config,
        fetcher,
        SelectorExtractor::new(),
        transport,
        StoreFactory::with_export(cli.export),
        notifier,
    );
    let reporter = TracingEngineReporter;

    let cancel = CancellationToken::new();
    tokio::spawn(cancel_on_shutdown(cancel.clone()));

    if let Some(name) = cli.target.as_deref() {
        tokio::select! {
            result = engine.run_target(name, cli.dry_run, &reporter) => {
                let report = result.with_context(|| format!("Target '{name}' failed"))?;
                tracing::info!(
                    target_name = %report.name,
                    items = report.records,
                    stored = report.written,
                    "Target finished"
                );
            }
            () = cancel.cancelled() => tracing::warn!(target_name = %name, "Run interrupted"),
        }
    } else if cli.daemon {
        engine.run_daemon(cancel, &reporter).await;
    } else {
        let summary = engine.run_all(cli.dry_run, &cancel, &reporter).await;
        log_summary(&summary);
        if !summary.failed.is_empty() {
            anyhow::bail!("{} target(s) failed", summary.failed.len());
        }
    }

    tracing::info!("Automation run completed");
    Ok(())
}

fn print_banner() {
    match std::fs::read_to_string(BANNER_PATH) {
        Ok(banner) => println!("{banner}"),
        Err(_) => println!("{DEFAULT_BANNER}"),
    }
}

fn log_summary(summary: &PassSummary) {
    let items: usize = summary.completed.iter().map(|r| r.records).sum();
    tracing::info!(
        completed = summary.completed.len(),
        failed = summary.failed.len(),
        items,
        cancelled = summary.cancelled,
        "Pass finished"
    );
    for (name, error) in &summary.failed {
        tracing::error!(target_name = %name, %error, "Target failed");
    }
}

/// Cancel `token` on Ctrl-C, or SIGTERM on Unix.
async fn cancel_on_shutdown(token: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {}
        () = terminate => {}
    }

    tracing::info!("Shutdown signal received");
    token.cancel();
}

use std::collections::BTreeMap;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::api::ApiCollector;
use crate::config::{HubConfig, TargetConfig, TargetMode};
use crate::error::AppError;
use crate::models::TargetReport;
use crate::resilient::ResilientClient;
use crate::scrape::{CollectOutcome, StaticScraper};
use crate::traits::{Extractor, Fetcher, Notifier, RecordSink, SinkFactory, Transport};

/// Events emitted by the engine for monitoring/logging.
#[derive(Debug, Clone)]
pub enum EngineEvent<'a> {
    TargetStarted {
        name: &'a str,
        mode: TargetMode,
    },
    DryRun {
        name: &'a str,
    },
    Unsupported {
        name: &'a str,
    },
    TargetCompleted {
        report: &'a TargetReport,
    },
    TargetFailed {
        name: &'a str,
        error: &'a str,
    },
    NotificationFailed {
        name: &'a str,
        error: &'a str,
    },
    Sleeping {
        interval: Duration,
    },
    Stopped,
}

/// Trait for receiving engine events (decoupled logging).
pub trait EngineReporter: Send + Sync {
    fn report(&self, event: EngineEvent<'_>) {
        let _ = event;
    }
}

/// Reporter that uses the `tracing` crate.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingEngineReporter;

impl EngineReporter for TracingEngineReporter {
    fn report(&self, event: EngineEvent<'_>) {
        match event {
            EngineEvent::TargetStarted { name, mode } => {
                tracing::info!(target_name = %name, ?mode, "Running target: {}", name);
            }
            EngineEvent::DryRun { name } => {
                tracing::info!(target_name = %name, "Dry run mode - would scrape target");
            }
            EngineEvent::Unsupported { name } => {
                tracing::warn!(target_name = %name, "Mode not implemented, skipping target");
            }
            EngineEvent::TargetCompleted { report } => {
                tracing::info!(
                    target_name = %report.name,
                    records = report.records,
                    written = report.written,
                    pages = report.pages,
                    "Target completed"
                );
            }
            EngineEvent::TargetFailed { name, error } => {
                tracing::error!(target_name = %name, %error, "Target failed");
            }
            EngineEvent::NotificationFailed { name, error } => {
                tracing::warn!(target_name = %name, %error, "Notification failed");
            }
            EngineEvent::Sleeping { interval } => {
                tracing::info!("Sleeping for {} seconds", interval.as_secs());
            }
            EngineEvent::Stopped => {
                tracing::info!("Automation engine stopped");
            }
        }
    }
}

/// Result of one pass over all targets.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PassSummary {
    pub completed: Vec<TargetReport>,
    /// (target name, error message)
    pub failed: Vec<(String, String)>,
    pub cancelled: bool,
}

/// Runs configured targets sequentially: collect → persist → notify.
pub struct AutomationEngine<F, E, T, SF, N>
where
    F: Fetcher,
    E: Extractor,
    T: Transport,
    SF: SinkFactory,
    N: Notifier,
{
    config: HubConfig,
    fetcher: F,
    extractor: E,
    transport: T,
    sinks: SF,
    notifier: N,
}

impl<F, E, T, SF, N> AutomationEngine<F, E, T, SF, N>
where
    F: Fetcher,
    E: Extractor,
    T: Transport,
    SF: SinkFactory,
    N: Notifier,
{
    pub fn new(
        config: HubConfig,
        fetcher: F,
        extractor: E,
        transport: T,
        sinks: SF,
        notifier: N,
    ) -> Self {
        Self {
            config,
            fetcher,
            extractor,
            transport,
            sinks,
            notifier,
        }
    }

    pub fn config(&self) -> &HubConfig {
        &self.config
    }

    /// Run a single target by name.
    pub async fn run_target<R: EngineReporter>(
        &self,
        name: &str,
        dry_run: bool,
        reporter: &R,
    ) -> Result<TargetReport, AppError> {
        let target = self
            .config
            .target(name)
            .ok_or_else(|| AppError::TargetNotFound(name.to_string()))?;
        self.run(target, dry_run, reporter).await
    }

    /// Run every target once, in order, until done or cancelled.
    ///
    /// A failing target is reported and does not stop the pass.
    pub async fn run_all<R: EngineReporter>(
        &self,
        dry_run: bool,
        cancel: &CancellationToken,
        reporter: &R,
    ) -> PassSummary {
        let mut summary = PassSummary::default();

        for target in &self.config.targets {
            if cancel.is_cancelled() {
                summary.cancelled = true;
                break;
            }

            tokio::select! {
                result = self.run(target, dry_run, reporter) => match result {
                    Ok(report) => summary.completed.push(report),
                    Err(e) => {
                        let error = e.to_string();
                        reporter.report(EngineEvent::TargetFailed {
                            name: &target.name,
                            error: &error,
                        });
                        summary.failed.push((target.name.clone(), error));
                    }
                },
                () = cancel.cancelled() => {
                    summary.cancelled = true;
                    break;
                }
            }
        }

        summary
    }

    /// Run all targets, sleep `daemon_interval`, repeat until cancelled.
    pub async fn run_daemon<R: EngineReporter>(&self, cancel: CancellationToken, reporter: &R) {
        tracing::info!("Starting daemon mode");

        loop {
            let summary = self.run_all(false, &cancel, reporter).await;
            if summary.cancelled {
                break;
            }

            let interval = self.config.daemon_interval();
            reporter.report(EngineEvent::Sleeping { interval });
            tokio::select! {
                () = tokio::time::sleep(interval) => {}
                () = cancel.cancelled() => break,
            }
        }

        reporter.report(EngineEvent::Stopped);
    }

    async fn run<R: EngineReporter>(
        &self,
        target: &TargetConfig,
        dry_run: bool,
        reporter: &R,
    ) -> Result<TargetReport, AppError> {
        reporter.report(EngineEvent::TargetStarted {
            name: &target.name,
            mode: target.mode,
        });

        if target.mode == TargetMode::Unsupported {
            reporter.report(EngineEvent::Unsupported { name: &target.name });
            return Ok(TargetReport::skipped(&target.name));
        }
        if dry_run {
            reporter.report(EngineEvent::DryRun { name: &target.name });
            return Ok(TargetReport::skipped(&target.name));
        }

        let outcome = match target.mode {
            TargetMode::Static => {
                StaticScraper::new(self.fetcher.clone(), self.extractor.clone())
                    .scrape(target)
                    .await?
            }
            TargetMode::Api => self.collect_api(target).await?,
            TargetMode::Unsupported => CollectOutcome::default(),
        };

        let sink = self.sinks.open(target)?;
        let written = sink.write(&outcome.records).await?;

        let report = TargetReport {
            name: target.name.clone(),
            records: outcome.records.len(),
            written,
            pages: outcome.pages,
            skipped: false,
        };

        if target.notify {
            let message = format!(
                "Scraped {} items from {} ({} stored)",
                report.records, target.name, report.written
            );
            if let Err(e) = self.notifier.notify(&message).await {
                reporter.report(EngineEvent::NotificationFailed {
                    name: &target.name,
                    error: &e.to_string(),
                });
            }
        }

        reporter.report(EngineEvent::TargetCompleted { report: &report });
        Ok(report)
    }

    /// One resilient session per API target run; the transport is released
    /// when the client goes out of scope.
    async fn collect_api(&self, target: &TargetConfig) -> Result<CollectOutcome, AppError> {
        let client = ResilientClient::with_breaker_config(
            &target.base_url,
            self.transport.clone(),
            self.config.http.breaker_config(),
        )?
        .with_default_headers(BTreeMap::from([(
            "User-Agent".to_string(),
            self.config.pick_user_agent().to_string(),
        )]));

        ApiCollector::new(&client, self.config.http.request_options())
            .collect(target)
            .await
    }
}

use anyhow::{bail, Context};
use chrono::Utc;
use clap::Parser;
use log::{debug, error, info, warn};
use poolwatch::alerts::{AlertManager, ConsoleNotifier, Notifier, SlackNotifier};
use poolwatch::collectors::{wait_for_source, LogTailer, SourceStatus};
use poolwatch::config::Config;
use poolwatch::events::LogRecord;
use poolwatch::monitoring::PipelineStats;
use poolwatch::triggers::TriggerEngine;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Command-line arguments for the pool watcher
#[derive(Parser)]
#[command(
    name = "poolwatch",
    about = "Blue/green deployment watcher - alerts on pool failovers and upstream error spikes",
    long_about = "Follows a reverse proxy access log written as JSON lines, detects when traffic \
                  moves between the blue and green pools and when the share of 5xx responses \
                  over a sliding window crosses a threshold, and posts rate-limited alerts to a \
                  Slack incoming webhook."
)]
struct Cli {
    /// Path to configuration file
    #[arg(
        short,
        long,
        value_name = "FILE",
        help = "Configuration file path (TOML format)"
    )]
    config: Option<PathBuf>,

    /// Access log to follow, overrides config and LOG_FILE
    #[arg(short, long, value_name = "FILE")]
    log_file: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(
        short,
        long,
        help = "Enable verbose logging output (sets RUST_LOG=debug)"
    )]
    verbose: bool,
}

impl Cli {
    /// Validate the CLI arguments
    ///
    /// A missing config file is allowed and falls back to defaults; a path
    /// that exists but is not a regular file is rejected.
    fn validate(&self) -> Result<(), String> {
        if let Some(ref config_path) = self.config {
            if config_path.exists() {
                if !config_path.is_file() {
                    return Err(format!(
                        "Configuration path is not a file: {}",
                        config_path.display()
                    ));
                }

                if let Some(extension) = config_path.extension() {
                    if extension != "toml" {
                        warn!(
                            "Configuration file does not have .toml extension: {}",
                            config_path.display()
                        );
                    }
                }
            }
        }

        if let Some(ref log_file) = self.log_file {
            if log_file.is_dir() {
                return Err(format!("Log path is a directory: {}", log_file.display()));
            }
        }

        Ok(())
    }

    /// Resolve the effective configuration: file and environment, then CLI
    fn load_config(&self) -> Result<Config, String> {
        let mut config = Config::load(self.config.as_deref())
            .map_err(|e| format!("Failed to load configuration: {}", e))?;

        if let Some(ref log_file) = self.log_file {
            config.source.log_file = log_file.clone();
        }

        config
            .validate()
            .map_err(|e| format!("Invalid configuration: {}", e))?;
        Ok(config)
    }
}

/// Pick the notification channel for the configured settings
///
/// Without a webhook URL alerts are still detected and gated, and are only
/// written to the log.
fn build_notifier(config: &Config) -> anyhow::Result<Arc<dyn Notifier>> {
    match config.webhook_url() {
        Some(url) => {
            let notifier = SlackNotifier::new(url.to_string(), config.notify_timeout())
                .context("Failed to create Slack notifier")?;
            Ok(Arc::new(notifier))
        }
        None => {
            warn!("SLACK_WEBHOOK_URL not set, alerts will only be logged");
            Ok(Arc::new(ConsoleNotifier))
        }
    }
}

/// Run one record through the engine and hand any fired alerts to the
/// dispatcher
fn process_record(
    engine: &mut TriggerEngine,
    alert_manager: &AlertManager,
    stats: &PipelineStats,
    record: &LogRecord,
) {
    let observation = engine.observe(record, Utc::now());
    stats.record_observation(&observation);

    for alert in engine.take_pending_alerts() {
        let kind = alert.kind;
        if let Err(e) = alert_manager.dispatch(alert) {
            error!("Failed to queue {} alert: {}", kind.as_str(), e);
        }
    }
}

/// Wires the tailer, the engine and the alert dispatcher together
///
/// Records flow from the tailer thread over a channel into [`PoolWatcher::run`],
/// which is the only owner of the engine, so records are analysed strictly in
/// file order.
pub struct PoolWatcher {
    config: Config,
    engine: TriggerEngine,
    tailer: LogTailer,
    alert_manager: AlertManager,
    stats: Arc<PipelineStats>,
    record_receiver: Receiver<LogRecord>,
    shutdown: Arc<AtomicBool>,
}

impl PoolWatcher {
    /// Create all components without starting the tailer
    pub fn new(config: Config, shutdown: Arc<AtomicBool>) -> anyhow::Result<Self> {
        info!("Initializing pool watcher");

        let stats = Arc::new(PipelineStats::new());
        let (record_sender, record_receiver) = mpsc::channel();

        let engine = TriggerEngine::from_config(&config.detection);
        let tailer = LogTailer::new(
            config.source.log_file.clone(),
            record_sender,
            Arc::clone(&stats),
        );

        let notifier = build_notifier(&config)?;
        let alert_manager =
            AlertManager::start(notifier, config.notify_timeout(), Arc::clone(&stats))
                .context("Failed to start alert dispatcher")?;

        Ok(Self {
            config,
            engine,
            tailer,
            alert_manager,
            stats,
            record_receiver,
            shutdown,
        })
    }

    pub fn start(&mut self) -> anyhow::Result<()> {
        self.tailer.start().with_context(|| {
            format!(
                "Failed to start following {}",
                self.config.source.log_file.display()
            )
        })?;
        info!(
            "Monitoring {} (channel: {})",
            self.config.source.log_file.display(),
            self.alert_manager.channel_name()
        );
        Ok(())
    }

    /// Ingest records until shutdown is requested
    ///
    /// # Errors
    ///
    /// Fails if the tailer goes away while the watcher is still running.
    pub fn run(&mut self) -> anyhow::Result<()> {
        let stats_interval = match self.config.monitoring.stats_interval_secs {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        };
        let mut last_stats = Instant::now();

        info!("Pool watcher is running. Press Ctrl+C to stop.");

        loop {
            if self.shutdown.load(Ordering::SeqCst) {
                info!("Shutdown signal received");
                return Ok(());
            }

            match self.record_receiver.recv_timeout(Duration::from_millis(100)) {
                Ok(record) => {
                    debug!("Record: status={} pool={:?}", record.status, record.pool);
                    process_record(
                        &mut self.engine,
                        &self.alert_manager,
                        &self.stats,
                        &record,
                    );
                }
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => {
                    bail!("Log tailer stopped unexpectedly");
                }
            }

            if let Some(interval) = stats_interval {
                if last_stats.elapsed() >= interval {
                    self.stats.log_summary();
                    last_stats = Instant::now();
                }
            }
        }
    }

    /// Stop the tailer and the dispatcher
    pub fn stop(&mut self) -> anyhow::Result<()> {
        info!("Stopping pool watcher");

        if let Err(e) = self.tailer.stop() {
            error!("Failed to stop log tailer: {}", e);
        }
        self.alert_manager.shutdown();
        self.stats.log_summary();

        info!("Pool watcher stopped");
        Ok(())
    }
}

fn init_logging(verbose: bool) {
    if verbose {
        std::env::set_var("RUST_LOG", "debug");
    }
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    info!("Starting blue/green pool watcher");

    if let Err(e) = cli.validate() {
        error!("Invalid arguments: {}", e);
        std::process::exit(1);
    }

    let config = match cli.load_config() {
        Ok(config) => config,
        Err(e) => {
            error!("{}", e);
            std::process::exit(1);
        }
    };
    config.log_summary();

    // Installed before waiting for the log so Ctrl+C is honoured there too
    let shutdown = Arc::new(AtomicBool::new(false));
    let handler_flag = Arc::clone(&shutdown);
    if let Err(e) = ctrlc::set_handler(move || {
        info!("Received interrupt signal (SIGINT), shutting down gracefully...");
        handler_flag.store(true, Ordering::SeqCst);
    }) {
        error!("Error setting SIGINT handler: {}", e);
        std::process::exit(1);
    }

    match wait_for_source(
        &config.source.log_file,
        config.source.wait_attempts,
        config.wait_interval(),
        &shutdown,
    ) {
        Ok(SourceStatus::Found) => {}
        Ok(SourceStatus::Interrupted) => {
            info!("Interrupted while waiting for the log file");
            return;
        }
        Err(e) => {
            error!("{}", e);
            std::process::exit(1);
        }
    }

    let mut watcher = match PoolWatcher::new(config, shutdown) {
        Ok(watcher) => watcher,
        Err(e) => {
            error!("Failed to initialize pool watcher: {:#}", e);
            std::process::exit(1);
        }
    };

    if let Err(e) = watcher.start() {
        error!("{:#}", e);
        std::process::exit(1);
    }

    let run_result = watcher.run();

    if let Err(e) = watcher.stop() {
        error!("Error during shutdown: {:#}", e);
    }

    if let Err(e) = run_result {
        error!("{:#}", e);
        std::process::exit(1);
    }

    info!("Pool watcher shutdown complete");
}

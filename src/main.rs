use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use coalescer::coalesce::CoalescingLimiter;
use coalescer::config::{CoalescerConfig, LogConfig, LogFormat};
use coalescer::reload::CommandHandler;
use coalescer::trigger;

/// Coalesce change notifications into rate limited reloads.
#[derive(Debug, Parser)]
#[command(name = "coalescer", version, about)]
struct Cli {
    /// Path to a YAML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Minimum milliseconds between the starts of two reloads
    #[arg(long)]
    interval_ms: Option<u64>,

    /// Log output format
    #[arg(long, value_enum)]
    log_format: Option<CliLogFormat>,

    /// Treat each line on stdin as a change notification
    #[arg(long)]
    stdin: bool,

    /// Print the effective configuration as JSON and exit
    #[arg(long)]
    print_config: bool,

    /// Reload command and its arguments
    #[arg(last = true)]
    command: Vec<String>,
}

#[derive(Debug, Clone, Copy, clap::ValueEnum)]
enum CliLogFormat {
    Text,
    Json,
}

impl From<CliLogFormat> for LogFormat {
    fn from(format: CliLogFormat) -> Self {
        match format {
            CliLogFormat::Text => LogFormat::Text,
            CliLogFormat::Json => LogFormat::Json,
        }
    }
}

impl Cli {
    /// Apply command-line overrides on top of the loaded configuration.
    fn apply(self, mut config: CoalescerConfig) -> CoalescerConfig {
        if let Some(interval_ms) = self.interval_ms {
            config.limiter.interval_ms = interval_ms;
        }
        if let Some(format) = self.log_format {
            config.log.format = format.into();
        }
        if self.stdin {
            config.triggers.stdin = true;
        }
        let mut command = self.command.into_iter();
        if let Some(program) = command.next() {
            config.reload.command = Some(program);
            config.reload.args = command.collect();
        }
        config
    }
}

fn init_tracing(log: &LogConfig) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&log.level));

    match log.format {
        LogFormat::Text => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .with_thread_ids(true)
            .init(),
        LogFormat::Json => tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_thread_ids(true)
            .init(),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let print_config = cli.print_config;
    let cli_config = cli.config.clone();

    let config = CoalescerConfig::load(cli_config.as_deref())?;
    let config = cli.apply(config);
    config.validate()?;

    if print_config {
        println!("{}", serde_json::to_string_pretty(&config)?);
        return Ok(());
    }

    init_tracing(&config.log);

    info!("Starting Coalescer");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));
    if let Some(path) = &cli_config {
        info!(path = %path.display(), "Configuration loaded");
    }

    let program = config
        .reload
        .command
        .clone()
        .context("no reload command configured (set reload.command or pass one after --)")?;
    let handler = CommandHandler::new(program, config.reload.args.clone());

    info!(
        interval_ms = config.limiter.interval_ms,
        program = %handler.program().display(),
        "Reloads will be coalesced within the configured interval"
    );
    let limiter = CoalescingLimiter::new(config.limiter.interval(), handler)?;

    if config.triggers.initial {
        limiter.register_change();
    }

    if config.triggers.stdin {
        let limiter = limiter.clone();
        tokio::spawn(async move {
            let stdin = tokio::io::BufReader::new(tokio::io::stdin());
            if let Err(e) = trigger::watch_lines(stdin, limiter).await {
                warn!(error = %e, "Reading change notifications from stdin failed");
            }
        });
    }

    #[cfg(unix)]
    {
        if config.triggers.hangup {
            let limiter = limiter.clone();
            tokio::spawn(async move {
                if let Err(e) = trigger::watch_hangup(limiter).await {
                    warn!(error = %e, "Installing SIGHUP change source failed");
                }
            });
        }
    }

    shutdown_signal().await?;

    info!(stats = ?limiter.stats(), "Coalescer stopped");
    Ok(())
}

/// Wait for a shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() -> std::io::Result<()> {
    let ctrl_c = signal::ctrl_c();

    #[cfg(unix)]
    let mut terminate = signal::unix::signal(signal::unix::SignalKind::terminate())?;
    #[cfg(unix)]
    let terminate = terminate.recv();

    #[cfg(not(unix))]
    let terminate = std::future::pending::<Option<()>>();

    tokio::select! {
        result = ctrl_c => {
            result?;
            info!("Received Ctrl+C, initiating graceful shutdown");
        }
        _ = terminate => {
            info!("Received SIGTERM, initiating graceful shutdown");
        }
    }

    Ok(())
}

mod collectors;
mod config;
mod delivery;
mod evaluate;
mod format;
mod monitor;
mod slack;
mod snapshot;

use clap::Parser;
use collectors::SystemSource;
use config::Config;
use monitor::MonitorError;
use slack::SlackSink;
use tokio::sync::watch;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "hostmond")]
#[command(version)]
struct Cli {
    /// Path to the YAML config file; omit to run on built-in defaults.
    #[arg(short, long)]
    config: Option<String>,
    #[arg(long)]
    print_default_config: bool,
    /// Sink endpoint URL, overrides the config file.
    #[arg(short, long)]
    dest: Option<String>,
    /// Seconds between ticks, overrides the config file.
    #[arg(short, long)]
    interval: Option<u64>,
    /// Delivery attempts per alert, overrides the config file.
    #[arg(short, long)]
    attempts: Option<u32>,
    /// Seconds between delivery attempts, overrides the config file.
    #[arg(short = 't', long)]
    retry_delay: Option<u64>,
    /// Sink channel identifier, overrides the config file.
    #[arg(long)]
    channel: Option<String>,
    /// Sink auth token, overrides the config file.
    #[arg(long)]
    token: Option<String>,
}

#[tokio::main]
async fn main() {
    init_tracing();

    let cli = Cli::parse();
    if cli.print_default_config {
        println!("{}", Config::example_yaml());
        return;
    }

    let cfg = match load_config(&cli) {
        Ok(cfg) => cfg,
        Err(err) => {
            error!(error = %err, "failed to load configuration");
            std::process::exit(1);
        }
    };

    let sink = match build_sink(&cfg) {
        Ok(sink) => sink,
        Err(err) => {
            error!(error = %err, "invalid sink settings");
            std::process::exit(1);
        }
    };

    info!(
        interval_secs = cfg.interval_secs,
        thresholds = cfg.thresholds.len(),
        sink_configured = sink.is_some(),
        "starting hostmond"
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        if let Err(err) = tokio::signal::ctrl_c().await {
            error!(error = %err, "failed to wait for Ctrl+C");
        }
        info!("received Ctrl+C, shutting down");
        let _ = shutdown_tx.send(true);
    });

    let mut source = SystemSource::new();
    match monitor::run(&cfg, &mut source, sink.as_ref(), shutdown_rx).await {
        Ok(()) => info!("hostmond stopped"),
        Err(err @ MonitorError::DeliveryExhausted { .. }) => {
            error!(error = %err, "stopping on delivery exhaustion");
            std::process::exit(2);
        }
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn load_config(cli: &Cli) -> Result<Config, config::ConfigError> {
    let mut cfg = match &cli.config {
        Some(path) => Config::load_from_file(path)?,
        None => Config::default(),
    };

    if let Some(dest) = &cli.dest {
        cfg.sink.endpoint = Some(dest.clone());
    }
    if let Some(interval) = cli.interval {
        cfg.interval_secs = interval;
    }
    if let Some(attempts) = cli.attempts {
        cfg.delivery.max_attempts = attempts;
    }
    if let Some(delay) = cli.retry_delay {
        cfg.delivery.retry_delay_secs = delay;
    }
    if let Some(channel) = &cli.channel {
        cfg.sink.channel = Some(channel.clone());
    }
    if let Some(token) = &cli.token {
        cfg.sink.token = Some(token.clone());
    }

    // Overrides can invalidate a file that was valid on its own.
    cfg.validate()?;
    Ok(cfg)
}

fn build_sink(cfg: &Config) -> Result<Option<SlackSink>, String> {
    let Some(endpoint) = &cfg.sink.endpoint else {
        return Ok(None);
    };
    let channel = cfg
        .sink
        .channel
        .clone()
        .ok_or_else(|| "sink.channel is required when sink.endpoint is set".to_string())?;
    let token = cfg.resolve_sink_token().ok_or_else(|| {
        format!(
            "no sink token found: set '{}' in the environment or sink.token in the config",
            cfg.sink.token_env
        )
    })?;

    Ok(Some(SlackSink::new(endpoint.clone(), token, channel)))
}

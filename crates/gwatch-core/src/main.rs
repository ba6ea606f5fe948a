//! GWatch CLI
//!
//! Loads the configuration, wires collectors and the notifier, and runs the
//! monitoring loops until Ctrl-C or SIGTERM.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use gwatch::alerting::{DingTalkNotifier, MarkdownFormatter};
use gwatch::collector::{
    MySqlCollector, PoolRedisCollector, RedisCollector, ReqwestHttpCollector, SqlxMySqlCollector,
    SysinfoHostCollector,
};
use gwatch::config::{LogConfig, DEFAULT_CONFIG_PATH};
use gwatch::monitor::{Collectors, Coordinator, Monitor};
use gwatch::Config;

/// GWatch - host and application monitoring agent
#[derive(Parser)]
#[command(name = "gwatch")]
#[command(author, about, long_about = None)]
#[command(disable_version_flag = true)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, env = "GWATCH_CONFIG", default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Print version information and exit
    #[arg(short = 'v', long = "version")]
    version: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    if cli.version {
        println!(
            "{} {} ({} {})",
            env!("CARGO_PKG_NAME"),
            env!("CARGO_PKG_VERSION"),
            std::env::consts::OS,
            std::env::consts::ARCH,
        );
        return ExitCode::SUCCESS;
    }

    let config = match Config::load(&cli.config) {
        Ok(config) => config,
        Err(e) => {
            // Logging is configured by the file we failed to read.
            let _ = gwatch::logging::init(&LogConfig::default());
            error!(path = %cli.config.display(), error = %e, "Failed to load configuration");
            return ExitCode::SUCCESS;
        }
    };

    let _guard = match gwatch::logging::init(&config.log) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("Failed to initialise logging: {e}");
            return ExitCode::SUCCESS;
        }
    };

    if let Err(e) = run(config).await {
        error!(error = %e, "GWatch stopped after a fatal error");
    }
    ExitCode::SUCCESS
}

async fn run(config: Config) -> anyhow::Result<()> {
    let monitor = build_monitor(&config).context("failed to wire the monitor")?;
    let coordinator = Arc::new(Coordinator::new(Arc::new(monitor)));
    let config = Arc::new(config);

    info!(version = env!("CARGO_PKG_VERSION"), "GWatch starting");
    if config.host().is_none() && config.redis().is_none() && config.mysql().is_none() && config.http().is_none() {
        warn!("No monitoring section is enabled, nothing will be collected");
    }

    let shutdown = CancellationToken::new();
    let signal_token = shutdown.clone();
    tokio::spawn(async move {
        shutdown_signal().await;
        info!("Shutdown signal received");
        signal_token.cancel();
    });

    coordinator.run(config, shutdown).await;
    info!("GWatch stopped");
    Ok(())
}

fn build_monitor(config: &Config) -> anyhow::Result<Monitor> {
    let app = config.app_monitoring.as_ref();

    let redis = app
        .and_then(|a| a.redis.clone())
        .map(|r| Arc::new(PoolRedisCollector::new(r)) as Arc<dyn RedisCollector>);
    let mysql = app
        .and_then(|a| a.mysql.clone())
        .map(|m| Arc::new(SqlxMySqlCollector::new(m)) as Arc<dyn MySqlCollector>);

    let collectors = Collectors {
        host: Arc::new(SysinfoHostCollector::new()),
        http: Arc::new(ReqwestHttpCollector::new()),
        redis,
        mysql,
    };

    let notifier = DingTalkNotifier::new(&config.dingtalk)?;
    Ok(Monitor::new(
        collectors,
        Arc::new(MarkdownFormatter::new()),
        Arc::new(notifier),
    ))
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to listen for SIGTERM");
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
}

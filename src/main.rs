//! Solana Yield Agent - multi-tenant custodial trading engine
//!
//! Binary entry point: parses the CLI, initializes telemetry, loads and
//! validates configuration, builds the application graph, and runs the
//! scheduler until a shutdown signal arrives. Shutdown drains the in-flight
//! scan cycle and the trade-queue backlog before exiting.

use anyhow::{Context, Result};
use clap::Parser;
use std::process;
use tracing::{error, info, warn};

use solana_yield_agent::{
    application::Application,
    config::{AppConfig, ConfigLoader},
    utils::{telemetry, CliArgs},
};

#[tokio::main]
async fn main() {
    if let Err(e) = color_eyre::install() {
        eprintln!("failed to install error reporting: {}", e);
        process::exit(1);
    }

    if let Err(e) = run().await {
        error!("fatal: {:?}", e);

        eprintln!("\nagent failed to start: {}", e);
        let mut source = e.source();
        while let Some(err) = source {
            eprintln!("  caused by: {}", err);
            source = err.source();
        }

        process::exit(1);
    }
}

async fn run() -> Result<()> {
    let cli_args = CliArgs::parse();

    telemetry::init(&cli_args.log_level, &cli_args.log_format)
        .context("failed to initialize telemetry")?;

    info!(
        "{} v{} starting",
        solana_yield_agent::NAME,
        solana_yield_agent::VERSION
    );

    let config = load_config(cli_args).await?;

    if config.is_simulation() {
        warn!("running in SIMULATION mode: memory stores, no chain submission");
    } else if config.is_production() {
        info!("running in PRODUCTION mode: real trading enabled");
    }

    let app = Application::build(config)
        .await
        .context("application initialization failed")?;

    run_until_shutdown(app).await
}

async fn load_config(cli_args: CliArgs) -> Result<AppConfig> {
    let config = ConfigLoader::new()
        .with_cli_args(cli_args)
        .load()
        .await
        .context("configuration loading failed")?;

    info!(
        environment = %config.environment.name,
        scan_interval = config.scheduler.scan_interval_secs,
        min_trading_balance = config.scheduler.min_trading_balance,
        rpc_batch_size = config.scheduler.rpc_batch_size,
        "configuration loaded"
    );

    Ok(config)
}

/// Run the agent, draining gracefully on SIGTERM / SIGINT
async fn run_until_shutdown(app: Application) -> Result<()> {
    let shutdown_signal = async {
        #[cfg(unix)]
        {
            use tokio::signal::unix::{signal, SignalKind};
            let mut sigterm =
                signal(SignalKind::terminate()).expect("failed to register SIGTERM handler");
            let mut sigint =
                signal(SignalKind::interrupt()).expect("failed to register SIGINT handler");

            tokio::select! {
                _ = sigterm.recv() => warn!("received SIGTERM"),
                _ = sigint.recv() => warn!("received SIGINT"),
            }
        }

        #[cfg(not(unix))]
        {
            tokio::signal::ctrl_c()
                .await
                .expect("failed to register Ctrl+C handler");
            warn!("received Ctrl+C");
        }
    };

    tokio::select! {
        result = app.run() => {
            result.context("agent runtime error")?;
            info!("scheduler finished");
        }
        _ = shutdown_signal => {
            info!("draining before exit");
            app.shutdown().await.context("graceful shutdown failed")?;
        }
    }

    info!("agent stopped");
    Ok(())
}

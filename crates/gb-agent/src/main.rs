mod config;
mod error;
mod market_data;
mod orchestrator;
mod worker;

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use gb_broker::BrokerClient;
use gb_store::PgAgentStore;
use gb_strategy::StrategyResolver;
use sqlx::postgres::PgPoolOptions;
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::EnvFilter;

use config::Config;
use market_data::AlpacaMarketDataClient;
use orchestrator::Orchestrator;

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::from_env().context("invalid configuration")?;
    init_tracing(&config);

    info!("starting gb-agent fleet orchestrator");

    let pool = PgPoolOptions::new()
        .max_connections(config.db_max_conns)
        .min_connections(config.db_min_conns)
        .connect(&config.database_url)
        .await
        .context("failed to connect to database")?;
    info!("database connectivity check passed");

    let broker = Arc::new(BrokerClient::new(
        config.broker_base_url.clone(),
        config.broker_key_id.clone(),
        config.broker_secret_key.clone(),
    ));
    let startup_token = CancellationToken::new();
    broker
        .get_account(&startup_token)
        .await
        .context("broker authentication check failed")?;
    info!("broker connectivity check passed");

    let market_data = Arc::new(AlpacaMarketDataClient::new(
        config.broker_base_url.clone(),
        config.broker_key_id.clone(),
        config.broker_secret_key.clone(),
    ));

    let store = Arc::new(PgAgentStore::new(pool));
    let resolver = Arc::new(StrategyResolver::new(store.clone()));

    let mut orchestrator = Orchestrator::new(
        store,
        broker,
        resolver,
        market_data,
        config.max_consecutive_errors,
        Duration::from_secs(config.poll_interval.as_secs()),
    );

    let root_token = CancellationToken::new();
    let shutdown_token = root_token.clone();
    tokio::spawn(async move {
        wait_for_shutdown_signal().await;
        info!("shutdown signal received, cancelling workers");
        shutdown_token.cancel();
    });

    orchestrator.run(root_token).await;
    info!("gb-agent shut down cleanly");
    Ok(())
}

fn init_tracing(config: &Config) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));
    let subscriber = tracing_subscriber::fmt().with_env_filter(filter);
    if config.log_format_json {
        subscriber.json().init();
    } else {
        subscriber.init();
    }
}

#[cfg(unix)]
async fn wait_for_shutdown_signal() {
    use tokio::signal::unix::{signal, SignalKind};
    let mut sigterm = signal(SignalKind::terminate()).expect("failed to install SIGTERM handler");
    let mut sigint = signal(SignalKind::interrupt()).expect("failed to install SIGINT handler");
    tokio::select! {
        _ = sigterm.recv() => {}
        _ = sigint.recv() => {}
    }
}

#[cfg(not(unix))]
async fn wait_for_shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
}

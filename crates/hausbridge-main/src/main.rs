// Copyright (c) 2025 SOLARE S.R.O.
//
// This file is part of HausBridge.
//
// Licensed under the Creative Commons Attribution-NonCommercial-NoDerivatives 4.0 International
// (CC BY-NC-ND 4.0). You may use and share this file for non-commercial purposes only and you may not
// create derivatives. See <https://creativecommons.org/licenses/by-nc-nd/4.0/>.
//
// This software is provided "AS IS", without warranty of any kind.
//
// For commercial licensing, please contact: info@solare.cz

//! HausBridge - integration plugins for the home-automation gateway

mod api;
mod config;

use anyhow::{Context, Result};
use clap::Parser;
use config::AppConfig;
use hausbridge_core::{
    GatewayApi, HostSettings, HttpGatewayClient, PluginConfigStore, PluginHost, RecordingGateway,
};
use hausbridge_plugins::create_plugin;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[derive(Parser, Debug)]
#[command(name = "hausbridge", version, about = "Integration plugins for the home-automation gateway")]
struct Args {
    /// Path to a config file (.toml or .json)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Log gateway calls instead of sending them
    #[arg(long)]
    dry_run: bool,
}

fn init_logging(log_level: &str) -> Result<()> {
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level)),
        )
        .finish();
    tracing::subscriber::set_global_default(subscriber).context("Failed to set up logging")
}

async fn build_gateway(config: &AppConfig) -> Result<Arc<dyn GatewayApi>> {
    if config.system.dry_run {
        warn!("🧪 Dry run: gateway calls are logged, not sent");
        return Ok(Arc::new(RecordingGateway::new()));
    }

    let client = HttpGatewayClient::new(&config.gateway.base_url, config.gateway.token.clone())
        .context("Failed to create gateway client")?
        .with_retry_config(config.gateway.max_retries, config.gateway.retry_delay());
    if client.ping().await {
        info!("✅ Gateway reachable at {}", client.base_url());
    } else {
        warn!("⚠️ Gateway at {} not reachable yet, plugins will retry", client.base_url());
    }
    Ok(Arc::new(client))
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut config = AppConfig::load(args.config.as_deref())?;
    if args.dry_run {
        config.system.dry_run = true;
    }
    init_logging(&config.system.log_level)?;

    info!("🚀 Starting HausBridge v{}", env!("CARGO_PKG_VERSION"));

    let gateway = build_gateway(&config).await?;
    let settings = HostSettings {
        metrics_flush_interval: Duration::from_secs(config.system.metrics_flush_interval_secs),
        ..HostSettings::default()
    };
    let store = PluginConfigStore::new(&config.plugins.config_dir);
    info!("📂 Plugin configs: {}", store.dir().display());
    let mut host = PluginHost::new(gateway, settings).with_store(store);

    for kind in config.enabled_plugins()? {
        host.register(create_plugin(kind));
    }
    host.load_persisted_configs();
    host.start();

    let host = Arc::new(host);
    if config.api.enabled {
        let api_host = host.clone();
        let port = config.api.listen_port;
        tokio::spawn(async move {
            if let Err(e) = api::serve(api_host, port).await {
                error!("❌ HTTP API failed: {:#}", e);
            }
        });
    }

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for shutdown signal")?;
    info!("Received shutdown signal");

    host.shutdown().await;
    Ok(())
}

//! # CRM Gateway - Main Entry Point
//!
//! Loads the configuration, builds the gateway, warms the cache, keeps it refreshed and
//! serves the cache administration API until a shutdown signal arrives.

use anyhow::Context;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crm_gateway::caching::{CacheAdminRouter, CacheAdminState};
use crm_gateway::observability::{init_logging, metrics};
use crm_gateway::{Gateway, GatewayConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config_path = std::env::var("CRM_GATEWAY_CONFIG")
        .unwrap_or_else(|_| "config/gateway.yaml".to_string());

    let config = GatewayConfig::load_from_file(&config_path)
        .await
        .with_context(|| format!("Failed to load configuration from {}", config_path))?;

    init_logging(&config.logging).context("Failed to initialize logging")?;
    metrics::install_exporter(&config.metrics).context("Failed to start metrics exporter")?;

    info!("Starting CRM gateway {}", env!("CARGO_PKG_VERSION"));

    let gateway = Arc::new(Gateway::new(config.clone()).context("Failed to build gateway")?);
    let shutdown = CancellationToken::new();

    let refresh = if config.warmup.enabled && !config.warmup.entities.is_empty() {
        let report = gateway.warm_up_configured().await;
        for entity in report.failed() {
            warn!("Initial warm-up failed for {}", entity);
        }

        Some(gateway.warmer().schedule_refresh(
            config.warmup.entities.clone(),
            config.warmup.refresh_interval,
            shutdown.clone(),
        ))
    } else {
        info!("Cache warm-up disabled");
        None
    };

    let listener = TcpListener::bind(config.admin.bind_address)
        .await
        .with_context(|| format!("Failed to bind admin API on {}", config.admin.bind_address))?;
    info!("Cache admin API listening on {}", config.admin.bind_address);

    let router = CacheAdminRouter::create_router(CacheAdminState::new(Arc::clone(&gateway)));
    let server = {
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            axum::serve(listener, router)
                .with_graceful_shutdown(shutdown.cancelled_owned())
                .await
        })
    };

    shutdown_signal().await;
    info!("Shutdown signal received, stopping");
    shutdown.cancel();

    if let Some(refresh) = refresh {
        if let Err(e) = refresh.await {
            error!("Cache refresh task failed: {}", e);
        }
    }

    match server.await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => error!("Admin API error: {}", e),
        Err(e) => error!("Admin API task failed: {}", e),
    }

    info!("CRM gateway shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}

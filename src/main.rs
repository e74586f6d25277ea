use anyhow::{Context, Result};
use incident_dashboard::{
    config::Config,
    dashboard::{Dashboard, WriteBack},
    incidents::load_incidents,
    server,
    warehouse::{auth::TokenProvider, BigQueryClient},
};
use reqwest::Client;
use std::{env, sync::Arc};
use tracing::{info, warn, Level};
use tracing_subscriber::{fmt, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    // ─── 1) init logging ─────────────────────────────────────────────
    let log_level = env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string());
    fmt()
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive(log_level.parse().unwrap_or(Level::INFO.into())),
        )
        .init();
    info!("startup");

    // ─── 2) configuration ────────────────────────────────────────────
    let cfg = Config::from_env().context("loading configuration")?;
    info!(
        source = %cfg.source_table(),
        destination = %cfg.destination(),
        port = cfg.port,
        "configured"
    );

    // ─── 3) warehouse client ─────────────────────────────────────────
    let http = Client::new();
    let tokens = TokenProvider::from_config(http.clone(), &cfg)?;
    let bigquery = Arc::new(BigQueryClient::new(http, &cfg, tokens)?);

    // ─── 4) load the incident table once ─────────────────────────────
    let incidents = load_incidents(bigquery.as_ref(), &cfg.source_table()).await?;

    // ─── 5) wire up the dashboard ────────────────────────────────────
    let write_back = if cfg.write_back.enabled {
        Some(WriteBack {
            sink: bigquery.clone(),
            destination: cfg.destination(),
        })
    } else {
        warn!("write-back disabled; {} will not be updated", cfg.destination());
        None
    };
    let dashboard = Arc::new(Dashboard::new(
        Arc::new(incidents),
        cfg.map.clone(),
        write_back,
    )?);
    info!(
        categories = dashboard.options().categories.len(),
        service_types = dashboard.options().service_types.len(),
        "dropdowns ready"
    );

    // ─── 6) serve ────────────────────────────────────────────────────
    server::serve(dashboard, cfg.port).await;
    Ok(())
}

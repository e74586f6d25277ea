// src/server/mod.rs

mod page;

use serde::Serialize;
use std::{convert::Infallible, net::SocketAddr, sync::Arc};
use tracing::{info, warn};
use warp::{
    http::StatusCode,
    reject::Rejection,
    reply::{self, Reply, Response},
    Filter,
};

use crate::{dashboard::Dashboard, incidents::Selection};

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
    details: Option<String>,
}

fn with_dashboard(
    dashboard: Arc<Dashboard>,
) -> impl Filter<Extract = (Arc<Dashboard>,), Error = Infallible> + Clone {
    warp::any().map(move || dashboard.clone())
}

async fn health_check() -> Result<impl Reply, Rejection> {
    Ok(reply::json(&serde_json::json!({
        "status": "healthy",
        "service": "incident-dashboard"
    })))
}

async fn index_page() -> Result<impl Reply, Rejection> {
    Ok(reply::html(page::INDEX_HTML))
}

async fn dropdown_options(dashboard: Arc<Dashboard>) -> Result<impl Reply, Rejection> {
    Ok(reply::json(dashboard.options()))
}

async fn handle_update(
    selection: Selection,
    dashboard: Arc<Dashboard>,
) -> Result<Response, Rejection> {
    info!(
        category = ?selection.category,
        service_type = ?selection.service_type,
        "update requested"
    );
    match dashboard.update(selection).await {
        Ok(view) => Ok(reply::json(&view).into_response()),
        Err(e) => {
            warn!("❌ update failed: {:?}", e);
            Ok(reply::with_status(
                reply::json(&ErrorResponse {
                    error: "Update failed".to_string(),
                    details: Some(format!("{:#}", e)),
                }),
                StatusCode::INTERNAL_SERVER_ERROR,
            )
            .into_response())
        }
    }
}

/// `GET /`, `GET /options`, `POST /update`, `GET /health`.
pub fn routes(
    dashboard: Arc<Dashboard>,
) -> impl Filter<Extract = (impl Reply,), Error = Rejection> + Clone {
    let index = warp::path::end().and(warp::get()).and_then(index_page);

    let health = warp::path("health")
        .and(warp::path::end())
        .and(warp::get())
        .and_then(health_check);

    let options = warp::path("options")
        .and(warp::path::end())
        .and(warp::get())
        .and(with_dashboard(dashboard.clone()))
        .and_then(dropdown_options);

    let update = warp::path("update")
        .and(warp::path::end())
        .and(warp::post())
        .and(warp::body::content_length_limit(16 * 1024))
        .and(warp::body::json())
        .and(with_dashboard(dashboard))
        .and_then(handle_update);

    index.or(health).or(options).or(update)
}

/// Serve until the process is stopped.
pub async fn serve(dashboard: Arc<Dashboard>, port: u16) {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    info!("Dashboard running on http://localhost:{}", port);
    info!("Health check: http://localhost:{}/health", port);
    warp::serve(routes(dashboard)).run(addr).await;
}

//! Uptime endpoint for the hosting platform's liveness probe.

use std::net::{Ipv4Addr, SocketAddr};
use std::time::Instant;

use axum::{Json, Router, extract::State, routing::get};
use log::info;
use serde::Serialize;
use tokio::net::TcpListener;

use crate::error::Result;

pub const STATUS_TEXT: &str = "Demônio (frio) online";

#[derive(Debug, Clone, Copy)]
struct HealthState {
    started_at: Instant,
}

#[derive(Debug, Serialize)]
struct HealthStatus {
    status: &'static str,
    uptime_s: f64,
}

async fn health_handler(State(state): State<HealthState>) -> Json<HealthStatus> {
    Json(HealthStatus {
        status: STATUS_TEXT,
        uptime_s: state.started_at.elapsed().as_secs_f64(),
    })
}

pub fn router(started_at: Instant) -> Router {
    Router::new()
        .route("/", get(health_handler))
        .with_state(HealthState { started_at })
}

/// Serve the health endpoint on all interfaces until the task is dropped.
pub async fn serve(port: u16, started_at: Instant) -> Result<()> {
    let addr = SocketAddr::from((Ipv4Addr::UNSPECIFIED, port));
    let listener = TcpListener::bind(addr).await?;
    info!("HTTP server listening on port {port}");
    axum::serve(listener, router(started_at)).await?;
    Ok(())
}

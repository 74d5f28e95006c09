use axum::{
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use relay_common::core::relay::{RelayStats, RelayStatsSnapshot};
use relay_common::ingestors::{ClientDiagnostics, StreamClient};
use relay_common::CommandDesk;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::broadcast;

#[derive(Clone)]
pub struct AppState {
    pub instance_id: String,
    pub client: StreamClient,
    pub stats: Arc<RelayStats>,
    pub desk: Arc<CommandDesk>,
}

#[derive(Debug, Serialize)]
pub struct HealthReport {
    pub instance_id: String,
    pub connection: ClientDiagnostics,
    pub relay: RelayStatsSnapshot,
}

#[derive(Debug, Deserialize)]
pub struct CommandRequest {
    pub origin: String,
    pub text: String,
    #[serde(default)]
    pub admin: bool,
}

#[derive(Debug, Serialize)]
pub struct CommandResponse {
    pub replies: Vec<String>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/command", post(command_handler))
        .with_state(state)
}

pub async fn run(port: u16, state: AppState, mut shutdown: broadcast::Receiver<()>) -> anyhow::Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    log::info!("HTTP surface listening on {}", addr);

    axum::serve(listener, router(state))
        .with_graceful_shutdown(async move {
            shutdown.recv().await.ok();
            log::info!("HTTP surface shutting down.");
        })
        .await?;
    Ok(())
}

async fn health_handler(State(state): State<AppState>) -> impl IntoResponse {
    (StatusCode::OK, Json(health_report(&state)))
}

pub fn health_report(state: &AppState) -> HealthReport {
    HealthReport {
        instance_id: state.instance_id.clone(),
        connection: state.client.diagnostics(),
        relay: state.stats.snapshot(),
    }
}

async fn command_handler(
    State(state): State<AppState>,
    Json(request): Json<CommandRequest>,
) -> Json<CommandResponse> {
    log::debug!("Command from {}: {}", request.origin, request.text);
    let replies = state
        .desk
        .handle(&request.origin, &request.text, request.admin)
        .await;
    Json(CommandResponse { replies })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn admin_flag_defaults_to_false() {
        let request: CommandRequest =
            serde_json::from_str(r#"{"origin":"group:1","text":"订阅兑换码"}"#).unwrap();
        assert!(!request.admin);
        assert_eq!(request.text, "订阅兑换码");
    }
}

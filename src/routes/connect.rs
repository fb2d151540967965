use axum::extract::State;
use axum::Json;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::credentials::CredentialProvider;
use crate::error::DashboardError;
use crate::state::SharedState;

#[derive(Deserialize)]
pub struct ConnectRequest {
    pub api_key: String,
}

#[derive(Serialize)]
pub struct ConnectionStatus {
    pub connected: bool,
}

/// GET /connect
pub async fn connection_status(State(state): State<SharedState>) -> Json<ConnectionStatus> {
    Json(ConnectionStatus {
        connected: state.credentials.is_connected(),
    })
}

/// POST /connect
///
/// Stores the key and proves it by listing projects. If that fails for any
/// reason the key is dropped again, so only a verified key is ever kept.
pub async fn connect(
    State(state): State<SharedState>,
    Json(req): Json<ConnectRequest>,
) -> Result<Json<ConnectionStatus>, DashboardError> {
    let key = req.api_key.trim();
    if key.is_empty() {
        return Err(DashboardError::Validation("API key is required".to_string()));
    }

    state.credentials.set(key);
    if let Err(e) = state.client.validate_credential().await {
        warn!("Could not validate API key: {}", e);
        state.credentials.clear();
        return Err(e.into());
    }
    info!("Connected to Testpad");

    Ok(Json(ConnectionStatus { connected: true }))
}

/// DELETE /connect
pub async fn disconnect(State(state): State<SharedState>) -> Json<ConnectionStatus> {
    state.credentials.clear();
    info!("Disconnected from Testpad");
    Json(ConnectionStatus { connected: false })
}

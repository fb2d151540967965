use axum::extract::State;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::IntoResponse;
use axum::Json;
use chrono::Utc;
use std::convert::Infallible;
use tokio::sync::watch;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::StreamExt;
use tracing::{error, info, warn};

use crate::error::DashboardError;
use crate::rounds::{self, DuplicationResult, RoundRequest};
use crate::state::{RoundStatus, SharedState};
use crate::testpad::error::TestpadError;

fn validate(req: &mut RoundRequest) -> Result<(), DashboardError> {
    req.new_folder_name = req.new_folder_name.trim().to_string();
    req.source_folder_id = req.source_folder_id.trim().to_string();
    if req.new_folder_name.is_empty() {
        return Err(DashboardError::Validation(
            "new_folder_name is required".to_string(),
        ));
    }
    if req.source_folder_id.is_empty() {
        return Err(DashboardError::Validation(
            "source_folder_id is required".to_string(),
        ));
    }
    Ok(())
}

/// POST /rounds
///
/// Starts duplicating the source folder in the background. Only one round
/// runs at a time.
pub async fn start(
    State(state): State<SharedState>,
    Json(mut req): Json<RoundRequest>,
) -> Result<impl IntoResponse, DashboardError> {
    validate(&mut req)?;
    if !state.credentials.is_connected() {
        return Err(TestpadError::Unauthenticated.into());
    }

    let (stop_tx, stop_rx) = watch::channel(false);
    let round_id = uuid::Uuid::new_v4().to_string();

    // Check and claim under one write lock
    {
        let mut round = state.round.write().await;
        if round.running {
            return Err(DashboardError::RoundAlreadyRunning);
        }
        round.running = true;
        round.round_id = Some(round_id.clone());
        round.request = Some(req.clone());
        round.started_at = Some(Utc::now());
        round.finished_at = None;
        round.result = None;
        round.error = None;
        round.stop_tx = Some(stop_tx);
    }
    state.round_progress.reset();

    info!(
        "Test round {} started: project={}, source={}, name='{}', testers={}",
        round_id,
        req.project_id,
        req.source_folder_id,
        req.new_folder_name,
        req.testers.len()
    );

    let state_clone = state.clone();
    let id = round_id.clone();
    tokio::spawn(async move {
        run_round(state_clone, id, req, stop_rx).await;
    });

    Ok(Json(serde_json::json!({
        "status": "started",
        "round_id": round_id,
    })))
}

async fn run_round(
    state: SharedState,
    round_id: String,
    req: RoundRequest,
    stop_rx: watch::Receiver<bool>,
) {
    let options = state.round_options();
    let outcome = rounds::duplicate_folder(
        state.client.as_ref(),
        &req,
        &options,
        state.round_progress.as_ref(),
        &stop_rx,
    )
    .await;

    let mut round = state.round.write().await;
    match outcome {
        Ok(result) => {
            if result.credential_rejected {
                state.forget_rejected_key(&TestpadError::InvalidCredential);
            }
            if result.success {
                info!(
                    "Test round {} finished: {} scripts copied",
                    round_id, result.created_scripts
                );
            } else {
                warn!(
                    "Test round {} finished with {} errors ({} scripts copied)",
                    round_id,
                    result.errors.len(),
                    result.created_scripts
                );
            }
            round.result = Some(result);
        }
        Err(e) => {
            error!("Test round {} failed: {}", round_id, e);
            state.forget_rejected_key(&e);
            round.result = Some(DuplicationResult::aborted(&e));
            round.error = Some(e.to_string());
        }
    }
    round.running = false;
    round.finished_at = Some(Utc::now());
    round.stop_tx = None;
}

/// GET /rounds/status
pub async fn status(State(state): State<SharedState>) -> Json<RoundStatus> {
    Json(state.round_status().await)
}

/// POST /rounds/cancel
///
/// The running round stops before its next script.
pub async fn cancel(State(state): State<SharedState>) -> Result<impl IntoResponse, DashboardError> {
    let stop_tx = {
        let round = state.round.read().await;
        if !round.running {
            return Err(DashboardError::RoundNotRunning);
        }
        round.stop_tx.clone()
    };

    if let Some(tx) = stop_tx {
        let _ = tx.send(true);
    }
    info!("Test round cancellation requested");

    Ok(Json(serde_json::json!({ "status": "cancelling" })))
}

/// GET /rounds/stream
pub async fn stream(
    State(state): State<SharedState>,
) -> Sse<impl tokio_stream::Stream<Item = Result<Event, Infallible>>> {
    let rx = state.round_progress.subscribe();
    let stream = BroadcastStream::new(rx);

    let event_stream = stream.filter_map(|result| match result {
        Ok(progress) => {
            let data = serde_json::to_string(&progress).unwrap_or_default();
            Some(Ok(Event::default().event("progress").data(data)))
        }
        Err(_) => None, // lagged
    });

    Sse::new(event_stream).keep_alive(KeepAlive::default())
}

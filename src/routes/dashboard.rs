use axum::extract::State;
use axum::Json;

use crate::dashboard::{collect_stats, DashboardStats};
use crate::error::DashboardError;
use crate::state::SharedState;

/// GET /dashboard
pub async fn dashboard(
    State(state): State<SharedState>,
) -> Result<Json<DashboardStats>, DashboardError> {
    let stats = state.checked(
        collect_stats(state.client.as_ref(), state.config.dashboard_script_limit).await,
    )?;
    Ok(Json(stats))
}

use axum::extract::{Path, Query, State};
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::aggregation::{
    failed_tests, highlights, tester_board, tester_summaries, total_progress, FailedTest,
    Highlights, ScriptSnapshot, TesterBoard, TesterSummary,
};
use crate::error::DashboardError;
use crate::state::SharedState;
use crate::testpad::client::{FolderQuery, TestpadApi};
use crate::testpad::model::ProgressCounters;

#[derive(Debug, Deserialize)]
pub struct InsightsQuery {
    pub folder_id: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct InsightsResponse {
    pub project_id: u64,
    pub project_name: String,
    pub folder_id: Option<String>,
    pub script_count: usize,
    pub progress: ProgressCounters,
    pub pass_rate: u32,
    pub testers: Vec<TesterSummary>,
    pub failed_tests: Vec<FailedTest>,
    pub board: TesterBoard,
    pub highlights: Highlights,
}

/// GET /projects/{id}/insights?folder_id=
///
/// Tester workload and failing tests for a whole project or one folder of
/// it, recomputed from a fresh fetch on every call.
pub async fn project_insights(
    State(state): State<SharedState>,
    Path(project_id): Path<u64>,
    Query(params): Query<InsightsQuery>,
) -> Result<Json<InsightsResponse>, DashboardError> {
    let project = state.checked(state.client.get_project(project_id).await)?;
    let folder_id = params
        .folder_id
        .map(|id| id.trim().to_string())
        .filter(|id| !id.is_empty());

    let query = FolderQuery::insights();
    let tree = match &folder_id {
        Some(folder_id) => state.checked(
            state
                .client
                .get_folder(project_id, folder_id, &query)
                .await,
        )?,
        None => state.checked(state.client.list_folders(project_id, &query).await)?,
    };

    let snapshots = ScriptSnapshot::from_tree(&project.name, &tree);
    let testers = tester_summaries(&snapshots);
    let progress = total_progress(&snapshots);

    Ok(Json(InsightsResponse {
        project_id,
        project_name: project.name,
        folder_id,
        script_count: snapshots.len(),
        pass_rate: progress.pass_rate(),
        progress,
        failed_tests: failed_tests(&snapshots),
        board: tester_board(&testers),
        highlights: highlights(&testers),
        testers,
    }))
}

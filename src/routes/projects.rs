use axum::extract::{Path, State};
use axum::Json;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::DashboardError;
use crate::state::SharedState;
use crate::testpad::client::{FolderQuery, TestpadApi};
use crate::testpad::model::{BuildMetadata, FolderNode, NewRun, Project, Script, DEFAULT_TAGS};
use crate::testpad::shapes::extract_created_id;
use crate::traversal::{collect_folders, FolderOption};

#[derive(Debug, Deserialize)]
pub struct CreateRunRequest {
    pub tester: String,
    #[serde(default)]
    pub tags: Option<String>,
    #[serde(flatten)]
    pub build_metadata: BuildMetadata,
}

#[derive(Debug, Serialize)]
pub struct CreatedResponse {
    pub ok: bool,
    pub id: Option<String>,
}

/// GET /projects
pub async fn list_projects(
    State(state): State<SharedState>,
) -> Result<Json<Vec<Project>>, DashboardError> {
    let projects = state.checked(state.client.list_projects().await)?;
    Ok(Json(projects))
}

/// GET /projects/{id}
pub async fn get_project(
    State(state): State<SharedState>,
    Path(project_id): Path<u64>,
) -> Result<Json<Project>, DashboardError> {
    let project = state.checked(state.client.get_project(project_id).await)?;
    Ok(Json(project))
}

/// GET /projects/{id}/folders
pub async fn list_folders(
    State(state): State<SharedState>,
    Path(project_id): Path<u64>,
) -> Result<Json<FolderNode>, DashboardError> {
    let tree = state.checked(
        state
            .client
            .list_folders(project_id, &FolderQuery::listing())
            .await,
    )?;
    Ok(Json(tree))
}

/// GET /projects/{id}/folders/{folder_id}
pub async fn get_folder(
    State(state): State<SharedState>,
    Path((project_id, folder_id)): Path<(u64, String)>,
) -> Result<Json<FolderNode>, DashboardError> {
    let folder = state.checked(
        state
            .client
            .get_folder(project_id, &folder_id, &FolderQuery::folder_detail())
            .await,
    )?;
    Ok(Json(folder))
}

/// GET /projects/{id}/folder-options
///
/// Every folder of the project, depth-first, for picking a round's source.
pub async fn folder_options(
    State(state): State<SharedState>,
    Path(project_id): Path<u64>,
) -> Result<Json<Vec<FolderOption>>, DashboardError> {
    let tree = state.checked(
        state
            .client
            .list_folders(project_id, &FolderQuery::structure())
            .await,
    )?;
    Ok(Json(collect_folders(&tree)))
}

/// GET /scripts/{id}
pub async fn get_script(
    State(state): State<SharedState>,
    Path(script_id): Path<u64>,
) -> Result<Json<Script>, DashboardError> {
    let script = state.checked(state.client.get_script(script_id).await)?;
    Ok(Json(script))
}

/// POST /scripts/{id}/runs
pub async fn create_run(
    State(state): State<SharedState>,
    Path(script_id): Path<u64>,
    Json(req): Json<CreateRunRequest>,
) -> Result<Json<CreatedResponse>, DashboardError> {
    let tester = req.tester.trim();
    if tester.is_empty() {
        return Err(DashboardError::Validation("Tester is required".to_string()));
    }

    let run = NewRun::assigned(
        tester,
        Some(req.tags.as_deref().unwrap_or(DEFAULT_TAGS)),
        &req.build_metadata,
    );
    let resp = state.checked(state.client.create_run(script_id, &run).await)?;
    info!("Created run on script {} for '{}'", script_id, tester);

    Ok(Json(CreatedResponse {
        ok: true,
        id: extract_created_id(&resp),
    }))
}

use axum::extract::{Path, State};
use axum::Json;
use serde::Deserialize;

use super::projects::CreatedResponse;
use crate::error::DashboardError;
use crate::state::SharedState;
use crate::testpad::model::Note;
use crate::testpad::shapes::extract_created_id;

#[derive(Debug, Deserialize)]
pub struct NoteRequest {
    pub content: String,
}

fn note_content(req: &NoteRequest) -> Result<&str, DashboardError> {
    let content = req.content.trim();
    if content.is_empty() {
        return Err(DashboardError::Validation(
            "Note content is required".to_string(),
        ));
    }
    Ok(content)
}

/// GET /projects/{id}/notes
pub async fn list_project_notes(
    State(state): State<SharedState>,
    Path(project_id): Path<u64>,
) -> Result<Json<Vec<Note>>, DashboardError> {
    let notes = state.checked(state.client.list_notes(project_id).await)?;
    Ok(Json(notes))
}

/// GET /projects/{id}/folders/{folder_id}/notes
pub async fn list_folder_notes(
    State(state): State<SharedState>,
    Path((project_id, folder_id)): Path<(u64, String)>,
) -> Result<Json<Vec<Note>>, DashboardError> {
    let notes = state.checked(
        state
            .client
            .list_folder_notes(project_id, &folder_id)
            .await,
    )?;
    Ok(Json(notes))
}

/// POST /projects/{id}/notes
pub async fn create_project_note(
    State(state): State<SharedState>,
    Path(project_id): Path<u64>,
    Json(req): Json<NoteRequest>,
) -> Result<Json<CreatedResponse>, DashboardError> {
    let content = note_content(&req)?;
    let resp = state.checked(state.client.create_note(project_id, content, None).await)?;
    Ok(Json(CreatedResponse {
        ok: true,
        id: extract_created_id(&resp),
    }))
}

/// POST /projects/{id}/folders/{folder_id}/notes
pub async fn create_folder_note(
    State(state): State<SharedState>,
    Path((project_id, folder_id)): Path<(u64, String)>,
    Json(req): Json<NoteRequest>,
) -> Result<Json<CreatedResponse>, DashboardError> {
    let content = note_content(&req)?;
    let resp = state.checked(
        state
            .client
            .create_note(project_id, content, Some(&folder_id))
            .await,
    )?;
    Ok(Json(CreatedResponse {
        ok: true,
        id: extract_created_id(&resp),
    }))
}

/// PATCH /projects/{id}/notes/{note_id}
pub async fn update_note(
    State(state): State<SharedState>,
    Path((project_id, note_id)): Path<(u64, String)>,
    Json(req): Json<NoteRequest>,
) -> Result<Json<Note>, DashboardError> {
    let content = note_content(&req)?;
    let note = state.checked(
        state
            .client
            .update_note(project_id, &note_id, content)
            .await,
    )?;
    Ok(Json(note))
}

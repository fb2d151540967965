use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::state::SharedState;

pub fn build_router(state: SharedState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        // Health
        .route("/health", get(crate::routes::health::health))
        // Credential lifecycle
        .route(
            "/connect",
            get(crate::routes::connect::connection_status)
                .post(crate::routes::connect::connect)
                .delete(crate::routes::connect::disconnect),
        )
        // Browsing
        .route("/projects", get(crate::routes::projects::list_projects))
        .route("/projects/{id}", get(crate::routes::projects::get_project))
        .route(
            "/projects/{id}/folders",
            get(crate::routes::projects::list_folders),
        )
        .route(
            "/projects/{id}/folders/{folder_id}",
            get(crate::routes::projects::get_folder),
        )
        .route(
            "/projects/{id}/folder-options",
            get(crate::routes::projects::folder_options),
        )
        .route("/scripts/{id}", get(crate::routes::projects::get_script))
        .route(
            "/scripts/{id}/runs",
            post(crate::routes::projects::create_run),
        )
        // Notes
        .route(
            "/projects/{id}/notes",
            get(crate::routes::notes::list_project_notes)
                .post(crate::routes::notes::create_project_note),
        )
        .route(
            "/projects/{id}/notes/{note_id}",
            axum::routing::patch(crate::routes::notes::update_note),
        )
        .route(
            "/projects/{id}/folders/{folder_id}/notes",
            get(crate::routes::notes::list_folder_notes)
                .post(crate::routes::notes::create_folder_note),
        )
        // Test rounds
        .route("/rounds", post(crate::routes::rounds::start))
        .route("/rounds/status", get(crate::routes::rounds::status))
        .route("/rounds/stream", get(crate::routes::rounds::stream))
        .route("/rounds/cancel", post(crate::routes::rounds::cancel))
        // Aggregates
        .route(
            "/projects/{id}/insights",
            get(crate::routes::insights::project_insights),
        )
        .route("/dashboard", get(crate::routes::dashboard::dashboard))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

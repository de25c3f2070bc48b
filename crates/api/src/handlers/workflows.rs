use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use tracing::{debug, error, instrument, warn};
use uuid::Uuid;

use db::{DbError, NewWorkflow, WorkflowRow};
use nodes::{Edge, Node};

use crate::AppState;

/// Shape a stored schema must have to be loadable again.
#[derive(Deserialize)]
struct Graph {
    nodes: Vec<Node>,
    #[serde(default)]
    edges: Vec<Edge>,
}

fn check_schema(payload: &NewWorkflow) -> Result<(), StatusCode> {
    if payload.name.trim().is_empty() {
        return Err(StatusCode::BAD_REQUEST);
    }
    let graph = serde_json::from_value::<Graph>(payload.schema.clone()).map_err(|e| {
        warn!(error = %e, "rejecting malformed workflow schema");
        StatusCode::BAD_REQUEST
    })?;
    debug!(nodes = graph.nodes.len(), edges = graph.edges.len(), "schema accepted");
    Ok(())
}

fn db_status(e: DbError) -> StatusCode {
    match e {
        DbError::NotFound(_) => StatusCode::NOT_FOUND,
        other => {
            error!(error = %other, "workflow repository failed");
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

pub async fn list(State(state): State<AppState>) -> Result<Json<Vec<WorkflowRow>>, StatusCode> {
    state.repo.list().await.map(Json).map_err(db_status)
}

pub async fn get(
    Path(id): Path<Uuid>,
    State(state): State<AppState>,
) -> Result<Json<WorkflowRow>, StatusCode> {
    state.repo.get(id).await.map(Json).map_err(db_status)
}

#[instrument(skip_all, fields(name = %payload.name))]
pub async fn create(
    State(state): State<AppState>,
    Json(payload): Json<NewWorkflow>,
) -> Result<(StatusCode, Json<WorkflowRow>), StatusCode> {
    check_schema(&payload)?;
    let row = state.repo.create(payload).await.map_err(db_status)?;
    Ok((StatusCode::CREATED, Json(row)))
}

#[instrument(skip_all, fields(%id))]
pub async fn update(
    Path(id): Path<Uuid>,
    State(state): State<AppState>,
    Json(payload): Json<NewWorkflow>,
) -> Result<Json<WorkflowRow>, StatusCode> {
    check_schema(&payload)?;
    state.repo.update(id, payload).await.map(Json).map_err(db_status)
}

pub async fn delete(
    Path(id): Path<Uuid>,
    State(state): State<AppState>,
) -> Result<StatusCode, StatusCode> {
    state.repo.delete(id).await.map_err(db_status)?;
    Ok(StatusCode::NO_CONTENT)
}

//! Workflow CRUD operations.

use chrono::Utc;
use sqlx::PgPool;
use uuid::Uuid;

use crate::models::{NewWorkflow, WorkflowRow};
use crate::DbError;

const COLUMNS: &str = "id, name, description, schema, created_at, updated_at";

/// Insert a new workflow.
pub async fn create_workflow(pool: &PgPool, new: &NewWorkflow) -> Result<WorkflowRow, DbError> {
    let now = Utc::now();
    let row = sqlx::query_as::<_, WorkflowRow>(&format!(
        "INSERT INTO workflows (id, name, description, schema, created_at, updated_at)
         VALUES ($1, $2, $3, $4, $5, $5)
         RETURNING {COLUMNS}"
    ))
    .bind(Uuid::new_v4())
    .bind(&new.name)
    .bind(&new.description)
    .bind(&new.schema)
    .bind(now)
    .fetch_one(pool)
    .await?;

    Ok(row)
}

pub async fn get_workflow(pool: &PgPool, id: Uuid) -> Result<WorkflowRow, DbError> {
    sqlx::query_as::<_, WorkflowRow>(&format!("SELECT {COLUMNS} FROM workflows WHERE id = $1"))
        .bind(id)
        .fetch_optional(pool)
        .await?
        .ok_or(DbError::NotFound(id))
}

/// All workflows, most recently updated first.
pub async fn list_workflows(pool: &PgPool) -> Result<Vec<WorkflowRow>, DbError> {
    let rows = sqlx::query_as::<_, WorkflowRow>(&format!(
        "SELECT {COLUMNS} FROM workflows ORDER BY updated_at DESC"
    ))
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

/// Replace name, description and schema of an existing workflow.
pub async fn update_workflow(pool: &PgPool, id: Uuid, new: &NewWorkflow) -> Result<WorkflowRow, DbError> {
    sqlx::query_as::<_, WorkflowRow>(&format!(
        "UPDATE workflows
         SET name = $2, description = $3, schema = $4, updated_at = $5
         WHERE id = $1
         RETURNING {COLUMNS}"
    ))
    .bind(id)
    .bind(&new.name)
    .bind(&new.description)
    .bind(&new.schema)
    .bind(Utc::now())
    .fetch_optional(pool)
    .await?
    .ok_or(DbError::NotFound(id))
}

/// Returns `DbError::NotFound` if no row was deleted.
pub async fn delete_workflow(pool: &PgPool, id: Uuid) -> Result<(), DbError> {
    let result = sqlx::query("DELETE FROM workflows WHERE id = $1")
        .bind(id)
        .execute(pool)
        .await?;

    if result.rows_affected() == 0 {
        return Err(DbError::NotFound(id));
    }

    Ok(())
}

//! Repository functions and the storage seam used by the HTTP layer.

pub mod memory;
pub mod workflows;

use async_trait::async_trait;
use uuid::Uuid;

use crate::models::{NewWorkflow, WorkflowRow};
use crate::{DbError, DbPool};

pub use memory::InMemoryWorkflowRepository;

#[async_trait]
pub trait WorkflowRepository: Send + Sync {
    async fn create(&self, new: NewWorkflow) -> Result<WorkflowRow, DbError>;
    async fn get(&self, id: Uuid) -> Result<WorkflowRow, DbError>;
    async fn list(&self) -> Result<Vec<WorkflowRow>, DbError>;
    async fn update(&self, id: Uuid, new: NewWorkflow) -> Result<WorkflowRow, DbError>;
    async fn delete(&self, id: Uuid) -> Result<(), DbError>;
}

/// [`WorkflowRepository`] over a Postgres pool.
#[derive(Clone)]
pub struct PgWorkflowRepository {
    pool: DbPool,
}

impl PgWorkflowRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl WorkflowRepository for PgWorkflowRepository {
    async fn create(&self, new: NewWorkflow) -> Result<WorkflowRow, DbError> {
        workflows::create_workflow(&self.pool, &new).await
    }

    async fn get(&self, id: Uuid) -> Result<WorkflowRow, DbError> {
        workflows::get_workflow(&self.pool, id).await
    }

    async fn list(&self) -> Result<Vec<WorkflowRow>, DbError> {
        workflows::list_workflows(&self.pool).await
    }

    async fn update(&self, id: Uuid, new: NewWorkflow) -> Result<WorkflowRow, DbError> {
        workflows::update_workflow(&self.pool, id, &new).await
    }

    async fn delete(&self, id: Uuid) -> Result<(), DbError> {
        workflows::delete_workflow(&self.pool, id).await
    }
}

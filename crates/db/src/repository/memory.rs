//! In-process repository for tests and database-less servers.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::WorkflowRepository;
use crate::models::{NewWorkflow, WorkflowRow};
use crate::DbError;

#[derive(Default)]
pub struct InMemoryWorkflowRepository {
    rows: RwLock<HashMap<Uuid, WorkflowRow>>,
}

impl InMemoryWorkflowRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl WorkflowRepository for InMemoryWorkflowRepository {
    async fn create(&self, new: NewWorkflow) -> Result<WorkflowRow, DbError> {
        let now = Utc::now();
        let row = WorkflowRow {
            id: Uuid::new_v4(),
            name: new.name,
            description: new.description,
            schema: new.schema,
            created_at: now,
            updated_at: now,
        };
        self.rows.write().await.insert(row.id, row.clone());
        Ok(row)
    }

    async fn get(&self, id: Uuid) -> Result<WorkflowRow, DbError> {
        self.rows.read().await.get(&id).cloned().ok_or(DbError::NotFound(id))
    }

    async fn list(&self) -> Result<Vec<WorkflowRow>, DbError> {
        let mut rows: Vec<_> = self.rows.read().await.values().cloned().collect();
        rows.sort_by(|a, b| b.updated_at.cmp(&a.updated_at).then(a.id.cmp(&b.id)));
        Ok(rows)
    }

    async fn update(&self, id: Uuid, new: NewWorkflow) -> Result<WorkflowRow, DbError> {
        let mut rows = self.rows.write().await;
        let row = rows.get_mut(&id).ok_or(DbError::NotFound(id))?;
        row.name = new.name;
        row.description = new.description;
        row.schema = new.schema;
        row.updated_at = Utc::now();
        Ok(row.clone())
    }

    async fn delete(&self, id: Uuid) -> Result<(), DbError> {
        self.rows
            .write()
            .await
            .remove(&id)
            .map(|_| ())
            .ok_or(DbError::NotFound(id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn new(name: &str) -> NewWorkflow {
        NewWorkflow {
            name: name.into(),
            description: None,
            schema: json!({ "nodes": [], "edges": [] }),
        }
    }

    #[tokio::test]
    async fn create_then_get_round_trips_schema() {
        let repo = InMemoryWorkflowRepository::new();
        let schema = json!({ "nodes": [{ "id": "a", "type": "text-input", "position": { "x": 1, "y": 2 }, "data": {} }], "edges": [] });
        let created = repo
            .create(NewWorkflow {
                name: "Payroll".into(),
                description: Some("monthly".into()),
                schema: schema.clone(),
            })
            .await
            .unwrap();

        let fetched = repo.get(created.id).await.unwrap();
        assert_eq!(fetched, created);
        assert_eq!(fetched.schema, schema);
    }

    #[tokio::test]
    async fn update_and_delete_unknown_ids_are_not_found() {
        let repo = InMemoryWorkflowRepository::new();
        let id = Uuid::new_v4();
        assert!(matches!(repo.update(id, new("x")).await, Err(DbError::NotFound(missing)) if missing == id));
        assert!(matches!(repo.delete(id).await, Err(DbError::NotFound(_))));
    }

    #[tokio::test]
    async fn update_replaces_fields_and_keeps_created_at() {
        let repo = InMemoryWorkflowRepository::new();
        let created = repo.create(new("Draft")).await.unwrap();

        let updated = repo.update(created.id, new("Final")).await.unwrap();
        assert_eq!(updated.name, "Final");
        assert_eq!(updated.created_at, created.created_at);
        assert!(updated.updated_at >= created.updated_at);

        repo.delete(created.id).await.unwrap();
        assert!(repo.list().await.unwrap().is_empty());
    }
}

//! `db` crate — persistence of workflow definitions.
//!
//! Provides a connection pool, the `workflows` row struct, repository
//! functions over Postgres, and the [`WorkflowRepository`] seam the HTTP
//! layer talks to. A workflow's schema is stored as opaque JSON.

pub mod error;
pub mod models;
pub mod pool;
pub mod repository;

pub use error::DbError;
pub use models::{NewWorkflow, WorkflowRow};
pub use pool::DbPool;
pub use repository::{InMemoryWorkflowRepository, PgWorkflowRepository, WorkflowRepository};

use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum DbError {
    #[error("database error: {0}")]
    Sqlx(#[from] sqlx::Error),

    /// No workflow with this id.
    #[error("workflow {0} not found")]
    NotFound(Uuid),

    #[error("migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
}

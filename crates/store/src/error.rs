use thiserror::Error;

use nodes::ConfigurationError;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum StoreError {
    #[error("node '{0}' not found")]
    UnknownNode(String),

    #[error("edge '{0}' not found")]
    UnknownEdge(String),

    #[error("edge '{0}' already exists")]
    DuplicateEdge(String),

    #[error("node '{node_id}' has type {found}, expected {expected}")]
    NodeTypeMismatch {
        node_id: String,
        expected: &'static str,
        found: &'static str,
    },

    #[error(transparent)]
    Configuration(#[from] ConfigurationError),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("server answered HTTP {status}: {body}")]
    Status { status: u16, body: String },
}

//! Node-level error types.

use thiserror::Error;

/// Errors returned by an [`Agent`](crate::Agent) invocation.
///
/// There is no retry policy: the orchestrator treats every variant as fatal
/// for the run in progress.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum NodeError {
    /// The agent ran and reported a failure.
    #[error("agent invocation failed: {0}")]
    Invocation(String),

    /// The agent runtime could not be reached or answered garbage.
    #[error("agent transport error: {0}")]
    Transport(String),
}

/// Programming errors raised while constructing graph model values.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigurationError {
    /// `create_node` was given a type string outside the closed set.
    #[error("unknown node type '{0}'")]
    UnknownNodeType(String),

    /// A dynamic handle was declared in a category the node type does not have.
    #[error("node type '{node_type}' does not support dynamic handle category '{category}'")]
    UnsupportedHandleCategory {
        node_type: &'static str,
        category: String,
    },

    /// Two dynamic handles in the same category share an id.
    #[error("duplicate dynamic handle '{handle_id}' in category '{category}'")]
    DuplicateHandle { category: String, handle_id: String },

    /// The node's `data` object did not match its variant.
    #[error("invalid data for node type '{node_type}': {message}")]
    InvalidData {
        node_type: &'static str,
        message: String,
    },
}

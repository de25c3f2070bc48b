//! Engine-level error types.

use std::time::Duration;

use thiserror::Error;

/// Errors produced by the workflow engine (validation + execution).
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EngineError {
    // ------ Request / validation errors ------

    /// The run request was malformed or missing a required field.
    #[error("bad run request: {0}")]
    BadRequest(String),

    /// Structural validation reported errors; nothing was executed.
    #[error("workflow validation failed: {0}")]
    InvalidWorkflow(String),

    /// Topological ordering found a cycle.
    #[error("workflow graph contains a cycle")]
    CycleDetected,

    // ------ Execution errors ------

    /// An agent-task referenced an agent the resolver does not know.
    #[error("agent '{agent_id}' not found for node '{node_id}'")]
    AgentNotFound { node_id: String, agent_id: String },

    /// The agent call failed; the whole run is aborted.
    #[error("node '{node_id}' failed: {message}")]
    NodeFailed { node_id: String, message: String },

    /// The agent call outlived its per-node or per-run budget.
    #[error("node '{node_id}' timed out after {after:?}")]
    NodeTimedOut { node_id: String, after: Duration },

    /// A human-input node reached the executor without a value.
    #[error("node '{node_id}' is awaiting human input")]
    AwaitingInput { node_id: String },

    /// The event receiver went away; the run stopped early.
    #[error("event stream closed by client")]
    ClientDisconnected,
}

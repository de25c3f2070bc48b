//! Run events streamed from the executor to the client.
//!
//! Each event is one JSON object tagged by `type`; see [`crate::sse`] for the
//! `data: <json>\n\n` framing.

use serde::{Deserialize, Serialize};

/// One completed step, as reported in `workflow_completed`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeResult {
    pub node_id: String,
    pub agent_name: String,
    pub description: String,
    pub output: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RunEvent {
    #[serde(rename_all = "camelCase")]
    WorkflowStarted { message: String, total_nodes: usize },

    #[serde(rename_all = "camelCase")]
    NodeStarted {
        node_id: String,
        agent_name: String,
        description: String,
    },

    #[serde(rename_all = "camelCase")]
    NodeCompleted {
        node_id: String,
        agent_name: String,
        description: String,
        output: String,
    },

    #[serde(rename_all = "camelCase")]
    NodeError {
        node_id: String,
        agent_name: String,
        description: String,
        error: String,
    },

    #[serde(rename_all = "camelCase")]
    WorkflowCompleted { message: String, output: Vec<NodeResult> },

    /// Top-level failure before or outside node execution.
    Error {
        message: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
}

impl RunEvent {
    /// Node this event refers to, if any.
    pub fn node_id(&self) -> Option<&str> {
        match self {
            Self::NodeStarted { node_id, .. }
            | Self::NodeCompleted { node_id, .. }
            | Self::NodeError { node_id, .. } => Some(node_id),
            _ => None,
        }
    }

    /// Whether no further events follow this one in a well-formed run.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::WorkflowCompleted { .. } | Self::NodeError { .. } | Self::Error { .. }
        )
    }
}

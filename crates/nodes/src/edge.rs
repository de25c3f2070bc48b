//! Edges — directed connections from an output handle to an input handle.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::state::ExecutionStatus;

/// Display-only state of an edge. Always recomputable from its endpoints.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EdgeExecutionState {
    #[serde(default)]
    pub status: ExecutionStatus,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EdgeData {
    #[serde(default)]
    pub execution_state: EdgeExecutionState,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Directed edge `source.sourceHandle -> target.targetHandle`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Edge {
    pub id: String,
    pub source: String,
    pub target: String,
    #[serde(default)]
    pub source_handle: String,
    #[serde(default)]
    pub target_handle: String,
    /// Renderer hint such as `"status"`; carried through untouched.
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub edge_type: Option<String>,
    #[serde(default)]
    pub data: EdgeData,
}

impl Edge {
    pub fn new(
        id: impl Into<String>,
        source: impl Into<String>,
        source_handle: impl Into<String>,
        target: impl Into<String>,
        target_handle: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            source: source.into(),
            target: target.into(),
            source_handle: source_handle.into(),
            target_handle: target_handle.into(),
            edge_type: None,
            data: EdgeData::default(),
        }
    }

    /// `source.result -> target.target_handle`, the common case.
    pub fn from_result(
        id: impl Into<String>,
        source: impl Into<String>,
        target: impl Into<String>,
        target_handle: impl Into<String>,
    ) -> Self {
        Self::new(id, source, "result", target, target_handle)
    }

    pub fn status(&self) -> ExecutionStatus {
        self.data.execution_state.status
    }

    /// Whether this edge touches `node_id` at either end.
    pub fn touches(&self, node_id: &str) -> bool {
        self.source == node_id || self.target == node_id
    }
}

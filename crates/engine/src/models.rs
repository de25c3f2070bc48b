//! Workflow-level models shared by the validator, the executor and the
//! client store.
//!
//! Node and edge types come from the `nodes` crate; this module adds the
//! saved schema, the validated definition and the run request.

use serde::{Deserialize, Serialize};

use nodes::{Edge, Node};

use crate::EngineError;

// ---------------------------------------------------------------------------
// WorkflowSchema
// ---------------------------------------------------------------------------

/// A saved workflow: what users build and what a run request carries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowSchema {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub nodes: Vec<Node>,
    #[serde(default)]
    pub edges: Vec<Edge>,
}

impl WorkflowSchema {
    pub fn new(name: impl Into<String>, nodes: Vec<Node>, edges: Vec<Edge>) -> Self {
        Self {
            name: name.into(),
            description: None,
            nodes,
            edges,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

// ---------------------------------------------------------------------------
// WorkflowError / WorkflowDefinition
// ---------------------------------------------------------------------------

/// One structural problem found by the validator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum WorkflowError {
    /// Every edge that lies on a cycle within one strongly connected group.
    Cycle { edges: Vec<Edge> },
    /// All edges that target the same `(target, targetHandle)`.
    MultipleSourcesForTargetHandle { edges: Vec<Edge> },
    /// A node whose mandatory input handles are not connected.
    MissingRequiredConnection {
        node: Node,
        #[serde(default)]
        handles: Vec<String>,
    },
    /// An edge whose source or target node does not exist.
    DanglingEdge { edge: Edge },
    /// Every node sharing one id, in input order.
    DuplicateNodeId { nodes: Vec<Node> },
}

impl WorkflowError {
    /// Short human-readable reason, used to label a disabled "Run" control.
    pub fn describe(&self) -> String {
        fn ids(edges: &[Edge]) -> String {
            edges.iter().map(|e| e.id.as_str()).collect::<Vec<_>>().join(", ")
        }
        match self {
            Self::Cycle { edges } => format!("cycle through edges [{}]", ids(edges)),
            Self::MultipleSourcesForTargetHandle { edges } => {
                let target = edges
                    .first()
                    .map(|e| format!("{}.{}", e.target, e.target_handle))
                    .unwrap_or_default();
                format!("multiple sources for {target}: [{}]", ids(edges))
            }
            Self::MissingRequiredConnection { node, handles } => {
                format!("node '{}' is missing required input(s): {}", node.id, handles.join(", "))
            }
            Self::DanglingEdge { edge } => format!(
                "edge '{}' references a missing node ({} -> {})",
                edge.id, edge.source, edge.target
            ),
            Self::DuplicateNodeId { nodes } => {
                let id = nodes.first().map(|n| n.id.as_str()).unwrap_or_default();
                format!("node id '{id}' is used by {} nodes", nodes.len())
            }
        }
    }

    /// Nodes implicated by this error.
    pub fn node_ids(&self) -> Vec<&str> {
        match self {
            Self::Cycle { edges } | Self::MultipleSourcesForTargetHandle { edges } => edges
                .iter()
                .flat_map(|e| [e.source.as_str(), e.target.as_str()])
                .collect(),
            Self::MissingRequiredConnection { node, .. } => vec![node.id.as_str()],
            Self::DanglingEdge { edge } => vec![edge.source.as_str(), edge.target.as_str()],
            Self::DuplicateNodeId { nodes } => nodes.iter().map(|n| n.id.as_str()).collect(),
        }
    }
}

/// The validator's output. `errors` is empty iff the graph is executable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowDefinition {
    pub nodes: Vec<Node>,
    pub edges: Vec<Edge>,
    pub errors: Vec<WorkflowError>,
}

impl WorkflowDefinition {
    pub fn is_executable(&self) -> bool {
        self.errors.is_empty()
    }

    /// All error reasons joined for logs and `error` events.
    pub fn error_summary(&self) -> String {
        self.errors
            .iter()
            .map(WorkflowError::describe)
            .collect::<Vec<_>>()
            .join("; ")
    }
}

// ---------------------------------------------------------------------------
// RunRequest
// ---------------------------------------------------------------------------

/// Body of `POST /api/v1/workflows/run`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunRequest {
    pub workflow_id: String,
    pub workflow_schema: WorkflowSchema,
    pub input_query: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct LooseRunRequest {
    workflow_id: Option<String>,
    workflow_schema: Option<serde_json::Value>,
    input_query: Option<String>,
}

impl RunRequest {
    /// Parse a raw request body, naming the first missing or malformed field.
    ///
    /// # Errors
    /// [`EngineError::BadRequest`] when the body is not JSON, `workflowId`
    /// or `workflowSchema` is missing, `inputQuery` is null/absent, or the
    /// schema does not describe valid nodes and edges.
    pub fn parse(body: &[u8]) -> Result<Self, EngineError> {
        let loose: LooseRunRequest = serde_json::from_slice(body)
            .map_err(|e| EngineError::BadRequest(format!("invalid JSON body: {e}")))?;

        let workflow_id = loose
            .workflow_id
            .filter(|id| !id.is_empty())
            .ok_or_else(|| EngineError::BadRequest("missing workflowId".into()))?;
        let schema = loose
            .workflow_schema
            .filter(|v| !v.is_null())
            .ok_or_else(|| EngineError::BadRequest("missing workflowSchema".into()))?;
        let input_query = loose
            .input_query
            .ok_or_else(|| EngineError::BadRequest("missing inputQuery".into()))?;
        let workflow_schema: WorkflowSchema = serde_json::from_value(schema)
            .map_err(|e| EngineError::BadRequest(format!("invalid workflowSchema: {e}")))?;

        Ok(Self {
            workflow_id,
            workflow_schema,
            input_query,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn body(value: serde_json::Value) -> Vec<u8> {
        serde_json::to_vec(&value).unwrap()
    }

    #[test]
    fn parses_complete_request() {
        let req = RunRequest::parse(&body(json!({
            "workflowId": "wf-1",
            "workflowSchema": { "name": "Month end", "nodes": [], "edges": [] },
            "inputQuery": ""
        })))
        .unwrap();
        assert_eq!(req.workflow_id, "wf-1");
        assert_eq!(req.workflow_schema.name, "Month end");
        assert_eq!(req.input_query, "");
    }

    #[test]
    fn rejects_missing_fields() {
        let missing_id = RunRequest::parse(&body(json!({
            "workflowSchema": { "name": "x" }, "inputQuery": "q"
        })));
        assert_eq!(missing_id, Err(EngineError::BadRequest("missing workflowId".into())));

        let null_query = RunRequest::parse(&body(json!({
            "workflowId": "wf", "workflowSchema": { "name": "x" }, "inputQuery": null
        })));
        assert_eq!(null_query, Err(EngineError::BadRequest("missing inputQuery".into())));

        let no_schema = RunRequest::parse(&body(json!({ "workflowId": "wf", "inputQuery": "q" })));
        assert_eq!(no_schema, Err(EngineError::BadRequest("missing workflowSchema".into())));
    }

    #[test]
    fn rejects_non_json_body() {
        assert!(matches!(RunRequest::parse(b"not json"), Err(EngineError::BadRequest(_))));
    }

    #[test]
    fn workflow_error_uses_kebab_tags() {
        let err = WorkflowError::Cycle { edges: vec![] };
        assert_eq!(serde_json::to_value(&err).unwrap(), json!({ "type": "cycle", "edges": [] }));
    }

    #[test]
    fn schema_with_nodes_deserializes() {
        let schema: WorkflowSchema = serde_json::from_value(json!({
            "name": "Month end",
            "nodes": [
                { "id": "q", "type": "text-input", "position": { "x": 0, "y": 0 },
                  "data": { "value": "Which month?" } },
                { "id": "a", "type": "agent-task", "position": { "x": 300, "y": 0 },
                  "data": { "agentId": "bookkeeper", "description": "Close the books" } }
            ],
            "edges": [
                { "id": "e1", "source": "q", "sourceHandle": "result",
                  "target": "a", "targetHandle": "prompt" }
            ]
        }))
        .unwrap();
        assert_eq!(schema.nodes.len(), 2);
        assert_eq!(schema.nodes[0].type_name(), "text-input");
        assert_eq!(schema.edges[0].target_handle, "prompt");
    }

    #[test]
    fn definition_with_node_errors_survives_the_wire() {
        let node = Node::agent_task("a", "bookkeeper", "");
        let definition = WorkflowDefinition {
            nodes: vec![node.clone()],
            edges: vec![],
            errors: vec![
                WorkflowError::MissingRequiredConnection { node: node.clone(), handles: vec!["prompt".into()] },
                WorkflowError::DuplicateNodeId { nodes: vec![node.clone(), node] },
            ],
        };
        let wire = serde_json::to_value(&definition).unwrap();
        assert_eq!(wire["errors"][1]["type"], "duplicate-node-id");
        let back: WorkflowDefinition = serde_json::from_value(wire).unwrap();
        assert_eq!(back, definition);
    }
}

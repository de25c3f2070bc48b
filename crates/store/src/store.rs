//! Execution state store.
//!
//! `WorkflowStore` owns the node/edge set of one workflow instance and its
//! run-time state. Every mutation goes through a method here: graph edits,
//! execution state patches, human answers, and the events of a run.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use engine::sse::{decode_events, SseError};
use engine::{
    execution_order, layout, prepare_workflow, LayoutConfig, RunEvent, RunRequest, WorkflowError,
    WorkflowSchema,
};
use nodes::{
    create_node, Edge, ErrorRecord, ExecutionState, ExecutionStatePatch, ExecutionStatus, Node,
    NodeData, Position,
};

use crate::transport::RunTransport;
use crate::StoreError;

// ---------------------------------------------------------------------------
// Configuration and results
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub struct StoreConfig {
    /// Successful runs allowed per workflow instance.
    pub max_runs: u32,
    pub layout: LayoutConfig,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            max_runs: 3,
            layout: LayoutConfig::default(),
        }
    }
}

/// One unanswered human-input node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InputIssue {
    pub node_id: String,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InputValidation {
    pub is_valid: bool,
    pub errors: Vec<InputIssue>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StartStatus {
    Success,
    Error,
}

/// Outcome of [`WorkflowStore::start_execution`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StartResult {
    pub status: StartStatus,
    pub message: String,
}

impl StartResult {
    fn success(message: impl Into<String>) -> Self {
        Self {
            status: StartStatus::Success,
            message: message.into(),
        }
    }

    fn error(message: impl Into<String>) -> Self {
        Self {
            status: StartStatus::Error,
            message: message.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == StartStatus::Success
    }
}

/// Derived display status of an edge from its two endpoints.
///
/// | source | target | edge |
/// |---|---|---|
/// | error or any | any or error | error |
/// | completed | completed | completed |
/// | running / completed | running | running |
/// | completed | idle | completed |
/// | otherwise | | idle |
pub fn edge_status(source: ExecutionStatus, target: ExecutionStatus) -> ExecutionStatus {
    use ExecutionStatus::*;
    match (source, target) {
        (Error, _) | (_, Error) => Error,
        (Completed, Completed) => Completed,
        (Running | Completed, Running) => Running,
        (Completed, Idle) => Completed,
        _ => Idle,
    }
}

// ---------------------------------------------------------------------------
// WorkflowStore
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct WorkflowStore {
    workflow_id: String,
    name: String,
    description: Option<String>,
    nodes: Vec<Node>,
    edges: Vec<Edge>,
    errors: Vec<WorkflowError>,
    node_user_inputs: HashMap<String, String>,
    run_count: u32,
    last_completed_at: Option<DateTime<Utc>>,
    last_error: Option<String>,
    config: StoreConfig,
}

impl Default for WorkflowStore {
    fn default() -> Self {
        Self::new(StoreConfig::default())
    }
}

impl WorkflowStore {
    pub fn new(config: StoreConfig) -> Self {
        Self {
            workflow_id: Uuid::new_v4().to_string(),
            name: "Untitled workflow".to_owned(),
            description: None,
            nodes: Vec::new(),
            edges: Vec::new(),
            errors: Vec::new(),
            node_user_inputs: HashMap::new(),
            run_count: 0,
            last_completed_at: None,
            last_error: None,
            config,
        }
    }

    // -- accessors ----------------------------------------------------------

    pub fn workflow_id(&self) -> &str {
        &self.workflow_id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn edges(&self) -> &[Edge] {
        &self.edges
    }

    pub fn node(&self, id: &str) -> Option<&Node> {
        self.nodes.iter().find(|n| n.id == id)
    }

    pub fn edge(&self, id: &str) -> Option<&Edge> {
        self.edges.iter().find(|e| e.id == id)
    }

    /// Structural errors from the last validation.
    pub fn errors(&self) -> &[WorkflowError] {
        &self.errors
    }

    pub fn run_count(&self) -> u32 {
        self.run_count
    }

    pub fn last_completed_at(&self) -> Option<DateTime<Utc>> {
        self.last_completed_at
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub fn user_input(&self, node_id: &str) -> Option<&str> {
        self.node_user_inputs.get(node_id).map(String::as_str)
    }

    /// Current graph as the schema sent with a run request.
    pub fn schema(&self) -> WorkflowSchema {
        WorkflowSchema {
            name: self.name.clone(),
            description: self.description.clone(),
            nodes: self.nodes.clone(),
            edges: self.edges.clone(),
        }
    }

    // -- loading and validation ---------------------------------------------

    /// Replace the graph, lay it out, then validate it.
    ///
    /// This starts a new workflow instance: the run counter and any stored
    /// answers are reset. Answers already present on human-input nodes are
    /// picked up.
    pub fn initialize_workflow(
        &mut self,
        nodes: Vec<Node>,
        edges: Vec<Edge>,
        name: Option<String>,
        description: Option<String>,
    ) {
        let laid_out = layout(&nodes, &edges, &self.config.layout);
        self.nodes = laid_out.nodes;
        self.edges = laid_out.edges;
        self.workflow_id = Uuid::new_v4().to_string();
        if let Some(name) = name {
            self.name = name;
        }
        self.description = description;
        self.run_count = 0;
        self.last_completed_at = None;
        self.last_error = None;

        self.node_user_inputs = self
            .nodes
            .iter()
            .filter_map(|n| match &n.data {
                NodeData::HumanInput(d) => d.user_input.clone().map(|v| (n.id.clone(), v)),
                _ => None,
            })
            .filter(|(_, v)| !v.trim().is_empty())
            .collect();

        info!(workflow = %self.name, nodes = self.nodes.len(), edges = self.edges.len(), "workflow loaded");
        self.validate_workflow();
    }

    /// Re-run the validator on the current graph.
    ///
    /// Nodes named by a `missing-required-connection` error are reset to
    /// `idle` so a stale result does not outlive the broken connection, and
    /// edge statuses are recomputed from the reset nodes.
    pub fn validate_workflow(&mut self) -> &[WorkflowError] {
        let definition = prepare_workflow(&self.nodes, &self.edges);
        let mut reset = false;
        for error in &definition.errors {
            if let WorkflowError::MissingRequiredConnection { node, .. } = error {
                if let Some(stored) = self.nodes.iter_mut().find(|n| n.id == node.id) {
                    stored.execution_state = ExecutionState::idle();
                    reset = true;
                }
            }
        }
        if reset {
            self.update_edge_status_from_nodes();
        }
        if !definition.errors.is_empty() {
            debug!(errors = definition.errors.len(), "workflow has structural errors");
        }
        self.errors = definition.errors;
        &self.errors
    }

    /// Every human-input node, in execution order, must have a non-blank
    /// stored answer.
    pub fn validate_inputs_before_execution(&self) -> InputValidation {
        let ordered: Vec<&Node> = match execution_order(&self.nodes, &self.edges) {
            Ok(order) => order.iter().filter_map(|id| self.node(id)).collect(),
            Err(_) => self.nodes.iter().collect(),
        };

        let errors: Vec<InputIssue> = ordered
            .into_iter()
            .filter(|n| n.is_human_input())
            .filter(|n| {
                self.node_user_inputs
                    .get(&n.id)
                    .map_or(true, |v| v.trim().is_empty())
            })
            .map(|n| InputIssue {
                node_id: n.id.clone(),
                message: format!("Input required for '{}'", n.description()),
            })
            .collect();

        InputValidation {
            is_valid: errors.is_empty(),
            errors,
        }
    }

    // -- execution state ----------------------------------------------------

    /// Merge `patch` into a node's execution state.
    pub fn update_node_execution_state(
        &mut self,
        node_id: &str,
        patch: ExecutionStatePatch,
    ) -> Result<(), StoreError> {
        let node = self
            .nodes
            .iter_mut()
            .find(|n| n.id == node_id)
            .ok_or_else(|| StoreError::UnknownNode(node_id.to_owned()))?;
        node.execution_state.apply(patch);
        Ok(())
    }

    /// Set an edge's status. Other edge data is kept.
    pub fn update_edge_execution_state(
        &mut self,
        edge_id: &str,
        status: ExecutionStatus,
    ) -> Result<(), StoreError> {
        let edge = self
            .edges
            .iter_mut()
            .find(|e| e.id == edge_id)
            .ok_or_else(|| StoreError::UnknownEdge(edge_id.to_owned()))?;
        edge.data.execution_state.status = status;
        Ok(())
    }

    /// Recompute every edge's status from its endpoints; see [`edge_status`].
    pub fn update_edge_status_from_nodes(&mut self) {
        let status_of: HashMap<&str, ExecutionStatus> = self
            .nodes
            .iter()
            .map(|n| (n.id.as_str(), n.execution_state.status))
            .collect();
        for edge in &mut self.edges {
            let source = status_of.get(edge.source.as_str()).copied().unwrap_or_default();
            let target = status_of.get(edge.target.as_str()).copied().unwrap_or_default();
            edge.data.execution_state.status = edge_status(source, target);
        }
    }

    /// Record the answer for a human-input node.
    pub fn update_node_user_input(&mut self, node_id: &str, value: impl Into<String>) -> Result<(), StoreError> {
        let value = value.into();
        let node = self
            .nodes
            .iter_mut()
            .find(|n| n.id == node_id)
            .ok_or_else(|| StoreError::UnknownNode(node_id.to_owned()))?;
        match &mut node.data {
            NodeData::HumanInput(data) => data.user_input = Some(value.clone()),
            other => {
                return Err(StoreError::NodeTypeMismatch {
                    node_id: node_id.to_owned(),
                    expected: "human-input",
                    found: other.node_type().as_str(),
                })
            }
        }
        self.node_user_inputs.insert(node_id.to_owned(), value);
        Ok(())
    }

    fn reset_execution_states(&mut self) {
        for node in &mut self.nodes {
            node.execution_state = ExecutionState::idle();
        }
        for edge in &mut self.edges {
            edge.data.execution_state.status = ExecutionStatus::Idle;
        }
    }

    // -- running ------------------------------------------------------------

    /// Run the workflow through `transport`, applying each event as it
    /// arrives.
    ///
    /// Refused locally, without opening the transport, when the run cap is
    /// reached, a human-input node is unanswered, or the graph has
    /// structural errors. Firing `cancel` stops all further state changes.
    #[instrument(skip_all, fields(workflow = %self.name, run = self.run_count + 1))]
    pub async fn start_execution(
        &mut self,
        transport: &dyn RunTransport,
        input_query: &str,
        cancel: &CancellationToken,
    ) -> StartResult {
        if cancel.is_cancelled() {
            return StartResult::error("Execution cancelled");
        }
        if self.run_count >= self.config.max_runs {
            warn!(run_count = self.run_count, "run cap reached");
            return StartResult::error(format!(
                "Maximum number of runs ({}) reached for this workflow",
                self.config.max_runs
            ));
        }

        let inputs = self.validate_inputs_before_execution();
        if !inputs.is_valid {
            let missing: Vec<&str> = inputs.errors.iter().map(|e| e.node_id.as_str()).collect();
            warn!(?missing, "human input missing");
            return StartResult::error(format!("Missing human input for: {}", missing.join(", ")));
        }

        if !self.validate_workflow().is_empty() {
            return StartResult::error("Workflow validation failed");
        }

        self.reset_execution_states();
        self.last_error = None;

        let request = RunRequest {
            workflow_id: self.workflow_id.clone(),
            workflow_schema: self.schema(),
            input_query: input_query.to_owned(),
        };

        let body = tokio::select! {
            biased;
            _ = cancel.cancelled() => return StartResult::error("Execution cancelled"),
            opened = transport.open(&request) => opened,
        };
        let body = match body {
            Ok(body) => body,
            Err(e) => {
                warn!(error = %e, "could not open run stream");
                self.last_error = Some(e.to_string());
                return StartResult::error(e.to_string());
            }
        };

        let mut events = Box::pin(decode_events(body));
        let mut completed = false;
        loop {
            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    info!("run stream closed by caller");
                    return StartResult::error("Execution cancelled");
                }
                next = events.next() => next,
            };
            match next {
                Some(Ok(event)) => {
                    completed |= matches!(event, RunEvent::WorkflowCompleted { .. });
                    self.apply_event(&event);
                }
                Some(Err(SseError::Decode { payload, message })) => {
                    warn!(%payload, %message, "skipping undecodable event");
                }
                Some(Err(e @ SseError::Transport(_))) => {
                    warn!(error = %e, "run stream failed");
                    self.last_error = Some(e.to_string());
                    return StartResult::error(e.to_string());
                }
                None => break,
            }
        }

        if completed {
            StartResult::success("Workflow completed successfully")
        } else {
            let message = self
                .last_error
                .get_or_insert_with(|| "Run ended before the workflow completed".to_owned())
                .clone();
            StartResult::error(message)
        }
    }

    /// Fold one run event into the store.
    pub fn apply_event(&mut self, event: &RunEvent) {
        let patched = match event {
            RunEvent::WorkflowStarted { total_nodes, .. } => {
                debug!(total_nodes, "run started");
                None
            }
            RunEvent::NodeStarted { node_id, .. } => Some((
                node_id,
                ExecutionStatePatch::status(ExecutionStatus::Running),
            )),
            RunEvent::NodeCompleted { node_id, output, .. } => {
                Some((node_id, ExecutionStatePatch::completed(output.clone())))
            }
            RunEvent::NodeError { node_id, error, .. } => {
                self.last_error = Some(format!("{node_id}: {error}"));
                Some((node_id, ExecutionStatePatch::failed(ErrorRecord::new(error.clone()))))
            }
            RunEvent::WorkflowCompleted { output, .. } => {
                self.run_count += 1;
                self.last_completed_at = Some(Utc::now());
                info!(run_count = self.run_count, results = output.len(), "run completed");
                None
            }
            RunEvent::Error { message, error } => {
                self.last_error = Some(match error {
                    Some(detail) => format!("{message}: {detail}"),
                    None => message.clone(),
                });
                None
            }
        };

        if let Some((node_id, patch)) = patched {
            if let Err(e) = self.update_node_execution_state(node_id, patch) {
                warn!(error = %e, "event for a node this store does not hold");
            }
            self.update_edge_status_from_nodes();
        }
    }

    // -- graph editing ------------------------------------------------------

    /// Add an empty node of the named type and return its id.
    pub fn add_node(&mut self, type_name: &str, position: Position) -> Result<String, StoreError> {
        let node = create_node(type_name, position)?;
        let id = node.id.clone();
        self.nodes.push(node);
        self.validate_workflow();
        Ok(id)
    }

    /// Remove a node, its edges and its stored answer.
    pub fn remove_node(&mut self, node_id: &str) -> Result<(), StoreError> {
        let before = self.nodes.len();
        self.nodes.retain(|n| n.id != node_id);
        if self.nodes.len() == before {
            return Err(StoreError::UnknownNode(node_id.to_owned()));
        }
        self.edges.retain(|e| !e.touches(node_id));
        self.node_user_inputs.remove(node_id);
        self.validate_workflow();
        Ok(())
    }

    pub fn connect(&mut self, edge: Edge) -> Result<(), StoreError> {
        if self.edge(&edge.id).is_some() {
            return Err(StoreError::DuplicateEdge(edge.id));
        }
        for end in [&edge.source, &edge.target] {
            if self.node(end).is_none() {
                return Err(StoreError::UnknownNode(end.clone()));
            }
        }
        self.edges.push(edge);
        self.validate_workflow();
        Ok(())
    }

    pub fn remove_edge(&mut self, edge_id: &str) -> Result<(), StoreError> {
        let before = self.edges.len();
        self.edges.retain(|e| e.id != edge_id);
        if self.edges.len() == before {
            return Err(StoreError::UnknownEdge(edge_id.to_owned()));
        }
        self.validate_workflow();
        Ok(())
    }

    /// Replace a node's data. The node type cannot change.
    pub fn update_node_data(&mut self, node_id: &str, data: NodeData) -> Result<(), StoreError> {
        let node = self
            .nodes
            .iter_mut()
            .find(|n| n.id == node_id)
            .ok_or_else(|| StoreError::UnknownNode(node_id.to_owned()))?;
        if node.node_type() != data.node_type() {
            return Err(StoreError::NodeTypeMismatch {
                node_id: node_id.to_owned(),
                expected: data.node_type().as_str(),
                found: node.node_type().as_str(),
            });
        }
        if let NodeData::HumanInput(d) = &data {
            match d.user_input.as_deref().filter(|v| !v.trim().is_empty()) {
                Some(v) => self.node_user_inputs.insert(node_id.to_owned(), v.to_owned()),
                None => self.node_user_inputs.remove(node_id),
            };
        }
        node.data = data;
        self.validate_workflow();
        Ok(())
    }

    /// Forget the graph and all run state.
    pub fn reset_workflow(&mut self) {
        *self = Self::new(self.config.clone());
    }
}

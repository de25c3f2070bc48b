//! Workflow execution engine.
//!
//! `WorkflowExecutor` is the central orchestrator:
//! 1. Validates the graph and refuses to run one with structural errors.
//! 2. Walks the nodes once, strictly sequentially, in topological order.
//! 3. Passes each step's text output on as the next step's running input.
//! 4. Streams lifecycle events (`workflow_started`, `node_*`,
//!    `workflow_completed`) over an mpsc channel.
//! 5. Treats a missing agent, a failed agent call or a timeout as fatal:
//!    one `node_error`, then nothing more.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{error, info, instrument, warn};

use nodes::{AgentRequest, AgentResolver, Node, NodeData};

use crate::dag::{execution_order, prepare_workflow};
use crate::events::{NodeResult, RunEvent};
use crate::models::{RunRequest, WorkflowSchema};
use crate::EngineError;

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Tuning knobs for the executor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutorConfig {
    /// Upper bound for a single agent call.
    pub node_timeout: Duration,
    /// Upper bound for the whole run, across all agent calls.
    pub run_timeout: Duration,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            node_timeout: Duration::from_secs(120),
            run_timeout: Duration::from_secs(600),
        }
    }
}

// ---------------------------------------------------------------------------
// WorkflowExecutor
// ---------------------------------------------------------------------------

/// Stateless orchestrator that runs workflows against a set of agents.
///
/// Construct one per process and call [`WorkflowExecutor::handle`] with a raw
/// request body, or [`WorkflowExecutor::run`] with an already parsed schema.
#[derive(Clone)]
pub struct WorkflowExecutor {
    agents: Arc<dyn AgentResolver>,
    config: ExecutorConfig,
}

/// Per-run bookkeeping.
struct RunState<'a> {
    schema: &'a WorkflowSchema,
    /// Text handed to the next node.
    current: String,
    /// Output of every completed node, by id.
    outputs: HashMap<&'a str, String>,
    results: Vec<NodeResult>,
    deadline: Instant,
}

impl WorkflowExecutor {
    pub fn new(agents: Arc<dyn AgentResolver>, config: ExecutorConfig) -> Self {
        Self { agents, config }
    }

    pub fn config(&self) -> &ExecutorConfig {
        &self.config
    }

    /// Parse a raw run request and execute it.
    ///
    /// Request errors never escape as `Err` to the transport: they are sent
    /// as a single `error` event before anything else, and the function
    /// returns. Run failures have already been reported as events by
    /// [`WorkflowExecutor::run`].
    pub async fn handle(&self, body: &[u8], events: mpsc::Sender<RunEvent>) {
        let request = match RunRequest::parse(body) {
            Ok(request) => request,
            Err(e) => {
                warn!(error = %e, "rejecting run request");
                let _ = events
                    .send(RunEvent::Error {
                        message: "Invalid workflow run request".into(),
                        error: Some(e.to_string()),
                    })
                    .await;
                return;
            }
        };

        info!(workflow_id = %request.workflow_id, "run request accepted");
        if let Err(e) = self
            .run(&request.workflow_schema, &request.input_query, &events)
            .await
        {
            info!(workflow_id = %request.workflow_id, error = %e, "run ended early");
        }
    }

    /// Run the workflow and return the per-node results.
    ///
    /// # Errors
    /// Returns `EngineError` for validation failures, a missing agent, a
    /// failed or timed-out agent call, an unanswered human-input node, or a
    /// closed event channel. Every error except the last has already been
    /// reported on `events` when this returns.
    #[instrument(skip_all, fields(workflow = %schema.name))]
    pub async fn run(
        &self,
        schema: &WorkflowSchema,
        input: &str,
        events: &mpsc::Sender<RunEvent>,
    ) -> Result<Vec<NodeResult>, EngineError> {
        // ------------------------------------------------------------------
        // Validate and topologically sort the graph.
        // ------------------------------------------------------------------
        let definition = prepare_workflow(&schema.nodes, &schema.edges);
        if !definition.is_executable() {
            let summary = definition.error_summary();
            warn!(errors = definition.errors.len(), "refusing to run invalid workflow");
            emit(
                events,
                RunEvent::Error {
                    message: "Workflow validation failed".into(),
                    error: Some(summary.clone()),
                },
            )
            .await?;
            return Err(EngineError::InvalidWorkflow(summary));
        }
        let order = execution_order(&schema.nodes, &schema.edges)?;
        let by_id: HashMap<&str, &Node> = schema.nodes.iter().map(|n| (n.id.as_str(), n)).collect();

        info!("executing {} nodes in order: {:?}", order.len(), order);
        emit(
            events,
            RunEvent::WorkflowStarted {
                message: format!("Starting workflow: {}", schema.name),
                total_nodes: order.len(),
            },
        )
        .await?;

        // ------------------------------------------------------------------
        // Execute nodes sequentially.
        // ------------------------------------------------------------------
        let mut state = RunState {
            schema,
            current: input.to_owned(),
            outputs: HashMap::new(),
            results: Vec::with_capacity(order.len()),
            deadline: Instant::now() + self.config.run_timeout,
        };

        for node_id in &order {
            let Some(node) = by_id.get(node_id.as_str()).copied() else {
                continue;
            };
            let (agent_name, output) = match &node.data {
                NodeData::HumanInput(data) => match data.supplied_value() {
                    Some(value) => (node.agent_name().to_owned(), value.to_owned()),
                    None => {
                        let err = EngineError::AwaitingInput { node_id: node.id.clone() };
                        fail(events, node, node.agent_name(), "Awaiting human input".into()).await?;
                        return Err(err);
                    }
                },
                NodeData::AgentTask(_) => self.run_agent_task(node, &state, events).await?,
                NodeData::PromptCrafter(data) => {
                    started(events, node, node.agent_name()).await?;
                    (node.agent_name().to_owned(), render_template(node, &data.template, &state))
                }
                NodeData::VisualizeText(_) => {
                    started(events, node, node.agent_name()).await?;
                    (node.agent_name().to_owned(), state.current.clone())
                }
            };

            info!(node_id = %node.id, "node completed");
            let result = NodeResult {
                node_id: node.id.clone(),
                agent_name,
                description: node.description(),
                output: output.clone(),
            };
            emit(
                events,
                RunEvent::NodeCompleted {
                    node_id: result.node_id.clone(),
                    agent_name: result.agent_name.clone(),
                    description: result.description.clone(),
                    output: result.output.clone(),
                },
            )
            .await?;
            state.outputs.insert(node.id.as_str(), output.clone());
            state.current = output;
            state.results.push(result);
        }

        // ------------------------------------------------------------------
        // Report success.
        // ------------------------------------------------------------------
        info!(nodes = state.results.len(), "workflow completed");
        emit(
            events,
            RunEvent::WorkflowCompleted {
                message: "Workflow completed successfully".into(),
                output: state.results.clone(),
            },
        )
        .await?;

        Ok(state.results)
    }

    // -----------------------------------------------------------------------
    // Internal: one agent-task node.
    // -----------------------------------------------------------------------

    async fn run_agent_task(
        &self,
        node: &Node,
        state: &RunState<'_>,
        events: &mpsc::Sender<RunEvent>,
    ) -> Result<(String, String), EngineError> {
        let NodeData::AgentTask(data) = &node.data else {
            return Err(EngineError::NodeFailed {
                node_id: node.id.clone(),
                message: "not an agent task".into(),
            });
        };

        let Some(agent) = self.agents.agent_for(&data.agent_id) else {
            started(events, node, &data.agent_id).await?;
            error!(node_id = %node.id, agent = %data.agent_id, "agent not found");
            fail(events, node, &data.agent_id, format!("Agent '{}' not found", data.agent_id)).await?;
            return Err(EngineError::AgentNotFound {
                node_id: node.id.clone(),
                agent_id: data.agent_id.clone(),
            });
        };
        let agent_name = agent.name().to_owned();
        started(events, node, &agent_name).await?;

        let prompt = wired_output(node, "prompt", state).unwrap_or_else(|| data.description.clone());
        let system = wired_output(node, "system", state).unwrap_or_else(|| workflow_context(state.schema));
        let encoded_input = serde_json::to_string(&state.current).unwrap_or_default();
        let request = AgentRequest {
            system,
            prompt: format!("{prompt}\n\nInput: {encoded_input}"),
            context: serde_json::Value::String(state.current.clone()),
        };

        let budget = self
            .config
            .node_timeout
            .min(state.deadline.saturating_duration_since(Instant::now()));

        let outcome = tokio::select! {
            outcome = tokio::time::timeout(budget, agent.generate(request)) => outcome,
            _ = events.closed() => {
                warn!(node_id = %node.id, "client went away mid-call; abandoning run");
                return Err(EngineError::ClientDisconnected);
            }
        };

        match outcome {
            Ok(Ok(reply)) => Ok((agent_name, reply.text)),
            Ok(Err(e)) => {
                error!(node_id = %node.id, agent = %agent_name, error = %e, "agent call failed");
                fail(events, node, &agent_name, e.to_string()).await?;
                Err(EngineError::NodeFailed {
                    node_id: node.id.clone(),
                    message: e.to_string(),
                })
            }
            Err(_) => {
                error!(node_id = %node.id, agent = %agent_name, ?budget, "agent call timed out");
                fail(events, node, &agent_name, format!("Agent call timed out after {budget:?}")).await?;
                Err(EngineError::NodeTimedOut {
                    node_id: node.id.clone(),
                    after: budget,
                })
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

async fn emit(events: &mpsc::Sender<RunEvent>, event: RunEvent) -> Result<(), EngineError> {
    events
        .send(event)
        .await
        .map_err(|_| EngineError::ClientDisconnected)
}

async fn started(events: &mpsc::Sender<RunEvent>, node: &Node, agent_name: &str) -> Result<(), EngineError> {
    emit(
        events,
        RunEvent::NodeStarted {
            node_id: node.id.clone(),
            agent_name: agent_name.to_owned(),
            description: node.description(),
        },
    )
    .await
}

async fn fail(
    events: &mpsc::Sender<RunEvent>,
    node: &Node,
    agent_name: &str,
    error: String,
) -> Result<(), EngineError> {
    emit(
        events,
        RunEvent::NodeError {
            node_id: node.id.clone(),
            agent_name: agent_name.to_owned(),
            description: node.description(),
            error,
        },
    )
    .await
}

/// Output of the node wired into `node.handle`, if that node already ran.
fn wired_output(node: &Node, handle: &str, state: &RunState<'_>) -> Option<String> {
    state
        .schema
        .edges
        .iter()
        .find(|e| e.target == node.id && e.target_handle == handle)
        .and_then(|e| state.outputs.get(e.source.as_str()))
        .cloned()
}

/// System context shared by every agent call in the run.
fn workflow_context(schema: &WorkflowSchema) -> String {
    match schema.description.as_deref().filter(|d| !d.trim().is_empty()) {
        Some(description) => format!("Workflow: {}\n{}", schema.name, description),
        None => format!("Workflow: {}", schema.name),
    }
}

/// Fill `{{name}}` placeholders from the nodes wired into each template tag;
/// unwired tags fall back to the running input. The template is scanned once,
/// so substituted text is never searched for further placeholders.
fn render_template(node: &Node, template: &str, state: &RunState<'_>) -> String {
    let values: HashMap<&str, String> = node
        .dynamic_handles
        .get(nodes::HandleCategory::TemplateTags)
        .iter()
        .map(|handle| {
            let value = wired_output(node, &handle.id, state).unwrap_or_else(|| state.current.clone());
            (handle.name.as_str(), value)
        })
        .collect();

    let mut rendered = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(open) = rest.find("{{") {
        let (before, tail) = rest.split_at(open);
        rendered.push_str(before);
        let Some(close) = tail[2..].find("}}") else {
            rest = tail;
            break;
        };
        let name = &tail[2..2 + close];
        match values.get(name) {
            Some(value) => {
                rendered.push_str(value);
                rest = &tail[close + 4..];
            }
            // Not a tag: keep one brace so `{{{tag}}` still finds its tag.
            None => {
                rendered.push('{');
                rest = &tail[1..];
            }
        }
    }
    rendered.push_str(rest);
    rendered
}

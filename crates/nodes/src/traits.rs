//! The `Agent` trait — the contract every agent backend must fulfil.
//!
//! Agents are opaque to the engine: one async call that turns a system
//! context and a prompt into text, or fails.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::NodeError;

/// Everything an agent receives for one step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentRequest {
    /// Workflow-level context.
    pub system: String,
    /// Node prompt followed by the JSON-encoded running input.
    pub prompt: String,
    /// The running input as structured JSON.
    pub context: Value,
}

/// What an agent returns on success.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentReply {
    pub text: String,
}

/// The core agent trait.
#[async_trait]
pub trait Agent: Send + Sync {
    /// Display name reported in run events.
    fn name(&self) -> &str;

    /// Run one step.
    async fn generate(&self, request: AgentRequest) -> Result<AgentReply, NodeError>;
}

/// Looks up agents by the id stored on an agent-task node.
pub trait AgentResolver: Send + Sync {
    fn agent_for(&self, agent_id: &str) -> Option<Arc<dyn Agent>>;
}

/// Maps agent ids to shared `Agent` implementations.
#[derive(Default, Clone)]
pub struct AgentRegistry {
    agents: HashMap<String, Arc<dyn Agent>>,
}

impl AgentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, agent_id: impl Into<String>, agent: Arc<dyn Agent>) {
        self.agents.insert(agent_id.into(), agent);
    }

    pub fn with(mut self, agent_id: impl Into<String>, agent: Arc<dyn Agent>) -> Self {
        self.register(agent_id, agent);
        self
    }

    pub fn len(&self) -> usize {
        self.agents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.agents.is_empty()
    }
}

impl AgentResolver for AgentRegistry {
    fn agent_for(&self, agent_id: &str) -> Option<Arc<dyn Agent>> {
        self.agents.get(agent_id).cloned()
    }
}

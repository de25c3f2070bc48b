//! `MockAgent` — a test double for `Agent`.
//!
//! Useful in unit and integration tests where a hosted agent runtime is
//! either unavailable or irrelevant.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use crate::{Agent, AgentReply, AgentRequest, NodeError};

/// Behaviour injected into `MockAgent` at construction time.
pub enum MockBehaviour {
    /// Reply with fixed text.
    Reply(String),
    /// Reply with the request prompt, prefixed by the agent name.
    Echo,
    /// Fail with an `Invocation` error.
    Fail(String),
    /// Sleep before replying; for timeout tests.
    Delay(Duration, String),
}

/// A mock agent that records every request it receives and answers with a
/// programmer-specified result.
pub struct MockAgent {
    /// Label reported as the agent name.
    pub name: String,
    pub behaviour: MockBehaviour,
    /// All requests seen by this agent (in call order).
    pub calls: Arc<Mutex<Vec<AgentRequest>>>,
}

impl MockAgent {
    fn with_behaviour(name: impl Into<String>, behaviour: MockBehaviour) -> Self {
        Self {
            name: name.into(),
            behaviour,
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Create a mock that always succeeds with `text`.
    pub fn replying(name: impl Into<String>, text: impl Into<String>) -> Self {
        Self::with_behaviour(name, MockBehaviour::Reply(text.into()))
    }

    /// Create a mock that echoes its prompt.
    pub fn echoing(name: impl Into<String>) -> Self {
        Self::with_behaviour(name, MockBehaviour::Echo)
    }

    /// Create a mock that always fails.
    pub fn failing(name: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::with_behaviour(name, MockBehaviour::Fail(msg.into()))
    }

    /// Create a mock that replies after `delay`.
    pub fn delayed(name: impl Into<String>, delay: Duration, text: impl Into<String>) -> Self {
        Self::with_behaviour(name, MockBehaviour::Delay(delay, text.into()))
    }

    /// Number of times this agent has been invoked.
    pub fn call_count(&self) -> usize {
        self.calls.lock().map(|c| c.len()).unwrap_or(0)
    }

    /// Copy of the recorded requests.
    pub fn requests(&self) -> Vec<AgentRequest> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl Agent for MockAgent {
    fn name(&self) -> &str {
        &self.name
    }

    async fn generate(&self, request: AgentRequest) -> Result<AgentReply, NodeError> {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(request.clone());
        }

        match &self.behaviour {
            MockBehaviour::Reply(text) => Ok(AgentReply { text: text.clone() }),
            MockBehaviour::Echo => Ok(AgentReply {
                text: format!("{}: {}", self.name, request.prompt),
            }),
            MockBehaviour::Fail(msg) => Err(NodeError::Invocation(msg.clone())),
            MockBehaviour::Delay(delay, text) => {
                tokio::time::sleep(*delay).await;
                Ok(AgentReply { text: text.clone() })
            }
        }
    }
}

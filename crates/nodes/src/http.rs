//! `HttpAgent` — an `Agent` backed by a hosted agent runtime.
//!
//! The runtime is reached with a JSON `POST {system, prompt, context}` and
//! answers `{text}`.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

use crate::{Agent, AgentRegistry, AgentReply, AgentRequest, NodeError};

/// One entry of the agents file.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct AgentSpec {
    /// Id referenced by agent-task nodes.
    pub id: String,
    /// Display name; defaults to the id.
    #[serde(default)]
    pub name: Option<String>,
    pub endpoint: String,
}

pub struct HttpAgent {
    name: String,
    endpoint: String,
    client: reqwest::Client,
}

impl HttpAgent {
    pub fn new(name: impl Into<String>, endpoint: impl Into<String>, client: reqwest::Client) -> Self {
        Self {
            name: name.into(),
            endpoint: endpoint.into(),
            client,
        }
    }
}

#[async_trait]
impl Agent for HttpAgent {
    fn name(&self) -> &str {
        &self.name
    }

    async fn generate(&self, request: AgentRequest) -> Result<AgentReply, NodeError> {
        debug!(agent = %self.name, endpoint = %self.endpoint, "invoking hosted agent");

        let response = self
            .client
            .post(&self.endpoint)
            .json(&request)
            .send()
            .await
            .map_err(|e| NodeError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(NodeError::Invocation(format!("HTTP {status}: {body}")));
        }

        response
            .json::<AgentReply>()
            .await
            .map_err(|e| NodeError::Transport(format!("malformed agent reply: {e}")))
    }
}

/// Build a registry of `HttpAgent`s sharing one HTTP client.
pub fn registry_from_specs(specs: Vec<AgentSpec>) -> AgentRegistry {
    let client = reqwest::Client::new();
    let mut registry = AgentRegistry::new();
    for spec in specs {
        let name = spec.name.unwrap_or_else(|| spec.id.clone());
        registry.register(spec.id, Arc::new(HttpAgent::new(name, spec.endpoint, client.clone())));
    }
    registry
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::AgentResolver;

    #[test]
    fn specs_default_name_to_id() {
        let specs: Vec<AgentSpec> = serde_json::from_str(
            r#"[{"id": "bookkeeper", "endpoint": "http://localhost:9000/agents/bookkeeper"},
                {"id": "auditor", "name": "Auditor", "endpoint": "http://localhost:9000/agents/auditor"}]"#,
        )
        .unwrap();
        let registry = registry_from_specs(specs);

        assert_eq!(registry.len(), 2);
        assert_eq!(registry.agent_for("bookkeeper").unwrap().name(), "bookkeeper");
        assert_eq!(registry.agent_for("auditor").unwrap().name(), "Auditor");
        assert!(registry.agent_for("payroll").is_none());
    }
}

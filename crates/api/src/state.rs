use std::sync::Arc;

use db::WorkflowRepository;
use engine::WorkflowExecutor;

/// Shared by every handler.
#[derive(Clone)]
pub struct AppState {
    pub repo: Arc<dyn WorkflowRepository>,
    pub executor: WorkflowExecutor,
    /// When set, `/api/v1/workflows*` requires `Authorization: Bearer <token>`.
    pub api_token: Option<Arc<str>>,
}

impl AppState {
    pub fn new(repo: Arc<dyn WorkflowRepository>, executor: WorkflowExecutor) -> Self {
        Self {
            repo,
            executor,
            api_token: None,
        }
    }

    pub fn with_token(mut self, token: impl Into<Arc<str>>) -> Self {
        self.api_token = Some(token.into());
        self
    }
}

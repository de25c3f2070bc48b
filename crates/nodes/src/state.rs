//! Run-time execution state attached to nodes and edges.
//!
//! Only the client-side execution store mutates these values; the validator
//! and the layout engine carry them through untouched.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle of a single node within one run: `idle -> running -> completed | error`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionStatus {
    #[default]
    Idle,
    Running,
    Completed,
    Error,
}

impl std::fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Running => write!(f, "running"),
            Self::Completed => write!(f, "completed"),
            Self::Error => write!(f, "error"),
        }
    }
}

/// Failure details recorded on a node that ended in `error`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorRecord {
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl ErrorRecord {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            details: None,
        }
    }
}

/// `data.executionState` of a node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionState {
    #[serde(default)]
    pub status: ExecutionStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorRecord>,
    #[serde(default = "Utc::now")]
    pub timestamp: DateTime<Utc>,
}

impl ExecutionState {
    /// A fresh `idle` state stamped with the current time.
    pub fn idle() -> Self {
        Self {
            status: ExecutionStatus::Idle,
            output: None,
            error: None,
            timestamp: Utc::now(),
        }
    }

    /// Merge `patch` into this state. Fields the patch leaves as `None` keep
    /// their current value.
    pub fn apply(&mut self, patch: ExecutionStatePatch) {
        if let Some(status) = patch.status {
            self.status = status;
        }
        if let Some(output) = patch.output {
            self.output = Some(output);
        }
        if let Some(error) = patch.error {
            self.error = Some(error);
        }
        self.timestamp = patch.timestamp.unwrap_or_else(Utc::now);
    }
}

impl Default for ExecutionState {
    fn default() -> Self {
        Self::idle()
    }
}

/// Partial update for an [`ExecutionState`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExecutionStatePatch {
    pub status: Option<ExecutionStatus>,
    pub output: Option<String>,
    pub error: Option<ErrorRecord>,
    pub timestamp: Option<DateTime<Utc>>,
}

impl ExecutionStatePatch {
    pub fn status(status: ExecutionStatus) -> Self {
        Self {
            status: Some(status),
            ..Self::default()
        }
    }

    pub fn completed(output: impl Into<String>) -> Self {
        Self {
            status: Some(ExecutionStatus::Completed),
            output: Some(output.into()),
            ..Self::default()
        }
    }

    pub fn failed(error: ErrorRecord) -> Self {
        Self {
            status: Some(ExecutionStatus::Error),
            error: Some(error),
            ..Self::default()
        }
    }
}

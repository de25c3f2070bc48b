//! `engine` crate — graph validation, layout, and the execution engine.
//!
//! - [`dag`]: structural validation and topological ordering.
//! - [`layout`]: deterministic auto-positioning for display.
//! - [`executor`]: sequential run of a validated graph, streaming [`RunEvent`]s.
//! - [`sse`]: `data: <json>` framing and the incremental line reader.

pub mod dag;
pub mod error;
pub mod events;
pub mod executor;
pub mod layout;
pub mod models;
pub mod sse;

pub use dag::{execution_order, prepare_workflow};
pub use error::EngineError;
pub use events::{NodeResult, RunEvent};
pub use executor::{ExecutorConfig, WorkflowExecutor};
pub use layout::{layout, LayoutConfig, LayoutResult};
pub use models::{RunRequest, WorkflowDefinition, WorkflowError, WorkflowSchema};

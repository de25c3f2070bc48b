//! `store` crate — client-side owner of a workflow's graph and run state.
//!
//! [`WorkflowStore`] exposes the operations a UI (or the CLI) drives: load
//! and validate a graph, edit it, record human answers, and run it against
//! a workflow server through a [`RunTransport`].

pub mod error;
pub mod store;
pub mod transport;

pub use error::StoreError;
pub use store::{
    edge_status, InputIssue, InputValidation, StartResult, StartStatus, StoreConfig, WorkflowStore,
};
pub use transport::{ByteStream, HttpTransport, ReplayTransport, RunTransport};

#[cfg(test)]
mod store_tests;

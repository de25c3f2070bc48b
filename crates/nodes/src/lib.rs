//! `nodes` crate — the workflow graph model and the agent seam.
//!
//! Holds the node sum type and its per-variant data, fixed and dynamic
//! handles, edges, per-node execution state, and the `create_node` factory.
//! The engine and the client store both build on these types.
//!
//! Agent invocation is external: nodes talk to it only through the
//! [`Agent`] / [`AgentResolver`] traits.

pub mod edge;
pub mod error;
pub mod handles;
pub mod http;
pub mod mock;
pub mod node;
pub mod state;
pub mod traits;

pub use edge::{Edge, EdgeData};
pub use error::{ConfigurationError, NodeError};
pub use handles::{DynamicHandle, DynamicHandles, FixedHandle, HandleCategory, HandleDirection};
pub use node::{
    create_node, AgentTaskData, HumanInputData, Node, NodeData, NodeType, Position,
    PromptCrafterData,
};
pub use state::{ErrorRecord, ExecutionState, ExecutionStatePatch, ExecutionStatus};
pub use traits::{Agent, AgentRegistry, AgentReply, AgentRequest, AgentResolver};

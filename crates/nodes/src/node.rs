//! Nodes — the steps of a workflow graph.
//!
//! On the wire a node is `{id, type, position, data}` where `data` carries the
//! variant-specific configuration plus `executionState` and, for types that
//! support them, `dynamicHandles`. In memory `type` + `data` become the
//! [`NodeData`] sum type so each variant's fields are statically known.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::handles::{DynamicHandle, DynamicHandles, FixedHandle, HandleCategory, HandleDirection};
use crate::state::ExecutionState;
use crate::ConfigurationError;

/// Agent used by a freshly created agent task.
pub const DEFAULT_AGENT_ID: &str = "general-assistant";
/// Model label shown on a freshly created agent task.
pub const DEFAULT_MODEL: &str = "default";

// ---------------------------------------------------------------------------
// NodeType
// ---------------------------------------------------------------------------

/// The closed set of node variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeType {
    /// Free-text value supplied by a person.
    HumanInput,
    /// One call into a hosted agent.
    AgentTask,
    /// Template composition over upstream outputs.
    PromptCrafter,
    /// Terminal sink that only displays its input.
    VisualizeText,
}

/// Accepted `type` strings. The first spelling of each variant is canonical.
const SPELLINGS: &[(&str, NodeType)] = &[
    ("human-input", NodeType::HumanInput),
    ("text-input", NodeType::HumanInput),
    ("agent-task", NodeType::AgentTask),
    ("generate-text", NodeType::AgentTask),
    ("prompt-crafter", NodeType::PromptCrafter),
    ("visualize-text", NodeType::VisualizeText),
];

const HUMAN_INPUT_HANDLES: &[FixedHandle] = &[FixedHandle::output("result")];
const AGENT_TASK_HANDLES: &[FixedHandle] = &[
    FixedHandle::input("system", false),
    FixedHandle::input("prompt", true),
    FixedHandle::output("result"),
];
const PROMPT_CRAFTER_HANDLES: &[FixedHandle] = &[FixedHandle::output("result")];
const VISUALIZE_TEXT_HANDLES: &[FixedHandle] = &[FixedHandle::input("input", true)];

impl NodeType {
    /// Resolve a wire `type` string, returning the variant and the exact
    /// spelling so it can be written back unchanged.
    pub fn lookup(type_name: &str) -> Option<(NodeType, &'static str)> {
        SPELLINGS
            .iter()
            .find(|(spelling, _)| *spelling == type_name)
            .map(|(spelling, node_type)| (*node_type, *spelling))
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::HumanInput => "human-input",
            Self::AgentTask => "agent-task",
            Self::PromptCrafter => "prompt-crafter",
            Self::VisualizeText => "visualize-text",
        }
    }

    pub fn fixed_handles(&self) -> &'static [FixedHandle] {
        match self {
            Self::HumanInput => HUMAN_INPUT_HANDLES,
            Self::AgentTask => AGENT_TASK_HANDLES,
            Self::PromptCrafter => PROMPT_CRAFTER_HANDLES,
            Self::VisualizeText => VISUALIZE_TEXT_HANDLES,
        }
    }

    /// Dynamic handle categories this variant accepts.
    pub fn handle_categories(&self) -> &'static [HandleCategory] {
        match self {
            Self::AgentTask => &[HandleCategory::Tools],
            Self::PromptCrafter => &[HandleCategory::TemplateTags],
            Self::HumanInput | Self::VisualizeText => &[],
        }
    }
}

impl std::fmt::Display for NodeType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for NodeType {
    type Err = ConfigurationError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::lookup(s)
            .map(|(node_type, _)| node_type)
            .ok_or_else(|| ConfigurationError::UnknownNodeType(s.to_owned()))
    }
}

// ---------------------------------------------------------------------------
// Variant data
// ---------------------------------------------------------------------------

/// Canvas coordinates. Display only.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
}

impl Position {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HumanInputData {
    /// Text typed into the node on the canvas.
    #[serde(default)]
    pub value: String,
    /// Answer supplied before the run starts.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_input: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl HumanInputData {
    /// The answer this node contributes to a run, if any.
    pub fn supplied_value(&self) -> Option<&str> {
        self.user_input
            .as_deref()
            .filter(|v| !v.trim().is_empty())
            .or_else(|| Some(self.value.as_str()).filter(|v| !v.trim().is_empty()))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentTaskData {
    #[serde(default = "default_agent_id")]
    pub agent_id: String,
    /// Static prompt text used when the `prompt` handle is not wired.
    #[serde(default)]
    pub description: String,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Default for AgentTaskData {
    fn default() -> Self {
        Self {
            agent_id: default_agent_id(),
            description: String::new(),
            model: default_model(),
            extra: Map::new(),
        }
    }
}

fn default_agent_id() -> String {
    DEFAULT_AGENT_ID.to_owned()
}

fn default_model() -> String {
    DEFAULT_MODEL.to_owned()
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PromptCrafterData {
    /// Text with `{{name}}` placeholders, one per template-tag handle.
    #[serde(default)]
    pub template: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Variant-specific node configuration.
#[derive(Debug, Clone, PartialEq)]
pub enum NodeData {
    HumanInput(HumanInputData),
    AgentTask(AgentTaskData),
    PromptCrafter(PromptCrafterData),
    /// Pure sink; only unknown display fields are kept.
    VisualizeText(Map<String, Value>),
}

impl NodeData {
    pub fn default_for(node_type: NodeType) -> Self {
        match node_type {
            NodeType::HumanInput => Self::HumanInput(HumanInputData::default()),
            NodeType::AgentTask => Self::AgentTask(AgentTaskData::default()),
            NodeType::PromptCrafter => Self::PromptCrafter(PromptCrafterData::default()),
            NodeType::VisualizeText => Self::VisualizeText(Map::new()),
        }
    }

    pub fn node_type(&self) -> NodeType {
        match self {
            Self::HumanInput(_) => NodeType::HumanInput,
            Self::AgentTask(_) => NodeType::AgentTask,
            Self::PromptCrafter(_) => NodeType::PromptCrafter,
            Self::VisualizeText(_) => NodeType::VisualizeText,
        }
    }

    fn from_fields(node_type: NodeType, fields: Map<String, Value>) -> Result<Self, ConfigurationError> {
        let invalid = |e: serde_json::Error| ConfigurationError::InvalidData {
            node_type: node_type.as_str(),
            message: e.to_string(),
        };
        let value = Value::Object(fields);
        Ok(match node_type {
            NodeType::HumanInput => Self::HumanInput(serde_json::from_value(value).map_err(invalid)?),
            NodeType::AgentTask => Self::AgentTask(serde_json::from_value(value).map_err(invalid)?),
            NodeType::PromptCrafter => {
                Self::PromptCrafter(serde_json::from_value(value).map_err(invalid)?)
            }
            NodeType::VisualizeText => match value {
                Value::Object(map) => Self::VisualizeText(map),
                _ => Self::VisualizeText(Map::new()),
            },
        })
    }

    fn into_fields(self) -> Map<String, Value> {
        let value = match self {
            Self::HumanInput(d) => serde_json::to_value(d),
            Self::AgentTask(d) => serde_json::to_value(d),
            Self::PromptCrafter(d) => serde_json::to_value(d),
            Self::VisualizeText(map) => return map,
        };
        match value {
            Ok(Value::Object(map)) => map,
            _ => Map::new(),
        }
    }
}

// ---------------------------------------------------------------------------
// Node
// ---------------------------------------------------------------------------

/// A single step in the workflow graph.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(into = "RawNode")]
pub struct Node {
    /// Unique within the workflow; referenced by edges.
    pub id: String,
    pub position: Position,
    pub width: Option<f64>,
    pub height: Option<f64>,
    pub data: NodeData,
    pub dynamic_handles: DynamicHandles,
    pub execution_state: ExecutionState,
    /// Exact `type` spelling read from the wire.
    spelling: &'static str,
}

/// Create an empty node of the named type with default data and a fresh id.
///
/// # Errors
/// [`ConfigurationError::UnknownNodeType`] if `type_name` is not one of the
/// accepted type strings.
pub fn create_node(type_name: &str, position: Position) -> Result<Node, ConfigurationError> {
    let (node_type, spelling) = NodeType::lookup(type_name)
        .ok_or_else(|| ConfigurationError::UnknownNodeType(type_name.to_owned()))?;
    let mut node = Node::new(Uuid::new_v4().to_string(), NodeData::default_for(node_type));
    node.position = position;
    node.spelling = spelling;
    Ok(node)
}

impl Node {
    pub fn new(id: impl Into<String>, data: NodeData) -> Self {
        let spelling = data.node_type().as_str();
        Self {
            id: id.into(),
            position: Position::default(),
            width: None,
            height: None,
            data,
            dynamic_handles: DynamicHandles::new(),
            execution_state: ExecutionState::idle(),
            spelling,
        }
    }

    pub fn human_input(id: impl Into<String>) -> Self {
        Self::new(id, NodeData::HumanInput(HumanInputData::default()))
    }

    pub fn agent_task(
        id: impl Into<String>,
        agent_id: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        Self::new(
            id,
            NodeData::AgentTask(AgentTaskData {
                agent_id: agent_id.into(),
                description: description.into(),
                ..AgentTaskData::default()
            }),
        )
    }

    pub fn prompt_crafter(id: impl Into<String>, template: impl Into<String>) -> Self {
        Self::new(
            id,
            NodeData::PromptCrafter(PromptCrafterData {
                template: template.into(),
                extra: Map::new(),
            }),
        )
    }

    pub fn visualize_text(id: impl Into<String>) -> Self {
        Self::new(id, NodeData::VisualizeText(Map::new()))
    }

    pub fn with_position(mut self, x: f64, y: f64) -> Self {
        self.position = Position::new(x, y);
        self
    }

    /// Pre-answer a human-input node. No effect on other variants.
    pub fn with_user_input(mut self, value: impl Into<String>) -> Self {
        if let NodeData::HumanInput(data) = &mut self.data {
            data.user_input = Some(value.into());
        }
        self
    }

    /// Add a dynamic handle, rejecting categories this node type lacks.
    pub fn add_dynamic_handle(
        &mut self,
        category: HandleCategory,
        handle: DynamicHandle,
    ) -> Result<(), ConfigurationError> {
        let node_type = self.node_type();
        self.dynamic_handles
            .push(node_type.as_str(), node_type.handle_categories(), category, handle)
    }

    pub fn with_dynamic_handle(
        mut self,
        category: HandleCategory,
        handle: DynamicHandle,
    ) -> Result<Self, ConfigurationError> {
        self.add_dynamic_handle(category, handle)?;
        Ok(self)
    }

    pub fn node_type(&self) -> NodeType {
        self.data.node_type()
    }

    /// The `type` string written on the wire.
    pub fn type_name(&self) -> &'static str {
        self.spelling
    }

    pub fn is_human_input(&self) -> bool {
        matches!(self.data, NodeData::HumanInput(_))
    }

    /// Input handles that must be satisfied before the node can execute.
    ///
    /// Fixed required inputs come first, then every template placeholder of
    /// a prompt crafter.
    pub fn required_inputs(&self) -> Vec<&str> {
        let fixed = self
            .node_type()
            .fixed_handles()
            .iter()
            .filter(|h| h.direction == HandleDirection::Input && h.required)
            .map(|h| h.id);
        let dynamic = self
            .dynamic_handles
            .iter()
            .filter(|(category, _)| category.direction() == HandleDirection::Input)
            .map(|(_, h)| h.id.as_str());
        fixed.chain(dynamic).collect()
    }

    /// Whether a required input is covered by static configuration, so no
    /// inbound edge is needed. An agent task with a description does not
    /// need its `prompt` wired.
    pub fn satisfies_without_edge(&self, handle_id: &str) -> bool {
        match &self.data {
            NodeData::AgentTask(d) => handle_id == "prompt" && !d.description.trim().is_empty(),
            _ => false,
        }
    }

    pub fn has_handle(&self, handle_id: &str, direction: HandleDirection) -> bool {
        self.node_type()
            .fixed_handles()
            .iter()
            .any(|h| h.id == handle_id && h.direction == direction)
            || self
                .dynamic_handles
                .iter()
                .any(|(category, h)| h.id == handle_id && category.direction() == direction)
    }

    /// Label used for this node in run events.
    pub fn agent_name(&self) -> &str {
        match &self.data {
            NodeData::AgentTask(d) => &d.agent_id,
            NodeData::HumanInput(_) => "human-input",
            NodeData::PromptCrafter(_) => "prompt-crafter",
            NodeData::VisualizeText(_) => "visualize-text",
        }
    }

    /// Human-readable summary of what the node does.
    pub fn description(&self) -> String {
        match &self.data {
            NodeData::AgentTask(d) => d.description.clone(),
            NodeData::HumanInput(d) => {
                if d.value.trim().is_empty() {
                    "Human input".to_owned()
                } else {
                    d.value.clone()
                }
            }
            NodeData::PromptCrafter(d) => d.template.clone(),
            NodeData::VisualizeText(_) => "Display text".to_owned(),
        }
    }
}

// ---------------------------------------------------------------------------
// Wire form
// ---------------------------------------------------------------------------

#[derive(Serialize, Deserialize)]
struct RawNode {
    id: String,
    #[serde(rename = "type")]
    node_type: String,
    #[serde(default)]
    position: Position,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    width: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    height: Option<f64>,
    #[serde(default)]
    data: Map<String, Value>,
}

impl TryFrom<RawNode> for Node {
    type Error = ConfigurationError;

    fn try_from(raw: RawNode) -> Result<Self, Self::Error> {
        let (node_type, spelling) = NodeType::lookup(&raw.node_type)
            .ok_or_else(|| ConfigurationError::UnknownNodeType(raw.node_type.clone()))?;
        let invalid = |e: serde_json::Error| ConfigurationError::InvalidData {
            node_type: node_type.as_str(),
            message: e.to_string(),
        };

        let mut fields = raw.data;
        let execution_state = match fields.remove("executionState") {
            Some(value) => serde_json::from_value(value).map_err(invalid)?,
            None => ExecutionState::idle(),
        };
        let dynamic_handles = match fields.remove("dynamicHandles") {
            Some(value) => serde_json::from_value::<DynamicHandles>(value)
                .map_err(invalid)?
                .checked(node_type.as_str(), node_type.handle_categories())?,
            None => DynamicHandles::new(),
        };

        Ok(Node {
            id: raw.id,
            position: raw.position,
            width: raw.width,
            height: raw.height,
            data: NodeData::from_fields(node_type, fields)?,
            dynamic_handles,
            execution_state,
            spelling,
        })
    }
}

// Written by hand: a derived impl would tie `'de` to the `'static` spelling.
impl<'de> Deserialize<'de> for Node {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = RawNode::deserialize(deserializer)?;
        Node::try_from(raw).map_err(serde::de::Error::custom)
    }
}

impl From<Node> for RawNode {
    fn from(node: Node) -> Self {
        let mut data = node.data.into_fields();
        if !node.dynamic_handles.is_empty() {
            if let Ok(value) = serde_json::to_value(&node.dynamic_handles) {
                data.insert("dynamicHandles".into(), value);
            }
        }
        if let Ok(value) = serde_json::to_value(&node.execution_state) {
            data.insert("executionState".into(), value);
        }
        RawNode {
            id: node.id,
            node_type: node.spelling.to_owned(),
            position: node.position,
            width: node.width,
            height: node.height,
            data,
        }
    }
}

// ============================================================
// Unit tests
// ============================================================
#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::ExecutionStatus;
    use serde_json::json;

    #[test]
    fn create_node_fills_variant_defaults() {
        let node = create_node("agent-task", Position::new(10.0, 20.0)).unwrap();
        match &node.data {
            NodeData::AgentTask(d) => {
                assert_eq!(d.agent_id, DEFAULT_AGENT_ID);
                assert_eq!(d.model, DEFAULT_MODEL);
                assert!(d.description.is_empty());
            }
            other => panic!("unexpected data {other:?}"),
        }
        assert!(node.dynamic_handles.is_empty());
        assert_eq!(node.position, Position::new(10.0, 20.0));
        assert_eq!(node.execution_state.status, ExecutionStatus::Idle);
    }

    #[test]
    fn create_node_rejects_unknown_type() {
        let err = create_node("spreadsheet", Position::default()).unwrap_err();
        assert_eq!(err, ConfigurationError::UnknownNodeType("spreadsheet".into()));
    }

    #[test]
    fn create_node_gives_unique_ids() {
        let a = create_node("human-input", Position::default()).unwrap();
        let b = create_node("human-input", Position::default()).unwrap();
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn aliases_map_to_the_same_variant() {
        let node = create_node("generate-text", Position::default()).unwrap();
        assert_eq!(node.node_type(), NodeType::AgentTask);
        assert_eq!(node.type_name(), "generate-text");
        assert_eq!("text-input".parse::<NodeType>().unwrap(), NodeType::HumanInput);
    }

    #[test]
    fn wire_round_trip_keeps_spelling_and_unknown_fields() {
        let wire = json!({
            "id": "n1",
            "type": "text-input",
            "position": { "x": 1.5, "y": -3.0 },
            "data": {
                "value": "What period?",
                "label": "Period",
                "executionState": {
                    "status": "completed",
                    "output": "Q3",
                    "timestamp": "2026-01-02T03:04:05Z"
                }
            }
        });
        let node: Node = serde_json::from_value(wire.clone()).unwrap();
        assert!(node.is_human_input());
        assert_eq!(node.execution_state.output.as_deref(), Some("Q3"));

        let back = serde_json::to_value(&node).unwrap();
        assert_eq!(back["type"], "text-input");
        assert_eq!(back["data"]["label"], "Period");
        assert_eq!(back["data"]["value"], "What period?");
        assert_eq!(back["data"]["executionState"]["status"], "completed");
        assert_eq!(back["position"], wire["position"]);
    }

    #[test]
    fn wire_rejects_handles_in_foreign_category() {
        let wire = json!({
            "id": "n1",
            "type": "human-input",
            "position": { "x": 0, "y": 0 },
            "data": { "dynamicHandles": { "tools": [{ "id": "t", "name": "t" }] } }
        });
        let err = serde_json::from_value::<Node>(wire).unwrap_err();
        assert!(err.to_string().contains("does not support"));
    }

    #[test]
    fn prompt_crafter_placeholders_are_required_inputs() {
        let node = Node::prompt_crafter("p", "Summarise {{ledger}} for {{period}}")
            .with_dynamic_handle(HandleCategory::TemplateTags, DynamicHandle::new("ledger", "ledger"))
            .unwrap()
            .with_dynamic_handle(HandleCategory::TemplateTags, DynamicHandle::new("period", "period"))
            .unwrap();
        assert_eq!(node.required_inputs(), vec!["ledger", "period"]);
        assert!(node.has_handle("ledger", HandleDirection::Input));
        assert!(node.has_handle("result", HandleDirection::Output));
    }

    #[test]
    fn agent_prompt_is_satisfied_by_description() {
        let bare = Node::agent_task("a", "bookkeeper", "");
        let described = Node::agent_task("b", "bookkeeper", "Categorise the expenses");
        assert_eq!(bare.required_inputs(), vec!["prompt"]);
        assert!(!bare.satisfies_without_edge("prompt"));
        assert!(described.satisfies_without_edge("prompt"));
        assert!(!described.satisfies_without_edge("system"));
    }

    #[test]
    fn supplied_value_prefers_user_input() {
        let node = Node::human_input("h").with_user_input("March");
        match &node.data {
            NodeData::HumanInput(d) => assert_eq!(d.supplied_value(), Some("March")),
            _ => unreachable!(),
        }
        let blank = Node::human_input("h2").with_user_input("   ");
        match &blank.data {
            NodeData::HumanInput(d) => assert_eq!(d.supplied_value(), None),
            _ => unreachable!(),
        }
    }
}

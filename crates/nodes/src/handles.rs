//! Handles — the named ports edges attach to.
//!
//! Every node type declares a fixed set of handles. Some types also accept
//! handles added at run time (extra template placeholders, tool slots); those
//! live in a [`DynamicHandles`] map keyed by a closed [`HandleCategory`].

use std::collections::{BTreeMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::ConfigurationError;

/// Whether a handle receives or emits values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandleDirection {
    Input,
    Output,
}

/// A handle every node of a given type has.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FixedHandle {
    pub id: &'static str,
    pub direction: HandleDirection,
    /// The node cannot execute unless this handle is connected (or satisfied
    /// by static configuration, see `Node::satisfies_without_edge`).
    pub required: bool,
}

impl FixedHandle {
    pub const fn input(id: &'static str, required: bool) -> Self {
        Self {
            id,
            direction: HandleDirection::Input,
            required,
        }
    }

    pub const fn output(id: &'static str) -> Self {
        Self {
            id,
            direction: HandleDirection::Output,
            required: false,
        }
    }
}

/// Categories of runtime-added handles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum HandleCategory {
    /// Tool slots on an agent task (outputs).
    Tools,
    /// Template placeholders on a prompt crafter (inputs).
    TemplateTags,
}

impl HandleCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Tools => "tools",
            Self::TemplateTags => "template-tags",
        }
    }

    pub fn direction(&self) -> HandleDirection {
        match self {
            Self::Tools => HandleDirection::Output,
            Self::TemplateTags => HandleDirection::Input,
        }
    }
}

impl std::fmt::Display for HandleCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One runtime-added port.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DynamicHandle {
    pub id: String,
    pub name: String,
}

impl DynamicHandle {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
        }
    }
}

/// `category -> ordered handles` for one node.
///
/// Serialised as `{"tools": [...], "template-tags": [...]}`. Construction
/// through [`DynamicHandles::checked`] or [`DynamicHandles::push`] rejects
/// categories the owning node type does not support and duplicate ids.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DynamicHandles(BTreeMap<HandleCategory, Vec<DynamicHandle>>);

impl DynamicHandles {
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate an already-built map against the categories allowed for
    /// `node_type`.
    pub fn checked(
        self,
        node_type: &'static str,
        allowed: &[HandleCategory],
    ) -> Result<Self, ConfigurationError> {
        for (category, handles) in &self.0 {
            if !allowed.contains(category) {
                return Err(ConfigurationError::UnsupportedHandleCategory {
                    node_type,
                    category: category.to_string(),
                });
            }
            let mut seen = HashSet::new();
            for handle in handles {
                if !seen.insert(handle.id.as_str()) {
                    return Err(ConfigurationError::DuplicateHandle {
                        category: category.to_string(),
                        handle_id: handle.id.clone(),
                    });
                }
            }
        }
        Ok(self)
    }

    /// Append a handle, enforcing the same rules as [`DynamicHandles::checked`].
    pub fn push(
        &mut self,
        node_type: &'static str,
        allowed: &[HandleCategory],
        category: HandleCategory,
        handle: DynamicHandle,
    ) -> Result<(), ConfigurationError> {
        if !allowed.contains(&category) {
            return Err(ConfigurationError::UnsupportedHandleCategory {
                node_type,
                category: category.to_string(),
            });
        }
        let list = self.0.entry(category).or_default();
        if list.iter().any(|h| h.id == handle.id) {
            return Err(ConfigurationError::DuplicateHandle {
                category: category.to_string(),
                handle_id: handle.id,
            });
        }
        list.push(handle);
        Ok(())
    }

    /// Remove a handle by id. Returns whether anything was removed.
    pub fn remove(&mut self, category: HandleCategory, handle_id: &str) -> bool {
        let Some(list) = self.0.get_mut(&category) else {
            return false;
        };
        let before = list.len();
        list.retain(|h| h.id != handle_id);
        let removed = list.len() != before;
        if list.is_empty() {
            self.0.remove(&category);
        }
        removed
    }

    pub fn get(&self, category: HandleCategory) -> &[DynamicHandle] {
        self.0.get(&category).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn is_empty(&self) -> bool {
        self.0.values().all(Vec::is_empty)
    }

    /// Every dynamic handle with its category, in category then insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (HandleCategory, &DynamicHandle)> {
        self.0
            .iter()
            .flat_map(|(category, handles)| handles.iter().map(move |h| (*category, h)))
    }
}

//! Action registry
//!
//! Nodes only carry an `ActionSetId`. The host looks the id up here to find
//! the commands to offer in a context menu; the tree never dispatches them.

use crate::view::explorer_tree::ActionSetId;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A host command offered for a node
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionDescriptor {
    pub id: String,
    pub title: String,
}

impl ActionDescriptor {
    pub fn new(id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
        }
    }
}

/// Maps action-set ids to ordered host commands
#[derive(Debug, Clone, Default)]
pub struct ActionRegistry {
    sets: HashMap<ActionSetId, Vec<ActionDescriptor>>,
}

impl ActionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append actions to a set, skipping ids the set already has
    pub fn register<I>(&mut self, set: impl Into<ActionSetId>, actions: I)
    where
        I: IntoIterator<Item = ActionDescriptor>,
    {
        let entry = self.sets.entry(set.into()).or_default();
        for action in actions {
            if entry.iter().any(|existing| existing.id == action.id) {
                tracing::debug!("action {} registered twice, keeping the first", action.id);
                continue;
            }
            entry.push(action);
        }
    }

    /// Actions of a set, in registration order (empty for unknown sets)
    pub fn actions(&self, set: &ActionSetId) -> &[ActionDescriptor] {
        self.sets.get(set).map(Vec::as_slice).unwrap_or_default()
    }

    /// Ids of every registered set, sorted
    pub fn set_ids(&self) -> Vec<ActionSetId> {
        let mut ids: Vec<_> = self.sets.keys().cloned().collect();
        ids.sort();
        ids
    }

    pub fn contains(&self, set: &ActionSetId) -> bool {
        self.sets.contains_key(set)
    }

    pub fn len(&self) -> usize {
        self.sets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sets.is_empty()
    }
}

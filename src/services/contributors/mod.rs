//! Explorer contributors
//!
//! A contributor builds the root node of one service module. The host
//! registers contributors once and inserts their roots into the tree; from
//! then on the tree drives all loading through the loaders each root declares.

pub mod storage;
pub mod webapp;

pub use storage::StorageExplorerContributor;
pub use webapp::WebAppExplorerContributor;

use crate::services::actions::ActionRegistry;
use crate::services::cloud::CloudClient;
use crate::view::explorer_tree::{AnyNode, ExplorerTree, NodeId};
use std::sync::Arc;

/// Builds the root node for one resource-service type
pub trait ExplorerContributor: Send + Sync {
    /// Stable name, used in logs and for lookups
    fn name(&self) -> &str;

    /// Build the module root; called once per tree
    fn root_node(&self) -> AnyNode;

    /// Publish the host commands for the action sets this contributor uses
    fn register_actions(&self, _registry: &mut ActionRegistry) {}
}

/// Contributors known to the host, in display order
#[derive(Default)]
pub struct ContributorRegistry {
    contributors: Vec<Arc<dyn ExplorerContributor>>,
}

impl ContributorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the built-in Storage and Web Apps contributors
    pub fn with_defaults(client: Arc<dyn CloudClient>) -> Self {
        let mut registry = Self::new();
        registry.register(StorageExplorerContributor::new(Arc::clone(&client)));
        registry.register(WebAppExplorerContributor::new(client));
        registry
    }

    /// Register a contributor; a second one with the same name is ignored
    pub fn register(&mut self, contributor: impl ExplorerContributor + 'static) -> bool {
        if self.get(contributor.name()).is_some() {
            tracing::warn!("contributor {} already registered", contributor.name());
            return false;
        }
        self.contributors.push(Arc::new(contributor));
        true
    }

    pub fn get(&self, name: &str) -> Option<&Arc<dyn ExplorerContributor>> {
        self.contributors.iter().find(|c| c.name() == name)
    }

    pub fn names(&self) -> Vec<&str> {
        self.contributors.iter().map(|c| c.name()).collect()
    }

    pub fn len(&self) -> usize {
        self.contributors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.contributors.is_empty()
    }

    /// Insert every contributor's root into `tree`, in registration order
    pub fn build_roots(&self, tree: &ExplorerTree) -> Vec<NodeId> {
        self.contributors
            .iter()
            .map(|contributor| {
                let id = tree.insert_root(contributor.root_node());
                tracing::debug!("contributor {} added root {}", contributor.name(), id);
                id
            })
            .collect()
    }

    /// Collect the action sets of every contributor
    pub fn action_registry(&self) -> ActionRegistry {
        let mut registry = ActionRegistry::new();
        for contributor in &self.contributors {
            contributor.register_actions(&mut registry);
        }
        registry
    }
}

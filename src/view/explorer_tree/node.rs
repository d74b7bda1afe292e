use super::key::ChildKey;
use super::loader::{ChildLoader, LoadError, LoaderGroup};
use super::node_view::{NodeView, StaticView};
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::fmt;
use std::future::Future;
use std::hash::Hash;
use std::sync::Arc;
use tokio::task::AbortHandle;

/// Unique identifier for a tree node
///
/// Ids are never reused within a tree, so a stale id simply stops resolving.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub usize);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Node({})", self.0)
    }
}

/// Index of a loader group within its node, in registration order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GroupId(pub usize);

impl fmt::Display for GroupId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Group({})", self.0)
    }
}

/// Opaque tag naming the action set the host shows for a node
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ActionSetId(String);

impl ActionSetId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for ActionSetId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for ActionSetId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl fmt::Display for ActionSetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Load state of one loader group
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum LoadState {
    /// Never loaded
    #[default]
    Unloaded,
    /// A load is in flight
    Loading,
    /// The current generation loaded successfully
    Loaded,
    /// The current generation failed; children keep the last good set
    Failed(LoadError),
}

impl LoadState {
    pub fn is_unloaded(&self) -> bool {
        *self == LoadState::Unloaded
    }

    pub fn is_loading(&self) -> bool {
        *self == LoadState::Loading
    }

    pub fn is_loaded(&self) -> bool {
        *self == LoadState::Loaded
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, LoadState::Failed(_))
    }

    pub fn error(&self) -> Option<&LoadError> {
        match self {
            LoadState::Failed(error) => Some(error),
            _ => None,
        }
    }
}

/// Declarative description of a node, before it joins a tree
///
/// Built by contributors and by loader factories:
///
/// ```ignore
/// Node::new(account)
///     .view(StaticView::new("acct", None))
///     .actions("storage.account")
///     .add_children(list_containers, |c, _| Node::new(c));
/// ```
pub struct Node<T> {
    value: Arc<T>,
    view: Option<Arc<dyn NodeView>>,
    action_set: Option<ActionSetId>,
    groups: Vec<Arc<dyn LoaderGroup>>,
}

impl<T> Node<T>
where
    T: Send + Sync + 'static,
{
    pub fn new(value: T) -> Self {
        Self::from_arc(Arc::new(value))
    }

    pub fn from_arc(value: Arc<T>) -> Self {
        Self {
            value,
            view: None,
            action_set: None,
            groups: Vec::new(),
        }
    }

    pub fn value(&self) -> &T {
        &self.value
    }

    /// Set the node's view (a blank `StaticView` is used if none is set)
    pub fn view(mut self, view: impl NodeView + 'static) -> Self {
        self.view = Some(Arc::new(view));
        self
    }

    pub fn actions(mut self, action_set: impl Into<ActionSetId>) -> Self {
        self.action_set = Some(action_set.into());
        self
    }

    /// Register a loader group identified by the fetched items themselves
    pub fn add_children<C, F, Fut, M>(self, fetch: F, make_child: M) -> Self
    where
        C: Hash + Eq + fmt::Debug + Clone + Send + Sync + 'static,
        F: Fn(Arc<T>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<Vec<C>>> + Send + 'static,
        M: Fn(C, &T) -> Node<C> + Send + Sync + 'static,
    {
        self.add_loader(ChildLoader::new(fetch, make_child))
    }

    /// Register a loader group; groups render in registration order
    pub fn add_loader<C>(mut self, loader: ChildLoader<T, C>) -> Self
    where
        C: Send + Sync + 'static,
    {
        self.groups.push(loader.bind(Arc::clone(&self.value)));
        self
    }

    pub fn group_count(&self) -> usize {
        self.groups.len()
    }

    pub(crate) fn into_seed(self) -> NodeSeed {
        NodeSeed {
            value: self.value,
            view: self
                .view
                .unwrap_or_else(|| Arc::new(StaticView::new(String::new(), None))),
            action_set: self.action_set,
            groups: self.groups,
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for Node<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Node")
            .field("value", &self.value)
            .field("action_set", &self.action_set)
            .field("groups", &self.groups.len())
            .finish()
    }
}

/// A node with its value type erased, ready to be inserted as a root
pub struct AnyNode(pub(crate) NodeSeed);

impl<T> From<Node<T>> for AnyNode
where
    T: Send + Sync + 'static,
{
    fn from(node: Node<T>) -> Self {
        AnyNode(node.into_seed())
    }
}

pub(crate) struct NodeSeed {
    pub value: Arc<dyn Any + Send + Sync>,
    pub view: Arc<dyn NodeView>,
    pub action_set: Option<ActionSetId>,
    pub groups: Vec<Arc<dyn LoaderGroup>>,
}

/// A node living in the tree's arena
pub(crate) struct TreeNode {
    pub id: NodeId,
    pub parent: Option<NodeId>,
    /// Identity within the parent's group (None for roots)
    pub key: Option<ChildKey>,
    pub value: Arc<dyn Any + Send + Sync>,
    pub view: Arc<dyn NodeView>,
    pub action_set: Option<ActionSetId>,
    pub groups: Vec<GroupSlot>,
}

impl TreeNode {
    pub fn new(id: NodeId, seed: NodeSeed, parent: Option<NodeId>, key: Option<ChildKey>) -> Self {
        Self {
            id,
            parent,
            key,
            value: seed.value,
            view: seed.view,
            action_set: seed.action_set,
            groups: seed.groups.into_iter().map(GroupSlot::new).collect(),
        }
    }

    /// Groups addressed by an optional selector, in registration order
    pub fn selected_groups(&self, group: Option<GroupId>) -> Vec<GroupId> {
        match group {
            Some(group) if group.0 < self.groups.len() => vec![group],
            Some(_) => Vec::new(),
            None => (0..self.groups.len()).map(GroupId).collect(),
        }
    }

    pub fn slot(&self, group: GroupId) -> Option<&GroupSlot> {
        self.groups.get(group.0)
    }

    pub fn slot_mut(&mut self, group: GroupId) -> Option<&mut GroupSlot> {
        self.groups.get_mut(group.0)
    }
}

/// Per-group loading state owned by a node
pub(crate) struct GroupSlot {
    pub loader: Arc<dyn LoaderGroup>,
    pub state: LoadState,
    pub generation: u64,
    pub children: Vec<NodeId>,
    /// Fetch task of the current generation, if still running
    pub in_flight: Option<AbortHandle>,
}

impl GroupSlot {
    fn new(loader: Arc<dyn LoaderGroup>) -> Self {
        Self {
            loader,
            state: LoadState::Unloaded,
            generation: 0,
            children: Vec::new(),
            in_flight: None,
        }
    }
}

/// Snapshot of one loader group, for hosts
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupStatus {
    pub id: GroupId,
    pub name: Option<String>,
    pub state: LoadState,
    pub generation: u64,
    pub children: Vec<NodeId>,
}

impl From<(GroupId, &GroupSlot)> for GroupStatus {
    fn from((id, slot): (GroupId, &GroupSlot)) -> Self {
        Self {
            id,
            name: slot.loader.name().map(str::to_string),
            state: slot.state.clone(),
            generation: slot.generation,
            children: slot.children.clone(),
        }
    }
}

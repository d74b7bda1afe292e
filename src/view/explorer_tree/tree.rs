use super::key::ChildKey;
use super::loader::{FetchedChild, LoadError, LoaderGroup};
use super::node::{
    ActionSetId, AnyNode, GroupId, GroupStatus, LoadState, NodeId, NodeSeed, TreeNode,
};
use super::node_view::{NodeView, Refresher};
use crate::config::ExplorerConfig;
use std::any::Any;
use std::collections::{HashMap, HashSet};
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{mpsc, Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::Notify;

/// Change notifications for the presentation layer
///
/// Sent from whatever thread applied the change; the host drains them on its
/// own thread.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TreeEvent {
    /// A load was started for a group
    LoadStarted {
        node: NodeId,
        group: GroupId,
        generation: u64,
    },
    /// A group's children or load state changed
    ChildrenChanged { node: NodeId, group: GroupId },
    /// A node's label, icon or description should be re-rendered
    ViewChanged(NodeId),
    /// A node and its subtree left the tree
    NodeRemoved(NodeId),
}

/// Tuning for the reload protocol
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadOptions {
    /// Per-fetch timeout (None waits forever)
    pub timeout: Option<Duration>,
    /// Abort the fetch task of a superseded generation
    pub abort_superseded: bool,
}

impl Default for LoadOptions {
    fn default() -> Self {
        Self {
            timeout: None,
            abort_superseded: true,
        }
    }
}

impl From<&ExplorerConfig> for LoadOptions {
    fn from(config: &ExplorerConfig) -> Self {
        Self {
            timeout: config.load_timeout(),
            abort_superseded: config.abort_superseded,
        }
    }
}

/// Lazily loaded resource tree
///
/// Nodes live in an arena indexed by `NodeId`; each node owns its children's
/// ids per loader group and children point back at their parent by id. Only
/// the reload algorithm edits those links.
///
/// Children are fetched on a tokio runtime. Every group carries a generation
/// counter that is bumped when a load starts; a completing load only touches
/// the group if its generation is still current, so overlapping refreshes
/// resolve to the newest one without any further locking.
///
/// The handle is cheap to clone and safe to use from any thread.
#[derive(Clone)]
pub struct ExplorerTree {
    inner: Arc<TreeInner>,
}

struct TreeInner {
    state: Mutex<TreeState>,
    runtime: Handle,
    options: LoadOptions,
    events: Option<mpsc::Sender<TreeEvent>>,
    /// Loads whose completion has not been processed yet
    in_flight: AtomicUsize,
    idle: Notify,
}

#[derive(Default)]
struct TreeState {
    nodes: HashMap<NodeId, TreeNode>,
    roots: Vec<NodeId>,
    next_id: usize,
}

/// A load whose generation has been claimed but not yet spawned
struct PendingLoad {
    node: NodeId,
    group: GroupId,
    generation: u64,
    loader: Arc<dyn LoaderGroup>,
    superseded: Option<tokio::task::AbortHandle>,
}

/// What reconcile does with one fetched key
enum Planned {
    /// The group already holds the key; its node takes the fresh value
    Kept(Arc<dyn Any + Send + Sync>),
    New(NodeSeed),
}

/// A kept child whose view still has to be offered its fresh value
struct Rebound {
    node: NodeId,
    view: Arc<dyn NodeView>,
    value: Arc<dyn Any + Send + Sync>,
}

struct Reconciled {
    removed: Vec<NodeId>,
    rebound: Vec<Rebound>,
}

/// Counts a load as finished when dropped, even if its completion panicked
struct LoadFinished(Arc<TreeInner>);

impl Drop for LoadFinished {
    fn drop(&mut self) {
        self.0.in_flight.fetch_sub(1, Ordering::AcqRel);
        self.0.idle.notify_waiters();
    }
}

/// Refresher handed to every view; holds the tree weakly
struct NodeRefresher {
    tree: Weak<TreeInner>,
    node: NodeId,
}

impl Refresher for NodeRefresher {
    fn refresh_view(&self) {
        if let Some(inner) = self.tree.upgrade() {
            ExplorerTree { inner }.refresh_view(self.node);
        }
    }

    fn refresh_children(&self) {
        if let Some(inner) = self.tree.upgrade() {
            ExplorerTree { inner }.refresh_children(self.node, None);
        }
    }
}

impl ExplorerTree {
    /// Create an empty tree that runs loads on the given runtime
    pub fn new(runtime: Handle) -> Self {
        Self::with_options(runtime, LoadOptions::default(), None)
    }

    pub fn with_options(
        runtime: Handle,
        options: LoadOptions,
        events: Option<mpsc::Sender<TreeEvent>>,
    ) -> Self {
        Self {
            inner: Arc::new(TreeInner {
                state: Mutex::new(TreeState::default()),
                runtime,
                options,
                events,
                in_flight: AtomicUsize::new(0),
                idle: Notify::new(),
            }),
        }
    }

    /// Create a tree configured from `config`, returning the event receiver
    pub fn from_config(runtime: Handle, config: &ExplorerConfig) -> (Self, mpsc::Receiver<TreeEvent>) {
        let (tx, rx) = mpsc::channel();
        (Self::with_options(runtime, config.into(), Some(tx)), rx)
    }

    pub fn options(&self) -> &LoadOptions {
        &self.inner.options
    }

    /// Add a root node; its groups start `Unloaded`
    pub fn insert_root(&self, node: impl Into<AnyNode>) -> NodeId {
        let AnyNode(seed) = node.into();
        let weak = Arc::downgrade(&self.inner);
        let mut state = self.lock();
        let id = state.insert(seed, None, None, &weak);
        state.roots.push(id);
        tracing::debug!("inserted root {}", id);
        id
    }

    /// Remove a root node and its subtree
    pub fn remove_root(&self, id: NodeId) -> bool {
        let removed = {
            let mut state = self.lock();
            let Some(pos) = state.roots.iter().position(|&root| root == id) else {
                return false;
            };
            state.roots.remove(pos);
            state.remove_subtree(id, self.inner.options.abort_superseded)
        };
        for node in removed {
            self.emit(TreeEvent::NodeRemoved(node));
        }
        true
    }

    pub fn roots(&self) -> Vec<NodeId> {
        self.lock().roots.clone()
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.lock().nodes.contains_key(&id)
    }

    /// Get number of nodes currently in memory
    pub fn node_count(&self) -> usize {
        self.lock().nodes.len()
    }

    /// Cached children of one group, or of all groups in registration order
    ///
    /// Never waits for a fetch. Every selected group that is still `Unloaded`
    /// contributes nothing and gets exactly one load scheduled.
    pub fn get_children(&self, id: NodeId, group: Option<GroupId>) -> Vec<NodeId> {
        let (children, pending) = {
            let mut state = self.lock();
            let Some(node) = state.nodes.get_mut(&id) else {
                tracing::trace!("get_children on removed node {}", id);
                return Vec::new();
            };

            let mut children = Vec::new();
            let mut pending = Vec::new();
            for group in node.selected_groups(group) {
                let Some(slot) = node.slot_mut(group) else {
                    continue;
                };
                if slot.state.is_unloaded() {
                    pending.push(claim(id, group, slot));
                } else {
                    children.extend_from_slice(&slot.children);
                }
            }
            (children, pending)
        };

        for load in pending {
            self.launch(load);
        }
        children
    }

    /// Invalidate and reload one group, or all groups, whatever their state
    ///
    /// Always starts a new generation; a load already in flight for the same
    /// group is superseded and its result will be ignored.
    pub fn refresh_children(&self, id: NodeId, group: Option<GroupId>) {
        let pending: Vec<PendingLoad> = {
            let mut state = self.lock();
            let Some(node) = state.nodes.get_mut(&id) else {
                tracing::trace!("refresh_children on removed node {}", id);
                return;
            };
            node.selected_groups(group)
                .into_iter()
                .filter_map(|group| node.slot_mut(group).map(|slot| claim(id, group, slot)))
                .collect()
        };

        for load in pending {
            self.launch(load);
        }
    }

    /// Ask the host to re-render a node's label, icon and description
    pub fn refresh_view(&self, id: NodeId) {
        if self.contains(id) {
            self.emit(TreeEvent::ViewChanged(id));
        }
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.lock().nodes.get(&id).and_then(|node| node.parent)
    }

    pub fn view(&self, id: NodeId) -> Option<Arc<dyn NodeView>> {
        self.lock().nodes.get(&id).map(|node| Arc::clone(&node.view))
    }

    pub fn action_set(&self, id: NodeId) -> Option<ActionSetId> {
        self.lock().nodes.get(&id).and_then(|node| node.action_set.clone())
    }

    /// The node's domain value, if it has type `T`
    pub fn value<T: Any + Send + Sync>(&self, id: NodeId) -> Option<Arc<T>> {
        let value = self.lock().nodes.get(&id).map(|node| Arc::clone(&node.value))?;
        value.downcast::<T>().ok()
    }

    /// Snapshot of every loader group of a node
    pub fn groups(&self, id: NodeId) -> Vec<GroupStatus> {
        let state = self.lock();
        let Some(node) = state.nodes.get(&id) else {
            return Vec::new();
        };
        node.groups
            .iter()
            .enumerate()
            .map(|(index, slot)| GroupStatus::from((GroupId(index), slot)))
            .collect()
    }

    /// Find a group by the name its loader was registered with
    pub fn group_by_name(&self, id: NodeId, name: &str) -> Option<GroupId> {
        let state = self.lock();
        let node = state.nodes.get(&id)?;
        node.groups
            .iter()
            .position(|slot| slot.loader.name() == Some(name))
            .map(GroupId)
    }

    pub fn load_state(&self, id: NodeId, group: GroupId) -> Option<LoadState> {
        let state = self.lock();
        state
            .nodes
            .get(&id)
            .and_then(|node| node.slot(group))
            .map(|slot| slot.state.clone())
    }

    pub fn generation(&self, id: NodeId, group: GroupId) -> Option<u64> {
        let state = self.lock();
        state
            .nodes
            .get(&id)
            .and_then(|node| node.slot(group))
            .map(|slot| slot.generation)
    }

    /// Get the parent chain for a node (from root to node)
    pub fn ancestors(&self, id: NodeId) -> Vec<NodeId> {
        let state = self.lock();
        let mut ancestors = Vec::new();
        let mut current = state.nodes.contains_key(&id).then_some(id);

        while let Some(node_id) = current {
            ancestors.push(node_id);
            current = state.nodes.get(&node_id).and_then(|n| n.parent);
        }

        ancestors.reverse();
        ancestors
    }

    /// Get the depth of a node (roots are 0)
    pub fn depth(&self, id: NodeId) -> usize {
        self.ancestors(id).len().saturating_sub(1)
    }

    /// Number of loads whose results have not been applied yet
    pub fn loads_in_flight(&self) -> usize {
        self.inner.in_flight.load(Ordering::Acquire)
    }

    /// Wait until every started load, stale ones included, has completed
    pub async fn wait_idle(&self) {
        loop {
            let notified = self.inner.idle.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            if self.loads_in_flight() == 0 {
                return;
            }
            notified.await;
        }
    }

    fn lock(&self) -> MutexGuard<'_, TreeState> {
        self.inner
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn emit(&self, event: TreeEvent) {
        if let Some(events) = &self.inner.events {
            // The host may have gone away; nothing to do then
            let _ = events.send(event);
        }
    }

    /// Spawn the fetch of a claimed generation and its completion handler
    fn launch(&self, load: PendingLoad) {
        let PendingLoad {
            node,
            group,
            generation,
            loader,
            superseded,
        } = load;

        if self.inner.options.abort_superseded {
            if let Some(handle) = superseded {
                tracing::trace!("aborting superseded load of {} {}", node, group);
                handle.abort();
            }
        }

        tracing::trace!("loading {} {} generation {}", node, group, generation);
        self.emit(TreeEvent::LoadStarted {
            node,
            group,
            generation,
        });

        let fetch = loader.fetch();
        let timeout = self.inner.options.timeout;
        let fetch_task = self.inner.runtime.spawn(async move {
            match timeout {
                Some(limit) => tokio::time::timeout(limit, fetch)
                    .await
                    .unwrap_or(Err(LoadError::TimedOut(limit))),
                None => fetch.await,
            }
        });
        let abort = fetch_task.abort_handle();

        self.inner.in_flight.fetch_add(1, Ordering::AcqRel);
        let tree = Arc::downgrade(&self.inner);
        self.inner.runtime.spawn(async move {
            let result = match fetch_task.await {
                Ok(result) => result,
                Err(e) if e.is_cancelled() => Err(LoadError::Aborted),
                Err(_) => Err(LoadError::Panicked),
            };
            let Some(inner) = tree.upgrade() else {
                return;
            };
            let _finished = LoadFinished(Arc::clone(&inner));
            ExplorerTree { inner }.complete(node, group, generation, result);
        });

        let mut state = self.lock();
        if let Some(slot) = state.nodes.get_mut(&node).and_then(|n| n.slot_mut(group)) {
            if slot.generation == generation && slot.state.is_loading() {
                slot.in_flight = Some(abort);
            }
        }
    }

    /// Apply a finished load, if its generation is still current
    fn complete(
        &self,
        node: NodeId,
        group: GroupId,
        generation: u64,
        result: Result<Vec<FetchedChild>, LoadError>,
    ) {
        let fetched = match result {
            Ok(fetched) => dedup_last_wins(fetched),
            Err(error) => return self.fail(node, group, generation, error),
        };

        // Decide which items are new while holding the lock, then run the
        // factories without it so they can never deadlock against the tree.
        let existing: HashSet<ChildKey> = {
            let mut state = self.lock();
            let Some(slot) = state.current_slot_mut(node, group, generation) else {
                return;
            };
            let children = slot.children.clone();
            children
                .iter()
                .filter_map(|child| state.nodes.get(child).and_then(|n| n.key.clone()))
                .collect()
        };

        // A panicking factory fails the group the same way a panicking fetch does
        let planned = panic::catch_unwind(AssertUnwindSafe(|| {
            fetched
                .into_iter()
                .map(|child| {
                    let key = child.key.clone();
                    if existing.contains(&key) {
                        (key, Planned::Kept(child.into_value()))
                    } else {
                        (key, Planned::New(child.build()))
                    }
                })
                .collect::<Vec<_>>()
        }));
        let Ok(planned) = planned else {
            return self.fail(node, group, generation, LoadError::Panicked);
        };

        let Reconciled { removed, rebound } = {
            let weak = Arc::downgrade(&self.inner);
            let mut state = self.lock();
            if state.current_slot_mut(node, group, generation).is_none() {
                return;
            }
            state.reconcile(node, group, planned, &weak, self.inner.options.abort_superseded)
        };

        let changed: Vec<NodeId> = rebound
            .into_iter()
            .filter(|kept| kept.view.rebind(&kept.value))
            .map(|kept| kept.node)
            .collect();

        tracing::debug!(
            "loaded {} {} generation {} ({} removed, {} re-rendered)",
            node,
            group,
            generation,
            removed.len(),
            changed.len()
        );
        for id in removed {
            self.emit(TreeEvent::NodeRemoved(id));
        }
        for id in changed {
            self.emit(TreeEvent::ViewChanged(id));
        }
        self.emit(TreeEvent::ChildrenChanged { node, group });
    }

    /// Mark a group failed, if `generation` is still its current one
    fn fail(&self, node: NodeId, group: GroupId, generation: u64, error: LoadError) {
        {
            let mut state = self.lock();
            let Some(slot) = state.current_slot_mut(node, group, generation) else {
                return;
            };
            tracing::warn!("failed to load {} {}: {}", node, group, error);
            slot.state = LoadState::Failed(error);
            slot.in_flight = None;
        }
        self.emit(TreeEvent::ChildrenChanged { node, group });
    }
}

/// Start a new generation for a group
fn claim(node: NodeId, group: GroupId, slot: &mut super::node::GroupSlot) -> PendingLoad {
    slot.generation += 1;
    slot.state = LoadState::Loading;
    PendingLoad {
        node,
        group,
        generation: slot.generation,
        loader: Arc::clone(&slot.loader),
        superseded: slot.in_flight.take(),
    }
}

/// Keep only the last occurrence of every key, at that occurrence's position
fn dedup_last_wins(fetched: Vec<FetchedChild>) -> Vec<FetchedChild> {
    let mut last: HashMap<ChildKey, usize> = HashMap::with_capacity(fetched.len());
    for (index, child) in fetched.iter().enumerate() {
        last.insert(child.key.clone(), index);
    }
    if last.len() == fetched.len() {
        return fetched;
    }

    tracing::debug!(
        "dropping {} duplicate item(s) from fetch",
        fetched.len() - last.len()
    );
    fetched
        .into_iter()
        .enumerate()
        .filter(|(index, child)| last.get(&child.key) == Some(index))
        .map(|(_, child)| child)
        .collect()
}

impl TreeState {
    fn insert(
        &mut self,
        seed: NodeSeed,
        parent: Option<NodeId>,
        key: Option<ChildKey>,
        tree: &Weak<TreeInner>,
    ) -> NodeId {
        let id = NodeId(self.next_id);
        self.next_id += 1;

        let node = TreeNode::new(id, seed, parent, key);
        node.view.set_refresher(Some(Arc::new(NodeRefresher {
            tree: Weak::clone(tree),
            node: id,
        })));
        self.nodes.insert(id, node);
        id
    }

    /// The group's slot, only if `generation` is still its current one
    fn current_slot_mut(
        &mut self,
        node: NodeId,
        group: GroupId,
        generation: u64,
    ) -> Option<&mut super::node::GroupSlot> {
        let Some(slot) = self.nodes.get_mut(&node).and_then(|n| n.slot_mut(group)) else {
            tracing::debug!("discarding load of removed {} {}", node, group);
            return None;
        };
        if slot.generation != generation {
            tracing::debug!(
                "discarding stale load of {} {} (generation {}, current {})",
                node,
                group,
                generation,
                slot.generation
            );
            return None;
        }
        Some(slot)
    }

    /// Replace a group's children with the fetched set, reusing kept nodes
    ///
    /// Kept nodes take the fetched value and their loaders list from it from
    /// now on; their views are returned so the caller can rebind them outside
    /// the lock.
    fn reconcile(
        &mut self,
        node: NodeId,
        group: GroupId,
        planned: Vec<(ChildKey, Planned)>,
        tree: &Weak<TreeInner>,
        abort_loads: bool,
    ) -> Reconciled {
        let previous = self
            .nodes
            .get_mut(&node)
            .and_then(|n| n.slot_mut(group))
            .map(|slot| std::mem::take(&mut slot.children))
            .unwrap_or_default();

        let mut by_key: HashMap<ChildKey, NodeId> = previous
            .iter()
            .filter_map(|&child| {
                let key = self.nodes.get(&child)?.key.clone()?;
                Some((key, child))
            })
            .collect();

        let mut children = Vec::with_capacity(planned.len());
        let mut rebound = Vec::new();
        for (key, planned) in planned {
            match (by_key.remove(&key), planned) {
                (Some(existing), Planned::Kept(value)) => {
                    if let Some(child) = self.nodes.get_mut(&existing) {
                        child.value = Arc::clone(&value);
                        for slot in &child.groups {
                            slot.loader.rebind_owner(&value);
                        }
                        rebound.push(Rebound {
                            node: existing,
                            view: Arc::clone(&child.view),
                            value,
                        });
                    }
                    children.push(existing);
                }
                (Some(existing), Planned::New(_)) => children.push(existing),
                (None, Planned::New(seed)) => {
                    children.push(self.insert(seed, Some(node), Some(key), tree));
                }
                // The generation still matches, so planned keys are still present
                (None, Planned::Kept(_)) => {}
            }
        }

        let mut removed = Vec::new();
        for (_, child) in by_key {
            removed.extend(self.remove_subtree(child, abort_loads));
        }

        if let Some(slot) = self.nodes.get_mut(&node).and_then(|n| n.slot_mut(group)) {
            slot.children = children;
            slot.state = LoadState::Loaded;
            slot.in_flight = None;
        }
        Reconciled { removed, rebound }
    }

    /// Remove a node and all its descendants, returning their ids
    fn remove_subtree(&mut self, id: NodeId, abort_loads: bool) -> Vec<NodeId> {
        let mut removed = Vec::new();
        let mut stack = vec![id];

        while let Some(current) = stack.pop() {
            let Some(node) = self.nodes.remove(&current) else {
                continue;
            };
            node.view.set_refresher(None);
            for slot in node.groups {
                if abort_loads {
                    if let Some(handle) = slot.in_flight {
                        handle.abort();
                    }
                }
                stack.extend(slot.children);
            }
            removed.push(node.id);
        }

        removed
    }
}

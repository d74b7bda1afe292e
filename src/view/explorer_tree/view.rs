use super::node::{LoadState, NodeId};
use super::tree::{ExplorerTree, TreeEvent};
use std::collections::HashSet;
use std::fmt;
use std::sync::mpsc;

/// Host-side view state over an `ExplorerTree`
///
/// Tracks which nodes are expanded and which one is selected, and flattens
/// the expanded part of the tree into display rows. Expanding a node asks
/// the tree for its children, which starts loading unloaded groups;
/// collapsing keeps the cached subtree.
pub struct ExplorerView {
    tree: ExplorerTree,
    events: Option<mpsc::Receiver<TreeEvent>>,
    expanded: HashSet<NodeId>,
    selected_node: Option<NodeId>,
    /// Set when a tree event arrived since the last `take_dirty`
    dirty: bool,
}

impl ExplorerView {
    pub fn new(tree: ExplorerTree, events: Option<mpsc::Receiver<TreeEvent>>) -> Self {
        let selected_node = tree.roots().first().copied();
        Self {
            tree,
            events,
            expanded: HashSet::new(),
            selected_node,
            dirty: true,
        }
    }

    /// Get the underlying tree
    pub fn tree(&self) -> &ExplorerTree {
        &self.tree
    }

    pub fn is_expanded(&self, id: NodeId) -> bool {
        self.expanded.contains(&id)
    }

    /// Expand a node; its unloaded groups start loading
    pub fn expand(&mut self, id: NodeId) {
        if !self.tree.contains(id) {
            return;
        }
        self.expanded.insert(id);
        self.tree.get_children(id, None);
        self.dirty = true;
    }

    pub fn collapse(&mut self, id: NodeId) {
        if self.expanded.remove(&id) {
            self.dirty = true;
        }
    }

    pub fn toggle(&mut self, id: NodeId) {
        if self.is_expanded(id) {
            self.collapse(id);
        } else {
            self.expand(id);
        }
    }

    /// Expand every node above `depth`, waiting for each level to load
    pub async fn expand_to_depth(&mut self, depth: usize) {
        loop {
            let pending: Vec<NodeId> = self
                .display_nodes()
                .into_iter()
                .filter(|&(id, level)| {
                    level < depth && !self.is_expanded(id) && !self.tree.groups(id).is_empty()
                })
                .map(|(id, _)| id)
                .collect();
            if pending.is_empty() {
                break;
            }
            for id in pending {
                self.expand(id);
            }
            self.tree.wait_idle().await;
        }
        self.process_events();
    }

    /// Initial expansion for a non-interactive host
    ///
    /// With `expand_roots` off every root stays collapsed and nothing loads.
    /// Otherwise the roots open and expansion continues down to `depth`.
    pub async fn expand_on_startup(&mut self, expand_roots: bool, depth: usize) {
        if expand_roots {
            self.expand_to_depth(depth.max(1)).await;
        } else {
            self.process_events();
        }
    }

    /// Get currently visible nodes with their indent levels
    ///
    /// Returns a list of (NodeId, indent_level) tuples for rendering.
    pub fn display_nodes(&self) -> Vec<(NodeId, usize)> {
        let mut rows = Vec::new();
        for root in self.tree.roots() {
            self.collect_visible(root, 0, &mut rows);
        }
        rows
    }

    fn collect_visible(&self, id: NodeId, depth: usize, rows: &mut Vec<(NodeId, usize)>) {
        rows.push((id, depth));
        if self.is_expanded(id) {
            for child in self.tree.get_children(id, None) {
                self.collect_visible(child, depth + 1, rows);
            }
        }
    }

    /// Get the currently selected node ID
    pub fn get_selected(&self) -> Option<NodeId> {
        self.selected_node
    }

    /// Set the selected node
    pub fn set_selected(&mut self, node_id: Option<NodeId>) {
        self.selected_node = node_id.filter(|&id| self.tree.contains(id));
    }

    /// Select the next visible node
    pub fn select_next(&mut self) {
        self.move_selection(|pos, len| (pos + 1 < len).then_some(pos + 1));
    }

    /// Select the previous visible node
    pub fn select_prev(&mut self) {
        self.move_selection(|pos, _| pos.checked_sub(1));
    }

    /// Select the parent of the selected node
    pub fn select_parent(&mut self) {
        if let Some(parent) = self.selected_node.and_then(|id| self.tree.parent(id)) {
            self.selected_node = Some(parent);
        }
    }

    fn move_selection(&mut self, step: impl Fn(usize, usize) -> Option<usize>) {
        let visible = self.display_nodes();
        if visible.is_empty() {
            return;
        }

        let current = self
            .selected_node
            .and_then(|id| visible.iter().position(|&(row, _)| row == id));
        match current {
            Some(pos) => {
                if let Some(next) = step(pos, visible.len()) {
                    self.selected_node = Some(visible[next].0);
                }
            }
            None => self.selected_node = Some(visible[0].0),
        }
    }

    /// Reload every group of the selected node
    pub fn refresh_selected(&self) {
        if let Some(id) = self.selected_node {
            self.tree.refresh_children(id, None);
        }
    }

    /// Drain pending tree events, returning how many arrived
    pub fn process_events(&mut self) -> usize {
        let Some(events) = &self.events else {
            return 0;
        };

        let mut removed = Vec::new();
        let mut count = 0;
        while let Ok(event) = events.try_recv() {
            count += 1;
            if let TreeEvent::NodeRemoved(id) = event {
                removed.push(id);
            }
        }

        for id in removed {
            self.expanded.remove(&id);
            if self.selected_node == Some(id) {
                self.selected_node = None;
            }
        }
        if count > 0 {
            self.dirty = true;
        }
        count
    }

    /// Whether the view needs a redraw; clears the flag
    pub fn take_dirty(&mut self) -> bool {
        std::mem::take(&mut self.dirty)
    }

    /// Render the visible rows as indented text
    pub fn render(&self) -> String {
        self.to_string()
    }
}

/// Each row shows an expansion marker, the label, the description and the
/// action set. Groups of expanded nodes that are loading or failed get an
/// extra line.
impl fmt::Display for ExplorerView {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (id, depth) in self.display_nodes() {
            let Some(view) = self.tree.view(id) else {
                continue;
            };
            let groups = self.tree.groups(id);
            let indent = "  ".repeat(depth);
            let marker = match (groups.is_empty(), self.is_expanded(id)) {
                (true, _) => ' ',
                (false, true) => '-',
                (false, false) => '+',
            };
            let cursor = if self.selected_node == Some(id) { '>' } else { ' ' };

            write!(f, "{cursor}{indent}{marker} {}", view.label())?;
            if let Some(description) = view.description() {
                write!(f, " ({description})")?;
            }
            if let Some(actions) = self.tree.action_set(id) {
                write!(f, " [{actions}]")?;
            }
            writeln!(f)?;

            if !self.is_expanded(id) {
                continue;
            }
            for group in groups {
                let name = group.name.unwrap_or_else(|| group.id.to_string());
                match group.state {
                    LoadState::Loading => writeln!(f, " {indent}  … {name}: loading")?,
                    LoadState::Failed(error) => writeln!(f, " {indent}  ! {name}: {error}")?,
                    LoadState::Unloaded | LoadState::Loaded => {}
                }
            }
        }
        Ok(())
    }
}

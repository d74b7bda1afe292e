// Explorer tree module for lazily loaded cloud resource hierarchies
//
// Nodes declare their children as loader groups that only run when a host
// first asks for them. Reloads diff the fetched items against the existing
// children by identity, so unrelated subtrees survive a refresh, and a
// per-group generation counter makes overlapping reloads resolve to the
// newest one.

pub mod key;
pub mod labels;
pub mod loader;
pub mod node;
pub mod node_view;
pub mod tree;
pub mod view;

pub use key::ChildKey;
pub use labels::{ResourceIconProvider, ResourceLabelView, ServiceLabelView, ICON_DIR};
pub use loader::{BoxFuture, ChildLoader, LoadError, ResourceLister};
pub use node::{ActionSetId, AnyNode, GroupId, GroupStatus, LoadState, Node, NodeId};
pub use node_view::{
    Icon, IconModifier, IconProvider, NodeView, Refresher, RefresherSlot, StaticView,
};
pub use tree::{ExplorerTree, LoadOptions, TreeEvent};
pub use view::ExplorerView;

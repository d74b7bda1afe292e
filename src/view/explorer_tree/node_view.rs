use serde::{Deserialize, Serialize};
use std::any::Any;
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};

/// Callback a view uses to ask its owner for a re-render or a reload
///
/// The tree supplies the implementation. Both methods default to no-ops so
/// hosts can plug in partial refreshers.
pub trait Refresher: Send + Sync {
    /// Re-render just this node's label, icon and description
    fn refresh_view(&self) {}

    /// Reload this node's children
    fn refresh_children(&self) {}
}

/// Display facade over a node
///
/// This is the only interface a rendering back-end implements. It never
/// reaches into the loaders; everything it can ask of the tree goes through
/// the attached `Refresher`.
pub trait NodeView: Send + Sync {
    fn label(&self) -> String;

    fn icon_path(&self) -> Option<String>;

    fn description(&self) -> Option<String> {
        None
    }

    fn icon(&self) -> Option<Icon> {
        self.icon_path()
            .filter(|path| !path.is_empty())
            .map(Icon::new)
    }

    fn set_refresher(&self, refresher: Option<Arc<dyn Refresher>>);

    fn refresher(&self) -> Option<Arc<dyn Refresher>>;

    /// Take a newer value of the same item after the parent reloaded
    ///
    /// Returns true if the view now shows the new value. The tree sends the
    /// re-render request itself, so implementations must not call `refresh`.
    fn rebind(&self, _value: &Arc<dyn Any + Send + Sync>) -> bool {
        false
    }

    /// Ask the owner to re-render this node (no-op without a refresher)
    fn refresh(&self) {
        if let Some(refresher) = self.refresher() {
            refresher.refresh_view();
        }
    }

    fn refresh_view(&self) {
        self.refresh();
    }

    /// Ask the owner to reload this node's children (no-op without a refresher)
    fn refresh_children(&self) {
        if let Some(refresher) = self.refresher() {
            refresher.refresh_children();
        }
    }
}

/// Storage for the refresher attached to a view
///
/// Views are shared with the host behind `Arc`, so the slot is interior
/// mutable.
#[derive(Default)]
pub struct RefresherSlot(RwLock<Option<Arc<dyn Refresher>>>);

impl RefresherSlot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self) -> Option<Arc<dyn Refresher>> {
        self.0
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn set(&self, refresher: Option<Arc<dyn Refresher>>) {
        *self.0.write().unwrap_or_else(PoisonError::into_inner) = refresher;
    }

    pub fn is_attached(&self) -> bool {
        self.get().is_some()
    }
}

impl fmt::Debug for RefresherSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("RefresherSlot")
            .field(&if self.is_attached() { "<attached>" } else { "<none>" })
            .finish()
    }
}

/// A view with a fixed label
#[derive(Debug)]
pub struct StaticView {
    label: String,
    icon_path: Option<String>,
    description: Option<String>,
    refresher: RefresherSlot,
}

impl StaticView {
    pub fn new(label: impl Into<String>, icon_path: Option<&str>) -> Self {
        Self {
            label: label.into(),
            icon_path: icon_path.map(str::to_string),
            description: None,
            refresher: RefresherSlot::new(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

impl NodeView for StaticView {
    fn label(&self) -> String {
        self.label.clone()
    }

    fn icon_path(&self) -> Option<String> {
        self.icon_path.clone()
    }

    fn description(&self) -> Option<String> {
        self.description.clone()
    }

    fn set_refresher(&self, refresher: Option<Arc<dyn Refresher>>) {
        self.refresher.set(refresher);
    }

    fn refresher(&self) -> Option<Arc<dyn Refresher>> {
        self.refresher.get()
    }
}

/// Overlay drawn on top of a base icon
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IconModifier {
    Linux,
    Running,
    Stopped,
    Updating,
    Failed,
}

/// An icon reference the host resolves to an asset
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Icon {
    pub path: String,
    #[serde(default)]
    pub modifiers: Vec<IconModifier>,
}

impl Icon {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            modifiers: Vec::new(),
        }
    }

    /// Add a modifier, ignoring duplicates
    pub fn with_modifier(mut self, modifier: IconModifier) -> Self {
        if !self.modifiers.contains(&modifier) {
            self.modifiers.push(modifier);
        }
        self
    }
}

/// Resolves the icon for a resource
pub trait IconProvider<T>: Send + Sync {
    fn icon(&self, resource: &T) -> Option<Icon>;
}

impl<T, F> IconProvider<T> for F
where
    F: Fn(&T) -> Option<Icon> + Send + Sync,
{
    fn icon(&self, resource: &T) -> Option<Icon> {
        self(resource)
    }
}

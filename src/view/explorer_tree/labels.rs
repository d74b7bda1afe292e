use super::node_view::{Icon, IconModifier, IconProvider, NodeView, Refresher, RefresherSlot};
use crate::services::cloud::CloudResource;
use std::any::Any;
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};

type ModifierFn<R> = Arc<dyn Fn(&R) -> Option<IconModifier> + Send + Sync>;
type DescribeFn<R> = Arc<dyn Fn(&R) -> Option<String> + Send + Sync>;

/// Root directory of the bundled resource icons
pub const ICON_DIR: &str = "/icons";

/// Icon provider deriving the icon from resource type and status
///
/// The base icon is `{dir}/{resource_type}.svg`; the status adds its modifier
/// and every registered modifier function may add one more.
pub struct ResourceIconProvider<R> {
    dir: String,
    modifiers: Vec<ModifierFn<R>>,
}

impl<R: CloudResource> ResourceIconProvider<R> {
    pub fn new() -> Self {
        Self::with_dir(ICON_DIR)
    }

    pub fn with_dir(dir: impl Into<String>) -> Self {
        Self {
            dir: dir.into(),
            modifiers: Vec::new(),
        }
    }

    /// Add a computed modifier (e.g. `Linux` for apps not running on Windows)
    pub fn with_modifier<F>(mut self, modifier: F) -> Self
    where
        F: Fn(&R) -> Option<IconModifier> + Send + Sync + 'static,
    {
        self.modifiers.push(Arc::new(modifier));
        self
    }
}

impl<R: CloudResource> Default for ResourceIconProvider<R> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R: CloudResource> IconProvider<R> for ResourceIconProvider<R> {
    fn icon(&self, resource: &R) -> Option<Icon> {
        let mut icon = Icon::new(format!("{}/{}.svg", self.dir, resource.resource_type()));
        if let Some(modifier) = resource.status().and_then(|status| status.icon_modifier()) {
            icon = icon.with_modifier(modifier);
        }
        for modifier in &self.modifiers {
            if let Some(modifier) = modifier(resource) {
                icon = icon.with_modifier(modifier);
            }
        }
        Some(icon)
    }
}

/// View of a service module root ("Storage Account", "Web Apps")
#[derive(Debug)]
pub struct ServiceLabelView {
    label: String,
    icon: Icon,
    refresher: RefresherSlot,
}

impl ServiceLabelView {
    pub fn new(label: impl Into<String>, icon: Icon) -> Self {
        Self {
            label: label.into(),
            icon,
            refresher: RefresherSlot::new(),
        }
    }
}

impl NodeView for ServiceLabelView {
    fn label(&self) -> String {
        self.label.clone()
    }

    fn icon_path(&self) -> Option<String> {
        Some(self.icon.path.clone())
    }

    fn icon(&self) -> Option<Icon> {
        Some(self.icon.clone())
    }

    fn set_refresher(&self, refresher: Option<Arc<dyn Refresher>>) {
        self.refresher.set(refresher);
    }

    fn refresher(&self) -> Option<Arc<dyn Refresher>> {
        self.refresher.get()
    }
}

/// View of a single cloud resource
///
/// The label is the resource name and the description defaults to its status.
/// A reload of the parent rebinds the view to the freshly listed resource.
/// Hosts that observe a change on their own call `update`, which swaps the
/// value and asks the tree to re-render the node.
pub struct ResourceLabelView<R> {
    resource: RwLock<Arc<R>>,
    icons: Arc<dyn IconProvider<R>>,
    describe: DescribeFn<R>,
    refresher: RefresherSlot,
}

impl<R: CloudResource> ResourceLabelView<R> {
    pub fn new(resource: Arc<R>, icons: Arc<dyn IconProvider<R>>) -> Self {
        Self {
            resource: RwLock::new(resource),
            icons,
            describe: Arc::new(|resource: &R| resource.status().map(|s| s.to_string())),
            refresher: RefresherSlot::new(),
        }
    }

    /// Replace the status-based description
    pub fn with_description<F>(mut self, describe: F) -> Self
    where
        F: Fn(&R) -> Option<String> + Send + Sync + 'static,
    {
        self.describe = Arc::new(describe);
        self
    }

    pub fn resource(&self) -> Arc<R> {
        Arc::clone(&self.resource.read().unwrap_or_else(PoisonError::into_inner))
    }

    /// Swap in a newer snapshot of the resource and re-render
    pub fn update(&self, resource: impl Into<Arc<R>>) {
        self.swap(resource.into());
        self.refresh();
    }

    fn swap(&self, resource: Arc<R>) {
        *self.resource.write().unwrap_or_else(PoisonError::into_inner) = resource;
    }
}

impl<R: CloudResource> NodeView for ResourceLabelView<R> {
    fn label(&self) -> String {
        self.resource().name().to_string()
    }

    fn icon_path(&self) -> Option<String> {
        self.icon().map(|icon| icon.path)
    }

    fn icon(&self) -> Option<Icon> {
        self.icons.icon(&self.resource())
    }

    fn description(&self) -> Option<String> {
        (self.describe)(&self.resource())
    }

    fn set_refresher(&self, refresher: Option<Arc<dyn Refresher>>) {
        self.refresher.set(refresher);
    }

    fn refresher(&self) -> Option<Arc<dyn Refresher>> {
        self.refresher.get()
    }

    fn rebind(&self, value: &Arc<dyn Any + Send + Sync>) -> bool {
        match Arc::clone(value).downcast::<R>() {
            Ok(resource) => {
                self.swap(resource);
                true
            }
            Err(_) => false,
        }
    }
}

impl<R: CloudResource + fmt::Debug> fmt::Debug for ResourceLabelView<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResourceLabelView")
            .field("resource", &self.resource())
            .field("refresher", &self.refresher)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::cloud::{OperatingSystem, ResourceStatus, WebApp};
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn app(status: ResourceStatus, os: OperatingSystem) -> WebApp {
        WebApp {
            name: "shop".to_string(),
            resource_group: "rg".to_string(),
            subscription_id: "sub-1".to_string(),
            status,
            os,
        }
    }

    fn linux_provider() -> Arc<dyn IconProvider<WebApp>> {
        Arc::new(ResourceIconProvider::new().with_modifier(|app: &WebApp| {
            (app.os != OperatingSystem::Windows).then_some(IconModifier::Linux)
        }))
    }

    #[derive(Default)]
    struct ViewCounter(AtomicUsize);

    impl Refresher for ViewCounter {
        fn refresh_view(&self) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn test_icon_from_type_and_status() {
        let provider = ResourceIconProvider::<WebApp>::new();
        let icon = provider
            .icon(&app(ResourceStatus::Running, OperatingSystem::Windows))
            .unwrap();
        assert_eq!(icon.path, "/icons/webapp.svg");
        assert_eq!(icon.modifiers, vec![IconModifier::Running]);
    }

    #[test]
    fn test_computed_linux_modifier() {
        let icon = linux_provider()
            .icon(&app(ResourceStatus::Stopped, OperatingSystem::Linux))
            .unwrap();
        assert_eq!(icon.modifiers, vec![IconModifier::Stopped, IconModifier::Linux]);
    }

    #[test]
    fn test_resource_view_label_and_status() {
        let view = ResourceLabelView::new(
            Arc::new(app(ResourceStatus::Running, OperatingSystem::Linux)),
            linux_provider(),
        );
        assert_eq!(view.label(), "shop");
        assert_eq!(view.description().as_deref(), Some("Running"));
        assert_eq!(view.icon_path().as_deref(), Some("/icons/webapp.svg"));
    }

    #[test]
    fn test_update_swaps_value_and_refreshes() {
        let view = ResourceLabelView::new(
            Arc::new(app(ResourceStatus::Running, OperatingSystem::Windows)),
            linux_provider(),
        );
        // Without a refresher the update still applies
        view.update(app(ResourceStatus::Updating, OperatingSystem::Windows));
        assert_eq!(view.description().as_deref(), Some("Updating"));

        let counter = Arc::new(ViewCounter::default());
        view.set_refresher(Some(counter.clone()));
        view.update(app(ResourceStatus::Stopped, OperatingSystem::Windows));

        assert_eq!(counter.0.load(Ordering::SeqCst), 1);
        assert_eq!(view.resource().status, ResourceStatus::Stopped);
        assert_eq!(
            view.icon().unwrap().modifiers,
            vec![IconModifier::Stopped]
        );
    }

    #[test]
    fn test_custom_description() {
        let view = ResourceLabelView::new(
            Arc::new(app(ResourceStatus::Running, OperatingSystem::Windows)),
            linux_provider(),
        )
        .with_description(|app: &WebApp| Some(app.resource_group.clone()));
        assert_eq!(view.description().as_deref(), Some("rg"));
    }

    #[test]
    fn test_service_view() {
        let view = ServiceLabelView::new("Web Apps", Icon::new("/icons/webapp-module.svg"));
        assert_eq!(view.label(), "Web Apps");
        assert_eq!(view.icon_path().as_deref(), Some("/icons/webapp-module.svg"));
        assert!(view.description().is_none());
    }

    #[test]
    fn test_rebind_accepts_only_its_resource_type() {
        let view = ResourceLabelView::new(
            Arc::new(app(ResourceStatus::Running, OperatingSystem::Windows)),
            linux_provider(),
        );
        let counter = Arc::new(ViewCounter::default());
        view.set_refresher(Some(counter.clone()));

        let stopped: Arc<dyn Any + Send + Sync> =
            Arc::new(app(ResourceStatus::Stopped, OperatingSystem::Windows));
        assert!(view.rebind(&stopped));
        assert_eq!(view.description().as_deref(), Some("Stopped"));

        let other: Arc<dyn Any + Send + Sync> = Arc::new("shop".to_string());
        assert!(!view.rebind(&other));
        assert_eq!(view.description().as_deref(), Some("Stopped"));
        assert_eq!(counter.0.load(Ordering::SeqCst), 0);
    }
}

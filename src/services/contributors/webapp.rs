use super::ExplorerContributor;
use crate::services::actions::{ActionDescriptor, ActionRegistry};
use crate::services::cloud::{
    AppFile, CloudClient, DeploymentSlot, OperatingSystem, SlotsGroup, WebApp, WebAppModule,
};
use crate::view::explorer_tree::{
    AnyNode, ChildLoader, Icon, IconModifier, IconProvider, Node, ResourceIconProvider,
    ResourceLabelView, ResourceLister, ServiceLabelView, StaticView, ICON_DIR,
};
use anyhow::Context;
use async_trait::async_trait;
use std::sync::Arc;

pub const WEBAPP_MODULE_ACTIONS: &str = "webapp.module";
pub const WEBAPP_ACTIONS: &str = "webapp.app";
pub const SLOTS_GROUP_ACTIONS: &str = "webapp.slots";
pub const SLOT_ACTIONS: &str = "webapp.slot";
pub const DIRECTORY_ACTIONS: &str = "webapp.directory";
pub const FILE_ACTIONS: &str = "webapp.file";

/// Root of the deployed site content
pub const WWWROOT: &str = "/site/wwwroot";
/// Root of the app's log files
pub const LOG_FILES: &str = "/LogFiles";

/// Contributes the "Web Apps" module
///
/// Each app node has three groups, in order: `slots`, `files` and `logs`.
/// They load and fail independently.
pub struct WebAppExplorerContributor {
    nodes: Arc<WebAppNodes>,
}

impl WebAppExplorerContributor {
    pub fn new(client: Arc<dyn CloudClient>) -> Self {
        let app_icons = ResourceIconProvider::<WebApp>::new().with_modifier(|app: &WebApp| {
            (app.os != OperatingSystem::Windows).then_some(IconModifier::Linux)
        });

        Self {
            nodes: Arc::new(WebAppNodes {
                client,
                app_icons: Arc::new(app_icons),
                slot_icons: Arc::new(ResourceIconProvider::<DeploymentSlot>::new()),
                file_icons: Arc::new(ResourceIconProvider::<AppFile>::new()),
            }),
        }
    }
}

/// Web apps of every subscription, sorted by name
async fn list_apps(client: &dyn CloudClient) -> anyhow::Result<Vec<WebApp>> {
    let subscriptions = client
        .list_subscriptions()
        .await
        .context("listing subscriptions")?;

    let mut apps = Vec::new();
    for subscription in &subscriptions {
        let listed = client
            .list_web_apps(subscription)
            .await
            .with_context(|| format!("listing web apps of {}", subscription.name))?;
        apps.extend(listed);
    }
    apps.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(apps)
}

struct SlotLister {
    client: Arc<dyn CloudClient>,
}

#[async_trait]
impl ResourceLister<SlotsGroup, DeploymentSlot> for SlotLister {
    async fn list(&self, group: &SlotsGroup) -> anyhow::Result<Vec<DeploymentSlot>> {
        self.client
            .list_slots(&group.app)
            .await
            .with_context(|| format!("listing deployment slots of {}", group.app.name))
    }
}

struct DirectoryLister {
    client: Arc<dyn CloudClient>,
}

#[async_trait]
impl ResourceLister<AppFile, AppFile> for DirectoryLister {
    async fn list(&self, dir: &AppFile) -> anyhow::Result<Vec<AppFile>> {
        self.client
            .list_files(&dir.app, &dir.path)
            .await
            .with_context(|| format!("listing {}", dir.path))
    }
}

/// Node factories shared by every loader of the module
struct WebAppNodes {
    client: Arc<dyn CloudClient>,
    app_icons: Arc<dyn IconProvider<WebApp>>,
    slot_icons: Arc<dyn IconProvider<DeploymentSlot>>,
    file_icons: Arc<dyn IconProvider<AppFile>>,
}

impl WebAppNodes {
    fn module(self: &Arc<Self>) -> Node<WebAppModule> {
        let client = Arc::clone(&self.client);
        let nodes = Arc::clone(self);

        Node::new(WebAppModule)
            .view(ServiceLabelView::new(
                "Web Apps",
                Icon::new(format!("{ICON_DIR}/webapp-module.svg")),
            ))
            .actions(WEBAPP_MODULE_ACTIONS)
            .add_loader(
                ChildLoader::keyed(
                    move |_module: Arc<WebAppModule>| {
                        let client = Arc::clone(&client);
                        async move { list_apps(client.as_ref()).await }
                    },
                    WebApp::id,
                    move |app: WebApp, _module: &WebAppModule| nodes.app(app),
                )
                .named("apps"),
            )
    }

    fn app(self: &Arc<Self>, app: WebApp) -> Node<WebApp> {
        let app = Arc::new(app);
        let view = ResourceLabelView::new(Arc::clone(&app), Arc::clone(&self.app_icons));
        let slots = Arc::clone(self);
        let files = Arc::clone(self);
        let logs = Arc::clone(self);

        Node::from_arc(app)
            .view(view)
            .actions(WEBAPP_ACTIONS)
            .add_loader(
                ChildLoader::keyed(
                    |app: Arc<WebApp>| async move {
                        anyhow::Ok(vec![SlotsGroup {
                            app: app.as_ref().clone(),
                        }])
                    },
                    |group: &SlotsGroup| group.app.id(),
                    move |group: SlotsGroup, _app: &WebApp| slots.slots_group(group),
                )
                .named("slots"),
            )
            .add_loader(
                ChildLoader::keyed(
                    |app: Arc<WebApp>| async move { anyhow::Ok(vec![AppFile::root(&app, WWWROOT)]) },
                    |dir: &AppFile| dir.path.clone(),
                    move |dir: AppFile, _app: &WebApp| files.root_directory(dir, "Files"),
                )
                .named("files"),
            )
            .add_loader(
                ChildLoader::keyed(
                    |app: Arc<WebApp>| async move { anyhow::Ok(vec![AppFile::root(&app, LOG_FILES)]) },
                    |dir: &AppFile| dir.path.clone(),
                    move |dir: AppFile, _app: &WebApp| logs.root_directory(dir, "Logs"),
                )
                .named("logs"),
            )
    }

    fn slots_group(self: &Arc<Self>, group: SlotsGroup) -> Node<SlotsGroup> {
        let nodes = Arc::clone(self);
        let lister = Arc::new(SlotLister {
            client: Arc::clone(&self.client),
        });

        Node::new(group)
            .view(StaticView::new(
                "Deployment Slots",
                Some(&format!("{ICON_DIR}/deployment-slots.svg")),
            ))
            .actions(SLOTS_GROUP_ACTIONS)
            .add_loader(
                ChildLoader::from_lister(
                    lister,
                    |slot: &DeploymentSlot| slot.name.clone(),
                    move |slot: DeploymentSlot, _group: &SlotsGroup| nodes.slot(slot),
                )
                .named("slots"),
            )
    }

    fn slot(&self, slot: DeploymentSlot) -> Node<DeploymentSlot> {
        let slot = Arc::new(slot);
        let view = ResourceLabelView::new(Arc::clone(&slot), Arc::clone(&self.slot_icons));
        Node::from_arc(slot).view(view).actions(SLOT_ACTIONS)
    }

    /// `/site/wwwroot` or `/LogFiles`, shown under a fixed label
    fn root_directory(self: &Arc<Self>, dir: AppFile, label: &str) -> Node<AppFile> {
        let view = StaticView::new(label, Some(&format!("{ICON_DIR}/folder.svg")))
            .with_description(dir.path.clone());
        self.file(dir).view(view)
    }

    fn file(self: &Arc<Self>, file: AppFile) -> Node<AppFile> {
        let file = Arc::new(file);
        let view = ResourceLabelView::new(Arc::clone(&file), Arc::clone(&self.file_icons))
            .with_description(|file: &AppFile| file.size.map(|size| format!("{size} B")));

        if !file.is_directory {
            return Node::from_arc(file).view(view).actions(FILE_ACTIONS);
        }

        let nodes = Arc::clone(self);
        let lister = Arc::new(DirectoryLister {
            client: Arc::clone(&self.client),
        });
        Node::from_arc(file)
            .view(view)
            .actions(DIRECTORY_ACTIONS)
            .add_loader(
                ChildLoader::from_lister(
                    lister,
                    |entry: &AppFile| entry.path.clone(),
                    move |entry: AppFile, _dir: &AppFile| nodes.file(entry),
                )
                .named("entries"),
            )
    }
}

impl ExplorerContributor for WebAppExplorerContributor {
    fn name(&self) -> &str {
        "webapp"
    }

    fn root_node(&self) -> AnyNode {
        self.nodes.module().into()
    }

    fn register_actions(&self, registry: &mut ActionRegistry) {
        registry.register(
            WEBAPP_MODULE_ACTIONS,
            [
                ActionDescriptor::new("webapp.refresh", "Refresh"),
                ActionDescriptor::new("webapp.create", "Create Web App"),
            ],
        );
        registry.register(
            WEBAPP_ACTIONS,
            [
                ActionDescriptor::new("webapp.start", "Start"),
                ActionDescriptor::new("webapp.stop", "Stop"),
                ActionDescriptor::new("webapp.restart", "Restart"),
                ActionDescriptor::new("webapp.deploy", "Deploy"),
                ActionDescriptor::new("webapp.open-browser", "Open in Browser"),
                ActionDescriptor::new("webapp.delete", "Delete"),
            ],
        );
        registry.register(
            SLOTS_GROUP_ACTIONS,
            [
                ActionDescriptor::new("webapp.slots.refresh", "Refresh"),
                ActionDescriptor::new("webapp.slots.create", "Create Deployment Slot"),
            ],
        );
        registry.register(
            SLOT_ACTIONS,
            [
                ActionDescriptor::new("webapp.slot.start", "Start"),
                ActionDescriptor::new("webapp.slot.stop", "Stop"),
                ActionDescriptor::new("webapp.slot.swap", "Swap with Production"),
                ActionDescriptor::new("webapp.slot.delete", "Delete"),
            ],
        );
        registry.register(
            DIRECTORY_ACTIONS,
            [ActionDescriptor::new("webapp.directory.refresh", "Refresh")],
        );
        registry.register(
            FILE_ACTIONS,
            [
                ActionDescriptor::new("webapp.file.open", "Open"),
                ActionDescriptor::new("webapp.file.download", "Download"),
            ],
        );
    }
}

use super::ExplorerContributor;
use crate::services::actions::{ActionDescriptor, ActionRegistry};
use crate::services::cloud::{CloudClient, StorageAccount, StorageModule};
use crate::view::explorer_tree::{
    AnyNode, ChildLoader, Icon, IconProvider, Node, ResourceIconProvider, ResourceLabelView,
    ServiceLabelView, ICON_DIR,
};
use anyhow::Context;
use std::sync::Arc;

pub const STORAGE_MODULE_ACTIONS: &str = "storage.module";
pub const STORAGE_ACCOUNT_ACTIONS: &str = "storage.account";

/// Contributes the "Storage Account" module
pub struct StorageExplorerContributor {
    client: Arc<dyn CloudClient>,
    icons: Arc<dyn IconProvider<StorageAccount>>,
}

impl StorageExplorerContributor {
    pub fn new(client: Arc<dyn CloudClient>) -> Self {
        Self {
            client,
            icons: Arc::new(ResourceIconProvider::<StorageAccount>::new()),
        }
    }

    pub fn with_icons(mut self, icons: Arc<dyn IconProvider<StorageAccount>>) -> Self {
        self.icons = icons;
        self
    }
}

/// Storage accounts of every subscription, flattened
async fn list_accounts(client: &dyn CloudClient) -> anyhow::Result<Vec<StorageAccount>> {
    let subscriptions = client
        .list_subscriptions()
        .await
        .context("listing subscriptions")?;

    let mut accounts = Vec::new();
    for subscription in &subscriptions {
        let listed = client
            .list_storage_accounts(subscription)
            .await
            .with_context(|| format!("listing storage accounts of {}", subscription.name))?;
        accounts.extend(listed);
    }
    Ok(accounts)
}

impl ExplorerContributor for StorageExplorerContributor {
    fn name(&self) -> &str {
        "storage"
    }

    fn root_node(&self) -> AnyNode {
        let client = Arc::clone(&self.client);
        let icons = Arc::clone(&self.icons);

        Node::new(StorageModule)
            .view(ServiceLabelView::new(
                "Storage Account",
                Icon::new(format!("{ICON_DIR}/storage-module.svg")),
            ))
            .actions(STORAGE_MODULE_ACTIONS)
            .add_loader(
                ChildLoader::keyed(
                    move |_module: Arc<StorageModule>| {
                        let client = Arc::clone(&client);
                        async move { list_accounts(client.as_ref()).await }
                    },
                    StorageAccount::id,
                    move |account: StorageAccount, _module: &StorageModule| {
                        let account = Arc::new(account);
                        let view = ResourceLabelView::new(Arc::clone(&account), Arc::clone(&icons))
                            .with_description(|account: &StorageAccount| account.kind.clone());
                        Node::from_arc(account)
                            .view(view)
                            .actions(STORAGE_ACCOUNT_ACTIONS)
                    },
                )
                .named("accounts"),
            )
            .into()
    }

    fn register_actions(&self, registry: &mut ActionRegistry) {
        registry.register(
            STORAGE_MODULE_ACTIONS,
            [
                ActionDescriptor::new("storage.refresh", "Refresh"),
                ActionDescriptor::new("storage.create", "Create Storage Account"),
            ],
        );
        registry.register(
            STORAGE_ACCOUNT_ACTIONS,
            [
                ActionDescriptor::new("storage.open-portal", "Open in Portal"),
                ActionDescriptor::new("storage.copy-connection-string", "Copy Connection String"),
                ActionDescriptor::new("storage.delete", "Delete"),
            ],
        );
    }
}

//! Cloud resource model and the listing interface the explorer consumes

pub mod catalog;
pub mod model;

pub use catalog::{Catalog, CatalogClient, CatalogFile, CatalogLatency, ClientMetrics};
pub use model::{
    AppFile, CloudResource, DeploymentSlot, OperatingSystem, ResourceId, ResourceStatus,
    SlotsGroup, StorageAccount, StorageModule, Subscription, WebApp, WebAppModule,
};

use async_trait::async_trait;

/// Resource-listing backend
///
/// Implemented by cloud SDK adapters and by the in-memory `CatalogClient`.
/// Every call may suspend on network I/O.
#[async_trait]
pub trait CloudClient: Send + Sync {
    async fn list_subscriptions(&self) -> anyhow::Result<Vec<Subscription>>;

    async fn list_storage_accounts(
        &self,
        subscription: &Subscription,
    ) -> anyhow::Result<Vec<StorageAccount>>;

    async fn list_web_apps(&self, subscription: &Subscription) -> anyhow::Result<Vec<WebApp>>;

    async fn list_slots(&self, app: &WebApp) -> anyhow::Result<Vec<DeploymentSlot>>;

    /// Immediate entries of directory `dir` of an app
    async fn list_files(&self, app: &WebApp, dir: &str) -> anyhow::Result<Vec<AppFile>>;
}

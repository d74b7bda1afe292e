//! In-memory cloud backend
//!
//! `CatalogClient` serves a fixed catalog of resources, typically loaded from
//! a JSON file. Each call can be delayed to simulate a slow network and is
//! counted, so the CLI and tests can observe exactly how many listing calls
//! the explorer made.

use super::model::{AppFile, DeploymentSlot, StorageAccount, Subscription, WebApp};
use super::CloudClient;
use anyhow::{bail, Context};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;
use tokio::sync::Mutex;

/// Resources served by a `CatalogClient`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Catalog {
    #[serde(default)]
    pub subscriptions: Vec<Subscription>,
    #[serde(default)]
    pub storage_accounts: Vec<StorageAccount>,
    #[serde(default)]
    pub web_apps: Vec<WebApp>,
    #[serde(default)]
    pub slots: Vec<DeploymentSlot>,
    #[serde(default)]
    pub files: Vec<CatalogFile>,
    /// Calls that fail, by call key, with the error message to return
    ///
    /// Keys: `subscriptions`, `storage_accounts:{sub}`, `web_apps:{sub}`,
    /// `slots:{app}`, `files:{app}:{dir}`.
    #[serde(default)]
    pub failures: BTreeMap<String, String>,
}

/// A file of an app; a path ending in `/` is an (empty) directory
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogFile {
    pub app: String,
    pub path: String,
    #[serde(default)]
    pub size: Option<u64>,
}

impl Catalog {
    /// Load a catalog from a JSON file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("reading catalog {}", path.display()))?;
        serde_json::from_str(&contents).with_context(|| format!("parsing catalog {}", path.display()))
    }

    /// Immediate entries of `dir`: directories first, then files, each by name
    pub fn list_dir(&self, app: &WebApp, dir: &str) -> Vec<AppFile> {
        let prefix = format!("{}/", dir.trim_end_matches('/'));
        let mut dirs = BTreeSet::new();
        let mut files = BTreeMap::new();

        for file in self.files.iter().filter(|f| f.app == app.name) {
            let Some(rest) = file.path.strip_prefix(&prefix) else {
                continue;
            };
            match rest.split_once('/') {
                Some((name, _)) if !name.is_empty() => {
                    dirs.insert(name.to_string());
                }
                None if !rest.is_empty() => {
                    files.insert(rest.to_string(), file.size);
                }
                _ => {}
            }
        }

        let dirs = dirs.into_iter().map(|name| AppFile {
            app: app.clone(),
            path: format!("{prefix}{name}"),
            is_directory: true,
            size: None,
        });
        let files = files.into_iter().map(|(name, size)| AppFile {
            app: app.clone(),
            path: format!("{prefix}{name}"),
            is_directory: false,
            size,
        });
        dirs.chain(files).collect()
    }
}

/// Artificial delay per listing call
#[derive(Debug, Clone, Default)]
pub struct CatalogLatency {
    pub subscriptions: Duration,
    pub storage_accounts: Duration,
    pub web_apps: Duration,
    pub slots: Duration,
    pub files: Duration,
}

impl CatalogLatency {
    /// Create a latency profile with the same delay for every call
    pub fn uniform(delay: Duration) -> Self {
        Self {
            subscriptions: delay,
            storage_accounts: delay,
            web_apps: delay,
            slots: delay,
            files: delay,
        }
    }

    /// Create a profile with no delays
    pub fn none() -> Self {
        Self::uniform(Duration::ZERO)
    }

    /// Create a profile simulating a remote management API
    pub fn slow_network() -> Self {
        Self {
            subscriptions: Duration::from_millis(300),
            storage_accounts: Duration::from_millis(500),
            web_apps: Duration::from_millis(500),
            slots: Duration::from_millis(200),
            files: Duration::from_millis(150),
        }
    }
}

/// Counters for calls made against a `CatalogClient`
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClientMetrics {
    pub subscription_calls: usize,
    pub storage_account_calls: usize,
    pub web_app_calls: usize,
    pub slot_calls: usize,
    pub file_calls: usize,
    /// Total time spent in artificial delays
    pub total_delay_time: Duration,
}

impl ClientMetrics {
    /// Reset all metrics to zero
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// Get total number of listing calls
    pub fn total_calls(&self) -> usize {
        self.subscription_calls
            + self.storage_account_calls
            + self.web_app_calls
            + self.slot_calls
            + self.file_calls
    }
}

/// `CloudClient` backed by an in-memory `Catalog`
pub struct CatalogClient {
    catalog: RwLock<Catalog>,
    latency: CatalogLatency,
    metrics: Arc<Mutex<ClientMetrics>>,
}

impl CatalogClient {
    pub fn new(catalog: Catalog) -> Self {
        Self::with_latency(catalog, CatalogLatency::none())
    }

    pub fn with_latency(catalog: Catalog, latency: CatalogLatency) -> Self {
        Self {
            catalog: RwLock::new(catalog),
            latency,
            metrics: Arc::new(Mutex::new(ClientMetrics::default())),
        }
    }

    /// Get a snapshot of current metrics
    pub async fn metrics(&self) -> ClientMetrics {
        self.metrics.lock().await.clone()
    }

    /// Reset metrics to zero
    pub async fn reset_metrics(&self) {
        self.metrics.lock().await.reset();
    }

    /// Mutate the catalog; later listing calls see the change
    pub fn update(&self, f: impl FnOnce(&mut Catalog)) {
        f(&mut self.catalog.write().unwrap_or_else(PoisonError::into_inner));
    }

    pub fn snapshot(&self) -> Catalog {
        self.read(Catalog::clone)
    }

    fn read<R>(&self, f: impl FnOnce(&Catalog) -> R) -> R {
        f(&self.catalog.read().unwrap_or_else(PoisonError::into_inner))
    }

    /// Fail with the configured message if `call` is marked as failing
    fn check(&self, call: &str) -> anyhow::Result<()> {
        if let Some(message) = self.read(|catalog| catalog.failures.get(call).cloned()) {
            bail!("{message}");
        }
        Ok(())
    }

    /// Add delay and update metrics
    async fn add_delay(&self, delay: Duration) {
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
            self.metrics.lock().await.total_delay_time += delay;
        }
    }
}

#[async_trait]
impl CloudClient for CatalogClient {
    async fn list_subscriptions(&self) -> anyhow::Result<Vec<Subscription>> {
        self.add_delay(self.latency.subscriptions).await;
        self.metrics.lock().await.subscription_calls += 1;
        self.check("subscriptions")?;
        Ok(self.read(|catalog| catalog.subscriptions.clone()))
    }

    async fn list_storage_accounts(
        &self,
        subscription: &Subscription,
    ) -> anyhow::Result<Vec<StorageAccount>> {
        self.add_delay(self.latency.storage_accounts).await;
        self.metrics.lock().await.storage_account_calls += 1;
        self.check(&format!("storage_accounts:{}", subscription.id))?;
        Ok(self.read(|catalog| {
            catalog
                .storage_accounts
                .iter()
                .filter(|account| account.subscription_id == subscription.id)
                .cloned()
                .collect()
        }))
    }

    async fn list_web_apps(&self, subscription: &Subscription) -> anyhow::Result<Vec<WebApp>> {
        self.add_delay(self.latency.web_apps).await;
        self.metrics.lock().await.web_app_calls += 1;
        self.check(&format!("web_apps:{}", subscription.id))?;
        Ok(self.read(|catalog| {
            catalog
                .web_apps
                .iter()
                .filter(|app| app.subscription_id == subscription.id)
                .cloned()
                .collect()
        }))
    }

    async fn list_slots(&self, app: &WebApp) -> anyhow::Result<Vec<DeploymentSlot>> {
        self.add_delay(self.latency.slots).await;
        self.metrics.lock().await.slot_calls += 1;
        self.check(&format!("slots:{}", app.name))?;
        Ok(self.read(|catalog| {
            catalog
                .slots
                .iter()
                .filter(|slot| slot.app == app.name)
                .cloned()
                .collect()
        }))
    }

    async fn list_files(&self, app: &WebApp, dir: &str) -> anyhow::Result<Vec<AppFile>> {
        self.add_delay(self.latency.files).await;
        self.metrics.lock().await.file_calls += 1;
        self.check(&format!("files:{}:{}", app.name, dir))?;
        Ok(self.read(|catalog| catalog.list_dir(app, dir)))
    }
}

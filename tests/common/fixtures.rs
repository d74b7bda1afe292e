//! Resource fixtures shared by integration tests

use explorer::services::cloud::{
    Catalog, CatalogFile, DeploymentSlot, OperatingSystem, ResourceStatus, StorageAccount,
    Subscription, WebApp,
};

pub fn subscription(id: &str, name: &str) -> Subscription {
    Subscription {
        id: id.to_string(),
        name: name.to_string(),
    }
}

pub fn storage_account(name: &str, subscription_id: &str) -> StorageAccount {
    StorageAccount {
        name: name.to_string(),
        resource_group: "rg-storage".to_string(),
        subscription_id: subscription_id.to_string(),
        kind: Some("StorageV2".to_string()),
    }
}

pub fn web_app(name: &str, subscription_id: &str, os: OperatingSystem) -> WebApp {
    WebApp {
        name: name.to_string(),
        resource_group: "rg-web".to_string(),
        subscription_id: subscription_id.to_string(),
        status: ResourceStatus::Running,
        os,
    }
}

pub fn slot(app: &str, name: &str) -> DeploymentSlot {
    DeploymentSlot {
        name: name.to_string(),
        app: app.to_string(),
        status: ResourceStatus::Stopped,
    }
}

pub fn file(app: &str, path: &str, size: Option<u64>) -> CatalogFile {
    CatalogFile {
        app: app.to_string(),
        path: path.to_string(),
        size,
    }
}

/// Two subscriptions with storage accounts and web apps in both
///
/// `shop` (Linux) has a staging slot, site content and logs; `api`
/// (Windows) only has site content.
pub fn catalog() -> Catalog {
    Catalog {
        subscriptions: vec![subscription("s1", "Dev"), subscription("s2", "Prod")],
        storage_accounts: vec![
            storage_account("devdata", "s1"),
            storage_account("proddata", "s2"),
            storage_account("prodlogs", "s2"),
        ],
        web_apps: vec![
            web_app("shop", "s2", OperatingSystem::Linux),
            web_app("api", "s1", OperatingSystem::Windows),
        ],
        slots: vec![slot("shop", "staging")],
        files: vec![
            file("shop", "/site/wwwroot/index.html", Some(512)),
            file("shop", "/site/wwwroot/static/app.js", Some(2048)),
            file("shop", "/LogFiles/eventlog.xml", Some(64)),
            file("api", "/site/wwwroot/web.config", Some(128)),
        ],
        ..Default::default()
    }
}

use crate::view::explorer_tree::IconModifier;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Something the explorer can show as a resource node
pub trait CloudResource: Send + Sync + 'static {
    fn name(&self) -> &str;

    /// Short type tag, also used as the icon file stem
    fn resource_type(&self) -> &'static str;

    fn status(&self) -> Option<ResourceStatus> {
        None
    }
}

/// Runtime status reported for a resource
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceStatus {
    Running,
    Stopped,
    Updating,
    Failed,
    #[default]
    Unknown,
}

impl ResourceStatus {
    pub fn icon_modifier(self) -> Option<IconModifier> {
        match self {
            ResourceStatus::Running => Some(IconModifier::Running),
            ResourceStatus::Stopped => Some(IconModifier::Stopped),
            ResourceStatus::Updating => Some(IconModifier::Updating),
            ResourceStatus::Failed => Some(IconModifier::Failed),
            ResourceStatus::Unknown => None,
        }
    }
}

impl fmt::Display for ResourceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ResourceStatus::Running => "Running",
            ResourceStatus::Stopped => "Stopped",
            ResourceStatus::Updating => "Updating",
            ResourceStatus::Failed => "Failed",
            ResourceStatus::Unknown => "Unknown",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperatingSystem {
    #[default]
    Windows,
    Linux,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Subscription {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StorageAccount {
    pub name: String,
    pub resource_group: String,
    pub subscription_id: String,
    #[serde(default)]
    pub kind: Option<String>,
}

impl StorageAccount {
    /// Identity used to match accounts across reloads
    pub fn id(&self) -> ResourceId {
        ResourceId::new(&self.subscription_id, &self.resource_group, &self.name)
    }
}

impl CloudResource for StorageAccount {
    fn name(&self) -> &str {
        &self.name
    }

    fn resource_type(&self) -> &'static str {
        "storage-account"
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WebApp {
    pub name: String,
    pub resource_group: String,
    pub subscription_id: String,
    #[serde(default)]
    pub status: ResourceStatus,
    #[serde(default)]
    pub os: OperatingSystem,
}

impl WebApp {
    pub fn id(&self) -> ResourceId {
        ResourceId::new(&self.subscription_id, &self.resource_group, &self.name)
    }
}

impl CloudResource for WebApp {
    fn name(&self) -> &str {
        &self.name
    }

    fn resource_type(&self) -> &'static str {
        "webapp"
    }

    fn status(&self) -> Option<ResourceStatus> {
        Some(self.status)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DeploymentSlot {
    pub name: String,
    /// Name of the app the slot belongs to
    pub app: String,
    #[serde(default)]
    pub status: ResourceStatus,
}

impl CloudResource for DeploymentSlot {
    fn name(&self) -> &str {
        &self.name
    }

    fn resource_type(&self) -> &'static str {
        "deployment-slot"
    }

    fn status(&self) -> Option<ResourceStatus> {
        Some(self.status)
    }
}

/// A file or directory in an app's file system
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AppFile {
    pub app: WebApp,
    /// Absolute path, without a trailing slash
    pub path: String,
    pub is_directory: bool,
    pub size: Option<u64>,
}

impl AppFile {
    /// A root directory of an app, such as `/site/wwwroot`
    pub fn root(app: &WebApp, path: &str) -> Self {
        Self {
            app: app.clone(),
            path: path.trim_end_matches('/').to_string(),
            is_directory: true,
            size: None,
        }
    }

    /// Last path component
    pub fn file_name(&self) -> &str {
        self.path.rsplit('/').next().unwrap_or(&self.path)
    }
}

impl CloudResource for AppFile {
    fn name(&self) -> &str {
        self.file_name()
    }

    fn resource_type(&self) -> &'static str {
        if self.is_directory {
            "folder"
        } else {
            "file"
        }
    }
}

/// `/subscriptions/{sub}/resourceGroups/{rg}/{name}`
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ResourceId(String);

impl ResourceId {
    pub fn new(subscription_id: &str, resource_group: &str, name: &str) -> Self {
        Self(format!(
            "/subscriptions/{subscription_id}/resourceGroups/{resource_group}/{name}"
        ))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Value of the "Storage Account" module root
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct StorageModule;

/// Value of the "Web Apps" module root
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct WebAppModule;

/// Value of the "Deployment Slots" node under an app
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SlotsGroup {
    pub app: WebApp,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_web_app_defaults_from_json() {
        let app: WebApp = serde_json::from_str(
            r#"{ "name": "shop", "resource_group": "rg", "subscription_id": "s1" }"#,
        )
        .unwrap();
        assert_eq!(app.status, ResourceStatus::Unknown);
        assert_eq!(app.os, OperatingSystem::Windows);
        assert_eq!(app.id().as_str(), "/subscriptions/s1/resourceGroups/rg/shop");
    }

    #[test]
    fn test_app_file_names() {
        let app = WebApp {
            name: "shop".to_string(),
            resource_group: "rg".to_string(),
            subscription_id: "s1".to_string(),
            status: ResourceStatus::Running,
            os: OperatingSystem::Linux,
        };
        let root = AppFile::root(&app, "/site/wwwroot/");
        assert_eq!(root.path, "/site/wwwroot");
        assert_eq!(root.name(), "wwwroot");
        assert_eq!(root.resource_type(), "folder");
    }

    #[test]
    fn test_status_modifiers() {
        assert_eq!(
            ResourceStatus::Running.icon_modifier(),
            Some(IconModifier::Running)
        );
        assert_eq!(ResourceStatus::Unknown.icon_modifier(), None);
        assert_eq!(ResourceStatus::Updating.to_string(), "Updating");
    }
}

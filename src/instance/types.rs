use std::{
    fmt::{self, Display},
    path::{Path, PathBuf},
};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::LoaderFamily;

pub const INSTANCE_FILE: &str = "instance.json";
pub const INSTALL_LOG: &str = "install.log";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InstanceStatus {
    #[default]
    Installing,
    Ready,
    Error,
    Stopped,
}

impl Display for InstanceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InstanceStatus::Installing => write!(f, "installing"),
            InstanceStatus::Ready => write!(f, "ready"),
            InstanceStatus::Error => write!(f, "error"),
            InstanceStatus::Stopped => write!(f, "stopped"),
        }
    }
}

/// Durable per-instance record stored as `instance.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstanceConfig {
    pub name: String,
    pub version: String,
    #[serde(default)]
    pub loader: LoaderFamily,
    #[serde(default)]
    pub loader_version: Option<String>,
    #[serde(default)]
    pub version_id: Option<String>,
    #[serde(default)]
    pub status: InstanceStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default)]
    pub playtime_secs: u64,
    #[serde(default)]
    pub last_played: Option<DateTime<Utc>>,
    pub created: DateTime<Utc>,
}

impl InstanceConfig {
    pub fn new<S: Into<String>, V: Into<String>>(name: S, version: V, loader: LoaderFamily) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
            loader,
            loader_version: None,
            version_id: None,
            status: InstanceStatus::Installing,
            error: None,
            playtime_secs: 0,
            last_played: None,
            created: Utc::now(),
        }
    }

    pub fn with_loader_version<S: Into<String>>(mut self, loader_version: S) -> Self {
        self.loader_version = Some(loader_version.into());
        self
    }
}

/// Kind of add-on content and the instance directory holding it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentKind {
    Mod,
    ResourcePack,
    ShaderPack,
}

impl ContentKind {
    pub const ALL: [ContentKind; 3] = [
        ContentKind::Mod,
        ContentKind::ResourcePack,
        ContentKind::ShaderPack,
    ];

    pub fn dir_name(&self) -> &'static str {
        match self {
            ContentKind::Mod => "mods",
            ContentKind::ResourcePack => "resourcepacks",
            ContentKind::ShaderPack => "shaderpacks",
        }
    }

    /// Registry loader filter for this kind of content under `loader`.
    ///
    /// `None` means the registry is queried without a loader filter.
    pub fn registry_loaders(&self, loader: LoaderFamily) -> Option<Vec<&'static str>> {
        match self {
            ContentKind::Mod => Some(loader.content_loaders()),
            ContentKind::ResourcePack => Some(vec!["minecraft"]),
            ContentKind::ShaderPack => None,
        }
    }
}

/// Filesystem layout of one instance.
#[derive(Debug, Clone)]
pub struct InstancePaths {
    root: PathBuf,
}

impl InstancePaths {
    pub fn new<P: Into<PathBuf>>(root: P) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn config_file(&self) -> PathBuf {
        self.root.join(INSTANCE_FILE)
    }

    pub fn install_log(&self) -> PathBuf {
        self.root.join(INSTALL_LOG)
    }

    pub fn versions_dir(&self) -> PathBuf {
        self.root.join("versions")
    }

    pub fn version_dir(&self, version_id: &str) -> PathBuf {
        self.versions_dir().join(version_id)
    }

    pub fn version_json(&self, version_id: &str) -> PathBuf {
        self.version_dir(version_id).join(format!("{version_id}.json"))
    }

    pub fn version_jar(&self, version_id: &str) -> PathBuf {
        self.version_dir(version_id).join(format!("{version_id}.jar"))
    }

    pub fn libraries_dir(&self) -> PathBuf {
        self.root.join("libraries")
    }

    pub fn content_dir(&self, kind: ContentKind) -> PathBuf {
        self.root.join(kind.dir_name())
    }

    pub fn launcher_profiles(&self) -> PathBuf {
        self.root.join("launcher_profiles.json")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn instance_json_uses_camel_case_keys() {
        let mut config = InstanceConfig::new("Test", "1.20.1", LoaderFamily::Fabric);
        config.version_id = Some("fabric-loader-0.15.7-1.20.1".into());

        let json = serde_json::to_value(&config).unwrap();
        assert_eq!(json["loader"], "fabric");
        assert_eq!(json["versionId"], "fabric-loader-0.15.7-1.20.1");
        assert_eq!(json["status"], "installing");
        assert!(json.get("error").is_none());
    }

    #[test]
    fn version_paths_nest_under_their_id() {
        let paths = InstancePaths::new("/tmp/inst");
        assert_eq!(
            paths.version_json("1.20.1"),
            PathBuf::from("/tmp/inst/versions/1.20.1/1.20.1.json")
        );
        assert_eq!(paths.content_dir(ContentKind::ShaderPack), PathBuf::from("/tmp/inst/shaderpacks"));
    }
}

use std::sync::LazyLock;

use regex::Regex;
use serde::Deserialize;

static MAVEN_COORDINATE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^([^:@\s]+):([^:@\s]+):([^:@\s]+)(?::([^:@\s]+))?(?:@([A-Za-z0-9]+))?$")
        .expect("static maven pattern is valid")
});

#[derive(Debug, Clone, Deserialize)]
pub struct VersionManifest {
    #[serde(default)]
    pub latest: Option<LatestVersions>,
    pub versions: Vec<ManifestEntry>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LatestVersions {
    pub release: String,
    pub snapshot: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ManifestEntry {
    pub id: String,
    #[serde(rename = "type", default)]
    pub kind: String,
    pub url: String,
    #[serde(default)]
    pub sha1: Option<String>,
}

impl VersionManifest {
    pub fn find(&self, id: &str) -> Option<&ManifestEntry> {
        self.versions.iter().find(|v| v.id == id)
    }
}

/// The subset of a version descriptor the installer reads. Descriptors are
/// always stored verbatim; this view is parsed on top of them.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VersionDescriptor {
    pub id: String,
    #[serde(default)]
    pub inherits_from: Option<String>,
    #[serde(default)]
    pub downloads: Option<VersionDownloads>,
    #[serde(default)]
    pub libraries: Vec<Library>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct VersionDownloads {
    #[serde(default)]
    pub client: Option<Artifact>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Artifact {
    #[serde(default)]
    pub path: Option<String>,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub sha1: Option<String>,
    #[serde(default)]
    pub size: Option<u64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Library {
    pub name: String,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub downloads: Option<LibraryDownloads>,
    #[serde(default)]
    pub rules: Vec<Rule>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LibraryDownloads {
    #[serde(default)]
    pub artifact: Option<Artifact>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Rule {
    pub action: RuleAction,
    #[serde(default)]
    pub os: Option<OsRule>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RuleAction {
    Allow,
    Disallow,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OsRule {
    #[serde(default)]
    pub name: Option<String>,
}

/// Where a library artifact lives on disk (relative to `libraries/`) and
/// where to fetch it from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LibraryArtifact {
    pub path: String,
    pub url: String,
}

/// Maven coordinate `group:artifact:version[:classifier][@extension]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MavenCoordinate {
    pub group: String,
    pub artifact: String,
    pub version: String,
    pub classifier: Option<String>,
    pub extension: String,
}

impl MavenCoordinate {
    pub fn parse(name: &str) -> Option<Self> {
        let caps = MAVEN_COORDINATE.captures(name.trim())?;
        Some(Self {
            group: caps[1].to_string(),
            artifact: caps[2].to_string(),
            version: caps[3].to_string(),
            classifier: caps.get(4).map(|m| m.as_str().to_string()),
            extension: caps
                .get(5)
                .map(|m| m.as_str().to_string())
                .unwrap_or_else(|| "jar".to_string()),
        })
    }

    pub fn path(&self) -> String {
        let file = match &self.classifier {
            Some(classifier) => format!(
                "{}-{}-{}.{}",
                self.artifact, self.version, classifier, self.extension
            ),
            None => format!("{}-{}.{}", self.artifact, self.version, self.extension),
        };

        format!(
            "{}/{}/{}/{}",
            self.group.replace('.', "/"),
            self.artifact,
            self.version,
            file
        )
    }
}

pub fn host_os_name() -> &'static str {
    match std::env::consts::OS {
        "macos" => "osx",
        other => other,
    }
}

impl Library {
    /// Evaluates the descriptor rules for `os_name`. Without rules a library
    /// always applies; otherwise the last matching rule decides.
    pub fn applies_to(&self, os_name: &str) -> bool {
        if self.rules.is_empty() {
            return true;
        }

        let mut allowed = false;
        for rule in &self.rules {
            let matches = match rule.os.as_ref().and_then(|os| os.name.as_deref()) {
                Some(name) => name == os_name,
                None => true,
            };
            if matches {
                allowed = rule.action == RuleAction::Allow;
            }
        }
        allowed
    }

    /// Resolves the library to an on-disk path and download URL.
    ///
    /// Returns `None` when neither an explicit artifact nor a parseable
    /// coordinate exists, or when the artifact has an empty URL (those are
    /// produced locally by loader installers).
    pub fn artifact(&self, default_repository: &str) -> Option<LibraryArtifact> {
        if let Some(artifact) = self.downloads.as_ref().and_then(|d| d.artifact.as_ref()) {
            if artifact.url.is_empty() {
                return None;
            }
            let path = match &artifact.path {
                Some(path) => path.clone(),
                None => MavenCoordinate::parse(&self.name)?.path(),
            };
            return Some(LibraryArtifact {
                path,
                url: artifact.url.clone(),
            });
        }

        if self.downloads.is_some() {
            // natives-only entries carry classifiers but no main artifact
            return None;
        }

        let path = MavenCoordinate::parse(&self.name)?.path();
        let repository = self
            .url
            .as_deref()
            .filter(|u| !u.is_empty())
            .unwrap_or(default_repository);
        Some(LibraryArtifact {
            url: format!("{}/{}", repository.trim_end_matches('/'), path),
            path,
        })
    }
}

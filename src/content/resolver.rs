use std::{path::PathBuf, sync::Arc};

use tracing::debug;

use crate::{
    config::LoaderFamily,
    error::ContentError,
    instance::ContentKind,
    manifests::modrinth::ModrinthVersion,
    registry::RegistryClient,
    utils,
};

use super::{ContentCache, ContentItem, ContentMeta};

/// Replacement download for a content item that has a compatible version
/// under the new configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationCandidate {
    pub kind: ContentKind,
    pub old_path: PathBuf,
    pub old_file: String,
    pub new_file: String,
    pub url: String,
    pub sha512: Option<String>,
    pub size: u64,
    pub meta: ContentMeta,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// The installed file already is the registry's pick for the target.
    Keep,
    Replace(MigrationCandidate),
    /// No compatible version, or the lookup failed. The reason is for the log.
    Incompatible(String),
}

/// Decides per content item whether it survives a migration.
#[derive(Debug, Clone)]
pub struct ModResolver {
    client: Arc<RegistryClient>,
    cache: Arc<ContentCache>,
}

impl ModResolver {
    pub fn new(client: Arc<RegistryClient>, cache: Arc<ContentCache>) -> Self {
        Self { client, cache }
    }

    /// Resolves `item` against (`loader`, `base_version`). Lookup failures
    /// collapse into [`Resolution::Incompatible`].
    pub async fn resolve(
        &self,
        item: &ContentItem,
        loader: LoaderFamily,
        base_version: &str,
    ) -> Resolution {
        match self.try_resolve(item, loader, base_version).await {
            Ok(resolution) => resolution,
            Err(err) => Resolution::Incompatible(err.to_string()),
        }
    }

    async fn try_resolve(
        &self,
        item: &ContentItem,
        loader: LoaderFamily,
        base_version: &str,
    ) -> Result<Resolution, ContentError> {
        let loaders = item.kind.registry_loaders(loader);
        if loaders.as_ref().is_some_and(Vec::is_empty) {
            return Ok(Resolution::Incompatible(format!(
                "{} cannot load {}",
                loader,
                item.kind.dir_name()
            )));
        }

        let hash = self
            .cache
            .strong_key(item)
            .await
            .map_err(|source| ContentError::Io {
                path: item.path.clone(),
                source,
            })?;

        let current = match self.cache.meta(&hash) {
            Some(meta) => meta,
            None => {
                let Some(version) = self.client.version_from_hash(&hash).await? else {
                    return Ok(Resolution::Incompatible("unknown to the registry".into()));
                };
                let meta = ContentMeta {
                    project_id: version.project_id,
                    version_id: version.id,
                    title: None,
                    icon_url: None,
                };
                self.cache.record(&hash, meta.clone());
                meta
            }
        };

        let versions = self
            .client
            .project_versions(&current.project_id, loaders.as_deref(), base_version)
            .await?;

        // registry order is newest first; the first entry is the pick
        let Some(target) = versions.into_iter().next() else {
            return Ok(Resolution::Incompatible(format!(
                "no version for {loader} on {base_version}"
            )));
        };

        if target.id == current.version_id || target.has_file_hash(&hash) {
            debug!(file = %item.file_name, version = %target.id, "content already compatible");
            return Ok(Resolution::Keep);
        }

        let candidate = self.candidate(item, &current, target).await?;
        Ok(Resolution::Replace(candidate))
    }

    async fn candidate(
        &self,
        item: &ContentItem,
        current: &ContentMeta,
        target: ModrinthVersion,
    ) -> Result<MigrationCandidate, ContentError> {
        let file = target
            .primary_file()
            .ok_or_else(|| ContentError::NoFiles(target.id.clone()))?;
        if !utils::is_file_name(&file.filename) {
            return Err(ContentError::UnsafeFileName(file.filename.clone()));
        }

        let mut meta = ContentMeta {
            project_id: target.project_id.clone(),
            version_id: target.id.clone(),
            title: current.title.clone(),
            icon_url: current.icon_url.clone(),
        };
        if meta.title.is_none() {
            // best effort; the title only makes the transcript readable
            if let Ok(project) = self.client.project(&target.project_id).await {
                meta.title = Some(project.title);
                meta.icon_url = project.icon_url;
            }
        }

        Ok(MigrationCandidate {
            kind: item.kind,
            old_path: item.path.clone(),
            old_file: item.file_name.clone(),
            new_file: file.filename.clone(),
            url: file.url.clone(),
            sha512: file.hashes.get("sha512").cloned(),
            size: file.size,
            meta,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use wiremock::{
        Mock, MockServer, ResponseTemplate,
        matchers::{method, path},
    };

    use super::*;
    use crate::registry::RegistryEndpoints;

    async fn setup(server: &MockServer, body: &[u8]) -> (tempfile::TempDir, ContentItem, String, ModResolver) {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("sodium-0.4.jar");
        std::fs::write(&file, body).unwrap();
        let hash = utils::sha512_file(&file).await.unwrap();

        let item = ContentItem {
            kind: ContentKind::Mod,
            file_name: "sodium-0.4.jar".into(),
            size: body.len() as u64,
            path: file,
        };
        let client = Arc::new(
            RegistryClient::new(RegistryEndpoints::mirrored(&server.uri()), Duration::from_secs(5))
                .unwrap(),
        );
        let resolver = ModResolver::new(client, Arc::new(ContentCache::in_memory()));
        (dir, item, hash, resolver)
    }

    async fn mount_hash(server: &MockServer, hash: &str, version_id: &str) {
        Mock::given(method("GET"))
            .and(path(format!("/modrinth/v2/version_file/{hash}")))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "id": version_id,
                "project_id": "AANobbMI",
                "files": []
            })))
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn compatible_version_becomes_a_candidate() {
        let server = MockServer::start().await;
        let (_dir, item, hash, resolver) = setup(&server, b"old sodium").await;
        mount_hash(&server, &hash, "old-version").await;
        Mock::given(method("GET"))
            .and(path("/modrinth/v2/project/AANobbMI/version"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([
                {
                    "id": "new-version",
                    "project_id": "AANobbMI",
                    "files": [{
                        "url": "https://cdn.example/sodium-0.5.jar",
                        "filename": "sodium-0.5.jar",
                        "primary": true,
                        "size": 10,
                        "hashes": { "sha512": "ffff" }
                    }]
                },
                { "id": "older-version", "project_id": "AANobbMI", "files": [] }
            ])))
            .mount(&server)
            .await;

        let candidate = match resolver.resolve(&item, LoaderFamily::Fabric, "1.20.4").await {
            Resolution::Replace(candidate) => candidate,
            other => panic!("expected replacement, got {other:?}"),
        };
        assert_eq!(candidate.old_file, "sodium-0.4.jar");
        assert_eq!(candidate.new_file, "sodium-0.5.jar");
        assert_eq!(candidate.meta.version_id, "new-version");
        assert_eq!(candidate.sha512.as_deref(), Some("ffff"));
    }

    #[tokio::test]
    async fn traversing_file_name_is_incompatible() {
        let server = MockServer::start().await;
        let (_dir, item, hash, resolver) = setup(&server, b"old sodium").await;
        mount_hash(&server, &hash, "old-version").await;
        Mock::given(method("GET"))
            .and(path("/modrinth/v2/project/AANobbMI/version"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([{
                "id": "new-version",
                "project_id": "AANobbMI",
                "files": [{
                    "url": "https://cdn.example/escaped.jar",
                    "filename": "../../../escaped.jar",
                    "primary": true
                }]
            }])))
            .mount(&server)
            .await;

        assert!(matches!(
            resolver.resolve(&item, LoaderFamily::Fabric, "1.20.4").await,
            Resolution::Incompatible(reason) if reason.contains("escaped.jar")
        ));
    }

    #[tokio::test]
    async fn same_version_is_kept() {
        let server = MockServer::start().await;
        let (_dir, item, hash, resolver) = setup(&server, b"current sodium").await;
        mount_hash(&server, &hash, "current").await;
        Mock::given(method("GET"))
            .and(path("/modrinth/v2/project/AANobbMI/version"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([
                { "id": "current", "project_id": "AANobbMI", "files": [] }
            ])))
            .mount(&server)
            .await;

        assert_eq!(
            resolver.resolve(&item, LoaderFamily::Fabric, "1.20.1").await,
            Resolution::Keep
        );
    }

    #[tokio::test]
    async fn unknown_hash_and_empty_listing_are_incompatible() {
        let server = MockServer::start().await;
        let (_dir, item, _hash, resolver) = setup(&server, b"mystery").await;

        assert!(matches!(
            resolver.resolve(&item, LoaderFamily::Fabric, "1.20.1").await,
            Resolution::Incompatible(_)
        ));
    }

    #[tokio::test]
    async fn mods_are_incompatible_with_vanilla_without_lookups() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(500))
            .expect(0)
            .mount(&server)
            .await;
        let (_dir, item, _hash, resolver) = setup(&server, b"any").await;

        assert!(matches!(
            resolver.resolve(&item, LoaderFamily::None, "1.20.1").await,
            Resolution::Incompatible(_)
        ));
    }
}

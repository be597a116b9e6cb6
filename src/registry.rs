use std::{path::Path, time::Duration};

use reqwest::Client;
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use tracing::debug;

use crate::{
    config::LoaderFamily,
    error::RegistryError,
    manifests::{
        loaders::{ForgePromotions, LoaderVersionEntry, NeoForgeVersions},
        modrinth::{ModrinthProject, ModrinthVersion},
        vanilla::VersionManifest,
    },
    utils,
};

/// Base URLs of every external service the installer talks to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RegistryEndpoints {
    pub version_manifest: String,
    pub libraries: String,
    pub fabric_meta: String,
    pub quilt_meta: String,
    pub forge_maven: String,
    pub forge_promotions: String,
    pub neoforge_maven: String,
    pub modrinth_api: String,
}

impl Default for RegistryEndpoints {
    fn default() -> Self {
        Self {
            version_manifest: "https://piston-meta.mojang.com/mc/game/version_manifest_v2.json"
                .into(),
            libraries: "https://libraries.minecraft.net".into(),
            fabric_meta: "https://meta.fabricmc.net/v2".into(),
            quilt_meta: "https://meta.quiltmc.org/v3".into(),
            forge_maven: "https://maven.minecraftforge.net".into(),
            forge_promotions:
                "https://files.minecraftforge.net/net/minecraftforge/forge/promotions_slim.json"
                    .into(),
            neoforge_maven: "https://maven.neoforged.net".into(),
            modrinth_api: "https://api.modrinth.com/v2".into(),
        }
    }
}

impl RegistryEndpoints {
    /// Points every endpoint at one base URL using the upstream path layout.
    /// Handy for mirrors and for mock servers.
    pub fn mirrored(base: &str) -> Self {
        let base = base.trim_end_matches('/');
        Self {
            version_manifest: format!("{base}/mc/game/version_manifest_v2.json"),
            libraries: format!("{base}/libraries"),
            fabric_meta: format!("{base}/fabric/v2"),
            quilt_meta: format!("{base}/quilt/v3"),
            forge_maven: format!("{base}/forge-maven"),
            forge_promotions: format!("{base}/forge/promotions_slim.json"),
            neoforge_maven: format!("{base}/neoforge-maven"),
            modrinth_api: format!("{base}/modrinth/v2"),
        }
    }

    fn loader_meta(&self, family: LoaderFamily) -> Option<&str> {
        match family {
            LoaderFamily::Fabric => Some(&self.fabric_meta),
            LoaderFamily::Quilt => Some(&self.quilt_meta),
            _ => None,
        }
    }

    pub fn forge_installer_url(&self, base_version: &str, loader_version: &str) -> String {
        let full = format!("{base_version}-{loader_version}");
        format!(
            "{}/net/minecraftforge/forge/{full}/forge-{full}-installer.jar",
            self.forge_maven.trim_end_matches('/')
        )
    }

    pub fn neoforge_installer_url(&self, loader_version: &str) -> String {
        format!(
            "{}/releases/net/neoforged/neoforge/{loader_version}/neoforge-{loader_version}-installer.jar",
            self.neoforge_maven.trim_end_matches('/')
        )
    }
}

/// Stateless request/response wrapper over the version, loader and content
/// registries.
#[derive(Debug, Clone)]
pub struct RegistryClient {
    http: Client,
    endpoints: RegistryEndpoints,
}

impl RegistryClient {
    pub fn new(endpoints: RegistryEndpoints, timeout: Duration) -> Result<Self, RegistryError> {
        let http = Client::builder()
            .user_agent(concat!("mineloom/", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .build()
            .map_err(RegistryError::Client)?;

        Ok(Self { http, endpoints })
    }

    pub fn endpoints(&self) -> &RegistryEndpoints {
        &self.endpoints
    }

    async fn get(&self, url: &str) -> Result<reqwest::Response, RegistryError> {
        debug!(%url, "GET");
        let resp = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|source| RegistryError::Http {
                url: url.to_string(),
                source,
            })?;

        let status = resp.status();
        if !status.is_success() {
            return Err(RegistryError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }
        Ok(resp)
    }

    pub async fn fetch_bytes(&self, url: &str) -> Result<Vec<u8>, RegistryError> {
        let resp = self.get(url).await?;
        let body = resp.bytes().await.map_err(|source| RegistryError::Http {
            url: url.to_string(),
            source,
        })?;
        Ok(body.to_vec())
    }

    pub async fn fetch_json<T: DeserializeOwned>(&self, url: &str) -> Result<T, RegistryError> {
        let body = self.fetch_bytes(url).await?;
        serde_json::from_slice(&body).map_err(|source| RegistryError::Decode {
            url: url.to_string(),
            source,
        })
    }

    /// Downloads `url` into `dest` through a scratch file and returns the
    /// number of bytes written.
    pub async fn download(&self, url: &str, dest: &Path) -> Result<u64, RegistryError> {
        let body = self.fetch_bytes(url).await?;
        utils::write_atomic(dest, &body)
            .await
            .map_err(|source| RegistryError::Write {
                path: dest.to_path_buf(),
                source,
            })?;
        Ok(body.len() as u64)
    }

    pub async fn version_manifest(&self) -> Result<VersionManifest, RegistryError> {
        self.fetch_json(&self.endpoints.version_manifest).await
    }

    /// Loader builds available for `base_version`, in registry order (newest
    /// first on both Fabric and Quilt meta).
    pub async fn loader_versions(
        &self,
        family: LoaderFamily,
        base_version: &str,
    ) -> Result<Vec<String>, RegistryError> {
        let Some(meta) = self.endpoints.loader_meta(family) else {
            return Ok(Vec::new());
        };
        let url = format!("{}/versions/loader/{base_version}", meta.trim_end_matches('/'));
        let entries: Vec<LoaderVersionEntry> = self.fetch_json(&url).await?;
        Ok(entries.into_iter().map(|e| e.loader.version).collect())
    }

    /// Raw launcher profile for a metadata-driven loader build.
    pub async fn loader_profile(
        &self,
        family: LoaderFamily,
        base_version: &str,
        loader_version: &str,
    ) -> Result<Vec<u8>, RegistryError> {
        let meta = self.endpoints.loader_meta(family).unwrap_or_default();
        let url = format!(
            "{}/versions/loader/{base_version}/{loader_version}/profile/json",
            meta.trim_end_matches('/')
        );
        self.fetch_bytes(&url).await
    }

    pub async fn forge_promotions(&self) -> Result<ForgePromotions, RegistryError> {
        self.fetch_json(&self.endpoints.forge_promotions).await
    }

    pub async fn neoforge_versions(&self) -> Result<NeoForgeVersions, RegistryError> {
        let url = format!(
            "{}/api/maven/versions/releases/net/neoforged/neoforge",
            self.endpoints.neoforge_maven.trim_end_matches('/')
        );
        self.fetch_json(&url).await
    }

    fn modrinth(&self, path: &str) -> String {
        format!("{}/{path}", self.endpoints.modrinth_api.trim_end_matches('/'))
    }

    /// Looks up the version that published a file with this SHA-512.
    /// Unknown hashes yield `Ok(None)`.
    pub async fn version_from_hash(
        &self,
        sha512: &str,
    ) -> Result<Option<ModrinthVersion>, RegistryError> {
        let url = self.modrinth(&format!("version_file/{sha512}?algorithm=sha512"));
        match self.fetch_json(&url).await {
            Ok(version) => Ok(Some(version)),
            Err(err) if err.is_not_found() => Ok(None),
            Err(err) => Err(err),
        }
    }

    /// Versions of `project` matching the loader filter and game version, in
    /// registry order (newest first).
    pub async fn project_versions(
        &self,
        project: &str,
        loaders: Option<&[&str]>,
        game_version: &str,
    ) -> Result<Vec<ModrinthVersion>, RegistryError> {
        let base = self.modrinth(&format!("project/{project}/version"));
        let mut query = vec![(
            "game_versions",
            serde_json::json!([game_version]).to_string(),
        )];
        if let Some(loaders) = loaders {
            query.push(("loaders", serde_json::json!(loaders).to_string()));
        }

        let url = reqwest::Url::parse_with_params(&base, &query)
            .map(|u| u.to_string())
            .unwrap_or(base);
        self.fetch_json(&url).await
    }

    pub async fn project(&self, project: &str) -> Result<ModrinthProject, RegistryError> {
        self.fetch_json(&self.modrinth(&format!("project/{project}")))
            .await
    }
}

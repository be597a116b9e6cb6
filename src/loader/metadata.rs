use std::sync::Arc;

use async_trait::async_trait;

use crate::{
    config::LoaderFamily,
    error::LoaderError,
    progress::Phase,
    registry::RegistryClient,
    utils,
};

use super::{InstallContext, LoaderInstall, LoaderInstaller};

/// Fabric and Quilt: the meta service hands out a finished launcher profile,
/// so installing is fetching it and writing it under the composite id.
#[derive(Debug, Clone)]
pub struct MetadataLoader {
    family: LoaderFamily,
    client: Arc<RegistryClient>,
}

impl MetadataLoader {
    pub fn new(family: LoaderFamily, client: Arc<RegistryClient>) -> Self {
        Self { family, client }
    }

    pub fn version_id(&self, base_version: &str, loader_version: &str) -> String {
        format!("{}-loader-{}-{}", self.family, loader_version, base_version)
    }
}

#[async_trait]
impl LoaderInstaller for MetadataLoader {
    fn family(&self) -> LoaderFamily {
        self.family
    }

    async fn install(
        &self,
        ctx: &InstallContext<'_>,
        base_version: &str,
        requested: Option<&str>,
    ) -> Result<LoaderInstall, LoaderError> {
        let loader_version = match requested {
            Some(version) => version.to_string(),
            None => self
                .client
                .loader_versions(self.family, base_version)
                .await?
                .into_iter()
                .next()
                .ok_or_else(|| LoaderError::NoLoaderVersions {
                    family: self.family,
                    base_version: base_version.to_string(),
                })?,
        };

        if ctx.task.is_aborted() {
            return Err(LoaderError::Aborted);
        }

        ctx.reporter
            .log(format!("Installing {} loader {}", self.family, loader_version))
            .await;
        ctx.reporter
            .progress(Phase::LoaderInstall, 0.3, "Fetching loader profile");

        let profile = self
            .client
            .loader_profile(self.family, base_version, &loader_version)
            .await?;

        if serde_json::from_slice::<serde_json::Value>(&profile).is_err() {
            return Err(LoaderError::InvalidDescriptor(format!(
                "{} profile for {} is not JSON",
                self.family, loader_version
            )));
        }

        let version_id = self.version_id(base_version, &loader_version);
        if !utils::is_file_name(&version_id) {
            return Err(LoaderError::InvalidDescriptor(format!(
                "version id {version_id:?} is not a plain name"
            )));
        }
        utils::write_atomic(&ctx.paths.version_json(&version_id), &profile).await?;

        ctx.reporter
            .progress(Phase::LoaderInstall, 1.0, "Loader profile written");

        Ok(LoaderInstall {
            loader_version,
            version_id,
        })
    }
}

use std::sync::Arc;

use async_trait::async_trait;

use crate::{
    config::{LoaderFamily, Settings},
    error::LoaderError,
    instance::InstancePaths,
    progress::ProgressReporter,
    registry::RegistryClient,
    task::InstallTask,
};

#[cfg(feature = "installer-loaders")]
mod installer;
mod metadata;

#[cfg(feature = "installer-loaders")]
pub use installer::InstallerLoader;
pub use metadata::MetadataLoader;

/// What a loader installer works against: the instance layout, the task it
/// runs under (for cancellation and process attachment) and the transcript.
#[derive(Debug, Clone, Copy)]
pub struct InstallContext<'a> {
    pub paths: &'a InstancePaths,
    pub task: &'a Arc<InstallTask>,
    pub reporter: &'a Arc<ProgressReporter>,
}

/// Result of a successful loader installation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoaderInstall {
    pub loader_version: String,
    pub version_id: String,
}

/// One implementation per loader family.
#[async_trait]
pub trait LoaderInstaller: Send + Sync {
    fn family(&self) -> LoaderFamily;

    /// Installs the loader into `ctx.paths` for `base_version`, using
    /// `requested` when given and the registry's preferred build otherwise.
    async fn install(
        &self,
        ctx: &InstallContext<'_>,
        base_version: &str,
        requested: Option<&str>,
    ) -> Result<LoaderInstall, LoaderError>;
}

/// Picks the installer for `family`. Vanilla has none.
pub fn installer_for(
    family: LoaderFamily,
    client: Arc<RegistryClient>,
    settings: &Settings,
) -> Result<Option<Box<dyn LoaderInstaller>>, LoaderError> {
    match family {
        LoaderFamily::None => Ok(None),
        LoaderFamily::Fabric | LoaderFamily::Quilt => {
            Ok(Some(Box::new(MetadataLoader::new(family, client))))
        }
        #[cfg(feature = "installer-loaders")]
        LoaderFamily::Forge | LoaderFamily::NeoForge => Ok(Some(Box::new(InstallerLoader::new(
            family,
            client,
            settings.java_path.clone(),
        )))),
        #[cfg(not(feature = "installer-loaders"))]
        LoaderFamily::Forge | LoaderFamily::NeoForge => {
            let _ = settings;
            Err(LoaderError::Unsupported(family))
        }
    }
}

use std::{
    io::{Read, Seek},
    path::{Path, PathBuf},
    sync::Arc,
};

use async_trait::async_trait;
use serde_json::Value;
use tokio::process::Command;
use tracing::debug;
use uuid::Uuid;
use zip::{ZipArchive, result::ZipError};

use crate::{
    config::{LoaderFamily, MinecraftVersion},
    error::LoaderError,
    progress::Phase,
    registry::RegistryClient,
    task::{ProcessExit, run_supervised},
    utils,
};

use super::{InstallContext, LoaderInstall, LoaderInstaller};

/// Descriptor entries inside an installer jar, in order of preference.
const DESCRIPTOR_ENTRIES: [&str; 2] = ["version.json", "install_profile.json"];

const LAUNCHER_PROFILES_STUB: &[u8] = b"{\n  \"profiles\": {}\n}\n";

/// Forge and NeoForge: download the official installer jar, run it headless
/// against the instance directory, then harvest the version descriptor it
/// carries.
#[derive(Debug, Clone)]
pub struct InstallerLoader {
    family: LoaderFamily,
    client: Arc<RegistryClient>,
    java: PathBuf,
}

impl InstallerLoader {
    pub fn new(family: LoaderFamily, client: Arc<RegistryClient>, java: PathBuf) -> Self {
        Self {
            family,
            client,
            java,
        }
    }

    async fn resolve_version(
        &self,
        base_version: &str,
        requested: Option<&str>,
    ) -> Result<String, LoaderError> {
        if let Some(version) = requested {
            return Ok(version.to_string());
        }

        let none_available = || LoaderError::NoLoaderVersions {
            family: self.family,
            base_version: base_version.to_string(),
        };

        match self.family {
            LoaderFamily::Forge => {
                let promotions = self.client.forge_promotions().await?;
                promotions
                    .pick(base_version)
                    .map(str::to_string)
                    .ok_or_else(none_available)
            }
            LoaderFamily::NeoForge => {
                let prefix = base_version
                    .parse::<MinecraftVersion>()
                    .ok()
                    .and_then(|v| v.neoforge_prefix())
                    .ok_or_else(none_available)?;
                let versions = self.client.neoforge_versions().await?;
                versions
                    .newest_with_prefix(&prefix)
                    .map(str::to_string)
                    .ok_or_else(none_available)
            }
            other => Err(LoaderError::Unsupported(other)),
        }
    }

    fn installer_url(&self, base_version: &str, loader_version: &str) -> String {
        let endpoints = self.client.endpoints();
        match self.family {
            LoaderFamily::NeoForge => endpoints.neoforge_installer_url(loader_version),
            _ => endpoints.forge_installer_url(base_version, loader_version),
        }
    }

    async fn run_installer(
        &self,
        ctx: &InstallContext<'_>,
        scratch: &Path,
        base_version: &str,
        loader_version: &str,
    ) -> Result<String, LoaderError> {
        let url = self.installer_url(base_version, loader_version);
        ctx.reporter
            .log(format!("Downloading {} installer {}", self.family, url))
            .await;
        self.client.download(&url, scratch).await?;
        ctx.reporter
            .progress(Phase::LoaderInstall, 0.25, "Installer downloaded");

        if ctx.task.is_aborted() {
            return Err(LoaderError::Aborted);
        }

        // some installer builds refuse to run without a launcher profile file
        let profiles = ctx.paths.launcher_profiles();
        if !profiles.exists() {
            utils::write_atomic(&profiles, LAUNCHER_PROFILES_STUB).await?;
        }

        let mut command = Command::new(&self.java);
        command
            .arg("-jar")
            .arg(scratch)
            .arg("--installClient")
            .arg(ctx.paths.root())
            .current_dir(ctx.paths.root());

        ctx.reporter
            .log(format!("Running {} installer", self.family))
            .await;
        let exit = run_supervised(command, ctx.task, ctx.reporter)
            .await
            .map_err(LoaderError::Spawn)?;

        if ctx.task.is_aborted() || exit == ProcessExit::Killed {
            return Err(LoaderError::Aborted);
        }
        if let ProcessExit::Exited(code) = exit
            && !exit.success()
        {
            return Err(LoaderError::InstallerExit { code });
        }
        ctx.reporter
            .progress(Phase::LoaderInstall, 0.8, "Installer finished");

        let archive = scratch.to_path_buf();
        let descriptor = tokio::task::spawn_blocking(move || read_descriptor(&archive))
            .await
            .map_err(|err| LoaderError::Io(std::io::Error::other(err)))??;

        let version_id = descriptor_id(&descriptor)?;

        let bytes = serde_json::to_vec_pretty(&descriptor)
            .map_err(|err| LoaderError::InvalidDescriptor(err.to_string()))?;
        utils::write_atomic(&ctx.paths.version_json(&version_id), &bytes).await?;

        Ok(version_id)
    }
}

#[async_trait]
impl LoaderInstaller for InstallerLoader {
    fn family(&self) -> LoaderFamily {
        self.family
    }

    async fn install(
        &self,
        ctx: &InstallContext<'_>,
        base_version: &str,
        requested: Option<&str>,
    ) -> Result<LoaderInstall, LoaderError> {
        let loader_version = self.resolve_version(base_version, requested).await?;
        if ctx.task.is_aborted() {
            return Err(LoaderError::Aborted);
        }

        let scratch = ctx.paths.root().join(format!(
            ".{}-installer-{}.jar",
            self.family,
            Uuid::new_v4().simple()
        ));

        let result = self
            .run_installer(ctx, &scratch, base_version, &loader_version)
            .await;

        if let Err(err) = utils::remove_if_exists(&scratch).await {
            debug!(path = %scratch.display(), %err, "failed to remove installer scratch file");
        }

        let version_id = result?;
        Ok(LoaderInstall {
            loader_version,
            version_id,
        })
    }
}

fn read_entry<R: Read + Seek>(
    archive: &mut ZipArchive<R>,
    name: &str,
) -> Result<Option<Vec<u8>>, LoaderError> {
    let mut entry = match archive.by_name(name) {
        Ok(entry) => entry,
        Err(ZipError::FileNotFound) => return Ok(None),
        Err(err) => return Err(err.into()),
    };

    let mut buf = Vec::new();
    entry.read_to_end(&mut buf)?;
    Ok(Some(buf))
}

/// The descriptor's `id`, which names a directory under `versions/`.
fn descriptor_id(descriptor: &Value) -> Result<String, LoaderError> {
    let id = descriptor
        .get("id")
        .and_then(Value::as_str)
        .ok_or_else(|| LoaderError::InvalidDescriptor("descriptor has no id".into()))?;
    if !utils::is_file_name(id) {
        return Err(LoaderError::InvalidDescriptor(format!(
            "id {id:?} is not a plain name"
        )));
    }
    Ok(id.to_string())
}

/// Extracts the version descriptor embedded in an installer jar.
///
/// Legacy installers only ship `install_profile.json` with the descriptor
/// nested under `versionInfo`.
pub(crate) fn read_descriptor(path: &Path) -> Result<Value, LoaderError> {
    let file = std::fs::File::open(path)?;
    let mut archive = ZipArchive::new(std::io::BufReader::new(file))?;

    for name in DESCRIPTOR_ENTRIES {
        let Some(bytes) = read_entry(&mut archive, name)? else {
            continue;
        };

        let mut value: Value = serde_json::from_slice(&bytes)
            .map_err(|err| LoaderError::InvalidDescriptor(format!("{name}: {err}")))?;

        if let Some(nested) = value.get_mut("versionInfo").map(Value::take) {
            value = nested;
        }
        if value.get("id").is_some() {
            return Ok(value);
        }
    }

    Err(LoaderError::MissingDescriptor)
}

use std::{collections::HashSet, io};

use tokio::fs;
use tracing::debug;

use crate::{
    content::{self, MigrationCandidate, ModResolver, Resolution},
    error::InstallError,
    instance::{ContentKind, InstanceConfig},
    loader::{self, InstallContext},
    manifests::vanilla::{LibraryArtifact, VersionDescriptor, host_os_name},
    progress::Phase,
    utils,
};

use super::Pipeline;

impl Pipeline {
    /// Resolves every installed content item against the new target. Items
    /// with a replacement or no compatible version are deleted now; the
    /// replacements are returned for the migrated content phase.
    pub(super) async fn analyze_migration(&self) -> Result<Vec<MigrationCandidate>, InstallError> {
        self.reporter
            .begin(Phase::MigrationAnalysis, "Analyzing installed content");

        let mut items = Vec::new();
        for kind in ContentKind::ALL {
            match content::scan(&self.paths, kind).await {
                Ok(found) => items.extend(found),
                Err(err) => {
                    self.reporter
                        .warn(format!("Could not list {}: {err}", kind.dir_name()))
                        .await;
                }
            }
        }

        let resolver = ModResolver::new(self.client.clone(), self.cache.clone());
        let total = items.len();
        let mut candidates = Vec::new();
        let (mut kept, mut removed) = (0usize, 0usize);

        for (index, item) in items.iter().enumerate() {
            self.task.checkpoint()?;

            let resolution = resolver
                .resolve(item, self.config.loader, &self.config.version)
                .await;
            // nothing is deleted once the task is aborted
            self.task.checkpoint()?;

            match resolution {
                Resolution::Keep => {
                    kept += 1;
                    self.reporter
                        .log(format!("Keeping {} (already compatible)", item.file_name))
                        .await;
                }
                Resolution::Replace(candidate) => {
                    self.remove_content(&candidate.old_path, &candidate.old_file)
                        .await;
                    self.reporter
                        .log(format!(
                            "Replacing {} with {}",
                            candidate.old_file, candidate.new_file
                        ))
                        .await;
                    candidates.push(candidate);
                }
                Resolution::Incompatible(reason) => {
                    removed += 1;
                    self.remove_content(&item.path, &item.file_name).await;
                    self.reporter
                        .log(format!("Removing {}: {reason}", item.file_name))
                        .await;
                }
            }

            self.reporter.progress(
                Phase::MigrationAnalysis,
                (index + 1) as f64 / total as f64,
                &format!("Analyzed {}/{total} content files", index + 1),
            );
        }

        self.reporter
            .log(format!(
                "Migration analysis: {} to replace, {kept} kept, {removed} removed",
                candidates.len()
            ))
            .await;
        Ok(candidates)
    }

    async fn remove_content(&self, path: &std::path::Path, file_name: &str) {
        if let Err(err) = utils::remove_if_exists(path).await {
            self.reporter
                .warn(format!("Could not remove {file_name}: {err}"))
                .await;
        }
    }

    pub(super) async fn clean_versions(&self) {
        let dir = self.paths.versions_dir();
        match fs::remove_dir_all(&dir).await {
            Ok(()) => self.reporter.log("Removed previous version files").await,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {}
            Err(err) => {
                self.reporter
                    .warn(format!("Could not clean {}: {err}", dir.display()))
                    .await;
            }
        }
    }

    /// Fetches the base version descriptor and client jar. Both files already
    /// on disk means nothing is requested at all.
    pub(super) async fn download_base(&self) -> Result<(), InstallError> {
        let version = &self.config.version;
        self.reporter.begin(
            Phase::BaseDownload,
            &format!("Downloading Minecraft {version}"),
        );

        let json = self.paths.version_json(version);
        let jar = self.paths.version_jar(version);
        if json.is_file() && jar.is_file() {
            self.reporter
                .log(format!("Minecraft {version} already present"))
                .await;
            self.reporter
                .progress(Phase::BaseDownload, 1.0, "Base version present");
            return Ok(());
        }

        let manifest = match self.client.version_manifest().await {
            Ok(manifest) => manifest,
            Err(err) => {
                self.reporter
                    .warn(format!("Version manifest unavailable: {err}"))
                    .await;
                return Ok(());
            }
        };
        let entry = manifest
            .find(version)
            .ok_or_else(|| InstallError::BaseVersionNotFound(version.clone()))?;

        if !json.is_file() {
            if let Err(err) = self.client.download(&entry.url, &json).await {
                self.reporter
                    .warn(format!("Version descriptor download failed: {err}"))
                    .await;
                return Ok(());
            }
        }
        self.reporter
            .progress(Phase::BaseDownload, 0.3, "Version descriptor ready");
        self.task.checkpoint()?;

        let descriptor = match read_descriptor(&json).await {
            Ok(descriptor) => descriptor,
            Err(err) => {
                self.reporter
                    .warn(format!("Version descriptor unreadable: {err}"))
                    .await;
                return Ok(());
            }
        };

        let client_jar = descriptor.downloads.and_then(|d| d.client);
        match client_jar {
            Some(artifact) if !jar.is_file() => {
                match self.client.download(&artifact.url, &jar).await {
                    Ok(bytes) => {
                        self.reporter
                            .log(format!("Downloaded client jar ({bytes} bytes)"))
                            .await;
                    }
                    Err(err) => {
                        self.reporter
                            .warn(format!("Client jar download failed: {err}"))
                            .await;
                    }
                }
            }
            Some(_) => {}
            None => {
                self.reporter
                    .warn(format!("Descriptor for {version} lists no client jar"))
                    .await;
            }
        }

        self.reporter
            .progress(Phase::BaseDownload, 1.0, "Base version downloaded");
        Ok(())
    }

    /// Installs the configured loader and persists `loaderVersion` and
    /// `versionId` as soon as they are known. Returns the version id that
    /// library sync reads.
    pub(super) async fn install_loader(&self) -> Result<String, InstallError> {
        let family = self.config.loader;
        self.reporter
            .begin(Phase::LoaderInstall, &format!("Installing {family}"));

        let Some(installer) = loader::installer_for(family, self.client.clone(), &self.settings)?
        else {
            let version_id = self.config.version.clone();
            let id = version_id.clone();
            self.persist_loader(move |cfg| {
                cfg.loader_version = None;
                cfg.version_id = Some(id);
            })
            .await?;
            self.reporter
                .progress(Phase::LoaderInstall, 1.0, "No loader to install");
            return Ok(version_id);
        };

        let ctx = InstallContext {
            paths: &self.paths,
            task: &self.task,
            reporter: &self.reporter,
        };
        let installed = installer
            .install(
                &ctx,
                &self.config.version,
                self.config.loader_version.as_deref(),
            )
            .await?;
        self.task.checkpoint()?;

        let (loader_version, version_id) =
            (installed.loader_version.clone(), installed.version_id.clone());
        self.persist_loader(move |cfg| {
            cfg.loader_version = Some(loader_version);
            cfg.version_id = Some(version_id);
        })
        .await?;

        self.reporter
            .log(format!(
                "Installed {family} {} as {}",
                installed.loader_version, installed.version_id
            ))
            .await;
        self.reporter
            .progress(Phase::LoaderInstall, 1.0, "Loader installed");
        Ok(installed.version_id)
    }

    /// Writes loader fields to the record unless the task was aborted, in which
    /// case the record belongs to whoever aborted it.
    async fn persist_loader<F>(&self, mutate: F) -> Result<(), InstallError>
    where
        F: FnOnce(&mut InstanceConfig),
    {
        let task = self.task.clone();
        let written = self
            .store
            .update_if(&self.name, move |cfg| {
                if task.is_aborted() {
                    return false;
                }
                mutate(cfg);
                true
            })
            .await?;
        written.map(drop).ok_or(InstallError::Aborted)
    }

    /// Downloads every library the resolved descriptor chain needs on this
    /// host. Files already present are skipped.
    pub(super) async fn sync_libraries(&self, version_id: &str) -> Result<(), InstallError> {
        self.reporter.begin(Phase::LibrarySync, "Syncing libraries");

        let mut libraries = Vec::new();
        let mut seen = HashSet::new();
        let mut next = Some(version_id.to_string());
        while let Some(id) = next.take() {
            if !seen.insert(id.clone()) {
                break;
            }
            if !utils::is_file_name(&id) {
                self.reporter
                    .warn(format!("Ignoring descriptor reference {id:?}"))
                    .await;
                break;
            }
            match read_descriptor(&self.paths.version_json(&id)).await {
                Ok(descriptor) => {
                    libraries.extend(descriptor.libraries);
                    next = descriptor.inherits_from;
                }
                Err(err) => {
                    self.reporter
                        .warn(format!("Descriptor {id} unreadable: {err}"))
                        .await;
                }
            }
        }

        let os = host_os_name();
        let default_repo = &self.client.endpoints().libraries;
        let mut paths = HashSet::new();
        let artifacts: Vec<LibraryArtifact> = libraries
            .iter()
            .filter(|lib| lib.applies_to(os))
            .filter_map(|lib| lib.artifact(default_repo))
            .filter(|artifact| utils::is_nested_path(&artifact.path))
            .filter(|artifact| paths.insert(artifact.path.clone()))
            .collect();

        let total = artifacts.len();
        let (mut downloaded, mut present, mut failed) = (0usize, 0usize, 0usize);
        for (index, artifact) in artifacts.iter().enumerate() {
            self.task.checkpoint()?;

            let dest = self.paths.libraries_dir().join(&artifact.path);
            if dest.is_file() {
                present += 1;
            } else {
                match self.client.download(&artifact.url, &dest).await {
                    Ok(_) => downloaded += 1,
                    Err(err) => {
                        failed += 1;
                        self.reporter
                            .warn(format!("Library {} failed: {err}", artifact.path))
                            .await;
                    }
                }
            }

            self.reporter.progress(
                Phase::LibrarySync,
                (index + 1) as f64 / total as f64,
                &format!("Libraries {}/{total}", index + 1),
            );
        }

        self.reporter
            .log(format!(
                "Libraries: {downloaded} downloaded, {present} present, {failed} failed"
            ))
            .await;
        Ok(())
    }

    /// Downloads the replacements chosen during migration analysis.
    pub(super) async fn install_migrated(
        &self,
        candidates: &[MigrationCandidate],
    ) -> Result<(), InstallError> {
        if candidates.is_empty() {
            return Ok(());
        }
        self.reporter
            .begin(Phase::MigratedContent, "Installing migrated content");

        let total = candidates.len();
        let mut installed = 0usize;
        for (index, candidate) in candidates.iter().enumerate() {
            self.task.checkpoint()?;

            let dest = self
                .paths
                .content_dir(candidate.kind)
                .join(&candidate.new_file);
            if !utils::is_file_name(&candidate.new_file) {
                self.reporter
                    .warn(format!(
                        "Skipping {}: unsafe file name {:?}",
                        candidate.old_file, candidate.new_file
                    ))
                    .await;
            } else if dest.is_file() {
                debug!(file = %candidate.new_file, "replacement already present");
                installed += 1;
            } else {
                match self.client.download(&candidate.url, &dest).await {
                    // the registry reports 0 when it does not know the size
                    Ok(size) if candidate.size != 0 && size != candidate.size => {
                        self.remove_content(&dest, &candidate.new_file).await;
                        self.reporter
                            .warn(format!(
                                "Discarded {}: got {size} bytes, expected {}",
                                candidate.new_file, candidate.size
                            ))
                            .await;
                    }
                    Ok(size) => {
                        installed += 1;
                        self.cache.record_download(
                            &candidate.new_file,
                            size,
                            candidate.sha512.as_deref(),
                            candidate.meta.clone(),
                        );
                        let title = candidate
                            .meta
                            .title
                            .as_deref()
                            .unwrap_or(&candidate.new_file);
                        self.reporter
                            .log(format!("Migrated {} to {title}", candidate.old_file))
                            .await;
                    }
                    Err(err) => {
                        self.reporter
                            .warn(format!("Could not download {}: {err}", candidate.new_file))
                            .await;
                    }
                }
            }

            self.reporter.progress(
                Phase::MigratedContent,
                (index + 1) as f64 / total as f64,
                &format!("Migrated {}/{total}", index + 1),
            );
        }

        self.reporter
            .log(format!("Migrated content: {installed}/{total} installed"))
            .await;
        Ok(())
    }
}

async fn read_descriptor(path: &std::path::Path) -> io::Result<VersionDescriptor> {
    let data = fs::read(path).await?;
    serde_json::from_slice(&data).map_err(io::Error::other)
}

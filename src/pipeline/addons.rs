use crate::{
    content::ContentMeta,
    error::{ContentError, InstallError},
    instance::ContentKind,
    progress::Phase,
    utils,
};

use super::Pipeline;

/// Performance add-ons installed when optimization is enabled, in order.
pub const OPTIMIZATION_MODS: [&str; 5] = [
    "sodium",
    "lithium",
    "ferritecore",
    "entityculling",
    "immediatelyfast",
];

/// Projects tried, in order, when `project` has no build for the target.
pub fn optimization_fallbacks(project: &str) -> &'static [&'static str] {
    match project {
        "sodium" => &["embeddium", "rubidium"],
        _ => &[],
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Added {
    Installed(String),
    Present(String),
}

impl Pipeline {
    /// Downloads the newest build of `project` for the target into `mods/`.
    async fn add_project(&self, project: &str) -> Result<Added, ContentError> {
        let unavailable = || ContentError::Unavailable {
            project: project.to_string(),
            loader: self.config.loader,
            base_version: self.config.version.clone(),
        };

        let loaders = ContentKind::Mod.registry_loaders(self.config.loader);
        if loaders.as_ref().is_some_and(Vec::is_empty) {
            return Err(unavailable());
        }

        let versions = self
            .client
            .project_versions(project, loaders.as_deref(), &self.config.version)
            .await?;
        let version = versions.into_iter().next().ok_or_else(unavailable)?;
        let file = version
            .primary_file()
            .ok_or_else(|| ContentError::NoFiles(version.id.clone()))?;
        if !utils::is_file_name(&file.filename) {
            return Err(ContentError::UnsafeFileName(file.filename.clone()));
        }

        let dest = self
            .paths
            .content_dir(ContentKind::Mod)
            .join(&file.filename);
        if dest.is_file() {
            return Ok(Added::Present(file.filename.clone()));
        }

        let size = self.client.download(&file.url, &dest).await?;
        self.cache.record_download(
            &file.filename,
            size,
            file.hashes.get("sha512").map(String::as_str),
            ContentMeta {
                project_id: version.project_id.clone(),
                version_id: version.id.clone(),
                title: None,
                icon_url: None,
            },
        );
        Ok(Added::Installed(file.filename.clone()))
    }

    /// Tries `project` and then its fallbacks until one resolves.
    async fn add_with_fallbacks(
        &self,
        project: &str,
        fallbacks: &[&str],
    ) -> Result<Option<Added>, InstallError> {
        for candidate in std::iter::once(project).chain(fallbacks.iter().copied()) {
            self.task.checkpoint()?;
            match self.add_project(candidate).await {
                Ok(added) => return Ok(Some(added)),
                Err(err) => {
                    self.reporter
                        .log(format!("{candidate} unavailable: {err}"))
                        .await;
                }
            }
        }
        Ok(None)
    }

    pub(super) async fn install_optimizations(&self) -> Result<(), InstallError> {
        if !self.settings.optimize {
            return Ok(());
        }
        self.reporter
            .begin(Phase::Optimization, "Installing optimization mods");

        let total = OPTIMIZATION_MODS.len();
        for (index, project) in OPTIMIZATION_MODS.iter().enumerate() {
            match self
                .add_with_fallbacks(project, optimization_fallbacks(project))
                .await?
            {
                Some(Added::Installed(file)) => {
                    self.reporter.log(format!("Installed {file}")).await;
                }
                Some(Added::Present(file)) => {
                    self.reporter.log(format!("{file} already installed")).await;
                }
                None => {
                    self.reporter
                        .log(format!("Skipping {project}: no compatible build"))
                        .await;
                }
            }

            self.reporter.progress(
                Phase::Optimization,
                (index + 1) as f64 / total as f64,
                &format!("Optimization mods {}/{total}", index + 1),
            );
        }
        Ok(())
    }

    pub(super) async fn install_auto_content(&self) -> Result<(), InstallError> {
        let projects = &self.settings.auto_install;
        if projects.is_empty() {
            return Ok(());
        }
        self.reporter
            .begin(Phase::AutoInstall, "Installing auto-install content");

        let total = projects.len();
        let (mut installed, mut skipped) = (0usize, 0usize);
        for (index, project) in projects.iter().enumerate() {
            match self.add_with_fallbacks(project, &[]).await? {
                Some(Added::Installed(file)) => {
                    installed += 1;
                    self.reporter.log(format!("Installed {file}")).await;
                }
                Some(Added::Present(_)) | None => skipped += 1,
            }

            self.reporter.progress(
                Phase::AutoInstall,
                (index + 1) as f64 / total as f64,
                &format!("Auto-install {}/{total}", index + 1),
            );
        }

        self.reporter
            .log(format!("Auto-install: {installed} installed, {skipped} skipped"))
            .await;
        Ok(())
    }
}

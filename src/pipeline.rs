use std::{path::Path, sync::Arc};

use tokio::{sync::broadcast, task::JoinHandle};
use tokio_stream::wrappers::BroadcastStream;
use tracing::{error, info, warn};

use crate::{
    config::{InstallEvent, Settings},
    content::ContentCache,
    error::{InstallError, RegistryError, StoreError},
    instance::{InstanceConfig, InstancePaths, InstanceStatus, InstanceStore},
    progress::ProgressReporter,
    registry::RegistryClient,
    task::{InstallTask, TaskRegistry, TaskSlot},
    utils,
};

mod addons;
mod phases;

pub use addons::{OPTIMIZATION_MODS, optimization_fallbacks};

const CONTENT_CACHE_FILE: &str = "content-cache.json";
const INSTANCES_DIR: &str = "instances";

/// How a pipeline run ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InstallOutcome {
    Ready,
    Failed(String),
    /// The task was aborted. Terminal status is left to whoever cancelled.
    Stopped,
}

/// A running install: its task, its transcript and the join handle of the
/// pipeline future.
#[derive(Debug)]
pub struct InstallHandle {
    task: Arc<InstallTask>,
    reporter: Arc<ProgressReporter>,
    join: JoinHandle<InstallOutcome>,
}

impl InstallHandle {
    pub fn task(&self) -> &Arc<InstallTask> {
        &self.task
    }

    pub fn instance(&self) -> &str {
        self.task.instance()
    }

    /// Latest transcript lines kept in memory, oldest first.
    pub fn recent_log(&self) -> Vec<String> {
        self.reporter.recent()
    }

    pub fn percent(&self) -> u8 {
        self.reporter.percent()
    }

    pub fn abort(&self) {
        self.task.abort();
    }

    pub async fn wait(self) -> InstallOutcome {
        match self.join.await {
            Ok(outcome) => outcome,
            Err(err) => {
                error!(instance = %self.task.instance(), %err, "install task panicked");
                InstallOutcome::Failed(format!("install task panicked: {err}"))
            }
        }
    }
}

/// Entry point for install, reinstall and migration requests.
#[derive(Debug, Clone)]
pub struct InstallManager {
    store: Arc<InstanceStore>,
    tasks: Arc<TaskRegistry>,
    client: Arc<RegistryClient>,
    cache: Arc<ContentCache>,
    settings: Arc<Settings>,
    events: broadcast::Sender<InstallEvent>,
}

impl InstallManager {
    /// Lays instances out under `<data_dir>/instances` and keeps the shared
    /// content cache in `<data_dir>/content-cache.json`.
    pub async fn new(data_dir: &Path, settings: Settings) -> Result<Self, RegistryError> {
        let client = RegistryClient::new(settings.endpoints.clone(), settings.request_timeout())?;
        let cache = ContentCache::load(data_dir.join(CONTENT_CACHE_FILE)).await;
        Ok(Self::with_parts(
            InstanceStore::new(data_dir.join(INSTANCES_DIR)),
            Arc::new(TaskRegistry::new()),
            client,
            cache,
            settings,
        ))
    }

    pub fn with_parts(
        store: InstanceStore,
        tasks: Arc<TaskRegistry>,
        client: RegistryClient,
        cache: ContentCache,
        settings: Settings,
    ) -> Self {
        let (events, _) = broadcast::channel(2048);
        Self {
            store: Arc::new(store),
            tasks,
            client: Arc::new(client),
            cache: Arc::new(cache),
            settings: Arc::new(settings),
            events,
        }
    }

    pub fn store(&self) -> &Arc<InstanceStore> {
        &self.store
    }

    pub fn tasks(&self) -> &Arc<TaskRegistry> {
        &self.tasks
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn subscribe(&self) -> BroadcastStream<InstallEvent> {
        BroadcastStream::new(self.events.subscribe())
    }

    pub fn receiver(&self) -> broadcast::Receiver<InstallEvent> {
        self.events.subscribe()
    }

    /// Creates a new instance record (suffixing the name on collision) and
    /// starts its first install.
    pub async fn create_instance(&self, config: InstanceConfig) -> Result<InstallHandle, InstallError> {
        let created = self.store.create(config).await?;
        info!(instance = %created.name, version = %created.version, loader = %created.loader, "instance created");
        let name = created.name.clone();
        self.start_install(&name, created, false, false).await
    }

    /// Starts the pipeline for `name` with the target described by `config`,
    /// preempting any task already running for that instance.
    ///
    /// `clean` discards downloaded version files first. `migrate` re-resolves
    /// the existing content against the new target.
    pub async fn start_install(
        &self,
        name: &str,
        config: InstanceConfig,
        clean: bool,
        migrate: bool,
    ) -> Result<InstallHandle, InstallError> {
        // both end up as path components under the instance directory
        if !utils::is_file_name(name) {
            return Err(StoreError::InvalidName(name.to_string()).into());
        }
        if !utils::is_file_name(&config.version) {
            return Err(InstallError::InvalidVersion(config.version));
        }

        let task = self.tasks.acquire(name);
        let slot = TaskSlot::new(self.tasks.clone(), task.clone());

        let (version, loader, loader_version) = (
            config.version.clone(),
            config.loader,
            config.loader_version.clone(),
        );
        let updated = self
            .store
            .update(name, move |cfg| {
                cfg.version = version;
                cfg.loader = loader;
                cfg.loader_version = loader_version;
                cfg.version_id = None;
                cfg.status = InstanceStatus::Installing;
                cfg.error = None;
            })
            .await;

        let stored = match updated {
            Ok(stored) => stored,
            Err(StoreError::NotFound(_)) => {
                let mut fresh = config;
                fresh.name = name.to_string();
                fresh.version_id = None;
                fresh.status = InstanceStatus::Installing;
                fresh.error = None;
                self.store.save(&fresh).await?;
                fresh
            }
            Err(err) => return Err(err.into()),
        };

        let paths = self.store.paths(name);
        let reporter = Arc::new(ProgressReporter::new(
            name,
            paths.install_log(),
            self.events.clone(),
            self.settings.log_ring_capacity,
        ));
        reporter.status(InstanceStatus::Installing, None);

        info!(
            instance = name,
            task = %task.id(),
            version = %stored.version,
            loader = %stored.loader,
            clean,
            migrate,
            "install task started"
        );

        let pipeline = Pipeline {
            name: name.to_string(),
            config: stored,
            paths,
            clean,
            migrate,
            task: task.clone(),
            reporter: reporter.clone(),
            store: self.store.clone(),
            client: self.client.clone(),
            cache: self.cache.clone(),
            settings: self.settings.clone(),
        };

        let join = tokio::spawn(pipeline.run(slot));
        Ok(InstallHandle {
            task,
            reporter,
            join,
        })
    }

    /// Aborts the running task for `name` and marks the instance stopped.
    /// Returns whether a task was running.
    pub async fn cancel(&self, name: &str) -> Result<bool, StoreError> {
        if !self.tasks.abort(name) {
            return Ok(false);
        }

        self.store
            .update(name, |cfg| cfg.status = InstanceStatus::Stopped)
            .await?;
        _ = self
            .events
            .send(InstallEvent::status(name, InstanceStatus::Stopped, None));
        Ok(true)
    }
}

/// One pipeline run. Owns clones of every collaborator so it can live on its
/// own tokio task.
#[derive(Debug)]
pub(crate) struct Pipeline {
    name: String,
    config: InstanceConfig,
    paths: InstancePaths,
    clean: bool,
    migrate: bool,
    task: Arc<InstallTask>,
    reporter: Arc<ProgressReporter>,
    store: Arc<InstanceStore>,
    client: Arc<RegistryClient>,
    cache: Arc<ContentCache>,
    settings: Arc<Settings>,
}

impl Pipeline {
    /// Runs every phase, then writes the terminal state. `slot` is dropped
    /// last, after the terminal state is persisted, on every path.
    async fn run(self, slot: TaskSlot) -> InstallOutcome {
        let result = self.execute().await;
        let outcome = self.finish(result).await;
        drop(slot);
        outcome
    }

    async fn execute(&self) -> Result<(), InstallError> {
        self.reporter
            .log(format!(
                "Installing {} ({} {}){}",
                self.name,
                self.config.version,
                self.config.loader,
                if self.migrate { " with migration" } else { "" }
            ))
            .await;

        self.task.checkpoint()?;
        let candidates = if self.migrate {
            self.analyze_migration().await?
        } else {
            Vec::new()
        };

        self.task.checkpoint()?;
        if self.clean {
            self.clean_versions().await;
        }
        self.download_base().await?;

        self.task.checkpoint()?;
        let version_id = self.install_loader().await?;

        self.task.checkpoint()?;
        self.sync_libraries(&version_id).await?;

        self.task.checkpoint()?;
        self.install_migrated(&candidates).await?;

        self.task.checkpoint()?;
        self.install_optimizations().await?;

        self.task.checkpoint()?;
        self.install_auto_content().await?;

        self.task.checkpoint()
    }

    async fn finish(&self, result: Result<(), InstallError>) -> InstallOutcome {
        if let Err(err) = self.cache.persist().await {
            warn!(instance = %self.name, %err, "content cache not persisted");
        }

        match result {
            // whatever failed after an abort is a consequence of the abort
            _ if self.task.is_aborted() => self.stopped().await,
            Err(InstallError::Aborted) => self.stopped().await,
            Ok(()) => self.succeed().await,
            Err(err) => self.fail(err).await,
        }
    }

    async fn stopped(&self) -> InstallOutcome {
        self.reporter.log("Installation stopped").await;
        InstallOutcome::Stopped
    }

    /// Writes a terminal status unless the task was aborted. The abort check
    /// runs under the store lock, so a canceller or successor that already
    /// aborted this task always has the last word.
    async fn settle(
        &self,
        status: InstanceStatus,
        error: Option<String>,
    ) -> Result<bool, StoreError> {
        let task = self.task.clone();
        let written = self
            .store
            .update_if(&self.name, move |cfg| {
                if task.is_aborted() {
                    return false;
                }
                cfg.status = status;
                cfg.error = error;
                true
            })
            .await?;
        Ok(written.is_some())
    }

    async fn succeed(&self) -> InstallOutcome {
        match self.settle(InstanceStatus::Ready, None).await {
            Ok(true) => {
                self.reporter.log("Installation complete").await;
                self.reporter.complete("Ready");
                self.reporter.status(InstanceStatus::Ready, None);
                info!(instance = %self.name, "install task finished");
                InstallOutcome::Ready
            }
            Ok(false) => self.stopped().await,
            Err(err) => self.fail(InstallError::from(err)).await,
        }
    }

    async fn fail(&self, err: InstallError) -> InstallOutcome {
        let message = err.to_string();
        match self
            .settle(InstanceStatus::Error, Some(message.clone()))
            .await
        {
            Ok(false) => return self.stopped().await,
            Ok(true) => {}
            Err(store_err) => {
                error!(instance = %self.name, %store_err, "could not persist error status");
            }
        }

        error!(instance = %self.name, error = %message, "install task failed");
        self.reporter.warn(format!("Installation failed: {message}")).await;
        self.reporter.complete("Failed");
        self.reporter
            .status(InstanceStatus::Error, Some(message.clone()));
        InstallOutcome::Failed(message)
    }
}

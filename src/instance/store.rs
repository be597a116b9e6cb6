use std::{
    io,
    path::{Path, PathBuf},
};

use tokio::{
    fs::{create_dir, create_dir_all, read, read_dir},
    sync::Mutex,
};
use tracing::{debug, warn};

use crate::{error::StoreError, utils};

use super::types::{INSTANCE_FILE, InstanceConfig, InstancePaths};

/// Persisted `instance.json` records under a shared instances directory.
///
/// Writes go through a scratch file and a rename, and read-modify-write
/// cycles are serialized per store.
#[derive(Debug)]
pub struct InstanceStore {
    root: PathBuf,
    write_lock: Mutex<()>,
}

impl InstanceStore {
    pub fn new<P: Into<PathBuf>>(root: P) -> Self {
        Self {
            root: root.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn paths(&self, name: &str) -> InstancePaths {
        InstancePaths::new(self.root.join(name))
    }

    /// Creates the instance directory and writes its config, suffixing the
    /// name with `-2`, `-3`, ... until it no longer collides.
    pub async fn create(&self, mut config: InstanceConfig) -> Result<InstanceConfig, StoreError> {
        let base = utils::sanitize_name(&config.name);
        if base.is_empty() {
            return Err(StoreError::InvalidName(config.name));
        }

        create_dir_all(&self.root)
            .await
            .map_err(|source| StoreError::Io {
                path: self.root.clone(),
                source,
            })?;

        let mut attempt = 1u32;
        let name = loop {
            let candidate = if attempt == 1 {
                base.clone()
            } else {
                format!("{base}-{attempt}")
            };

            let dir = self.root.join(&candidate);
            match create_dir(&dir).await {
                Ok(()) => break candidate,
                Err(err) if err.kind() == io::ErrorKind::AlreadyExists => attempt += 1,
                Err(source) => return Err(StoreError::Io { path: dir, source }),
            }
        };

        if name != config.name {
            debug!(requested = %config.name, assigned = %name, "instance name adjusted");
        }
        config.name = name;
        self.save(&config).await?;
        Ok(config)
    }

    pub async fn load(&self, name: &str) -> Result<InstanceConfig, StoreError> {
        let path = self.paths(name).config_file();
        let data = match read(&path).await {
            Ok(data) => data,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                return Err(StoreError::NotFound(name.to_string()));
            }
            Err(source) => return Err(StoreError::Io { path, source }),
        };

        serde_json::from_slice(&data).map_err(|source| StoreError::Json { path, source })
    }

    pub async fn save(&self, config: &InstanceConfig) -> Result<(), StoreError> {
        let path = self.paths(&config.name).config_file();
        let json = serde_json::to_vec_pretty(config).map_err(|source| StoreError::Json {
            path: path.clone(),
            source,
        })?;

        utils::write_atomic(&path, &json)
            .await
            .map_err(|source| StoreError::Io { path, source })
    }

    /// Read-modify-write of one instance record.
    pub async fn update<F>(&self, name: &str, mutate: F) -> Result<InstanceConfig, StoreError>
    where
        F: FnOnce(&mut InstanceConfig),
    {
        let _guard = self.write_lock.lock().await;
        let mut config = self.load(name).await?;
        mutate(&mut config);
        self.save(&config).await?;
        Ok(config)
    }

    /// Like [`update`](Self::update), but `mutate` may decline the write by
    /// returning `false`. The decision is taken under the write lock.
    pub async fn update_if<F>(
        &self,
        name: &str,
        mutate: F,
    ) -> Result<Option<InstanceConfig>, StoreError>
    where
        F: FnOnce(&mut InstanceConfig) -> bool,
    {
        let _guard = self.write_lock.lock().await;
        let mut config = self.load(name).await?;
        if !mutate(&mut config) {
            return Ok(None);
        }
        self.save(&config).await?;
        Ok(Some(config))
    }

    /// Loads every instance under the root, skipping directories without a
    /// readable `instance.json`.
    pub async fn list(&self) -> Result<Vec<InstanceConfig>, StoreError> {
        let mut entries = match read_dir(&self.root).await {
            Ok(entries) => entries,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(source) => {
                return Err(StoreError::Io {
                    path: self.root.clone(),
                    source,
                });
            }
        };

        let mut instances = Vec::new();
        while let Some(entry) = entries.next_entry().await.map_err(|source| StoreError::Io {
            path: self.root.clone(),
            source,
        })? {
            if !entry.path().join(INSTANCE_FILE).is_file() {
                continue;
            }

            let name = entry.file_name().to_string_lossy().into_owned();
            match self.load(&name).await {
                Ok(config) => instances.push(config),
                Err(err) => warn!(instance = %name, %err, "skipping unreadable instance"),
            }
        }

        instances.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(instances)
    }
}

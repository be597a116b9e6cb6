use std::{
    path::{Path, PathBuf},
    time::Duration,
};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::registry::RegistryEndpoints;

/// Environment variable overriding the Java executable used for installers.
pub const JAVA_ENV: &str = "MINELOOM_JAVA";

/// Launcher-wide knobs consumed by the install pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Settings {
    pub java_path: PathBuf,
    /// Install the optimization add-on set after the loader.
    pub optimize: bool,
    /// Registry project ids or slugs installed into every new instance.
    pub auto_install: Vec<String>,
    pub log_ring_capacity: usize,
    pub request_timeout_secs: u64,
    pub endpoints: RegistryEndpoints,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            java_path: PathBuf::from("java"),
            optimize: false,
            auto_install: Vec::new(),
            log_ring_capacity: 500,
            request_timeout_secs: 30,
            endpoints: RegistryEndpoints::default(),
        }
    }
}

impl Settings {
    /// Reads settings from `path`, falling back to defaults when the file is
    /// missing or unreadable. `MINELOOM_JAVA` wins over the stored java path.
    pub async fn load(path: &Path) -> Self {
        let mut settings = match tokio::fs::read(path).await {
            Ok(data) => match serde_json::from_slice::<Settings>(&data) {
                Ok(settings) => settings,
                Err(err) => {
                    warn!(path = %path.display(), %err, "ignoring malformed settings file");
                    Settings::default()
                }
            },
            Err(err) => {
                debug!(path = %path.display(), %err, "no settings file, using defaults");
                Settings::default()
            }
        };

        if let Some(java) = std::env::var_os(JAVA_ENV) {
            settings.java_path = PathBuf::from(java);
        }

        settings
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs.max(1))
    }
}

pub mod config;
pub mod content;
pub mod error;
pub mod instance;
pub mod loader;
pub mod manifests;
pub mod pipeline;
pub mod progress;
pub mod registry;
pub mod task;
mod utils;

pub use config::{LoaderFamily, MinecraftVersion, Settings};
pub use error::{InstallError, LoaderError, RegistryError, StoreError};
pub use instance::{InstanceConfig, InstanceStatus, InstanceStore};
pub use pipeline::{InstallHandle, InstallManager, InstallOutcome};
pub use task::{InstallTask, TaskRegistry};

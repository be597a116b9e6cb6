mod store;
mod types;

pub use store::InstanceStore;
pub use types::{ContentKind, InstanceConfig, InstancePaths, InstanceStatus};

mod process;
mod registry;

pub use process::{ProcessExit, run_supervised};
pub use registry::{InstallTask, TaskRegistry, TaskSlot};

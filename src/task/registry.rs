use std::{
    collections::HashMap,
    sync::{Arc, Mutex, MutexGuard},
};

use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::InstallError;

/// One in-flight run of the install pipeline for one instance.
///
/// Cancellation is a [`CancellationToken`]: aborting cancels it, and any
/// installer process started through [`run_supervised`](super::run_supervised)
/// watches the same token and is killed as soon as it fires.
#[derive(Debug)]
pub struct InstallTask {
    id: Uuid,
    instance: String,
    token: CancellationToken,
    process: Mutex<Option<u32>>,
}

impl InstallTask {
    fn new(instance: &str) -> Self {
        Self {
            id: Uuid::new_v4(),
            instance: instance.to_string(),
            token: CancellationToken::new(),
            process: Mutex::new(None),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn instance(&self) -> &str {
        &self.instance
    }

    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    pub fn is_aborted(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Idempotent and non-blocking. Does not wait for the pipeline to notice.
    pub fn abort(&self) {
        if !self.token.is_cancelled() {
            info!(instance = %self.instance, task = %self.id, "aborting install task");
        }
        self.token.cancel();
    }

    /// Phase and loop boundary check.
    pub fn checkpoint(&self) -> Result<(), InstallError> {
        if self.is_aborted() {
            Err(InstallError::Aborted)
        } else {
            Ok(())
        }
    }

    fn process_guard(&self) -> MutexGuard<'_, Option<u32>> {
        self.process.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub(crate) fn attach_process(&self, pid: Option<u32>) {
        *self.process_guard() = pid;
    }

    pub(crate) fn detach_process(&self) {
        *self.process_guard() = None;
    }

    /// Pid of the attached installer process while it is alive.
    pub fn live_process(&self) -> Option<u32> {
        *self.process_guard()
    }
}

/// In-memory map from instance name to its single active task.
#[derive(Debug, Default)]
pub struct TaskRegistry {
    tasks: Mutex<HashMap<String, Arc<InstallTask>>>,
}

impl TaskRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn guard(&self) -> MutexGuard<'_, HashMap<String, Arc<InstallTask>>> {
        self.tasks.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Hands out a fresh task for `instance`, aborting any task already
    /// registered under that name. Returns without waiting for the old task
    /// to stop.
    pub fn acquire(&self, instance: &str) -> Arc<InstallTask> {
        let task = Arc::new(InstallTask::new(instance));
        let previous = self.guard().insert(instance.to_string(), task.clone());

        if let Some(previous) = previous {
            debug!(instance, old = %previous.id(), new = %task.id(), "preempting install task");
            previous.abort();
        }
        task
    }

    /// Aborts the active task for `instance`. Returns whether one existed.
    pub fn abort(&self, instance: &str) -> bool {
        match self.guard().get(instance) {
            Some(task) => {
                task.abort();
                true
            }
            None => false,
        }
    }

    /// Removes `task` from the registry. A task that was already replaced
    /// leaves its successor untouched.
    pub fn release(&self, task: &InstallTask) -> bool {
        let mut tasks = self.guard();
        match tasks.get(task.instance()) {
            Some(current) if current.id() == task.id() => {
                tasks.remove(task.instance());
                true
            }
            _ => false,
        }
    }

    pub fn get(&self, instance: &str) -> Option<Arc<InstallTask>> {
        self.guard().get(instance).cloned()
    }

    pub fn is_active(&self, instance: &str) -> bool {
        self.guard()
            .get(instance)
            .is_some_and(|task| !task.is_aborted())
    }

    pub fn len(&self) -> usize {
        self.guard().len()
    }

    pub fn is_empty(&self) -> bool {
        self.guard().is_empty()
    }
}

/// Releases a task from its registry when dropped, so the slot is freed on
/// every exit path of the pipeline, panics included.
#[derive(Debug)]
pub struct TaskSlot {
    registry: Arc<TaskRegistry>,
    task: Arc<InstallTask>,
}

impl TaskSlot {
    pub fn new(registry: Arc<TaskRegistry>, task: Arc<InstallTask>) -> Self {
        Self { registry, task }
    }

    pub fn task(&self) -> &Arc<InstallTask> {
        &self.task
    }
}

impl Drop for TaskSlot {
    fn drop(&mut self) {
        if self.registry.release(&self.task) {
            debug!(instance = %self.task.instance(), task = %self.task.id(), "task slot released");
        }
    }
}

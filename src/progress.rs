use std::{
    collections::VecDeque,
    fmt::{self, Display},
    path::PathBuf,
    sync::{
        Mutex,
        atomic::{AtomicU8, Ordering},
    },
};

use tokio::{
    fs::{File, OpenOptions, create_dir_all},
    io::AsyncWriteExt,
    sync::{Mutex as AsyncMutex, broadcast},
};
use tracing::{debug, info, warn};

use crate::{
    config::{InstallEvent, StreamLine},
    instance::InstanceStatus,
    utils,
};

/// Pipeline phases in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Phase {
    MigrationAnalysis,
    BaseDownload,
    LoaderInstall,
    LibrarySync,
    MigratedContent,
    Optimization,
    AutoInstall,
    Completion,
}

impl Phase {
    /// Global percentage span `[start, end]` owned by the phase. Only
    /// completion reaches 100.
    pub fn span(&self) -> (u8, u8) {
        match self {
            Phase::MigrationAnalysis => (0, 10),
            Phase::BaseDownload => (10, 20),
            Phase::LoaderInstall => (20, 40),
            Phase::LibrarySync => (40, 70),
            Phase::MigratedContent => (70, 80),
            Phase::Optimization => (80, 90),
            Phase::AutoInstall => (90, 99),
            Phase::Completion => (100, 100),
        }
    }
}

impl Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Phase::MigrationAnalysis => "migration analysis",
            Phase::BaseDownload => "base download",
            Phase::LoaderInstall => "loader install",
            Phase::LibrarySync => "library sync",
            Phase::MigratedContent => "migrated content",
            Phase::Optimization => "optimization content",
            Phase::AutoInstall => "auto-install content",
            Phase::Completion => "completion",
        };
        f.write_str(name)
    }
}

/// Maps phase-local progress onto a global percentage and keeps the install
/// transcript: `install.log` on disk, a bounded ring buffer in memory, and
/// line events on the broadcast channel.
#[derive(Debug)]
pub struct ProgressReporter {
    instance: String,
    events: broadcast::Sender<InstallEvent>,
    log_path: PathBuf,
    log_file: AsyncMutex<Option<File>>,
    ring: Mutex<VecDeque<String>>,
    capacity: usize,
    percent: AtomicU8,
}

impl ProgressReporter {
    pub fn new<S: Into<String>>(
        instance: S,
        log_path: PathBuf,
        events: broadcast::Sender<InstallEvent>,
        capacity: usize,
    ) -> Self {
        let capacity = capacity.max(1);
        Self {
            instance: instance.into(),
            events,
            log_path,
            log_file: AsyncMutex::new(None),
            ring: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity,
            percent: AtomicU8::new(0),
        }
    }

    pub fn instance(&self) -> &str {
        &self.instance
    }

    /// Current global percentage.
    pub fn percent(&self) -> u8 {
        self.percent.load(Ordering::SeqCst)
    }

    /// Reports `fraction` (0.0..=1.0) of `phase` as done. The emitted value
    /// never decreases and stays below 100 until [`complete`](Self::complete).
    pub fn progress(&self, phase: Phase, fraction: f64, status: &str) -> u8 {
        let (start, end) = phase.span();
        let fraction = if fraction.is_finite() {
            fraction.clamp(0.0, 1.0)
        } else {
            0.0
        };
        let target = (start as f64 + (end - start) as f64 * fraction).floor() as u8;
        let target = if phase == Phase::Completion {
            target
        } else {
            target.min(99)
        };

        let previous = self.percent.fetch_max(target, Ordering::SeqCst);
        let percent = previous.max(target);
        _ = self
            .events
            .send(InstallEvent::progress(&self.instance, percent, status));
        percent
    }

    pub fn begin(&self, phase: Phase, status: &str) -> u8 {
        self.progress(phase, 0.0, status)
    }

    pub fn complete(&self, status: &str) {
        self.progress(Phase::Completion, 1.0, status);
    }

    pub fn status(&self, status: InstanceStatus, error: Option<String>) {
        _ = self
            .events
            .send(InstallEvent::status(&self.instance, status, error));
    }

    /// Appends an informational pipeline line to the transcript.
    pub async fn log<S: Into<String>>(&self, msg: S) {
        let line = StreamLine::pipeline(msg);
        info!(instance = %self.instance, "{}", line);
        self.record(line).await;
    }

    /// Appends a recoverable failure to the transcript.
    pub async fn warn<S: Into<String>>(&self, msg: S) {
        let line = StreamLine::pipeline(format!("WARN {}", msg.into()));
        warn!(instance = %self.instance, "{}", line);
        self.record(line).await;
    }

    /// Appends a line of installer process output to the transcript.
    pub async fn line(&self, line: StreamLine) {
        debug!(instance = %self.instance, "{}", line);
        self.record(line).await;
    }

    /// Snapshot of the in-memory ring buffer, oldest first.
    pub fn recent(&self) -> Vec<String> {
        self.ring_guard().iter().cloned().collect()
    }

    fn ring_guard(&self) -> std::sync::MutexGuard<'_, VecDeque<String>> {
        self.ring.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    async fn record(&self, line: StreamLine) {
        let stamped = format!("[{}] {}", utils::log_stamp(), line);

        {
            let mut ring = self.ring_guard();
            if ring.len() == self.capacity {
                ring.pop_front();
            }
            ring.push_back(stamped.clone());
        }

        if let Err(err) = self.append(&stamped).await {
            debug!(path = %self.log_path.display(), %err, "install log write failed");
        }

        _ = self.events.send(InstallEvent::line(&self.instance, line));
    }

    async fn append(&self, stamped: &str) -> std::io::Result<()> {
        let mut guard = self.log_file.lock().await;
        if guard.is_none() {
            if let Some(parent) = self.log_path.parent() {
                create_dir_all(parent).await?;
            }
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(&self.log_path)
                .await?;
            *guard = Some(file);
        }

        if let Some(file) = guard.as_mut() {
            file.write_all(stamped.as_bytes()).await?;
            file.write_all(b"\n").await?;
            file.flush().await?;
        }
        Ok(())
    }
}

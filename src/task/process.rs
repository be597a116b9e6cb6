use std::{io, process::Stdio, sync::Arc};

use tokio::{
    io::{AsyncBufReadExt, AsyncRead, BufReader},
    process::Command,
    task::JoinHandle,
};
use tracing::{debug, warn};

use crate::{config::StreamLine, progress::ProgressReporter};

use super::InstallTask;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessExit {
    /// The process ran to completion. `None` when it was terminated by a
    /// signal the task did not send.
    Exited(Option<i32>),
    /// The task was aborted and the process was killed.
    Killed,
}

impl ProcessExit {
    pub fn success(&self) -> bool {
        matches!(self, ProcessExit::Exited(Some(0)))
    }
}

/// Runs `command` as the task's attached process.
///
/// Output is streamed line by line into the reporter. A supervisor owns the
/// child and kills it the moment the task's token is cancelled, independent
/// of what the caller is awaiting.
pub async fn run_supervised(
    mut command: Command,
    task: &Arc<InstallTask>,
    reporter: &Arc<ProgressReporter>,
) -> io::Result<ProcessExit> {
    command
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    #[cfg(unix)]
    command.process_group(0);

    if task.is_aborted() {
        return Ok(ProcessExit::Killed);
    }

    let mut child = command.spawn()?;
    task.attach_process(child.id());
    debug!(instance = %task.instance(), pid = ?child.id(), "installer process started");

    let mut pumps = Vec::new();
    if let Some(stdout) = child.stdout.take() {
        pumps.push(pump(stdout, reporter.clone(), StreamLine::stdout));
    }
    if let Some(stderr) = child.stderr.take() {
        pumps.push(pump(stderr, reporter.clone(), StreamLine::stderr));
    }

    let token = task.token().clone();
    let supervised = task.clone();
    let pid = child.id();
    let supervisor = tokio::spawn(async move {
        let exited = tokio::select! {
            status = child.wait() => Some(status),
            _ = token.cancelled() => None,
        };

        let result = match exited {
            Some(status) => status.map(|s| ProcessExit::Exited(s.code())),
            None => {
                if let Some(pid) = pid {
                    kill_group(pid);
                }
                _ = child.start_kill();
                child.wait().await.map(|_| ProcessExit::Killed)
            }
        };

        supervised.detach_process();
        result
    });

    let result = supervisor.await.map_err(io::Error::other)?;

    // a killed child may leave descendants holding the pipes open
    let killed = matches!(result, Ok(ProcessExit::Killed));
    for pump in pumps {
        if killed {
            pump.abort();
        } else {
            _ = pump.await;
        }
    }

    debug!(instance = %task.instance(), ?result, "installer process finished");
    result
}

/// Kills the process group led by `pid`, reaching anything the installer
/// forked as well as the installer itself.
#[cfg(unix)]
fn kill_group(pid: u32) {
    use nix::{
        errno::Errno,
        sys::signal::{Signal, killpg},
        unistd::Pid,
    };

    let Ok(raw) = i32::try_from(pid) else {
        return;
    };
    match killpg(Pid::from_raw(raw), Signal::SIGKILL) {
        Ok(()) => debug!(pid, "killed installer process group"),
        Err(Errno::ESRCH) => debug!(pid, "installer process group already gone"),
        Err(err) => warn!(pid, %err, "failed to kill installer process group"),
    }
}

#[cfg(not(unix))]
fn kill_group(_pid: u32) {}

fn pump<R>(
    stream: R,
    reporter: Arc<ProgressReporter>,
    wrap: fn(String) -> StreamLine,
) -> JoinHandle<()>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut lines = BufReader::new(stream).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            let line = wrap(line);
            if !line.is_empty() {
                reporter.line(line).await;
            }
        }
    })
}

//! Process termination with exit confirmation

use crate::collector::{ProcessHandle, ProcessService};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Result of a kill request. Failures are reported, never raised.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KillOutcome {
    /// The target was the daemon itself; no signal was sent.
    Refused { pid: u32 },
    Terminated { pid: u32 },
    Failed { pid: u32, reason: String },
}

impl KillOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, KillOutcome::Terminated { .. })
    }
}

impl fmt::Display for KillOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KillOutcome::Refused { pid } => {
                write!(f, "Refusing to kill own server process (pid {})", pid)
            }
            KillOutcome::Terminated { pid } => write!(f, "Process {} terminated", pid),
            KillOutcome::Failed { pid, reason } => write!(f, "Failed to kill {}: {}", pid, reason),
        }
    }
}

pub struct Terminator<S> {
    service: Arc<S>,
    own_pid: u32,
    timeout: Duration,
    poll_interval: Duration,
}

impl<S: ProcessService> Terminator<S> {
    pub fn new(service: Arc<S>, timeout: Duration, poll_interval: Duration) -> Self {
        Self {
            service,
            own_pid: std::process::id(),
            timeout,
            poll_interval,
        }
    }

    /// Overrides the pid treated as "self".
    pub fn with_own_pid(mut self, pid: u32) -> Self {
        self.own_pid = pid;
        self
    }

    pub fn own_pid(&self) -> u32 {
        self.own_pid
    }

    /// alive -> signaled -> exited | still alive after timeout
    ///
    /// Every call into the process service runs on the blocking pool.
    pub async fn terminate(&self, pid: u32) -> KillOutcome {
        if pid == self.own_pid {
            warn!("Refusing to kill own process {}", pid);
            return KillOutcome::Refused { pid };
        }

        let service = Arc::clone(&self.service);
        let handle = match blocking(move || service.process(pid)).await {
            Ok(Ok(handle)) => Arc::new(handle),
            Ok(Err(e)) => return KillOutcome::Failed { pid, reason: e.to_string() },
            Err(reason) => return KillOutcome::Failed { pid, reason },
        };

        let target = Arc::clone(&handle);
        match blocking(move || target.kill()).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                warn!("Kill signal to {} failed: {}", pid, e);
                return KillOutcome::Failed { pid, reason: e.to_string() };
            }
            Err(reason) => return KillOutcome::Failed { pid, reason },
        }

        let exited = tokio::time::timeout(self.timeout, async {
            loop {
                let target = Arc::clone(&handle);
                match blocking(move || target.is_running()).await {
                    Ok(true) => {}
                    Ok(false) => return Ok(()),
                    Err(reason) => return Err(reason),
                }
                tokio::time::sleep(self.poll_interval).await;
            }
        })
        .await;

        match exited {
            Ok(Ok(())) => {
                info!("Process {} terminated", pid);
                KillOutcome::Terminated { pid }
            }
            Ok(Err(reason)) => KillOutcome::Failed { pid, reason },
            Err(_) => {
                warn!("Process {} still running after {:?}", pid, self.timeout);
                KillOutcome::Failed {
                    pid,
                    reason: format!("timed out after {:?} waiting for exit", self.timeout),
                }
            }
        }
    }
}

async fn blocking<T, F>(f: F) -> Result<T, String>
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f).await.map_err(|e| format!("task failed: {}", e))
}

//! OS process service: enumeration, per-process accessors and signalling
//!
//! Linux reads `/proc` directly; every other platform goes through `sysinfo`.

#[cfg(target_os = "linux")]
mod linux;
#[cfg(not(target_os = "linux"))]
mod portable;

#[cfg(target_os = "linux")]
pub use linux::{ProcfsHandle, ProcfsService};
#[cfg(not(target_os = "linux"))]
pub use portable::{SysinfoHandle, SysinfoService};

use std::io;
use std::path::PathBuf;
use std::time::Duration;

/// Process service for the platform the daemon was built for.
#[cfg(target_os = "linux")]
pub type PlatformService = ProcfsService;
#[cfg(not(target_os = "linux"))]
pub type PlatformService = SysinfoService;

/// Failure reading from or signalling a single process.
#[derive(Debug, thiserror::Error)]
pub enum ProcessError {
    #[error("process not found (pid={pid})")]
    NoSuchProcess { pid: u32 },

    #[error("access denied (pid={pid})")]
    AccessDenied { pid: u32 },

    #[error("not supported on this platform")]
    Unsupported,

    #[error("{source} (pid={pid})")]
    Io { pid: u32, source: io::Error },
}

impl ProcessError {
    /// Classifies an I/O error raised while reading `pid`.
    pub fn from_io(pid: u32, err: io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::NotFound => Self::NoSuchProcess { pid },
            io::ErrorKind::PermissionDenied => Self::AccessDenied { pid },
            _ => match err.raw_os_error() {
                Some(libc::ESRCH) => Self::NoSuchProcess { pid },
                Some(libc::EPERM) => Self::AccessDenied { pid },
                _ => Self::Io { pid, source: err },
            },
        }
    }
}

/// View of one process. Accessors fail once the process is gone.
pub trait ProcessHandle: Send + Sync {
    fn pid(&self) -> u32;
    fn name(&self) -> Result<String, ProcessError>;
    fn exe(&self) -> Result<PathBuf, ProcessError>;
    fn username(&self) -> Result<String, ProcessError>;
    fn status(&self) -> Result<String, ProcessError>;
    /// Cumulative user + system CPU time since process start.
    fn cpu_time(&self) -> Result<Duration, ProcessError>;
    /// Resident set size in bytes.
    fn resident_size(&self) -> Result<u64, ProcessError>;
    /// Memory not shared with any other process, in bytes.
    fn unique_set_size(&self) -> Result<u64, ProcessError> {
        Err(ProcessError::Unsupported)
    }
    /// Sends a forceful termination signal.
    fn kill(&self) -> Result<(), ProcessError>;
    /// False once the process exited, became a zombie, or its pid was reused.
    fn is_running(&self) -> bool;
}

pub trait ProcessService: Send + Sync + 'static {
    type Handle: ProcessHandle + 'static;

    /// Enumerates live processes, skipping any that vanish while listing.
    fn processes(&self) -> Vec<Self::Handle>;

    fn process(&self, pid: u32) -> Result<Self::Handle, ProcessError>;
}

//! Serializable process records

use crate::collector::{ProcessError, ProcessHandle};
use crate::memory::MemoryResolver;
use crate::sampler::CpuSampler;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;

pub const TERMINATED: &str = "<terminated>";
pub const UNKNOWN: &str = "<unknown>";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessRecord {
    pub pid: u32,
    pub name: String,
    pub username: String,
    pub status: String,
    pub cpu_percent: f64,
    pub rss: u64,
}

impl ProcessRecord {
    /// Placeholder for a process that went away while it was being read.
    pub fn terminated(pid: u32) -> Self {
        Self {
            pid,
            name: TERMINATED.to_string(),
            username: UNKNOWN.to_string(),
            status: TERMINATED.to_string(),
            cpu_percent: 0.0,
            rss: 0,
        }
    }
}

/// Where display names come from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NameSource {
    /// The process name API.
    ProcessName,
    /// File name of the executable, falling back to the process name API.
    /// Windows reports truncated or generic names otherwise.
    Executable,
}

impl NameSource {
    pub fn detect() -> Self {
        if cfg!(windows) { NameSource::Executable } else { NameSource::ProcessName }
    }
}

/// Turns handles into records. Never fails.
#[derive(Clone)]
pub struct Normalizer {
    memory: Arc<MemoryResolver>,
    names: NameSource,
}

impl Normalizer {
    pub fn new(memory: Arc<MemoryResolver>, names: NameSource) -> Self {
        Self { memory, names }
    }

    pub fn normalize(&self, handle: &dyn ProcessHandle, sampler: &mut CpuSampler) -> ProcessRecord {
        match self.read(handle, sampler) {
            Ok(record) => record,
            Err(e) => {
                debug!("Process {} vanished mid-read: {}", handle.pid(), e);
                ProcessRecord::terminated(handle.pid())
            }
        }
    }

    pub fn normalize_all<H: ProcessHandle>(&self, handles: &[H], sampler: &mut CpuSampler) -> Vec<ProcessRecord> {
        handles.iter().map(|h| self.normalize(h, sampler)).collect()
    }

    fn read(&self, handle: &dyn ProcessHandle, sampler: &mut CpuSampler) -> Result<ProcessRecord, ProcessError> {
        let rss = self.memory.resolve(handle);
        let name = self.display_name(handle);
        let username = handle.username()?;
        let status = handle.status()?;
        let cpu_percent = sampler.cpu_percent(handle)?;
        Ok(ProcessRecord {
            pid: handle.pid(),
            name,
            username,
            status,
            cpu_percent,
            rss,
        })
    }

    fn display_name(&self, handle: &dyn ProcessHandle) -> String {
        if self.names == NameSource::Executable {
            let exe_name = handle.exe().ok().and_then(|path| {
                path.file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .filter(|n| !n.is_empty())
            });
            if let Some(name) = exe_name {
                return name;
            }
        }
        handle.name().unwrap_or_else(|_| UNKNOWN.to_string())
    }
}

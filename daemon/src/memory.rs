//! Physical memory accounting
//!
//! Resident set size overstates per-process cost wherever shared libraries are
//! heavy, so the resolver walks a chain of probes, most accurate first, and
//! keeps the first non-zero answer. The chain is fixed at startup from what the
//! platform can offer.

use crate::collector::{ProcessError, ProcessHandle};
use tracing::trace;

/// One way of measuring a process's memory footprint.
pub trait MemoryProbe: Send + Sync {
    fn label(&self) -> &'static str;
    fn probe(&self, handle: &dyn ProcessHandle) -> Result<u64, ProcessError>;
}

/// `ri_phys_footprint` from `proc_pid_rusage`, the figure Activity Monitor shows.
#[cfg(target_os = "macos")]
pub struct PhysFootprint;

#[cfg(target_os = "macos")]
impl MemoryProbe for PhysFootprint {
    fn label(&self) -> &'static str {
        "phys_footprint"
    }

    fn probe(&self, handle: &dyn ProcessHandle) -> Result<u64, ProcessError> {
        let pid = handle.pid();
        let mut info: libc::rusage_info_v4 = unsafe { std::mem::zeroed() };
        let rc = unsafe {
            libc::proc_pid_rusage(
                pid as libc::c_int,
                libc::RUSAGE_INFO_V4,
                &mut info as *mut libc::rusage_info_v4 as *mut libc::rusage_info_t,
            )
        };
        if rc == 0 {
            Ok(info.ri_phys_footprint)
        } else {
            Err(ProcessError::from_io(pid, std::io::Error::last_os_error()))
        }
    }
}

/// Unique set size: pages no other process maps.
pub struct UniqueSetSize;

impl MemoryProbe for UniqueSetSize {
    fn label(&self) -> &'static str {
        "uss"
    }

    fn probe(&self, handle: &dyn ProcessHandle) -> Result<u64, ProcessError> {
        handle.unique_set_size()
    }
}

pub struct ResidentSetSize;

impl MemoryProbe for ResidentSetSize {
    fn label(&self) -> &'static str {
        "rss"
    }

    fn probe(&self, handle: &dyn ProcessHandle) -> Result<u64, ProcessError> {
        handle.resident_size()
    }
}

/// Ordered probe chain.
pub struct MemoryResolver {
    probes: Vec<Box<dyn MemoryProbe>>,
}

impl MemoryResolver {
    pub fn new(probes: Vec<Box<dyn MemoryProbe>>) -> Self {
        Self { probes }
    }

    /// Builds the chain for the current platform.
    pub fn detect() -> Self {
        let mut probes: Vec<Box<dyn MemoryProbe>> = Vec::new();
        #[cfg(target_os = "macos")]
        probes.push(Box::new(PhysFootprint));
        probes.push(Box::new(UniqueSetSize));
        probes.push(Box::new(ResidentSetSize));
        Self::new(probes)
    }

    pub fn labels(&self) -> Vec<&'static str> {
        self.probes.iter().map(|p| p.label()).collect()
    }

    /// Best-effort footprint in bytes; zero when every probe fails.
    pub fn resolve(&self, handle: &dyn ProcessHandle) -> u64 {
        for probe in &self.probes {
            match probe.probe(handle) {
                Ok(bytes) if bytes > 0 => return bytes,
                Ok(_) => trace!(pid = handle.pid(), probe = probe.label(), "probe returned zero"),
                Err(e) => trace!(pid = handle.pid(), probe = probe.label(), "probe failed: {}", e),
            }
        }
        0
    }
}

impl Default for MemoryResolver {
    fn default() -> Self {
        Self::detect()
    }
}

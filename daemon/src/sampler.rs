//! CPU sampling window and snapshot collection

use crate::collector::{ProcessError, ProcessHandle, ProcessService};
use crate::error::Result;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::debug;

#[derive(Clone)]
struct CpuSample {
    cpu_time: Duration,
    timestamp: Instant,
}

/// Interval CPU usage per process, relative to the previous read.
///
/// Owned by a single request, so concurrent requests never share baselines.
#[derive(Default)]
pub struct CpuSampler {
    samples: HashMap<u32, CpuSample>,
}

impl CpuSampler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Percent of one core used since the last read for this pid. The first
    /// read for a pid only records the baseline and yields 0.0.
    pub fn cpu_percent(&mut self, handle: &dyn ProcessHandle) -> std::result::Result<f64, ProcessError> {
        let cpu_time = handle.cpu_time()?;
        let now = Instant::now();
        let percent = match self.samples.get(&handle.pid()) {
            Some(prev) => {
                let busy = cpu_time.saturating_sub(prev.cpu_time).as_secs_f64();
                let elapsed = now.duration_since(prev.timestamp).as_secs_f64();
                if elapsed > 0.0 { busy / elapsed * 100.0 } else { 0.0 }
            }
            None => 0.0,
        };
        self.samples.insert(handle.pid(), CpuSample { cpu_time, timestamp: now });
        Ok(percent)
    }

    /// Records a baseline for every handle; the readings themselves carry no
    /// information and are dropped.
    pub fn prime<H: ProcessHandle>(&mut self, handles: &[H]) {
        for handle in handles {
            if let Err(e) = self.cpu_percent(handle) {
                debug!("No CPU baseline for pid {}: {}", handle.pid(), e);
            }
        }
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortKey {
    Cpu,
    Memory,
}

impl std::str::FromStr for SortKey {
    type Err = crate::error::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "cpu" => Ok(SortKey::Cpu),
            "memory" => Ok(SortKey::Memory),
            _ => Err(crate::error::Error::invalid_argument(
                "sort_by must be 'cpu' or 'memory'",
            )),
        }
    }
}

/// Handles from the second enumeration pass plus the sampler primed before the
/// window opened.
pub struct Snapshot<H> {
    pub handles: Vec<H>,
    pub sampler: CpuSampler,
}

/// Runs the two-pass sampling protocol against a process service.
pub struct SnapshotCollector<S> {
    service: Arc<S>,
    memory_settle: Duration,
}

impl<S: ProcessService> SnapshotCollector<S> {
    pub fn new(service: Arc<S>, memory_settle: Duration) -> Self {
        Self { service, memory_settle }
    }

    /// CPU sorting waits the full `window`; memory sorting only needs the
    /// short settle delay since memory is read instantaneously.
    pub fn suspension(&self, sort_by: SortKey, window: Duration) -> Duration {
        match sort_by {
            SortKey::Cpu => window,
            SortKey::Memory => self.memory_settle,
        }
    }

    pub async fn collect(&self, sort_by: SortKey, window: Duration) -> Result<Snapshot<S::Handle>> {
        let service = Arc::clone(&self.service);
        let sampler = tokio::task::spawn_blocking(move || {
            let mut sampler = CpuSampler::new();
            sampler.prime(&service.processes());
            sampler
        })
        .await?;

        let pause = self.suspension(sort_by, window);
        debug!("Sampling window {:?} ({} baselines)", pause, sampler.len());
        tokio::time::sleep(pause).await;

        let service = Arc::clone(&self.service);
        let handles = tokio::task::spawn_blocking(move || service.processes()).await?;
        Ok(Snapshot { handles, sampler })
    }
}

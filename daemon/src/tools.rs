//! The two exposed operations: `list_processes` and `kill_process`

use crate::collector::ProcessService;
use crate::config::Config;
use crate::error::Result;
use crate::executor::{KillOutcome, Terminator};
use crate::filter::{ListOptions, SystemUsers};
use crate::memory::MemoryResolver;
use crate::protocol::{ListProcessesParams, Request, Response};
use crate::record::{NameSource, Normalizer, ProcessRecord};
use crate::sampler::SnapshotCollector;
use crate::socket::RequestHandler;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

pub struct ProcessTools<S> {
    collector: SnapshotCollector<S>,
    normalizer: Normalizer,
    terminator: Terminator<S>,
    system_users: Arc<SystemUsers>,
    default_duration: Duration,
}

impl<S: ProcessService> ProcessTools<S> {
    pub fn new(
        service: Arc<S>,
        normalizer: Normalizer,
        system_users: SystemUsers,
        config: &Config,
    ) -> Self {
        Self {
            collector: SnapshotCollector::new(Arc::clone(&service), config.sampling.memory_settle()),
            normalizer,
            terminator: Terminator::new(
                service,
                config.termination.timeout(),
                config.termination.poll_interval(),
            ),
            system_users: Arc::new(system_users),
            default_duration: config.sampling.default_duration(),
        }
    }

    /// Wires the platform's memory probes, name source and system accounts.
    pub fn for_platform(service: Arc<S>, config: &Config) -> Self {
        let memory = MemoryResolver::detect();
        info!("Memory probes: {}", memory.labels().join(" -> "));
        let normalizer = Normalizer::new(Arc::new(memory), NameSource::detect());
        let system_users =
            SystemUsers::detect().with_extra(config.filter.extra_system_users.iter().cloned());
        Self::new(service, normalizer, system_users, config)
    }

    pub async fn list_processes(&self, params: ListProcessesParams) -> Result<Vec<ProcessRecord>> {
        info!("list_processes called {:?}", params);
        let options = ListOptions::try_from(params)?;
        self.list_with(&options).await
    }

    pub async fn list_with(&self, options: &ListOptions) -> Result<Vec<ProcessRecord>> {
        let window = options.duration.unwrap_or(self.default_duration);
        let snapshot = self.collector.collect(options.sort_by, window).await?;

        let normalizer = self.normalizer.clone();
        let records = tokio::task::spawn_blocking(move || {
            let mut sampler = snapshot.sampler;
            normalizer.normalize_all(&snapshot.handles, &mut sampler)
        })
        .await?;

        Ok(options.apply(records, &self.system_users))
    }

    pub async fn kill_process(&self, pid: u32) -> KillOutcome {
        info!("kill_process called pid={}", pid);
        self.terminator.terminate(pid).await
    }
}

#[async_trait::async_trait]
impl<S: ProcessService> RequestHandler for ProcessTools<S> {
    async fn handle(&self, id: Option<String>, request: Request) -> Response {
        match request {
            Request::Ping => Response::Pong,

            Request::ListProcesses { params } => match self.list_processes(params).await {
                Ok(records) => match serde_json::to_value(records) {
                    Ok(data) => Response::data(id, data),
                    Err(e) => Response::error(id, e),
                },
                Err(e) => {
                    warn!("list_processes failed: {}", e);
                    Response::error(id, e)
                }
            },

            Request::KillProcess { params } => {
                let outcome = self.kill_process(params.pid).await;
                Response::data(id, serde_json::Value::String(outcome.to_string()))
            }
        }
    }
}

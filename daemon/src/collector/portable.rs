use super::{ProcessError, ProcessHandle, ProcessService};
use std::path::PathBuf;
use std::time::Duration;
use sysinfo::{
    Pid, Process, ProcessRefreshKind, ProcessStatus, ProcessesToUpdate, Signal, System, UpdateKind,
    Users,
};

fn refresh_kind() -> ProcessRefreshKind {
    ProcessRefreshKind::nothing()
        .with_cpu()
        .with_memory()
        .with_user(UpdateKind::OnlyIfNotSet)
        .with_exe(UpdateKind::OnlyIfNotSet)
}

fn status_name(status: ProcessStatus) -> String {
    match status {
        ProcessStatus::Run => "running".to_string(),
        ProcessStatus::Sleep | ProcessStatus::Idle => "sleeping".to_string(),
        ProcessStatus::Stop => "stopped".to_string(),
        ProcessStatus::Zombie => "zombie".to_string(),
        ProcessStatus::Dead => "dead".to_string(),
        other => other.to_string().to_lowercase(),
    }
}

/// Refreshes a single pid into a table of its own.
fn refresh_one(pid: Pid) -> System {
    let mut system = System::new();
    system.refresh_processes_specifics(ProcessesToUpdate::Some(&[pid]), true, refresh_kind());
    system
}

/// Cross-platform service backed by `sysinfo`.
///
/// Every enumeration and every pid lookup refreshes a process table of its
/// own, so concurrent requests never share one. Handles carry the values read
/// by the refresh that produced them.
pub struct SysinfoService {
    users: Users,
}

impl SysinfoService {
    pub fn new() -> Self {
        Self { users: Users::new_with_refreshed_list() }
    }

    fn handle(&self, pid: Pid, process: &Process) -> SysinfoHandle {
        let username = process.user_id().map(|uid| {
            self.users
                .get_user_by_id(uid)
                .map(|user| user.name().to_string())
                .unwrap_or_else(|| uid.to_string())
        });
        SysinfoHandle {
            pid,
            start_time: process.start_time(),
            name: process.name().to_string_lossy().into_owned(),
            exe: process.exe().map(PathBuf::from),
            username,
            status: status_name(process.status()),
            cpu_time: Duration::from_millis(process.accumulated_cpu_time()),
            resident: process.memory(),
        }
    }
}

impl Default for SysinfoService {
    fn default() -> Self { Self::new() }
}

impl ProcessService for SysinfoService {
    type Handle = SysinfoHandle;

    fn processes(&self) -> Vec<SysinfoHandle> {
        let mut system = System::new();
        system.refresh_processes_specifics(ProcessesToUpdate::All, true, refresh_kind());
        system
            .processes()
            .iter()
            .map(|(pid, process)| self.handle(*pid, process))
            .collect()
    }

    fn process(&self, pid: u32) -> Result<SysinfoHandle, ProcessError> {
        let sys_pid = Pid::from_u32(pid);
        let system = refresh_one(sys_pid);
        system
            .process(sys_pid)
            .map(|process| self.handle(sys_pid, process))
            .ok_or(ProcessError::NoSuchProcess { pid })
    }
}

pub struct SysinfoHandle {
    pid: Pid,
    start_time: u64,
    name: String,
    exe: Option<PathBuf>,
    username: Option<String>,
    status: String,
    cpu_time: Duration,
    resident: u64,
}

impl SysinfoHandle {
    fn pid_u32(&self) -> u32 {
        self.pid.as_u32()
    }
}

impl ProcessHandle for SysinfoHandle {
    fn pid(&self) -> u32 {
        self.pid_u32()
    }

    fn name(&self) -> Result<String, ProcessError> {
        Ok(self.name.clone())
    }

    fn exe(&self) -> Result<PathBuf, ProcessError> {
        self.exe.clone().ok_or(ProcessError::AccessDenied { pid: self.pid_u32() })
    }

    fn username(&self) -> Result<String, ProcessError> {
        self.username
            .clone()
            .ok_or(ProcessError::AccessDenied { pid: self.pid_u32() })
    }

    fn status(&self) -> Result<String, ProcessError> {
        Ok(self.status.clone())
    }

    fn cpu_time(&self) -> Result<Duration, ProcessError> {
        Ok(self.cpu_time)
    }

    fn resident_size(&self) -> Result<u64, ProcessError> {
        Ok(self.resident)
    }

    fn kill(&self) -> Result<(), ProcessError> {
        let pid = self.pid_u32();
        let system = refresh_one(self.pid);
        let process = system
            .process(self.pid)
            .filter(|p| p.start_time() == self.start_time)
            .ok_or(ProcessError::NoSuchProcess { pid })?;
        let sent = process.kill_with(Signal::Kill).unwrap_or_else(|| process.kill());
        if sent {
            Ok(())
        } else {
            Err(ProcessError::AccessDenied { pid })
        }
    }

    fn is_running(&self) -> bool {
        let system = refresh_one(self.pid);
        system
            .process(self.pid)
            .is_some_and(|p| p.start_time() == self.start_time && p.status() != ProcessStatus::Zombie)
    }
}

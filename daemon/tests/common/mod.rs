//! Scriptable process service for deterministic tests.
#![allow(dead_code)]

use pidwatch_daemon::collector::{ProcessError, ProcessHandle, ProcessService};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub struct MockProcess {
    pub pid: u32,
    pub name: Option<String>,
    pub exe: Option<PathBuf>,
    pub username: String,
    pub status: String,
    pub rss: Option<u64>,
    pub uss: Option<u64>,
    pub cpu_ms: AtomicU64,
    pub alive: AtomicBool,
    /// Every read after enumeration fails as if the process just exited.
    pub vanished: AtomicBool,
    pub ignores_kill: bool,
    pub kill_error: Option<fn(u32) -> ProcessError>,
    pub kill_calls: AtomicUsize,
    /// Blocks the calling thread on every liveness check.
    pub check_delay: Option<Duration>,
}

impl MockProcess {
    pub fn new(pid: u32, name: &str, username: &str) -> Self {
        Self {
            pid,
            name: Some(name.to_string()),
            exe: None,
            username: username.to_string(),
            status: "sleeping".to_string(),
            rss: Some(4096),
            uss: None,
            cpu_ms: AtomicU64::new(0),
            alive: AtomicBool::new(true),
            vanished: AtomicBool::new(false),
            ignores_kill: false,
            kill_error: None,
            kill_calls: AtomicUsize::new(0),
            check_delay: None,
        }
    }

    pub fn with_status(mut self, status: &str) -> Self {
        self.status = status.to_string();
        self
    }

    pub fn with_rss(mut self, rss: Option<u64>) -> Self {
        self.rss = rss;
        self
    }

    pub fn with_uss(mut self, uss: Option<u64>) -> Self {
        self.uss = uss;
        self
    }

    pub fn with_exe(mut self, exe: &str) -> Self {
        self.exe = Some(PathBuf::from(exe));
        self
    }

    pub fn without_name(mut self) -> Self {
        self.name = None;
        self
    }

    pub fn ignoring_kill(mut self) -> Self {
        self.ignores_kill = true;
        self
    }

    pub fn with_slow_checks(mut self, delay: Duration) -> Self {
        self.check_delay = Some(delay);
        self
    }

    pub fn failing_kill(mut self, err: fn(u32) -> ProcessError) -> Self {
        self.kill_error = Some(err);
        self
    }

    pub fn vanish(&self) {
        self.vanished.store(true, Ordering::SeqCst);
    }

    pub fn add_cpu(&self, ms: u64) {
        self.cpu_ms.fetch_add(ms, Ordering::SeqCst);
    }

    pub fn kills(&self) -> usize {
        self.kill_calls.load(Ordering::SeqCst)
    }
}

#[derive(Clone)]
pub struct MockHandle(pub Arc<MockProcess>);

impl MockHandle {
    fn check(&self) -> Result<(), ProcessError> {
        if self.0.vanished.load(Ordering::SeqCst) || !self.0.alive.load(Ordering::SeqCst) {
            Err(ProcessError::NoSuchProcess { pid: self.0.pid })
        } else {
            Ok(())
        }
    }
}

impl ProcessHandle for MockHandle {
    fn pid(&self) -> u32 {
        self.0.pid
    }

    fn name(&self) -> Result<String, ProcessError> {
        self.check()?;
        self.0.name.clone().ok_or(ProcessError::AccessDenied { pid: self.0.pid })
    }

    fn exe(&self) -> Result<PathBuf, ProcessError> {
        self.check()?;
        self.0.exe.clone().ok_or(ProcessError::AccessDenied { pid: self.0.pid })
    }

    fn username(&self) -> Result<String, ProcessError> {
        self.check()?;
        Ok(self.0.username.clone())
    }

    fn status(&self) -> Result<String, ProcessError> {
        self.check()?;
        Ok(self.0.status.clone())
    }

    fn cpu_time(&self) -> Result<Duration, ProcessError> {
        self.check()?;
        Ok(Duration::from_millis(self.0.cpu_ms.load(Ordering::SeqCst)))
    }

    fn resident_size(&self) -> Result<u64, ProcessError> {
        self.check()?;
        self.0.rss.ok_or(ProcessError::AccessDenied { pid: self.0.pid })
    }

    fn unique_set_size(&self) -> Result<u64, ProcessError> {
        self.check()?;
        self.0.uss.ok_or(ProcessError::Unsupported)
    }

    fn kill(&self) -> Result<(), ProcessError> {
        self.0.kill_calls.fetch_add(1, Ordering::SeqCst);
        self.check()?;
        if let Some(err) = self.0.kill_error {
            return Err(err(self.0.pid));
        }
        if !self.0.ignores_kill {
            self.0.alive.store(false, Ordering::SeqCst);
        }
        Ok(())
    }

    fn is_running(&self) -> bool {
        if let Some(delay) = self.0.check_delay {
            std::thread::sleep(delay);
        }
        self.0.alive.load(Ordering::SeqCst)
    }
}

#[derive(Default)]
pub struct MockService {
    processes: Mutex<Vec<Arc<MockProcess>>>,
    enumerations: AtomicUsize,
}

impl MockService {
    pub fn new(processes: Vec<MockProcess>) -> Self {
        Self {
            processes: Mutex::new(processes.into_iter().map(Arc::new).collect()),
            enumerations: AtomicUsize::new(0),
        }
    }

    pub fn get(&self, pid: u32) -> Arc<MockProcess> {
        let processes = self.processes.lock().unwrap();
        let found = processes.iter().find(|p| p.pid == pid).unwrap();
        Arc::clone(found)
    }

    pub fn enumerations(&self) -> usize {
        self.enumerations.load(Ordering::SeqCst)
    }
}

impl ProcessService for MockService {
    type Handle = MockHandle;

    fn processes(&self) -> Vec<MockHandle> {
        self.enumerations.fetch_add(1, Ordering::SeqCst);
        self.processes
            .lock()
            .unwrap()
            .iter()
            .filter(|p| p.alive.load(Ordering::SeqCst))
            .map(|p| MockHandle(Arc::clone(p)))
            .collect()
    }

    fn process(&self, pid: u32) -> Result<MockHandle, ProcessError> {
        self.processes
            .lock()
            .unwrap()
            .iter()
            .find(|p| p.pid == pid && p.alive.load(Ordering::SeqCst))
            .map(|p| MockHandle(Arc::clone(p)))
            .ok_or(ProcessError::NoSuchProcess { pid })
    }
}

/// A fleet mixing system and user processes.
pub fn sample_fleet() -> Vec<MockProcess> {
    vec![
        MockProcess::new(1, "systemd", "root"),
        MockProcess::new(200, "Chrome Helper", "alice").with_rss(Some(300 << 20)),
        MockProcess::new(201, "chrome.exe", "alice").with_rss(Some(120 << 20)),
        MockProcess::new(202, "CHROME", "bob").with_rss(Some(80 << 20)).with_status("running"),
        MockProcess::new(300, "firefox", "bob").with_rss(Some(500 << 20)),
        MockProcess::new(400, "sshd", "root").with_rss(Some(10 << 20)),
    ]
}

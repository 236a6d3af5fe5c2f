use super::{ProcessError, ProcessHandle, ProcessService};
use std::ffi::CStr;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Kernel `comm` is truncated to this many bytes.
const COMM_LEN: usize = 15;

/// Fields of `/proc/<pid>/stat` the service cares about.
#[derive(Debug, Clone, PartialEq)]
struct StatLine {
    comm: String,
    state: char,
    utime: u64,
    stime: u64,
    start_ticks: u64,
    rss_pages: u64,
}

impl StatLine {
    /// `comm` may contain spaces and parentheses, so fields are located
    /// relative to the last `)`.
    fn parse(content: &str) -> Option<Self> {
        let open = content.find('(')?;
        let close = content.rfind(')')?;
        let comm = content.get(open + 1..close)?.to_string();
        let rest: Vec<&str> = content.get(close + 1..)?.split_whitespace().collect();
        if rest.len() < 22 {
            return None;
        }
        Some(Self {
            comm,
            state: rest[0].chars().next()?,
            utime: rest[11].parse().ok()?,
            stime: rest[12].parse().ok()?,
            start_ticks: rest[19].parse().ok()?,
            rss_pages: rest[21].parse().ok()?,
        })
    }
}

fn status_name(state: char) -> String {
    match state {
        'R' => "running",
        'S' => "sleeping",
        'D' => "disk-sleep",
        'T' => "stopped",
        't' => "tracing-stop",
        'Z' => "zombie",
        'X' | 'x' => "dead",
        'K' => "wake-kill",
        'W' => "waking",
        'I' => "idle",
        'P' => "parked",
        other => return other.to_string(),
    }
    .to_string()
}

/// Sums the private (unshared) fields of an smaps or smaps_rollup listing, in bytes.
fn private_bytes(content: &str) -> Option<u64> {
    let mut total_kb = 0u64;
    let mut seen = false;
    for line in content.lines() {
        let Some((key, value)) = line.split_once(':') else { continue };
        if matches!(key, "Private_Clean" | "Private_Dirty" | "Private_Hugetlb") {
            let kb: u64 = value.trim().trim_end_matches("kB").trim().parse().ok()?;
            total_kb += kb;
            seen = true;
        }
    }
    seen.then_some(total_kb * 1024)
}

/// Real uid from the `Uid:` line of `/proc/<pid>/status`.
fn real_uid(status: &str) -> Option<u32> {
    status
        .lines()
        .find_map(|line| line.strip_prefix("Uid:"))
        .and_then(|ids| ids.split_whitespace().next())
        .and_then(|uid| uid.parse().ok())
}

fn lookup_username(uid: u32) -> Option<String> {
    let mut buf = vec![0 as libc::c_char; 4096];
    let mut pwd: libc::passwd = unsafe { std::mem::zeroed() };
    let mut result: *mut libc::passwd = std::ptr::null_mut();
    let rc = unsafe {
        libc::getpwuid_r(uid, &mut pwd, buf.as_mut_ptr(), buf.len(), &mut result)
    };
    if rc != 0 || result.is_null() || pwd.pw_name.is_null() {
        return None;
    }
    let name = unsafe { CStr::from_ptr(pwd.pw_name) };
    Some(name.to_string_lossy().into_owned())
}

/// Reads processes from `/proc`.
pub struct ProcfsService {
    page_size: u64,
    clock_ticks: u64,
}

impl ProcfsService {
    pub fn new() -> Self {
        let page_size = unsafe { libc::sysconf(libc::_SC_PAGESIZE) as u64 };
        let clock_ticks = unsafe { libc::sysconf(libc::_SC_CLK_TCK) as u64 }.max(1);
        Self { page_size, clock_ticks }
    }

    fn open(&self, pid: u32) -> Result<ProcfsHandle, ProcessError> {
        let stat = read_stat(pid)?;
        Ok(ProcfsHandle {
            pid,
            start_ticks: stat.start_ticks,
            page_size: self.page_size,
            clock_ticks: self.clock_ticks,
        })
    }
}

impl Default for ProcfsService {
    fn default() -> Self { Self::new() }
}

impl ProcessService for ProcfsService {
    type Handle = ProcfsHandle;

    fn processes(&self) -> Vec<ProcfsHandle> {
        let mut handles = Vec::new();
        let entries = match fs::read_dir("/proc") {
            Ok(entries) => entries,
            Err(e) => {
                tracing::error!("Failed to read /proc: {}", e);
                return handles;
            }
        };
        for entry in entries.flatten() {
            let Some(pid) = entry.file_name().to_str().and_then(|n| n.parse::<u32>().ok()) else {
                continue;
            };
            match self.open(pid) {
                Ok(handle) => handles.push(handle),
                Err(e) => tracing::debug!("Skipping pid {}: {}", pid, e),
            }
        }
        handles
    }

    fn process(&self, pid: u32) -> Result<ProcfsHandle, ProcessError> {
        self.open(pid)
    }
}

fn proc_path(pid: u32) -> PathBuf {
    Path::new("/proc").join(pid.to_string())
}

fn read_proc_file(pid: u32, file: &str) -> Result<String, ProcessError> {
    fs::read_to_string(proc_path(pid).join(file)).map_err(|e| ProcessError::from_io(pid, e))
}

fn read_stat(pid: u32) -> Result<StatLine, ProcessError> {
    let content = read_proc_file(pid, "stat")?;
    StatLine::parse(&content).ok_or_else(|| ProcessError::Io {
        pid,
        source: io::Error::new(io::ErrorKind::InvalidData, "malformed /proc stat line"),
    })
}

/// Handle to a `/proc` entry, pinned to the process start time so a reused
/// pid reads as a vanished process.
#[derive(Debug, Clone)]
pub struct ProcfsHandle {
    pid: u32,
    start_ticks: u64,
    page_size: u64,
    clock_ticks: u64,
}

impl ProcfsHandle {
    fn stat(&self) -> Result<StatLine, ProcessError> {
        let stat = read_stat(self.pid)?;
        if stat.start_ticks != self.start_ticks {
            return Err(ProcessError::NoSuchProcess { pid: self.pid });
        }
        Ok(stat)
    }

    /// First command line argument's file name, used when `comm` was cut short.
    fn cmdline_name(&self, comm: &str) -> Option<String> {
        let cmdline = read_proc_file(self.pid, "cmdline").ok()?;
        let argv0 = cmdline.split('\0').next()?;
        let base = Path::new(argv0).file_name()?.to_str()?;
        base.starts_with(comm).then(|| base.to_string())
    }
}

impl ProcessHandle for ProcfsHandle {
    fn pid(&self) -> u32 {
        self.pid
    }

    fn name(&self) -> Result<String, ProcessError> {
        let comm = self.stat()?.comm;
        if comm.len() >= COMM_LEN {
            if let Some(full) = self.cmdline_name(&comm) {
                return Ok(full);
            }
        }
        Ok(comm)
    }

    fn exe(&self) -> Result<PathBuf, ProcessError> {
        fs::read_link(proc_path(self.pid).join("exe")).map_err(|e| ProcessError::from_io(self.pid, e))
    }

    fn username(&self) -> Result<String, ProcessError> {
        let status = read_proc_file(self.pid, "status")?;
        let uid = real_uid(&status).ok_or_else(|| ProcessError::Io {
            pid: self.pid,
            source: io::Error::new(io::ErrorKind::InvalidData, "no Uid line in /proc status"),
        })?;
        Ok(lookup_username(uid).unwrap_or_else(|| uid.to_string()))
    }

    fn status(&self) -> Result<String, ProcessError> {
        Ok(status_name(self.stat()?.state))
    }

    fn cpu_time(&self) -> Result<Duration, ProcessError> {
        let stat = self.stat()?;
        let ticks = stat.utime + stat.stime;
        Ok(Duration::from_secs_f64(ticks as f64 / self.clock_ticks as f64))
    }

    fn resident_size(&self) -> Result<u64, ProcessError> {
        Ok(self.stat()?.rss_pages * self.page_size)
    }

    fn unique_set_size(&self) -> Result<u64, ProcessError> {
        let content = match read_proc_file(self.pid, "smaps_rollup") {
            Ok(content) => content,
            Err(ProcessError::NoSuchProcess { .. }) if proc_path(self.pid).exists() => {
                read_proc_file(self.pid, "smaps")?
            }
            Err(e) => return Err(e),
        };
        private_bytes(&content).ok_or(ProcessError::Unsupported)
    }

    fn kill(&self) -> Result<(), ProcessError> {
        self.stat()?;
        let rc = unsafe { libc::kill(self.pid as libc::pid_t, libc::SIGKILL) };
        if rc == 0 {
            Ok(())
        } else {
            Err(ProcessError::from_io(self.pid, io::Error::last_os_error()))
        }
    }

    fn is_running(&self) -> bool {
        match self.stat() {
            Ok(stat) => !matches!(stat.state, 'Z' | 'X' | 'x'),
            Err(_) => false,
        }
    }
}

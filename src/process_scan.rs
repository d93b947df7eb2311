use super::Result;
use nix::errno::Errno;
use nix::sys::signal::{kill, Signal};
use nix::unistd::Pid;
use std::io;
use std::os::unix::ffi::OsStrExt;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// The kernel truncates `/proc/[pid]/comm` to this many bytes
const COMM_LEN: usize = 15;

/// A process found under `/proc`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessEntry {
    pub pid: Pid,
    pub comm: String,
    pub argv0: Option<PathBuf>,
}

impl ProcessEntry {
    fn read(proc_root: &Path, pid: i32) -> io::Result<Self> {
        let dir = proc_root.join(pid.to_string());
        let comm = std::fs::read_to_string(dir.join("comm"))?.trim_end().to_string();
        let cmdline = std::fs::read(dir.join("cmdline"))?;
        let argv0 = cmdline
            .split(|&b| b == 0)
            .next()
            .filter(|arg| !arg.is_empty())
            .map(|arg| PathBuf::from(std::ffi::OsStr::from_bytes(arg)));

        Ok(Self {
            pid: Pid::from_raw(pid),
            comm,
            argv0,
        })
    }

    /// True if `name` matches the comm (allowing for kernel truncation) or
    /// the file name of argv[0]
    pub fn matches(&self, name: &str) -> bool {
        let truncated = truncate_comm(name);
        if !truncated.is_empty() && self.comm == truncated {
            return true;
        }
        self.argv0
            .as_deref()
            .and_then(Path::file_name)
            .is_some_and(|file| file == name)
    }
}

fn truncate_comm(name: &str) -> &str {
    let mut end = name.len().min(COMM_LEN);
    while !name.is_char_boundary(end) {
        end -= 1;
    }
    &name[..end]
}

/// Lists processes whose name matches `name`, excluding the caller
pub fn find_processes_by_name(name: &str) -> Result<Vec<ProcessEntry>> {
    find_in(Path::new("/proc"), name)
}

fn find_in(proc_root: &Path, name: &str) -> Result<Vec<ProcessEntry>> {
    let own_pid = std::process::id() as i32;
    let mut matches = Vec::new();

    for entry in std::fs::read_dir(proc_root)? {
        let Ok(entry) = entry else { continue };
        let Some(pid) = entry.file_name().to_str().and_then(|s| s.parse::<i32>().ok()) else {
            continue;
        };
        if pid == own_pid {
            continue;
        }

        // Processes can vanish between read_dir and the reads below
        match ProcessEntry::read(proc_root, pid) {
            Ok(process) if process.matches(name) => matches.push(process),
            Ok(_) => {}
            Err(e) => debug!("skipping pid {}: {}", pid, e),
        }
    }

    matches.sort_by_key(|p| p.pid.as_raw());
    Ok(matches)
}

/// Sends SIGKILL to every process matching `name`.
///
/// Returns how many processes were signalled. Processes that exit before the
/// signal lands are not counted and are not an error.
pub fn kill_processes_by_name(name: &str) -> Result<usize> {
    let mut killed = 0;
    for process in find_processes_by_name(name)? {
        match kill(process.pid, Signal::SIGKILL) {
            Ok(()) => {
                info!("Killed stray {} process {}", name, process.pid);
                killed += 1;
            }
            Err(Errno::ESRCH) => {}
            Err(e) => warn!("Failed to kill {} ({}): {}", process.pid, name, e),
        }
    }
    Ok(killed)
}

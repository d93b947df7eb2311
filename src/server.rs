use super::Result;
use crate::config::HarnessConfig;
use crate::error::HarnessError;
use crate::ports;
use eyre::{eyre, WrapErr};
use nix::errno::Errno;
use nix::sys::signal::{kill, Signal};
use nix::unistd::Pid;
use std::ffi::OsString;
use std::net::SocketAddr;
use std::os::unix::process::CommandExt;
use std::path::PathBuf;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// How long to poll the child while a readiness probe runs
const EXIT_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// What to wait for after the server process has been spawned
#[derive(Debug, Clone, PartialEq)]
pub enum Readiness {
    /// Return as soon as the process exists
    Immediate,
    /// Sleep for a fixed time
    Delay(Duration),
    /// Poll until `addr` accepts TCP connections
    Listening { addr: SocketAddr, timeout: Duration },
}

/// Per-launch settings layered on top of [`HarnessConfig`]
#[derive(Debug, Clone)]
pub struct ServerOptions {
    /// Arguments appended after the configured base arguments
    pub args: Vec<OsString>,
    /// Working directory for the server process
    pub working_directory: Option<PathBuf>,
    /// Wait policy applied after spawning
    pub readiness: Readiness,
}

impl Default for ServerOptions {
    fn default() -> Self {
        Self {
            args: Vec::new(),
            working_directory: None,
            readiness: Readiness::Immediate,
        }
    }
}

impl ServerOptions {
    /// Server on the default port, paused for `startup_delay` after spawn
    pub fn default_server(config: &HarnessConfig) -> Self {
        Self {
            readiness: Readiness::Delay(config.startup_delay),
            ..Default::default()
        }
    }

    /// Server listening on `port`
    pub fn on_port(port: u16) -> Self {
        Self {
            args: vec!["-p".into(), port.to_string().into()],
            ..Default::default()
        }
    }

    /// Server reading `config_file`, resolved from the config directory
    pub fn with_config(config: &HarnessConfig, config_file: impl Into<OsString>) -> Self {
        Self {
            args: vec!["-config".into(), config_file.into()],
            working_directory: Some(config.config_dir.clone()),
            ..Default::default()
        }
    }

    /// Server with arbitrary extra arguments, run from the config directory
    pub fn with_args<I, S>(config: &HarnessConfig, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        Self {
            args: args.into_iter().map(Into::into).collect(),
            working_directory: Some(config.config_dir.clone()),
            ..Default::default()
        }
    }

    pub fn readiness(mut self, readiness: Readiness) -> Self {
        self.readiness = readiness;
        self
    }
}

/// A running server process.
///
/// The process is started in its own process group so that shutting it down
/// also takes out anything it forked. Dropping the value shuts it down.
#[derive(Debug)]
pub struct ServerProcess {
    child: Option<Child>,
    pid: Pid,
    args: Vec<OsString>,
    start_time: Instant,
    exit_status: Option<ExitStatus>,
}

impl ServerProcess {
    /// Spawns a server and waits according to `options.readiness`
    pub fn start(config: &HarnessConfig, options: ServerOptions) -> Result<Self> {
        let args = build_args(config, &options);
        info!("Starting server: {} {:?}", config.server_path.display(), args);

        let mut command = Command::new(&config.server_path);
        command.args(&args);
        command.process_group(0);
        config.environment.apply(&mut command);

        command.stdin(Stdio::null());
        if config.debug {
            command.stdout(Stdio::inherit());
            command.stderr(Stdio::inherit());
        } else {
            command.stdout(Stdio::null());
            command.stderr(Stdio::null());
        }

        if let Some(ref work_dir) = options.working_directory {
            command.current_dir(work_dir);
        }

        let child = command
            .spawn()
            .wrap_err_with(|| format!("failed to start {}", config.server_path.display()))?;
        let pid = Pid::from_raw(child.id().try_into()?);
        info!("Server started with PID: {}", pid);

        let mut server = Self {
            child: Some(child),
            pid,
            args,
            start_time: Instant::now(),
            exit_status: None,
        };

        if let Err(e) = server.await_readiness(&options.readiness) {
            server.shutdown();
            return Err(e);
        }

        Ok(server)
    }

    fn await_readiness(&mut self, readiness: &Readiness) -> Result<()> {
        match *readiness {
            Readiness::Immediate => Ok(()),
            Readiness::Delay(delay) => {
                debug!("Waiting {:?} for server {} to settle", delay, self.pid);
                std::thread::sleep(delay);
                Ok(())
            }
            Readiness::Listening { addr, timeout } => {
                let deadline = ports::deadline_after(timeout);
                loop {
                    if let Some(status) = self.try_wait()? {
                        return Err(HarnessError::ServerExited(status).into());
                    }
                    if ports::is_listening(addr) {
                        debug!("Server {} is listening on {}", self.pid, addr);
                        return Ok(());
                    }
                    if ports::past(deadline) {
                        return Err(HarnessError::NotListening { addr, timeout }.into());
                    }
                    std::thread::sleep(EXIT_POLL_INTERVAL);
                }
            }
        }
    }

    pub fn pid(&self) -> Pid {
        self.pid
    }

    /// Arguments the server was started with, after the executable
    pub fn args(&self) -> &[OsString] {
        &self.args
    }

    pub fn uptime(&self) -> Duration {
        self.start_time.elapsed()
    }

    pub fn exit_status(&self) -> Option<ExitStatus> {
        self.exit_status
    }

    /// Checks whether the server has exited, reaping it if so
    pub fn try_wait(&mut self) -> Result<Option<ExitStatus>> {
        let Some(ref mut child) = self.child else {
            return Ok(self.exit_status);
        };
        let status = child.try_wait()?;
        if let Some(status) = status {
            info!("Server {} exited with status: {:?}", self.pid, status);
            self.exit_status = Some(status);
            self.child = None;
        }
        Ok(status)
    }

    pub fn is_running(&mut self) -> bool {
        matches!(self.try_wait(), Ok(None))
    }

    /// Blocks until the server exits on its own
    pub fn wait(&mut self) -> Result<ExitStatus> {
        match self.child.take() {
            Some(mut child) => {
                let status = child.wait()?;
                info!("Server {} exited with status: {:?}", self.pid, status);
                self.exit_status = Some(status);
                Ok(status)
            }
            None => self
                .exit_status
                .ok_or_else(|| eyre!("server {} was never reaped", self.pid)),
        }
    }

    /// Kills the server and its process group.
    ///
    /// Failures are logged and otherwise ignored; calling this on a server
    /// that is already gone does nothing.
    pub fn shutdown(&mut self) {
        let Some(mut child) = self.child.take() else {
            return;
        };

        info!("Shutting down server {}", self.pid);
        if let Err(e) = kill_group(self.pid, Signal::SIGKILL) {
            warn!("Failed to kill process group {}: {}", self.pid, e);
            if let Err(e) = child.kill() {
                warn!("Failed to kill server {}: {}", self.pid, e);
            }
        }

        match child.wait() {
            Ok(status) => {
                debug!("Server {} reaped with status: {:?}", self.pid, status);
                self.exit_status = Some(status);
            }
            Err(e) => warn!("Failed to reap server {}: {}", self.pid, e),
        }
    }
}

impl Drop for ServerProcess {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn build_args(config: &HarnessConfig, options: &ServerOptions) -> Vec<OsString> {
    let mut args: Vec<OsString> = config.base_args.iter().map(OsString::from).collect();
    if config.debug {
        args.push("-DV".into());
    }
    args.extend(options.args.iter().cloned());
    args
}

/// Sends `signal` to every process in the group led by `pid`
fn kill_group(pid: Pid, signal: Signal) -> Result<()> {
    match kill(Pid::from_raw(-pid.as_raw()), signal) {
        Ok(()) | Err(Errno::ESRCH) => Ok(()),
        Err(e) => Err(e.into()),
    }
}

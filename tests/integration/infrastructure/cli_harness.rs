use anyhow::{Context, Result};
use nix::{sys::signal::Signal, unistd::Pid};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::time::{Duration, Instant};
use tempfile::TempDir;
use tokio::io::{AsyncBufReadExt, BufReader, Lines};
use tokio::process::{ChildStdout, Command};
use tokio::time::timeout;

/// Drives the `stan-harness` binary during integration tests
pub struct CliHarness {
    binary: PathBuf,
    temp_dir: TempDir,
    environment: HashMap<String, String>,
    cleanup_pids: Vec<Pid>,
}

impl CliHarness {
    pub fn new() -> Result<Self> {
        let temp_dir = TempDir::new().context("Failed to create temporary directory")?;

        Ok(Self {
            binary: PathBuf::from(env!("CARGO_BIN_EXE_stan-harness")),
            temp_dir,
            environment: HashMap::new(),
            cleanup_pids: Vec::new(),
        })
    }

    /// Set an environment variable for spawned processes
    pub fn set_environment(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.environment.insert(key.into(), value.into());
    }

    /// Scratch directory, used as the config directory by default
    pub fn temp_path(&self) -> &Path {
        self.temp_dir.path()
    }

    fn command(&self, args: &[&str]) -> Command {
        let mut cmd = Command::new(&self.binary);
        cmd.arg("--config-dir").arg(self.temp_path());
        cmd.args(args);
        cmd.env_remove("STAN_SERVER");
        cmd.env_remove("STAN_SERVER_DEBUG");
        for (key, value) in &self.environment {
            cmd.env(key, value);
        }
        cmd
    }

    /// Run a short-lived subcommand to completion and return its stdout
    pub async fn run_to_completion(&self, args: &[&str]) -> Result<(ExitStatus, String)> {
        let output = timeout(Duration::from_secs(10), self.command(args).output())
            .await
            .context("stan-harness did not finish in time")?
            .context("Failed to run stan-harness")?;
        Ok((output.status, String::from_utf8(output.stdout)?))
    }

    /// Spawn a long-running subcommand such as `run`
    pub async fn spawn(&mut self, args: &[&str]) -> Result<CliProcess> {
        let mut cmd = self.command(args);
        cmd.stdout(Stdio::piped());
        cmd.kill_on_drop(true);

        let start_time = Instant::now();
        let mut child = cmd.spawn().context("Failed to spawn stan-harness process")?;

        let pid = Pid::from_raw(
            child
                .id()
                .ok_or_else(|| anyhow::anyhow!("Failed to get child PID"))? as i32,
        );
        self.cleanup_pids.push(pid);

        let stdout = child.stdout.take().context("stdout was not piped")?;

        Ok(CliProcess {
            pid,
            start_time,
            stdout: BufReader::new(stdout).lines(),
            child,
        })
    }
}

impl Drop for CliHarness {
    fn drop(&mut self) {
        for pid in &self.cleanup_pids {
            let _ = nix::sys::signal::kill(*pid, Signal::SIGKILL);
        }
    }
}

/// A running `stan-harness` process
pub struct CliProcess {
    pub pid: Pid,
    pub start_time: Instant,
    stdout: Lines<BufReader<ChildStdout>>,
    child: tokio::process::Child,
}

impl CliProcess {
    /// Read the server PID the `run` subcommand prints once the server is up
    pub async fn server_pid(&mut self, duration: Duration) -> Result<Pid> {
        let line = timeout(duration, self.stdout.next_line())
            .await
            .context("Timed out waiting for server PID")??
            .context("stan-harness closed stdout before printing a PID")?;
        let pid: i32 = line.trim().parse().context("PID line was not a number")?;
        Ok(Pid::from_raw(pid))
    }

    pub fn signal(&self, signal: Signal) -> Result<()> {
        nix::sys::signal::kill(self.pid, signal).context("Failed to signal stan-harness")
    }

    /// Wait for process exit with a timeout
    pub async fn wait_for_exit_timeout(&mut self, duration: Duration) -> Result<Option<ExitStatus>> {
        match timeout(duration, self.child.wait()).await {
            Ok(result) => Ok(Some(result.context("Process wait failed")?)),
            Err(_) => Ok(None),
        }
    }

    pub fn runtime(&self) -> Duration {
        self.start_time.elapsed()
    }

    pub fn is_running(&mut self) -> bool {
        self.child.try_wait().unwrap_or(None).is_none()
    }
}

use super::Result;
use crate::config::HarnessConfig;
use crate::process_scan;
use crate::server::{ServerOptions, ServerProcess};
use once_cell::sync::Lazy;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Config file the authentication server is started with
pub const AUTH_CONFIG: &str = "auth.conf";

/// The shared default server. One per test binary, whatever the number of
/// `TestUtilities` values.
static DEFAULT_SERVER: Lazy<Mutex<Option<ServerProcess>>> = Lazy::new(|| Mutex::new(None));

fn default_server_slot() -> MutexGuard<'static, Option<ServerProcess>> {
    DEFAULT_SERVER
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Server lifecycle helpers for client tests
#[derive(Debug)]
pub struct TestUtilities {
    config: HarnessConfig,
    auth_server: Option<ServerProcess>,
}

impl Default for TestUtilities {
    fn default() -> Self {
        Self::new(HarnessConfig::from_env())
    }
}

impl TestUtilities {
    pub fn new(config: HarnessConfig) -> Self {
        Self {
            config,
            auth_server: None,
        }
    }

    pub fn config(&self) -> &HarnessConfig {
        &self.config
    }

    pub fn config_dir(&self) -> &Path {
        self.config.config_dir()
    }

    pub fn certificate_path(&self, certificate_name: &str) -> PathBuf {
        self.config.certificate_path(certificate_name)
    }

    /// Starts the shared default server unless it is already up
    pub fn start_default_server(&self) -> Result<()> {
        let mut slot = default_server_slot();
        if slot.is_none() {
            let server =
                ServerProcess::start(&self.config, ServerOptions::default_server(&self.config))?;
            info!("Default server running as {}", server.pid());
            *slot = Some(server);
        } else {
            debug!("Default server already running");
        }
        Ok(())
    }

    /// Shuts the shared default server down; a no-op when none is running
    pub fn stop_default_server(&self) {
        let mut slot = default_server_slot();
        if let Some(mut server) = slot.take() {
            server.shutdown();
            info!("Default server stopped");
        }
    }

    pub fn default_server_running(&self) -> bool {
        default_server_slot()
            .as_mut()
            .is_some_and(ServerProcess::is_running)
    }

    pub fn default_server_pid(&self) -> Option<nix::unistd::Pid> {
        default_server_slot().as_ref().map(ServerProcess::pid)
    }

    /// Stops the default server, waits `delay`, and starts it again
    pub fn bounce_default_server(&self, delay: Duration) -> Result<()> {
        self.stop_default_server();
        std::thread::sleep(delay);
        self.start_default_server()
    }

    /// Starts a server configured from `auth.conf`, replacing any earlier one
    pub fn start_auth_server(&mut self) -> Result<()> {
        self.stop_auth_server();
        let options = ServerOptions::with_config(&self.config, AUTH_CONFIG);
        self.auth_server = Some(ServerProcess::start(&self.config, options)?);
        Ok(())
    }

    pub fn stop_auth_server(&mut self) {
        if let Some(mut server) = self.auth_server.take() {
            server.shutdown();
        }
    }

    pub fn auth_server(&self) -> Option<&ServerProcess> {
        self.auth_server.as_ref()
    }

    pub fn create_server_on_port(&self, port: u16) -> Result<ServerProcess> {
        ServerProcess::start(&self.config, ServerOptions::on_port(port))
    }

    pub fn create_server_with_config(&self, config_file: impl Into<OsString>) -> Result<ServerProcess> {
        ServerProcess::start(&self.config, ServerOptions::with_config(&self.config, config_file))
    }

    pub fn create_server_with_args<I, S>(&self, args: I) -> Result<ServerProcess>
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        ServerProcess::start(&self.config, ServerOptions::with_args(&self.config, args))
    }

    /// Kills any server processes left over from earlier runs.
    ///
    /// Scan failures are logged, never returned; this runs from test setup
    /// where a half-readable `/proc` should not fail the suite.
    pub fn cleanup_existing_servers(&self) -> usize {
        let name = self.config.process_name();
        match process_scan::kill_processes_by_name(&name) {
            Ok(count) => count,
            Err(e) => {
                warn!("Failed to clean up {} processes: {}", name, e);
                0
            }
        }
    }
}

impl Drop for TestUtilities {
    fn drop(&mut self) {
        self.stop_auth_server();
    }
}

use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::environment::Environment;

/// Server executable used when `STAN_SERVER` is not set
pub const DEFAULT_SERVER: &str = "nats-streaming-server";

/// Pause after starting the shared default server
pub const DEFAULT_STARTUP_DELAY: Duration = Duration::from_millis(500);

pub const SERVER_ENV: &str = "STAN_SERVER";
pub const CONFIG_DIR_ENV: &str = "STAN_TEST_CONFIG_DIR";
pub const DEBUG_ENV: &str = "STAN_SERVER_DEBUG";

/// Configuration shared by every server the harness launches
#[derive(Debug, Clone)]
pub struct HarnessConfig {
    /// Server executable (looked up on `PATH` when not absolute)
    pub server_path: PathBuf,
    /// Arguments placed before any per-server arguments
    pub base_args: Vec<String>,
    /// Directory holding server config files and the `certs/` folder
    pub config_dir: PathBuf,
    /// Run servers with `-DV` and let their output through
    pub debug: bool,
    /// Pause after starting the default server
    pub startup_delay: Duration,
    /// Name the stray-process sweep looks for; derived from `server_path` when unset
    pub process_name: Option<String>,
    /// Extra environment variables for server processes
    pub environment: Environment,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            server_path: PathBuf::from(DEFAULT_SERVER),
            base_args: Vec::new(),
            config_dir: default_config_dir(),
            debug: false,
            startup_delay: DEFAULT_STARTUP_DELAY,
            process_name: None,
            environment: Environment::new(),
        }
    }
}

impl HarnessConfig {
    /// Builds the configuration from defaults and `STAN_*` environment variables
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`HarnessConfig::from_env`] but with an injectable variable source
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(server) = lookup(SERVER_ENV).filter(|s| !s.is_empty()) {
            config.server_path = PathBuf::from(server);
        }
        if let Some(dir) = lookup(CONFIG_DIR_ENV).filter(|s| !s.is_empty()) {
            config.config_dir = PathBuf::from(dir);
        }
        if let Some(flag) = lookup(DEBUG_ENV) {
            config.debug = parse_flag(&flag);
        }

        config
    }

    pub fn config_dir(&self) -> &Path {
        &self.config_dir
    }

    /// Full path of a certificate kept under the config directory
    pub fn certificate_path(&self, certificate_name: &str) -> PathBuf {
        self.config_dir.join("certs").join(certificate_name)
    }

    /// Process name used when sweeping for stray servers
    pub fn process_name(&self) -> String {
        if let Some(ref name) = self.process_name {
            return name.clone();
        }
        self.server_path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| DEFAULT_SERVER.to_string())
    }
}

fn default_config_dir() -> PathBuf {
    match std::env::var_os("CARGO_MANIFEST_DIR") {
        Some(dir) => PathBuf::from(dir).join("tests").join("config"),
        None => PathBuf::from("tests").join("config"),
    }
}

fn parse_flag(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

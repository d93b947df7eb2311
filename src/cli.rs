use clap::{Parser, Subcommand};
use std::ffi::OsString;
use std::net::{Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

use stan_harness::{HarnessConfig, Readiness, ServerOptions};

/// Start, stop and clean up streaming servers for client test runs
#[derive(Parser)]
#[command(name = "stan-harness")]
#[command(about = "Start, stop and clean up streaming servers for client test runs")]
#[command(version)]
pub struct Cli {
    /// Server executable (overrides STAN_SERVER)
    #[arg(long, global = true)]
    pub server: Option<PathBuf>,

    /// Directory holding server config files (overrides STAN_TEST_CONFIG_DIR)
    #[arg(long, global = true)]
    pub config_dir: Option<PathBuf>,

    /// Run the server with -DV and show its output
    #[arg(long, global = true)]
    pub debug: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Start a server and keep it running until interrupted
    Run {
        /// Port to listen on
        #[arg(long, conflicts_with_all = ["config", "args"])]
        port: Option<u16>,

        /// Config file, relative to the config directory
        #[arg(long, conflicts_with = "args")]
        config: Option<OsString>,

        /// Wait until the port accepts connections before reporting ready (ms)
        #[arg(long, requires = "port")]
        ready_timeout_ms: Option<u64>,

        /// Extra arguments passed to the server
        #[arg(last = true)]
        args: Vec<OsString>,
    },

    /// Kill stray server processes left by earlier runs
    Cleanup {
        /// Process name to look for (default: server executable name)
        #[arg(long)]
        name: Option<String>,
    },

    /// Print the full path of a certificate in the config directory
    CertPath {
        /// Certificate file name
        name: String,
    },
}

impl Cli {
    /// Resolves the harness configuration: flags, then env, then defaults
    pub fn harness_config(&self) -> HarnessConfig {
        let mut config = HarnessConfig::from_env();
        if let Some(ref server) = self.server {
            config.server_path = server.clone();
        }
        if let Some(ref dir) = self.config_dir {
            config.config_dir = dir.clone();
        }
        if self.debug {
            config.debug = true;
        }
        if let Command::Cleanup { name: Some(ref name) } = self.command {
            config.process_name = Some(name.clone());
        }
        config
    }
}

/// Builds launch options for the `run` subcommand
pub fn run_options(
    config: &HarnessConfig,
    port: Option<u16>,
    config_file: Option<OsString>,
    ready_timeout_ms: Option<u64>,
    args: Vec<OsString>,
) -> ServerOptions {
    if let Some(port) = port {
        let options = ServerOptions::on_port(port);
        return match ready_timeout_ms {
            Some(ms) => options.readiness(Readiness::Listening {
                addr: SocketAddr::from((Ipv4Addr::LOCALHOST, port)),
                timeout: Duration::from_millis(ms),
            }),
            None => options,
        };
    }
    if let Some(file) = config_file {
        return ServerOptions::with_config(config, file);
    }
    if !args.is_empty() {
        return ServerOptions::with_args(config, args);
    }
    ServerOptions::default_server(config)
}

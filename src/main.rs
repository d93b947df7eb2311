type Result<T> = color_eyre::eyre::Result<T>;

mod cli;
mod signals;

use clap::Parser;
use std::time::Duration;
use tokio::select;
use tokio::time::interval;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use cli::{run_options, Cli, Command};
use signals::ShutdownSignals;
use stan_harness::{process_scan, HarnessConfig, ServerOptions, ServerProcess};

/// How often the run loop checks whether the server is still alive
const EXIT_POLL_INTERVAL: Duration = Duration::from_millis(200);

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let config = cli.harness_config();

    match cli.command {
        Command::Run {
            port,
            config: config_file,
            ready_timeout_ms,
            args,
        } => {
            let options = run_options(&config, port, config_file, ready_timeout_ms, args);
            run_server(config, options).await
        }
        Command::Cleanup { .. } => {
            let name = config.process_name();
            let killed = process_scan::kill_processes_by_name(&name)?;
            info!("killed {} {} process(es)", killed, name);
            println!("{}", killed);
            Ok(())
        }
        Command::CertPath { name } => {
            println!("{}", config.certificate_path(&name).display());
            Ok(())
        }
    }
}

/// Starts one server and keeps it up until a termination signal or its own exit
async fn run_server(config: HarnessConfig, options: ServerOptions) -> Result<()> {
    // Install handlers before the server exists so an early signal is not lost
    let mut shutdown = ShutdownSignals::new()?;

    let mut server = tokio::task::spawn_blocking(move || ServerProcess::start(&config, options)).await??;
    println!("{}", server.pid());
    info!("server {} running", server.pid());

    let mut exit_poll = interval(EXIT_POLL_INTERVAL);
    loop {
        select! {
            signal = shutdown.recv() => {
                info!("received {}, stopping server", signal);
                tokio::task::spawn_blocking(move || server.shutdown()).await?;
                return Ok(());
            }

            _ = exit_poll.tick() => {
                if let Some(status) = server.try_wait()? {
                    warn!("server exited on its own: {:?}", status);
                    return Err(eyre::eyre!("server exited with {}", status));
                }
            }
        }
    }
}

use crate::integration::infrastructure::{assert_process_alive, assert_process_gone, CliHarness};
use anyhow::Result;
use nix::sys::signal::Signal;
use std::os::unix::process::CommandExt;
use std::time::Duration;

/// `run` keeps the server up until SIGTERM and takes it down on exit
#[tokio::test]
async fn test_run_stops_server_on_sigterm() -> Result<()> {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();

    let mut harness = CliHarness::new()?;
    // `sleep` stands in for the server; trailing args become `sleep 30`
    let mut process = harness.spawn(&["--server", "sleep", "run", "--", "30"]).await?;

    let server_pid = process.server_pid(Duration::from_secs(5)).await?;
    assert!(process.is_running(), "stan-harness should keep running with its server");
    assert_process_alive(server_pid, "server");

    process.signal(Signal::SIGTERM)?;
    let exit_status = process.wait_for_exit_timeout(Duration::from_secs(5)).await?;

    let status = exit_status.expect("stan-harness did not exit after SIGTERM");
    assert!(status.success(), "clean shutdown should exit 0, got {:?}", status);
    assert_process_gone(server_pid, Duration::from_secs(2), "server");
    Ok(())
}

/// SIGINT behaves like Ctrl-C in a terminal session
#[tokio::test]
async fn test_run_stops_server_on_sigint() -> Result<()> {
    let mut harness = CliHarness::new()?;
    let mut process = harness.spawn(&["--server", "sleep", "run", "--", "30"]).await?;
    let server_pid = process.server_pid(Duration::from_secs(5)).await?;

    process.signal(Signal::SIGINT)?;
    let exit_status = process.wait_for_exit_timeout(Duration::from_secs(5)).await?;

    assert!(exit_status.is_some_and(|s| s.success()));
    assert_process_gone(server_pid, Duration::from_secs(2), "server");
    Ok(())
}

/// A server that dies on its own makes `run` fail
#[tokio::test]
async fn test_run_reports_server_exit() -> Result<()> {
    let mut harness = CliHarness::new()?;
    let mut process = harness.spawn(&["--server", "sleep", "run", "--", "0.2"]).await?;
    process.server_pid(Duration::from_secs(5)).await?;

    let exit_status = process.wait_for_exit_timeout(Duration::from_secs(5)).await?;
    let status = exit_status.expect("stan-harness should exit when its server does");
    assert!(!status.success());
    Ok(())
}

#[tokio::test]
async fn test_run_fails_for_missing_server() -> Result<()> {
    let harness = CliHarness::new()?;
    let (status, stdout) = harness
        .run_to_completion(&["--server", "/nonexistent/stan-server", "run"])
        .await?;

    assert!(!status.success());
    assert!(stdout.is_empty());
    Ok(())
}

#[tokio::test]
async fn test_cleanup_kills_stray_processes() -> Result<()> {
    let name = format!("stan-cli-stray-{}", std::process::id());
    let mut stray = std::process::Command::new("sleep").arg0(&name).arg("30").spawn()?;
    tokio::time::sleep(Duration::from_millis(100)).await;

    let harness = CliHarness::new()?;
    let (status, stdout) = harness.run_to_completion(&["cleanup", "--name", &name]).await?;

    assert!(status.success());
    assert_eq!(stdout.trim(), "1");
    assert!(!stray.wait()?.success());
    Ok(())
}

#[tokio::test]
async fn test_cert_path_uses_config_dir() -> Result<()> {
    let harness = CliHarness::new()?;
    let (status, stdout) = harness.run_to_completion(&["cert-path", "client-cert.pem"]).await?;

    assert!(status.success());
    assert_eq!(
        stdout.trim(),
        harness.temp_path().join("certs").join("client-cert.pem").display().to_string()
    );
    Ok(())
}

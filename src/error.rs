use std::net::SocketAddr;
use std::process::ExitStatus;
use std::time::Duration;
use thiserror::Error;

/// Failures callers of the harness may want to match on.
///
/// Everything else is reported through `eyre::Report`; these variants travel
/// inside a report and can be recovered with `downcast_ref`.
#[derive(Debug, Error)]
pub enum HarnessError {
    /// A [`Condition`](crate::Condition) was not notified in time
    #[error("condition was not notified within {0:?}")]
    ConditionTimeout(Duration),

    /// The server process exited while we were waiting for it to come up
    #[error("server exited before becoming ready: {0}")]
    ServerExited(ExitStatus),

    /// The server never accepted connections on its address
    #[error("server did not start listening on {addr} within {timeout:?}")]
    NotListening { addr: SocketAddr, timeout: Duration },
}

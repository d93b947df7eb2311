//! Test-support harness for messaging client test suites.
//!
//! Starts and stops an external streaming server under the configurations
//! client tests need, and provides the small synchronization and assertion
//! helpers those tests lean on.

pub type Result<T> = color_eyre::eyre::Result<T>;

pub mod assertions;
pub mod condition;
pub mod config;
pub mod environment;
pub mod error;
pub mod ports;
pub mod process_scan;
pub mod server;
pub mod utilities;

pub use assertions::{expect_error, expect_panic};
pub use condition::Condition;
pub use config::HarnessConfig;
pub use environment::Environment;
pub use error::HarnessError;
pub use server::{Readiness, ServerOptions, ServerProcess};
pub use utilities::TestUtilities;

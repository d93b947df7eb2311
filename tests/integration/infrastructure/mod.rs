pub mod cli_harness;

pub use cli_harness::{CliHarness, CliProcess};
pub use fake_server::FakeServer;
pub use process_assertions::*;

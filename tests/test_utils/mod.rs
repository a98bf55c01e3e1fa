//! Test Utilities and Mocks
//!
//! Scripted shell transports and table fixtures shared by the test suites.
//! Each suite pulls this in with `#[path]`, so not every helper is used
//! everywhere.

#![allow(dead_code)]
#![allow(unused_imports)]

pub mod mock_shell;

// Re-exports for convenience
pub use fixtures::{
    catalog_from_csv, fast_orchestrator, read_artifact, write_table, LOGIN_HEADER,
};
pub use mock_shell::{HostBehaviour, MockConnector};

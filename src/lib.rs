//! FleetShell - batch scripts and interactive SSH execution for network devices
//!
//! This library turns a device table (one row per device or per slice of a
//! device's commands) into per-device command scripts, and runs those
//! commands over interactive SSH shells, capturing every command's output
//! into a per-device transcript.
//!
//! ## Features
//!
//! - **Device Catalog:** Tables with localized or English headers, devices
//!   spanning several rows
//! - **Script Compilation:** Deterministic `{device}_cmd.txt` artifacts
//! - **Interactive Sessions:** Password-authenticated SSH shells with a PTY
//! - **Pluggable Capture:** Fixed delay, idle timeout or prompt matching
//! - **Host Key Policies:** Accept-all, pinned fingerprints, known_hosts
//! - **Failure Isolation:** One device failing never stops the batch
//!
//! ## Module Organization
//!
//! - [`catalog`] - Tabular sources and the device catalog
//! - [`script`] - Script compilation
//! - [`session`] - Shell sessions, capture strategies, SSH transport
//! - [`orchestrator`] - Batch execution across devices
//! - [`task`] - Background batches with cancel and progress
//! - [`sink`] - Script and result artifact storage
//! - [`events`] - Progress events and reporters
//! - [`config`] - Configuration loading and validation
//! - [`models`] - Data structures (DeviceRecord, CommandOutput, outcomes)
//! - [`mod@error`] - Error types and Result aliases
//!
//! ## Quick Start
//!
//! ```no_run
//! use fleetshell::catalog::{CsvTableSource, DeviceCatalog};
//! use fleetshell::events::TracingReporter;
//! use fleetshell::script::ScriptCompiler;
//! use fleetshell::sink::{ArtifactLayout, ArtifactStore};
//! use fleetshell::Config;
//!
//! # async fn run() -> fleetshell::Result<()> {
//! let config = Config::default();
//! let source = CsvTableSource::new("devices.csv");
//! let catalog = DeviceCatalog::load(&source, &config.columns)?;
//!
//! let store = ArtifactStore::new("out", ArtifactLayout::from_config(&config));
//! let compiler = ScriptCompiler::new(config.script.delimiter.clone());
//! let summary = compiler.compile_all(&catalog, &store, &TracingReporter).await;
//! println!("{} scripts written", summary.written.len());
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! Loading and compiling are synchronous transformations of the table.
//! Execution is async on tokio: each device gets its own session, commands
//! are strictly sequential within a session, and devices run one at a time
//! unless `execution.concurrency` is raised. Progress flows out through a
//! [`events::ProgressReporter`], which may be a channel drained by a front
//! end while the batch runs as a [`task::BatchTask`].

pub mod catalog;
pub mod config;
pub mod error;
pub mod events;
pub mod models;
pub mod orchestrator;
pub mod script;
pub mod security_audit;
pub mod session;
pub mod sink;
pub mod task;

use std::path::Path;
use tracing::{info, warn};

// Re-exports for core functionality
pub use catalog::DeviceCatalog;
pub use config::Config;
pub use error::{Error, ErrorKind, Result};
pub use orchestrator::ExecutionOrchestrator;
pub use script::ScriptCompiler;
pub use session::ShellSession;
pub use task::BatchTask;

// Convenience re-exports for common types
pub use config::loader::ConfigLoader;
pub use models::{DeviceOutcome, ExecutionSummary};

/// The current version of FleetShell from Cargo.toml
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// The application name from Cargo.toml
pub const NAME: &str = env!("CARGO_PKG_NAME");

/// The application description from Cargo.toml
pub const DESCRIPTION: &str = env!("CARGO_PKG_DESCRIPTION");

/// Load configuration
///
/// An explicit `path` must load and validate. Without one, the search
/// paths are tried and defaults are used when nothing is found or the
/// file found is unusable.
///
/// # Examples
///
/// ```no_run
/// let config = fleetshell::load_config(None).unwrap();
/// assert_eq!(config.script.delimiter, "#");
/// ```
pub fn load_config(path: Option<&Path>) -> Result<Config> {
    info!("Initializing {} v{}", NAME, VERSION);

    if let Some(path) = path {
        if !path.exists() {
            return Err(Error::ConfigLoadFailed {
                path: path.to_path_buf(),
                reason: "Configuration file does not exist".to_string(),
            });
        }
        let config = ConfigLoader::load_from(Some(path))?;
        info!("Configuration loaded from {}", path.display());
        return Ok(config);
    }

    match ConfigLoader::load() {
        Ok(config) => Ok(config),
        Err(e) => {
            warn!("Failed to load configuration: {}. Using defaults", e);
            Ok(Config::default())
        }
    }
}

/// Human-readable explanation of a startup error, with hints
pub fn handle_startup_error(error: &Error) -> String {
    match error {
        Error::ConfigLoadFailed { path, reason } => format!(
            "Configuration Error: Failed to load config from '{}': {}\n\nTry:\n• Check the file path\n• Ensure file permissions are correct",
            path.display(),
            reason
        ),
        Error::ConfigParseFailed { format, reason } => format!(
            "Configuration Error: Failed to parse {} config: {}\n\nTry:\n• Check configuration file syntax\n• Ensure file is valid {}",
            format, reason, format
        ),
        Error::ConfigValidationFailed { field, reason } => format!(
            "Configuration Error: Validation failed for '{}': {}",
            field, reason
        ),
        Error::MissingColumn { .. } | Error::TableReadFailed { .. } => format!(
            "Device Table Error: {}\n\nTry:\n• Check the header row of the table\n• Add column aliases under [columns] in the configuration",
            error
        ),
        Error::LoginColumnsMissing { .. } => format!(
            "Device Table Error: {}\n\nScripts can still be compiled with `fleetshell compile`",
            error
        ),
        _ => format!("Error: {}", error),
    }
}

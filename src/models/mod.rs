//! Core data models for fleetshell
//!
//! This module contains the data structures that flow between the
//! catalog, the script compiler and the execution engine: devices and
//! their row fragments, command blocks, captured output and batch
//! outcomes.

pub mod command_block;
pub mod command_output;
pub mod device;
pub mod outcome;

// Re-exports for convenience
pub use command_block::{CommandBlock, ScriptArtifact};
pub use command_output::{decode_output, CommandOutput, DecodedOutput};
pub use device::{Credentials, DeviceRecord, RowFragment};
pub use outcome::{CompileSummary, DeviceOutcome, DeviceReport, ExecutionSummary};

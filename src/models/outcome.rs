//! Batch Outcome Model
//!
//! Per-device results of an execution batch and their aggregate.

use serde::Serialize;
use std::fmt;
use std::path::PathBuf;

/// How a single device's execution ended
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum DeviceOutcome {
    /// Every sendable command was sent and captured
    Completed { commands: usize },
    /// Some commands were captured before the session failed
    Partial { completed: usize, error: String },
    /// The session could not be opened
    ConnectFailed { error: String },
    /// The device was never attempted
    Skipped { reason: String },
    /// Cancellation stopped the device
    Cancelled { completed: usize },
    /// The result artifact could not be written
    WriteFailed { completed: usize, error: String },
}

impl DeviceOutcome {
    /// Outcome counts as a full success
    pub fn is_success(&self) -> bool {
        matches!(self, DeviceOutcome::Completed { .. })
    }

    /// Number of command/output pairs that reached the result artifact
    pub fn completed_commands(&self) -> usize {
        match self {
            DeviceOutcome::Completed { commands } => *commands,
            DeviceOutcome::Partial { completed, .. }
            | DeviceOutcome::Cancelled { completed }
            | DeviceOutcome::WriteFailed { completed, .. } => *completed,
            DeviceOutcome::ConnectFailed { .. } | DeviceOutcome::Skipped { .. } => 0,
        }
    }
}

impl fmt::Display for DeviceOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeviceOutcome::Completed { commands } => write!(f, "completed {} commands", commands),
            DeviceOutcome::Partial { completed, error } => {
                write!(f, "stopped after {} commands: {}", completed, error)
            }
            DeviceOutcome::ConnectFailed { error } => write!(f, "connect failed: {}", error),
            DeviceOutcome::Skipped { reason } => write!(f, "skipped: {}", reason),
            DeviceOutcome::Cancelled { completed } => {
                write!(f, "cancelled after {} commands", completed)
            }
            DeviceOutcome::WriteFailed { completed, error } => {
                write!(f, "result write failed after {} commands: {}", completed, error)
            }
        }
    }
}

/// Outcome of one device within a batch
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeviceReport {
    /// Device name
    pub device: String,
    /// How it ended
    pub outcome: DeviceOutcome,
}

/// Aggregate outcome of an execution batch, in catalog order
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ExecutionSummary {
    /// One entry per device
    pub devices: Vec<DeviceReport>,
}

impl ExecutionSummary {
    /// Number of devices that completed every command
    pub fn succeeded(&self) -> usize {
        self.devices.iter().filter(|r| r.outcome.is_success()).count()
    }

    /// Number of devices that did not fully complete
    pub fn failed(&self) -> usize {
        self.devices.len() - self.succeeded()
    }

    /// Look up a device's outcome
    pub fn outcome(&self, device: &str) -> Option<&DeviceOutcome> {
        self.devices
            .iter()
            .find(|r| r.device == device)
            .map(|r| &r.outcome)
    }
}

/// Outcome of writing script artifacts
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CompileSummary {
    /// Scripts written, with their locations
    pub written: Vec<(String, PathBuf)>,
    /// Devices whose script could not be written, with the reason
    pub failed: Vec<(String, String)>,
}

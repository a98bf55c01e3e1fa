//! Progress Events
//!
//! Lifecycle notifications emitted while loading, compiling and executing.
//! Front ends consume them through a [`ProgressReporter`]; [`EventLog`]
//! renders each one as a timestamped, human-readable line.
//!
//! Reporters must be `Send + Sync`: with `concurrency > 1` several device
//! iterations notify at the same time.

use chrono::{DateTime, Local};
use std::path::PathBuf;
use std::sync::Mutex;
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::models::DeviceOutcome;

/// Something notable happened
#[derive(Debug, Clone, PartialEq)]
pub enum ProgressEvent {
    /// Started reading a table
    LoadStarted { source: String },
    /// Table read and catalog built
    LoadFinished { devices: usize, executable: bool },
    /// The table cannot be executed, only compiled
    ExecutionUnavailable { missing: Vec<String> },
    /// A script artifact was written
    ScriptWritten { device: String, path: PathBuf },
    /// Opening a session to a device
    Connecting { device: String, address: String },
    /// Session open, shell ready
    Connected { device: String },
    /// One command's output was captured and persisted
    CommandCaptured {
        device: String,
        command: String,
        bytes: usize,
    },
    /// Output contained invalid byte sequences that were substituted
    DecodeWarning { device: String, command: String },
    /// A device is done, whatever the outcome
    DeviceFinished {
        device: String,
        outcome: DeviceOutcome,
        result_path: Option<PathBuf>,
    },
    /// A device-scoped error
    DeviceError { device: String, message: String },
    /// A batch-scoped error; no device work was done
    BatchError { message: String },
    /// Cancellation was observed
    Cancelled,
    /// All devices were processed
    BatchFinished { succeeded: usize, failed: usize },
}

impl ProgressEvent {
    /// Human-readable message
    pub fn message(&self) -> String {
        match self {
            ProgressEvent::LoadStarted { source } => format!("Reading device table {}...", source),
            ProgressEvent::LoadFinished {
                devices,
                executable,
            } => {
                if *executable {
                    format!("Found {} devices, ready to compile or execute", devices)
                } else {
                    format!("Found {} devices, ready to compile", devices)
                }
            }
            ProgressEvent::ExecutionUnavailable { missing } => format!(
                "Login columns not found ({}), scripts can be compiled but not executed",
                missing.join(", ")
            ),
            ProgressEvent::ScriptWritten { device, path } => {
                format!("Script for {} written to {}", device, path.display())
            }
            ProgressEvent::Connecting { device, address } => {
                format!("Connecting to {} ({})...", device, address)
            }
            ProgressEvent::Connected { device } => format!("Connected to {}", device),
            ProgressEvent::CommandCaptured {
                device,
                command,
                bytes,
            } => format!("{}: '{}' returned {} bytes", device, command, bytes),
            ProgressEvent::DecodeWarning { device, command } => format!(
                "{}: output of '{}' contained invalid characters, substituted",
                device, command
            ),
            ProgressEvent::DeviceFinished {
                device,
                outcome,
                result_path,
            } => match result_path {
                Some(path) => format!(
                    "Device {} {}, results saved to {}",
                    device,
                    outcome,
                    path.display()
                ),
                None => format!("Device {} {}", device, outcome),
            },
            ProgressEvent::DeviceError { device, message } => {
                format!("Error on {}: {}", device, message)
            }
            ProgressEvent::BatchError { message } => format!("Error: {}", message),
            ProgressEvent::Cancelled => "Cancellation requested, stopping".to_string(),
            ProgressEvent::BatchFinished { succeeded, failed } => format!(
                "Batch finished: {} succeeded, {} failed",
                succeeded, failed
            ),
        }
    }

    /// Whether the event reports a problem
    pub fn is_error(&self) -> bool {
        match self {
            ProgressEvent::DeviceError { .. } | ProgressEvent::BatchError { .. } => true,
            ProgressEvent::DeviceFinished { outcome, .. } => !outcome.is_success(),
            _ => false,
        }
    }
}

/// A progress event with the local time it happened
#[derive(Debug, Clone)]
pub struct TimestampedEvent {
    pub at: DateTime<Local>,
    pub event: ProgressEvent,
}

impl TimestampedEvent {
    /// Stamp `event` with the current time
    pub fn now(event: ProgressEvent) -> Self {
        Self {
            at: Local::now(),
            event,
        }
    }

    /// `[HH:MM:SS] message`
    pub fn line(&self) -> String {
        EventLog::format(&self.at, &self.event)
    }
}

/// Renders events as timestamped log lines
pub struct EventLog;

impl EventLog {
    /// Format one line
    pub fn format(at: &DateTime<Local>, event: &ProgressEvent) -> String {
        format!("[{}] {}", at.format("%H:%M:%S"), event.message())
    }
}

/// Receives progress events
pub trait ProgressReporter: Send + Sync {
    /// Deliver one event; must not block for long
    fn notify(&self, event: ProgressEvent);
}

/// Forwards events, timestamped, over an unbounded channel
#[derive(Debug, Clone)]
pub struct ChannelReporter {
    sender: mpsc::UnboundedSender<TimestampedEvent>,
}

impl ChannelReporter {
    /// Create a reporter and the receiving end
    pub fn new() -> (Self, mpsc::UnboundedReceiver<TimestampedEvent>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender }, receiver)
    }
}

impl ProgressReporter for ChannelReporter {
    fn notify(&self, event: ProgressEvent) {
        // Receiver gone means nobody is listening any more
        let _ = self.sender.send(TimestampedEvent::now(event));
    }
}

/// Writes events to the tracing log
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingReporter;

impl ProgressReporter for TracingReporter {
    fn notify(&self, event: ProgressEvent) {
        if event.is_error() {
            warn!("{}", event.message());
        } else {
            info!("{}", event.message());
        }
    }
}

/// Keeps every event in memory
#[derive(Debug, Default)]
pub struct RecordingReporter {
    events: Mutex<Vec<ProgressEvent>>,
}

impl RecordingReporter {
    /// Create an empty recorder
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the events seen so far
    pub fn events(&self) -> Vec<ProgressEvent> {
        self.events
            .lock()
            .map(|events| events.clone())
            .unwrap_or_default()
    }
}

impl ProgressReporter for RecordingReporter {
    fn notify(&self, event: ProgressEvent) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event);
        }
    }
}

/// Delivers each event to several reporters
pub struct FanoutReporter<'a> {
    reporters: Vec<&'a dyn ProgressReporter>,
}

impl<'a> FanoutReporter<'a> {
    /// Fan out to `reporters`
    pub fn new(reporters: Vec<&'a dyn ProgressReporter>) -> Self {
        Self { reporters }
    }
}

impl ProgressReporter for FanoutReporter<'_> {
    fn notify(&self, event: ProgressEvent) {
        for reporter in &self.reporters {
            reporter.notify(event.clone());
        }
    }
}

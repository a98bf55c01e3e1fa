//! Configuration management for fleetshell
//!
//! This module provides the configuration model (column aliases, script
//! layout, session timing, host key policy and batch execution settings)
//! and the file loader in [`loader`].
//!
//! Every section is `#[serde(default)]`, so a config file only needs the
//! keys it changes.

pub mod loader;

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use crate::error::{Error, Result};
use crate::orchestrator::{ExecutionSettings, MergePolicy};
use crate::session::capture::{CaptureStrategy, FixedDelay, IdleTimeout, PromptMatch};
use crate::session::host_keys::HostKeyPolicy;
use crate::session::ssh::TerminalRequest;

/// Main configuration structure for fleetshell
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Table header aliases
    pub columns: ColumnConfig,

    /// Script artifact layout
    pub script: ScriptConfig,

    /// Remote shell settings
    pub session: SessionConfig,

    /// Batch execution settings
    pub execution: ExecutionConfig,
}

/// Accepted header names for the structural columns
///
/// Matching trims whitespace and ignores ASCII case.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ColumnConfig {
    /// Device name column (required)
    pub device_name: Vec<String>,
    /// Address column
    pub address: Vec<String>,
    /// Login user column
    pub username: Vec<String>,
    /// Login password column
    pub password: Vec<String>,
}

impl Default for ColumnConfig {
    fn default() -> Self {
        Self {
            device_name: vec!["device name".to_string(), "设备名称".to_string()],
            address: vec!["address".to_string(), "IP地址".to_string()],
            username: vec!["username".to_string(), "账号".to_string()],
            password: vec!["password".to_string(), "密码".to_string()],
        }
    }
}

/// Script artifact settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScriptConfig {
    /// Line written before each row's commands and once at the end
    pub delimiter: String,
    /// Appended to the device name to form the file name
    pub file_suffix: String,
}

impl Default for ScriptConfig {
    fn default() -> Self {
        Self {
            delimiter: "#".to_string(),
            file_suffix: "_cmd.txt".to_string(),
        }
    }
}

/// How output is captured after each command is sent
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "strategy", rename_all = "kebab-case")]
pub enum CaptureConfig {
    /// Wait a fixed time, then take whatever is buffered
    FixedDelay { delay_ms: u64 },
    /// Wait until no new output arrives for `idle_ms`
    IdleTimeout { idle_ms: u64, max_wait_ms: u64 },
    /// Wait until buffered output ends with a match for `pattern`
    PromptMatch {
        pattern: String,
        poll_ms: u64,
        max_wait_ms: u64,
    },
}

impl Default for CaptureConfig {
    fn default() -> Self {
        CaptureConfig::FixedDelay { delay_ms: 5000 }
    }
}

impl CaptureConfig {
    /// Build the runtime capture strategy
    pub fn build(&self) -> Result<Arc<dyn CaptureStrategy>> {
        Ok(match self {
            CaptureConfig::FixedDelay { delay_ms } => {
                Arc::new(FixedDelay::new(Duration::from_millis(*delay_ms)))
            }
            CaptureConfig::IdleTimeout {
                idle_ms,
                max_wait_ms,
            } => Arc::new(IdleTimeout::new(
                Duration::from_millis(*idle_ms),
                Duration::from_millis(*max_wait_ms),
            )),
            CaptureConfig::PromptMatch {
                pattern,
                poll_ms,
                max_wait_ms,
            } => Arc::new(PromptMatch::new(
                pattern,
                Duration::from_millis(*poll_ms),
                Duration::from_millis(*max_wait_ms),
            )?),
        })
    }
}

/// Host identity verification settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "kebab-case")]
pub enum HostKeyConfig {
    /// Trust any host key on first contact
    AcceptAll,
    /// Accept only the listed SHA256 fingerprints
    PinnedFingerprint { fingerprints: Vec<String> },
    /// Verify against an OpenSSH known_hosts file (`~/.ssh/known_hosts` when unset)
    KnownHostsFile { path: Option<PathBuf> },
}

impl Default for HostKeyConfig {
    fn default() -> Self {
        HostKeyConfig::AcceptAll
    }
}

impl HostKeyConfig {
    /// Build the runtime host key policy
    pub fn build(&self) -> Result<HostKeyPolicy> {
        match self {
            HostKeyConfig::AcceptAll => Ok(HostKeyPolicy::AcceptAll),
            HostKeyConfig::PinnedFingerprint { fingerprints } => {
                Ok(HostKeyPolicy::PinnedFingerprint(fingerprints.clone()))
            }
            HostKeyConfig::KnownHostsFile { path } => {
                let path = match path {
                    Some(path) => path.clone(),
                    None => dirs::home_dir()
                        .map(|home| home.join(".ssh").join("known_hosts"))
                        .ok_or_else(|| Error::ConfigValidationFailed {
                            field: "session.host_keys.path".to_string(),
                            reason: "No home directory to locate known_hosts".to_string(),
                        })?,
                };
                Ok(HostKeyPolicy::KnownHostsFile(path))
            }
        }
    }
}

/// Remote shell settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Port used when an address carries none
    pub port: u16,
    /// Budget for connect, authentication and shell negotiation
    pub connect_timeout_secs: u64,
    /// Maximum bytes taken from the channel per command
    pub read_buffer_limit: usize,
    /// Pseudo-terminal requested for the shell
    pub terminal: TerminalRequest,
    /// Output capture strategy
    pub capture: CaptureConfig,
    /// Host key verification
    pub host_keys: HostKeyConfig,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            port: 22,
            connect_timeout_secs: 10,
            read_buffer_limit: 65535,
            terminal: TerminalRequest::default(),
            capture: CaptureConfig::default(),
            host_keys: HostKeyConfig::default(),
        }
    }
}

impl SessionConfig {
    /// Connect timeout as a duration
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }
}

/// Batch execution settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutionConfig {
    /// How multi-row devices are collapsed before execution
    pub merge_policy: MergePolicy,
    /// Devices executed at once; 1 runs them strictly in order
    pub concurrency: usize,
    /// Appended to the device name to form the result file name
    pub result_suffix: String,
    /// Text flanking each command header in the result artifact
    pub header_marker: String,
    /// Width of the `=` line closing each result entry
    pub separator_width: usize,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            merge_policy: MergePolicy::AllRows,
            concurrency: 1,
            result_suffix: "_result.log".to_string(),
            header_marker: "=".repeat(15),
            separator_width: 50,
        }
    }
}

impl Config {
    /// Execution settings derived from the session and execution sections
    pub fn execution_settings(&self) -> ExecutionSettings {
        ExecutionSettings {
            default_port: self.session.port,
            connect_timeout: self.session.connect_timeout(),
            read_buffer_limit: self.session.read_buffer_limit,
            merge_policy: self.execution.merge_policy,
            concurrency: self.execution.concurrency.max(1),
        }
    }
}

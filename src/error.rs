//! Error types and Result aliases for fleetshell

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

/// Result type alias for fleetshell operations
pub type Result<T> = std::result::Result<T, Error>;

/// Coarse failure classes, used to decide how far a failure propagates
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Table is missing a required column; aborts the whole batch
    Schema,
    /// Device unreachable, auth rejected, channel negotiation or transport failure
    Connect,
    /// Artifact or table I/O failure
    Io,
    /// Work was cancelled before it finished
    Cancelled,
    /// Invalid or unreadable configuration
    Config,
    /// Anything else
    Other,
}

/// Main error type for fleetshell
#[derive(Debug)]
pub enum Error {
    // === Table / schema errors ===
    /// A required column is absent from the table header
    MissingColumn {
        column: String,
    },

    /// Execution was requested but the login columns are not all present
    LoginColumnsMissing {
        missing: Vec<String>,
    },

    /// The tabular source could not be read
    TableReadFailed {
        path: PathBuf,
        reason: String,
    },

    // === Session errors ===
    /// TCP connect or SSH handshake failed
    ConnectFailed {
        address: String,
        reason: String,
    },

    /// Connect, authentication and shell negotiation did not finish in time
    ConnectTimeout {
        address: String,
        timeout: Duration,
    },

    /// The device refused the supplied username/password
    AuthenticationRejected {
        address: String,
        username: String,
    },

    /// The host key was refused by the configured policy
    HostKeyRejected {
        address: String,
        fingerprint: String,
    },

    /// Opening the session channel, PTY or shell failed
    ChannelSetupFailed {
        address: String,
        reason: String,
    },

    /// Writing a command to the shell channel failed
    ChannelWriteFailed {
        reason: String,
    },

    /// The far end closed the shell channel
    ChannelClosed,

    /// The session was used after close
    SessionClosed,

    /// Device row fragments carry blank address/username/password
    MissingCredentials {
        device: String,
    },

    /// Work was cancelled
    Cancelled,

    // === Artifact errors ===
    /// Writing a script or result artifact failed
    ArtifactWriteFailed {
        path: PathBuf,
        reason: String,
    },

    // === Configuration errors ===
    /// Failed to load configuration file
    ConfigLoadFailed {
        path: PathBuf,
        reason: String,
    },

    /// Configuration file not found
    ConfigNotFound,

    /// Configuration validation failed
    ConfigValidationFailed {
        field: String,
        reason: String,
    },

    /// Failed to serialize configuration
    ConfigSerializationFailed {
        format: String,
        reason: String,
    },

    /// Failed to parse configuration
    ConfigParseFailed {
        format: String,
        reason: String,
    },

    // === I/O and library errors ===
    /// I/O errors
    Io(std::io::Error),

    /// Serialization errors
    Serde(serde_json::Error),

    /// TOML parsing errors
    Toml(toml::de::Error),

    /// CSV decoding errors
    Csv(csv::Error),

    /// Regex compilation errors
    Regex(regex::Error),

    /// SSH protocol errors not mapped to a more specific variant
    Ssh(russh::Error),

    // === Generic fallback (use sparingly) ===
    /// Generic errors
    Other(String),
}

impl Error {
    /// Classify this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::MissingColumn { .. } | Error::LoginColumnsMissing { .. } => ErrorKind::Schema,
            Error::ConnectFailed { .. }
            | Error::ConnectTimeout { .. }
            | Error::AuthenticationRejected { .. }
            | Error::HostKeyRejected { .. }
            | Error::ChannelSetupFailed { .. }
            | Error::ChannelWriteFailed { .. }
            | Error::ChannelClosed
            | Error::SessionClosed
            | Error::MissingCredentials { .. }
            | Error::Ssh(_) => ErrorKind::Connect,
            Error::TableReadFailed { .. }
            | Error::ArtifactWriteFailed { .. }
            | Error::Io(_)
            | Error::Csv(_) => ErrorKind::Io,
            Error::Cancelled => ErrorKind::Cancelled,
            Error::ConfigLoadFailed { .. }
            | Error::ConfigNotFound
            | Error::ConfigValidationFailed { .. }
            | Error::ConfigSerializationFailed { .. }
            | Error::ConfigParseFailed { .. }
            | Error::Toml(_)
            | Error::Serde(_)
            | Error::Regex(_) => ErrorKind::Config,
            Error::Other(_) => ErrorKind::Other,
        }
    }

    /// True for errors that must abort a whole batch before any device work
    pub fn is_schema_error(&self) -> bool {
        self.kind() == ErrorKind::Schema
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            // Table errors
            Error::MissingColumn { column } => {
                write!(f, "Required column '{}' not found in table", column)
            }
            Error::LoginColumnsMissing { missing } => {
                write!(
                    f,
                    "Login columns missing ({}), scripts cannot be executed",
                    missing.join(", ")
                )
            }
            Error::TableReadFailed { path, reason } => {
                write!(f, "Failed to read table '{}': {}", path.display(), reason)
            }

            // Session errors
            Error::ConnectFailed { address, reason } => {
                write!(f, "Failed to connect to {}: {}", address, reason)
            }
            Error::ConnectTimeout { address, timeout } => {
                write!(f, "Connection to {} timed out after {:?}", address, timeout)
            }
            Error::AuthenticationRejected { address, username } => {
                write!(f, "Authentication rejected by {} for user '{}'", address, username)
            }
            Error::HostKeyRejected {
                address,
                fingerprint,
            } => {
                write!(f, "Host key {} for {} rejected by policy", fingerprint, address)
            }
            Error::ChannelSetupFailed { address, reason } => {
                write!(f, "Failed to open shell on {}: {}", address, reason)
            }
            Error::ChannelWriteFailed { reason } => {
                write!(f, "Failed to send command: {}", reason)
            }
            Error::ChannelClosed => write!(f, "Shell channel closed by remote host"),
            Error::SessionClosed => write!(f, "Shell session already closed"),
            Error::MissingCredentials { device } => {
                write!(f, "Device '{}' has blank address, username or password", device)
            }
            Error::Cancelled => write!(f, "Operation cancelled"),

            // Artifact errors
            Error::ArtifactWriteFailed { path, reason } => {
                write!(f, "Failed to write '{}': {}", path.display(), reason)
            }

            // Configuration errors
            Error::ConfigLoadFailed { path, reason } => {
                write!(f, "Failed to load config from '{}': {}", path.display(), reason)
            }
            Error::ConfigNotFound => write!(f, "Configuration file not found"),
            Error::ConfigValidationFailed { field, reason } => {
                write!(f, "Configuration validation failed for '{}': {}", field, reason)
            }
            Error::ConfigSerializationFailed { format, reason } => {
                write!(f, "Failed to serialize config as {}: {}", format, reason)
            }
            Error::ConfigParseFailed { format, reason } => {
                write!(f, "Failed to parse {} config: {}", format, reason)
            }

            // I/O and library errors
            Error::Io(err) => write!(f, "I/O error: {}", err),
            Error::Serde(err) => write!(f, "Serialization error: {}", err),
            Error::Toml(err) => write!(f, "TOML parsing error: {}", err),
            Error::Csv(err) => write!(f, "CSV error: {}", err),
            Error::Regex(err) => write!(f, "Regex compilation error: {}", err),
            Error::Ssh(err) => write!(f, "SSH error: {}", err),

            // Generic fallback
            Error::Other(msg) => write!(f, "Error: {}", msg),
        }
    }
}

impl std::error::Error for Error {}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Io(err)
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Serde(err)
    }
}

impl From<toml::de::Error> for Error {
    fn from(err: toml::de::Error) -> Self {
        Error::Toml(err)
    }
}

impl From<csv::Error> for Error {
    fn from(err: csv::Error) -> Self {
        Error::Csv(err)
    }
}

impl From<regex::Error> for Error {
    fn from(err: regex::Error) -> Self {
        Error::Regex(err)
    }
}

impl From<russh::Error> for Error {
    fn from(err: russh::Error) -> Self {
        Error::Ssh(err)
    }
}

impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        Error::Other(err.to_string())
    }
}

impl From<String> for Error {
    fn from(err: String) -> Self {
        Error::Other(err)
    }
}

impl From<&str> for Error {
    fn from(err: &str) -> Self {
        Error::Other(err.to_string())
    }
}

//! Device Model
//!
//! A device may span several table rows. Each row becomes a
//! [`RowFragment`]; fragments are only collapsed into a [`DeviceRecord`]
//! when a device is about to be executed.

use std::fmt;
use zeroize::Zeroizing;

/// Login details for one device
#[derive(Clone, Default)]
pub struct Credentials {
    /// Host or `host:port`
    pub address: String,
    /// Login user
    pub username: String,
    /// Login password, wiped on drop
    pub password: Zeroizing<String>,
}

impl Credentials {
    /// Create a new set of credentials
    pub fn new(address: impl Into<String>, username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            username: username.into(),
            password: Zeroizing::new(password.into()),
        }
    }

    /// All three fields carry a non-blank value
    pub fn is_complete(&self) -> bool {
        !self.address.trim().is_empty()
            && !self.username.trim().is_empty()
            && !self.password.trim().is_empty()
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("address", &self.address)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// The commands (and, when present, login details) contributed by one row
#[derive(Clone, Debug)]
pub struct RowFragment {
    /// 1-based data row number in the source table (header excluded)
    pub row_number: usize,
    /// Login details, only when the table carries all login columns
    pub credentials: Option<Credentials>,
    /// Raw command cells in column order, blanks included
    pub commands: Vec<String>,
}

impl RowFragment {
    /// Create a fragment without login details
    pub fn new(row_number: usize, commands: Vec<String>) -> Self {
        Self {
            row_number,
            credentials: None,
            commands,
        }
    }

    /// Attach login details
    pub fn with_credentials(mut self, credentials: Credentials) -> Self {
        self.credentials = Some(credentials);
        self
    }
}

/// One device collapsed into a single executable unit
#[derive(Clone, Debug)]
pub struct DeviceRecord {
    /// Trimmed, non-empty device name
    pub name: String,
    /// Login details, if any row carried them
    pub credentials: Option<Credentials>,
    /// Commands from every contributing row, in row order
    pub commands: Vec<String>,
}

impl DeviceRecord {
    /// A device is executable when address, username and password are non-blank
    pub fn is_executable(&self) -> bool {
        self.credentials
            .as_ref()
            .map(Credentials::is_complete)
            .unwrap_or(false)
    }

    /// Commands that would actually be sent to the device
    pub fn sendable_commands(&self) -> impl Iterator<Item = &str> {
        self.commands
            .iter()
            .map(|c| c.trim())
            .filter(|c| !c.is_empty())
    }
}

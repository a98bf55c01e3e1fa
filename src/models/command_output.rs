//! Captured Command Output
//!
//! Raw bytes read from an interactive shell are decoded leniently:
//! invalid UTF-8 is replaced with U+FFFD instead of failing the device.

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};

/// Text decoded from raw channel bytes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedOutput {
    /// Decoded text
    pub text: String,
    /// At least one invalid byte sequence was substituted
    pub replaced_invalid: bool,
}

/// Decode shell output, substituting invalid byte sequences
pub fn decode_output(bytes: &[u8]) -> DecodedOutput {
    match std::str::from_utf8(bytes) {
        Ok(text) => DecodedOutput {
            text: text.to_string(),
            replaced_invalid: false,
        },
        Err(_) => DecodedOutput {
            text: String::from_utf8_lossy(bytes).into_owned(),
            replaced_invalid: true,
        },
    }
}

/// One command sent to a device and what came back within its capture window
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandOutput {
    /// The trimmed command text that was sent
    pub command: String,

    /// Decoded output
    pub output: String,

    /// Number of raw bytes captured
    pub raw_len: usize,

    /// Invalid byte sequences were replaced during decoding
    pub replaced_invalid: bool,

    /// When the capture finished (local time)
    pub captured_at: DateTime<Local>,
}

impl CommandOutput {
    /// Build a command output from raw captured bytes
    pub fn from_bytes(command: impl Into<String>, bytes: &[u8]) -> Self {
        let decoded = decode_output(bytes);
        Self {
            command: command.into(),
            output: decoded.text,
            raw_len: bytes.len(),
            replaced_invalid: decoded.replaced_invalid,
            captured_at: Local::now(),
        }
    }

    /// Render the result-artifact entry for this command
    ///
    /// `marker` flanks the header line, `separator_width` is the length of
    /// the closing `=` line.
    pub fn render_entry(&self, marker: &str, separator_width: usize) -> String {
        format!(
            "{marker}Command: {}{marker}\n{}\n{}\n",
            self.command,
            self.output,
            "=".repeat(separator_width),
        )
    }
}

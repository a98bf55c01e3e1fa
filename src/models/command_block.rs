//! Command Block Model
//!
//! A command block is the unit written to a script artifact: one
//! delimiter line followed by the commands of a single table row. A
//! script artifact is every block of a device followed by a closing
//! delimiter line.
//!
//! Blocks keep blank cells verbatim. Filtering happens only when
//! commands are sent to a device.

use serde::{Deserialize, Serialize};

/// Commands contributed by one table row
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandBlock {
    /// Source row the block came from (1-based, header excluded)
    pub row_number: usize,

    /// Command cells in column order
    pub commands: Vec<String>,
}

impl CommandBlock {
    /// Create a new command block
    pub fn new(row_number: usize, commands: Vec<String>) -> Self {
        Self {
            row_number,
            commands,
        }
    }

    /// Number of command lines, blank ones included
    pub fn line_count(&self) -> usize {
        self.commands.len()
    }

    /// Append this block to `out`: the delimiter line, then one line per command
    pub fn render_into(&self, delimiter: &str, out: &mut String) {
        out.push_str(delimiter);
        out.push('\n');
        for command in &self.commands {
            out.push_str(command);
            out.push('\n');
        }
    }
}

/// The compiled, not yet executed, command file for one device
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScriptArtifact {
    /// Device the script belongs to
    pub device: String,

    /// Delimiter line text (without newline)
    pub delimiter: String,

    /// One block per contributing row, in row order
    pub blocks: Vec<CommandBlock>,
}

impl ScriptArtifact {
    /// Render the artifact as text
    pub fn render(&self) -> String {
        let mut out = String::new();
        for block in &self.blocks {
            block.render_into(&self.delimiter, &mut out);
        }
        out.push_str(&self.delimiter);
        out.push('\n');
        out
    }

    /// Render the artifact as UTF-8 bytes
    pub fn to_bytes(&self) -> Vec<u8> {
        self.render().into_bytes()
    }

    /// Number of delimiter lines the rendered artifact contains
    pub fn delimiter_count(&self) -> usize {
        self.blocks.len() + 1
    }
}

//! Script Compilation
//!
//! Compiles a device's row fragments into a [`ScriptArtifact`]: a
//! delimiter line and the row's command cells for every fragment, closed
//! by a final delimiter line. Cells are written verbatim, blanks included.

use tracing::{info, warn};

use crate::catalog::DeviceCatalog;
use crate::events::{ProgressEvent, ProgressReporter};
use crate::models::{CommandBlock, CompileSummary, RowFragment, ScriptArtifact};
use crate::sink::ScriptSink;

/// Turns row fragments into script artifacts
#[derive(Debug, Clone)]
pub struct ScriptCompiler {
    delimiter: String,
}

impl ScriptCompiler {
    /// Create a compiler using `delimiter` as the block separator line
    pub fn new(delimiter: impl Into<String>) -> Self {
        Self {
            delimiter: delimiter.into(),
        }
    }

    /// Block separator line
    pub fn delimiter(&self) -> &str {
        &self.delimiter
    }

    /// Compile one device
    pub fn compile(&self, device: &str, fragments: &[RowFragment]) -> ScriptArtifact {
        ScriptArtifact {
            device: device.to_string(),
            delimiter: self.delimiter.clone(),
            blocks: fragments
                .iter()
                .map(|f| CommandBlock::new(f.row_number, f.commands.clone()))
                .collect(),
        }
    }

    /// Compile every device of `catalog` and hand each artifact to `sink`
    ///
    /// A failed write is reported and the remaining devices still compile.
    pub async fn compile_all(
        &self,
        catalog: &DeviceCatalog,
        sink: &dyn ScriptSink,
        progress: &dyn ProgressReporter,
    ) -> CompileSummary {
        let mut summary = CompileSummary::default();

        for (device, fragments) in catalog.devices() {
            let artifact = self.compile(device, fragments);
            match sink.write_script(device, &artifact.to_bytes()).await {
                Ok(path) => {
                    info!("Script for {} written to {}", device, path.display());
                    progress.notify(ProgressEvent::ScriptWritten {
                        device: device.to_string(),
                        path: path.clone(),
                    });
                    summary.written.push((device.to_string(), path));
                }
                Err(e) => {
                    warn!("Script for {} not written: {}", device, e);
                    progress.notify(ProgressEvent::DeviceError {
                        device: device.to_string(),
                        message: e.to_string(),
                    });
                    summary.failed.push((device.to_string(), e.to_string()));
                }
            }
        }

        summary
    }
}

impl Default for ScriptCompiler {
    fn default() -> Self {
        Self::new("#")
    }
}

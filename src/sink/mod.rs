//! Artifact Sinks
//!
//! Script artifacts are written whole. Result artifacts are append-only
//! while a device's session is open: each command/output entry is written
//! and flushed before the next command is sent, so a partial transcript
//! survives a later failure.
//!
//! [`ArtifactStore`] keeps one writer per device behind its own lock, the
//! way devices run independently when a batch executes several at once.
//! Each device gets its own file stem: names that sanitise to the same
//! stem (or differ only in case) get a numbered one instead of sharing
//! files.

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex as StdMutex};
use tokio::fs::{self, File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, warn};

use crate::config::Config;
use crate::error::{Error, Result};
use crate::models::CommandOutput;

/// Destination for compiled scripts
#[async_trait]
pub trait ScriptSink: Send + Sync {
    /// Store the script of `device`, returning where it went
    async fn write_script(&self, device: &str, bytes: &[u8]) -> Result<PathBuf>;
}

/// Destination for captured command output
#[async_trait]
pub trait ResultSink: Send + Sync {
    /// Start (or restart) the transcript of `device`
    async fn begin(&self, device: &str) -> Result<Option<PathBuf>>;

    /// Append one command/output entry and make it durable
    async fn append(&self, device: &str, output: &CommandOutput) -> Result<()>;

    /// Close the transcript of `device`
    async fn finish(&self, device: &str) -> Result<()>;
}

static UNSAFE_FILE_CHARS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"[\\/:*?"<>|\x00-\x1f\x7f]"#).expect("file name pattern is valid")
});

/// File stem for a device: unsafe characters become `_`
pub fn artifact_stem(device: &str) -> String {
    let mut stem = UNSAFE_FILE_CHARS.replace_all(device.trim(), "_").into_owned();
    if stem.is_empty() || stem == "." || stem == ".." {
        stem = stem.replace('.', "_");
        if stem.is_empty() {
            stem.push('_');
        }
    }
    stem
}

/// File name for a device artifact, ignoring other devices of the batch
pub fn artifact_file_name(device: &str, suffix: &str) -> String {
    format!("{}{}", artifact_stem(device), suffix)
}

/// Device name to file stem, unique within one output directory
#[derive(Debug, Default)]
struct StemRegistry {
    by_device: HashMap<String, String>,
    /// Lowercased stems in use
    taken: HashSet<String>,
}

impl StemRegistry {
    fn stem_for(&mut self, device: &str) -> String {
        if let Some(stem) = self.by_device.get(device) {
            return stem.clone();
        }

        let base = artifact_stem(device);
        let mut stem = base.clone();
        let mut n = 2;
        while self.taken.contains(&stem.to_lowercase()) {
            stem = format!("{}_{}", base, n);
            n += 1;
        }
        if stem != base {
            warn!(
                "Device {:?} collides with another device's file name, using {:?}",
                device, stem
            );
        }

        self.taken.insert(stem.to_lowercase());
        self.by_device.insert(device.to_string(), stem.clone());
        stem
    }
}

/// Layout of artifact files inside the output directory
#[derive(Debug, Clone)]
pub struct ArtifactLayout {
    /// Script file suffix
    pub script_suffix: String,
    /// Result file suffix
    pub result_suffix: String,
    /// Text flanking each command header
    pub header_marker: String,
    /// Width of the closing separator line
    pub separator_width: usize,
}

impl Default for ArtifactLayout {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

impl ArtifactLayout {
    /// Take suffixes and markers from the configuration
    pub fn from_config(config: &Config) -> Self {
        Self {
            script_suffix: config.script.file_suffix.clone(),
            result_suffix: config.execution.result_suffix.clone(),
            header_marker: config.execution.header_marker.clone(),
            separator_width: config.execution.separator_width,
        }
    }
}

struct ResultWriter {
    path: PathBuf,
    file: File,
}

/// Writes scripts and results as files in one directory
pub struct ArtifactStore {
    dir: PathBuf,
    layout: ArtifactLayout,
    stems: StdMutex<StemRegistry>,
    /// Open result writers, one lock per device
    writers: RwLock<HashMap<String, Arc<Mutex<ResultWriter>>>>,
}

impl ArtifactStore {
    /// Store artifacts under `dir`, created on first write
    pub fn new(dir: impl Into<PathBuf>, layout: ArtifactLayout) -> Self {
        Self {
            dir: dir.into(),
            layout,
            stems: StdMutex::new(StemRegistry::default()),
            writers: RwLock::new(HashMap::new()),
        }
    }

    /// Assign file stems in the given order
    ///
    /// Without this, stems are assigned on first write, which depends on
    /// completion order when devices run concurrently.
    pub fn reserve<'a>(&self, devices: impl IntoIterator<Item = &'a str>) {
        for device in devices {
            self.stem(device);
        }
    }

    fn stem(&self, device: &str) -> String {
        let mut stems = self
            .stems
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        stems.stem_for(device)
    }

    /// Output directory
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Where the script of `device` is written
    pub fn script_path(&self, device: &str) -> PathBuf {
        self.dir
            .join(format!("{}{}", self.stem(device), self.layout.script_suffix))
    }

    /// Where the result transcript of `device` is written
    pub fn result_path(&self, device: &str) -> PathBuf {
        self.dir
            .join(format!("{}{}", self.stem(device), self.layout.result_suffix))
    }

    async fn ensure_dir(&self) -> Result<()> {
        fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| Error::ArtifactWriteFailed {
                path: self.dir.clone(),
                reason: e.to_string(),
            })
    }

    async fn writer(&self, device: &str) -> Result<Arc<Mutex<ResultWriter>>> {
        let writers = self.writers.read().await;
        writers.get(device).cloned().ok_or_else(|| Error::ArtifactWriteFailed {
            path: self.dir.join(artifact_file_name(device, &self.layout.result_suffix)),
            reason: "result transcript was not started".to_string(),
        })
    }
}

fn write_error(path: &Path, err: std::io::Error) -> Error {
    Error::ArtifactWriteFailed {
        path: path.to_path_buf(),
        reason: err.to_string(),
    }
}

#[async_trait]
impl ScriptSink for ArtifactStore {
    async fn write_script(&self, device: &str, bytes: &[u8]) -> Result<PathBuf> {
        self.ensure_dir().await?;
        let path = self.script_path(device);
        fs::write(&path, bytes)
            .await
            .map_err(|e| write_error(&path, e))?;
        Ok(path)
    }
}

#[async_trait]
impl ResultSink for ArtifactStore {
    async fn begin(&self, device: &str) -> Result<Option<PathBuf>> {
        self.ensure_dir().await?;
        let path = self.result_path(device);

        let mut options = OpenOptions::new();
        options.create(true).write(true).truncate(true);
        #[cfg(unix)]
        options.mode(0o600);

        let file = options.open(&path).await.map_err(|e| write_error(&path, e))?;
        debug!("Result transcript for {} opened at {}", device, path.display());

        let mut writers = self.writers.write().await;
        writers.insert(
            device.to_string(),
            Arc::new(Mutex::new(ResultWriter {
                path: path.clone(),
                file,
            })),
        );
        Ok(Some(path))
    }

    async fn append(&self, device: &str, output: &CommandOutput) -> Result<()> {
        let writer = self.writer(device).await?;
        let mut writer = writer.lock().await;
        let entry = output.render_entry(&self.layout.header_marker, self.layout.separator_width);

        let ResultWriter { path, file } = &mut *writer;
        file.write_all(entry.as_bytes())
            .await
            .map_err(|e| write_error(path, e))?;
        file.flush().await.map_err(|e| write_error(path, e))?;
        Ok(())
    }

    async fn finish(&self, device: &str) -> Result<()> {
        let removed = self.writers.write().await.remove(device);
        if let Some(writer) = removed {
            let mut writer = writer.lock().await;
            let ResultWriter { path, file } = &mut *writer;
            file.flush().await.map_err(|e| write_error(path, e))?;
            file.sync_all().await.map_err(|e| write_error(path, e))?;
        }
        Ok(())
    }
}

/// Keeps scripts and results in memory
#[derive(Debug, Default)]
pub struct MemorySink {
    scripts: StdMutex<HashMap<String, Vec<u8>>>,
    results: StdMutex<HashMap<String, Vec<CommandOutput>>>,
}

impl MemorySink {
    /// Create an empty sink
    pub fn new() -> Self {
        Self::default()
    }

    /// Script bytes stored for `device`
    pub fn script(&self, device: &str) -> Option<Vec<u8>> {
        self.scripts.lock().ok()?.get(device).cloned()
    }

    /// Number of stored scripts
    pub fn script_count(&self) -> usize {
        self.scripts.lock().map(|s| s.len()).unwrap_or(0)
    }

    /// Entries appended for `device`, or `None` if its transcript never started
    pub fn results(&self, device: &str) -> Option<Vec<CommandOutput>> {
        self.results.lock().ok()?.get(device).cloned()
    }
}

#[async_trait]
impl ScriptSink for MemorySink {
    async fn write_script(&self, device: &str, bytes: &[u8]) -> Result<PathBuf> {
        self.scripts
            .lock()
            .map_err(|_| Error::Other("script store poisoned".to_string()))?
            .insert(device.to_string(), bytes.to_vec());
        Ok(PathBuf::from(device))
    }
}

#[async_trait]
impl ResultSink for MemorySink {
    async fn begin(&self, device: &str) -> Result<Option<PathBuf>> {
        self.results
            .lock()
            .map_err(|_| Error::Other("result store poisoned".to_string()))?
            .insert(device.to_string(), Vec::new());
        Ok(None)
    }

    async fn append(&self, device: &str, output: &CommandOutput) -> Result<()> {
        self.results
            .lock()
            .map_err(|_| Error::Other("result store poisoned".to_string()))?
            .entry(device.to_string())
            .or_default()
            .push(output.clone());
        Ok(())
    }

    async fn finish(&self, _device: &str) -> Result<()> {
        Ok(())
    }
}

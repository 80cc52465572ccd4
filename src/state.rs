use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::{Context, Result};
use tracing::{info, warn};

use crate::types::Watermark;

/// File name prefix for per-entity watermark records.
const FILE_PREFIX: &str = "lastAcceptBidTimestamp_";
const FILE_EXTENSION: &str = ".txt";

/// Durable last-seen timestamp per tracked entity.
///
/// A missing or unreadable record is reported as `None`, which makes the
/// caller treat all available history as unseen once.
pub trait WatermarkStore: Send + Sync {
    fn read(&self, key: &str) -> Option<Watermark>;
    fn write(&self, key: &str, watermark: &Watermark) -> Result<()>;
}

/// Persist `candidate` only if it is strictly newer than the stored value.
///
/// Returns whether the record moved. Write failures are logged and reported
/// as `false`; the next cycle may then announce the same event again.
pub fn advance<S: WatermarkStore + ?Sized>(store: &S, key: &str, candidate: &Watermark) -> bool {
    if let Some(current) = store.read(key) {
        if *candidate <= current {
            return false;
        }
    }
    match store.write(key, candidate) {
        Ok(()) => {
            info!("Watermark for {key} advanced to {candidate}");
            true
        }
        Err(e) => {
            warn!("Failed to persist watermark for {key}: {e:#}");
            false
        }
    }
}

/// One plain-text file per entity inside a state directory.
pub struct FileWatermarkStore {
    dir: PathBuf,
}

impl FileWatermarkStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{FILE_PREFIX}{key}{FILE_EXTENSION}"))
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

impl WatermarkStore for FileWatermarkStore {
    fn read(&self, key: &str) -> Option<Watermark> {
        let path = self.path_for(key);
        let contents = match std::fs::read_to_string(&path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return None,
            Err(e) => {
                warn!("Failed to read {}: {e}", path.display());
                return None;
            }
        };
        match contents.trim().parse::<Watermark>() {
            Ok(w) => Some(w),
            Err(e) => {
                warn!("Ignoring corrupt watermark in {}: {e}", path.display());
                None
            }
        }
    }

    fn write(&self, key: &str, watermark: &Watermark) -> Result<()> {
        std::fs::create_dir_all(&self.dir)
            .with_context(|| format!("failed to create {}", self.dir.display()))?;
        let path = self.path_for(key);
        std::fs::write(&path, watermark.to_string())
            .with_context(|| format!("failed to write {}", path.display()))?;
        Ok(())
    }
}

/// Process-local store, used for dry runs and tests.
#[derive(Default)]
pub struct MemoryWatermarkStore {
    records: Mutex<HashMap<String, Watermark>>,
}

impl MemoryWatermarkStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl WatermarkStore for MemoryWatermarkStore {
    fn read(&self, key: &str) -> Option<Watermark> {
        self.records.lock().ok()?.get(key).copied()
    }

    fn write(&self, key: &str, watermark: &Watermark) -> Result<()> {
        let mut records = self
            .records
            .lock()
            .map_err(|_| anyhow::anyhow!("watermark map poisoned"))?;
        records.insert(key.to_string(), *watermark);
        Ok(())
    }
}

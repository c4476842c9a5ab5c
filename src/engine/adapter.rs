//! Persistence adapters
//!
//! Durable storage for encoded snapshots, one blob per database name.

use std::collections::HashMap;
use std::fmt;
use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::error::Result;

/// Where the engine keeps its snapshots
pub trait PersistenceAdapter: Send + Sync + fmt::Debug {
    /// Read the snapshot for `db_name`; `None` if nothing was ever saved
    fn load(&self, db_name: &str) -> Result<Option<Vec<u8>>>;

    /// Replace the snapshot for `db_name`
    fn save(&self, db_name: &str, bytes: &[u8]) -> Result<()>;
}

// =============================================================================
// Filesystem Adapter
// =============================================================================

/// Stores `{dir}/{db_name}.snapshot`
///
/// Saves go to a temporary file which is synced and then renamed over the
/// previous snapshot, so readers see either the old or the new one.
#[derive(Debug, Clone)]
pub struct FsAdapter {
    dir: PathBuf,
}

impl FsAdapter {
    const SNAPSHOT_EXT: &'static str = "snapshot";
    const TEMP_EXT: &'static str = "snapshot.tmp";

    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Directory holding the snapshots
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Snapshot path for a database
    pub fn snapshot_path(&self, db_name: &str) -> PathBuf {
        self.dir.join(format!("{}.{}", db_name, Self::SNAPSHOT_EXT))
    }

    fn temp_path(&self, db_name: &str) -> PathBuf {
        self.dir.join(format!("{}.{}", db_name, Self::TEMP_EXT))
    }
}

impl PersistenceAdapter for FsAdapter {
    fn load(&self, db_name: &str) -> Result<Option<Vec<u8>>> {
        match fs::read(self.snapshot_path(db_name)) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn save(&self, db_name: &str, bytes: &[u8]) -> Result<()> {
        fs::create_dir_all(&self.dir)?;

        let temp_path = self.temp_path(db_name);
        {
            let mut file = File::create(&temp_path)?;
            file.write_all(bytes)?;
            file.sync_all()?;
        }
        fs::rename(&temp_path, self.snapshot_path(db_name))?;

        Ok(())
    }
}

// =============================================================================
// In-Memory Adapter
// =============================================================================

/// Keeps snapshots in memory; clones share storage
///
/// Loads and saves can be made to fail on demand, which is how tests drive
/// the store's failure paths.
#[derive(Debug, Clone, Default)]
pub struct MemoryAdapter {
    inner: Arc<MemoryInner>,
}

#[derive(Debug, Default)]
struct MemoryInner {
    snapshots: Mutex<HashMap<String, Vec<u8>>>,
    fail_loads: AtomicBool,
    fail_saves: AtomicBool,
    saves: AtomicUsize,
}

impl MemoryAdapter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent load fail (or succeed again)
    pub fn set_fail_loads(&self, fail: bool) {
        self.inner.fail_loads.store(fail, Ordering::SeqCst);
    }

    /// Make every subsequent save fail (or succeed again)
    pub fn set_fail_saves(&self, fail: bool) {
        self.inner.fail_saves.store(fail, Ordering::SeqCst);
    }

    /// Number of successful saves so far
    pub fn save_count(&self) -> usize {
        self.inner.saves.load(Ordering::SeqCst)
    }

    /// Raw stored bytes for a database
    pub fn snapshot(&self, db_name: &str) -> Option<Vec<u8>> {
        self.inner.snapshots.lock().get(db_name).cloned()
    }

    /// Store raw bytes directly, bypassing the engine
    pub fn put_raw(&self, db_name: &str, bytes: Vec<u8>) {
        self.inner.snapshots.lock().insert(db_name.to_string(), bytes);
    }
}

impl PersistenceAdapter for MemoryAdapter {
    fn load(&self, db_name: &str) -> Result<Option<Vec<u8>>> {
        if self.inner.fail_loads.load(Ordering::SeqCst) {
            return Err(io::Error::new(io::ErrorKind::Other, "injected load failure").into());
        }
        Ok(self.snapshot(db_name))
    }

    fn save(&self, db_name: &str, bytes: &[u8]) -> Result<()> {
        if self.inner.fail_saves.load(Ordering::SeqCst) {
            return Err(io::Error::new(io::ErrorKind::Other, "injected save failure").into());
        }
        self.put_raw(db_name, bytes.to_vec());
        self.inner.saves.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

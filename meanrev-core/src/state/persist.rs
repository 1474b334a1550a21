//! On-disk state: the global pending-order store and per-run snapshots.
//!
//! Layout under the state directory:
//!
//! ```text
//! pending_orders.json              global store, read at start, written at end
//! runs/<run_id>/positions.json     merged positions at the end of the run
//! runs/<run_id>/pending_orders.json
//! runs/<run_id>/manifest.json      run metadata and counters
//! ```
//!
//! Writes are atomic (write `.tmp`, rename into place). A missing file reads
//! as empty. A file that fails to parse is renamed to `*.corrupt` and read as
//! empty: the broker rebuilds positions and open orders at the next
//! reconciliation anyway.

use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use super::StateError;
use crate::domain::{PendingOrder, Position, RunId};

const PENDING_FILE: &str = "pending_orders.json";
const POSITIONS_FILE: &str = "positions.json";
const MANIFEST_FILE: &str = "manifest.json";
const RUNS_DIR: &str = "runs";

/// File-backed snapshot store rooted at the state directory.
#[derive(Debug, Clone)]
pub struct SnapshotStore {
    root: PathBuf,
}

impl SnapshotStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn global_pending_path(&self) -> PathBuf {
        self.root.join(PENDING_FILE)
    }

    pub fn runs_dir(&self) -> PathBuf {
        self.root.join(RUNS_DIR)
    }

    pub fn run_dir(&self, run_id: &RunId) -> PathBuf {
        self.runs_dir().join(run_id.as_str())
    }

    // ── Global pending store ─────────────────────────────────────────

    pub fn load_pending(&self) -> Result<Vec<PendingOrder>, StateError> {
        Ok(read_json_or_quarantine(&self.global_pending_path())?.unwrap_or_default())
    }

    pub fn save_pending(&self, orders: &[PendingOrder]) -> Result<(), StateError> {
        write_json_atomic(&self.global_pending_path(), &orders)
    }

    // ── Per-run snapshots ────────────────────────────────────────────

    /// Write the immutable snapshot of one run.
    pub fn write_run_snapshot<M: Serialize>(
        &self,
        run_id: &RunId,
        positions: &[Position],
        pending: &[PendingOrder],
        manifest: &M,
    ) -> Result<PathBuf, StateError> {
        let dir = self.run_dir(run_id);
        fs::create_dir_all(&dir).map_err(|e| StateError::io(&dir, e))?;
        write_json_atomic(&dir.join(POSITIONS_FILE), &positions)?;
        write_json_atomic(&dir.join(PENDING_FILE), &pending)?;
        write_json_atomic(&dir.join(MANIFEST_FILE), manifest)?;
        Ok(dir)
    }

    /// Run ids with a snapshot directory, oldest first.
    pub fn run_ids(&self) -> Result<Vec<RunId>, StateError> {
        let dir = self.runs_dir();
        let entries = match fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(StateError::io(&dir, e)),
        };
        let mut ids = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| StateError::io(&dir, e))?;
            if !entry.path().is_dir() {
                continue;
            }
            if let Some(name) = entry.file_name().to_str() {
                ids.push(RunId(name.to_string()));
            }
        }
        ids.sort();
        Ok(ids)
    }

    /// Most recent run that left a positions snapshot.
    pub fn latest_run(&self) -> Result<Option<RunId>, StateError> {
        Ok(self
            .run_ids()?
            .into_iter()
            .rev()
            .find(|id| self.run_dir(id).join(POSITIONS_FILE).exists()))
    }

    /// Position metadata from the most recent run, or empty when there is
    /// none.
    pub fn load_latest_positions(&self) -> Result<Vec<Position>, StateError> {
        match self.latest_run()? {
            Some(id) => self.load_run_positions(&id),
            None => Ok(Vec::new()),
        }
    }

    pub fn load_run_positions(&self, run_id: &RunId) -> Result<Vec<Position>, StateError> {
        let path = self.run_dir(run_id).join(POSITIONS_FILE);
        Ok(read_json_or_quarantine(&path)?.unwrap_or_default())
    }

    pub fn load_run_pending(&self, run_id: &RunId) -> Result<Vec<PendingOrder>, StateError> {
        let path = self.run_dir(run_id).join(PENDING_FILE);
        Ok(read_json_or_quarantine(&path)?.unwrap_or_default())
    }

    pub fn load_manifest<M: DeserializeOwned>(&self, run_id: &RunId) -> Result<Option<M>, StateError> {
        read_json_or_quarantine(&self.run_dir(run_id).join(MANIFEST_FILE))
    }
}

/// Serialize `value` as pretty JSON to `path` via a sibling `.tmp` file.
pub fn write_json_atomic<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<(), StateError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| StateError::io(parent, e))?;
    }
    let json = serde_json::to_vec_pretty(value).map_err(|e| StateError::json(path, e))?;
    let tmp = tmp_path(path);
    fs::write(&tmp, json).map_err(|e| StateError::io(&tmp, e))?;
    fs::rename(&tmp, path).map_err(|e| {
        let _ = fs::remove_file(&tmp);
        StateError::io(path, e)
    })
}

/// `Ok(None)` when the file does not exist or had to be quarantined.
pub fn read_json_or_quarantine<T: DeserializeOwned>(path: &Path) -> Result<Option<T>, StateError> {
    let bytes = match fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(StateError::io(path, e)),
    };
    match serde_json::from_slice(&bytes) {
        Ok(value) => Ok(Some(value)),
        Err(e) => {
            let quarantine = corrupt_path(path);
            tracing::warn!(
                path = %path.display(),
                error = %e,
                "quarantining unreadable state file"
            );
            fs::rename(path, &quarantine).map_err(|e| StateError::io(path, e))?;
            Ok(None)
        }
    }
}

fn tmp_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".tmp");
    PathBuf::from(name)
}

fn corrupt_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".corrupt");
    PathBuf::from(name)
}

//! StateStore: durable positions and pending orders, merged with broker
//! truth once per run.
//!
//! - `reconcile`: pure merge of broker snapshot and local records
//! - `store`: the working set for the rest of the run and fill settlement
//! - `persist`: global pending store and per-run snapshots on disk

pub mod persist;
pub mod reconcile;
pub mod store;

pub use persist::SnapshotStore;
pub use reconcile::{reconcile, ReconcileEvent, Reconciliation};
pub use store::{FillSource, Settlement, StatusCheck, StateStore};

use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::domain::Ticker;

#[derive(Debug, Error)]
pub enum StateError {
    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("JSON error on {}: {source}", path.display())]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("an ENTRY order is already open for {ticker}")]
    DuplicateEntry { ticker: Ticker },

    #[error("a position is already open for {ticker}")]
    PositionExists { ticker: Ticker },
}

impl StateError {
    pub(crate) fn io(path: &Path, source: std::io::Error) -> Self {
        StateError::Io {
            path: path.to_path_buf(),
            source,
        }
    }

    pub(crate) fn json(path: &Path, source: serde_json::Error) -> Self {
        StateError::Json {
            path: path.to_path_buf(),
            source,
        }
    }
}

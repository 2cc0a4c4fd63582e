use std::{
    collections::{BTreeSet, HashSet},
    io::ErrorKind,
    path::{Path, PathBuf},
};

use parking_lot::Mutex;
use relayer_primitives::prelude::DepositId;
use tokio::{fs, io::AsyncWriteExt};
use tracing::*;

use crate::errors::{LedgerError, LedgerResult};

/// Path of the submission journal kept beside the processed file at `path`.
pub fn journal_path_for(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".pending");
    PathBuf::from(name)
}

#[derive(Debug, Default)]
struct LedgerState {
    /// Processed ids in the order they were recorded.
    processed: Vec<DepositId>,
    processed_index: HashSet<DepositId>,
    /// Ids whose payout submission started without a recorded outcome.
    journal: BTreeSet<DepositId>,
}

impl LedgerState {
    fn insert_processed(&mut self, id: &DepositId) -> bool {
        if self.processed_index.insert(id.clone()) {
            self.processed.push(id.clone());
            true
        } else {
            false
        }
    }
}

/// File backed set of processed deposit ids plus the submission journal.
///
/// Lookups are served from memory. Every mutation rewrites the affected file through a temporary
/// file and a rename, so a crash leaves either the old or the new contents on disk.
#[derive(Debug)]
pub struct DedupLedger {
    path: PathBuf,
    journal_path: PathBuf,
    state: Mutex<LedgerState>,
    /// Serializes file writes so a snapshot taken later is never overwritten by an older one.
    write_lock: tokio::sync::Mutex<()>,
}

impl DedupLedger {
    /// Loads the ledger at `path`, creating an empty one (and its parent directories) if the file
    /// does not exist yet.
    pub async fn load(path: impl Into<PathBuf>) -> LedgerResult<Self> {
        let path = path.into();
        let journal_path = journal_path_for(&path);

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .await
                .map_err(|source| io_err(parent, source))?;
        }

        let mut state = LedgerState::default();

        match read_ids(&path).await? {
            Some(ids) => {
                for id in &ids {
                    state.insert_processed(id);
                }
            }
            None => {
                info!(path = %path.display(), "no processed deposits file, creating an empty one");
                write_ids(&path, &[]).await?;
            }
        }

        if let Some(ids) = read_ids(&journal_path).await? {
            state.journal.extend(ids);
        }

        // an id can be journaled and processed if the process died between the two writes
        let LedgerState {
            journal,
            processed_index,
            ..
        } = &mut state;
        journal.retain(|id| !processed_index.contains(id));

        info!(
            path = %path.display(),
            processed = state.processed.len(),
            unresolved = state.journal.len(),
            "loaded dedup ledger"
        );

        Ok(Self {
            path,
            journal_path,
            state: Mutex::new(state),
            write_lock: tokio::sync::Mutex::new(()),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether the payout for `id` was recorded as submitted.
    pub fn contains(&self, id: &DepositId) -> bool {
        self.state.lock().processed_index.contains(id)
    }

    /// Whether a payout for `id` was started without its outcome being recorded.
    pub fn is_unresolved(&self, id: &DepositId) -> bool {
        self.state.lock().journal.contains(id)
    }

    /// Whether `id` must not be paid (again).
    pub fn is_known(&self, id: &DepositId) -> bool {
        let state = self.state.lock();
        state.processed_index.contains(id) || state.journal.contains(id)
    }

    /// Ids left in the journal, which need an operator to check the destination chain.
    pub fn unresolved(&self) -> Vec<DepositId> {
        self.state.lock().journal.iter().cloned().collect()
    }

    pub fn processed_count(&self) -> usize {
        self.state.lock().processed.len()
    }

    /// Records that the payout for `id` is about to be submitted. Must succeed before the
    /// submission is attempted.
    pub async fn mark_submitting(&self, id: &DepositId) -> LedgerResult<()> {
        let _guard = self.write_lock.lock().await;

        let snapshot = {
            let mut state = self.state.lock();
            if !state.journal.insert(id.clone()) {
                return Ok(());
            }
            state.journal.iter().cloned().collect::<Vec<_>>()
        };

        write_ids(&self.journal_path, &snapshot).await
    }

    /// Records the payout for `id` as submitted and resolves its journal entry.
    ///
    /// The in-memory set is updated even if writing fails, so the deposit is not paid again
    /// during this run.
    pub async fn mark_processed(&self, id: &DepositId) -> LedgerResult<()> {
        let _guard = self.write_lock.lock().await;

        let processed = {
            let mut state = self.state.lock();
            state.insert_processed(id);
            state.processed.clone()
        };
        write_ids(&self.path, &processed).await?;

        let journal = {
            let mut state = self.state.lock();
            if !state.journal.remove(id) {
                return Ok(());
            }
            state.journal.iter().cloned().collect::<Vec<_>>()
        };
        write_ids(&self.journal_path, &journal).await
    }

    /// Drops the journal entry for `id` after a submission that provably never reached the
    /// destination chain.
    pub async fn clear_submitting(&self, id: &DepositId) -> LedgerResult<()> {
        let _guard = self.write_lock.lock().await;

        let journal = {
            let mut state = self.state.lock();
            if !state.journal.remove(id) {
                return Ok(());
            }
            state.journal.iter().cloned().collect::<Vec<_>>()
        };
        write_ids(&self.journal_path, &journal).await
    }
}

fn io_err(path: &Path, source: std::io::Error) -> LedgerError {
    LedgerError::Io {
        path: path.to_path_buf(),
        source,
    }
}

/// Reads a JSON array of ids, `None` if the file does not exist.
async fn read_ids(path: &Path) -> LedgerResult<Option<Vec<DepositId>>> {
    let raw = match fs::read(path).await {
        Ok(raw) => raw,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(io_err(path, e)),
    };

    let invalid = |reason: String| LedgerError::InvalidData {
        path: path.to_path_buf(),
        reason,
    };

    let ids: Vec<String> = serde_json::from_slice(&raw).map_err(|e| invalid(e.to_string()))?;
    ids.into_iter()
        .map(|id| DepositId::new(id).map_err(|e| invalid(e.to_string())))
        .collect::<LedgerResult<Vec<_>>>()
        .map(Some)
}

/// Replaces the file at `path` with a JSON array of `ids`.
async fn write_ids(path: &Path, ids: &[DepositId]) -> LedgerResult<()> {
    let json = serde_json::to_vec_pretty(ids).map_err(|e| LedgerError::InvalidData {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;

    let mut tmp_name = path.as_os_str().to_owned();
    tmp_name.push(".tmp");
    let tmp_path = PathBuf::from(tmp_name);

    let mut file = fs::File::create(&tmp_path)
        .await
        .map_err(|e| io_err(&tmp_path, e))?;
    file.write_all(&json)
        .await
        .map_err(|e| io_err(&tmp_path, e))?;
    file.sync_all().await.map_err(|e| io_err(&tmp_path, e))?;
    drop(file);

    fs::rename(&tmp_path, path)
        .await
        .map_err(|e| io_err(path, e))?;

    trace!(path = %path.display(), count = ids.len(), "ledger file written");
    Ok(())
}

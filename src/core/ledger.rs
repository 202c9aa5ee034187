//! Append-only audit ledger.
//!
//! The checkpoint and revert flows only ever *append* to the ledger. The
//! `AuditLedger` trait is that narrow seam; `JsonlLedger` is the local
//! implementation: one JSON record per line, each chained to its
//! predecessor by SHA-256 so truncation or edits are detectable.

use crate::core::error::FailsafeError;
use crate::core::time;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use tracing::warn;

pub const SOVEREIGN_AGENT: &str = "user:sovereign";

const GENESIS_HASH: &str = "0000000000000000000000000000000000000000000000000000000000000000";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LedgerEventType {
    CheckpointCreated,
    GovernancePaused,
    GovernanceResumed,
    ExternalDrift,
    CheckpointReverted,
}

impl LedgerEventType {
    pub fn as_str(self) -> &'static str {
        match self {
            LedgerEventType::CheckpointCreated => "CHECKPOINT_CREATED",
            LedgerEventType::GovernancePaused => "GOVERNANCE_PAUSED",
            LedgerEventType::GovernanceResumed => "GOVERNANCE_RESUMED",
            LedgerEventType::ExternalDrift => "EXTERNAL_DRIFT",
            LedgerEventType::CheckpointReverted => "CHECKPOINT_REVERTED",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub event_type: LedgerEventType,
    pub agent_did: String,
    pub payload: serde_json::Value,
}

impl LedgerEntry {
    pub fn new(event_type: LedgerEventType, agent_did: &str, payload: serde_json::Value) -> Self {
        Self {
            event_type,
            agent_did: agent_did.to_string(),
            payload,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerReceipt {
    pub id: String,
}

pub trait AuditLedger {
    fn append_entry(&self, entry: LedgerEntry) -> Result<LedgerReceipt, FailsafeError>;

    /// Reference to the newest record, if the ledger exposes one.
    fn chain_head(&self) -> Option<String> {
        None
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerRecord {
    pub id: String,
    pub ts: String,
    #[serde(flatten)]
    pub entry: LedgerEntry,
    pub prev_hash: String,
    pub entry_hash: String,
}

/// Hash of the newest record and the file length it was read at.
struct ChainTail {
    len: u64,
    hash: String,
}

/// Appends are serialized in-process by a mutex and across processes by an
/// exclusive advisory lock on the ledger file. The cached tail is trusted
/// only while the file length still matches it.
pub struct JsonlLedger {
    path: PathBuf,
    tail: Mutex<Option<ChainTail>>,
}

impl JsonlLedger {
    pub fn new(path: &Path) -> Self {
        Self {
            path: path.to_path_buf(),
            tail: Mutex::new(None),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// All records in append order. A final line without its newline is an
    /// interrupted append and is not a record. Any other unparsable line is
    /// an error.
    pub fn records(&self) -> Result<Vec<LedgerRecord>, FailsafeError> {
        let bytes = match fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(FailsafeError::IoError(e)),
        };
        bytes[..complete_len(&bytes)]
            .split(|b| *b == b'\n')
            .filter(|line| !line.trim_ascii().is_empty())
            .map(|line| serde_json::from_slice(line).map_err(FailsafeError::JsonError))
            .collect()
    }

    /// Re-derive every hash; returns the id of the first broken record.
    pub fn verify_chain(&self) -> Result<Option<String>, FailsafeError> {
        let mut prev = GENESIS_HASH.to_string();
        for record in self.records()? {
            let expected = entry_hash(&prev, &record.id, &record.ts, &record.entry)?;
            if record.prev_hash != prev || record.entry_hash != expected {
                return Ok(Some(record.id));
            }
            prev = record.entry_hash;
        }
        Ok(None)
    }

    fn lock_tail(&self) -> Result<MutexGuard<'_, Option<ChainTail>>, FailsafeError> {
        self.tail
            .lock()
            .map_err(|_| FailsafeError::Collaborator("ledger lock poisoned".to_string()))
    }

    /// Read the newest complete record from disk.
    fn read_tail(&self) -> Result<ChainTail, FailsafeError> {
        let bytes = match fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => Vec::new(),
            Err(e) => return Err(FailsafeError::IoError(e)),
        };
        let len = complete_len(&bytes);
        let hash = match bytes[..len]
            .split(|b| *b == b'\n')
            .rfind(|line| !line.trim_ascii().is_empty())
        {
            Some(line) => serde_json::from_slice::<LedgerRecord>(line)?.entry_hash,
            None => GENESIS_HASH.to_string(),
        };
        Ok(ChainTail {
            len: len as u64,
            hash,
        })
    }

    /// Cached tail if the file has not moved since, else a fresh read.
    fn current_tail(
        &self,
        cached: &mut Option<ChainTail>,
        file_len: u64,
    ) -> Result<String, FailsafeError> {
        if let Some(tail) = cached.as_ref().filter(|t| t.len == file_len) {
            return Ok(tail.hash.clone());
        }
        let tail = self.read_tail()?;
        let hash = tail.hash.clone();
        *cached = Some(tail);
        Ok(hash)
    }
}

/// Length of the prefix that ends in a newline.
fn complete_len(bytes: &[u8]) -> usize {
    bytes
        .iter()
        .rposition(|b| *b == b'\n')
        .map_or(0, |i| i + 1)
}

fn entry_hash(
    prev: &str,
    id: &str,
    ts: &str,
    entry: &LedgerEntry,
) -> Result<String, FailsafeError> {
    let canonical = serde_json::to_string(entry)?;
    let mut hasher = Sha256::new();
    hasher.update(prev.as_bytes());
    hasher.update(id.as_bytes());
    hasher.update(ts.as_bytes());
    hasher.update(canonical.as_bytes());
    Ok(format!("{:x}", hasher.finalize()))
}

impl AuditLedger for JsonlLedger {
    fn append_entry(&self, entry: LedgerEntry) -> Result<LedgerReceipt, FailsafeError> {
        let mut cached = self.lock_tail()?;

        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(FailsafeError::IoError)?;
        }
        let mut f = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(FailsafeError::IoError)?;
        // Released when `f` drops.
        f.lock().map_err(FailsafeError::IoError)?;

        let file_len = f.metadata().map_err(FailsafeError::IoError)?.len();
        let prev_hash = self.current_tail(&mut cached, file_len)?;
        let complete = cached.as_ref().map_or(file_len, |t| t.len);
        if complete < file_len {
            warn!(
                path = %self.path.display(),
                dropped_bytes = file_len - complete,
                "truncating interrupted ledger append"
            );
            f.set_len(complete).map_err(FailsafeError::IoError)?;
        }

        let id = time::new_event_id();
        let ts = time::now_rfc3339();
        let hash = entry_hash(&prev_hash, &id, &ts, &entry)?;
        let record = LedgerRecord {
            id: id.clone(),
            ts,
            entry,
            prev_hash,
            entry_hash: hash.clone(),
        };

        let mut line = serde_json::to_string(&record)?;
        line.push('\n');
        f.write_all(line.as_bytes()).map_err(FailsafeError::IoError)?;
        f.sync_data().map_err(FailsafeError::IoError)?;

        *cached = Some(ChainTail {
            len: complete + line.len() as u64,
            hash,
        });
        Ok(LedgerReceipt { id })
    }

    fn chain_head(&self) -> Option<String> {
        let mut cached = self.lock_tail().ok()?;
        let file_len = fs::metadata(&self.path).ok()?.len();
        let hash = self.current_tail(&mut cached, file_len).ok()?;
        (hash != GENESIS_HASH).then_some(hash)
    }
}

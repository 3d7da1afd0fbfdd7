use std::collections::HashMap;
use std::fs::{self, File};
use std::io::{Read, Write};
use std::path::PathBuf;

use anyhow::{Context, Result};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_with::skip_serializing_none;
use tracing::debug;

use crate::{DocumentId, DocumentInfo};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum BookKind {
    #[default]
    Local,
    Online,
}

/// Where a reader left off in one document.
///
/// `readed_count` is a byte offset for local documents and an opaque
/// source-defined position for online ones. `section_path` locates the
/// remote section an online parser should resume from.
#[skip_serializing_none]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct BookState {
    pub kind: BookKind,
    pub readed_count: u64,
    pub section_path: Option<String>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum StoredRecord {
    Legacy(u64),
    Record(BookState),
}

impl BookState {
    pub fn local(readed_count: u64) -> Self {
        Self {
            kind: BookKind::Local,
            readed_count,
            section_path: None,
        }
    }

    /// Parses a stored record. A bare integer is the pre-record format and
    /// always denotes a local byte offset.
    pub fn from_json(raw: &str) -> Result<Self> {
        let record: StoredRecord = serde_json::from_str(raw).context("invalid book state")?;
        Ok(match record {
            StoredRecord::Legacy(readed_count) => Self::local(readed_count),
            StoredRecord::Record(state) => state,
        })
    }
}

pub trait StateStore: Send + Sync {
    fn load(&self, doc: &DocumentInfo) -> Result<Option<BookState>>;
    fn save(&self, doc: &DocumentInfo, state: &BookState) -> Result<()>;
}

pub struct FileStateStore {
    root: PathBuf,
}

impl FileStateStore {
    pub fn new(root: PathBuf) -> Result<Self> {
        fs::create_dir_all(&root)
            .with_context(|| format!("failed to create state directory at {:?}", root))?;
        Ok(Self { root })
    }

    fn state_path(&self, doc: &DocumentInfo) -> PathBuf {
        self.root.join(format!("{}.json", doc.id))
    }
}

impl StateStore for FileStateStore {
    fn load(&self, doc: &DocumentInfo) -> Result<Option<BookState>> {
        let path = self.state_path(doc);
        if !path.exists() {
            return Ok(None);
        }
        let mut file =
            File::open(&path).with_context(|| format!("failed to open state file {:?}", path))?;
        let mut buf = String::new();
        file.read_to_string(&mut buf)?;
        let state = BookState::from_json(&buf)
            .with_context(|| format!("failed to decode state file {:?}", path))?;
        Ok(Some(state))
    }

    fn save(&self, doc: &DocumentInfo, state: &BookState) -> Result<()> {
        let path = self.state_path(doc);
        let tmp = path.with_extension("json.tmp");
        let payload = serde_json::to_string_pretty(state)?;
        let mut file = File::create(&tmp)
            .with_context(|| format!("failed to open temp state file {:?}", tmp))?;
        file.write_all(payload.as_bytes())?;
        file.flush()?;
        fs::rename(tmp, &path)?;
        debug!(doc = %doc.id, readed_count = state.readed_count, "saved book state");
        Ok(())
    }
}

#[derive(Default)]
pub struct MemoryStateStore {
    inner: Mutex<HashMap<DocumentId, BookState>>,
}

impl MemoryStateStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl StateStore for MemoryStateStore {
    fn load(&self, doc: &DocumentInfo) -> Result<Option<BookState>> {
        Ok(self.inner.lock().get(&doc.id).cloned())
    }

    fn save(&self, doc: &DocumentInfo, state: &BookState) -> Result<()> {
        self.inner.lock().insert(doc.id, state.clone());
        Ok(())
    }
}

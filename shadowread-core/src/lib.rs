use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use once_cell::sync::Lazy;
use parking_lot::Mutex;
use tracing::{info, instrument, warn};
use uuid::Uuid;

pub mod config;
pub mod decode;
pub mod error;
pub mod navigator;
pub mod outline;
pub mod search;
pub mod source;
pub mod store;

pub use config::ReaderConfig;
pub use decode::CHAR_WIDTH;
pub use error::{DecodeError, ReaderError};
pub use navigator::{PageNavigator, PageResult};
pub use search::{MatchMode, SearchEngine, DEFAULT_SEARCH_WINDOW};
pub use source::{ByteSource, FileByteSource, MemoryByteSource};
pub use store::{BookKind, BookState, FileStateStore, MemoryStateStore, StateStore};

pub type DocumentId = Uuid;

static DOCUMENT_NAMESPACE: Lazy<Uuid> = Lazy::new(|| {
    Uuid::parse_str("3f0c1e55-8d2a-5b7e-9c41-2b6d8a9e7f10").expect("valid namespace UUID")
});

/// Shown in place of a page once the document has no more text.
pub const END_OF_DOCUMENT_TIP: &str = "";

pub fn document_id_for_path(path: &Path) -> DocumentId {
    let resolved = path
        .canonicalize()
        .or_else(|_| {
            if path.is_absolute() {
                Ok(path.to_path_buf())
            } else {
                std::env::current_dir().map(|cwd| cwd.join(path))
            }
        })
        .unwrap_or_else(|_| path.to_path_buf());
    let rendered = resolved.to_string_lossy();
    Uuid::new_v5(&*DOCUMENT_NAMESPACE, rendered.as_bytes())
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentInfo {
    pub id: DocumentId,
    pub path: PathBuf,
}

impl DocumentInfo {
    pub fn for_path(path: PathBuf) -> Self {
        Self {
            id: document_id_for_path(&path),
            path,
        }
    }
}

/// A readable document: the local fixed-width navigator or a remote source.
pub trait Parser: Send {
    fn fetch_forward(&mut self, page_size: usize) -> Result<PageResult, ReaderError>;
    fn fetch_backward(&mut self, page_size: usize) -> Result<PageResult, ReaderError>;
    fn current_percent(&self) -> String;
    fn persisted_state(&self) -> BookState;

    /// Chapter headings, for sources that can produce them.
    fn outline(&mut self) -> Result<Vec<String>, ReaderError> {
        Ok(Vec::new())
    }

    /// Releases the underlying handle. Safe to call more than once.
    fn release(&mut self);
}

#[async_trait::async_trait]
pub trait ParserProvider: Send + Sync {
    async fn open(&self, path: &Path, state: &BookState) -> Result<Box<dyn Parser>>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    NextPage { count: usize },
    PrevPage { count: usize },
    Search { keyword: String },
    CloseDocument,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    DocumentOpened(DocumentId),
    DocumentClosed(DocumentId),
    PageChanged(DocumentId),
    EndOfDocument(DocumentId),
}

pub struct ActiveDocument {
    pub info: DocumentInfo,
    parser: Box<dyn Parser>,
    /// Position of the last page shown. Only this is ever written back.
    committed: BookState,
}

/// Holds the one document being read and routes commands to it.
pub struct Session {
    active: Option<ActiveDocument>,
    store: Arc<dyn StateStore>,
    config: ReaderConfig,
    search: SearchEngine,
    events: Arc<Mutex<Vec<SessionEvent>>>,
}

impl Session {
    pub fn new(store: Arc<dyn StateStore>, config: ReaderConfig) -> Self {
        let search = config.search_engine();
        Self {
            active: None,
            store,
            config,
            search,
            events: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn events(&self) -> Arc<Mutex<Vec<SessionEvent>>> {
        Arc::clone(&self.events)
    }

    pub fn active(&self) -> Option<&ActiveDocument> {
        self.active.as_ref()
    }

    pub fn config(&self) -> &ReaderConfig {
        &self.config
    }

    /// Opens `path` as the active document and returns its first status text.
    ///
    /// The previously active document is released before the new one is opened.
    #[instrument(skip(self, provider))]
    pub async fn open_with<P: ParserProvider>(
        &mut self,
        provider: &P,
        path: PathBuf,
    ) -> Result<String> {
        self.close();

        let info = DocumentInfo::for_path(path);
        let state = self.store.load(&info)?.unwrap_or_default();
        let parser = provider
            .open(&info.path, &state)
            .await
            .with_context(|| format!("failed to open {:?}", info.path))?;
        info!(doc = %info.id, kind = ?state.kind, readed_count = state.readed_count, "opened document");

        self.events.lock().push(SessionEvent::DocumentOpened(info.id));
        self.active = Some(ActiveDocument {
            info,
            parser,
            committed: state,
        });
        self.next_page(1)
    }

    pub fn apply(&mut self, command: Command) -> Result<String> {
        match command {
            Command::NextPage { count } => self.next_page(count),
            Command::PrevPage { count } => self.prev_page(count),
            Command::Search { keyword } => self.search(&keyword),
            Command::CloseDocument => {
                self.close();
                Ok(END_OF_DOCUMENT_TIP.to_string())
            }
        }
    }

    fn next_page(&mut self, count: usize) -> Result<String> {
        let page_size = self.config.page_size;
        let doc = self.active_mut()?;
        let mut page = PageResult::end_of_document();
        for _ in 0..count.max(1) {
            page = doc.parser.fetch_forward(page_size)?;
            if page.is_end_of_document() {
                break;
            }
        }
        self.present(page)
    }

    fn prev_page(&mut self, count: usize) -> Result<String> {
        let page_size = self.config.page_size;
        let doc = self.active_mut()?;
        let mut page = PageResult::end_of_document();
        for _ in 0..count.max(1) {
            page = doc.parser.fetch_backward(page_size)?;
        }
        self.present(page)
    }

    fn search(&mut self, keyword: &str) -> Result<String> {
        let page_size = self.config.page_size;
        let engine = self.search;
        let doc = self.active_mut()?;
        let page = engine.search_forward(doc.parser.as_mut(), keyword, page_size)?;
        self.present(page)
    }

    /// Formats a page for display and commits the reading position.
    fn present(&mut self, page: PageResult) -> Result<String> {
        let doc = self.active_mut()?;
        let id = doc.info.id;
        if page.is_end_of_document() {
            self.events.lock().push(SessionEvent::EndOfDocument(id));
            return Ok(END_OF_DOCUMENT_TIP.to_string());
        }

        let percent = doc.parser.current_percent();
        doc.committed = doc.parser.persisted_state();
        let (info, state) = (doc.info.clone(), doc.committed.clone());
        self.store.save(&info, &state)?;
        self.events.lock().push(SessionEvent::PageChanged(id));
        Ok(format!("{}   {}", page.text, percent))
    }

    pub fn outline(&mut self) -> Result<Vec<String>> {
        Ok(self.active_mut()?.parser.outline()?)
    }

    pub fn percent(&self) -> Option<String> {
        self.active.as_ref().map(|doc| doc.parser.current_percent())
    }

    /// Saves the position of the last page shown. Reads that failed or were
    /// never displayed do not move it.
    pub fn persist(&self) -> Result<()> {
        if let Some(doc) = &self.active {
            self.store.save(&doc.info, &doc.committed)?;
        }
        Ok(())
    }

    /// Releases the active document, if any.
    pub fn close(&mut self) {
        if let Some(mut doc) = self.active.take() {
            if let Err(err) = self.store.save(&doc.info, &doc.committed) {
                warn!(doc = %doc.info.id, "failed to save state on close: {err:#}");
            }
            doc.parser.release();
            self.events
                .lock()
                .push(SessionEvent::DocumentClosed(doc.info.id));
        }
    }

    fn active_mut(&mut self) -> Result<&mut ActiveDocument> {
        self.active
            .as_mut()
            .ok_or_else(|| anyhow!("no document is open"))
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.close();
    }
}

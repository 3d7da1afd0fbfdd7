use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use parking_lot::RwLock;
use shadowread_core::{
    BookKind, BookState, FileByteSource, PageNavigator, Parser, ParserProvider, ReaderError,
};
use tracing::{info, instrument};
use url::Url;

/// A remote book site able to serve sections below `base_url`.
pub trait RemoteSource: Send + Sync {
    fn base_url(&self) -> &Url;

    /// Builds a parser resuming at `section` with the site-defined position `readed_count`.
    fn open(&self, section: &Url, readed_count: u64, book_path: &Path) -> Result<Box<dyn Parser>>;
}

/// Picks the parser for a document from its persisted record: local files
/// are read through [`PageNavigator`], online records go to the registered
/// remote source whose base URL prefixes the stored section locator.
#[derive(Default)]
pub struct SourceFactory {
    remotes: RwLock<Vec<Arc<dyn RemoteSource>>>,
}

impl SourceFactory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, remote: Arc<dyn RemoteSource>) {
        info!(base = %remote.base_url(), "registered remote source");
        self.remotes.write().push(remote);
    }

    fn open_local(&self, path: &Path, state: &BookState) -> Result<Box<dyn Parser>> {
        let source = FileByteSource::open(path)
            .with_context(|| format!("failed to open book file {:?}", path))?;
        Ok(Box::new(PageNavigator::new(source, state.readed_count)))
    }

    fn open_online(&self, path: &Path, state: &BookState) -> Result<Box<dyn Parser>> {
        let locator = state
            .section_path
            .as_deref()
            .ok_or_else(|| ReaderError::UnsupportedSource("online book without a section".into()))?;
        let section = Url::parse(locator)
            .map_err(|_| ReaderError::UnsupportedSource(format!("invalid section url {locator}")))?;

        let remote = self
            .remotes
            .read()
            .iter()
            .find(|remote| section.as_str().starts_with(remote.base_url().as_str()))
            .cloned()
            .ok_or_else(|| ReaderError::UnsupportedSource(format!("book url {locator}")))?;
        remote.open(&section, state.readed_count, path)
    }
}

#[async_trait]
impl ParserProvider for SourceFactory {
    #[instrument(skip(self, state))]
    async fn open(&self, path: &Path, state: &BookState) -> Result<Box<dyn Parser>> {
        match state.kind {
            BookKind::Local => self.open_local(path, state),
            BookKind::Online => self.open_online(path, state),
        }
    }
}

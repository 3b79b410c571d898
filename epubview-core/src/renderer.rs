use std::fmt;
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use bytes::Bytes;

use crate::binding::RendererCallbacks;
use crate::model::{Chapter, Metadata, Page, SearchResult};

/// Where a document comes from.
#[derive(Clone, PartialEq, Eq)]
pub enum DocumentSource {
    /// A path or URL the engine loads itself.
    Link(String),
    /// The full content of an EPUB file.
    Bytes(Bytes),
}

impl fmt::Debug for DocumentSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DocumentSource::Link(link) => f.debug_tuple("Link").field(link).finish(),
            DocumentSource::Bytes(bytes) => write!(f, "Bytes({} bytes)", bytes.len()),
        }
    }
}

/// The host-designated area a renderer paints into.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderRegion {
    pub name: String,
    pub padding: Option<String>,
}

/// Capabilities the session needs from an EPUB rendering engine.
///
/// Implementations may invoke the [`RendererCallbacks`] they were created with
/// at any point, including from inside these methods.
#[async_trait]
pub trait Renderer: Send + Sync {
    fn attach(&self, region: &RenderRegion) -> Result<()>;

    fn display_page(&self, page: usize) -> Result<()>;
    fn display_url(&self, url: &str) -> Result<()>;
    fn display_cfi(&self, cfi: &str) -> Result<()>;
    fn next_page(&self) -> Result<()>;
    fn previous_page(&self) -> Result<()>;

    /// Lays out the whole book. Expensive, and usually moves the visible page
    /// around while it runs.
    async fn generate_pagination(&self) -> Result<Vec<Page>>;
    async fn metadata(&self) -> Result<Metadata>;
    async fn table_of_contents(&self) -> Result<Vec<Chapter>>;

    fn set_style(&self, name: &str, value: &str) -> Result<()>;
    fn remove_style(&self, name: &str) -> Result<()>;

    /// Searches the chapter that is currently displayed, never the whole book.
    async fn find(&self, query: &str) -> Result<Vec<SearchResult>>;

    fn current_location(&self) -> Option<String>;
    fn page_from_cfi(&self, cfi: &str) -> Option<usize>;

    fn destroy(&self);
}

pub trait RendererFactory: Send + Sync {
    fn create(
        &self,
        source: DocumentSource,
        callbacks: RendererCallbacks,
    ) -> Result<Arc<dyn Renderer>>;
}

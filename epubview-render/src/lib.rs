use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use epubview_core::{
    Chapter, DocumentSource, Metadata, Page, RenderRegion, Renderer, RendererCallbacks,
    RendererFactory, SearchResult, VisibleRange,
};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

/// Canned engine behaviour for one book.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct RendererScript {
    /// What pagination generates, in reading order.
    pub pages: Vec<Page>,
    pub metadata: Metadata,
    pub toc: Vec<Chapter>,
    /// Spine items reachable through href navigation.
    pub chapters: Vec<Chapter>,
    /// Hits per query. Unknown queries find nothing.
    pub search: HashMap<String, Vec<SearchResult>>,
    /// CFI the engine reports before any navigation.
    pub location: Option<String>,
    pub failures: ScriptFailures,
}

/// Operations that should fail, with the reason the engine gives.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct ScriptFailures {
    pub open: Option<String>,
    pub pagination: Option<String>,
    pub metadata: Option<String>,
    pub toc: Option<String>,
    pub find: Option<String>,
}

impl RendererScript {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("failed to read renderer script {:?}", path))?;
        serde_json::from_str(&raw)
            .with_context(|| format!("failed to decode renderer script {:?}", path))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "call", rename_all = "kebab-case")]
pub enum RendererCall {
    Create { source: String },
    Attach { region: String, padding: Option<String> },
    DisplayPage { page: usize },
    DisplayUrl { url: String },
    DisplayCfi { cfi: String },
    NextPage,
    PreviousPage,
    GeneratePagination,
    Metadata,
    TableOfContents,
    SetStyle { name: String, value: String },
    RemoveStyle { name: String },
    Find { query: String },
    Destroy,
}

type Journal = Arc<Mutex<Vec<RendererCall>>>;

/// Builds [`ScriptedRenderer`]s and keeps a journal of every call made to them.
pub struct ScriptedRendererFactory {
    script: RendererScript,
    journal: Journal,
    current: Mutex<Option<Arc<ScriptedRenderer>>>,
}

impl ScriptedRendererFactory {
    pub fn new(script: RendererScript) -> Self {
        Self {
            script,
            journal: Arc::new(Mutex::new(Vec::new())),
            current: Mutex::new(None),
        }
    }

    /// The most recently created renderer.
    pub fn current(&self) -> Option<Arc<ScriptedRenderer>> {
        self.current.lock().clone()
    }

    pub fn drain_calls(&self) -> Vec<RendererCall> {
        std::mem::take(&mut *self.journal.lock())
    }
}

impl RendererFactory for ScriptedRendererFactory {
    fn create(
        &self,
        source: DocumentSource,
        callbacks: RendererCallbacks,
    ) -> Result<Arc<dyn Renderer>> {
        let described = match &source {
            DocumentSource::Link(link) => format!("link:{link}"),
            DocumentSource::Bytes(bytes) => format!("bytes:{}", bytes.len()),
        };
        self.journal.lock().push(RendererCall::Create {
            source: described,
        });
        if let Some(reason) = &self.script.failures.open {
            return Err(anyhow!("{reason}"));
        }

        let renderer = Arc::new(ScriptedRenderer {
            script: self.script.clone(),
            callbacks,
            journal: Arc::clone(&self.journal),
            location: Mutex::new(self.script.location.clone()),
        });
        *self.current.lock() = Some(Arc::clone(&renderer));
        Ok(renderer)
    }
}

pub struct ScriptedRenderer {
    script: RendererScript,
    callbacks: RendererCallbacks,
    journal: Journal,
    location: Mutex<Option<String>>,
}

impl ScriptedRenderer {
    /// Engine-side events, for drivers that stand in for the engine.
    pub fn callbacks(&self) -> &RendererCallbacks {
        &self.callbacks
    }

    fn record(&self, call: RendererCall) {
        self.journal.lock().push(call);
    }

    fn find_page(&self, page: usize) -> Option<&Page> {
        self.script.pages.iter().find(|p| p.page == page)
    }

    fn current_page(&self) -> Option<usize> {
        let cfi = self.location.lock().clone()?;
        self.page_from_cfi(&cfi)
    }

    /// Moves to `cfi` and reports it the way an engine would.
    fn relocate(&self, cfi: String, page: Option<usize>) {
        *self.location.lock() = Some(cfi.clone());
        self.callbacks.page_changed(page);
        self.callbacks.visible_range_changed(VisibleRange {
            start: cfi.clone(),
            end: cfi,
        });
    }
}

#[async_trait]
impl Renderer for ScriptedRenderer {
    fn attach(&self, region: &RenderRegion) -> Result<()> {
        self.record(RendererCall::Attach {
            region: region.name.clone(),
            padding: region.padding.clone(),
        });
        Ok(())
    }

    fn display_page(&self, page: usize) -> Result<()> {
        self.record(RendererCall::DisplayPage { page });
        let target = self
            .find_page(page)
            .cloned()
            .ok_or_else(|| anyhow!("page {page} is not part of the pagination"))?;
        self.relocate(target.cfi, Some(target.page));
        Ok(())
    }

    fn display_url(&self, url: &str) -> Result<()> {
        self.record(RendererCall::DisplayUrl {
            url: url.to_owned(),
        });
        let href = url.split('#').next().unwrap_or_default();
        let chapter = self
            .script
            .chapters
            .iter()
            .find(|chapter| chapter.href == href)
            .cloned()
            .ok_or_else(|| anyhow!("no spine item for {url}"))?;
        self.callbacks.chapter_unloaded();
        self.callbacks.chapter_displayed(chapter);
        Ok(())
    }

    fn display_cfi(&self, cfi: &str) -> Result<()> {
        self.record(RendererCall::DisplayCfi {
            cfi: cfi.to_owned(),
        });
        let page = self.page_from_cfi(cfi);
        self.relocate(cfi.to_owned(), page);
        Ok(())
    }

    fn next_page(&self) -> Result<()> {
        self.record(RendererCall::NextPage);
        let next = self.current_page().map_or(1, |page| page + 1);
        match self.find_page(next).cloned() {
            Some(target) => self.relocate(target.cfi, Some(target.page)),
            None => debug!(page = next, "already at the last page"),
        }
        Ok(())
    }

    fn previous_page(&self) -> Result<()> {
        self.record(RendererCall::PreviousPage);
        let Some(previous) = self.current_page().and_then(|page| page.checked_sub(1)) else {
            return Ok(());
        };
        if let Some(target) = self.find_page(previous).cloned() {
            self.relocate(target.cfi, Some(target.page));
        }
        Ok(())
    }

    #[instrument(skip(self))]
    async fn generate_pagination(&self) -> Result<Vec<Page>> {
        self.record(RendererCall::GeneratePagination);
        if let Some(reason) = &self.script.failures.pagination {
            return Err(anyhow!("{reason}"));
        }
        let restore = self.location.lock().clone();
        for page in &self.script.pages {
            // laying out a page moves the view onto it
            self.callbacks.page_changed(Some(page.page));
            tokio::task::yield_now().await;
        }
        *self.location.lock() = restore;
        Ok(self.script.pages.clone())
    }

    async fn metadata(&self) -> Result<Metadata> {
        self.record(RendererCall::Metadata);
        match &self.script.failures.metadata {
            Some(reason) => Err(anyhow!("{reason}")),
            None => Ok(self.script.metadata.clone()),
        }
    }

    async fn table_of_contents(&self) -> Result<Vec<Chapter>> {
        self.record(RendererCall::TableOfContents);
        match &self.script.failures.toc {
            Some(reason) => Err(anyhow!("{reason}")),
            None => Ok(self.script.toc.clone()),
        }
    }

    fn set_style(&self, name: &str, value: &str) -> Result<()> {
        self.record(RendererCall::SetStyle {
            name: name.to_owned(),
            value: value.to_owned(),
        });
        Ok(())
    }

    fn remove_style(&self, name: &str) -> Result<()> {
        self.record(RendererCall::RemoveStyle {
            name: name.to_owned(),
        });
        Ok(())
    }

    async fn find(&self, query: &str) -> Result<Vec<SearchResult>> {
        self.record(RendererCall::Find {
            query: query.to_owned(),
        });
        tokio::task::yield_now().await;
        if let Some(reason) = &self.script.failures.find {
            return Err(anyhow!("{reason}"));
        }
        Ok(self
            .script
            .search
            .get(query.trim())
            .cloned()
            .unwrap_or_default())
    }

    fn current_location(&self) -> Option<String> {
        self.location.lock().clone()
    }

    fn page_from_cfi(&self, cfi: &str) -> Option<usize> {
        self.script
            .pages
            .iter()
            .find(|page| page.cfi == cfi)
            .map(|page| page.page)
    }

    fn destroy(&self) {
        self.record(RendererCall::Destroy);
    }
}

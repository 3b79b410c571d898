//! Scriptable renderer doubles shared by the unit tests.

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use tokio::sync::oneshot;

use crate::binding::RendererCallbacks;
use crate::file::FileReader;
use crate::model::{Chapter, Metadata, Page, SearchResult};
use crate::renderer::{DocumentSource, RenderRegion, Renderer, RendererFactory};

type Reply<T> = oneshot::Sender<Result<T, String>>;

pub(crate) struct FakeRenderer {
    pub source: DocumentSource,
    callbacks: RendererCallbacks,
    calls: Mutex<Vec<String>>,
    pagination_waiters: Mutex<Vec<Reply<Vec<Page>>>>,
    find_waiters: Mutex<Vec<Reply<Vec<SearchResult>>>>,
    pages: Mutex<Vec<Page>>,
    location: Mutex<Option<String>>,
    metadata: Mutex<Result<Metadata, String>>,
    toc: Mutex<Result<Vec<Chapter>, String>>,
}

impl FakeRenderer {
    fn new(source: DocumentSource, callbacks: RendererCallbacks) -> Self {
        Self {
            source,
            callbacks,
            calls: Mutex::new(Vec::new()),
            pagination_waiters: Mutex::new(Vec::new()),
            find_waiters: Mutex::new(Vec::new()),
            pages: Mutex::new(Vec::new()),
            location: Mutex::new(None),
            metadata: Mutex::new(Ok(Metadata::default())),
            toc: Mutex::new(Ok(Vec::new())),
        }
    }

    pub fn callbacks(&self) -> &RendererCallbacks {
        &self.callbacks
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }

    pub fn count(&self, prefix: &str) -> usize {
        self.calls
            .lock()
            .iter()
            .filter(|call| call.starts_with(prefix))
            .count()
    }

    pub fn set_location(&self, cfi: &str) {
        *self.location.lock() = Some(cfi.to_owned());
    }

    pub fn set_metadata(&self, metadata: Result<Metadata, String>) {
        *self.metadata.lock() = metadata;
    }

    pub fn set_toc(&self, toc: Result<Vec<Chapter>, String>) {
        *self.toc.lock() = toc;
    }

    pub fn pagination_in_flight(&self) -> usize {
        self.pagination_waiters.lock().len()
    }

    pub fn finish_pagination(&self, outcome: Result<Vec<Page>, String>) {
        if let Ok(pages) = &outcome {
            *self.pages.lock() = pages.clone();
        }
        let waiter = self.pagination_waiters.lock().remove(0);
        let _ = waiter.send(outcome);
    }

    pub fn finish_find(&self, outcome: Result<Vec<SearchResult>, String>) {
        let waiter = self.find_waiters.lock().remove(0);
        let _ = waiter.send(outcome);
    }

    fn record(&self, call: String) {
        self.calls.lock().push(call);
    }
}

async fn wait<T>(rx: oneshot::Receiver<Result<T, String>>) -> Result<T> {
    match rx.await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(reason)) => Err(anyhow!(reason)),
        Err(_) => Err(anyhow!("request abandoned")),
    }
}

#[async_trait]
impl Renderer for FakeRenderer {
    fn attach(&self, region: &RenderRegion) -> Result<()> {
        self.record(format!(
            "attach:{}:{}",
            region.name,
            region.padding.as_deref().unwrap_or("")
        ));
        Ok(())
    }

    fn display_page(&self, page: usize) -> Result<()> {
        self.record(format!("display_page:{page}"));
        Ok(())
    }

    fn display_url(&self, url: &str) -> Result<()> {
        self.record(format!("display_url:{url}"));
        Ok(())
    }

    fn display_cfi(&self, cfi: &str) -> Result<()> {
        self.record(format!("display_cfi:{cfi}"));
        Ok(())
    }

    fn next_page(&self) -> Result<()> {
        self.record("next_page".into());
        Ok(())
    }

    fn previous_page(&self) -> Result<()> {
        self.record("previous_page".into());
        Ok(())
    }

    async fn generate_pagination(&self) -> Result<Vec<Page>> {
        self.record("generate_pagination".into());
        let (tx, rx) = oneshot::channel();
        self.pagination_waiters.lock().push(tx);
        wait(rx).await
    }

    async fn metadata(&self) -> Result<Metadata> {
        self.record("metadata".into());
        self.metadata.lock().clone().map_err(|reason| anyhow!(reason))
    }

    async fn table_of_contents(&self) -> Result<Vec<Chapter>> {
        self.record("table_of_contents".into());
        self.toc.lock().clone().map_err(|reason| anyhow!(reason))
    }

    fn set_style(&self, name: &str, value: &str) -> Result<()> {
        self.record(format!("set_style:{name}={value}"));
        Ok(())
    }

    fn remove_style(&self, name: &str) -> Result<()> {
        self.record(format!("remove_style:{name}"));
        Ok(())
    }

    async fn find(&self, query: &str) -> Result<Vec<SearchResult>> {
        self.record(format!("find:{query}"));
        let (tx, rx) = oneshot::channel();
        self.find_waiters.lock().push(tx);
        wait(rx).await
    }

    fn current_location(&self) -> Option<String> {
        self.location.lock().clone()
    }

    fn page_from_cfi(&self, cfi: &str) -> Option<usize> {
        self.pages
            .lock()
            .iter()
            .find(|page| page.cfi == cfi)
            .map(|page| page.page)
    }

    fn destroy(&self) {
        self.record("destroy".into());
    }
}

#[derive(Default)]
pub(crate) struct FakeFactory {
    created: Mutex<Vec<Arc<FakeRenderer>>>,
    fail: Mutex<Option<String>>,
    ready_on_create: AtomicBool,
}

impl FakeFactory {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn fail_with(&self, reason: &str) {
        *self.fail.lock() = Some(reason.to_owned());
    }

    /// Renderers report document-ready before `create` returns.
    pub fn fire_ready_on_create(&self) {
        self.ready_on_create.store(true, Ordering::SeqCst);
    }

    pub fn created(&self) -> usize {
        self.created.lock().len()
    }

    pub fn last(&self) -> Arc<FakeRenderer> {
        Arc::clone(self.created.lock().last().expect("a renderer was created"))
    }
}

impl RendererFactory for FakeFactory {
    fn create(
        &self,
        source: DocumentSource,
        callbacks: RendererCallbacks,
    ) -> Result<Arc<dyn Renderer>> {
        if let Some(reason) = self.fail.lock().clone() {
            return Err(anyhow!(reason));
        }
        let renderer = Arc::new(FakeRenderer::new(source, callbacks));
        self.created.lock().push(Arc::clone(&renderer));
        if self.ready_on_create.load(Ordering::SeqCst) {
            renderer.callbacks().document_ready();
        }
        Ok(renderer)
    }
}

/// File reader whose reads complete only when the test says so.
#[derive(Default)]
pub(crate) struct GatedReader {
    waiters: Mutex<Vec<Reply<Bytes>>>,
}

impl GatedReader {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn in_flight(&self) -> usize {
        self.waiters.lock().len()
    }

    pub fn finish(&self, outcome: Result<Bytes, String>) {
        let waiter = self.waiters.lock().remove(0);
        let _ = waiter.send(outcome);
    }
}

#[async_trait]
impl FileReader for GatedReader {
    async fn read(&self, _path: &Path) -> Result<Bytes> {
        let (tx, rx) = oneshot::channel();
        self.waiters.lock().push(tx);
        wait(rx).await
    }
}

pub(crate) fn pages(count: usize) -> Vec<Page> {
    (1..=count)
        .map(|page| Page {
            page,
            cfi: format!("epubcfi(/6/{}!/4/2/1:0)", page * 2),
        })
        .collect()
}

/// Lets spawned session work run to its next suspension point.
pub(crate) async fn settle() {
    for _ in 0..32 {
        tokio::task::yield_now().await;
    }
}

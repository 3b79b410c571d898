use std::future::Future;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use bytes::Bytes;
use parking_lot::Mutex;
use tokio::runtime::Handle;
use tracing::{debug, info, instrument, warn};

use crate::binding::{CallbackHandler, RendererBinding};
use crate::config::SessionConfig;
use crate::error::{describe, SessionError};
use crate::events::{EventDispatcher, SessionEvent};
use crate::file::{FileReader, TokioFileReader};
use crate::model::{Chapter, GotoTarget, Location, VisibleRange};
use crate::pagination::Trigger;
use crate::renderer::{DocumentSource, RenderRegion, Renderer, RendererFactory};
use crate::state::{SessionSnapshot, SessionState};

/// Controller for one reading surface.
///
/// Cloning yields another handle to the same session. Every command reports
/// failures on the error channel instead of returning them.
#[derive(Clone)]
pub struct Session {
    pub(crate) inner: Arc<SessionInner>,
}

pub(crate) struct SessionInner {
    pub(crate) config: SessionConfig,
    pub(crate) state: Mutex<SessionState>,
    pub(crate) binding: RendererBinding,
    pub(crate) events: EventDispatcher,
    factory: Arc<dyn RendererFactory>,
    file_reader: Option<Arc<dyn FileReader>>,
    runtime: Option<Handle>,
    region: Mutex<Option<String>>,
    pending_open: Mutex<Option<DocumentSource>>,
    /// Bumped by every open request (a file read counts from when it starts)
    /// and by teardown. A read that finishes after a bump is stale.
    open_requests: AtomicU64,
}

pub struct SessionBuilder {
    factory: Arc<dyn RendererFactory>,
    config: SessionConfig,
    file_reader: Option<Arc<dyn FileReader>>,
    runtime: Option<Handle>,
}

impl SessionBuilder {
    pub fn config(mut self, config: SessionConfig) -> Self {
        self.config = config;
        self
    }

    pub fn file_reader(mut self, reader: Arc<dyn FileReader>) -> Self {
        self.file_reader = Some(reader);
        self
    }

    /// Models a host that cannot read local files.
    pub fn without_file_reader(mut self) -> Self {
        self.file_reader = None;
        self
    }

    /// Runtime used for work started from renderer callbacks. Defaults to the
    /// runtime the session is built on, if any.
    pub fn runtime(mut self, handle: Handle) -> Self {
        self.runtime = Some(handle);
        self
    }

    pub fn build(self) -> Session {
        Session {
            inner: Arc::new(SessionInner {
                config: self.config,
                state: Mutex::new(SessionState::default()),
                binding: RendererBinding::new(),
                events: EventDispatcher::new(),
                factory: self.factory,
                file_reader: self.file_reader,
                runtime: self.runtime.or_else(|| Handle::try_current().ok()),
                region: Mutex::new(None),
                pending_open: Mutex::new(None),
                open_requests: AtomicU64::new(0),
            }),
        }
    }
}

impl Session {
    pub fn builder(factory: Arc<dyn RendererFactory>) -> SessionBuilder {
        SessionBuilder {
            factory,
            config: SessionConfig::default(),
            file_reader: Some(Arc::new(TokioFileReader)),
            runtime: None,
        }
    }

    pub fn new(config: SessionConfig, factory: Arc<dyn RendererFactory>) -> Self {
        Self::builder(factory).config(config).build()
    }

    pub fn config(&self) -> &SessionConfig {
        &self.inner.config
    }

    pub fn events(&self) -> &EventDispatcher {
        &self.inner.events
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        self.inner.state.lock().snapshot()
    }

    pub fn location(&self) -> Location {
        self.inner.state.lock().location.clone()
    }

    /// Binds the session to the host region it renders into. A document
    /// requested before this point is opened now.
    #[instrument(skip_all)]
    pub fn attach(&self, region: impl Into<String>) {
        let region = region.into();
        debug!(%region, "session attached");
        *self.inner.region.lock() = Some(region);
        self.flush_pending_open();
    }

    /// Rapid requests collapse: only the latest link is ever opened.
    #[instrument(skip_all)]
    pub fn open_link(&self, link: impl Into<String>) {
        self.request_open(DocumentSource::Link(link.into()));
    }

    pub fn open_bytes(&self, bytes: Bytes) {
        self.request_open(DocumentSource::Bytes(bytes));
    }

    #[instrument(skip_all)]
    pub async fn open_file(&self, path: impl AsRef<Path>) {
        let path = path.as_ref();
        let Some(reader) = self.inner.file_reader.clone() else {
            self.report(SessionError::OpenFile);
            return;
        };
        let request = self.inner.open_requests.fetch_add(1, Ordering::SeqCst) + 1;
        debug!(path = %path.display(), "reading document");
        let outcome = reader.read(path).await;
        if self.inner.open_requests.load(Ordering::SeqCst) != request {
            debug!(path = %path.display(), "read superseded by a newer open or teardown");
            return;
        }
        match outcome {
            Ok(bytes) => self.open_bytes(bytes),
            Err(err) => {
                warn!(?err, path = %path.display(), "failed to read document");
                self.report(SessionError::ReadFile(describe(&err)));
            }
        }
    }

    #[instrument(skip_all)]
    pub fn go_to(&self, target: impl Into<GotoTarget>) {
        let target = target.into();
        let Some(renderer) = self.ready_renderer() else {
            return;
        };
        let outcome = match &target {
            GotoTarget::Page(page) => renderer.display_page(*page),
            GotoTarget::Url(url) => renderer.display_url(url),
            GotoTarget::Cfi(cfi) => renderer.display_cfi(cfi),
        };
        if let Err(err) = outcome {
            warn!(?err, %target, "navigation failed");
        }
    }

    pub fn next_page(&self) {
        if let Some(renderer) = self.ready_renderer() {
            if let Err(err) = renderer.next_page() {
                warn!(?err, "failed to turn to next page");
            }
        }
    }

    pub fn previous_page(&self) {
        if let Some(renderer) = self.ready_renderer() {
            if let Err(err) = renderer.previous_page() {
                warn!(?err, "failed to turn to previous page");
            }
        }
    }

    pub fn set_style(&self, name: &str, value: &str) {
        if let Some(renderer) = self.ready_renderer() {
            if let Err(err) = renderer.set_style(name, value) {
                warn!(?err, name, value, "failed to set style");
            }
        }
    }

    pub fn reset_style(&self, name: &str) {
        if let Some(renderer) = self.ready_renderer() {
            if let Err(err) = renderer.remove_style(name) {
                warn!(?err, name, "failed to reset style");
            }
        }
    }

    #[instrument(skip_all)]
    pub async fn load_metadata(&self) {
        let Some((renderer, generation)) = self.ready_renderer_with_generation() else {
            return;
        };
        let outcome = renderer.metadata().await;
        if !self.inner.binding.is_current(generation) {
            debug!("discarding metadata from a torn-down renderer");
            return;
        }
        match outcome {
            Ok(metadata) => self.emit(SessionEvent::MetadataLoaded(metadata)),
            Err(err) => {
                warn!(?err, "failed to load metadata");
                self.report(SessionError::LoadMetadata(describe(&err)));
            }
        }
    }

    #[instrument(skip_all)]
    pub async fn load_toc(&self) {
        let Some((renderer, generation)) = self.ready_renderer_with_generation() else {
            return;
        };
        let outcome = renderer.table_of_contents().await;
        if !self.inner.binding.is_current(generation) {
            debug!("discarding table of contents from a torn-down renderer");
            return;
        }
        match outcome {
            Ok(chapters) => self.emit(SessionEvent::TocLoaded(chapters)),
            Err(err) => {
                warn!(?err, "failed to load table of contents");
                self.report(SessionError::LoadToc(describe(&err)));
            }
        }
    }

    /// Releases the renderer and forgets the document, including any owed
    /// pagination or search.
    #[instrument(skip_all)]
    pub fn teardown(&self) {
        self.inner.open_requests.fetch_add(1, Ordering::SeqCst);
        self.inner.pending_open.lock().take();
        self.inner.binding.destroy();
        self.inner.state.lock().reset();
        info!("session torn down");
    }

    fn request_open(&self, source: DocumentSource) {
        self.inner.open_requests.fetch_add(1, Ordering::SeqCst);
        let replaced = self.inner.pending_open.lock().replace(source);
        if replaced.is_some() {
            debug!("superseding an open request that never ran");
        }
        self.flush_pending_open();
    }

    fn flush_pending_open(&self) {
        let Some(region) = self.inner.region.lock().clone() else {
            return;
        };
        let Some(source) = self.inner.pending_open.lock().take() else {
            return;
        };
        self.open_now(source, region);
    }

    fn open_now(&self, source: DocumentSource, region: String) {
        let region = RenderRegion {
            name: region,
            padding: self.inner.config.padding.clone(),
        };
        info!(?source, region = %region.name, "opening document");

        self.inner.binding.destroy();
        self.inner.state.lock().reset();

        let weak = Arc::downgrade(&self.inner);
        let handler: Weak<dyn CallbackHandler> = weak;
        let opened = self
            .inner
            .binding
            .open(self.inner.factory.as_ref(), source, &region, handler);
        if let Err(err) = opened {
            warn!(?err, "failed to open document");
            self.report(SessionError::OpenDocument(describe(&err)));
        }
    }

    pub(crate) fn emit(&self, event: SessionEvent) {
        self.inner.events.emit(event);
    }

    pub(crate) fn report(&self, err: SessionError) {
        debug!(kind = %err.kind(), %err, "session error");
        self.emit(SessionEvent::ErrorOccurred(err));
    }

    fn ready_renderer(&self) -> Option<Arc<dyn Renderer>> {
        self.ready_renderer_with_generation()
            .map(|(renderer, _)| renderer)
    }

    fn ready_renderer_with_generation(&self) -> Option<(Arc<dyn Renderer>, u64)> {
        let ready = self.inner.state.lock().require_ready();
        if let Err(err) = ready {
            self.report(err);
            return None;
        }
        let current = self.inner.binding.current();
        if current.is_none() {
            // the engine reported ready before its construction returned
            warn!("document ready but renderer not bound yet");
            self.report(SessionError::NotLoadedDocument);
        }
        current
    }

    /// Runs callback-triggered work on the session's runtime.
    pub(crate) fn spawn<F, Fut>(&self, task: &'static str, work: F)
    where
        F: FnOnce(Session) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let Some(runtime) = self.inner.runtime.clone().or_else(|| Handle::try_current().ok())
        else {
            warn!(task, "no async runtime available, skipping");
            return;
        };
        debug!(task, "scheduling");
        runtime.spawn(work(self.clone()));
    }

    fn on_document_ready(&self) {
        self.inner
            .state
            .lock()
            .mark_ready(self.inner.config.auto_pagination);
        info!("document ready");
        self.emit(SessionEvent::DocumentReady);

        if self.inner.config.auto_metadata {
            self.spawn("load-metadata", |session| async move {
                session.load_metadata().await
            });
        }
        if self.inner.config.auto_toc {
            self.spawn("load-toc", |session| async move { session.load_toc().await });
        }
    }

    fn on_chapter_unloaded(&self) {
        self.inner.state.lock().unload_chapter();
        self.emit(SessionEvent::ChapterUnloaded);
    }

    fn on_chapter_displayed(&self, chapter: Chapter) {
        let (chapter, location, owed) = self.inner.state.lock().display_chapter(chapter);
        debug!(href = %chapter.href, "chapter displayed");
        self.emit(SessionEvent::ChapterDisplayed(chapter));
        self.emit(SessionEvent::LocationFound(location));
        if owed {
            self.schedule_pagination();
        }
    }

    fn on_viewport_resized(&self) {
        self.inner.state.lock().resize_viewport();
        if self.inner.config.auto_pagination {
            self.schedule_pagination();
        }
    }

    fn on_visible_range_changed(&self, range: VisibleRange) {
        let location = self.inner.state.lock().set_visible_range(range);
        self.emit(SessionEvent::LocationFound(location));
    }

    fn on_page_changed(&self, page: Option<usize>) {
        let location = self.inner.state.lock().change_page(page);
        match location {
            Some(location) => self.emit(SessionEvent::LocationFound(location)),
            None => debug!(?page, "page change suppressed during pagination"),
        }
    }

    fn schedule_pagination(&self) {
        self.spawn("compute-pagination", |session| async move {
            session.paginate(Trigger::Automatic).await
        });
    }
}

impl CallbackHandler for SessionInner {
    fn document_ready(self: Arc<Self>) {
        Session { inner: self }.on_document_ready();
    }

    fn page_changed(self: Arc<Self>, page: Option<usize>) {
        Session { inner: self }.on_page_changed(page);
    }

    fn chapter_unloaded(self: Arc<Self>) {
        Session { inner: self }.on_chapter_unloaded();
    }

    fn chapter_displayed(self: Arc<Self>, chapter: Chapter) {
        Session { inner: self }.on_chapter_displayed(chapter);
    }

    fn viewport_resized(self: Arc<Self>) {
        Session { inner: self }.on_viewport_resized();
    }

    fn visible_range_changed(self: Arc<Self>, range: VisibleRange) {
        Session { inner: self }.on_visible_range_changed(range);
    }
}

impl Drop for SessionInner {
    fn drop(&mut self) {
        self.binding.destroy();
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("config", &self.inner.config)
            .field("state", &*self.inner.state.lock())
            .finish()
    }
}

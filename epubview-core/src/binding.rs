use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use anyhow::{Context, Result};
use parking_lot::Mutex;
use tracing::debug;

use crate::model::{Chapter, VisibleRange};
use crate::renderer::{DocumentSource, RenderRegion, Renderer, RendererFactory};

/// Receiver side of the six engine callbacks.
pub(crate) trait CallbackHandler: Send + Sync {
    fn document_ready(self: Arc<Self>);
    fn page_changed(self: Arc<Self>, page: Option<usize>);
    fn chapter_unloaded(self: Arc<Self>);
    fn chapter_displayed(self: Arc<Self>, chapter: Chapter);
    fn viewport_resized(self: Arc<Self>);
    fn visible_range_changed(self: Arc<Self>, range: VisibleRange);
}

/// Handle given to a renderer at construction. Events fired through a handle
/// whose renderer has since been destroyed are dropped.
#[derive(Clone)]
pub struct RendererCallbacks {
    handler: Weak<dyn CallbackHandler>,
    generation: u64,
    live: Arc<AtomicU64>,
}

impl RendererCallbacks {
    pub fn document_ready(&self) {
        if let Some(handler) = self.target("document-ready") {
            handler.document_ready();
        }
    }

    pub fn page_changed(&self, page: Option<usize>) {
        if let Some(handler) = self.target("page-changed") {
            handler.page_changed(page);
        }
    }

    pub fn chapter_unloaded(&self) {
        if let Some(handler) = self.target("chapter-unloaded") {
            handler.chapter_unloaded();
        }
    }

    pub fn chapter_displayed(&self, chapter: Chapter) {
        if let Some(handler) = self.target("chapter-displayed") {
            handler.chapter_displayed(chapter);
        }
    }

    pub fn viewport_resized(&self) {
        if let Some(handler) = self.target("viewport-resized") {
            handler.viewport_resized();
        }
    }

    pub fn visible_range_changed(&self, range: VisibleRange) {
        if let Some(handler) = self.target("visible-range-changed") {
            handler.visible_range_changed(range);
        }
    }

    pub fn is_live(&self) -> bool {
        self.live.load(Ordering::SeqCst) == self.generation && self.handler.strong_count() > 0
    }

    fn target(&self, callback: &'static str) -> Option<Arc<dyn CallbackHandler>> {
        if self.live.load(Ordering::SeqCst) != self.generation {
            debug!(
                callback,
                generation = self.generation,
                "dropping callback from a torn-down renderer"
            );
            return None;
        }
        self.handler.upgrade()
    }
}

impl fmt::Debug for RendererCallbacks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RendererCallbacks")
            .field("generation", &self.generation)
            .field("live", &self.is_live())
            .finish()
    }
}

/// Owns the single live renderer instance.
pub(crate) struct RendererBinding {
    renderer: Mutex<Option<Arc<dyn Renderer>>>,
    generation: Arc<AtomicU64>,
}

impl RendererBinding {
    pub(crate) fn new() -> Self {
        Self {
            renderer: Mutex::new(None),
            generation: Arc::new(AtomicU64::new(0)),
        }
    }

    /// The live renderer and the generation it belongs to.
    pub(crate) fn current(&self) -> Option<(Arc<dyn Renderer>, u64)> {
        let renderer = self.renderer.lock();
        renderer
            .as_ref()
            .map(|r| (Arc::clone(r), self.generation.load(Ordering::SeqCst)))
    }

    pub(crate) fn is_current(&self, generation: u64) -> bool {
        self.generation.load(Ordering::SeqCst) == generation && self.renderer.lock().is_some()
    }

    /// Replaces whatever renderer is live with a new one for `source`.
    pub(crate) fn open(
        &self,
        factory: &dyn RendererFactory,
        source: DocumentSource,
        region: &RenderRegion,
        handler: Weak<dyn CallbackHandler>,
    ) -> Result<Arc<dyn Renderer>> {
        self.destroy();
        let generation = self.generation.load(Ordering::SeqCst);
        let callbacks = RendererCallbacks {
            handler,
            generation,
            live: Arc::clone(&self.generation),
        };
        let renderer = factory
            .create(source, callbacks)
            .context("renderer construction failed")?;
        *self.renderer.lock() = Some(Arc::clone(&renderer));

        if let Err(err) = renderer.attach(region) {
            self.destroy();
            return Err(err.context(format!("failed to attach to region {:?}", region.name)));
        }
        debug!(generation, region = %region.name, "renderer attached");
        Ok(renderer)
    }

    /// Safe to call with no renderer; always invalidates outstanding callbacks.
    pub(crate) fn destroy(&self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
        let previous = self.renderer.lock().take();
        if let Some(renderer) = previous {
            debug!("destroying renderer");
            renderer.destroy();
        }
    }
}

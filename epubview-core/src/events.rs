use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use serde::Serialize;
use tracing::trace;

use crate::error::SessionError;
use crate::model::{Chapter, Location, Metadata, Page, SearchResult};

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", content = "payload", rename_all = "kebab-case")]
pub enum SessionEvent {
    DocumentReady,
    ChapterUnloaded,
    ChapterDisplayed(Chapter),
    LocationFound(Location),
    SearchFinished(Vec<SearchResult>),
    PaginationComputed(Vec<Page>),
    MetadataLoaded(Metadata),
    TocLoaded(Vec<Chapter>),
    ErrorOccurred(SessionError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    DocumentReady,
    ChapterUnloaded,
    ChapterDisplayed,
    LocationFound,
    SearchFinished,
    PaginationComputed,
    MetadataLoaded,
    TocLoaded,
    ErrorOccurred,
}

impl SessionEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            SessionEvent::DocumentReady => EventKind::DocumentReady,
            SessionEvent::ChapterUnloaded => EventKind::ChapterUnloaded,
            SessionEvent::ChapterDisplayed(_) => EventKind::ChapterDisplayed,
            SessionEvent::LocationFound(_) => EventKind::LocationFound,
            SessionEvent::SearchFinished(_) => EventKind::SearchFinished,
            SessionEvent::PaginationComputed(_) => EventKind::PaginationComputed,
            SessionEvent::MetadataLoaded(_) => EventKind::MetadataLoaded,
            SessionEvent::TocLoaded(_) => EventKind::TocLoaded,
            SessionEvent::ErrorOccurred(_) => EventKind::ErrorOccurred,
        }
    }

    pub fn error(&self) -> Option<&SessionError> {
        match self {
            SessionEvent::ErrorOccurred(err) => Some(err),
            _ => None,
        }
    }
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::DocumentReady => "document-ready",
            EventKind::ChapterUnloaded => "chapter-unloaded",
            EventKind::ChapterDisplayed => "chapter-displayed",
            EventKind::LocationFound => "location-found",
            EventKind::SearchFinished => "search-finished",
            EventKind::PaginationComputed => "pagination-computed",
            EventKind::MetadataLoaded => "metadata-loaded",
            EventKind::TocLoaded => "toc-loaded",
            EventKind::ErrorOccurred => "error-occurred",
        }
    }
}

pub type Listener = Arc<dyn Fn(&SessionEvent) + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

struct Subscription {
    id: SubscriptionId,
    kind: Option<EventKind>,
    listener: Listener,
}

/// Fans session events out to host listeners.
///
/// Delivery is synchronous and in emission order. Listeners run with no lock held,
/// so they are free to issue further session commands.
pub struct EventDispatcher {
    subscriptions: Mutex<Vec<Subscription>>,
    next_id: AtomicU64,
}

impl EventDispatcher {
    pub fn new() -> Self {
        Self {
            subscriptions: Mutex::new(Vec::new()),
            next_id: AtomicU64::new(0),
        }
    }

    /// Listens to a single event channel.
    pub fn subscribe<F>(&self, kind: EventKind, listener: F) -> SubscriptionId
    where
        F: Fn(&SessionEvent) + Send + Sync + 'static,
    {
        self.insert(Some(kind), Arc::new(listener))
    }

    pub fn subscribe_all<F>(&self, listener: F) -> SubscriptionId
    where
        F: Fn(&SessionEvent) + Send + Sync + 'static,
    {
        self.insert(None, Arc::new(listener))
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut subscriptions = self.subscriptions.lock();
        let before = subscriptions.len();
        subscriptions.retain(|sub| sub.id != id);
        subscriptions.len() != before
    }

    /// Captures every event from now on into a shared log.
    pub fn recorder(&self) -> Arc<Mutex<Vec<SessionEvent>>> {
        let log = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&log);
        self.subscribe_all(move |event| sink.lock().push(event.clone()));
        log
    }

    pub fn emit(&self, event: SessionEvent) {
        let kind = event.kind();
        let targets: Vec<Listener> = self
            .subscriptions
            .lock()
            .iter()
            .filter(|sub| sub.kind.map_or(true, |wanted| wanted == kind))
            .map(|sub| Arc::clone(&sub.listener))
            .collect();
        trace!(event = kind.as_str(), listeners = targets.len(), "dispatch");
        for listener in targets {
            listener(&event);
        }
    }

    fn insert(&self, kind: Option<EventKind>, listener: Listener) -> SubscriptionId {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::SeqCst) + 1);
        self.subscriptions.lock().push(Subscription { id, kind, listener });
        id
    }
}

impl Default for EventDispatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for EventDispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventDispatcher")
            .field("subscriptions", &self.subscriptions.lock().len())
            .finish()
    }
}

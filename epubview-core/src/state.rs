use serde::Serialize;

use crate::error::SessionError;
use crate::model::{Chapter, Location, VisibleRange};

/// The live document record plus the two coalescing cells.
#[derive(Debug, Clone, Default)]
pub(crate) struct SessionState {
    pub document_ready: bool,
    pub chapter_displayed: bool,
    pub location: Location,
    pub pending_pagination: bool,
    pub computing_pagination: bool,
    pub pending_search: Option<String>,
    pub searching: bool,
}

/// Read-only copy of the session record for hosts and tests.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct SessionSnapshot {
    pub document_ready: bool,
    pub chapter_displayed: bool,
    pub location: Location,
    pub pending_pagination: bool,
    pub computing_pagination: bool,
    pub pending_search: Option<String>,
    pub searching: bool,
}

impl SessionState {
    pub(crate) fn reset(&mut self) {
        *self = SessionState::default();
    }

    pub(crate) fn require_ready(&self) -> Result<(), SessionError> {
        if self.document_ready {
            Ok(())
        } else {
            Err(SessionError::NotLoadedDocument)
        }
    }

    pub(crate) fn require_displayed_chapter(&self) -> Result<(), SessionError> {
        self.require_ready()?;
        if self.chapter_displayed {
            Ok(())
        } else {
            Err(SessionError::NotDisplayedChapter)
        }
    }

    pub(crate) fn mark_ready(&mut self, auto_pagination: bool) {
        self.document_ready = true;
        if auto_pagination {
            // needs rendered content, so it waits for the first displayed chapter
            self.pending_pagination = true;
        }
    }

    pub(crate) fn unload_chapter(&mut self) {
        self.chapter_displayed = false;
    }

    /// Returns the forwarded chapter, the new location, and whether a pagination
    /// recompute is owed.
    pub(crate) fn display_chapter(&mut self, chapter: Chapter) -> (Chapter, Location, bool) {
        let chapter = chapter.without_label();
        self.chapter_displayed = true;
        self.location.chapter = Some(chapter.clone());
        (chapter, self.location.clone(), self.pending_pagination)
    }

    pub(crate) fn resize_viewport(&mut self) {
        self.pending_pagination = true;
    }

    pub(crate) fn set_visible_range(&mut self, range: VisibleRange) -> Location {
        self.location.start_cfi = Some(range.start);
        self.location.end_cfi = Some(range.end);
        self.location.clone()
    }

    /// `None` while pagination is computing: the engine flips pages as a side
    /// effect of laying out the book.
    pub(crate) fn change_page(&mut self, page: Option<usize>) -> Option<Location> {
        if self.computing_pagination {
            return None;
        }
        self.location.page = page;
        Some(self.location.clone())
    }

    pub(crate) fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            document_ready: self.document_ready,
            chapter_displayed: self.chapter_displayed,
            location: self.location.clone(),
            pending_pagination: self.pending_pagination,
            computing_pagination: self.computing_pagination,
            pending_search: self.pending_search.clone(),
            searching: self.searching,
        }
    }
}

use std::sync::Arc;

use tracing::{debug, instrument, warn};

use crate::error::{describe, SessionError};
use crate::events::SessionEvent;
use crate::renderer::Renderer;
use crate::session::Session;

enum Start {
    Run(Arc<dyn Renderer>, u64, String),
    Queued,
    Blocked(SessionError),
}

enum Next {
    Finish,
    Run(String),
    Blocked(SessionError),
}

impl Session {
    /// Searches the displayed chapter for `text`.
    ///
    /// One search runs at a time. A query arriving meanwhile replaces any query
    /// already waiting, and only the last one runs once the current search is
    /// done; the superseded results are never published.
    #[instrument(skip_all)]
    pub async fn search_text(&self, text: impl Into<String>) {
        let (renderer, generation, mut query) = match self.begin_search(text.into()) {
            Start::Run(renderer, generation, query) => (renderer, generation, query),
            Start::Queued => return,
            Start::Blocked(err) => {
                self.report(err);
                return;
            }
        };

        loop {
            debug!(%query, "searching current chapter");
            let outcome = renderer.find(&query).await;
            if !self.inner.binding.is_current(generation) {
                debug!("discarding search results from a torn-down renderer");
                return;
            }

            match self.finish_search() {
                Next::Run(next) => {
                    debug!(superseded = %query, "newer query waiting");
                    query = next;
                }
                Next::Blocked(err) => {
                    self.report(err);
                    return;
                }
                Next::Finish => {
                    match outcome {
                        Ok(results) => {
                            debug!(hits = results.len(), "search finished");
                            self.emit(SessionEvent::SearchFinished(results));
                        }
                        Err(err) => {
                            warn!(?err, %query, "search failed");
                            self.report(SessionError::FindText(describe(&err)));
                        }
                    }
                    return;
                }
            }
        }
    }

    fn begin_search(&self, text: String) -> Start {
        let current = self.inner.binding.current();
        let mut state = self.inner.state.lock();
        if let Err(err) = state.require_displayed_chapter() {
            return Start::Blocked(err);
        }
        let Some((renderer, generation)) = current else {
            return Start::Blocked(SessionError::NotLoadedDocument);
        };
        if text.trim().is_empty() {
            return Start::Blocked(SessionError::Search);
        }
        if state.searching {
            debug!(query = %text, "search in flight, query queued");
            state.pending_search = Some(text);
            return Start::Queued;
        }
        state.searching = true;
        state.pending_search = None;
        Start::Run(renderer, generation, text)
    }

    fn finish_search(&self) -> Next {
        let mut state = self.inner.state.lock();
        let Some(next) = state.pending_search.take() else {
            state.searching = false;
            return Next::Finish;
        };
        match state.require_displayed_chapter() {
            Ok(()) => Next::Run(next),
            Err(err) => {
                state.searching = false;
                Next::Blocked(err)
            }
        }
    }
}

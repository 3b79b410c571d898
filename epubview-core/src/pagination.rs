use std::sync::Arc;

use tracing::{debug, instrument, warn};

use crate::error::{describe, SessionError};
use crate::events::SessionEvent;
use crate::renderer::Renderer;
use crate::session::Session;

/// Who asked for a pagination run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Trigger {
    /// The host; unmet preconditions are reported.
    Command,
    /// A renderer callback; unmet preconditions leave the recompute owed.
    Automatic,
}

enum Start {
    Run(Arc<dyn Renderer>, u64),
    AlreadyComputing,
    Blocked(SessionError),
}

enum Settle {
    Publish,
    Restart,
    Defer,
}

impl Session {
    /// Computes page boundaries for the whole book.
    ///
    /// At most one computation runs at a time. Requests made while one is in
    /// flight are absorbed; if the layout was invalidated meanwhile, the
    /// in-flight result is thrown away and the computation runs again.
    #[instrument(skip_all)]
    pub async fn compute_pagination(&self) {
        self.paginate(Trigger::Command).await;
    }

    pub(crate) async fn paginate(&self, trigger: Trigger) {
        let (renderer, generation) = match self.begin_pagination() {
            Start::Run(renderer, generation) => (renderer, generation),
            Start::AlreadyComputing => {
                debug!(?trigger, "pagination already in flight");
                return;
            }
            Start::Blocked(err) => {
                match trigger {
                    Trigger::Command => self.report(err),
                    Trigger::Automatic => debug!(%err, "automatic pagination deferred"),
                }
                return;
            }
        };

        loop {
            let outcome = renderer.generate_pagination().await;
            if !self.inner.binding.is_current(generation) {
                debug!("discarding pagination from a torn-down renderer");
                return;
            }

            let pages = match outcome {
                Ok(pages) => pages,
                Err(err) => {
                    self.inner.state.lock().computing_pagination = false;
                    warn!(?err, "pagination failed");
                    self.report(SessionError::ComputePagination(describe(&err)));
                    return;
                }
            };

            match self.settle_pagination() {
                Settle::Restart => {
                    debug!(discarded = pages.len(), "layout changed mid-computation, recomputing");
                    continue;
                }
                Settle::Defer => {
                    debug!("layout changed and no chapter is displayed, recompute owed");
                    return;
                }
                Settle::Publish => {}
            }

            debug!(pages = pages.len(), "pagination computed");
            self.emit(SessionEvent::PaginationComputed(pages));
            if !self.inner.binding.is_current(generation) {
                return;
            }

            let page = renderer
                .current_location()
                .and_then(|cfi| renderer.page_from_cfi(&cfi));
            let location = {
                let mut state = self.inner.state.lock();
                state.location.page = page;
                state.location.clone()
            };
            self.emit(SessionEvent::LocationFound(location));
            return;
        }
    }

    fn begin_pagination(&self) -> Start {
        let Some((renderer, generation)) = self.inner.binding.current() else {
            return Start::Blocked(SessionError::NotLoadedDocument);
        };
        let mut state = self.inner.state.lock();
        if let Err(err) = state.require_displayed_chapter() {
            return Start::Blocked(err);
        }
        if state.computing_pagination {
            return Start::AlreadyComputing;
        }
        state.computing_pagination = true;
        state.pending_pagination = false;
        Start::Run(renderer, generation)
    }

    fn settle_pagination(&self) -> Settle {
        let mut state = self.inner.state.lock();
        if !state.pending_pagination {
            state.computing_pagination = false;
            return Settle::Publish;
        }
        if state.require_displayed_chapter().is_ok() {
            state.pending_pagination = false;
            Settle::Restart
        } else {
            state.computing_pagination = false;
            Settle::Defer
        }
    }
}

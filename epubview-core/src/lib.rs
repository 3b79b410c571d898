//! Session controller sitting between an EPUB rendering engine and a host UI.
//!
//! The engine is reached through the [`Renderer`] capability trait and talks
//! back through [`RendererCallbacks`]. The host drives a [`Session`] with
//! commands and observes it through the [`EventDispatcher`].

mod binding;
mod config;
mod error;
mod events;
mod file;
mod model;
mod pagination;
mod renderer;
mod search;
mod session;
mod state;

#[cfg(test)]
mod test_support;

pub use binding::RendererCallbacks;
pub use config::SessionConfig;
pub use error::{ErrorKind, SessionError};
pub use events::{EventDispatcher, EventKind, Listener, SessionEvent, SubscriptionId};
pub use file::{FileReader, TokioFileReader};
pub use model::{Chapter, GotoTarget, Location, Metadata, Page, SearchResult, VisibleRange};
pub use renderer::{DocumentSource, RenderRegion, Renderer, RendererFactory};
pub use session::{Session, SessionBuilder};
pub use state::SessionSnapshot;

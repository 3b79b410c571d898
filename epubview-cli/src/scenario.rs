use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use epubview_core::{Chapter, GotoTarget, Session, SessionConfig, SessionEvent, VisibleRange};
use epubview_render::{RendererCall, RendererScript, ScriptedRendererFactory};
use serde::{Deserialize, Serialize};
use tokio::task::JoinSet;
use tracing::{debug, info};

/// A recorded interaction: the engine's canned behaviour plus what the host
/// and the engine did, in order.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct Scenario {
    pub config: Option<SessionConfig>,
    pub renderer: RendererScript,
    pub steps: Vec<Step>,
}

impl Scenario {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("failed to read scenario {:?}", path))?;
        serde_json::from_str(&raw).with_context(|| format!("failed to decode scenario {:?}", path))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Step {
    Attach(String),
    OpenLink(String),
    OpenFile(PathBuf),
    GoTo(GotoValue),
    NextPage,
    PreviousPage,
    SetStyle { name: String, value: String },
    ResetStyle(String),
    Search(String),
    ComputePagination,
    LoadMetadata,
    LoadToc,
    Teardown,
    /// Lets background work run until it next waits on the engine.
    Settle,
    Callback(EngineEvent),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum GotoValue {
    Page(usize),
    Text(String),
}

impl From<&GotoValue> for GotoTarget {
    fn from(value: &GotoValue) -> Self {
        match value {
            GotoValue::Page(page) => GotoTarget::Page(*page),
            GotoValue::Text(text) => GotoTarget::classify(text),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EngineEvent {
    DocumentReady,
    PageChanged(Option<usize>),
    ChapterUnloaded,
    ChapterDisplayed(Chapter),
    ViewportResized,
    VisibleRangeChanged(VisibleRange),
}

#[derive(Debug, Serialize)]
struct Record<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    step: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    command: Option<&'a Step>,
    calls: Vec<RendererCall>,
    events: Vec<SessionEvent>,
}

/// Runs every step against a fresh session, writing one JSON record per step
/// with the engine calls and session events it produced.
pub async fn replay<W: Write>(
    scenario: Scenario,
    config: SessionConfig,
    out: &mut W,
    pretty: bool,
) -> Result<()> {
    let factory = Arc::new(ScriptedRendererFactory::new(scenario.renderer));
    let session = Session::new(config, factory.clone());
    let log = session.events().recorder();
    let mut tasks = JoinSet::new();

    info!(steps = scenario.steps.len(), "replaying scenario");
    for (index, step) in scenario.steps.iter().enumerate() {
        debug!(index, ?step, "step");
        apply(&session, &factory, step, &mut tasks)
            .await
            .with_context(|| format!("step {index} failed"))?;
        let record = Record {
            step: Some(index),
            command: Some(step),
            calls: factory.drain_calls(),
            events: std::mem::take(&mut *log.lock()),
        };
        write_record(out, &record, pretty)?;
    }

    while let Some(joined) = tasks.join_next().await {
        joined.context("scenario task panicked")?;
    }
    settle().await;

    let record = Record {
        step: None,
        command: None,
        calls: factory.drain_calls(),
        events: std::mem::take(&mut *log.lock()),
    };
    if !record.calls.is_empty() || !record.events.is_empty() {
        write_record(out, &record, pretty)?;
    }
    Ok(())
}

async fn apply(
    session: &Session,
    factory: &ScriptedRendererFactory,
    step: &Step,
    tasks: &mut JoinSet<()>,
) -> Result<()> {
    match step {
        Step::Attach(region) => session.attach(region.clone()),
        Step::OpenLink(link) => session.open_link(link.clone()),
        Step::OpenFile(path) => session.open_file(path).await,
        Step::GoTo(target) => session.go_to(GotoTarget::from(target)),
        Step::NextPage => session.next_page(),
        Step::PreviousPage => session.previous_page(),
        Step::SetStyle { name, value } => session.set_style(name, value),
        Step::ResetStyle(name) => session.reset_style(name),
        Step::Search(query) => {
            let session = session.clone();
            let query = query.clone();
            start(tasks, async move { session.search_text(query).await }).await;
        }
        Step::ComputePagination => {
            let session = session.clone();
            start(tasks, async move { session.compute_pagination().await }).await;
        }
        Step::LoadMetadata => {
            let session = session.clone();
            start(tasks, async move { session.load_metadata().await }).await;
        }
        Step::LoadToc => {
            let session = session.clone();
            start(tasks, async move { session.load_toc().await }).await;
        }
        Step::Teardown => session.teardown(),
        Step::Settle => settle().await,
        Step::Callback(event) => {
            let renderer = factory
                .current()
                .ok_or_else(|| anyhow!("no renderer to fire {event:?} on, open a document first"))?;
            let callbacks = renderer.callbacks();
            match event.clone() {
                EngineEvent::DocumentReady => callbacks.document_ready(),
                EngineEvent::PageChanged(page) => callbacks.page_changed(page),
                EngineEvent::ChapterUnloaded => callbacks.chapter_unloaded(),
                EngineEvent::ChapterDisplayed(chapter) => callbacks.chapter_displayed(chapter),
                EngineEvent::ViewportResized => callbacks.viewport_resized(),
                EngineEvent::VisibleRangeChanged(range) => callbacks.visible_range_changed(range),
            }
        }
    }
    Ok(())
}

/// Spawns a command and lets it reach its first wait on the engine, so the
/// next step sees it in flight.
async fn start<F>(tasks: &mut JoinSet<()>, work: F)
where
    F: std::future::Future<Output = ()> + Send + 'static,
{
    tasks.spawn(work);
    tokio::task::yield_now().await;
}

async fn settle() {
    for _ in 0..64 {
        tokio::task::yield_now().await;
    }
}

fn write_record<W: Write>(out: &mut W, record: &Record<'_>, pretty: bool) -> Result<()> {
    if pretty {
        serde_json::to_writer_pretty(&mut *out, record)?;
    } else {
        serde_json::to_writer(&mut *out, record)?;
    }
    writeln!(out)?;
    out.flush()?;
    Ok(())
}

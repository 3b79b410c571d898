use std::fmt;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A renderer-defined content unit (spine item or TOC entry).
///
/// Fields the session does not interpret are kept in `extra` and forwarded as-is.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Chapter {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub href: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub subitems: Vec<Chapter>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Chapter {
    pub fn new(href: impl Into<String>) -> Self {
        Self {
            href: href.into(),
            ..Self::default()
        }
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    /// The renderer's label for a displayed chapter is not authoritative.
    pub fn without_label(mut self) -> Self {
        self.label = None;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Page {
    pub page: usize,
    pub cfi: String,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Metadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub creator: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub publisher: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub identifier: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pubdate: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchResult {
    pub cfi: String,
    pub excerpt: String,
}

/// What is currently visible. Every field moves independently.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Location {
    pub start_cfi: Option<String>,
    pub end_cfi: Option<String>,
    pub page: Option<usize>,
    pub chapter: Option<Chapter>,
}

/// Bounds reported by the renderer's visible-range callback.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VisibleRange {
    pub start: String,
    pub end: String,
}

static HTML_FRAGMENT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^(?:[^#\s]*\.x?html?(?:#\S*)?|#\S+)$").expect("valid html fragment pattern")
});

/// Navigation target, classified by the shape of the value the host supplied.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GotoTarget {
    Page(usize),
    Url(String),
    Cfi(String),
}

impl GotoTarget {
    /// Strings that look like an (x)html href or a bare `#anchor` are internal
    /// links; anything else is taken to be a CFI.
    pub fn classify(value: &str) -> Self {
        if HTML_FRAGMENT.is_match(value.trim()) {
            GotoTarget::Url(value.to_owned())
        } else {
            GotoTarget::Cfi(value.to_owned())
        }
    }
}

impl From<usize> for GotoTarget {
    fn from(page: usize) -> Self {
        GotoTarget::Page(page)
    }
}

impl From<&str> for GotoTarget {
    fn from(value: &str) -> Self {
        GotoTarget::classify(value)
    }
}

impl From<String> for GotoTarget {
    fn from(value: String) -> Self {
        GotoTarget::classify(&value)
    }
}

impl fmt::Display for GotoTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GotoTarget::Page(page) => write!(f, "page {page}"),
            GotoTarget::Url(url) => write!(f, "url {url}"),
            GotoTarget::Cfi(cfi) => write!(f, "cfi {cfi}"),
        }
    }
}

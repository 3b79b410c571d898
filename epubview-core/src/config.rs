use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Options fixed for the lifetime of a [`crate::Session`].
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct SessionConfig {
    /// Recompute pagination after the document becomes ready and on every resize.
    pub auto_pagination: bool,
    pub auto_metadata: bool,
    pub auto_toc: bool,
    /// Layout spacing applied to the render region.
    pub padding: Option<String>,
}

impl SessionConfig {
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        toml::from_str(raw).context("failed to decode session config")
    }

    pub fn load(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {:?}", path))?;
        Self::from_toml_str(&raw).with_context(|| format!("invalid config file {:?}", path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use tempfile::tempdir;

    #[test]
    fn missing_keys_fall_back_to_defaults() {
        let config = SessionConfig::from_toml_str("auto-toc = true").unwrap();
        assert!(config.auto_toc);
        assert!(!config.auto_pagination);
        assert!(!config.auto_metadata);
        assert_eq!(config.padding, None);
    }

    #[test]
    fn load_reads_toml_from_disk() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("epubview.toml");
        std::fs::write(
            &path,
            "auto-pagination = true\nauto-metadata = true\npadding = \"0 24px\"\n",
        )
        .unwrap();

        let config = SessionConfig::load(&path).unwrap();
        assert!(config.auto_pagination);
        assert!(config.auto_metadata);
        assert_eq!(config.padding.as_deref(), Some("0 24px"));
    }

    #[test]
    fn unknown_value_types_are_rejected() {
        assert!(SessionConfig::from_toml_str("auto-toc = \"yes\"").is_err());
    }
}

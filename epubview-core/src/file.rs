use std::path::Path;

use anyhow::{Context, Result};
use async_trait::async_trait;
use bytes::Bytes;

/// Host capability for reading a local file in full.
#[async_trait]
pub trait FileReader: Send + Sync {
    async fn read(&self, path: &Path) -> Result<Bytes>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct TokioFileReader;

#[async_trait]
impl FileReader for TokioFileReader {
    async fn read(&self, path: &Path) -> Result<Bytes> {
        let data = tokio::fs::read(path)
            .await
            .with_context(|| format!("failed to read {:?}", path))?;
        Ok(Bytes::from(data))
    }
}

//! Local filesystem backend: documents land in a directory the API serves
//! back under /api/documents.

use std::path::{Path, PathBuf};

use async_trait::async_trait;

use crate::errors::Error;
use crate::publish::Publisher;

pub const DEFAULT_DOCUMENTS_DIR: &str = "public/documents";

pub struct LocalPublisher {
    documents_dir: PathBuf,
    base_url: String,
}

impl LocalPublisher {
    pub fn new(documents_dir: impl Into<PathBuf>, base_url: &str) -> Self {
        LocalPublisher {
            documents_dir: documents_dir.into(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    /// Reads DOCUMENTS_DIR and SITE_BASE_URL, falling back to the given
    /// base URL (normally the server's own address).
    pub fn from_env(default_base_url: &str) -> Result<Self, Error> {
        let documents_dir = std::env::var("DOCUMENTS_DIR").unwrap_or_else(|_| DEFAULT_DOCUMENTS_DIR.to_string());
        let base_url = std::env::var("SITE_BASE_URL").unwrap_or_else(|_| default_base_url.to_string());
        url::Url::parse(&base_url)?;
        Ok(Self::new(documents_dir, &base_url))
    }

    pub fn documents_dir(&self) -> &Path {
        &self.documents_dir
    }
}

#[async_trait]
impl Publisher for LocalPublisher {
    async fn publish_file(&self, path: &str, content: &str, _message: &str) -> Result<String, Error> {
        let full_path = self.documents_dir.join(path);
        if let Some(parent) = full_path.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(Error::DocumentWrite)?;
        }
        tokio::fs::write(&full_path, content).await.map_err(Error::DocumentWrite)?;
        tracing::debug!(path = %full_path.display(), size = content.len(), "Wrote document");

        Ok(format!("{}/api/documents/{}", self.base_url, path))
    }

    fn backend(&self) -> &'static str {
        "local"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_publish_writes_file_and_returns_url() {
        let dir = tempfile::tempdir().unwrap();
        let publisher = LocalPublisher::new(dir.path(), "http://127.0.0.1:3000/");

        let url = publisher
            .publish_file("sales/ada.html", "<html>hi</html>", "unused")
            .await
            .unwrap();

        assert_eq!(url, "http://127.0.0.1:3000/api/documents/sales/ada.html");
        let written = std::fs::read_to_string(dir.path().join("sales/ada.html")).unwrap();
        assert_eq!(written, "<html>hi</html>");
    }

    #[tokio::test]
    async fn test_publish_overwrites_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        let publisher = LocalPublisher::new(dir.path(), "http://127.0.0.1:3000");

        publisher.publish_file("sales/a.html", "v1", "unused").await.unwrap();
        publisher.publish_file("sales/a.html", "v2", "unused").await.unwrap();

        let written = std::fs::read_to_string(dir.path().join("sales/a.html")).unwrap();
        assert_eq!(written, "v2");
    }
}

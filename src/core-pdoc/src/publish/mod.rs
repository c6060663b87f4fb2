//! Publishing rendered documents to a storage backend.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;

use data_model_pdoc::models::DocumentKind;

use crate::errors::Error;
use crate::template::RenderedDocument;

pub mod github;
pub mod local;

pub use github::GitHubPublisher;
pub use local::LocalPublisher;

/// A storage backend that accepts a document and returns its public URL.
#[async_trait]
pub trait Publisher: Send + Sync {
    /// Uploads `content` at the backend-relative `path` and returns the
    /// public URL it is reachable under. `message` annotates the upload on
    /// backends that version their contents.
    async fn publish_file(&self, path: &str, content: &str, message: &str) -> Result<String, Error>;

    /// Short backend name for logs.
    fn backend(&self) -> &'static str;
}

/// Backend-relative path for one rendered document.
pub fn document_path(kind: DocumentKind, filename: &str) -> String {
    format!("{}/{}", kind.as_str(), filename)
}

/// Publishes every rendered document for one client, returning kind -> URL.
///
/// Documents go out one at a time; the first failure aborts the client so a
/// partial publication never gets recorded as complete.
pub async fn publish_client_documents(
    publisher: &dyn Publisher,
    client_email: &str,
    documents: &[RenderedDocument],
) -> Result<BTreeMap<DocumentKind, String>, Error> {
    let mut urls = BTreeMap::new();
    for doc in documents {
        let path = document_path(doc.kind, &doc.filename);
        let message = format!("Add {} document for {}", doc.kind, client_email);
        let url = publisher.publish_file(&path, &doc.content, &message).await?;
        tracing::info!(
            client_email = %client_email,
            kind = %doc.kind,
            path = %path,
            url = %url,
            "Published document"
        );
        urls.insert(doc.kind, url);
    }
    Ok(urls)
}

/// Derives a fresh path after a naming conflict: `a/b/name.html` becomes
/// `a/b/name_retry1.html`, then `_retry2`, ...
pub fn rename_on_conflict(path: &str, attempt: usize) -> String {
    let (dir, file) = match path.rsplit_once('/') {
        Some((dir, file)) => (Some(dir), file),
        None => (None, path),
    };
    let renamed = match file.rsplit_once('.') {
        Some((base, extension)) => format!("{}_retry{}.{}", base, attempt, extension),
        None => format!("{}_retry{}", file, attempt),
    };
    match dir {
        Some(dir) => format!("{}/{}", dir, renamed),
        None => renamed,
    }
}

/// Selects the storage backend from the PUBLISHER env var (default: local).
pub fn publisher_from_env(default_base_url: &str) -> Result<Arc<dyn Publisher>, Error> {
    let backend = std::env::var("PUBLISHER").unwrap_or_else(|_| "local".to_string());
    match backend.as_str() {
        "github" => Ok(Arc::new(GitHubPublisher::from_env()?)),
        "local" => Ok(Arc::new(LocalPublisher::from_env(default_base_url)?)),
        other => Err(Error::PublishConfig(format!("Unknown PUBLISHER backend: {}", other))),
    }
}

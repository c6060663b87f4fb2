//! GitHub Contents API backend: each document becomes a committed file on a
//! branch, publicly served via GitHub Pages.

use async_trait::async_trait;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use serde::Deserialize;

use crate::errors::Error;
use crate::publish::{Publisher, rename_on_conflict};

/// Conflicting uploads are renamed and retried this many times before
/// giving up.
const MAX_CONFLICT_RETRIES: usize = 3;

pub struct GitHubPublisher {
    http: reqwest::Client,
    owner: String,
    repo: String,
    branch: String,
    base_url: String,
}

#[derive(Deserialize)]
struct ContentInfo {
    sha: String,
}

impl GitHubPublisher {
    /// Reads GITHUB_TOKEN, GITHUB_OWNER, GITHUB_REPO, GITHUB_BRANCH and
    /// SITE_BASE_URL. Token, owner and repo are required; the branch
    /// defaults to `main` and the base URL to the GitHub Pages address.
    pub fn from_env() -> Result<Self, Error> {
        let token = require_env("GITHUB_TOKEN")?;
        let owner = require_env("GITHUB_OWNER")?;
        let repo = require_env("GITHUB_REPO")?;
        let branch = std::env::var("GITHUB_BRANCH").unwrap_or_else(|_| "main".to_string());
        let base_url =
            std::env::var("SITE_BASE_URL").unwrap_or_else(|_| format!("https://{}.github.io/{}", owner, repo));
        url::Url::parse(&base_url)?;

        Self::new(&token, owner, repo, branch, base_url)
    }

    pub fn new(token: &str, owner: String, repo: String, branch: String, base_url: String) -> Result<Self, Error> {
        let mut headers = reqwest::header::HeaderMap::new();
        let mut auth = reqwest::header::HeaderValue::from_str(&format!("Bearer {}", token))
            .map_err(|_| Error::PublishConfig("GITHUB_TOKEN contains invalid header characters".to_string()))?;
        auth.set_sensitive(true);
        headers.insert(reqwest::header::AUTHORIZATION, auth);
        headers.insert(
            reqwest::header::ACCEPT,
            reqwest::header::HeaderValue::from_static("application/vnd.github+json"),
        );

        let http = reqwest::Client::builder()
            .user_agent("persodoc")
            .default_headers(headers)
            .build()?;

        Ok(GitHubPublisher {
            http,
            owner,
            repo,
            branch,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn contents_url(&self, path: &str) -> String {
        format!("https://api.github.com/repos/{}/{}/contents/{}", self.owner, self.repo, path)
    }

    /// SHA of the file at `path` on the target branch, if it exists.
    /// The Contents API requires it to update an existing file.
    async fn existing_sha(&self, path: &str) -> Result<Option<String>, Error> {
        let response = self
            .http
            .get(self.contents_url(path))
            .query(&[("ref", self.branch.as_str())])
            .send()
            .await?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let info: ContentInfo = response.error_for_status()?.json().await?;
        Ok(Some(info.sha))
    }
}

#[async_trait]
impl Publisher for GitHubPublisher {
    async fn publish_file(&self, path: &str, content: &str, message: &str) -> Result<String, Error> {
        // Documents live under a dedicated repo directory so the branch can
        // also hold the Pages scaffolding.
        let mut repo_path = format!("documents/{}", path);

        for attempt in 0..=MAX_CONFLICT_RETRIES {
            let sha = self.existing_sha(&repo_path).await?;

            let mut body = serde_json::Map::new();
            body.insert("message".to_string(), message.into());
            body.insert("content".to_string(), BASE64.encode(content).into());
            body.insert("branch".to_string(), self.branch.clone().into());
            if let Some(sha) = &sha {
                body.insert("sha".to_string(), sha.clone().into());
            }

            let response = self.http.put(self.contents_url(&repo_path)).json(&body).send().await?;

            if response.status() == reqwest::StatusCode::CONFLICT && attempt < MAX_CONFLICT_RETRIES {
                let renamed = rename_on_conflict(&repo_path, attempt + 1);
                tracing::warn!(
                    path = %repo_path,
                    renamed = %renamed,
                    attempt = attempt + 1,
                    "Naming conflict on publish, retrying under a new name"
                );
                repo_path = renamed;
                continue;
            }

            response.error_for_status()?;
            return Ok(format!("{}/{}", self.base_url, repo_path));
        }

        Err(Error::PublishConflict(repo_path))
    }

    fn backend(&self) -> &'static str {
        "github"
    }
}

fn require_env(name: &str) -> Result<String, Error> {
    std::env::var(name)
        .ok()
        .filter(|v| !v.is_empty())
        .ok_or_else(|| Error::PublishConfig(format!("{} is not set", name)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn publisher() -> GitHubPublisher {
        GitHubPublisher::new(
            "token",
            "acme".to_string(),
            "pages".to_string(),
            "main".to_string(),
            "https://acme.github.io/pages/".to_string(),
        )
        .unwrap()
    }

    #[test]
    fn test_contents_url() {
        let p = publisher();
        assert_eq!(
            p.contents_url("documents/sales/a.html"),
            "https://api.github.com/repos/acme/pages/contents/documents/sales/a.html"
        );
    }

    #[test]
    fn test_base_url_is_normalized() {
        // The trailing slash from configuration never doubles up in URLs.
        let p = publisher();
        assert_eq!(p.base_url, "https://acme.github.io/pages");
    }

    #[test]
    fn test_invalid_token_header_rejected() {
        let result = GitHubPublisher::new(
            "bad\ntoken",
            "acme".to_string(),
            "pages".to_string(),
            "main".to_string(),
            "https://acme.github.io/pages".to_string(),
        );
        assert!(matches!(result, Err(Error::PublishConfig(_))));
    }
}

//! Thin typed client over the persodoc HTTP API.

use std::time::Duration;

use serde::de::DeserializeOwned;

use data_model_pdoc::models::{ClientRecord, ExportPayload, ExportResponse, GeneratePayload, GenerationResult};

use crate::errors::Error;

pub struct ApiClient {
    http: reqwest::Client,
    base_url: String,
}

impl ApiClient {
    pub fn new(base_url: &str) -> Result<Self, Error> {
        url::Url::parse(base_url)?;
        let http = reqwest::Client::builder().timeout(Duration::from_secs(30)).build()?;
        Ok(ApiClient {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// POST /api/generate for one client.
    pub async fn generate(&self, client: &ClientRecord) -> Result<GenerationResult, Error> {
        tracing::debug!(client_email = %client.email, "API request: POST /api/generate");
        let response = self
            .http
            .post(self.endpoint("/api/generate"))
            .json(&GeneratePayload { client: client.clone() })
            .send()
            .await?;
        json_or_api_error(response).await
    }

    /// POST /api/export with the collected results attached.
    pub async fn export_with_results(&self, results: &[GenerationResult]) -> Result<String, Error> {
        tracing::debug!(results = results.len(), "API request: POST /api/export");
        let response = self
            .http
            .post(self.endpoint("/api/export"))
            .json(&ExportPayload {
                results: results.to_vec(),
            })
            .send()
            .await?;
        let parsed: ExportResponse = json_or_api_error(response).await?;
        Ok(parsed.csv)
    }

    /// GET /api/export - everything the server has on record, as CSV.
    pub async fn export_all(&self) -> Result<String, Error> {
        tracing::debug!("API request: GET /api/export");
        let response = self.http.get(self.endpoint("/api/export")).send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::ApiError {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response.text().await?)
    }
}

async fn json_or_api_error<T: DeserializeOwned>(response: reqwest::Response) -> Result<T, Error> {
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(Error::ApiError {
            status: status.as_u16(),
            body,
        });
    }
    Ok(response.json().await?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_url_is_normalized() {
        let client = ApiClient::new("http://127.0.0.1:3000/").unwrap();
        assert_eq!(client.base_url(), "http://127.0.0.1:3000");
        assert_eq!(client.endpoint("/api/export"), "http://127.0.0.1:3000/api/export");
    }

    #[test]
    fn test_invalid_base_url() {
        let result = ApiClient::new("not a url");
        assert!(matches!(result, Err(Error::InvalidBaseUrl(_))));
    }
}

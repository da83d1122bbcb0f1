//! Tavily search + extract over its JSON HTTP API.

use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::debug;

use crate::{
    AdapterError, ExtractDepth, ExtractResults, ExtractionProvider, SearchProvider, SearchRequest,
    SearchResults,
};

pub const DEFAULT_TAVILY_URL: &str = "https://api.tavily.com";

#[derive(Debug, Clone)]
pub struct TavilyClient {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

#[derive(Debug, Serialize)]
struct ExtractBody<'a> {
    urls: &'a [String],
    extract_depth: ExtractDepth,
}

impl TavilyClient {
    pub fn new(api_key: impl Into<String>, base_url: &str, timeout: Duration) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("building tavily http client")?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.into(),
        })
    }

    async fn post<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, AdapterError> {
        let url = format!("{}/{}", self.base_url, path);
        let resp = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(body)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(AdapterError::Status {
                status: status.as_u16(),
                body,
            });
        }
        Ok(resp.json().await?)
    }
}

#[async_trait]
impl SearchProvider for TavilyClient {
    async fn search(&self, request: &SearchRequest) -> Result<SearchResults, AdapterError> {
        let results: SearchResults = self.post("search", request).await?;
        debug!(
            query = %request.query,
            hits = results.results.len(),
            "tavily search"
        );
        Ok(results)
    }
}

#[async_trait]
impl ExtractionProvider for TavilyClient {
    async fn extract(&self, urls: &[String], depth: ExtractDepth) -> Result<ExtractResults, AdapterError> {
        let results: ExtractResults = self
            .post(
                "extract",
                &ExtractBody {
                    urls,
                    extract_depth: depth,
                },
            )
            .await?;
        debug!(urls = urls.len(), pages = results.results.len(), "tavily extract");
        Ok(results)
    }
}

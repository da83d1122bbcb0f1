//! Capability contracts for the external providers plus their concrete adapters.

pub mod browser;
pub mod images;
pub mod openai;
pub mod tavily;
#[cfg(any(test, feature = "testing"))]
pub mod testing;

use std::path::Path;

use async_trait::async_trait;
use comfacts_storage::{CompareError, FetchError};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use browser::{find_logo_url, LocatorConfig, LOGO_CONTAINER_CLASS, LOGO_MARKER};
#[cfg(feature = "browser")]
pub use browser::ChromiumLogoLocator;
pub use images::{HttpImageFetcher, PixelDiffComparator};
pub use openai::OpenAiInference;
pub use tavily::TavilyClient;

pub const CRATE_NAME: &str = "comfacts-adapters";

#[derive(Debug, Error)]
pub enum AdapterError {
    #[error("{0}")]
    Message(String),
    #[error("provider returned http {status}: {body}")]
    Status { status: u16, body: String },
    #[error(transparent)]
    Http(#[from] reqwest::Error),
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error(transparent)]
    OpenAi(#[from] async_openai::error::OpenAIError),
    #[cfg(feature = "browser")]
    #[error(transparent)]
    Browser(#[from] chromiumoxide::error::CdpError),
    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SearchRequest {
    pub query: String,
    pub include_domains: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_results: Option<u32>,
    pub include_answer: bool,
}

impl SearchRequest {
    pub fn new(query: impl Into<String>, include_domains: &[&str]) -> Self {
        Self {
            query: query.into(),
            include_domains: include_domains.iter().map(|d| d.to_string()).collect(),
            max_results: None,
            include_answer: false,
        }
    }

    pub fn max_results(mut self, max_results: u32) -> Self {
        self.max_results = Some(max_results);
        self
    }

    pub fn include_answer(mut self, include_answer: bool) -> Self {
        self.include_answer = include_answer;
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub content: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchResults {
    #[serde(default)]
    pub answer: Option<String>,
    #[serde(default)]
    pub results: Vec<SearchHit>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExtractDepth {
    Basic,
    Advanced,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExtractedPage {
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub raw_content: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExtractResults {
    #[serde(default)]
    pub results: Vec<ExtractedPage>,
}

/// Web search restricted to a domain allowlist.
#[async_trait]
pub trait SearchProvider: Send + Sync {
    async fn search(&self, request: &SearchRequest) -> Result<SearchResults, AdapterError>;
}

/// Full-page text extraction.
#[async_trait]
pub trait ExtractionProvider: Send + Sync {
    async fn extract(&self, urls: &[String], depth: ExtractDepth) -> Result<ExtractResults, AdapterError>;
}

/// Chat-style language model: one system instruction, one task instruction, text back.
#[async_trait]
pub trait InferenceProvider: Send + Sync {
    async fn invoke(&self, system_instruction: &str, task_instruction: &str) -> Result<String, AdapterError>;
}

/// Renders a page and returns the URL of its company logo image, if one is found.
#[async_trait]
pub trait LogoLocator: Send + Sync {
    async fn locate_logo(&self, page_url: &str) -> Result<Option<String>, AdapterError>;
}

#[async_trait]
pub trait ImageFetcher: Send + Sync {
    async fn fetch_image(&self, url: &str) -> Result<Vec<u8>, AdapterError>;
}

/// Scores a fetched candidate logo against the reference logo on disk.
pub trait LogoComparator: Send + Sync {
    fn compare(&self, reference: &Path, candidate: &[u8]) -> Result<f64, CompareError>;
}

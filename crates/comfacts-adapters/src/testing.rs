//! Deterministic provider doubles that record how they were called.

use std::collections::{HashMap, VecDeque};
use std::path::Path;
use std::sync::Mutex;

use async_trait::async_trait;
use comfacts_storage::CompareError;

use crate::{
    AdapterError, ExtractDepth, ExtractResults, ExtractedPage, ExtractionProvider, ImageFetcher,
    InferenceProvider, LogoComparator, LogoLocator, SearchHit, SearchProvider, SearchRequest,
    SearchResults,
};

fn lock<T>(m: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

pub fn hit(url: &str, content: &str) -> SearchHit {
    SearchHit {
        url: Some(url.to_string()),
        title: None,
        content: Some(content.to_string()),
    }
}

/// Answers searches from a queue; an exhausted queue answers with no results.
#[derive(Default)]
pub struct ScriptedSearch {
    replies: Mutex<VecDeque<Result<SearchResults, String>>>,
    requests: Mutex<Vec<SearchRequest>>,
}

impl ScriptedSearch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn then_hits(self, hits: Vec<SearchHit>) -> Self {
        lock(&self.replies).push_back(Ok(SearchResults {
            answer: None,
            results: hits,
        }));
        self
    }

    pub fn then_fail(self, message: &str) -> Self {
        lock(&self.replies).push_back(Err(message.to_string()));
        self
    }

    pub fn requests(&self) -> Vec<SearchRequest> {
        lock(&self.requests).clone()
    }
}

#[async_trait]
impl SearchProvider for ScriptedSearch {
    async fn search(&self, request: &SearchRequest) -> Result<SearchResults, AdapterError> {
        lock(&self.requests).push(request.clone());
        match lock(&self.replies).pop_front() {
            Some(Ok(results)) => Ok(results),
            Some(Err(message)) => Err(AdapterError::Message(message)),
            None => Ok(SearchResults::default()),
        }
    }
}

/// Serves page text per URL; unknown URLs fail.
#[derive(Default)]
pub struct StaticExtraction {
    pages: HashMap<String, Result<String, String>>,
    calls: Mutex<Vec<(Vec<String>, ExtractDepth)>>,
}

impl StaticExtraction {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn page(mut self, url: &str, text: &str) -> Self {
        self.pages.insert(url.to_string(), Ok(text.to_string()));
        self
    }

    pub fn failing(mut self, url: &str, message: &str) -> Self {
        self.pages.insert(url.to_string(), Err(message.to_string()));
        self
    }

    pub fn calls(&self) -> Vec<(Vec<String>, ExtractDepth)> {
        lock(&self.calls).clone()
    }
}

#[async_trait]
impl ExtractionProvider for StaticExtraction {
    async fn extract(&self, urls: &[String], depth: ExtractDepth) -> Result<ExtractResults, AdapterError> {
        lock(&self.calls).push((urls.to_vec(), depth));
        let mut results = Vec::new();
        for url in urls {
            match self.pages.get(url) {
                Some(Ok(text)) => results.push(ExtractedPage {
                    url: Some(url.clone()),
                    raw_content: Some(text.clone()),
                }),
                Some(Err(message)) => return Err(AdapterError::Message(message.clone())),
                None => return Err(AdapterError::Message(format!("no page scripted for {url}"))),
            }
        }
        Ok(ExtractResults { results })
    }
}

type Reply = Box<dyn Fn(&str, &str) -> Result<String, String> + Send + Sync>;

/// Inference double driven by a closure over (system, task) instructions.
pub struct ScriptedInference {
    reply: Reply,
    calls: Mutex<Vec<(String, String)>>,
}

impl ScriptedInference {
    pub fn new(reply: impl Fn(&str, &str) -> Result<String, String> + Send + Sync + 'static) -> Self {
        Self {
            reply: Box::new(reply),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn always(reply: &str) -> Self {
        let reply = reply.to_string();
        Self::new(move |_, _| Ok(reply.clone()))
    }

    pub fn calls(&self) -> Vec<(String, String)> {
        lock(&self.calls).clone()
    }
}

#[async_trait]
impl InferenceProvider for ScriptedInference {
    async fn invoke(&self, system_instruction: &str, task_instruction: &str) -> Result<String, AdapterError> {
        lock(&self.calls).push((system_instruction.to_string(), task_instruction.to_string()));
        (self.reply)(system_instruction, task_instruction).map_err(AdapterError::Message)
    }
}

/// Logo locator keyed by page URL; unlisted pages have no logo.
#[derive(Default)]
pub struct MapLogoLocator {
    logos: HashMap<String, Result<Option<String>, String>>,
    calls: Mutex<Vec<String>>,
}

impl MapLogoLocator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn logo(mut self, page_url: &str, logo_url: &str) -> Self {
        self.logos.insert(page_url.to_string(), Ok(Some(logo_url.to_string())));
        self
    }

    pub fn failing(mut self, page_url: &str, message: &str) -> Self {
        self.logos.insert(page_url.to_string(), Err(message.to_string()));
        self
    }

    pub fn calls(&self) -> Vec<String> {
        lock(&self.calls).clone()
    }
}

#[async_trait]
impl LogoLocator for MapLogoLocator {
    async fn locate_logo(&self, page_url: &str) -> Result<Option<String>, AdapterError> {
        lock(&self.calls).push(page_url.to_string());
        match self.logos.get(page_url) {
            Some(Ok(logo)) => Ok(logo.clone()),
            Some(Err(message)) => Err(AdapterError::Message(message.clone())),
            None => Ok(None),
        }
    }
}

#[derive(Default)]
pub struct MemoryImageFetcher {
    images: HashMap<String, Vec<u8>>,
}

impl MemoryImageFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn image(mut self, url: &str, bytes: &[u8]) -> Self {
        self.images.insert(url.to_string(), bytes.to_vec());
        self
    }
}

#[async_trait]
impl ImageFetcher for MemoryImageFetcher {
    async fn fetch_image(&self, url: &str) -> Result<Vec<u8>, AdapterError> {
        self.images
            .get(url)
            .cloned()
            .ok_or_else(|| AdapterError::Message(format!("404 for {url}")))
    }
}

/// Scores candidates by their exact bytes; unknown bytes are unreadable.
#[derive(Default)]
pub struct FixedScoreComparator {
    scores: HashMap<Vec<u8>, f64>,
}

impl FixedScoreComparator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn score(mut self, candidate: &[u8], score: f64) -> Self {
        self.scores.insert(candidate.to_vec(), score);
        self
    }
}

impl LogoComparator for FixedScoreComparator {
    fn compare(&self, _reference: &Path, candidate: &[u8]) -> Result<f64, CompareError> {
        self.scores
            .get(candidate)
            .copied()
            .ok_or_else(|| CompareError::Unreadable {
                origin: "candidate logo".to_string(),
                reason: "unrecognised bytes".to_string(),
            })
    }
}

//! Company resolution: discovery, logo disambiguation, per-source extraction and fusion.

pub mod agent;
pub mod content;
pub mod disambiguate;
pub mod discovery;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use comfacts_adapters::{
    ChromiumLogoLocator, ExtractionProvider, HttpImageFetcher, ImageFetcher, InferenceProvider,
    LocatorConfig, LogoComparator, LogoLocator, OpenAiInference, PixelDiffComparator, SearchProvider,
    SearchRequest, TavilyClient,
};
use comfacts_core::{
    CompanyQuery, CompanyRecord, ExtractionFailure, Resolution, ResolutionPath, SourceContribution,
    SourceOutcome,
};
use comfacts_storage::{HttpClientConfig, HttpFetcher};
use thiserror::Error;
use tracing::{info, info_span, warn, Instrument};
use uuid::Uuid;

pub use agent::{disambiguation_hint, parse_reply, strip_code_fence, ExtractionAgent};
pub use content::ContentExtractor;
pub use disambiguate::LogoDisambiguator;
pub use discovery::{is_web_url, parse_web_url, search_candidates};

pub const CRATE_NAME: &str = "comfacts-resolve";

pub const DISCOVERY_DOMAINS: [&str; 1] = ["linkedin.com"];
pub const FALLBACK_DOMAINS: [&str; 4] = ["linkedin.com", "zoominfo.com", "youtube.com", "crunchbase.com"];
pub const FALLBACK_MAX_RESULTS: u32 = 5;

/// Upper bound for a single search or advanced extraction call.
const PROVIDER_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing search provider API key in configuration")]
    MissingSearchCredential,
    #[error(transparent)]
    Client(#[from] anyhow::Error),
}

#[derive(Debug, Clone)]
pub struct ResolveConfig {
    pub tavily_api_key: Option<String>,
    pub tavily_api_url: String,
    pub openai_api_key: Option<String>,
    pub openai_model: String,
    pub http_timeout_secs: u64,
    pub user_agent: String,
    pub logo_settle_secs: u64,
    pub chrome_path: Option<PathBuf>,
    pub artifacts_dir: PathBuf,
    pub document_service_url: Option<String>,
}

impl ResolveConfig {
    pub fn from_env() -> Self {
        Self {
            tavily_api_key: non_empty_var("TAVILY_API_KEY"),
            tavily_api_url: std::env::var("TAVILY_API_URL")
                .unwrap_or_else(|_| comfacts_adapters::tavily::DEFAULT_TAVILY_URL.to_string()),
            openai_api_key: non_empty_var("OPENAI_API_KEY"),
            openai_model: std::env::var("COMFACTS_OPENAI_MODEL")
                .unwrap_or_else(|_| comfacts_adapters::openai::DEFAULT_MODEL.to_string()),
            http_timeout_secs: std::env::var("COMFACTS_HTTP_TIMEOUT_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(15),
            user_agent: std::env::var("COMFACTS_USER_AGENT")
                .unwrap_or_else(|_| "comfacts-bot/0.1".to_string()),
            logo_settle_secs: std::env::var("COMFACTS_LOGO_SETTLE_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(5),
            chrome_path: non_empty_var("COMFACTS_CHROME_PATH").map(PathBuf::from),
            artifacts_dir: std::env::var("COMFACTS_ARTIFACTS_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("./artifacts")),
            document_service_url: non_empty_var("COMFACTS_DOCUMENT_SERVICE_URL"),
        }
    }

    pub fn http_client_config(&self) -> HttpClientConfig {
        HttpClientConfig {
            timeout: Duration::from_secs(self.http_timeout_secs),
            user_agent: Some(self.user_agent.clone()),
            ..Default::default()
        }
    }
}

fn non_empty_var(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

/// Search allowlists and limits for the discovery and fallback stages.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolverSettings {
    pub discovery_domains: Vec<String>,
    pub fallback_domains: Vec<String>,
    pub fallback_max_results: u32,
    pub fallback_include_answer: bool,
}

impl Default for ResolverSettings {
    fn default() -> Self {
        Self {
            discovery_domains: DISCOVERY_DOMAINS.iter().map(|d| d.to_string()).collect(),
            fallback_domains: FALLBACK_DOMAINS.iter().map(|d| d.to_string()).collect(),
            fallback_max_results: FALLBACK_MAX_RESULTS,
            fallback_include_answer: true,
        }
    }
}

/// The external providers a resolver talks to.
#[derive(Clone)]
pub struct Capabilities {
    pub search: Arc<dyn SearchProvider>,
    pub extraction: Arc<dyn ExtractionProvider>,
    pub inference: Option<Arc<dyn InferenceProvider>>,
    pub locator: Arc<dyn LogoLocator>,
    pub images: Arc<dyn ImageFetcher>,
    pub comparator: Arc<dyn LogoComparator>,
}

impl Capabilities {
    /// Builds the production providers. Only the search credential is mandatory.
    pub fn from_config(config: &ResolveConfig, fetcher: Arc<HttpFetcher>) -> Result<Self, ConfigError> {
        let api_key = config
            .tavily_api_key
            .clone()
            .ok_or(ConfigError::MissingSearchCredential)?;
        let tavily = Arc::new(TavilyClient::new(
            api_key,
            &config.tavily_api_url,
            PROVIDER_TIMEOUT,
        )?);

        let inference: Option<Arc<dyn InferenceProvider>> = match &config.openai_api_key {
            Some(key) => Some(Arc::new(OpenAiInference::new(key.clone(), config.openai_model.clone()))),
            None => {
                warn!("OPENAI_API_KEY not set; every source extraction will be recorded as failed");
                None
            }
        };

        let locator = ChromiumLogoLocator::new(LocatorConfig {
            settle: Duration::from_secs(config.logo_settle_secs),
            chrome_executable: config.chrome_path.clone(),
            ..Default::default()
        });

        Ok(Self {
            search: tavily.clone(),
            extraction: tavily,
            inference,
            locator: Arc::new(locator),
            images: Arc::new(HttpImageFetcher::new(fetcher)),
            comparator: Arc::new(PixelDiffComparator),
        })
    }
}

pub struct CompanyResolver {
    search: Arc<dyn SearchProvider>,
    content: ContentExtractor,
    agent: ExtractionAgent,
    logos: LogoDisambiguator,
    settings: ResolverSettings,
}

impl CompanyResolver {
    pub fn new(capabilities: Capabilities, settings: ResolverSettings) -> Self {
        Self {
            search: capabilities.search,
            content: ContentExtractor::new(capabilities.extraction),
            agent: ExtractionAgent::new(capabilities.inference),
            logos: LogoDisambiguator::new(capabilities.locator, capabilities.images, capabilities.comparator),
            settings,
        }
    }

    pub fn from_config(config: &ResolveConfig, fetcher: Arc<HttpFetcher>) -> Result<Self, ConfigError> {
        Ok(Self::new(
            Capabilities::from_config(config, fetcher)?,
            ResolverSettings::default(),
        ))
    }

    pub fn settings(&self) -> &ResolverSettings {
        &self.settings
    }

    /// Runs one resolution. Provider failures never surface here; they end up as record
    /// error entries or steer the run into the name-search fallback.
    pub async fn resolve(&self, query: &CompanyQuery) -> Resolution {
        let run_id = Uuid::new_v4();
        let span = info_span!("resolve", %run_id, company = %query.name);
        async move {
            let resolution = self.run(query).await;
            match &resolution {
                Resolution::Found { record, path } => info!(
                    ?path,
                    sources = record.urls().len(),
                    errors = record.errors.len(),
                    "company resolved"
                ),
                Resolution::NotFound { path } => info!(?path, "no information found"),
            }
            resolution
        }
        .instrument(span)
        .await
    }

    async fn run(&self, query: &CompanyQuery) -> Resolution {
        if !query.urls.is_empty() {
            let record = self.extract_sources(&query.name, &query.urls).await;
            return finish(
                Some(record),
                ResolutionPath::DirectUrls {
                    urls: query.urls.clone(),
                },
            );
        }

        if let Some(reference) = &query.reference_logo {
            let candidates = match search_candidates(
                self.search.as_ref(),
                &query.name,
                &self.settings.discovery_domains,
            )
            .await
            {
                Ok(candidates) => candidates,
                Err(err) => {
                    warn!("candidate discovery failed: {err}");
                    Vec::new()
                }
            };

            let ranked = self.logos.rank(reference, &candidates).await;
            if let Some(best) = ranked.into_iter().next() {
                info!(url = %best.url, score = best.score, "logo match selected");
                let record = self
                    .extract_sources(&query.name, std::slice::from_ref(&best.url))
                    .await;
                return finish(
                    Some(record),
                    ResolutionPath::LogoMatched {
                        url: best.url,
                        score: best.score,
                    },
                );
            }
            info!(candidates = candidates.len(), "no logo comparison succeeded");
        }

        let record = self.name_search_fallback(&query.name).await;
        finish(record, ResolutionPath::NameSearchFallback)
    }

    /// One task per URL; contributions are folded in input order, not completion order.
    async fn extract_sources(&self, company_name: &str, urls: &[String]) -> CompanyRecord {
        let tasks: Vec<_> = urls
            .iter()
            .map(|url| {
                let content = self.content.clone();
                let agent = self.agent.clone();
                let task_url = url.clone();
                let handle = tokio::spawn(
                    async move { extract_source(&content, &agent, &task_url).await }.in_current_span(),
                );
                (url.clone(), handle)
            })
            .collect();

        let mut contributions = Vec::with_capacity(tasks.len());
        for (url, handle) in tasks {
            let outcome = match handle.await {
                Ok(outcome) => outcome,
                Err(err) => {
                    warn!(url = %url, "extraction task aborted: {err}");
                    SourceOutcome::failed(ExtractionFailure::TaskAborted(err.to_string()))
                }
            };
            contributions.push(SourceContribution::from_url(url, outcome));
        }
        CompanyRecord::fuse(company_name, contributions)
    }

    /// Broad search whose snippets are read as a single unattributed source.
    async fn name_search_fallback(&self, company_name: &str) -> Option<CompanyRecord> {
        let request = SearchRequest {
            query: company_name.to_string(),
            include_domains: self.settings.fallback_domains.clone(),
            max_results: Some(self.settings.fallback_max_results),
            include_answer: self.settings.fallback_include_answer,
        };

        let results = match self.search.search(&request).await {
            Ok(results) => results,
            Err(err) => {
                warn!("fallback search failed: {err}");
                let outcome = SourceOutcome::failed(ExtractionFailure::Provider(err.to_string()));
                return Some(CompanyRecord::fuse(
                    company_name,
                    [SourceContribution::unattributed(outcome)],
                ));
            }
        };

        let text = results
            .results
            .iter()
            .filter_map(|hit| hit.content.as_deref())
            .filter(|snippet| !snippet.is_empty())
            .collect::<Vec<_>>()
            .join("\n")
            .trim()
            .to_string();
        if text.is_empty() {
            return None;
        }

        let outcome = match self.agent.extract_fields(&text, None).await {
            Ok(fields) => SourceOutcome::Extracted(fields),
            Err(err) => {
                warn!("fallback extraction failed: {err}");
                SourceOutcome::failed(err)
            }
        };
        Some(CompanyRecord::fuse(
            company_name,
            [SourceContribution::unattributed(outcome)],
        ))
    }
}

async fn extract_source(content: &ContentExtractor, agent: &ExtractionAgent, url: &str) -> SourceOutcome {
    let text = content.extract_text(url).await;
    if text.is_empty() {
        warn!(url, "source skipped: no content extracted");
        return SourceOutcome::failed(ExtractionFailure::NoContent);
    }

    let hint = disambiguation_hint(url);
    match agent.extract_fields(&text, Some(&hint)).await {
        Ok(fields) => SourceOutcome::Extracted(fields.attributed_to(url)),
        Err(err) => {
            warn!(url, "source skipped: {err}");
            SourceOutcome::failed(err)
        }
    }
}

fn finish(record: Option<CompanyRecord>, path: ResolutionPath) -> Resolution {
    match record {
        Some(record) if record.has_information() => Resolution::Found { record, path },
        _ => Resolution::NotFound { path },
    }
}

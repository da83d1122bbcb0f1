//! Logo disambiguation: pick the candidate whose page logo looks most like the reference.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use comfacts_adapters::{AdapterError, ImageFetcher, LogoComparator, LogoLocator};
use comfacts_core::{rank_logo_matches, CandidateUrl, LogoMatch};
use comfacts_storage::CompareError;
use thiserror::Error;
use tokio::task::JoinError;
use tracing::{debug, warn};

#[derive(Debug, Error)]
enum CandidateFailure {
    #[error("logo lookup failed: {0}")]
    Locate(AdapterError),
    #[error("logo fetch failed: {0}")]
    Fetch(AdapterError),
    #[error("comparison failed: {0}")]
    Compare(#[from] CompareError),
    #[error("worker aborted: {0}")]
    Worker(#[from] JoinError),
}

#[derive(Clone)]
pub struct LogoDisambiguator {
    locator: Arc<dyn LogoLocator>,
    images: Arc<dyn ImageFetcher>,
    comparator: Arc<dyn LogoComparator>,
}

impl LogoDisambiguator {
    pub fn new(
        locator: Arc<dyn LogoLocator>,
        images: Arc<dyn ImageFetcher>,
        comparator: Arc<dyn LogoComparator>,
    ) -> Self {
        Self {
            locator,
            images,
            comparator,
        }
    }

    /// Scores every candidate against `reference`, best first.
    ///
    /// Candidates run one at a time so at most one browser is alive. A candidate without a
    /// logo, or one that fails anywhere along the way, is left out of the ranking.
    pub async fn rank(&self, reference: &Path, candidates: &[CandidateUrl]) -> Vec<LogoMatch> {
        let mut matches = Vec::new();
        for candidate in candidates {
            match self.score(reference, &candidate.url).await {
                Ok(Some(score)) => {
                    debug!(url = %candidate.url, score, "logo compared");
                    matches.push(LogoMatch {
                        url: candidate.url.clone(),
                        score,
                    });
                }
                Ok(None) => debug!(url = %candidate.url, "no logo on candidate page"),
                Err(err) => warn!(url = %candidate.url, "candidate excluded: {err}"),
            }
        }
        rank_logo_matches(matches)
    }

    async fn score(&self, reference: &Path, page_url: &str) -> Result<Option<f64>, CandidateFailure> {
        let locator = Arc::clone(&self.locator);
        let page = page_url.to_string();
        let logo_url = tokio::spawn(async move { locator.locate_logo(&page).await })
            .await?
            .map_err(CandidateFailure::Locate)?;
        let Some(logo_url) = logo_url else {
            return Ok(None);
        };

        let bytes = self
            .images
            .fetch_image(&logo_url)
            .await
            .map_err(CandidateFailure::Fetch)?;

        let comparator = Arc::clone(&self.comparator);
        let reference: PathBuf = reference.to_path_buf();
        let score = tokio::task::spawn_blocking(move || comparator.compare(&reference, &bytes)).await??;
        Ok(Some(score))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use comfacts_adapters::testing::{FixedScoreComparator, MapLogoLocator, MemoryImageFetcher};

    fn candidates(urls: &[&str]) -> Vec<CandidateUrl> {
        urls.iter()
            .map(|u| CandidateUrl {
                url: u.to_string(),
                source_domain: "www.linkedin.com".into(),
            })
            .collect()
    }

    #[tokio::test]
    async fn failures_are_excluded_and_the_loop_continues() {
        let locator = Arc::new(
            MapLogoLocator::new()
                .failing("https://li.example/a", "browser crashed")
                .logo("https://li.example/b", "https://cdn.example/b.png")
                .logo("https://li.example/c", "https://cdn.example/missing.png")
                .logo("https://li.example/d", "https://cdn.example/d.png")
                .logo("https://li.example/e", "https://cdn.example/corrupt.png"),
        );
        let images = Arc::new(
            MemoryImageFetcher::new()
                .image("https://cdn.example/b.png", b"b")
                .image("https://cdn.example/d.png", b"d")
                .image("https://cdn.example/corrupt.png", b"???"),
        );
        let comparator = Arc::new(FixedScoreComparator::new().score(b"b", 40.0).score(b"d", 91.5));
        let disambiguator = LogoDisambiguator::new(locator.clone(), images, comparator);

        let ranked = disambiguator
            .rank(
                Path::new("reference.png"),
                &candidates(&[
                    "https://li.example/a",
                    "https://li.example/b",
                    "https://li.example/c",
                    "https://li.example/d",
                    "https://li.example/e",
                    "https://li.example/f",
                ]),
            )
            .await;

        assert_eq!(
            ranked,
            vec![
                LogoMatch {
                    url: "https://li.example/d".into(),
                    score: 91.5
                },
                LogoMatch {
                    url: "https://li.example/b".into(),
                    score: 40.0
                },
            ]
        );
        assert_eq!(locator.calls().len(), 6);
    }

    #[tokio::test]
    async fn nothing_comparable_ranks_empty() {
        let disambiguator = LogoDisambiguator::new(
            Arc::new(MapLogoLocator::new()),
            Arc::new(MemoryImageFetcher::new()),
            Arc::new(FixedScoreComparator::new()),
        );
        let ranked = disambiguator
            .rank(Path::new("reference.png"), &candidates(&["https://li.example/a"]))
            .await;
        assert!(ranked.is_empty());
    }
}

use std::sync::Arc;

use comfacts_adapters::{ExtractDepth, ExtractionProvider};
use tracing::warn;

/// Full-page text for one URL. Provider failures are soft and read as no content.
#[derive(Clone)]
pub struct ContentExtractor {
    provider: Arc<dyn ExtractionProvider>,
}

impl ContentExtractor {
    pub fn new(provider: Arc<dyn ExtractionProvider>) -> Self {
        Self { provider }
    }

    pub async fn extract_text(&self, url: &str) -> String {
        let results = match self
            .provider
            .extract(&[url.to_string()], ExtractDepth::Advanced)
            .await
        {
            Ok(results) => results,
            Err(err) => {
                warn!(url, "content extraction failed: {err}");
                return String::new();
            }
        };

        results
            .results
            .iter()
            .filter_map(|page| page.raw_content.as_deref())
            .filter(|block| !block.is_empty())
            .collect::<Vec<_>>()
            .join("\n")
            .trim()
            .to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use comfacts_adapters::testing::StaticExtraction;

    #[tokio::test]
    async fn requests_advanced_depth_and_trims() {
        let provider = Arc::new(StaticExtraction::new().page("https://acme.example", "  About Acme\n"));
        let extractor = ContentExtractor::new(provider.clone());

        assert_eq!(extractor.extract_text("https://acme.example").await, "About Acme");
        assert_eq!(
            provider.calls(),
            vec![(vec!["https://acme.example".to_string()], ExtractDepth::Advanced)]
        );
    }

    #[tokio::test]
    async fn provider_error_reads_as_empty() {
        let provider = Arc::new(StaticExtraction::new().failing("https://acme.example", "timeout"));
        let extractor = ContentExtractor::new(provider);
        assert_eq!(extractor.extract_text("https://acme.example").await, "");
    }
}

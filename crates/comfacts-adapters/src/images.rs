use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use comfacts_storage::{decode_image, load_image, similarity, CompareError, HttpFetcher};

use crate::{AdapterError, ImageFetcher, LogoComparator};

/// Downloads candidate logo images through the shared, rate-limited fetcher.
pub struct HttpImageFetcher {
    fetcher: Arc<HttpFetcher>,
}

impl HttpImageFetcher {
    pub fn new(fetcher: Arc<HttpFetcher>) -> Self {
        Self { fetcher }
    }
}

#[async_trait]
impl ImageFetcher for HttpImageFetcher {
    async fn fetch_image(&self, url: &str) -> Result<Vec<u8>, AdapterError> {
        Ok(self.fetcher.fetch_bytes(url).await?.body)
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct PixelDiffComparator;

impl LogoComparator for PixelDiffComparator {
    fn compare(&self, reference: &Path, candidate: &[u8]) -> Result<f64, CompareError> {
        let reference = load_image(reference)?;
        let candidate = decode_image(candidate, "candidate logo")?;
        Ok(similarity(&reference, &candidate))
    }
}

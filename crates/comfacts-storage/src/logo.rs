//! Turns a caller supplied logo reference into a locally readable file.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

use crate::{ArtifactStore, HttpFetcher};

const LOGO_NAMESPACE: &str = "reference-logos";

/// Caller identity forwarded to the document service.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentMetadata {
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub username: Option<String>,
}

#[derive(Debug, Error)]
pub enum LogoResolveError {
    #[error("Metadata required to resolve logo file.")]
    MetadataRequired,
    #[error("Logo file not found at {0}")]
    NotFound(String),
    #[error("no document service configured to resolve logo ids")]
    DocumentServiceUnavailable,
    #[error("resolving logo document failed: {0:#}")]
    Download(anyhow::Error),
}

impl LogoResolveError {
    /// Caller mistakes as opposed to server-side trouble.
    pub fn is_client_error(&self) -> bool {
        matches!(self, Self::MetadataRequired | Self::NotFound(_))
    }
}

/// Exchanges a stored document id for a short-lived download URL.
#[async_trait]
pub trait SignedUrlProvider: Send + Sync {
    async fn signed_url(&self, metadata: &DocumentMetadata, document_id: &str) -> anyhow::Result<String>;
}

#[derive(Debug, Serialize)]
struct SignedUrlRequest<'a> {
    user_id: Option<&'a str>,
    username: Option<&'a str>,
    is_system_generated_doc: bool,
    document_id: Vec<DocumentIdRef<'a>>,
}

#[derive(Debug, Serialize)]
struct DocumentIdRef<'a> {
    id: &'a str,
}

#[derive(Debug, Deserialize)]
struct SignedUrlResponse {
    document_url: String,
}

pub struct HttpSignedUrlProvider {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpSignedUrlProvider {
    pub fn new(base_url: &str) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: format!("{}/signed-url", base_url.trim_end_matches('/')),
        }
    }
}

#[async_trait]
impl SignedUrlProvider for HttpSignedUrlProvider {
    async fn signed_url(&self, metadata: &DocumentMetadata, document_id: &str) -> anyhow::Result<String> {
        let body = SignedUrlRequest {
            user_id: metadata.user_id.as_deref(),
            username: metadata.username.as_deref(),
            is_system_generated_doc: true,
            document_id: vec![DocumentIdRef { id: document_id }],
        };
        let resp: SignedUrlResponse = self
            .client
            .post(&self.endpoint)
            .json(&body)
            .send()
            .await
            .with_context(|| format!("requesting signed url from {}", self.endpoint))?
            .error_for_status()
            .context("document service rejected signed url request")?
            .json()
            .await
            .context("parsing signed url response")?;
        Ok(resp.document_url)
    }
}

/// Stored document ids are 24 hex characters; anything else is a local path.
pub fn is_document_id(reference: &str) -> bool {
    reference.len() == 24 && reference.chars().all(|c| c.is_ascii_hexdigit())
}

pub struct LogoResolver {
    store: ArtifactStore,
    fetcher: Arc<HttpFetcher>,
    signed_urls: Option<Arc<dyn SignedUrlProvider>>,
}

impl LogoResolver {
    pub fn new(
        store: ArtifactStore,
        fetcher: Arc<HttpFetcher>,
        signed_urls: Option<Arc<dyn SignedUrlProvider>>,
    ) -> Self {
        Self {
            store,
            fetcher,
            signed_urls,
        }
    }

    pub async fn resolve(
        &self,
        reference: &str,
        metadata: Option<&DocumentMetadata>,
    ) -> Result<PathBuf, LogoResolveError> {
        let path = if is_document_id(reference) {
            let metadata = metadata.ok_or(LogoResolveError::MetadataRequired)?;
            self.download_document(reference, metadata).await?
        } else {
            PathBuf::from(reference)
        };

        let display = path.display().to_string();
        if display.starts_with("http") || !tokio::fs::try_exists(&path).await.unwrap_or(false) {
            return Err(LogoResolveError::NotFound(display));
        }
        Ok(path)
    }

    async fn download_document(
        &self,
        document_id: &str,
        metadata: &DocumentMetadata,
    ) -> Result<PathBuf, LogoResolveError> {
        let provider = self
            .signed_urls
            .as_ref()
            .ok_or(LogoResolveError::DocumentServiceUnavailable)?;
        let url = provider
            .signed_url(metadata, document_id)
            .await
            .map_err(LogoResolveError::Download)?;
        let fetched = self
            .fetcher
            .fetch_bytes(&url)
            .await
            .map_err(|e| LogoResolveError::Download(e.into()))?;
        let extension = extension_for(&fetched.body, fetched.content_type.as_deref());
        let stored = self
            .store
            .store_bytes(LOGO_NAMESPACE, extension, &fetched.body)
            .await
            .map_err(LogoResolveError::Download)?;
        info!(
            document_id,
            path = %stored.path.display(),
            deduplicated = stored.deduplicated,
            "reference logo downloaded"
        );
        Ok(stored.path)
    }
}

/// Magic bytes win over the declared content type; unknown content is stored as `.bin`.
fn extension_for(body: &[u8], content_type: Option<&str>) -> &'static str {
    if let Ok(format) = image::guess_format(body) {
        if let Some(ext) = format.extensions_str().first() {
            return *ext;
        }
    }
    match content_type.map(|c| c.split(';').next().unwrap_or(c).trim()) {
        Some("image/jpeg") | Some("image/jpg") => "jpg",
        Some("image/gif") => "gif",
        Some("image/webp") => "webp",
        Some("image/png") => "png",
        _ => "bin",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::HttpClientConfig;
    use tempfile::tempdir;

    struct UnreachableProvider;

    #[async_trait]
    impl SignedUrlProvider for UnreachableProvider {
        async fn signed_url(&self, _metadata: &DocumentMetadata, _document_id: &str) -> anyhow::Result<String> {
            anyhow::bail!("document service down")
        }
    }

    fn resolver(root: &std::path::Path, provider: Option<Arc<dyn SignedUrlProvider>>) -> LogoResolver {
        LogoResolver::new(
            ArtifactStore::new(root),
            Arc::new(HttpFetcher::new(HttpClientConfig::default()).unwrap()),
            provider,
        )
    }

    #[test]
    fn document_ids_are_24_hex_chars() {
        assert!(is_document_id("64b7f0c2a1d3e4f5a6b7c8d9"));
        assert!(!is_document_id("64b7f0c2a1d3e4f5a6b7c8d"));
        assert!(!is_document_id("logos/acme-logo-final.png"));
        assert!(!is_document_id("zzb7f0c2a1d3e4f5a6b7c8d9"));
    }

    #[test]
    fn stored_extension_follows_the_bytes() {
        let png_magic = b"\x89PNG\r\n\x1a\n\0\0\0\rIHDR";
        assert_eq!(extension_for(png_magic, Some("application/octet-stream")), "png");
        assert_eq!(extension_for(png_magic, Some("image/jpeg")), "png");
        assert_eq!(extension_for(b"????", Some("image/gif; charset=binary")), "gif");
        assert_eq!(extension_for(b"????", Some("application/octet-stream")), "bin");
    }

    #[tokio::test]
    async fn local_paths_resolve_when_present() {
        let dir = tempdir().unwrap();
        let logo = dir.path().join("acme.png");
        std::fs::write(&logo, b"png").unwrap();
        let resolved = resolver(dir.path(), None)
            .resolve(logo.to_str().unwrap(), None)
            .await
            .unwrap();
        assert_eq!(resolved, logo);
    }

    #[tokio::test]
    async fn missing_and_remote_paths_are_not_found() {
        let dir = tempdir().unwrap();
        let resolver = resolver(dir.path(), None);
        let missing = resolver.resolve("/nope/acme.png", None).await.unwrap_err();
        assert!(matches!(missing, LogoResolveError::NotFound(_)));
        let remote = resolver.resolve("https://cdn.example/acme.png", None).await.unwrap_err();
        assert!(remote.is_client_error());
    }

    #[tokio::test]
    async fn document_ids_need_metadata() {
        let dir = tempdir().unwrap();
        let err = resolver(dir.path(), Some(Arc::new(UnreachableProvider)))
            .resolve("64b7f0c2a1d3e4f5a6b7c8d9", None)
            .await
            .unwrap_err();
        assert!(matches!(err, LogoResolveError::MetadataRequired));
        assert_eq!(err.to_string(), "Metadata required to resolve logo file.");
    }

    #[tokio::test]
    async fn document_service_failures_are_server_side() {
        let dir = tempdir().unwrap();
        let metadata = DocumentMetadata {
            user_id: Some("u1".into()),
            username: Some("dana".into()),
        };
        let err = resolver(dir.path(), Some(Arc::new(UnreachableProvider)))
            .resolve("64b7f0c2a1d3e4f5a6b7c8d9", Some(&metadata))
            .await
            .unwrap_err();
        assert!(matches!(err, LogoResolveError::Download(_)));
        assert!(!err.is_client_error());

        let err = resolver(dir.path(), None)
            .resolve("64b7f0c2a1d3e4f5a6b7c8d9", Some(&metadata))
            .await
            .unwrap_err();
        assert!(matches!(err, LogoResolveError::DocumentServiceUnavailable));
    }
}

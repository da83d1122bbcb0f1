//! Storage and transport plumbing: content-addressed artifacts, rate-limited byte fetches,
//! reference-logo resolution and image similarity.

pub mod artifacts;
pub mod compare;
pub mod fetch;
pub mod logo;

pub use artifacts::{ArtifactStore, StoredArtifact};
pub use compare::{compare_files, decode_image, load_image, similarity, CompareError};
pub use fetch::{
    is_retryable_status, BackoffPolicy, FetchError, FetchedResponse, HttpClientConfig, HttpFetcher,
    DEFAULT_MAX_BODY_BYTES,
};
pub use logo::{
    is_document_id, DocumentMetadata, HttpSignedUrlProvider, LogoResolveError, LogoResolver,
    SignedUrlProvider,
};

pub const CRATE_NAME: &str = "comfacts-storage";

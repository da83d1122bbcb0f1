//! Axum HTTP surface for company resolution.

use std::sync::Arc;

use anyhow::Context;
use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use comfacts_core::{CompanyQuery, Resolution};
use comfacts_resolve::{is_web_url, CompanyResolver, ConfigError, ResolveConfig};
use comfacts_storage::{
    ArtifactStore, DocumentMetadata, HttpFetcher, HttpSignedUrlProvider, LogoResolver, SignedUrlProvider,
};
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;
use tracing::{info, warn};

pub const CRATE_NAME: &str = "comfacts-web";

const NOT_FOUND_DETAIL: &str = "No information found for the company.";

#[derive(Clone)]
pub struct AppState {
    /// `None` when the search credential is missing; requests then fail with a configuration error.
    pub resolver: Option<Arc<CompanyResolver>>,
    pub logos: Arc<LogoResolver>,
}

impl AppState {
    pub fn new(resolver: Option<Arc<CompanyResolver>>, logos: Arc<LogoResolver>) -> Self {
        Self { resolver, logos }
    }

    pub fn from_config(config: &ResolveConfig) -> anyhow::Result<Self> {
        let fetcher = Arc::new(HttpFetcher::new(config.http_client_config())?);
        let resolver = match CompanyResolver::from_config(config, fetcher.clone()) {
            Ok(resolver) => Some(Arc::new(resolver)),
            Err(ConfigError::MissingSearchCredential) => {
                warn!("TAVILY_API_KEY not set; resolution requests will be rejected");
                None
            }
            Err(err) => return Err(err).context("building company resolver"),
        };
        let signed_urls = config
            .document_service_url
            .as_deref()
            .map(|url| Arc::new(HttpSignedUrlProvider::new(url)) as Arc<dyn SignedUrlProvider>);
        let logos = LogoResolver::new(ArtifactStore::new(config.artifacts_dir.clone()), fetcher, signed_urls);
        Ok(Self::new(resolver, Arc::new(logos)))
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ScrapCompanyDetailsRequest {
    pub domain_name: String,
    #[serde(default)]
    pub urls: Option<Vec<String>>,
    #[serde(default)]
    pub logo: Option<String>,
    #[serde(default)]
    pub metadata: Option<DocumentMetadata>,
}

#[derive(Debug, Serialize)]
struct Detail {
    detail: String,
}

fn detail(status: StatusCode, message: impl Into<String>) -> Response {
    (
        status,
        Json(Detail {
            detail: message.into(),
        }),
    )
        .into_response()
}

pub fn app(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(healthz_handler))
        .route("/scrap_company_details", post(scrap_company_details_handler))
        .with_state(Arc::new(state))
}

pub async fn serve_from_env() -> anyhow::Result<()> {
    let port: u16 = std::env::var("COMFACTS_WEB_PORT")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(8000);
    let state = AppState::from_config(&ResolveConfig::from_env())?;
    let listener = TcpListener::bind(("0.0.0.0", port))
        .await
        .with_context(|| format!("binding port {port}"))?;
    info!(port, "comfacts web listening");
    axum::serve(listener, app(state)).await?;
    Ok(())
}

async fn healthz_handler() -> &'static str {
    "ok"
}

async fn scrap_company_details_handler(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<ScrapCompanyDetailsRequest>, JsonRejection>,
) -> Response {
    let Json(request) = match payload {
        Ok(payload) => payload,
        Err(rejection) => return detail(StatusCode::BAD_REQUEST, rejection.body_text()),
    };

    let Some(resolver) = state.resolver.as_ref() else {
        return detail(
            StatusCode::INTERNAL_SERVER_ERROR,
            ConfigError::MissingSearchCredential.to_string(),
        );
    };

    let query = match build_query(&state, request).await {
        Ok(query) => query,
        Err(response) => return response,
    };

    match resolver.resolve(&query).await {
        Resolution::Found { record, .. } => Json(record).into_response(),
        Resolution::NotFound { .. } => detail(StatusCode::NOT_FOUND, NOT_FOUND_DETAIL),
    }
}

async fn build_query(state: &AppState, request: ScrapCompanyDetailsRequest) -> Result<CompanyQuery, Response> {
    let name = request.domain_name.trim();
    if name.is_empty() {
        return Err(detail(StatusCode::BAD_REQUEST, "domain_name must not be empty"));
    }

    let urls = request.urls.unwrap_or_default();
    if let Some(bad) = urls.iter().find(|url| !is_web_url(url)) {
        return Err(detail(StatusCode::BAD_REQUEST, format!("Invalid URL: {bad}")));
    }
    let mut query = CompanyQuery::by_name(name).with_urls(urls);

    if let Some(reference) = request.logo.as_deref().filter(|logo| !logo.is_empty()) {
        match state.logos.resolve(reference, request.metadata.as_ref()).await {
            Ok(path) => query = query.with_reference_logo(path),
            Err(err) if err.is_client_error() => {
                return Err(detail(StatusCode::BAD_REQUEST, err.to_string()));
            }
            Err(err) => {
                warn!(reference, "reference logo unavailable: {err}");
                return Err(detail(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Unable to resolve logo file.",
                ));
            }
        }
    }
    Ok(query)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use comfacts_adapters::testing::{
        FixedScoreComparator, MapLogoLocator, MemoryImageFetcher, ScriptedInference, ScriptedSearch,
        StaticExtraction,
    };
    use comfacts_resolve::{Capabilities, ResolverSettings};
    use comfacts_storage::HttpClientConfig;
    use http_body_util::BodyExt;
    use serde_json::{json, Value};
    use tower::ServiceExt;

    fn logos(root: &std::path::Path) -> Arc<LogoResolver> {
        let fetcher = Arc::new(HttpFetcher::new(HttpClientConfig::default()).unwrap());
        Arc::new(LogoResolver::new(ArtifactStore::new(root), fetcher, None))
    }

    fn resolver(search: ScriptedSearch, extraction: StaticExtraction) -> Arc<CompanyResolver> {
        Arc::new(CompanyResolver::new(
            Capabilities {
                search: Arc::new(search),
                extraction: Arc::new(extraction),
                inference: Some(Arc::new(ScriptedInference::always(
                    r#"{"company_name": "Acme Corp", "target_market": "Builders"}"#,
                ))),
                locator: Arc::new(MapLogoLocator::new()),
                images: Arc::new(MemoryImageFetcher::new()),
                comparator: Arc::new(FixedScoreComparator::new()),
            },
            ResolverSettings::default(),
        ))
    }

    async fn post_json(app: Router, body: Value) -> (StatusCode, Value) {
        let resp = app
            .oneshot(
                axum::http::Request::builder()
                    .method("POST")
                    .uri("/scrap_company_details")
                    .header("content-type", "application/json")
                    .body(Body::from(body.to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();
        let status = resp.status();
        let bytes = resp.into_body().collect().await.unwrap().to_bytes();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn healthz_answers_ok() {
        let dir = tempfile::tempdir().unwrap();
        let app = app(AppState::new(None, logos(dir.path())));
        let resp = app
            .oneshot(axum::http::Request::builder().uri("/healthz").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let body = resp.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(&body[..], b"ok");
    }

    #[tokio::test]
    async fn direct_urls_return_the_fused_record() {
        let dir = tempfile::tempdir().unwrap();
        let state = AppState::new(
            Some(resolver(
                ScriptedSearch::new(),
                StaticExtraction::new().page("https://acme.example/about", "Acme Corp builds anvils."),
            )),
            logos(dir.path()),
        );

        let (status, body) = post_json(
            app(state),
            json!({"domain_name": "Acme", "urls": ["https://acme.example/about"]}),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(
            body,
            json!({
                "company_name": "Acme Corp",
                "target_market": "Builders",
                "urls": ["https://acme.example/about"]
            })
        );
    }

    #[tokio::test]
    async fn nothing_found_is_a_404() {
        let dir = tempfile::tempdir().unwrap();
        let state = AppState::new(
            Some(resolver(ScriptedSearch::new(), StaticExtraction::new())),
            logos(dir.path()),
        );
        let (status, body) = post_json(app(state), json!({"domain_name": "Nobody"})).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body, json!({"detail": "No information found for the company."}));
    }

    #[tokio::test]
    async fn missing_search_credential_is_a_500() {
        let dir = tempfile::tempdir().unwrap();
        let (status, body) = post_json(
            app(AppState::new(None, logos(dir.path()))),
            json!({"domain_name": "Acme"}),
        )
        .await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body, json!({"detail": "Missing search provider API key in configuration"}));
    }

    #[tokio::test]
    async fn logo_problems_are_client_errors() {
        let dir = tempfile::tempdir().unwrap();
        let state = AppState::new(
            Some(resolver(ScriptedSearch::new(), StaticExtraction::new())),
            logos(dir.path()),
        );

        let (status, body) = post_json(
            app(state.clone()),
            json!({"domain_name": "Acme", "logo": "64b7f0c2a1d3e4f5a6b7c8d9"}),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body, json!({"detail": "Metadata required to resolve logo file."}));

        let (status, body) = post_json(
            app(state),
            json!({"domain_name": "Acme", "logo": "/definitely/missing/logo.png"}),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body, json!({"detail": "Logo file not found at /definitely/missing/logo.png"}));
    }

    #[tokio::test]
    async fn invalid_payloads_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let state = AppState::new(
            Some(resolver(ScriptedSearch::new(), StaticExtraction::new())),
            logos(dir.path()),
        );

        let (status, _) = post_json(app(state.clone()), json!({"urls": []})).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, body) = post_json(
            app(state),
            json!({"domain_name": "Acme", "urls": ["acme.example/about"]}),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body, json!({"detail": "Invalid URL: acme.example/about"}));
    }
}

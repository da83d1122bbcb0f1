use comfacts_adapters::{AdapterError, SearchHit, SearchProvider, SearchRequest};
use comfacts_core::CandidateUrl;
use tracing::debug;
use url::Url;

/// One allowlisted search for `company_name`, in provider rank order.
pub async fn search_candidates(
    search: &dyn SearchProvider,
    company_name: &str,
    allowlist: &[String],
) -> Result<Vec<CandidateUrl>, AdapterError> {
    let request = SearchRequest {
        query: company_name.to_string(),
        include_domains: allowlist.to_vec(),
        max_results: None,
        include_answer: false,
    };
    let results = search.search(&request).await?;
    let candidates: Vec<CandidateUrl> = results.results.iter().filter_map(candidate_from_hit).collect();
    debug!(
        hits = results.results.len(),
        candidates = candidates.len(),
        "candidate discovery"
    );
    Ok(candidates)
}

/// Absolute `http`/`https` URL with a host.
pub fn parse_web_url(raw: &str) -> Option<Url> {
    let parsed = Url::parse(raw.trim()).ok()?;
    let usable = matches!(parsed.scheme(), "http" | "https") && parsed.host_str().is_some();
    usable.then_some(parsed)
}

pub fn is_web_url(raw: &str) -> bool {
    parse_web_url(raw).is_some()
}

fn candidate_from_hit(hit: &SearchHit) -> Option<CandidateUrl> {
    let raw = hit.url.as_deref()?.trim();
    let parsed = parse_web_url(raw)?;
    let host = parsed.host_str()?;
    Some(CandidateUrl {
        url: raw.to_string(),
        source_domain: host.to_string(),
    })
}

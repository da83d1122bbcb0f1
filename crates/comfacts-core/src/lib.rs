//! Core domain model and fusion rules for comfacts.

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value as JsonValue;
use thiserror::Error;

pub const CRATE_NAME: &str = "comfacts-core";

/// Immutable input to one resolve run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompanyQuery {
    pub name: String,
    #[serde(default)]
    pub urls: Vec<String>,
    #[serde(default)]
    pub reference_logo: Option<PathBuf>,
}

impl CompanyQuery {
    pub fn by_name(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            urls: Vec::new(),
            reference_logo: None,
        }
    }

    pub fn with_urls(mut self, urls: Vec<String>) -> Self {
        self.urls = urls;
        self
    }

    pub fn with_reference_logo(mut self, path: impl Into<PathBuf>) -> Self {
        self.reference_logo = Some(path.into());
        self
    }
}

/// A search hit that may or may not describe the company being resolved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandidateUrl {
    pub url: String,
    pub source_domain: String,
}

/// Visual similarity between the reference logo and the logo found on `url`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogoMatch {
    pub url: String,
    pub score: f64,
}

/// Orders matches best-first. The sort is stable, so equal scores keep discovery order.
pub fn rank_logo_matches(mut matches: Vec<LogoMatch>) -> Vec<LogoMatch> {
    matches.sort_by(|a, b| b.score.total_cmp(&a.score));
    matches
}

/// Fields pulled out of one source by the inference provider.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractedFields {
    #[serde(default, deserialize_with = "lenient_text", skip_serializing_if = "Option::is_none")]
    pub company_name: Option<String>,
    #[serde(default, deserialize_with = "lenient_text", skip_serializing_if = "Option::is_none")]
    pub address_contact_information: Option<String>,
    #[serde(default, deserialize_with = "lenient_text", skip_serializing_if = "Option::is_none")]
    pub company_size: Option<String>,
    #[serde(default, deserialize_with = "lenient_text", skip_serializing_if = "Option::is_none")]
    pub type_of_industry: Option<String>,
    #[serde(default, deserialize_with = "lenient_text", skip_serializing_if = "Option::is_none")]
    pub products_or_services: Option<String>,
    #[serde(default, deserialize_with = "lenient_text", skip_serializing_if = "Option::is_none")]
    pub target_market: Option<String>,
    /// Source pages the fields were read from. Never taken from the model reply.
    #[serde(default, skip_deserializing, skip_serializing_if = "Vec::is_empty")]
    pub urls: Vec<String>,
}

impl ExtractedFields {
    pub const FIELD_NAMES: [&'static str; 6] = [
        "company_name",
        "address_contact_information",
        "company_size",
        "type_of_industry",
        "products_or_services",
        "target_market",
    ];

    pub fn attributed_to(mut self, url: impl Into<String>) -> Self {
        self.urls.push(url.into());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.values().iter().all(|v| v.is_none())
    }

    fn values(&self) -> [&Option<String>; 6] {
        [
            &self.company_name,
            &self.address_contact_information,
            &self.company_size,
            &self.type_of_industry,
            &self.products_or_services,
            &self.target_market,
        ]
    }
}

fn lenient_text<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<JsonValue>::deserialize(deserializer)?;
    Ok(value.as_ref().and_then(json_to_text))
}

/// Renders a loosely typed model value as field text; null, blank and `false` are absent.
pub fn json_to_text(value: &JsonValue) -> Option<String> {
    match value {
        JsonValue::Null | JsonValue::Bool(false) => None,
        JsonValue::Bool(true) => Some("true".to_string()),
        JsonValue::Number(n) => Some(n.to_string()),
        JsonValue::String(s) => text_or_none(s),
        JsonValue::Array(items) => {
            let parts: Vec<String> = items.iter().filter_map(json_to_text).collect();
            if parts.is_empty() {
                None
            } else {
                Some(parts.join(", "))
            }
        }
        JsonValue::Object(map) if map.is_empty() => None,
        JsonValue::Object(_) => Some(value.to_string()),
    }
}

fn text_or_none(value: &str) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

/// Why a single source contributed no fields.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExtractionFailure {
    #[error("missing inference provider credentials")]
    MissingCredentials,
    #[error("no content extracted")]
    NoContent,
    #[error("provider call failed: {0}")]
    Provider(String),
    #[error("reply was not a JSON object: {0}")]
    MalformedReply(String),
    #[error("task aborted: {0}")]
    TaskAborted(String),
}

/// Settled result of one source: a value or a captured failure, never both.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceOutcome {
    Extracted(ExtractedFields),
    Failed(String),
}

impl SourceOutcome {
    pub fn failed(reason: impl fmt::Display) -> Self {
        Self::Failed(reason.to_string())
    }
}

impl From<Result<ExtractedFields, ExtractionFailure>> for SourceOutcome {
    fn from(result: Result<ExtractedFields, ExtractionFailure>) -> Self {
        match result {
            Ok(fields) => Self::Extracted(fields),
            Err(err) => Self::failed(err),
        }
    }
}

/// One slot in the fold: the outcome plus the page it came from, if any.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceContribution {
    pub url: Option<String>,
    pub outcome: SourceOutcome,
}

impl SourceContribution {
    pub fn from_url(url: impl Into<String>, outcome: SourceOutcome) -> Self {
        Self {
            url: Some(url.into()),
            outcome,
        }
    }

    pub fn unattributed(outcome: SourceOutcome) -> Self {
        Self { url: None, outcome }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceError {
    pub url: Option<String>,
    pub message: String,
}

/// Fused view of everything learned about one company during a run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompanyRecord {
    #[serde(skip)]
    pub key: String,
    #[serde(flatten)]
    pub fields: ExtractedFields,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<SourceError>,
}

impl CompanyRecord {
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            ..Default::default()
        }
    }

    /// Folds contributions in iteration order.
    pub fn fuse(key: impl Into<String>, contributions: impl IntoIterator<Item = SourceContribution>) -> Self {
        let mut record = Self::new(key);
        for contribution in contributions {
            record.absorb(contribution);
        }
        record
    }

    pub fn absorb(&mut self, contribution: SourceContribution) {
        match contribution.outcome {
            SourceOutcome::Extracted(fields) => self.merge(&fields),
            SourceOutcome::Failed(message) => self.errors.push(SourceError {
                url: contribution.url,
                message,
            }),
        }
    }

    /// First non-empty value wins per field; urls always accumulate.
    pub fn merge(&mut self, incoming: &ExtractedFields) {
        let target = &mut self.fields;
        fill(&mut target.company_name, &incoming.company_name);
        fill(
            &mut target.address_contact_information,
            &incoming.address_contact_information,
        );
        fill(&mut target.company_size, &incoming.company_size);
        fill(&mut target.type_of_industry, &incoming.type_of_industry);
        fill(&mut target.products_or_services, &incoming.products_or_services);
        fill(&mut target.target_market, &incoming.target_market);
        target.urls.extend(incoming.urls.iter().cloned());
    }

    pub fn urls(&self) -> &[String] {
        &self.fields.urls
    }

    /// True once any field, source url or error entry has been recorded.
    pub fn has_information(&self) -> bool {
        !self.fields.is_empty() || !self.fields.urls.is_empty() || !self.errors.is_empty()
    }
}

fn fill(slot: &mut Option<String>, candidate: &Option<String>) {
    let populated = slot.as_deref().is_some_and(|v| !v.is_empty());
    if populated {
        return;
    }
    if let Some(value) = candidate.as_deref().filter(|v| !v.is_empty()) {
        *slot = Some(value.to_string());
    }
}

/// Which branch of the resolver produced the answer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum ResolutionPath {
    DirectUrls { urls: Vec<String> },
    LogoMatched { url: String, score: f64 },
    NameSearchFallback,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Resolution {
    Found {
        record: CompanyRecord,
        path: ResolutionPath,
    },
    NotFound {
        path: ResolutionPath,
    },
}

impl Resolution {
    pub fn path(&self) -> &ResolutionPath {
        match self {
            Resolution::Found { path, .. } | Resolution::NotFound { path } => path,
        }
    }

    pub fn record(&self) -> Option<&CompanyRecord> {
        match self {
            Resolution::Found { record, .. } => Some(record),
            Resolution::NotFound { .. } => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sized(size: &str, url: &str) -> SourceContribution {
        SourceContribution::from_url(
            url,
            SourceOutcome::Extracted(
                ExtractedFields {
                    company_size: Some(size.to_string()),
                    ..Default::default()
                }
                .attributed_to(url),
            ),
        )
    }

    #[test]
    fn first_source_wins_in_fold_order() {
        let s1 = sized("50-100", "https://a.example");
        let s2 = sized("200+", "https://b.example");

        let forward = CompanyRecord::fuse("Acme", vec![s1.clone(), s2.clone()]);
        let reverse = CompanyRecord::fuse("Acme", vec![s2, s1]);

        assert_eq!(forward.fields.company_size.as_deref(), Some("50-100"));
        assert_eq!(reverse.fields.company_size.as_deref(), Some("200+"));
    }

    #[test]
    fn merging_the_same_fields_twice_is_a_noop() {
        let fields = ExtractedFields {
            company_name: Some("Acme".into()),
            type_of_industry: Some("Anvils".into()),
            ..Default::default()
        };
        let mut once = CompanyRecord::new("Acme");
        once.merge(&fields);
        let mut twice = once.clone();
        twice.merge(&fields);
        assert_eq!(once, twice);
    }

    #[test]
    fn urls_accumulate_in_fold_order() {
        let urls = ["https://a.example", "https://b.example", "https://c.example"];
        let record = CompanyRecord::fuse("Acme", urls.iter().map(|u| sized("10", u)));
        assert_eq!(record.urls(), &urls.map(String::from));
    }

    #[test]
    fn empty_values_do_not_block_later_sources() {
        let mut record = CompanyRecord::new("Acme");
        record.merge(&ExtractedFields {
            target_market: Some(String::new()),
            ..Default::default()
        });
        record.merge(&ExtractedFields {
            target_market: Some("SMBs".into()),
            ..Default::default()
        });
        assert_eq!(record.fields.target_market.as_deref(), Some("SMBs"));
    }

    #[test]
    fn failures_become_error_entries() {
        let record = CompanyRecord::fuse(
            "Acme",
            vec![
                sized("10", "https://a.example"),
                SourceContribution::from_url("https://b.example", SourceOutcome::failed(ExtractionFailure::NoContent)),
            ],
        );
        assert_eq!(
            record.errors,
            vec![SourceError {
                url: Some("https://b.example".into()),
                message: "no content extracted".into(),
            }]
        );
        assert_eq!(record.urls().len(), 1);
    }

    #[test]
    fn lenient_decoding_of_model_replies() {
        let fields: ExtractedFields = serde_json::from_value(json!({
            "company_name": "  Acme  ",
            "company_size": 250,
            "products_or_services": ["Anvils", "Rockets", null],
            "target_market": "",
            "address_contact_information": null,
            "urls": ["https://ignored.example"],
            "founded": 1949
        }))
        .unwrap();
        assert_eq!(fields.company_name.as_deref(), Some("Acme"));
        assert_eq!(fields.company_size.as_deref(), Some("250"));
        assert_eq!(fields.products_or_services.as_deref(), Some("Anvils, Rockets"));
        assert_eq!(fields.target_market, None);
        assert!(fields.urls.is_empty());
    }

    #[test]
    fn record_serializes_flat_and_omits_absent_values() {
        let mut record = CompanyRecord::new("Acme");
        record.merge(
            &ExtractedFields {
                company_name: Some("Acme".into()),
                ..Default::default()
            }
            .attributed_to("https://acme.example/about"),
        );
        assert_eq!(
            serde_json::to_value(&record).unwrap(),
            json!({"company_name": "Acme", "urls": ["https://acme.example/about"]})
        );
    }

    #[test]
    fn ranking_is_descending_and_stable() {
        let ranked = rank_logo_matches(vec![
            LogoMatch { url: "a".into(), score: 40.0 },
            LogoMatch { url: "b".into(), score: 80.0 },
            LogoMatch { url: "c".into(), score: 80.0 },
        ]);
        let order: Vec<_> = ranked.iter().map(|m| m.url.as_str()).collect();
        assert_eq!(order, vec!["b", "c", "a"]);
    }
}

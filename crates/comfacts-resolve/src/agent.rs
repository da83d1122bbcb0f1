//! Structured extraction: raw page text in, six company fields out.

use std::sync::Arc;

use comfacts_adapters::InferenceProvider;
use comfacts_core::{ExtractedFields, ExtractionFailure};
use serde_json::Value as JsonValue;
use tracing::debug;
use url::Url;

/// Leading host labels that name a directory or social site rather than the company.
const DIRECTORY_TOKENS: [&str; 4] = ["linkedin", "zoominfo", "crunchbase", "youtube"];

#[derive(Clone)]
pub struct ExtractionAgent {
    inference: Option<Arc<dyn InferenceProvider>>,
}

impl ExtractionAgent {
    pub fn new(inference: Option<Arc<dyn InferenceProvider>>) -> Self {
        Self { inference }
    }

    /// Asks the model for the company fields found in `raw_text`.
    ///
    /// With a hint the model is told to ignore every other company and to answer with
    /// all-null fields when the hinted one is absent.
    pub async fn extract_fields(
        &self,
        raw_text: &str,
        hint: Option<&str>,
    ) -> Result<ExtractedFields, ExtractionFailure> {
        let inference = self
            .inference
            .as_ref()
            .ok_or(ExtractionFailure::MissingCredentials)?;

        let system = system_instruction(hint);
        let task = task_instruction(raw_text, hint);
        debug!(hint, text_len = raw_text.len(), "invoking structured extraction");

        let reply = inference
            .invoke(&system, &task)
            .await
            .map_err(|e| ExtractionFailure::Provider(e.to_string()))?;
        parse_reply(&reply)
    }
}

fn field_list() -> String {
    ExtractedFields::FIELD_NAMES
        .iter()
        .map(|name| format!("- {name}"))
        .collect::<Vec<_>>()
        .join("\n")
}

fn system_instruction(hint: Option<&str>) -> String {
    let mut text = format!(
        "You are an assistant that extracts structured information about a company.\n\
         Given raw text about a company, return a JSON object with the following fields:\n{}\n\n",
        field_list()
    );
    if let Some(hint) = hint {
        text.push_str(&format!(
            "IMPORTANT: Only extract information about the company that matches the following hint \
             (from the URL): '{hint}'.\n\
             If there is information about other companies, ignore it. If you cannot find information \
             about the company matching the hint, return a JSON object with every field set to null.\n"
        ));
    }
    text.push_str("Only return a valid JSON object as output.");
    text
}

fn task_instruction(raw_text: &str, hint: Option<&str>) -> String {
    match hint {
        Some(hint) => format!(
            "Extract and return a JSON object with company information ONLY for the company matching \
             this hint: '{hint}'.\nIgnore information about other companies. Use the following text:\n{raw_text}"
        ),
        None => format!(
            "Extract and return a JSON object with company information based on the following text:\n{raw_text}"
        ),
    }
}

/// Removes an optional ```json ... ``` wrapper.
pub fn strip_code_fence(reply: &str) -> &str {
    let mut text = reply.trim();
    if let Some(rest) = text.strip_prefix("```json") {
        text = rest.trim_start();
    } else if let Some(rest) = text.strip_prefix("```") {
        text = rest.trim_start();
    }
    if let Some(rest) = text.strip_suffix("```") {
        text = rest.trim_end();
    }
    text
}

pub fn parse_reply(reply: &str) -> Result<ExtractedFields, ExtractionFailure> {
    let value: JsonValue = serde_json::from_str(strip_code_fence(reply))
        .map_err(|e| ExtractionFailure::MalformedReply(e.to_string()))?;
    if !value.is_object() {
        return Err(ExtractionFailure::MalformedReply(format!(
            "expected an object, got {}",
            json_kind(&value)
        )));
    }
    serde_json::from_value(value).map_err(|e| ExtractionFailure::MalformedReply(e.to_string()))
}

fn json_kind(value: &JsonValue) -> &'static str {
    match value {
        JsonValue::Null => "null",
        JsonValue::Bool(_) => "a boolean",
        JsonValue::Number(_) => "a number",
        JsonValue::String(_) => "a string",
        JsonValue::Array(_) => "an array",
        JsonValue::Object(_) => "an object",
    }
}

/// Company token read from a source URL's host, or the whole URL when none can be found.
///
/// `www.` and a leading directory label are dropped and the first remaining label is kept.
/// A host that is only a directory site plus its TLD names no company.
pub fn disambiguation_hint(url: &str) -> String {
    Url::parse(url)
        .ok()
        .and_then(|parsed| parsed.host_str().and_then(host_token))
        .unwrap_or_else(|| url.to_string())
}

fn host_token(host: &str) -> Option<String> {
    let host = host.strip_prefix("www.").unwrap_or(host);
    let mut labels: Vec<&str> = host.split('.').collect();
    if labels.len() > 1
        && DIRECTORY_TOKENS
            .iter()
            .any(|token| labels[0].eq_ignore_ascii_case(token))
    {
        labels.remove(0);
    }
    if labels.len() < 2 || labels[0].is_empty() {
        return None;
    }
    Some(labels[0].to_string())
}

//! TRELLIS Parse - Model Reply Extraction
//!
//! Splits a raw model reply into conversational prose and a structured
//! payload (operations, guidance, a search request). Extraction is total:
//! whatever the model sends back, the caller gets a usable result. A reply
//! we cannot make sense of degrades to plain text with no operations, never
//! to an error.
//!
//! Recognized payload carriers, tried in order:
//! 1. A fenced code block (any language tag) whose body is a JSON object
//!    (`{"operations": [...], "guidance": ..., "tool": "search", ...}`)
//!    or, legacy shape, a bare JSON array of operations.
//! 2. The whole reply being a JSON object with `text` and `operations`.
//! 3. Plain prose.

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;
use tracing::{debug, warn};
use trellis_core::{GuidanceData, Operation, SearchRequest};

/// First fenced code block in a reply, language tag optional.
static CODE_BLOCK: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?s)```[a-zA-Z0-9]*\s*(.*?)\s*```").expect("code block regex is valid")
});

/// Everything extracted from one model reply.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ParsedResponse {
    /// Conversational prose to show the user.
    pub text_response: String,
    /// Tree operations, still name-qualified.
    pub operations: Vec<Operation>,
    /// Optional UI guidance.
    pub guidance: Option<GuidanceData>,
    /// Set when the model asked for a web search instead of answering.
    pub search_request: Option<SearchRequest>,
}

impl ParsedResponse {
    /// The whole reply as prose, nothing structured.
    fn plain(raw: &str) -> Self {
        Self {
            text_response: raw.to_string(),
            ..Self::default()
        }
    }
}

/// Extract prose and structured payload from a raw model reply.
pub fn extract(raw: &str) -> ParsedResponse {
    if let Some(captures) = CODE_BLOCK.captures(raw) {
        let block = captures.get(1).map(|m| m.as_str()).unwrap_or_default();
        match serde_json::from_str::<Value>(block) {
            Ok(payload) => {
                // get(0) always exists on a successful match.
                let span = captures.get(0).map(|m| m.range()).unwrap_or(0..0);
                if let Some(parsed) = from_block_payload(raw, span, payload) {
                    return parsed;
                }
            }
            Err(error) => {
                debug!(error = %error, "code block is not valid JSON, keeping reply as prose");
            }
        }
        return ParsedResponse::plain(raw);
    }

    if let Some(parsed) = from_bare_json(raw) {
        return parsed;
    }

    ParsedResponse::plain(raw)
}

/// Interpret the JSON found inside a fenced block. Returns `None` when the
/// JSON is some shape we do not recognize (e.g. a bare string), in which
/// case the caller falls back to plain prose.
fn from_block_payload(
    raw: &str,
    span: std::ops::Range<usize>,
    payload: Value,
) -> Option<ParsedResponse> {
    match payload {
        Value::Array(entries) => Some(ParsedResponse {
            text_response: strip_span(raw, span),
            operations: decode_operations(&entries),
            guidance: None,
            search_request: None,
        }),
        Value::Object(map) => {
            let operations = map
                .get("operations")
                .and_then(Value::as_array)
                .map(|entries| decode_operations(entries))
                .unwrap_or_default();
            let guidance = map.get("guidance").and_then(decode_guidance);
            let search_request = decode_search_request(&map);
            Some(ParsedResponse {
                text_response: strip_span(raw, span),
                operations,
                guidance,
                search_request,
            })
        }
        _ => None,
    }
}

/// Fallback for replies that are one big JSON object with `text` and
/// `operations` instead of prose plus a fenced block.
fn from_bare_json(raw: &str) -> Option<ParsedResponse> {
    let trimmed = raw.trim();
    if !(trimmed.starts_with('{') && trimmed.ends_with('}')) {
        return None;
    }
    let payload: Value = serde_json::from_str(trimmed).ok()?;
    let map = payload.as_object()?;
    let text = map.get("text").and_then(Value::as_str)?;
    let entries = map.get("operations").and_then(Value::as_array)?;
    Some(ParsedResponse {
        text_response: text.to_string(),
        operations: decode_operations(entries),
        guidance: None,
        search_request: None,
    })
}

/// Decode operations one by one so a single malformed entry costs only
/// itself, not the whole batch.
fn decode_operations(entries: &[Value]) -> Vec<Operation> {
    entries
        .iter()
        .filter_map(|entry| match serde_json::from_value(entry.clone()) {
            Ok(operation) => Some(operation),
            Err(error) => {
                warn!(error = %error, "skipping undecodable operation");
                None
            }
        })
        .collect()
}

fn decode_guidance(value: &Value) -> Option<GuidanceData> {
    match serde_json::from_value(value.clone()) {
        Ok(guidance) => Some(guidance),
        Err(error) => {
            warn!(error = %error, "skipping undecodable guidance");
            None
        }
    }
}

fn decode_search_request(map: &serde_json::Map<String, Value>) -> Option<SearchRequest> {
    if map.get("tool").and_then(Value::as_str) != Some("search") {
        return None;
    }
    let query = map.get("query").and_then(Value::as_str)?.trim();
    if query.is_empty() {
        return None;
    }
    Some(SearchRequest {
        query: query.to_string(),
    })
}

/// The reply with the code block cut out; what remains is the prose.
fn strip_span(raw: &str, span: std::ops::Range<usize>) -> String {
    let mut text = String::with_capacity(raw.len().saturating_sub(span.len()));
    text.push_str(&raw[..span.start]);
    text.push_str(&raw[span.end..]);
    text.trim().to_string()
}

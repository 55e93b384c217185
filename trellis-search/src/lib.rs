//! TRELLIS Search - Retrieval Collaborator
//!
//! When a model reply asks for outside context, the orchestrator runs one
//! retrieval hop through a `SearchProvider`. Retrieval is best-effort by
//! contract: any failure degrades to an empty result list with a warning,
//! never an error, so a broken search key cannot abort a conversation turn.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;
use trellis_core::{SearchResult, SearchSettings};

/// Results requested per query.
const MAX_RESULTS: usize = 3;
/// Ceiling for one retrieval round trip.
const SEARCH_TIMEOUT: Duration = Duration::from_secs(30);

// ============================================================================
// PROVIDER TRAIT
// ============================================================================

/// A web-search backend.
///
/// `search` is total: implementations swallow their own failures and return
/// an empty vector, logging the cause.
#[async_trait]
pub trait SearchProvider: Send + Sync {
    /// Stable provider id (`tavily`, `mock`).
    fn provider_id(&self) -> &str;

    /// Run one query and return up to a handful of results.
    async fn search(&self, query: &str) -> Vec<SearchResult>;
}

// ============================================================================
// FACTORY
// ============================================================================

/// Build the search provider the settings select.
///
/// Tavily without an API key, and any unrecognized provider id, fall back to
/// the mock with a warning. Retrieval is auxiliary, so misconfiguration
/// degrades rather than fails.
pub fn create_search_provider(settings: &SearchSettings) -> Arc<dyn SearchProvider> {
    match settings.provider.as_str() {
        "tavily" => match settings.api_key.as_deref() {
            Some(key) if !key.trim().is_empty() => {
                Arc::new(TavilySearchProvider::new(key.to_string()))
            }
            _ => {
                warn!("tavily selected but no API key configured, using mock search");
                Arc::new(MockSearchProvider)
            }
        },
        "mock" => Arc::new(MockSearchProvider),
        other => {
            warn!(provider = other, "unrecognized search provider id, using mock search");
            Arc::new(MockSearchProvider)
        }
    }
}

// ============================================================================
// TAVILY
// ============================================================================

const TAVILY_URL: &str = "https://api.tavily.com/search";

pub struct TavilySearchProvider {
    client: reqwest::Client,
    api_key: String,
}

impl TavilySearchProvider {
    pub fn new(api_key: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key,
        }
    }

    async fn run_query(&self, query: &str) -> Result<Vec<SearchResult>, String> {
        let request = TavilyRequest {
            api_key: &self.api_key,
            query,
            max_results: MAX_RESULTS,
        };

        let response = self
            .client
            .post(TAVILY_URL)
            .timeout(SEARCH_TIMEOUT)
            .json(&request)
            .send()
            .await
            .map_err(|error| format!("request failed: {}", error))?;

        let status = response.status();
        if !status.is_success() {
            return Err(format!("search returned status {}", status));
        }

        let decoded: TavilyResponse = response
            .json()
            .await
            .map_err(|error| format!("undecodable search response: {}", error))?;

        Ok(decoded
            .results
            .into_iter()
            .map(|result| SearchResult {
                title: result.title,
                content: result.content,
                url: result.url,
            })
            .collect())
    }
}

#[async_trait]
impl SearchProvider for TavilySearchProvider {
    fn provider_id(&self) -> &str {
        "tavily"
    }

    async fn search(&self, query: &str) -> Vec<SearchResult> {
        match self.run_query(query).await {
            Ok(results) => results,
            Err(reason) => {
                warn!(query, reason, "search failed, continuing without results");
                Vec::new()
            }
        }
    }
}

impl std::fmt::Debug for TavilySearchProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TavilySearchProvider")
            .field("api_key", &"[REDACTED]")
            .finish()
    }
}

#[derive(Debug, Serialize)]
struct TavilyRequest<'a> {
    api_key: &'a str,
    query: &'a str,
    max_results: usize,
}

#[derive(Debug, Deserialize)]
struct TavilyResponse {
    #[serde(default)]
    results: Vec<TavilyResult>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct TavilyResult {
    title: String,
    content: String,
    url: String,
}

// ============================================================================
// MOCK
// ============================================================================

/// Offline stand-in: two canned results echoing the query.
#[derive(Debug, Clone, Copy, Default)]
pub struct MockSearchProvider;

#[async_trait]
impl SearchProvider for MockSearchProvider {
    fn provider_id(&self) -> &str {
        "mock"
    }

    async fn search(&self, query: &str) -> Vec<SearchResult> {
        vec![
            SearchResult {
                title: format!("Mock result 1 for: {}", query),
                content: format!("Canned first result about {}.", query),
                url: "https://example.com/mock/1".to_string(),
            },
            SearchResult {
                title: format!("Mock result 2 for: {}", query),
                content: format!("Canned second result about {}.", query),
                url: "https://example.com/mock/2".to_string(),
            },
        ]
    }
}

// ============================================================================
// TESTS
// ============================================================================

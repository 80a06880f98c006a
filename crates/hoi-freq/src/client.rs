use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use thiserror::Error;
use tracing::debug;

use crate::rate_limit::RateLimiter;

pub const DEFAULT_BASE_URL: &str = "https://api.ngrams.dev";
pub const DEFAULT_CORPUS: &str = "eng";
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);
const SEARCH_FLAGS: &str = "cr";
const BODY_EXCERPT_LEN: usize = 200;

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("failed to build HTTP client: {0}")]
    Client(#[source] reqwest::Error),
    #[error("lookup {query:?} timed out after {timeout:?}")]
    Timeout { query: String, timeout: Duration },
    #[error("lookup {query:?} failed: {source}")]
    Transport {
        query: String,
        source: reqwest::Error,
    },
    #[error("lookup {query:?} returned {status}: {body}")]
    Status {
        query: String,
        status: StatusCode,
        body: String,
    },
    #[error("lookup {query:?} returned an unexpected response: {reason}")]
    MalformedResponse { query: String, reason: String },
}

/// Source of n-gram match counts for a corpus query.
#[async_trait]
pub trait NgramLookup: Send + Sync {
    /// Total absolute match count over every n-gram the query matches.
    async fn lookup(&self, query: &str) -> Result<u64, ServiceError>;
}

#[derive(Deserialize)]
struct SearchResponse {
    ngrams: Vec<NgramMatch>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct NgramMatch {
    abs_total_match_count: u64,
}

/// Sum `absTotalMatchCount` over the `ngrams` list of a search response body.
pub fn total_match_count(body: &[u8]) -> Result<u64, serde_json::Error> {
    let response: SearchResponse = serde_json::from_slice(body)?;
    Ok(response
        .ngrams
        .iter()
        .fold(0u64, |acc, m| acc.saturating_add(m.abs_total_match_count)))
}

#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub base_url: String,
    pub corpus: String,
    pub timeout: Duration,
    /// `(requests per second, burst)`; `None` disables throttling.
    pub rate_limit: Option<(u32, u32)>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            corpus: DEFAULT_CORPUS.to_string(),
            timeout: DEFAULT_TIMEOUT,
            rate_limit: None,
        }
    }
}

/// HTTP client for the n-gram search service.
pub struct NgramClient {
    http: Client,
    base_url: String,
    corpus: String,
    timeout: Duration,
    limiter: Option<RateLimiter>,
}

impl NgramClient {
    pub fn new(config: ClientConfig) -> Result<Self, ServiceError> {
        let http = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(ServiceError::Client)?;
        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            corpus: config.corpus,
            timeout: config.timeout,
            limiter: config
                .rate_limit
                .map(|(rps, burst)| RateLimiter::new(rps, burst)),
        })
    }

    /// Search URL for `query`. The query is inserted verbatim: `+`, `~` and
    /// `*` are service syntax and must not be percent-encoded.
    pub fn search_url(&self, query: &str) -> String {
        format!(
            "{}/{}/search?query={}&flags={}",
            self.base_url, self.corpus, query, SEARCH_FLAGS
        )
    }

    fn transport_error(&self, query: &str, source: reqwest::Error) -> ServiceError {
        if source.is_timeout() {
            ServiceError::Timeout {
                query: query.to_string(),
                timeout: self.timeout,
            }
        } else {
            ServiceError::Transport {
                query: query.to_string(),
                source,
            }
        }
    }
}

#[async_trait]
impl NgramLookup for NgramClient {
    async fn lookup(&self, query: &str) -> Result<u64, ServiceError> {
        if let Some(limiter) = &self.limiter {
            limiter.acquire().await;
        }

        let url = self.search_url(query);
        debug!("GET {url}");
        let response = self
            .http
            .get(&url)
            .header("Accept", "application/json")
            .send()
            .await
            .map_err(|e| self.transport_error(query, e))?;

        let status = response.status();
        let body = response
            .bytes()
            .await
            .map_err(|e| self.transport_error(query, e))?;
        if !status.is_success() {
            return Err(ServiceError::Status {
                query: query.to_string(),
                status,
                body: String::from_utf8_lossy(&body)
                    .chars()
                    .take(BODY_EXCERPT_LEN)
                    .collect(),
            });
        }

        let total = total_match_count(&body).map_err(|e| ServiceError::MalformedResponse {
            query: query.to_string(),
            reason: e.to_string(),
        })?;
        debug!("{query} -> {total}");
        Ok(total)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sums_match_counts() {
        let body = br#"{"ngrams": [{"absTotalMatchCount": 7, "tokens": []}, {"absTotalMatchCount": 5}]}"#;
        assert_eq!(total_match_count(body).unwrap(), 12);
        assert_eq!(total_match_count(br#"{"ngrams": []}"#).unwrap(), 0);
    }

    #[test]
    fn missing_fields_are_errors_not_zero() {
        assert!(total_match_count(br#"{"results": []}"#).is_err());
        assert!(total_match_count(br#"{"ngrams": [{"relTotalMatchCount": 0.1}]}"#).is_err());
        assert!(total_match_count(b"<html>busy</html>").is_err());
    }

    #[test]
    fn search_url_keeps_query_syntax() {
        let client = NgramClient::new(ClientConfig {
            base_url: "http://localhost:9000/".into(),
            ..ClientConfig::default()
        })
        .unwrap();
        assert_eq!(
            client.search_url("look~+at+*+table~"),
            "http://localhost:9000/eng/search?query=look~+at+*+table~&flags=cr"
        );
    }
}


use std::time::Duration;

use async_trait::async_trait;
use backoff::{Error as BackoffError, ExponentialBackoff, future::retry};
use mockall::automock;
use reqwest::{
    Client, StatusCode,
    header::{HeaderMap, HeaderValue, USER_AGENT},
};
use serde::{Deserialize, de::DeserializeOwned};
use thiserror::Error;
use tracing::{debug, warn};
use url::Url;

/// Extracts longer than this are shortened at a word boundary.
pub const SUMMARY_LIMIT: usize = 200;
const SUGGESTION_LIMIT: usize = 5;
const PLACEHOLDER: &str = "...";

/// Errors raised by the Wikipedia client.
#[derive(Debug, Error)]
pub enum WikiError {
    /// The HTTP client could not be built.
    #[error("Failed to build HTTP client: {0}")]
    Client(#[from] reqwest::Error),
    /// The base or request URL is malformed.
    #[error("Invalid Wikipedia URL: {0}")]
    InvalidUrl(#[from] url::ParseError),
    /// The request did not complete.
    #[error("Wikipedia request failed: {0}")]
    Request(String),
    /// Wikipedia answered with an unexpected status.
    #[error("Wikipedia returned HTTP {0}")]
    Status(StatusCode),
    /// The body was not the expected JSON.
    #[error("Failed to parse Wikipedia response: {0}")]
    Parse(String),
}

type Result<T> = std::result::Result<T, WikiError>;

/// Short description of a Wikipedia page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WikiSummary {
    /// Canonical page title.
    pub title: String,
    /// Extract shortened to [`SUMMARY_LIMIT`] characters.
    pub extract: String,
    /// Desktop link to the article, when Wikipedia returned one.
    pub url: Option<Url>,
}

#[derive(Debug, Deserialize)]
struct SummaryResponse {
    title: String,
    #[serde(default)]
    extract: Option<String>,
    #[serde(default)]
    content_urls: Option<ContentUrls>,
}

#[derive(Debug, Deserialize)]
struct ContentUrls {
    desktop: Option<PageUrl>,
}

#[derive(Debug, Deserialize)]
struct PageUrl {
    page: String,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    query: Option<SearchQuery>,
}

#[derive(Debug, Deserialize)]
struct SearchQuery {
    #[serde(default)]
    search: Vec<SearchHit>,
}

#[derive(Debug, Deserialize)]
struct SearchHit {
    title: String,
}

impl From<SummaryResponse> for WikiSummary {
    fn from(response: SummaryResponse) -> Self {
        let extract = response.extract.unwrap_or_else(|| "No summary available".to_string());
        let url = response
            .content_urls
            .and_then(|urls| urls.desktop)
            .and_then(|desktop| Url::parse(&desktop.page).ok());

        Self { title: response.title, extract: shorten(&extract, SUMMARY_LIMIT), url }
    }
}

/// Read access to Wikipedia.
#[automock]
#[async_trait]
pub trait WikiClient: Send + Sync {
    /// Summary of the page titled `title`, `None` if there is no such page.
    async fn summary(&self, title: &str) -> Result<Option<WikiSummary>>;

    /// Titles of the best search hits for `query`.
    async fn search(&self, query: &str) -> Result<Vec<String>>;
}

/// `reqwest` based client for the REST summary and the search API.
#[derive(Clone)]
pub struct DefaultWikiClient {
    client: Client,
    base_url: Url,
}

impl DefaultWikiClient {
    /// Creates a client for the Wikipedia instance at `base_url`.
    pub fn new(base_url: &str) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(USER_AGENT, HeaderValue::from_static("support-bot/0.1 (Telegram bot)"));

        let client = Client::builder().default_headers(headers).build()?;
        debug!("HTTP client built successfully.");

        Ok(Self { client, base_url: Url::parse(base_url)? })
    }

    fn summary_url(&self, title: &str) -> Result<Url> {
        let mut url = self.base_url.join("api/rest_v1/page/summary/")?;
        url.path_segments_mut()
            .map_err(|_| WikiError::Request("base URL cannot have a path".to_string()))?
            .pop_if_empty()
            .push(&title.trim().replace(' ', "_"));
        Ok(url)
    }

    fn search_url(&self, query: &str) -> Result<Url> {
        let mut url = self.base_url.join("w/api.php")?;
        url.query_pairs_mut()
            .append_pair("action", "query")
            .append_pair("list", "search")
            .append_pair("srsearch", query)
            .append_pair("srlimit", &SUGGESTION_LIMIT.to_string())
            .append_pair("format", "json");
        Ok(url)
    }

    fn backoff_config() -> ExponentialBackoff {
        ExponentialBackoff {
            initial_interval: Duration::from_millis(500),
            max_interval: Duration::from_secs(5),
            max_elapsed_time: Some(Duration::from_secs(15)),
            multiplier: 2.0,
            ..Default::default()
        }
    }

    /// GETs `url` and decodes the JSON body, retrying transient failures.
    /// A 404 yields `None`.
    async fn get_json<T: DeserializeOwned>(&self, url: Url) -> Result<Option<T>> {
        let operation = || async {
            let resp = self.client.get(url.clone()).send().await.map_err(|e| {
                warn!("Network error calling Wikipedia: {e}. Retrying...");
                BackoffError::transient(WikiError::Request(e.to_string()))
            })?;

            let status = resp.status();
            if status == StatusCode::NOT_FOUND {
                return Ok(None);
            }
            if !status.is_success() {
                let err = WikiError::Status(status);
                return Err(if is_retryable_status(status) {
                    warn!("Wikipedia returned HTTP {status}. Retrying...");
                    BackoffError::transient(err)
                } else {
                    BackoffError::permanent(err)
                });
            }

            resp.json::<T>()
                .await
                .map(Some)
                .map_err(|e| BackoffError::permanent(WikiError::Parse(e.to_string())))
        };

        retry(Self::backoff_config(), operation).await
    }
}

#[async_trait]
impl WikiClient for DefaultWikiClient {
    async fn summary(&self, title: &str) -> Result<Option<WikiSummary>> {
        debug!("Fetching Wikipedia summary for {title}");
        let response: Option<SummaryResponse> = self.get_json(self.summary_url(title)?).await?;
        Ok(response.map(WikiSummary::from))
    }

    async fn search(&self, query: &str) -> Result<Vec<String>> {
        debug!("Searching Wikipedia for {query}");
        let response: Option<SearchResponse> = self.get_json(self.search_url(query)?).await?;

        Ok(response
            .and_then(|r| r.query)
            .map(|q| q.search.into_iter().map(|hit| hit.title).take(SUGGESTION_LIMIT).collect())
            .unwrap_or_default())
    }
}

fn is_retryable_status(status: StatusCode) -> bool {
    status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS
}

/// Collapses whitespace and cuts `text` at a word boundary so that the result,
/// including a trailing `...`, is at most `limit` characters long.
pub fn shorten(text: &str, limit: usize) -> String {
    let words: Vec<&str> = text.split_whitespace().collect();
    let collapsed = words.join(" ");
    if collapsed.chars().count() <= limit {
        return collapsed;
    }

    let budget = limit.saturating_sub(PLACEHOLDER.len());
    let mut result = String::new();
    for word in words {
        let needed = if result.is_empty() { 0 } else { 1 } + word.chars().count();
        if result.chars().count() + needed > budget {
            break;
        }
        if !result.is_empty() {
            result.push(' ');
        }
        result.push_str(word);
    }

    result.push_str(PLACEHOLDER);
    result
}

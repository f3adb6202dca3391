//! Web search clients
//!
//! Two backends: DuckDuckGo's HTML endpoint (no key needed) and the Tavily
//! JSON API. Both return plain [`SearchResult`] records.

use anyhow::{Context, Result};
use scraper::{Html, Selector};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, instrument, warn};

const DUCKDUCKGO_URL: &str = "https://html.duckduckgo.com/html/";
const TAVILY_URL: &str = "https://api.tavily.com/search";

/// A single search hit
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchResult {
    pub title: String,
    pub url: String,
    pub snippet: String,
}

fn build_http_client(timeout: Duration) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .pool_max_idle_per_host(10)
        .pool_idle_timeout(Duration::from_secs(90))
        .timeout(timeout)
        .user_agent("Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36")
        .build()
        .context("Failed to create HTTP client")
}

/// Search client scraping DuckDuckGo's HTML results page
#[derive(Debug, Clone)]
pub struct DuckDuckGoClient {
    client: reqwest::Client,
    base_url: String,
}

impl DuckDuckGoClient {
    pub fn new(timeout: Duration) -> Result<Self> {
        Ok(Self {
            client: build_http_client(timeout)?,
            base_url: DUCKDUCKGO_URL.to_string(),
        })
    }

    #[instrument(skip(self, query), fields(query = %truncate(query, 50)))]
    pub async fn search(&self, query: &str, limit: usize) -> Result<Vec<SearchResult>> {
        let search_url = format!("{}?q={}", self.base_url, urlencoding::encode(query));

        debug!("Sending search request to DuckDuckGo");
        let response = self
            .client
            .get(&search_url)
            .send()
            .await
            .context("Search request failed")?;

        if !response.status().is_success() {
            warn!(status = %response.status(), "Search returned error status");
            anyhow::bail!("Search failed with status: {}", response.status());
        }

        let html = response.text().await.context("Failed to read response")?;
        let results = parse_duckduckgo_results(&html, limit);
        debug!(results = results.len(), "Parsed search results");
        Ok(results)
    }
}

/// Search client for the Tavily API
#[derive(Clone)]
pub struct TavilyClient {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
}

impl std::fmt::Debug for TavilyClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TavilyClient")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Serialize)]
struct TavilyRequest<'a> {
    query: &'a str,
    max_results: usize,
}

#[derive(Debug, Deserialize)]
struct TavilyResponse {
    #[serde(default)]
    results: Vec<TavilyResult>,
}

#[derive(Debug, Deserialize)]
struct TavilyResult {
    #[serde(default)]
    title: String,
    #[serde(default)]
    url: String,
    #[serde(default)]
    content: String,
}

impl TavilyClient {
    pub fn new(api_key: impl Into<String>, timeout: Duration) -> Result<Self> {
        Ok(Self {
            client: build_http_client(timeout)?,
            api_key: api_key.into(),
            base_url: TAVILY_URL.to_string(),
        })
    }

    #[instrument(skip(self, query), fields(query = %truncate(query, 50)))]
    pub async fn search(&self, query: &str, limit: usize) -> Result<Vec<SearchResult>> {
        let resp: TavilyResponse = self
            .client
            .post(&self.base_url)
            .bearer_auth(&self.api_key)
            .json(&TavilyRequest {
                query,
                max_results: limit,
            })
            .send()
            .await
            .context("Search request failed")?
            .error_for_status()
            .context("Tavily search failed")?
            .json()
            .await
            .context("Failed to parse Tavily response")?;

        Ok(tavily_results(resp, limit))
    }
}

fn tavily_results(resp: TavilyResponse, limit: usize) -> Vec<SearchResult> {
    resp.results
        .into_iter()
        .take(limit)
        .map(|r| SearchResult {
            title: r.title,
            url: r.url,
            snippet: r.content,
        })
        .collect()
}

fn truncate(s: &str, max: usize) -> String {
    s.chars().take(max).collect()
}

fn parse_duckduckgo_results(html: &str, limit: usize) -> Vec<SearchResult> {
    let document = Html::parse_document(html);
    let mut results = Vec::new();

    // Selectors are static and known to be valid
    let (Ok(result_selector), Ok(title_selector), Ok(snippet_selector)) = (
        Selector::parse(".result"),
        Selector::parse(".result__a"),
        Selector::parse(".result__snippet"),
    ) else {
        return results;
    };

    for result_el in document.select(&result_selector) {
        if results.len() >= limit {
            break;
        }

        let title = result_el
            .select(&title_selector)
            .next()
            .map(|el| el.text().collect::<Vec<_>>().join(" "))
            .unwrap_or_default()
            .trim()
            .to_string();

        let url = result_el
            .select(&title_selector)
            .next()
            .and_then(|el| el.value().attr("href"))
            .map(unwrap_redirect)
            .unwrap_or_default();

        // A result counts once it has a snippet element, even an empty one
        let Some(snippet) = result_el
            .select(&snippet_selector)
            .next()
            .map(|el| el.text().collect::<Vec<_>>().join(" ").trim().to_string())
        else {
            continue;
        };

        if !title.is_empty() && !url.is_empty() {
            results.push(SearchResult { title, url, snippet });
        }
    }

    results
}

/// DuckDuckGo wraps result links in a redirect; pull out the target
fn unwrap_redirect(href: &str) -> String {
    if !href.contains("uddg=") {
        return href.to_string();
    }
    href.split("uddg=")
        .nth(1)
        .and_then(|s| urlencoding::decode(s.split('&').next().unwrap_or(s)).ok())
        .map(|s| s.into_owned())
        .unwrap_or_else(|| href.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    const RESULTS_HTML: &str = r#"
<html><body>
  <div class="result">
    <a class="result__a" href="//duckduckgo.com/l/?uddg=https%3A%2F%2Fexample.com%2Fgraph&amp;rut=abc">LangGraph overview</a>
    <a class="result__snippet">Graphs of agents with cycles.</a>
  </div>
  <div class="result">
    <a class="result__a" href="https://example.org/chains">LangChain chains</a>
    <a class="result__snippet">Linear chains of calls.</a>
  </div>
  <div class="result">
    <a class="result__a" href="https://example.net/third">Third</a>
    <a class="result__snippet">Another snippet.</a>
  </div>
</body></html>
"#;

    #[test]
    fn test_parse_empty_results() {
        let html = "<html><body></body></html>";
        let results = parse_duckduckgo_results(html, 10);
        assert!(results.is_empty());
    }

    #[test]
    fn test_parse_results_respects_limit() {
        let results = parse_duckduckgo_results(RESULTS_HTML, 2);
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].title, "LangGraph overview");
        assert_eq!(results[0].url, "https://example.com/graph");
        assert_eq!(results[0].snippet, "Graphs of agents with cycles.");
        assert_eq!(results[1].url, "https://example.org/chains");
    }

    #[test]
    fn test_results_without_snippet_are_skipped() {
        let html = r#"<div class="result"><a class="result__a" href="https://a.b">Title</a></div>"#;
        assert!(parse_duckduckgo_results(html, 5).is_empty());
    }

    #[test]
    fn test_empty_snippet_element_is_kept() {
        let html = r#"<div class="result"><a class="result__a" href="https://a.b">Title</a><a class="result__snippet">  </a></div>"#;
        let results = parse_duckduckgo_results(html, 5);
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].snippet, "");
    }

    #[test]
    fn test_tavily_response_mapping() {
        let body = r#"{
            "query": "q",
            "results": [
                {"title": "A", "url": "https://a", "content": "first", "score": 0.9},
                {"title": "B", "url": "https://b", "content": "  ", "score": 0.5},
                {"title": "C", "url": "https://c", "content": "third", "score": 0.4},
                {"title": "D", "url": "https://d", "content": "fourth", "score": 0.3}
            ]
        }"#;
        let resp: TavilyResponse = serde_json::from_str(body).unwrap();
        let results = tavily_results(resp, 2);
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].snippet, "first");
        assert_eq!(results[1].snippet, "  ");
        assert_eq!(results[1].url, "https://b");
    }

    #[test]
    fn test_tavily_missing_results_field() {
        let resp: TavilyResponse = serde_json::from_str("{}").unwrap();
        assert!(tavily_results(resp, 2).is_empty());
    }
}

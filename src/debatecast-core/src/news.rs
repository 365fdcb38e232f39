//! News fetching from NewsAPI.
//!
//! Queries are issued one after another until the article budget is filled.
//! A failing query is logged and skipped; articles are deduplicated by URL.

use std::collections::HashSet;
use std::time::Duration;

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::config::NEWS_API_KEY_VAR;
use crate::error::{PipelineError, Result};

const MAX_PAGE_SIZE: usize = 100;
const DEFAULT_QUERIES: [&str; 2] = ["politics", "political"];

/// A news article as returned to callers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Article {
    pub title: String,
    pub source: String,
    pub published_at: Option<String>,
    pub description: String,
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct NewsApiResponse {
    status: String,
    #[serde(default)]
    articles: Vec<NewsApiArticle>,
    #[serde(default)]
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct NewsApiArticle {
    #[serde(default)]
    source: Option<NewsApiSource>,
    title: Option<String>,
    description: Option<String>,
    url: Option<String>,
    published_at: Option<String>,
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct NewsApiSource {
    name: Option<String>,
}

impl NewsApiArticle {
    fn into_article(self) -> Option<Article> {
        let url = self.url.filter(|u| !u.trim().is_empty())?;
        Some(Article {
            title: self.title.unwrap_or_else(|| "No title".to_string()),
            source: self
                .source
                .and_then(|s| s.name)
                .unwrap_or_else(|| "Unknown source".to_string()),
            published_at: self.published_at,
            description: self.description.unwrap_or_default(),
            url,
            content: self.content.filter(|c| !c.is_empty()),
        })
    }
}

/// Ordered article collection that keeps the first article per URL.
struct ArticleSet {
    articles: Vec<Article>,
    seen: HashSet<String>,
    limit: usize,
}

impl ArticleSet {
    fn new(limit: usize) -> Self {
        Self {
            articles: Vec::new(),
            seen: HashSet::new(),
            limit,
        }
    }

    fn remaining(&self) -> usize {
        self.limit.saturating_sub(self.articles.len())
    }

    fn is_full(&self) -> bool {
        self.remaining() == 0
    }

    fn extend(&mut self, incoming: impl IntoIterator<Item = Article>) -> usize {
        let before = self.articles.len();
        for article in incoming {
            if self.seen.insert(article.url.clone()) {
                self.articles.push(article);
            }
        }
        self.articles.len() - before
    }

    fn into_vec(mut self) -> Vec<Article> {
        self.articles.truncate(self.limit);
        self.articles
    }
}

/// Fetches recent politics articles.
pub struct NewsFetcher {
    client: reqwest::Client,
    api_key: Option<String>,
    base_url: String,
    days_back: i64,
    max_articles: usize,
}

impl NewsFetcher {
    pub fn new(api_key: Option<String>, base_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .connect_timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| {
                PipelineError::ConfigError(format!("Failed to create HTTP client: {}", e))
            })?;

        Ok(Self {
            client,
            api_key,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            days_back: 7,
            max_articles: 100,
        })
    }

    /// Set the look-back window in days and the article budget.
    pub fn with_limits(mut self, days_back: i64, max_articles: usize) -> Self {
        self.days_back = days_back.max(0);
        self.max_articles = max_articles;
        self
    }

    /// Fetch recent articles for `keyword`, or for the default politics
    /// queries when no keyword is given.
    pub async fn fetch_recent(&self, keyword: Option<&str>) -> Result<Vec<Article>> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or(PipelineError::MissingConfig(NEWS_API_KEY_VAR))?;

        let keyword = keyword.map(str::trim).filter(|k| !k.is_empty());
        let queries: Vec<&str> = match keyword {
            Some(k) => vec![k],
            None => DEFAULT_QUERIES.to_vec(),
        };

        let to = Utc::now();
        let from = to - chrono::Duration::days(self.days_back);
        let from = from.format("%Y-%m-%d").to_string();
        let to = to.format("%Y-%m-%d").to_string();

        let mut articles = ArticleSet::new(self.max_articles);

        for query in &queries {
            if articles.is_full() {
                break;
            }
            let params = vec![
                ("q", query.to_string()),
                ("language", "en".to_string()),
                ("sortBy", "publishedAt".to_string()),
                ("pageSize", articles.remaining().min(MAX_PAGE_SIZE).to_string()),
                ("from", from.clone()),
                ("to", to.clone()),
            ];
            match self.query("everything", api_key, &params).await {
                Ok(batch) => {
                    let added = articles.extend(batch);
                    tracing::debug!(query = %query, added, "news query finished");
                }
                Err(e) => tracing::warn!(query = %query, error = %e, "news query failed, skipping"),
            }
        }

        if !articles.is_full() {
            let params = vec![
                ("q", queries[0].to_string()),
                ("language", "en".to_string()),
                ("pageSize", articles.remaining().min(MAX_PAGE_SIZE).to_string()),
            ];
            match self.query("top-headlines", api_key, &params).await {
                Ok(batch) => {
                    articles.extend(batch);
                }
                Err(e) => tracing::warn!(error = %e, "top headlines query failed, skipping"),
            }
        }

        let articles = articles.into_vec();
        tracing::info!(count = articles.len(), "fetched news articles");
        Ok(articles)
    }

    async fn query(
        &self,
        endpoint: &str,
        api_key: &str,
        params: &[(&str, String)],
    ) -> Result<Vec<Article>> {
        let response = self
            .client
            .get(format!("{}/{}", self.base_url, endpoint))
            .header("X-Api-Key", api_key)
            .query(params)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(PipelineError::Upstream {
                service: "NewsAPI",
                status: status.as_u16(),
                body: response.text().await.unwrap_or_default(),
            });
        }

        let body: NewsApiResponse = response.json().await?;
        if body.status != "ok" {
            return Err(PipelineError::Upstream {
                service: "NewsAPI",
                status: status.as_u16(),
                body: body.message.unwrap_or(body.status),
            });
        }

        Ok(body
            .articles
            .into_iter()
            .filter_map(NewsApiArticle::into_article)
            .collect())
    }
}

/// Render an article for the category generation prompt.
pub fn format_for_categorization(article: &Article) -> String {
    let body = match article.content.as_deref() {
        Some(content) => truncate_chars(content, 500),
        None => truncate_chars(&article.description, 500),
    };
    format!("Title: {}\nDescription: {}", article.title, body)
}

/// Char-boundary-safe prefix of at most `max` characters.
pub(crate) fn truncate_chars(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn raw(title: &str, url: Option<&str>) -> serde_json::Value {
        json!({
            "source": { "id": null, "name": "Wire" },
            "author": null,
            "title": title,
            "description": format!("About {}", title),
            "url": url,
            "publishedAt": "2025-10-01T12:00:00Z",
            "content": null
        })
    }

    fn ok(articles: Vec<serde_json::Value>) -> ResponseTemplate {
        ResponseTemplate::new(200).set_body_json(json!({
            "status": "ok",
            "totalResults": articles.len(),
            "articles": articles
        }))
    }

    fn fetcher(server: &MockServer, max: usize) -> NewsFetcher {
        NewsFetcher::new(Some("news-key".to_string()), server.uri(), Duration::from_secs(5))
            .unwrap()
            .with_limits(3, max)
    }

    fn titles(articles: &[Article]) -> Vec<&str> {
        articles.iter().map(|a| a.title.as_str()).collect()
    }

    #[tokio::test]
    async fn test_fetch_deduplicates_by_url() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/everything"))
            .and(header("X-Api-Key", "news-key"))
            .respond_with(ok(vec![
                raw("Shutdown talks stall", Some("https://a.example/1")),
                raw("Senate vote delayed", Some("https://a.example/2")),
                raw("Shutdown talks stall (updated)", Some("https://a.example/1")),
                raw("No link", None),
            ]))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/top-headlines"))
            .respond_with(ok(vec![
                raw("Senate vote delayed", Some("https://a.example/2")),
                raw("Governor race tightens", Some("https://b.example/3")),
            ]))
            .mount(&server)
            .await;

        let articles = fetcher(&server, 20).fetch_recent(None).await.unwrap();

        assert_eq!(
            titles(&articles),
            vec!["Shutdown talks stall", "Senate vote delayed", "Governor race tightens"]
        );
        assert_eq!(articles[0].source, "Wire");
    }

    #[tokio::test]
    async fn test_failed_query_is_skipped() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/everything"))
            .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/top-headlines"))
            .respond_with(ok(vec![raw("Budget deal", Some("https://c.example/1"))]))
            .mount(&server)
            .await;

        let articles = fetcher(&server, 20).fetch_recent(None).await.unwrap();
        assert_eq!(titles(&articles), vec!["Budget deal"]);
    }

    #[tokio::test]
    async fn test_error_status_body_is_skipped() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/everything"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "status": "error",
                "code": "rateLimited",
                "message": "Too many requests"
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/top-headlines"))
            .respond_with(ok(vec![]))
            .mount(&server)
            .await;

        let articles = fetcher(&server, 20).fetch_recent(None).await.unwrap();
        assert!(articles.is_empty());
    }

    #[tokio::test]
    async fn test_budget_stops_further_queries() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/everything"))
            .and(query_param("q", "tariffs"))
            .and(query_param("pageSize", "2"))
            .respond_with(ok(vec![
                raw("One", Some("https://d.example/1")),
                raw("Two", Some("https://d.example/2")),
                raw("Three", Some("https://d.example/3")),
            ]))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/top-headlines"))
            .respond_with(ok(vec![]))
            .expect(0)
            .mount(&server)
            .await;

        let articles = fetcher(&server, 2).fetch_recent(Some(" tariffs ")).await.unwrap();
        assert_eq!(titles(&articles), vec!["One", "Two"]);
    }

    #[tokio::test]
    async fn test_missing_key_fails_fast() {
        let fetcher =
            NewsFetcher::new(None, "http://127.0.0.1:9", Duration::from_secs(1)).unwrap();
        let err = fetcher.fetch_recent(None).await.unwrap_err();
        assert!(matches!(err, PipelineError::MissingConfig(NEWS_API_KEY_VAR)));
    }

    #[test]
    fn test_format_prefers_content() {
        let mut article = Article {
            title: "Tariffs".to_string(),
            source: "Wire".to_string(),
            published_at: None,
            description: "short".to_string(),
            url: "https://e.example".to_string(),
            content: Some("x".repeat(600)),
        };
        let formatted = format_for_categorization(&article);
        assert_eq!(formatted, format!("Title: Tariffs\nDescription: {}", "x".repeat(500)));

        article.content = None;
        assert_eq!(
            format_for_categorization(&article),
            "Title: Tariffs\nDescription: short"
        );
    }
}

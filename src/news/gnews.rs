// src/news/gnews.rs
//! GNews search client (`GET {base}/search`).

use std::time::Duration;

use async_trait::async_trait;
use metrics::counter;
use serde::Deserialize;

use super::{normalize_text, parse_timestamp, Article, ArticleFetcher, FetchQuery};
use crate::config::secrets::GNEWS_API_KEY;
use crate::config::{SecretResolver, Settings};
use crate::error::{error_chain, PipelineError, Result};
use crate::store::ArticleCollection;

/// GNews rejects `max` above this.
pub const MAX_RESULTS: u32 = 100;

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(rename = "totalArticles", default)]
    total_articles: Option<u64>,
    #[serde(default)]
    articles: Vec<RawArticle>,
}

#[derive(Debug, Deserialize)]
struct RawArticle {
    title: Option<String>,
    description: Option<String>,
    #[serde(rename = "publishedAt")]
    published_at: Option<String>,
    #[serde(default)]
    source: Option<RawSource>,
    url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawSource {
    name: Option<String>,
}

impl RawArticle {
    fn into_article(self) -> Article {
        Article {
            title: self.title.as_deref().map(normalize_text).unwrap_or_default(),
            description: self
                .description
                .as_deref()
                .map(normalize_text)
                .filter(|d| !d.is_empty()),
            published_at: self.published_at.as_deref().and_then(parse_timestamp),
            source: self.source.and_then(|s| s.name),
            url: self.url.unwrap_or_default(),
        }
    }
}

pub struct GNewsClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl GNewsClient {
    pub fn new(api_key: String, base_url: &str, timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("news-sentiment-dashboard/", env!("CARGO_PKG_VERSION")))
            .connect_timeout(Duration::from_secs(4))
            .timeout(timeout)
            .build()
            .map_err(|e| PipelineError::FetchFailed(format!("building http client: {e}")))?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
        })
    }

    /// Requires `API_KEY`; `ConfigMissing` otherwise.
    pub fn from_config(secrets: &SecretResolver, settings: &Settings) -> Result<Self> {
        let key = secrets.require(GNEWS_API_KEY)?;
        Self::new(
            key,
            &settings.gnews_base_url,
            Duration::from_secs(settings.fetch_timeout_secs),
        )
    }

    async fn search(&self, query: &FetchQuery) -> Result<SearchResponse> {
        let max = query.max.clamp(1, MAX_RESULTS).to_string();
        let url = format!("{}/search", self.base_url);
        let resp = self
            .http
            .get(&url)
            .query(&[
                ("token", self.api_key.as_str()),
                ("q", query.query.as_str()),
                ("lang", query.lang.as_str()),
                ("country", query.country.as_str()),
                ("max", max.as_str()),
            ])
            .send()
            .await
            // the request URL carries the token; keep it out of messages
            .map_err(|e| PipelineError::FetchFailed(error_chain(&e.without_url())))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            let snippet: String = body.chars().take(200).collect();
            return Err(PipelineError::FetchFailed(format!(
                "HTTP {status}: {}",
                snippet.trim()
            )));
        }

        resp.json::<SearchResponse>()
            .await
            .map_err(|e| {
                PipelineError::FetchFailed(format!("decoding response: {}", error_chain(&e.without_url())))
            })
    }
}

#[async_trait]
impl ArticleFetcher for GNewsClient {
    async fn fetch(&self, query: &FetchQuery) -> Result<ArticleCollection> {
        counter!("news_fetch_total").increment(1);
        let body = match self.search(query).await {
            Ok(b) => b,
            Err(e) => {
                tracing::warn!(error = %e, provider = "gnews", q = %query.query, "fetch failed");
                counter!("news_fetch_errors_total").increment(1);
                return Err(e);
            }
        };

        let articles: Vec<Article> = body
            .articles
            .into_iter()
            .map(RawArticle::into_article)
            .collect();
        counter!("news_articles_fetched_total").increment(articles.len() as u64);
        tracing::info!(
            provider = "gnews",
            q = %query.query,
            rows = articles.len(),
            total = ?body.total_articles,
            "fetched articles"
        );
        Ok(ArticleCollection::new(articles))
    }

    fn name(&self) -> &'static str {
        "gnews"
    }
}

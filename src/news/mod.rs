// src/news/mod.rs
//! Article model, fetcher abstraction and text/timestamp normalisation.

pub mod gnews;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use once_cell::sync::OnceCell;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::store::ArticleCollection;

pub use gnews::GNewsClient;

/// One news article as returned by the search API, after normalisation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Article {
    pub title: String,
    pub description: Option<String>,
    #[serde(rename = "publishedAt")]
    pub published_at: Option<DateTime<Utc>>,
    pub source: Option<String>,
    pub url: String,
}

/// Search parameters for one fetch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FetchQuery {
    pub query: String,
    #[serde(default = "default_lang")]
    pub lang: String,
    #[serde(default = "default_country")]
    pub country: String,
    #[serde(default = "default_max")]
    pub max: u32,
}

fn default_lang() -> String {
    "en".to_string()
}
fn default_country() -> String {
    "in".to_string()
}
fn default_max() -> u32 {
    50
}

impl FetchQuery {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            lang: default_lang(),
            country: default_country(),
            max: default_max(),
        }
    }

    pub fn lang(mut self, lang: impl Into<String>) -> Self {
        self.lang = lang.into();
        self
    }

    pub fn country(mut self, country: impl Into<String>) -> Self {
        self.country = country.into();
        self
    }

    pub fn max(mut self, max: u32) -> Self {
        self.max = max;
        self
    }
}

#[async_trait]
pub trait ArticleFetcher: Send + Sync {
    /// Run one search. An empty collection means "no results", not failure.
    async fn fetch(&self, query: &FetchQuery) -> Result<ArticleCollection>;
    fn name(&self) -> &'static str;
}

/// Decode entities, strip tags, normalise quotes and collapse whitespace.
pub fn normalize_text(s: &str) -> String {
    let mut out = html_escape::decode_html_entities(s).to_string();

    static RE_TAGS: OnceCell<Regex> = OnceCell::new();
    let re_tags = RE_TAGS.get_or_init(|| Regex::new(r"(?is)</?[a-z][^>]*>").expect("tag regex"));
    out = re_tags.replace_all(&out, "").to_string();

    out = out
        .replace(['\u{201C}', '\u{201D}', '\u{00AB}', '\u{00BB}'], "\"")
        .replace(['\u{2018}', '\u{2019}'], "'");

    static RE_WS: OnceCell<Regex> = OnceCell::new();
    let re_ws = RE_WS.get_or_init(|| Regex::new(r"\s+").expect("whitespace regex"));
    re_ws.replace_all(&out, " ").trim().to_string()
}

/// Parse the timestamp shapes found in API responses and older CSV files.
/// Anything else is coerced to `None`.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let s = raw.trim();
    if s.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    // pandas writes "2024-05-01 10:00:00+00:00"
    if let Ok(dt) = DateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%:z") {
        return Some(dt.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S")
        .ok()
        .map(|n| n.and_utc())
}

/// Stable textual form used in CSV files and API output.
pub fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(chrono::SecondsFormat::Secs, true)
}

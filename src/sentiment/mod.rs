// src/sentiment/mod.rs
//! Sentiment labels and the three interchangeable classification strategies.
//!
//! Every strategy implements [`SentimentBackend`]. Callers go through
//! [`classify`], which short-circuits blank text to `Neutral` and turns a
//! backend error into `Unknown` while keeping the error for reporting.

pub mod batch;
pub mod lexicon;
pub mod llm;
pub mod model;

use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::news::Article;

pub use batch::{classify_collection, BatchOptions, BatchReport, ItemFailure, Progress};
pub use lexicon::{LexiconAnalyzer, PolarityScores};
pub use llm::{ChatProvider, LlmClassifier, MockProvider, OpenAiProvider};
pub use model::{BinaryTextModel, ModelClassifier, ModelPrediction, NaiveBayesModel};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum SentimentLabel {
    Positive,
    Negative,
    Neutral,
    /// Classification failed; distinct from `Neutral` (no sentiment found).
    Unknown,
}

impl SentimentLabel {
    pub const ALL: [SentimentLabel; 4] = [
        SentimentLabel::Positive,
        SentimentLabel::Negative,
        SentimentLabel::Neutral,
        SentimentLabel::Unknown,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SentimentLabel::Positive => "Positive",
            SentimentLabel::Negative => "Negative",
            SentimentLabel::Neutral => "Neutral",
            SentimentLabel::Unknown => "Unknown",
        }
    }

    /// Read a stored cell. Empty means "not labelled".
    ///
    /// Older files keep raw model replies ("Positive.", "The sentiment is
    /// Negative"), so a label word anywhere in the cell counts. Text naming
    /// no label is `Unknown`.
    pub fn from_cell(cell: &str) -> Option<Self> {
        let t = cell.trim();
        if t.is_empty() {
            return None;
        }
        if let Ok(label) = t.parse() {
            return Some(label);
        }
        let lower = t.to_lowercase();
        let found = Self::ALL
            .into_iter()
            .find(|l| lower.contains(&l.as_str().to_ascii_lowercase()));
        Some(found.unwrap_or(SentimentLabel::Unknown))
    }
}

impl fmt::Display for SentimentLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SentimentLabel {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "positive" => Ok(SentimentLabel::Positive),
            "negative" => Ok(SentimentLabel::Negative),
            "neutral" => Ok(SentimentLabel::Neutral),
            "unknown" => Ok(SentimentLabel::Unknown),
            other => Err(format!("unknown sentiment label '{other}'")),
        }
    }
}

/// Per-label tallies over one label column.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct LabelCounts {
    pub positive: usize,
    pub negative: usize,
    pub neutral: usize,
    pub unknown: usize,
    /// Rows without a value in the column.
    pub unlabeled: usize,
}

impl LabelCounts {
    pub fn from_labels<'a, I>(labels: I) -> Self
    where
        I: IntoIterator<Item = &'a Option<SentimentLabel>>,
    {
        let mut c = LabelCounts::default();
        for l in labels {
            c.add(*l);
        }
        c
    }

    pub fn add(&mut self, label: Option<SentimentLabel>) {
        match label {
            Some(SentimentLabel::Positive) => self.positive += 1,
            Some(SentimentLabel::Negative) => self.negative += 1,
            Some(SentimentLabel::Neutral) => self.neutral += 1,
            Some(SentimentLabel::Unknown) => self.unknown += 1,
            None => self.unlabeled += 1,
        }
    }

    pub fn get(&self, label: SentimentLabel) -> usize {
        match label {
            SentimentLabel::Positive => self.positive,
            SentimentLabel::Negative => self.negative,
            SentimentLabel::Neutral => self.neutral,
            SentimentLabel::Unknown => self.unknown,
        }
    }

    pub fn labeled(&self) -> usize {
        self.positive + self.negative + self.neutral + self.unknown
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Strategy {
    /// Dictionary polarity scoring, no external call.
    Lexicon,
    /// Local pretrained binary classifier.
    Model,
    /// Hosted large language model.
    Llm,
}

impl Strategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Strategy::Lexicon => "lexicon",
            Strategy::Model => "model",
            Strategy::Llm => "llm",
        }
    }

    /// Column a strategy writes its labels to.
    pub fn column_name(&self, field: TextField) -> String {
        match (self, field) {
            (Strategy::Lexicon, f) => format!("sentiment_{}", f.as_str()),
            (Strategy::Model, TextField::Description) => "bert_sentiment".to_string(),
            (Strategy::Model, TextField::Title) => "bert_sentiment_title".to_string(),
            (Strategy::Llm, TextField::Description) => "gpt_sentiment".to_string(),
            (Strategy::Llm, TextField::Title) => "gpt_sentiment_title".to_string(),
        }
    }

    /// Row cap when the caller gives none. Only the hosted strategy is capped.
    pub fn default_max_items(&self, configured: usize) -> Option<usize> {
        match self {
            Strategy::Llm => Some(configured),
            Strategy::Lexicon | Strategy::Model => None,
        }
    }

    /// File name the classified collection is saved under when the caller gives none.
    pub fn default_output(&self) -> &'static str {
        match self {
            Strategy::Lexicon => "news_with_sentiment.csv",
            Strategy::Model => "news_with_bert_sentiment.csv",
            Strategy::Llm => "news_with_gpt_sentiment.csv",
        }
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which article text a strategy reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum TextField {
    Title,
    #[default]
    Description,
}

impl TextField {
    pub fn as_str(&self) -> &'static str {
        match self {
            TextField::Title => "title",
            TextField::Description => "description",
        }
    }

    /// A missing description falls back to the title.
    pub fn text_of<'a>(&self, article: &'a Article) -> Option<&'a str> {
        match self {
            TextField::Title => Some(article.title.as_str()),
            TextField::Description => article
                .description
                .as_deref()
                .filter(|d| !d.trim().is_empty())
                .or(Some(article.title.as_str())),
        }
    }
}

#[async_trait]
pub trait SentimentBackend: Send + Sync {
    fn strategy(&self) -> Strategy;

    /// Label non-blank text. Errors are per item.
    async fn score(&self, text: &str) -> Result<SentimentLabel>;
}

/// Outcome of classifying one text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classification {
    pub label: SentimentLabel,
    pub error: Option<String>,
}

pub async fn classify(backend: &dyn SentimentBackend, text: Option<&str>) -> Classification {
    let Some(text) = text.filter(|t| !t.trim().is_empty()) else {
        return Classification {
            label: SentimentLabel::Neutral,
            error: None,
        };
    };
    match backend.score(text).await {
        Ok(label) => Classification { label, error: None },
        Err(e) => Classification {
            label: SentimentLabel::Unknown,
            error: Some(e.to_string()),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PipelineError;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingBackend {
        calls: AtomicUsize,
        fail: bool,
    }

    #[async_trait]
    impl SentimentBackend for CountingBackend {
        fn strategy(&self) -> Strategy {
            Strategy::Model
        }

        async fn score(&self, _text: &str) -> Result<SentimentLabel> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                Err(PipelineError::ClassificationFailed("boom".into()))
            } else {
                Ok(SentimentLabel::Positive)
            }
        }
    }

    #[tokio::test]
    async fn blank_text_is_neutral_without_backend_call() {
        let b = CountingBackend {
            calls: AtomicUsize::new(0),
            fail: false,
        };
        for t in [None, Some(""), Some("   \n\t")] {
            let c = classify(&b, t).await;
            assert_eq!(c.label, SentimentLabel::Neutral);
            assert!(c.error.is_none());
        }
        assert_eq!(b.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn backend_error_becomes_unknown_with_message() {
        let b = CountingBackend {
            calls: AtomicUsize::new(0),
            fail: true,
        };
        let c = classify(&b, Some("markets fell")).await;
        assert_eq!(c.label, SentimentLabel::Unknown);
        assert!(c.error.unwrap().contains("boom"));
    }

    #[test]
    fn label_cells_parse_case_insensitively() {
        assert_eq!(SentimentLabel::from_cell("POSITIVE"), Some(SentimentLabel::Positive));
        assert_eq!(SentimentLabel::from_cell(" negative "), Some(SentimentLabel::Negative));
        assert_eq!(SentimentLabel::from_cell("Mixed"), Some(SentimentLabel::Unknown));
        assert_eq!(SentimentLabel::from_cell("Positive."), Some(SentimentLabel::Positive));
        assert_eq!(
            SentimentLabel::from_cell("The sentiment is Negative"),
            Some(SentimentLabel::Negative)
        );
        assert_eq!(SentimentLabel::from_cell("neutral"), Some(SentimentLabel::Neutral));
        assert_eq!(SentimentLabel::from_cell(""), None);
    }

    #[test]
    fn column_names_per_strategy() {
        assert_eq!(Strategy::Lexicon.column_name(TextField::Title), "sentiment_title");
        assert_eq!(
            Strategy::Lexicon.column_name(TextField::Description),
            "sentiment_description"
        );
        assert_eq!(Strategy::Model.column_name(TextField::Description), "bert_sentiment");
        assert_eq!(Strategy::Llm.column_name(TextField::Description), "gpt_sentiment");
    }

    #[test]
    fn only_the_llm_strategy_is_capped_by_default() {
        assert_eq!(Strategy::Llm.default_max_items(50), Some(50));
        assert_eq!(Strategy::Lexicon.default_max_items(50), None);
        assert_eq!(Strategy::Model.default_max_items(50), None);
    }

    #[test]
    fn description_falls_back_to_title() {
        let a = Article {
            title: "Headline".into(),
            description: None,
            published_at: None,
            source: None,
            url: "u".into(),
        };
        assert_eq!(TextField::Description.text_of(&a), Some("Headline"));
    }
}

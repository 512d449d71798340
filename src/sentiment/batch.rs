// src/sentiment/batch.rs
//! Sequential classification of a whole collection into one label column.

use serde::Serialize;

use super::{classify, LabelCounts, SentimentBackend, SentimentLabel, Strategy, TextField};
use crate::error::Result;
use crate::store::ArticleCollection;

/// Reported after every classified row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Progress {
    /// Zero-based row index.
    pub index: usize,
    /// Rows this batch will classify.
    pub total: usize,
    pub label: SentimentLabel,
}

#[derive(Debug, Clone, Default)]
pub struct BatchOptions {
    pub field: TextField,
    /// Classify only the first `n` rows; the rest stay unlabelled.
    pub max_items: Option<usize>,
    /// Output column; defaults to the strategy's column for `field`.
    pub column: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ItemFailure {
    pub index: usize,
    pub error: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BatchReport {
    pub column: String,
    pub strategy: Strategy,
    pub processed: usize,
    /// Rows past `max_items`.
    pub skipped: usize,
    pub failures: Vec<ItemFailure>,
    pub counts: LabelCounts,
}

/// Label rows in order, writing the result into the collection.
///
/// Per-row failures become `Unknown` and are listed in the report; they never
/// stop the batch. An existing column with the same name is replaced.
pub async fn classify_collection<F>(
    coll: &mut ArticleCollection,
    backend: &dyn SentimentBackend,
    opts: &BatchOptions,
    mut on_progress: F,
) -> Result<BatchReport>
where
    F: FnMut(Progress),
{
    let strategy = backend.strategy();
    let column = opts
        .column
        .clone()
        .unwrap_or_else(|| strategy.column_name(opts.field));
    let total = opts.max_items.map_or(coll.len(), |m| m.min(coll.len()));

    let mut labels: Vec<Option<SentimentLabel>> = vec![None; coll.len()];
    let mut failures = Vec::new();

    for (index, article) in coll.articles().iter().take(total).enumerate() {
        let text = opts.field.text_of(article);
        let c = classify(backend, text).await;
        if let Some(error) = c.error {
            metrics::counter!("sentiment_failures_total", "strategy" => strategy.as_str())
                .increment(1);
            tracing::warn!(
                strategy = strategy.as_str(),
                row = index,
                text_id = %anon_hash(text.unwrap_or_default()),
                error = %error,
                "classification failed, labelled Unknown"
            );
            failures.push(ItemFailure { index, error });
        }
        metrics::counter!(
            "sentiment_classified_total",
            "strategy" => strategy.as_str(),
            "label" => c.label.as_str()
        )
        .increment(1);
        labels[index] = Some(c.label);
        on_progress(Progress {
            index,
            total,
            label: c.label,
        });
    }

    let counts = LabelCounts::from_labels(&labels);
    coll.set_label_column(&column, labels)?;

    tracing::info!(
        strategy = strategy.as_str(),
        column = %column,
        rows = total,
        failures = failures.len(),
        "batch classified"
    );

    Ok(BatchReport {
        column,
        strategy,
        processed: total,
        skipped: coll.len() - total,
        failures,
        counts,
    })
}

/// Short, non-reversible id for log lines; article text itself is never logged.
pub(crate) fn anon_hash(text: &str) -> String {
    use sha2::{Digest, Sha256};
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    let digest = hasher.finalize();
    let mut out = String::with_capacity(12);
    for b in digest.iter().take(6) {
        use std::fmt::Write as _;
        let _ = write!(&mut out, "{:02x}", b);
    }
    out
}

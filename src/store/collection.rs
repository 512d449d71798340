// src/store/collection.rs
//! Ordered article rows plus the columns that travel with them.
//!
//! Three column groups, always in this order on output:
//! the five article columns, pass-through text columns read from a file, and
//! label columns (any column whose name contains `sentiment`).

use std::collections::HashSet;

use chrono::{DateTime, Utc};

use crate::error::{PipelineError, Result};
use crate::news::{format_timestamp, parse_timestamp, Article};
use crate::sentiment::{LabelCounts, SentimentLabel};

pub const TITLE: &str = "title";
pub const DESCRIPTION: &str = "description";
pub const PUBLISHED_AT: &str = "publishedAt";
pub const SOURCE: &str = "source";
pub const URL: &str = "url";

pub const ARTICLE_COLUMNS: [&str; 5] = [TITLE, DESCRIPTION, PUBLISHED_AT, SOURCE, URL];

pub fn is_label_column(name: &str) -> bool {
    name.to_lowercase().contains("sentiment")
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabelColumn {
    pub name: String,
    /// `None` = row not labelled.
    pub values: Vec<Option<SentimentLabel>>,
}

/// Column kept verbatim from a loaded file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextColumn {
    pub name: String,
    pub values: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ArticleCollection {
    articles: Vec<Article>,
    extra: Vec<TextColumn>,
    labels: Vec<LabelColumn>,
}

fn cell_at(row: &[String], i: Option<usize>) -> &str {
    i.and_then(|i| row.get(i)).map(String::as_str).unwrap_or("")
}

impl ArticleCollection {
    pub fn new(articles: Vec<Article>) -> Self {
        Self {
            articles,
            extra: Vec::new(),
            labels: Vec::new(),
        }
    }

    /// Build from a header row and string cells (CSV file, warehouse query).
    ///
    /// Missing article columns read as empty; short rows are padded.
    pub fn from_records(headers: &[String], rows: Vec<Vec<String>>) -> Result<Self> {
        let mut seen = HashSet::new();
        for h in headers {
            if !seen.insert(h.as_str()) {
                return Err(PipelineError::InvalidInput(format!("duplicate column '{h}'")));
            }
        }

        let pos = |name: &str| headers.iter().position(|h| h == name);
        let (i_title, i_desc, i_pub, i_src, i_url) = (
            pos(TITLE),
            pos(DESCRIPTION),
            pos(PUBLISHED_AT),
            pos(SOURCE),
            pos(URL),
        );

        let mut extra: Vec<TextColumn> = Vec::new();
        let mut labels: Vec<LabelColumn> = Vec::new();
        let mut extra_idx = Vec::new();
        let mut label_idx = Vec::new();
        for (i, h) in headers.iter().enumerate() {
            if ARTICLE_COLUMNS.contains(&h.as_str()) {
                continue;
            }
            if is_label_column(h) {
                label_idx.push(i);
                labels.push(LabelColumn {
                    name: h.clone(),
                    values: Vec::with_capacity(rows.len()),
                });
            } else {
                extra_idx.push(i);
                extra.push(TextColumn {
                    name: h.clone(),
                    values: Vec::with_capacity(rows.len()),
                });
            }
        }

        let mut articles = Vec::with_capacity(rows.len());
        for row in rows {
            let cell = |i: Option<usize>| cell_at(&row, i);
            let opt = |s: &str| Some(s.to_string()).filter(|v| !v.trim().is_empty());
            articles.push(Article {
                title: cell(i_title).to_string(),
                description: opt(cell(i_desc)),
                published_at: parse_timestamp(cell(i_pub)),
                source: opt(cell(i_src)),
                url: cell(i_url).to_string(),
            });
            for (col, &i) in extra.iter_mut().zip(&extra_idx) {
                col.values.push(cell(Some(i)).to_string());
            }
            for (col, &i) in labels.iter_mut().zip(&label_idx) {
                col.values.push(SentimentLabel::from_cell(cell(Some(i))));
            }
        }

        Ok(Self {
            articles,
            extra,
            labels,
        })
    }

    pub fn len(&self) -> usize {
        self.articles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.articles.is_empty()
    }

    pub fn articles(&self) -> &[Article] {
        &self.articles
    }

    pub fn extra_columns(&self) -> &[TextColumn] {
        &self.extra
    }

    pub fn label_columns(&self) -> &[LabelColumn] {
        &self.labels
    }

    pub fn label_column(&self, name: &str) -> Option<&LabelColumn> {
        self.labels.iter().find(|c| c.name == name)
    }

    /// Header row in output order.
    pub fn column_names(&self) -> Vec<String> {
        ARTICLE_COLUMNS
            .iter()
            .map(|s| s.to_string())
            .chain(self.extra.iter().map(|c| c.name.clone()))
            .chain(self.labels.iter().map(|c| c.name.clone()))
            .collect()
    }

    /// Add a label column, or replace the one with the same name in place.
    pub fn set_label_column(&mut self, name: &str, values: Vec<Option<SentimentLabel>>) -> Result<()> {
        if !is_label_column(name) {
            return Err(PipelineError::InvalidInput(format!(
                "label column '{name}' must contain 'sentiment'"
            )));
        }
        if values.len() != self.len() {
            return Err(PipelineError::InvalidInput(format!(
                "label column '{name}' has {} values for {} rows",
                values.len(),
                self.len()
            )));
        }
        match self.labels.iter_mut().find(|c| c.name == name) {
            Some(col) => col.values = values,
            None => self.labels.push(LabelColumn {
                name: name.to_string(),
                values,
            }),
        }
        Ok(())
    }

    /// Rows at `indices`, in that order, with every column carried along.
    pub fn select(&self, indices: &[usize]) -> Self {
        let indices: Vec<usize> = indices.iter().copied().filter(|&i| i < self.len()).collect();
        Self {
            articles: indices.iter().map(|&i| self.articles[i].clone()).collect(),
            extra: self
                .extra
                .iter()
                .map(|c| TextColumn {
                    name: c.name.clone(),
                    values: indices.iter().map(|&i| c.values[i].clone()).collect(),
                })
                .collect(),
            labels: self
                .labels
                .iter()
                .map(|c| LabelColumn {
                    name: c.name.clone(),
                    values: indices.iter().map(|&i| c.values[i]).collect(),
                })
                .collect(),
        }
    }

    pub fn filter<F>(&self, mut keep: F) -> Self
    where
        F: FnMut(&Article) -> bool,
    {
        let idx: Vec<usize> = self
            .articles
            .iter()
            .enumerate()
            .filter(|(_, a)| keep(a))
            .map(|(i, _)| i)
            .collect();
        self.select(&idx)
    }

    /// Drop rows whose URL was already seen; first occurrence wins.
    /// Rows with an empty URL are always kept.
    pub fn dedup_by_url(&self) -> Self {
        let mut seen = HashSet::new();
        self.filter(|a| a.url.is_empty() || seen.insert(a.url.clone()))
    }

    /// Newest first, undated rows last. Stable for equal timestamps.
    pub fn sorted_by_published_desc(&self) -> Self {
        let mut idx: Vec<usize> = (0..self.len()).collect();
        idx.sort_by(|&a, &b| {
            let (pa, pb) = (self.articles[a].published_at, self.articles[b].published_at);
            match (pa, pb) {
                (Some(x), Some(y)) => y.cmp(&x),
                (Some(_), None) => std::cmp::Ordering::Less,
                (None, Some(_)) => std::cmp::Ordering::Greater,
                (None, None) => std::cmp::Ordering::Equal,
            }
        });
        self.select(&idx)
    }

    pub fn label_counts(&self, column: &str) -> Option<LabelCounts> {
        self.label_column(column)
            .map(|c| LabelCounts::from_labels(&c.values))
    }

    /// Earliest and latest `publishedAt`, ignoring undated rows.
    pub fn date_range(&self) -> Option<(DateTime<Utc>, DateTime<Utc>)> {
        let mut dates = self.articles.iter().filter_map(|a| a.published_at);
        let first = dates.next()?;
        Some(dates.fold((first, first), |(lo, hi), d| (lo.min(d), hi.max(d))))
    }

    /// Cells of row `i` in [`column_names`](Self::column_names) order.
    pub fn row_cells(&self, i: usize) -> Vec<String> {
        let a = &self.articles[i];
        let mut out = vec![
            a.title.clone(),
            a.description.clone().unwrap_or_default(),
            a.published_at.as_ref().map(format_timestamp).unwrap_or_default(),
            a.source.clone().unwrap_or_default(),
            a.url.clone(),
        ];
        out.extend(self.extra.iter().map(|c| c.values[i].clone()));
        out.extend(
            self.labels
                .iter()
                .map(|c| c.values[i].map(|l| l.to_string()).unwrap_or_default()),
        );
        out
    }

    pub fn rows(&self) -> impl Iterator<Item = Vec<String>> + '_ {
        (0..self.len()).map(move |i| self.row_cells(i))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn s(v: &[&str]) -> Vec<String> {
        v.iter().map(|x| x.to_string()).collect()
    }

    fn sample() -> ArticleCollection {
        ArticleCollection::from_records(
            &s(&["title", "url", "publishedAt", "lang", "bert_sentiment"]),
            vec![
                s(&["Old", "u1", "2024-05-01T10:00:00Z", "en", "POSITIVE"]),
                s(&["Undated", "u2", "", "en", ""]),
                s(&["New", "u3", "2024-05-03 08:00:00+00:00", "hi", "Negative"]),
                s(&["Dup", "u1", "2024-05-02T00:00:00Z", "en", "weird"]),
            ],
        )
        .unwrap()
    }

    #[test]
    fn records_split_into_column_groups() {
        let c = sample();
        assert_eq!(c.len(), 4);
        assert_eq!(
            c.column_names(),
            s(&["title", "description", "publishedAt", "source", "url", "lang", "bert_sentiment"])
        );
        let labels = &c.label_column("bert_sentiment").unwrap().values;
        assert_eq!(
            labels,
            &vec![
                Some(SentimentLabel::Positive),
                None,
                Some(SentimentLabel::Negative),
                Some(SentimentLabel::Unknown)
            ]
        );
        assert_eq!(c.articles()[1].published_at, None);
        assert_eq!(c.row_cells(2)[2], "2024-05-03T08:00:00Z");
    }

    #[test]
    fn sort_puts_undated_last() {
        let sorted = sample().sorted_by_published_desc();
        let titles: Vec<&str> = sorted.articles().iter().map(|a| a.title.as_str()).collect();
        assert_eq!(titles, vec!["New", "Dup", "Old", "Undated"]);
        // labels follow their rows
        assert_eq!(
            sorted.label_column("bert_sentiment").unwrap().values[0],
            Some(SentimentLabel::Negative)
        );
        assert_eq!(sorted.extra_columns()[0].values[0], "hi");
    }

    #[test]
    fn dedup_keeps_first_url() {
        let d = sample().dedup_by_url();
        assert_eq!(d.len(), 3);
        assert!(d.articles().iter().all(|a| a.title != "Dup"));
    }

    #[test]
    fn label_column_replaced_in_place() {
        let mut c = sample();
        c.set_label_column("sentiment_title", vec![None; 4]).unwrap();
        c.set_label_column("bert_sentiment", vec![Some(SentimentLabel::Neutral); 4])
            .unwrap();
        assert_eq!(c.label_columns().len(), 2);
        assert_eq!(c.label_columns()[0].name, "bert_sentiment");
        assert_eq!(c.label_counts("bert_sentiment").unwrap().neutral, 4);

        assert!(c.set_label_column("sentiment_title", vec![None; 3]).is_err());
        assert!(c.set_label_column("score", vec![None; 4]).is_err());
    }

    #[test]
    fn date_range_ignores_missing() {
        let (lo, hi) = sample().date_range().unwrap();
        assert_eq!(lo, Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, 0).unwrap());
        assert_eq!(hi, Utc.with_ymd_and_hms(2024, 5, 3, 8, 0, 0).unwrap());
        assert!(ArticleCollection::default().date_range().is_none());
    }

    #[test]
    fn duplicate_headers_rejected() {
        let err = ArticleCollection::from_records(&s(&["title", "title"]), vec![]).unwrap_err();
        assert!(matches!(err, PipelineError::InvalidInput(_)));
    }
}

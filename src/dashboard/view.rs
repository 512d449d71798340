// src/dashboard/view.rs
//! What the dashboard shows for one collection: filtered rows, the label
//! chart, summary counts and data statistics. Pure; rendering lives elsewhere.

use serde::Serialize;

use crate::error::{PipelineError, Result};
use crate::news::format_timestamp;
use crate::sentiment::{LabelCounts, SentimentLabel};
use crate::store::ArticleCollection;

/// Case-insensitive substring match on title or description.
/// An empty keyword returns the collection unchanged.
pub fn filter_keyword(coll: &ArticleCollection, keyword: Option<&str>) -> ArticleCollection {
    let Some(kw) = keyword.map(str::trim).filter(|k| !k.is_empty()) else {
        return coll.clone();
    };
    let needle = kw.to_lowercase();
    coll.filter(|a| {
        a.title.to_lowercase().contains(&needle)
            || a.description
                .as_deref()
                .is_some_and(|d| d.to_lowercase().contains(&needle))
    })
}

pub fn sentiment_columns(coll: &ArticleCollection) -> Vec<String> {
    coll.label_columns().iter().map(|c| c.name.clone()).collect()
}

pub fn label_color(label: SentimentLabel) -> &'static str {
    match label {
        SentimentLabel::Positive => "green",
        SentimentLabel::Negative => "red",
        SentimentLabel::Neutral => "gray",
        SentimentLabel::Unknown => "orange",
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChartBar {
    pub label: SentimentLabel,
    pub count: usize,
    pub color: &'static str,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Summary {
    pub total: usize,
    pub positive: usize,
    pub negative: usize,
    pub neutral: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DataStats {
    pub columns: Vec<String>,
    pub rows: usize,
    pub date_from: Option<String>,
    pub date_to: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DashboardView {
    /// File name or warehouse table the rows came from.
    pub source: String,
    pub keyword: Option<String>,
    /// Rows before the keyword filter.
    pub total_rows: usize,
    pub columns: Vec<String>,
    pub rows: Vec<Vec<String>>,
    pub sentiment_columns: Vec<String>,
    pub selected_column: Option<String>,
    pub chart: Vec<ChartBar>,
    pub summary: Option<Summary>,
    pub counts: Option<LabelCounts>,
    pub stats: DataStats,
}

/// Sort newest first, filter by keyword, then chart the chosen label column
/// (first label column when none is given).
pub fn build_view(
    coll: &ArticleCollection,
    source: &str,
    keyword: Option<&str>,
    column: Option<&str>,
) -> Result<DashboardView> {
    let label_cols = sentiment_columns(coll);
    let selected = match column.filter(|c| !c.is_empty()) {
        Some(c) if label_cols.iter().any(|l| l == c) => Some(c.to_string()),
        Some(c) => {
            return Err(PipelineError::InvalidInput(format!(
                "'{c}' is not a sentiment column of {source}"
            )))
        }
        None => label_cols.first().cloned(),
    };

    let view = filter_keyword(&coll.sorted_by_published_desc(), keyword);

    let counts = selected.as_deref().and_then(|c| view.label_counts(c));
    let chart = counts
        .map(|c| {
            SentimentLabel::ALL
                .iter()
                .filter(|l| c.get(**l) > 0)
                .map(|l| ChartBar {
                    label: *l,
                    count: c.get(*l),
                    color: label_color(*l),
                })
                .collect()
        })
        .unwrap_or_default();
    let summary = counts.map(|c| Summary {
        total: view.len(),
        positive: c.positive,
        negative: c.negative,
        neutral: c.neutral,
    });

    let range = view.date_range();
    let stats = DataStats {
        columns: view.column_names(),
        rows: view.len(),
        date_from: range.map(|(lo, _)| format_timestamp(&lo)),
        date_to: range.map(|(_, hi)| format_timestamp(&hi)),
    };

    Ok(DashboardView {
        source: source.to_string(),
        keyword: keyword.map(str::trim).filter(|k| !k.is_empty()).map(str::to_string),
        total_rows: coll.len(),
        columns: view.column_names(),
        rows: view.rows().collect(),
        sentiment_columns: label_cols,
        selected_column: selected,
        chart,
        summary,
        counts,
        stats,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn s(v: &[&str]) -> Vec<String> {
        v.iter().map(|x| x.to_string()).collect()
    }

    fn sample() -> ArticleCollection {
        ArticleCollection::from_records(
            &s(&["title", "description", "publishedAt", "sentiment_description", "gpt_sentiment"]),
            vec![
                s(&["Pune metro opens", "Commuters cheer", "2024-05-01T10:00:00Z", "Positive", "Positive"]),
                s(&["Floods in Assam", "Heavy damage", "2024-05-03T10:00:00Z", "Negative", "Negative"]),
                s(&["Weather update", "Mild METRO delays", "2024-05-02T10:00:00Z", "Neutral", "Negative"]),
            ],
        )
        .unwrap()
    }

    #[test]
    fn keyword_matches_title_or_description_ignoring_case() {
        let c = sample();
        let f = filter_keyword(&c, Some("metro"));
        assert_eq!(f.len(), 2);
        assert_eq!(filter_keyword(&c, Some("")), c);
        assert_eq!(filter_keyword(&c, None), c);
        assert!(filter_keyword(&c, Some("cricket")).is_empty());
    }

    #[test]
    fn view_sorts_filters_and_counts() {
        let v = build_view(&sample(), "news_with_sentiment.csv", Some("METRO"), None).unwrap();
        assert_eq!(v.selected_column.as_deref(), Some("sentiment_description"));
        assert_eq!(v.rows.len(), 2);
        // newest first
        assert_eq!(v.rows[0][0], "Weather update");
        let summary = v.summary.unwrap();
        assert_eq!((summary.total, summary.positive, summary.negative, summary.neutral), (2, 1, 0, 1));
        assert_eq!(
            v.chart,
            vec![
                ChartBar { label: SentimentLabel::Positive, count: 1, color: "green" },
                ChartBar { label: SentimentLabel::Neutral, count: 1, color: "gray" },
            ]
        );
        assert_eq!(v.total_rows, 3);
        assert_eq!(v.stats.date_from.as_deref(), Some("2024-05-01T10:00:00Z"));
        assert_eq!(v.stats.date_to.as_deref(), Some("2024-05-02T10:00:00Z"));
    }

    #[test]
    fn explicit_column_and_unknown_column() {
        let v = build_view(&sample(), "f.csv", None, Some("gpt_sentiment")).unwrap();
        assert_eq!(v.summary.unwrap().negative, 2);
        assert!(build_view(&sample(), "f.csv", None, Some("nope")).is_err());
    }

    #[test]
    fn no_label_columns_means_no_chart() {
        let c = ArticleCollection::from_records(&s(&["title"]), vec![s(&["x"])]).unwrap();
        let v = build_view(&c, "gnews_output.csv", None, None).unwrap();
        assert!(v.selected_column.is_none());
        assert!(v.chart.is_empty());
        assert!(v.summary.is_none());
        assert_eq!(v.stats.rows, 1);
    }
}

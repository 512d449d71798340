// tests/store_csv.rs
use std::fs;

use news_sentiment::news::Article;
use news_sentiment::sentiment::SentimentLabel;
use news_sentiment::store::{ArticleCollection, CsvStore};
use news_sentiment::PipelineError;

fn sample() -> ArticleCollection {
    let mut coll = ArticleCollection::new(vec![
        Article {
            title: "Budget, explained".into(),
            description: Some("A \"quote\" and a, comma".into()),
            published_at: news_sentiment::news::parse_timestamp("2024-05-02T06:00:00Z"),
            source: Some("Mint".into()),
            url: "https://example.com/budget".into(),
        },
        Article {
            title: "No date".into(),
            description: None,
            published_at: None,
            source: None,
            url: "https://example.com/nodate".into(),
        },
    ]);
    coll.set_label_column(
        "sentiment_description",
        vec![Some(SentimentLabel::Positive), None],
    )
    .unwrap();
    coll
}

#[test]
fn save_then_load_keeps_cells_and_labels() {
    let dir = tempfile::tempdir().unwrap();
    let store = CsvStore::new(dir.path().join("data"));

    let path = store.save(&sample(), "news_with_sentiment.csv").unwrap();
    assert!(path.is_file());

    let back = store.load("news_with_sentiment.csv").unwrap();
    assert_eq!(back, sample());
    assert_eq!(
        back.column_names(),
        vec![
            "title",
            "description",
            "publishedAt",
            "source",
            "url",
            "sentiment_description"
        ]
    );
}

#[test]
fn foreign_columns_survive_a_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(
        dir.path().join("external.csv"),
        "title,url,author,bert_sentiment\nA,https://a,Jane,NEGATIVE\nB,https://b,,\n",
    )
    .unwrap();
    let store = CsvStore::new(dir.path());

    let coll = store.load("external.csv").unwrap();
    assert_eq!(coll.len(), 2);
    assert_eq!(coll.extra_columns()[0].name, "author");
    let labels = &coll.label_column("bert_sentiment").unwrap().values;
    assert_eq!(labels, &vec![Some(SentimentLabel::Negative), None]);

    store.save(&coll, "copy.csv").unwrap();
    let again = store.load("copy.csv").unwrap();
    assert_eq!(again.extra_columns()[0].values, vec!["Jane", ""]);
}

#[test]
fn missing_file_is_not_found() {
    let dir = tempfile::tempdir().unwrap();
    let store = CsvStore::new(dir.path());
    match store.load("news_with_gpt_sentiment.csv") {
        Err(PipelineError::NotFound(name)) => assert_eq!(name, "news_with_gpt_sentiment.csv"),
        other => panic!("expected NotFound, got {other:?}"),
    }
}

#[test]
fn failed_save_keeps_previous_file() {
    let dir = tempfile::tempdir().unwrap();
    let store = CsvStore::new(dir.path());
    store.save(&sample(), "gnews_output.csv").unwrap();
    let before = fs::read(dir.path().join("gnews_output.csv")).unwrap();

    // Block the temp path so the write itself fails.
    fs::create_dir(dir.path().join(".gnews_output.csv.tmp")).unwrap();
    let err = store
        .save(&ArticleCollection::default(), "gnews_output.csv")
        .expect_err("write must fail");
    assert!(matches!(err, PipelineError::Io(_) | PipelineError::Csv(_)), "{err:?}");

    let after = fs::read(dir.path().join("gnews_output.csv")).unwrap();
    assert_eq!(before, after);
}

#[test]
fn list_shows_only_csv_files_sorted() {
    let dir = tempfile::tempdir().unwrap();
    let store = CsvStore::new(dir.path());
    store.save(&sample(), "b.csv").unwrap();
    store.save(&sample(), "a.csv").unwrap();
    fs::write(dir.path().join("notes.txt"), "x").unwrap();
    fs::write(dir.path().join(".hidden.csv"), "x").unwrap();

    assert_eq!(store.list().unwrap(), vec!["a.csv", "b.csv"]);
    assert!(CsvStore::new(dir.path().join("nope")).list().unwrap().is_empty());
}

#[test]
fn path_escape_is_rejected() {
    let store = CsvStore::new("data");
    for bad in ["../secrets.csv", "sub/x.csv", "", "x.txt"] {
        assert!(
            matches!(store.load(bad), Err(PipelineError::InvalidInput(_))),
            "{bad:?} should be rejected"
        );
    }
}

#[test]
fn raw_reply_cells_keep_their_label_through_a_resave() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(
        dir.path().join("news_with_gpt_sentiment.csv"),
        "title,url,gpt_sentiment\n\
         A,https://a,Positive.\n\
         B,https://b,The sentiment is Negative\n\
         C,https://c,no idea\n",
    )
    .unwrap();
    let store = CsvStore::new(dir.path());

    let coll = store.load("news_with_gpt_sentiment.csv").unwrap();
    store.save(&coll, "news_with_gpt_sentiment.csv").unwrap();
    let again = store.load("news_with_gpt_sentiment.csv").unwrap();

    assert_eq!(
        again.label_column("gpt_sentiment").unwrap().values,
        vec![
            Some(SentimentLabel::Positive),
            Some(SentimentLabel::Negative),
            Some(SentimentLabel::Unknown),
        ]
    );
    let text = fs::read_to_string(dir.path().join("news_with_gpt_sentiment.csv")).unwrap();
    assert!(text.contains("https://a,Positive"), "{text}");
    assert!(!text.contains("Positive."), "{text}");
}

// tests/warehouse_upload.rs
//
// CSV file -> warehouse append, via the in-process warehouse.

use news_sentiment::sentiment::SentimentLabel;
use news_sentiment::store::warehouse::{DEFAULT_DATASET, DEFAULT_TABLE};
use news_sentiment::store::{upload, CsvStore, MemoryWarehouse, Warehouse, WarehouseTarget};
use news_sentiment::PipelineError;

const LABELLED: &str = "\
title,description,publishedAt,source,url,bert_sentiment
Rally,Stocks climb,2024-03-01T08:00:00Z,Mint,https://example.com/1,Positive
Floods,Rivers burst,2024-03-02T09:30:00Z,NDTV,https://example.com/2,Negative
";

fn target() -> WarehouseTarget {
    WarehouseTarget::new("demo-project", DEFAULT_DATASET, DEFAULT_TABLE, "asia-south1").unwrap()
}

#[tokio::test]
async fn first_upload_creates_dataset_then_later_uploads_append() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("news_with_bert_sentiment.csv"), LABELLED).unwrap();
    let coll = CsvStore::new(dir.path())
        .load("news_with_bert_sentiment.csv")
        .unwrap();

    let wh = MemoryWarehouse::new();
    let first = upload(&coll, &target(), &wh).await.unwrap();
    assert!(first.dataset_created);
    assert_eq!(first.rows, 2);

    let second = upload(&coll, &target(), &wh).await.unwrap();
    assert!(!second.dataset_created);
    assert_eq!(wh.dataset_creates(), 1);
    assert_eq!(wh.row_count(&target()), 4);
    assert!(wh.columns(&target()).contains(&"bert_sentiment".to_string()));

    // Rows read back newest first, labels intact.
    let recent = wh.fetch_recent(&target(), 1).await.unwrap();
    assert_eq!(recent.len(), 1);
    assert_eq!(recent.articles()[0].title, "Floods");
    assert_eq!(
        recent.label_column("bert_sentiment").unwrap().values,
        vec![Some(SentimentLabel::Negative)]
    );
}

#[tokio::test]
async fn rejected_append_surfaces_the_warehouse_message() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("in.csv"), LABELLED).unwrap();
    let coll = CsvStore::new(dir.path()).load("in.csv").unwrap();

    let wh = MemoryWarehouse::failing("Access Denied: Table demo-project:news_dataset_asia");
    match upload(&coll, &target(), &wh).await {
        Err(PipelineError::UploadFailed(msg)) => assert!(msg.contains("Access Denied")),
        other => panic!("expected UploadFailed, got {other:?}"),
    }
}

#[test]
fn bad_identifiers_are_rejected_before_any_call() {
    assert!(WarehouseTarget::new("demo-project", "bad-dataset!", DEFAULT_TABLE, "US").is_err());
    assert!(WarehouseTarget::new("", DEFAULT_DATASET, DEFAULT_TABLE, "US").is_err());
    assert_eq!(
        target().qualified(),
        "demo-project.news_dataset_asia.news_with_sentiment"
    );
}

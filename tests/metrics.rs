// tests/metrics.rs
use axum::body::{self, Body};
use axum::http::{Request, StatusCode};
use axum::Router;
use tower::ServiceExt;

use news_sentiment::news::Article;
use news_sentiment::sentiment::{classify_collection, BatchOptions, LexiconAnalyzer};
use news_sentiment::store::ArticleCollection;

// Full in-process app: dashboard routes plus /metrics.
async fn build_app() -> Router {
    news_sentiment::app()
        .await
        .expect("app() should build Router in tests")
}

async fn scrape(app: Router) -> String {
    let resp = app
        .oneshot(Request::builder().uri("/metrics").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let bytes = body::to_bytes(resp.into_body(), 1024 * 1024).await.unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

#[tokio::test]
async fn metrics_endpoint_exposes_classification_counters() {
    let app = build_app().await;

    let mut coll = ArticleCollection::new(vec![Article {
        title: "Exports surge".into(),
        description: Some("great news for farmers".into()),
        published_at: None,
        source: None,
        url: "https://example.com/m".into(),
    }]);
    classify_collection(&mut coll, &LexiconAnalyzer::new(), &BatchOptions::default(), |_| {})
        .await
        .unwrap();

    let body = scrape(app).await;
    assert!(
        body.contains("sentiment_classified_total"),
        "missing classified counter:\n{body}"
    );
    assert!(body.contains("strategy=\"lexicon\""), "missing strategy label:\n{body}");
    assert!(body.contains("label=\"Positive\""), "missing label label:\n{body}");
}

#[tokio::test]
async fn recorder_installs_once_per_process() {
    let first = news_sentiment::metrics::Metrics::init().expect("first init");
    let second = news_sentiment::metrics::Metrics::init().expect("second init is a no-op");
    metrics::counter!("news_fetch_total").increment(1);
    assert!(first.handle.render().contains("news_fetch_total"));
    assert!(second.handle.render().contains("news_fetch_total"));
}

// tests/common/mod.rs
// Shared helpers: a throwaway local HTTP server standing in for GNews/OpenAI.
#![allow(dead_code)]

use axum::Router;
use tokio::net::TcpListener;

use news_sentiment::config::Settings;

/// Serve `app` on an ephemeral port and return its base URL.
pub async fn spawn_mock(app: Router) -> String {
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind mock listener");
    let addr = listener.local_addr().expect("mock addr");
    tokio::spawn(async move {
        axum::serve(listener, app).await.expect("mock server");
    });
    format!("http://{addr}")
}

/// Defaults with the data directory pointed at `dir`.
pub fn settings_in(dir: &std::path::Path) -> Settings {
    Settings {
        data_dir: dir.to_path_buf(),
        ..Settings::default()
    }
}

/// GNews-shaped body with three dated articles.
pub fn three_articles() -> serde_json::Value {
    serde_json::json!({
        "totalArticles": 3,
        "articles": [
            {
                "title": "Markets rally",
                "description": "great news",
                "publishedAt": "2024-03-01T08:00:00Z",
                "source": {"name": "Mint", "url": "https://livemint.com"},
                "url": "https://example.com/1"
            },
            {
                "title": "Floods in the north",
                "description": "terrible disaster",
                "publishedAt": "2024-03-02T09:30:00Z",
                "source": {"name": "NDTV", "url": "https://ndtv.com"},
                "url": "https://example.com/2"
            },
            {
                "title": "Weather today",
                "description": "the sky is blue",
                "publishedAt": "2024-03-03T10:15:00Z",
                "source": {"name": "The Hindu", "url": "https://thehindu.com"},
                "url": "https://example.com/3"
            }
        ]
    })
}

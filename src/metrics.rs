// src/metrics.rs
use axum::{routing::get, Router};
use metrics::describe_counter;
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use once_cell::sync::OnceCell;

static HANDLE: OnceCell<PrometheusHandle> = OnceCell::new();

#[derive(Clone)]
pub struct Metrics {
    pub handle: PrometheusHandle,
}

impl Metrics {
    /// Install the Prometheus recorder once per process and describe the series.
    /// Later calls return the same handle.
    pub fn init() -> anyhow::Result<Self> {
        let handle = HANDLE.get_or_try_init(|| {
            let handle = PrometheusBuilder::new().install_recorder()?;
            describe_all();
            Ok::<_, anyhow::Error>(handle)
        })?;
        Ok(Self {
            handle: handle.clone(),
        })
    }

    /// Returns a router exposing `/metrics` with the Prometheus exposition format.
    pub fn router(&self) -> Router {
        let handle = self.handle.clone();
        Router::new().route(
            "/metrics",
            get(move || {
                let h = handle.clone();
                async move { h.render() }
            }),
        )
    }
}

fn describe_all() {
    describe_counter!("news_fetch_total", "Search API calls.");
    describe_counter!("news_fetch_errors_total", "Search API calls that failed.");
    describe_counter!(
        "news_articles_fetched_total",
        "Articles returned by the search API."
    );
    describe_counter!(
        "sentiment_classified_total",
        "Rows labelled, by strategy and label."
    );
    describe_counter!(
        "sentiment_failures_total",
        "Rows whose classification failed (labelled Unknown)."
    );
    describe_counter!("warehouse_upload_rows_total", "Rows appended to the warehouse.");
    describe_counter!("warehouse_upload_errors_total", "Failed warehouse uploads.");
}

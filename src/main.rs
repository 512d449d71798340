//! News Sentiment Dashboard: binary entrypoint.
//! Boots the Axum app on Shuttle with the platform secret store in front of
//! the process environment.
//!
//! See `README.md` for the local quickstart.

use news_sentiment::config::SecretResolver;
use shuttle_axum::ShuttleAxum;
use shuttle_runtime::SecretStore;

#[shuttle_runtime::main]
async fn axum(#[shuttle_runtime::Secrets] secrets: SecretStore) -> ShuttleAxum {
    // Load .env in local/dev; no-op in prod environments.
    let _ = dotenvy::dotenv();

    news_sentiment::logging::init_tracing();

    let router = news_sentiment::app_with(SecretResolver::with_hosted(secrets)).await?;
    Ok(router.into())
}

// src/lib.rs
// Public library surface for the binaries and integration tests.

pub mod config;
pub mod dashboard;
pub mod error;
pub mod logging;
pub mod metrics;
pub mod news;
pub mod sentiment;
pub mod store;

pub use crate::dashboard::router;
pub use crate::error::{PipelineError, Result};

use anyhow::Context;
use axum::Router;

use crate::config::{SecretResolver, Settings};
use crate::dashboard::AppState;
use crate::metrics::Metrics;

/// Full dashboard app (routes + `/metrics`) with secrets from the environment.
pub async fn app() -> anyhow::Result<Router> {
    app_with(SecretResolver::from_env()).await
}

/// Same as [`app`] with a caller-supplied secret resolver (the Shuttle entrypoint
/// puts the platform secret store in front of the environment).
pub async fn app_with(secrets: SecretResolver) -> anyhow::Result<Router> {
    let settings = Settings::load_default().context("loading dashboard settings")?;
    let state = AppState::from_config(settings, &secrets);
    let metrics = Metrics::init().context("installing metrics recorder")?;
    Ok(router(state).merge(metrics.router()))
}

//! Hosted-LLM strategy: provider abstraction + prompt + reply normalisation.
//!
//! The model is asked for one word. Replies are mapped by case-insensitive
//! substring ("positive" first, then "negative"); anything else is `Neutral`.
//! Transport failures are errors, which [`crate::sentiment::classify`] turns
//! into `Unknown`.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::{SentimentBackend, SentimentLabel, Strategy};
use crate::config::secrets::OPENAI_API_KEY;
use crate::config::{SecretResolver, Settings};
use crate::error::{error_chain, PipelineError, Result};

pub const SYSTEM_PROMPT: &str =
    "You are a sentiment analysis assistant. Respond with only one word: Positive, Negative, or Neutral.";

pub fn user_prompt(text: &str) -> String {
    format!(
        "What is the sentiment of the following news text? Respond with Positive, Negative, or Neutral only.\n\nText: {text}"
    )
}

// ------------------------------------------------------------
// Provider abstraction + concrete providers
// ------------------------------------------------------------

/// Chat-completion backend. Separated from the classifier so tests and
/// `LLM_TEST_MODE=mock` can swap the remote call out.
pub trait ChatProvider: Send + Sync {
    fn complete<'a>(
        &'a self,
        system: &'a str,
        user: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<String>> + Send + 'a>>;
    fn name(&self) -> &'static str;
}

/// OpenAI Chat Completions.
pub struct OpenAiProvider {
    http: reqwest::Client,
    api_key: String,
    model: String,
    base_url: String,
}

impl OpenAiProvider {
    pub fn new(api_key: String, base_url: &str, model: &str, timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("news-sentiment-dashboard/", env!("CARGO_PKG_VERSION")))
            .connect_timeout(Duration::from_secs(4))
            .timeout(timeout)
            .build()
            .map_err(|e| PipelineError::ClassificationFailed(format!("building http client: {e}")))?;
        Ok(Self {
            http,
            api_key,
            model: model.to_string(),
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }
}

impl ChatProvider for OpenAiProvider {
    fn complete<'a>(
        &'a self,
        system: &'a str,
        user: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<String>> + Send + 'a>> {
        Box::pin(async move {
            #[derive(Serialize)]
            struct Msg<'a> {
                role: &'a str,
                content: &'a str,
            }
            #[derive(Serialize)]
            struct Req<'a> {
                model: &'a str,
                messages: Vec<Msg<'a>>,
                temperature: f32,
                max_tokens: u32,
            }
            #[derive(Deserialize)]
            struct Resp {
                choices: Vec<Choice>,
            }
            #[derive(Deserialize)]
            struct Choice {
                message: ChoiceMsg,
            }
            #[derive(Deserialize)]
            struct ChoiceMsg {
                #[serde(default)]
                content: Option<String>,
            }

            let req = Req {
                model: &self.model,
                messages: vec![
                    Msg {
                        role: "system",
                        content: system,
                    },
                    Msg {
                        role: "user",
                        content: user,
                    },
                ],
                temperature: 0.3,
                max_tokens: 10,
            };

            let resp = self
                .http
                .post(format!("{}/chat/completions", self.base_url))
                .bearer_auth(&self.api_key)
                .json(&req)
                .send()
                .await
                .map_err(|e| PipelineError::ClassificationFailed(error_chain(&e)))?;

            let status = resp.status();
            if !status.is_success() {
                let body = resp.text().await.unwrap_or_default();
                let snippet: String = body.chars().take(200).collect();
                return Err(PipelineError::ClassificationFailed(format!(
                    "HTTP {status}: {}",
                    snippet.trim()
                )));
            }

            let body: Resp = resp
                .json()
                .await
                .map_err(|e| PipelineError::ClassificationFailed(format!("decoding reply: {e}")))?;
            // A missing choice or null content is a failure.
            body.choices
                .into_iter()
                .next()
                .and_then(|c| c.message.content)
                .map(|c| c.trim().to_string())
                .ok_or_else(|| PipelineError::ClassificationFailed("empty completion".into()))
        })
    }

    fn name(&self) -> &'static str {
        "openai"
    }
}

/// Deterministic provider for tests/local runs.
#[derive(Debug, Clone)]
pub struct MockProvider {
    reply: std::result::Result<String, String>,
}

impl MockProvider {
    pub fn replying(reply: &str) -> Self {
        Self {
            reply: Ok(reply.to_string()),
        }
    }

    pub fn failing(message: &str) -> Self {
        Self {
            reply: Err(message.to_string()),
        }
    }
}

impl ChatProvider for MockProvider {
    fn complete<'a>(
        &'a self,
        _system: &'a str,
        _user: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<String>> + Send + 'a>> {
        let out = self
            .reply
            .clone()
            .map_err(PipelineError::ClassificationFailed);
        Box::pin(async move { out })
    }

    fn name(&self) -> &'static str {
        "mock"
    }
}

/// Factory: build a provider according to secrets and environment.
///
/// * `LLM_TEST_MODE=mock` returns a mock answering "Neutral".
/// * Otherwise `OPENAI_API_KEY` is required (`ConfigMissing` if absent).
pub fn build_provider(secrets: &SecretResolver, settings: &Settings) -> Result<Arc<dyn ChatProvider>> {
    if std::env::var("LLM_TEST_MODE")
        .map(|v| v == "mock")
        .unwrap_or(false)
    {
        return Ok(Arc::new(MockProvider::replying("Neutral")));
    }
    let key = secrets.require(OPENAI_API_KEY)?;
    let provider = OpenAiProvider::new(
        key,
        &settings.openai_base_url,
        &settings.llm_model,
        Duration::from_secs(settings.llm_timeout_secs),
    )?;
    Ok(Arc::new(provider))
}

// ------------------------------------------------------------
// Classifier
// ------------------------------------------------------------

#[derive(Clone)]
pub struct LlmClassifier {
    provider: Arc<dyn ChatProvider>,
    max_input_chars: usize,
}

impl LlmClassifier {
    pub fn new(provider: Arc<dyn ChatProvider>, max_input_chars: usize) -> Self {
        Self {
            provider,
            max_input_chars: max_input_chars.max(1),
        }
    }

    pub fn provider_name(&self) -> &'static str {
        self.provider.name()
    }
}

#[async_trait]
impl SentimentBackend for LlmClassifier {
    fn strategy(&self) -> Strategy {
        Strategy::Llm
    }

    async fn score(&self, text: &str) -> Result<SentimentLabel> {
        let clipped = truncate_chars(text, self.max_input_chars);
        let reply = self
            .provider
            .complete(SYSTEM_PROMPT, &user_prompt(clipped))
            .await?;
        Ok(parse_label(&reply))
    }
}

/// First `max` characters (not bytes) of `text`.
pub fn truncate_chars(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

pub fn parse_label(reply: &str) -> SentimentLabel {
    let r = reply.to_lowercase();
    if r.contains("positive") {
        SentimentLabel::Positive
    } else if r.contains("negative") {
        SentimentLabel::Negative
    } else {
        SentimentLabel::Neutral
    }
}

// src/sentiment/model.rs
//! Pretrained-model strategy.
//!
//! The model is a binary text classifier that answers `POSITIVE` or
//! `NEGATIVE` with a confidence and has no neutral class. The bundled weights
//! are a multinomial naive-Bayes model trained on movie-review polarity data;
//! other weights in the same JSON shape can be loaded from disk.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};

use super::{SentimentBackend, SentimentLabel, Strategy};
use crate::config::Settings;
use crate::error::{PipelineError, Result};

static BUNDLED: Lazy<Arc<NaiveBayesModel>> = Lazy::new(|| {
    let raw = include_str!("../../models/sentiment_nb.json");
    Arc::new(NaiveBayesModel::from_json(raw).expect("valid bundled sentiment model"))
});

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelPrediction {
    pub label: String,
    pub score: f64,
}

pub trait BinaryTextModel: Send + Sync {
    fn name(&self) -> &str;
    fn predict(&self, text: &str) -> Result<ModelPrediction>;
}

fn default_max_tokens() -> usize {
    512
}

#[derive(Debug, Clone, Deserialize)]
struct ModelFile {
    name: String,
    labels: [String; 2],
    log_priors: [f64; 2],
    #[serde(default = "default_max_tokens")]
    max_tokens: usize,
    /// token -> log P(token | label), in `labels` order
    tokens: HashMap<String, [f64; 2]>,
}

#[derive(Debug, Clone)]
pub struct NaiveBayesModel {
    file: ModelFile,
}

impl NaiveBayesModel {
    pub fn from_json(raw: &str) -> Result<Self> {
        let file: ModelFile = serde_json::from_str(raw)
            .map_err(|e| PipelineError::InvalidInput(format!("model weights: {e}")))?;
        let finite = file.log_priors.iter().all(|p| p.is_finite())
            && file.tokens.values().flatten().all(|p| p.is_finite());
        if !finite || file.labels.iter().any(|l| l.trim().is_empty()) {
            return Err(PipelineError::InvalidInput(
                "model weights: labels must be non-empty and probabilities finite".into(),
            ));
        }
        Ok(Self { file })
    }

    pub fn from_path(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => PipelineError::NotFound(path.display().to_string()),
            _ => PipelineError::Io(e),
        })?;
        Self::from_json(&raw)
    }

    /// The weights compiled into the binary, parsed once per process.
    pub fn bundled() -> Arc<NaiveBayesModel> {
        BUNDLED.clone()
    }

    pub fn vocabulary_size(&self) -> usize {
        self.file.tokens.len()
    }
}

impl BinaryTextModel for NaiveBayesModel {
    fn name(&self) -> &str {
        &self.file.name
    }

    fn predict(&self, text: &str) -> Result<ModelPrediction> {
        let mut scores = self.file.log_priors;
        let tokens = text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
            .take(self.file.max_tokens);
        for tok in tokens {
            // unseen tokens carry no evidence
            if let Some(ll) = self.file.tokens.get(&tok.to_lowercase()) {
                scores[0] += ll[0];
                scores[1] += ll[1];
            }
        }

        // two-class softmax
        let max = scores[0].max(scores[1]);
        let e0 = (scores[0] - max).exp();
        let e1 = (scores[1] - max).exp();
        let p1 = e1 / (e0 + e1);
        let (idx, p) = if p1 >= 0.5 { (1, p1) } else { (0, 1.0 - p1) };
        Ok(ModelPrediction {
            label: self.file.labels[idx].clone(),
            score: p,
        })
    }
}

/// Weights from `settings.model_path`, or the bundled ones.
pub fn load_model(settings: &Settings) -> Result<Arc<dyn BinaryTextModel>> {
    let model: Arc<dyn BinaryTextModel> = match &settings.model_path {
        Some(p) => Arc::new(NaiveBayesModel::from_path(p)?),
        None => NaiveBayesModel::bundled(),
    };
    tracing::info!(model = model.name(), "sentiment model loaded");
    Ok(model)
}

#[derive(Clone)]
pub struct ModelClassifier {
    model: Arc<dyn BinaryTextModel>,
}

impl ModelClassifier {
    pub fn new(model: Arc<dyn BinaryTextModel>) -> Self {
        Self { model }
    }

    pub fn bundled() -> Self {
        Self::new(NaiveBayesModel::bundled())
    }
}

#[async_trait]
impl SentimentBackend for ModelClassifier {
    fn strategy(&self) -> Strategy {
        Strategy::Model
    }

    async fn score(&self, text: &str) -> Result<SentimentLabel> {
        let pred = self.model.predict(text)?;
        match pred.label.as_str() {
            "POSITIVE" => Ok(SentimentLabel::Positive),
            "NEGATIVE" => Ok(SentimentLabel::Negative),
            other => Err(PipelineError::ClassificationFailed(format!(
                "model {} returned unexpected label '{other}'",
                self.model.name()
            ))),
        }
    }
}

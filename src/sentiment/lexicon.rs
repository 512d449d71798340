// src/sentiment/lexicon.rs
//! Lexicon strategy: valence dictionary + a few heuristics, normalised to a
//! compound score in [-1, 1].

use async_trait::async_trait;
use once_cell::sync::Lazy;
use std::collections::HashMap;

use super::{SentimentBackend, SentimentLabel, Strategy};
use crate::error::Result;

static LEXICON: Lazy<HashMap<String, f64>> = Lazy::new(|| {
    let raw = include_str!("../../sentiment_lexicon.json");
    serde_json::from_str::<HashMap<String, f64>>(raw).expect("valid sentiment lexicon")
});

/// `compound >= 0.05` is positive, `<= -0.05` negative.
pub const POSITIVE_THRESHOLD: f64 = 0.05;
pub const NEGATIVE_THRESHOLD: f64 = -0.05;

const NEGATION_SCALAR: f64 = -0.74;
const BOOSTER_STEP: f64 = 0.293;
const CAPS_EMPHASIS: f64 = 0.733;
const EXCLAMATION_STEP: f64 = 0.292;
/// Normalisation constant: compound = sum / sqrt(sum^2 + ALPHA).
const ALPHA: f64 = 15.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PolarityScores {
    pub compound: f64,
    /// Raw valence sum before normalisation.
    pub sum: f64,
    /// Tokens found in the lexicon.
    pub hits: usize,
    pub tokens: usize,
}

#[derive(Debug, Clone, Default)]
pub struct LexiconAnalyzer;

impl LexiconAnalyzer {
    pub fn new() -> Self {
        Self
    }

    #[inline]
    fn word_valence(&self, w: &str) -> Option<f64> {
        LEXICON.get(w).copied()
    }

    pub fn polarity(&self, text: &str) -> PolarityScores {
        // Collected because negation and boosters look backwards.
        let raw: Vec<&str> = tokenize(text).collect();
        let lower: Vec<String> = raw.iter().map(|t| t.to_lowercase()).collect();

        // Shouting only counts when the rest of the text is not shouting too.
        let upper_count = raw.iter().filter(|t| is_shouted(t)).count();
        let caps_differential = upper_count > 0 && upper_count < raw.len();
        let but_at = lower.iter().position(|t| t == "but");

        let mut sum = 0.0;
        let mut hits = 0usize;

        for i in 0..lower.len() {
            let Some(base) = self.word_valence(&lower[i]) else {
                continue;
            };
            let mut v = base;

            if caps_differential && is_shouted(raw[i]) {
                v += CAPS_EMPHASIS * v.signum();
            }

            for k in 1..=3usize {
                if i < k {
                    break;
                }
                let b = booster(&lower[i - k]);
                if b == 0.0 {
                    continue;
                }
                let damp = match k {
                    1 => 1.0,
                    2 => 0.95,
                    _ => 0.9,
                };
                v += b * damp * v.signum();
            }

            let negated = (1..=3).any(|k| i >= k && is_negator(&lower[i - k]));
            if negated {
                v *= NEGATION_SCALAR;
            }

            if let Some(b) = but_at {
                if i < b {
                    v *= 0.5;
                } else if i > b {
                    v *= 1.5;
                }
            }

            sum += v;
            hits += 1;
        }

        if sum != 0.0 {
            let bangs = text.matches('!').count().min(4) as f64;
            sum += bangs * EXCLAMATION_STEP * sum.signum();
        }

        let compound = (sum / (sum * sum + ALPHA).sqrt()).clamp(-1.0, 1.0);
        PolarityScores {
            compound,
            sum,
            hits,
            tokens: raw.len(),
        }
    }

    pub fn label(&self, text: &str) -> SentimentLabel {
        label_for(self.polarity(text).compound)
    }
}

pub fn label_for(compound: f64) -> SentimentLabel {
    if compound >= POSITIVE_THRESHOLD {
        SentimentLabel::Positive
    } else if compound <= NEGATIVE_THRESHOLD {
        SentimentLabel::Negative
    } else {
        SentimentLabel::Neutral
    }
}

#[async_trait]
impl SentimentBackend for LexiconAnalyzer {
    fn strategy(&self) -> Strategy {
        Strategy::Lexicon
    }

    async fn score(&self, text: &str) -> Result<SentimentLabel> {
        Ok(self.label(text))
    }
}

/// Whitespace tokens with surrounding punctuation trimmed; inner apostrophes stay.
fn tokenize(s: &str) -> impl Iterator<Item = &str> + '_ {
    s.split_whitespace()
        .map(|t| t.trim_matches(|c: char| !c.is_alphanumeric()))
        .filter(|t| !t.is_empty())
}

fn is_shouted(tok: &str) -> bool {
    tok.chars().filter(|c| c.is_alphabetic()).count() > 1
        && tok.chars().all(|c| !c.is_lowercase())
}

fn is_negator(tok: &str) -> bool {
    tok.ends_with("n't")
        || matches!(
            tok,
            "not"
                | "no"
                | "never"
                | "cannot"
                | "without"
                | "nor"
                | "neither"
                | "nothing"
                | "nobody"
                | "none"
                | "nowhere"
                | "dont"
                | "doesnt"
                | "didnt"
                | "isnt"
                | "wasnt"
                | "arent"
                | "wont"
                | "cant"
                | "couldnt"
                | "shouldnt"
        )
}

/// Positive step for intensifiers, negative for dampeners, 0 otherwise.
fn booster(tok: &str) -> f64 {
    match tok {
        "very" | "extremely" | "really" | "so" | "most" | "highly" | "hugely" | "incredibly"
        | "remarkably" | "exceptionally" | "totally" | "utterly" | "absolutely" | "deeply"
        | "especially" | "greatly" | "tremendously" | "more" => BOOSTER_STEP,
        "barely" | "slightly" | "somewhat" | "hardly" | "marginally" | "partly" | "scarcely"
        | "less" | "little" | "occasionally" => -BOOSTER_STEP,
        _ => 0.0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn headline_examples() {
        let a = LexiconAnalyzer::new();
        assert_eq!(a.label("great news"), SentimentLabel::Positive);
        assert_eq!(a.label("terrible disaster"), SentimentLabel::Negative);
        assert_eq!(a.label("the sky is blue"), SentimentLabel::Neutral);
    }

    #[test]
    fn thresholds_are_inclusive() {
        assert_eq!(label_for(0.05), SentimentLabel::Positive);
        assert_eq!(label_for(-0.05), SentimentLabel::Negative);
        assert_eq!(label_for(0.049), SentimentLabel::Neutral);
        assert_eq!(label_for(-0.049), SentimentLabel::Neutral);
    }

    #[test]
    fn negation_flips_polarity() {
        let a = LexiconAnalyzer::new();
        assert_eq!(a.label("the outlook is good"), SentimentLabel::Positive);
        assert_eq!(a.label("the outlook is not good"), SentimentLabel::Negative);
        assert_eq!(a.label("the outlook isn't good"), SentimentLabel::Negative);
    }

    #[test]
    fn boosters_and_emphasis_raise_intensity() {
        let a = LexiconAnalyzer::new();
        let plain = a.polarity("a good result").compound;
        let boosted = a.polarity("a very good result").compound;
        let damped = a.polarity("a slightly good result").compound;
        let shouted = a.polarity("a GOOD result").compound;
        let bang = a.polarity("a good result!!").compound;
        assert!(boosted > plain);
        assert!(damped < plain);
        assert!(shouted > plain);
        assert!(bang > plain);
    }

    #[test]
    fn clause_after_but_dominates() {
        let a = LexiconAnalyzer::new();
        let s = a.polarity("the plan was good but the launch was a disaster");
        assert!(s.compound < 0.0, "{s:?}");
    }

    #[test]
    fn compound_stays_in_range() {
        let a = LexiconAnalyzer::new();
        let s = a.polarity("GREAT AMAZING WONDERFUL BEST victory triumph!!!!");
        assert!(s.compound <= 1.0 && s.compound > 0.9);
        assert_eq!(s.tokens, 6);
    }
}

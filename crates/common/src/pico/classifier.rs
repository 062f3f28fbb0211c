//! Token classification backends for PICO NER

use super::{PicoLabel, TokenPrediction};
use crate::config::PicoConfig;
use crate::errors::{AppError, Result};
use async_trait::async_trait;
use serde::Serialize;
use std::collections::HashMap;
use std::time::Duration;

/// Per-token label probabilities for a batch of texts
#[async_trait]
pub trait TokenClassifier: Send + Sync {
    async fn classify(&self, texts: &[String]) -> Result<Vec<Vec<TokenPrediction>>>;
}

/// SciBERT PICO adapter served over HTTP.
///
/// Request: `{"inputs": ["abstract", ...]}`. Response: one array per input
/// of `{"token", "probabilities", "offset": [start, end]}` with character
/// offsets into the input text.
pub struct HttpTokenClassifier {
    client: reqwest::Client,
    url: String,
}

#[derive(Serialize)]
struct ClassifyRequest<'a> {
    inputs: &'a [String],
}

impl HttpTokenClassifier {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }

    pub fn from_config(config: &PicoConfig) -> Result<Option<Self>> {
        match config.classifier_url.as_deref().filter(|u| !u.is_empty()) {
            Some(url) => Ok(Some(Self::new(url, Duration::from_secs(config.timeout_secs))?)),
            None => Ok(None),
        }
    }
}

#[async_trait]
impl TokenClassifier for HttpTokenClassifier {
    async fn classify(&self, texts: &[String]) -> Result<Vec<Vec<TokenPrediction>>> {
        let response = self
            .client
            .post(&self.url)
            .json(&ClassifyRequest { inputs: texts })
            .send()
            .await
            .map_err(|e| AppError::PicoModel {
                message: format!("Request failed: {}", e),
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::PicoModel {
                message: format!("Model service error {}: {}", status, body),
            });
        }

        let predictions: Vec<Vec<TokenPrediction>> =
            response.json().await.map_err(|e| AppError::PicoModel {
                message: format!("Failed to parse predictions: {}", e),
            })?;

        if predictions.len() != texts.len() {
            return Err(AppError::PicoModel {
                message: format!(
                    "Expected predictions for {} texts, received {}",
                    texts.len(),
                    predictions.len()
                ),
            });
        }

        Ok(predictions)
    }
}

/// Keyword lookup standing in for the model: whitespace tokens whose
/// lowercase form is a known keyword get that label with high confidence.
pub struct MockTokenClassifier {
    keywords: HashMap<String, PicoLabel>,
}

impl MockTokenClassifier {
    pub fn new(keywords: HashMap<String, PicoLabel>) -> Self {
        Self { keywords }
    }

    fn classify_one(&self, text: &str) -> Vec<TokenPrediction> {
        let mut tokens = vec![special_token("[CLS]")];

        let mut start = None;
        let chars: Vec<char> = text.chars().collect();
        for (idx, ch) in chars.iter().chain(std::iter::once(&' ')).enumerate() {
            match (ch.is_whitespace(), start) {
                (false, None) => start = Some(idx),
                (true, Some(s)) => {
                    let word: String = chars[s..idx].iter().collect();
                    let key = word
                        .trim_matches(|c: char| !c.is_alphanumeric())
                        .to_lowercase();
                    let label = self.keywords.get(&key).copied().unwrap_or(PicoLabel::O);
                    tokens.push(TokenPrediction {
                        token: word.to_lowercase(),
                        probabilities: confident(label),
                        offset: (s, idx),
                    });
                    start = None;
                }
                _ => {}
            }
        }

        tokens.push(special_token("[SEP]"));
        tokens
    }
}

impl Default for MockTokenClassifier {
    fn default() -> Self {
        let mut keywords = HashMap::new();
        for word in ["patients", "adults", "children", "participants", "women", "men"] {
            keywords.insert(word.to_string(), PicoLabel::Participant);
        }
        for word in ["aspirin", "placebo", "therapy", "treatment", "surgery", "exercise"] {
            keywords.insert(word.to_string(), PicoLabel::Intervention);
        }
        for word in ["mortality", "survival", "pain", "recovery", "bleeding"] {
            keywords.insert(word.to_string(), PicoLabel::Outcome);
        }
        Self::new(keywords)
    }
}

fn special_token(token: &str) -> TokenPrediction {
    TokenPrediction {
        token: token.to_string(),
        probabilities: confident(PicoLabel::O),
        offset: (0, 0),
    }
}

fn confident(label: PicoLabel) -> Vec<f32> {
    let mut probs = vec![0.02; PicoLabel::ALL.len()];
    probs[label.index()] = 0.94;
    probs
}

#[async_trait]
impl TokenClassifier for MockTokenClassifier {
    async fn classify(&self, texts: &[String]) -> Result<Vec<Vec<TokenPrediction>>> {
        Ok(texts.iter().map(|t| self.classify_one(t)).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_offsets_point_into_text() {
        let text = "Aspirin reduced mortality in adults.".to_string();
        let predictions = MockTokenClassifier::default()
            .classify(std::slice::from_ref(&text))
            .await
            .unwrap();

        let tokens = &predictions[0];
        assert_eq!(tokens.first().unwrap().token, "[CLS]");
        assert_eq!(tokens.last().unwrap().token, "[SEP]");

        let aspirin = &tokens[1];
        assert_eq!(aspirin.offset, (0, 7));
        assert_eq!(aspirin.argmax(), PicoLabel::Intervention);

        let adults = tokens.iter().find(|t| t.token == "adults.").unwrap();
        assert_eq!(adults.argmax(), PicoLabel::Participant);
    }

    #[test]
    fn test_missing_url_gives_no_classifier() {
        let config = PicoConfig::default();
        assert!(HttpTokenClassifier::from_config(&config).unwrap().is_none());
    }
}

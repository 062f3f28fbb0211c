//! PICO metadata extraction
//!
//! A token classifier labels abstract tokens as participant, intervention
//! or outcome. Labelled tokens are stitched back into terms (WordPiece
//! continuations included), cleaned, and optionally rewritten by the LLM
//! into one sentence per PICO field.

mod classifier;

pub use classifier::{HttpTokenClassifier, MockTokenClassifier, TokenClassifier};

use crate::errors::Result;
use crate::llm::{complete_tracked, prompts, LlmClient};
use regex_lite::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, instrument, warn};

/// Tokens that never make a term
const SPECIAL_TOKENS: [&str; 3] = ["[PAD]", "[CLS]", "[SEP]"];

/// Terms must be longer than this
const MIN_TERM_CHARS: usize = 2;

/// Model label set, indexed as the classifier emits probabilities
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PicoLabel {
    O,
    Intervention,
    Outcome,
    Participant,
}

impl PicoLabel {
    pub const ALL: [PicoLabel; 4] = [
        PicoLabel::O,
        PicoLabel::Intervention,
        PicoLabel::Outcome,
        PicoLabel::Participant,
    ];

    pub fn from_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }

    pub fn index(&self) -> usize {
        match self {
            PicoLabel::O => 0,
            PicoLabel::Intervention => 1,
            PicoLabel::Outcome => 2,
            PicoLabel::Participant => 3,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PicoLabel::O => "O",
            PicoLabel::Intervention => "I-INT",
            PicoLabel::Outcome => "I-OUT",
            PicoLabel::Participant => "I-PAR",
        }
    }
}

/// Classifier output for one token
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenPrediction {
    pub token: String,
    pub probabilities: Vec<f32>,
    /// Character span in the source text
    pub offset: (usize, usize),
}

impl TokenPrediction {
    /// Most probable label, ignoring the threshold
    pub fn argmax(&self) -> PicoLabel {
        self.best().0
    }

    fn best(&self) -> (PicoLabel, f32) {
        self.probabilities
            .iter()
            .enumerate()
            .filter_map(|(i, p)| PicoLabel::from_index(i).map(|label| (label, *p)))
            .fold((PicoLabel::O, f32::MIN), |best, cur| if cur.1 > best.1 { cur } else { best })
    }
}

/// Argmax label per token, or O when its probability is under `threshold`
pub fn apply_threshold(predictions: &[TokenPrediction], threshold: f32) -> Vec<PicoLabel> {
    predictions
        .iter()
        .map(|p| {
            let (label, prob) = p.best();
            if prob >= threshold {
                label
            } else {
                PicoLabel::O
            }
        })
        .collect()
}

/// Group labelled tokens into terms per label.
///
/// A `##` continuation is glued onto the last term of its label; any other
/// non-O token starts a new term read from `text` at its offsets.
pub fn extract_terms(
    text: &str,
    tokens: &[TokenPrediction],
    labels: &[PicoLabel],
) -> HashMap<PicoLabel, Vec<String>> {
    let mut extracted: HashMap<PicoLabel, Vec<String>> =
        PicoLabel::ALL.iter().map(|l| (*l, Vec::new())).collect();

    for (token, label) in tokens.iter().zip(labels) {
        if let Some(piece) = token.token.strip_prefix("##") {
            if let Some(last) = extracted.get_mut(label).and_then(|terms| terms.last_mut()) {
                last.push_str(piece);
            }
            continue;
        }

        if *label == PicoLabel::O {
            continue;
        }

        let (start, end) = token.offset;
        let term = if end > start {
            char_slice(text, start, end).trim().to_string()
        } else {
            token.token.trim().to_string()
        };

        extracted.entry(*label).or_default().push(term);
    }

    extracted
}

fn char_slice(text: &str, start: usize, end: usize) -> String {
    text.chars().skip(start).take(end - start).collect()
}

/// Cleaned NER terms per PICO field. Comparison has no NER label and
/// stays empty until enhancement.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PicoTerms {
    pub pico_p: Vec<String>,
    pub pico_i: Vec<String>,
    pub pico_c: Vec<String>,
    pub pico_o: Vec<String>,
}

impl PicoTerms {
    pub fn is_empty(&self) -> bool {
        self.pico_p.is_empty()
            && self.pico_i.is_empty()
            && self.pico_c.is_empty()
            && self.pico_o.is_empty()
    }

    /// Terms joined with `"; "`, `None` when there are none
    pub fn joined(terms: &[String]) -> Option<String> {
        if terms.is_empty() {
            None
        } else {
            Some(terms.join("; "))
        }
    }

    /// Dict-style rendering used inside the enhancement prompt
    pub fn render(&self) -> String {
        let list = |terms: &[String]| {
            terms
                .iter()
                .map(|t| format!("'{}'", t.replace('\'', "\\'")))
                .collect::<Vec<_>>()
                .join(", ")
        };

        let mut parts = Vec::new();
        for (key, terms) in [
            ("pico_p", &self.pico_p),
            ("pico_i", &self.pico_i),
            ("pico_c", &self.pico_c),
            ("pico_o", &self.pico_o),
        ] {
            if !terms.is_empty() {
                parts.push(format!("'{}': [{}]", key, list(terms)));
            }
        }
        format!("{{{}}}", parts.join(", "))
    }
}

/// Strip special tokens, trim, keep terms longer than two characters and
/// deduplicate in order. PAR → pico_p, INT → pico_i, OUT → pico_o.
pub fn clean_terms(extracted: &HashMap<PicoLabel, Vec<String>>) -> PicoTerms {
    let clean = |label: PicoLabel| -> Vec<String> {
        let mut out: Vec<String> = Vec::new();
        for term in extracted.get(&label).into_iter().flatten() {
            let mut term = term.clone();
            for special in SPECIAL_TOKENS {
                term = term.replace(special, "");
            }
            let term = term.trim().to_string();
            if term.chars().count() > MIN_TERM_CHARS && !out.contains(&term) {
                out.push(term);
            }
        }
        out
    };

    PicoTerms {
        pico_p: clean(PicoLabel::Participant),
        pico_i: clean(PicoLabel::Intervention),
        pico_c: Vec::new(),
        pico_o: clean(PicoLabel::Outcome),
    }
}

/// One generated sentence per PICO field
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PicoFields {
    pub pico_p: Option<String>,
    pub pico_i: Option<String>,
    pub pico_c: Option<String>,
    pub pico_o: Option<String>,
}

impl PicoFields {
    pub fn is_empty(&self) -> bool {
        self.pico_p.is_none() && self.pico_i.is_none() && self.pico_c.is_none() && self.pico_o.is_none()
    }
}

pub fn enhancement_prompt(terms: &PicoTerms, abstract_text: &str) -> String {
    prompts::pico_enhancement(&terms.render(), abstract_text)
}

/// Read the LLM's dict reply: JSON first, then `'key': 'value'` pairs
pub fn parse_enhancement(text: &str) -> PicoFields {
    if let Some(fields) = parse_enhancement_json(text) {
        return fields;
    }

    let extract = |key: &str| -> Option<String> {
        let pattern = format!(r"'{}':\s*'(.*?)'", key);
        let re = Regex::new(&pattern).ok()?;
        re.captures(text)
            .and_then(|c| c.get(1))
            .map(|m| m.as_str().replace("\\'", "'"))
    };

    PicoFields {
        pico_p: extract("pico_p"),
        pico_i: extract("pico_i"),
        pico_c: extract("pico_c"),
        pico_o: extract("pico_o"),
    }
}

fn parse_enhancement_json(text: &str) -> Option<PicoFields> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    if end <= start {
        return None;
    }

    let value: serde_json::Value = serde_json::from_str(&text[start..=end]).ok()?;
    let obj = value.as_object()?;
    let get = |key: &str| {
        obj.get(key)
            .and_then(|v| v.as_str())
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
    };

    Some(PicoFields {
        pico_p: get("pico_p"),
        pico_i: get("pico_i"),
        pico_c: get("pico_c"),
        pico_o: get("pico_o"),
    })
}

/// Classifier plus optional LLM enhancement
pub struct PicoExtractor {
    classifier: Arc<dyn TokenClassifier>,
    llm: Option<Arc<dyn LlmClient>>,
    threshold: f32,
}

impl PicoExtractor {
    pub fn new(
        classifier: Arc<dyn TokenClassifier>,
        llm: Option<Arc<dyn LlmClient>>,
        threshold: f32,
    ) -> Self {
        Self {
            classifier,
            llm,
            threshold,
        }
    }

    /// Terms and, with an LLM configured, enhanced sentences per text
    #[instrument(skip(self, texts), fields(count = texts.len(), enhance = self.llm.is_some()))]
    pub async fn process(&self, texts: &[String]) -> Result<Vec<(PicoTerms, Option<PicoFields>)>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let predictions = self.classifier.classify(texts).await?;
        let mut results = Vec::with_capacity(texts.len());

        for (text, tokens) in texts.iter().zip(predictions) {
            let labels = apply_threshold(&tokens, self.threshold);
            let terms = clean_terms(&extract_terms(text, &tokens, &labels));
            debug!(
                participants = terms.pico_p.len(),
                interventions = terms.pico_i.len(),
                outcomes = terms.pico_o.len(),
                "Terms extracted"
            );

            let enhanced = match &self.llm {
                Some(llm) => self.enhance(llm.as_ref(), &terms, text).await,
                None => None,
            };

            results.push((terms, enhanced));
        }

        metrics::counter!(crate::metrics::names::PICO_EXTRACTIONS).increment(texts.len() as u64);
        Ok(results)
    }

    async fn enhance(&self, llm: &dyn LlmClient, terms: &PicoTerms, text: &str) -> Option<PicoFields> {
        let prompt = enhancement_prompt(terms, text);
        match complete_tracked(llm, "pico_enhancement", &prompt).await {
            Ok(reply) => Some(parse_enhancement(&reply)).filter(|f| !f.is_empty()),
            Err(e) => {
                warn!(error = %e, "PICO enhancement failed, keeping raw terms only");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::MockLlm;

    fn tok(token: &str, label: PicoLabel, prob: f32, offset: (usize, usize)) -> TokenPrediction {
        let mut probabilities = vec![(1.0 - prob) / 3.0; 4];
        probabilities[label.index()] = prob;
        TokenPrediction {
            token: token.to_string(),
            probabilities,
            offset,
        }
    }

    #[test]
    fn test_threshold_demotes_uncertain_tokens() {
        let preds = vec![
            tok("aspirin", PicoLabel::Intervention, 0.9, (0, 7)),
            tok("maybe", PicoLabel::Outcome, 0.6, (8, 13)),
            tok("adults", PicoLabel::Participant, 0.7, (14, 20)),
        ];
        assert_eq!(
            apply_threshold(&preds, 0.7),
            vec![PicoLabel::Intervention, PicoLabel::O, PicoLabel::Participant]
        );
    }

    #[test]
    fn test_wordpiece_merges_into_last_term() {
        let text = "hypertension in adults";
        let tokens = vec![
            tok("[CLS]", PicoLabel::O, 0.99, (0, 0)),
            tok("hyper", PicoLabel::Participant, 0.9, (0, 5)),
            tok("##tension", PicoLabel::Participant, 0.9, (5, 12)),
            tok("in", PicoLabel::O, 0.99, (13, 15)),
            tok("adults", PicoLabel::Participant, 0.9, (16, 22)),
            tok("##ish", PicoLabel::Outcome, 0.9, (22, 22)),
        ];
        let labels = apply_threshold(&tokens, 0.7);
        let extracted = extract_terms(text, &tokens, &labels);

        assert_eq!(extracted[&PicoLabel::Participant], vec!["hypertension", "adults"]);
        // continuation with no open term of its label is dropped
        assert!(extracted[&PicoLabel::Outcome].is_empty());
    }

    #[test]
    fn test_offsets_are_characters() {
        let text = "éé aspirin";
        let tokens = vec![tok("aspirin", PicoLabel::Intervention, 0.9, (3, 10))];
        let extracted = extract_terms(text, &tokens, &[PicoLabel::Intervention]);
        assert_eq!(extracted[&PicoLabel::Intervention], vec!["aspirin"]);
    }

    #[test]
    fn test_clean_terms() {
        let mut extracted = HashMap::new();
        extracted.insert(
            PicoLabel::Participant,
            vec!["[CLS] adults".into(), "adults".into(), "ab".into(), " [SEP] ".into()],
        );
        extracted.insert(PicoLabel::Intervention, vec!["aspirin".into()]);
        extracted.insert(PicoLabel::Outcome, vec!["mortality".into(), "mortality".into()]);
        extracted.insert(PicoLabel::O, vec!["ignored".into()]);

        let terms = clean_terms(&extracted);
        assert_eq!(terms.pico_p, vec!["adults"]);
        assert_eq!(terms.pico_i, vec!["aspirin"]);
        assert_eq!(terms.pico_o, vec!["mortality"]);
        assert!(terms.pico_c.is_empty());
        assert_eq!(PicoTerms::joined(&terms.pico_p).as_deref(), Some("adults"));
        assert_eq!(PicoTerms::joined(&terms.pico_c), None);
    }

    #[test]
    fn test_render_terms() {
        let terms = PicoTerms {
            pico_p: vec!["adults".into()],
            pico_i: vec!["aspirin".into(), "low dose".into()],
            ..Default::default()
        };
        assert_eq!(terms.render(), "{'pico_p': ['adults'], 'pico_i': ['aspirin', 'low dose']}");
    }

    #[test]
    fn test_parse_enhancement_json() {
        let reply = r#"Here you go: {"pico_p": "Adults with hypertension", "pico_i": "Low-dose aspirin", "pico_o": "Stroke incidence"}"#;
        let fields = parse_enhancement(reply);
        assert_eq!(fields.pico_p.as_deref(), Some("Adults with hypertension"));
        assert_eq!(fields.pico_o.as_deref(), Some("Stroke incidence"));
        assert_eq!(fields.pico_c, None);
    }

    #[test]
    fn test_parse_enhancement_python_dict() {
        let reply = "{'pico_i': 'Aspirin given daily', 'pico_p': 'Patients aged 50', \
                     'pico_o': 'Fewer strokes', 'pico_c': 'Placebo'}";
        let fields = parse_enhancement(reply);
        assert_eq!(fields.pico_i.as_deref(), Some("Aspirin given daily"));
        assert_eq!(fields.pico_p.as_deref(), Some("Patients aged 50"));
        assert_eq!(fields.pico_c.as_deref(), Some("Placebo"));
    }

    #[test]
    fn test_parse_enhancement_garbage() {
        assert!(parse_enhancement("no structure here").is_empty());
    }

    #[tokio::test]
    async fn test_extractor_with_enhancement() {
        let llm = MockLlm::with_response(
            "{'pico_p': 'Adults', 'pico_i': 'Aspirin', 'pico_o': 'Mortality', 'pico_c': 'Placebo'}",
        );
        let extractor = PicoExtractor::new(
            Arc::new(MockTokenClassifier::default()),
            Some(Arc::new(llm)),
            0.7,
        );

        let texts = vec!["Aspirin lowered mortality in adults compared with placebo.".to_string()];
        let results = extractor.process(&texts).await.unwrap();

        let (terms, enhanced) = &results[0];
        assert_eq!(terms.pico_p, vec!["adults"]);
        assert_eq!(terms.pico_i, vec!["Aspirin", "placebo."]);
        assert_eq!(terms.pico_o, vec!["mortality"]);
        assert_eq!(enhanced.as_ref().and_then(|f| f.pico_c.as_deref()), Some("Placebo"));
    }

    #[tokio::test]
    async fn test_extractor_without_llm() {
        let extractor = PicoExtractor::new(Arc::new(MockTokenClassifier::default()), None, 0.7);
        let results = extractor
            .process(&["Exercise improved recovery.".to_string()])
            .await
            .unwrap();
        assert_eq!(results[0].0.pico_i, vec!["Exercise"]);
        assert!(results[0].1.is_none());
    }
}

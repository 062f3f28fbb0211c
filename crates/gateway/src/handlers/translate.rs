//! Plain-language to search-notation translation

use axum::{extract::State, Json};
use serde::Serialize;
use serde_json::{Map, Value};
use tracing::warn;

use crate::AppState;
use litfunnel_common::{
    errors::{AppError, Result},
    llm::{complete_tracked, prompts},
};

pub const DECODE_FAILURE: &str =
    "Failed to decode JSON from ChatGPT response. Please try again.";

#[derive(Debug, Serialize)]
pub struct TranslateResponse {
    pub original_terms: Map<String, Value>,
    pub scientific_notation: Map<String, Value>,
}

pub async fn translate_terms(
    State(state): State<AppState>,
    Json(terms): Json<Map<String, Value>>,
) -> Result<Json<TranslateResponse>> {
    let Some(first_key) = terms.keys().next().cloned() else {
        return Err(AppError::validation("No terms to translate", Some("terms")));
    };

    let pairs: Vec<(String, String)> = terms
        .iter()
        .map(|(k, v)| {
            let value = match v {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            (k.clone(), value)
        })
        .collect();

    let prompt = prompts::translate_terms(&pairs);
    let reply = complete_tracked(state.llm.as_ref(), "translate_terms", &prompt).await?;

    Ok(Json(TranslateResponse {
        scientific_notation: parse_translation(&reply, &first_key),
        original_terms: terms,
    }))
}

/// Whole reply as a JSON object, then its outermost `{...}` span, then a
/// failure message keyed by the first term
pub fn parse_translation(reply: &str, first_key: &str) -> Map<String, Value> {
    if let Ok(Value::Object(map)) = serde_json::from_str::<Value>(reply.trim()) {
        return map;
    }

    let span = match (reply.find('{'), reply.rfind('}')) {
        (Some(start), Some(end)) if end > start => Some(&reply[start..=end]),
        _ => None,
    };
    if let Some(Ok(Value::Object(map))) = span.map(serde_json::from_str::<Value>) {
        return map;
    }

    warn!("Translation reply was not valid JSON");
    let mut fallback = Map::new();
    fallback.insert(first_key.to_string(), Value::String(DECODE_FAILURE.to_string()));
    fallback
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::test_support;
    use litfunnel_common::llm::MockLlm;
    use std::sync::Arc;

    #[test]
    fn test_parse_whole_reply() {
        let map = parse_translation(r#"{"P (Population)": "age>=25/class=Adult.tw."}"#, "x");
        assert_eq!(map["P (Population)"], "age>=25/class=Adult.tw.");
    }

    #[test]
    fn test_parse_embedded_object() {
        let reply = "Sure! Here it is:\n```json\n{\"O (Outcome)\": \"exp Stroke/\"}\n```";
        let map = parse_translation(reply, "x");
        assert_eq!(map["O (Outcome)"], "exp Stroke/");
    }

    #[test]
    fn test_parse_failure_uses_first_key() {
        let map = parse_translation("{'single': 'quotes'}", "Year of Publication");
        assert_eq!(map.len(), 1);
        assert_eq!(map["Year of Publication"], DECODE_FAILURE);
    }

    #[tokio::test]
    async fn test_empty_terms_rejected() {
        let err = translate_terms(State(test_support::state()), Json(Map::new()))
            .await
            .unwrap_err();
        assert_eq!(err.status_code(), axum::http::StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_translate_round_trip() {
        let llm = MockLlm::with_response(r#"{"I (Intervention)": "exp Aspirin/"}"#);
        let state = test_support::state_with_llm(Arc::new(llm));

        let mut terms = Map::new();
        terms.insert("I (Intervention)".into(), Value::String("Aspirin".into()));

        let Json(response) = translate_terms(State(state), Json(terms)).await.unwrap();
        assert_eq!(response.scientific_notation["I (Intervention)"], "exp Aspirin/");
        assert_eq!(response.original_terms["I (Intervention)"], "Aspirin");
    }

    #[tokio::test]
    async fn test_fallback_keys_follow_request_order() {
        let state = test_support::state_with_llm(Arc::new(MockLlm::with_response("not json")));
        let terms: Map<String, Value> =
            serde_json::from_str(r#"{"Year of Publication": "2020", "Author": "Smith"}"#).unwrap();

        let Json(response) = translate_terms(State(state), Json(terms)).await.unwrap();

        let fallback: Vec<&str> = response.scientific_notation.keys().map(String::as_str).collect();
        assert_eq!(fallback, vec!["Year of Publication"]);
        assert_eq!(response.scientific_notation["Year of Publication"], DECODE_FAILURE);

        let original: Vec<&str> = response.original_terms.keys().map(String::as_str).collect();
        assert_eq!(original, vec!["Year of Publication", "Author"]);
    }
}

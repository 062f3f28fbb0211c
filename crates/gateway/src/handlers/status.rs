//! Review funnel handlers

use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::info;

use crate::AppState;
use litfunnel_common::{
    db::{models::{FunnelStage, SearchResult}, FunnelCount},
    errors::{AppError, Result},
};

#[derive(Debug, Deserialize)]
pub struct StatusParams {
    #[serde(default)]
    pub archived: bool,
}

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub status: FunnelStage,
    pub records: Vec<SearchResult>,
    pub funnel_count: BTreeMap<String, FunnelCount>,
}

#[derive(Debug, Serialize)]
pub struct UpdateStatusResponse {
    pub message: String,
    pub document_ids: Vec<i64>,
    pub new_status: FunnelStage,
    pub updated: Vec<SearchResult>,
}

#[derive(Debug, Serialize)]
pub struct ArchiveResponse {
    pub message: String,
    pub document_id: i64,
    pub new_archived_status: bool,
}

/// Results at one stage plus the whole funnel's counts
pub async fn get_status(
    State(state): State<AppState>,
    Path((project_id, status)): Path<(i32, String)>,
    Query(params): Query<StatusParams>,
) -> Result<Json<StatusResponse>> {
    let stage: FunnelStage = status.parse()?;
    let operations = state.operations();

    let records = operations
        .results_by_stage(project_id, stage, params.archived)
        .await?;
    let funnel_count = operations.funnel_counts(project_id).await?;

    Ok(Json(StatusResponse {
        status: stage,
        records,
        funnel_count,
    }))
}

pub async fn update_status(
    State(state): State<AppState>,
    Path((project_id, document_ids, status)): Path<(i32, String, String)>,
) -> Result<Json<UpdateStatusResponse>> {
    let ids = parse_document_ids(&document_ids)?;
    let stage: FunnelStage = status.parse()?;

    let updated = state.operations().update_stage(project_id, &ids, stage).await?;
    if updated.is_empty() {
        return Err(AppError::not_found("Documents", document_ids));
    }

    info!(project_id, count = updated.len(), stage = %stage, "Funnel stage updated");

    Ok(Json(UpdateStatusResponse {
        message: "Status updated successfully".to_string(),
        document_ids: ids,
        new_status: stage,
        updated,
    }))
}

pub async fn archive(
    State(state): State<AppState>,
    Path((project_id, document_id, is_archived)): Path<(i32, i64, bool)>,
) -> Result<Json<ArchiveResponse>> {
    let matched = state
        .operations()
        .set_archived(project_id, document_id, is_archived)
        .await?;

    if matched == 0 {
        return Err(AppError::DocumentNotFound {
            id: document_id.to_string(),
        });
    }

    info!(project_id, document_id, is_archived, "Archived flag updated");

    Ok(Json(ArchiveResponse {
        message: "Archived status updated successfully".to_string(),
        document_id,
        new_archived_status: is_archived,
    }))
}

/// Comma-separated integer ids; anything else is a validation error
fn parse_document_ids(raw: &str) -> Result<Vec<i64>> {
    let ids = raw
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            s.parse::<i64>().map_err(|_| {
                AppError::validation(format!("Invalid document id '{}'", s), Some("document_ids"))
            })
        })
        .collect::<Result<Vec<_>>>()?;

    if ids.is_empty() {
        return Err(AppError::validation("No document ids given", Some("document_ids")));
    }
    Ok(ids)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;

    #[test]
    fn test_parse_document_ids() {
        assert_eq!(parse_document_ids("1, 2,3").unwrap(), vec![1, 2, 3]);
        assert_eq!(parse_document_ids("16625675,").unwrap(), vec![16625675]);

        let err = parse_document_ids("1,abc").unwrap_err();
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
        assert!(parse_document_ids(" , ").is_err());
    }

    #[test]
    fn test_status_params_default_excludes_archived() {
        let params: StatusParams = serde_json::from_str("{}").unwrap();
        assert!(!params.archived);
    }

    #[test]
    fn test_response_serializes_stored_stage() {
        let response = ArchiveResponse {
            message: "ok".into(),
            document_id: 7,
            new_archived_status: true,
        };
        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json["new_archived_status"], true);

        let json = serde_json::to_value(FunnelStage::Sought).unwrap();
        assert_eq!(json, "Sought Retrieval");
    }
}

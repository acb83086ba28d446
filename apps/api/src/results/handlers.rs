use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde::Deserialize;

use crate::errors::AppError;
use crate::models::resume::ResumeResultRow;
use crate::results::reconcile::ReconciliationReport;
use crate::results::service::ResumeResultService;
use crate::results::translate::CanonicalResult;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct UpsertRequest {
    pub hash: String,
    /// Evaluation in analyser notation. Absent while the analysis is pending.
    #[serde(default)]
    pub raw_results: Option<String>,
    pub job_id: i64,
    pub owner_id: i64,
}

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    pub job_id: Option<i64>,
    pub owner_id: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct PairQuery {
    pub job_id: i64,
    pub owner_id: i64,
}

/// POST /api/v1/resumes
pub async fn handle_upsert(
    State(state): State<AppState>,
    Json(req): Json<UpsertRequest>,
) -> Result<Json<ResumeResultRow>, AppError> {
    let record = state
        .results
        .upsert(&req.hash, req.raw_results.as_deref(), req.job_id, req.owner_id)
        .await?;
    Ok(Json(record))
}

/// GET /api/v1/resumes?job_id=&owner_id=
pub async fn handle_list(
    State(state): State<AppState>,
    Query(params): Query<ListQuery>,
) -> Result<Json<Vec<ResumeResultRow>>, AppError> {
    let records = match (params.job_id, params.owner_id) {
        (Some(job_id), Some(owner_id)) => {
            state.results.list_by_job_and_owner(job_id, owner_id).await?
        }
        (Some(job_id), None) => state.results.list_by_job(job_id).await?,
        (None, Some(owner_id)) => state.results.list_by_owner(owner_id).await?,
        (None, None) => {
            return Err(AppError::Validation(
                "job_id or owner_id is required".to_string(),
            ))
        }
    };
    Ok(Json(records))
}

/// GET /api/v1/resumes/latest?job_id=&owner_id=
pub async fn handle_latest(
    State(state): State<AppState>,
    Query(params): Query<PairQuery>,
) -> Result<Json<ResumeResultRow>, AppError> {
    state
        .results
        .latest_for_job_and_owner(params.job_id, params.owner_id)
        .await?
        .map(Json)
        .ok_or_else(|| {
            AppError::NotFound(format!(
                "No resume for job {} and owner {}",
                params.job_id, params.owner_id
            ))
        })
}

/// GET /api/v1/resumes/hash/:hash
pub async fn handle_get_by_hash(
    State(state): State<AppState>,
    Path(hash): Path<String>,
) -> Result<Json<ResumeResultRow>, AppError> {
    find(&state, &hash).await.map(Json)
}

/// GET /api/v1/resumes/hash/:hash/results
pub async fn handle_get_results(
    State(state): State<AppState>,
    Path(hash): Path<String>,
) -> Result<Json<CanonicalResult>, AppError> {
    let record = find(&state, &hash).await?;
    Ok(Json(ResumeResultService::parsed_results(&record)))
}

/// POST /api/v1/resumes/reconcile
pub async fn handle_reconcile(
    State(state): State<AppState>,
) -> Result<Json<ReconciliationReport>, AppError> {
    Ok(Json(state.reconciler.run().await?))
}

async fn find(state: &AppState, hash: &str) -> Result<ResumeResultRow, AppError> {
    state
        .results
        .get_by_hash(hash)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Resume {hash} not found")))
}

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::FromRow;

/// One stored resume evaluation, keyed by the hash of the resume content.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct ResumeResultRow {
    pub id: i64,
    pub resume_hash: String,
    /// Canonical evaluation (category -> attribute -> value). `None` until
    /// an evaluation has been produced.
    pub results: Option<Value>,
    pub job_id: i64,
    pub owner_id: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Insert parameters for a record whose hash has not been seen yet.
#[derive(Debug, Clone)]
pub struct NewResumeResult {
    pub resume_hash: String,
    pub results: Option<Value>,
    pub job_id: i64,
    pub owner_id: i64,
}

/// A (job, owner) pair holding more than one record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, FromRow)]
pub struct DuplicateGroup {
    pub job_id: i64,
    pub owner_id: i64,
    pub record_count: i64,
}

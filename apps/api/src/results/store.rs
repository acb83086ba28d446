//! Persistence for resume results.
//!
//! `ResultStore` is the seam between the result service and the database.
//! `AppState` carries it as `Arc<dyn ResultStore>`; production uses
//! `PgResultStore`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::PgPool;
use tracing::debug;

use crate::errors::AppError;
use crate::models::resume::{DuplicateGroup, NewResumeResult, ResumeResultRow};

#[async_trait]
pub trait ResultStore: Send + Sync {
    async fn find_by_hash(&self, hash: &str) -> Result<Option<ResumeResultRow>, AppError>;

    /// Inserts a new record. Returns `None` when another record already owns
    /// the hash; nothing is written in that case.
    async fn insert(&self, new: NewResumeResult) -> Result<Option<ResumeResultRow>, AppError>;

    /// Overwrites the stored result and bumps `updated_at`. Returns `None`
    /// when the record no longer exists.
    async fn update_results(
        &self,
        id: i64,
        results: &Value,
    ) -> Result<Option<ResumeResultRow>, AppError>;

    async fn list_by_job(&self, job_id: i64) -> Result<Vec<ResumeResultRow>, AppError>;

    async fn list_by_owner(&self, owner_id: i64) -> Result<Vec<ResumeResultRow>, AppError>;

    async fn list_by_job_and_owner(
        &self,
        job_id: i64,
        owner_id: i64,
    ) -> Result<Vec<ResumeResultRow>, AppError>;

    /// Full table scan. Expensive; reconciliation only.
    async fn list_all(&self) -> Result<Vec<ResumeResultRow>, AppError>;

    async fn count_all(&self) -> Result<i64, AppError>;

    /// (job, owner) pairs with more than one record.
    async fn duplicate_groups(&self) -> Result<Vec<DuplicateGroup>, AppError>;

    /// Deletes the given records in one statement. A record is only removed
    /// if its `updated_at` still matches the snapshot passed in. Returns the
    /// ids actually removed.
    async fn delete_many(&self, records: &[ResumeResultRow]) -> Result<Vec<i64>, AppError>;
}

const COLUMNS: &str = "id, resume_hash, results, job_id, owner_id, created_at, updated_at";

/// PostgreSQL-backed result store over the `resume_results` table.
#[derive(Clone)]
pub struct PgResultStore {
    pool: PgPool,
}

impl PgResultStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ResultStore for PgResultStore {
    async fn find_by_hash(&self, hash: &str) -> Result<Option<ResumeResultRow>, AppError> {
        Ok(sqlx::query_as::<_, ResumeResultRow>(&format!(
            "SELECT {COLUMNS} FROM resume_results WHERE resume_hash = $1"
        ))
        .bind(hash)
        .fetch_optional(&self.pool)
        .await?)
    }

    async fn insert(&self, new: NewResumeResult) -> Result<Option<ResumeResultRow>, AppError> {
        // The unique constraint on resume_hash arbitrates concurrent creators;
        // the loser gets no row back.
        let row = sqlx::query_as::<_, ResumeResultRow>(&format!(
            r#"
            INSERT INTO resume_results (resume_hash, results, job_id, owner_id)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (resume_hash) DO NOTHING
            RETURNING {COLUMNS}
            "#
        ))
        .bind(&new.resume_hash)
        .bind(&new.results)
        .bind(new.job_id)
        .bind(new.owner_id)
        .fetch_optional(&self.pool)
        .await?;

        if row.is_none() {
            debug!("Insert for hash {} lost to an existing record", new.resume_hash);
        }
        Ok(row)
    }

    async fn update_results(
        &self,
        id: i64,
        results: &Value,
    ) -> Result<Option<ResumeResultRow>, AppError> {
        Ok(sqlx::query_as::<_, ResumeResultRow>(&format!(
            r#"
            UPDATE resume_results
            SET results = $2, updated_at = NOW()
            WHERE id = $1
            RETURNING {COLUMNS}
            "#
        ))
        .bind(id)
        .bind(results)
        .fetch_optional(&self.pool)
        .await?)
    }

    async fn list_by_job(&self, job_id: i64) -> Result<Vec<ResumeResultRow>, AppError> {
        Ok(sqlx::query_as::<_, ResumeResultRow>(&format!(
            "SELECT {COLUMNS} FROM resume_results WHERE job_id = $1 ORDER BY id ASC"
        ))
        .bind(job_id)
        .fetch_all(&self.pool)
        .await?)
    }

    async fn list_by_owner(&self, owner_id: i64) -> Result<Vec<ResumeResultRow>, AppError> {
        Ok(sqlx::query_as::<_, ResumeResultRow>(&format!(
            "SELECT {COLUMNS} FROM resume_results WHERE owner_id = $1 ORDER BY id ASC"
        ))
        .bind(owner_id)
        .fetch_all(&self.pool)
        .await?)
    }

    async fn list_by_job_and_owner(
        &self,
        job_id: i64,
        owner_id: i64,
    ) -> Result<Vec<ResumeResultRow>, AppError> {
        Ok(sqlx::query_as::<_, ResumeResultRow>(&format!(
            "SELECT {COLUMNS} FROM resume_results WHERE job_id = $1 AND owner_id = $2 ORDER BY id ASC"
        ))
        .bind(job_id)
        .bind(owner_id)
        .fetch_all(&self.pool)
        .await?)
    }

    async fn list_all(&self) -> Result<Vec<ResumeResultRow>, AppError> {
        Ok(sqlx::query_as::<_, ResumeResultRow>(&format!(
            "SELECT {COLUMNS} FROM resume_results ORDER BY id ASC"
        ))
        .fetch_all(&self.pool)
        .await?)
    }

    async fn count_all(&self) -> Result<i64, AppError> {
        Ok(sqlx::query_scalar("SELECT COUNT(*) FROM resume_results")
            .fetch_one(&self.pool)
            .await?)
    }

    async fn duplicate_groups(&self) -> Result<Vec<DuplicateGroup>, AppError> {
        Ok(sqlx::query_as::<_, DuplicateGroup>(
            r#"
            SELECT job_id, owner_id, COUNT(*) AS record_count
            FROM resume_results
            GROUP BY job_id, owner_id
            HAVING COUNT(*) > 1
            ORDER BY job_id, owner_id
            "#,
        )
        .fetch_all(&self.pool)
        .await?)
    }

    async fn delete_many(&self, records: &[ResumeResultRow]) -> Result<Vec<i64>, AppError> {
        if records.is_empty() {
            return Ok(Vec::new());
        }

        let ids: Vec<i64> = records.iter().map(|r| r.id).collect();
        let stamps: Vec<DateTime<Utc>> = records.iter().map(|r| r.updated_at).collect();

        let deleted: Vec<i64> = sqlx::query_scalar(
            r#"
            DELETE FROM resume_results r
            USING UNNEST($1::BIGINT[], $2::TIMESTAMPTZ[]) AS snapshot(id, updated_at)
            WHERE r.id = snapshot.id AND r.updated_at = snapshot.updated_at
            RETURNING r.id
            "#,
        )
        .bind(&ids)
        .bind(&stamps)
        .fetch_all(&self.pool)
        .await?;

        debug!(
            "Deleted {} of {} snapshot records",
            deleted.len(),
            records.len()
        );
        Ok(deleted)
    }
}

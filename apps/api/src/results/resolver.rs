use async_trait::async_trait;
use sqlx::PgPool;

use crate::errors::AppError;
use crate::models::job::JobRef;
use crate::models::user::OwnerRef;

/// Turns job and applicant identifiers into entities, or reports that they
/// do not exist. Consulted only when a new record is created.
#[async_trait]
pub trait ReferenceResolver: Send + Sync {
    async fn resolve_job(&self, job_id: i64) -> Result<JobRef, AppError>;

    async fn resolve_owner(&self, owner_id: i64) -> Result<OwnerRef, AppError>;
}

/// Resolves references against the `jobs` and `users` tables owned by the
/// jobs and accounts services.
#[derive(Clone)]
pub struct PgReferenceResolver {
    pool: PgPool,
}

impl PgReferenceResolver {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ReferenceResolver for PgReferenceResolver {
    async fn resolve_job(&self, job_id: i64) -> Result<JobRef, AppError> {
        sqlx::query_as::<_, JobRef>("SELECT id FROM jobs WHERE id = $1")
            .bind(job_id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| AppError::job_not_found(job_id))
    }

    async fn resolve_owner(&self, owner_id: i64) -> Result<OwnerRef, AppError> {
        sqlx::query_as::<_, OwnerRef>("SELECT id FROM users WHERE id = $1")
            .bind(owner_id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| AppError::owner_not_found(owner_id))
    }
}

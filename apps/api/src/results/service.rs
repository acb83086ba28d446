//! Resume result service: hash-keyed upsert and lookups.
//!
//! A resume is identified by the hash of its content. Resubmitting the same
//! content converges on one stored record; a new evaluation payload for a
//! known hash overwrites the previous one in place.

use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, info, warn};

use crate::config::TranslationMode;
use crate::errors::AppError;
use crate::models::resume::{NewResumeResult, ResumeResultRow};
use crate::results::resolver::ReferenceResolver;
use crate::results::store::ResultStore;
use crate::results::translate::{self, CanonicalResult};

/// Bound on create/update retries when concurrent writers race on a hash.
const MAX_UPSERT_ATTEMPTS: u32 = 3;

pub struct ResumeResultService {
    store: Arc<dyn ResultStore>,
    resolver: Arc<dyn ReferenceResolver>,
    translation_mode: TranslationMode,
}

impl ResumeResultService {
    pub fn new(
        store: Arc<dyn ResultStore>,
        resolver: Arc<dyn ReferenceResolver>,
        translation_mode: TranslationMode,
    ) -> Self {
        Self {
            store,
            resolver,
            translation_mode,
        }
    }

    /// Stores the evaluation for `hash`, creating the record on first sight.
    ///
    /// - Known hash, empty payload: the stored record is returned untouched.
    /// - Known hash, payload: results are overwritten (skipped when equal).
    /// - Unknown hash: job and owner are resolved, then a record is created.
    ///
    /// A create that loses the race on the unique hash is retried as an
    /// update. When a rejected payload arrives for an unknown hash, missing
    /// job or owner references are reported before the payload error.
    pub async fn upsert(
        &self,
        hash: &str,
        raw_results: Option<&str>,
        job_id: i64,
        owner_id: i64,
    ) -> Result<ResumeResultRow, AppError> {
        if hash.trim().is_empty() {
            return Err(AppError::Validation("resume hash must not be empty".into()));
        }

        let results = match raw_results.filter(|r| !r.trim().is_empty()) {
            Some(raw) => match self.translate_payload(hash, raw) {
                Ok(value) => Some(value),
                Err(e) => {
                    if self.store.find_by_hash(hash).await?.is_none() {
                        self.resolver.resolve_job(job_id).await?;
                        self.resolver.resolve_owner(owner_id).await?;
                    }
                    return Err(e);
                }
            },
            None => None,
        };

        for attempt in 1..=MAX_UPSERT_ATTEMPTS {
            if let Some(existing) = self.store.find_by_hash(hash).await? {
                let Some(results) = &results else {
                    debug!("No payload for known hash {hash}; returning record {}", existing.id);
                    return Ok(existing);
                };
                if existing.results.as_ref() == Some(results) {
                    debug!("Payload for hash {hash} unchanged; skipping write");
                    return Ok(existing);
                }
                if existing.job_id != job_id || existing.owner_id != owner_id {
                    warn!(
                        "Hash {hash} resubmitted for job {job_id}/owner {owner_id}, \
                         record {} stays linked to job {}/owner {}",
                        existing.id, existing.job_id, existing.owner_id
                    );
                }
                if let Some(updated) = self.store.update_results(existing.id, results).await? {
                    info!("Updated results for record {} (hash {hash})", updated.id);
                    return Ok(updated);
                }
                warn!("Record {} vanished during update (attempt {attempt})", existing.id);
                continue;
            }

            let job = self.resolver.resolve_job(job_id).await?;
            let owner = self.resolver.resolve_owner(owner_id).await?;

            let created = self
                .store
                .insert(NewResumeResult {
                    resume_hash: hash.to_string(),
                    results: results.clone(),
                    job_id: job.id,
                    owner_id: owner.id,
                })
                .await?;
            if let Some(created) = created {
                info!(
                    "Created record {} for hash {hash} (job {}, owner {})",
                    created.id, created.job_id, created.owner_id
                );
                return Ok(created);
            }
            warn!("Create for hash {hash} collided with a concurrent writer (attempt {attempt}); retrying as update");
        }

        Err(AppError::Conflict(format!(
            "could not settle record for hash {hash} after {MAX_UPSERT_ATTEMPTS} attempts"
        )))
    }

    fn translate_payload(&self, hash: &str, raw: &str) -> Result<Value, AppError> {
        match translate::translate(raw) {
            Ok(result) => Ok(translate::to_value(&result)?),
            Err(e) => match self.translation_mode {
                TranslationMode::Strict => Err(AppError::Translation(e)),
                TranslationMode::Lenient => {
                    warn!("Malformed evaluation payload for hash {hash}, storing empty result: {e}");
                    Ok(translate::to_value(&CanonicalResult::new())?)
                }
            },
        }
    }

    pub async fn get_by_hash(&self, hash: &str) -> Result<Option<ResumeResultRow>, AppError> {
        self.store.find_by_hash(hash).await
    }

    pub async fn list_by_job(&self, job_id: i64) -> Result<Vec<ResumeResultRow>, AppError> {
        self.store.list_by_job(job_id).await
    }

    pub async fn list_by_owner(&self, owner_id: i64) -> Result<Vec<ResumeResultRow>, AppError> {
        self.store.list_by_owner(owner_id).await
    }

    /// Zero or one record once reconciled; possibly more before.
    pub async fn list_by_job_and_owner(
        &self,
        job_id: i64,
        owner_id: i64,
    ) -> Result<Vec<ResumeResultRow>, AppError> {
        self.store.list_by_job_and_owner(job_id, owner_id).await
    }

    /// The record reconciliation would keep for the pair: highest id wins.
    pub async fn latest_for_job_and_owner(
        &self,
        job_id: i64,
        owner_id: i64,
    ) -> Result<Option<ResumeResultRow>, AppError> {
        Ok(self
            .store
            .list_by_job_and_owner(job_id, owner_id)
            .await?
            .into_iter()
            .max_by_key(|r| r.id))
    }

    /// Stored results as a nested mapping; empty when nothing was evaluated
    /// yet or the stored value is unreadable.
    pub fn parsed_results(record: &ResumeResultRow) -> CanonicalResult {
        record
            .results
            .as_ref()
            .map(translate::from_stored)
            .unwrap_or_default()
    }
}

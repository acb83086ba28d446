//! In-memory `ResultStore` and `ReferenceResolver` used by unit and router
//! tests. Mirrors the Postgres semantics: unique hashes, ascending ids,
//! optimistic deletes keyed on `updated_at`.
//!
//! Each method notes the `PgResultStore` statement it stands in for. Keep
//! the two in step when either changes.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{Duration, Utc};
use serde_json::Value;

use crate::errors::AppError;
use crate::models::job::JobRef;
use crate::models::resume::{DuplicateGroup, NewResumeResult, ResumeResultRow};
use crate::models::user::OwnerRef;
use crate::results::resolver::ReferenceResolver;
use crate::results::store::ResultStore;

#[derive(Default)]
struct Inner {
    next_id: i64,
    rows: BTreeMap<i64, ResumeResultRow>,
    /// Rows that land just before the next insert of their hash, as if a
    /// concurrent writer won the race.
    racing: HashMap<String, NewResumeResult>,
}

impl Inner {
    fn make_row(&mut self, new: NewResumeResult) -> ResumeResultRow {
        self.next_id += 1;
        let now = Utc::now();
        ResumeResultRow {
            id: self.next_id,
            resume_hash: new.resume_hash,
            results: new.results,
            job_id: new.job_id,
            owner_id: new.owner_id,
            created_at: now,
            updated_at: now,
        }
    }

    fn select(&self, pred: impl Fn(&ResumeResultRow) -> bool) -> Vec<ResumeResultRow> {
        self.rows.values().filter(|r| pred(r)).cloned().collect()
    }
}

#[derive(Default)]
pub struct MemoryResultStore {
    inner: Mutex<Inner>,
}

impl MemoryResultStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Writes a row directly, bypassing the hash constraint. Seeds the
    /// duplicates that only races could produce through the service.
    pub fn seed(&self, hash: &str, job_id: i64, owner_id: i64) -> ResumeResultRow {
        let mut inner = self.inner.lock().unwrap();
        let row = inner.make_row(NewResumeResult {
            resume_hash: hash.to_string(),
            results: None,
            job_id,
            owner_id,
        });
        inner.rows.insert(row.id, row.clone());
        row
    }

    /// The next insert of `winner.resume_hash` loses to `winner`.
    pub fn race(&self, winner: NewResumeResult) {
        let mut inner = self.inner.lock().unwrap();
        inner.racing.insert(winner.resume_hash.clone(), winner);
    }

    /// Simulates a write landing after a reconciliation snapshot.
    pub fn touch(&self, id: i64) {
        let mut inner = self.inner.lock().unwrap();
        if let Some(row) = inner.rows.get_mut(&id) {
            row.updated_at += Duration::milliseconds(1);
        }
    }

    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().rows.len()
    }
}

#[async_trait]
impl ResultStore for MemoryResultStore {
    // SELECT ... WHERE resume_hash = $1
    async fn find_by_hash(&self, hash: &str) -> Result<Option<ResumeResultRow>, AppError> {
        let inner = self.inner.lock().unwrap();
        Ok(inner.rows.values().find(|r| r.resume_hash == hash).cloned())
    }

    // INSERT ... ON CONFLICT (resume_hash) DO NOTHING RETURNING ...
    async fn insert(&self, new: NewResumeResult) -> Result<Option<ResumeResultRow>, AppError> {
        let mut inner = self.inner.lock().unwrap();
        if let Some(winner) = inner.racing.remove(&new.resume_hash) {
            let row = inner.make_row(winner);
            inner.rows.insert(row.id, row);
        }
        if inner.rows.values().any(|r| r.resume_hash == new.resume_hash) {
            return Ok(None);
        }
        let row = inner.make_row(new);
        inner.rows.insert(row.id, row.clone());
        Ok(Some(row))
    }

    // UPDATE ... SET results = $2, updated_at = NOW() WHERE id = $1 RETURNING ...
    async fn update_results(
        &self,
        id: i64,
        results: &Value,
    ) -> Result<Option<ResumeResultRow>, AppError> {
        let mut inner = self.inner.lock().unwrap();
        Ok(inner.rows.get_mut(&id).map(|row| {
            row.results = Some(results.clone());
            row.updated_at = Utc::now().max(row.updated_at + Duration::microseconds(1));
            row.clone()
        }))
    }

    // SELECT ... WHERE job_id = $1 ORDER BY id ASC (likewise for the other lists)
    async fn list_by_job(&self, job_id: i64) -> Result<Vec<ResumeResultRow>, AppError> {
        Ok(self.inner.lock().unwrap().select(|r| r.job_id == job_id))
    }

    async fn list_by_owner(&self, owner_id: i64) -> Result<Vec<ResumeResultRow>, AppError> {
        Ok(self.inner.lock().unwrap().select(|r| r.owner_id == owner_id))
    }

    async fn list_by_job_and_owner(
        &self,
        job_id: i64,
        owner_id: i64,
    ) -> Result<Vec<ResumeResultRow>, AppError> {
        Ok(self
            .inner
            .lock()
            .unwrap()
            .select(|r| r.job_id == job_id && r.owner_id == owner_id))
    }

    async fn list_all(&self) -> Result<Vec<ResumeResultRow>, AppError> {
        Ok(self.inner.lock().unwrap().select(|_| true))
    }

    // SELECT COUNT(*) FROM resume_results
    async fn count_all(&self) -> Result<i64, AppError> {
        Ok(self.inner.lock().unwrap().rows.len() as i64)
    }

    // SELECT job_id, owner_id, COUNT(*) ... GROUP BY job_id, owner_id
    // HAVING COUNT(*) > 1 ORDER BY job_id, owner_id
    async fn duplicate_groups(&self) -> Result<Vec<DuplicateGroup>, AppError> {
        let inner = self.inner.lock().unwrap();
        let mut counts: BTreeMap<(i64, i64), i64> = BTreeMap::new();
        for row in inner.rows.values() {
            *counts.entry((row.job_id, row.owner_id)).or_default() += 1;
        }
        Ok(counts
            .into_iter()
            .filter(|(_, n)| *n > 1)
            .map(|((job_id, owner_id), record_count)| DuplicateGroup {
                job_id,
                owner_id,
                record_count,
            })
            .collect())
    }

    // DELETE ... USING UNNEST($1::BIGINT[], $2::TIMESTAMPTZ[]) AS snapshot(id, updated_at)
    // WHERE r.id = snapshot.id AND r.updated_at = snapshot.updated_at RETURNING r.id
    async fn delete_many(&self, records: &[ResumeResultRow]) -> Result<Vec<i64>, AppError> {
        let mut inner = self.inner.lock().unwrap();
        let mut deleted = Vec::new();
        for record in records {
            let unchanged = inner
                .rows
                .get(&record.id)
                .is_some_and(|row| row.updated_at == record.updated_at);
            if unchanged {
                inner.rows.remove(&record.id);
                deleted.push(record.id);
            }
        }
        Ok(deleted)
    }
}

/// Resolver over fixed sets of known job and owner ids.
#[derive(Default)]
pub struct MemoryReferenceResolver {
    jobs: HashSet<i64>,
    owners: HashSet<i64>,
}

impl MemoryReferenceResolver {
    pub fn new(jobs: impl IntoIterator<Item = i64>, owners: impl IntoIterator<Item = i64>) -> Self {
        Self {
            jobs: jobs.into_iter().collect(),
            owners: owners.into_iter().collect(),
        }
    }
}

#[async_trait]
impl ReferenceResolver for MemoryReferenceResolver {
    async fn resolve_job(&self, job_id: i64) -> Result<JobRef, AppError> {
        if self.jobs.contains(&job_id) {
            Ok(JobRef { id: job_id })
        } else {
            Err(AppError::job_not_found(job_id))
        }
    }

    async fn resolve_owner(&self, owner_id: i64) -> Result<OwnerRef, AppError> {
        if self.owners.contains(&owner_id) {
            Ok(OwnerRef { id: owner_id })
        } else {
            Err(AppError::owner_not_found(owner_id))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn new_row(hash: &str) -> NewResumeResult {
        NewResumeResult {
            resume_hash: hash.to_string(),
            results: None,
            job_id: 1,
            owner_id: 1,
        }
    }

    #[tokio::test]
    async fn test_insert_on_taken_hash_writes_nothing() {
        let store = MemoryResultStore::new();
        assert!(store.insert(new_row("h")).await.unwrap().is_some());
        assert!(store.insert(new_row("h")).await.unwrap().is_none());
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_update_of_missing_row_returns_none() {
        let store = MemoryResultStore::new();
        assert!(store.update_results(42, &json!({})).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_update_moves_updated_at_forward() {
        let store = MemoryResultStore::new();
        let row = store.seed("h", 1, 1);
        let updated = store
            .update_results(row.id, &json!({"A": {}}))
            .await
            .unwrap()
            .unwrap();
        assert!(updated.updated_at > row.updated_at);
    }

    #[tokio::test]
    async fn test_duplicate_groups_only_counts_pairs_over_one() {
        let store = MemoryResultStore::new();
        store.seed("a", 2, 1);
        store.seed("b", 2, 1);
        store.seed("c", 1, 1);
        store.seed("d", 1, 1);
        store.seed("e", 1, 1);
        store.seed("f", 3, 3);

        let groups = store.duplicate_groups().await.unwrap();
        let counts: Vec<(i64, i64, i64)> = groups
            .iter()
            .map(|g| (g.job_id, g.owner_id, g.record_count))
            .collect();
        assert_eq!(counts, vec![(1, 1, 3), (2, 1, 2)]);
    }
}

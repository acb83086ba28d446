//! Reconciliation sweep: removes duplicate records sharing a (job, owner)
//! pair, keeping the one with the highest id.
//!
//! Deletes are optimistic. A duplicate that was updated after the sweep
//! read it is left in place and reported as skipped; the next sweep picks
//! it up again.

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use crate::config::ReconcileStrategy;
use crate::errors::AppError;
use crate::models::resume::ResumeResultRow;
use crate::results::store::ResultStore;

/// Outcome for one (job, owner) pair that had duplicates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GroupDetail {
    pub job_id: i64,
    pub owner_id: i64,
    pub removed: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReconciliationReport {
    /// Records scanned.
    pub processed: usize,
    pub removed: usize,
    /// Duplicates modified after the snapshot and therefore kept.
    pub skipped: usize,
    pub affected_groups: usize,
    pub details: Vec<GroupDetail>,
}

/// Deletion plan for one (job, owner) pair.
#[derive(Debug, Clone)]
pub struct GroupPlan {
    pub job_id: i64,
    pub owner_id: i64,
    pub keep: ResumeResultRow,
    pub duplicates: Vec<ResumeResultRow>,
}

/// Groups records by (job, owner) and, for every group with more than one
/// member, keeps the highest id and marks the rest. Groups come back in
/// (job, owner) order.
pub fn plan_duplicates(records: Vec<ResumeResultRow>) -> Vec<GroupPlan> {
    let mut groups: BTreeMap<(i64, i64), Vec<ResumeResultRow>> = BTreeMap::new();
    for record in records {
        groups
            .entry((record.job_id, record.owner_id))
            .or_default()
            .push(record);
    }

    groups
        .into_iter()
        .filter(|(_, members)| members.len() > 1)
        .filter_map(|((job_id, owner_id), mut members)| {
            // Higher id = created later.
            members.sort_by(|a, b| b.id.cmp(&a.id));
            let mut members = members.into_iter();
            let keep = members.next()?;
            Some(GroupPlan {
                job_id,
                owner_id,
                keep,
                duplicates: members.collect(),
            })
        })
        .collect()
}

pub struct ReconciliationEngine {
    store: Arc<dyn ResultStore>,
    strategy: ReconcileStrategy,
    running: Mutex<()>,
}

impl ReconciliationEngine {
    pub fn new(store: Arc<dyn ResultStore>, strategy: ReconcileStrategy) -> Self {
        Self {
            store,
            strategy,
            running: Mutex::new(()),
        }
    }

    /// Runs one sweep. Fails with `Conflict` if a sweep is already running
    /// in this process.
    pub async fn run(&self) -> Result<ReconciliationReport, AppError> {
        let _guard = self
            .running
            .try_lock()
            .map_err(|_| AppError::Conflict("a reconciliation sweep is already running".into()))?;

        let (processed, plans) = match self.strategy {
            ReconcileStrategy::FullScan => {
                let all = self.store.list_all().await?;
                (all.len(), plan_duplicates(all))
            }
            ReconcileStrategy::Grouped => {
                let processed = usize::try_from(self.store.count_all().await?).unwrap_or(0);
                let mut members = Vec::new();
                for group in self.store.duplicate_groups().await? {
                    debug!(
                        "Job {} / owner {} holds {} records",
                        group.job_id, group.owner_id, group.record_count
                    );
                    members.extend(
                        self.store
                            .list_by_job_and_owner(group.job_id, group.owner_id)
                            .await?,
                    );
                }
                (processed, plan_duplicates(members))
            }
        };

        for plan in &plans {
            debug!(
                "Job {} / owner {}: keeping record {}, {} duplicates",
                plan.job_id,
                plan.owner_id,
                plan.keep.id,
                plan.duplicates.len()
            );
        }
        let doomed: Vec<ResumeResultRow> = plans
            .iter()
            .flat_map(|p| p.duplicates.iter().cloned())
            .collect();
        let deleted: HashSet<i64> = self.store.delete_many(&doomed).await?.into_iter().collect();

        let details: Vec<GroupDetail> = plans
            .iter()
            .filter_map(|plan| {
                let removed = plan
                    .duplicates
                    .iter()
                    .filter(|d| deleted.contains(&d.id))
                    .count();
                (removed > 0).then_some(GroupDetail {
                    job_id: plan.job_id,
                    owner_id: plan.owner_id,
                    removed,
                })
            })
            .collect();

        let report = ReconciliationReport {
            processed,
            removed: deleted.len(),
            skipped: doomed.len() - deleted.len(),
            affected_groups: details.len(),
            details,
        };

        if report.skipped > 0 {
            warn!(
                "{} duplicates changed since the snapshot and were kept",
                report.skipped
            );
        }
        info!(
            "Reconciliation scanned {} records, removed {} duplicates across {} pairs",
            report.processed, report.removed, report.affected_groups
        );
        Ok(report)
    }

    /// Runs a sweep every `interval` until the task is dropped.
    pub async fn run_every(self: Arc<Self>, interval: Duration) {
        let mut ticker = tokio::time::interval(interval);
        // The first tick fires immediately; skip it so startup stays quiet.
        ticker.tick().await;
        loop {
            ticker.tick().await;
            if let Err(e) = self.run().await {
                error!("Scheduled reconciliation failed: {e}");
            }
        }
    }
}

use std::sync::Arc;

use crate::results::reconcile::ReconciliationEngine;
use crate::results::service::ResumeResultService;

/// Shared application state injected into all route handlers via Axum extractors.
#[derive(Clone)]
pub struct AppState {
    pub results: Arc<ResumeResultService>,
    pub reconciler: Arc<ReconciliationEngine>,
}

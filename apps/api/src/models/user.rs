use serde::Serialize;
use sqlx::FromRow;

/// The applicant that submitted a resume.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, FromRow)]
pub struct OwnerRef {
    pub id: i64,
}

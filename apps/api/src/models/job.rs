use serde::Serialize;
use sqlx::FromRow;

/// A job posting as seen by the result store. The posting itself is owned
/// by the jobs service; only its identity matters here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, FromRow)]
pub struct JobRef {
    pub id: i64,
}

//! Audit metadata embedded in every persisted entity.

use crate::store::entity::optional_text;
use crate::store::error::RepoResult;
use rusqlite::types::Value;
use rusqlite::Row;
use serde::{Deserialize, Serialize};

/// Creation and modification stamps.
///
/// All fields are `None` until the entity is first persisted. Timestamps are
/// Unix epoch milliseconds.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditMetadata {
    pub created_at: Option<i64>,
    pub updated_at: Option<i64>,
    pub created_by: Option<String>,
    pub updated_by: Option<String>,
}

impl AuditMetadata {
    pub(crate) fn from_row(row: &Row<'_>) -> RepoResult<Self> {
        Ok(Self {
            created_at: row.get("created_at")?,
            updated_at: row.get("updated_at")?,
            created_by: row.get("created_by")?,
            updated_by: row.get("updated_by")?,
        })
    }

    /// Values in `AUDIT_COLUMNS` order.
    pub(crate) fn insert_values(&self) -> [Value; 4] {
        [
            self.created_at.map_or(Value::Null, Value::Integer),
            self.updated_at.map_or(Value::Null, Value::Integer),
            optional_text(self.created_by.as_deref()),
            optional_text(self.updated_by.as_deref()),
        ]
    }
}

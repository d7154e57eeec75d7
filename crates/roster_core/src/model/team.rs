//! Team entity.

use crate::model::audit::AuditMetadata;
use crate::store::entity::{Entity, EntityId, FieldKind, FieldMeta};
use crate::store::error::RepoResult;
use rusqlite::types::Value;
use rusqlite::Row;
use serde::{Deserialize, Serialize};

pub type TeamId = EntityId;

/// A named group of members.
///
/// Membership lives on [`crate::model::member::Member::team_id`]; load members
/// of a team by identity instead of holding them here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Team {
    pub id: Option<TeamId>,
    pub name: String,
    pub audit: AuditMetadata,
}

impl Team {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: None,
            name: name.into(),
            audit: AuditMetadata::default(),
        }
    }

    pub fn rename(&mut self, name: impl Into<String>) {
        self.name = name.into();
    }
}

impl Entity for Team {
    const NAME: &'static str = "Team";
    const TABLE: &'static str = "team";
    const FIELDS: &'static [FieldMeta] = &[FieldMeta::new("name", "name", FieldKind::Text)];

    fn id(&self) -> Option<EntityId> {
        self.id
    }

    fn assign_id(&mut self, id: EntityId) {
        self.id = Some(id);
    }

    fn audit(&self) -> &AuditMetadata {
        &self.audit
    }

    fn audit_mut(&mut self) -> &mut AuditMetadata {
        &mut self.audit
    }

    fn field_values(&self) -> Vec<Value> {
        vec![Value::Text(self.name.clone())]
    }

    fn from_row(row: &Row<'_>) -> RepoResult<Self> {
        Ok(Self {
            id: Some(row.get("id")?),
            name: row.get("name")?,
            audit: AuditMetadata::from_row(row)?,
        })
    }
}

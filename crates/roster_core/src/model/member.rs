//! Member entity.
//!
//! # Invariants
//! - `age` is never negative; the schema rejects negative values.
//! - `team_id` may be `None`: a member can exist without a team.

use crate::model::audit::AuditMetadata;
use crate::model::team::TeamId;
use crate::store::entity::{optional_integer, Entity, EntityId, FieldKind, FieldMeta};
use crate::store::error::{RepoError, RepoResult};
use rusqlite::types::Value;
use rusqlite::Row;
use serde::{Deserialize, Serialize};

pub type MemberId = EntityId;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Member {
    pub id: Option<MemberId>,
    pub username: String,
    pub age: i32,
    /// Owning side of the member→team association.
    pub team_id: Option<TeamId>,
    pub audit: AuditMetadata,
}

impl Member {
    pub fn new(username: impl Into<String>, age: i32) -> Self {
        Self {
            id: None,
            username: username.into(),
            age,
            team_id: None,
            audit: AuditMetadata::default(),
        }
    }

    pub fn with_team(username: impl Into<String>, age: i32, team_id: TeamId) -> Self {
        Self {
            team_id: Some(team_id),
            ..Self::new(username, age)
        }
    }

    pub fn change_team(&mut self, team_id: Option<TeamId>) {
        self.team_id = team_id;
    }

    /// Compares identity and attributes, ignoring audit stamps.
    pub fn same_record(&self, other: &Self) -> bool {
        self.id == other.id
            && self.username == other.username
            && self.age == other.age
            && self.team_id == other.team_id
    }
}

impl Entity for Member {
    const NAME: &'static str = "Member";
    const TABLE: &'static str = "member";
    const FIELDS: &'static [FieldMeta] = &[
        FieldMeta::new("username", "username", FieldKind::Text),
        FieldMeta::new("age", "age", FieldKind::Integer),
        FieldMeta::new("team_id", "team_id", FieldKind::Reference),
    ];

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
        vec![
            Value::Text(self.username.clone()),
            Value::Integer(i64::from(self.age)),
            optional_integer(self.team_id),
        ]
    }

    fn from_row(row: &Row<'_>) -> RepoResult<Self> {
        let age: i64 = row.get("age")?;
        let age = i32::try_from(age)
            .map_err(|_| RepoError::InvalidData(format!("age `{age}` out of range in member.age")))?;

        Ok(Self {
            id: Some(row.get("id")?),
            username: row.get("username")?,
            age,
            team_id: row.get("team_id")?,
            audit: AuditMetadata::from_row(row)?,
        })
    }
}

//! Member read projection joined with its team name.

use crate::model::member::{Member, MemberId};
use crate::model::team::Team;
use crate::query::Projection;
use crate::store::error::{RepoError, RepoResult};
use rusqlite::Row;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemberDto {
    pub id: MemberId,
    pub username: String,
    pub team_name: Option<String>,
}

impl MemberDto {
    /// Builds the projection from an already loaded member and its team.
    pub fn of(member: &Member, team: Option<&Team>) -> RepoResult<Self> {
        let id = member.id.ok_or_else(|| {
            RepoError::InvalidArgument("member must be persisted before projection".to_string())
        })?;
        Ok(Self {
            id,
            username: member.username.clone(),
            team_name: team.map(|team| team.name.clone()),
        })
    }
}

impl Projection for MemberDto {
    const COLUMNS: &'static [&'static str] = &["id", "username", "team_name"];

    fn from_row(row: &Row<'_>) -> RepoResult<Self> {
        Ok(Self {
            id: row.get("id")?,
            username: row.get("username")?,
            team_name: row.get("team_name")?,
        })
    }
}

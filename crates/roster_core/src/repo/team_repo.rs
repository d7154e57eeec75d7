//! Team repository facade.
//!
//! Deleting a team that members still reference fails with
//! `ConstraintViolation`; members are never removed with their team.

use crate::audit::AuditInterceptor;
use crate::model::team::Team;
use crate::query::finder_table::FinderTable;
use crate::query::plan::{FinderDeclaration, ResultShape};
use crate::query::registry::{named_queries, NamedQueryRegistry};
use crate::query::template::Arg;
use crate::repo::CrudRepository;
use crate::store::error::RepoResult;
use crate::store::sqlite::SqliteEntityStore;
use rusqlite::Connection;
use std::sync::Arc;

const FIND_BY_NAME: &str = "find_by_name";
const FIND_BY_NAME_STARTING_WITH: &str = "find_by_name_starting_with";

fn team_finders() -> Vec<FinderDeclaration> {
    vec![
        FinderDeclaration::named(FIND_BY_NAME, ResultShape::List).param("name"),
        FinderDeclaration::derived(FIND_BY_NAME_STARTING_WITH, ResultShape::List).param("prefix"),
    ]
}

pub struct TeamRepository<'conn> {
    store: SqliteEntityStore<'conn, Team>,
    finders: FinderTable,
}

impl<'conn> TeamRepository<'conn> {
    pub fn try_new(conn: &'conn Connection, audit: Arc<AuditInterceptor>) -> RepoResult<Self> {
        Self::with_registry(conn, audit, named_queries()?)
    }

    pub fn with_registry(
        conn: &'conn Connection,
        audit: Arc<AuditInterceptor>,
        registry: &NamedQueryRegistry,
    ) -> RepoResult<Self> {
        let store = SqliteEntityStore::try_new(conn, audit)?;
        let finders = FinderTable::compile::<Team>(conn, registry, &team_finders())?;
        Ok(Self { store, finders })
    }

    pub fn finders(&self) -> &FinderTable {
        &self.finders
    }

    pub fn find_by_name(&self, name: &str) -> RepoResult<Vec<Team>> {
        self.finders
            .plan(FIND_BY_NAME)?
            .fetch_list(&self.store, &[Arg::text(name)])
    }

    /// Literal prefix match; `%` and `_` in `prefix` match themselves.
    pub fn find_by_name_starting_with(&self, prefix: &str) -> RepoResult<Vec<Team>> {
        self.finders
            .plan(FIND_BY_NAME_STARTING_WITH)?
            .fetch_list(&self.store, &[Arg::text(prefix)])
    }
}

impl CrudRepository<Team> for TeamRepository<'_> {
    fn store(&self) -> &SqliteEntityStore<'_, Team> {
        &self.store
    }
}

//! Member repository facade.
//!
//! # Invariants
//! - All declared finders compile against the registry and schema when the
//!   repository is built.
//! - `bulk_age_plus` bypasses audit hooks; previously loaded members are stale.

use crate::audit::AuditInterceptor;
use crate::model::member::Member;
use crate::model::member_dto::MemberDto;
use crate::model::team::TeamId;
use crate::paging::{Page, PageRequest};
use crate::query::descriptor::FetchJoin;
use crate::query::finder_table::FinderTable;
use crate::query::plan::{FinderDeclaration, ResultShape};
use crate::query::registry::{named_queries, NamedQueryRegistry};
use crate::query::template::{Arg, BoundQuery};
use crate::repo::CrudRepository;
use crate::store::error::RepoResult;
use crate::store::sqlite::SqliteEntityStore;
use rusqlite::Connection;
use std::sync::Arc;

const FIND_BY_USERNAME_AND_AGE_GREATER_THAN: &str = "find_by_username_and_age_greater_than";
const FIND_BY_USERNAME: &str = "find_by_username";
const FIND_MEMBERS: &str = "find_members";
const FIND_USERNAMES: &str = "find_usernames";
const FIND_MEMBER_DTOS: &str = "find_member_dtos";
const FIND_BY_USERNAMES: &str = "find_by_usernames";
const FIND_MEMBER_LIST_BY_USERNAME: &str = "find_member_list_by_username";
const FIND_MEMBER_BY_USERNAME: &str = "find_member_by_username";
const FIND_OPTIONAL_MEMBER_BY_USERNAME: &str = "find_optional_member_by_username";
const FIND_BY_AGE: &str = "find_by_age";
const COUNT_BY_AGE: &str = "count_by_age";
const EXISTS_BY_USERNAME: &str = "exists_by_username";
const FIND_BY_TEAM_ID: &str = "find_by_team_id";
const BULK_AGE_PLUS: &str = "bulk_age_plus";

fn member_finders() -> Vec<FinderDeclaration> {
    vec![
        FinderDeclaration::derived(FIND_BY_USERNAME_AND_AGE_GREATER_THAN, ResultShape::List)
            .param("username")
            .param("age"),
        // Resolves to `Member.findByUsername` while it is registered.
        FinderDeclaration::derived(FIND_BY_USERNAME, ResultShape::List).param("username"),
        FinderDeclaration::text(
            FIND_MEMBERS,
            "SELECT * FROM member WHERE username = :username AND age = :age",
            ResultShape::List,
        )
        .param("username")
        .param("age"),
        FinderDeclaration::text(FIND_USERNAMES, "SELECT username FROM member", ResultShape::Scalars),
        FinderDeclaration::text(
            FIND_MEMBER_DTOS,
            "SELECT m.id AS id, m.username AS username, t.name AS team_name
             FROM member m
             JOIN team t ON t.id = m.team_id",
            ResultShape::projection::<MemberDto>(),
        ),
        FinderDeclaration::text(
            FIND_BY_USERNAMES,
            "SELECT * FROM member WHERE username IN :usernames",
            ResultShape::List,
        )
        .sequence_param("usernames"),
        FinderDeclaration::derived(FIND_MEMBER_LIST_BY_USERNAME, ResultShape::List)
            .param("username"),
        FinderDeclaration::derived(FIND_MEMBER_BY_USERNAME, ResultShape::One).param("username"),
        FinderDeclaration::derived(FIND_OPTIONAL_MEMBER_BY_USERNAME, ResultShape::Optional)
            .param("username"),
        FinderDeclaration::derived(FIND_BY_AGE, ResultShape::Page)
            .param("age")
            .fetch_join(FetchJoin::many_to_one("team", "team_id")),
        FinderDeclaration::derived(COUNT_BY_AGE, ResultShape::Count).param("age"),
        FinderDeclaration::derived(EXISTS_BY_USERNAME, ResultShape::Exists).param("username"),
        FinderDeclaration::derived(FIND_BY_TEAM_ID, ResultShape::List).param("team_id"),
        FinderDeclaration::text(
            BULK_AGE_PLUS,
            "UPDATE member SET age = age + 1 WHERE age >= :age",
            ResultShape::AffectedRows,
        )
        .param("age"),
    ]
}

/// Hand-written queries living next to the declared finders.
pub trait MemberRepositoryCustom {
    fn find_member_custom(&self) -> RepoResult<Vec<Member>>;
}

pub struct MemberRepository<'conn> {
    store: SqliteEntityStore<'conn, Member>,
    finders: FinderTable,
}

impl<'conn> MemberRepository<'conn> {
    /// Builds the repository against the process-wide named query registry.
    pub fn try_new(conn: &'conn Connection, audit: Arc<AuditInterceptor>) -> RepoResult<Self> {
        Self::with_registry(conn, audit, named_queries()?)
    }

    pub fn with_registry(
        conn: &'conn Connection,
        audit: Arc<AuditInterceptor>,
        registry: &NamedQueryRegistry,
    ) -> RepoResult<Self> {
        let store = SqliteEntityStore::try_new(conn, audit)?;
        let finders = FinderTable::compile::<Member>(conn, registry, &member_finders())?;
        Ok(Self { store, finders })
    }

    pub fn finders(&self) -> &FinderTable {
        &self.finders
    }

    pub fn find_by_username_and_age_greater_than(
        &self,
        username: &str,
        age: i32,
    ) -> RepoResult<Vec<Member>> {
        self.finders
            .plan(FIND_BY_USERNAME_AND_AGE_GREATER_THAN)?
            .fetch_list(&self.store, &[Arg::text(username), Arg::scalar(age)])
    }

    pub fn find_by_username(&self, username: &str) -> RepoResult<Vec<Member>> {
        self.finders
            .plan(FIND_BY_USERNAME)?
            .fetch_list(&self.store, &[Arg::text(username)])
    }

    pub fn find_members(&self, username: &str, age: i32) -> RepoResult<Vec<Member>> {
        self.finders
            .plan(FIND_MEMBERS)?
            .fetch_list(&self.store, &[Arg::text(username), Arg::scalar(age)])
    }

    pub fn find_usernames(&self) -> RepoResult<Vec<String>> {
        self.finders
            .plan(FIND_USERNAMES)?
            .fetch_scalars(&self.store, &[])
    }

    /// Members that belong to a team, with the team name.
    pub fn find_member_dtos(&self) -> RepoResult<Vec<MemberDto>> {
        self.finders
            .plan(FIND_MEMBER_DTOS)?
            .fetch_projections(&self.store, &[])
    }

    pub fn find_by_usernames<S: AsRef<str>>(&self, usernames: &[S]) -> RepoResult<Vec<Member>> {
        self.finders
            .plan(FIND_BY_USERNAMES)?
            .fetch_list(&self.store, &[Arg::texts(usernames)])
    }

    pub fn find_member_list_by_username(&self, username: &str) -> RepoResult<Vec<Member>> {
        self.finders
            .plan(FIND_MEMBER_LIST_BY_USERNAME)?
            .fetch_list(&self.store, &[Arg::text(username)])
    }

    /// Single member or `None`; several matches fail with `IncorrectResultSize`.
    pub fn find_member_by_username(&self, username: &str) -> RepoResult<Option<Member>> {
        self.finders
            .plan(FIND_MEMBER_BY_USERNAME)?
            .fetch_one(&self.store, &[Arg::text(username)])
    }

    pub fn find_optional_member_by_username(&self, username: &str) -> RepoResult<Option<Member>> {
        self.finders
            .plan(FIND_OPTIONAL_MEMBER_BY_USERNAME)?
            .fetch_one(&self.store, &[Arg::text(username)])
    }

    /// Members of one age, windowed; ordering comes from `request`.
    pub fn find_by_age(&self, age: i32, request: &PageRequest) -> RepoResult<Page<Member>> {
        self.finders
            .plan(FIND_BY_AGE)?
            .fetch_page(&self.store, &[Arg::scalar(age)], request)
    }

    pub fn count_by_age(&self, age: i32) -> RepoResult<i64> {
        self.finders
            .plan(COUNT_BY_AGE)?
            .fetch_count(&self.store, &[Arg::scalar(age)])
    }

    pub fn exists_by_username(&self, username: &str) -> RepoResult<bool> {
        self.finders
            .plan(EXISTS_BY_USERNAME)?
            .fetch_exists(&self.store, &[Arg::text(username)])
    }

    /// `None` selects members without a team.
    pub fn find_by_team_id(&self, team_id: Option<TeamId>) -> RepoResult<Vec<Member>> {
        let team_id = team_id.map_or_else(Arg::null, Arg::scalar);
        self.finders
            .plan(FIND_BY_TEAM_ID)?
            .fetch_list(&self.store, &[team_id])
    }

    /// Adds one year to every member aged `age` or older. Returns the
    /// number of rows changed.
    pub fn bulk_age_plus(&self, age: i32) -> RepoResult<usize> {
        self.finders
            .plan(BULK_AGE_PLUS)?
            .execute_update(&self.store, &[Arg::scalar(age)])
    }
}

impl CrudRepository<Member> for MemberRepository<'_> {
    fn store(&self) -> &SqliteEntityStore<'_, Member> {
        &self.store
    }
}

impl MemberRepositoryCustom for MemberRepository<'_> {
    fn find_member_custom(&self) -> RepoResult<Vec<Member>> {
        self.store.query_entities(&BoundQuery::new(
            "SELECT * FROM member ORDER BY id",
            Vec::new(),
        ))
    }
}

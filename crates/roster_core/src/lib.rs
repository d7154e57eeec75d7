//! Repository and query-translation core for the roster domain.
//! Members, teams, declared finders, paging and audit stamping live here.

pub mod audit;
pub mod config;
pub mod db;
pub mod logging;
pub mod model;
pub mod paging;
pub mod query;
pub mod repo;
pub mod store;

pub use audit::{
    AnonymousActor, AuditInterceptor, Clock, CurrentActor, FixedActor, RandomActor, SystemClock,
};
pub use config::{ConfigError, CoreConfig};
pub use db::{open_db, open_db_in_memory, open_db_with_config, unit_of_work, DbError};
pub use logging::{default_log_level, init_logging, logging_status};
pub use model::member::{Member, MemberId};
pub use model::member_dto::MemberDto;
pub use model::team::{Team, TeamId};
pub use paging::{Page, PageRequest};
pub use query::{
    install_named_queries, named_queries, Arg, Direction, FinderDeclaration, NamedQueryRegistry,
    Projection, QueryDerivationError, ResultShape, Sort,
};
pub use repo::member_repo::{MemberRepository, MemberRepositoryCustom};
pub use repo::team_repo::TeamRepository;
pub use repo::CrudRepository;
pub use store::{Entity, EntityId, RepoError, RepoResult, SqliteEntityStore};

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

#[cfg(test)]
mod tests {
    use super::core_version;

    #[test]
    fn version_is_not_empty() {
        assert!(!core_version().is_empty());
    }
}

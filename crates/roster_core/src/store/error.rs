//! Per-call error taxonomy shared by the store, translator, paging engine and
//! repository facades.

use crate::db::DbError;
use crate::query::QueryDerivationError;
use crate::store::entity::EntityId;
use rusqlite::ErrorCode;
use std::error::Error;
use std::fmt::{Display, Formatter};

pub type RepoResult<T> = Result<T, RepoError>;

#[derive(Debug)]
pub enum RepoError {
    /// Identity absent on remove or required fetch.
    NotFound { entity: &'static str, id: EntityId },
    /// Unique, foreign-key, check or not-null rule broken by a write.
    ConstraintViolation(String),
    /// Malformed caller input such as paging bounds or unknown sort keys.
    InvalidArgument(String),
    /// Declaration could not be resolved. Raised while repositories are built.
    QueryDerivation(QueryDerivationError),
    /// Store busy, locked or unreachable. Safe for the caller to retry.
    StoreUnavailable(String),
    /// A single-result finder matched more rows than it may return.
    IncorrectResultSize { expected: usize, actual: usize },
    /// Persisted row cannot be mapped back to its entity.
    InvalidData(String),
    /// Connection schema lacks a table an entity maps to.
    MissingTable(&'static str),
    MissingColumn { table: &'static str, column: &'static str },
    Db(DbError),
}

impl RepoError {
    /// Returns whether the failure is transient.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::StoreUnavailable(_))
    }
}

impl Display for RepoError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotFound { entity, id } => write!(f, "{entity} not found: {id}"),
            Self::ConstraintViolation(message) => write!(f, "constraint violation: {message}"),
            Self::InvalidArgument(message) => write!(f, "invalid argument: {message}"),
            Self::QueryDerivation(err) => write!(f, "{err}"),
            Self::StoreUnavailable(message) => write!(f, "store unavailable: {message}"),
            Self::IncorrectResultSize { expected, actual } => write!(
                f,
                "incorrect result size: expected at most {expected}, got {actual}"
            ),
            Self::InvalidData(message) => write!(f, "invalid persisted data: {message}"),
            Self::MissingTable(table) => write!(f, "required table `{table}` is missing"),
            Self::MissingColumn { table, column } => {
                write!(f, "required column `{table}.{column}` is missing")
            }
            Self::Db(err) => write!(f, "{err}"),
        }
    }
}

impl Error for RepoError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::QueryDerivation(err) => Some(err),
            Self::Db(err) => Some(err),
            _ => None,
        }
    }
}

impl From<QueryDerivationError> for RepoError {
    fn from(value: QueryDerivationError) -> Self {
        Self::QueryDerivation(value)
    }
}

impl From<DbError> for RepoError {
    fn from(value: DbError) -> Self {
        match value {
            DbError::Sqlite(err) => Self::from(err),
            other => Self::Db(other),
        }
    }
}

impl From<rusqlite::Error> for RepoError {
    fn from(value: rusqlite::Error) -> Self {
        let code = match &value {
            rusqlite::Error::SqliteFailure(failure, _) => Some(failure.code),
            _ => None,
        };
        match code {
            Some(ErrorCode::ConstraintViolation) => Self::ConstraintViolation(value.to_string()),
            Some(ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked | ErrorCode::CannotOpen) => {
                Self::StoreUnavailable(value.to_string())
            }
            _ => Self::Db(DbError::Sqlite(value)),
        }
    }
}

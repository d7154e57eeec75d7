//! Entity store: persistence primitives over one SQLite connection.
//!
//! # Responsibility
//! - Map entities to rows through their metadata.
//! - Fire audit hooks on the insert and update paths.
//! - Execute bound queries built by the translator and paging engine.
//!
//! # Invariants
//! - Every value reaches SQL as a bound parameter.
//! - Transactions are owned by the caller; the store never opens one.

pub mod entity;
pub mod error;
pub mod sqlite;

pub use entity::{Entity, EntityId, FieldKind, FieldMeta};
pub use error::{RepoError, RepoResult};
pub use sqlite::SqliteEntityStore;

//! Query translator.
//!
//! # Responsibility
//! - Turn finder declarations (derived, named or explicit text) into
//!   verified plans at repository construction time.
//! - Bind call arguments and execute plans with a statically known shape.
//!
//! # Invariants
//! - Declaration errors surface while a `FinderTable` compiles, not per call.
//! - Filter values are always bound parameters.

pub mod derive;
pub mod descriptor;
pub mod error;
mod execute;
pub mod finder_table;
pub mod plan;
pub mod registry;
pub mod sort;
pub mod template;

use crate::store::error::RepoResult;
use rusqlite::Row;

pub use descriptor::{FetchJoin, QueryDescriptor};
pub use error::QueryDerivationError;
pub use finder_table::FinderTable;
pub use plan::{FinderDeclaration, ParamSpec, PlanOrigin, QueryPlan, QuerySource, ResultShape};
pub use registry::{install_named_queries, named_queries, NamedQuery, NamedQueryRegistry};
pub use sort::{Direction, Sort, SortOrder};
pub use template::{Arg, BoundQuery, ParamKind};

/// Read-only row type assembled from selected columns.
pub trait Projection: Sized {
    /// Result column names, in select order.
    const COLUMNS: &'static [&'static str];

    fn from_row(row: &Row<'_>) -> RepoResult<Self>;
}

use std::error::Error;
use std::fmt::{Display, Formatter};

/// Declaration-time failure. Raised while finder tables are compiled, so a
/// broken declaration aborts repository construction instead of a later call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryDerivationError {
    UnrecognizedMethod { method: String },
    UnknownProperty { method: String, property: String },
    UnsupportedOperator { method: String, keyword: String },
    ParameterMismatch { method: String, detail: String },
    ShapeMismatch { method: String, detail: String },
    MissingNamedQuery { method: String, name: String },
    MissingCountQuery { method: String },
    DuplicateNamedQuery(String),
    DuplicateFinder(String),
    MalformedQuery { name: String, detail: String },
    /// Statement failed to prepare against the live schema.
    Verification { method: String, detail: String },
    RegistryAlreadyInitialized,
}

impl Display for QueryDerivationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UnrecognizedMethod { method } => {
                write!(f, "cannot derive a query from method name `{method}`")
            }
            Self::UnknownProperty { method, property } => {
                write!(f, "`{method}` refers to unknown property `{property}`")
            }
            Self::UnsupportedOperator { method, keyword } => {
                write!(f, "`{method}` uses unsupported keyword `{keyword}`")
            }
            Self::ParameterMismatch { method, detail } => {
                write!(f, "`{method}` parameter mismatch: {detail}")
            }
            Self::ShapeMismatch { method, detail } => {
                write!(f, "`{method}` result shape mismatch: {detail}")
            }
            Self::MissingNamedQuery { method, name } => {
                write!(f, "`{method}` requires named query `{name}` which is not registered")
            }
            Self::MissingCountQuery { method } => {
                write!(f, "`{method}` is paged but declares no count query")
            }
            Self::DuplicateNamedQuery(name) => write!(f, "named query `{name}` registered twice"),
            Self::DuplicateFinder(method) => write!(f, "finder `{method}` declared twice"),
            Self::MalformedQuery { name, detail } => {
                write!(f, "malformed query `{name}`: {detail}")
            }
            Self::Verification { method, detail } => {
                write!(f, "`{method}` failed verification against the schema: {detail}")
            }
            Self::RegistryAlreadyInitialized => {
                write!(f, "named query registry is already initialized")
            }
        }
    }
}

impl Error for QueryDerivationError {}

//! Named query registry.
//!
//! # Invariants
//! - Every registered text is parsed when registered; a malformed text never
//!   reaches a finder.
//! - The process-wide registry is installed once and read-only afterwards.

use crate::query::error::QueryDerivationError;
use crate::query::template::SqlTemplate;
use log::info;
use once_cell::sync::OnceCell;
use std::collections::BTreeMap;

static NAMED_QUERIES: OnceCell<NamedQueryRegistry> = OnceCell::new();

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NamedQuery {
    name: String,
    content: SqlTemplate,
    count: Option<SqlTemplate>,
}

impl NamedQuery {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn content(&self) -> &SqlTemplate {
        &self.content
    }

    /// Count text used when the query backs a paged finder.
    pub fn count(&self) -> Option<&SqlTemplate> {
        self.count.as_ref()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NamedQueryRegistry {
    queries: BTreeMap<String, NamedQuery>,
}

impl NamedQueryRegistry {
    pub fn builder() -> NamedQueryRegistryBuilder {
        NamedQueryRegistryBuilder::default()
    }

    /// Queries shipped with the crate.
    pub fn builtin() -> Result<Self, QueryDerivationError> {
        Ok(Self::builder()
            .register(
                "Member.findByUsername",
                "SELECT * FROM member WHERE username = :username",
            )?
            .register("Team.findByName", "SELECT * FROM team WHERE name = :name")?
            .build())
    }

    pub fn get(&self, name: &str) -> Option<&NamedQuery> {
        self.queries.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.queries.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.queries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queries.is_empty()
    }

    /// Registered names, sorted.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.queries.keys().map(String::as_str)
    }
}

#[derive(Debug, Default)]
pub struct NamedQueryRegistryBuilder {
    queries: BTreeMap<String, NamedQuery>,
}

impl NamedQueryRegistryBuilder {
    pub fn register(self, name: &str, text: &str) -> Result<Self, QueryDerivationError> {
        self.insert(name, text, None)
    }

    pub fn register_with_count(
        self,
        name: &str,
        text: &str,
        count: &str,
    ) -> Result<Self, QueryDerivationError> {
        self.insert(name, text, Some(count))
    }

    pub fn build(self) -> NamedQueryRegistry {
        NamedQueryRegistry {
            queries: self.queries,
        }
    }

    fn insert(
        mut self,
        name: &str,
        text: &str,
        count: Option<&str>,
    ) -> Result<Self, QueryDerivationError> {
        let name = name.trim();
        if !is_valid_name(name) {
            return Err(QueryDerivationError::MalformedQuery {
                name: name.to_string(),
                detail: "name must look like `Entity.method`".to_string(),
            });
        }
        if self.queries.contains_key(name) {
            return Err(QueryDerivationError::DuplicateNamedQuery(name.to_string()));
        }

        let content = SqlTemplate::parse(name, text)?;
        let count = count
            .map(|count| SqlTemplate::parse(&format!("{name}.count"), count))
            .transpose()?;
        self.queries.insert(
            name.to_string(),
            NamedQuery {
                name: name.to_string(),
                content,
                count,
            },
        );
        Ok(self)
    }
}

fn is_valid_name(name: &str) -> bool {
    let Some((entity, method)) = name.split_once('.') else {
        return false;
    };
    let is_word = |part: &str| {
        part.chars().next().is_some_and(|c| c.is_ascii_alphabetic())
            && part.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
    };
    is_word(entity) && is_word(method)
}

/// Process-wide registry, lazily initialized with [`NamedQueryRegistry::builtin`].
pub fn named_queries() -> Result<&'static NamedQueryRegistry, QueryDerivationError> {
    NAMED_QUERIES.get_or_try_init(|| {
        let registry = NamedQueryRegistry::builtin()?;
        info!(
            "event=named_queries_installed module=query status=ok source=builtin count={}",
            registry.len()
        );
        Ok(registry)
    })
}

/// Installs `registry` as the process-wide registry.
///
/// Must run before the first [`named_queries`] call.
pub fn install_named_queries(registry: NamedQueryRegistry) -> Result<(), QueryDerivationError> {
    let count = registry.len();
    NAMED_QUERIES
        .set(registry)
        .map_err(|_| QueryDerivationError::RegistryAlreadyInitialized)?;
    info!("event=named_queries_installed module=query status=ok source=host count={count}");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::{named_queries, NamedQueryRegistry};
    use crate::query::error::QueryDerivationError;

    #[test]
    fn builtin_registry_holds_conventional_keys() {
        let registry = named_queries().unwrap();
        let query = registry.get("Member.findByUsername").unwrap();
        assert_eq!(query.content().param_names(), vec!["username"]);
        assert!(registry.contains("Team.findByName"));
    }

    #[test]
    fn duplicates_and_bad_names_are_rejected() {
        let err = NamedQueryRegistry::builder()
            .register("Member.a", "SELECT 1")
            .unwrap()
            .register("Member.a", "SELECT 2")
            .unwrap_err();
        assert_eq!(err, QueryDerivationError::DuplicateNamedQuery("Member.a".into()));

        let err = NamedQueryRegistry::builder()
            .register("findByUsername", "SELECT 1")
            .unwrap_err();
        assert!(matches!(err, QueryDerivationError::MalformedQuery { .. }));
    }

    #[test]
    fn count_text_is_parsed_with_the_query() {
        let registry = NamedQueryRegistry::builder()
            .register_with_count(
                "Member.findAdults",
                "SELECT * FROM member WHERE age >= :age",
                "SELECT COUNT(*) FROM member WHERE age >= :age",
            )
            .unwrap()
            .build();
        let query = registry.get("Member.findAdults").unwrap();
        assert_eq!(query.count().unwrap().param_names(), vec!["age"]);
        assert_eq!(registry.names().collect::<Vec<_>>(), vec!["Member.findAdults"]);
    }
}

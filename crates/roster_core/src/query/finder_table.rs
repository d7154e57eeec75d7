//! Per-entity registration table of compiled finders.

use crate::query::error::QueryDerivationError;
use crate::query::plan::{FinderDeclaration, PlanOrigin, QueryPlan};
use crate::query::registry::NamedQueryRegistry;
use crate::store::entity::Entity;
use crate::store::error::{RepoError, RepoResult};
use log::{error, info};
use rusqlite::Connection;
use std::collections::BTreeMap;
use std::time::Instant;

#[derive(Debug, Clone)]
pub struct FinderTable {
    entity: &'static str,
    plans: BTreeMap<&'static str, QueryPlan>,
}

impl FinderTable {
    /// Compiles and verifies every declaration.
    ///
    /// The first failing declaration aborts the whole table.
    pub fn compile<E: Entity>(
        conn: &Connection,
        registry: &NamedQueryRegistry,
        declarations: &[FinderDeclaration],
    ) -> Result<Self, QueryDerivationError> {
        let started_at = Instant::now();
        let result = compile_plans::<E>(conn, registry, declarations);
        let duration_ms = started_at.elapsed().as_millis();

        match result {
            Ok(plans) => {
                let named = plans
                    .values()
                    .filter(|plan| matches!(plan.origin(), PlanOrigin::Named(_)))
                    .count();
                info!(
                    "event=finder_table_compiled module=query status=ok entity={} finders={} named={named} duration_ms={duration_ms}",
                    E::NAME,
                    plans.len()
                );
                Ok(Self {
                    entity: E::NAME,
                    plans,
                })
            }
            Err(err) => {
                error!(
                    "event=finder_table_compiled module=query status=error entity={} duration_ms={duration_ms} error={err}",
                    E::NAME
                );
                Err(err)
            }
        }
    }

    pub fn entity(&self) -> &'static str {
        self.entity
    }

    pub fn plan(&self, method: &str) -> RepoResult<&QueryPlan> {
        self.plans.get(method).ok_or_else(|| {
            RepoError::InvalidArgument(format!(
                "no finder `{method}` declared for {}",
                self.entity
            ))
        })
    }

    pub fn methods(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.plans.keys().copied()
    }

    pub fn len(&self) -> usize {
        self.plans.len()
    }

    pub fn is_empty(&self) -> bool {
        self.plans.is_empty()
    }
}

fn compile_plans<E: Entity>(
    conn: &Connection,
    registry: &NamedQueryRegistry,
    declarations: &[FinderDeclaration],
) -> Result<BTreeMap<&'static str, QueryPlan>, QueryDerivationError> {
    let mut plans = BTreeMap::new();
    for declaration in declarations {
        if plans.contains_key(declaration.method()) {
            return Err(QueryDerivationError::DuplicateFinder(
                declaration.method().to_string(),
            ));
        }
        let plan = QueryPlan::compile::<E>(declaration, registry)?;
        plan.verify(conn)?;
        plans.insert(declaration.method(), plan);
    }
    Ok(plans)
}

#[cfg(test)]
mod tests {
    use super::FinderTable;
    use crate::db::open_db_in_memory;
    use crate::model::team::Team;
    use crate::query::error::QueryDerivationError;
    use crate::query::plan::{FinderDeclaration, ResultShape};
    use crate::query::registry::NamedQueryRegistry;

    #[test]
    fn duplicate_methods_abort_compilation() {
        let conn = open_db_in_memory().unwrap();
        let declarations = [
            FinderDeclaration::derived("find_by_name_starting_with", ResultShape::List).param("prefix"),
            FinderDeclaration::derived("find_by_name_starting_with", ResultShape::List).param("prefix"),
        ];
        let err = FinderTable::compile::<Team>(&conn, &NamedQueryRegistry::default(), &declarations)
            .unwrap_err();
        assert_eq!(
            err,
            QueryDerivationError::DuplicateFinder("find_by_name_starting_with".into())
        );
    }

    #[test]
    fn compiled_table_exposes_plans_by_method() {
        let conn = open_db_in_memory().unwrap();
        let registry = NamedQueryRegistry::builtin().unwrap();
        let declarations = [
            FinderDeclaration::named("find_by_name", ResultShape::List).param("name"),
            FinderDeclaration::derived("count_by_name", ResultShape::Count).param("name"),
        ];
        let table = FinderTable::compile::<Team>(&conn, &registry, &declarations).unwrap();
        assert_eq!(table.len(), 2);
        assert_eq!(table.methods().collect::<Vec<_>>(), vec!["count_by_name", "find_by_name"]);
        assert!(table.plan("find_by_name").is_ok());
        assert!(table.plan("find_by_missing").is_err());
    }
}

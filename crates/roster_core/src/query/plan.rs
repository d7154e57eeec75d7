//! Finder declarations and their compiled, schema-verified plans.
//!
//! # Responsibility
//! - Resolve each declaration to exactly one query source.
//! - Check arguments, placeholders and result shape before any call runs.
//!
//! # Invariants
//! - A `QueryPlan` only exists for a declaration that compiled cleanly.
//! - Argument count and kinds are checked on every call against the
//!   declared parameters.

use crate::query::derive::{conventional_key, parse_method};
use crate::query::descriptor::{
    DerivedQuery, FetchJoin, Predicate, QueryBody, QueryDescriptor, Subject, Window,
};
use crate::query::error::QueryDerivationError;
use crate::query::registry::NamedQueryRegistry;
use crate::query::template::{Arg, Bindings, BoundQuery, ParamKind, SqlTemplate, StatementKind};
use crate::query::Projection;
use crate::store::entity::{entity_columns, Entity};
use crate::store::error::{RepoError, RepoResult};
use rusqlite::types::Value;
use rusqlite::Connection;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParamSpec {
    pub name: &'static str,
    pub kind: ParamKind,
}

impl ParamSpec {
    pub const fn scalar(name: &'static str) -> Self {
        Self {
            name,
            kind: ParamKind::Scalar,
        }
    }

    pub const fn sequence(name: &'static str) -> Self {
        Self {
            name,
            kind: ParamKind::Sequence,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QuerySource {
    /// Conventional named query if registered, otherwise decomposed from the name.
    Derived,
    /// Registered query; `None` uses the conventional key.
    Named(Option<String>),
    Text { query: String, count: Option<String> },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResultShape {
    /// Zero or one entity; more rows is an error.
    One,
    /// Same mapping as `One`, declared separately by the caller.
    Optional,
    List,
    /// First column of every row.
    Scalars,
    Projection(&'static [&'static str]),
    Page,
    Count,
    Exists,
    AffectedRows,
}

impl ResultShape {
    pub fn projection<P: Projection>() -> Self {
        Self::Projection(P::COLUMNS)
    }

    fn returns_entities(self) -> bool {
        matches!(self, Self::One | Self::Optional | Self::List | Self::Page)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FinderDeclaration {
    method: &'static str,
    source: QuerySource,
    params: Vec<ParamSpec>,
    shape: ResultShape,
    fetch_joins: Vec<FetchJoin>,
}

impl FinderDeclaration {
    fn with_source(method: &'static str, source: QuerySource, shape: ResultShape) -> Self {
        Self {
            method,
            source,
            params: Vec::new(),
            shape,
            fetch_joins: Vec::new(),
        }
    }

    pub fn derived(method: &'static str, shape: ResultShape) -> Self {
        Self::with_source(method, QuerySource::Derived, shape)
    }

    pub fn named(method: &'static str, shape: ResultShape) -> Self {
        Self::with_source(method, QuerySource::Named(None), shape)
    }

    pub fn named_as(method: &'static str, name: &str, shape: ResultShape) -> Self {
        Self::with_source(method, QuerySource::Named(Some(name.to_string())), shape)
    }

    pub fn text(method: &'static str, query: &str, shape: ResultShape) -> Self {
        Self::with_source(
            method,
            QuerySource::Text {
                query: query.to_string(),
                count: None,
            },
            shape,
        )
    }

    /// Count text for a paged text finder. Ignored for other sources.
    pub fn with_count_query(mut self, count_query: &str) -> Self {
        if let QuerySource::Text { count, .. } = &mut self.source {
            *count = Some(count_query.to_string());
        }
        self
    }

    pub fn param(mut self, name: &'static str) -> Self {
        self.params.push(ParamSpec::scalar(name));
        self
    }

    pub fn sequence_param(mut self, name: &'static str) -> Self {
        self.params.push(ParamSpec::sequence(name));
        self
    }

    /// Joins `join` into the content query of a derived finder.
    pub fn fetch_join(mut self, join: FetchJoin) -> Self {
        self.fetch_joins.push(join);
        self
    }

    pub fn method(&self) -> &'static str {
        self.method
    }

    pub fn source(&self) -> &QuerySource {
        &self.source
    }
}

/// Which source a plan was resolved from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlanOrigin {
    Derived,
    Named(String),
    Text,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryPlan {
    method: &'static str,
    origin: PlanOrigin,
    shape: ResultShape,
    params: Vec<ParamSpec>,
    descriptor: QueryDescriptor,
    row_columns: Vec<&'static str>,
}

impl QueryPlan {
    pub fn compile<E: Entity>(
        declaration: &FinderDeclaration,
        registry: &NamedQueryRegistry,
    ) -> Result<Self, QueryDerivationError> {
        let method = declaration.method;
        let shape = declaration.shape;
        let shape_mismatch = |detail: String| QueryDerivationError::ShapeMismatch {
            method: method.to_string(),
            detail,
        };

        let mut seen: Vec<&str> = Vec::new();
        for param in &declaration.params {
            if seen.contains(&param.name) {
                return Err(QueryDerivationError::ParameterMismatch {
                    method: method.to_string(),
                    detail: format!("parameter `{}` declared twice", param.name),
                });
            }
            seen.push(param.name);
        }

        let (origin, descriptor) = match &declaration.source {
            QuerySource::Derived => {
                let key = conventional_key(E::NAME, method);
                match registry.get(&key) {
                    Some(named) => (
                        PlanOrigin::Named(key),
                        QueryDescriptor::text::<E>(named.content().clone(), named.count().cloned()),
                    ),
                    None => (
                        PlanOrigin::Derived,
                        QueryDescriptor::derived::<E>(derive_query::<E>(declaration)?),
                    ),
                }
            }
            QuerySource::Named(name) => {
                let key = name
                    .clone()
                    .unwrap_or_else(|| conventional_key(E::NAME, method));
                let named =
                    registry
                        .get(&key)
                        .ok_or_else(|| QueryDerivationError::MissingNamedQuery {
                            method: method.to_string(),
                            name: key.clone(),
                        })?;
                (
                    PlanOrigin::Named(key),
                    QueryDescriptor::text::<E>(named.content().clone(), named.count().cloned()),
                )
            }
            QuerySource::Text { query, count } => {
                let content = SqlTemplate::parse(method, query)?;
                let count = count
                    .as_deref()
                    .map(|count| SqlTemplate::parse(&format!("{method}.count"), count))
                    .transpose()?;
                (PlanOrigin::Text, QueryDescriptor::text::<E>(content, count))
            }
        };

        match descriptor.body() {
            QueryBody::Derived(derived) => {
                let allowed = match derived.subject {
                    Subject::Find => shape.returns_entities(),
                    Subject::Count => shape == ResultShape::Count,
                    Subject::Exists => shape == ResultShape::Exists,
                };
                if !allowed {
                    return Err(shape_mismatch(format!(
                        "{:?} query cannot return {shape:?}",
                        derived.subject
                    )));
                }
            }
            QueryBody::Text { content, count } => {
                if !declaration.fetch_joins.is_empty() {
                    return Err(shape_mismatch(
                        "fetch joins apply to derived finders only".to_string(),
                    ));
                }
                check_text_shape(content, shape).map_err(shape_mismatch)?;
                check_placeholders(method, &declaration.params, content, count.as_ref())?;
                if shape == ResultShape::Page && count.is_none() {
                    return Err(QueryDerivationError::MissingCountQuery {
                        method: method.to_string(),
                    });
                }
            }
        }

        let row_columns = match shape {
            _ if shape.returns_entities() => entity_columns::<E>(),
            ResultShape::Projection(columns) => columns.to_vec(),
            _ => Vec::new(),
        };

        Ok(Self {
            method,
            origin,
            shape,
            params: declaration.params.clone(),
            descriptor,
            row_columns,
        })
    }

    pub fn method(&self) -> &'static str {
        self.method
    }

    pub fn origin(&self) -> &PlanOrigin {
        &self.origin
    }

    pub fn shape(&self) -> ResultShape {
        self.shape
    }

    pub fn params(&self) -> &[ParamSpec] {
        &self.params
    }

    pub fn descriptor(&self) -> &QueryDescriptor {
        &self.descriptor
    }

    /// Pairs call arguments with the declared parameters.
    pub fn bind<'a>(&self, args: &'a [Arg]) -> RepoResult<Bindings<'a>> {
        if args.len() != self.params.len() {
            return Err(RepoError::InvalidArgument(format!(
                "`{}` takes {} argument(s), got {}",
                self.method,
                self.params.len(),
                args.len()
            )));
        }
        let mut entries = Vec::with_capacity(args.len());
        for (param, arg) in self.params.iter().zip(args) {
            if arg.kind() != param.kind {
                return Err(RepoError::InvalidArgument(format!(
                    "`{}` parameter `{}` expects a {:?} argument",
                    self.method, param.name, param.kind
                )));
            }
            entries.push((param.name, arg));
        }
        Ok(Bindings::new(entries))
    }

    /// Prepares the plan's statements against `conn` and checks result columns.
    pub fn verify(&self, conn: &Connection) -> Result<(), QueryDerivationError> {
        let failed = |detail: String| QueryDerivationError::Verification {
            method: self.method.to_string(),
            detail,
        };

        // Sequences get two elements so a doubly parenthesized `IN` fails here.
        let probes: Vec<Arg> = self
            .params
            .iter()
            .map(|param| match param.kind {
                ParamKind::Scalar => Arg::Scalar(Value::Text(String::new())),
                ParamKind::Sequence => Arg::Sequence(vec![
                    Value::Text(String::new()),
                    Value::Text(String::new()),
                ]),
            })
            .collect();
        let bindings = self.bind(&probes).map_err(|err| failed(err.to_string()))?;

        if self.shape == ResultShape::Page {
            let content = self
                .descriptor
                .render_content(&bindings, &[], Some(Window { offset: 0, limit: 1 }))
                .map_err(|err| failed(err.to_string()))?;
            self.verify_statement(conn, &content, ResultShape::List)
                .map_err(&failed)?;
            let count = self
                .descriptor
                .render_count(&bindings)
                .map_err(|err| failed(err.to_string()))?;
            self.verify_statement(conn, &count, ResultShape::Count)
                .map_err(&failed)
        } else {
            let content = self
                .descriptor
                .render_content(&bindings, &[], None)
                .map_err(|err| failed(err.to_string()))?;
            self.verify_statement(conn, &content, self.shape)
                .map_err(&failed)
        }
    }

    fn verify_statement(
        &self,
        conn: &Connection,
        query: &BoundQuery,
        shape: ResultShape,
    ) -> Result<(), String> {
        let stmt = conn.prepare(&query.sql).map_err(|err| err.to_string())?;
        let columns = stmt.column_names();
        match shape {
            ResultShape::Scalars | ResultShape::Count | ResultShape::Exists => {
                if columns.len() != 1 {
                    return Err(format!("expected one column, got {}", columns.len()));
                }
            }
            ResultShape::AffectedRows => {}
            ResultShape::Projection(_) => {
                if columns.len() != self.row_columns.len() {
                    return Err(format!(
                        "expected columns {:?}, got {columns:?}",
                        self.row_columns
                    ));
                }
                if let Some(missing) = self.missing_column(&columns) {
                    return Err(format!("column `{missing}` missing from result"));
                }
            }
            _ => {
                if let Some(missing) = self.missing_column(&columns) {
                    return Err(format!("column `{missing}` missing from result"));
                }
            }
        }
        Ok(())
    }

    fn missing_column(&self, columns: &[&str]) -> Option<&'static str> {
        self.row_columns
            .iter()
            .find(|expected| !columns.contains(*expected))
            .copied()
    }
}

fn derive_query<E: Entity>(
    declaration: &FinderDeclaration,
) -> Result<DerivedQuery, QueryDerivationError> {
    let method = declaration.method;
    let parsed = parse_method::<E>(method)?;
    let mismatch = |detail: String| QueryDerivationError::ParameterMismatch {
        method: method.to_string(),
        detail,
    };

    if parsed.arity() != declaration.params.len() {
        return Err(mismatch(format!(
            "criteria take {} argument(s), {} declared",
            parsed.arity(),
            declaration.params.len()
        )));
    }

    let mut params = declaration.params.iter();
    let mut predicates = Vec::with_capacity(parsed.criteria.len());
    for (column, operator) in parsed.criteria {
        let mut names = Vec::with_capacity(operator.arity());
        for _ in 0..operator.arity() {
            let param = params
                .next()
                .ok_or_else(|| mismatch("not enough parameters declared".to_string()))?;
            let expected = if operator.takes_sequence() {
                ParamKind::Sequence
            } else {
                ParamKind::Scalar
            };
            if param.kind != expected {
                return Err(mismatch(format!(
                    "parameter `{}` for `{column}` must be {expected:?}",
                    param.name
                )));
            }
            names.push(param.name);
        }
        predicates.push(Predicate {
            column,
            operator,
            params: names,
        });
    }

    if !declaration.fetch_joins.is_empty() && parsed.subject != Subject::Find {
        return Err(QueryDerivationError::ShapeMismatch {
            method: method.to_string(),
            detail: "fetch joins apply to entity results only".to_string(),
        });
    }

    Ok(DerivedQuery {
        subject: parsed.subject,
        predicates,
        ordering: parsed.ordering,
        fetch_joins: declaration.fetch_joins.clone(),
    })
}

fn check_text_shape(content: &SqlTemplate, shape: ResultShape) -> Result<(), String> {
    match (content.statement_kind(), shape) {
        (StatementKind::Update | StatementKind::Delete, ResultShape::AffectedRows) => Ok(()),
        (StatementKind::Select, shape) if shape != ResultShape::AffectedRows => Ok(()),
        (kind, shape) => Err(format!("{kind:?} statement cannot return {shape:?}")),
    }
}

fn check_placeholders(
    method: &str,
    params: &[ParamSpec],
    content: &SqlTemplate,
    count: Option<&SqlTemplate>,
) -> Result<(), QueryDerivationError> {
    let mismatch = |detail: String| QueryDerivationError::ParameterMismatch {
        method: method.to_string(),
        detail,
    };
    let declared: Vec<&str> = params.iter().map(|param| param.name).collect();
    let used = content.param_names();

    if let Some(unknown) = used.iter().find(|name| !declared.contains(*name)) {
        return Err(mismatch(format!("placeholder `:{unknown}` has no declared parameter")));
    }
    if let Some(unused) = declared.iter().find(|name| !used.contains(*name)) {
        return Err(mismatch(format!("parameter `{unused}` is not used by the query")));
    }
    if let Some(count) = count {
        if let Some(unknown) = count
            .param_names()
            .into_iter()
            .find(|name| !declared.contains(name))
        {
            return Err(mismatch(format!(
                "count placeholder `:{unknown}` has no declared parameter"
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::{FinderDeclaration, PlanOrigin, QueryPlan, ResultShape};
    use crate::db::open_db_in_memory;
    use crate::model::member::Member;
    use crate::model::member_dto::MemberDto;
    use crate::query::descriptor::FetchJoin;
    use crate::query::error::QueryDerivationError;
    use crate::query::registry::NamedQueryRegistry;
    use crate::query::template::Arg;

    fn registry() -> NamedQueryRegistry {
        NamedQueryRegistry::builtin().expect("builtin named queries")
    }

    #[test]
    fn derived_declaration_prefers_conventional_named_query() {
        let decl = FinderDeclaration::derived("find_by_username", ResultShape::List).param("username");
        let plan = QueryPlan::compile::<Member>(&decl, &registry()).unwrap();
        assert_eq!(plan.origin(), &PlanOrigin::Named("Member.findByUsername".into()));

        let empty = NamedQueryRegistry::default();
        let plan = QueryPlan::compile::<Member>(&decl, &empty).unwrap();
        assert_eq!(plan.origin(), &PlanOrigin::Derived);
    }

    #[test]
    fn explicit_named_source_fails_fast_when_missing() {
        let decl = FinderDeclaration::named("find_by_username", ResultShape::List).param("username");
        let err = QueryPlan::compile::<Member>(&decl, &NamedQueryRegistry::default()).unwrap_err();
        assert!(matches!(err, QueryDerivationError::MissingNamedQuery { .. }));
    }

    #[test]
    fn argument_count_and_kinds_are_checked() {
        let decl = FinderDeclaration::derived("find_by_username_and_age_greater_than", ResultShape::List)
            .param("username");
        let err = QueryPlan::compile::<Member>(&decl, &registry()).unwrap_err();
        assert!(matches!(err, QueryDerivationError::ParameterMismatch { .. }));

        let decl = FinderDeclaration::derived("find_by_username_in", ResultShape::List).param("names");
        let err = QueryPlan::compile::<Member>(&decl, &registry()).unwrap_err();
        assert!(matches!(err, QueryDerivationError::ParameterMismatch { .. }));

        let decl = FinderDeclaration::derived("find_by_username_in", ResultShape::List)
            .sequence_param("names");
        let plan = QueryPlan::compile::<Member>(&decl, &registry()).unwrap();
        assert!(plan.bind(&[Arg::text("a")]).is_err());
        assert!(plan.bind(&[Arg::texts(&["a"])]).is_ok());
    }

    #[test]
    fn text_shapes_and_placeholders_are_checked() {
        let decl = FinderDeclaration::text(
            "bump",
            "UPDATE member SET age = age + 1 WHERE age >= :age",
            ResultShape::List,
        )
        .param("age");
        assert!(matches!(
            QueryPlan::compile::<Member>(&decl, &registry()).unwrap_err(),
            QueryDerivationError::ShapeMismatch { .. }
        ));

        let decl = FinderDeclaration::text(
            "find_members",
            "SELECT * FROM member WHERE username = :username",
            ResultShape::List,
        )
        .param("name");
        assert!(matches!(
            QueryPlan::compile::<Member>(&decl, &registry()).unwrap_err(),
            QueryDerivationError::ParameterMismatch { .. }
        ));

        let decl = FinderDeclaration::text("page_all", "SELECT * FROM member", ResultShape::Page);
        assert!(matches!(
            QueryPlan::compile::<Member>(&decl, &registry()).unwrap_err(),
            QueryDerivationError::MissingCountQuery { .. }
        ));
    }

    #[test]
    fn shape_must_agree_with_derived_subject() {
        let decl = FinderDeclaration::derived("count_by_age", ResultShape::List).param("age");
        assert!(matches!(
            QueryPlan::compile::<Member>(&decl, &registry()).unwrap_err(),
            QueryDerivationError::ShapeMismatch { .. }
        ));

        let decl = FinderDeclaration::derived("count_by_age", ResultShape::Count)
            .param("age")
            .fetch_join(FetchJoin::many_to_one("team", "team_id"));
        assert!(QueryPlan::compile::<Member>(&decl, &registry()).is_err());
    }

    #[test]
    fn verification_catches_schema_and_column_errors() {
        let conn = open_db_in_memory().unwrap();

        let decl = FinderDeclaration::text(
            "find_ghosts",
            "SELECT * FROM ghost WHERE name = :name",
            ResultShape::List,
        )
        .param("name");
        let plan = QueryPlan::compile::<Member>(&decl, &registry()).unwrap();
        assert!(matches!(
            plan.verify(&conn).unwrap_err(),
            QueryDerivationError::Verification { .. }
        ));

        let decl = FinderDeclaration::text("find_names", "SELECT username FROM member", ResultShape::List);
        let plan = QueryPlan::compile::<Member>(&decl, &registry()).unwrap();
        assert!(plan.verify(&conn).is_err());

        let decl = FinderDeclaration::text(
            "find_dtos",
            "SELECT m.id AS id, m.username AS username, t.name AS team_name \
             FROM member m JOIN team t ON t.id = m.team_id",
            ResultShape::projection::<MemberDto>(),
        );
        let plan = QueryPlan::compile::<Member>(&decl, &registry()).unwrap();
        plan.verify(&conn).unwrap();

        let decl = FinderDeclaration::derived("find_by_age", ResultShape::Page)
            .param("age")
            .fetch_join(FetchJoin::many_to_one("team", "team_id"));
        let plan = QueryPlan::compile::<Member>(&decl, &registry()).unwrap();
        plan.verify(&conn).unwrap();
    }

    #[test]
    fn verification_rejects_parenthesized_sequence_placeholder() {
        let conn = open_db_in_memory().expect("open db");

        let decl = FinderDeclaration::text(
            "find_in_wrapped",
            "SELECT * FROM member WHERE username IN (:names)",
            ResultShape::List,
        )
        .sequence_param("names");
        let plan = QueryPlan::compile::<Member>(&decl, &registry()).expect("text finder should compile");
        assert!(matches!(
            plan.verify(&conn).unwrap_err(),
            QueryDerivationError::Verification { .. }
        ));

        let decl = FinderDeclaration::text(
            "find_in",
            "SELECT * FROM member WHERE username IN :names",
            ResultShape::List,
        )
        .sequence_param("names");
        let plan = QueryPlan::compile::<Member>(&decl, &registry()).expect("text finder should compile");
        plan.verify(&conn).expect("bare sequence placeholder should verify");
    }

    #[test]
    fn named_as_resolves_a_query_under_its_own_name() {
        let registry = NamedQueryRegistry::builder()
            .register("Member.byLogin", "SELECT * FROM member WHERE username = :login")
            .expect("valid named query")
            .build();

        let decl = FinderDeclaration::named_as("find_member_by_login", "Member.byLogin", ResultShape::One)
            .param("login");
        let plan = QueryPlan::compile::<Member>(&decl, &registry).expect("named_as should resolve");
        assert_eq!(plan.origin(), &PlanOrigin::Named("Member.byLogin".into()));

        let decl = FinderDeclaration::named("find_member_by_login", ResultShape::One).param("login");
        assert!(matches!(
            QueryPlan::compile::<Member>(&decl, &registry).unwrap_err(),
            QueryDerivationError::MissingNamedQuery { .. }
        ));
    }
}

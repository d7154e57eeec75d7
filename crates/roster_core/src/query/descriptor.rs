//! Immutable description of one declared query and its SQL rendering.
//!
//! # Invariants
//! - Count queries never carry ordering, windows or fetch joins.
//! - Derived SQL is built from entity metadata; only values are bound.

use crate::query::error::QueryDerivationError;
use crate::query::sort::ColumnOrder;
use crate::query::template::{Arg, Bindings, BoundQuery, SqlTemplate};
use crate::store::entity::{select_list, Entity};
use crate::store::error::{RepoError, RepoResult};
use rusqlite::types::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    Equal,
    NotEqual,
    GreaterThan,
    GreaterThanEqual,
    LessThan,
    LessThanEqual,
    Between,
    In,
    NotIn,
    Like,
    NotLike,
    StartingWith,
    EndingWith,
    Containing,
    IsNull,
    IsNotNull,
}

impl Operator {
    /// Number of arguments the operator consumes.
    pub fn arity(self) -> usize {
        match self {
            Self::Between => 2,
            Self::IsNull | Self::IsNotNull => 0,
            _ => 1,
        }
    }

    pub fn takes_sequence(self) -> bool {
        matches!(self, Self::In | Self::NotIn)
    }
}

/// One filter term of a derived query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Predicate {
    pub column: &'static str,
    pub operator: Operator,
    /// Declared parameter names consumed by this term, in order.
    pub params: Vec<&'static str>,
}

impl Predicate {
    fn render(&self, table: &str, query: &mut BoundQuery, bindings: &Bindings<'_>) -> RepoResult<()> {
        let column = format!("{table}.{}", self.column);
        let args = self
            .params
            .iter()
            .map(|name| bindings.get(name).map(|arg| (*name, arg)))
            .collect::<RepoResult<Vec<_>>>()?;
        let scalar = |index: usize| -> RepoResult<Value> {
            let (name, arg) = args.get(index).ok_or_else(|| {
                RepoError::InvalidArgument(format!("missing argument for `{column}`"))
            })?;
            arg.as_scalar(name).cloned()
        };

        match self.operator {
            Operator::Equal => match scalar(0)? {
                Value::Null => query.push_sql(&format!("{column} IS NULL")),
                value => {
                    query.push_sql(&format!("{column} = "));
                    query.bind_value(value);
                }
            },
            Operator::NotEqual => match scalar(0)? {
                Value::Null => query.push_sql(&format!("{column} IS NOT NULL")),
                value => {
                    query.push_sql(&format!("{column} <> "));
                    query.bind_value(value);
                }
            },
            Operator::GreaterThan
            | Operator::GreaterThanEqual
            | Operator::LessThan
            | Operator::LessThanEqual => {
                let symbol = match self.operator {
                    Operator::GreaterThan => ">",
                    Operator::GreaterThanEqual => ">=",
                    Operator::LessThan => "<",
                    _ => "<=",
                };
                query.push_sql(&format!("{column} {symbol} "));
                query.bind_value(scalar(0)?);
            }
            Operator::Between => {
                query.push_sql(&format!("{column} BETWEEN "));
                query.bind_value(scalar(0)?);
                query.push_sql(" AND ");
                query.bind_value(scalar(1)?);
            }
            Operator::In | Operator::NotIn => {
                let (name, arg) = args.first().ok_or_else(|| {
                    RepoError::InvalidArgument(format!("missing argument for `{column}`"))
                })?;
                if !matches!(arg, Arg::Sequence(_)) {
                    return Err(RepoError::InvalidArgument(format!(
                        "parameter `{name}` expects a sequence"
                    )));
                }
                let keyword = if self.operator == Operator::In { "IN" } else { "NOT IN" };
                query.push_sql(&format!("{column} {keyword} "));
                query.bind_arg(arg);
            }
            Operator::Like | Operator::NotLike => {
                let keyword = if self.operator == Operator::Like { "LIKE" } else { "NOT LIKE" };
                query.push_sql(&format!("{column} {keyword} "));
                query.bind_value(scalar(0)?);
            }
            Operator::StartingWith | Operator::EndingWith | Operator::Containing => {
                let pattern = like_pattern(self.operator, scalar(0)?)?;
                query.push_sql(&format!("{column} LIKE "));
                query.bind_value(pattern);
                query.push_sql(" ESCAPE '\\'");
            }
            Operator::IsNull => query.push_sql(&format!("{column} IS NULL")),
            Operator::IsNotNull => query.push_sql(&format!("{column} IS NOT NULL")),
        }
        Ok(())
    }
}

fn like_pattern(operator: Operator, value: Value) -> RepoResult<Value> {
    let Value::Text(text) = value else {
        return Err(RepoError::InvalidArgument(
            "pattern operators require a text argument".to_string(),
        ));
    };
    let escaped = text
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_");
    let pattern = match operator {
        Operator::StartingWith => format!("{escaped}%"),
        Operator::EndingWith => format!("%{escaped}"),
        _ => format!("%{escaped}%"),
    };
    Ok(Value::Text(pattern))
}

/// Join rendered into content queries only.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchJoin {
    pub table: &'static str,
    pub local_column: &'static str,
    pub target_column: &'static str,
}

impl FetchJoin {
    /// Joins `table.id` on the owning entity's `local_column`.
    pub const fn many_to_one(table: &'static str, local_column: &'static str) -> Self {
        Self {
            table,
            local_column,
            target_column: "id",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Subject {
    Find,
    Count,
    Exists,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DerivedQuery {
    pub subject: Subject,
    pub predicates: Vec<Predicate>,
    pub ordering: Vec<ColumnOrder>,
    pub fetch_joins: Vec<FetchJoin>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryBody {
    Derived(DerivedQuery),
    Text {
        content: SqlTemplate,
        count: Option<SqlTemplate>,
    },
}

/// Bounded result window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Window {
    pub offset: i64,
    pub limit: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryDescriptor {
    entity: &'static str,
    table: &'static str,
    select_list: String,
    body: QueryBody,
}

impl QueryDescriptor {
    pub fn derived<E: Entity>(query: DerivedQuery) -> Self {
        Self {
            entity: E::NAME,
            table: E::TABLE,
            select_list: select_list::<E>(),
            body: QueryBody::Derived(query),
        }
    }

    pub fn text<E: Entity>(content: SqlTemplate, count: Option<SqlTemplate>) -> Self {
        Self {
            entity: E::NAME,
            table: E::TABLE,
            select_list: select_list::<E>(),
            body: QueryBody::Text { content, count },
        }
    }

    /// Every row of `E`, no filter.
    pub fn unfiltered<E: Entity>() -> Self {
        Self::derived::<E>(DerivedQuery {
            subject: Subject::Find,
            predicates: Vec::new(),
            ordering: Vec::new(),
            fetch_joins: Vec::new(),
        })
    }

    pub fn entity(&self) -> &'static str {
        self.entity
    }

    pub fn body(&self) -> &QueryBody {
        &self.body
    }

    /// Content query, with `extra_order` appended after any declared ordering.
    pub fn render_content(
        &self,
        bindings: &Bindings<'_>,
        extra_order: &[ColumnOrder],
        window: Option<Window>,
    ) -> RepoResult<BoundQuery> {
        let mut query = BoundQuery::default();
        match &self.body {
            QueryBody::Derived(derived) => {
                match derived.subject {
                    Subject::Find => {
                        query.push_sql(&format!("SELECT {} FROM {}", self.select_list, self.table));
                        for join in &derived.fetch_joins {
                            query.push_sql(&format!(
                                " LEFT JOIN {joined} ON {joined}.{target} = {table}.{local}",
                                joined = join.table,
                                target = join.target_column,
                                table = self.table,
                                local = join.local_column,
                            ));
                        }
                        self.render_filter(derived, &mut query, bindings)?;
                        let orders: Vec<String> = derived
                            .ordering
                            .iter()
                            .chain(extra_order)
                            .map(|order| order.render(Some(self.table)))
                            .collect();
                        push_order_by(&mut query, &orders);
                    }
                    Subject::Count => {
                        query.push_sql(&format!("SELECT COUNT(*) FROM {}", self.table));
                        self.render_filter(derived, &mut query, bindings)?;
                    }
                    Subject::Exists => {
                        query.push_sql(&format!("SELECT EXISTS(SELECT 1 FROM {}", self.table));
                        self.render_filter(derived, &mut query, bindings)?;
                        query.push_sql(")");
                    }
                }
            }
            QueryBody::Text { content, .. } => {
                if extra_order.is_empty() && window.is_none() {
                    content.render_into(&mut query, bindings)?;
                } else {
                    query.push_sql("SELECT * FROM (");
                    content.render_into(&mut query, bindings)?;
                    query.push_sql(") AS windowed");
                    let orders: Vec<String> =
                        extra_order.iter().map(|order| order.render(None)).collect();
                    push_order_by(&mut query, &orders);
                }
            }
        }

        if let Some(window) = window {
            query.push_sql(" LIMIT ");
            query.bind_value(Value::Integer(window.limit));
            query.push_sql(" OFFSET ");
            query.bind_value(Value::Integer(window.offset));
        }
        Ok(query)
    }

    /// Unbounded count matching the content filter.
    ///
    /// Derived counts drop ordering and fetch joins so join fan-out cannot
    /// inflate the total. Text queries use their declared count text.
    pub fn render_count(&self, bindings: &Bindings<'_>) -> RepoResult<BoundQuery> {
        match &self.body {
            QueryBody::Derived(derived) => {
                let mut query = BoundQuery::default();
                query.push_sql(&format!("SELECT COUNT(*) FROM {}", self.table));
                self.render_filter(derived, &mut query, bindings)?;
                Ok(query)
            }
            QueryBody::Text {
                count: Some(count), ..
            } => count.render(bindings),
            QueryBody::Text { count: None, .. } => Err(RepoError::QueryDerivation(
                QueryDerivationError::MissingCountQuery {
                    method: self.entity.to_string(),
                },
            )),
        }
    }

    fn render_filter(
        &self,
        derived: &DerivedQuery,
        query: &mut BoundQuery,
        bindings: &Bindings<'_>,
    ) -> RepoResult<()> {
        for (index, predicate) in derived.predicates.iter().enumerate() {
            query.push_sql(if index == 0 { " WHERE " } else { " AND " });
            predicate.render(self.table, query, bindings)?;
        }
        Ok(())
    }
}

fn push_order_by(query: &mut BoundQuery, orders: &[String]) {
    if !orders.is_empty() {
        query.push_sql(" ORDER BY ");
        query.push_sql(&orders.join(", "));
    }
}

#[cfg(test)]
mod tests {
    use super::{DerivedQuery, FetchJoin, Operator, Predicate, QueryDescriptor, Subject, Window};
    use crate::model::member::Member;
    use crate::query::sort::{ColumnOrder, Direction};
    use crate::query::template::{Arg, Bindings};
    use rusqlite::types::Value;

    fn by_age_descriptor() -> QueryDescriptor {
        QueryDescriptor::derived::<Member>(DerivedQuery {
            subject: Subject::Find,
            predicates: vec![Predicate {
                column: "age",
                operator: Operator::Equal,
                params: vec!["age"],
            }],
            ordering: vec![ColumnOrder::new("username", Direction::Desc)],
            fetch_joins: vec![FetchJoin::many_to_one("team", "team_id")],
        })
    }

    #[test]
    fn count_query_drops_joins_ordering_and_window() {
        let age = Arg::scalar(25);
        let bindings = Bindings::new(vec![("age", &age)]);
        let descriptor = by_age_descriptor();

        let content = descriptor
            .render_content(&bindings, &[], Some(Window { offset: 3, limit: 3 }))
            .unwrap();
        assert!(content.sql.contains("LEFT JOIN team ON team.id = member.team_id"));
        assert!(content.sql.contains("ORDER BY member.username DESC"));
        assert!(content.sql.ends_with("LIMIT ? OFFSET ?"));
        assert_eq!(content.values.len(), 3);

        let count = descriptor.render_count(&bindings).unwrap();
        assert_eq!(count.sql, "SELECT COUNT(*) FROM member WHERE member.age = ?");
        assert_eq!(count.values, vec![Value::Integer(25)]);
    }

    #[test]
    fn equality_against_null_renders_is_null() {
        let descriptor = QueryDescriptor::derived::<Member>(DerivedQuery {
            subject: Subject::Count,
            predicates: vec![Predicate {
                column: "team_id",
                operator: Operator::Equal,
                params: vec!["team_id"],
            }],
            ordering: Vec::new(),
            fetch_joins: Vec::new(),
        });
        let team = Arg::null();
        let query = descriptor
            .render_content(&Bindings::new(vec![("team_id", &team)]), &[], None)
            .unwrap();
        assert_eq!(query.sql, "SELECT COUNT(*) FROM member WHERE member.team_id IS NULL");
        assert!(query.values.is_empty());
    }

    #[test]
    fn pattern_operators_escape_wildcards() {
        let descriptor = QueryDescriptor::derived::<Member>(DerivedQuery {
            subject: Subject::Find,
            predicates: vec![Predicate {
                column: "username",
                operator: Operator::StartingWith,
                params: vec!["prefix"],
            }],
            ordering: Vec::new(),
            fetch_joins: Vec::new(),
        });
        let prefix = Arg::text("50%_");
        let query = descriptor
            .render_content(&Bindings::new(vec![("prefix", &prefix)]), &[], None)
            .unwrap();
        assert!(query.sql.ends_with("member.username LIKE ? ESCAPE '\\'"));
        assert_eq!(query.values, vec![Value::Text("50\\%\\_%".to_string())]);
    }
}

//! Caller-facing ordering.
//!
//! Properties are resolved against entity metadata before they reach SQL.
//! Rows that tie on every sort key come back in unspecified order.

use crate::store::entity::{resolve_column, Entity};
use crate::store::error::{RepoError, RepoResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Direction {
    #[default]
    Asc,
    Desc,
}

impl Direction {
    pub(crate) fn keyword(self) -> &'static str {
        match self {
            Self::Asc => "ASC",
            Self::Desc => "DESC",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortOrder {
    pub property: String,
    pub direction: Direction,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Sort {
    orders: Vec<SortOrder>,
}

impl Sort {
    pub fn unsorted() -> Self {
        Self::default()
    }

    pub fn by(direction: Direction, properties: &[&str]) -> Self {
        Self {
            orders: properties
                .iter()
                .map(|property| SortOrder {
                    property: (*property).to_string(),
                    direction,
                })
                .collect(),
        }
    }

    pub fn asc(property: &str) -> Self {
        Self::by(Direction::Asc, &[property])
    }

    pub fn desc(property: &str) -> Self {
        Self::by(Direction::Desc, &[property])
    }

    pub fn and(mut self, other: Sort) -> Self {
        self.orders.extend(other.orders);
        self
    }

    pub fn orders(&self) -> &[SortOrder] {
        &self.orders
    }

    pub(crate) fn resolve<E: Entity>(&self) -> RepoResult<Vec<ColumnOrder>> {
        self.orders
            .iter()
            .map(|order| {
                resolve_column::<E>(&order.property)
                    .map(|column| ColumnOrder::new(column, order.direction))
                    .ok_or_else(|| {
                        RepoError::InvalidArgument(format!(
                            "unknown sort property `{}` for {}",
                            order.property,
                            E::NAME
                        ))
                    })
            })
            .collect()
    }
}

/// Sort key already resolved to a schema column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColumnOrder {
    pub column: &'static str,
    pub direction: Direction,
}

impl ColumnOrder {
    pub const fn new(column: &'static str, direction: Direction) -> Self {
        Self { column, direction }
    }

    pub(crate) fn render(&self, qualifier: Option<&str>) -> String {
        match qualifier {
            Some(table) => format!("{table}.{} {}", self.column, self.direction.keyword()),
            None => format!("{} {}", self.column, self.direction.keyword()),
        }
    }
}

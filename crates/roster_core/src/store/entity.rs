//! Entity metadata contract.
//!
//! Every persisted record type describes its table, its writable fields and
//! how to map a row back. Generated SQL takes column names from this metadata
//! only, never from caller-supplied text.

use crate::model::audit::AuditMetadata;
use crate::store::error::RepoResult;
use rusqlite::types::Value;
use rusqlite::Row;

/// Surrogate key assigned by the store on first persist.
pub type EntityId = i64;

pub const ID_COLUMN: &str = "id";

/// Audit columns present on every entity table, in insert order.
pub const AUDIT_COLUMNS: [&str; 4] = ["created_at", "updated_at", "created_by", "updated_by"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Text,
    Integer,
    /// Nullable foreign key to another entity's identity.
    Reference,
}

/// One writable attribute of an entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldMeta {
    /// Property name used by finder method names and sort keys.
    pub name: &'static str,
    pub column: &'static str,
    pub kind: FieldKind,
}

impl FieldMeta {
    pub const fn new(name: &'static str, column: &'static str, kind: FieldKind) -> Self {
        Self { name, column, kind }
    }
}

pub trait Entity: Sized {
    /// Logical name, also the prefix of conventional named-query keys.
    const NAME: &'static str;
    const TABLE: &'static str;
    /// Writable fields, excluding identity and audit columns.
    const FIELDS: &'static [FieldMeta];

    fn id(&self) -> Option<EntityId>;
    fn assign_id(&mut self, id: EntityId);
    fn audit(&self) -> &AuditMetadata;
    fn audit_mut(&mut self) -> &mut AuditMetadata;
    /// Values for [`Entity::FIELDS`], in the same order.
    fn field_values(&self) -> Vec<Value>;
    fn from_row(row: &Row<'_>) -> RepoResult<Self>;

    fn field(name: &str) -> Option<&'static FieldMeta> {
        Self::FIELDS.iter().find(|field| field.name == name)
    }
}

/// Every column a full entity row carries: id, fields, audit.
pub fn entity_columns<E: Entity>() -> Vec<&'static str> {
    std::iter::once(ID_COLUMN)
        .chain(E::FIELDS.iter().map(|field| field.column))
        .chain(AUDIT_COLUMNS)
        .collect()
}

/// Table-qualified, aliased select list for full entity rows.
pub fn select_list<E: Entity>() -> String {
    entity_columns::<E>()
        .into_iter()
        .map(|column| format!("{table}.{column} AS {column}", table = E::TABLE))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Resolves a property name used in sort keys or method names to its column.
///
/// Accepts the identity, any writable field and the audit properties.
pub fn resolve_column<E: Entity>(property: &str) -> Option<&'static str> {
    if property == ID_COLUMN {
        return Some(ID_COLUMN);
    }
    if let Some(field) = E::field(property) {
        return Some(field.column);
    }
    AUDIT_COLUMNS
        .into_iter()
        .find(|column| *column == property)
}

pub(crate) fn optional_text(value: Option<&str>) -> Value {
    value.map_or(Value::Null, |text| Value::Text(text.to_owned()))
}

pub(crate) fn optional_integer(value: Option<i64>) -> Value {
    value.map_or(Value::Null, Value::Integer)
}

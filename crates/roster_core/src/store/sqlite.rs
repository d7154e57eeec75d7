//! SQLite-backed entity store.

use crate::audit::AuditInterceptor;
use crate::query::descriptor::QueryDescriptor;
use crate::query::sort::Sort;
use crate::query::template::{Bindings, BoundQuery};
use crate::store::entity::{
    entity_columns, select_list, Entity, EntityId, AUDIT_COLUMNS, ID_COLUMN,
};
use crate::store::error::{RepoError, RepoResult};
use log::{error, info};
use rusqlite::types::Value;
use rusqlite::{params_from_iter, Connection, OptionalExtension, Row};
use std::marker::PhantomData;
use std::sync::Arc;
use std::time::Instant;

/// Store for one entity type, borrowing a migrated connection.
pub struct SqliteEntityStore<'conn, E> {
    conn: &'conn Connection,
    audit: Arc<AuditInterceptor>,
    _entity: PhantomData<fn() -> E>,
}

impl<'conn, E: Entity> SqliteEntityStore<'conn, E> {
    /// Creates a store after checking the entity table and columns exist.
    pub fn try_new(conn: &'conn Connection, audit: Arc<AuditInterceptor>) -> RepoResult<Self> {
        ensure_entity_table::<E>(conn)?;
        Ok(Self {
            conn,
            audit,
            _entity: PhantomData,
        })
    }

    pub fn connection(&self) -> &'conn Connection {
        self.conn
    }

    pub fn audit(&self) -> &AuditInterceptor {
        &self.audit
    }

    /// Persists a new entity and returns it with its assigned identity.
    pub fn insert(&self, mut entity: E) -> RepoResult<E> {
        if let Some(id) = entity.id() {
            return Err(RepoError::InvalidArgument(format!(
                "{} {id} already has an identity",
                E::NAME
            )));
        }
        self.audit.before_first_persist(&mut entity);

        let columns: Vec<&str> = E::FIELDS
            .iter()
            .map(|field| field.column)
            .chain(AUDIT_COLUMNS)
            .collect();
        let placeholders = (1..=columns.len())
            .map(|index| format!("?{index}"))
            .collect::<Vec<_>>()
            .join(", ");
        let values = entity
            .field_values()
            .into_iter()
            .chain(entity.audit().insert_values());

        self.conn.execute(
            &format!(
                "INSERT INTO {} ({}) VALUES ({placeholders});",
                E::TABLE,
                columns.join(", ")
            ),
            params_from_iter(values),
        )?;
        entity.assign_id(self.conn.last_insert_rowid());
        Ok(entity)
    }

    /// Writes the fields of an already persisted entity.
    ///
    /// Creation stamps are never part of the statement. Returns the row as
    /// stored after the write.
    pub fn update(&self, mut entity: E) -> RepoResult<E> {
        let id = entity.id().ok_or_else(|| {
            RepoError::InvalidArgument(format!("{} has no identity to update", E::NAME))
        })?;
        self.audit.before_update(&mut entity);

        let assignments = E::FIELDS
            .iter()
            .map(|field| field.column)
            .chain(["updated_at", "updated_by"])
            .enumerate()
            .map(|(index, column)| format!("{column} = ?{}", index + 1))
            .collect::<Vec<_>>();
        let audit = entity.audit();
        let mut values = entity.field_values();
        values.push(audit.updated_at.map_or(Value::Null, Value::Integer));
        values.push(audit.updated_by.clone().map_or(Value::Null, Value::Text));
        values.push(Value::Integer(id));

        let changed = self.conn.execute(
            &format!(
                "UPDATE {} SET {} WHERE {ID_COLUMN} = ?{};",
                E::TABLE,
                assignments.join(", "),
                values.len()
            ),
            params_from_iter(values),
        )?;
        if changed == 0 {
            return Err(RepoError::NotFound {
                entity: E::NAME,
                id,
            });
        }

        self.fetch_by_id(id)?.ok_or(RepoError::NotFound {
            entity: E::NAME,
            id,
        })
    }

    /// Deletes one row. A second call for the same id reports `NotFound`.
    pub fn remove_by_id(&self, id: EntityId) -> RepoResult<()> {
        let changed = self.conn.execute(
            &format!("DELETE FROM {} WHERE {ID_COLUMN} = ?1;", E::TABLE),
            [id],
        )?;
        if changed == 0 {
            return Err(RepoError::NotFound {
                entity: E::NAME,
                id,
            });
        }
        Ok(())
    }

    pub fn fetch_by_id(&self, id: EntityId) -> RepoResult<Option<E>> {
        let query = BoundQuery::new(
            format!(
                "SELECT {} FROM {table} WHERE {table}.{ID_COLUMN} = ?",
                select_list::<E>(),
                table = E::TABLE
            ),
            vec![Value::Integer(id)],
        );
        Ok(self.query_entities(&query)?.into_iter().next())
    }

    /// All rows in storage order. Meant for bounded tables.
    pub fn fetch_all(&self) -> RepoResult<Vec<E>> {
        self.fetch_all_sorted(&Sort::unsorted())
    }

    pub fn fetch_all_sorted(&self, sort: &Sort) -> RepoResult<Vec<E>> {
        let orders = sort.resolve::<E>()?;
        let query =
            QueryDescriptor::unfiltered::<E>().render_content(&Bindings::empty(), &orders, None)?;
        self.query_entities(&query)
    }

    pub fn count(&self) -> RepoResult<i64> {
        self.query_single_integer(&BoundQuery::new(
            format!("SELECT COUNT(*) FROM {}", E::TABLE),
            Vec::new(),
        ))
    }

    pub fn exists_by_id(&self, id: EntityId) -> RepoResult<bool> {
        let exists = self.query_single_integer(&BoundQuery::new(
            format!(
                "SELECT EXISTS(SELECT 1 FROM {} WHERE {ID_COLUMN} = ?)",
                E::TABLE
            ),
            vec![Value::Integer(id)],
        ))?;
        Ok(exists != 0)
    }

    pub fn query_entities(&self, query: &BoundQuery) -> RepoResult<Vec<E>> {
        self.query_rows(query, E::from_row)
    }

    pub fn query_rows<T, F>(&self, query: &BoundQuery, mut map: F) -> RepoResult<Vec<T>>
    where
        F: FnMut(&Row<'_>) -> RepoResult<T>,
    {
        let mut stmt = self.conn.prepare(&query.sql)?;
        let mut rows = stmt.query(params_from_iter(query.values.iter()))?;
        let mut mapped = Vec::new();
        while let Some(row) = rows.next()? {
            mapped.push(map(row)?);
        }
        Ok(mapped)
    }

    /// Runs a query expected to yield exactly one integer, e.g. a count.
    pub fn query_single_integer(&self, query: &BoundQuery) -> RepoResult<i64> {
        let value: Option<i64> = self
            .conn
            .query_row(&query.sql, params_from_iter(query.values.iter()), |row| {
                row.get(0)
            })
            .optional()?;
        value.ok_or_else(|| {
            RepoError::InvalidData(format!("`{}` returned no row", query.sql))
        })
    }

    /// Executes one bulk UPDATE or DELETE and returns the affected row count.
    ///
    /// Audit hooks do not fire. Entities loaded before this call are stale.
    pub fn execute_scalar_update(&self, query: &BoundQuery) -> RepoResult<usize> {
        let started_at = Instant::now();
        match self
            .conn
            .execute(&query.sql, params_from_iter(query.values.iter()))
        {
            Ok(affected) => {
                info!(
                    "event=scalar_update module=store status=ok entity={} affected={affected} duration_ms={}",
                    E::NAME,
                    started_at.elapsed().as_millis()
                );
                Ok(affected)
            }
            Err(err) => {
                error!(
                    "event=scalar_update module=store status=error entity={} duration_ms={} error={err}",
                    E::NAME,
                    started_at.elapsed().as_millis()
                );
                Err(err.into())
            }
        }
    }

    /// Reads `id` and keeps it read-locked until the enclosing transaction ends.
    ///
    /// SQLite locks at database granularity: the shared lock taken here keeps
    /// every other connection from writing until commit or rollback.
    pub fn lock_for_read(&self, id: EntityId) -> RepoResult<E> {
        if self.conn.is_autocommit() {
            return Err(RepoError::InvalidArgument(format!(
                "read lock on {} {id} requires an open transaction",
                E::NAME
            )));
        }
        self.fetch_by_id(id)?.ok_or(RepoError::NotFound {
            entity: E::NAME,
            id,
        })
    }
}

fn ensure_entity_table<E: Entity>(conn: &Connection) -> RepoResult<()> {
    let exists: i64 = conn.query_row(
        "SELECT EXISTS(
            SELECT 1
            FROM sqlite_master
            WHERE type = 'table' AND name = ?1
        );",
        [E::TABLE],
        |row| row.get(0),
    )?;
    if exists != 1 {
        return Err(RepoError::MissingTable(E::TABLE));
    }

    let mut present = Vec::new();
    let mut stmt = conn.prepare(&format!("PRAGMA table_info({});", E::TABLE))?;
    let mut rows = stmt.query([])?;
    while let Some(row) = rows.next()? {
        present.push(row.get::<_, String>(1)?);
    }

    for column in entity_columns::<E>() {
        if !present.iter().any(|name| name == column) {
            return Err(RepoError::MissingColumn {
                table: E::TABLE,
                column,
            });
        }
    }
    Ok(())
}

//! Typed execution of compiled plans against an entity store.
//!
//! Each accessor serves exactly one result shape; calling a plan through the
//! wrong accessor is an `InvalidArgument`, never a silent conversion.

use crate::paging::{fetch_page, Page, PageRequest};
use crate::query::plan::{QueryPlan, ResultShape};
use crate::query::template::Arg;
use crate::query::Projection;
use crate::store::entity::Entity;
use crate::store::error::{RepoError, RepoResult};
use crate::store::sqlite::SqliteEntityStore;
use rusqlite::types::FromSql;

impl QueryPlan {
    fn expect_shape<E: Entity>(&self, accepted: &[ResultShape]) -> RepoResult<()> {
        if self.descriptor().entity() != E::NAME {
            return Err(RepoError::InvalidArgument(format!(
                "`{}` is declared for {}, not {}",
                self.method(),
                self.descriptor().entity(),
                E::NAME
            )));
        }
        if accepted.contains(&self.shape()) {
            return Ok(());
        }
        Err(RepoError::InvalidArgument(format!(
            "`{}` returns {:?}, not {accepted:?}",
            self.method(),
            self.shape()
        )))
    }

    pub fn fetch_list<E: Entity>(
        &self,
        store: &SqliteEntityStore<'_, E>,
        args: &[Arg],
    ) -> RepoResult<Vec<E>> {
        self.expect_shape::<E>(&[ResultShape::List])?;
        let bindings = self.bind(args)?;
        store.query_entities(&self.descriptor().render_content(&bindings, &[], None)?)
    }

    /// Zero or one entity. More than one matching row is an error.
    pub fn fetch_one<E: Entity>(
        &self,
        store: &SqliteEntityStore<'_, E>,
        args: &[Arg],
    ) -> RepoResult<Option<E>> {
        self.expect_shape::<E>(&[ResultShape::One, ResultShape::Optional])?;
        let bindings = self.bind(args)?;
        let mut rows = store.query_entities(&self.descriptor().render_content(&bindings, &[], None)?)?;
        match rows.len() {
            0 | 1 => Ok(rows.pop()),
            actual => Err(RepoError::IncorrectResultSize {
                expected: 1,
                actual,
            }),
        }
    }

    pub fn fetch_scalars<E: Entity, T: FromSql>(
        &self,
        store: &SqliteEntityStore<'_, E>,
        args: &[Arg],
    ) -> RepoResult<Vec<T>> {
        self.expect_shape::<E>(&[ResultShape::Scalars])?;
        let bindings = self.bind(args)?;
        store.query_rows(
            &self.descriptor().render_content(&bindings, &[], None)?,
            |row| Ok(row.get(0)?),
        )
    }

    pub fn fetch_projections<E: Entity, P: Projection>(
        &self,
        store: &SqliteEntityStore<'_, E>,
        args: &[Arg],
    ) -> RepoResult<Vec<P>> {
        self.expect_shape::<E>(&[ResultShape::Projection(P::COLUMNS)])?;
        let bindings = self.bind(args)?;
        store.query_rows(
            &self.descriptor().render_content(&bindings, &[], None)?,
            P::from_row,
        )
    }

    pub fn fetch_count<E: Entity>(
        &self,
        store: &SqliteEntityStore<'_, E>,
        args: &[Arg],
    ) -> RepoResult<i64> {
        self.expect_shape::<E>(&[ResultShape::Count])?;
        let bindings = self.bind(args)?;
        store.query_single_integer(&self.descriptor().render_content(&bindings, &[], None)?)
    }

    pub fn fetch_exists<E: Entity>(
        &self,
        store: &SqliteEntityStore<'_, E>,
        args: &[Arg],
    ) -> RepoResult<bool> {
        self.expect_shape::<E>(&[ResultShape::Exists])?;
        let bindings = self.bind(args)?;
        let found =
            store.query_single_integer(&self.descriptor().render_content(&bindings, &[], None)?)?;
        Ok(found != 0)
    }

    pub fn fetch_page<E: Entity>(
        &self,
        store: &SqliteEntityStore<'_, E>,
        args: &[Arg],
        request: &PageRequest,
    ) -> RepoResult<Page<E>> {
        self.expect_shape::<E>(&[ResultShape::Page])?;
        let bindings = self.bind(args)?;
        fetch_page(store, self.descriptor(), &bindings, request)
    }

    /// Runs a bulk UPDATE or DELETE; see [`SqliteEntityStore::execute_scalar_update`].
    pub fn execute_update<E: Entity>(
        &self,
        store: &SqliteEntityStore<'_, E>,
        args: &[Arg],
    ) -> RepoResult<usize> {
        self.expect_shape::<E>(&[ResultShape::AffectedRows])?;
        let bindings = self.bind(args)?;
        store.execute_scalar_update(&self.descriptor().render_content(&bindings, &[], None)?)
    }
}

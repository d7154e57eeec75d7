//! Repository facades.
//!
//! # Responsibility
//! - Give each entity one contract combining CRUD, declared finders, paged
//!   finders and bulk mutation.
//! - Compile every finder declaration at construction time.
//!
//! # Invariants
//! - Facades hold no state beyond the store handle and compiled finders.
//! - A facade that constructed successfully has no unresolved declaration.

pub mod member_repo;
pub mod team_repo;

use crate::paging::{fetch_page, Page, PageRequest};
use crate::query::descriptor::QueryDescriptor;
use crate::query::sort::Sort;
use crate::query::template::Bindings;
use crate::store::entity::{Entity, EntityId};
use crate::store::error::{RepoError, RepoResult};
use crate::store::sqlite::SqliteEntityStore;

/// Generic CRUD contract shared by every entity repository.
pub trait CrudRepository<E: Entity> {
    fn store(&self) -> &SqliteEntityStore<'_, E>;

    /// Inserts when `entity` has no identity yet, updates otherwise.
    fn save(&self, entity: E) -> RepoResult<E> {
        match entity.id() {
            None => self.store().insert(entity),
            Some(_) => self.store().update(entity),
        }
    }

    fn delete(&self, entity: &E) -> RepoResult<()> {
        let id = entity.id().ok_or_else(|| {
            RepoError::InvalidArgument(format!("{} has no identity to delete", E::NAME))
        })?;
        self.delete_by_id(id)
    }

    fn delete_by_id(&self, id: EntityId) -> RepoResult<()> {
        self.store().remove_by_id(id)
    }

    fn find_by_id(&self, id: EntityId) -> RepoResult<Option<E>> {
        self.store().fetch_by_id(id)
    }

    /// Required fetch: absence is `NotFound`.
    fn get_by_id(&self, id: EntityId) -> RepoResult<E> {
        self.find_by_id(id)?.ok_or(RepoError::NotFound {
            entity: E::NAME,
            id,
        })
    }

    fn find_all(&self) -> RepoResult<Vec<E>> {
        self.store().fetch_all()
    }

    fn find_all_sorted(&self, sort: &Sort) -> RepoResult<Vec<E>> {
        self.store().fetch_all_sorted(sort)
    }

    fn find_all_page(&self, request: &PageRequest) -> RepoResult<Page<E>> {
        fetch_page(
            self.store(),
            &QueryDescriptor::unfiltered::<E>(),
            &Bindings::empty(),
            request,
        )
    }

    fn count(&self) -> RepoResult<i64> {
        self.store().count()
    }

    fn exists_by_id(&self, id: EntityId) -> RepoResult<bool> {
        self.store().exists_by_id(id)
    }

    /// Holds a read lock on the row until the enclosing transaction ends.
    fn lock_for_read(&self, id: EntityId) -> RepoResult<E> {
        self.store().lock_for_read(id)
    }
}

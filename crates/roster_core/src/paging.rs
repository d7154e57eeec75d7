//! Paging engine: bounded windows plus an exact total count.
//!
//! # Invariants
//! - `limit > 0` and `offset >= 0` for every constructed `PageRequest`.
//! - The count query carries the filter only, never ordering, windows or
//!   fetch joins, so join fan-out cannot inflate the total.

use crate::query::descriptor::{QueryDescriptor, Window};
use crate::query::sort::Sort;
use crate::query::template::Bindings;
use crate::store::entity::Entity;
use crate::store::error::{RepoError, RepoResult};
use crate::store::sqlite::SqliteEntityStore;
use log::debug;
use std::time::Instant;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageRequest {
    offset: i64,
    limit: i64,
    sort: Sort,
}

impl PageRequest {
    pub fn new(offset: i64, limit: i64, sort: Sort) -> RepoResult<Self> {
        if limit <= 0 {
            return Err(RepoError::InvalidArgument(format!(
                "page limit must be positive, got {limit}"
            )));
        }
        if offset < 0 {
            return Err(RepoError::InvalidArgument(format!(
                "page offset must not be negative, got {offset}"
            )));
        }
        Ok(Self {
            offset,
            limit,
            sort,
        })
    }

    /// Zero-based page number with a fixed page size.
    pub fn of_page(page: i64, size: i64, sort: Sort) -> RepoResult<Self> {
        if page < 0 {
            return Err(RepoError::InvalidArgument(format!(
                "page number must not be negative, got {page}"
            )));
        }
        if size <= 0 {
            return Err(RepoError::InvalidArgument(format!(
                "page size must be positive, got {size}"
            )));
        }
        let offset = page.checked_mul(size).ok_or_else(|| {
            RepoError::InvalidArgument(format!("page {page} of size {size} overflows"))
        })?;
        Self::new(offset, size, sort)
    }

    pub fn offset(&self) -> i64 {
        self.offset
    }

    pub fn limit(&self) -> i64 {
        self.limit
    }

    pub fn sort(&self) -> &Sort {
        &self.sort
    }

    /// The window directly after this one, same size and sort.
    pub fn next(&self) -> Self {
        Self {
            offset: self.offset.saturating_add(self.limit),
            limit: self.limit,
            sort: self.sort.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Page<T> {
    content: Vec<T>,
    offset: i64,
    limit: i64,
    total_elements: i64,
}

impl<T> Page<T> {
    pub fn new(content: Vec<T>, request: &PageRequest, total_elements: i64) -> Self {
        Self {
            content,
            offset: request.offset,
            limit: request.limit,
            total_elements,
        }
    }

    pub fn content(&self) -> &[T] {
        &self.content
    }

    pub fn offset(&self) -> i64 {
        self.offset
    }

    pub fn limit(&self) -> i64 {
        self.limit
    }

    pub fn total_elements(&self) -> i64 {
        self.total_elements
    }

    pub fn total_pages(&self) -> i64 {
        self.total_elements / self.limit + i64::from(self.total_elements % self.limit != 0)
    }

    /// Zero-based index of the page this window starts in.
    pub fn number(&self) -> i64 {
        self.offset / self.limit
    }

    pub fn number_of_elements(&self) -> usize {
        self.content.len()
    }

    pub fn is_first(&self) -> bool {
        self.offset == 0
    }

    pub fn is_last(&self) -> bool {
        !self.has_next()
    }

    pub fn has_next(&self) -> bool {
        self.offset.saturating_add(self.limit) < self.total_elements
    }

    pub fn has_previous(&self) -> bool {
        self.offset > 0
    }

    /// Converts the content, keeping the window and total.
    pub fn map<U, F>(self, f: F) -> Page<U>
    where
        F: FnMut(T) -> U,
    {
        Page {
            content: self.content.into_iter().map(f).collect(),
            offset: self.offset,
            limit: self.limit,
            total_elements: self.total_elements,
        }
    }
}

/// Runs the content and count queries for one window.
pub(crate) fn fetch_page<E: Entity>(
    store: &SqliteEntityStore<'_, E>,
    descriptor: &QueryDescriptor,
    bindings: &Bindings<'_>,
    request: &PageRequest,
) -> RepoResult<Page<E>> {
    let started_at = Instant::now();
    let orders = request.sort.resolve::<E>()?;
    let window = Window {
        offset: request.offset,
        limit: request.limit,
    };

    let content = store.query_entities(&descriptor.render_content(bindings, &orders, Some(window))?)?;
    let total = store.query_single_integer(&descriptor.render_count(bindings)?)?;

    debug!(
        "event=page_fetch module=paging status=ok entity={} offset={} limit={} returned={} total={total} duration_ms={}",
        E::NAME,
        request.offset,
        request.limit,
        content.len(),
        started_at.elapsed().as_millis()
    );
    Ok(Page::new(content, request, total))
}

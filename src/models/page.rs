//! Pagination request and result containers.

use crate::error::{DbError, DbResult};
use serde::{Serialize, Serializer, ser::SerializeStruct};

/// A 1-based page index and a positive page size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    page: u64,
    size: u64,
}

impl PageRequest {
    /// Validate a page request. Nothing is clamped: `page < 1` or `size < 1`
    /// is rejected.
    pub fn new(page: i64, size: i64) -> DbResult<Self> {
        if page < 1 {
            return Err(DbError::invalid_page_request(format!(
                "page must be >= 1, got {page}"
            )));
        }
        if size < 1 {
            return Err(DbError::invalid_page_request(format!(
                "size must be >= 1, got {size}"
            )));
        }
        Ok(Self {
            page: page as u64,
            size: size as u64,
        })
    }

    pub fn page(&self) -> u64 {
        self.page
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    /// Rows to skip before this page.
    pub fn offset(&self) -> u64 {
        (self.page - 1).saturating_mul(self.size)
    }
}

/// One page of shaped rows plus navigation metadata.
#[derive(Debug, Clone, PartialEq)]
pub struct PageResult<T> {
    items: Vec<T>,
    total_count: u64,
    page: u64,
    size: u64,
}

impl<T> PageResult<T> {
    pub fn new(items: Vec<T>, total_count: u64, request: PageRequest) -> Self {
        Self {
            items,
            total_count,
            page: request.page(),
            size: request.size(),
        }
    }

    pub fn items(&self) -> &[T] {
        &self.items
    }

    pub fn into_items(self) -> Vec<T> {
        self.items
    }

    pub fn total_count(&self) -> u64 {
        self.total_count
    }

    pub fn page(&self) -> u64 {
        self.page
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    /// `ceil(total_count / size)`; zero for an empty result.
    pub fn total_pages(&self) -> u64 {
        self.total_count.div_ceil(self.size)
    }

    pub fn has_next(&self) -> bool {
        self.page < self.total_pages()
    }

    pub fn has_prev(&self) -> bool {
        self.page > 1
    }
}

impl<T: Serialize> Serialize for PageResult<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut s = serializer.serialize_struct("PageResult", 7)?;
        s.serialize_field("items", &self.items)?;
        s.serialize_field("total_count", &self.total_count)?;
        s.serialize_field("page", &self.page)?;
        s.serialize_field("size", &self.size)?;
        s.serialize_field("total_pages", &self.total_pages())?;
        s.serialize_field("has_next", &self.has_next())?;
        s.serialize_field("has_prev", &self.has_prev())?;
        s.end()
    }
}

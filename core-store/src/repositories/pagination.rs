//! Offset paging for the audit and queue listings.

use serde::{Deserialize, Serialize};

const DEFAULT_PAGE_SIZE: u32 = 50;

/// Zero-based page of `page_size` rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageRequest {
    pub page: u32,
    pub page_size: u32,
}

impl PageRequest {
    pub fn new(page: u32, page_size: u32) -> Self {
        Self { page, page_size }
    }

    pub(crate) fn offset(&self) -> i64 {
        i64::from(self.page) * i64::from(self.page_size)
    }

    pub(crate) fn limit(&self) -> i64 {
        i64::from(self.page_size)
    }
}

impl Default for PageRequest {
    fn default() -> Self {
        Self::new(0, DEFAULT_PAGE_SIZE)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    /// Matching rows across every page
    pub total: u64,
    pub request: PageRequest,
}

impl<T> Page<T> {
    pub fn new(items: Vec<T>, total: u64, request: PageRequest) -> Self {
        Self {
            items,
            total,
            request,
        }
    }

    pub fn has_next(&self) -> bool {
        let seen = self.request.offset().max(0) as u64 + self.items.len() as u64;
        seen < self.total
    }
}

//! Pagination envelope and query parameters

use serde::{Deserialize, Serialize};

fn default_page() -> u32 {
    1
}

fn default_page_size() -> u32 {
    20
}

/// 1-based page request, typically taken from query parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageRequest {
    #[serde(default = "default_page")]
    pub page: u32,

    #[serde(default = "default_page_size")]
    pub page_size: u32,
}

impl Default for PageRequest {
    fn default() -> Self {
        Self {
            page: default_page(),
            page_size: default_page_size(),
        }
    }
}

/// One page of items plus the totals needed to render a pager
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Paginated<T> {
    pub items: Vec<T>,
    pub total: u64,
    pub page: u32,
    pub page_size: u32,
    pub pages: u64,
}

impl<T> Paginated<T> {
    pub fn new(items: Vec<T>, total: u64, request: PageRequest) -> Self {
        let pages = if request.page_size == 0 {
            0
        } else {
            total.div_ceil(u64::from(request.page_size))
        };
        Self {
            items,
            total,
            page: request.page,
            page_size: request.page_size,
            pages,
        }
    }

    /// Build from the `(items, total)` pair returned by `Repository::get_all`
    pub fn from_parts((items, total): (Vec<T>, u64), request: PageRequest) -> Self {
        Self::new(items, total, request)
    }

    /// Convert every item, keeping the page metadata
    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Paginated<U> {
        Paginated {
            items: self.items.into_iter().map(f).collect(),
            total: self.total,
            page: self.page,
            page_size: self.page_size,
            pages: self.pages,
        }
    }

    pub fn has_next(&self) -> bool {
        u64::from(self.page) < self.pages
    }
}

use serde::{Deserialize, Serialize};

pub const DEFAULT_PAGE_SIZE: u32 = 20;
pub const MAX_PAGE_SIZE: u32 = 100;

/// Paginated response envelope: `{count, next, previous, results}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Page<T> {
    pub count: i64,
    pub next: Option<u32>,
    pub previous: Option<u32>,
    pub results: Vec<T>,
}

impl<T> Page<T> {
    pub fn new(results: Vec<T>, count: i64, page: PageRequest) -> Self {
        let consumed = i64::from(page.page) * i64::from(page.page_size);
        Self {
            count,
            next: (consumed < count).then(|| page.page + 1),
            previous: (page.page > 1).then(|| page.page - 1),
            results,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    pub page: u32,
    pub page_size: u32,
}

impl PageRequest {
    pub fn new(page: Option<u32>, page_size: Option<u32>) -> Self {
        Self {
            page: page.unwrap_or(1).max(1),
            page_size: page_size.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE),
        }
    }

    pub fn limit(&self) -> i64 {
        i64::from(self.page_size)
    }

    pub fn offset(&self) -> i64 {
        i64::from(self.page - 1) * i64::from(self.page_size)
    }
}

impl Default for PageRequest {
    fn default() -> Self {
        Self::new(None, None)
    }
}

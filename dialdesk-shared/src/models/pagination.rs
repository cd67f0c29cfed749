/// Pagination parameters and page envelope shared by every list endpoint
///
/// Pages are 1-based. `per_page` defaults to 25 and is clamped to 1..=100 so a
/// client can never ask for an unbounded result set.

use serde::{Deserialize, Serialize};

/// Default page size when the client does not ask for one
pub const DEFAULT_PER_PAGE: i64 = 25;

/// Largest page size a client may request
pub const MAX_PER_PAGE: i64 = 100;

/// Query-string pagination parameters
#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct PageParams {
    pub page: Option<i64>,
    pub per_page: Option<i64>,
}

impl PageParams {
    pub fn new(page: i64, per_page: i64) -> Self {
        Self {
            page: Some(page),
            per_page: Some(per_page),
        }
    }

    /// Requested page, never below 1
    pub fn page(&self) -> i64 {
        self.page.unwrap_or(1).max(1)
    }

    /// Requested page size clamped to 1..=100
    pub fn per_page(&self) -> i64 {
        self.per_page
            .unwrap_or(DEFAULT_PER_PAGE)
            .clamp(1, MAX_PER_PAGE)
    }

    /// SQL `LIMIT`
    pub fn limit(&self) -> i64 {
        self.per_page()
    }

    /// SQL `OFFSET`
    pub fn offset(&self) -> i64 {
        (self.page() - 1).saturating_mul(self.per_page())
    }
}

/// One page of results
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub page: i64,
    pub per_page: i64,
    pub total: i64,
    pub total_pages: i64,
}

impl<T> Page<T> {
    pub fn new(items: Vec<T>, params: &PageParams, total: i64) -> Self {
        let per_page = params.per_page();
        let total = total.max(0);

        Self {
            items,
            page: params.page(),
            per_page,
            total,
            total_pages: (total + per_page - 1) / per_page,
        }
    }
}

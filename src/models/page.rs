use serde::Deserialize;

pub const DEFAULT_PAGE_SIZE: usize = 10;
pub const MAX_PAGE_SIZE: usize = 100;

#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct PageRequest {
    pub page: Option<usize>,
    pub limit: Option<usize>,
}

impl PageRequest {
    pub fn new(page: usize, limit: usize) -> Self {
        Self {
            page: Some(page),
            limit: Some(limit),
        }
    }

    /// Pages are 1-based; the limit is clamped to `[1, MAX_PAGE_SIZE]`. An
    /// offset past `usize::MAX` saturates and yields an empty page.
    pub fn offset_and_limit(&self) -> (usize, usize) {
        let page = self.page.unwrap_or(1).max(1);
        let limit = match self.limit {
            Some(0) | None => DEFAULT_PAGE_SIZE,
            Some(limit) => limit.min(MAX_PAGE_SIZE),
        };
        ((page - 1).saturating_mul(limit), limit)
    }
}

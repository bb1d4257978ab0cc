/// Window into a newest-first list of reviews.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct PageRequest {
    pub skip: u64,
    pub first: u32,
}

impl PageRequest {
    pub const DEFAULT_FIRST: u32 = 10;
    pub const MAX_FIRST: u32 = 100;

    pub fn new(skip: Option<u64>, first: Option<u32>) -> Self {
        Self {
            skip: skip.unwrap_or(0),
            first: first
                .unwrap_or(Self::DEFAULT_FIRST)
                .clamp(1, Self::MAX_FIRST),
        }
    }

    /// Builds a request from a 1-based page number and a page size.
    pub fn from_page(page: Option<u32>, limit: Option<u32>) -> Self {
        let first = limit
            .unwrap_or(Self::DEFAULT_FIRST)
            .clamp(1, Self::MAX_FIRST);
        let page = page.unwrap_or(1).max(1);
        Self {
            skip: u64::from(page - 1) * u64::from(first),
            first,
        }
    }
}

impl Default for PageRequest {
    fn default() -> Self {
        Self::new(None, None)
    }
}

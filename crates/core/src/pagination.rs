//! Page requests and paged results for list operations.

use serde::{Deserialize, Serialize};

use crate::error::{DomainError, DomainResult};

pub const DEFAULT_ITEMS_PER_PAGE: u32 = 20;
pub const MAX_ITEMS_PER_PAGE: u32 = 100;

/// A validated page request (1-based).
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize)]
pub struct PageRequest {
    page: u32,
    items_per_page: u32,
}

impl PageRequest {
    /// Validate raw pagination parameters.
    ///
    /// Missing values fall back to page 1 / [`DEFAULT_ITEMS_PER_PAGE`].
    pub fn new(page: Option<u32>, items_per_page: Option<u32>) -> DomainResult<Self> {
        let page = page.unwrap_or(1);
        let items_per_page = items_per_page.unwrap_or(DEFAULT_ITEMS_PER_PAGE);

        if page == 0 {
            return Err(DomainError::bad_request("page must be at least 1"));
        }
        if items_per_page == 0 || items_per_page > MAX_ITEMS_PER_PAGE {
            return Err(DomainError::bad_request(format!(
                "itemsPerPage must be between 1 and {MAX_ITEMS_PER_PAGE}"
            )));
        }

        Ok(Self { page, items_per_page })
    }

    pub fn page(&self) -> u32 {
        self.page
    }

    pub fn items_per_page(&self) -> u32 {
        self.items_per_page
    }

    pub fn offset(&self) -> usize {
        (self.page as usize - 1) * self.items_per_page as usize
    }

    /// Slice an already-ordered list into this page.
    pub fn slice<T>(&self, items: Vec<T>) -> Page<T> {
        let total_items = items.len() as u64;
        let items = items
            .into_iter()
            .skip(self.offset())
            .take(self.items_per_page as usize)
            .collect();
        Page::new(items, total_items, *self)
    }
}

impl Default for PageRequest {
    fn default() -> Self {
        Self {
            page: 1,
            items_per_page: DEFAULT_ITEMS_PER_PAGE,
        }
    }
}

/// One page of results plus the counters list responses carry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total_items: u64,
    pub total_pages: u64,
    pub current_page: u32,
    pub items_per_page: u32,
}

impl<T> Page<T> {
    pub fn new(items: Vec<T>, total_items: u64, request: PageRequest) -> Self {
        let per_page = u64::from(request.items_per_page);
        Self {
            items,
            total_items,
            total_pages: total_items.div_ceil(per_page),
            current_page: request.page,
            items_per_page: request.items_per_page,
        }
    }

    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Page<U> {
        Page {
            items: self.items.into_iter().map(f).collect(),
            total_items: self.total_items,
            total_pages: self.total_pages,
            current_page: self.current_page,
            items_per_page: self.items_per_page,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_page_zero_and_oversized_pages() {
        assert!(matches!(PageRequest::new(Some(0), None), Err(DomainError::BadRequest(_))));
        assert!(matches!(PageRequest::new(None, Some(0)), Err(DomainError::BadRequest(_))));
        assert!(matches!(PageRequest::new(None, Some(101)), Err(DomainError::BadRequest(_))));
        assert!(PageRequest::new(Some(3), Some(100)).is_ok());
    }

    #[test]
    fn slice_computes_counters() {
        let req = PageRequest::new(Some(2), Some(3)).unwrap();
        let page = req.slice((1..=7).collect::<Vec<_>>());
        assert_eq!(page.items, vec![4, 5, 6]);
        assert_eq!(page.total_items, 7);
        assert_eq!(page.total_pages, 3);
        assert_eq!(page.current_page, 2);
        assert_eq!(page.items_per_page, 3);
    }

    #[test]
    fn empty_list_has_zero_pages() {
        let page = PageRequest::default().slice(Vec::<u8>::new());
        assert_eq!(page.total_pages, 0);
        assert!(page.items.is_empty());
    }
}

//! Pagination parameters, page envelope and the `Link` response header.

use serde::{Deserialize, Serialize};

fn default_page() -> u64 {
    1
}

fn default_per_page() -> u64 {
    20
}

/// Pagination query parameters. Pages are 1-based.
#[derive(Debug, Clone, Deserialize)]
pub struct Pageable {
    #[serde(default = "default_page")]
    pub page: u64,
    #[serde(default = "default_per_page")]
    pub per_page: u64,
}

impl Default for Pageable {
    fn default() -> Self {
        Self {
            page: default_page(),
            per_page: default_per_page(),
        }
    }
}

impl Pageable {
    /// Validate the parameters; both must be positive.
    pub fn validate(&self) -> Result<(), sds_core::AppError> {
        if self.page == 0 || self.per_page == 0 {
            return Err(sds_core::AppError::User(
                "page and per_page must be positive integers".into(),
            ));
        }
        Ok(())
    }

    pub fn offset(&self) -> u64 {
        (self.page - 1) * self.per_page
    }
}

/// A page of results with pagination metadata.
#[derive(Debug, Clone, Serialize)]
pub struct Page<T> {
    pub page: u64,
    pub per_page: u64,
    pub total: u64,
    pub total_pages: u64,
    pub items: Vec<T>,
}

impl<T> Page<T> {
    pub fn new(items: Vec<T>, pageable: &Pageable, total: u64) -> Self {
        let total_pages = if pageable.per_page == 0 {
            0
        } else {
            total.div_ceil(pageable.per_page)
        };
        Self {
            page: pageable.page,
            per_page: pageable.per_page,
            total,
            total_pages,
            items,
        }
    }

    /// Build the RFC 5988 `Link` header for this page.
    ///
    /// `first` and `last` are always present on a non-empty result set,
    /// `prev` only when there is an earlier page and `next` only when there
    /// is a later one. `extra_query` carries the non-paging query parameters
    /// of the request so the links reproduce the original filters.
    pub fn link_header(&self, path: &str, extra_query: &str) -> Option<String> {
        if self.total_pages == 0 {
            return None;
        }

        let url = |page: u64| {
            let mut query = String::new();
            if !extra_query.is_empty() {
                query.push_str(extra_query);
                query.push('&');
            }
            format!("<{path}?{query}page={page}&per_page={}>", self.per_page)
        };

        let mut links = vec![format!("{}; rel=\"first\"", url(1))];
        if self.page > 1 {
            links.push(format!("{}; rel=\"prev\"", url(self.page - 1)));
        }
        if self.page < self.total_pages {
            links.push(format!("{}; rel=\"next\"", url(self.page + 1)));
        }
        links.push(format!("{}; rel=\"last\"", url(self.total_pages)));
        Some(links.join(", "))
    }
}

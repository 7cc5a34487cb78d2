use serde::{Deserialize, Serialize};

pub(crate) const MAX_LIMIT: i64 = 1000;

pub(crate) const fn default_limit() -> i64 {
    50
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub(crate) struct PageQuery {
    #[serde(default)]
    pub(crate) skip: i64,
    #[serde(default = "default_limit")]
    pub(crate) limit: i64,
}

impl PageQuery {
    pub(crate) fn normalized(self) -> Self {
        Self { skip: self.skip.max(0), limit: self.limit.clamp(1, MAX_LIMIT) }
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct PaginatedResponse<T> {
    pub(crate) items: Vec<T>,
    pub(crate) total_count: i64,
    pub(crate) skip: i64,
    pub(crate) limit: i64,
}

impl<T> PaginatedResponse<T> {
    pub(crate) fn new(items: Vec<T>, total_count: i64, page: PageQuery) -> Self {
        Self { items, total_count, skip: page.skip, limit: page.limit }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_query_is_clamped() {
        let page = PageQuery { skip: -5, limit: 0 }.normalized();
        assert_eq!((page.skip, page.limit), (0, 1));
        let page = PageQuery { skip: 10, limit: 5000 }.normalized();
        assert_eq!((page.skip, page.limit), (10, MAX_LIMIT));
    }

    #[test]
    fn page_query_defaults() {
        let page: PageQuery = serde_json::from_value(serde_json::json!({})).unwrap();
        assert_eq!((page.skip, page.limit), (0, default_limit()));
    }
}

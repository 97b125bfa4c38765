//! Pagination utilities shared by every model read operation.
//!
//! Callers pass an optional `Pagination`; model functions only ever see the
//! normalized `PageWindow`, so the page-size cap cannot be bypassed.

use serde::{Deserialize, Deserializer, Serialize};

/// Hard upper bound on rows returned by a single read.
pub const PAGE_SIZE_CAP: u64 = 100;
pub const DEFAULT_LIMIT: u64 = 20;

/// Pagination parameters as received from callers
#[derive(Clone, Copy, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
pub struct Pagination {
    /// 1-based page index
    #[serde(default, deserialize_with = "opt_u64_lenient")]
    pub page: Option<u64>,
    /// items per page
    #[serde(default, deserialize_with = "opt_u64_lenient")]
    pub limit: Option<u64>,
}

/// Accept `3`, `"3"`, `""` or `null`; query strings arrive as text.
fn opt_u64_lenient<'de, D>(deserializer: D) -> Result<Option<u64>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Num(u64),
        Text(String),
    }
    match Option::<Raw>::deserialize(deserializer)? {
        None => Ok(None),
        Some(Raw::Num(n)) => Ok(Some(n)),
        Some(Raw::Text(t)) if t.trim().is_empty() => Ok(None),
        Some(Raw::Text(t)) => t
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| serde::de::Error::custom(format!("expected a non-negative integer, got {t:?}"))),
    }
}

/// Normalized limit/offset pair ready to apply to a query.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct PageWindow {
    pub page: u64,
    pub limit: u64,
    pub offset: u64,
}

impl Pagination {
    pub fn new(page: u64, limit: u64) -> Self {
        Self { page: Some(page), limit: Some(limit) }
    }

    /// Clamp to sane defaults under `cap` (itself never above `PAGE_SIZE_CAP`).
    pub fn normalize(self, cap: u64) -> PageWindow {
        let cap = cap.clamp(1, PAGE_SIZE_CAP);
        let page = match self.page {
            Some(0) | None => 1,
            Some(p) => p,
        };
        let limit = self.limit.unwrap_or(DEFAULT_LIMIT).clamp(1, cap);
        PageWindow { page, limit, offset: (page - 1).saturating_mul(limit) }
    }
}

impl Default for PageWindow {
    fn default() -> Self {
        Pagination::default().normalize(PAGE_SIZE_CAP)
    }
}

/// One page of results plus the unpaginated total.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub page: u64,
    pub limit: u64,
    pub total: u64,
}

impl<T> Page<T> {
    pub fn new(items: Vec<T>, window: PageWindow, total: u64) -> Self {
        Self { items, page: window.page, limit: window.limit, total }
    }

    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Page<U> {
        Page { items: self.items.into_iter().map(f).collect(), page: self.page, limit: self.limit, total: self.total }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_clamps_zero_to_defaults() {
        let w = Pagination { page: Some(0), limit: Some(0) }.normalize(PAGE_SIZE_CAP);
        assert_eq!(w.page, 1);
        assert_eq!(w.limit, 1);
        assert_eq!(w.offset, 0);
    }

    #[test]
    fn normalize_clamps_upper_bound() {
        let w = Pagination::new(1, 500).normalize(PAGE_SIZE_CAP);
        assert_eq!(w.limit, 100);
    }

    #[test]
    fn page_two_of_twenty_skips_twenty() {
        let w = Pagination::new(2, 20).normalize(PAGE_SIZE_CAP);
        assert_eq!((w.limit, w.offset), (20, 20));
    }

    #[test]
    fn page_three_of_oversized_limit_uses_cap_for_offset() {
        let w = Pagination::new(3, 1000).normalize(100);
        assert_eq!((w.limit, w.offset), (100, 200));
    }

    #[test]
    fn configured_cap_cannot_exceed_hard_cap() {
        let w = Pagination::new(1, 1000).normalize(10_000);
        assert_eq!(w.limit, PAGE_SIZE_CAP);
        let w = Pagination::new(1, 1000).normalize(25);
        assert_eq!(w.limit, 25);
    }

    #[test]
    fn accepts_numbers_and_numeric_strings() {
        let p: Pagination = serde_json::from_value(serde_json::json!({"page": "3", "limit": 1000})).unwrap();
        assert_eq!(p, Pagination::new(3, 1000));
        let p: Pagination = serde_json::from_value(serde_json::json!({"page": ""})).unwrap();
        assert_eq!(p, Pagination::default());
        assert!(serde_json::from_value::<Pagination>(serde_json::json!({"page": "two"})).is_err());
    }

    #[test]
    fn default_values_are_sane() {
        let d = PageWindow::default();
        assert_eq!(d.page, 1);
        assert_eq!(d.limit, DEFAULT_LIMIT);
        assert_eq!(d.offset, 0);
    }
}

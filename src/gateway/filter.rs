//! Listing filters and offset pagination over envelope records.

use crate::model::EnvelopeRecord;
use serde::{Deserialize, Serialize};

pub const DEFAULT_PAGE: u32 = 1;
pub const DEFAULT_PAGE_SIZE: u32 = 50;
pub const MAX_PAGE_SIZE: u32 = 500;

/// Conjunction of optional listing terms.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LogFilter {
    pub method: Option<String>,
    /// Whitespace-separated words; each must occur in the path or the query string.
    pub url: Option<String>,
    pub status_code: Option<u16>,
    pub errors_only: bool,
    /// Hide diagnostic records that belong to a request.
    pub exclude_children: bool,
}

impl Default for LogFilter {
    fn default() -> Self {
        Self {
            method: None,
            url: None,
            status_code: None,
            errors_only: false,
            exclude_children: true,
        }
    }
}

fn contains_ignore_case(haystack: Option<&str>, needle_lower: &str) -> bool {
    haystack
        .map(|value| value.to_lowercase().contains(needle_lower))
        .unwrap_or(false)
}

impl LogFilter {
    pub fn method(mut self, method: impl Into<String>) -> Self {
        self.method = Some(method.into());
        self
    }

    pub fn url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    pub fn include_children(mut self) -> Self {
        self.exclude_children = false;
        self
    }

    fn url_words(&self) -> Vec<String> {
        self.url
            .as_deref()
            .map(|raw| raw.split_whitespace().map(str::to_lowercase).collect())
            .unwrap_or_default()
    }

    pub fn matches(&self, record: &EnvelopeRecord) -> bool {
        if let Some(method) = self.method.as_deref().map(str::trim).filter(|m| !m.is_empty()) {
            match record.method.as_deref() {
                Some(actual) if actual.eq_ignore_ascii_case(method) => {}
                _ => return false,
            }
        }

        for word in self.url_words() {
            let in_path = contains_ignore_case(record.path.as_deref(), &word);
            let in_query = contains_ignore_case(record.query_string.as_deref(), &word);
            if !in_path && !in_query {
                return false;
            }
        }

        if let Some(status) = self.status_code {
            if record.status_code != Some(status) {
                return false;
            }
        }

        if self.errors_only && !record.is_error {
            return false;
        }

        if self.exclude_children && record.is_correlated_child() {
            return false;
        }

        true
    }
}

/// Page request; out-of-range values fall back to defaults.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageRequest {
    pub page: u32,
    pub page_size: u32,
}

impl Default for PageRequest {
    fn default() -> Self {
        Self {
            page: DEFAULT_PAGE,
            page_size: DEFAULT_PAGE_SIZE,
        }
    }
}

impl PageRequest {
    pub fn new(page: i64, page_size: i64) -> Self {
        let page = u32::try_from(page).ok().filter(|p| *p >= 1).unwrap_or(DEFAULT_PAGE);
        let page_size = u32::try_from(page_size)
            .ok()
            .filter(|s| *s >= 1)
            .map(|s| s.min(MAX_PAGE_SIZE))
            .unwrap_or(DEFAULT_PAGE_SIZE);
        Self { page, page_size }
    }

    /// Lenient parse of raw query-string values.
    pub fn parse(page: Option<&str>, page_size: Option<&str>) -> Self {
        let page = page
            .and_then(|raw| raw.trim().parse::<i64>().ok())
            .unwrap_or(i64::from(DEFAULT_PAGE));
        let page_size = page_size
            .and_then(|raw| raw.trim().parse::<i64>().ok())
            .unwrap_or(i64::from(DEFAULT_PAGE_SIZE));
        Self::new(page, page_size)
    }

    pub fn offset(&self) -> usize {
        (self.page.saturating_sub(1) as usize).saturating_mul(self.page_size as usize)
    }

    pub fn limit(&self) -> usize {
        self.page_size as usize
    }
}

/// One page of a filtered listing plus the unpaginated total.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LogPage<T> {
    pub items: Vec<T>,
    pub total: u64,
    pub page: u32,
    pub page_size: u32,
}

impl<T> LogPage<T> {
    pub fn total_pages(&self) -> u64 {
        if self.total == 0 {
            0
        } else {
            self.total.div_ceil(u64::from(self.page_size))
        }
    }

    pub fn map<U>(self, f: impl FnMut(T) -> U) -> LogPage<U> {
        LogPage {
            items: self.items.into_iter().map(f).collect(),
            total: self.total,
            page: self.page,
            page_size: self.page_size,
        }
    }
}

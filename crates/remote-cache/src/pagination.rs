//! Paging helpers for JSON:API style upstream responses.
//!
//! A paged endpoint declares its size in `meta.totalItems` and accepts
//! `page` (1-based) and `itemsPerPage` query parameters.

use serde_json::{Map, Value};

/// Page responses keyed by URL, in page order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FetchedPages(Vec<(String, Value)>);

impl FetchedPages {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    /// Append a page.
    pub fn push(&mut self, url: impl Into<String>, response: Value) {
        self.0.push((url.into(), response));
    }

    /// Response for a URL.
    pub fn get(&self, url: &str) -> Option<&Value> {
        self.0.iter().find(|(u, _)| u == url).map(|(_, v)| v)
    }

    /// Page URLs in order.
    pub fn urls(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(|(u, _)| u.as_str())
    }

    /// Iterate `(url, response)` pairs in order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.0.iter().map(|(u, v)| (u.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl IntoIterator for FetchedPages {
    type Item = (String, Value);
    type IntoIter = std::vec::IntoIter<(String, Value)>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

/// Declared total item count, if the response is paged.
pub fn total_items(response: &Value) -> Option<u64> {
    let total = response.pointer("/meta/totalItems")?;
    total
        .as_u64()
        .or_else(|| total.as_str().and_then(|s| s.trim().parse().ok()))
}

/// Number of pages needed to cover `total` items.
pub fn page_count(total: u64, per_page: usize) -> u64 {
    let per_page = per_page.max(1) as u64;
    total.div_ceil(per_page)
}

/// URL for one page of a paged endpoint.
pub fn page_url(base_url: &str, page: u64, per_page: usize) -> String {
    let separator = if base_url.contains('?') { '&' } else { '?' };
    format!(
        "{}{}page={}&itemsPerPage={}",
        base_url, separator, page, per_page
    )
}

/// Concatenate the `data` and `included` arrays of every page.
///
/// Order within and across pages is preserved; duplicates are kept.
pub fn merge_pages(pages: &FetchedPages) -> Value {
    let mut data = Vec::new();
    let mut included = Vec::new();

    for (_, response) in pages.iter() {
        if let Some(items) = response.get("data").and_then(Value::as_array) {
            data.extend(items.iter().cloned());
        }
        if let Some(items) = response.get("included").and_then(Value::as_array) {
            included.extend(items.iter().cloned());
        }
    }

    let mut merged = Map::new();
    merged.insert("data".to_string(), Value::Array(data));
    merged.insert("included".to_string(), Value::Array(included));
    Value::Object(merged)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_page_url_separator() {
        assert_eq!(
            page_url("http://h/api/location", 2, 100),
            "http://h/api/location?page=2&itemsPerPage=100"
        );
        assert_eq!(
            page_url("http://h/api/location?include=catalogRecords", 1, 25),
            "http://h/api/location?include=catalogRecords&page=1&itemsPerPage=25"
        );
    }

    #[test]
    fn test_page_count() {
        assert_eq!(page_count(0, 100), 0);
        assert_eq!(page_count(1, 100), 1);
        assert_eq!(page_count(100, 100), 1);
        assert_eq!(page_count(101, 100), 2);
        assert_eq!(page_count(5, 0), 5);
    }

    #[test]
    fn test_total_items() {
        assert_eq!(total_items(&json!({"meta": {"totalItems": 250}})), Some(250));
        assert_eq!(total_items(&json!({"meta": {"totalItems": "12"}})), Some(12));
        assert_eq!(total_items(&json!({"data": []})), None);
    }

    #[test]
    fn test_merge_pages_preserves_order() {
        let mut pages = FetchedPages::new();
        pages.push(
            "p1",
            json!({"data": [{"id": 1}, {"id": 2}], "included": [{"id": "a"}]}),
        );
        pages.push("p2", json!({"data": [{"id": 3}]}));
        pages.push("p3", json!({"data": [{"id": 2}], "included": [{"id": "b"}]}));

        let merged = merge_pages(&pages);
        let ids: Vec<i64> = merged["data"]
            .as_array()
            .unwrap()
            .iter()
            .map(|d| d["id"].as_i64().unwrap())
            .collect();
        assert_eq!(ids, vec![1, 2, 3, 2]);
        assert_eq!(merged["included"].as_array().unwrap().len(), 2);
    }

    #[test]
    fn test_fetched_pages_lookup() {
        let mut pages = FetchedPages::new();
        pages.push("b", json!(2));
        pages.push("a", json!(1));

        assert_eq!(pages.urls().collect::<Vec<_>>(), vec!["b", "a"]);
        assert_eq!(pages.get("a"), Some(&json!(1)));
        assert!(pages.get("c").is_none());
    }
}

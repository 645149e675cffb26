//! Paginated package search.
//!
//! A search answers with a total count and one page of results. Unless
//! the caller pins an explicit `offset`, the result sequence is a lazy,
//! single-pass pager that re-queries the service as the consumer
//! advances past each page boundary; a failed page fetch surfaces as an
//! error from [`SearchResults::try_next`] rather than a silent stop.

use crate::client::{DecodeMode, PortalClient};
use crate::error::Result;
use crate::resource::{self, Resource};
use reqwest::header::HeaderMap;
use serde_json::{Map, Value};
use std::collections::VecDeque;

/// Page size used when the caller does not supply a `limit` option.
pub const DEFAULT_PAGE_SIZE: u64 = 10;

/// Outcome of a package search.
pub struct SearchResponse<'a> {
    /// Total number of matches reported by the service
    pub count: u64,
    /// The matching result items
    pub results: SearchResults<'a>,
}

/// Forward-only sequence of search result items.
///
/// Single-pass: once exhausted it yields nothing further. Advancing
/// past a page boundary performs a blocking search request on the
/// calling task.
pub struct SearchResults<'a> {
    inner: ResultsInner<'a>,
}

enum ResultsInner<'a> {
    /// Caller supplied `offset`: one raw page, no transparent paging
    Single(VecDeque<Value>),
    Paged(Pager<'a>),
}

struct Pager<'a> {
    client: &'a PortalClient,
    url: String,
    options: Map<String, Value>,
    limit: u64,
    count: u64,
    buffered: VecDeque<Value>,
    pages_fetched: u64,
}

impl<'a> SearchResults<'a> {
    /// Advance to the next result item, fetching the next page from the
    /// service when the buffered one is exhausted. Returns `Ok(None)`
    /// once the computed page count has been consumed.
    pub async fn try_next(&mut self) -> Result<Option<Value>> {
        match &mut self.inner {
            ResultsInner::Single(buffered) => Ok(buffered.pop_front()),
            ResultsInner::Paged(pager) => pager.try_next().await,
        }
    }

    /// Drain the remaining items into a vector.
    pub async fn try_collect(mut self) -> Result<Vec<Value>> {
        let mut items = Vec::new();
        while let Some(item) = self.try_next().await? {
            items.push(item);
        }
        Ok(items)
    }
}

impl Pager<'_> {
    fn total_pages(&self) -> u64 {
        if self.limit == 0 {
            // A zero limit cannot page; whatever the first response
            // carried is all there is.
            self.pages_fetched
        } else {
            self.count.div_ceil(self.limit)
        }
    }

    async fn try_next(&mut self) -> Result<Option<Value>> {
        loop {
            if let Some(item) = self.buffered.pop_front() {
                return Ok(Some(item));
            }
            if self.pages_fetched >= self.total_pages() {
                return Ok(None);
            }

            let mut options = self.options.clone();
            options.insert(
                "offset".to_string(),
                Value::from(self.pages_fetched * self.limit),
            );
            let page = self.client.fetch_search_page(&self.url, &options).await?;
            self.pages_fetched += 1;

            let items = page_results(&page);
            if items.is_empty() {
                // Server returned fewer pages than `count` promised;
                // stop rather than refetch an empty tail.
                return Ok(None);
            }
            self.buffered = items.into();
        }
    }
}

fn page_count(page: &Value) -> u64 {
    page.get("count").and_then(Value::as_u64).unwrap_or(0)
}

fn page_results(page: &Value) -> Vec<Value> {
    page.get("results")
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default()
}

/// Render an option value as a query-string value. Strings go bare;
/// everything else uses its JSON rendering.
fn query_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

impl PortalClient {
    /// Search packages.
    ///
    /// `options` are passed through to the service (`limit`, `offset`,
    /// field filters); `q` is set from `query`. When the caller does not
    /// supply an `offset`, the returned [`SearchResults`] transparently
    /// pages through the full result set; with an explicit `offset`,
    /// pagination is the caller's responsibility and exactly the
    /// requested page is yielded.
    pub async fn package_search(
        &self,
        query: &str,
        options: Option<Map<String, Value>>,
    ) -> Result<SearchResponse<'_>> {
        let mut options = options.unwrap_or_default();
        options.insert("q".to_string(), Value::from(query));
        let caller_offset = options.contains_key("offset");
        let limit = options
            .get("limit")
            .and_then(Value::as_u64)
            .unwrap_or(DEFAULT_PAGE_SIZE);
        // Pin the limit so every subsequent page uses the same size.
        options.insert("limit".to_string(), Value::from(limit));

        let url = resource::resolve(self.base_url(), Resource::PackageSearch, None, None, None)?;
        let page = self.fetch_search_page(&url, &options).await?;

        let count = page_count(&page);
        let buffered: VecDeque<Value> = page_results(&page).into();
        let inner = if caller_offset {
            ResultsInner::Single(buffered)
        } else {
            ResultsInner::Paged(Pager {
                client: self,
                url,
                options,
                limit,
                count,
                buffered,
                pages_fetched: 1,
            })
        };
        Ok(SearchResponse {
            count,
            results: SearchResults { inner },
        })
    }

    /// Issue one search request with the given options as query
    /// parameters and return the parsed page.
    pub(crate) async fn fetch_search_page(
        &self,
        url: &str,
        options: &Map<String, Value>,
    ) -> Result<Value> {
        let mut serializer = url::form_urlencoded::Serializer::new(String::new());
        for (key, value) in options {
            serializer.append_pair(key, &query_value(value));
        }
        let page_url = format!("{}?{}", url, serializer.finish());

        self.reset_envelope();
        self.dispatch(&page_url, None, None, HeaderMap::new(), DecodeMode::Strict)
            .await?;
        self.classify()
    }
}

//! Lazy traversal of paginated listings.
//!
//! Listing endpoints answer with `{count, next, previous, results}`. The `next`
//! URL is treated as an opaque cursor: it is followed verbatim and only checked
//! against the URLs already visited in the same walk.

use std::collections::{HashSet, VecDeque};

use async_trait::async_trait;
use futures::Stream;
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{BitnodesError, BitnodesResult};

/// One page of a listing endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Page<T> {
    pub count: u64,
    pub next: Option<String>,
    pub previous: Option<String>,
    pub results: Vec<T>,
}

impl<T> Page<T> {
    pub fn is_last(&self) -> bool {
        self.next.is_none()
    }
}

/// Fetches a single page given its URL.
#[async_trait]
pub trait PageFetcher: Send + Sync {
    type Record: Send;

    /// Endpoint name used in errors.
    fn endpoint(&self) -> &'static str;

    async fn fetch_page(&self, url: &Url) -> BitnodesResult<Page<Self::Record>>;
}

/// A restartable description of a walk: where it starts and how many records
/// it may produce at most.
pub struct PageWalker<F> {
    fetcher: F,
    start: Url,
    max_records: Option<usize>,
}

impl<F> PageWalker<F> {
    pub fn new(fetcher: F, start: Url) -> Self {
        Self {
            fetcher,
            start,
            max_records: None,
        }
    }

    /// Caps the number of records produced across all pages.
    pub fn with_max_records(mut self, max_records: Option<usize>) -> Self {
        self.max_records = max_records;
        self
    }

    pub fn start_url(&self) -> &Url {
        &self.start
    }

    /// Starts a fresh walk from the original URL.
    pub fn walk(&self) -> RecordCursor<'_, F>
    where
        F: PageFetcher,
    {
        RecordCursor {
            walker: self,
            buffer: VecDeque::new(),
            pending: Some(self.start.clone()),
            seen: HashSet::new(),
            produced: 0,
            pages_fetched: 0,
        }
    }

    /// Walks every page and collects the records.
    pub async fn collect_all(&self) -> BitnodesResult<Vec<F::Record>>
    where
        F: PageFetcher,
    {
        let mut cursor = self.walk();
        let mut records = Vec::new();
        while let Some(record) = cursor.next().await? {
            records.push(record);
        }
        Ok(records)
    }
}

/// The state of one walk: buffered records of the current page, the next page
/// URL, and every URL fetched so far.
pub struct RecordCursor<'a, F: PageFetcher> {
    walker: &'a PageWalker<F>,
    buffer: VecDeque<F::Record>,
    pending: Option<Url>,
    seen: HashSet<String>,
    produced: usize,
    pages_fetched: usize,
}

impl<'a, F: PageFetcher> RecordCursor<'a, F> {
    /// Yields the next record, fetching the next page only once the current
    /// one is drained.
    pub async fn next(&mut self) -> BitnodesResult<Option<F::Record>> {
        loop {
            if self.walker.max_records.is_some_and(|max| self.produced >= max) {
                return Ok(None);
            }

            if let Some(record) = self.buffer.pop_front() {
                self.produced += 1;
                return Ok(Some(record));
            }

            let Some(url) = self.pending.take() else {
                return Ok(None);
            };

            if !self.seen.insert(url.as_str().to_string()) {
                warn!(
                    endpoint = self.walker.fetcher.endpoint(),
                    url = url.as_str();
                    "Pagination cycle detected"
                );
                return Err(BitnodesError::PaginationCycle {
                    endpoint: self.walker.fetcher.endpoint(),
                    url: url.to_string(),
                });
            }

            let page = self.walker.fetcher.fetch_page(&url).await?;
            self.pages_fetched += 1;
            debug!(
                endpoint = self.walker.fetcher.endpoint(),
                page = self.pages_fetched,
                records = page.results.len();
                "Fetched page"
            );

            self.pending = match page.next {
                Some(next) => Some(url.join(&next)?),
                None => None,
            };
            self.buffer.extend(page.results);
        }
    }

    /// Records yielded so far.
    pub fn produced(&self) -> usize {
        self.produced
    }

    pub fn pages_fetched(&self) -> usize {
        self.pages_fetched
    }

    /// Adapts the cursor into a [`Stream`] of records.
    pub fn into_stream(self) -> impl Stream<Item = BitnodesResult<F::Record>> + 'a
    where
        F::Record: 'a,
    {
        futures::stream::try_unfold(self, |mut cursor| async move {
            let record = cursor.next().await?;
            Ok::<_, BitnodesError>(record.map(|record| (record, cursor)))
        })
    }
}

//! Paginated result fetching
//!
//! [`FetchCoordinator`] splits a requested result count into page-sized
//! [`OffsetFetcher::fetch_page`] calls, runs them concurrently (or sequentially)
//! under one deadline and concatenates the pages that made it in time.
//! Failed, panicking or late pages contribute nothing and are never retried.

mod traits;

pub use traits::{EngineProfile, OffsetFetcher, PageParams};

use crate::config::{FetchConfig, FetchMode};
use crate::error::Result;
use crate::types::{QueryOptions, ResultRecord};
use std::sync::Arc;
use tokio::task::JoinSet;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Number of results to request from the page starting at `offset`
///
/// The last page of a query is capped so the query as a whole never asks for
/// more than `num_results`.
///
/// # Examples
///
/// ```
/// use imsearch_dl::fetch::page_request_count;
///
/// assert_eq!(page_request_count(0, 120, 50), 50);
/// assert_eq!(page_request_count(100, 120, 50), 20);
/// assert_eq!(page_request_count(150, 120, 50), 0);
/// ```
pub fn page_request_count(offset: usize, num_results: usize, per_page: usize) -> usize {
    per_page.min(num_results.saturating_sub(offset))
}

/// Translate a result offset into `(page_index, offset_within_page)`
///
/// For engines that address results by page number rather than by offset.
///
/// # Examples
///
/// ```
/// use imsearch_dl::fetch::page_position;
///
/// assert_eq!(page_position(0, 100), (0, 0));
/// assert_eq!(page_position(250, 100), (2, 50));
/// ```
pub fn page_position(offset: usize, per_page: usize) -> (usize, usize) {
    if per_page == 0 {
        return (0, offset);
    }
    (offset / per_page, offset % per_page)
}

/// Offsets of every page needed for `num_results` results
fn page_offsets(num_results: usize, per_page: usize) -> Vec<usize> {
    (0..num_results).step_by(per_page.max(1)).collect()
}

/// Runs the paginated fetch protocol against one search back-end
pub struct FetchCoordinator<F: OffsetFetcher + 'static> {
    fetcher: Arc<F>,
    config: FetchConfig,
}

impl<F: OffsetFetcher + 'static> FetchCoordinator<F> {
    /// Create a coordinator for `fetcher`
    pub fn new(fetcher: F, config: FetchConfig) -> Self {
        Self::from_arc(Arc::new(fetcher), config)
    }

    /// Create a coordinator sharing an existing fetcher
    pub fn from_arc(fetcher: Arc<F>, config: FetchConfig) -> Self {
        Self { fetcher, config }
    }

    /// The underlying fetcher
    pub fn fetcher(&self) -> &Arc<F> {
        &self.fetcher
    }

    /// Run a query described by [`QueryOptions`]
    ///
    /// Translates size/style through the engine profile, then delegates to
    /// [`fetch`](Self::fetch).
    ///
    /// # Errors
    ///
    /// Returns [`Error::Unsupported`](crate::Error::Unsupported) when the engine
    /// has no native name for the requested size or style. Page failures are not
    /// errors.
    pub async fn query(&self, query: &str, options: &QueryOptions) -> Result<Vec<ResultRecord>> {
        let params = PageParams {
            aux_params: self.fetcher.profile().aux_params(options)?,
            ..Default::default()
        };
        Ok(self.fetch(query, options.num_results, params).await)
    }

    /// Fetch up to `num_results` results for `query`
    ///
    /// Pages of `results_per_request` results are requested from offsets
    /// `0, per_page, 2 * per_page, ...`. Pages completing before the configured
    /// deadline are concatenated in page order; the rest are dropped. The result
    /// never holds more than `num_results` records.
    pub async fn fetch(
        &self,
        query: &str,
        num_results: usize,
        mut params: PageParams,
    ) -> Vec<ResultRecord> {
        if num_results == 0 {
            return Vec::new();
        }

        let profile = self.fetcher.profile();
        let per_page = profile.results_per_request.max(1);
        params.num_results = num_results;
        let offsets = page_offsets(num_results, per_page);
        let deadline = Instant::now() + self.config.timeout;

        debug!(
            engine = %profile.name,
            query,
            num_results,
            per_page,
            pages = offsets.len(),
            mode = ?self.config.mode,
            "fetching result pages"
        );

        let pages = match self.config.mode {
            FetchMode::Concurrent => {
                self.fetch_concurrent(query, &offsets, Arc::new(params), deadline)
                    .await
            }
            FetchMode::Sequential => {
                self.fetch_sequential(query, &offsets, &params, deadline)
                    .await
            }
        };

        let completed = pages.iter().filter(|page| page.is_some()).count();
        let mut results: Vec<ResultRecord> = pages.into_iter().flatten().flatten().collect();
        results.truncate(num_results);

        info!(
            engine = %profile.name,
            query,
            pages_requested = offsets.len(),
            pages_completed = completed,
            results = results.len(),
            "fetch complete"
        );
        results
    }

    /// Issue every page at once and collect what finishes before `deadline`
    ///
    /// Returns one slot per offset, `None` for pages that failed or were abandoned.
    async fn fetch_concurrent(
        &self,
        query: &str,
        offsets: &[usize],
        params: Arc<PageParams>,
        deadline: Instant,
    ) -> Vec<Option<Vec<ResultRecord>>> {
        let mut pages: Vec<Option<Vec<ResultRecord>>> = vec![None; offsets.len()];
        let mut set = JoinSet::new();

        for (index, &offset) in offsets.iter().enumerate() {
            let fetcher = Arc::clone(&self.fetcher);
            let params = Arc::clone(&params);
            let query = query.to_string();
            set.spawn(async move {
                let result = fetcher.fetch_page(&query, offset, &params).await;
                (index, offset, result)
            });
        }

        loop {
            match tokio::time::timeout_at(deadline, set.join_next()).await {
                Ok(Some(Ok((index, offset, Ok(page))))) => {
                    debug!(offset, results = page.len(), "page fetched");
                    pages[index] = Some(page);
                }
                Ok(Some(Ok((_, offset, Err(e))))) => {
                    warn!(offset, error = %e, "page fetch failed");
                }
                Ok(Some(Err(join_err))) => {
                    warn!(error = %join_err, "page fetch task panicked");
                }
                Ok(None) => break,
                Err(_) => {
                    warn!(
                        outstanding = set.len(),
                        "fetch deadline expired, abandoning outstanding pages"
                    );
                    set.abort_all();
                    break;
                }
            }
        }

        pages
    }

    /// Request pages one after another until done or `deadline`
    async fn fetch_sequential(
        &self,
        query: &str,
        offsets: &[usize],
        params: &PageParams,
        deadline: Instant,
    ) -> Vec<Option<Vec<ResultRecord>>> {
        let mut pages = Vec::with_capacity(offsets.len());

        for &offset in offsets {
            match tokio::time::timeout_at(deadline, self.fetcher.fetch_page(query, offset, params))
                .await
            {
                Ok(Ok(page)) => {
                    debug!(offset, results = page.len(), "page fetched");
                    pages.push(Some(page));
                }
                Ok(Err(e)) => {
                    warn!(offset, error = %e, "page fetch failed");
                    pages.push(None);
                }
                Err(_) => {
                    warn!(offset, "fetch deadline expired, skipping remaining pages");
                    break;
                }
            }
        }

        pages
    }
}

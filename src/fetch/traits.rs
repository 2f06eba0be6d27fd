//! Search back-end contract and per-engine configuration

use crate::error::{Error, Result};
use crate::types::{ImageSize, ImageStyle, QueryOptions, ResultRecord};
use async_trait::async_trait;
use std::collections::HashMap;

/// Request parameters shared by every page of one query
#[derive(Clone, Debug, Default)]
pub struct PageParams {
    /// Engine-native query parameters (size, style, ...)
    pub aux_params: HashMap<String, String>,
    /// Extra HTTP headers
    pub headers: HashMap<String, String>,
    /// Total number of results requested for the whole query
    pub num_results: usize,
}

/// Static description of a search engine
///
/// Replaces a per-engine class hierarchy: an engine adapter is an
/// [`OffsetFetcher`] plus one of these values.
#[derive(Clone, Debug)]
pub struct EngineProfile {
    /// Engine name for logging
    pub name: String,
    /// Maximum results a single request can return
    pub results_per_request: usize,
    /// Query parameter carrying the native size value
    pub size_param: String,
    /// Query parameter carrying the native style value
    pub style_param: String,
    /// Supported sizes and their native names
    pub sizes: HashMap<ImageSize, String>,
    /// Supported styles and their native names
    pub styles: HashMap<ImageStyle, String>,
}

impl EngineProfile {
    /// Create a profile with no size/style support
    pub fn new(name: impl Into<String>, results_per_request: usize) -> Self {
        Self {
            name: name.into(),
            results_per_request,
            size_param: "size".to_string(),
            style_param: "style".to_string(),
            sizes: HashMap::new(),
            styles: HashMap::new(),
        }
    }

    /// Set the query parameter names for size and style
    pub fn with_params(mut self, size_param: &str, style_param: &str) -> Self {
        self.size_param = size_param.to_string();
        self.style_param = style_param.to_string();
        self
    }

    /// Register a native size name
    pub fn with_size(mut self, size: ImageSize, native: &str) -> Self {
        self.sizes.insert(size, native.to_string());
        self
    }

    /// Register a native style name
    pub fn with_style(mut self, style: ImageStyle, native: &str) -> Self {
        self.styles.insert(style, native.to_string());
        self
    }

    /// Native name of `size`, or [`Error::Unsupported`]
    pub fn native_size(&self, size: ImageSize) -> Result<&str> {
        self.sizes
            .get(&size)
            .map(String::as_str)
            .ok_or_else(|| Error::Unsupported {
                kind: "size",
                value: format!("{size:?}").to_lowercase(),
            })
    }

    /// Native name of `style`, or [`Error::Unsupported`]
    pub fn native_style(&self, style: ImageStyle) -> Result<&str> {
        self.styles
            .get(&style)
            .map(String::as_str)
            .ok_or_else(|| Error::Unsupported {
                kind: "style",
                value: format!("{style:?}").to_lowercase(),
            })
    }

    /// Translate query options into engine-native query parameters
    pub fn aux_params(&self, options: &QueryOptions) -> Result<HashMap<String, String>> {
        let mut params = HashMap::new();
        if let Some(size) = options.size {
            params.insert(self.size_param.clone(), self.native_size(size)?.to_string());
        }
        if let Some(style) = options.style {
            params.insert(
                self.style_param.clone(),
                self.native_style(style)?.to_string(),
            );
        }
        Ok(params)
    }
}

/// A search back-end able to return one page of results starting at an offset
///
/// Implementations must be safe to call concurrently. A transient failure should
/// be reported as `Ok(vec![])` or an error; either way the coordinator treats the
/// page as contributing nothing and carries on with the other pages.
///
/// # Examples
///
/// ```
/// use async_trait::async_trait;
/// use imsearch_dl::fetch::{EngineProfile, OffsetFetcher, PageParams, page_request_count};
/// use imsearch_dl::ResultRecord;
///
/// struct Numbers {
///     profile: EngineProfile,
/// }
///
/// #[async_trait]
/// impl OffsetFetcher for Numbers {
///     fn profile(&self) -> &EngineProfile {
///         &self.profile
///     }
///
///     async fn fetch_page(
///         &self,
///         _query: &str,
///         offset: usize,
///         params: &PageParams,
///     ) -> imsearch_dl::Result<Vec<ResultRecord>> {
///         let count = page_request_count(offset, params.num_results, 10);
///         Ok((offset..offset + count)
///             .map(|i| ResultRecord::new(format!("https://example.com/{i}.jpg"), i.to_string()))
///             .collect())
///     }
/// }
/// ```
#[async_trait]
pub trait OffsetFetcher: Send + Sync {
    /// Engine description (page size, size/style translation)
    fn profile(&self) -> &EngineProfile;

    /// Fetch the page of results beginning at `offset`
    ///
    /// # Arguments
    ///
    /// * `query` - The text query
    /// * `offset` - Index of the first result wanted (a multiple of `results_per_request`)
    /// * `params` - Native parameters, headers and the total result count
    async fn fetch_page(
        &self,
        query: &str,
        offset: usize,
        params: &PageParams,
    ) -> Result<Vec<ResultRecord>>;
}

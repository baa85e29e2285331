//! Offset pagination primitives shared by fitledger read paths.
//!
//! [`PageRequest`] validates caller-supplied `limit`/`offset` values and
//! [`Page`] is the envelope returned to adapters. The envelope always reports
//! the pre-pagination `total`, so counts stay consistent across page
//! boundaries regardless of the chosen `limit`.
//!
//! # Examples
//!
//! ```
//! use pagination::{Page, PageRequest};
//!
//! let request = PageRequest::new(Some(2), Some(1))?;
//! let page = Page::from_items(vec![10, 20, 30, 40], request);
//! assert_eq!(page.data, vec![20, 30]);
//! assert_eq!(page.total, 4);
//! assert!(page.has_more);
//! # Ok::<(), pagination::PageRequestError>(())
//! ```

use serde::{Deserialize, Serialize};

/// Validation failures raised while building a [`PageRequest`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum PageRequestError {
    /// A zero limit can never return data.
    #[error("limit must be at least 1")]
    ZeroLimit,
    /// The limit exceeds [`PageRequest::MAX_LIMIT`].
    #[error("limit must not exceed {max}, got {requested}")]
    LimitTooLarge {
        /// Limit supplied by the caller.
        requested: usize,
        /// Largest accepted limit.
        max: usize,
    },
}

/// Validated `limit`/`offset` pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageRequest {
    limit: usize,
    offset: usize,
}

impl PageRequest {
    /// Limit applied when the caller does not supply one.
    pub const DEFAULT_LIMIT: usize = 50;

    /// Largest accepted limit.
    pub const MAX_LIMIT: usize = 200;

    /// Build a request, defaulting missing values.
    ///
    /// # Errors
    ///
    /// Returns [`PageRequestError::ZeroLimit`] for a zero limit and
    /// [`PageRequestError::LimitTooLarge`] when the limit exceeds
    /// [`Self::MAX_LIMIT`].
    pub const fn new(limit: Option<usize>, offset: Option<usize>) -> Result<Self, PageRequestError> {
        let resolved_limit = match limit {
            Some(value) => value,
            None => Self::DEFAULT_LIMIT,
        };
        if resolved_limit == 0 {
            return Err(PageRequestError::ZeroLimit);
        }
        if resolved_limit > Self::MAX_LIMIT {
            return Err(PageRequestError::LimitTooLarge {
                requested: resolved_limit,
                max: Self::MAX_LIMIT,
            });
        }
        let resolved_offset = match offset {
            Some(value) => value,
            None => 0,
        };
        Ok(Self {
            limit: resolved_limit,
            offset: resolved_offset,
        })
    }

    /// Maximum number of items in the page.
    #[must_use]
    pub const fn limit(&self) -> usize {
        self.limit
    }

    /// Number of matching items skipped before the page starts.
    #[must_use]
    pub const fn offset(&self) -> usize {
        self.offset
    }
}

impl Default for PageRequest {
    fn default() -> Self {
        Self {
            limit: Self::DEFAULT_LIMIT,
            offset: 0,
        }
    }
}

/// One page of results plus the pre-pagination match count.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Page<T> {
    /// Items in this page.
    pub data: Vec<T>,
    /// Number of items matched before pagination was applied.
    pub total: usize,
    /// Limit used to build the page.
    pub limit: usize,
    /// Offset used to build the page.
    pub offset: usize,
    /// Whether items remain after this page.
    pub has_more: bool,
}

impl<T> Page<T> {
    /// Slice an already ordered collection into a page.
    #[must_use]
    pub fn from_items(items: Vec<T>, request: PageRequest) -> Self {
        let total = items.len();
        let data: Vec<T> = items
            .into_iter()
            .skip(request.offset)
            .take(request.limit)
            .collect();
        let has_more = request.offset.saturating_add(data.len()) < total;
        Self {
            data,
            total,
            limit: request.limit,
            offset: request.offset,
            has_more,
        }
    }

    /// Transform the items while keeping the envelope metadata.
    #[must_use]
    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Page<U> {
        Page {
            data: self.data.into_iter().map(f).collect(),
            total: self.total,
            limit: self.limit,
            offset: self.offset,
            has_more: self.has_more,
        }
    }
}

#[cfg(test)]
mod tests {
    //! Unit coverage for request validation and page slicing.

    use super::*;
    use rstest::rstest;

    #[rstest]
    fn defaults_apply_when_values_are_missing() {
        let request = PageRequest::new(None, None).expect("defaults are valid");
        assert_eq!(request.limit(), PageRequest::DEFAULT_LIMIT);
        assert_eq!(request.offset(), 0);
    }

    #[rstest]
    #[case(Some(0), PageRequestError::ZeroLimit)]
    #[case(
        Some(PageRequest::MAX_LIMIT + 1),
        PageRequestError::LimitTooLarge { requested: PageRequest::MAX_LIMIT + 1, max: PageRequest::MAX_LIMIT }
    )]
    fn rejects_invalid_limits(#[case] limit: Option<usize>, #[case] expected: PageRequestError) {
        let error = PageRequest::new(limit, None).expect_err("limit should be rejected");
        assert_eq!(error, expected);
    }

    #[rstest]
    #[case(1, 0, vec![1], true)]
    #[case(2, 2, vec![3, 4], true)]
    #[case(3, 3, vec![4, 5], false)]
    #[case(10, 0, vec![1, 2, 3, 4, 5], false)]
    #[case(2, 9, vec![], false)]
    fn pages_report_consistent_totals(
        #[case] limit: usize,
        #[case] offset: usize,
        #[case] expected: Vec<i32>,
        #[case] has_more: bool,
    ) {
        let request = PageRequest::new(Some(limit), Some(offset)).expect("valid request");
        let page = Page::from_items(vec![1, 2, 3, 4, 5], request);

        assert_eq!(page.data, expected);
        assert_eq!(page.total, 5);
        assert_eq!(page.has_more, has_more);
    }

    #[rstest]
    fn envelope_serialises_in_camel_case() {
        let page = Page::from_items(vec!["a"], PageRequest::default());
        let json = serde_json::to_value(&page).expect("serialise page");
        assert_eq!(json["hasMore"], serde_json::json!(false));
        assert_eq!(json["total"], serde_json::json!(1));
    }
}

//! Fetch-layer error taxonomy.
use std::{fmt, time::Duration};

use http::StatusCode;
use thiserror::Error;

use crate::ports::{file_system::FileSystemError, http_client::HttpClientError};

pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Where a fragment's content comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FragmentOrigin {
    Local,
    File,
    Remote,
}

impl fmt::Display for FragmentOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FragmentOrigin::Local => write!(f, "local"),
            FragmentOrigin::File => write!(f, "file"),
            FragmentOrigin::Remote => write!(f, "remote"),
        }
    }
}

/// The underlying reason a fragment could not be produced.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum FetchFailure {
    #[error(transparent)]
    File(#[from] FileSystemError),

    #[error(transparent)]
    Http(#[from] HttpClientError),

    #[error("timed out after {0:?}")]
    Timeout(Duration),

    #[error("upstream responded with status {0}")]
    Status(StatusCode),

    #[error("invalid fragment url '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("invalid fragment request: {0}")]
    InvalidRequest(String),

    #[error("failed to decode response body: {0}")]
    Decode(String),

    #[error("failed to parse response body: {0}")]
    Parse(#[source] BoxError),
}

/// Terminal failure of a single fragment fetch.
///
/// Carries the fragment name and origin kind so callers can handle failures
/// structurally. Raised from [`FragmentFetcher::fetch`] only for required
/// fragments without a recovery hook, where it acts as the decline signal.
///
/// [`FragmentFetcher::fetch`]: crate::core::fetcher::FragmentFetcher::fetch
#[derive(Error, Debug)]
#[error("{origin} fragment '{fragment}' could not be fetched: {cause}")]
pub struct FragmentFetchError {
    fragment: String,
    origin: FragmentOrigin,
    #[source]
    cause: FetchFailure,
}

impl FragmentFetchError {
    pub fn new(fragment: impl Into<String>, origin: FragmentOrigin, cause: FetchFailure) -> Self {
        Self {
            fragment: fragment.into(),
            origin,
            cause,
        }
    }

    pub fn fragment(&self) -> &str {
        &self.fragment
    }

    pub fn origin(&self) -> FragmentOrigin {
        self.origin
    }

    pub fn cause(&self) -> &FetchFailure {
        &self.cause
    }

    pub fn is_timeout(&self) -> bool {
        matches!(
            self.cause,
            FetchFailure::Timeout(_) | FetchFailure::Http(HttpClientError::Timeout(_))
        )
    }
}

#[cfg(test)]
mod tests {
    use std::error::Error as _;

    use super::*;

    #[test]
    fn test_error_carries_fragment_and_origin() {
        let err = FragmentFetchError::new(
            "greeter",
            FragmentOrigin::Remote,
            FetchFailure::Status(StatusCode::NOT_FOUND),
        );
        assert_eq!(err.fragment(), "greeter");
        assert_eq!(err.origin(), FragmentOrigin::Remote);
        assert!(!err.is_timeout());
        assert_eq!(
            err.to_string(),
            "remote fragment 'greeter' could not be fetched: upstream responded with status 404 Not Found"
        );
        assert!(err.source().is_some());
    }

    #[test]
    fn test_timeout_classification() {
        let err = FragmentFetchError::new(
            "slow",
            FragmentOrigin::Remote,
            FetchFailure::Timeout(Duration::from_millis(3000)),
        );
        assert!(err.is_timeout());
    }
}

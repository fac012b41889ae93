use async_trait::async_trait;
use axum::body::Body as AxumBody;
use hyper::{Request, Response};
use thiserror::Error;

/// Custom error type for HTTP client operations
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum HttpClientError {
    /// The upstream actively refused the connection
    #[error("Connection refused: {0}")]
    ConnectionRefused(String),

    /// Any other transport failure talking to the upstream
    #[error("Connection error: {0}")]
    ConnectionError(String),

    /// The transport gave up waiting on the upstream
    #[error("Timeout error: {0}")]
    Timeout(String),

    /// Error when request is invalid
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}

/// Result type alias for HTTP client operations
pub type HttpClientResult<T> = Result<T, HttpClientError>;

/// HttpClient defines the port (interface) for making outbound HTTP requests,
/// both for remote fragments and for proxied fallback traffic.
#[async_trait]
pub trait HttpClient: Send + Sync + 'static {
    /// Send an HTTP request upstream.
    ///
    /// Any status code is a successful response at this level; callers decide
    /// what a non-2xx status means to them.
    async fn send_request(&self, req: Request<AxumBody>) -> HttpClientResult<Response<AxumBody>>;
}

use async_trait::async_trait;
use thiserror::Error;

use crate::core::{
    context::RequestContext, error::FragmentFetchError, fetcher::FragmentFetcher, route::Route,
};

/// Output of a renderer for one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Composed {
    pub body: String,
    /// Overrides the default `text/html` content type when set.
    pub content_type: Option<String>,
}

impl Composed {
    pub fn html(body: impl Into<String>) -> Self {
        Self {
            body: body.into(),
            content_type: None,
        }
    }
}

#[derive(Error, Debug)]
pub enum RenderError {
    /// A required fragment failed; the route declines the request.
    #[error(transparent)]
    Fetch(#[from] FragmentFetchError),

    /// Anything else; surfaces as a server error.
    #[error("render failed: {0}")]
    Failed(eyre::Report),
}

/// Renderer defines the port (interface) that turns a matched route's
/// fragments into a response body.
#[async_trait]
pub trait Renderer: Send + Sync + 'static {
    async fn render(
        &self,
        route: &Route,
        fetcher: &FragmentFetcher,
        ctx: &RequestContext,
    ) -> Result<Composed, RenderError>;
}

//! Per-route decision between redirecting, composing a response and declining.
use std::sync::Arc;

use axum::body::Body;
use eyre::{Result, WrapErr};
use http::{
    HeaderMap, HeaderValue, Response, StatusCode,
    header::{CACHE_CONTROL, CONTENT_TYPE, LOCATION},
    request::Parts,
};
use tracing::Instrument;

use crate::{
    core::{
        context::RequestContext, fetcher::FragmentFetcher, fragment::HTML_CONTENT_TYPE,
        registry::RouteRegistry, route::Route,
    },
    ports::renderer::{RenderError, Renderer},
};

/// Outcome of dispatching one request.
#[derive(Debug)]
pub enum Dispatch {
    Respond(Response<Body>),
    /// Not handled here; the request passes through to the origin.
    Decline,
}

pub struct RouteDispatcher {
    registry: Arc<RouteRegistry>,
    renderer: Arc<dyn Renderer>,
    fetcher: FragmentFetcher,
    default_headers: HeaderMap,
}

impl RouteDispatcher {
    pub fn new(
        registry: Arc<RouteRegistry>,
        renderer: Arc<dyn Renderer>,
        fetcher: FragmentFetcher,
    ) -> Self {
        Self {
            registry,
            renderer,
            fetcher,
            default_headers: HeaderMap::new(),
        }
    }

    /// Headers added to every composed or redirect response. Route headers win.
    pub fn with_default_headers(mut self, headers: HeaderMap) -> Self {
        self.default_headers = headers;
        self
    }

    pub fn registry(&self) -> &RouteRegistry {
        &self.registry
    }

    /// Dispatch an inbound request head. Unmatched requests are declined.
    pub async fn dispatch(&self, parts: &Parts) -> Result<Dispatch> {
        match self.registry.find(&parts.method, parts.uri.path()) {
            Some(matched) => {
                let ctx = RequestContext::new(parts, matched.params);
                self.dispatch_route(&matched.route, ctx).await
            }
            None => Ok(Dispatch::Decline),
        }
    }

    /// Dispatch a request against a known route.
    pub async fn dispatch_route(&self, route: &Route, ctx: RequestContext) -> Result<Dispatch> {
        if let Some(redirect) = route.redirect() {
            tracing::info!(parent: ctx.span(), location = ?redirect.location, "Redirecting");
            let mut response = Response::new(Body::empty());
            *response.status_mut() = redirect.status;
            response
                .headers_mut()
                .insert(LOCATION, redirect.location.clone());
            self.apply_headers(route, response.headers_mut());
            return Ok(Dispatch::Respond(response));
        }

        let span = ctx.span().clone();
        self.compose(route, &ctx).instrument(span).await
    }

    async fn compose(&self, route: &Route, ctx: &RequestContext) -> Result<Dispatch> {
        if !route.allows(ctx) {
            tracing::debug!(route = route.path(), "on_request declined");
            return Ok(Dispatch::Decline);
        }

        let composed = match self.renderer.render(route, &self.fetcher, ctx).await {
            Ok(composed) => composed,
            Err(RenderError::Fetch(err)) => {
                tracing::info!(
                    route = route.path(),
                    fragment = err.fragment(),
                    "required fragment unavailable, passing through"
                );
                return Ok(Dispatch::Decline);
            }
            Err(RenderError::Failed(report)) => {
                return Err(report).wrap_err_with(|| format!("failed to render {}", route.path()));
            }
        };

        let content_type = composed
            .content_type
            .as_deref()
            .and_then(|ct| HeaderValue::from_str(ct).ok())
            .unwrap_or_else(|| HeaderValue::from_static(HTML_CONTENT_TYPE));
        tracing::info!(
            "Responding with {:?} of length {}",
            content_type,
            composed.body.len()
        );

        let mut response = Response::new(Body::from(composed.body));
        *response.status_mut() = StatusCode::OK;
        response.headers_mut().insert(CONTENT_TYPE, content_type);
        self.apply_headers(route, response.headers_mut());
        Ok(Dispatch::Respond(response))
    }

    fn apply_headers(&self, route: &Route, headers: &mut HeaderMap) {
        headers.insert(CACHE_CONTROL, route.cache_control().clone());
        for (name, value) in &self.default_headers {
            headers.insert(name.clone(), value.clone());
        }
        for (name, value) in route.response_headers() {
            headers.insert(name.clone(), value.clone());
        }
    }
}

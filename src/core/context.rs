//! Request-scoped context threaded through dispatch, gate hooks, fetches and
//! resolver functions.
//!
//! A [`RequestContext`] is built exactly once per request from the inbound
//! request head and the path parameters captured by the route match. It is
//! immutable and only ever lent out by reference, so nothing downstream can
//! retain or mutate request state.
use std::collections::BTreeMap;

use http::{HeaderMap, Method, Uri, request::Parts};
use tracing::Span;

/// Request id attached to the inbound request by the HTTP handler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestId(pub String);

/// Request-scoped tracing span attached to the inbound request by the HTTP handler.
#[derive(Debug, Clone)]
pub struct RequestSpan(pub Span);

#[derive(Debug)]
pub struct RequestContext {
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    query: BTreeMap<String, String>,
    params: BTreeMap<String, String>,
    request_id: Option<String>,
    span: Span,
}

impl RequestContext {
    /// Build the context for an inbound request.
    ///
    /// The request-scoped span stored in the request extensions is used when
    /// present, otherwise the currently entered span stands in as the logger.
    pub fn new(parts: &Parts, params: BTreeMap<String, String>) -> Self {
        let span = parts
            .extensions
            .get::<RequestSpan>()
            .map(|s| s.0.clone())
            .unwrap_or_else(Span::current);
        let request_id = parts.extensions.get::<RequestId>().map(|id| id.0.clone());

        Self {
            method: parts.method.clone(),
            uri: parts.uri.clone(),
            headers: parts.headers.clone(),
            query: parse_query(parts.uri.query()),
            params,
            request_id,
            span,
        }
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn uri(&self) -> &Uri {
        &self.uri
    }

    pub fn path(&self) -> &str {
        self.uri.path()
    }

    /// Headers of the inbound request.
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Decoded query parameters of the inbound request (last value wins).
    pub fn query(&self) -> &BTreeMap<String, String> {
        &self.query
    }

    pub fn query_param(&self, name: &str) -> Option<&str> {
        self.query.get(name).map(String::as_str)
    }

    /// Path parameters captured by the matched route pattern.
    pub fn params(&self) -> &BTreeMap<String, String> {
        &self.params
    }

    pub fn param(&self, name: &str) -> Option<&str> {
        self.params.get(name).map(String::as_str)
    }

    pub fn request_id(&self) -> Option<&str> {
        self.request_id.as_deref()
    }

    /// The request-scoped logger.
    pub fn span(&self) -> &Span {
        &self.span
    }
}

fn parse_query(query: Option<&str>) -> BTreeMap<String, String> {
    query
        .map(|q| url::form_urlencoded::parse(q.as_bytes()).into_owned().collect())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parts(uri: &str) -> Parts {
        let (parts, _) = http::Request::builder()
            .uri(uri)
            .header("accept", "text/html")
            .body(())
            .unwrap()
            .into_parts();
        parts
    }

    #[test]
    fn test_query_is_decoded() {
        let ctx = RequestContext::new(&parts("/item/7?q=a%20b&limit=5&limit=6"), BTreeMap::new());
        assert_eq!(ctx.query_param("q"), Some("a b"));
        assert_eq!(ctx.query_param("limit"), Some("6"));
        assert_eq!(ctx.path(), "/item/7");
    }

    #[test]
    fn test_params_and_extensions() {
        let mut p = parts("/item/7");
        p.extensions.insert(RequestId("req-1".to_string()));
        let params = BTreeMap::from([("id".to_string(), "7".to_string())]);

        let ctx = RequestContext::new(&p, params);
        assert_eq!(ctx.param("id"), Some("7"));
        assert_eq!(ctx.param("missing"), None);
        assert_eq!(ctx.request_id(), Some("req-1"));
        assert_eq!(ctx.headers().get("accept").unwrap(), "text/html");
    }
}

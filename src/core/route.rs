//! Route definitions: a path+method binding to a composition strategy,
//! caching policy and gate hook.
use std::{fmt, sync::Arc};

use http::{HeaderMap, HeaderName, HeaderValue, Method, StatusCode};
use thiserror::Error;

use crate::core::{context::RequestContext, fragment::Fragment};

/// Directive used whenever a route does not opt into caching.
pub const NO_STORE_CACHE_CONTROL: &str = "no-cache, no-store, must-revalidate, max-age=0";

pub type GateFn = Arc<dyn Fn(&RequestContext) -> bool + Send + Sync>;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum RouteError {
    #[error("route {path}: path must start with '/'")]
    InvalidPath { path: String },

    #[error("route {path}: invalid response header '{name}': {reason}")]
    InvalidHeader {
        path: String,
        name: String,
        reason: String,
    },

    #[error("route {path}: invalid redirect '{location}': {reason}")]
    InvalidRedirect {
        path: String,
        location: String,
        reason: String,
    },

    #[error("route {path}: fragment '{name}' is defined more than once")]
    DuplicateFragment { path: String, name: String },

    #[error("route {path}: template fragment '{name}' is not defined")]
    UnknownTemplate { path: String, name: String },
}

/// `Cache-Control` value for a route's max age.
pub fn cache_control_for(max_age: Option<u64>) -> String {
    match max_age {
        Some(secs) if secs > 0 => format!("public; max-age={secs}"),
        _ => NO_STORE_CACHE_CONTROL.to_string(),
    }
}

#[derive(Debug, Clone)]
pub struct Redirect {
    pub location: HeaderValue,
    pub status: StatusCode,
}

/// Immutable route, built once at startup.
#[derive(Clone)]
pub struct Route {
    path: String,
    method: Method,
    cache_max_age: Option<u64>,
    cache_control: HeaderValue,
    redirect: Option<Redirect>,
    response_headers: HeaderMap,
    on_request: Option<GateFn>,
    fragments: Vec<Fragment>,
    template: Option<String>,
}

impl Route {
    pub fn builder(path: impl Into<String>) -> RouteBuilder {
        RouteBuilder::new(path)
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn cache_max_age(&self) -> Option<u64> {
        self.cache_max_age
    }

    pub fn cache_control(&self) -> &HeaderValue {
        &self.cache_control
    }

    pub fn redirect(&self) -> Option<&Redirect> {
        self.redirect.as_ref()
    }

    pub fn response_headers(&self) -> &HeaderMap {
        &self.response_headers
    }

    pub fn fragments(&self) -> &[Fragment] {
        &self.fragments
    }

    pub fn fragment(&self, name: &str) -> Option<&Fragment> {
        self.fragments.iter().find(|f| f.name() == name)
    }

    /// Name of the fragment used as the page template, if any.
    pub fn template(&self) -> Option<&str> {
        self.template.as_deref()
    }

    /// Run the gate hook. Routes without one always continue.
    pub fn allows(&self, ctx: &RequestContext) -> bool {
        self.on_request.as_ref().is_none_or(|gate| gate(ctx))
    }
}

impl fmt::Debug for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Route")
            .field("path", &self.path)
            .field("method", &self.method)
            .field("cache_max_age", &self.cache_max_age)
            .field("redirect", &self.redirect)
            .field("fragments", &self.fragments)
            .field("template", &self.template)
            .finish_non_exhaustive()
    }
}

pub struct RouteBuilder {
    path: String,
    method: Method,
    cache_max_age: Option<u64>,
    redirect: Option<(String, StatusCode)>,
    response_headers: Vec<(String, String)>,
    on_request: Option<GateFn>,
    fragments: Vec<Fragment>,
    template: Option<String>,
}

impl RouteBuilder {
    fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            method: Method::GET,
            cache_max_age: None,
            redirect: None,
            response_headers: Vec::new(),
            on_request: None,
            fragments: Vec::new(),
            template: None,
        }
    }

    pub fn method(mut self, method: Method) -> Self {
        self.method = method;
        self
    }

    pub fn cache_max_age(mut self, secs: u64) -> Self {
        self.cache_max_age = Some(secs);
        self
    }

    /// Always answer with a `302 Found` to `location`.
    pub fn redirect(self, location: impl Into<String>) -> Self {
        self.redirect_with_status(location, StatusCode::FOUND)
    }

    pub fn redirect_with_status(mut self, location: impl Into<String>, status: StatusCode) -> Self {
        self.redirect = Some((location.into(), status));
        self
    }

    pub fn response_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.response_headers.push((name.into(), value.into()));
        self
    }

    pub fn on_request<F>(mut self, gate: F) -> Self
    where
        F: Fn(&RequestContext) -> bool + Send + Sync + 'static,
    {
        self.on_request = Some(Arc::new(gate));
        self
    }

    pub fn fragment(mut self, fragment: Fragment) -> Self {
        self.fragments.push(fragment);
        self
    }

    pub fn template(mut self, fragment_name: impl Into<String>) -> Self {
        self.template = Some(fragment_name.into());
        self
    }

    pub fn build(self) -> Result<Route, RouteError> {
        let path = self.path;
        if !path.starts_with('/') {
            return Err(RouteError::InvalidPath { path });
        }

        let mut response_headers = HeaderMap::new();
        for (name, value) in self.response_headers {
            let header_name =
                HeaderName::from_bytes(name.as_bytes()).map_err(|e| RouteError::InvalidHeader {
                    path: path.clone(),
                    name: name.clone(),
                    reason: e.to_string(),
                })?;
            let header_value =
                HeaderValue::from_str(&value).map_err(|e| RouteError::InvalidHeader {
                    path: path.clone(),
                    name: name.clone(),
                    reason: e.to_string(),
                })?;
            response_headers.insert(header_name, header_value);
        }

        let redirect = match self.redirect {
            Some((location, status)) => {
                if !status.is_redirection() {
                    return Err(RouteError::InvalidRedirect {
                        path,
                        location,
                        reason: format!("{status} is not a redirection status"),
                    });
                }
                let location_value =
                    HeaderValue::from_str(&location).map_err(|e| RouteError::InvalidRedirect {
                        path: path.clone(),
                        location: location.clone(),
                        reason: e.to_string(),
                    })?;
                Some(Redirect {
                    location: location_value,
                    status,
                })
            }
            None => None,
        };

        for (i, fragment) in self.fragments.iter().enumerate() {
            if self.fragments[..i].iter().any(|f| f.name() == fragment.name()) {
                return Err(RouteError::DuplicateFragment {
                    path,
                    name: fragment.name().to_string(),
                });
            }
        }

        if let Some(template) = &self.template {
            if !self.fragments.iter().any(|f| f.name() == template) {
                return Err(RouteError::UnknownTemplate {
                    path,
                    name: template.clone(),
                });
            }
        }

        let cache_control = HeaderValue::from_str(&cache_control_for(self.cache_max_age))
            .unwrap_or_else(|_| HeaderValue::from_static(NO_STORE_CACHE_CONTROL));

        Ok(Route {
            path,
            method: self.method,
            cache_max_age: self.cache_max_age,
            cache_control,
            redirect,
            response_headers,
            on_request: self.on_request,
            fragments: self.fragments,
            template: self.template,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;

    #[test]
    fn test_cache_control_values() {
        assert_eq!(cache_control_for(None), NO_STORE_CACHE_CONTROL);
        assert_eq!(cache_control_for(Some(0)), NO_STORE_CACHE_CONTROL);
        assert_eq!(cache_control_for(Some(1800)), "public; max-age=1800");
    }

    #[test]
    fn test_builder_defaults() {
        let route = Route::builder("/item/{id}").build().unwrap();
        assert_eq!(route.method(), &Method::GET);
        assert_eq!(route.cache_control(), NO_STORE_CACHE_CONTROL);
        assert!(route.redirect().is_none());
        assert!(route.fragments().is_empty());
    }

    #[test]
    fn test_gate_hook() {
        let route = Route::builder("/")
            .on_request(|ctx| ctx.query_param("preview").is_none())
            .build()
            .unwrap();
        let (parts, _) = http::Request::builder()
            .uri("/?preview=1")
            .body(())
            .unwrap()
            .into_parts();
        let ctx = RequestContext::new(&parts, BTreeMap::new());
        assert!(!route.allows(&ctx));
    }

    #[test]
    fn test_builder_rejects_bad_definitions() {
        let err = Route::builder("/a")
            .fragment(Fragment::local("x", serde_json::json!(1)))
            .fragment(Fragment::local("x", serde_json::json!(2)))
            .build()
            .unwrap_err();
        assert!(matches!(err, RouteError::DuplicateFragment { .. }));

        let err = Route::builder("/a").template("base").build().unwrap_err();
        assert!(matches!(err, RouteError::UnknownTemplate { .. }));

        let err = Route::builder("/a")
            .redirect_with_status("/b", StatusCode::OK)
            .build()
            .unwrap_err();
        assert!(matches!(err, RouteError::InvalidRedirect { .. }));

        let err = Route::builder("/a")
            .response_header("bad header", "x")
            .build()
            .unwrap_err();
        assert!(matches!(err, RouteError::InvalidHeader { .. }));

        assert!(Route::builder("no-slash").build().is_err());
    }
}

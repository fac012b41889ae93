//! Method-aware path lookup for composed routes.
//!
//! Patterns use `{name}` segments for parameters and `{*name}` for a trailing
//! catch-all. Express-style `:name` segments are accepted and normalised.
use std::{
    collections::{BTreeMap, HashMap, HashSet},
    sync::Arc,
};

use http::Method;
use thiserror::Error;

use crate::core::route::{Route, RouteError};

#[derive(Error, Debug)]
pub enum RegistryError {
    #[error("route {method} {path} is registered more than once")]
    Duplicate { method: Method, path: String },

    #[error("route {method} {path} conflicts with an existing route: {source}")]
    Conflict {
        method: Method,
        path: String,
        #[source]
        source: matchit::InsertError,
    },

    #[error(transparent)]
    Route(#[from] RouteError),
}

/// A route matched against a request, with its captured path parameters.
#[derive(Debug, Clone)]
pub struct RouteMatch {
    pub route: Arc<Route>,
    pub params: BTreeMap<String, String>,
}

/// Immutable lookup table, built once at startup.
pub struct RouteRegistry {
    routers: HashMap<Method, matchit::Router<usize>>,
    routes: Vec<Arc<Route>>,
}

impl RouteRegistry {
    pub fn builder() -> RouteRegistryBuilder {
        RouteRegistryBuilder::default()
    }

    pub fn empty() -> Self {
        Self {
            routers: HashMap::new(),
            routes: Vec::new(),
        }
    }

    /// Find the route for a method and path. `HEAD` falls back to `GET` routes.
    pub fn find(&self, method: &Method, path: &str) -> Option<RouteMatch> {
        self.lookup(method, path).or_else(|| {
            if method == Method::HEAD {
                self.lookup(&Method::GET, path)
            } else {
                None
            }
        })
    }

    fn lookup(&self, method: &Method, path: &str) -> Option<RouteMatch> {
        let router = self.routers.get(method)?;
        let matched = router.at(path).ok()?;
        let route = self.routes.get(*matched.value)?.clone();
        let params = matched
            .params
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Some(RouteMatch { route, params })
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<Route>> {
        self.routes.iter()
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}

impl std::fmt::Debug for RouteRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RouteRegistry")
            .field("routes", &self.routes)
            .finish()
    }
}

#[derive(Default)]
pub struct RouteRegistryBuilder {
    routes: Vec<Route>,
}

impl RouteRegistryBuilder {
    pub fn route(mut self, route: Route) -> Self {
        self.routes.push(route);
        self
    }

    pub fn build(self) -> Result<RouteRegistry, RegistryError> {
        let mut routers: HashMap<Method, matchit::Router<usize>> = HashMap::new();
        let mut seen = HashSet::new();
        let mut routes = Vec::with_capacity(self.routes.len());

        for route in self.routes {
            let method = route.method().clone();
            let pattern = normalize_path(route.path());
            if !seen.insert((method.clone(), pattern.clone())) {
                return Err(RegistryError::Duplicate {
                    method,
                    path: route.path().to_string(),
                });
            }

            let index = routes.len();
            routers
                .entry(method.clone())
                .or_default()
                .insert(pattern, index)
                .map_err(|source| RegistryError::Conflict {
                    method,
                    path: route.path().to_string(),
                    source,
                })?;
            routes.push(Arc::new(route));
        }

        Ok(RouteRegistry { routers, routes })
    }
}

/// Rewrite `:name` segments to `{name}` and `*name` to `{*name}`.
pub fn normalize_path(path: &str) -> String {
    path.split('/')
        .map(|segment| {
            if let Some(name) = segment.strip_prefix(':').filter(|n| !n.is_empty()) {
                format!("{{{name}}}")
            } else if let Some(name) = segment.strip_prefix('*').filter(|n| !n.is_empty()) {
                format!("{{*{name}}}")
            } else {
                segment.to_string()
            }
        })
        .collect::<Vec<_>>()
        .join("/")
}

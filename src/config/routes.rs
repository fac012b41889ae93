//! Turns route definitions from configuration into a [`RouteRegistry`].
use std::{path::PathBuf, str::FromStr};

use http::{Method, StatusCode};
use thiserror::Error;

use crate::{
    config::models::{FragmentDefinition, FragmentKind, RouteDefinition, ServerConfig},
    core::{
        fragment::{Fragment, FragmentContent, RemoteUrl},
        registry::{RegistryError, RouteRegistry},
        resolver::{Encoding, ParamMap, Resolvable, interpolate},
        route::{Route, RouteError},
    },
};

#[derive(Error, Debug)]
pub enum RouteCompileError {
    #[error("route {route}: invalid method '{method}'")]
    InvalidMethod { route: String, method: String },

    #[error("route {route}: invalid redirect status {status}")]
    InvalidStatus { route: String, status: u16 },

    #[error("route {route}: fragment '{fragment}': {reason}")]
    InvalidFragment {
        route: String,
        fragment: String,
        reason: String,
    },

    #[error(transparent)]
    Route(#[from] RouteError),

    #[error(transparent)]
    Registry(#[from] RegistryError),
}

/// Build the registry for every route in the configuration.
pub fn compile_routes(config: &ServerConfig) -> Result<RouteRegistry, RouteCompileError> {
    let mut builder = RouteRegistry::builder();
    for definition in &config.routes {
        builder = builder.route(compile_route(definition, &config.default_backend_url)?);
    }
    let registry = builder.build()?;
    tracing::debug!(routes = registry.len(), "compiled routes");
    Ok(registry)
}

fn parse_method(route: &str, method: &str) -> Result<Method, RouteCompileError> {
    Method::from_str(&method.to_ascii_uppercase()).map_err(|_| RouteCompileError::InvalidMethod {
        route: route.to_string(),
        method: method.to_string(),
    })
}

fn compile_route(
    definition: &RouteDefinition,
    default_backend: &str,
) -> Result<Route, RouteCompileError> {
    let path = &definition.path;
    let mut builder = Route::builder(path.clone()).method(parse_method(path, &definition.method)?);

    if let Some(max_age) = definition.cache_max_age {
        builder = builder.cache_max_age(max_age);
    }
    if let Some(location) = &definition.redirect {
        let status = match definition.redirect_status {
            Some(code) => StatusCode::from_u16(code).map_err(|_| RouteCompileError::InvalidStatus {
                route: path.clone(),
                status: code,
            })?,
            None => StatusCode::FOUND,
        };
        builder = builder.redirect_with_status(location.clone(), status);
    }
    for (name, value) in &definition.response_headers {
        builder = builder.response_header(name.clone(), value.clone());
    }
    if let Some(template) = &definition.template {
        builder = builder.template(template.clone());
    }
    for fragment in &definition.fragments {
        builder = builder.fragment(compile_fragment(path, fragment, default_backend)?);
    }

    Ok(builder.build()?)
}

fn compile_fragment(
    route: &str,
    definition: &FragmentDefinition,
    default_backend: &str,
) -> Result<Fragment, RouteCompileError> {
    let invalid = |reason: &str| RouteCompileError::InvalidFragment {
        route: route.to_string(),
        fragment: definition.name.clone(),
        reason: reason.to_string(),
    };

    let mut fragment = match definition.kind {
        FragmentKind::Local => {
            let data = definition
                .data
                .clone()
                .ok_or_else(|| invalid("local fragments need `data`"))?;
            Fragment::local(definition.name.clone(), data)
        }
        FragmentKind::File => {
            let path = definition
                .path
                .clone()
                .ok_or_else(|| invalid("file fragments need `path`"))?;
            Fragment::file(definition.name.clone(), path_template(path))
        }
        FragmentKind::Remote => {
            let url = definition
                .url
                .as_deref()
                .ok_or_else(|| invalid("remote fragments need `url`"))?;
            let base = definition.base.as_deref().unwrap_or(default_backend);
            let mut remote = RemoteUrl::new(Resolvable::url_template(absolute_url(base, url)));
            if let Some(credential) = &definition.authorization {
                remote = remote.with_authorization(Resolvable::template(credential.clone()));
            }

            let mut fragment = Fragment::remote(definition.name.clone(), remote)
                .with_body_type(definition.body_type)
                .pass_query_params(definition.pass_query_params);
            if let Some(method) = &definition.method {
                fragment = fragment.with_method(parse_method(route, method)?);
            }
            if !definition.query.is_empty() {
                fragment = fragment.with_query(Resolvable::Static(templated(&definition.query)));
            }
            if !definition.headers.is_empty() {
                fragment =
                    fragment.with_headers(Resolvable::Static(templated(&definition.headers)));
            }
            if let Some(body) = &definition.body {
                fragment = fragment.with_body(body.clone());
            }
            fragment
        }
    };

    fragment = fragment.required(definition.required);
    if let Some(fallback) = &definition.fallback {
        let html = fallback.clone();
        fragment = fragment.content_missing(move |_| FragmentContent::html(html.clone()));
    }
    Ok(fragment)
}

fn templated(values: &std::collections::BTreeMap<String, String>) -> ParamMap {
    values
        .iter()
        .map(|(k, v)| (k.clone(), Resolvable::template(v.clone())))
        .collect()
}

/// A refused placeholder value yields an empty path, which the fetcher rejects.
fn path_template(path: String) -> Resolvable<PathBuf> {
    if path.contains('{') {
        Resolvable::from_fn(move |ctx| {
            interpolate(&path, ctx, Encoding::PathSegment)
                .map(PathBuf::from)
                .unwrap_or_default()
        })
    } else {
        Resolvable::Static(PathBuf::from(path))
    }
}

/// Join a possibly relative fragment URL onto its base, keeping placeholders intact.
fn absolute_url(base: &str, url: &str) -> String {
    if url.starts_with("http://") || url.starts_with("https://") {
        url.to_string()
    } else {
        format!(
            "{}/{}",
            base.trim_end_matches('/'),
            url.trim_start_matches('/')
        )
    }
}

//! composer-proxy - an HTTP edge that composes pages from fragments.
//!
//! Requests matching a configured route are answered by fetching the route's
//! fragments (inline data, files on disk or remote HTTP resources) and merging
//! them into one response. Everything else, including routes that decline, is
//! passed through to a single origin.
//!
//! # Features
//! - Static route table with `{param}` and `{*rest}` patterns, checked for
//!   conflicts when it is built
//! - Fragment values resolved per request from path and query parameters
//! - Required and optional fragments with fallback content and error hooks
//! - Concurrent fragment fetching with per-request timeouts
//! - Redirect routes and per-route `Cache-Control`
//! - Fallback reverse proxy mapping refused connections to 503 and timeouts to 504
//! - Layered configuration (TOML / YAML / JSON plus environment overrides)
//! - Structured tracing via `tracing`
//!
//! # Quick Example
//! ```no_run
//! use std::sync::Arc;
//!
//! use composer_proxy::{
//!     FileSystemAdapter, HttpClientAdapter, RouteDispatcher, TemplateRenderer,
//!     config::{compile_routes, load_config},
//!     core::FragmentFetcher,
//! };
//!
//! # fn main() -> eyre::Result<()> {
//! let config = load_config("composer.toml")?;
//! let registry = compile_routes(&config)?;
//! let fetcher = FragmentFetcher::new(
//!     Arc::new(HttpClientAdapter::new()?),
//!     Arc::new(FileSystemAdapter::new()),
//! );
//! let dispatcher = RouteDispatcher::new(
//!     Arc::new(registry),
//!     Arc::new(TemplateRenderer::new()),
//!     fetcher,
//! );
//! // Wire the dispatcher into an HttpHandler together with a ProxyFallbackGateway.
//! # let _ = dispatcher;
//! # Ok(()) }
//! ```
//!
//! # Architecture
//! **Ports** (traits for the HTTP client, file system and renderer) are kept
//! apart from **adapters** (their implementations); routing, fetching and
//! proxying live in `core`.
pub mod config;
pub mod ports;
pub mod tracing_setup;
pub mod utils;

pub mod adapters;
pub mod core;

pub use crate::{
    adapters::{ErrorPage, FileSystemAdapter, HttpClientAdapter, HttpHandler, TemplateRenderer},
    core::{ProxyFallbackGateway, RouteDispatcher},
    ports::http_client::HttpClient,
    utils::GracefulShutdown,
};

//! Configuration data structures.
//!
//! These types map directly to TOML (also JSON / YAML) configuration files and
//! include defaults so that a minimal config only names the origin and routes.
use std::{
    collections::BTreeMap,
    net::{AddrParseError, SocketAddr},
    path::PathBuf,
};

use http::{HeaderMap, HeaderName, HeaderValue};
use serde::{Deserialize, Serialize};

use crate::core::{fragment::BodyType, gateway::DEFAULT_BACKEND_MAX_AGE};

pub const DEVELOPMENT: &str = "development";

fn default_method() -> String {
    "GET".to_string()
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct ServerConfig {
    pub listen_addr: String,
    /// Overrides the port of `listen_addr` when set.
    pub port: Option<u16>,
    pub environment: String,
    /// Origin receiving every request the composer does not answer.
    pub default_backend_url: String,
    /// Max age injected into proxied responses without `Cache-Control`.
    pub default_backend_max_age: u64,
    /// Headers added to every composed response. Route headers win.
    pub common_response_headers: BTreeMap<String, String>,
    pub proxy: ProxyConfig,
    /// HTML file rendered for unhandled errors, `{{message}}` is substituted.
    pub error_page: Option<PathBuf>,
    /// Directory relative file fragments are resolved against.
    pub fragment_root: Option<PathBuf>,
    pub routes: Vec<RouteDefinition>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: "0.0.0.0:3000".to_string(),
            port: None,
            environment: DEVELOPMENT.to_string(),
            default_backend_url: "http://localhost:3001".to_string(),
            default_backend_max_age: DEFAULT_BACKEND_MAX_AGE,
            common_response_headers: BTreeMap::new(),
            proxy: ProxyConfig::default(),
            error_page: None,
            fragment_root: None,
            routes: Vec::new(),
        }
    }
}

impl ServerConfig {
    pub fn is_development(&self) -> bool {
        self.environment == DEVELOPMENT
    }

    /// Address to bind, with `port` applied over `listen_addr`.
    pub fn socket_addr(&self) -> Result<SocketAddr, AddrParseError> {
        let mut addr: SocketAddr = self.listen_addr.parse()?;
        if let Some(port) = self.port {
            addr.set_port(port);
        }
        Ok(addr)
    }

    /// `common_response_headers` as a header map.
    pub fn common_header_map(&self) -> eyre::Result<HeaderMap> {
        let mut headers = HeaderMap::new();
        for (name, value) in &self.common_response_headers {
            let header_name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|e| eyre::eyre!("invalid common response header '{name}': {e}"))?;
            let header_value = HeaderValue::from_str(value)
                .map_err(|e| eyre::eyre!("invalid value for common response header '{name}': {e}"))?;
            headers.insert(header_name, header_value);
        }
        Ok(headers)
    }
}

/// Settings of the fallback reverse proxy.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct ProxyConfig {
    /// Only paths under this prefix are proxied; others get a 404.
    pub base_path: String,
    /// Log every proxied request.
    pub logs: bool,
    /// Public host substituted into origin redirects outside development.
    pub host_rewrite: Option<String>,
    pub path_rewrite: PathRewriteConfig,
    pub timeout_secs: u64,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            base_path: "/".to_string(),
            logs: true,
            host_rewrite: None,
            path_rewrite: PathRewriteConfig::default(),
            timeout_secs: 30,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq, Eq)]
#[serde(default)]
pub struct PathRewriteConfig {
    pub strip_prefix: Option<String>,
    pub add_prefix: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct RouteDefinition {
    /// Path pattern, `{name}` or `:name` segments capture parameters.
    pub path: String,
    #[serde(default = "default_method")]
    pub method: String,
    #[serde(default)]
    pub cache_max_age: Option<u64>,
    #[serde(default)]
    pub redirect: Option<String>,
    #[serde(default)]
    pub redirect_status: Option<u16>,
    #[serde(default)]
    pub response_headers: BTreeMap<String, String>,
    /// Name of the fragment whose body is the page template.
    #[serde(default)]
    pub template: Option<String>,
    #[serde(default)]
    pub fragments: Vec<FragmentDefinition>,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FragmentKind {
    Local,
    File,
    Remote,
}

/// A fragment as written in configuration.
///
/// `data` is used by local fragments, `path` by file fragments and the
/// remaining request fields by remote fragments. String values may contain
/// `{name}` placeholders filled from path then query parameters.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct FragmentDefinition {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: FragmentKind,
    #[serde(default)]
    pub required: bool,
    /// HTML rendered in place of the fragment when it cannot be fetched.
    #[serde(default)]
    pub fallback: Option<String>,

    #[serde(default)]
    pub data: Option<serde_json::Value>,
    #[serde(default)]
    pub path: Option<String>,

    /// Absolute, or relative to `base` (default: the default backend).
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub base: Option<String>,
    #[serde(default)]
    pub method: Option<String>,
    #[serde(default)]
    pub body_type: BodyType,
    #[serde(default)]
    pub authorization: Option<String>,
    #[serde(default)]
    pub query: BTreeMap<String, String>,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    #[serde(default)]
    pub body: Option<serde_json::Value>,
    #[serde(default)]
    pub pass_query_params: bool,
}

impl FragmentDefinition {
    /// A definition with only the name and kind set.
    pub fn new(name: impl Into<String>, kind: FragmentKind) -> Self {
        Self {
            name: name.into(),
            kind,
            required: false,
            fallback: None,
            data: None,
            path: None,
            url: None,
            base: None,
            method: None,
            body_type: BodyType::Text,
            authorization: None,
            query: BTreeMap::new(),
            headers: BTreeMap::new(),
            body: None,
            pass_query_params: false,
        }
    }
}

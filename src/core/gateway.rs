//! Catch-all reverse proxy for requests the composer does not answer itself.
//!
//! The `ProxyFallbackGateway` forwards declined and unmatched requests to the
//! single configured origin through the shared pooled client. It:
//! * only handles paths under its base path (everything else is a 404)
//! * optionally rewrites the path before forwarding
//! * points the outbound `Host` at the origin
//! * maps refused connections to 503 and timeouts to 504
//! * rewrites the host of redirect `Location` headers when configured
//! * injects a default `Cache-Control` when the origin sent none
use std::{sync::Arc, time::Duration};

use axum::body::Body;
use http::{
    HeaderMap, HeaderName, HeaderValue, Request, Response, StatusCode, Uri,
    header::{CACHE_CONTROL, CONNECTION, HOST, LOCATION},
};
use thiserror::Error;
use url::Url;

use crate::{
    config::models::ServerConfig,
    ports::http_client::{HttpClient, HttpClientError},
};

/// Max age used for proxied responses that carry no caching directive.
pub const DEFAULT_BACKEND_MAX_AGE: u64 = 600;

const HOP_BY_HOP: [&str; 8] = [
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
];

/// Whether a header only describes a single hop and must not be forwarded.
pub fn is_hop_by_hop(name: &HeaderName) -> bool {
    HOP_BY_HOP.contains(&name.as_str())
}

/// Header names listed in `Connection`, which are hop-by-hop as well.
pub fn connection_tokens(headers: &HeaderMap) -> Vec<HeaderName> {
    headers
        .get_all(CONNECTION)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(','))
        .filter_map(|token| HeaderName::from_bytes(token.trim().as_bytes()).ok())
        .collect()
}

pub type PathRewriteFn = Arc<dyn Fn(&str) -> String + Send + Sync>;

#[derive(Error, Debug)]
#[non_exhaustive]
pub enum ProxyError {
    #[error("invalid proxy target '{target}': {reason}")]
    InvalidTarget { target: String, reason: String },

    #[error("invalid upstream uri '{uri}': {reason}")]
    InvalidUri { uri: String, reason: String },

    #[error("proxy request to {uri} failed: {source}")]
    Transport {
        uri: String,
        #[source]
        source: HttpClientError,
    },
}

pub struct ProxyFallbackGateway {
    client: Arc<dyn HttpClient>,
    target: Url,
    target_host: HeaderValue,
    base_path: String,
    rewrite: Option<PathRewriteFn>,
    host_rewrite: Option<String>,
    log_requests: bool,
    default_cache_control: HeaderValue,
    timeout: Duration,
}

impl ProxyFallbackGateway {
    pub fn new(client: Arc<dyn HttpClient>, target: &str) -> Result<Self, ProxyError> {
        let invalid = |reason: String| ProxyError::InvalidTarget {
            target: target.to_string(),
            reason,
        };
        let url = Url::parse(target).map_err(|e| invalid(e.to_string()))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(invalid(format!("unsupported scheme '{}'", url.scheme())));
        }
        let host = url
            .host_str()
            .ok_or_else(|| invalid("missing host".to_string()))?;
        let authority = match url.port() {
            Some(port) => format!("{host}:{port}"),
            None => host.to_string(),
        };
        let target_host = HeaderValue::from_str(&authority).map_err(|e| invalid(e.to_string()))?;

        Ok(Self {
            client,
            target: url,
            target_host,
            base_path: "/".to_string(),
            rewrite: None,
            host_rewrite: None,
            log_requests: false,
            default_cache_control: default_cache_control(DEFAULT_BACKEND_MAX_AGE),
            timeout: Duration::from_secs(30),
        })
    }

    /// Build the gateway described by the `proxy` section of the configuration.
    pub fn from_config(config: &ServerConfig, client: Arc<dyn HttpClient>) -> Result<Self, ProxyError> {
        let proxy = &config.proxy;
        let mut gateway = Self::new(client, &config.default_backend_url)?
            .with_base_path(&proxy.base_path)
            .with_request_logging(proxy.logs)
            .with_default_max_age(config.default_backend_max_age)
            .with_timeout(Duration::from_secs(proxy.timeout_secs));

        // Redirects stay pointed at the origin during local development.
        if !config.is_development() {
            if let Some(host) = &proxy.host_rewrite {
                gateway = gateway.with_host_rewrite(host);
            }
        }

        let strip = proxy.path_rewrite.strip_prefix.clone();
        let add = proxy.path_rewrite.add_prefix.clone();
        if strip.is_some() || add.is_some() {
            gateway = gateway.with_path_rewrite(move |path| {
                let stripped = match strip.as_deref() {
                    Some(prefix) => path.strip_prefix(prefix).unwrap_or(path),
                    None => path,
                };
                let joined = match add.as_deref() {
                    Some(prefix) => format!(
                        "{}/{}",
                        prefix.trim_end_matches('/'),
                        stripped.trim_start_matches('/')
                    ),
                    None => stripped.to_string(),
                };
                if joined.starts_with('/') {
                    joined
                } else {
                    format!("/{joined}")
                }
            });
        }

        Ok(gateway)
    }

    pub fn with_base_path(mut self, base_path: impl Into<String>) -> Self {
        self.base_path = base_path.into();
        self
    }

    pub fn with_path_rewrite<F>(mut self, rewrite: F) -> Self
    where
        F: Fn(&str) -> String + Send + Sync + 'static,
    {
        self.rewrite = Some(Arc::new(rewrite));
        self
    }

    pub fn with_host_rewrite(mut self, host: impl Into<String>) -> Self {
        self.host_rewrite = Some(host.into());
        self
    }

    pub fn with_request_logging(mut self, enabled: bool) -> Self {
        self.log_requests = enabled;
        self
    }

    pub fn with_default_max_age(mut self, secs: u64) -> Self {
        self.default_cache_control = default_cache_control(secs);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn target(&self) -> &Url {
        &self.target
    }

    /// Whether `path` is under the gateway's base path.
    pub fn handles(&self, path: &str) -> bool {
        let base = self.base_path.as_str();
        if base.is_empty() || base == "/" {
            return true;
        }
        path == base
            || (base.ends_with('/') && path.starts_with(base))
            || path
                .strip_prefix(base)
                .is_some_and(|rest| rest.starts_with('/'))
    }

    /// Forward a request to the origin and relay its response.
    ///
    /// Refused connections and timeouts become 503 and 504 responses; any other
    /// transport failure is returned as an error.
    pub async fn forward(&self, req: Request<Body>) -> Result<Response<Body>, ProxyError> {
        let (mut parts, body) = req.into_parts();

        let path = match &self.rewrite {
            Some(rewrite) => rewrite(parts.uri.path()),
            None => parts.uri.path().to_string(),
        };
        let path_and_query = match parts.uri.query() {
            Some(query) => format!("{path}?{query}"),
            None => path,
        };
        let upstream = self.upstream_uri(&path_and_query)?;

        if self.log_requests {
            tracing::info!(
                "Proxy: {} - {} {}",
                chrono::Utc::now().to_rfc3339(),
                parts.method,
                parts.uri
            );
        }

        strip_hop_by_hop(&mut parts.headers);
        parts.headers.insert(HOST, self.target_host.clone());
        parts.uri = upstream.clone();
        let request = Request::from_parts(parts, body);

        let response = match tokio::time::timeout(self.timeout, self.client.send_request(request))
            .await
        {
            Ok(Ok(response)) => response,
            Ok(Err(HttpClientError::ConnectionRefused(reason))) => {
                tracing::warn!(upstream = %upstream, %reason, "origin refused connection");
                return Ok(status_only(StatusCode::SERVICE_UNAVAILABLE));
            }
            Ok(Err(HttpClientError::Timeout(reason))) => {
                tracing::warn!(upstream = %upstream, %reason, "origin timed out");
                return Ok(status_only(StatusCode::GATEWAY_TIMEOUT));
            }
            Err(_) => {
                tracing::warn!(upstream = %upstream, timeout = ?self.timeout, "origin timed out");
                return Ok(status_only(StatusCode::GATEWAY_TIMEOUT));
            }
            Ok(Err(source)) => {
                return Err(ProxyError::Transport {
                    uri: upstream.to_string(),
                    source,
                });
            }
        };

        let (mut parts, body) = response.into_parts();
        strip_hop_by_hop(&mut parts.headers);
        if let Some(host) = &self.host_rewrite {
            self.rewrite_location(parts.status, &mut parts.headers, host);
        }
        if !parts.headers.contains_key(CACHE_CONTROL) {
            parts
                .headers
                .insert(CACHE_CONTROL, self.default_cache_control.clone());
        }

        Ok(Response::from_parts(parts, body))
    }

    fn upstream_uri(&self, path_and_query: &str) -> Result<Uri, ProxyError> {
        let base = self.target.as_str().trim_end_matches('/');
        let uri = format!("{base}{path_and_query}");
        uri.parse().map_err(|e: http::uri::InvalidUri| ProxyError::InvalidUri {
            uri,
            reason: e.to_string(),
        })
    }

    /// Point redirects aimed at the origin host to `host` instead.
    fn rewrite_location(&self, status: StatusCode, headers: &mut HeaderMap, host: &str) {
        if !matches!(status.as_u16(), 201 | 301 | 302 | 303 | 307 | 308) {
            return;
        }
        let Some(location) = headers.get(LOCATION).and_then(|v| v.to_str().ok()) else {
            return;
        };
        let Ok(mut url) = Url::parse(location) else {
            return;
        };
        if url.host_str() != self.target.host_str() || url.port() != self.target.port() {
            return;
        }
        let (name, port) = match host.rsplit_once(':') {
            Some((name, port)) if port.parse::<u16>().is_ok() => (name, port.parse::<u16>().ok()),
            _ => (host, None),
        };
        if url.set_host(Some(name)).is_err() || url.set_port(port).is_err() {
            return;
        }
        if let Ok(value) = HeaderValue::from_str(url.as_str()) {
            headers.insert(LOCATION, value);
        }
    }
}

fn default_cache_control(max_age: u64) -> HeaderValue {
    HeaderValue::from_str(&format!("must-revalidate, max-age={max_age}"))
        .unwrap_or_else(|_| HeaderValue::from_static("must-revalidate, max-age=600"))
}

fn strip_hop_by_hop(headers: &mut HeaderMap) {
    for name in connection_tokens(headers) {
        headers.remove(name);
    }
    for name in HOP_BY_HOP {
        headers.remove(name);
    }
}

fn status_only(status: StatusCode) -> Response<Body> {
    let mut response = Response::new(Body::empty());
    *response.status_mut() = status;
    response
}

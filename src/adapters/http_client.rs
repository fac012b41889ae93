use std::error::Error as StdError;

use async_trait::async_trait;
use axum::body::Body as AxumBody;
use eyre::Result;
use hyper::{Request, Response, Version, header, header::HeaderValue};
use hyper_rustls::HttpsConnector;
use hyper_util::{
    client::legacy::{Client, connect::HttpConnector},
    rt::TokioExecutor,
};
use rustls_native_certs::load_native_certs;
use tracing::Instrument;

use crate::ports::http_client::{HttpClient, HttpClientError, HttpClientResult};

const USER_AGENT: &str = concat!("composer-proxy/", env!("CARGO_PKG_VERSION"));

/// HTTP client adapter using Hyper with Rustls (HTTP/1.1 + HTTP/2).
///
/// One pooled instance is shared by the fragment fetcher and the fallback
/// gateway. It:
/// * Adds a `User-Agent` when the caller did not set one
/// * Sets `Host` from the request URI unless the caller already chose one
/// * Forces request version to HTTP/1.1 while allowing ALPN to negotiate h2
/// * Classifies transport failures into refused, timed out and other
pub struct HttpClientAdapter {
    client: Client<HttpsConnector<HttpConnector>, AxumBody>,
}

impl HttpClientAdapter {
    /// Create a new HTTP client adapter.
    pub fn new() -> Result<Self> {
        // Install default crypto provider for rustls if not already set
        let _ = rustls::crypto::aws_lc_rs::default_provider().install_default();

        let mut http_connector = HttpConnector::new();
        http_connector.enforce_http(false); // Allow HTTPS URLs

        let mut root_cert_store = rustls::RootCertStore::empty();
        let native_certs = load_native_certs();

        if !native_certs.certs.is_empty() {
            for cert in native_certs.certs {
                if root_cert_store.add(cert).is_err() {
                    tracing::warn!("Failed to add native certificate to rustls RootCertStore");
                }
            }
            tracing::debug!("Loaded {} native root certificates.", root_cert_store.len());
        }

        if !native_certs.errors.is_empty() {
            tracing::warn!(
                "Some native certificates failed to load: {:?}",
                native_certs.errors
            );
        }

        let tls_config = rustls::ClientConfig::builder()
            .with_root_certificates(root_cert_store)
            .with_no_client_auth();

        let https_connector = hyper_rustls::HttpsConnectorBuilder::new()
            .with_tls_config(tls_config)
            .https_or_http()
            .enable_http1()
            .wrap_connector(http_connector);

        let client = Client::builder(TokioExecutor::new()).build::<_, AxumBody>(https_connector);

        tracing::debug!("Created shared HTTP client");
        Ok(Self { client })
    }

    fn add_default_headers(req: &mut Request<AxumBody>) -> HttpClientResult<()> {
        let host = match req.uri().host() {
            Some(host) => match req.uri().port_u16() {
                Some(port) => format!("{host}:{port}"),
                None => host.to_string(),
            },
            None => {
                return Err(HttpClientError::InvalidRequest(format!(
                    "Outgoing URI has no host: {}",
                    req.uri()
                )));
            }
        };

        let headers = req.headers_mut();
        if !headers.contains_key(header::HOST) {
            let value = HeaderValue::from_str(&host)
                .map_err(|e| HttpClientError::InvalidRequest(e.to_string()))?;
            headers.insert(header::HOST, value);
        }
        if !headers.contains_key(header::USER_AGENT) {
            headers.insert(header::USER_AGENT, HeaderValue::from_static(USER_AGENT));
        }
        Ok(())
    }
}

/// Map a transport failure onto the port's error kinds by inspecting the
/// underlying I/O error, if any.
fn classify(err: &hyper_util::client::legacy::Error, target: &str) -> HttpClientError {
    let mut source: Option<&(dyn StdError + 'static)> = err.source();
    while let Some(cause) = source {
        if let Some(io) = cause.downcast_ref::<std::io::Error>() {
            match io.kind() {
                std::io::ErrorKind::ConnectionRefused => {
                    return HttpClientError::ConnectionRefused(format!("{target}: {io}"));
                }
                std::io::ErrorKind::TimedOut => {
                    return HttpClientError::Timeout(format!("{target}: {io}"));
                }
                _ => {}
            }
        }
        source = cause.source();
    }
    HttpClientError::ConnectionError(format!("Request to {target} failed: {err}"))
}

#[async_trait]
impl HttpClient for HttpClientAdapter {
    async fn send_request(
        &self,
        mut req: Request<AxumBody>,
    ) -> HttpClientResult<Response<AxumBody>> {
        Self::add_default_headers(&mut req)?;

        let target = format!("{} {}", req.method(), req.uri());
        let span = tracing::debug_span!(
            "upstream_request",
            http.method = %req.method(),
            http.url = %req.uri(),
            http.status_code = tracing::field::Empty,
        );

        let (mut parts, body) = req.into_parts();
        parts.version = Version::HTTP_11;
        let outgoing = Request::from_parts(parts, body);

        let client = self.client.clone();
        async move {
            tracing::debug!("Outgoing request headers: {:?}", outgoing.headers());
            match client.request(outgoing).await {
                Ok(response) => {
                    tracing::Span::current().record("http.status_code", response.status().as_u16());

                    let (mut parts, hyper_body) = response.into_parts();
                    // The body is re-framed by the downstream server.
                    parts.headers.remove(header::TRANSFER_ENCODING);
                    Ok(Response::from_parts(parts, AxumBody::new(hyper_body)))
                }
                Err(e) => {
                    tracing::Span::current().record("http.status_code", 599u16);
                    let error = classify(&e, &target);
                    tracing::debug!("Upstream request failed: {}", error);
                    Err(error)
                }
            }
        }
        .instrument(span)
        .await
    }
}

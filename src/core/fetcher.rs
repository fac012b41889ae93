//! Fragment fetching and its error policy.
//!
//! [`FragmentFetcher::fetch`] hides the local/file/remote distinction behind a
//! single call. A failed fetch is wrapped in a [`FragmentFetchError`] and then:
//!
//! 1. handed to the fragment's `on_fetch_error` hook, if any, and absorbed;
//! 2. otherwise raised when the fragment is required (the route declines);
//! 3. otherwise returned in place of the body.
//!
//! Unless [`FetchOptions::never_handle_error`] is set, an absorbed error is
//! finally replaced by the fragment's `content_missing` placeholder.
use std::{collections::BTreeMap, sync::Arc, time::Duration};

use axum::body::Body;
use http::{
    HeaderMap, HeaderName, HeaderValue, Method, Request,
    header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE, HOST},
};
use http_body_util::BodyExt;
use tracing::Instrument;
use url::Url;

use crate::{
    core::{
        context::RequestContext,
        error::{FetchFailure, FragmentFetchError},
        fragment::{
            BodyType, Fragment, FragmentBody, FragmentContent, FragmentSource, HTML_CONTENT_TYPE,
            JSON_CONTENT_TYPE, RemoteUrl,
        },
        gateway::{connection_tokens, is_hop_by_hop},
        resolver::resolve_params,
    },
    ports::{
        file_system::{FileSystem, FileSystemError},
        http_client::HttpClient,
    },
};

/// Default timeout of a remote fragment request.
pub const REMOTE_TIMEOUT: Duration = Duration::from_millis(3000);

/// Per-call overrides. Caller values win over the fragment's own.
#[derive(Debug, Clone, Default)]
pub struct FetchOptions {
    /// Return absorbed errors as-is instead of the `content_missing` placeholder.
    pub never_handle_error: bool,
    pub method: Option<Method>,
    pub query: BTreeMap<String, String>,
    pub headers: HeaderMap,
    pub timeout: Option<Duration>,
}

/// Outcome of a fetch that did not escalate.
#[derive(Debug)]
pub enum FetchResult {
    Content(FragmentContent),
    /// The failure was absorbed and stands in for the body.
    Missing(FragmentFetchError),
}

impl FetchResult {
    pub fn content(&self) -> Option<&FragmentContent> {
        match self {
            FetchResult::Content(content) => Some(content),
            FetchResult::Missing(_) => None,
        }
    }

    pub fn error(&self) -> Option<&FragmentFetchError> {
        match self {
            FetchResult::Content(_) => None,
            FetchResult::Missing(err) => Some(err),
        }
    }

    pub fn is_missing(&self) -> bool {
        matches!(self, FetchResult::Missing(_))
    }
}

#[derive(Clone)]
pub struct FragmentFetcher {
    http_client: Arc<dyn HttpClient>,
    file_system: Arc<dyn FileSystem>,
}

impl FragmentFetcher {
    pub fn new(http_client: Arc<dyn HttpClient>, file_system: Arc<dyn FileSystem>) -> Self {
        Self {
            http_client,
            file_system,
        }
    }

    /// Fetch one fragment for the current request.
    ///
    /// Only returns `Err` for a required fragment without an `on_fetch_error`
    /// hook; callers treat it as the signal to decline the route.
    pub async fn fetch(
        &self,
        fragment: &Fragment,
        ctx: &RequestContext,
        options: &FetchOptions,
    ) -> Result<FetchResult, FragmentFetchError> {
        let span = tracing::debug_span!(
            parent: ctx.span(),
            "fragment_fetch",
            fragment = fragment.name(),
            origin = %fragment.origin(),
        );

        let result = self
            .fetch_with_policy(fragment, ctx, options)
            .instrument(span)
            .await?;

        if options.never_handle_error {
            return Ok(result);
        }
        Ok(match (result, fragment.content_missing_fn()) {
            (FetchResult::Missing(err), Some(placeholder)) => FetchResult::Content(placeholder(&err)),
            (result, _) => result,
        })
    }

    async fn fetch_with_policy(
        &self,
        fragment: &Fragment,
        ctx: &RequestContext,
        options: &FetchOptions,
    ) -> Result<FetchResult, FragmentFetchError> {
        let cause = match self.load(fragment, ctx, options).await {
            Ok(content) => return Ok(FetchResult::Content(content)),
            Err(cause) => cause,
        };
        let error = FragmentFetchError::new(fragment.name(), fragment.origin(), cause);

        if let Some(hook) = fragment.fetch_error_hook() {
            tracing::debug!(error = %error, "fetch error handed to on_fetch_error");
            hook(&error, ctx);
            return Ok(FetchResult::Missing(error));
        }

        if fragment.is_required() {
            tracing::info!(error = %error, "required fragment failed, declining");
            return Err(error);
        }

        tracing::warn!(error = %error, "optional fragment failed");
        Ok(FetchResult::Missing(error))
    }

    async fn load(
        &self,
        fragment: &Fragment,
        ctx: &RequestContext,
        options: &FetchOptions,
    ) -> Result<FragmentContent, FetchFailure> {
        let content = match fragment.source() {
            FragmentSource::Local(data) => FragmentContent {
                body: FragmentBody::Json(data.resolve(ctx)),
                content_type: Some(JSON_CONTENT_TYPE.to_string()),
            },
            FragmentSource::File(path) => {
                let path = path.resolve(ctx);
                if path.as_os_str().is_empty() {
                    return Err(FileSystemError::InvalidPath(
                        "fragment path resolved to nothing".to_string(),
                    )
                    .into());
                }
                let text = self.file_system.read_to_string(&path).await?;
                FragmentContent {
                    body: FragmentBody::Text(text),
                    content_type: Some(HTML_CONTENT_TYPE.to_string()),
                }
            }
            FragmentSource::Remote(remote) => {
                self.load_remote(fragment, remote, ctx, options).await?
            }
        };

        match fragment.response_parser() {
            Some(parse) => {
                let body = parse(content.body, ctx).map_err(FetchFailure::Parse)?;
                Ok(FragmentContent {
                    body,
                    content_type: content.content_type,
                })
            }
            None => Ok(content),
        }
    }

    async fn load_remote(
        &self,
        fragment: &Fragment,
        remote: &RemoteUrl,
        ctx: &RequestContext,
        options: &FetchOptions,
    ) -> Result<FragmentContent, FetchFailure> {
        let request = build_remote_request(fragment, remote, ctx, options)?;
        let timeout = options.timeout.unwrap_or(REMOTE_TIMEOUT);
        tracing::debug!(method = %request.method(), uri = %request.uri(), "fetching remote fragment");

        let exchange = async {
            let response = self.http_client.send_request(request).await?;
            let status = response.status();
            if !status.is_success() {
                return Err(FetchFailure::Status(status));
            }
            let content_type = response
                .headers()
                .get(CONTENT_TYPE)
                .and_then(|v| v.to_str().ok())
                .map(str::to_owned);
            let bytes = response
                .into_body()
                .collect()
                .await
                .map_err(|e| FetchFailure::Decode(e.to_string()))?
                .to_bytes();
            Ok::<_, FetchFailure>((bytes, content_type))
        };

        let (bytes, content_type) = tokio::time::timeout(timeout, exchange)
            .await
            .map_err(|_| FetchFailure::Timeout(timeout))??;

        let body = match fragment.body_type() {
            BodyType::Text => FragmentBody::Text(
                String::from_utf8(bytes.to_vec()).map_err(|e| FetchFailure::Decode(e.to_string()))?,
            ),
            BodyType::Json => FragmentBody::Json(
                serde_json::from_slice(&bytes).map_err(|e| FetchFailure::Decode(e.to_string()))?,
            ),
        };

        Ok(FragmentContent { body, content_type })
    }
}

/// Build the outbound request for a remote fragment.
///
/// Query parameters and headers are layered lowest to highest: inbound request
/// (only with `pass_query_params`), fragment values, caller options.
pub fn build_remote_request(
    fragment: &Fragment,
    remote: &RemoteUrl,
    ctx: &RequestContext,
    options: &FetchOptions,
) -> Result<Request<Body>, FetchFailure> {
    let raw = remote.url.resolve(ctx);
    let mut url = Url::parse(&raw).map_err(|e| FetchFailure::InvalidUrl {
        url: raw.clone(),
        reason: e.to_string(),
    })?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(FetchFailure::InvalidUrl {
            reason: format!("unsupported scheme '{}'", url.scheme()),
            url: raw,
        });
    }

    let mut query: BTreeMap<String, String> = url.query_pairs().into_owned().collect();
    if fragment.passes_query_params() {
        query.extend(ctx.query().iter().map(|(k, v)| (k.clone(), v.clone())));
    }
    if let Some(params) = fragment.query() {
        query.extend(resolve_params(params, ctx));
    }
    query.extend(options.query.iter().map(|(k, v)| (k.clone(), v.clone())));
    if !query.is_empty() {
        url.query_pairs_mut().clear().extend_pairs(&query);
    }

    let mut headers = HeaderMap::new();
    if fragment.passes_query_params() {
        let listed = connection_tokens(ctx.headers());
        for (name, value) in ctx.headers() {
            if !is_hop_by_hop(name)
                && !listed.contains(name)
                && name != HOST
                && name != http::header::CONTENT_LENGTH
            {
                headers.append(name.clone(), value.clone());
            }
        }
    }
    if let Some(params) = fragment.headers() {
        for (name, value) in resolve_params(params, ctx) {
            let name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|e| FetchFailure::InvalidRequest(format!("header '{name}': {e}")))?;
            let value = HeaderValue::from_str(&value)
                .map_err(|e| FetchFailure::InvalidRequest(format!("header '{name}': {e}")))?;
            headers.insert(name, value);
        }
    }
    if let Some(credential) = &remote.authorization {
        let value = HeaderValue::from_str(&credential.resolve(ctx))
            .map_err(|e| FetchFailure::InvalidRequest(format!("authorization: {e}")))?;
        headers.insert(AUTHORIZATION, value);
    }

    let body = match fragment.body() {
        Some(body) => {
            let value = body.resolve(ctx);
            match fragment.body_type() {
                BodyType::Json => {
                    headers
                        .entry(CONTENT_TYPE)
                        .or_insert(HeaderValue::from_static("application/json"));
                    Body::from(
                        serde_json::to_vec(&value)
                            .map_err(|e| FetchFailure::InvalidRequest(e.to_string()))?,
                    )
                }
                BodyType::Text => match value {
                    serde_json::Value::String(text) => Body::from(text),
                    other => Body::from(other.to_string()),
                },
            }
        }
        None => Body::empty(),
    };
    if fragment.body_type() == BodyType::Json {
        headers
            .entry(ACCEPT)
            .or_insert(HeaderValue::from_static("application/json"));
    }

    headers.extend(options.headers.clone());
    inject_host_header(&url, &mut headers);

    let method = options
        .method
        .clone()
        .unwrap_or_else(|| fragment.method().clone());
    let mut request = Request::builder()
        .method(method)
        .uri(url.as_str())
        .body(body)
        .map_err(|e| FetchFailure::InvalidRequest(e.to_string()))?;
    *request.headers_mut() = headers;
    Ok(request)
}

/// Name the TLS target explicitly when talking `https` without a `Host` header.
pub fn inject_host_header(url: &Url, headers: &mut HeaderMap) {
    if url.scheme() != "https" || headers.contains_key(HOST) {
        return;
    }
    let Some(host) = url.host_str() else {
        return;
    };
    let host = match url.port() {
        Some(port) => format!("{host}:{port}"),
        None => host.to_string(),
    };
    if let Ok(value) = HeaderValue::from_str(&host) {
        headers.insert(HOST, value);
    }
}

//! Fragment descriptors: one content source contributing part of a composed page.
use std::{borrow::Cow, fmt, path::PathBuf, sync::Arc};

use http::Method;
use serde::{Deserialize, Serialize};

use crate::core::{
    context::RequestContext,
    error::{BoxError, FragmentFetchError, FragmentOrigin},
    resolver::{Params, Resolvable},
};

pub const JSON_CONTENT_TYPE: &str = "application/json; charset=utf-8";
pub const HTML_CONTENT_TYPE: &str = "text/html; charset=utf-8";

/// Body of a fetched fragment.
#[derive(Debug, Clone, PartialEq)]
pub enum FragmentBody {
    Text(String),
    Json(serde_json::Value),
}

impl FragmentBody {
    /// Text form of the body; JSON is serialised.
    pub fn to_text(&self) -> Cow<'_, str> {
        match self {
            FragmentBody::Text(text) => Cow::Borrowed(text),
            FragmentBody::Json(serde_json::Value::String(s)) => Cow::Borrowed(s),
            FragmentBody::Json(value) => Cow::Owned(value.to_string()),
        }
    }
}

/// A successfully fetched fragment.
#[derive(Debug, Clone, PartialEq)]
pub struct FragmentContent {
    pub body: FragmentBody,
    pub content_type: Option<String>,
}

impl FragmentContent {
    pub fn html(body: impl Into<String>) -> Self {
        Self {
            body: FragmentBody::Text(body.into()),
            content_type: Some(HTML_CONTENT_TYPE.to_string()),
        }
    }
}

/// How remote response (and request) bodies are treated.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BodyType {
    #[default]
    Text,
    Json,
}

/// URL definition of a remote fragment.
#[derive(Debug, Clone)]
pub struct RemoteUrl {
    pub url: Resolvable<String>,
    pub authorization: Option<Resolvable<String>>,
}

impl RemoteUrl {
    pub fn new(url: impl Into<Resolvable<String>>) -> Self {
        Self {
            url: url.into(),
            authorization: None,
        }
    }

    pub fn with_authorization(mut self, credential: impl Into<Resolvable<String>>) -> Self {
        self.authorization = Some(credential.into());
        self
    }
}

impl From<&str> for RemoteUrl {
    fn from(url: &str) -> Self {
        Self::new(url)
    }
}

impl From<String> for RemoteUrl {
    fn from(url: String) -> Self {
        Self::new(url)
    }
}

#[derive(Debug, Clone)]
pub enum FragmentSource {
    /// Embedded data, literal or computed from the context.
    Local(Resolvable<serde_json::Value>),
    /// A file on the local filesystem.
    File(Resolvable<PathBuf>),
    /// Content fetched over HTTP.
    Remote(RemoteUrl),
}

impl FragmentSource {
    pub fn origin(&self) -> FragmentOrigin {
        match self {
            FragmentSource::Local(_) => FragmentOrigin::Local,
            FragmentSource::File(_) => FragmentOrigin::File,
            FragmentSource::Remote(_) => FragmentOrigin::Remote,
        }
    }
}

pub type ParseBodyFn =
    Arc<dyn Fn(FragmentBody, &RequestContext) -> Result<FragmentBody, BoxError> + Send + Sync>;
pub type FetchErrorHook = Arc<dyn Fn(&FragmentFetchError, &RequestContext) + Send + Sync>;
pub type ContentMissingFn = Arc<dyn Fn(&FragmentFetchError) -> FragmentContent + Send + Sync>;

/// Immutable description of one content source. Fetched fresh on every request.
#[derive(Clone)]
pub struct Fragment {
    name: String,
    source: FragmentSource,
    required: bool,
    method: Method,
    body_type: BodyType,
    query: Option<Params>,
    headers: Option<Params>,
    body: Option<Resolvable<serde_json::Value>>,
    pass_query_params: bool,
    parse_response_body: Option<ParseBodyFn>,
    on_fetch_error: Option<FetchErrorHook>,
    content_missing: Option<ContentMissingFn>,
}

impl Fragment {
    pub fn new(name: impl Into<String>, source: FragmentSource) -> Self {
        Self {
            name: name.into(),
            source,
            required: false,
            method: Method::GET,
            body_type: BodyType::Text,
            query: None,
            headers: None,
            body: None,
            pass_query_params: false,
            parse_response_body: None,
            on_fetch_error: None,
            content_missing: None,
        }
    }

    pub fn local(name: impl Into<String>, data: impl Into<Resolvable<serde_json::Value>>) -> Self {
        Self::new(name, FragmentSource::Local(data.into()))
    }

    pub fn file(name: impl Into<String>, path: impl Into<Resolvable<PathBuf>>) -> Self {
        Self::new(name, FragmentSource::File(path.into()))
    }

    pub fn remote(name: impl Into<String>, url: impl Into<RemoteUrl>) -> Self {
        Self::new(name, FragmentSource::Remote(url.into()))
    }

    /// A remote fragment whose bodies are JSON.
    pub fn json(name: impl Into<String>, url: impl Into<RemoteUrl>) -> Self {
        Self::remote(name, url).with_body_type(BodyType::Json)
    }

    pub fn required(mut self, required: bool) -> Self {
        self.required = required;
        self
    }

    pub fn with_method(mut self, method: Method) -> Self {
        self.method = method;
        self
    }

    pub fn with_body_type(mut self, body_type: BodyType) -> Self {
        self.body_type = body_type;
        self
    }

    pub fn with_query(mut self, query: Params) -> Self {
        self.query = Some(query);
        self
    }

    pub fn with_headers(mut self, headers: Params) -> Self {
        self.headers = Some(headers);
        self
    }

    pub fn with_body(mut self, body: impl Into<Resolvable<serde_json::Value>>) -> Self {
        self.body = Some(body.into());
        self
    }

    /// Merge the inbound request's query and headers underneath the fragment's own.
    pub fn pass_query_params(mut self, pass: bool) -> Self {
        self.pass_query_params = pass;
        self
    }

    pub fn parse_response_body<F>(mut self, parser: F) -> Self
    where
        F: Fn(FragmentBody, &RequestContext) -> Result<FragmentBody, BoxError>
            + Send
            + Sync
            + 'static,
    {
        self.parse_response_body = Some(Arc::new(parser));
        self
    }

    pub fn on_fetch_error<F>(mut self, hook: F) -> Self
    where
        F: Fn(&FragmentFetchError, &RequestContext) + Send + Sync + 'static,
    {
        self.on_fetch_error = Some(Arc::new(hook));
        self
    }

    pub fn content_missing<F>(mut self, placeholder: F) -> Self
    where
        F: Fn(&FragmentFetchError) -> FragmentContent + Send + Sync + 'static,
    {
        self.content_missing = Some(Arc::new(placeholder));
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn source(&self) -> &FragmentSource {
        &self.source
    }

    pub fn origin(&self) -> FragmentOrigin {
        self.source.origin()
    }

    pub fn is_required(&self) -> bool {
        self.required
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn body_type(&self) -> BodyType {
        self.body_type
    }

    pub fn query(&self) -> Option<&Params> {
        self.query.as_ref()
    }

    pub fn headers(&self) -> Option<&Params> {
        self.headers.as_ref()
    }

    pub fn body(&self) -> Option<&Resolvable<serde_json::Value>> {
        self.body.as_ref()
    }

    pub fn passes_query_params(&self) -> bool {
        self.pass_query_params
    }

    pub fn response_parser(&self) -> Option<&ParseBodyFn> {
        self.parse_response_body.as_ref()
    }

    pub fn fetch_error_hook(&self) -> Option<&FetchErrorHook> {
        self.on_fetch_error.as_ref()
    }

    pub fn content_missing_fn(&self) -> Option<&ContentMissingFn> {
        self.content_missing.as_ref()
    }
}

impl fmt::Debug for Fragment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Fragment")
            .field("name", &self.name)
            .field("source", &self.source)
            .field("required", &self.required)
            .field("method", &self.method)
            .field("body_type", &self.body_type)
            .field("pass_query_params", &self.pass_query_params)
            .finish_non_exhaustive()
    }
}

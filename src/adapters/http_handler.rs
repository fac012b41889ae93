use std::{path::Path, sync::Arc};

use axum::{
    Router,
    body::Body,
    extract::Request,
    http::{HeaderValue, StatusCode, Uri, header},
    response::Response,
    routing::any,
};
use eyre::{Result, WrapErr};
use tower_http::trace::TraceLayer;
use tracing::Instrument;

use crate::{
    adapters::{FileSystemAdapter, HttpClientAdapter, TemplateRenderer},
    config::{ServerConfig, compile_routes},
    core::{
        context::{RequestId, RequestSpan},
        dispatcher::{Dispatch, RouteDispatcher},
        fetcher::FragmentFetcher,
        gateway::ProxyFallbackGateway,
    },
    ports::{file_system::FileSystem, http_client::HttpClient},
    tracing_setup::create_request_span,
};

const REQUEST_ID_HEADER: &str = "x-request-id";

const BUILTIN_ERROR_PAGE: &str = "<!DOCTYPE html>\n<html>\n<head><title>Something went wrong</title></head>\n<body>\n<h1>Something went wrong</h1>\n<p>{{message}}</p>\n</body>\n</html>\n";

/// HTML page answered for unhandled errors.
///
/// `{{message}}` in the page is replaced by the escaped error message when
/// details are shown, and by nothing otherwise.
#[derive(Debug, Clone)]
pub struct ErrorPage {
    template: String,
    show_details: bool,
}

impl ErrorPage {
    pub fn builtin(show_details: bool) -> Self {
        Self {
            template: BUILTIN_ERROR_PAGE.to_string(),
            show_details,
        }
    }

    /// Read a custom error page.
    pub async fn load(fs: &dyn FileSystem, path: &Path, show_details: bool) -> Result<Self> {
        let template = fs
            .read_to_string(path)
            .await
            .wrap_err_with(|| format!("Failed to read error page {}", path.display()))?;
        Ok(Self {
            template,
            show_details,
        })
    }

    pub fn render(&self, message: &str) -> String {
        let message = if self.show_details {
            escape_html(message)
        } else {
            String::new()
        };
        self.template.replace("{{message}}", &message)
    }
}

fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

/// Entry point for every inbound request: compose, redirect or pass through.
pub struct HttpHandler {
    dispatcher: RouteDispatcher,
    gateway: ProxyFallbackGateway,
    error_page: ErrorPage,
}

impl HttpHandler {
    pub fn new(
        dispatcher: RouteDispatcher,
        gateway: ProxyFallbackGateway,
        error_page: ErrorPage,
    ) -> Self {
        Self {
            dispatcher,
            gateway,
            error_page,
        }
    }

    /// Assemble the full stack described by a configuration: shared HTTP client,
    /// compiled routes, template renderer, fallback gateway and error page.
    pub async fn from_config(config: &ServerConfig) -> Result<Self> {
        let http_client: Arc<dyn HttpClient> =
            Arc::new(HttpClientAdapter::new().wrap_err("Failed to create HTTP client")?);
        let file_system: Arc<dyn FileSystem> = Arc::new(match &config.fragment_root {
            Some(root) => FileSystemAdapter::with_root(root),
            None => FileSystemAdapter::new(),
        });

        let registry = compile_routes(config).wrap_err("Failed to compile routes")?;
        for route in registry.iter() {
            tracing::info!(
                "Configured route: {} {} ({} fragments)",
                route.method(),
                route.path(),
                route.fragments().len()
            );
        }

        let fetcher = FragmentFetcher::new(http_client.clone(), file_system);
        let dispatcher =
            RouteDispatcher::new(Arc::new(registry), Arc::new(TemplateRenderer::new()), fetcher)
                .with_default_headers(config.common_header_map()?);
        let gateway = ProxyFallbackGateway::from_config(config, http_client)
            .wrap_err("Failed to configure the fallback proxy")?;

        let show_details = config.is_development();
        let error_page = match &config.error_page {
            Some(path) => ErrorPage::load(&FileSystemAdapter::new(), path, show_details).await?,
            None => ErrorPage::builtin(show_details),
        };

        Ok(Self::new(dispatcher, gateway, error_page))
    }

    /// Handle a request. Never fails: unhandled errors become a 500 error page.
    pub async fn handle_request(&self, mut req: Request) -> Response {
        let request_id = req
            .headers()
            .get(REQUEST_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
        let span = create_request_span(req.method().as_str(), req.uri().path(), &request_id);
        req.extensions_mut().insert(RequestId(request_id));
        req.extensions_mut().insert(RequestSpan(span.clone()));

        let uri = req.uri().clone();
        let response = match self.process(req).instrument(span.clone()).await {
            Ok(response) => response,
            Err(err) => span.in_scope(|| self.error_response(&uri, &err)),
        };
        span.record("http.status_code", response.status().as_u16());
        response
    }

    async fn process(&self, req: Request) -> Result<Response> {
        let (parts, body) = req.into_parts();

        match self.dispatcher.dispatch(&parts).await? {
            Dispatch::Respond(response) => Ok(response),
            Dispatch::Decline => {
                if !self.gateway.handles(parts.uri.path()) {
                    tracing::debug!(path = parts.uri.path(), "outside proxy base path");
                    return Ok(status_response(StatusCode::NOT_FOUND));
                }
                let response = self
                    .gateway
                    .forward(Request::from_parts(parts, body))
                    .await
                    .wrap_err("Proxy request failed")?;
                Ok(response)
            }
        }
    }

    fn error_response(&self, uri: &Uri, err: &eyre::Report) -> Response {
        let chain: Vec<String> = err.chain().skip(1).map(ToString::to_string).collect();
        tracing::error!(url = %uri, error = %err, cause = ?chain, "Request handling error");

        let mut response = Response::new(Body::from(self.error_page.render(&format!("{err:#}"))));
        *response.status_mut() = StatusCode::INTERNAL_SERVER_ERROR;
        response.headers_mut().insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("text/html; charset=utf-8"),
        );
        response
    }
}

fn status_response(status: StatusCode) -> Response {
    let mut response = Response::new(Body::empty());
    *response.status_mut() = status;
    response
}

/// Router sending every path and method through the handler.
pub fn router(handler: Arc<HttpHandler>) -> Router {
    let make_request_route = |handler: Arc<HttpHandler>| {
        any(move |req: Request| {
            let handler = handler.clone();
            async move { handler.handle_request(req).await }
        })
    };

    Router::new()
        .route("/", make_request_route(handler.clone()))
        .route("/{*path}", make_request_route(handler))
        .layer(TraceLayer::new_for_http())
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use async_trait::async_trait;
    use http_body_util::BodyExt;

    use super::*;
    use crate::{
        core::{context::RequestContext, fragment::Fragment, registry::RouteRegistry, route::Route},
        ports::{
            http_client::HttpClientResult,
            renderer::{Composed, RenderError, Renderer},
        },
    };

    #[derive(Default)]
    struct EchoOrigin {
        seen: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl HttpClient for EchoOrigin {
        async fn send_request(&self, req: Request) -> HttpClientResult<Response> {
            self.seen.lock().unwrap().push(req.uri().to_string());
            Ok(Response::new(Body::from(format!(
                "origin {}",
                req.uri().path()
            ))))
        }
    }

    struct BrokenRenderer;

    #[async_trait]
    impl Renderer for BrokenRenderer {
        async fn render(
            &self,
            _route: &Route,
            _fetcher: &FragmentFetcher,
            _ctx: &RequestContext,
        ) -> Result<Composed, RenderError> {
            Err(RenderError::Failed(eyre::eyre!("template <b>exploded</b>")))
        }
    }

    fn handler_with(renderer: Arc<dyn Renderer>, show_details: bool) -> (HttpHandler, Arc<EchoOrigin>) {
        let origin = Arc::new(EchoOrigin::default());
        let registry = RouteRegistry::builder()
            .route(
                Route::builder("/hello")
                    .fragment(Fragment::local("greeting", serde_json::json!("<h1>hi</h1>")))
                    .build()
                    .unwrap(),
            )
            .build()
            .unwrap();
        let fetcher = FragmentFetcher::new(origin.clone(), Arc::new(FileSystemAdapter::new()));
        let dispatcher = RouteDispatcher::new(Arc::new(registry), renderer, fetcher);
        let gateway = ProxyFallbackGateway::new(origin.clone(), "http://origin.test")
            .unwrap()
            .with_base_path("/site");
        (
            HttpHandler::new(dispatcher, gateway, ErrorPage::builtin(show_details)),
            origin,
        )
    }

    fn get(uri: &str) -> Request {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    async fn body_text(response: Response) -> String {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[tokio::test]
    async fn test_composes_matched_route() {
        let (handler, origin) = handler_with(Arc::new(TemplateRenderer::new()), true);
        let response = handler.handle_request(get("/hello")).await;

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_text(response).await, "<h1>hi</h1>");
        assert!(origin.seen.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_unmatched_path_is_proxied() {
        let (handler, origin) = handler_with(Arc::new(TemplateRenderer::new()), true);
        let response = handler.handle_request(get("/site/about?x=1")).await;

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers().get(header::CACHE_CONTROL).unwrap(),
            "must-revalidate, max-age=600"
        );
        assert_eq!(body_text(response).await, "origin /site/about");
        assert_eq!(
            origin.seen.lock().unwrap().as_slice(),
            ["http://origin.test/site/about?x=1"]
        );
    }

    #[tokio::test]
    async fn test_path_outside_base_path_is_not_found() {
        let (handler, origin) = handler_with(Arc::new(TemplateRenderer::new()), true);
        let response = handler.handle_request(get("/elsewhere")).await;

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert!(origin.seen.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_unhandled_error_renders_error_page() {
        let (handler, _) = handler_with(Arc::new(BrokenRenderer), true);
        let response = handler.handle_request(get("/hello")).await;

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = body_text(response).await;
        assert!(body.contains("Something went wrong"));
        assert!(body.contains("template &lt;b&gt;exploded&lt;/b&gt;"));
    }

    #[tokio::test]
    async fn test_error_details_hidden_outside_development() {
        let (handler, _) = handler_with(Arc::new(BrokenRenderer), false);
        let response = handler.handle_request(get("/hello")).await;

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(!body_text(response).await.contains("exploded"));
    }

    #[test]
    fn test_error_details_are_escaped() {
        let message = "<script>alert('x')</script>";

        let shown = ErrorPage::builtin(true).render(message);
        assert!(shown.contains("&lt;script&gt;alert(&#39;x&#39;)&lt;/script&gt;"));
        assert!(!shown.contains("<script>"));

        let hidden = ErrorPage::builtin(false).render(message);
        assert!(!hidden.contains("script"));
        assert!(!hidden.contains("alert"));
    }

    #[tokio::test]
    async fn test_custom_error_page() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("error.html");
        std::fs::write(&path, "<main>oops: {{message}}</main>").unwrap();

        let page = ErrorPage::load(&FileSystemAdapter::new(), &path, true)
            .await
            .unwrap();
        assert_eq!(page.render("a & b"), "<main>oops: a &amp; b</main>");

        let missing = ErrorPage::load(&FileSystemAdapter::new(), &dir.path().join("nope"), true).await;
        assert!(missing.is_err());
    }

    #[tokio::test]
    async fn test_router_serves_root_and_nested_paths() {
        use tower::ServiceExt;

        let (handler, _) = handler_with(Arc::new(TemplateRenderer::new()), true);
        let app = router(Arc::new(handler));

        let response = app.clone().oneshot(get("/hello")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let response = app.oneshot(get("/")).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}

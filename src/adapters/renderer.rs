use std::borrow::Cow;

use async_trait::async_trait;
use futures_util::future::join_all;
use once_cell::sync::Lazy;
use regex::{Captures, Regex};

use crate::{
    core::{
        context::RequestContext,
        fetcher::{FetchOptions, FetchResult, FragmentFetcher},
        route::Route,
    },
    ports::renderer::{Composed, RenderError, Renderer},
};

static FRAGMENT_INJECT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r#"<fragment-inject\s+fragment-name="([^"]+)"\s*(?:/>|>\s*</fragment-inject>)"#,
    )
    .unwrap_or_else(|e| unreachable!("fragment-inject pattern is valid: {e}"))
});

/// Default renderer: splices fragment bodies into a template fragment.
///
/// All fragments of a route are fetched concurrently. Without a template the
/// bodies are concatenated in declaration order; with one, every
/// `<fragment-inject fragment-name="NAME"></fragment-inject>` tag is replaced by
/// the body of fragment `NAME`.
#[derive(Debug, Default, Clone)]
pub struct TemplateRenderer {
    options: FetchOptions,
}

impl TemplateRenderer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_fetch_options(mut self, options: FetchOptions) -> Self {
        self.options = options;
        self
    }
}

fn body_of<'a>(name: &str, result: &'a FetchResult) -> Cow<'a, str> {
    match result {
        FetchResult::Content(content) => content.body.to_text(),
        FetchResult::Missing(_) => Cow::Owned(format!("<!-- fragment '{name}' unavailable -->")),
    }
}

#[async_trait]
impl Renderer for TemplateRenderer {
    async fn render(
        &self,
        route: &Route,
        fetcher: &FragmentFetcher,
        ctx: &RequestContext,
    ) -> Result<Composed, RenderError> {
        let fetches = route
            .fragments()
            .iter()
            .map(|fragment| fetcher.fetch(fragment, ctx, &self.options));
        let mut fetched = Vec::with_capacity(route.fragments().len());
        for (fragment, result) in route.fragments().iter().zip(join_all(fetches).await) {
            fetched.push((fragment.name(), result?));
        }

        let Some(template_name) = route.template() else {
            let body = fetched
                .iter()
                .map(|(name, result)| body_of(name, result))
                .collect::<String>();
            return Ok(Composed::html(body));
        };

        let Some((_, template)) = fetched.iter().find(|(name, _)| *name == template_name) else {
            return Err(RenderError::Failed(eyre::eyre!(
                "template fragment '{template_name}' is not defined on {}",
                route.path()
            )));
        };
        let template_text = body_of(template_name, template);
        let content_type = template.content().and_then(|c| c.content_type.clone());

        let body = FRAGMENT_INJECT.replace_all(&template_text, |caps: &Captures<'_>| {
            let name = &caps[1];
            match fetched.iter().find(|(n, _)| *n == name) {
                Some((_, result)) => body_of(name, result).into_owned(),
                None => format!("<!-- fragment '{name}' missing -->"),
            }
        });

        Ok(Composed {
            body: body.into_owned(),
            content_type: content_type.filter(|ct| ct.starts_with("text/html")),
        })
    }
}

#[cfg(test)]
mod tests {
    use std::{path::Path, sync::Arc};

    use axum::body::Body;
    use http::{Request, Response, StatusCode};
    use serde_json::json;

    use super::*;
    use crate::{
        core::fragment::Fragment,
        ports::{
            file_system::{FileSystem, FileSystemError, FileSystemResult},
            http_client::{HttpClient, HttpClientResult},
        },
    };

    struct StaticOrigin;

    #[async_trait]
    impl HttpClient for StaticOrigin {
        async fn send_request(&self, req: Request<Body>) -> HttpClientResult<Response<Body>> {
            let (status, body) = match req.uri().path() {
                "/nav" => (StatusCode::OK, "<nav>menu</nav>"),
                _ => (StatusCode::INTERNAL_SERVER_ERROR, "boom"),
            };
            Ok(Response::builder()
                .status(status)
                .header("content-type", "text/html")
                .body(Body::from(body))
                .unwrap())
        }
    }

    #[async_trait]
    impl FileSystem for StaticOrigin {
        async fn read_to_string(&self, path: &Path) -> FileSystemResult<String> {
            match path.to_str() {
                Some("layout.html") => Ok(concat!(
                    "<body>",
                    r#"<fragment-inject fragment-name="nav"></fragment-inject>"#,
                    r#"<main><fragment-inject fragment-name="data" /></main>"#,
                    r#"<fragment-inject fragment-name="ads"></fragment-inject>"#,
                    r#"<fragment-inject fragment-name="unknown"/>"#,
                    "</body>"
                )
                .to_string()),
                _ => Err(FileSystemError::InvalidPath(path.display().to_string())),
            }
        }
    }

    fn fetcher() -> FragmentFetcher {
        FragmentFetcher::new(Arc::new(StaticOrigin), Arc::new(StaticOrigin))
    }

    fn ctx() -> RequestContext {
        let (parts, _) = Request::builder().uri("/").body(()).unwrap().into_parts();
        RequestContext::new(&parts, Default::default())
    }

    #[tokio::test]
    async fn test_template_injection() {
        let route = Route::builder("/")
            .fragment(Fragment::file("layout", std::path::PathBuf::from("layout.html")))
            .fragment(Fragment::remote("nav", "http://origin.local/nav"))
            .fragment(Fragment::local("data", json!({"n": 1})))
            .fragment(Fragment::remote("ads", "http://origin.local/ads"))
            .template("layout")
            .build()
            .unwrap();

        let composed = TemplateRenderer::new()
            .render(&route, &fetcher(), &ctx())
            .await
            .unwrap();
        assert_eq!(
            composed.body,
            concat!(
                "<body><nav>menu</nav>",
                r#"<main>{"n":1}</main>"#,
                "<!-- fragment 'ads' unavailable -->",
                "<!-- fragment 'unknown' missing -->",
                "</body>"
            )
        );
        assert_eq!(composed.content_type.as_deref(), Some("text/html; charset=utf-8"));
    }

    #[tokio::test]
    async fn test_concatenation_without_template() {
        let route = Route::builder("/")
            .fragment(Fragment::remote("nav", "http://origin.local/nav"))
            .fragment(Fragment::local("text", json!("<p>hi</p>")))
            .build()
            .unwrap();
        let composed = TemplateRenderer::new()
            .render(&route, &fetcher(), &ctx())
            .await
            .unwrap();
        assert_eq!(composed.body, "<nav>menu</nav><p>hi</p>");
        assert_eq!(composed.content_type, None);
    }

    #[tokio::test]
    async fn test_required_failure_is_decline_signal() {
        let route = Route::builder("/")
            .fragment(Fragment::remote("nav", "http://origin.local/nav"))
            .fragment(Fragment::remote("main", "http://origin.local/broken").required(true))
            .build()
            .unwrap();
        let err = TemplateRenderer::new()
            .render(&route, &fetcher(), &ctx())
            .await
            .unwrap_err();
        match err {
            RenderError::Fetch(e) => assert_eq!(e.fragment(), "main"),
            other => panic!("unexpected error: {other}"),
        }
    }
}

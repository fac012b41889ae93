// Fragment fetching against a live origin through the pooled HTTP client
mod common;

use std::{
    collections::BTreeMap,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};

use composer_proxy::{
    FileSystemAdapter, HttpClientAdapter,
    core::{
        RequestContext,
        error::FetchFailure,
        fetcher::{FetchOptions, FragmentFetcher},
        fragment::{Fragment, FragmentBody, FragmentContent, RemoteUrl},
        resolver::{Resolvable, static_params},
    },
};
use http::StatusCode;
use serde_json::json;

fn fetcher() -> FragmentFetcher {
    FragmentFetcher::new(
        Arc::new(HttpClientAdapter::new().unwrap()),
        Arc::new(FileSystemAdapter::new()),
    )
}

fn ctx(uri: &str, params: &[(&str, &str)]) -> RequestContext {
    let (parts, _) = http::Request::builder()
        .uri(uri)
        .header("accept-language", "de")
        .body(())
        .unwrap()
        .into_parts();
    let params: BTreeMap<String, String> = params
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    RequestContext::new(&parts, params)
}

#[tokio::test(flavor = "multi_thread")]
async fn test_json_fragment_with_resolved_url() {
    let origin = common::spawn_origin().await;
    let base = origin.url();
    let fragment = Fragment::json(
        "item",
        RemoteUrl::new(Resolvable::from_fn(move |ctx| {
            format!("{base}/api/items/{}", ctx.param("id").unwrap_or("0"))
        })),
    );

    let result = fetcher()
        .fetch(&fragment, &ctx("/item/42", &[("id", "42")]), &FetchOptions::default())
        .await
        .unwrap();

    let content = result.content().unwrap();
    assert_eq!(
        content.body,
        FragmentBody::Json(json!({"id": "42", "name": "Item 42"}))
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn test_query_and_header_layering() {
    let origin = common::spawn_origin().await;
    let fragment = Fragment::json("echo", format!("{}/api/echo?page=1", origin.url()))
        .pass_query_params(true)
        .with_query(static_params([("limit", "10"), ("sort", "name")]))
        .with_headers(static_params([("x-fragment", "echo")]));

    let mut options = FetchOptions::default();
    options.query.insert("sort".to_string(), "price".to_string());

    let result = fetcher()
        .fetch(&fragment, &ctx("/list?limit=5&lang=en", &[]), &options)
        .await
        .unwrap();

    let FragmentBody::Json(echo) = &result.content().unwrap().body else {
        panic!("expected a JSON body");
    };
    assert_eq!(
        echo["query"],
        json!({"page": "1", "limit": "10", "lang": "en", "sort": "price"})
    );
    assert_eq!(echo["headers"]["x-fragment"], "echo");
    assert_eq!(echo["headers"]["accept-language"], "de");
    assert_eq!(echo["headers"]["host"], origin.addr.to_string());
}

#[tokio::test(flavor = "multi_thread")]
async fn test_optional_failure_returns_error_value() {
    let origin = common::spawn_origin().await;
    let fragment = Fragment::remote("broken", format!("{}/api/broken", origin.url()));

    let result = fetcher()
        .fetch(&fragment, &ctx("/", &[]), &FetchOptions::default())
        .await
        .unwrap();

    let err = result.error().unwrap();
    assert_eq!(err.fragment(), "broken");
    assert!(matches!(
        err.cause(),
        FetchFailure::Status(StatusCode::INTERNAL_SERVER_ERROR)
    ));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_required_failure_escalates_unless_hooked() {
    let origin = common::spawn_origin().await;
    let url = format!("{}/api/broken", origin.url());

    let required = Fragment::remote("broken", url.as_str()).required(true);
    let err = fetcher()
        .fetch(&required, &ctx("/", &[]), &FetchOptions::default())
        .await
        .unwrap_err();
    assert_eq!(err.fragment(), "broken");

    let hooked = Arc::new(AtomicBool::new(false));
    let seen = hooked.clone();
    let handled = Fragment::remote("broken", url.as_str())
        .required(true)
        .on_fetch_error(move |_, _| seen.store(true, Ordering::SeqCst))
        .content_missing(|_| FragmentContent::html("<p>later</p>"));
    let result = fetcher()
        .fetch(&handled, &ctx("/", &[]), &FetchOptions::default())
        .await
        .unwrap();

    assert!(hooked.load(Ordering::SeqCst));
    assert_eq!(
        result.content().unwrap().body,
        FragmentBody::Text("<p>later</p>".to_string())
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn test_slow_origin_times_out() {
    let origin = common::spawn_origin().await;
    let fragment = Fragment::remote("slow", format!("{}/api/slow", origin.url()));
    let options = FetchOptions {
        timeout: Some(Duration::from_millis(100)),
        ..FetchOptions::default()
    };

    let result = fetcher()
        .fetch(&fragment, &ctx("/", &[]), &options)
        .await
        .unwrap();

    assert!(result.error().unwrap().is_timeout());
}

#[tokio::test(flavor = "multi_thread")]
async fn test_refused_connection_is_a_fetch_error() {
    let addr = common::refused_addr();
    let fragment = Fragment::remote("down", format!("http://{addr}/x"));

    let result = fetcher()
        .fetch(&fragment, &ctx("/", &[]), &FetchOptions::default())
        .await
        .unwrap();

    assert!(result.is_missing());
    assert!(matches!(
        result.error().unwrap().cause(),
        FetchFailure::Http(_)
    ));
}

#[tokio::test]
async fn test_file_fragment_is_html() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("banner.html");
    std::fs::write(&path, "<aside>sale</aside>").unwrap();

    let fragment = Fragment::file("banner", path);
    let result = fetcher()
        .fetch(&fragment, &ctx("/", &[]), &FetchOptions::default())
        .await
        .unwrap();

    let content = result.content().unwrap();
    assert_eq!(content.body.to_text(), "<aside>sale</aside>");
    assert!(
        content
            .content_type
            .as_deref()
            .unwrap()
            .starts_with("text/html")
    );
}

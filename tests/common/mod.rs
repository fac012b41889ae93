#![allow(dead_code)]

use std::{
    collections::BTreeMap,
    net::SocketAddr,
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode, header},
    response::IntoResponse,
    routing::get,
};
use composer_proxy::{HttpHandler, adapters::router, config::ServerConfig};

/// Origin server standing in for the default backend.
pub struct Origin {
    pub addr: SocketAddr,
    hits: Arc<AtomicUsize>,
}

impl Origin {
    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn hits(&self) -> usize {
        self.hits.load(Ordering::SeqCst)
    }
}

#[derive(Clone)]
struct OriginState {
    addr: SocketAddr,
    hits: Arc<AtomicUsize>,
}

async fn item(Path(id): Path<String>) -> impl IntoResponse {
    Json(serde_json::json!({ "id": id, "name": format!("Item {id}") }))
}

async fn echo(
    Query(query): Query<BTreeMap<String, String>>,
    headers: HeaderMap,
) -> impl IntoResponse {
    let headers: BTreeMap<String, String> = headers
        .iter()
        .filter_map(|(k, v)| Some((k.to_string(), v.to_str().ok()?.to_string())))
        .collect();
    Json(serde_json::json!({ "query": query, "headers": headers }))
}

async fn moved(State(state): State<OriginState>) -> impl IntoResponse {
    (
        StatusCode::FOUND,
        [(header::LOCATION, format!("http://{}/new-home", state.addr))],
    )
}

/// Start an origin on an ephemeral port.
pub async fn spawn_origin() -> Origin {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let hits = Arc::new(AtomicUsize::new(0));
    let state = OriginState {
        addr,
        hits: hits.clone(),
    };

    let counter = hits.clone();
    let app = Router::new()
        .route("/api/items/{id}", get(item))
        .route("/api/echo", get(echo))
        .route(
            "/api/broken",
            get(|| async { (StatusCode::INTERNAL_SERVER_ERROR, "boom") }),
        )
        .route(
            "/api/slow",
            get(|| async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                "late"
            }),
        )
        .route("/about", get(|| async { "origin about" }))
        .route(
            "/cached",
            get(|| async { ([(header::CACHE_CONTROL, "public, max-age=30")], "cached") }),
        )
        .route("/item/{id}", get(|| async { "origin item page" }))
        .route("/moved", get(moved))
        .fallback(|| async { (StatusCode::NOT_FOUND, "origin not found") })
        .layer(axum::middleware::from_fn(
            move |req: axum::extract::Request, next: axum::middleware::Next| {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    next.run(req).await
                }
            },
        ))
        .with_state(state);

    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    Origin { addr, hits }
}

/// An address nothing listens on.
pub fn refused_addr() -> SocketAddr {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap()
}

/// Start the composer for `config` on an ephemeral port.
pub async fn spawn_edge(config: ServerConfig) -> String {
    let handler = HttpHandler::from_config(&config).await.unwrap();
    let app = router(Arc::new(handler));

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}")
}

/// Test client that neither follows redirects nor uses a system proxy.
pub fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .redirect(reqwest::redirect::Policy::none())
        .no_proxy()
        .build()
        .unwrap()
}

//! HTTPS receiver endpoint
//!
//! Routes the LanSend protocol onto [`ReceiverState`] and serves it over TLS.

use crate::state::ReceiverState;
use anyhow::{Context, Result};
use axum::{
    Router,
    extract::{DefaultBodyLimit, Request},
    http::{HeaderName, HeaderValue, Method, header},
    middleware::{self, Next},
    response::Response,
    routing::{get, post},
};
use axum_server::Handle;
use axum_server::tls_rustls::RustlsConfig;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::limit::RequestBodyLimitLayer;

use super::handlers;

/// Middleware adding the headers every LanSend response carries
async fn add_protocol_headers(req: Request, next: Next) -> Response {
    let mut response = next.run(req).await;
    let headers = response.headers_mut();

    // One request per connection
    headers.insert(header::CONNECTION, HeaderValue::from_static("close"));
    let is_json = headers
        .get(header::CONTENT_TYPE)
        .is_some_and(|v| v.as_bytes().starts_with(b"application/json"));
    if is_json {
        headers.insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("application/json; charset=utf-8"),
        );
    }

    response
}

fn cors_layer() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::POST, Method::GET, Method::OPTIONS])
        .allow_headers([
            header::CONTENT_TYPE,
            HeaderName::from_static("x-session-id"),
            HeaderName::from_static("x-file-id"),
            HeaderName::from_static("x-chunk-offset"),
        ])
}

/// Build the receiver router. Request bodies above `max_body_bytes` get 413.
pub fn create_router(state: Arc<ReceiverState>, max_body_bytes: usize) -> Router {
    Router::new()
        .route("/connect", post(handlers::connect))
        .route("/request-send", post(handlers::request_send))
        .route("/api/v1/file_data/{file_id}", post(handlers::file_data))
        .route("/file_data/{file_id}", post(handlers::file_data))
        .route("/cancel-send", post(handlers::cancel_send))
        .route("/ping", get(handlers::ping))
        .fallback(handlers::not_found)
        .layer(DefaultBodyLimit::disable())
        .layer(RequestBodyLimitLayer::new(max_body_bytes))
        .layer(cors_layer())
        .layer(middleware::from_fn(add_protocol_headers))
        .with_state(state)
}

/// Bind `addr` now so a busy port fails startup, then serve in the background.
///
/// Returns the bound address and the server task. Stop it through `handle`.
pub fn spawn_https_server(
    addr: SocketAddr,
    router: Router,
    tls_config: RustlsConfig,
    handle: Handle,
) -> Result<(SocketAddr, tokio::task::JoinHandle<std::io::Result<()>>)> {
    let listener = std::net::TcpListener::bind(addr)
        .with_context(|| format!("Failed to bind HTTPS server to {}", addr))?;
    listener
        .set_nonblocking(true)
        .context("Failed to set listener to non-blocking mode")?;
    let local_addr = listener.local_addr()?;

    tracing::info!("HTTPS server listening on https://{}", local_addr);

    let task = tokio::spawn(async move {
        axum_server::from_tcp_rustls(listener, tls_config)
            .handle(handle)
            .serve(router.into_make_service_with_connect_info::<SocketAddr>())
            .await
    });

    Ok((local_addr, task))
}

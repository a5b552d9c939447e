//! 请求分发：上传页面、静态文件与 PUT 上传。

use axum::body::Body as AxumBody;
use axum::extract::{DefaultBodyLimit, Extension, connect_info::ConnectInfo};
use axum::http::Request;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Router, middleware};
use std::net::SocketAddr;
use std::sync::Arc;
use tower::ServiceExt;
use tower_http::services::ServeDir;
use tower_http::trace::{DefaultOnRequest, DefaultOnResponse, TraceLayer};
use tracing::{Level, info_span};

use crate::config::{ServerConfig, UPLOAD_PAGE_PATH};
use crate::frontend;
use crate::http::{add_security_headers, build_cors_layer};
use crate::upload;

/// 构建完整的应用路由。GET/HEAD 与 PUT 对任意路径生效，其余方法返回 405。
pub fn build_router(config: Arc<ServerConfig>) -> Router {
    let cors_layer = build_cors_layer(config.cors_origins.as_deref());

    let mut app = Router::new()
        .route(
            "/",
            get(serve_get)
                .put(upload::put_upload)
                .layer(DefaultBodyLimit::disable()),
        )
        .route(
            "/{*path}",
            get(serve_get)
                .put(upload::put_upload)
                .layer(DefaultBodyLimit::disable()),
        )
        .layer(middleware::from_fn(add_security_headers))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(|request: &Request<_>| {
                    let client_ip = request
                        .extensions()
                        .get::<ConnectInfo<SocketAddr>>()
                        .map(|ConnectInfo(addr)| addr.to_string())
                        .unwrap_or_else(|| "unknown".to_string());

                    info_span!(
                        env!("CARGO_CRATE_NAME"),
                        client_ip,
                        method = ?request.method(),
                        path = ?request.uri().path(),
                    )
                })
                .on_request(DefaultOnRequest::new().level(Level::DEBUG))
                .on_response(DefaultOnResponse::new().level(Level::DEBUG)),
        )
        .layer(Extension(config));

    if let Some(cors_layer) = cors_layer {
        app = app.layer(cors_layer);
    }
    app
}

async fn serve_get(
    Extension(config): Extension<Arc<ServerConfig>>,
    request: Request<AxumBody>,
) -> Response {
    if is_upload_page(request.uri().path()) {
        return frontend::upload_page().await.into_response();
    }
    ServeDir::new(&config.root_dir)
        .oneshot(request)
        .await
        .into_response()
}

fn is_upload_page(path: &str) -> bool {
    path.trim_end_matches('/') == UPLOAD_PAGE_PATH
}

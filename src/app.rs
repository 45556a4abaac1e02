use std::net::SocketAddr;

use axum::{extract::DefaultBodyLimit, middleware, routing::get, Router};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::{
    auth::{
        self,
        extractors::{protect, restrict_to, ADMIN_ONLY},
    },
    state::AppState,
    users,
};

/// Request bodies larger than this are refused.
pub const BODY_LIMIT_BYTES: usize = 10 * 1024;

/// Everything under `/api/v1/users`: public auth routes, then the
/// authenticated routes, with the admin gate innermost.
fn users_router(state: &AppState) -> Router<AppState> {
    let admin = users::admin_routes()
        .route_layer(middleware::from_fn_with_state(ADMIN_ONLY, restrict_to));

    let protected = Router::new()
        .merge(auth::account_routes())
        .merge(users::me_routes())
        .merge(admin)
        .route_layer(middleware::from_fn_with_state(state.clone(), protect));

    Router::new().merge(auth::public_routes()).merge(protected)
}

pub fn build_app(state: AppState) -> Router {
    Router::new()
        .nest(
            "/api/v1",
            Router::new()
                .nest("/users", users_router(&state))
                .route("/health", get(|| async { "ok" })),
        )
        .with_state(state)
        .layer(DefaultBodyLimit::max(BODY_LIMIT_BYTES))
        .layer(CorsLayer::permissive())
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(|req: &axum::http::Request<_>| {
                    let method = req.method().clone();
                    let uri = req.uri().clone();
                    tracing::info_span!("http_request", %method, uri = %uri, status = tracing::field::Empty)
                })
                .on_response(
                    |res: &axum::http::Response<_>,
                     latency: std::time::Duration,
                     span: &tracing::Span| {
                        let status = res.status();
                        span.record("status", tracing::field::display(status));
                        let latency_ms = latency.as_millis() as u64;
                        if status.is_server_error() {
                            tracing::error!(%status, latency_ms, "response");
                        } else {
                            tracing::info!(%status, latency_ms, "response");
                        }
                    },
                ),
        )
}

pub async fn serve(app: Router) -> anyhow::Result<()> {
    let addr: SocketAddr = format!(
        "{}:{}",
        std::env::var("APP_HOST").unwrap_or_else(|_| "0.0.0.0".into()),
        std::env::var("APP_PORT").unwrap_or_else(|_| "8080".into())
    )
    .parse()?;

    tracing::info!("listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

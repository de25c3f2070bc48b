//! `api` crate — HTTP surface of the workflow server.
//!
//! Exposes:
//!   POST   /api/v1/workflows/run      (event stream)
//!   GET    /api/v1/workflows
//!   POST   /api/v1/workflows
//!   GET    /api/v1/workflows/:id
//!   PUT    /api/v1/workflows/:id
//!   DELETE /api/v1/workflows/:id
//!   GET    /api/v1/health

pub mod auth;
pub mod handlers;
pub mod state;

use axum::routing::{get, post};
use axum::{middleware, Router};
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

pub use state::AppState;

pub fn router(state: AppState) -> Router {
    use handlers::{runs, workflows};

    let api = Router::new()
        .route("/workflows", get(workflows::list).post(workflows::create))
        .route("/workflows/run", post(runs::run))
        .route(
            "/workflows/:id",
            get(workflows::get).put(workflows::update).delete(workflows::delete),
        )
        .route_layer(middleware::from_fn_with_state(state.clone(), auth::require_token))
        .route("/health", get(handlers::health));

    Router::new()
        .nest("/api/v1", api)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Bind `bind` and serve until Ctrl-C.
pub async fn serve(bind: &str, state: AppState) -> std::io::Result<()> {
    let listener = TcpListener::bind(bind).await?;
    info!(%bind, "workflow server listening");

    axum::serve(listener, router(state))
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await?;

    info!("workflow server shut down");
    Ok(())
}

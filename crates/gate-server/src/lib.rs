//! HTTP surface for actiongate.
//!
//! `build_router` wires the routes onto an [`AppState`]; integration tests
//! drive it with `tower::ServiceExt::oneshot`. `serve_on` runs it on a bound
//! listener until the shutdown token fires.

pub mod error;
pub mod judges;
pub mod routes;
pub mod screen;
pub mod signature;
pub mod state;

use axum::middleware::from_fn_with_state;
use axum::routing::{get, post, put};
use axum::Router;
use tokio_util::sync::CancellationToken;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

pub use state::AppState;

/// Build the axum Router with all API routes and middleware.
pub fn build_router(app_state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // Only submissions are signed; reads and admin routes are not.
    let submit = post(routes::actions::submit_action).layer(from_fn_with_state(
        app_state.signing.clone(),
        signature::verify_signature,
    ));

    Router::new()
        .route("/health", get(routes::health::health))
        // Actions
        .route(
            "/v1/actions",
            submit.get(routes::actions::list_actions),
        )
        .route("/v1/actions/{action_id}", get(routes::actions::get_action))
        // Dry-run validation
        .route("/v1/validate", post(routes::validate::validate_command))
        // Policies
        .route("/v1/policies", get(routes::policies::list_policies))
        .route(
            "/v1/policies/{command_type}",
            put(routes::policies::put_policy).delete(routes::policies::delete_policy),
        )
        // Metrics
        .route("/v1/metrics", get(routes::metrics::get_metrics))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(app_state)
}

/// Serve on a pre-bound listener until `shutdown` is cancelled.
///
/// Taking a bound `TcpListener` lets the caller read the actual port first
/// (useful when `port = 0`).
pub async fn serve_on(
    app_state: AppState,
    listener: tokio::net::TcpListener,
    shutdown: CancellationToken,
) -> anyhow::Result<()> {
    let actual_port = listener.local_addr()?.port();
    let app = build_router(app_state);

    tracing::info!("actiongate listening on http://localhost:{actual_port}");

    axum::serve(listener, app)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await?;
    Ok(())
}

use crate::{AppState, handlers};
use axum::{
    Router,
    routing::{get, post},
};

/// Public Router Module
///
/// Endpoints that need no session. `/authz/check` is public because the token under
/// test travels in the body; an absent or invalid token is answered with an
/// `unauthenticated` denial, not a 401.
pub fn public_routes() -> Router<AppState> {
    Router::new()
        // GET /health
        // Liveness check for load balancers.
        .route("/health", get(|| async { "ok" }))
        // POST /authz/check
        // { principal_token, path } -> { allowed, reason }
        .route("/authz/check", post(handlers::check_authorization))
}

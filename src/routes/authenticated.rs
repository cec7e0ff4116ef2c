use crate::{AppState, handlers};
use axum::{Router, routing::get};

/// Authenticated Router Module
///
/// Routes that require a resolved principal. The `auth_middleware` layer above this
/// router rejects anonymous requests before they reach a handler.
pub fn authenticated_routes() -> Router<AppState> {
    Router::<AppState>::new()
        // GET /me/session
        // The caller's resolved principal, in the same shape a console client's
        // session query returns.
        .route("/me/session", get(handlers::get_session))
}

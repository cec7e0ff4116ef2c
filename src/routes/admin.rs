use crate::{AppState, handlers};
use axum::{Router, routing::get};

/// Admin Router Module
///
/// CRUD surface over the permission registry, nested under `/admin`.
///
/// Access Control:
/// Each handler evaluates `/admin/registry` against the live registry, so who may edit
/// the table is itself an entry in the table (by default `tourism_admin` only). Every
/// successful mutation is written to the `audit` log target.
pub fn admin_routes() -> Router<AppState> {
    Router::new()
        // GET /admin/registry
        // The versioned table, for operators to audit.
        //
        // PUT /admin/registry
        // Upserts one { path, allowed_roles } entry and publishes the next version.
        //
        // DELETE /admin/registry?path=...
        // Removes an entry; the path becomes unknown and is denied to everyone.
        .route(
            "/registry",
            get(handlers::get_registry)
                .put(handlers::upsert_registry_entry)
                .delete(handlers::remove_registry_entry),
        )
}

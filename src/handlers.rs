use crate::{
    AppState,
    auth::{self, AuthPrincipal},
    engine::AuthorizationEngine,
    error::ApiError,
    models::{
        AuthorizationReason, AuthorizationResult, AuthzCheckRequest, Principal, RegistryEntry,
        RegistrySnapshot, RemoveEntryQuery, SessionQuery,
    },
};
use axum::{
    Json,
    extract::{Query, State},
    http::StatusCode,
};

/// The registry's own admin surface is guarded by an entry in the registry.
pub const REGISTRY_RESOURCE: &str = "/admin/registry";

/// Evaluates `path` for `principal` against the current registry snapshot and maps a
/// denial onto the HTTP error taxonomy.
fn require(state: &AppState, principal: &Principal, path: &str) -> Result<(), ApiError> {
    let engine = AuthorizationEngine::new(state.registry.snapshot());
    let result = engine.evaluate(Some(principal), path);
    match result.reason {
        AuthorizationReason::Granted => Ok(()),
        AuthorizationReason::Unauthenticated => Err(ApiError::Unauthenticated),
        AuthorizationReason::UnknownResource | AuthorizationReason::RoleNotPermitted => {
            tracing::warn!(
                principal = %principal.id,
                role = %principal.role,
                path,
                reason = ?result.reason,
                "admin request denied"
            );
            Err(ApiError::Forbidden)
        }
    }
}

// --- Handlers ---

/// check_authorization
///
/// [Public Route] The single authorization check. Resolves the token into a principal
/// (identity, then profile) and evaluates the path against the current registry.
///
/// Denials are regular 200 responses with `allowed: false`; an unresolvable token is
/// simply an anonymous principal.
#[utoipa::path(
    post,
    path = "/authz/check",
    request_body = AuthzCheckRequest,
    responses((status = 200, description = "Decision", body = AuthorizationResult))
)]
pub async fn check_authorization(
    State(state): State<AppState>,
    Json(payload): Json<AuthzCheckRequest>,
) -> Json<AuthorizationResult> {
    let principal = auth::resolve_token(
        Some(payload.principal_token),
        &state.repo,
        &state.config,
        &state.http,
    )
    .await;

    let engine = AuthorizationEngine::new(state.registry.snapshot());
    let result = engine.evaluate(principal.as_ref(), &payload.path);

    tracing::info!(
        path = %payload.path,
        principal = ?principal.as_ref().map(|p| p.id),
        allowed = result.allowed,
        reason = ?result.reason,
        "authorization check"
    );
    Json(result)
}

/// get_session
///
/// [Authenticated Route] Raw session state for the caller. Resolution on the server is
/// complete by the time a handler runs, so `is_loading` is always false here.
#[utoipa::path(
    get,
    path = "/me/session",
    responses(
        (status = 200, description = "Session", body = SessionQuery),
        (status = 401, description = "No session")
    )
)]
pub async fn get_session(AuthPrincipal(principal): AuthPrincipal) -> Json<SessionQuery> {
    Json(SessionQuery {
        is_loading: false,
        principal: Some(principal),
    })
}

/// get_registry
///
/// [Admin Route] The current registry table with its version, for audit.
#[utoipa::path(
    get,
    path = "/admin/registry",
    responses(
        (status = 200, description = "Registry", body = RegistrySnapshot),
        (status = 403, description = "Role not permitted")
    )
)]
pub async fn get_registry(
    AuthPrincipal(principal): AuthPrincipal,
    State(state): State<AppState>,
) -> Result<Json<RegistrySnapshot>, ApiError> {
    require(&state, &principal, REGISTRY_RESOURCE)?;
    Ok(Json(state.registry.describe()))
}

/// upsert_registry_entry
///
/// [Admin Route] Sets the allowed roles of a path, adding the path if new. Publishes a
/// new registry version; evaluations already in flight keep the version they started
/// with.
#[utoipa::path(
    put,
    path = "/admin/registry",
    request_body = RegistryEntry,
    responses(
        (status = 200, description = "Updated", body = RegistrySnapshot),
        (status = 403, description = "Role not permitted"),
        (status = 422, description = "Invalid entry")
    )
)]
pub async fn upsert_registry_entry(
    AuthPrincipal(principal): AuthPrincipal,
    State(state): State<AppState>,
    Json(entry): Json<RegistryEntry>,
) -> Result<Json<RegistrySnapshot>, ApiError> {
    require(&state, &principal, REGISTRY_RESOURCE)?;

    let published = state.registry.update(|current| {
        current
            .with_entry(&entry.path, entry.allowed_roles.iter().copied())
            .map_err(ApiError::from)
    })?;

    tracing::info!(
        target: "audit",
        actor = %principal.id,
        path = %entry.path,
        roles = ?entry.allowed_roles,
        version = published.version(),
        "registry entry upserted"
    );
    Ok(Json(state.registry.describe()))
}

/// remove_registry_entry
///
/// [Admin Route] Removes a path. Once removed the path is unknown, so every request for
/// it is denied.
#[utoipa::path(
    delete,
    path = "/admin/registry",
    params(RemoveEntryQuery),
    responses(
        (status = 204, description = "Removed"),
        (status = 403, description = "Role not permitted"),
        (status = 404, description = "Not Found")
    )
)]
pub async fn remove_registry_entry(
    AuthPrincipal(principal): AuthPrincipal,
    State(state): State<AppState>,
    Query(query): Query<RemoveEntryQuery>,
) -> Result<StatusCode, ApiError> {
    require(&state, &principal, REGISTRY_RESOURCE)?;

    let published = state
        .registry
        .update(|current| current.without_entry(&query.path).ok_or(ApiError::NotFound))?;

    tracing::info!(
        target: "audit",
        actor = %principal.id,
        path = %query.path,
        version = published.version(),
        "registry entry removed"
    );
    Ok(StatusCode::NO_CONTENT)
}

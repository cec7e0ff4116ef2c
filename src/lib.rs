use axum::{
    Router,
    extract::{FromRef, Request},
    http::HeaderName,
    middleware::{self, Next},
    response::Response,
};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::{DefaultOnResponse, TraceLayer},
};
use tracing::{Level, Span};

// --- Module Structure ---

// Authorization core.
pub mod engine;
pub mod guard;
pub mod models;
pub mod registry;
pub mod session;

// Collaborator contracts and adapters.
pub mod providers;
pub mod repository;

// HTTP service and ambient concerns.
pub mod auth;
pub mod config;
pub mod error;
pub mod handlers;

// Module for routing segregation (Public, Authenticated, Admin).
pub mod routes;
use auth::AuthPrincipal;
use routes::{admin, authenticated, public};

// --- Public Re-exports ---

pub use config::AppConfig;
pub use engine::AuthorizationEngine;
pub use guard::{GuardOutcome, GuardState, MountedGuard, Navigator, RedirectTargets, RouteGuard};
pub use registry::{PermissionRegistry, RegistryHandle};
pub use repository::{PostgresRepository, RepositoryState};
pub use session::{SessionSnapshot, SessionState, SessionStore};

/// ApiDoc
///
/// OpenAPI document for the HTTP surface, served at `/api-docs/openapi.json`.
#[derive(OpenApi)]
#[openapi(
    paths(
        handlers::check_authorization, handlers::get_session, handlers::get_registry,
        handlers::upsert_registry_entry, handlers::remove_registry_entry
    ),
    components(
        schemas(
            models::Role, models::Principal, models::AuthorizationReason,
            models::AuthorizationResult, models::SessionQuery, models::AuthzCheckRequest,
            models::RegistryEntry, models::RegistryDocument, models::RegistrySnapshot,
        )
    ),
    tags(
        (name = "tourism-console-authz", description = "Console route authorization API")
    )
)]
struct ApiDoc;

/// AppState
///
/// Shared state for every request: the live registry, the profile store and the
/// immutable configuration.
#[derive(Clone)]
pub struct AppState {
    /// Current permission registry; swapped atomically on admin edits.
    pub registry: RegistryHandle,
    /// Profile store: the source of each principal's role.
    pub repo: RepositoryState,
    /// The loaded, immutable environment configuration.
    pub config: AppConfig,
    /// Pooled HTTP client for the hosted identity service.
    pub http: reqwest::Client,
}

// --- Axum FromRef Extractor Implementations ---

impl FromRef<AppState> for RepositoryState {
    fn from_ref(app_state: &AppState) -> RepositoryState {
        app_state.repo.clone()
    }
}

impl FromRef<AppState> for AppConfig {
    fn from_ref(app_state: &AppState) -> AppConfig {
        app_state.config.clone()
    }
}

impl FromRef<AppState> for reqwest::Client {
    fn from_ref(app_state: &AppState) -> reqwest::Client {
        app_state.http.clone()
    }
}

/// auth_middleware
///
/// Rejects requests without a resolvable principal. `AuthPrincipal` does the work: its
/// rejection (401) short-circuits before `next` runs.
async fn auth_middleware(_principal: AuthPrincipal, request: Request, next: Next) -> Response {
    next.run(request).await
}

/// create_router
///
/// Assembles the routing structure, scoped middleware and shared state.
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_methods(Any)
        .allow_origin(Any)
        .allow_headers(Any);

    // Header name constant for Request Correlation.
    let x_request_id = HeaderName::from_static("x-request-id");

    let base_router = Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .merge(public::public_routes())
        .merge(
            authenticated::authenticated_routes().route_layer(middleware::from_fn_with_state(
                state.clone(),
                auth_middleware,
            )),
        )
        // Admin handlers authorize through the engine themselves.
        .nest("/admin", admin::admin_routes())
        .with_state(state);

    base_router
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestIdLayer::new(x_request_id.clone(), MakeRequestUuid))
                .layer(
                    TraceLayer::new_for_http()
                        .make_span_with(trace_span_logger)
                        .on_response(
                            DefaultOnResponse::new()
                                .level(Level::INFO)
                                .latency_unit(tower_http::LatencyUnit::Millis),
                        ),
                )
                .layer(PropagateRequestIdLayer::new(x_request_id)),
        )
        .layer(cors)
}

/// trace_span_logger
///
/// Opens the per-request span, tagged with the `x-request-id` set above so every log
/// line of one request can be correlated.
fn trace_span_logger(request: &axum::http::Request<axum::body::Body>) -> Span {
    let request_id = request
        .headers()
        .get("x-request-id")
        .and_then(|value| value.to_str().ok())
        .unwrap_or("unknown");

    tracing::info_span!(
        "http_request",
        method = ?request.method(),
        uri = ?request.uri(),
        req_id = %request_id,
    )
}

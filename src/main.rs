use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use tokio::net::TcpListener;
use tourism_console_authz::{
    AppState, PermissionRegistry, RegistryHandle,
    config::{AppConfig, Env},
    create_router,
    repository::{PostgresRepository, RepositoryState},
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// main
///
/// Loads configuration, installs logging, validates the permission registry, connects
/// the profile store and serves the HTTP surface.
#[tokio::main]
async fn main() {
    // 1. Configuration (fail-fast)
    dotenv::dotenv().ok();
    let config = AppConfig::load();

    // 2. Logging: RUST_LOG wins, otherwise sensible local defaults.
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "tourism_console_authz=debug,audit=info,tower_http=info,axum=trace".into());

    match config.env {
        Env::Local => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().pretty())
                .init();
        }
        Env::Production => {
            // JSON lines for the log aggregator.
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().json())
                .init();
        }
    }

    tracing::info!("Application starting in {:?} mode", config.env);
    if config.env == Env::Local {
        tracing::warn!("local mode: the x-user-id header bypasses token verification");
    }

    // 3. Permission registry. A malformed table is fatal here, never at request time.
    let registry = match &config.registry_path {
        Some(path) => PermissionRegistry::from_json_file(path),
        None => PermissionRegistry::console_default(),
    }
    .expect("FATAL: permission registry is invalid");

    tracing::info!(
        version = registry.version(),
        entries = registry.len(),
        source = config.registry_path.as_deref().unwrap_or("built-in"),
        "permission registry loaded"
    );

    // 4. Profile store (Postgres).
    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&config.db_url)
        .await
        .expect("FATAL: Failed to connect to Postgres. Check DATABASE_URL.");
    let repo = Arc::new(PostgresRepository::new(pool)) as RepositoryState;

    // 5. Identity service client, shared by every request.
    let http = reqwest::Client::builder()
        .timeout(config.resolve_timeout)
        .build()
        .expect("FATAL: failed to build HTTP client");

    // 6. Unified State Assembly
    let bind_addr = config.bind_addr.clone();
    let app_state = AppState {
        registry: RegistryHandle::new(registry),
        repo,
        config,
        http,
    };

    // 7. Router and Server Startup
    let app = create_router(app_state);

    let listener = TcpListener::bind(&bind_addr)
        .await
        .expect("FATAL: failed to bind listener");

    tracing::info!("Listening on {}", bind_addr);
    tracing::info!("API Documentation (Swagger UI) available at /swagger-ui");

    axum::serve(listener, app)
        .await
        .expect("FATAL: server terminated unexpectedly");
}

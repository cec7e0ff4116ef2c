use crate::models::ProfileRow;
use async_trait::async_trait;
use sqlx::PgPool;
use std::sync::Arc;
use uuid::Uuid;

/// Repository Trait
///
/// Abstract contract for the profile store: the source of each principal's role and
/// display attributes. Handlers and the profile provider only see this trait, so tests
/// can substitute an in-memory implementation.
///
/// **Send + Sync + async_trait** make `Arc<dyn Repository>` shareable across Axum's
/// task boundaries.
#[async_trait]
pub trait Repository: Send + Sync {
    /// Returns `Ok(None)` when no profile exists for the identity. Database failures
    /// are reported as errors so the caller can tell "no profile" from "store down".
    async fn get_profile(&self, id: Uuid) -> Result<Option<ProfileRow>, sqlx::Error>;
}

/// RepositoryState
///
/// The concrete type used to share the profile store across the application state.
pub type RepositoryState = Arc<dyn Repository>;

/// PostgresRepository
///
/// `Repository` backed by the `profiles` table in PostgreSQL.
pub struct PostgresRepository {
    pool: PgPool,
}

impl PostgresRepository {
    /// Creates a new repository instance using the initialized connection pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl Repository for PostgresRepository {
    /// get_profile
    ///
    /// Reads the role and display attributes for one identity.
    async fn get_profile(&self, id: Uuid) -> Result<Option<ProfileRow>, sqlx::Error> {
        sqlx::query_as::<_, ProfileRow>(
            "SELECT id, email, display_name, role FROM profiles WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .inspect_err(|e| tracing::error!("get_profile error: {:?}", e))
    }
}

use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;
use uuid::Uuid;

use crate::{
    auth,
    error::ProviderError,
    models::{Profile, RawIdentity, Role},
    repository::RepositoryState,
};

// --- Collaborator Contracts ---

/// SessionEvent
///
/// Push notifications from the identity collaborator that invalidate the current
/// session state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEvent {
    SignedIn,
    SignedOut,
    Expired,
    Refreshed,
}

/// Callback registered with `IdentityProvider::on_session_change`.
pub type SessionCallback = Box<dyn Fn(SessionEvent) + Send + Sync>;

/// IdentityProvider
///
/// Confirms who the current session belongs to. `Ok(None)` means there is no session;
/// `Err` means the provider could not answer. Bounded retries are the provider's own
/// business (see `RetryingIdentityProvider`).
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    async fn resolve_identity(&self) -> Result<Option<RawIdentity>, ProviderError>;

    /// Registers a callback fired on sign-in, sign-out, expiry or refresh. Providers
    /// without push notifications ignore it.
    fn on_session_change(&self, _callback: SessionCallback) {}
}

/// ProfileProvider
///
/// Supplies the role and display attributes of an identity.
#[async_trait]
pub trait ProfileProvider: Send + Sync {
    async fn resolve_profile(&self, identity_id: Uuid) -> Result<Profile, ProviderError>;
}

// --- Identity Adapters ---

/// JwtIdentityProvider
///
/// Verifies a session token issued by the identity provider (HS256, shared secret) and
/// reads the subject out of it. No network round trip.
pub struct JwtIdentityProvider {
    token: Option<String>,
    secret: String,
}

impl JwtIdentityProvider {
    pub fn new(token: Option<String>, secret: impl Into<String>) -> Self {
        Self {
            // An empty token is the same as no session.
            token: token.filter(|t| !t.trim().is_empty()),
            secret: secret.into(),
        }
    }
}

#[async_trait]
impl IdentityProvider for JwtIdentityProvider {
    async fn resolve_identity(&self) -> Result<Option<RawIdentity>, ProviderError> {
        let Some(token) = self.token.as_deref() else {
            return Ok(None);
        };
        let claims = auth::decode_session_token(token, &self.secret)
            .map_err(|e| ProviderError::Identity(e.to_string()))?;
        Ok(Some(RawIdentity {
            id: claims.sub,
            email: claims.email,
        }))
    }
}

#[derive(Deserialize)]
struct SupabaseUserResponse {
    id: Uuid,
    email: Option<String>,
}

/// SupabaseIdentityProvider
///
/// Asks the hosted identity service who a bearer token belongs to
/// (`GET {base_url}/auth/v1/user`). A 401/403 answer means "no session". The HTTP
/// client is shared and built once at startup.
pub struct SupabaseIdentityProvider {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    token: Option<String>,
}

impl SupabaseIdentityProvider {
    pub fn new(
        client: reqwest::Client,
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        token: Option<String>,
    ) -> Self {
        Self {
            client,
            base_url: base_url.into(),
            api_key: api_key.into(),
            token: token.filter(|t| !t.trim().is_empty()),
        }
    }
}

#[async_trait]
impl IdentityProvider for SupabaseIdentityProvider {
    async fn resolve_identity(&self) -> Result<Option<RawIdentity>, ProviderError> {
        let Some(token) = self.token.as_deref() else {
            return Ok(None);
        };

        let url = format!("{}/auth/v1/user", self.base_url.trim_end_matches('/'));
        let response = self
            .client
            .get(url)
            .header("apikey", &self.api_key)
            .bearer_auth(token)
            .send()
            .await
            .map_err(|e| ProviderError::Identity(e.to_string()))?;

        let status = response.status();
        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN
        {
            return Ok(None);
        }
        if !status.is_success() {
            return Err(ProviderError::Identity(format!(
                "identity service answered {status}"
            )));
        }

        let user = response
            .json::<SupabaseUserResponse>()
            .await
            .map_err(|e| ProviderError::Identity(e.to_string()))?;
        Ok(Some(RawIdentity {
            id: user.id,
            email: user.email,
        }))
    }
}

/// RetryingIdentityProvider
///
/// Wraps any identity provider with a small fixed retry budget and linear backoff.
/// Only errors are retried; a definite "no session" answer is returned immediately.
pub struct RetryingIdentityProvider<P> {
    inner: P,
    retries: u32,
    backoff: Duration,
}

impl<P> RetryingIdentityProvider<P> {
    pub fn new(inner: P, retries: u32, backoff: Duration) -> Self {
        Self {
            inner,
            retries,
            backoff,
        }
    }
}

#[async_trait]
impl<P: IdentityProvider> IdentityProvider for RetryingIdentityProvider<P> {
    async fn resolve_identity(&self) -> Result<Option<RawIdentity>, ProviderError> {
        let mut attempt = 0;
        loop {
            match self.inner.resolve_identity().await {
                Ok(identity) => return Ok(identity),
                Err(e) if attempt < self.retries => {
                    attempt += 1;
                    tracing::warn!(error = %e, attempt, "identity resolution failed, retrying");
                    tokio::time::sleep(self.backoff * attempt).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    fn on_session_change(&self, callback: SessionCallback) {
        self.inner.on_session_change(callback);
    }
}

// --- Profile Adapters ---

/// RepositoryProfileProvider
///
/// Reads the profile row from the repository. A missing row or a database error is a
/// provider failure; a role string outside the known set degrades to the
/// lowest-privilege role.
pub struct RepositoryProfileProvider {
    repo: RepositoryState,
}

impl RepositoryProfileProvider {
    pub fn new(repo: RepositoryState) -> Self {
        Self { repo }
    }
}

#[async_trait]
impl ProfileProvider for RepositoryProfileProvider {
    async fn resolve_profile(&self, identity_id: Uuid) -> Result<Profile, ProviderError> {
        let row = self
            .repo
            .get_profile(identity_id)
            .await
            .map_err(|e| ProviderError::Profile(e.to_string()))?
            .ok_or_else(|| ProviderError::Profile(format!("no profile for {identity_id}")))?;

        let role = row.role.parse::<Role>().unwrap_or_else(|e| {
            tracing::warn!(%identity_id, error = %e, "profile carries an unknown role");
            Role::lowest()
        });

        Ok(Profile {
            role,
            email: row.email,
            display_name: row.display_name,
        })
    }
}

use axum::{
    extract::{FromRef, FromRequestParts},
    http::{HeaderMap, header, request::Parts},
};
use jsonwebtoken::{DecodingKey, Validation, decode};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    config::{AppConfig, Env},
    error::ApiError,
    models::{Principal, RawIdentity},
    providers::{
        IdentityProvider, JwtIdentityProvider, RepositoryProfileProvider,
        RetryingIdentityProvider, SupabaseIdentityProvider,
    },
    repository::RepositoryState,
    session,
};

/// Claims
///
/// The payload expected inside a session token issued by the identity provider.
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    /// Subject: the identity's UUID, also the primary key of the `profiles` row.
    pub sub: Uuid,
    /// Expiration time. Tokens past it are rejected.
    pub exp: usize,
    /// Issued at.
    pub iat: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}

/// decode_session_token
///
/// Verifies signature and expiry of a session token and returns its claims.
pub fn decode_session_token(
    token: &str,
    secret: &str,
) -> Result<Claims, jsonwebtoken::errors::Error> {
    let decoding_key = DecodingKey::from_secret(secret.as_bytes());

    let mut validation = Validation::default();
    validation.validate_exp = true;
    // Audience is the identity provider's concern, not ours.
    validation.validate_aud = false;

    decode::<Claims>(token, &decoding_key, &validation).map(|data| data.claims)
}

/// Extracts the token from an `Authorization: Bearer ...` header, if any.
pub fn bearer_token(headers: &HeaderMap) -> Option<String> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::to_string)
}

/// identity_provider
///
/// Picks the identity adapter for a token. With `SUPABASE_URL` and `SUPABASE_KEY` set
/// the hosted identity service is asked (with the configured retry budget); otherwise
/// the token is verified locally against the shared secret.
pub fn identity_provider(
    token: Option<String>,
    config: &AppConfig,
    http: &reqwest::Client,
) -> Box<dyn IdentityProvider> {
    match (&config.supabase_url, &config.supabase_key) {
        (Some(url), Some(key)) => Box::new(RetryingIdentityProvider::new(
            SupabaseIdentityProvider::new(http.clone(), url.clone(), key.clone(), token),
            config.identity_retries,
            config.retry_backoff,
        )),
        _ => Box::new(JwtIdentityProvider::new(token, config.jwt_secret.clone())),
    }
}

/// resolve_token
///
/// Runs the two-phase resolution for one request: the token is verified (identity
/// phase), then the role is read from the profile store (profile phase). `None` means
/// the request is anonymous.
pub async fn resolve_token(
    token: Option<String>,
    repo: &RepositoryState,
    config: &AppConfig,
    http: &reqwest::Client,
) -> Option<Principal> {
    let identity = identity_provider(token, config, http);
    let profiles = RepositoryProfileProvider::new(repo.clone());
    session::resolve_principal(identity.as_ref(), &profiles, config.resolve_timeout).await
}

/// AuthPrincipal Extractor Result
///
/// The resolved principal of an authenticated request.
#[derive(Debug, Clone)]
pub struct AuthPrincipal(pub Principal);

/// AuthPrincipal Extractor Implementation
///
/// 1. Local bypass: in `Env::Local`, an `x-user-id` header holding a UUID skips the
///    identity phase and goes straight to the profile lookup.
/// 2. Otherwise the bearer token goes through both resolution phases.
///
/// Rejection: `ApiError::Unauthenticated` (401) when no principal comes out.
impl<S> FromRequestParts<S> for AuthPrincipal
where
    S: Send + Sync,
    RepositoryState: FromRef<S>,
    AppConfig: FromRef<S>,
    reqwest::Client: FromRef<S>,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let repo = RepositoryState::from_ref(state);
        let config = AppConfig::from_ref(state);

        if config.env == Env::Local {
            let bypass = parts
                .headers
                .get("x-user-id")
                .and_then(|value| value.to_str().ok())
                .and_then(|id| Uuid::parse_str(id).ok());
            if let Some(id) = bypass {
                tracing::debug!(%id, "local identity bypass");
                let profiles = RepositoryProfileProvider::new(repo);
                let identity = RawIdentity { id, email: None };
                let principal =
                    session::resolve_profile_phase(&profiles, &identity, config.resolve_timeout)
                        .await;
                return Ok(AuthPrincipal(principal));
            }
        }

        let http = reqwest::Client::from_ref(state);
        resolve_token(bearer_token(&parts.headers), &repo, &config, &http)
            .await
            .map(AuthPrincipal)
            .ok_or(ApiError::Unauthenticated)
    }
}

use std::{
    future::Future,
    sync::{Arc, Weak},
    time::Duration,
};
use tokio::{
    sync::{mpsc, watch},
    task::JoinHandle,
};

use crate::{
    error::ProviderError,
    models::{Principal, RawIdentity, SessionQuery},
    providers::{IdentityProvider, ProfileProvider, SessionEvent},
};

/// SessionState
///
/// The two-phase resolution state machine. `Initializing` is the identity phase,
/// `ResolvingProfile` the profile phase; `Ready` and `Anonymous` are settled. A role is
/// only ever readable from `Ready`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionState {
    Initializing,
    ResolvingProfile(RawIdentity),
    Ready(Principal),
    Anonymous,
}

/// SessionSnapshot
///
/// One atomically published view of the session. `revision` increases every time a new
/// resolution starts or the principal is cleared, so a consumer can tell two settle
/// events apart even when they carry the same state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSnapshot {
    pub revision: u64,
    pub state: SessionState,
}

impl SessionSnapshot {
    pub fn identity_loading(&self) -> bool {
        matches!(self.state, SessionState::Initializing)
    }

    pub fn profile_loading(&self) -> bool {
        matches!(self.state, SessionState::ResolvingProfile(_))
    }

    pub fn is_loading(&self) -> bool {
        self.identity_loading() || self.profile_loading()
    }

    /// The principal, once both phases have completed. `None` while loading or when
    /// anonymous.
    pub fn principal(&self) -> Option<&Principal> {
        match &self.state {
            SessionState::Ready(principal) => Some(principal),
            _ => None,
        }
    }

    pub fn query(&self) -> SessionQuery {
        SessionQuery {
            is_loading: self.is_loading(),
            principal: self.principal().cloned(),
        }
    }
}

async fn bounded<T, F>(timeout: Duration, fut: F) -> Result<T, ProviderError>
where
    F: Future<Output = Result<T, ProviderError>>,
{
    tokio::time::timeout(timeout, fut)
        .await
        .unwrap_or_else(|_| Err(ProviderError::Timeout(timeout.as_millis() as u64)))
}

/// resolve_identity_phase
///
/// Runs the identity phase. Provider errors and timeouts settle to "no identity" rather
/// than leaving the caller waiting.
pub async fn resolve_identity_phase(
    provider: &dyn IdentityProvider,
    timeout: Duration,
) -> Option<RawIdentity> {
    match bounded(timeout, provider.resolve_identity()).await {
        Ok(identity) => identity,
        Err(e) => {
            tracing::warn!(error = %e, "identity resolution failed, session is anonymous");
            None
        }
    }
}

/// resolve_profile_phase
///
/// Runs the profile phase for a confirmed identity. On failure the principal falls back
/// to the lowest-privilege role with `profile_loaded = false`.
pub async fn resolve_profile_phase(
    provider: &dyn ProfileProvider,
    identity: &RawIdentity,
    timeout: Duration,
) -> Principal {
    match bounded(timeout, provider.resolve_profile(identity.id)).await {
        Ok(profile) => Principal {
            id: identity.id,
            role: profile.role,
            profile_loaded: true,
            email: profile.email.or_else(|| identity.email.clone()),
            display_name: profile.display_name,
        },
        Err(e) => {
            tracing::warn!(
                identity_id = %identity.id,
                error = %e,
                "profile resolution failed, falling back to lowest-privilege role"
            );
            Principal::fallback(identity)
        }
    }
}

/// resolve_principal
///
/// Both phases in sequence, for callers that resolve one request at a time and have no
/// subscribers to notify in between.
pub async fn resolve_principal(
    identity: &dyn IdentityProvider,
    profiles: &dyn ProfileProvider,
    timeout: Duration,
) -> Option<Principal> {
    let raw = resolve_identity_phase(identity, timeout).await?;
    Some(resolve_profile_phase(profiles, &raw, timeout).await)
}

/// SessionStore
///
/// Owns the current principal and publishes every state change as a `SessionSnapshot`
/// through a watch channel. Only the resolution path writes; guards hold receivers and
/// only read.
pub struct SessionStore {
    identity: Arc<dyn IdentityProvider>,
    profiles: Arc<dyn ProfileProvider>,
    timeout: Duration,
    tx: watch::Sender<SessionSnapshot>,
}

impl SessionStore {
    pub fn new(
        identity: Arc<dyn IdentityProvider>,
        profiles: Arc<dyn ProfileProvider>,
        timeout: Duration,
    ) -> Self {
        let (tx, _rx) = watch::channel(SessionSnapshot {
            revision: 0,
            state: SessionState::Initializing,
        });
        Self {
            identity,
            profiles,
            timeout,
            tx,
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<SessionSnapshot> {
        self.tx.subscribe()
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        self.tx.borrow().clone()
    }

    pub fn query(&self) -> SessionQuery {
        self.tx.borrow().query()
    }

    /// resolve
    ///
    /// Starts a fresh resolution: `Initializing`, then `ResolvingProfile`, then `Ready`,
    /// or `Anonymous` if the identity phase yields nothing. If another resolution or a
    /// sign-out starts meanwhile, this one stops publishing.
    pub async fn resolve(&self) -> SessionSnapshot {
        let revision = self.begin(SessionState::Initializing);
        tracing::debug!(revision, "session resolution started");

        let Some(identity) = resolve_identity_phase(self.identity.as_ref(), self.timeout).await
        else {
            self.publish(revision, SessionState::Anonymous);
            return self.snapshot();
        };

        if !self.publish(revision, SessionState::ResolvingProfile(identity.clone())) {
            tracing::debug!(revision, "session resolution superseded");
            return self.snapshot();
        }

        let principal =
            resolve_profile_phase(self.profiles.as_ref(), &identity, self.timeout).await;
        let role = principal.role;
        if self.publish(revision, SessionState::Ready(principal)) {
            tracing::info!(revision, identity_id = %identity.id, %role, "session ready");
        }
        self.snapshot()
    }

    /// Drops the settled principal and resolves again from scratch. Guards fall back to
    /// `Pending` until the new resolution settles.
    pub async fn refresh(&self) -> SessionSnapshot {
        tracing::debug!("session refresh requested");
        self.resolve().await
    }

    /// Clears the principal. Any resolution still in flight is discarded.
    pub fn sign_out(&self) {
        let revision = self.begin(SessionState::Anonymous);
        tracing::info!(revision, "session cleared");
    }

    /// listen
    ///
    /// Subscribes to the identity provider's session notifications. Sign-out and expiry
    /// clear the principal; sign-in and refresh start a new resolution. The task holds
    /// only a weak reference and ends once the store is dropped.
    pub fn listen(self: &Arc<Self>) -> JoinHandle<()> {
        let (tx, mut rx) = mpsc::unbounded_channel();
        self.identity.on_session_change(Box::new(move |event| {
            let _ = tx.send(event);
        }));

        let store: Weak<Self> = Arc::downgrade(self);
        tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                let Some(store) = store.upgrade() else {
                    break;
                };
                tracing::debug!(?event, "session change received");
                match event {
                    SessionEvent::SignedOut | SessionEvent::Expired => store.sign_out(),
                    SessionEvent::SignedIn => {
                        store.resolve().await;
                    }
                    SessionEvent::Refreshed => {
                        store.refresh().await;
                    }
                }
            }
        })
    }

    fn begin(&self, state: SessionState) -> u64 {
        let mut revision = 0;
        self.tx.send_modify(|snapshot| {
            snapshot.revision += 1;
            snapshot.state = state;
            revision = snapshot.revision;
        });
        revision
    }

    fn publish(&self, revision: u64, state: SessionState) -> bool {
        self.tx.send_if_modified(|snapshot| {
            if snapshot.revision != revision {
                return false;
            }
            snapshot.state = state;
            true
        })
    }
}

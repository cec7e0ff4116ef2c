use async_trait::async_trait;
use std::{
    sync::{
        Arc, Mutex,
        atomic::{AtomicU32, Ordering},
    },
    time::Duration,
};
use tokio::sync::Notify;
use tourism_console_authz::{
    SessionState, SessionStore,
    error::ProviderError,
    models::{Profile, RawIdentity, Role},
    providers::{
        IdentityProvider, ProfileProvider, RetryingIdentityProvider, SessionCallback,
        SessionEvent,
    },
};
use uuid::Uuid;

const TEST_USER_ID: Uuid = Uuid::from_u128(42);
const TIMEOUT: Duration = Duration::from_secs(5);

// --- Mock Providers ---

/// Answers with a fixed identity (or none), optionally waiting on a gate first, and
/// keeps the registered session callback so tests can fire events.
#[derive(Default)]
struct MockIdentity {
    identity: Option<RawIdentity>,
    gate: Option<Arc<Notify>>,
    callback: Mutex<Option<SessionCallback>>,
}

impl MockIdentity {
    fn signed_in() -> Self {
        Self {
            identity: Some(RawIdentity {
                id: TEST_USER_ID,
                email: Some("staff@tourism.example".to_string()),
            }),
            ..Self::default()
        }
    }

    fn fire(&self, event: SessionEvent) {
        if let Some(callback) = self.callback.lock().unwrap().as_ref() {
            callback(event);
        }
    }
}

#[async_trait]
impl IdentityProvider for MockIdentity {
    async fn resolve_identity(&self) -> Result<Option<RawIdentity>, ProviderError> {
        if let Some(gate) = &self.gate {
            gate.notified().await;
        }
        Ok(self.identity.clone())
    }

    fn on_session_change(&self, callback: SessionCallback) {
        *self.callback.lock().unwrap() = Some(callback);
    }
}

/// Always fails and counts the attempts.
#[derive(Default)]
struct FailingIdentity {
    attempts: Arc<AtomicU32>,
}

#[async_trait]
impl IdentityProvider for FailingIdentity {
    async fn resolve_identity(&self) -> Result<Option<RawIdentity>, ProviderError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        Err(ProviderError::Identity("network unreachable".to_string()))
    }
}

/// Never answers.
struct HangingIdentity;

#[async_trait]
impl IdentityProvider for HangingIdentity {
    async fn resolve_identity(&self) -> Result<Option<RawIdentity>, ProviderError> {
        std::future::pending().await
    }
}

enum ProfileBehavior {
    Role(Role),
    Fail,
    Hang,
}

struct MockProfiles {
    behavior: ProfileBehavior,
    gate: Option<Arc<Notify>>,
}

impl MockProfiles {
    fn with_role(role: Role) -> Self {
        Self {
            behavior: ProfileBehavior::Role(role),
            gate: None,
        }
    }
}

#[async_trait]
impl ProfileProvider for MockProfiles {
    async fn resolve_profile(&self, _identity_id: Uuid) -> Result<Profile, ProviderError> {
        if let Some(gate) = &self.gate {
            gate.notified().await;
        }
        match self.behavior {
            ProfileBehavior::Role(role) => Ok(Profile {
                role,
                email: None,
                display_name: Some("Console Staff".to_string()),
            }),
            ProfileBehavior::Fail => Err(ProviderError::Profile("profiles unavailable".to_string())),
            ProfileBehavior::Hang => std::future::pending().await,
        }
    }
}

fn store(identity: impl IdentityProvider + 'static, profiles: MockProfiles) -> SessionStore {
    SessionStore::new(Arc::new(identity), Arc::new(profiles), TIMEOUT)
}

// --- Resolution ---

#[tokio::test]
async fn test_store_starts_loading_with_no_principal() {
    let store = store(MockIdentity::signed_in(), MockProfiles::with_role(Role::TourismAdmin));

    let snapshot = store.snapshot();
    assert_eq!(snapshot.revision, 0);
    assert_eq!(snapshot.state, SessionState::Initializing);
    assert!(snapshot.is_loading());
    assert!(snapshot.principal().is_none());

    let query = store.query();
    assert!(query.is_loading);
    assert!(query.principal.is_none());
}

#[tokio::test]
async fn test_resolve_settles_on_profile_role() {
    let store = store(
        MockIdentity::signed_in(),
        MockProfiles::with_role(Role::BusinessListingManager),
    );

    let snapshot = store.resolve().await;

    assert!(!snapshot.is_loading());
    let principal = snapshot.principal().expect("session should be ready");
    assert_eq!(principal.id, TEST_USER_ID);
    assert_eq!(principal.role, Role::BusinessListingManager);
    assert!(principal.profile_loaded);
    assert_eq!(principal.display_name.as_deref(), Some("Console Staff"));
    // Profile had no email, so the identity's email is kept.
    assert_eq!(principal.email.as_deref(), Some("staff@tourism.example"));
}

#[tokio::test]
async fn test_no_session_settles_anonymous() {
    let store = store(MockIdentity::default(), MockProfiles::with_role(Role::TourismAdmin));

    let snapshot = store.resolve().await;

    assert_eq!(snapshot.state, SessionState::Anonymous);
    assert!(!snapshot.is_loading());
    assert!(snapshot.principal().is_none());
}

#[tokio::test]
async fn test_identity_failure_after_retries_settles_anonymous() {
    let failing = FailingIdentity::default();
    let attempts = failing.attempts.clone();
    let identity = RetryingIdentityProvider::new(failing, 2, Duration::from_millis(1));
    let store = store(identity, MockProfiles::with_role(Role::TourismAdmin));

    let snapshot = store.resolve().await;

    assert_eq!(snapshot.state, SessionState::Anonymous);
    assert!(!snapshot.is_loading());
    assert_eq!(attempts.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn test_profile_failure_falls_back_to_lowest_role() {
    let store = store(
        MockIdentity::signed_in(),
        MockProfiles {
            behavior: ProfileBehavior::Fail,
            gate: None,
        },
    );

    let snapshot = store.resolve().await;

    let principal = snapshot.principal().expect("identity was confirmed");
    assert_eq!(principal.role, Role::Tourist);
    assert!(!principal.profile_loaded);
    assert_eq!(principal.id, TEST_USER_ID);
}

#[tokio::test]
async fn test_hanging_providers_are_bounded_by_timeout() {
    let store = SessionStore::new(
        Arc::new(HangingIdentity),
        Arc::new(MockProfiles::with_role(Role::TourismAdmin)),
        Duration::from_millis(20),
    );
    assert_eq!(store.resolve().await.state, SessionState::Anonymous);

    let store = SessionStore::new(
        Arc::new(MockIdentity::signed_in()),
        Arc::new(MockProfiles {
            behavior: ProfileBehavior::Hang,
            gate: None,
        }),
        Duration::from_millis(20),
    );
    let snapshot = store.resolve().await;
    let principal = snapshot.principal().expect("identity was confirmed");
    assert_eq!(principal.role, Role::lowest());
    assert!(!principal.profile_loaded);
}

#[tokio::test]
async fn test_resolution_passes_through_both_loading_phases() {
    let identity_gate = Arc::new(Notify::new());
    let profile_gate = Arc::new(Notify::new());
    let store = Arc::new(store(
        MockIdentity {
            gate: Some(identity_gate.clone()),
            ..MockIdentity::signed_in()
        },
        MockProfiles {
            behavior: ProfileBehavior::Role(Role::TourismContentManager),
            gate: Some(profile_gate.clone()),
        },
    ));
    let mut rx = store.subscribe();

    let task = tokio::spawn({
        let store = store.clone();
        async move { store.resolve().await }
    });

    let snapshot = rx.wait_for(|s| s.revision == 1).await.unwrap().clone();
    assert!(snapshot.identity_loading());
    assert!(snapshot.principal().is_none());

    identity_gate.notify_one();
    let snapshot = rx.wait_for(|s| s.profile_loading()).await.unwrap().clone();
    assert!(snapshot.is_loading());
    // The identity is known but no role is readable yet.
    assert!(snapshot.principal().is_none());
    assert!(matches!(
        snapshot.state,
        SessionState::ResolvingProfile(ref raw) if raw.id == TEST_USER_ID
    ));

    profile_gate.notify_one();
    let settled = task.await.unwrap();
    assert_eq!(settled.revision, 1);
    assert_eq!(
        settled.principal().map(|p| p.role),
        Some(Role::TourismContentManager)
    );
}

#[tokio::test]
async fn test_sign_out_discards_resolution_in_flight() {
    let profile_gate = Arc::new(Notify::new());
    let store = Arc::new(store(
        MockIdentity::signed_in(),
        MockProfiles {
            behavior: ProfileBehavior::Role(Role::TourismAdmin),
            gate: Some(profile_gate.clone()),
        },
    ));
    let mut rx = store.subscribe();

    let task = tokio::spawn({
        let store = store.clone();
        async move { store.resolve().await }
    });

    rx.wait_for(|s| s.profile_loading()).await.unwrap();
    store.sign_out();
    profile_gate.notify_one();

    let settled = task.await.unwrap();
    assert_eq!(settled.state, SessionState::Anonymous);
    assert_eq!(settled.revision, 2);
    assert_eq!(store.snapshot().state, SessionState::Anonymous);
}

#[tokio::test]
async fn test_each_resolution_gets_a_new_revision() {
    let store = store(MockIdentity::signed_in(), MockProfiles::with_role(Role::TourismAdmin));

    let first = store.resolve().await;
    let second = store.resolve().await;

    assert_eq!(first.state, second.state);
    assert!(second.revision > first.revision);
}

#[tokio::test]
async fn test_refresh_re_enters_loading_then_settles_again() {
    let identity_gate = Arc::new(Notify::new());
    let store = Arc::new(store(
        MockIdentity {
            gate: Some(identity_gate.clone()),
            ..MockIdentity::signed_in()
        },
        MockProfiles::with_role(Role::TourismAdmin),
    ));
    let mut rx = store.subscribe();

    identity_gate.notify_one();
    let settled = store.resolve().await;
    assert!(settled.principal().is_some());

    let task = tokio::spawn({
        let store = store.clone();
        async move { store.refresh().await }
    });

    // The old principal is gone while the refresh is in flight.
    let loading = rx
        .wait_for(|s| s.revision > settled.revision)
        .await
        .unwrap()
        .clone();
    assert!(loading.identity_loading());
    assert!(loading.principal().is_none());

    identity_gate.notify_one();
    let refreshed = task.await.unwrap();
    assert_eq!(refreshed.revision, settled.revision + 1);
    assert_eq!(refreshed.principal().map(|p| p.role), Some(Role::TourismAdmin));
}

// --- Session Change Notifications ---

#[tokio::test]
async fn test_listen_reacts_to_sign_out_and_sign_in() {
    let identity = Arc::new(MockIdentity::signed_in());
    let store = Arc::new(SessionStore::new(
        identity.clone(),
        Arc::new(MockProfiles::with_role(Role::BusinessRegistrationManager)),
        TIMEOUT,
    ));
    let _listener = store.listen();
    let mut rx = store.subscribe();

    store.resolve().await;
    assert!(store.snapshot().principal().is_some());

    identity.fire(SessionEvent::SignedOut);
    rx.wait_for(|s| s.state == SessionState::Anonymous)
        .await
        .unwrap();

    identity.fire(SessionEvent::SignedIn);
    let snapshot = rx
        .wait_for(|s| s.principal().is_some())
        .await
        .unwrap()
        .clone();
    assert_eq!(
        snapshot.principal().map(|p| p.role),
        Some(Role::BusinessRegistrationManager)
    );
}

#[tokio::test]
async fn test_listen_refreshes_on_token_refresh() {
    let identity = Arc::new(MockIdentity::signed_in());
    let store = Arc::new(SessionStore::new(
        identity.clone(),
        Arc::new(MockProfiles::with_role(Role::TourismContentManager)),
        TIMEOUT,
    ));
    let _listener = store.listen();
    let mut rx = store.subscribe();

    let settled = store.resolve().await;
    identity.fire(SessionEvent::Refreshed);

    let refreshed = rx
        .wait_for(|s| s.revision > settled.revision && s.principal().is_some())
        .await
        .unwrap()
        .clone();
    assert_eq!(
        refreshed.principal().map(|p| p.role),
        Some(Role::TourismContentManager)
    );
}

#[tokio::test]
async fn test_listen_treats_expiry_as_sign_out() {
    let identity = Arc::new(MockIdentity::signed_in());
    let store = Arc::new(SessionStore::new(
        identity.clone(),
        Arc::new(MockProfiles::with_role(Role::TourismAdmin)),
        TIMEOUT,
    ));
    let _listener = store.listen();
    let mut rx = store.subscribe();

    store.resolve().await;
    identity.fire(SessionEvent::Expired);

    let snapshot = rx
        .wait_for(|s| s.state == SessionState::Anonymous)
        .await
        .unwrap()
        .clone();
    assert!(snapshot.principal().is_none());
}

#[tokio::test]
async fn test_listener_ends_when_store_is_dropped() {
    let identity = Arc::new(MockIdentity::signed_in());
    let store = Arc::new(SessionStore::new(
        identity.clone(),
        Arc::new(MockProfiles::with_role(Role::TourismAdmin)),
        TIMEOUT,
    ));
    let listener = store.listen();

    drop(store);
    identity.fire(SessionEvent::Refreshed);

    tokio::time::timeout(Duration::from_secs(1), listener)
        .await
        .expect("listener should stop once the store is gone")
        .unwrap();
}

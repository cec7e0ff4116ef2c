use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::{sync::watch, task::JoinHandle};

use crate::{
    engine::AuthorizationEngine,
    models::AuthorizationResult,
    registry::RegistryHandle,
    session::{SessionSnapshot, SessionState},
};

/// Navigator
///
/// Performs the actual view transition. Supplied by the host application.
pub trait Navigator: Send + Sync {
    fn redirect(&self, target: &str);
}

/// RedirectTargets
///
/// Where denied visitors are sent: unauthenticated ones to the login screen, resolved
/// principals without the right role to the "unauthorized" screen.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RedirectTargets {
    pub login: String,
    pub unauthorized: String,
}

impl Default for RedirectTargets {
    fn default() -> Self {
        Self {
            login: "/login".to_string(),
            unauthorized: "/unauthorized".to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GuardState {
    Pending,
    RedirectToLogin,
    RedirectToUnauthorized,
    Render,
}

/// GuardOutcome
///
/// What the host should show for a guarded screen right now.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GuardOutcome<T> {
    Pending,
    RedirectLogin(String),
    RedirectUnauthorized(String),
    Render(T),
}

/// RouteGuard
///
/// Decides what one mounted protected screen shows. Stays `Pending` while either
/// session phase is loading and never redirects from there. Once the session settles it
/// redirects anonymous visitors to login, denied principals to the unauthorized screen,
/// and renders its payload otherwise.
///
/// Each settle event (session revision + path) triggers at most one navigation, however
/// often the guard re-observes the same snapshot.
///
/// Every evaluation reads the registry version current at that moment, so a table
/// published while the guard is mounted applies from the next observation on.
pub struct RouteGuard<T> {
    path: String,
    registry: RegistryHandle,
    navigator: Arc<dyn Navigator>,
    targets: RedirectTargets,
    payload: T,
    state: GuardState,
    decision: Option<AuthorizationResult>,
    redirected_for: Option<(u64, String)>,
    mounted: bool,
}

impl<T: Clone> RouteGuard<T> {
    pub fn new(
        path: impl Into<String>,
        registry: RegistryHandle,
        navigator: Arc<dyn Navigator>,
        targets: RedirectTargets,
        payload: T,
    ) -> Self {
        Self {
            path: path.into(),
            registry,
            navigator,
            targets,
            payload,
            state: GuardState::Pending,
            decision: None,
            redirected_for: None,
            mounted: true,
        }
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn state(&self) -> GuardState {
        self.state
    }

    /// The last engine decision, if the session has settled on a principal.
    pub fn decision(&self) -> Option<AuthorizationResult> {
        self.decision
    }

    pub fn outcome(&self) -> GuardOutcome<T> {
        match self.state {
            GuardState::Pending => GuardOutcome::Pending,
            GuardState::RedirectToLogin => GuardOutcome::RedirectLogin(self.targets.login.clone()),
            GuardState::RedirectToUnauthorized => {
                GuardOutcome::RedirectUnauthorized(self.targets.unauthorized.clone())
            }
            GuardState::Render => GuardOutcome::Render(self.payload.clone()),
        }
    }

    /// observe
    ///
    /// Applies the transition rule to a session snapshot and issues the redirect, if
    /// any, that the new state calls for.
    pub fn observe(&mut self, snapshot: &SessionSnapshot) -> GuardState {
        let (state, decision) = match &snapshot.state {
            SessionState::Initializing | SessionState::ResolvingProfile(_) => {
                (GuardState::Pending, None)
            }
            SessionState::Anonymous => (GuardState::RedirectToLogin, None),
            SessionState::Ready(principal) => {
                let engine = AuthorizationEngine::new(self.registry.snapshot());
                let result = engine.evaluate(Some(principal), &self.path);
                let state = if result.allowed {
                    GuardState::Render
                } else {
                    GuardState::RedirectToUnauthorized
                };
                (state, Some(result))
            }
        };

        self.state = state;
        self.decision = decision;

        let target = match state {
            GuardState::RedirectToLogin => Some(&self.targets.login),
            GuardState::RedirectToUnauthorized => Some(&self.targets.unauthorized),
            GuardState::Pending | GuardState::Render => None,
        };
        if let Some(target) = target {
            let settle = (snapshot.revision, self.path.clone());
            if self.mounted && self.redirected_for.as_ref() != Some(&settle) {
                tracing::info!(
                    path = %self.path,
                    %target,
                    reason = ?decision.map(|d| d.reason),
                    "route guard redirecting"
                );
                self.navigator.redirect(target);
                self.redirected_for = Some(settle);
            }
        }

        state
    }

    /// Points the guard at a different path and re-evaluates against `snapshot`.
    pub fn set_path(&mut self, path: impl Into<String>, snapshot: &SessionSnapshot) -> GuardState {
        self.path = path.into();
        self.state = GuardState::Pending;
        self.observe(snapshot)
    }
}

impl<T> RouteGuard<T> {
    fn detach(&mut self) {
        self.mounted = false;
    }
}

fn lock<T>(guard: &Mutex<RouteGuard<T>>) -> MutexGuard<'_, RouteGuard<T>> {
    guard.lock().unwrap_or_else(PoisonError::into_inner)
}

/// MountedGuard
///
/// A `RouteGuard` wired to a session subscription. A background task re-evaluates the
/// guard on every published snapshot. Unmounting (or dropping) cancels the task; after
/// `unmount` returns no further redirect is issued.
pub struct MountedGuard<T> {
    guard: Arc<Mutex<RouteGuard<T>>>,
    session: watch::Receiver<SessionSnapshot>,
    task: JoinHandle<()>,
}

impl<T: Clone + Send + 'static> MountedGuard<T> {
    pub fn mount(guard: RouteGuard<T>, session: watch::Receiver<SessionSnapshot>) -> Self {
        let guard = Arc::new(Mutex::new(guard));

        let task_guard = guard.clone();
        let mut rx = session.clone();
        let task = tokio::spawn(async move {
            loop {
                let snapshot = rx.borrow_and_update().clone();
                lock(&task_guard).observe(&snapshot);
                if rx.changed().await.is_err() {
                    break;
                }
            }
        });

        Self {
            guard,
            session,
            task,
        }
    }

    pub fn state(&self) -> GuardState {
        lock(&self.guard).state()
    }

    pub fn outcome(&self) -> GuardOutcome<T> {
        lock(&self.guard).outcome()
    }

    /// Re-targets the mounted guard and re-evaluates against the latest snapshot.
    pub fn set_path(&self, path: impl Into<String>) -> GuardState {
        let snapshot = self.session.borrow().clone();
        lock(&self.guard).set_path(path, &snapshot)
    }

    pub fn unmount(self) {
        drop(self);
    }
}

impl<T> Drop for MountedGuard<T> {
    fn drop(&mut self) {
        lock(&self.guard).detach();
        self.task.abort();
    }
}

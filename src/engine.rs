use std::sync::Arc;

use crate::{
    models::{AuthorizationReason, AuthorizationResult, Principal},
    registry::PermissionRegistry,
};

/// AuthorizationEngine
///
/// Combines a principal and a console path against a registry snapshot. `evaluate` is a
/// pure function of its inputs: it never mutates the registry or the principal, and a
/// denial is an ordinary return value.
#[derive(Debug, Clone)]
pub struct AuthorizationEngine {
    registry: Arc<PermissionRegistry>,
}

impl AuthorizationEngine {
    pub fn new(registry: Arc<PermissionRegistry>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &PermissionRegistry {
        &self.registry
    }

    /// evaluate
    ///
    /// 1. No principal: `Unauthenticated`.
    /// 2. Path not registered: `UnknownResource`, whatever the role.
    /// 3. Otherwise `Granted` if the principal's role is in the entry's allowed set,
    ///    `RoleNotPermitted` if not.
    pub fn evaluate(&self, principal: Option<&Principal>, path: &str) -> AuthorizationResult {
        let Some(principal) = principal else {
            return AuthorizationResult::denied(AuthorizationReason::Unauthenticated);
        };

        let Some(entry) = self.registry.lookup(path) else {
            return AuthorizationResult::denied(AuthorizationReason::UnknownResource);
        };

        if entry.permits(principal.role) {
            AuthorizationResult::granted()
        } else {
            AuthorizationResult::denied(AuthorizationReason::RoleNotPermitted)
        }
    }
}

use std::sync::Arc;
use tourism_console_authz::{
    AuthorizationEngine, PermissionRegistry,
    models::{AuthorizationReason, AuthorizationResult, Principal, Role},
};
use uuid::Uuid;

const TEST_USER_ID: Uuid = Uuid::from_u128(1);

fn engine() -> AuthorizationEngine {
    AuthorizationEngine::new(Arc::new(PermissionRegistry::console_default().unwrap()))
}

fn principal(role: Role) -> Principal {
    Principal::new(TEST_USER_ID, role)
}

// --- Properties ---

#[test]
fn test_registered_paths_follow_the_allowed_set() {
    let engine = engine();
    for entry in engine.registry().entries() {
        for role in Role::ALL {
            let result = engine.evaluate(Some(&principal(role)), &entry.path);
            assert_eq!(
                result.allowed,
                entry.allowed_roles.contains(&role),
                "{role} on {}",
                entry.path
            );
            let expected = if result.allowed {
                AuthorizationReason::Granted
            } else {
                AuthorizationReason::RoleNotPermitted
            };
            assert_eq!(result.reason, expected);
        }
    }
}

#[test]
fn test_unregistered_paths_are_denied_for_every_role() {
    let engine = engine();
    for path in ["/admin/does-not-exist", "/admin", "/admin/dashboard/", "/", ""] {
        for role in Role::ALL {
            assert_eq!(
                engine.evaluate(Some(&principal(role)), path),
                AuthorizationResult::denied(AuthorizationReason::UnknownResource),
                "{role} on {path:?}"
            );
        }
    }
}

#[test]
fn test_missing_principal_is_unauthenticated_everywhere() {
    let engine = engine();
    let registered: Vec<String> = engine.registry().entries().map(|e| e.path.clone()).collect();
    for path in registered.iter().map(String::as_str).chain(["/admin/does-not-exist"]) {
        let result = engine.evaluate(None, path);
        assert!(!result.allowed);
        assert_eq!(result.reason, AuthorizationReason::Unauthenticated);
    }
}

#[test]
fn test_evaluate_is_idempotent_and_leaves_inputs_unchanged() {
    let engine = engine();
    let registry_before = engine.registry().clone();
    let principal = principal(Role::BusinessListingManager);
    let principal_before = principal.clone();

    let first = engine.evaluate(Some(&principal), "/admin/business-listings");
    let second = engine.evaluate(Some(&principal), "/admin/business-listings");

    assert_eq!(first, second);
    assert_eq!(engine.registry(), &registry_before);
    assert_eq!(principal, principal_before);
}

#[test]
fn test_fallback_principal_never_reaches_an_admin_route() {
    let engine = engine();
    let fallback = Principal::fallback(&tourism_console_authz::models::RawIdentity {
        id: TEST_USER_ID,
        email: None,
    });
    assert_eq!(fallback.role, Role::Tourist);
    assert!(!fallback.profile_loaded);

    for entry in engine.registry().entries() {
        assert!(!engine.evaluate(Some(&fallback), &entry.path).allowed);
    }
}

// --- Scenarios ---

#[test]
fn test_content_manager_cannot_reach_business_listings() {
    let mut registry = PermissionRegistry::new(1);
    registry
        .register(
            "/admin/business-listings",
            [Role::TourismAdmin, Role::BusinessListingManager],
        )
        .unwrap();
    let engine = AuthorizationEngine::new(Arc::new(registry));

    let result = engine.evaluate(
        Some(&principal(Role::TourismContentManager)),
        "/admin/business-listings",
    );
    assert_eq!(
        result,
        AuthorizationResult {
            allowed: false,
            reason: AuthorizationReason::RoleNotPermitted
        }
    );
}

#[test]
fn test_every_staff_role_reaches_the_dashboard() {
    let mut registry = PermissionRegistry::new(1);
    registry.register("/admin/dashboard", Role::STAFF).unwrap();
    let engine = AuthorizationEngine::new(Arc::new(registry));

    for role in Role::STAFF {
        let result = engine.evaluate(Some(&principal(role)), "/admin/dashboard");
        assert_eq!(result, AuthorizationResult::granted(), "{role}");
    }
}

#[test]
fn test_unknown_path_is_denied_even_to_tourism_admin() {
    let engine = engine();
    let result = engine.evaluate(Some(&principal(Role::TourismAdmin)), "/admin/does-not-exist");
    assert!(!result.allowed);
    assert_eq!(result.reason, AuthorizationReason::UnknownResource);
}

#[test]
fn test_empty_registry_denies_everything() {
    let engine = AuthorizationEngine::new(Arc::new(PermissionRegistry::default()));
    let result = engine.evaluate(Some(&principal(Role::TourismAdmin)), "/admin/dashboard");
    assert_eq!(result.reason, AuthorizationReason::UnknownResource);
}

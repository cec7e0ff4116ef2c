use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::{collections::BTreeSet, fmt, str::FromStr};
use ts_rs::TS;
use utoipa::ToSchema;
use uuid::Uuid;

// --- Core Authorization Schemas ---

/// Role
///
/// The closed set of capability classes known to the console. The four staff roles
/// carry administrative capability; `Tourist` is the implicit, lowest-privilege role
/// given to general users and to principals whose profile could not be loaded.
///
/// Ordering is only used for stable set iteration (audit output), never for privilege.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, TS, ToSchema,
)]
#[serde(rename_all = "snake_case")]
#[ts(export)]
pub enum Role {
    TourismAdmin,
    BusinessListingManager,
    TourismContentManager,
    BusinessRegistrationManager,
    Tourist,
}

impl Role {
    /// The four roles with administrative capability.
    pub const STAFF: [Role; 4] = [
        Role::TourismAdmin,
        Role::BusinessListingManager,
        Role::TourismContentManager,
        Role::BusinessRegistrationManager,
    ];

    /// Every role, staff first.
    pub const ALL: [Role; 5] = [
        Role::TourismAdmin,
        Role::BusinessListingManager,
        Role::TourismContentManager,
        Role::BusinessRegistrationManager,
        Role::Tourist,
    ];

    /// The fallback role for principals whose profile is unavailable.
    pub const fn lowest() -> Role {
        Role::Tourist
    }

    pub const fn as_str(&self) -> &'static str {
        match self {
            Role::TourismAdmin => "tourism_admin",
            Role::BusinessListingManager => "business_listing_manager",
            Role::TourismContentManager => "tourism_content_manager",
            Role::BusinessRegistrationManager => "business_registration_manager",
            Role::Tourist => "tourist",
        }
    }

    pub const fn is_staff(&self) -> bool {
        !matches!(self, Role::Tourist)
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returned when a profile row carries a role string outside the closed enumeration.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown role: {0}")]
pub struct UnknownRole(pub String);

impl FromStr for Role {
    type Err = UnknownRole;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Role::ALL
            .into_iter()
            .find(|role| role.as_str() == s)
            .ok_or_else(|| UnknownRole(s.to_string()))
    }
}

/// Principal
///
/// The resolved actor attempting to reach a console surface. A `Principal` only exists
/// once both the identity and the profile phase have finished; `profile_loaded` is
/// false when the profile phase failed and the role is the lowest-privilege fallback.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct Principal {
    pub id: Uuid,
    pub role: Role,
    pub profile_loaded: bool,
    // Display attributes supplied by the profile store.
    pub email: Option<String>,
    pub display_name: Option<String>,
}

impl Principal {
    /// A principal with a fully loaded profile and no display attributes.
    pub fn new(id: Uuid, role: Role) -> Self {
        Self {
            id,
            role,
            profile_loaded: true,
            email: None,
            display_name: None,
        }
    }

    /// The principal produced when identity succeeded but the profile lookup failed.
    pub fn fallback(identity: &RawIdentity) -> Self {
        Self {
            id: identity.id,
            role: Role::lowest(),
            profile_loaded: false,
            email: identity.email.clone(),
            display_name: None,
        }
    }
}

/// RoutePermission
///
/// One registry entry: a protected console path and the non-empty set of roles allowed
/// to reach it. Only constructed through `PermissionRegistry`, which enforces both
/// uniqueness of `path` and non-emptiness of `allowed_roles`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoutePermission {
    pub path: String,
    pub allowed_roles: BTreeSet<Role>,
}

impl RoutePermission {
    pub fn permits(&self, role: Role) -> bool {
        self.allowed_roles.contains(&role)
    }
}

/// AuthorizationReason
///
/// Why a decision came out the way it did. Denials are ordinary values, not errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS, ToSchema)]
#[serde(rename_all = "snake_case")]
#[ts(export)]
pub enum AuthorizationReason {
    Granted,
    Unauthenticated,
    UnknownResource,
    RoleNotPermitted,
}

/// AuthorizationResult
///
/// The output of `AuthorizationEngine::evaluate`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct AuthorizationResult {
    pub allowed: bool,
    pub reason: AuthorizationReason,
}

impl AuthorizationResult {
    pub const fn granted() -> Self {
        Self {
            allowed: true,
            reason: AuthorizationReason::Granted,
        }
    }

    pub const fn denied(reason: AuthorizationReason) -> Self {
        Self {
            allowed: false,
            reason,
        }
    }
}

// --- Collaborator Payloads ---

/// RawIdentity
///
/// What the identity provider confirms about a session: who it is, nothing about role.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct RawIdentity {
    pub id: Uuid,
    pub email: Option<String>,
}

/// Profile
///
/// The role and display attributes supplied by the profile store for one identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    pub role: Role,
    pub email: Option<String>,
    pub display_name: Option<String>,
}

/// ProfileRow
///
/// Raw row from the `profiles` table. The role column is free text in the database and
/// is converted into the closed `Role` enumeration by the profile provider.
#[derive(Debug, Clone, sqlx::FromRow, Default)]
pub struct ProfileRow {
    pub id: Uuid,
    pub email: Option<String>,
    pub display_name: Option<String>,
    pub role: String,
}

// --- Wire Schemas (HTTP Surface) ---

/// SessionQuery
///
/// Raw session state for consumers that want it: whether resolution is still running,
/// and the principal once settled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct SessionQuery {
    pub is_loading: bool,
    pub principal: Option<Principal>,
}

/// AuthzCheckRequest
///
/// Input payload for `POST /authz/check`.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct AuthzCheckRequest {
    /// The session token issued by the identity provider. Empty means anonymous.
    #[schema(example = "eyJhbGciOiJIUzI1NiJ9...")]
    pub principal_token: String,
    #[schema(example = "/admin/business-listings")]
    pub path: String,
}

/// RegistryEntry
///
/// Wire form of one registry row, used by the registry file and the admin surface.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct RegistryEntry {
    #[schema(example = "/admin/dashboard")]
    pub path: String,
    pub allowed_roles: Vec<Role>,
}

impl From<&RoutePermission> for RegistryEntry {
    fn from(permission: &RoutePermission) -> Self {
        Self {
            path: permission.path.clone(),
            allowed_roles: permission.allowed_roles.iter().copied().collect(),
        }
    }
}

/// RegistryDocument
///
/// The versioned, auditable registry table. Also the on-disk format of
/// `AUTHZ_REGISTRY_PATH`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct RegistryDocument {
    pub version: u64,
    pub entries: Vec<RegistryEntry>,
}

/// RegistrySnapshot
///
/// Output schema for `GET /admin/registry`: the document plus when it was published.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct RegistrySnapshot {
    pub version: u64,
    #[ts(type = "string")]
    pub published_at: DateTime<Utc>,
    pub entries: Vec<RegistryEntry>,
}

/// RemoveEntryQuery
///
/// Query parameters for `DELETE /admin/registry`. Paths contain slashes, so they travel
/// as a query parameter rather than a path segment.
#[derive(Debug, Clone, Deserialize, utoipa::IntoParams)]
#[into_params(parameter_in = Query)]
pub struct RemoveEntryQuery {
    pub path: String,
}

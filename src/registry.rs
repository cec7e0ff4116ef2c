use chrono::{DateTime, Utc};
use std::{
    collections::{BTreeSet, HashMap},
    path::Path,
    sync::{Arc, PoisonError, RwLock},
};

use crate::{
    error::RegistryError,
    models::{RegistryDocument, RegistryEntry, RegistrySnapshot, Role, RoutePermission},
};

/// The console's built-in permission table, used when no registry file is configured.
const CONSOLE_TABLE: &[(&str, &[Role])] = &[
    ("/admin/dashboard", &Role::STAFF),
    (
        "/admin/business-listings",
        &[Role::TourismAdmin, Role::BusinessListingManager],
    ),
    (
        "/admin/business-registrations",
        &[Role::TourismAdmin, Role::BusinessRegistrationManager],
    ),
    (
        "/admin/content",
        &[Role::TourismAdmin, Role::TourismContentManager],
    ),
    (
        "/admin/destinations",
        &[Role::TourismAdmin, Role::TourismContentManager],
    ),
    (
        "/admin/events",
        &[Role::TourismAdmin, Role::TourismContentManager],
    ),
    ("/admin/users", &[Role::TourismAdmin]),
    ("/admin/registry", &[Role::TourismAdmin]),
];

/// PermissionRegistry
///
/// A closed allow-list mapping protected console paths to the roles permitted to reach
/// them. Entries keep their registration order for audit output; lookups are O(1).
///
/// A registry is built and validated once, then shared read-only (behind an `Arc`) with
/// every evaluation. Changes never mutate a registry in use: they build a new one with
/// a bumped version and publish it through `RegistryHandle`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PermissionRegistry {
    version: u64,
    order: Vec<String>,
    entries: HashMap<String, RoutePermission>,
}

impl PermissionRegistry {
    pub fn new(version: u64) -> Self {
        Self {
            version,
            ..Self::default()
        }
    }

    /// register
    ///
    /// Inserts a new entry. Rejects a path that is already present (`DuplicatePath`), a
    /// path that is not absolute (`InvalidPath`), an empty role set (`EmptyRoleSet`) and
    /// a role set admitting the fallback role (`FallbackRoleAdmitted`).
    pub fn register<I>(&mut self, path: &str, allowed_roles: I) -> Result<(), RegistryError>
    where
        I: IntoIterator<Item = Role>,
    {
        validate_path(path)?;
        if self.entries.contains_key(path) {
            return Err(RegistryError::DuplicatePath(path.to_string()));
        }
        let allowed_roles = validate_roles(path, allowed_roles)?;

        self.order.push(path.to_string());
        self.entries.insert(
            path.to_string(),
            RoutePermission {
                path: path.to_string(),
                allowed_roles,
            },
        );
        Ok(())
    }

    /// lookup
    ///
    /// `None` means the path is not registered, which callers must treat as
    /// "no permission granted".
    pub fn lookup(&self, path: &str) -> Option<&RoutePermission> {
        self.entries.get(path)
    }

    /// Entries in registration order.
    pub fn entries(&self) -> impl Iterator<Item = &RoutePermission> {
        self.order.iter().filter_map(|path| self.entries.get(path))
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// from_entries
    ///
    /// Builds and validates a whole table. Any invalid entry rejects the table.
    pub fn from_entries<I, P, R>(version: u64, entries: I) -> Result<Self, RegistryError>
    where
        I: IntoIterator<Item = (P, R)>,
        P: AsRef<str>,
        R: IntoIterator<Item = Role>,
    {
        let mut registry = Self::new(version);
        for (path, roles) in entries {
            registry.register(path.as_ref(), roles)?;
        }
        Ok(registry)
    }

    /// The built-in console table, validated like any other table.
    pub fn console_default() -> Result<Self, RegistryError> {
        Self::from_entries(
            1,
            CONSOLE_TABLE
                .iter()
                .map(|(path, roles)| (*path, roles.iter().copied())),
        )
    }

    /// Builds a registry from its wire/file form.
    pub fn from_document(document: RegistryDocument) -> Result<Self, RegistryError> {
        Self::from_entries(
            document.version,
            document
                .entries
                .into_iter()
                .map(|entry| (entry.path, entry.allowed_roles)),
        )
    }

    /// from_json_file
    ///
    /// Loads an operator-maintained registry document from disk.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, RegistryError> {
        let raw = std::fs::read_to_string(path)?;
        let document: RegistryDocument = serde_json::from_str(&raw)?;
        Self::from_document(document)
    }

    pub fn to_document(&self) -> RegistryDocument {
        RegistryDocument {
            version: self.version,
            entries: self.entries().map(RegistryEntry::from).collect(),
        }
    }

    /// with_entry
    ///
    /// Returns a copy of this registry, one version later, with `path` set to
    /// `allowed_roles`. Existing paths keep their position.
    pub fn with_entry<I>(&self, path: &str, allowed_roles: I) -> Result<Self, RegistryError>
    where
        I: IntoIterator<Item = Role>,
    {
        let mut next = self.clone();
        next.version = self.version + 1;
        if next.entries.contains_key(path) {
            let allowed_roles = validate_roles(path, allowed_roles)?;
            next.entries.insert(
                path.to_string(),
                RoutePermission {
                    path: path.to_string(),
                    allowed_roles,
                },
            );
        } else {
            next.register(path, allowed_roles)?;
        }
        Ok(next)
    }

    /// without_entry
    ///
    /// Returns a copy, one version later, with `path` removed, or `None` if the path was
    /// never registered.
    pub fn without_entry(&self, path: &str) -> Option<Self> {
        if !self.entries.contains_key(path) {
            return None;
        }
        let mut next = self.clone();
        next.version = self.version + 1;
        next.entries.remove(path);
        next.order.retain(|registered| registered != path);
        Some(next)
    }
}

fn validate_path(path: &str) -> Result<(), RegistryError> {
    if path.is_empty() || !path.starts_with('/') {
        return Err(RegistryError::InvalidPath(path.to_string()));
    }
    Ok(())
}

// A principal whose profile failed to load carries the fallback role, so no entry may
// admit it.
fn validate_roles<I>(path: &str, allowed_roles: I) -> Result<BTreeSet<Role>, RegistryError>
where
    I: IntoIterator<Item = Role>,
{
    let allowed_roles: BTreeSet<Role> = allowed_roles.into_iter().collect();
    if allowed_roles.is_empty() {
        return Err(RegistryError::EmptyRoleSet(path.to_string()));
    }
    if allowed_roles.contains(&Role::lowest()) {
        return Err(RegistryError::FallbackRoleAdmitted(path.to_string()));
    }
    Ok(allowed_roles)
}

#[derive(Debug, Clone)]
struct Published {
    registry: Arc<PermissionRegistry>,
    published_at: DateTime<Utc>,
}

impl Published {
    fn new(registry: PermissionRegistry) -> Self {
        Self {
            registry: Arc::new(registry),
            published_at: Utc::now(),
        }
    }
}

/// RegistryHandle
///
/// Shares the current registry snapshot between the HTTP handlers. Readers take an
/// `Arc` to the whole table; writers publish a replacement atomically, so an in-flight
/// evaluation always sees one consistent version.
#[derive(Clone)]
pub struct RegistryHandle {
    current: Arc<RwLock<Published>>,
}

impl RegistryHandle {
    pub fn new(registry: PermissionRegistry) -> Self {
        Self {
            current: Arc::new(RwLock::new(Published::new(registry))),
        }
    }

    fn published(&self) -> Published {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn snapshot(&self) -> Arc<PermissionRegistry> {
        self.published().registry
    }

    pub fn describe(&self) -> RegistrySnapshot {
        let published = self.published();
        let document = published.registry.to_document();
        RegistrySnapshot {
            version: document.version,
            published_at: published.published_at,
            entries: document.entries,
        }
    }

    /// update
    ///
    /// Derives the next registry from the current one and publishes it. The derivation
    /// runs under the write lock, so concurrent updates cannot lose each other's
    /// changes. On error nothing is published.
    pub fn update<F, E>(&self, derive: F) -> Result<Arc<PermissionRegistry>, E>
    where
        F: FnOnce(&PermissionRegistry) -> Result<PermissionRegistry, E>,
    {
        let mut published = self
            .current
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        let next = Published::new(derive(&published.registry)?);
        *published = next;
        Ok(published.registry.clone())
    }
}

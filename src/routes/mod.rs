//! Router Module Index
//!
//! The HTTP surface split by access level. Each module's access rule is applied at the
//! module level so a new endpoint inherits it by being added to the right router.

/// Routes open to anyone: health and the authorization check itself.
pub mod public;

/// Routes that need a resolved principal.
pub mod authenticated;

/// Registry administration. Every handler authorizes `/admin/registry` through the
/// authorization engine before touching the table.
pub mod admin;

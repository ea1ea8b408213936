//! Role-based access levels
//!
//! Roles are totally ordered: `User < Admin < SuperAdmin`. A caller holding
//! a role may perform anything that requires that role or a lower one.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Account role
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Regular account holder
    User,
    /// Back-office operator
    Admin,
    /// Operator allowed to create admins and reset test data
    SuperAdmin,
}

impl Role {
    /// Stable lowercase name
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Admin => "admin",
            Role::SuperAdmin => "superadmin",
        }
    }

    /// True if this role satisfies `required`
    pub fn permits(&self, required: Role) -> bool {
        *self >= required
    }

    /// True for admin and superadmin
    pub fn is_staff(&self) -> bool {
        self.permits(Role::Admin)
    }
}

impl Default for Role {
    fn default() -> Self {
        Role::User
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

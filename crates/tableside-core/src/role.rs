//! Client roles and role sets.
//!
//! A role is fixed for the lifetime of a session. Wire form is the
//! capitalised variant name (`"Kitchen"`); parsing is case-insensitive so the
//! lower-case path segments of the upgrade route (`/ws/kitchen/7`) map onto
//! the same values.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// The kind of client behind a session.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String")]
pub enum Role {
    /// Anonymous diner identified by a table token.
    Guest,
    /// Authenticated customer account.
    User,
    /// Floor staff.
    Employee,
    /// Kitchen display or cook.
    Kitchen,
    /// Restaurant administrator.
    Admin,
}

impl Role {
    /// Every role, in declaration order.
    pub const ALL: [Self; 5] = [
        Self::Guest,
        Self::User,
        Self::Employee,
        Self::Kitchen,
        Self::Admin,
    ];

    /// Wire name of the role.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Guest => "Guest",
            Self::User => "User",
            Self::Employee => "Employee",
            Self::Kitchen => "Kitchen",
            Self::Admin => "Admin",
        }
    }

    /// Whether the role belongs to [`RoleSet::STAFF`].
    pub fn is_staff(self) -> bool {
        RoleSet::STAFF.contains(self)
    }

    const fn bit(self) -> u8 {
        1 << (self as u8)
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returned when a string names no known role.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown role: {0}")]
pub struct RoleParseError(pub String);

impl FromStr for Role {
    type Err = RoleParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|role| role.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| RoleParseError(s.to_string()))
    }
}

impl TryFrom<String> for Role {
    type Error = RoleParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// A set of roles, used as a fan-out filter.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct RoleSet(u8);

impl RoleSet {
    /// No roles.
    pub const EMPTY: Self = Self(0);

    /// Roles eligible for staff-wide notifications.
    pub const STAFF: Self = Self::EMPTY
        .with(Role::Employee)
        .with(Role::Kitchen)
        .with(Role::Admin);

    /// A set holding a single role.
    pub const fn of(role: Role) -> Self {
        Self(role.bit())
    }

    /// This set plus `role`.
    #[must_use]
    pub const fn with(self, role: Role) -> Self {
        Self(self.0 | role.bit())
    }

    /// Membership test.
    pub const fn contains(self, role: Role) -> bool {
        self.0 & role.bit() != 0
    }

    /// Whether no role is in the set.
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Members in declaration order.
    pub fn iter(self) -> impl Iterator<Item = Role> {
        Role::ALL.into_iter().filter(move |role| self.contains(*role))
    }
}

impl From<Role> for RoleSet {
    fn from(role: Role) -> Self {
        Self::of(role)
    }
}

impl FromIterator<Role> for RoleSet {
    fn from_iter<I: IntoIterator<Item = Role>>(iter: I) -> Self {
        iter.into_iter().fold(Self::EMPTY, Self::with)
    }
}

impl fmt::Display for RoleSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = self.iter().map(Role::as_str).collect();
        f.write_str(&names.join("|"))
    }
}

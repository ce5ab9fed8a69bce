use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::errors::AppError;
use crate::models::member::Membership;

/// Team roles, least powerful first.
///
/// Power comparisons use the derived `Ord`, so declaration order is the
/// hierarchy. `ROLES_ORDER` only fixes the order of returned lists.
///
/// `Outsider` is synthetic: it stands for "no membership record" and is never
/// persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Outsider,
    Contributor,
    Manager,
    Admin,
    Owner,
}

/// Persisted roles, most powerful first. Must stay sorted descending by `Ord`.
pub const ROLES_ORDER: [Role; 4] = [Role::Owner, Role::Admin, Role::Manager, Role::Contributor];

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Outsider => "outsider",
            Role::Contributor => "contributor",
            Role::Manager => "manager",
            Role::Admin => "admin",
            Role::Owner => "owner",
        }
    }

    /// Equal or greater in the team order.
    pub fn is_at_least(self, required: Role) -> bool {
        self >= required
    }

    pub fn is_member(self) -> bool {
        self != Role::Outsider
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = AppError;

    /// Parses a persisted role. "outsider" is rejected since it never has a row.
    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "owner" => Ok(Role::Owner),
            "admin" => Ok(Role::Admin),
            "manager" => Ok(Role::Manager),
            "contributor" => Ok(Role::Contributor),
            other => Err(AppError::configuration(format!("unknown team role '{other}'"))),
        }
    }
}

fn ordered(include_outsiders: bool) -> impl Iterator<Item = Role> {
    ROLES_ORDER
        .into_iter()
        .chain(include_outsiders.then_some(Role::Outsider))
}

/// Roles equal to or more powerful than `role`, most powerful first.
pub fn perms_equal_or_greater(role: Role, include_outsiders: bool) -> Vec<Role> {
    ordered(include_outsiders).filter(|r| *r >= role).collect()
}

/// Roles equal to or less powerful than `role`, most powerful first.
pub fn perms_equal_or_lower(role: Role, include_outsiders: bool) -> Vec<Role> {
    ordered(include_outsiders).filter(|r| *r <= role).collect()
}

/// Roles `actor_role` may hand out to `to_member`.
///
/// Unrestricted owners and admins can assign anything but owner; admins cannot
/// touch an owner's role. Nobody else assigns roles. `actor_role` must be the
/// actor's unnarrowed effective role for the team.
pub fn roles_user_can_assign(actor_role: Role, to_member: Option<&Membership>) -> Vec<Role> {
    match actor_role {
        Role::Owner => ROLES_ORDER[1..].to_vec(),
        Role::Admin => {
            if to_member.map(|m| m.role) == Some(Role::Owner) {
                Vec::new()
            } else {
                ROLES_ORDER[1..].to_vec()
            }
        }
        _ => Vec::new(),
    }
}

/// Roles `actor_role` may invite new members with.
pub fn roles_user_can_invite(actor_role: Role) -> Vec<Role> {
    match actor_role {
        Role::Owner | Role::Admin => ROLES_ORDER[1..].to_vec(),
        _ => vec![Role::Contributor],
    }
}

pub fn can_assign_role(actor_role: Role, role: Role, to_member: Option<&Membership>) -> bool {
    roles_user_can_assign(actor_role, to_member).contains(&role)
}

/// Language narrowings only make sense on managers.
pub fn role_accepts_language_narrowings(role: Role) -> bool {
    role == Role::Manager
}

pub fn role_accepts_project_narrowings(role: Role) -> bool {
    matches!(role, Role::Manager | Role::Admin)
}

pub fn can_set_language_narrowings(target: Option<&Membership>) -> bool {
    role_accepts_language_narrowings(target.map(|m| m.role).unwrap_or(Role::Outsider))
}

pub fn can_set_project_narrowings(target: Option<&Membership>) -> bool {
    role_accepts_project_narrowings(target.map(|m| m.role).unwrap_or(Role::Outsider))
}

//! Team authorization: roles, narrowings, policy tables and task eligibility.
//!
//! - `role`: the fixed role order and role-assignment rules
//! - `principal`: the narrowing resolver (`effective_role`)
//! - `policy`: policy level to required role tables
//! - `evaluator`: `can_*` predicates and the `PolicyEvaluator` seam
//! - `eligibility`: which languages may get a new task
//! - `cache`: request-scoped membership lookups

pub mod cache;
pub mod eligibility;
pub mod evaluator;
pub mod policy;
pub mod principal;
pub mod role;

pub use cache::{MembershipCache, MembershipStore};
pub use eligibility::{EligibleTasks, VideoContext, VideoSnapshot};
pub use evaluator::{Action, DefaultPolicyEvaluator, PolicyEvaluator, VideoScope};
pub use principal::{effective_role, Principal, ResourceContext};
pub use role::{Role, ROLES_ORDER};

use crate::errors::{AppError, AppResult};

/// Authorization enforcement mode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthzMode {
    /// No permission checks (development mode)
    Off,
    /// Log denials but allow requests
    Advisory,
    /// Refuse denied requests with 403
    Strict,
}

impl AuthzMode {
    /// Reads `AUTHZ_MODE`; anything unrecognised means strict.
    pub fn from_env() -> Self {
        Self::parse(&std::env::var("AUTHZ_MODE").unwrap_or_default())
    }

    pub fn parse(value: &str) -> Self {
        match value.trim().to_lowercase().as_str() {
            "off" => AuthzMode::Off,
            "advisory" => AuthzMode::Advisory,
            _ => AuthzMode::Strict,
        }
    }

    /// Turns a denied decision into an error in strict mode.
    pub fn enforce(self, allowed: bool, action: &str) -> AppResult<()> {
        if allowed {
            return Ok(());
        }
        match self {
            AuthzMode::Strict => Err(AppError::forbidden(format!("not allowed to {action}"))),
            AuthzMode::Advisory => {
                tracing::warn!(action, "authorization denied (advisory mode, proceeding)");
                Ok(())
            }
            AuthzMode::Off => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_modes_are_strict() {
        assert_eq!(AuthzMode::parse(""), AuthzMode::Strict);
        assert_eq!(AuthzMode::parse("ADVISORY"), AuthzMode::Advisory);
        assert_eq!(AuthzMode::parse("off"), AuthzMode::Off);
    }

    #[test]
    fn only_strict_mode_refuses() {
        assert!(AuthzMode::Strict.enforce(false, "task.create").is_err());
        assert!(AuthzMode::Advisory.enforce(false, "task.create").is_ok());
        assert!(AuthzMode::Off.enforce(false, "task.create").is_ok());
        assert!(AuthzMode::Strict.enforce(true, "task.create").is_ok());
    }
}

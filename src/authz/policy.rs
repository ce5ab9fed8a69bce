//! Team and workflow policy tables.
//!
//! Each policy family is stored as a small integer on the team (or workflow).
//! Conversion from the stored integer fails for any value outside the table, so
//! a loaded `Team` always carries a complete mapping to a required role.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::Role;
use crate::errors::AppError;

fn unknown(policy: &str, value: i64) -> AppError {
    AppError::configuration(format!("unknown {policy} value {value}"))
}

/// Who may add, edit and remove team videos.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum VideoPolicy {
    Members = 1,
    Managers = 2,
    Admins = 3,
}

impl VideoPolicy {
    pub fn required_role(self) -> Role {
        match self {
            VideoPolicy::Members => Role::Contributor,
            VideoPolicy::Managers => Role::Manager,
            VideoPolicy::Admins => Role::Admin,
        }
    }
}

impl TryFrom<i64> for VideoPolicy {
    type Error = AppError;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(VideoPolicy::Members),
            2 => Ok(VideoPolicy::Managers),
            3 => Ok(VideoPolicy::Admins),
            other => Err(unknown("video_policy", other)),
        }
    }
}

/// How people get into the team.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum MembershipPolicy {
    Application = 1,
    InvitationByManager = 2,
    InvitationByAll = 3,
    Open = 4,
    InvitationByAdmin = 5,
}

impl MembershipPolicy {
    /// Minimum role needed to send an invitation. Even an open team only lets
    /// members invite.
    pub fn invite_role(self) -> Role {
        match self {
            MembershipPolicy::Open => Role::Contributor,
            // applications are reviewed by admins
            MembershipPolicy::Application => Role::Admin,
            MembershipPolicy::InvitationByAll => Role::Contributor,
            MembershipPolicy::InvitationByManager => Role::Manager,
            MembershipPolicy::InvitationByAdmin => Role::Admin,
        }
    }
}

impl TryFrom<i64> for MembershipPolicy {
    type Error = AppError;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(MembershipPolicy::Application),
            2 => Ok(MembershipPolicy::InvitationByManager),
            3 => Ok(MembershipPolicy::InvitationByAll),
            4 => Ok(MembershipPolicy::Open),
            5 => Ok(MembershipPolicy::InvitationByAdmin),
            other => Err(unknown("membership_policy", other)),
        }
    }
}

/// Who may create, assign and delete tasks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum TaskAssignPolicy {
    Any = 10,
    Managers = 20,
    Admins = 30,
}

impl TaskAssignPolicy {
    pub fn required_role(self) -> Role {
        match self {
            TaskAssignPolicy::Any => Role::Contributor,
            TaskAssignPolicy::Managers => Role::Manager,
            TaskAssignPolicy::Admins => Role::Admin,
        }
    }
}

impl TryFrom<i64> for TaskAssignPolicy {
    type Error = AppError;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        match value {
            10 => Ok(TaskAssignPolicy::Any),
            20 => Ok(TaskAssignPolicy::Managers),
            30 => Ok(TaskAssignPolicy::Admins),
            other => Err(unknown("task_assign_policy", other)),
        }
    }
}

/// Who may create and edit subtitles (subtitle_policy) or translations
/// (translate_policy). The open tier admits outsiders.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum EditPolicy {
    Anyone = 10,
    Members = 20,
    Managers = 30,
    Admins = 40,
}

impl EditPolicy {
    pub fn required_role(self) -> Role {
        match self {
            EditPolicy::Anyone => Role::Outsider,
            EditPolicy::Members => Role::Contributor,
            EditPolicy::Managers => Role::Manager,
            EditPolicy::Admins => Role::Admin,
        }
    }

    pub fn from_stored(policy: &str, value: i64) -> Result<Self, AppError> {
        match value {
            10 => Ok(EditPolicy::Anyone),
            20 => Ok(EditPolicy::Members),
            30 => Ok(EditPolicy::Managers),
            40 => Ok(EditPolicy::Admins),
            other => Err(unknown(policy, other)),
        }
    }
}

/// Workflow review threshold. `Disabled` means nobody may review.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ReviewPolicy {
    Disabled = 0,
    Peer = 10,
    Managers = 20,
    Admins = 30,
}

impl ReviewPolicy {
    pub fn required_role(self) -> Option<Role> {
        match self {
            ReviewPolicy::Disabled => None,
            ReviewPolicy::Peer => Some(Role::Contributor),
            ReviewPolicy::Managers => Some(Role::Manager),
            ReviewPolicy::Admins => Some(Role::Admin),
        }
    }
}

impl TryFrom<i64> for ReviewPolicy {
    type Error = AppError;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(ReviewPolicy::Disabled),
            10 => Ok(ReviewPolicy::Peer),
            20 => Ok(ReviewPolicy::Managers),
            30 => Ok(ReviewPolicy::Admins),
            other => Err(unknown("review_allowed", other)),
        }
    }
}

/// Workflow approval threshold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ApprovePolicy {
    Disabled = 0,
    Managers = 10,
    Admins = 20,
}

impl ApprovePolicy {
    pub fn required_role(self) -> Option<Role> {
        match self {
            ApprovePolicy::Disabled => None,
            ApprovePolicy::Managers => Some(Role::Manager),
            ApprovePolicy::Admins => Some(Role::Admin),
        }
    }
}

impl TryFrom<i64> for ApprovePolicy {
    type Error = AppError;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(ApprovePolicy::Disabled),
            10 => Ok(ApprovePolicy::Managers),
            20 => Ok(ApprovePolicy::Admins),
            other => Err(unknown("approve_allowed", other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stored_values_round_trip_through_the_tables() {
        for policy in [VideoPolicy::Members, VideoPolicy::Managers, VideoPolicy::Admins] {
            assert_eq!(VideoPolicy::try_from(policy as i64).unwrap(), policy);
        }
        for value in 1..=5 {
            let policy = MembershipPolicy::try_from(value).unwrap();
            assert_eq!(policy as i64, value);
        }
        assert_eq!(EditPolicy::from_stored("subtitle_policy", 40).unwrap(), EditPolicy::Admins);
    }

    #[test]
    fn unknown_levels_are_configuration_errors() {
        let err = VideoPolicy::try_from(4).unwrap_err();
        assert!(matches!(err, AppError::Configuration(_)));
        assert!(TaskAssignPolicy::try_from(15).is_err());
        assert!(EditPolicy::from_stored("translate_policy", 0).is_err());
        assert!(ReviewPolicy::try_from(40).is_err());
        assert!(ApprovePolicy::try_from(30).is_err());
        assert!(MembershipPolicy::try_from(0).is_err());
    }

    #[test]
    fn invitation_table() {
        assert_eq!(MembershipPolicy::Open.invite_role(), Role::Contributor);
        assert_eq!(MembershipPolicy::Application.invite_role(), Role::Admin);
        assert_eq!(MembershipPolicy::InvitationByAll.invite_role(), Role::Contributor);
        assert_eq!(MembershipPolicy::InvitationByManager.invite_role(), Role::Manager);
        assert_eq!(MembershipPolicy::InvitationByAdmin.invite_role(), Role::Admin);
    }

    #[test]
    fn open_edit_tier_admits_outsiders() {
        assert_eq!(EditPolicy::Anyone.required_role(), Role::Outsider);
        assert_eq!(ReviewPolicy::Disabled.required_role(), None);
        assert_eq!(ApprovePolicy::Managers.required_role(), Some(Role::Manager));
    }
}

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::authz::policy::{
    ApprovePolicy, EditPolicy, MembershipPolicy, ReviewPolicy, TaskAssignPolicy, VideoPolicy,
};
use crate::authz::Role;
use crate::errors::AppError;
use crate::events::Loggable;

/// Slug of the project every team owns implicitly.
pub const DEFAULT_PROJECT_SLUG: &str = "_root";

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Team {
    pub id: Uuid,
    pub name: String,
    pub slug: String,
    pub video_policy: VideoPolicy,
    pub membership_policy: MembershipPolicy,
    pub task_assign_policy: TaskAssignPolicy,
    pub subtitle_policy: EditPolicy,
    pub translate_policy: EditPolicy,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Team {
    /// A team with the most permissive defaults, as created by `POST /teams`.
    pub fn new(name: impl Into<String>, slug: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            slug: slug.into(),
            video_policy: VideoPolicy::Members,
            membership_policy: MembershipPolicy::Open,
            task_assign_policy: TaskAssignPolicy::Any,
            subtitle_policy: EditPolicy::Anyone,
            translate_policy: EditPolicy::Anyone,
            created_at: now,
            updated_at: now,
        }
    }
}

impl Loggable for Team {
    fn entity_type() -> &'static str { "team" }
    fn subject_id(&self) -> Uuid { self.id }
}

/// Raw team row. Policies are still bare integers here.
#[derive(Debug, Clone)]
pub struct DbTeam {
    pub id: Uuid,
    pub name: String,
    pub slug: String,
    pub video_policy: i64,
    pub membership_policy: i64,
    pub task_assign_policy: i64,
    pub subtitle_policy: i64,
    pub translate_policy: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TryFrom<DbTeam> for Team {
    type Error = AppError;

    fn try_from(value: DbTeam) -> Result<Self, Self::Error> {
        Ok(Team {
            id: value.id,
            name: value.name,
            slug: value.slug,
            video_policy: VideoPolicy::try_from(value.video_policy)?,
            membership_policy: MembershipPolicy::try_from(value.membership_policy)?,
            task_assign_policy: TaskAssignPolicy::try_from(value.task_assign_policy)?,
            subtitle_policy: EditPolicy::from_stored("subtitle_policy", value.subtitle_policy)?,
            translate_policy: EditPolicy::from_stored("translate_policy", value.translate_policy)?,
            created_at: value.created_at,
            updated_at: value.updated_at,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct Project {
    pub id: Uuid,
    pub team_id: Uuid,
    pub name: String,
    pub slug: String,
}

impl Project {
    pub fn new(team_id: Uuid, name: impl Into<String>, slug: impl Into<String>) -> Self {
        Self { id: Uuid::new_v4(), team_id, name: name.into(), slug: slug.into() }
    }

    pub fn default_for(team_id: Uuid) -> Self {
        Self::new(team_id, "Default", DEFAULT_PROJECT_SLUG)
    }

    pub fn is_default_project(&self) -> bool {
        self.slug == DEFAULT_PROJECT_SLUG
    }
}

impl Loggable for Project {
    fn entity_type() -> &'static str { "project" }
    fn subject_id(&self) -> Uuid { self.id }
}

/// Review/approve configuration for a team or one of its projects.
///
/// `*_enabled` switches the stage on at all; `*_allowed` is the role threshold
/// for performing it. They are stored separately.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct Workflow {
    pub team_id: Uuid,
    pub project_id: Option<Uuid>,
    pub review_enabled: bool,
    pub review_allowed: ReviewPolicy,
    pub approve_enabled: bool,
    pub approve_allowed: ApprovePolicy,
}

impl Workflow {
    /// Used when neither the project nor the team stored a workflow.
    pub fn disabled(team_id: Uuid) -> Self {
        Self {
            team_id,
            project_id: None,
            review_enabled: false,
            review_allowed: ReviewPolicy::Disabled,
            approve_enabled: false,
            approve_allowed: ApprovePolicy::Disabled,
        }
    }

    pub fn with_review(mut self, allowed: ReviewPolicy) -> Self {
        self.review_enabled = allowed != ReviewPolicy::Disabled;
        self.review_allowed = allowed;
        self
    }

    pub fn with_approve(mut self, allowed: ApprovePolicy) -> Self {
        self.approve_enabled = allowed != ApprovePolicy::Disabled;
        self.approve_allowed = allowed;
        self
    }

    /// An enabled stage without a threshold has no role that could perform it.
    pub fn validate(&self) -> Result<(), AppError> {
        if self.review_enabled && self.review_allowed == ReviewPolicy::Disabled {
            return Err(AppError::configuration("review is enabled without a review_allowed threshold"));
        }
        if self.approve_enabled && self.approve_allowed == ApprovePolicy::Disabled {
            return Err(AppError::configuration("approve is enabled without an approve_allowed threshold"));
        }
        Ok(())
    }
}

impl Loggable for Workflow {
    fn entity_type() -> &'static str { "workflow" }
    fn subject_id(&self) -> Uuid { self.project_id.unwrap_or(self.team_id) }
}

#[derive(Debug, Clone)]
pub struct DbWorkflow {
    pub team_id: Uuid,
    pub project_id: Option<Uuid>,
    pub review_enabled: bool,
    pub review_allowed: i64,
    pub approve_enabled: bool,
    pub approve_allowed: i64,
}

impl TryFrom<DbWorkflow> for Workflow {
    type Error = AppError;

    fn try_from(value: DbWorkflow) -> Result<Self, Self::Error> {
        let workflow = Workflow {
            team_id: value.team_id,
            project_id: value.project_id,
            review_enabled: value.review_enabled,
            review_allowed: ReviewPolicy::try_from(value.review_allowed)?,
            approve_enabled: value.approve_enabled,
            approve_allowed: ApprovePolicy::try_from(value.approve_allowed)?,
        };
        workflow.validate()?;
        Ok(workflow)
    }
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct TeamCreateRequest {
    #[schema(example = "Volunteer Translators")]
    pub name: String,
    #[schema(example = "volunteers")]
    pub slug: String,
}

/// Any omitted field keeps its current value. Renaming needs the owner role.
#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct TeamSettingsRequest {
    pub name: Option<String>,
    pub video_policy: Option<VideoPolicy>,
    pub membership_policy: Option<MembershipPolicy>,
    pub task_assign_policy: Option<TaskAssignPolicy>,
    pub subtitle_policy: Option<EditPolicy>,
    pub translate_policy: Option<EditPolicy>,
    /// Languages members may not write subtitles in.
    pub blocked_languages: Option<Vec<String>>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct WorkflowRequest {
    pub project_id: Option<Uuid>,
    pub review_enabled: bool,
    pub review_allowed: ReviewPolicy,
    pub approve_enabled: bool,
    pub approve_allowed: ApprovePolicy,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct ProjectCreateRequest {
    #[schema(example = "Documentaries")]
    pub name: String,
    #[schema(example = "documentaries")]
    pub slug: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct TeamDetail {
    #[serde(flatten)]
    pub team: Team,
    pub projects: Vec<Project>,
    pub workflow: Workflow,
    pub writable_languages: Vec<String>,
}

/// What the caller may do in a team, for showing or hiding UI affordances.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct PermissionFlags {
    pub team_id: Uuid,
    pub user_id: Uuid,
    pub base_role: Role,
    /// Role after narrowings for the requested project and language.
    pub effective_role: Role,
    pub can_join: bool,
    pub can_rename_team: bool,
    pub can_view_settings_tab: bool,
    pub can_change_team_settings: bool,
    pub can_message_all_members: bool,
    pub can_view_tasks_tab: bool,
    pub can_invite: bool,
    pub can_add_video: bool,
    pub can_add_video_somewhere: bool,
    pub can_edit_project: bool,
    pub can_create_tasks: bool,
    pub can_assign_tasks: bool,
    pub can_delete_tasks: bool,
    pub assignable_roles: Vec<Role>,
    pub invitable_roles: Vec<Role>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(video_policy: i64) -> DbTeam {
        let now = Utc::now();
        DbTeam {
            id: Uuid::new_v4(),
            name: "T".into(),
            slug: "t".into(),
            video_policy,
            membership_policy: 4,
            task_assign_policy: 10,
            subtitle_policy: 10,
            translate_policy: 20,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn team_rows_convert_policies() {
        let team = Team::try_from(row(2)).unwrap();
        assert_eq!(team.video_policy, VideoPolicy::Managers);
        assert_eq!(team.translate_policy, EditPolicy::Members);
    }

    #[test]
    fn unknown_policy_fails_the_load() {
        assert!(matches!(Team::try_from(row(7)), Err(AppError::Configuration(_))));
    }

    #[test]
    fn enabled_review_needs_a_threshold() {
        let row = DbWorkflow {
            team_id: Uuid::new_v4(),
            project_id: None,
            review_enabled: true,
            review_allowed: 0,
            approve_enabled: false,
            approve_allowed: 0,
        };
        assert!(Workflow::try_from(row).is_err());
    }

    #[test]
    fn default_project_is_detected_by_slug() {
        let team_id = Uuid::new_v4();
        assert!(Project::default_for(team_id).is_default_project());
        assert!(!Project::new(team_id, "Docs", "docs").is_default_project());
    }
}

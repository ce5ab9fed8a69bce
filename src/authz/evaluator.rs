use super::principal::{Principal, ResourceContext};
use super::Role;
use crate::models::task::{Task, TaskType};
use crate::models::team::{Project, Team, Workflow};
use crate::models::video::TeamVideo;

/// A video together with the team and workflow governing it.
#[derive(Debug, Clone, Copy)]
pub struct VideoScope<'a> {
    pub team: &'a Team,
    pub video: &'a TeamVideo,
    pub workflow: &'a Workflow,
}

impl<'a> VideoScope<'a> {
    pub fn new(team: &'a Team, video: &'a TeamVideo, workflow: &'a Workflow) -> Self {
        Self { team, video, workflow }
    }

    fn role(&self, actor: &Principal, language: Option<&str>) -> Role {
        role_for(self.team, actor, Some(&self.video.project), language)
    }
}

fn role_for(team: &Team, actor: &Principal, project: Option<&Project>, language: Option<&str>) -> Role {
    let ctx = ResourceContext::new()
        .with_optional_project(project.cloned())
        .with_optional_language(language.map(str::to_string));
    actor.role_for(team.id, &ctx)
}

fn team_role(team: &Team, actor: &Principal) -> Role {
    role_for(team, actor, None, None)
}

// Team-wide, fixed-role actions

/// Outsiders may join teams with an open membership policy. Everyone else
/// needs an invitation or an application.
pub fn can_join_team(team: &Team, actor: &Principal) -> bool {
    team_role(team, actor) == Role::Outsider
        && team.membership_policy == crate::authz::policy::MembershipPolicy::Open
}

pub fn can_rename_team(team: &Team, actor: &Principal) -> bool {
    team_role(team, actor) == Role::Owner
}

/// Unrestricted admins and owners only.
pub fn can_view_settings_tab(team: &Team, actor: &Principal) -> bool {
    matches!(team_role(team, actor), Role::Admin | Role::Owner)
}

pub fn can_change_team_settings(team: &Team, actor: &Principal) -> bool {
    can_view_settings_tab(team, actor)
}

pub fn can_message_all_members(team: &Team, actor: &Principal) -> bool {
    matches!(team_role(team, actor), Role::Admin | Role::Owner)
}

/// Any membership record, narrowed or not.
pub fn can_view_tasks_tab(team: &Team, actor: &Principal) -> bool {
    actor.team_id == team.id && actor.is_member()
}

pub fn can_invite(team: &Team, actor: &Principal) -> bool {
    team_role(team, actor).is_at_least(team.membership_policy.invite_role())
}

// Videos and projects

pub fn can_add_video(team: &Team, actor: &Principal, project: Option<&Project>) -> bool {
    role_for(team, actor, project, None).is_at_least(team.video_policy.required_role())
}

pub fn can_add_video_somewhere(team: &Team, actor: &Principal, projects: &[Project]) -> bool {
    projects.iter().any(|project| can_add_video(team, actor, Some(project)))
}

pub fn can_remove_video(team: &Team, video: &TeamVideo, actor: &Principal) -> bool {
    can_add_video(team, actor, Some(&video.project))
}

pub fn can_edit_video(team: &Team, video: &TeamVideo, actor: &Principal) -> bool {
    can_add_video(team, actor, Some(&video.project))
}

pub fn can_change_video_settings(team: &Team, video: &TeamVideo, actor: &Principal) -> bool {
    role_for(team, actor, Some(&video.project), None).is_at_least(Role::Manager)
}

/// `None` asks about creating a new project. The default project is never
/// editable.
pub fn can_edit_project(team: &Team, actor: &Principal, project: Option<&Project>) -> bool {
    if project.is_some_and(Project::is_default_project) {
        return false;
    }
    matches!(role_for(team, actor, project, None), Role::Admin | Role::Owner)
}

// Subtitle work

pub fn can_create_and_edit_subtitles(team: &Team, video: &TeamVideo, actor: &Principal, language: Option<&str>) -> bool {
    role_for(team, actor, Some(&video.project), language).is_at_least(team.subtitle_policy.required_role())
}

pub fn can_create_and_edit_translations(team: &Team, video: &TeamVideo, actor: &Principal, language: Option<&str>) -> bool {
    role_for(team, actor, Some(&video.project), language).is_at_least(team.translate_policy.required_role())
}

/// False whenever the workflow has no review threshold at all.
pub fn can_review(scope: VideoScope<'_>, actor: &Principal, language: Option<&str>) -> bool {
    match scope.workflow.review_allowed.required_role() {
        Some(required) => scope.role(actor, language).is_at_least(required),
        None => false,
    }
}

pub fn can_approve(scope: VideoScope<'_>, actor: &Principal, language: Option<&str>) -> bool {
    match scope.workflow.approve_allowed.required_role() {
        Some(required) => scope.role(actor, language).is_at_least(required),
        None => false,
    }
}

// Tasks

pub fn can_assign_tasks(team: &Team, actor: &Principal, project: Option<&Project>, language: Option<&str>) -> bool {
    role_for(team, actor, project, language).is_at_least(team.task_assign_policy.required_role())
}

pub fn can_create_tasks(team: &Team, actor: &Principal, project: Option<&Project>) -> bool {
    can_assign_tasks(team, actor, project, None)
}

/// Same as assigning, except contributors never delete.
pub fn can_delete_tasks(team: &Team, actor: &Principal, project: Option<&Project>, language: Option<&str>) -> bool {
    if role_for(team, actor, project, language) == Role::Contributor {
        return false;
    }
    can_assign_tasks(team, actor, project, language)
}

pub fn can_perform_task_for(scope: VideoScope<'_>, actor: &Principal, task_type: TaskType, language: Option<&str>) -> bool {
    match task_type {
        // subtitle permission is checked without the language
        TaskType::Subtitle => can_create_and_edit_subtitles(scope.team, scope.video, actor, None),
        TaskType::Translate => can_create_and_edit_translations(scope.team, scope.video, actor, language),
        TaskType::Review => can_review(scope, actor, language),
        TaskType::Approve => can_approve(scope, actor, language),
    }
}

pub fn can_perform_task(scope: VideoScope<'_>, actor: &Principal, task: &Task) -> bool {
    can_perform_task_for(scope, actor, task.task_type, Some(&task.language))
}

/// Assigning needs the assignment privilege and the ability to do the task
/// oneself.
pub fn can_assign_task(scope: VideoScope<'_>, actor: &Principal, task: &Task) -> bool {
    can_assign_tasks(scope.team, actor, Some(&scope.video.project), Some(&task.language))
        && can_perform_task(scope, actor, task)
}

pub fn can_delete_task(scope: VideoScope<'_>, actor: &Principal, task: &Task) -> bool {
    can_delete_tasks(scope.team, actor, Some(&scope.video.project), Some(&task.language))
        && can_perform_task(scope, actor, task)
}

/// Everything the request layer may ask the evaluator about.
#[derive(Debug, Clone, Copy)]
pub enum Action<'a> {
    JoinTeam,
    RenameTeam,
    ViewSettingsTab,
    ChangeTeamSettings,
    ViewTasksTab,
    Invite,
    MessageAllMembers,
    AddVideo(Option<&'a Project>),
    AddVideoSomewhere(&'a [Project]),
    EditProject(Option<&'a Project>),
    CreateTasks(Option<&'a Project>),
    AssignTasks(Option<&'a Project>, Option<&'a str>),
    DeleteTasks(Option<&'a Project>, Option<&'a str>),
    RemoveVideo(&'a TeamVideo),
    EditVideo(&'a TeamVideo),
    ChangeVideoSettings(&'a TeamVideo),
    EditSubtitles(&'a TeamVideo, Option<&'a str>),
    EditTranslations(&'a TeamVideo, Option<&'a str>),
    Review(VideoScope<'a>, Option<&'a str>),
    Approve(VideoScope<'a>, Option<&'a str>),
    PerformTask(VideoScope<'a>, &'a Task),
    AssignTask(VideoScope<'a>, &'a Task),
    DeleteTask(VideoScope<'a>, &'a Task),
}

impl Action<'_> {
    pub fn name(&self) -> &'static str {
        match self {
            Action::JoinTeam => "team.join",
            Action::RenameTeam => "team.rename",
            Action::ViewSettingsTab => "team.settings.view",
            Action::ChangeTeamSettings => "team.settings.change",
            Action::ViewTasksTab => "team.tasks.view",
            Action::Invite => "team.invite",
            Action::MessageAllMembers => "team.message_all",
            Action::AddVideo(_) => "video.add",
            Action::AddVideoSomewhere(_) => "video.add_somewhere",
            Action::EditProject(_) => "project.edit",
            Action::CreateTasks(_) => "task.create",
            Action::AssignTasks(..) => "task.assign_any",
            Action::DeleteTasks(..) => "task.delete_any",
            Action::RemoveVideo(_) => "video.remove",
            Action::EditVideo(_) => "video.edit",
            Action::ChangeVideoSettings(_) => "video.settings",
            Action::EditSubtitles(..) => "subtitles.edit",
            Action::EditTranslations(..) => "translations.edit",
            Action::Review(..) => "subtitles.review",
            Action::Approve(..) => "subtitles.approve",
            Action::PerformTask(..) => "task.perform",
            Action::AssignTask(..) => "task.assign",
            Action::DeleteTask(..) => "task.delete",
        }
    }
}

/// Policy evaluator trait for pluggable authorization logic
pub trait PolicyEvaluator: Send + Sync {
    fn can(&self, team: &Team, actor: &Principal, action: &Action<'_>) -> bool;
}

/// Evaluates actions with the team's policy tables and the actor's narrowed
/// role, logging every decision.
#[derive(Debug, Clone, Default)]
pub struct DefaultPolicyEvaluator;

impl DefaultPolicyEvaluator {
    pub fn new() -> Self {
        Self
    }

    fn decide(team: &Team, actor: &Principal, action: &Action<'_>) -> bool {
        match *action {
            Action::JoinTeam => can_join_team(team, actor),
            Action::RenameTeam => can_rename_team(team, actor),
            Action::ViewSettingsTab => can_view_settings_tab(team, actor),
            Action::ChangeTeamSettings => can_change_team_settings(team, actor),
            Action::ViewTasksTab => can_view_tasks_tab(team, actor),
            Action::Invite => can_invite(team, actor),
            Action::MessageAllMembers => can_message_all_members(team, actor),
            Action::AddVideo(project) => can_add_video(team, actor, project),
            Action::AddVideoSomewhere(projects) => can_add_video_somewhere(team, actor, projects),
            Action::EditProject(project) => can_edit_project(team, actor, project),
            Action::CreateTasks(project) => can_create_tasks(team, actor, project),
            Action::AssignTasks(project, language) => can_assign_tasks(team, actor, project, language),
            Action::DeleteTasks(project, language) => can_delete_tasks(team, actor, project, language),
            Action::RemoveVideo(video) => can_remove_video(team, video, actor),
            Action::EditVideo(video) => can_edit_video(team, video, actor),
            Action::ChangeVideoSettings(video) => can_change_video_settings(team, video, actor),
            Action::EditSubtitles(video, language) => can_create_and_edit_subtitles(team, video, actor, language),
            Action::EditTranslations(video, language) => can_create_and_edit_translations(team, video, actor, language),
            Action::Review(scope, language) => can_review(scope, actor, language),
            Action::Approve(scope, language) => can_approve(scope, actor, language),
            Action::PerformTask(scope, task) => can_perform_task(scope, actor, task),
            Action::AssignTask(scope, task) => can_assign_task(scope, actor, task),
            Action::DeleteTask(scope, task) => can_delete_task(scope, actor, task),
        }
    }
}

impl PolicyEvaluator for DefaultPolicyEvaluator {
    fn can(&self, team: &Team, actor: &Principal, action: &Action<'_>) -> bool {
        let allowed = Self::decide(team, actor, action);
        tracing::debug!(
            user_id = %actor.user_id,
            team_id = %team.id,
            base_role = %actor.base_role(),
            action = action.name(),
            allowed,
            "authorization decision"
        );
        allowed
    }
}

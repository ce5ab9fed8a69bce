use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::Json;
use uuid::Uuid;

use crate::app::AppState;
use crate::authz::role::{roles_user_can_assign, roles_user_can_invite};
use crate::authz::{Action, MembershipCache, ResourceContext};
use crate::db::{mutations, teams as queries};
use crate::errors::AppResult;
use crate::events::{log_activity, Activity};
use crate::jwt::AuthUser;
use crate::models::member::TargetQuery;
use crate::models::team::{
    PermissionFlags, Project, ProjectCreateRequest, Team, TeamCreateRequest, TeamDetail, TeamSettingsRequest,
    Workflow, WorkflowRequest,
};
use crate::routes::{principal_for, resource_context};

#[utoipa::path(
    post,
    path = "/teams",
    tag = "Teams",
    request_body = TeamCreateRequest,
    responses(
        (status = 201, description = "Team created; the caller owns it", body = Team),
        (status = 409, description = "Slug already taken")
    ),
    security(("bearerAuth" = []))
)]
pub async fn create_team(
    State(state): State<AppState>,
    auth: AuthUser,
    headers: HeaderMap,
    Json(payload): Json<TeamCreateRequest>,
) -> AppResult<(StatusCode, Json<Team>)> {
    let (team, owner) = mutations::create_team(&state.pool, auth.user_id, &payload).await?;

    log_activity(&state.event_bus, Activity::new("created", auth.user_id, team.id, &team).with_headers(&headers));
    log_activity(&state.event_bus, Activity::new("added", auth.user_id, team.id, &owner));

    Ok((StatusCode::CREATED, Json(team)))
}

#[utoipa::path(
    get,
    path = "/teams/{team_id}",
    tag = "Teams",
    params(("team_id" = Uuid, Path, description = "Team id")),
    responses((status = 200, description = "Team with projects, workflow and writable languages", body = TeamDetail)),
    security(("bearerAuth" = []))
)]
pub async fn get_team(
    State(state): State<AppState>,
    _auth: AuthUser,
    Path(team_id): Path<Uuid>,
) -> AppResult<Json<TeamDetail>> {
    let mut conn = state.pool.acquire().await?;
    let team = queries::fetch_team(&mut conn, team_id).await?;
    let projects = queries::list_projects(&mut conn, team_id).await?;
    let workflow = queries::fetch_workflow_for(&mut conn, team_id, None).await?;
    let writable_languages = queries::writable_languages(&mut conn, team_id).await?;

    Ok(Json(TeamDetail {
        team,
        projects,
        workflow,
        writable_languages: writable_languages.into_iter().collect(),
    }))
}

#[utoipa::path(
    put,
    path = "/teams/{team_id}/settings",
    tag = "Teams",
    params(("team_id" = Uuid, Path, description = "Team id")),
    request_body = TeamSettingsRequest,
    responses(
        (status = 200, description = "Settings saved", body = Team),
        (status = 403, description = "Caller is not an unrestricted admin or owner")
    ),
    security(("bearerAuth" = []))
)]
pub async fn update_settings(
    State(state): State<AppState>,
    auth: AuthUser,
    headers: HeaderMap,
    Path(team_id): Path<Uuid>,
    Json(payload): Json<TeamSettingsRequest>,
) -> AppResult<Json<Team>> {
    let actor = state.actor(auth.user_id);
    let (old, team) = mutations::update_team_settings(&state.pool, &actor, team_id, &payload).await?;

    log_activity(
        &state.event_bus,
        Activity::new("updated", auth.user_id, team_id, &team).replacing(&old).with_headers(&headers),
    );

    Ok(Json(team))
}

#[utoipa::path(
    put,
    path = "/teams/{team_id}/workflow",
    tag = "Teams",
    params(("team_id" = Uuid, Path, description = "Team id")),
    request_body = WorkflowRequest,
    responses(
        (status = 200, description = "Workflow saved", body = Workflow),
        (status = 400, description = "A stage is enabled without a threshold")
    ),
    security(("bearerAuth" = []))
)]
pub async fn update_workflow(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(team_id): Path<Uuid>,
    Json(payload): Json<WorkflowRequest>,
) -> AppResult<Json<Workflow>> {
    let actor = state.actor(auth.user_id);
    let workflow = mutations::upsert_workflow(&state.pool, &actor, team_id, &payload).await?;

    log_activity(&state.event_bus, Activity::new("updated", auth.user_id, team_id, &workflow));

    Ok(Json(workflow))
}

#[utoipa::path(
    post,
    path = "/teams/{team_id}/projects",
    tag = "Teams",
    params(("team_id" = Uuid, Path, description = "Team id")),
    request_body = ProjectCreateRequest,
    responses((status = 201, description = "Project created", body = Project)),
    security(("bearerAuth" = []))
)]
pub async fn create_project(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(team_id): Path<Uuid>,
    Json(payload): Json<ProjectCreateRequest>,
) -> AppResult<(StatusCode, Json<Project>)> {
    let actor = state.actor(auth.user_id);
    let project = mutations::create_project(&state.pool, &actor, team_id, &payload).await?;

    log_activity(&state.event_bus, Activity::new("created", auth.user_id, team_id, &project));

    Ok((StatusCode::CREATED, Json(project)))
}

#[utoipa::path(
    get,
    path = "/teams/{team_id}/permissions",
    tag = "Teams",
    params(("team_id" = Uuid, Path, description = "Team id"), TargetQuery),
    responses((status = 200, description = "Caller's permission flags", body = PermissionFlags)),
    security(("bearerAuth" = []))
)]
pub async fn permissions(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(team_id): Path<Uuid>,
    Query(target): Query<TargetQuery>,
) -> AppResult<Json<PermissionFlags>> {
    let mut conn = state.pool.acquire().await?;
    let team = queries::fetch_team(&mut conn, team_id).await?;
    let projects = queries::list_projects(&mut conn, team_id).await?;
    let ctx = resource_context(&mut conn, team_id, &target).await?;
    drop(conn);

    let store = state.store();
    let mut cache = MembershipCache::new(&store);
    let actor = principal_for(&mut cache, team_id, auth.user_id).await?;

    let evaluator = state.evaluator.as_ref();
    let project = ctx.project.as_ref();
    let language = ctx.language.as_deref();
    let can = |action: Action<'_>| evaluator.can(&team, &actor, &action);
    let team_role = actor.role_for(team_id, &ResourceContext::new());

    Ok(Json(PermissionFlags {
        team_id,
        user_id: auth.user_id,
        base_role: actor.base_role(),
        effective_role: actor.role_for(team_id, &ctx),
        can_join: can(Action::JoinTeam),
        can_rename_team: can(Action::RenameTeam),
        can_view_settings_tab: can(Action::ViewSettingsTab),
        can_change_team_settings: can(Action::ChangeTeamSettings),
        can_message_all_members: can(Action::MessageAllMembers),
        can_view_tasks_tab: can(Action::ViewTasksTab),
        can_invite: can(Action::Invite),
        can_add_video: can(Action::AddVideo(project)),
        can_add_video_somewhere: can(Action::AddVideoSomewhere(&projects)),
        can_edit_project: can(Action::EditProject(project)),
        can_create_tasks: can(Action::CreateTasks(project)),
        can_assign_tasks: can(Action::AssignTasks(project, language)),
        can_delete_tasks: can(Action::DeleteTasks(project, language)),
        assignable_roles: roles_user_can_assign(team_role, None),
        invitable_roles: if can(Action::Invite) { roles_user_can_invite(team_role) } else { Vec::new() },
    }))
}

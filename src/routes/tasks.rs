use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use uuid::Uuid;

use crate::app::AppState;
use crate::authz::{EligibleTasks, MembershipCache};
use crate::db::{mutations, teams as queries};
use crate::errors::AppResult;
use crate::events::{log_activity, Activity};
use crate::jwt::AuthUser;
use crate::models::task::{Task, TaskAssignRequest, TaskCompleteRequest, TaskCreateRequest};
use crate::routes::principal_for;

#[utoipa::path(
    get,
    path = "/teams/{team_id}/videos/{video_id}/eligible-tasks",
    tag = "Tasks",
    params(
        ("team_id" = Uuid, Path, description = "Team id"),
        ("video_id" = Uuid, Path, description = "Team video id")
    ),
    responses((status = 200, description = "Tasks the caller could create on this video right now", body = EligibleTasks)),
    security(("bearerAuth" = []))
)]
pub async fn eligible_tasks(
    State(state): State<AppState>,
    auth: AuthUser,
    Path((team_id, video_id)): Path<(Uuid, Uuid)>,
) -> AppResult<Json<EligibleTasks>> {
    let mut conn = state.pool.acquire().await?;
    let loaded = queries::load_video(&mut conn, team_id, video_id).await?;
    drop(conn);

    let store = state.store();
    let mut cache = MembershipCache::new(&store);
    let caller = principal_for(&mut cache, team_id, auth.user_id).await?;

    Ok(Json(EligibleTasks::compute(&loaded.context(), Some(&caller))))
}

#[utoipa::path(
    post,
    path = "/teams/{team_id}/videos/{video_id}/tasks",
    tag = "Tasks",
    params(
        ("team_id" = Uuid, Path, description = "Team id"),
        ("video_id" = Uuid, Path, description = "Team video id")
    ),
    request_body = TaskCreateRequest,
    responses(
        (status = 201, description = "Task created", body = Task),
        (status = 403, description = "Caller may not create this task"),
        (status = 409, description = "The language is no longer eligible for this task type")
    ),
    security(("bearerAuth" = []))
)]
pub async fn create_task(
    State(state): State<AppState>,
    auth: AuthUser,
    Path((team_id, video_id)): Path<(Uuid, Uuid)>,
    Json(payload): Json<TaskCreateRequest>,
) -> AppResult<(StatusCode, Json<Task>)> {
    let actor = state.actor(auth.user_id);
    let task = mutations::insert_task(
        &state.pool,
        &actor,
        team_id,
        video_id,
        payload.task_type,
        &payload.language,
        payload.assignee,
    )
    .await?;

    log_activity(&state.event_bus, Activity::new("created", auth.user_id, team_id, &task));

    Ok((StatusCode::CREATED, Json(task)))
}

#[utoipa::path(
    put,
    path = "/teams/{team_id}/tasks/{task_id}/assign",
    tag = "Tasks",
    params(
        ("team_id" = Uuid, Path, description = "Team id"),
        ("task_id" = Uuid, Path, description = "Task id")
    ),
    request_body = TaskAssignRequest,
    responses(
        (status = 200, description = "Assignee changed", body = Task),
        (status = 409, description = "Task already completed")
    ),
    security(("bearerAuth" = []))
)]
pub async fn assign_task(
    State(state): State<AppState>,
    auth: AuthUser,
    Path((team_id, task_id)): Path<(Uuid, Uuid)>,
    Json(payload): Json<TaskAssignRequest>,
) -> AppResult<Json<Task>> {
    let actor = state.actor(auth.user_id);
    let (old, task) = mutations::assign_task(&state.pool, &actor, team_id, task_id, payload.assignee).await?;

    log_activity(
        &state.event_bus,
        Activity::new("assigned", auth.user_id, team_id, &task).replacing(&old),
    );

    Ok(Json(task))
}

#[utoipa::path(
    post,
    path = "/teams/{team_id}/tasks/{task_id}/complete",
    tag = "Tasks",
    params(
        ("team_id" = Uuid, Path, description = "Team id"),
        ("task_id" = Uuid, Path, description = "Task id")
    ),
    request_body = TaskCompleteRequest,
    responses(
        (status = 200, description = "Task completed", body = Task),
        (status = 400, description = "Missing or unexpected review outcome"),
        (status = 409, description = "Task already completed")
    ),
    security(("bearerAuth" = []))
)]
pub async fn complete_task(
    State(state): State<AppState>,
    auth: AuthUser,
    Path((team_id, task_id)): Path<(Uuid, Uuid)>,
    Json(payload): Json<TaskCompleteRequest>,
) -> AppResult<Json<Task>> {
    let actor = state.actor(auth.user_id);
    let task = mutations::complete_task(&state.pool, &actor, team_id, task_id, payload.review_outcome).await?;

    log_activity(&state.event_bus, Activity::new("completed", auth.user_id, team_id, &task));

    Ok(Json(task))
}

#[utoipa::path(
    delete,
    path = "/teams/{team_id}/tasks/{task_id}",
    tag = "Tasks",
    params(
        ("team_id" = Uuid, Path, description = "Team id"),
        ("task_id" = Uuid, Path, description = "Task id")
    ),
    responses((status = 204, description = "Task deleted")),
    security(("bearerAuth" = []))
)]
pub async fn delete_task(
    State(state): State<AppState>,
    auth: AuthUser,
    Path((team_id, task_id)): Path<(Uuid, Uuid)>,
) -> AppResult<StatusCode> {
    let actor = state.actor(auth.user_id);
    let task = mutations::delete_task(&state.pool, &actor, team_id, task_id).await?;

    log_activity(&state.event_bus, Activity::new("deleted", auth.user_id, team_id, &task));

    Ok(StatusCode::NO_CONTENT)
}

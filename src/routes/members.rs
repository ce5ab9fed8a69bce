use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::Json;
use uuid::Uuid;

use crate::app::AppState;
use crate::authz::MembershipCache;
use crate::db::{mutations, teams as queries};
use crate::errors::{AppError, AppResult};
use crate::events::{log_activity, Activity};
use crate::jwt::AuthUser;
use crate::models::member::{
    EffectiveRoleResponse, MemberAddRequest, Membership, NarrowingScope, RoleChangeRequest, TargetQuery,
};
use crate::routes::{principal_for, resource_context};

#[utoipa::path(
    post,
    path = "/teams/{team_id}/join",
    tag = "Members",
    params(("team_id" = Uuid, Path, description = "Team id")),
    responses(
        (status = 201, description = "Joined as a contributor", body = Membership),
        (status = 403, description = "The team does not accept open joins"),
        (status = 409, description = "Already a member")
    ),
    security(("bearerAuth" = []))
)]
pub async fn join_team(
    State(state): State<AppState>,
    auth: AuthUser,
    headers: HeaderMap,
    Path(team_id): Path<Uuid>,
) -> AppResult<(StatusCode, Json<Membership>)> {
    let actor = state.actor(auth.user_id);
    let member = mutations::join_team(&state.pool, &actor, team_id).await?;

    log_activity(
        &state.event_bus,
        Activity::new("joined", auth.user_id, team_id, &member).with_headers(&headers),
    );

    Ok((StatusCode::CREATED, Json(member)))
}

#[utoipa::path(
    post,
    path = "/teams/{team_id}/members",
    tag = "Members",
    params(("team_id" = Uuid, Path, description = "Team id")),
    request_body = MemberAddRequest,
    responses(
        (status = 201, description = "Member added", body = Membership),
        (status = 403, description = "Caller may not invite with this role"),
        (status = 409, description = "User is already a member")
    ),
    security(("bearerAuth" = []))
)]
pub async fn add_member(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(team_id): Path<Uuid>,
    Json(payload): Json<MemberAddRequest>,
) -> AppResult<(StatusCode, Json<Membership>)> {
    let narrowing = match (payload.project_id, payload.language) {
        (Some(_), Some(_)) => {
            return Err(AppError::bad_request("a narrowing names a project or a language, not both"))
        }
        (Some(project_id), None) => Some(NarrowingScope::Project(project_id)),
        (None, Some(language)) => Some(NarrowingScope::Language(language)),
        (None, None) => None,
    };

    let actor = state.actor(auth.user_id);
    let member = mutations::invite_member(&state.pool, &actor, team_id, payload.user_id, payload.role, narrowing).await?;

    log_activity(&state.event_bus, Activity::new("added", auth.user_id, team_id, &member));

    Ok((StatusCode::CREATED, Json(member)))
}

#[utoipa::path(
    put,
    path = "/teams/{team_id}/members/{user_id}/role",
    tag = "Members",
    params(
        ("team_id" = Uuid, Path, description = "Team id"),
        ("user_id" = Uuid, Path, description = "Member's user id")
    ),
    request_body = RoleChangeRequest,
    responses(
        (status = 200, description = "Role and narrowings replaced", body = Membership),
        (status = 400, description = "Narrowings do not suit the role"),
        (status = 403, description = "Caller may not assign this role")
    ),
    security(("bearerAuth" = []))
)]
pub async fn save_role(
    State(state): State<AppState>,
    auth: AuthUser,
    headers: HeaderMap,
    Path((team_id, user_id)): Path<(Uuid, Uuid)>,
    Json(payload): Json<RoleChangeRequest>,
) -> AppResult<Json<Membership>> {
    let store = state.store();
    let mut cache = MembershipCache::new(&store);
    if cache.get(team_id, user_id).await?.is_none() {
        return Err(AppError::not_found("Member not found"));
    }

    let actor = state.actor(auth.user_id);
    let (old, _) = mutations::save_role(
        &state.pool,
        &actor,
        team_id,
        user_id,
        payload.role,
        &payload.projects,
        &payload.languages,
    )
    .await?;

    cache.invalidate(team_id, user_id);
    let member = cache
        .get(team_id, user_id)
        .await?
        .ok_or_else(|| AppError::not_found("Member not found"))?;

    log_activity(
        &state.event_bus,
        Activity::new("role_changed", auth.user_id, team_id, &member)
            .replacing(&old)
            .with_headers(&headers),
    );

    Ok(Json(member))
}

#[utoipa::path(
    delete,
    path = "/teams/{team_id}/members/{user_id}",
    tag = "Members",
    params(
        ("team_id" = Uuid, Path, description = "Team id"),
        ("user_id" = Uuid, Path, description = "Member's user id")
    ),
    responses((status = 204, description = "Member removed")),
    security(("bearerAuth" = []))
)]
pub async fn remove_member(
    State(state): State<AppState>,
    auth: AuthUser,
    headers: HeaderMap,
    Path((team_id, user_id)): Path<(Uuid, Uuid)>,
) -> AppResult<StatusCode> {
    let actor = state.actor(auth.user_id);
    let member = mutations::remove_member(&state.pool, &actor, team_id, user_id).await?;

    log_activity(
        &state.event_bus,
        Activity::new("removed", auth.user_id, team_id, &member).with_headers(&headers),
    );

    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    get,
    path = "/teams/{team_id}/members/{user_id}/role",
    tag = "Members",
    params(
        ("team_id" = Uuid, Path, description = "Team id"),
        ("user_id" = Uuid, Path, description = "User id"),
        TargetQuery
    ),
    responses(
        (status = 200, description = "Base and effective role for the target", body = EffectiveRoleResponse),
        (status = 403, description = "Caller is neither a member nor the user asked about")
    ),
    security(("bearerAuth" = []))
)]
pub async fn effective_role(
    State(state): State<AppState>,
    auth: AuthUser,
    Path((team_id, user_id)): Path<(Uuid, Uuid)>,
    Query(target): Query<TargetQuery>,
) -> AppResult<Json<EffectiveRoleResponse>> {
    let mut conn = state.pool.acquire().await?;
    queries::fetch_team(&mut conn, team_id).await?;
    let ctx = resource_context(&mut conn, team_id, &target).await?;
    drop(conn);

    let store = state.store();
    let mut cache = MembershipCache::new(&store);

    if auth.user_id != user_id {
        let caller = principal_for(&mut cache, team_id, auth.user_id).await?;
        if !caller.is_member() {
            return Err(AppError::forbidden("only team members can look up roles"));
        }
    }

    let subject = principal_for(&mut cache, team_id, user_id).await?;

    Ok(Json(EffectiveRoleResponse {
        team_id,
        user_id,
        base_role: subject.base_role(),
        effective_role: subject.role_for(team_id, &ctx),
        project_id: target.project_id,
        language: target.language,
    }))
}

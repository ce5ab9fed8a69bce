use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::Json;
use uuid::Uuid;

use crate::app::AppState;
use crate::db::mutations;
use crate::errors::AppResult;
use crate::events::{log_activity, Activity};
use crate::jwt::AuthUser;
use crate::models::video::{SubtitleLanguage, SubtitleLanguageRequest, TeamVideo, VideoCreateRequest};

#[utoipa::path(
    post,
    path = "/teams/{team_id}/videos",
    tag = "Videos",
    params(("team_id" = Uuid, Path, description = "Team id")),
    request_body = VideoCreateRequest,
    responses(
        (status = 201, description = "Video added to the team", body = TeamVideo),
        (status = 403, description = "Video policy does not allow the caller to add here")
    ),
    security(("bearerAuth" = []))
)]
pub async fn create_video(
    State(state): State<AppState>,
    auth: AuthUser,
    headers: HeaderMap,
    Path(team_id): Path<Uuid>,
    Json(payload): Json<VideoCreateRequest>,
) -> AppResult<(StatusCode, Json<TeamVideo>)> {
    let actor = state.actor(auth.user_id);
    let video = mutations::create_video(&state.pool, &actor, team_id, &payload).await?;

    log_activity(
        &state.event_bus,
        Activity::new("created", auth.user_id, team_id, &video).with_headers(&headers),
    );

    Ok((StatusCode::CREATED, Json(video)))
}

#[utoipa::path(
    delete,
    path = "/teams/{team_id}/videos/{video_id}",
    tag = "Videos",
    params(
        ("team_id" = Uuid, Path, description = "Team id"),
        ("video_id" = Uuid, Path, description = "Team video id")
    ),
    responses((status = 204, description = "Video removed with its tasks")),
    security(("bearerAuth" = []))
)]
pub async fn delete_video(
    State(state): State<AppState>,
    auth: AuthUser,
    headers: HeaderMap,
    Path((team_id, video_id)): Path<(Uuid, Uuid)>,
) -> AppResult<StatusCode> {
    let actor = state.actor(auth.user_id);
    let video = mutations::delete_video(&state.pool, &actor, team_id, video_id).await?;

    log_activity(
        &state.event_bus,
        Activity::new("deleted", auth.user_id, team_id, &video).with_headers(&headers),
    );

    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    put,
    path = "/teams/{team_id}/videos/{video_id}/languages/{language}",
    tag = "Videos",
    params(
        ("team_id" = Uuid, Path, description = "Team id"),
        ("video_id" = Uuid, Path, description = "Team video id"),
        ("language" = String, Path, description = "Language code", example = "en")
    ),
    request_body = SubtitleLanguageRequest,
    responses(
        (status = 200, description = "Subtitle language state saved", body = SubtitleLanguage),
        (status = 400, description = "Unsupported or blocked language")
    ),
    security(("bearerAuth" = []))
)]
pub async fn update_language(
    State(state): State<AppState>,
    auth: AuthUser,
    Path((team_id, video_id, language)): Path<(Uuid, Uuid, String)>,
    Json(payload): Json<SubtitleLanguageRequest>,
) -> AppResult<Json<SubtitleLanguage>> {
    let actor = state.actor(auth.user_id);
    let state_row =
        mutations::upsert_subtitle_language(&state.pool, &actor, team_id, video_id, &language, payload.complete)
            .await?;

    log_activity(&state.event_bus, Activity::new("updated", auth.user_id, team_id, &state_row));

    Ok(Json(state_row))
}

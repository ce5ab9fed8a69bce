//! Reads over a single connection, usable both on a pooled connection and
//! inside a transaction (`&mut *tx`).

use std::collections::BTreeSet;

use sqlx::SqliteConnection;
use uuid::Uuid;

use crate::authz::{VideoContext, VideoScope, VideoSnapshot};
use crate::db::row_parsers::{
    db_membership_from_row, db_narrowing_from_row, db_task_from_row, db_team_from_row, db_team_video_from_row,
    db_workflow_from_row, project_from_row, subtitle_language_from_row,
};
use crate::errors::{AppError, AppResult};
use crate::models::language;
use crate::models::member::Membership;
use crate::models::task::Task;
use crate::models::team::{Project, Team, Workflow, DEFAULT_PROJECT_SLUG};
use crate::models::video::{SubtitleLanguage, TeamVideo};

const TEAM_COLUMNS: &str = "id, name, slug, video_policy, membership_policy, task_assign_policy, subtitle_policy, translate_policy, created_at, updated_at";
const TASK_COLUMNS: &str = "id, team_id, team_video_id, task_type, language, assignee, review_outcome, completed_at, deleted, created_at, updated_at";

pub async fn fetch_team(conn: &mut SqliteConnection, team_id: Uuid) -> AppResult<Team> {
    let row = sqlx::query(&format!("SELECT {TEAM_COLUMNS} FROM teams WHERE id = ?"))
        .bind(team_id.to_string())
        .fetch_optional(&mut *conn)
        .await?
        .ok_or_else(|| AppError::not_found("Team not found"))?;

    db_team_from_row(&row)?.try_into()
}

pub async fn fetch_project(conn: &mut SqliteConnection, team_id: Uuid, project_id: Uuid) -> AppResult<Project> {
    let row = sqlx::query("SELECT id, team_id, name, slug FROM projects WHERE id = ? AND team_id = ?")
        .bind(project_id.to_string())
        .bind(team_id.to_string())
        .fetch_optional(&mut *conn)
        .await?
        .ok_or_else(|| AppError::not_found("Project not found"))?;

    project_from_row(&row)
}

pub async fn list_projects(conn: &mut SqliteConnection, team_id: Uuid) -> AppResult<Vec<Project>> {
    let rows = sqlx::query("SELECT id, team_id, name, slug FROM projects WHERE team_id = ? ORDER BY created_at, slug")
        .bind(team_id.to_string())
        .fetch_all(&mut *conn)
        .await?;

    rows.iter().map(project_from_row).collect()
}

pub async fn default_project(conn: &mut SqliteConnection, team_id: Uuid) -> AppResult<Project> {
    let row = sqlx::query("SELECT id, team_id, name, slug FROM projects WHERE team_id = ? AND slug = ?")
        .bind(team_id.to_string())
        .bind(DEFAULT_PROJECT_SLUG)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or_else(|| AppError::internal(format!("team {team_id} has no default project")))?;

    project_from_row(&row)
}

/// Membership of `user_id` in `team_id` with all of its narrowings.
pub async fn fetch_membership(
    conn: &mut SqliteConnection,
    team_id: Uuid,
    user_id: Uuid,
) -> AppResult<Option<Membership>> {
    let row = sqlx::query("SELECT id, team_id, user_id, role, created_at FROM team_members WHERE team_id = ? AND user_id = ?")
        .bind(team_id.to_string())
        .bind(user_id.to_string())
        .fetch_optional(&mut *conn)
        .await?;

    let Some(row) = row else {
        return Ok(None);
    };
    let member = db_membership_from_row(&row)?;

    let narrowings = sqlx::query(
        "SELECT id, project_id, language, added_by FROM membership_narrowings WHERE member_id = ? ORDER BY created_at, id",
    )
    .bind(member.id.to_string())
    .fetch_all(&mut *conn)
    .await?
    .iter()
    .map(db_narrowing_from_row)
    .collect::<Result<Vec<_>, _>>()?;

    member.into_membership(narrowings).map(Some)
}

async fn stored_workflow(
    conn: &mut SqliteConnection,
    team_id: Uuid,
    project_id: Option<Uuid>,
) -> AppResult<Option<Workflow>> {
    let row = sqlx::query(
        "SELECT team_id, project_id, review_enabled, review_allowed, approve_enabled, approve_allowed
         FROM workflows WHERE team_id = ? AND IFNULL(project_id, '') = ?",
    )
    .bind(team_id.to_string())
    .bind(project_id.map(|id| id.to_string()).unwrap_or_default())
    .fetch_optional(&mut *conn)
    .await?;

    row.map(|row| Workflow::try_from(db_workflow_from_row(&row)?)).transpose()
}

/// Project workflow, else the team workflow, else everything disabled.
pub async fn fetch_workflow_for(
    conn: &mut SqliteConnection,
    team_id: Uuid,
    project_id: Option<Uuid>,
) -> AppResult<Workflow> {
    if let Some(project_id) = project_id {
        if let Some(workflow) = stored_workflow(conn, team_id, Some(project_id)).await? {
            return Ok(workflow);
        }
    }

    Ok(stored_workflow(conn, team_id, None)
        .await?
        .unwrap_or_else(|| Workflow::disabled(team_id)))
}

pub async fn blocked_languages(conn: &mut SqliteConnection, team_id: Uuid) -> AppResult<Vec<String>> {
    let langs: Vec<String> = sqlx::query_scalar(
        "SELECT language FROM team_language_preferences WHERE team_id = ? AND allow_writes = 0 ORDER BY language",
    )
    .bind(team_id.to_string())
    .fetch_all(&mut *conn)
    .await?;

    Ok(langs)
}

pub async fn writable_languages(conn: &mut SqliteConnection, team_id: Uuid) -> AppResult<BTreeSet<String>> {
    let blocked = blocked_languages(conn, team_id).await?;
    Ok(language::writable_languages(blocked.iter().map(String::as_str)))
}

pub async fn fetch_video(conn: &mut SqliteConnection, team_id: Uuid, video_id: Uuid) -> AppResult<TeamVideo> {
    let row = sqlx::query(
        "SELECT id, team_id, project_id, title, video_url, added_by, created_at FROM team_videos WHERE id = ? AND team_id = ?",
    )
    .bind(video_id.to_string())
    .bind(team_id.to_string())
    .fetch_optional(&mut *conn)
    .await?
    .ok_or_else(|| AppError::not_found("Video not found"))?;

    let video = db_team_video_from_row(&row)?;
    let project = fetch_project(conn, team_id, video.project_id).await?;
    Ok(video.with_project(project))
}

pub async fn subtitle_languages(conn: &mut SqliteConnection, video_id: Uuid) -> AppResult<Vec<SubtitleLanguage>> {
    let rows = sqlx::query(
        "SELECT team_video_id, language, complete, updated_at FROM subtitle_languages WHERE team_video_id = ? ORDER BY language",
    )
    .bind(video_id.to_string())
    .fetch_all(&mut *conn)
    .await?;

    rows.iter().map(subtitle_language_from_row).collect()
}

pub async fn video_tasks(conn: &mut SqliteConnection, video_id: Uuid) -> AppResult<Vec<Task>> {
    let rows = sqlx::query(&format!(
        "SELECT {TASK_COLUMNS} FROM tasks WHERE team_video_id = ? ORDER BY created_at, id"
    ))
    .bind(video_id.to_string())
    .fetch_all(&mut *conn)
    .await?;

    rows.iter()
        .map(|row| Task::try_from(db_task_from_row(row)?))
        .collect()
}

/// Subtitle and task state of a video. Deleted tasks are included; the
/// eligibility queries skip them.
pub async fn video_snapshot(conn: &mut SqliteConnection, video_id: Uuid) -> AppResult<VideoSnapshot> {
    let languages = subtitle_languages(conn, video_id).await?;
    let tasks = video_tasks(conn, video_id).await?;

    Ok(VideoSnapshot {
        started_languages: languages.iter().map(|l| l.language.clone()).collect(),
        completed_languages: languages
            .iter()
            .filter(|l| l.complete)
            .map(|l| l.language.clone())
            .collect(),
        tasks,
    })
}

pub async fn fetch_task(conn: &mut SqliteConnection, team_id: Uuid, task_id: Uuid) -> AppResult<Task> {
    let row = sqlx::query(&format!(
        "SELECT {TASK_COLUMNS} FROM tasks WHERE id = ? AND team_id = ? AND deleted = 0"
    ))
    .bind(task_id.to_string())
    .bind(team_id.to_string())
    .fetch_optional(&mut *conn)
    .await?
    .ok_or_else(|| AppError::not_found("Task not found"))?;

    db_task_from_row(&row)?.try_into()
}

/// A team video with everything needed to evaluate permissions and
/// eligibility on it.
#[derive(Debug, Clone)]
pub struct LoadedVideo {
    pub team: Team,
    pub video: TeamVideo,
    pub workflow: Workflow,
    pub writable_languages: BTreeSet<String>,
    pub snapshot: VideoSnapshot,
}

impl LoadedVideo {
    pub fn scope(&self) -> VideoScope<'_> {
        VideoScope::new(&self.team, &self.video, &self.workflow)
    }

    pub fn context(&self) -> VideoContext<'_> {
        VideoContext::new(self.scope(), &self.writable_languages, &self.snapshot)
    }
}

pub async fn load_video(conn: &mut SqliteConnection, team_id: Uuid, video_id: Uuid) -> AppResult<LoadedVideo> {
    let team = fetch_team(conn, team_id).await?;
    let video = fetch_video(conn, team_id, video_id).await?;
    let workflow = fetch_workflow_for(conn, team_id, Some(video.project.id)).await?;
    let writable_languages = writable_languages(conn, team_id).await?;
    let snapshot = video_snapshot(conn, video_id).await?;

    Ok(LoadedVideo { team, video, workflow, writable_languages, snapshot })
}

//! Row to struct conversion for rows that store UUIDs and timestamps as TEXT.

use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::Row;
use uuid::Uuid;

use crate::errors::AppError;
use crate::models::member::{DbMembership, DbNarrowing};
use crate::models::task::DbTask;
use crate::models::team::{DbTeam, DbWorkflow, Project};
use crate::models::video::{DbTeamVideo, SubtitleLanguage};

pub fn parse_datetime(s: &str) -> Result<DateTime<Utc>, AppError> {
    let s = s.trim();

    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Ok(dt.with_timezone(&Utc));
    }

    // SQLite's own "YYYY-MM-DD HH:MM:SS[.fff]" and sqlx's "+00:00" suffixed form
    if let Ok(naive) = NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f") {
        return Ok(Utc.from_utc_datetime(&naive));
    }
    if let Ok(dt) = DateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f%:z") {
        return Ok(dt.with_timezone(&Utc));
    }

    if let Ok(date) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        let ndt = date
            .and_hms_opt(0, 0, 0)
            .ok_or_else(|| AppError::internal("invalid datetime: date out of range"))?;
        return Ok(Utc.from_utc_datetime(&ndt));
    }

    Err(AppError::internal(format!("invalid datetime: {s}")))
}

fn text(row: &SqliteRow, col: &str) -> Result<String, AppError> {
    row.try_get(col).map_err(|e| AppError::internal(format!("missing {col}: {e}")))
}

fn opt_text(row: &SqliteRow, col: &str) -> Result<Option<String>, AppError> {
    row.try_get(col).map_err(|e| AppError::internal(format!("missing {col}: {e}")))
}

fn int(row: &SqliteRow, col: &str) -> Result<i64, AppError> {
    row.try_get(col).map_err(|e| AppError::internal(format!("missing {col}: {e}")))
}

fn flag(row: &SqliteRow, col: &str) -> Result<bool, AppError> {
    Ok(int(row, col)? != 0)
}

fn uuid(row: &SqliteRow, col: &str) -> Result<Uuid, AppError> {
    let raw = text(row, col)?;
    Uuid::parse_str(&raw).map_err(|e| AppError::internal(format!("invalid uuid in {col}: {e}")))
}

fn opt_uuid(row: &SqliteRow, col: &str) -> Result<Option<Uuid>, AppError> {
    match opt_text(row, col)? {
        Some(raw) if !raw.trim().is_empty() => Uuid::parse_str(&raw)
            .map(Some)
            .map_err(|e| AppError::internal(format!("invalid uuid in {col}: {e}"))),
        _ => Ok(None),
    }
}

fn datetime(row: &SqliteRow, col: &str) -> Result<DateTime<Utc>, AppError> {
    parse_datetime(&text(row, col)?)
}

fn opt_datetime(row: &SqliteRow, col: &str) -> Result<Option<DateTime<Utc>>, AppError> {
    match opt_text(row, col)? {
        Some(raw) if !raw.trim().is_empty() => Ok(Some(parse_datetime(&raw)?)),
        _ => Ok(None),
    }
}

pub fn db_team_from_row(row: &SqliteRow) -> Result<DbTeam, AppError> {
    Ok(DbTeam {
        id: uuid(row, "id")?,
        name: text(row, "name")?,
        slug: text(row, "slug")?,
        video_policy: int(row, "video_policy")?,
        membership_policy: int(row, "membership_policy")?,
        task_assign_policy: int(row, "task_assign_policy")?,
        subtitle_policy: int(row, "subtitle_policy")?,
        translate_policy: int(row, "translate_policy")?,
        created_at: datetime(row, "created_at")?,
        updated_at: datetime(row, "updated_at")?,
    })
}

pub fn project_from_row(row: &SqliteRow) -> Result<Project, AppError> {
    Ok(Project {
        id: uuid(row, "id")?,
        team_id: uuid(row, "team_id")?,
        name: text(row, "name")?,
        slug: text(row, "slug")?,
    })
}

pub fn db_workflow_from_row(row: &SqliteRow) -> Result<DbWorkflow, AppError> {
    Ok(DbWorkflow {
        team_id: uuid(row, "team_id")?,
        project_id: opt_uuid(row, "project_id")?,
        review_enabled: flag(row, "review_enabled")?,
        review_allowed: int(row, "review_allowed")?,
        approve_enabled: flag(row, "approve_enabled")?,
        approve_allowed: int(row, "approve_allowed")?,
    })
}

pub fn db_membership_from_row(row: &SqliteRow) -> Result<DbMembership, AppError> {
    Ok(DbMembership {
        id: uuid(row, "id")?,
        team_id: uuid(row, "team_id")?,
        user_id: uuid(row, "user_id")?,
        role: text(row, "role")?,
        created_at: datetime(row, "created_at")?,
    })
}

pub fn db_narrowing_from_row(row: &SqliteRow) -> Result<DbNarrowing, AppError> {
    Ok(DbNarrowing {
        id: uuid(row, "id")?,
        project_id: opt_uuid(row, "project_id")?,
        language: opt_text(row, "language")?,
        added_by: opt_uuid(row, "added_by")?,
    })
}

pub fn db_team_video_from_row(row: &SqliteRow) -> Result<DbTeamVideo, AppError> {
    Ok(DbTeamVideo {
        id: uuid(row, "id")?,
        team_id: uuid(row, "team_id")?,
        project_id: uuid(row, "project_id")?,
        title: text(row, "title")?,
        video_url: text(row, "video_url")?,
        added_by: uuid(row, "added_by")?,
        created_at: datetime(row, "created_at")?,
    })
}

pub fn subtitle_language_from_row(row: &SqliteRow) -> Result<SubtitleLanguage, AppError> {
    Ok(SubtitleLanguage {
        team_video_id: uuid(row, "team_video_id")?,
        language: text(row, "language")?,
        complete: flag(row, "complete")?,
        updated_at: datetime(row, "updated_at")?,
    })
}

pub fn db_task_from_row(row: &SqliteRow) -> Result<DbTask, AppError> {
    Ok(DbTask {
        id: uuid(row, "id")?,
        team_id: uuid(row, "team_id")?,
        team_video_id: uuid(row, "team_video_id")?,
        task_type: int(row, "task_type")?,
        language: text(row, "language")?,
        assignee: opt_uuid(row, "assignee")?,
        review_outcome: opt_text(row, "review_outcome")?,
        completed_at: opt_datetime(row, "completed_at")?,
        deleted: flag(row, "deleted")?,
        created_at: datetime(row, "created_at")?,
        updated_at: datetime(row, "updated_at")?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_the_datetime_shapes_sqlite_produces() {
        assert!(parse_datetime("2025-11-19T12:34:56Z").is_ok());
        assert!(parse_datetime("2025-11-19 12:34:56").is_ok());
        assert!(parse_datetime("2025-11-19 12:34:56.123+00:00").is_ok());
        assert!(parse_datetime("2025-11-19").is_ok());
        assert!(parse_datetime("yesterday").is_err());
    }
}

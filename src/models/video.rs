use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::events::Loggable;
use crate::models::team::Project;

/// A video owned by a team, always filed under one of its projects.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct TeamVideo {
    pub id: Uuid,
    pub team_id: Uuid,
    pub project: Project,
    pub title: String,
    pub video_url: String,
    pub added_by: Uuid,
    pub created_at: DateTime<Utc>,
}

impl Loggable for TeamVideo {
    fn entity_type() -> &'static str { "video" }
    fn subject_id(&self) -> Uuid { self.id }
}

#[derive(Debug, Clone)]
pub struct DbTeamVideo {
    pub id: Uuid,
    pub team_id: Uuid,
    pub project_id: Uuid,
    pub title: String,
    pub video_url: String,
    pub added_by: Uuid,
    pub created_at: DateTime<Utc>,
}

impl DbTeamVideo {
    pub fn with_project(self, project: Project) -> TeamVideo {
        TeamVideo {
            id: self.id,
            team_id: self.team_id,
            project,
            title: self.title,
            video_url: self.video_url,
            added_by: self.added_by,
            created_at: self.created_at,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct SubtitleLanguage {
    pub team_video_id: Uuid,
    #[schema(example = "en")]
    pub language: String,
    pub complete: bool,
    pub updated_at: DateTime<Utc>,
}

impl Loggable for SubtitleLanguage {
    fn entity_type() -> &'static str { "subtitle_language" }
    fn subject_id(&self) -> Uuid { self.team_video_id }
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct VideoCreateRequest {
    #[schema(example = "Keynote 2024")]
    pub title: String,
    #[schema(example = "https://vimeo.com/12345")]
    pub video_url: String,
    /// Defaults to the team's default project.
    pub project_id: Option<Uuid>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct SubtitleLanguageRequest {
    pub complete: bool,
}

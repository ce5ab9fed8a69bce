use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::errors::AppError;
use crate::events::{Loggable, Severity};

/// Workflow step a task covers, in pipeline order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum TaskType {
    Subtitle = 10,
    Translate = 20,
    Review = 30,
    Approve = 40,
}

impl TaskType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskType::Subtitle => "subtitle",
            TaskType::Translate => "translate",
            TaskType::Review => "review",
            TaskType::Approve => "approve",
        }
    }
}

impl fmt::Display for TaskType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<i64> for TaskType {
    type Error = AppError;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        match value {
            10 => Ok(TaskType::Subtitle),
            20 => Ok(TaskType::Translate),
            30 => Ok(TaskType::Review),
            40 => Ok(TaskType::Approve),
            other => Err(AppError::configuration(format!("unknown task_type {other}"))),
        }
    }
}

/// Result recorded when a review task is completed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum ReviewOutcome {
    Accepted,
    Rejected,
}

impl ReviewOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReviewOutcome::Accepted => "accepted",
            ReviewOutcome::Rejected => "rejected",
        }
    }

    pub fn parse(value: &str) -> Result<Self, AppError> {
        match value {
            "accepted" => Ok(ReviewOutcome::Accepted),
            "rejected" => Ok(ReviewOutcome::Rejected),
            other => Err(AppError::configuration(format!("unknown review outcome '{other}'"))),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Task {
    pub id: Uuid,
    pub team_id: Uuid,
    pub team_video_id: Uuid,
    pub task_type: TaskType,
    #[schema(example = "fr")]
    pub language: String,
    pub assignee: Option<Uuid>,
    pub review_outcome: Option<ReviewOutcome>,
    pub completed_at: Option<DateTime<Utc>>,
    pub deleted: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Task {
    pub fn is_open(&self) -> bool {
        self.completed_at.is_none()
    }
}

impl Loggable for Task {
    fn entity_type() -> &'static str { "task" }
    fn subject_id(&self) -> Uuid { self.id }
    fn severity(&self) -> Severity { Severity::Important }
}

#[derive(Debug, Clone)]
pub struct DbTask {
    pub id: Uuid,
    pub team_id: Uuid,
    pub team_video_id: Uuid,
    pub task_type: i64,
    pub language: String,
    pub assignee: Option<Uuid>,
    pub review_outcome: Option<String>,
    pub completed_at: Option<DateTime<Utc>>,
    pub deleted: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TryFrom<DbTask> for Task {
    type Error = AppError;

    fn try_from(value: DbTask) -> Result<Self, Self::Error> {
        Ok(Task {
            id: value.id,
            team_id: value.team_id,
            team_video_id: value.team_video_id,
            task_type: TaskType::try_from(value.task_type)?,
            language: value.language,
            assignee: value.assignee,
            review_outcome: value.review_outcome.as_deref().map(ReviewOutcome::parse).transpose()?,
            completed_at: value.completed_at,
            deleted: value.deleted,
            created_at: value.created_at,
            updated_at: value.updated_at,
        })
    }
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct TaskCreateRequest {
    #[schema(example = "translate")]
    pub task_type: TaskType,
    #[schema(example = "fr")]
    pub language: String,
    pub assignee: Option<Uuid>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct TaskAssignRequest {
    /// `null` unassigns the task.
    pub assignee: Option<Uuid>,
}

#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct TaskCompleteRequest {
    /// Required for review tasks and refused for every other type.
    pub review_outcome: Option<ReviewOutcome>,
}

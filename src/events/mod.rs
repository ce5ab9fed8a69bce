use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use sqlx::SqlitePool;
use tokio::sync::broadcast;
use uuid::Uuid;

pub mod loggable;
pub use loggable::{Loggable, Severity};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DomainEvent<T> {
    pub id: Uuid,
    pub name: String,
    pub occurred_at: DateTime<Utc>,
    pub actor_id: Option<Uuid>,
    pub subject_id: Option<Uuid>,
    pub team_id: Option<Uuid>,
    pub payload: T,
}

impl<T> DomainEvent<T> {
    pub fn new(name: impl Into<String>, actor_id: Option<Uuid>, subject_id: Option<Uuid>, payload: T) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            occurred_at: Utc::now(),
            actor_id,
            subject_id,
            team_id: None,
            payload,
        }
    }

    pub fn in_team(mut self, team_id: Uuid) -> Self {
        self.team_id = Some(team_id);
        self
    }
}

pub type EventBus = broadcast::Sender<Value>;

pub fn init_event_bus() -> (EventBus, broadcast::Receiver<Value>) {
    broadcast::channel(1024)
}

/// Request context for activity logging (IP, User-Agent)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RequestContext {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ip: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,
}

impl RequestContext {
    pub fn from_headers(headers: &axum::http::HeaderMap) -> Self {
        let ip = headers
            .get("x-forwarded-for")
            .and_then(|v| v.to_str().ok())
            .map(|s| s.split(',').next().unwrap_or(s).trim().to_string())
            .or_else(|| {
                headers
                    .get("x-real-ip")
                    .and_then(|v| v.to_str().ok())
                    .map(String::from)
            });

        let user_agent = headers
            .get(axum::http::header::USER_AGENT)
            .and_then(|v| v.to_str().ok())
            .map(String::from);

        Self { ip, user_agent }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActivityPayload {
    #[serde(rename = "new")]
    pub current: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub old: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<RequestContext>,
    pub severity: Severity,
}

/// Everything needed to publish one activity entry.
pub struct Activity<'a, T: Loggable> {
    pub action: &'a str,
    pub actor_id: Option<Uuid>,
    pub team_id: Uuid,
    pub entity: &'a T,
    pub old_entity: Option<&'a T>,
    pub context: Option<RequestContext>,
}

impl<'a, T: Loggable> Activity<'a, T> {
    pub fn new(action: &'a str, actor_id: Uuid, team_id: Uuid, entity: &'a T) -> Self {
        Self { action, actor_id: Some(actor_id), team_id, entity, old_entity: None, context: None }
    }

    pub fn replacing(mut self, old: &'a T) -> Self {
        self.old_entity = Some(old);
        self
    }

    pub fn with_headers(mut self, headers: &axum::http::HeaderMap) -> Self {
        self.context = Some(RequestContext::from_headers(headers));
        self
    }
}

/// Publishes an activity entry on the bus. Publishing never fails the caller.
pub fn log_activity<T: Loggable>(event_bus: &EventBus, activity: Activity<'_, T>) {
    let event_name = format!("{}.{}", T::entity_type(), activity.action);
    let severity = activity.entity.severity_for_action(activity.action);

    let payload = ActivityPayload {
        current: serde_json::to_value(activity.entity).unwrap_or_default(),
        old: activity.old_entity.map(|e| serde_json::to_value(e).unwrap_or_default()),
        context: activity.context,
        severity,
    };

    let event = DomainEvent::new(
        event_name,
        activity.actor_id,
        Some(activity.entity.subject_id()),
        serde_json::to_value(&payload).unwrap_or_default(),
    )
    .in_team(activity.team_id);

    tracing::info!(
        event = %event.name,
        actor_id = ?event.actor_id,
        team_id = %activity.team_id,
        "activity"
    );

    // no receivers just means nobody persists the log
    let _ = event_bus.send(serde_json::to_value(event).unwrap_or_default());
}

fn describe(name: &str) -> &'static str {
    match name {
        "team.created" => "Team created",
        "team.updated" => "Team settings changed",
        "project.created" => "Project created",
        "workflow.updated" => "Workflow changed",
        "member.joined" => "Member joined",
        "member.added" => "Member added",
        "member.role_changed" => "Member role changed",
        "member.removed" => "Member removed",
        "video.created" => "Video added",
        "video.deleted" => "Video removed",
        "subtitle_language.updated" => "Subtitle language updated",
        "task.created" => "Task created",
        "task.assigned" => "Task assigned",
        "task.completed" => "Task completed",
        "task.deleted" => "Task deleted",
        _ => "System event",
    }
}

/// SHA256(prev_hash || payload), hex encoded.
pub fn chain_hash(prev_hash: Option<&str>, payload: &str) -> String {
    let mut hasher = Sha256::new();
    if let Some(prev) = prev_hash {
        hasher.update(prev.as_bytes());
    }
    hasher.update(payload.as_bytes());
    hex::encode(hasher.finalize())
}

/// Persists bus events into `activity_log` and the hash-chained `event_store`.
pub async fn start_activity_listener(mut rx: broadcast::Receiver<Value>, pool: SqlitePool) {
    tracing::info!("activity listener started");
    loop {
        let event = match rx.recv().await {
            Ok(event) => event,
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                tracing::warn!(skipped, "activity listener lagged");
                continue;
            }
            Err(broadcast::error::RecvError::Closed) => break,
        };

        if let Err(err) = persist_event(&pool, &event).await {
            tracing::error!(error = %err, "failed to persist activity");
        }
    }
}

pub async fn persist_event(pool: &SqlitePool, event: &Value) -> Result<(), sqlx::Error> {
    let name = event.get("name").and_then(|v| v.as_str()).unwrap_or("unknown");
    let actor_id = event.get("actor_id").and_then(|v| v.as_str()).and_then(|s| Uuid::parse_str(s).ok());
    let subject_id = event.get("subject_id").and_then(|v| v.as_str()).and_then(|s| Uuid::parse_str(s).ok());
    let occurred_at = event
        .get("occurred_at")
        .and_then(|v| v.as_str())
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(Utc::now);
    let severity = event
        .get("payload")
        .and_then(|p| p.get("severity"))
        .and_then(|s| s.as_str())
        .unwrap_or("important");
    let payload = serde_json::to_string(event).unwrap_or_default();

    let mut tx = pool.begin().await?;

    sqlx::query(
        "INSERT INTO activity_log (id, event_name, description, actor_id, subject_id, occurred_at, properties, severity)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(Uuid::new_v4().to_string())
    .bind(name)
    .bind(describe(name))
    .bind(actor_id.map(|u| u.to_string()))
    .bind(subject_id.map(|u| u.to_string()))
    .bind(occurred_at)
    .bind(&payload)
    .bind(severity)
    .execute(&mut *tx)
    .await?;

    let prev_hash: Option<String> = sqlx::query_scalar(
        "SELECT hash FROM event_store ORDER BY created_at DESC, rowid DESC LIMIT 1",
    )
    .fetch_optional(&mut *tx)
    .await?;

    let hash = chain_hash(prev_hash.as_deref(), &payload);

    sqlx::query(
        "INSERT INTO event_store (id, event_name, occurred_at, actor_id, subject_id, payload, severity, prev_hash, hash)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(Uuid::new_v4().to_string())
    .bind(name)
    .bind(occurred_at)
    .bind(actor_id.map(|u| u.to_string()))
    .bind(subject_id.map(|u| u.to_string()))
    .bind(&payload)
    .bind(severity)
    .bind(&prev_hash)
    .bind(&hash)
    .execute(&mut *tx)
    .await?;

    tx.commit().await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_chain_depends_on_previous_hash() {
        let first = chain_hash(None, "{}");
        let second = chain_hash(Some(&first), "{}");
        assert_ne!(first, second);
        assert_eq!(first.len(), 64);
        assert_eq!(chain_hash(Some(&first), "{}"), second);
    }

    #[test]
    fn event_descriptions() {
        assert_eq!(describe("member.role_changed"), "Member role changed");
        assert_eq!(describe("nope"), "System event");
    }
}

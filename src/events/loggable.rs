use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Retention class of an activity entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Never trimmed: membership and permission changes.
    Critical,
    #[default]
    Important,
    /// Aggressively trimmed.
    Noise,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Critical => "critical",
            Severity::Important => "important",
            Severity::Noise => "noise",
        }
    }
}

/// Entities that can appear in the activity log.
pub trait Loggable: Serialize + Send + Sync {
    /// Prefix of event names, e.g. "member" in "member.role_changed".
    fn entity_type() -> &'static str;

    fn subject_id(&self) -> Uuid;

    fn severity(&self) -> Severity {
        Severity::Important
    }

    /// Removals and permission changes are always critical.
    fn severity_for_action(&self, action: &str) -> Severity {
        match action {
            "deleted" | "removed" | "role_changed" => Severity::Critical,
            _ => self.severity(),
        }
    }
}

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::authz::Role;
use crate::errors::AppError;
use crate::events::{Loggable, Severity};

/// What a narrowing restricts a membership to. A record narrows either a
/// project or a language, never both.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "value")]
pub enum NarrowingScope {
    Project(Uuid),
    Language(String),
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Narrowing {
    pub id: Uuid,
    #[schema(value_type = Object)]
    pub scope: NarrowingScope,
    pub added_by: Option<Uuid>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Membership {
    pub id: Uuid,
    pub team_id: Uuid,
    pub user_id: Uuid,
    pub role: Role,
    pub narrowings: Vec<Narrowing>,
    pub created_at: DateTime<Utc>,
}

impl Membership {
    pub fn new(team_id: Uuid, user_id: Uuid, role: Role) -> Self {
        Self {
            id: Uuid::new_v4(),
            team_id,
            user_id,
            role,
            narrowings: Vec::new(),
            created_at: Utc::now(),
        }
    }

    pub fn with_project_narrowing(mut self, project_id: Uuid) -> Self {
        self.narrowings.push(Narrowing {
            id: Uuid::new_v4(),
            scope: NarrowingScope::Project(project_id),
            added_by: None,
        });
        self
    }

    pub fn with_language_narrowing(mut self, language: impl Into<String>) -> Self {
        self.narrowings.push(Narrowing {
            id: Uuid::new_v4(),
            scope: NarrowingScope::Language(language.into()),
            added_by: None,
        });
        self
    }

    pub fn project_narrowings(&self) -> impl Iterator<Item = Uuid> + '_ {
        self.narrowings.iter().filter_map(|n| match n.scope {
            NarrowingScope::Project(id) => Some(id),
            NarrowingScope::Language(_) => None,
        })
    }

    pub fn language_narrowings(&self) -> impl Iterator<Item = &str> + '_ {
        self.narrowings.iter().filter_map(|n| match &n.scope {
            NarrowingScope::Language(code) => Some(code.as_str()),
            NarrowingScope::Project(_) => None,
        })
    }
}

impl Loggable for Membership {
    fn entity_type() -> &'static str { "member" }
    fn subject_id(&self) -> Uuid { self.user_id }
    fn severity(&self) -> Severity { Severity::Critical }
}

#[derive(Debug, Clone)]
pub struct DbMembership {
    pub id: Uuid,
    pub team_id: Uuid,
    pub user_id: Uuid,
    pub role: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct DbNarrowing {
    pub id: Uuid,
    pub project_id: Option<Uuid>,
    pub language: Option<String>,
    pub added_by: Option<Uuid>,
}

impl TryFrom<DbNarrowing> for Narrowing {
    type Error = AppError;

    fn try_from(value: DbNarrowing) -> Result<Self, Self::Error> {
        let scope = match (value.project_id, value.language) {
            (Some(project_id), None) => NarrowingScope::Project(project_id),
            (None, Some(language)) if !language.is_empty() => NarrowingScope::Language(language),
            _ => {
                return Err(AppError::configuration(format!(
                    "narrowing {} must name exactly one project or language",
                    value.id
                )))
            }
        };

        Ok(Narrowing { id: value.id, scope, added_by: value.added_by })
    }
}

impl DbMembership {
    pub fn into_membership(self, narrowings: Vec<DbNarrowing>) -> Result<Membership, AppError> {
        Ok(Membership {
            id: self.id,
            team_id: self.team_id,
            user_id: self.user_id,
            role: self.role.parse()?,
            narrowings: narrowings
                .into_iter()
                .map(Narrowing::try_from)
                .collect::<Result<_, _>>()?,
            created_at: self.created_at,
        })
    }
}

/// Replace a member's role together with their full narrowing set.
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct RoleChangeRequest {
    #[schema(example = "manager")]
    pub role: Role,
    #[serde(default)]
    pub projects: Vec<Uuid>,
    #[serde(default)]
    #[schema(example = json!(["en", "fr"]))]
    pub languages: Vec<String>,
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct MemberAddRequest {
    pub user_id: Uuid,
    #[schema(example = "contributor")]
    pub role: Role,
    pub project_id: Option<Uuid>,
    pub language: Option<String>,
}

/// Optional project and language a role or permission is asked for.
#[derive(Debug, Clone, Default, Deserialize, utoipa::IntoParams)]
#[into_params(parameter_in = Query)]
pub struct TargetQuery {
    pub project_id: Option<Uuid>,
    pub language: Option<String>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct EffectiveRoleResponse {
    pub team_id: Uuid,
    pub user_id: Uuid,
    pub base_role: Role,
    pub effective_role: Role,
    pub project_id: Option<Uuid>,
    pub language: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn narrowing_rows_need_exactly_one_target() {
        let both = DbNarrowing {
            id: Uuid::new_v4(),
            project_id: Some(Uuid::new_v4()),
            language: Some("en".into()),
            added_by: None,
        };
        assert!(Narrowing::try_from(both).is_err());

        let blank = DbNarrowing { id: Uuid::new_v4(), project_id: None, language: Some(String::new()), added_by: None };
        assert!(Narrowing::try_from(blank).is_err());
    }

    #[test]
    fn narrowings_partition_by_scope() {
        let project = Uuid::new_v4();
        let member = Membership::new(Uuid::new_v4(), Uuid::new_v4(), Role::Manager)
            .with_project_narrowing(project)
            .with_language_narrowing("en");

        assert_eq!(member.project_narrowings().collect::<Vec<_>>(), vec![project]);
        assert_eq!(member.language_narrowings().collect::<Vec<_>>(), vec!["en"]);
    }
}

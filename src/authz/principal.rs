use uuid::Uuid;

use super::Role;
use crate::models::member::Membership;
use crate::models::team::Project;

/// Role the holder of `membership` effectively has for a target.
///
/// Narrowings restrict where the base role applies. Outside a project
/// narrowing set, or outside a language narrowing set, the member acts as a
/// contributor. The default project counts as "no project".
pub fn effective_role(
    membership: Option<&Membership>,
    project: Option<&Project>,
    language: Option<&str>,
) -> Role {
    let Some(member) = membership else {
        return Role::Outsider;
    };

    if member.narrowings.is_empty() {
        return member.role;
    }

    let project_id = project.filter(|p| !p.is_default_project()).map(|p| p.id);

    let mut projects = member.project_narrowings().peekable();
    if projects.peek().is_some() && !project_id.is_some_and(|id| projects.any(|p| p == id)) {
        return Role::Contributor;
    }

    let mut languages = member.language_narrowings().peekable();
    if languages.peek().is_some() && !language.is_some_and(|code| languages.any(|l| l == code)) {
        return Role::Contributor;
    }

    member.role
}

/// The acting user as seen from one team.
#[derive(Debug, Clone)]
pub struct Principal {
    pub user_id: Uuid,
    pub team_id: Uuid,
    pub membership: Option<Membership>,
}

impl Principal {
    pub fn new(user_id: Uuid, team_id: Uuid) -> Self {
        Self { user_id, team_id, membership: None }
    }

    pub fn with_membership(mut self, membership: Option<Membership>) -> Self {
        self.membership = membership.filter(|m| m.team_id == self.team_id && m.user_id == self.user_id);
        self
    }

    pub fn is_member(&self) -> bool {
        self.membership.is_some()
    }

    /// General role in the team, ignoring narrowings.
    pub fn base_role(&self) -> Role {
        self.membership.as_ref().map(|m| m.role).unwrap_or(Role::Outsider)
    }

    /// Effective role for a target in `team_id`. Any other team sees an outsider.
    pub fn role_for(&self, team_id: Uuid, ctx: &ResourceContext) -> Role {
        if team_id != self.team_id {
            return Role::Outsider;
        }
        effective_role(self.membership.as_ref(), ctx.project.as_ref(), ctx.language.as_deref())
    }
}

/// Target of an authorization check inside a team.
#[derive(Debug, Clone, Default)]
pub struct ResourceContext {
    pub project: Option<Project>,
    pub language: Option<String>,
}

impl ResourceContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_project(mut self, project: Project) -> Self {
        self.project = Some(project);
        self
    }

    pub fn with_optional_project(mut self, project: Option<Project>) -> Self {
        self.project = project;
        self
    }

    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = Some(language.into());
        self
    }

    pub fn with_optional_language(mut self, language: Option<String>) -> Self {
        self.language = language;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn team() -> Uuid {
        Uuid::new_v4()
    }

    #[test]
    fn non_members_are_outsiders() {
        assert_eq!(effective_role(None, None, None), Role::Outsider);
        assert_eq!(effective_role(None, None, Some("en")), Role::Outsider);
    }

    #[test]
    fn unnarrowed_members_keep_their_role() {
        let member = Membership::new(team(), Uuid::new_v4(), Role::Admin);
        let project = Project::new(member.team_id, "Docs", "docs");
        assert_eq!(effective_role(Some(&member), Some(&project), Some("fr")), Role::Admin);
    }

    #[test]
    fn project_narrowing_demotes_owner_elsewhere() {
        let team_id = team();
        let p1 = Project::new(team_id, "One", "one");
        let p2 = Project::new(team_id, "Two", "two");
        let member = Membership::new(team_id, Uuid::new_v4(), Role::Owner).with_project_narrowing(p1.id);

        assert_eq!(effective_role(Some(&member), Some(&p1), None), Role::Owner);
        assert_eq!(effective_role(Some(&member), Some(&p2), None), Role::Contributor);
        assert_eq!(effective_role(Some(&member), None, None), Role::Contributor);
    }

    #[test]
    fn default_project_counts_as_no_project() {
        let team_id = team();
        let p1 = Project::new(team_id, "One", "one");
        let member = Membership::new(team_id, Uuid::new_v4(), Role::Manager).with_project_narrowing(p1.id);
        let root = Project::default_for(team_id);

        assert_eq!(effective_role(Some(&member), Some(&root), None), Role::Contributor);

        // a language-only narrowing is unaffected by the default project
        let linguist = Membership::new(team_id, Uuid::new_v4(), Role::Manager).with_language_narrowing("en");
        assert_eq!(effective_role(Some(&linguist), Some(&root), Some("en")), Role::Manager);
    }

    #[test]
    fn both_narrowings_must_match() {
        let team_id = team();
        let p1 = Project::new(team_id, "One", "one");
        let member = Membership::new(team_id, Uuid::new_v4(), Role::Admin)
            .with_project_narrowing(p1.id)
            .with_language_narrowing("en");

        assert_eq!(effective_role(Some(&member), Some(&p1), Some("en")), Role::Admin);
        assert_eq!(effective_role(Some(&member), Some(&p1), Some("fr")), Role::Contributor);
        assert_eq!(effective_role(Some(&member), Some(&p1), None), Role::Contributor);
    }

    #[test]
    fn principal_is_outsider_in_other_teams() {
        let team_id = team();
        let user = Uuid::new_v4();
        let principal = Principal::new(user, team_id)
            .with_membership(Some(Membership::new(team_id, user, Role::Owner)));

        assert_eq!(principal.role_for(team_id, &ResourceContext::new()), Role::Owner);
        assert_eq!(principal.role_for(Uuid::new_v4(), &ResourceContext::new()), Role::Outsider);
    }

    #[test]
    fn foreign_memberships_are_dropped() {
        let team_id = team();
        let principal = Principal::new(Uuid::new_v4(), team_id)
            .with_membership(Some(Membership::new(team_id, Uuid::new_v4(), Role::Owner)));
        assert!(!principal.is_member());
    }
}

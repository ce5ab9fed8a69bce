pub mod health;
pub mod members;
pub mod tasks;
pub mod teams;
pub mod videos;

use sqlx::SqliteConnection;
use uuid::Uuid;

use crate::authz::{MembershipCache, MembershipStore, Principal, ResourceContext};
use crate::db::teams as queries;
use crate::errors::AppResult;
use crate::models::member::TargetQuery;

/// Principal for `user_id` in `team_id`, read through the request's cache.
pub(crate) async fn principal_for<S: MembershipStore + ?Sized>(
    cache: &mut MembershipCache<'_, S>,
    team_id: Uuid,
    user_id: Uuid,
) -> AppResult<Principal> {
    let membership = cache.get(team_id, user_id).await?;
    Ok(Principal::new(user_id, team_id).with_membership(membership))
}

/// Resolves `?project_id&language` into a target inside the team.
pub(crate) async fn resource_context(
    conn: &mut SqliteConnection,
    team_id: Uuid,
    query: &TargetQuery,
) -> AppResult<ResourceContext> {
    let project = match query.project_id {
        Some(project_id) => Some(queries::fetch_project(conn, team_id, project_id).await?),
        None => None,
    };

    Ok(ResourceContext::new()
        .with_optional_project(project)
        .with_optional_language(query.language.clone()))
}

//! Writes. Every mutation runs in one transaction and re-reads whatever its
//! permission check depends on inside that transaction.

use std::collections::BTreeSet;
use std::sync::Arc;

use sqlx::{SqliteConnection, SqlitePool};
use uuid::Uuid;

use crate::authz::eligibility::eligible_for;
use crate::authz::evaluator::can_perform_task;
use crate::authz::role::{
    can_assign_role, role_accepts_language_narrowings, role_accepts_project_narrowings, roles_user_can_invite,
};
use crate::authz::{Action, AuthzMode, PolicyEvaluator, Principal, ResourceContext, Role};
use crate::db::teams;
use crate::errors::{AppError, AppResult};
use crate::models::member::{Membership, NarrowingScope};
use crate::models::task::{ReviewOutcome, Task, TaskType};
use crate::models::team::{
    Project, ProjectCreateRequest, Team, TeamCreateRequest, TeamSettingsRequest, Workflow, WorkflowRequest,
};
use crate::models::video::{SubtitleLanguage, TeamVideo, VideoCreateRequest};
use crate::utils::{utc_now, validate_language, validate_project_slug, validate_slug};

/// The user a mutation is performed for, with the rules used to check them.
#[derive(Clone)]
pub struct Actor {
    pub user_id: Uuid,
    pub evaluator: Arc<dyn PolicyEvaluator>,
    pub mode: AuthzMode,
}

impl Actor {
    pub fn new(user_id: Uuid, evaluator: Arc<dyn PolicyEvaluator>, mode: AuthzMode) -> Self {
        Self { user_id, evaluator, mode }
    }

    /// Loads the actor's current membership in `team_id`.
    pub async fn principal(&self, conn: &mut SqliteConnection, team_id: Uuid) -> AppResult<Principal> {
        let membership = teams::fetch_membership(conn, team_id, self.user_id).await?;
        Ok(Principal::new(self.user_id, team_id).with_membership(membership))
    }

    pub fn require(&self, team: &Team, principal: &Principal, action: Action<'_>) -> AppResult<()> {
        let allowed = self.evaluator.can(team, principal, &action);
        self.mode.enforce(allowed, action.name())
    }
}

fn conflict_on_unique(err: sqlx::Error, message: &str) -> AppError {
    match err.as_database_error() {
        Some(db_err) if db_err.is_unique_violation() => AppError::conflict(message),
        _ => AppError::Database(err),
    }
}

// Teams and projects

/// Creates a team with its default project. The creator becomes its owner.
pub async fn create_team(pool: &SqlitePool, creator: Uuid, req: &TeamCreateRequest) -> AppResult<(Team, Membership)> {
    validate_slug(&req.slug)?;
    if req.name.trim().is_empty() {
        return Err(AppError::bad_request("team name is required"));
    }

    let team = Team::new(req.name.trim(), &req.slug);
    let project = Project::default_for(team.id);
    let owner = Membership::new(team.id, creator, Role::Owner);

    let mut tx = pool.begin().await?;

    sqlx::query(
        "INSERT INTO teams (id, name, slug, video_policy, membership_policy, task_assign_policy, subtitle_policy, translate_policy, created_at, updated_at)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(team.id.to_string())
    .bind(&team.name)
    .bind(&team.slug)
    .bind(team.video_policy as i64)
    .bind(team.membership_policy as i64)
    .bind(team.task_assign_policy as i64)
    .bind(team.subtitle_policy as i64)
    .bind(team.translate_policy as i64)
    .bind(team.created_at)
    .bind(team.updated_at)
    .execute(&mut *tx)
    .await
    .map_err(|err| conflict_on_unique(err, "team slug already taken"))?;

    insert_project(&mut tx, &project).await?;
    insert_membership(&mut tx, &owner).await?;

    tx.commit().await?;

    tracing::info!(team_id = %team.id, slug = %team.slug, owner = %creator, "team created");
    Ok((team, owner))
}

async fn insert_project(conn: &mut SqliteConnection, project: &Project) -> AppResult<()> {
    sqlx::query("INSERT INTO projects (id, team_id, name, slug, created_at) VALUES (?, ?, ?, ?, ?)")
        .bind(project.id.to_string())
        .bind(project.team_id.to_string())
        .bind(&project.name)
        .bind(&project.slug)
        .bind(utc_now())
        .execute(&mut *conn)
        .await
        .map_err(|err| conflict_on_unique(err, "project slug already taken"))?;
    Ok(())
}

pub async fn create_project(
    pool: &SqlitePool,
    actor: &Actor,
    team_id: Uuid,
    req: &ProjectCreateRequest,
) -> AppResult<Project> {
    validate_project_slug(&req.slug)?;

    let mut tx = pool.begin().await?;
    let team = teams::fetch_team(&mut tx, team_id).await?;
    let principal = actor.principal(&mut tx, team_id).await?;
    actor.require(&team, &principal, Action::EditProject(None))?;

    let project = Project::new(team_id, req.name.trim(), &req.slug);
    insert_project(&mut tx, &project).await?;
    tx.commit().await?;

    Ok(project)
}

/// Applies the given settings. Returns the team before and after.
pub async fn update_team_settings(
    pool: &SqlitePool,
    actor: &Actor,
    team_id: Uuid,
    req: &TeamSettingsRequest,
) -> AppResult<(Team, Team)> {
    let mut tx = pool.begin().await?;
    let old = teams::fetch_team(&mut tx, team_id).await?;
    let principal = actor.principal(&mut tx, team_id).await?;

    actor.require(&old, &principal, Action::ChangeTeamSettings)?;

    let mut team = old.clone();
    if let Some(name) = req.name.as_deref().map(str::trim) {
        if name != team.name {
            actor.require(&old, &principal, Action::RenameTeam)?;
            if name.is_empty() {
                return Err(AppError::bad_request("team name is required"));
            }
            team.name = name.to_string();
        }
    }
    if let Some(policy) = req.video_policy {
        team.video_policy = policy;
    }
    if let Some(policy) = req.membership_policy {
        team.membership_policy = policy;
    }
    if let Some(policy) = req.task_assign_policy {
        team.task_assign_policy = policy;
    }
    if let Some(policy) = req.subtitle_policy {
        team.subtitle_policy = policy;
    }
    if let Some(policy) = req.translate_policy {
        team.translate_policy = policy;
    }
    team.updated_at = utc_now();

    sqlx::query(
        "UPDATE teams SET name = ?, video_policy = ?, membership_policy = ?, task_assign_policy = ?, subtitle_policy = ?, translate_policy = ?, updated_at = ?
         WHERE id = ?",
    )
    .bind(&team.name)
    .bind(team.video_policy as i64)
    .bind(team.membership_policy as i64)
    .bind(team.task_assign_policy as i64)
    .bind(team.subtitle_policy as i64)
    .bind(team.translate_policy as i64)
    .bind(team.updated_at)
    .bind(team_id.to_string())
    .execute(&mut *tx)
    .await?;

    if let Some(blocked) = req.blocked_languages.as_ref() {
        let blocked: BTreeSet<&str> = blocked.iter().map(String::as_str).collect();
        for code in &blocked {
            validate_language(code)?;
        }

        sqlx::query("DELETE FROM team_language_preferences WHERE team_id = ?")
            .bind(team_id.to_string())
            .execute(&mut *tx)
            .await?;

        for code in blocked {
            sqlx::query("INSERT INTO team_language_preferences (team_id, language, allow_writes) VALUES (?, ?, 0)")
                .bind(team_id.to_string())
                .bind(code)
                .execute(&mut *tx)
                .await?;
        }
    }

    tx.commit().await?;
    Ok((old, team))
}

/// Replaces the team workflow, or a project's when `project_id` is set.
pub async fn upsert_workflow(
    pool: &SqlitePool,
    actor: &Actor,
    team_id: Uuid,
    req: &WorkflowRequest,
) -> AppResult<Workflow> {
    let workflow = Workflow {
        team_id,
        project_id: req.project_id,
        review_enabled: req.review_enabled,
        review_allowed: req.review_allowed,
        approve_enabled: req.approve_enabled,
        approve_allowed: req.approve_allowed,
    };
    workflow.validate().map_err(|err| AppError::bad_request(err.to_string()))?;

    let mut tx = pool.begin().await?;
    let team = teams::fetch_team(&mut tx, team_id).await?;
    let principal = actor.principal(&mut tx, team_id).await?;
    actor.require(&team, &principal, Action::ChangeTeamSettings)?;

    if let Some(project_id) = req.project_id {
        teams::fetch_project(&mut tx, team_id, project_id).await?;
    }

    let project_key = req.project_id.map(|id| id.to_string());

    sqlx::query("DELETE FROM workflows WHERE team_id = ? AND IFNULL(project_id, '') = ?")
        .bind(team_id.to_string())
        .bind(project_key.clone().unwrap_or_default())
        .execute(&mut *tx)
        .await?;

    sqlx::query(
        "INSERT INTO workflows (id, team_id, project_id, review_enabled, review_allowed, approve_enabled, approve_allowed, updated_at)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(Uuid::new_v4().to_string())
    .bind(team_id.to_string())
    .bind(project_key)
    .bind(workflow.review_enabled)
    .bind(workflow.review_allowed as i64)
    .bind(workflow.approve_enabled)
    .bind(workflow.approve_allowed as i64)
    .bind(utc_now())
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;
    Ok(workflow)
}

// Memberships

async fn insert_membership(conn: &mut SqliteConnection, member: &Membership) -> AppResult<()> {
    let now = utc_now();
    sqlx::query(
        "INSERT INTO team_members (id, team_id, user_id, role, created_at, updated_at) VALUES (?, ?, ?, ?, ?, ?)",
    )
    .bind(member.id.to_string())
    .bind(member.team_id.to_string())
    .bind(member.user_id.to_string())
    .bind(member.role.as_str())
    .bind(member.created_at)
    .bind(now)
    .execute(&mut *conn)
    .await
    .map_err(|err| conflict_on_unique(err, "user is already a member"))?;
    Ok(())
}

async fn insert_narrowing(
    conn: &mut SqliteConnection,
    member_id: Uuid,
    scope: &NarrowingScope,
    added_by: Option<Uuid>,
) -> AppResult<()> {
    let (project_id, language) = match scope {
        NarrowingScope::Project(id) => (Some(id.to_string()), None),
        NarrowingScope::Language(code) => (None, Some(code.as_str())),
    };

    sqlx::query(
        "INSERT INTO membership_narrowings (id, member_id, project_id, language, added_by, created_at) VALUES (?, ?, ?, ?, ?, ?)",
    )
    .bind(Uuid::new_v4().to_string())
    .bind(member_id.to_string())
    .bind(project_id)
    .bind(language)
    .bind(added_by.map(|id| id.to_string()))
    .bind(utc_now())
    .execute(&mut *conn)
    .await?;
    Ok(())
}

async fn reload_membership(conn: &mut SqliteConnection, team_id: Uuid, user_id: Uuid) -> AppResult<Membership> {
    teams::fetch_membership(conn, team_id, user_id)
        .await?
        .ok_or_else(|| AppError::not_found("Member not found"))
}

/// Makes `user_id` a member with `role` unless they already are one, then
/// adds the optional narrowing if it is not present yet.
pub async fn add_member(
    conn: &mut SqliteConnection,
    team_id: Uuid,
    user_id: Uuid,
    role: Role,
    narrowing: Option<NarrowingScope>,
    added_by: Option<Uuid>,
) -> AppResult<Membership> {
    if !role.is_member() {
        return Err(AppError::bad_request("outsider is not a team role"));
    }

    let member = match teams::fetch_membership(conn, team_id, user_id).await? {
        Some(existing) => existing,
        None => {
            let member = Membership::new(team_id, user_id, role);
            insert_membership(conn, &member).await?;
            member
        }
    };

    if let Some(scope) = narrowing {
        if !member.narrowings.iter().any(|n| n.scope == scope) {
            insert_narrowing(conn, member.id, &scope, added_by).await?;
        }
    }

    reload_membership(conn, team_id, user_id).await
}

/// Outsiders joining a team with an open membership policy.
pub async fn join_team(pool: &SqlitePool, actor: &Actor, team_id: Uuid) -> AppResult<Membership> {
    let mut tx = pool.begin().await?;
    let team = teams::fetch_team(&mut tx, team_id).await?;
    let principal = actor.principal(&mut tx, team_id).await?;
    if principal.is_member() {
        return Err(AppError::conflict("already a member"));
    }
    actor.require(&team, &principal, Action::JoinTeam)?;

    let member = add_member(&mut tx, team_id, actor.user_id, Role::Contributor, None, None).await?;
    tx.commit().await?;
    Ok(member)
}

/// Invites a user directly into the team. The role must be one the actor
/// may invite with, and narrowings must suit that role.
pub async fn invite_member(
    pool: &SqlitePool,
    actor: &Actor,
    team_id: Uuid,
    user_id: Uuid,
    role: Role,
    narrowing: Option<NarrowingScope>,
) -> AppResult<Membership> {
    let mut tx = pool.begin().await?;
    let team = teams::fetch_team(&mut tx, team_id).await?;
    let principal = actor.principal(&mut tx, team_id).await?;

    actor.require(&team, &principal, Action::Invite)?;
    let actor_role = principal.role_for(team_id, &ResourceContext::new());
    let allowed = roles_user_can_invite(actor_role).contains(&role);
    actor.mode.enforce(allowed, "member.invite_role")?;

    // role changes go through save_role
    if teams::fetch_membership(&mut tx, team_id, user_id).await?.is_some() {
        return Err(AppError::conflict("user is already a member"));
    }

    if let Some(scope) = narrowing.as_ref() {
        check_narrowing_target(&mut tx, team_id, role, scope).await?;
    }

    let member = add_member(&mut tx, team_id, user_id, role, narrowing, Some(actor.user_id)).await?;
    tx.commit().await?;
    Ok(member)
}

async fn check_narrowing_target(
    conn: &mut SqliteConnection,
    team_id: Uuid,
    role: Role,
    scope: &NarrowingScope,
) -> AppResult<()> {
    match scope {
        NarrowingScope::Project(project_id) => {
            if !role_accepts_project_narrowings(role) {
                return Err(AppError::bad_request(format!("{role} cannot be narrowed to projects")));
            }
            let project = teams::fetch_project(conn, team_id, *project_id).await?;
            if project.is_default_project() {
                return Err(AppError::bad_request("cannot narrow to the default project"));
            }
        }
        NarrowingScope::Language(code) => {
            if !role_accepts_language_narrowings(role) {
                return Err(AppError::bad_request(format!("{role} cannot be narrowed to languages")));
            }
            validate_language(code)?;
        }
    }
    Ok(())
}

/// Replaces the member's narrowings with exactly `projects` and `languages`,
/// touching only the rows that differ.
pub async fn set_narrowings(
    conn: &mut SqliteConnection,
    member: &Membership,
    projects: &BTreeSet<Uuid>,
    languages: &BTreeSet<String>,
    added_by: Option<Uuid>,
) -> AppResult<()> {
    let wanted: Vec<NarrowingScope> = projects
        .iter()
        .copied()
        .map(NarrowingScope::Project)
        .chain(languages.iter().cloned().map(NarrowingScope::Language))
        .collect();

    for existing in &member.narrowings {
        if !wanted.contains(&existing.scope) {
            sqlx::query("DELETE FROM membership_narrowings WHERE id = ?")
                .bind(existing.id.to_string())
                .execute(&mut *conn)
                .await?;
        }
    }

    for scope in &wanted {
        if !member.narrowings.iter().any(|n| &n.scope == scope) {
            insert_narrowing(conn, member.id, scope, added_by).await?;
        }
    }

    Ok(())
}

/// Changes a member's role and replaces their narrowing set. Both are written
/// in one transaction, so readers see the old pair or the new pair.
///
/// Returns the membership before and after.
pub async fn save_role(
    pool: &SqlitePool,
    actor: &Actor,
    team_id: Uuid,
    user_id: Uuid,
    role: Role,
    projects: &[Uuid],
    languages: &[String],
) -> AppResult<(Membership, Membership)> {
    let projects: BTreeSet<Uuid> = projects.iter().copied().collect();
    let languages: BTreeSet<String> = languages.iter().cloned().collect();

    let mut tx = pool.begin().await?;
    teams::fetch_team(&mut tx, team_id).await?;
    let target = reload_membership(&mut tx, team_id, user_id).await?;
    let principal = actor.principal(&mut tx, team_id).await?;

    let actor_role = principal.role_for(team_id, &ResourceContext::new());
    actor
        .mode
        .enforce(can_assign_role(actor_role, role, Some(&target)), "member.role_change")?;

    for project_id in &projects {
        check_narrowing_target(&mut tx, team_id, role, &NarrowingScope::Project(*project_id)).await?;
    }
    for code in &languages {
        check_narrowing_target(&mut tx, team_id, role, &NarrowingScope::Language(code.clone())).await?;
    }

    sqlx::query("UPDATE team_members SET role = ?, updated_at = ? WHERE id = ?")
        .bind(role.as_str())
        .bind(utc_now())
        .bind(target.id.to_string())
        .execute(&mut *tx)
        .await?;

    set_narrowings(&mut tx, &target, &projects, &languages, Some(actor.user_id)).await?;

    let updated = reload_membership(&mut tx, team_id, user_id).await?;
    tx.commit().await?;

    tracing::info!(
        team_id = %team_id,
        user_id = %user_id,
        from = %target.role,
        to = %updated.role,
        narrowings = updated.narrowings.len(),
        "member role saved"
    );
    Ok((target, updated))
}

/// Removes a member. Members may always leave, except owners; removing
/// someone else needs the right to assign their current role.
pub async fn remove_member(pool: &SqlitePool, actor: &Actor, team_id: Uuid, user_id: Uuid) -> AppResult<Membership> {
    let mut tx = pool.begin().await?;
    teams::fetch_team(&mut tx, team_id).await?;
    let target = reload_membership(&mut tx, team_id, user_id).await?;

    if user_id == actor.user_id {
        if target.role == Role::Owner {
            return Err(AppError::bad_request("owners cannot leave their team"));
        }
    } else {
        let principal = actor.principal(&mut tx, team_id).await?;
        let actor_role = principal.role_for(team_id, &ResourceContext::new());
        actor
            .mode
            .enforce(can_assign_role(actor_role, target.role, Some(&target)), "member.remove")?;
    }

    sqlx::query("DELETE FROM team_members WHERE id = ?")
        .bind(target.id.to_string())
        .execute(&mut *tx)
        .await?;

    tx.commit().await?;
    Ok(target)
}

// Videos and subtitle state

pub async fn create_video(pool: &SqlitePool, actor: &Actor, team_id: Uuid, req: &VideoCreateRequest) -> AppResult<TeamVideo> {
    if req.title.trim().is_empty() || req.video_url.trim().is_empty() {
        return Err(AppError::bad_request("title and video_url are required"));
    }

    let mut tx = pool.begin().await?;
    let team = teams::fetch_team(&mut tx, team_id).await?;
    let project = match req.project_id {
        Some(project_id) => teams::fetch_project(&mut tx, team_id, project_id).await?,
        None => teams::default_project(&mut tx, team_id).await?,
    };
    let principal = actor.principal(&mut tx, team_id).await?;
    actor.require(&team, &principal, Action::AddVideo(Some(&project)))?;

    let video = TeamVideo {
        id: Uuid::new_v4(),
        team_id,
        project,
        title: req.title.trim().to_string(),
        video_url: req.video_url.trim().to_string(),
        added_by: actor.user_id,
        created_at: utc_now(),
    };

    sqlx::query(
        "INSERT INTO team_videos (id, team_id, project_id, title, video_url, added_by, created_at) VALUES (?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(video.id.to_string())
    .bind(team_id.to_string())
    .bind(video.project.id.to_string())
    .bind(&video.title)
    .bind(&video.video_url)
    .bind(video.added_by.to_string())
    .bind(video.created_at)
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;
    Ok(video)
}

pub async fn delete_video(pool: &SqlitePool, actor: &Actor, team_id: Uuid, video_id: Uuid) -> AppResult<TeamVideo> {
    let mut tx = pool.begin().await?;
    let team = teams::fetch_team(&mut tx, team_id).await?;
    let video = teams::fetch_video(&mut tx, team_id, video_id).await?;
    let principal = actor.principal(&mut tx, team_id).await?;
    actor.require(&team, &principal, Action::RemoveVideo(&video))?;

    sqlx::query("DELETE FROM team_videos WHERE id = ?")
        .bind(video_id.to_string())
        .execute(&mut *tx)
        .await?;

    tx.commit().await?;
    Ok(video)
}

async fn write_subtitle_language(
    conn: &mut SqliteConnection,
    video_id: Uuid,
    language: &str,
    complete: bool,
) -> AppResult<SubtitleLanguage> {
    let updated_at = utc_now();
    sqlx::query(
        "INSERT INTO subtitle_languages (team_video_id, language, complete, updated_at) VALUES (?, ?, ?, ?)
         ON CONFLICT (team_video_id, language) DO UPDATE SET complete = excluded.complete, updated_at = excluded.updated_at",
    )
    .bind(video_id.to_string())
    .bind(language)
    .bind(complete)
    .bind(updated_at)
    .execute(&mut *conn)
    .await?;

    Ok(SubtitleLanguage { team_video_id: video_id, language: language.to_string(), complete, updated_at })
}

/// Records subtitle progress for one language. The first language of a video
/// is checked against the subtitle policy, later ones against the translate
/// policy.
pub async fn upsert_subtitle_language(
    pool: &SqlitePool,
    actor: &Actor,
    team_id: Uuid,
    video_id: Uuid,
    language: &str,
    complete: bool,
) -> AppResult<SubtitleLanguage> {
    validate_language(language)?;

    let mut tx = pool.begin().await?;
    let loaded = teams::load_video(&mut tx, team_id, video_id).await?;
    if !loaded.writable_languages.contains(language) {
        return Err(AppError::bad_request(format!("the team does not write '{language}' subtitles")));
    }

    let principal = actor.principal(&mut tx, team_id).await?;
    let is_translation = loaded.snapshot.started_languages.iter().any(|l| l != language);
    let action = if is_translation {
        Action::EditTranslations(&loaded.video, Some(language))
    } else {
        Action::EditSubtitles(&loaded.video, Some(language))
    };
    actor.require(&loaded.team, &principal, action)?;

    let state = write_subtitle_language(&mut tx, video_id, language, complete).await?;
    tx.commit().await?;
    Ok(state)
}

// Tasks

/// Creates a task after re-running eligibility on a snapshot read inside the
/// same transaction. A language that stopped being eligible since the caller
/// looked is a conflict.
pub async fn insert_task(
    pool: &SqlitePool,
    actor: &Actor,
    team_id: Uuid,
    video_id: Uuid,
    task_type: TaskType,
    language: &str,
    assignee: Option<Uuid>,
) -> AppResult<Task> {
    validate_language(language)?;

    let mut tx = pool.begin().await?;

    // take the write lock before reading the snapshot
    let touched = sqlx::query("UPDATE team_videos SET id = id WHERE id = ? AND team_id = ?")
        .bind(video_id.to_string())
        .bind(team_id.to_string())
        .execute(&mut *tx)
        .await?;
    if touched.rows_affected() == 0 {
        return Err(AppError::not_found("Video not found"));
    }

    let loaded = teams::load_video(&mut tx, team_id, video_id).await?;
    let principal = actor.principal(&mut tx, team_id).await?;
    actor.require(&loaded.team, &principal, Action::CreateTasks(Some(&loaded.video.project)))?;

    let ctx = loaded.context();
    if !eligible_for(&ctx, None, task_type, language) {
        return Err(AppError::conflict(format!(
            "a {task_type} task for '{language}' cannot be created on this video"
        )));
    }
    actor
        .mode
        .enforce(eligible_for(&ctx, Some(&principal), task_type, language), "task.create")?;

    let now = utc_now();
    let task = Task {
        id: Uuid::new_v4(),
        team_id,
        team_video_id: video_id,
        task_type,
        language: language.to_string(),
        assignee: None,
        review_outcome: None,
        completed_at: None,
        deleted: false,
        created_at: now,
        updated_at: now,
    };

    if let Some(assignee) = assignee {
        check_assignee(&mut tx, &loaded, &task, assignee).await?;
    }

    sqlx::query(
        "INSERT INTO tasks (id, team_id, team_video_id, task_type, language, assignee, deleted, created_at, updated_at)
         VALUES (?, ?, ?, ?, ?, ?, 0, ?, ?)",
    )
    .bind(task.id.to_string())
    .bind(team_id.to_string())
    .bind(video_id.to_string())
    .bind(task_type as i64)
    .bind(&task.language)
    .bind(assignee.map(|id| id.to_string()))
    .bind(now)
    .bind(now)
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;

    tracing::info!(task_id = %task.id, video_id = %video_id, task_type = %task_type, language, "task created");
    Ok(Task { assignee, ..task })
}

/// The assignee must be a member able to perform the task.
async fn check_assignee(
    conn: &mut SqliteConnection,
    loaded: &teams::LoadedVideo,
    task: &Task,
    assignee: Uuid,
) -> AppResult<()> {
    let membership = teams::fetch_membership(conn, loaded.team.id, assignee).await?;
    if membership.is_none() {
        return Err(AppError::bad_request("assignee is not a team member"));
    }
    let assignee = Principal::new(assignee, loaded.team.id).with_membership(membership);
    if !can_perform_task(loaded.scope(), &assignee, task) {
        return Err(AppError::bad_request(format!(
            "assignee cannot perform {} tasks for '{}'",
            task.task_type, task.language
        )));
    }
    Ok(())
}

/// Sets or clears the assignee. Members may take an open task for themselves
/// when they can perform it; assigning others needs the assignment privilege.
pub async fn assign_task(
    pool: &SqlitePool,
    actor: &Actor,
    team_id: Uuid,
    task_id: Uuid,
    assignee: Option<Uuid>,
) -> AppResult<(Task, Task)> {
    let mut tx = pool.begin().await?;
    let task = teams::fetch_task(&mut tx, team_id, task_id).await?;
    if !task.is_open() {
        return Err(AppError::conflict("task is already completed"));
    }

    let loaded = teams::load_video(&mut tx, team_id, task.team_video_id).await?;
    let principal = actor.principal(&mut tx, team_id).await?;

    let self_assign = assignee == Some(actor.user_id) && task.assignee.is_none();
    let action = if self_assign {
        Action::PerformTask(loaded.scope(), &task)
    } else {
        Action::AssignTask(loaded.scope(), &task)
    };
    actor.require(&loaded.team, &principal, action)?;

    if let Some(assignee) = assignee {
        check_assignee(&mut tx, &loaded, &task, assignee).await?;
    }

    let now = utc_now();
    sqlx::query("UPDATE tasks SET assignee = ?, updated_at = ? WHERE id = ?")
        .bind(assignee.map(|id| id.to_string()))
        .bind(now)
        .bind(task_id.to_string())
        .execute(&mut *tx)
        .await?;

    tx.commit().await?;
    let updated = Task { assignee, updated_at: now, ..task.clone() };
    Ok((task, updated))
}

/// Completes an open task. Review tasks need an outcome, other tasks must not
/// carry one. Finishing subtitle or translate work marks its language
/// complete on the video.
pub async fn complete_task(
    pool: &SqlitePool,
    actor: &Actor,
    team_id: Uuid,
    task_id: Uuid,
    outcome: Option<ReviewOutcome>,
) -> AppResult<Task> {
    let mut tx = pool.begin().await?;
    let task = teams::fetch_task(&mut tx, team_id, task_id).await?;
    if !task.is_open() {
        return Err(AppError::conflict("task is already completed"));
    }

    match (task.task_type, outcome) {
        (TaskType::Review, None) => return Err(AppError::bad_request("review tasks need a review_outcome")),
        (TaskType::Subtitle | TaskType::Translate | TaskType::Approve, Some(_)) => {
            return Err(AppError::bad_request("only review tasks take a review_outcome"))
        }
        _ => {}
    }

    if task.assignee.is_some_and(|assignee| assignee != actor.user_id) {
        return Err(AppError::forbidden("task is assigned to someone else"));
    }

    let loaded = teams::load_video(&mut tx, team_id, task.team_video_id).await?;
    let principal = actor.principal(&mut tx, team_id).await?;
    actor.require(&loaded.team, &principal, Action::PerformTask(loaded.scope(), &task))?;

    let now = utc_now();
    let assignee = task.assignee.unwrap_or(actor.user_id);

    sqlx::query("UPDATE tasks SET assignee = ?, review_outcome = ?, completed_at = ?, updated_at = ? WHERE id = ?")
        .bind(assignee.to_string())
        .bind(outcome.map(|o| o.as_str()))
        .bind(now)
        .bind(now)
        .bind(task_id.to_string())
        .execute(&mut *tx)
        .await?;

    if matches!(task.task_type, TaskType::Subtitle | TaskType::Translate) {
        write_subtitle_language(&mut tx, task.team_video_id, &task.language, true).await?;
    }

    tx.commit().await?;

    Ok(Task {
        assignee: Some(assignee),
        review_outcome: outcome,
        completed_at: Some(now),
        updated_at: now,
        ..task
    })
}

/// Soft delete. Deleted tasks no longer count for eligibility.
pub async fn delete_task(pool: &SqlitePool, actor: &Actor, team_id: Uuid, task_id: Uuid) -> AppResult<Task> {
    let mut tx = pool.begin().await?;
    let task = teams::fetch_task(&mut tx, team_id, task_id).await?;
    let loaded = teams::load_video(&mut tx, team_id, task.team_video_id).await?;
    let principal = actor.principal(&mut tx, team_id).await?;
    actor.require(&loaded.team, &principal, Action::DeleteTask(loaded.scope(), &task))?;

    let now = utc_now();
    sqlx::query("UPDATE tasks SET deleted = 1, updated_at = ? WHERE id = ?")
        .bind(now)
        .bind(task_id.to_string())
        .execute(&mut *tx)
        .await?;

    tx.commit().await?;
    Ok(Task { deleted: true, updated_at: now, ..task })
}

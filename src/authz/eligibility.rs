//! Which languages of a video may receive a new task of each type.
//!
//! Every query is a set difference over one snapshot of the video's subtitle
//! and task state: candidate languages minus languages blocked by existing
//! tasks. Passing a principal first gates the whole query on that user's right
//! to create the task type.

use std::collections::BTreeSet;

use serde::Serialize;
use utoipa::ToSchema;

use super::evaluator::VideoScope;
use super::principal::{Principal, ResourceContext};
use super::Role;
use crate::models::task::{ReviewOutcome, Task, TaskType};

/// Subtitle and task state of one video, read at one point in time.
#[derive(Debug, Clone, Default)]
pub struct VideoSnapshot {
    /// Languages with any subtitle work at all.
    pub started_languages: BTreeSet<String>,
    /// Languages whose subtitle set is complete.
    pub completed_languages: BTreeSet<String>,
    pub tasks: Vec<Task>,
}

impl VideoSnapshot {
    fn live_tasks(&self) -> impl Iterator<Item = &Task> {
        self.tasks.iter().filter(|t| !t.deleted)
    }

    fn languages_where(&self, keep: impl Fn(&Task) -> bool) -> BTreeSet<String> {
        self.live_tasks().filter(|t| keep(*t)).map(|t| t.language.clone()).collect()
    }
}

/// Everything the engine needs to know about one video.
#[derive(Debug, Clone, Copy)]
pub struct VideoContext<'a> {
    pub scope: VideoScope<'a>,
    pub writable_languages: &'a BTreeSet<String>,
    pub snapshot: &'a VideoSnapshot,
}

impl<'a> VideoContext<'a> {
    pub fn new(scope: VideoScope<'a>, writable_languages: &'a BTreeSet<String>, snapshot: &'a VideoSnapshot) -> Self {
        Self { scope, writable_languages, snapshot }
    }

    fn creator_role(&self, user: &Principal) -> Role {
        let ctx = ResourceContext::new().with_project(self.scope.video.project.clone());
        user.role_for(self.scope.team.id, &ctx)
    }
}

fn user_can_create_task_subtitle(ctx: &VideoContext<'_>, user: &Principal) -> bool {
    ctx.creator_role(user).is_at_least(ctx.scope.team.task_assign_policy.required_role())
}

fn user_can_create_task_translate(ctx: &VideoContext<'_>, user: &Principal) -> bool {
    ctx.creator_role(user).is_at_least(ctx.scope.team.task_assign_policy.required_role())
}

fn user_can_create_task_review(ctx: &VideoContext<'_>, user: &Principal) -> bool {
    ctx.scope
        .workflow
        .review_allowed
        .required_role()
        .is_some_and(|required| ctx.creator_role(user).is_at_least(required))
}

fn user_can_create_task_approve(ctx: &VideoContext<'_>, user: &Principal) -> bool {
    ctx.scope
        .workflow
        .approve_allowed
        .required_role()
        .is_some_and(|required| ctx.creator_role(user).is_at_least(required))
}

/// A subtitle task needs a video with no subtitle work and no subtitle task.
pub fn can_create_task_subtitle(ctx: &VideoContext<'_>, user: Option<&Principal>) -> bool {
    if user.is_some_and(|u| !user_can_create_task_subtitle(ctx, u)) {
        return false;
    }

    if !ctx.snapshot.started_languages.is_empty() {
        return false;
    }

    !ctx.snapshot.live_tasks().any(|t| t.task_type == TaskType::Subtitle)
}

/// Writable languages that can be translated into: at least one complete
/// language must exist to translate from, and a language is excluded once it
/// has any translate task or is itself complete.
pub fn can_create_task_translate(ctx: &VideoContext<'_>, user: Option<&Principal>) -> BTreeSet<String> {
    if user.is_some_and(|u| !user_can_create_task_translate(ctx, u)) {
        return BTreeSet::new();
    }

    let completed = &ctx.snapshot.completed_languages;
    if completed.is_empty() {
        return BTreeSet::new();
    }

    let translating = ctx.snapshot.languages_where(|t| t.task_type == TaskType::Translate);

    ctx.writable_languages
        .iter()
        .filter(|lang| !translating.contains(*lang) && !completed.contains(*lang))
        .cloned()
        .collect()
}

/// Complete languages with no open translate task and no review or approve
/// task of any status. Empty while the workflow has review switched off.
pub fn can_create_task_review(ctx: &VideoContext<'_>, user: Option<&Principal>) -> BTreeSet<String> {
    if !ctx.scope.workflow.review_enabled {
        return BTreeSet::new();
    }
    if user.is_some_and(|u| !user_can_create_task_review(ctx, u)) {
        return BTreeSet::new();
    }

    let blocked = ctx.snapshot.languages_where(|t| match t.task_type {
        TaskType::Translate => t.is_open(),
        TaskType::Review | TaskType::Approve => true,
        TaskType::Subtitle => false,
    });

    ctx.snapshot.completed_languages.difference(&blocked).cloned().collect()
}

/// With review enabled, languages whose review was accepted; otherwise complete
/// languages. Either way minus open translate tasks and any approve task.
/// Empty while the workflow has approval switched off.
pub fn can_create_task_approve(ctx: &VideoContext<'_>, user: Option<&Principal>) -> BTreeSet<String> {
    if !ctx.scope.workflow.approve_enabled {
        return BTreeSet::new();
    }
    if user.is_some_and(|u| !user_can_create_task_approve(ctx, u)) {
        return BTreeSet::new();
    }

    let candidates = if ctx.scope.workflow.review_enabled {
        ctx.snapshot.languages_where(|t| {
            t.task_type == TaskType::Review
                && t.completed_at.is_some()
                && t.review_outcome == Some(ReviewOutcome::Accepted)
        })
    } else {
        ctx.snapshot.completed_languages.clone()
    };

    let blocked = ctx.snapshot.languages_where(|t| match t.task_type {
        TaskType::Translate => t.is_open(),
        TaskType::Approve => true,
        TaskType::Subtitle | TaskType::Review => false,
    });

    candidates.difference(&blocked).cloned().collect()
}

/// Whether a task of `task_type` for `language` may be created right now.
/// Subtitle tasks ignore the language.
pub fn eligible_for(ctx: &VideoContext<'_>, user: Option<&Principal>, task_type: TaskType, language: &str) -> bool {
    match task_type {
        TaskType::Subtitle => can_create_task_subtitle(ctx, user),
        TaskType::Translate => can_create_task_translate(ctx, user).contains(language),
        TaskType::Review => can_create_task_review(ctx, user).contains(language),
        TaskType::Approve => can_create_task_approve(ctx, user).contains(language),
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct EligibleTasks {
    pub subtitle: bool,
    pub translate: Vec<String>,
    pub review: Vec<String>,
    pub approve: Vec<String>,
}

impl EligibleTasks {
    pub fn compute(ctx: &VideoContext<'_>, user: Option<&Principal>) -> Self {
        Self {
            subtitle: can_create_task_subtitle(ctx, user),
            translate: can_create_task_translate(ctx, user).into_iter().collect(),
            review: can_create_task_review(ctx, user).into_iter().collect(),
            approve: can_create_task_approve(ctx, user).into_iter().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::authz::policy::{ApprovePolicy, ReviewPolicy, TaskAssignPolicy};
    use crate::models::member::Membership;
    use crate::models::team::{Project, Team, Workflow};
    use crate::models::video::TeamVideo;
    use chrono::Utc;
    use uuid::Uuid;

    struct World {
        team: Team,
        video: TeamVideo,
        workflow: Workflow,
        writable: BTreeSet<String>,
        snapshot: VideoSnapshot,
    }

    impl World {
        fn new() -> Self {
            let team = Team::new("Team", "team");
            let video = TeamVideo {
                id: Uuid::new_v4(),
                team_id: team.id,
                project: Project::default_for(team.id),
                title: "Talk".into(),
                video_url: "https://example.com/talk".into(),
                added_by: Uuid::new_v4(),
                created_at: Utc::now(),
            };
            let workflow = Workflow::disabled(team.id);
            let writable = ["de", "en", "es", "fr"].into_iter().map(String::from).collect();
            Self { team, video, workflow, writable, snapshot: VideoSnapshot::default() }
        }

        fn ctx(&self) -> VideoContext<'_> {
            VideoContext::new(VideoScope::new(&self.team, &self.video, &self.workflow), &self.writable, &self.snapshot)
        }

        fn complete(&mut self, lang: &str) {
            self.snapshot.started_languages.insert(lang.into());
            self.snapshot.completed_languages.insert(lang.into());
        }

        fn add_task(&mut self, task_type: TaskType, lang: &str) -> &mut Task {
            let now = Utc::now();
            self.snapshot.tasks.push(Task {
                id: Uuid::new_v4(),
                team_id: self.team.id,
                team_video_id: self.video.id,
                task_type,
                language: lang.into(),
                assignee: None,
                review_outcome: None,
                completed_at: None,
                deleted: false,
                created_at: now,
                updated_at: now,
            });
            self.snapshot.tasks.last_mut().unwrap()
        }

        fn member(&self, role: Role) -> Principal {
            let user = Uuid::new_v4();
            Principal::new(user, self.team.id).with_membership(Some(Membership::new(self.team.id, user, role)))
        }
    }

    fn set(langs: &[&str]) -> BTreeSet<String> {
        langs.iter().map(|l| l.to_string()).collect()
    }

    #[test]
    fn fresh_video_is_subtitle_eligible_only() {
        let world = World::new();
        let ctx = world.ctx();
        assert!(can_create_task_subtitle(&ctx, None));
        assert!(can_create_task_translate(&ctx, None).is_empty());
        assert!(can_create_task_review(&ctx, None).is_empty());
        assert!(can_create_task_approve(&ctx, None).is_empty());
    }

    #[test]
    fn started_subtitles_or_existing_task_block_subtitle_tasks() {
        let mut world = World::new();
        world.add_task(TaskType::Subtitle, "en");
        assert!(!can_create_task_subtitle(&world.ctx(), None));

        world.snapshot.tasks[0].deleted = true;
        assert!(can_create_task_subtitle(&world.ctx(), None));

        world.snapshot.started_languages.insert("en".into());
        assert!(!can_create_task_subtitle(&world.ctx(), None));
    }

    #[test]
    fn translate_targets_every_other_writable_language() {
        let mut world = World::new();
        world.complete("en");
        assert_eq!(can_create_task_translate(&world.ctx(), None), set(&["de", "es", "fr"]));

        world.add_task(TaskType::Translate, "fr");
        assert_eq!(can_create_task_translate(&world.ctx(), None), set(&["de", "es"]));

        // completed translate tasks still block the language
        world.add_task(TaskType::Translate, "de").completed_at = Some(Utc::now());
        assert_eq!(can_create_task_translate(&world.ctx(), None), set(&["es"]));
    }

    #[test]
    fn started_but_incomplete_language_can_still_get_a_translate_task() {
        let mut world = World::new();
        world.complete("en");
        world.snapshot.started_languages.insert("fr".into());
        assert!(can_create_task_translate(&world.ctx(), None).contains("fr"));
    }

    #[test]
    fn review_needs_completion_and_no_blocking_task() {
        let mut world = World::new();
        world.workflow = Workflow::disabled(world.team.id).with_review(ReviewPolicy::Peer);
        world.complete("en");
        world.complete("fr");
        world.complete("de");

        world.add_task(TaskType::Translate, "fr");
        world.add_task(TaskType::Translate, "de").completed_at = Some(Utc::now());
        assert_eq!(can_create_task_review(&world.ctx(), None), set(&["de", "en"]));

        world.add_task(TaskType::Review, "en").completed_at = Some(Utc::now());
        assert_eq!(can_create_task_review(&world.ctx(), None), set(&["de"]));

        world.add_task(TaskType::Approve, "de");
        assert!(can_create_task_review(&world.ctx(), None).is_empty());
    }

    #[test]
    fn review_disabled_means_no_review_for_users() {
        let mut world = World::new();
        world.complete("en");
        let owner = world.member(Role::Owner);
        assert!(can_create_task_review(&world.ctx(), Some(&owner)).is_empty());
    }

    #[test]
    fn disabled_stages_yield_nothing_even_without_a_user() {
        let mut world = World::new();
        world.complete("en");
        assert!(can_create_task_review(&world.ctx(), None).is_empty());
        assert!(can_create_task_approve(&world.ctx(), None).is_empty());
        assert!(!eligible_for(&world.ctx(), None, TaskType::Review, "en"));
        assert!(!eligible_for(&world.ctx(), None, TaskType::Approve, "en"));

        world.workflow = Workflow::disabled(world.team.id).with_review(ReviewPolicy::Peer);
        assert_eq!(can_create_task_review(&world.ctx(), None), set(&["en"]));
        assert!(can_create_task_approve(&world.ctx(), None).is_empty());
    }

    #[test]
    fn approve_without_review_uses_completed_languages() {
        let mut world = World::new();
        world.workflow = Workflow::disabled(world.team.id).with_approve(ApprovePolicy::Managers);
        world.complete("en");
        world.complete("es");
        world.add_task(TaskType::Approve, "es");
        assert_eq!(can_create_task_approve(&world.ctx(), None), set(&["en"]));
    }

    #[test]
    fn approve_with_review_waits_for_an_accepted_review() {
        let mut world = World::new();
        world.workflow = Workflow::disabled(world.team.id)
            .with_review(ReviewPolicy::Peer)
            .with_approve(ApprovePolicy::Managers);
        world.complete("en");

        world.add_task(TaskType::Review, "en");
        assert!(can_create_task_approve(&world.ctx(), None).is_empty(), "open review is not enough");

        {
            let review = world.snapshot.tasks.last_mut().unwrap();
            review.completed_at = Some(Utc::now());
            review.review_outcome = Some(ReviewOutcome::Rejected);
        }
        assert!(can_create_task_approve(&world.ctx(), None).is_empty());

        world.snapshot.tasks.last_mut().unwrap().review_outcome = Some(ReviewOutcome::Accepted);
        assert_eq!(can_create_task_approve(&world.ctx(), None), set(&["en"]));

        world.add_task(TaskType::Translate, "en");
        assert!(can_create_task_approve(&world.ctx(), None).is_empty());
    }

    #[test]
    fn user_gates_apply_before_the_language_sets() {
        let mut world = World::new();
        world.team.task_assign_policy = TaskAssignPolicy::Managers;
        world.workflow = Workflow::disabled(world.team.id)
            .with_review(ReviewPolicy::Admins)
            .with_approve(ApprovePolicy::Admins);
        world.complete("en");

        let contributor = world.member(Role::Contributor);
        let manager = world.member(Role::Manager);
        let admin = world.member(Role::Admin);
        let ctx = world.ctx();

        assert!(can_create_task_translate(&ctx, Some(&contributor)).is_empty());
        assert!(!can_create_task_translate(&ctx, Some(&manager)).is_empty());
        assert!(can_create_task_review(&ctx, Some(&manager)).is_empty());
        assert_eq!(can_create_task_review(&ctx, Some(&admin)), set(&["en"]));
        assert!(can_create_task_approve(&ctx, Some(&manager)).is_empty());
    }

    #[test]
    fn outsiders_cannot_create_subtitle_tasks() {
        let world = World::new();
        let outsider = Principal::new(Uuid::new_v4(), world.team.id);
        assert!(!can_create_task_subtitle(&world.ctx(), Some(&outsider)));
        assert!(can_create_task_subtitle(&world.ctx(), Some(&world.member(Role::Contributor))));
    }

    #[test]
    fn queries_are_repeatable() {
        let mut world = World::new();
        world.complete("en");
        let ctx = world.ctx();
        assert_eq!(EligibleTasks::compute(&ctx, None), EligibleTasks::compute(&ctx, None));
        assert!(eligible_for(&ctx, None, TaskType::Translate, "fr"));
        assert!(!eligible_for(&ctx, None, TaskType::Translate, "en"));
    }
}

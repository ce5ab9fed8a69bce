use std::sync::Arc;

use anyhow::Result;
use sqlx::SqlitePool;
use tempfile::{tempdir, TempDir};
use uuid::Uuid;

use amara_teams::authz::{AuthzMode, DefaultPolicyEvaluator, EligibleTasks, Role};
use amara_teams::db::mutations::{self, Actor};
use amara_teams::db::{self, teams};
use amara_teams::errors::AppError;
use amara_teams::models::task::{ReviewOutcome, TaskType};
use amara_teams::models::team::{Team, TeamCreateRequest};
use amara_teams::models::video::{TeamVideo, VideoCreateRequest};

async fn setup() -> Result<(TempDir, SqlitePool)> {
    let dir = tempdir()?;
    let db_path = dir.path().join("test.db");
    let pool = db::connect(&format!("sqlite://{}", db_path.display())).await?;
    Ok((dir, pool))
}

fn actor(user_id: Uuid) -> Actor {
    Actor::new(user_id, Arc::new(DefaultPolicyEvaluator::new()), AuthzMode::Strict)
}

/// A team with one video whose English subtitles are complete.
async fn video_with_english(pool: &SqlitePool, owner: Uuid) -> Result<(Team, TeamVideo)> {
    let req = TeamCreateRequest { name: "Volunteers".into(), slug: "volunteers".into() };
    let (team, _) = mutations::create_team(pool, owner, &req).await?;

    let video_req = VideoCreateRequest {
        title: "Keynote".into(),
        video_url: "https://example.com/keynote.mp4".into(),
        project_id: None,
    };
    let video = mutations::create_video(pool, &actor(owner), team.id, &video_req).await?;
    mutations::upsert_subtitle_language(pool, &actor(owner), team.id, video.id, "en", true).await?;
    Ok((team, video))
}

async fn eligible(pool: &SqlitePool, team_id: Uuid, video_id: Uuid) -> Result<EligibleTasks> {
    let mut conn = pool.acquire().await?;
    let loaded = teams::load_video(&mut conn, team_id, video_id).await?;
    Ok(EligibleTasks::compute(&loaded.context(), None))
}

#[tokio::test]
async fn concurrent_creates_for_one_language_yield_one_task() -> Result<()> {
    let (_dir, pool) = setup().await?;
    let owner = Uuid::new_v4();
    let (team, video) = video_with_english(&pool, owner).await?;

    let first_actor = actor(owner);
    let second_actor = actor(owner);
    let (first, second) = tokio::join!(
        mutations::insert_task(&pool, &first_actor, team.id, video.id, TaskType::Translate, "fr", None),
        mutations::insert_task(&pool, &second_actor, team.id, video.id, TaskType::Translate, "fr", None),
    );

    let outcomes = [first, second];
    let created = outcomes.iter().filter(|r| r.is_ok()).count();
    assert_eq!(created, 1);
    assert!(outcomes
        .iter()
        .any(|r| matches!(r, Err(AppError::Conflict(_)))));

    let mut conn = pool.acquire().await?;
    let tasks = teams::video_tasks(&mut conn, video.id).await?;
    assert_eq!(tasks.iter().filter(|t| t.language == "fr").count(), 1);

    Ok(())
}

#[tokio::test]
async fn deleted_tasks_free_their_language() -> Result<()> {
    let (_dir, pool) = setup().await?;
    let owner = Uuid::new_v4();
    let (team, video) = video_with_english(&pool, owner).await?;

    let task = mutations::insert_task(&pool, &actor(owner), team.id, video.id, TaskType::Translate, "de", None).await?;
    assert!(!eligible(&pool, team.id, video.id).await?.translate.contains(&"de".to_string()));

    mutations::delete_task(&pool, &actor(owner), team.id, task.id).await?;
    assert!(eligible(&pool, team.id, video.id).await?.translate.contains(&"de".to_string()));

    Ok(())
}

#[tokio::test]
async fn completing_translation_marks_language_complete() -> Result<()> {
    let (_dir, pool) = setup().await?;
    let owner = Uuid::new_v4();
    let (team, video) = video_with_english(&pool, owner).await?;

    let translator = Uuid::new_v4();
    mutations::invite_member(&pool, &actor(owner), team.id, translator, Role::Contributor, None).await?;

    let task = mutations::insert_task(
        &pool,
        &actor(owner),
        team.id,
        video.id,
        TaskType::Translate,
        "fr",
        Some(translator),
    )
    .await?;
    assert_eq!(task.assignee, Some(translator));

    // someone else's task
    let err = mutations::complete_task(&pool, &actor(owner), team.id, task.id, None).await.unwrap_err();
    assert!(matches!(err, AppError::Forbidden(_)), "got {err:?}");

    let err = mutations::complete_task(&pool, &actor(translator), team.id, task.id, Some(ReviewOutcome::Accepted))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::BadRequest(_)), "got {err:?}");

    let done = mutations::complete_task(&pool, &actor(translator), team.id, task.id, None).await?;
    assert!(done.completed_at.is_some());

    let err = mutations::complete_task(&pool, &actor(translator), team.id, task.id, None).await.unwrap_err();
    assert!(matches!(err, AppError::Conflict(_)), "got {err:?}");

    let mut conn = pool.acquire().await?;
    let snapshot = teams::video_snapshot(&mut conn, video.id).await?;
    assert!(snapshot.completed_languages.contains("fr"));

    Ok(())
}

#[tokio::test]
async fn assignees_must_be_members() -> Result<()> {
    let (_dir, pool) = setup().await?;
    let owner = Uuid::new_v4();
    let (team, video) = video_with_english(&pool, owner).await?;

    let err = mutations::insert_task(
        &pool,
        &actor(owner),
        team.id,
        video.id,
        TaskType::Translate,
        "fr",
        Some(Uuid::new_v4()),
    )
    .await
    .unwrap_err();
    assert!(matches!(err, AppError::BadRequest(_)), "got {err:?}");

    // nothing was written
    assert!(eligible(&pool, team.id, video.id).await?.translate.contains(&"fr".to_string()));

    let err = mutations::insert_task(&pool, &actor(owner), team.id, Uuid::new_v4(), TaskType::Translate, "fr", None)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::NotFound(_)), "got {err:?}");

    Ok(())
}

#[tokio::test]
async fn disabled_review_rejects_review_tasks_in_every_mode() -> Result<()> {
    let (_dir, pool) = setup().await?;
    let owner = Uuid::new_v4();
    let (team, video) = video_with_english(&pool, owner).await?;

    let eligible_now = eligible(&pool, team.id, video.id).await?;
    assert!(eligible_now.review.is_empty());
    assert!(eligible_now.approve.is_empty());

    for mode in [AuthzMode::Off, AuthzMode::Advisory, AuthzMode::Strict] {
        let lenient = Actor::new(owner, Arc::new(DefaultPolicyEvaluator::new()), mode);
        for task_type in [TaskType::Review, TaskType::Approve] {
            let err = mutations::insert_task(&pool, &lenient, team.id, video.id, task_type, "en", None)
                .await
                .unwrap_err();
            assert!(matches!(err, AppError::Conflict(_)), "{mode:?} {task_type:?}: got {err:?}");
        }
    }

    let mut conn = pool.acquire().await?;
    assert!(teams::video_tasks(&mut conn, video.id).await?.is_empty());

    Ok(())
}

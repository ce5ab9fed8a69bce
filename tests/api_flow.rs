use anyhow::{Context, Result};
use axum::body::{self, Body};
use axum::http::{Request, StatusCode};
use axum::response::Response;
use axum::Router;
use serde_json::{json, Value};
use sqlx::SqlitePool;
use tempfile::{tempdir, TempDir};
use tower::util::ServiceExt; // for `oneshot`
use uuid::Uuid;

use amara_teams::app::{router, AppState};
use amara_teams::authz::AuthzMode;
use amara_teams::db;
use amara_teams::events::{init_event_bus, start_activity_listener};
use amara_teams::jwt::JwtConfig;

struct TestApp {
    _dir: TempDir,
    app: Router,
    jwt: JwtConfig,
}

impl TestApp {
    async fn start(mode: AuthzMode) -> Result<Self> {
        let dir = tempdir().context("failed to create tempdir")?;
        let db_path = dir.path().join("test.db");
        let pool: SqlitePool = db::connect(&format!("sqlite://{}", db_path.display())).await?;

        let jwt = JwtConfig::new("test-secret", 1);
        let (event_bus, rx) = init_event_bus();
        tokio::spawn(start_activity_listener(rx, pool.clone()));

        let app = router(AppState::new(pool, jwt.clone(), event_bus, mode));
        Ok(Self { _dir: dir, app, jwt })
    }

    async fn call(&self, method: &str, uri: &str, user: Option<Uuid>, body: Option<Value>) -> Result<(StatusCode, Value)> {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(user) = user {
            builder = builder.header("authorization", format!("Bearer {}", self.jwt.encode(user)?));
        }
        let req = match body {
            Some(body) => builder
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))?,
            None => builder.body(Body::empty())?,
        };

        let resp: Response = self.app.clone().oneshot(req).await?;
        let status = resp.status();
        let bytes = body::to_bytes(resp.into_body(), 10_485_760).await?;
        let value = if bytes.is_empty() { Value::Null } else { serde_json::from_slice(&bytes)? };
        Ok((status, value))
    }

    async fn expect(&self, method: &str, uri: &str, user: Uuid, body: Option<Value>, expected: StatusCode) -> Result<Value> {
        let (status, value) = self.call(method, uri, Some(user), body).await?;
        if status != expected {
            panic!("{method} {uri}: expected {expected}, got {status} - {value}");
        }
        Ok(value)
    }
}

fn id_of(value: &Value) -> Result<String> {
    value.get("id").and_then(Value::as_str).map(str::to_string).context("missing id")
}

fn languages(value: &Value, field: &str) -> Vec<String> {
    value[field]
        .as_array()
        .map(|items| items.iter().filter_map(|v| v.as_str().map(str::to_string)).collect())
        .unwrap_or_default()
}

#[tokio::test]
async fn task_workflow_through_the_api() -> Result<()> {
    let t = TestApp::start(AuthzMode::Strict).await?;
    let owner = Uuid::new_v4();
    let manager = Uuid::new_v4();
    let contributor = Uuid::new_v4();

    let team = t
        .expect("POST", "/teams", owner, Some(json!({ "name": "Volunteers", "slug": "volunteers" })), StatusCode::CREATED)
        .await?;
    let team_id = id_of(&team)?;

    for (user, role) in [(manager, "manager"), (contributor, "contributor")] {
        t.expect(
            "POST",
            &format!("/teams/{team_id}/members"),
            owner,
            Some(json!({ "user_id": user, "role": role })),
            StatusCode::CREATED,
        )
        .await?;
    }

    let video = t
        .expect(
            "POST",
            &format!("/teams/{team_id}/videos"),
            contributor,
            Some(json!({ "title": "Keynote", "video_url": "https://example.com/keynote.mp4" })),
            StatusCode::CREATED,
        )
        .await?;
    let video_id = id_of(&video)?;
    let eligible_uri = format!("/teams/{team_id}/videos/{video_id}/eligible-tasks");
    let tasks_uri = format!("/teams/{team_id}/videos/{video_id}/tasks");

    let fresh = t.expect("GET", &eligible_uri, owner, None, StatusCode::OK).await?;
    assert_eq!(fresh["subtitle"], true);
    assert!(languages(&fresh, "translate").is_empty());

    t.expect(
        "PUT",
        &format!("/teams/{team_id}/videos/{video_id}/languages/en"),
        contributor,
        Some(json!({ "complete": true })),
        StatusCode::OK,
    )
    .await?;

    let after_en = t.expect("GET", &eligible_uri, owner, None, StatusCode::OK).await?;
    assert_eq!(after_en["subtitle"], false);
    let translate = languages(&after_en, "translate");
    assert!(translate.contains(&"fr".to_string()));
    assert!(!translate.contains(&"en".to_string()));
    assert!(languages(&after_en, "review").is_empty(), "review is disabled by default");
    assert!(languages(&after_en, "approve").is_empty());

    t.expect(
        "POST",
        &tasks_uri,
        contributor,
        Some(json!({ "task_type": "translate", "language": "fr" })),
        StatusCode::CREATED,
    )
    .await?;

    let after_fr = t.expect("GET", &eligible_uri, owner, None, StatusCode::OK).await?;
    assert!(!languages(&after_fr, "translate").contains(&"fr".to_string()));

    // somebody already claimed fr
    t.expect(
        "POST",
        &tasks_uri,
        manager,
        Some(json!({ "task_type": "translate", "language": "fr" })),
        StatusCode::CONFLICT,
    )
    .await?;

    // managers cannot switch the workflow on
    let workflow = json!({
        "project_id": null,
        "review_enabled": true,
        "review_allowed": "peer",
        "approve_enabled": true,
        "approve_allowed": "managers"
    });
    t.expect("PUT", &format!("/teams/{team_id}/workflow"), manager, Some(workflow.clone()), StatusCode::FORBIDDEN)
        .await?;
    t.expect("PUT", &format!("/teams/{team_id}/workflow"), owner, Some(workflow), StatusCode::OK).await?;

    let with_review = t.expect("GET", &eligible_uri, contributor, None, StatusCode::OK).await?;
    assert_eq!(languages(&with_review, "review"), vec!["en".to_string()]);
    assert!(languages(&with_review, "approve").is_empty(), "approval waits for an accepted review");

    let review = t
        .expect(
            "POST",
            &tasks_uri,
            contributor,
            Some(json!({ "task_type": "review", "language": "en" })),
            StatusCode::CREATED,
        )
        .await?;
    let review_id = id_of(&review)?;

    t.expect(
        "POST",
        &format!("/teams/{team_id}/tasks/{review_id}/complete"),
        contributor,
        Some(json!({})),
        StatusCode::BAD_REQUEST,
    )
    .await?;
    let completed = t
        .expect(
            "POST",
            &format!("/teams/{team_id}/tasks/{review_id}/complete"),
            contributor,
            Some(json!({ "review_outcome": "accepted" })),
            StatusCode::OK,
        )
        .await?;
    assert_eq!(completed["review_outcome"], "accepted");

    let for_manager = t.expect("GET", &eligible_uri, manager, None, StatusCode::OK).await?;
    assert_eq!(languages(&for_manager, "approve"), vec!["en".to_string()]);
    assert!(languages(&for_manager, "review").is_empty());

    let for_contributor = t.expect("GET", &eligible_uri, contributor, None, StatusCode::OK).await?;
    assert!(languages(&for_contributor, "approve").is_empty());

    t.expect(
        "POST",
        &tasks_uri,
        contributor,
        Some(json!({ "task_type": "approve", "language": "en" })),
        StatusCode::FORBIDDEN,
    )
    .await?;
    t.expect(
        "POST",
        &tasks_uri,
        manager,
        Some(json!({ "task_type": "approve", "language": "en" })),
        StatusCode::CREATED,
    )
    .await?;

    Ok(())
}

#[tokio::test]
async fn roles_and_permission_flags_follow_narrowings() -> Result<()> {
    let t = TestApp::start(AuthzMode::Strict).await?;
    let owner = Uuid::new_v4();
    let linguist = Uuid::new_v4();
    let outsider = Uuid::new_v4();

    let team = t
        .expect("POST", "/teams", owner, Some(json!({ "name": "Linguists", "slug": "linguists" })), StatusCode::CREATED)
        .await?;
    let team_id = id_of(&team)?;

    t.expect(
        "POST",
        &format!("/teams/{team_id}/members"),
        owner,
        Some(json!({ "user_id": linguist, "role": "contributor" })),
        StatusCode::CREATED,
    )
    .await?;

    let saved = t
        .expect(
            "PUT",
            &format!("/teams/{team_id}/members/{linguist}/role"),
            owner,
            Some(json!({ "role": "manager", "languages": ["en"] })),
            StatusCode::OK,
        )
        .await?;
    assert_eq!(saved["role"], "manager");

    let role_uri = format!("/teams/{team_id}/members/{linguist}/role");
    let in_en = t.expect("GET", &format!("{role_uri}?language=en"), linguist, None, StatusCode::OK).await?;
    assert_eq!(in_en["base_role"], "manager");
    assert_eq!(in_en["effective_role"], "manager");

    let in_fr = t.expect("GET", &format!("{role_uri}?language=fr"), owner, None, StatusCode::OK).await?;
    assert_eq!(in_fr["effective_role"], "contributor");

    t.expect("GET", &role_uri, outsider, None, StatusCode::FORBIDDEN).await?;

    let flags = t
        .expect("GET", &format!("/teams/{team_id}/permissions"), owner, None, StatusCode::OK)
        .await?;
    assert_eq!(flags["can_rename_team"], true);
    assert_eq!(flags["can_join"], false);

    let outsider_flags = t
        .expect("GET", &format!("/teams/{team_id}/permissions"), outsider, None, StatusCode::OK)
        .await?;
    assert_eq!(outsider_flags["base_role"], "outsider");
    assert_eq!(outsider_flags["can_join"], true);
    assert_eq!(outsider_flags["can_change_team_settings"], false);

    t.expect("POST", &format!("/teams/{team_id}/join"), outsider, None, StatusCode::CREATED).await?;
    t.expect("POST", &format!("/teams/{team_id}/join"), outsider, None, StatusCode::CONFLICT).await?;

    let (status, _) = t.call("GET", &format!("/teams/{team_id}"), None, None).await?;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    Ok(())
}

#[tokio::test]
async fn advisory_mode_logs_denials_but_keeps_data_checks() -> Result<()> {
    let t = TestApp::start(AuthzMode::Advisory).await?;
    let owner = Uuid::new_v4();
    let outsider = Uuid::new_v4();

    let team = t
        .expect("POST", "/teams", owner, Some(json!({ "name": "Open Door", "slug": "open-door" })), StatusCode::CREATED)
        .await?;
    let team_id = id_of(&team)?;

    let video = t
        .expect(
            "POST",
            &format!("/teams/{team_id}/videos"),
            owner,
            Some(json!({ "title": "Talk", "video_url": "https://example.com/talk.mp4" })),
            StatusCode::CREATED,
        )
        .await?;
    let video_id = id_of(&video)?;
    let tasks_uri = format!("/teams/{team_id}/videos/{video_id}/tasks");

    t.expect(
        "PUT",
        &format!("/teams/{team_id}/videos/{video_id}/languages/en"),
        owner,
        Some(json!({ "complete": true })),
        StatusCode::OK,
    )
    .await?;

    // an outsider would be refused in strict mode
    t.expect(
        "POST",
        &tasks_uri,
        outsider,
        Some(json!({ "task_type": "translate", "language": "de" })),
        StatusCode::CREATED,
    )
    .await?;

    // eligibility itself is never advisory
    t.expect(
        "POST",
        &tasks_uri,
        outsider,
        Some(json!({ "task_type": "translate", "language": "en" })),
        StatusCode::CONFLICT,
    )
    .await?;

    Ok(())
}

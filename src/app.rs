use std::sync::Arc;

use axum::http::Method;
use axum::routing::{delete, get, post, put};
use axum::Router;
use sqlx::SqlitePool;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use uuid::Uuid;

use crate::authz::{AuthzMode, DefaultPolicyEvaluator, PolicyEvaluator};
use crate::db::mutations::Actor;
use crate::db::SqliteStore;
use crate::errors::AppError;
use crate::events::{init_event_bus, start_activity_listener, EventBus};
use crate::jwt::JwtConfig;
use crate::routes::{health, members, tasks, teams, videos};

#[derive(Clone)]
pub struct AppState {
    pub pool: SqlitePool,
    pub jwt: Arc<JwtConfig>,
    pub event_bus: EventBus,
    pub evaluator: Arc<dyn PolicyEvaluator>,
    pub authz_mode: AuthzMode,
}

impl AppState {
    pub fn new(pool: SqlitePool, jwt: JwtConfig, event_bus: EventBus, authz_mode: AuthzMode) -> Self {
        Self {
            pool,
            jwt: Arc::new(jwt),
            event_bus,
            evaluator: Arc::new(DefaultPolicyEvaluator::new()),
            authz_mode,
        }
    }

    pub fn actor(&self, user_id: Uuid) -> Actor {
        Actor::new(user_id, self.evaluator.clone(), self.authz_mode)
    }

    pub fn store(&self) -> SqliteStore {
        SqliteStore::new(self.pool.clone())
    }
}

pub async fn create_app(pool: SqlitePool) -> Result<Router, AppError> {
    let jwt_config = JwtConfig::from_env()?;
    let authz_mode = AuthzMode::from_env();
    tracing::info!(?authz_mode, "authorization mode");

    let (event_bus, rx) = init_event_bus();
    tokio::spawn(start_activity_listener(rx, pool.clone()));

    let state = AppState::new(pool, jwt_config, event_bus, authz_mode);
    Ok(router(state))
}

pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE, Method::OPTIONS])
        .allow_origin(Any)
        .allow_headers(Any);

    let team_routes = Router::new()
        .route("/", post(teams::create_team))
        .route("/:team_id", get(teams::get_team))
        .route("/:team_id/settings", put(teams::update_settings))
        .route("/:team_id/workflow", put(teams::update_workflow))
        .route("/:team_id/projects", post(teams::create_project))
        .route("/:team_id/permissions", get(teams::permissions))
        .route("/:team_id/join", post(members::join_team))
        .route("/:team_id/members", post(members::add_member))
        .route("/:team_id/members/:user_id", delete(members::remove_member))
        .route(
            "/:team_id/members/:user_id/role",
            get(members::effective_role).put(members::save_role),
        )
        .route("/:team_id/videos", post(videos::create_video))
        .route("/:team_id/videos/:video_id", delete(videos::delete_video))
        .route(
            "/:team_id/videos/:video_id/languages/:language",
            put(videos::update_language),
        )
        .route("/:team_id/videos/:video_id/eligible-tasks", get(tasks::eligible_tasks))
        .route("/:team_id/videos/:video_id/tasks", post(tasks::create_task))
        .route("/:team_id/tasks/:task_id/assign", put(tasks::assign_task))
        .route("/:team_id/tasks/:task_id/complete", post(tasks::complete_task))
        .route("/:team_id/tasks/:task_id", delete(tasks::delete_task));

    Router::new()
        .route("/api/health", get(health::health))
        .nest("/teams", team_routes)
        .with_state(state)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}

use async_trait::async_trait;
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::authz::MembershipStore;
use crate::db::teams;
use crate::errors::AppResult;
use crate::models::member::Membership;

/// Membership lookups backed by the connection pool.
#[derive(Debug, Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl MembershipStore for SqliteStore {
    async fn membership(&self, team_id: Uuid, user_id: Uuid) -> AppResult<Option<Membership>> {
        let mut conn = self.pool.acquire().await?;
        teams::fetch_membership(&mut conn, team_id, user_id).await
    }
}

use std::collections::HashMap;

use async_trait::async_trait;
use uuid::Uuid;

use crate::errors::AppResult;
use crate::models::member::Membership;

/// Source of membership records (with their narrowings).
#[async_trait]
pub trait MembershipStore: Send + Sync {
    async fn membership(&self, team_id: Uuid, user_id: Uuid) -> AppResult<Option<Membership>>;
}

/// Request-scoped memo of membership lookups keyed by (team, user).
///
/// Create one per request and drop it with the request. Any code that changes a
/// membership during the request must call [`MembershipCache::invalidate`].
pub struct MembershipCache<'s, S: MembershipStore + ?Sized> {
    store: &'s S,
    entries: HashMap<(Uuid, Uuid), Option<Membership>>,
}

impl<'s, S: MembershipStore + ?Sized> MembershipCache<'s, S> {
    pub fn new(store: &'s S) -> Self {
        Self { store, entries: HashMap::new() }
    }

    pub async fn get(&mut self, team_id: Uuid, user_id: Uuid) -> AppResult<Option<Membership>> {
        if let Some(hit) = self.entries.get(&(team_id, user_id)) {
            return Ok(hit.clone());
        }

        let membership = self.store.membership(team_id, user_id).await?;
        self.entries.insert((team_id, user_id), membership.clone());
        Ok(membership)
    }

    pub fn invalidate(&mut self, team_id: Uuid, user_id: Uuid) {
        self.entries.remove(&(team_id, user_id));
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::authz::Role;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    #[derive(Default)]
    struct CountingStore {
        rows: Mutex<HashMap<(Uuid, Uuid), Membership>>,
        lookups: AtomicUsize,
    }

    #[async_trait]
    impl MembershipStore for CountingStore {
        async fn membership(&self, team_id: Uuid, user_id: Uuid) -> AppResult<Option<Membership>> {
            self.lookups.fetch_add(1, Ordering::SeqCst);
            Ok(self.rows.lock().unwrap().get(&(team_id, user_id)).cloned())
        }
    }

    #[tokio::test]
    async fn lookups_are_memoized_including_absence() {
        let store = CountingStore::default();
        let (team, user) = (Uuid::new_v4(), Uuid::new_v4());
        let mut cache = MembershipCache::new(&store);

        assert!(cache.get(team, user).await.unwrap().is_none());
        assert!(cache.get(team, user).await.unwrap().is_none());
        assert_eq!(store.lookups.load(Ordering::SeqCst), 1);
        assert_eq!(cache.len(), 1);
    }

    #[tokio::test]
    async fn invalidation_forces_a_fresh_read() {
        let store = CountingStore::default();
        let (team, user) = (Uuid::new_v4(), Uuid::new_v4());
        let mut cache = MembershipCache::new(&store);

        assert!(cache.get(team, user).await.unwrap().is_none());

        store.rows.lock().unwrap().insert((team, user), Membership::new(team, user, Role::Manager));
        assert!(cache.get(team, user).await.unwrap().is_none(), "stale until invalidated");

        cache.invalidate(team, user);
        let fresh = cache.get(team, user).await.unwrap().unwrap();
        assert_eq!(fresh.role, Role::Manager);
        assert_eq!(store.lookups.load(Ordering::SeqCst), 2);
    }
}

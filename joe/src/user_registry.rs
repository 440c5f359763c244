//! Maps chat user ids to their engine-side [`User`], creating one on
//! first contact.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{Mutex, RwLock};

use crate::model::{Session, User, UserInfo};

/// Resolves a chat user id to profile information. An external
/// collaborator — the concrete implementation talks to the chat
/// transport's users API.
#[async_trait]
pub trait UserInformer: Send + Sync {
    async fn fetch(&self, user_id: &str) -> anyhow::Result<UserInfo>;
}

pub struct UserRegistry {
    users: RwLock<HashMap<String, Arc<Mutex<User>>>>,
    quota_limit: u32,
    quota_interval: Duration,
}

impl UserRegistry {
    pub fn new(quota_limit: u32, quota_interval: Duration) -> Self {
        Self {
            users: RwLock::new(HashMap::new()),
            quota_limit,
            quota_interval,
        }
    }

    /// Returns the existing user, or creates one via `informer` on first
    /// contact. Concurrent first-contacts for the same id race; the
    /// first insert wins and the loser's `informer` lookup is discarded.
    pub async fn get_or_create(
        &self,
        user_id: &str,
        informer: &dyn UserInformer,
    ) -> anyhow::Result<Arc<Mutex<User>>> {
        if let Some(existing) = self.users.read().await.get(user_id) {
            return Ok(existing.clone());
        }

        let user_info = informer.fetch(user_id).await?;
        let session = Session::new(self.quota_limit, self.quota_interval);
        let user = Arc::new(Mutex::new(User { user_info, session }));

        let mut guard = self.users.write().await;
        let entry = guard.entry(user_id.to_string()).or_insert_with(|| user.clone());
        Ok(entry.clone())
    }

    pub async fn snapshot_ids(&self) -> Vec<String> {
        self.users.read().await.keys().cloned().collect()
    }

    pub async fn get(&self, user_id: &str) -> Option<Arc<Mutex<User>>> {
        self.users.read().await.get(user_id).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedInformer;

    #[async_trait]
    impl UserInformer for FixedInformer {
        async fn fetch(&self, user_id: &str) -> anyhow::Result<UserInfo> {
            Ok(UserInfo {
                id: user_id.to_string(),
                name: format!("user-{user_id}"),
                real_name: format!("User {user_id}"),
            })
        }
    }

    #[tokio::test]
    async fn creates_a_user_on_first_contact_and_reuses_it() {
        let registry = UserRegistry::new(10, Duration::from_secs(60));
        let informer = FixedInformer;

        let a = registry.get_or_create("U1", &informer).await.unwrap();
        let b = registry.get_or_create("U1", &informer).await.unwrap();

        assert!(Arc::ptr_eq(&a, &b));
    }
}

//! HashMap-backed repositories.
//!
//! Used for local development without Postgres and by the test suites. Each
//! method takes the lock once, so a compare-and-swap in `replace_request` is
//! atomic the same way a single-row `UPDATE ... WHERE version = $n` is.

use std::collections::{HashMap, HashSet};
use std::sync::RwLock;

use async_trait::async_trait;
use chrono::Utc;
use uuid::Uuid;

use crate::payment::{PaymentEvent, PaymentEventStatus};
use crate::repository::{PaymentEventRepository, RequestRepository, UserRepository};
use crate::request::TravelRequest;
use crate::user::{GuideProfile, Role, User};
use crate::{CoreError, CoreResult};

fn poisoned<T>(_: T) -> CoreError {
    CoreError::StorageError("in-memory store lock poisoned".to_string())
}

#[derive(Default)]
pub struct InMemoryRequestRepository {
    requests: RwLock<HashMap<Uuid, TravelRequest>>,
}

impl InMemoryRequestRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RequestRepository for InMemoryRequestRepository {
    async fn insert_request(&self, request: &TravelRequest) -> CoreResult<()> {
        let mut requests = self.requests.write().map_err(poisoned)?;
        if requests.contains_key(&request.id) {
            return Err(CoreError::Conflict(format!("request {} already exists", request.id)));
        }
        requests.insert(request.id, request.clone());
        Ok(())
    }

    async fn get_request(&self, id: Uuid) -> CoreResult<Option<TravelRequest>> {
        let requests = self.requests.read().map_err(poisoned)?;
        Ok(requests.get(&id).cloned())
    }

    async fn replace_request(&self, request: &TravelRequest) -> CoreResult<TravelRequest> {
        let mut requests = self.requests.write().map_err(poisoned)?;
        let stored = requests
            .get_mut(&request.id)
            .ok_or_else(|| CoreError::NotFound(format!("request {}", request.id)))?;

        if stored.version != request.version {
            return Err(CoreError::Conflict(format!(
                "request {} is at version {}, write was based on {}",
                request.id, stored.version, request.version
            )));
        }

        let mut next = request.clone();
        next.version += 1;
        next.updated_at = Utc::now();
        *stored = next.clone();
        Ok(next)
    }

    async fn delete_request(&self, id: Uuid) -> CoreResult<()> {
        let mut requests = self.requests.write().map_err(poisoned)?;
        requests
            .remove(&id)
            .map(|_| ())
            .ok_or_else(|| CoreError::NotFound(format!("request {}", id)))
    }

    async fn list_by_traveler(&self, traveler_id: &str) -> CoreResult<Vec<TravelRequest>> {
        let requests = self.requests.read().map_err(poisoned)?;
        let mut found: Vec<TravelRequest> = requests
            .values()
            .filter(|r| r.traveler_id == traveler_id)
            .cloned()
            .collect();
        found.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(found)
    }

    async fn list_by_guide(&self, guide_id: &str) -> CoreResult<Vec<TravelRequest>> {
        let requests = self.requests.read().map_err(poisoned)?;
        let mut found: Vec<TravelRequest> = requests
            .values()
            .filter(|r| r.is_assigned_to(guide_id))
            .cloned()
            .collect();
        found.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(found)
    }
}

#[derive(Default)]
pub struct InMemoryUserRepository {
    users: RwLock<HashMap<String, User>>,
    guide_profiles: RwLock<HashMap<String, GuideProfile>>,
    admins: RwLock<HashSet<String>>,
}

impl InMemoryUserRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn grant_admin(&self, uid: &str) -> CoreResult<()> {
        self.admins.write().map_err(poisoned)?.insert(uid.to_string());
        Ok(())
    }
}

#[async_trait]
impl UserRepository for InMemoryUserRepository {
    async fn insert_user(&self, user: &User) -> CoreResult<()> {
        let mut users = self.users.write().map_err(poisoned)?;
        if users.contains_key(&user.uid) {
            return Err(CoreError::Conflict(format!("user {} already exists", user.uid)));
        }
        users.insert(user.uid.clone(), user.clone());
        Ok(())
    }

    async fn update_profile(&self, user: &User) -> CoreResult<()> {
        let mut users = self.users.write().map_err(poisoned)?;
        let stored = users
            .get_mut(&user.uid)
            .ok_or_else(|| CoreError::NotFound(format!("user {}", user.uid)))?;
        let fcm_tokens = std::mem::take(&mut stored.fcm_tokens);
        *stored = User {
            fcm_tokens,
            ..user.clone()
        };
        Ok(())
    }

    async fn get_user(&self, uid: &str) -> CoreResult<Option<User>> {
        Ok(self.users.read().map_err(poisoned)?.get(uid).cloned())
    }

    async fn list_users_by_role(&self, role: Role) -> CoreResult<Vec<User>> {
        let users = self.users.read().map_err(poisoned)?;
        let mut found: Vec<User> = users.values().filter(|u| u.role == role).cloned().collect();
        found.sort_by(|a, b| a.uid.cmp(&b.uid));
        Ok(found)
    }

    async fn get_guide_profile(&self, uid: &str) -> CoreResult<Option<GuideProfile>> {
        Ok(self.guide_profiles.read().map_err(poisoned)?.get(uid).cloned())
    }

    async fn save_guide_profile(&self, profile: &GuideProfile) -> CoreResult<()> {
        self.guide_profiles
            .write()
            .map_err(poisoned)?
            .insert(profile.uid.clone(), profile.clone());
        Ok(())
    }

    async fn add_push_token(&self, uid: &str, token: &str) -> CoreResult<()> {
        let mut users = self.users.write().map_err(poisoned)?;
        let user = users
            .get_mut(uid)
            .ok_or_else(|| CoreError::NotFound(format!("user {}", uid)))?;
        user.fcm_tokens.insert(token.to_string());
        Ok(())
    }

    async fn remove_push_token(&self, uid: &str, token: &str) -> CoreResult<()> {
        let mut users = self.users.write().map_err(poisoned)?;
        if let Some(user) = users.get_mut(uid) {
            user.fcm_tokens.remove(token);
        }
        Ok(())
    }

    async fn is_admin(&self, uid: &str) -> CoreResult<bool> {
        Ok(self.admins.read().map_err(poisoned)?.contains(uid))
    }
}

#[derive(Default)]
pub struct InMemoryPaymentEventRepository {
    events: RwLock<Vec<PaymentEvent>>,
}

impl InMemoryPaymentEventRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn all(&self) -> CoreResult<Vec<PaymentEvent>> {
        Ok(self.events.read().map_err(poisoned)?.clone())
    }
}

#[async_trait]
impl PaymentEventRepository for InMemoryPaymentEventRepository {
    async fn record_event(&self, event: &PaymentEvent) -> CoreResult<()> {
        self.events.write().map_err(poisoned)?.push(event.clone());
        Ok(())
    }

    async fn find_by_event_id(&self, event_id: &str) -> CoreResult<Option<PaymentEvent>> {
        let events = self.events.read().map_err(poisoned)?;
        Ok(events
            .iter()
            .find(|e| e.event_id.as_deref() == Some(event_id))
            .cloned())
    }

    async fn update_event_status(
        &self,
        id: Uuid,
        status: PaymentEventStatus,
        reason: Option<&str>,
        request_id: Option<Uuid>,
    ) -> CoreResult<()> {
        let mut events = self.events.write().map_err(poisoned)?;
        let event = events
            .iter_mut()
            .find(|e| e.id == id)
            .ok_or_else(|| CoreError::NotFound(format!("payment event {}", id)))?;
        event.status = status;
        event.reason = reason.map(String::from);
        if request_id.is_some() {
            event.request_id = request_id;
        }
        Ok(())
    }

    async fn list_by_status(&self, status: PaymentEventStatus) -> CoreResult<Vec<PaymentEvent>> {
        let events = self.events.read().map_err(poisoned)?;
        Ok(events.iter().filter(|e| e.status == status).cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_replace_is_compare_and_swap() {
        let repo = InMemoryRequestRepository::new();
        let request = TravelRequest::new_draft("traveler-1".to_string());
        repo.insert_request(&request).await.unwrap();

        let stored = repo.replace_request(&request).await.unwrap();
        assert_eq!(stored.version, 1);

        // Second writer still holds version 0
        let stale = repo.replace_request(&request).await;
        assert!(matches!(stale, Err(CoreError::Conflict(_))));

        let again = repo.replace_request(&stored).await.unwrap();
        assert_eq!(again.version, 2);
    }

    #[tokio::test]
    async fn test_push_tokens_are_a_set() {
        let repo = InMemoryUserRepository::new();
        let user = User::new("guide-1".to_string(), Role::Guide, "Meera".to_string());
        repo.insert_user(&user).await.unwrap();

        repo.add_push_token("guide-1", "tok-a").await.unwrap();
        repo.add_push_token("guide-1", "tok-a").await.unwrap();
        repo.add_push_token("guide-1", "tok-b").await.unwrap();
        repo.remove_push_token("guide-1", "tok-b").await.unwrap();

        let stored = repo.get_user("guide-1").await.unwrap().unwrap();
        assert_eq!(stored.fcm_tokens.len(), 1);
        assert!(stored.fcm_tokens.contains("tok-a"));
    }

    #[tokio::test]
    async fn test_profile_update_keeps_stored_push_tokens() {
        let repo = InMemoryUserRepository::new();
        let user = User::new("traveler-1".to_string(), Role::Traveler, "Asha".to_string());
        repo.insert_user(&user).await.unwrap();
        repo.add_push_token("traveler-1", "tok-a").await.unwrap();
        repo.add_push_token("traveler-1", "tok-b").await.unwrap();

        // Edit based on a read taken before tok-b was pruned
        let mut edited = repo.get_user("traveler-1").await.unwrap().unwrap();
        repo.remove_push_token("traveler-1", "tok-b").await.unwrap();
        edited.display_name = "Asha K".to_string();
        repo.update_profile(&edited).await.unwrap();

        let stored = repo.get_user("traveler-1").await.unwrap().unwrap();
        assert_eq!(stored.display_name, "Asha K");
        assert_eq!(stored.fcm_tokens.len(), 1);
        assert!(stored.fcm_tokens.contains("tok-a"));
    }

    #[tokio::test]
    async fn test_profile_update_requires_existing_user() {
        let repo = InMemoryUserRepository::new();
        let user = User::new("ghost".to_string(), Role::Traveler, "Nobody".to_string());
        assert!(matches!(repo.update_profile(&user).await, Err(CoreError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_insert_user_rejects_existing_uid() {
        let repo = InMemoryUserRepository::new();
        let user = User::new("u-1".to_string(), Role::Traveler, "Asha".to_string());
        repo.insert_user(&user).await.unwrap();

        let mut guide = user.clone();
        guide.role = Role::Guide;
        assert!(matches!(repo.insert_user(&guide).await, Err(CoreError::Conflict(_))));
    }
}

use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};
use log::info;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::common::errors::CoreError;
use crate::common::models::{GeoPoint, UserProfile, UserRole};

/// Single source of truth for the user roster.
///
/// A map keyed by id plus an insertion-order index and an email index.
/// All three live under one lock so every call sees a consistent
/// snapshot and every mutation is atomic per record.
pub struct DirectoryStore {
    inner: RwLock<Roster>,
    flash_ttl: Duration,
}

#[derive(Default)]
struct Roster {
    users: HashMap<Uuid, UserProfile>,
    order: Vec<Uuid>,
    emails: HashMap<String, Uuid>,
}

impl Roster {
    /// Lazy expiry: a flash window that has passed is cleared on read.
    fn normalize_flash(&mut self, id: Uuid, now: DateTime<Utc>) {
        if let Some(user) = self.users.get_mut(&id) {
            if matches!(user.flash_until, Some(until) if until <= now) {
                user.flash_until = None;
            }
        }
    }
}

impl DirectoryStore {
    pub fn new(flash_ttl: Duration) -> Self {
        Self {
            inner: RwLock::new(Roster::default()),
            flash_ttl,
        }
    }

    pub async fn add_user(&self, mut profile: UserProfile) -> Result<(), CoreError> {
        let mut roster = self.inner.write().await;
        if roster.users.contains_key(&profile.id) || roster.emails.contains_key(&profile.email) {
            return Err(CoreError::DuplicateUser);
        }
        if !profile.location.is_valid() {
            return Err(CoreError::InvalidLocation {
                lat: profile.location.lat,
                lng: profile.location.lng,
            });
        }
        profile.reputation = profile.reputation.clamp(0.0, 5.0);
        info!("Directory: added {} ({})", profile.name, profile.id);
        roster.emails.insert(profile.email.clone(), profile.id);
        roster.order.push(profile.id);
        roster.users.insert(profile.id, profile);
        Ok(())
    }

    /// Roster snapshot in insertion order. Expired flash windows are
    /// cleared before the snapshot is taken.
    pub async fn list_users(&self) -> Vec<UserProfile> {
        let now = Utc::now();
        let mut roster = self.inner.write().await;
        let ids: Vec<Uuid> = roster.order.clone();
        for id in &ids {
            roster.normalize_flash(*id, now);
        }
        ids.iter()
            .filter_map(|id| roster.users.get(id).cloned())
            .collect()
    }

    pub async fn get(&self, id: Uuid) -> Result<UserProfile, CoreError> {
        let mut roster = self.inner.write().await;
        roster.normalize_flash(id, Utc::now());
        roster
            .users
            .get(&id)
            .cloned()
            .ok_or(CoreError::UserNotFound(id))
    }

    pub async fn contains(&self, id: Uuid) -> bool {
        self.inner.read().await.users.contains_key(&id)
    }

    pub async fn find_by_email(&self, email: &str) -> Option<UserProfile> {
        let roster = self.inner.read().await;
        let id = roster.emails.get(email)?;
        roster.users.get(id).cloned()
    }

    /// Overwrites the user's position. Last writer wins.
    pub async fn update_location(&self, id: Uuid, lat: f64, lng: f64) -> Result<(), CoreError> {
        let point = GeoPoint::new(lat, lng);
        if !point.is_valid() {
            return Err(CoreError::InvalidLocation { lat, lng });
        }
        let mut roster = self.inner.write().await;
        let user = roster.users.get_mut(&id).ok_or(CoreError::UserNotFound(id))?;
        user.location = point;
        Ok(())
    }

    pub async fn delete_user(&self, id: Uuid) -> Result<UserProfile, CoreError> {
        let mut roster = self.inner.write().await;
        let user = roster.users.remove(&id).ok_or(CoreError::UserNotFound(id))?;
        roster.order.retain(|u| *u != id);
        roster.emails.remove(&user.email);
        info!("Directory: removed {} ({})", user.name, user.id);
        Ok(user)
    }

    pub async fn set_role(&self, id: Uuid, role: UserRole) -> Result<(), CoreError> {
        let mut roster = self.inner.write().await;
        let user = roster.users.get_mut(&id).ok_or(CoreError::UserNotFound(id))?;
        user.role = role;
        info!("Directory: {} is now {:?}", user.name, role);
        Ok(())
    }

    pub async fn set_online(&self, id: Uuid, online: bool) -> Result<(), CoreError> {
        let mut roster = self.inner.write().await;
        let user = roster.users.get_mut(&id).ok_or(CoreError::UserNotFound(id))?;
        user.is_online = online;
        Ok(())
    }

    /// Turns the flash status on for the configured window and returns
    /// the expiry instant.
    pub async fn set_flash(&self, id: Uuid) -> Result<DateTime<Utc>, CoreError> {
        let until = Utc::now() + self.flash_ttl;
        let mut roster = self.inner.write().await;
        let user = roster.users.get_mut(&id).ok_or(CoreError::UserNotFound(id))?;
        user.flash_until = Some(until);
        Ok(until)
    }

    pub async fn clear_flash(&self, id: Uuid) -> Result<(), CoreError> {
        let mut roster = self.inner.write().await;
        let user = roster.users.get_mut(&id).ok_or(CoreError::UserNotFound(id))?;
        user.flash_until = None;
        Ok(())
    }

    /// Clears every flash window that expired before `now`; returns how
    /// many were cleared. Companion to the lazy check on read, safe to
    /// run periodically.
    pub async fn sweep_expired_flash(&self, now: DateTime<Utc>) -> usize {
        let mut roster = self.inner.write().await;
        let mut cleared = 0;
        for user in roster.users.values_mut() {
            if matches!(user.flash_until, Some(until) if until <= now) {
                user.flash_until = None;
                cleared += 1;
            }
        }
        if cleared > 0 {
            info!("Directory: cleared {} expired flash windows", cleared);
        }
        cleared
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::models::Gender;

    fn profile(name: &str, email: &str) -> UserProfile {
        UserProfile {
            id: Uuid::new_v4(),
            email: email.to_string(),
            name: name.to_string(),
            age: 25,
            gender: Gender::Other,
            physical_trait: None,
            skin_tone: None,
            role: UserRole::User,
            avatar_url: format!("https://picsum.photos/seed/{}/200", name),
            photos: vec![],
            theme_color: "#ec4899".to_string(),
            is_online: true,
            flash_until: None,
            reputation: 0.0,
            location: GeoPoint::new(48.8566, 2.3522),
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn list_returns_insertion_order_snapshot() {
        let store = DirectoryStore::new(Duration::minutes(60));
        let a = profile("a", "a@test");
        let b = profile("b", "b@test");
        let (a_id, b_id) = (a.id, b.id);
        store.add_user(a).await.unwrap();
        store.add_user(b).await.unwrap();

        let snapshot = store.list_users().await;
        assert_eq!(snapshot.iter().map(|u| u.id).collect::<Vec<_>>(), vec![a_id, b_id]);

        // Mutations after the snapshot are not reflected in it.
        store.delete_user(a_id).await.unwrap();
        assert_eq!(snapshot.len(), 2);
        assert_eq!(store.list_users().await.len(), 1);
    }

    #[tokio::test]
    async fn duplicate_id_or_email_is_rejected() {
        let store = DirectoryStore::new(Duration::minutes(60));
        let a = profile("a", "a@test");
        store.add_user(a.clone()).await.unwrap();
        assert_eq!(store.add_user(a).await, Err(CoreError::DuplicateUser));

        let same_email = profile("other", "a@test");
        assert_eq!(store.add_user(same_email).await, Err(CoreError::DuplicateUser));
    }

    #[tokio::test]
    async fn update_location_validates_and_fails_on_unknown_id() {
        let store = DirectoryStore::new(Duration::minutes(60));
        let a = profile("a", "a@test");
        let id = a.id;
        store.add_user(a).await.unwrap();

        store.update_location(id, 48.86, 2.29).await.unwrap();
        assert_eq!(store.get(id).await.unwrap().location, GeoPoint::new(48.86, 2.29));

        assert!(matches!(
            store.update_location(id, 91.0, 0.0).await,
            Err(CoreError::InvalidLocation { .. })
        ));
        let ghost = Uuid::new_v4();
        assert_eq!(
            store.update_location(ghost, 0.0, 0.0).await,
            Err(CoreError::UserNotFound(ghost))
        );
    }

    #[tokio::test]
    async fn set_role_is_visible_on_next_read() {
        let store = DirectoryStore::new(Duration::minutes(60));
        let a = profile("a", "a@test");
        let id = a.id;
        store.add_user(a).await.unwrap();

        store.set_role(id, UserRole::Premium).await.unwrap();
        assert_eq!(store.list_users().await[0].role, UserRole::Premium);
    }

    #[tokio::test]
    async fn flash_expires_lazily_on_read() {
        let store = DirectoryStore::new(Duration::milliseconds(5));
        let a = profile("a", "a@test");
        let id = a.id;
        store.add_user(a).await.unwrap();

        store.set_flash(id).await.unwrap();
        assert!(store.get(id).await.unwrap().flash_until.is_some());

        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        let read_back = store.get(id).await.unwrap();
        assert!(read_back.flash_until.is_none());
        assert!(!read_back.is_flash_available(Utc::now()));
    }

    #[tokio::test]
    async fn flash_sweep_clears_expired_windows() {
        let store = DirectoryStore::new(Duration::minutes(60));
        let a = profile("a", "a@test");
        let b = profile("b", "b@test");
        let a_id = a.id;
        store.add_user(a).await.unwrap();
        store.add_user(b).await.unwrap();
        store.set_flash(a_id).await.unwrap();

        // Nothing expired yet.
        assert_eq!(store.sweep_expired_flash(Utc::now()).await, 0);
        // Two hours from now the window has passed.
        assert_eq!(store.sweep_expired_flash(Utc::now() + Duration::hours(2)).await, 1);
        assert!(store.get(a_id).await.unwrap().flash_until.is_none());
    }
}

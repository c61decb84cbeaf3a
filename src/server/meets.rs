use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use log::info;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::common::errors::CoreError;
use crate::common::models::{MeetRequest, MeetStatus};
use crate::server::directory::DirectoryStore;

/// Tracks meet requests and their status transitions.
///
/// Owns the requests outright; participants are held as ids into the
/// directory, never as profile references. Requests are kept for the
/// session lifetime and are never deleted, only driven to a terminal
/// state. A single write lock per transition makes the first writer
/// win: once a request is Rejected or Completed, every later
/// transition attempt fails.
pub struct MeetRegistry {
    directory: Arc<DirectoryStore>,
    meets: RwLock<HashMap<Uuid, MeetRequest>>,
}

impl MeetRegistry {
    pub fn new(directory: Arc<DirectoryStore>) -> Self {
        Self {
            directory,
            meets: RwLock::new(HashMap::new()),
        }
    }

    /// Opens a new request in Pending state.
    pub async fn create(&self, from: Uuid, to: Uuid) -> Result<MeetRequest, CoreError> {
        if from == to {
            return Err(CoreError::SelfRequest);
        }
        if !self.directory.contains(from).await {
            return Err(CoreError::InvalidParticipant(from));
        }
        if !self.directory.contains(to).await {
            return Err(CoreError::InvalidParticipant(to));
        }

        let mut meets = self.meets.write().await;
        let already_pending = meets.values().any(|m| {
            m.from_user_id == from && m.to_user_id == to && m.status == MeetStatus::Pending
        });
        if already_pending {
            return Err(CoreError::DuplicateRequest);
        }

        let meet = MeetRequest {
            id: Uuid::new_v4(),
            from_user_id: from,
            to_user_id: to,
            status: MeetStatus::Pending,
            created_at: Utc::now(),
            responded_at: None,
        };
        info!("Meet request {} opened: {} -> {}", meet.id, from, to);
        meets.insert(meet.id, meet.clone());
        Ok(meet)
    }

    pub async fn accept(&self, id: Uuid) -> Result<MeetRequest, CoreError> {
        self.transition(id, "accepted", MeetStatus::Pending, MeetStatus::Accepted).await
    }

    pub async fn reject(&self, id: Uuid) -> Result<MeetRequest, CoreError> {
        self.transition(id, "rejected", MeetStatus::Pending, MeetStatus::Rejected).await
    }

    pub async fn complete(&self, id: Uuid) -> Result<MeetRequest, CoreError> {
        self.transition(id, "completed", MeetStatus::Accepted, MeetStatus::Completed).await
    }

    pub async fn get(&self, id: Uuid) -> Result<MeetRequest, CoreError> {
        self.meets
            .read()
            .await
            .get(&id)
            .cloned()
            .ok_or(CoreError::MeetNotFound(id))
    }

    /// Pending requests targeting `user_id`, oldest first. This is what
    /// the notification poll renders as incoming meet invitations.
    pub async fn pending_for(&self, user_id: Uuid) -> Vec<MeetRequest> {
        let meets = self.meets.read().await;
        let mut pending: Vec<MeetRequest> = meets
            .values()
            .filter(|m| m.to_user_id == user_id && m.status == MeetStatus::Pending)
            .cloned()
            .collect();
        pending.sort_by_key(|m| m.created_at);
        pending
    }

    /// Dangling-reference policy for user deletion: every non-terminal
    /// request naming the user is driven to Rejected. Returns the
    /// requests that changed so the caller can publish them.
    pub async fn cancel_for_user(&self, user_id: Uuid) -> Vec<MeetRequest> {
        let now = Utc::now();
        let mut meets = self.meets.write().await;
        let mut cancelled = Vec::new();
        for meet in meets.values_mut() {
            let involved = meet.from_user_id == user_id || meet.to_user_id == user_id;
            if involved && !meet.status.is_terminal() {
                meet.status = MeetStatus::Rejected;
                meet.responded_at = Some(now);
                cancelled.push(meet.clone());
            }
        }
        if !cancelled.is_empty() {
            info!("Cancelled {} meet requests referencing deleted user {}", cancelled.len(), user_id);
        }
        cancelled
    }

    async fn transition(
        &self,
        id: Uuid,
        action: &'static str,
        expected: MeetStatus,
        next: MeetStatus,
    ) -> Result<MeetRequest, CoreError> {
        let mut meets = self.meets.write().await;
        let meet = meets.get_mut(&id).ok_or(CoreError::MeetNotFound(id))?;
        if meet.status != expected {
            return Err(CoreError::InvalidTransition {
                id,
                status: meet.status,
                action,
            });
        }
        meet.status = next;
        if meet.responded_at.is_none() {
            meet.responded_at = Some(Utc::now());
        }
        info!("Meet request {} {}", id, action);
        Ok(meet.clone())
    }
}

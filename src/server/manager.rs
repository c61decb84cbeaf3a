use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use log::{info, warn};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::common::errors::CoreError;
use crate::common::models::{CoreEvent, MeetRequest, MeetStatus, UserProfile, UserRole};
use crate::server::auth::{CredentialVerifier, SessionGate};
use crate::server::config::ServerConfig;
use crate::server::directory::DirectoryStore;
use crate::server::meets::MeetRegistry;
use crate::server::proximity::ProximityTracker;

/// The boundary the presentation layer talks to.
///
/// Owns the directory, the meet registry, the proximity tracker and
/// the session gate, and publishes state changes on a broadcast
/// channel. Explicitly constructed and injected; there is no ambient
/// global instance.
pub struct MeetService {
    config: ServerConfig,
    directory: Arc<DirectoryStore>,
    meets: Arc<MeetRegistry>,
    tracker: Arc<ProximityTracker>,
    gate: Arc<SessionGate>,
    events: broadcast::Sender<CoreEvent>,
}

impl MeetService {
    pub fn new(config: ServerConfig, verifier: Arc<dyn CredentialVerifier>) -> Self {
        let directory = Arc::new(DirectoryStore::new(Duration::minutes(config.flash_ttl_minutes)));
        let meets = Arc::new(MeetRegistry::new(Arc::clone(&directory)));
        let tracker = Arc::new(ProximityTracker::new(
            Arc::clone(&directory),
            Arc::clone(&meets),
            config.arrival_threshold_m,
            config.closing_speed_m_per_min,
        ));
        let gate = Arc::new(SessionGate::new(
            Arc::clone(&directory),
            verifier,
            Duration::days(config.session_expiry_days),
        ));
        let (events, _) = broadcast::channel(256);
        Self {
            config,
            directory,
            meets,
            tracker,
            gate,
            events,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<CoreEvent> {
        self.events.subscribe()
    }

    pub async fn login(&self, email: &str, password: &str) -> Result<(UserProfile, String), CoreError> {
        let resolved = self.gate.login(email, password).await?;
        self.publish(CoreEvent::RosterChanged);
        Ok(resolved)
    }

    pub async fn logout(&self, token: &str) -> Result<(), CoreError> {
        self.gate.logout(token).await?;
        self.publish(CoreEvent::RosterChanged);
        Ok(())
    }

    /// Roster snapshot for the map markers.
    pub async fn roster(&self, token: &str) -> Result<Vec<UserProfile>, CoreError> {
        self.gate.validate(token).await?;
        Ok(self.directory.list_users().await)
    }

    /// Location report for `user_id`. Users may only move themselves;
    /// the super-admin may reposition anyone.
    pub async fn update_location(
        &self,
        token: &str,
        user_id: Uuid,
        lat: f64,
        lng: f64,
    ) -> Result<(), CoreError> {
        let caller = self.gate.current_user(token).await?;
        if caller.id != user_id && caller.role != UserRole::SuperAdmin {
            return Err(CoreError::NotAuthorized);
        }
        self.directory.update_location(user_id, lat, lng).await?;
        self.publish(CoreEvent::RosterChanged);
        Ok(())
    }

    /// Toggles the caller's flash window; returns its expiry when
    /// turned on.
    pub async fn set_flash(&self, token: &str, on: bool) -> Result<Option<DateTime<Utc>>, CoreError> {
        let caller = self.gate.current_user(token).await?;
        let until = if on {
            Some(self.directory.set_flash(caller.id).await?)
        } else {
            self.directory.clear_flash(caller.id).await?;
            None
        };
        self.publish(CoreEvent::RosterChanged);
        Ok(until)
    }

    pub async fn request_meet(&self, token: &str, to: Uuid) -> Result<MeetRequest, CoreError> {
        let caller = self.gate.current_user(token).await?;
        let meet = self.meets.create(caller.id, to).await?;
        self.publish(CoreEvent::MeetStatusChanged { meet: meet.clone() });
        Ok(meet)
    }

    /// Pending requests targeting the caller, for the notification bell.
    pub async fn pending_requests(&self, token: &str) -> Result<Vec<MeetRequest>, CoreError> {
        let caller = self.gate.current_user(token).await?;
        Ok(self.meets.pending_for(caller.id).await)
    }

    pub async fn get_meet(&self, token: &str, meet_id: Uuid) -> Result<MeetRequest, CoreError> {
        self.gate.validate(token).await?;
        self.meets.get(meet_id).await
    }

    pub async fn accept_meet(&self, token: &str, meet_id: Uuid) -> Result<MeetRequest, CoreError> {
        self.respond(token, meet_id, true).await
    }

    pub async fn reject_meet(&self, token: &str, meet_id: Uuid) -> Result<MeetRequest, CoreError> {
        self.respond(token, meet_id, false).await
    }

    /// Starts proximity tracking for an accepted meet and spawns the
    /// repeating measurement task. The task publishes a `Proximity`
    /// event per tick and, on the first crossing of the arrival
    /// threshold, an `Arrived` event followed by the registry's
    /// Completed transition. Aborting the handle closes the navigation.
    pub async fn start_navigation(&self, token: &str, meet_id: Uuid) -> Result<JoinHandle<()>, CoreError> {
        let caller = self.gate.current_user(token).await?;
        let meet = self.meets.get(meet_id).await?;
        if caller.id != meet.from_user_id && caller.id != meet.to_user_id {
            return Err(CoreError::NotAuthorized);
        }
        self.tracker.start(meet_id).await?;

        let tracker = Arc::clone(&self.tracker);
        let meets = Arc::clone(&self.meets);
        let events = self.events.clone();
        let tick_every = self.config.proximity_tick;
        Ok(tokio::spawn(async move {
            let mut interval = tokio::time::interval(tick_every);
            loop {
                interval.tick().await;

                // Someone else may have replaced or ended this session.
                if tracker.tracked_meet().await != Some(meet_id) {
                    return;
                }
                match meets.get(meet_id).await {
                    Ok(meet) if meet.status == MeetStatus::Accepted => {}
                    _ => break,
                }

                match tracker.tick().await {
                    Ok(step) => {
                        let _ = events.send(CoreEvent::Proximity {
                            meet_id,
                            update: step.update,
                        });
                        if step.just_arrived {
                            let _ = events.send(CoreEvent::Arrived { meet_id });
                            match meets.complete(meet_id).await {
                                Ok(meet) => {
                                    let _ = events.send(CoreEvent::MeetStatusChanged { meet });
                                }
                                Err(e) => {
                                    warn!("Could not complete meet {} on arrival: {}", meet_id, e)
                                }
                            }
                            break;
                        }
                    }
                    Err(e) => {
                        warn!("Proximity tick failed for meet {}: {}", meet_id, e);
                        break;
                    }
                }
            }
            if tracker.tracked_meet().await == Some(meet_id) {
                tracker.stop().await;
            }
        }))
    }

    /// Super-admin only. Role changes are visible on the next roster
    /// read and to already-open sessions of the target user.
    pub async fn promote_user(&self, token: &str, user_id: Uuid, role: UserRole) -> Result<(), CoreError> {
        self.gate.require_super_admin(token).await?;
        self.directory.set_role(user_id, role).await?;
        self.publish(CoreEvent::RosterChanged);
        Ok(())
    }

    /// Super-admin only. Removes the record, rejects every non-terminal
    /// meet request naming the user and revokes their sessions.
    pub async fn delete_user(&self, token: &str, user_id: Uuid) -> Result<(), CoreError> {
        let admin = self.gate.require_super_admin(token).await?;
        let removed = self.directory.delete_user(user_id).await?;
        info!("Admin {} deleted {} ({})", admin.name, removed.name, removed.id);

        for meet in self.meets.cancel_for_user(user_id).await {
            self.publish(CoreEvent::MeetStatusChanged { meet });
        }
        self.gate.revoke_for_user(user_id).await;
        self.publish(CoreEvent::RosterChanged);
        Ok(())
    }

    /// Periodic housekeeping: expired flash windows and sessions.
    pub fn spawn_maintenance(&self, every: std::time::Duration) -> JoinHandle<()> {
        let directory = Arc::clone(&self.directory);
        let gate = Arc::clone(&self.gate);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(every);
            loop {
                interval.tick().await;
                let now = Utc::now();
                directory.sweep_expired_flash(now).await;
                gate.cleanup_expired(now).await;
            }
        })
    }

    async fn respond(&self, token: &str, meet_id: Uuid, accept: bool) -> Result<MeetRequest, CoreError> {
        let caller = self.gate.current_user(token).await?;
        let meet = self.meets.get(meet_id).await?;
        // Only the invited side answers a request.
        if caller.id != meet.to_user_id {
            return Err(CoreError::NotAuthorized);
        }
        let meet = if accept {
            self.meets.accept(meet_id).await?
        } else {
            self.meets.reject(meet_id).await?
        };
        self.publish(CoreEvent::MeetStatusChanged { meet: meet.clone() });
        Ok(meet)
    }

    fn publish(&self, event: CoreEvent) {
        // Nobody listening is fine; the demo and tests subscribe lazily.
        let _ = self.events.send(event);
    }
}

use std::sync::Arc;

use log::info;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::common::errors::CoreError;
use crate::common::geo::haversine_meters;
use crate::common::models::{MeetStatus, ProximityUpdate};
use crate::server::directory::DirectoryStore;
use crate::server::meets::MeetRegistry;

/// Result of one measurement step.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProximityTick {
    pub update: ProximityUpdate,
    /// True exactly once per tracked meet, on the tick where the
    /// arrival threshold is first crossed.
    pub just_arrived: bool,
}

/// Computes the closing distance for one accepted meet.
///
/// Distance is the great-circle distance between the participants'
/// current directory coordinates, recomputed fresh on every tick
/// together with the eta. There is no simulated countdown; if nobody
/// moves, the distance does not change. A tracker follows at most one
/// meet at a time; starting a new one replaces the previous session,
/// matching the single navigation screen it feeds.
pub struct ProximityTracker {
    directory: Arc<DirectoryStore>,
    meets: Arc<MeetRegistry>,
    arrival_threshold_m: f64,
    closing_speed_m_per_min: f64,
    active: Mutex<Option<Tracking>>,
}

struct Tracking {
    meet_id: Uuid,
    from: Uuid,
    to: Uuid,
    arrived: bool,
}

impl ProximityTracker {
    pub fn new(
        directory: Arc<DirectoryStore>,
        meets: Arc<MeetRegistry>,
        arrival_threshold_m: f64,
        closing_speed_m_per_min: f64,
    ) -> Self {
        Self {
            directory,
            meets,
            arrival_threshold_m,
            closing_speed_m_per_min,
            active: Mutex::new(None),
        }
    }

    /// Begins tracking `meet_id`. The meet must currently be Accepted.
    pub async fn start(&self, meet_id: Uuid) -> Result<(), CoreError> {
        let meet = self.meets.get(meet_id).await?;
        if meet.status != MeetStatus::Accepted {
            return Err(CoreError::InvalidState {
                id: meet_id,
                status: meet.status,
            });
        }
        info!("Proximity tracking started for meet {}", meet_id);
        *self.active.lock().await = Some(Tracking {
            meet_id,
            from: meet.from_user_id,
            to: meet.to_user_id,
            arrived: false,
        });
        Ok(())
    }

    pub async fn stop(&self) {
        if let Some(tracking) = self.active.lock().await.take() {
            info!("Proximity tracking stopped for meet {}", tracking.meet_id);
        }
    }

    pub async fn tracked_meet(&self) -> Option<Uuid> {
        self.active.lock().await.as_ref().map(|t| t.meet_id)
    }

    /// Advances one measurement step. Fails with `InvalidParticipant`
    /// if either party has left the directory, and with `InvalidState`
    /// if nothing is being tracked.
    pub async fn tick(&self) -> Result<ProximityTick, CoreError> {
        let mut active = self.active.lock().await;
        let tracking = active.as_mut().ok_or(CoreError::NotTracking)?;

        let from = self
            .directory
            .get(tracking.from)
            .await
            .map_err(|_| CoreError::InvalidParticipant(tracking.from))?;
        let to = self
            .directory
            .get(tracking.to)
            .await
            .map_err(|_| CoreError::InvalidParticipant(tracking.to))?;

        // Distance and eta belong to the same measurement.
        let distance_meters = haversine_meters(from.location, to.location);
        let eta_minutes = if distance_meters <= 0.0 {
            0
        } else {
            (distance_meters / self.closing_speed_m_per_min).ceil() as u32
        };

        let has_arrived = distance_meters <= self.arrival_threshold_m;
        let just_arrived = has_arrived && !tracking.arrived;
        if just_arrived {
            tracking.arrived = true;
            info!(
                "Arrival: meet {} parties within {:.0} m",
                tracking.meet_id, distance_meters
            );
        }

        Ok(ProximityTick {
            update: ProximityUpdate {
                distance_meters,
                eta_minutes,
                has_arrived,
            },
            just_arrived,
        })
    }
}

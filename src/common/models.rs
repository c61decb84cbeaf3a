use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Authorization level of a directory member.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UserRole {
    User,
    Premium,
    Admin,
    SuperAdmin,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Gender {
    Male,
    Female,
    Other,
}

/// Profile display category, shown on the profile card only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PhysicalTrait {
    Fit,
    Average,
    Curvy,
    Slim,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SkinTone {
    Fair,
    Medium,
    Dark,
    Deep,
}

/// A geographic coordinate pair.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub lat: f64,
    pub lng: f64,
}

impl GeoPoint {
    pub fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }

    /// Real-world bounds: lat in [-90, 90], lng in [-180, 180].
    pub fn is_valid(&self) -> bool {
        (-90.0..=90.0).contains(&self.lat) && (-180.0..=180.0).contains(&self.lng)
    }
}

/// A member of the directory.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: Uuid,
    pub email: String,
    pub name: String,
    pub age: u8,
    pub gender: Gender,
    pub physical_trait: Option<PhysicalTrait>,
    pub skin_tone: Option<SkinTone>,
    pub role: UserRole,
    pub avatar_url: String,
    pub photos: Vec<String>,
    pub theme_color: String,
    pub is_online: bool,
    /// Flash window: "available to meet right now" until this instant.
    /// `None` means the flash status is off.
    pub flash_until: Option<DateTime<Utc>>,
    /// Trust score in [0, 5].
    pub reputation: f32,
    pub location: GeoPoint,
    pub created_at: DateTime<Utc>,
}

impl UserProfile {
    pub fn is_flash_available(&self, now: DateTime<Utc>) -> bool {
        matches!(self.flash_until, Some(until) if until > now)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MeetStatus {
    Pending,
    Accepted,
    Rejected,
    Completed,
}

impl MeetStatus {
    /// Rejected and Completed admit no further transitions.
    pub fn is_terminal(&self) -> bool {
        matches!(self, MeetStatus::Rejected | MeetStatus::Completed)
    }
}

/// A proposal from one user to physically meet another.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MeetRequest {
    pub id: Uuid,
    pub from_user_id: Uuid,
    pub to_user_id: Uuid,
    pub status: MeetStatus,
    pub created_at: DateTime<Utc>,
    pub responded_at: Option<DateTime<Utc>>,
}

/// One measurement step of the navigation toward an accepted meet.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ProximityUpdate {
    pub distance_meters: f64,
    pub eta_minutes: u32,
    pub has_arrived: bool,
}

/// Events pushed to the presentation layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum CoreEvent {
    RosterChanged,
    MeetStatusChanged { meet: MeetRequest },
    Proximity { meet_id: Uuid, update: ProximityUpdate },
    Arrived { meet_id: Uuid },
}

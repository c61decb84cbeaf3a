// End-to-end walk through the map -> meet -> navigation flow, with the
// requester moved stepwise across Paris until arrival.
use std::sync::Arc;

use chrono::Duration;
use uuid::Uuid;

use meetme::common::errors::CoreError;
use meetme::common::geo::{haversine_meters, step_towards};
use meetme::common::models::{
    Gender, GeoPoint, MeetStatus, UserProfile, UserRole,
};
use meetme::server::directory::DirectoryStore;
use meetme::server::meets::MeetRegistry;
use meetme::server::proximity::ProximityTracker;

const NOTRE_DAME: GeoPoint = GeoPoint { lat: 48.8566, lng: 2.3522 };
const EIFFEL: GeoPoint = GeoPoint { lat: 48.8584, lng: 2.2945 };

fn paris_user(name: &str, location: GeoPoint) -> UserProfile {
    UserProfile {
        id: Uuid::new_v4(),
        email: format!("{}@meetme.fr", name),
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
        reputation: 4.0,
        location,
        created_at: chrono::Utc::now(),
    }
}

#[tokio::test]
async fn walking_across_paris_completes_the_meet() {
    let directory = Arc::new(DirectoryStore::new(Duration::minutes(60)));
    let a = paris_user("a", NOTRE_DAME);
    let b = paris_user("b", EIFFEL);
    let (a_id, b_id) = (a.id, b.id);
    directory.add_user(a).await.unwrap();
    directory.add_user(b).await.unwrap();

    let registry = Arc::new(MeetRegistry::new(Arc::clone(&directory)));
    let meet = registry.create(a_id, b_id).await.unwrap();
    assert_eq!(meet.status, MeetStatus::Pending);
    let meet = registry.accept(meet.id).await.unwrap();
    assert_eq!(meet.status, MeetStatus::Accepted);

    let tracker = ProximityTracker::new(
        Arc::clone(&directory),
        Arc::clone(&registry),
        50.0,
        300.0,
    );
    tracker.start(meet.id).await.unwrap();

    let initial = haversine_meters(NOTRE_DAME, EIFFEL);
    let mut previous = f64::INFINITY;
    let mut arrivals = 0;
    // 200 m per step from over 4 km out: bounded by the walk length.
    for _ in 0..40 {
        let step = tracker.tick().await.unwrap();
        assert!(step.update.distance_meters >= 0.0);
        assert!(
            step.update.distance_meters <= previous,
            "distance must not increase while walking closer"
        );
        assert!(step.update.distance_meters <= initial + 1.0);
        previous = step.update.distance_meters;

        if step.just_arrived {
            arrivals += 1;
        }
        if step.update.has_arrived {
            break;
        }

        let walker = directory.get(a_id).await.unwrap().location;
        let next = step_towards(walker, EIFFEL, 200.0);
        directory
            .update_location(a_id, next.lat, next.lng)
            .await
            .unwrap();
    }
    assert_eq!(arrivals, 1, "arrival is an edge, fired exactly once");

    // A later tick keeps reporting arrival without re-firing the edge.
    let after = tracker.tick().await.unwrap();
    assert!(after.update.has_arrived);
    assert!(!after.just_arrived);
    assert_eq!(after.update.eta_minutes, (after.update.distance_meters / 300.0).ceil() as u32);

    // The arrival signal is what lets the registry close the loop.
    let done = registry.complete(meet.id).await.unwrap();
    assert_eq!(done.status, MeetStatus::Completed);
    assert!(matches!(
        registry.accept(meet.id).await,
        Err(CoreError::InvalidTransition { status: MeetStatus::Completed, .. })
    ));
}

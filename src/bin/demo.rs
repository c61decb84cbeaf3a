// Drives the map -> profile -> meet -> navigation flow end to end
// against an in-process MeetService, standing in for the real UI.
use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use log::{info, warn};

use meetme::common::geo::step_towards;
use meetme::common::models::{CoreEvent, MeetStatus, UserRole};
use meetme::server::auth::{PermissiveVerifier, StaticVerifier};
use meetme::server::config::ServerConfig;
use meetme::server::manager::MeetService;

#[derive(Parser, Debug)]
#[command(name = "meetme-demo")]
#[command(about = "Scripted walkthrough of the meet-up core")]
struct Args {
    /// Meters the requester walks per simulation step.
    #[arg(long, default_value = "400.0")]
    step_meters: f64,
}

#[tokio::main]
async fn main() -> Result<()> {
    let log_level = std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string());
    std::env::set_var("RUST_LOG", &log_level);
    env_logger::init();

    let args = Args::parse();
    let mut config = ServerConfig::from_env();
    // Speed the walkthrough up unless the operator tuned it explicitly.
    if std::env::var("PROXIMITY_TICK_SECS").is_err() {
        config.proximity_tick = std::time::Duration::from_millis(400);
    }
    if config.super_admin_email.is_none() {
        warn!("SUPER_ADMIN_EMAIL not set; using the demo account admin@meetme.local");
        config.super_admin_email = Some("admin@meetme.local".to_string());
        config.super_admin_password = Some("demo-only".to_string());
    }
    let admin_email = config.super_admin_email.clone().unwrap();
    let admin_password = config.super_admin_password.clone().unwrap();

    // Any unknown email may walk in as a standard user, the prototype's
    // open-door policy. Registered accounts keep their password check.
    let verifier = PermissiveVerifier::new(StaticVerifier::from_config(&config));
    let service = Arc::new(MeetService::new(config.clone(), Arc::new(verifier)));
    let _maintenance = service.spawn_maintenance(std::time::Duration::from_secs(60));

    // Cast of the walkthrough.
    let (admin, admin_token) = service.login(&admin_email, &admin_password).await?;
    info!("Signed in {} as {:?}", admin.name, admin.role);
    let (sarah, sarah_token) = service.login("sarah@meetme.fr", "guest").await?;
    let (marc, marc_token) = service.login("marc@meetme.fr", "guest").await?;
    let (yasmine, _yasmine_token) = service.login("yasmine@meetme.fr", "guest").await?;

    // Scatter everyone across Paris; new signups all spawn at the same
    // default spot.
    service.update_location(&sarah_token, sarah.id, 48.8566, 2.3522).await?;
    service.update_location(&marc_token, marc.id, 48.8584, 2.2945).await?;
    service.update_location(&admin_token, yasmine.id, 48.8534, 2.3488).await?;

    service.promote_user(&admin_token, marc.id, UserRole::Premium).await?;
    let flash_until = service.set_flash(&sarah_token, true).await?;
    info!("Sarah is flashing until {:?}", flash_until);

    for user in service.roster(&admin_token).await? {
        info!(
            "Marker: {} ({:?}) online={} flash={} at ({:.4}, {:.4})",
            user.name,
            user.role,
            user.is_online,
            user.is_flash_available(chrono::Utc::now()),
            user.location.lat,
            user.location.lng,
        );
    }

    // Side plot: a pending request whose recipient gets deleted.
    let doomed = service.request_meet(&marc_token, yasmine.id).await?;
    service.delete_user(&admin_token, yasmine.id).await?;
    info!(
        "Request {} after deleting its recipient: {:?}",
        doomed.id,
        service.get_meet(&marc_token, doomed.id).await?.status
    );

    // The main flow: Sarah asks Marc out, Marc accepts, Sarah walks over.
    let meet = service.request_meet(&sarah_token, marc.id).await?;
    info!("Meet request {} sent to {}", meet.id, marc.name);
    service.accept_meet(&marc_token, meet.id).await?;

    let mut events = service.subscribe();
    let nav = service.start_navigation(&sarah_token, meet.id).await?;

    let mover = {
        let service = Arc::clone(&service);
        let token = sarah_token.clone();
        let step = args.step_meters;
        let tick = config.proximity_tick;
        tokio::spawn(async move {
            loop {
                tokio::time::sleep(tick).await;
                let Ok(roster) = service.roster(&token).await else { break };
                let walker = roster.iter().find(|u| u.id == sarah.id);
                let target = roster.iter().find(|u| u.id == marc.id);
                let (Some(walker), Some(target)) = (walker, target) else { break };
                let next = step_towards(walker.location, target.location, step);
                if service
                    .update_location(&token, sarah.id, next.lat, next.lng)
                    .await
                    .is_err()
                {
                    break;
                }
            }
        })
    };

    loop {
        match events.recv().await? {
            CoreEvent::Proximity { update, .. } => {
                info!(
                    "Navigation: {:.0} m to go, eta {} min",
                    update.distance_meters, update.eta_minutes
                );
            }
            CoreEvent::Arrived { .. } => info!("Within the arrival radius, say hi!"),
            CoreEvent::MeetStatusChanged { meet: changed }
                if changed.id == meet.id && changed.status == MeetStatus::Completed =>
            {
                info!("Meet {} completed", changed.id);
                break;
            }
            _ => {}
        }
    }
    mover.abort();
    let _ = nav.await;

    service.logout(&sarah_token).await?;
    service.logout(&marc_token).await?;
    service.logout(&admin_token).await?;
    info!("Walkthrough finished");
    Ok(())
}

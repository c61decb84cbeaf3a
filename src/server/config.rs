use std::env;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub arrival_threshold_m: f64,
    pub proximity_tick: Duration,
    pub closing_speed_m_per_min: f64,
    pub flash_ttl_minutes: i64,
    pub session_expiry_days: i64,
    pub super_admin_email: Option<String>,
    pub super_admin_password: Option<String>,
    pub log_level: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            arrival_threshold_m: 50.0,
            proximity_tick: Duration::from_secs(2),
            closing_speed_m_per_min: 300.0,
            flash_ttl_minutes: 60,
            session_expiry_days: 7,
            super_admin_email: None,
            super_admin_password: None,
            log_level: "info".to_string(),
        }
    }
}

impl ServerConfig {
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();

        Self {
            arrival_threshold_m: env::var("ARRIVAL_THRESHOLD_METERS").ok().and_then(|v| v.parse().ok()).unwrap_or(50.0),
            proximity_tick: env::var("PROXIMITY_TICK_SECS").ok().and_then(|v| v.parse().ok()).map(Duration::from_secs).unwrap_or(Duration::from_secs(2)),
            closing_speed_m_per_min: env::var("CLOSING_SPEED_M_PER_MIN").ok().and_then(|v| v.parse().ok()).unwrap_or(300.0),
            flash_ttl_minutes: env::var("FLASH_TTL_MINUTES").ok().and_then(|v| v.parse().ok()).unwrap_or(60),
            session_expiry_days: env::var("SESSION_EXPIRY_DAYS").ok().and_then(|v| v.parse().ok()).unwrap_or(7),
            // No hardcoded fallback: without these env vars there is no super-admin.
            super_admin_email: env::var("SUPER_ADMIN_EMAIL").ok(),
            super_admin_password: env::var("SUPER_ADMIN_PASSWORD").ok(),
            log_level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
        }
    }
}

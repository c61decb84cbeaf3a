use std::collections::HashMap;
use std::sync::Arc;

use argon2::{Argon2, password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString}};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use log::info;
use rand::RngCore;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::common::errors::CoreError;
use crate::common::models::{Gender, GeoPoint, UserProfile, UserRole};
use crate::server::config::ServerConfig;
use crate::server::directory::DirectoryStore;

/// Identity resolved from a credential pair, before directory lookup.
#[derive(Debug, Clone)]
pub struct VerifiedIdentity {
    pub email: String,
    pub role: UserRole,
}

/// The seam for credential checking. Swappable between the in-memory
/// implementations below and a real credential store.
#[async_trait]
pub trait CredentialVerifier: Send + Sync {
    async fn verify(&self, email: &str, password: &str) -> Result<VerifiedIdentity, CoreError>;
}

/// Verifier over a fixed set of argon2-hashed credentials.
#[derive(Default)]
pub struct StaticVerifier {
    credentials: HashMap<String, StoredCredential>,
}

struct StoredCredential {
    password_hash: String,
    role: UserRole,
}

impl StaticVerifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers the configured super-admin pair, if any. Without the
    /// env vars there simply is no super-admin account.
    pub fn from_config(config: &ServerConfig) -> Self {
        let mut verifier = Self::new();
        if let (Some(email), Some(password)) =
            (&config.super_admin_email, &config.super_admin_password)
        {
            verifier.register(email, password, UserRole::SuperAdmin);
        }
        verifier
    }

    pub fn register(&mut self, email: &str, password: &str, role: UserRole) {
        let password_hash = hash_password(password);
        self.credentials
            .insert(email.to_string(), StoredCredential { password_hash, role });
    }
}

#[async_trait]
impl CredentialVerifier for StaticVerifier {
    async fn verify(&self, email: &str, password: &str) -> Result<VerifiedIdentity, CoreError> {
        match self.credentials.get(email) {
            Some(stored) if verify_password(&stored.password_hash, password) => {
                Ok(VerifiedIdentity {
                    email: email.to_string(),
                    role: stored.role,
                })
            }
            _ => Err(CoreError::InvalidCredentials),
        }
    }
}

/// Open-door policy for demos: an email nobody registered logs in as a
/// fresh standard user. Registered emails still need their password.
pub struct PermissiveVerifier {
    inner: StaticVerifier,
}

impl PermissiveVerifier {
    pub fn new(inner: StaticVerifier) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl CredentialVerifier for PermissiveVerifier {
    async fn verify(&self, email: &str, password: &str) -> Result<VerifiedIdentity, CoreError> {
        if self.inner.credentials.contains_key(email) {
            return self.inner.verify(email, password).await;
        }
        Ok(VerifiedIdentity {
            email: email.to_string(),
            role: UserRole::User,
        })
    }
}

#[derive(Debug, Clone)]
pub struct Session {
    pub token: String,
    pub user_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

/// Resolves credentials to a directory identity and hands out session
/// tokens. Administrative operations go through `require_super_admin`;
/// the check reads the live directory role, so promotions and demotions
/// apply to existing sessions immediately.
pub struct SessionGate {
    directory: Arc<DirectoryStore>,
    verifier: Arc<dyn CredentialVerifier>,
    sessions: RwLock<HashMap<String, Session>>,
    session_ttl: Duration,
}

impl SessionGate {
    pub fn new(
        directory: Arc<DirectoryStore>,
        verifier: Arc<dyn CredentialVerifier>,
        session_ttl: Duration,
    ) -> Self {
        Self {
            directory,
            verifier,
            sessions: RwLock::new(HashMap::new()),
            session_ttl,
        }
    }

    /// Verifies the credentials, resolves or synthesizes the directory
    /// record, marks it online and opens a session.
    pub async fn login(&self, email: &str, password: &str) -> Result<(UserProfile, String), CoreError> {
        let identity = self.verifier.verify(email, password).await?;

        let profile = match self.directory.find_by_email(email).await {
            Some(existing) => existing,
            None => {
                let profile = synthesize_profile(&identity);
                self.directory.add_user(profile.clone()).await?;
                profile
            }
        };
        self.directory.set_online(profile.id, true).await?;

        let now = Utc::now();
        let session = Session {
            token: generate_session_token(),
            user_id: profile.id,
            created_at: now,
            expires_at: now + self.session_ttl,
        };
        let token = session.token.clone();
        self.sessions.write().await.insert(token.clone(), session);
        info!("Login: {} ({})", profile.name, profile.id);
        Ok((profile, token))
    }

    pub async fn validate(&self, token: &str) -> Result<Session, CoreError> {
        let mut sessions = self.sessions.write().await;
        match sessions.get(token) {
            Some(session) if session.expires_at > Utc::now() => Ok(session.clone()),
            Some(_) => {
                sessions.remove(token);
                Err(CoreError::InvalidSession)
            }
            None => Err(CoreError::InvalidSession),
        }
    }

    /// Resolves the session to its live directory profile. A session
    /// whose user was deleted is dropped.
    pub async fn current_user(&self, token: &str) -> Result<UserProfile, CoreError> {
        let session = self.validate(token).await?;
        match self.directory.get(session.user_id).await {
            Ok(profile) => Ok(profile),
            Err(_) => {
                self.sessions.write().await.remove(token);
                Err(CoreError::InvalidSession)
            }
        }
    }

    pub async fn require_super_admin(&self, token: &str) -> Result<UserProfile, CoreError> {
        let profile = self.current_user(token).await?;
        if profile.role == UserRole::SuperAdmin {
            Ok(profile)
        } else {
            Err(CoreError::NotAuthorized)
        }
    }

    pub async fn logout(&self, token: &str) -> Result<(), CoreError> {
        let session = self
            .sessions
            .write()
            .await
            .remove(token)
            .ok_or(CoreError::InvalidSession)?;
        // The user may already be gone; only the session removal matters.
        let _ = self.directory.set_online(session.user_id, false).await;
        info!("Logout: user {}", session.user_id);
        Ok(())
    }

    /// Drops every session belonging to `user_id`.
    pub async fn revoke_for_user(&self, user_id: Uuid) -> usize {
        let mut sessions = self.sessions.write().await;
        let before = sessions.len();
        sessions.retain(|_, session| session.user_id != user_id);
        before - sessions.len()
    }

    /// Removes sessions expired before `now`. Idempotent, safe to run
    /// periodically.
    pub async fn cleanup_expired(&self, now: DateTime<Utc>) -> usize {
        let mut sessions = self.sessions.write().await;
        let before = sessions.len();
        sessions.retain(|_, session| session.expires_at > now);
        let removed = before - sessions.len();
        if removed > 0 {
            info!("Cleaned up {} expired sessions", removed);
        }
        removed
    }
}

fn hash_password(password: &str) -> String {
    let mut salt_bytes = [0u8; 16];
    rand::thread_rng().fill_bytes(&mut salt_bytes);
    let salt = SaltString::encode_b64(&salt_bytes).unwrap();
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .unwrap()
        .to_string()
}

fn verify_password(hash: &str, password: &str) -> bool {
    match PasswordHash::new(hash) {
        Ok(parsed) => Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok(),
        Err(_) => false,
    }
}

fn generate_session_token() -> String {
    let mut random = [0u8; 16];
    rand::thread_rng().fill_bytes(&mut random);
    let suffix = random.iter().fold(String::new(), |mut acc, b| {
        use std::fmt::Write;
        write!(&mut acc, "{:02x}", b).unwrap();
        acc
    });
    format!("{}-{}", Uuid::new_v4(), suffix)
}

/// First login of an unknown email creates a directory record with the
/// signup defaults; the super-admin gets the staff profile.
fn synthesize_profile(identity: &VerifiedIdentity) -> UserProfile {
    let now = Utc::now();
    match identity.role {
        UserRole::SuperAdmin => UserProfile {
            id: Uuid::new_v4(),
            email: identity.email.clone(),
            name: "Super Admin".to_string(),
            age: 99,
            gender: Gender::Other,
            physical_trait: None,
            skin_tone: None,
            role: UserRole::SuperAdmin,
            avatar_url: "https://picsum.photos/seed/admin/200".to_string(),
            photos: vec![],
            theme_color: "#0f172a".to_string(),
            is_online: true,
            flash_until: None,
            reputation: 5.0,
            location: GeoPoint::new(48.8566, 2.3522),
            created_at: now,
        },
        role => UserProfile {
            id: Uuid::new_v4(),
            email: identity.email.clone(),
            name: identity
                .email
                .split('@')
                .next()
                .unwrap_or(&identity.email)
                .to_string(),
            age: 25,
            gender: Gender::Male,
            physical_trait: None,
            skin_tone: None,
            role,
            avatar_url: "https://picsum.photos/seed/user/200".to_string(),
            photos: vec![],
            theme_color: "#ec4899".to_string(),
            is_online: true,
            flash_until: None,
            reputation: 0.0,
            location: GeoPoint::new(48.8584, 2.2945),
            created_at: now,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gate_with(verifier: impl CredentialVerifier + 'static, ttl: Duration) -> SessionGate {
        let directory = Arc::new(DirectoryStore::new(Duration::minutes(60)));
        SessionGate::new(directory, Arc::new(verifier), ttl)
    }

    #[tokio::test]
    async fn static_verifier_rejects_bad_credentials() {
        let mut verifier = StaticVerifier::new();
        verifier.register("sarah@test", "s3cret", UserRole::User);

        assert!(verifier.verify("sarah@test", "s3cret").await.is_ok());
        assert_eq!(
            verifier.verify("sarah@test", "wrong").await.unwrap_err(),
            CoreError::InvalidCredentials
        );
        assert_eq!(
            verifier.verify("nobody@test", "s3cret").await.unwrap_err(),
            CoreError::InvalidCredentials
        );
    }

    #[tokio::test]
    async fn permissive_verifier_admits_unknown_emails_only() {
        let mut inner = StaticVerifier::new();
        inner.register("sarah@test", "s3cret", UserRole::Premium);
        let verifier = PermissiveVerifier::new(inner);

        let guest = verifier.verify("guest@test", "anything").await.unwrap();
        assert_eq!(guest.role, UserRole::User);

        // A registered email keeps its password check and role.
        assert_eq!(
            verifier.verify("sarah@test", "wrong").await.unwrap_err(),
            CoreError::InvalidCredentials
        );
        let sarah = verifier.verify("sarah@test", "s3cret").await.unwrap();
        assert_eq!(sarah.role, UserRole::Premium);
    }

    #[tokio::test]
    async fn login_synthesizes_a_profile_once() {
        let mut verifier = StaticVerifier::new();
        verifier.register("marc@test", "pass", UserRole::User);
        let gate = gate_with(verifier, Duration::days(7));

        let (profile, _token) = gate.login("marc@test", "pass").await.unwrap();
        assert_eq!(profile.name, "marc");
        assert!(profile.is_online);

        let (again, _token) = gate.login("marc@test", "pass").await.unwrap();
        assert_eq!(again.id, profile.id);
    }

    #[tokio::test]
    async fn session_lifecycle() {
        let mut verifier = StaticVerifier::new();
        verifier.register("marc@test", "pass", UserRole::User);
        let directory = Arc::new(DirectoryStore::new(Duration::minutes(60)));
        let gate = SessionGate::new(Arc::clone(&directory), Arc::new(verifier), Duration::days(7));

        let (profile, token) = gate.login("marc@test", "pass").await.unwrap();
        let session = gate.validate(&token).await.unwrap();
        assert_eq!(session.user_id, profile.id);

        gate.logout(&token).await.unwrap();
        assert_eq!(gate.validate(&token).await.unwrap_err(), CoreError::InvalidSession);
        assert!(!directory.get(profile.id).await.unwrap().is_online);
        assert_eq!(gate.logout(&token).await.unwrap_err(), CoreError::InvalidSession);
    }

    #[tokio::test]
    async fn expired_sessions_are_invalid_and_swept() {
        let mut verifier = StaticVerifier::new();
        verifier.register("marc@test", "pass", UserRole::User);
        let gate = gate_with(verifier, Duration::zero());

        let (_profile, token) = gate.login("marc@test", "pass").await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        assert_eq!(gate.validate(&token).await.unwrap_err(), CoreError::InvalidSession);

        // Already lazily removed; the sweep finds nothing further.
        assert_eq!(gate.cleanup_expired(Utc::now()).await, 0);
    }

    #[tokio::test]
    async fn super_admin_gate() {
        let mut verifier = StaticVerifier::new();
        verifier.register("root@test", "root-pass", UserRole::SuperAdmin);
        verifier.register("marc@test", "pass", UserRole::User);
        let gate = gate_with(verifier, Duration::days(7));

        let (_admin, admin_token) = gate.login("root@test", "root-pass").await.unwrap();
        assert!(gate.require_super_admin(&admin_token).await.is_ok());

        let (_user, user_token) = gate.login("marc@test", "pass").await.unwrap();
        assert_eq!(
            gate.require_super_admin(&user_token).await.unwrap_err(),
            CoreError::NotAuthorized
        );
    }

    #[tokio::test]
    async fn deleting_the_user_invalidates_the_session() {
        let mut verifier = StaticVerifier::new();
        verifier.register("marc@test", "pass", UserRole::User);
        let directory = Arc::new(DirectoryStore::new(Duration::minutes(60)));
        let gate = SessionGate::new(Arc::clone(&directory), Arc::new(verifier), Duration::days(7));

        let (profile, token) = gate.login("marc@test", "pass").await.unwrap();
        directory.delete_user(profile.id).await.unwrap();
        assert_eq!(gate.current_user(&token).await.unwrap_err(), CoreError::InvalidSession);
    }
}

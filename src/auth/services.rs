use std::sync::Arc;

use async_trait::async_trait;
use lazy_static::lazy_static;
use rand::{distributions::Alphanumeric, rngs::OsRng, Rng};
use regex::Regex;
use tracing::{error, info, instrument, warn};

use crate::auth::{
    error::{ServiceError, StoreError},
    password::Argon2Hasher,
    repo::UserStore,
    repo_types::{NewUser, User},
};

const USERNAME_MIN_LEN: usize = 3;
const USERNAME_MAX_LEN: usize = 25;
const PASSWORD_MIN_LEN: usize = 6;
const CREDENTIAL_LEN: usize = 43;

lazy_static! {
    static ref USERNAME_RE: Regex = Regex::new(r"^[a-z0-9_]+$").unwrap();
    static ref EMAIL_RE: Regex =
        Regex::new(r"^[a-z0-9._%+\-]+@[a-z0-9.\-]+\.[a-z]{2,}$").unwrap();
}

/// Trim and lowercase an email or username.
pub(crate) fn normalize(raw: &str) -> String {
    raw.trim().to_lowercase()
}

pub(crate) fn validate_username(username: &str) -> Result<(), ServiceError> {
    if username.len() < USERNAME_MIN_LEN {
        return Err(ServiceError::bad_request("username is too short"));
    }
    if username.len() > USERNAME_MAX_LEN {
        return Err(ServiceError::bad_request("username is too long"));
    }
    if !USERNAME_RE.is_match(username) {
        return Err(ServiceError::bad_request("invalid username format"));
    }
    Ok(())
}

pub(crate) fn validate_email(email: &str) -> Result<(), ServiceError> {
    if !EMAIL_RE.is_match(email) {
        return Err(ServiceError::bad_request("invalid email format"));
    }
    Ok(())
}

pub(crate) fn validate_password(password: &str) -> Result<(), ServiceError> {
    // counted in bytes
    if password.len() < PASSWORD_MIN_LEN {
        return Err(ServiceError::bad_request("password is too weak"));
    }
    Ok(())
}

/// Opaque bearer string handed out on login. Not signed, not verified anywhere.
fn issue_credential() -> String {
    OsRng
        .sample_iter(&Alphanumeric)
        .take(CREDENTIAL_LEN)
        .map(char::from)
        .collect()
}

#[async_trait]
pub trait UserService: Send + Sync {
    async fn register_user(
        &self,
        email: &str,
        username: &str,
        password: &str,
    ) -> Result<i64, ServiceError>;

    async fn login_user(&self, email: &str, password: &str) -> Result<String, ServiceError>;

    async fn get_user_by_id(&self, id: i64) -> Result<User, ServiceError>;
}

pub struct AccountService<S> {
    store: Arc<S>,
    hasher: Argon2Hasher,
}

impl<S: UserStore> AccountService<S> {
    pub fn new(store: Arc<S>, hasher: Argon2Hasher) -> Self {
        Self { store, hasher }
    }

    async fn hash(&self, password: &str) -> anyhow::Result<String> {
        let hasher = self.hasher.clone();
        let password = password.to_owned();
        tokio::task::spawn_blocking(move || hasher.hash_password(&password)).await?
    }

    async fn verify(&self, password: &str, hash: String) -> anyhow::Result<bool> {
        let hasher = self.hasher.clone();
        let password = password.to_owned();
        tokio::task::spawn_blocking(move || hasher.verify_password(&password, &hash)).await?
    }

    /// `Ok(true)` if the lookup found a row.
    fn taken(op: &'static str, res: Result<User, StoreError>) -> Result<bool, ServiceError> {
        match res {
            Ok(_) => Ok(true),
            Err(StoreError::NotFound) => Ok(false),
            Err(e) => Err(ServiceError::unknown(op, e)),
        }
    }
}

#[async_trait]
impl<S: UserStore + 'static> UserService for AccountService<S> {
    #[instrument(skip(self, email, username, password), fields(username = %username.trim()))]
    async fn register_user(
        &self,
        email: &str,
        username: &str,
        password: &str,
    ) -> Result<i64, ServiceError> {
        const OP: &str = "auth.register_user";

        let email = normalize(email);
        let username = normalize(username);

        validate_username(&username)
            .and_then(|_| validate_email(&email))
            .and_then(|_| validate_password(password))
            .inspect_err(|e| warn!(error = %e, "registration rejected"))?;

        // Advisory only: two concurrent registrations can both pass this and the
        // unique constraint behind `save` settles the race.
        if Self::taken(OP, self.store.get_by_email(&email).await)?
            || Self::taken(OP, self.store.get_by_username(&username).await)?
        {
            warn!("email or username already registered");
            return Err(ServiceError::conflict("user already exists"));
        }

        let password_hash = self.hash(password).await.map_err(|e| {
            error!(error = %e, "hash_password failed");
            ServiceError::unknown(OP, e)
        })?;

        let id = self
            .store
            .save(&NewUser {
                email,
                username,
                password_hash,
            })
            .await
            .map_err(|e| match e {
                StoreError::Conflict => ServiceError::conflict("user already exists"),
                other => ServiceError::unknown(OP, other),
            })?;

        info!(user_id = id, "user registered");
        Ok(id)
    }

    #[instrument(skip(self, email, password))]
    async fn login_user(&self, email: &str, password: &str) -> Result<String, ServiceError> {
        const OP: &str = "auth.login_user";

        let email = normalize(email);
        validate_email(&email).inspect_err(|_| warn!("login with malformed email"))?;

        let user = self.store.get_by_email(&email).await.map_err(|e| match e {
            StoreError::NotFound => {
                warn!("login unknown email");
                ServiceError::not_found("user not found")
            }
            other => ServiceError::unknown(OP, other),
        })?;

        let hash = user.password_hash.ok_or_else(|| {
            ServiceError::unknown(OP, anyhow::anyhow!("stored user has no password hash"))
        })?;

        let ok = self
            .verify(password, hash)
            .await
            .map_err(|e| ServiceError::unknown(OP, e))?;
        if !ok {
            warn!(user_id = user.id, "login invalid password");
            return Err(ServiceError::bad_request("invalid login or password"));
        }

        info!(user_id = user.id, "user logged in");
        Ok(issue_credential())
    }

    #[instrument(skip(self))]
    async fn get_user_by_id(&self, id: i64) -> Result<User, ServiceError> {
        const OP: &str = "auth.get_user_by_id";

        self.store.get_by_id(id).await.map_err(|e| match e {
            StoreError::NotFound => ServiceError::not_found("user not found"),
            other => ServiceError::unknown(OP, other),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{
        memory::MemoryUserStore,
        password::cheap_hasher,
        repo::{UserGetter, UserSaver},
    };

    fn service() -> (AccountService<MemoryUserStore>, Arc<MemoryUserStore>) {
        let store = Arc::new(MemoryUserStore::new());
        (AccountService::new(store.clone(), cheap_hasher()), store)
    }

    fn assert_bad_request<T: std::fmt::Debug>(res: Result<T, ServiceError>, msg: &str) {
        match res {
            Err(ServiceError::BadRequest(m)) => assert_eq!(m, msg),
            other => panic!("expected BadRequest({msg}), got {other:?}"),
        }
    }

    #[test]
    fn username_rules() {
        assert_bad_request(validate_username("ab"), "username is too short");
        assert_bad_request(validate_username(&"a".repeat(26)), "username is too long");
        assert_bad_request(validate_username(&normalize("Has-Caps!")), "invalid username format");
        assert!(validate_username("valid_user1").is_ok());
        assert!(validate_username(&"a".repeat(25)).is_ok());
        assert!(validate_username("abc").is_ok());
    }

    #[test]
    fn email_rules() {
        assert_bad_request(validate_email("not-an-email"), "invalid email format");
        assert_bad_request(validate_email("a@b"), "invalid email format");
        assert_eq!(normalize("  USER@Example.COM "), "user@example.com");
        assert!(validate_email(&normalize("USER@Example.COM")).is_ok());
    }

    #[test]
    fn password_rules() {
        assert_bad_request(validate_password("12345"), "password is too weak");
        assert!(validate_password("123456").is_ok());
        // "ééé" is six bytes
        assert!(validate_password("ééé").is_ok());
        assert_bad_request(validate_password("éé"), "password is too weak");
    }

    #[test]
    fn credentials_are_opaque_and_fresh() {
        let a = issue_credential();
        let b = issue_credential();
        assert_eq!(a.len(), CREDENTIAL_LEN);
        assert!(a.chars().all(|c| c.is_ascii_alphanumeric()));
        assert_ne!(a, b);
    }

    #[tokio::test]
    async fn register_normalizes_and_stores_only_a_hash() {
        let (svc, store) = service();
        let id = svc
            .register_user("  USER@Example.COM ", " Valid_User1 ", "123456")
            .await
            .unwrap();

        let user = store.get_by_email("user@example.com").await.unwrap();
        assert_eq!(user.id, id);
        assert_eq!(user.username, "valid_user1");
        let hash = user.password_hash.unwrap();
        assert_ne!(hash, "123456");
        assert!(hash.starts_with("$argon2id$"));
    }

    #[tokio::test]
    async fn register_twice_conflicts_on_email_or_username() {
        let (svc, store) = service();
        svc.register_user("a@example.com", "alice", "123456")
            .await
            .unwrap();

        let same_email = svc.register_user("A@example.com", "other", "123456").await;
        assert!(matches!(same_email, Err(ServiceError::Conflict(_))));

        let same_username = svc.register_user("b@example.com", "ALICE", "123456").await;
        assert!(matches!(same_username, Err(ServiceError::Conflict(_))));

        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn register_validation_runs_before_the_store() {
        let (svc, store) = service();
        store.break_down();
        assert_bad_request(
            svc.register_user("a@example.com", "ab", "123456").await,
            "username is too short",
        );
        assert_bad_request(
            svc.register_user("not-an-email", "alice", "123456").await,
            "invalid email format",
        );
        assert_bad_request(
            svc.register_user("a@example.com", "alice", "12345").await,
            "password is too weak",
        );
    }

    /// Lookups see nothing, the insert still hits the unique constraint.
    struct RacingStore(MemoryUserStore);

    #[async_trait]
    impl UserSaver for RacingStore {
        async fn save(&self, user: &NewUser) -> Result<i64, StoreError> {
            self.0.save(user).await
        }
    }

    #[async_trait]
    impl UserGetter for RacingStore {
        async fn get_by_email(&self, _email: &str) -> Result<User, StoreError> {
            Err(StoreError::NotFound)
        }
        async fn get_by_username(&self, _username: &str) -> Result<User, StoreError> {
            Err(StoreError::NotFound)
        }
        async fn get_by_id(&self, id: i64) -> Result<User, StoreError> {
            self.0.get_by_id(id).await
        }
    }

    #[tokio::test]
    async fn conflict_from_save_is_translated() {
        let inner = MemoryUserStore::new();
        inner
            .insert_raw(&NewUser {
                email: "a@example.com".into(),
                username: "alice".into(),
                password_hash: "x".into(),
            })
            .unwrap();
        let svc = AccountService::new(Arc::new(RacingStore(inner)), cheap_hasher());
        let res = svc.register_user("a@example.com", "alice", "123456").await;
        match res {
            Err(ServiceError::Conflict(m)) => assert_eq!(m, "user already exists"),
            other => panic!("expected Conflict, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn store_failure_surfaces_as_unknown_with_operation() {
        let (svc, store) = service();
        store.break_down();
        let err = svc
            .register_user("a@example.com", "alice", "123456")
            .await
            .unwrap_err();
        match err {
            ServiceError::Unknown { op, .. } => assert_eq!(op, "auth.register_user"),
            other => panic!("expected Unknown, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn login_outcomes() {
        let (svc, _store) = service();
        svc.register_user("a@example.com", "alice", "123456")
            .await
            .unwrap();

        let token = svc.login_user(" A@Example.com", "123456").await.unwrap();
        assert!(!token.is_empty());

        assert_bad_request(
            svc.login_user("a@example.com", "1234567").await,
            "invalid login or password",
        );
        assert_bad_request(
            svc.login_user("not-an-email", "123456").await,
            "invalid email format",
        );
        match svc.login_user("nobody@example.com", "123456").await {
            Err(ServiceError::NotFound(m)) => assert_eq!(m, "user not found"),
            other => panic!("expected NotFound, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn profile_lookup_is_stable_and_hides_hash() {
        let (svc, _store) = service();
        let id = svc
            .register_user("a@example.com", "alice", "123456")
            .await
            .unwrap();

        let first = svc.get_user_by_id(id).await.unwrap();
        let second = svc.get_user_by_id(id).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(first.email, "a@example.com");
        assert!(first.password_hash.is_none());

        assert!(matches!(
            svc.get_user_by_id(id + 100).await,
            Err(ServiceError::NotFound(_))
        ));
    }
}

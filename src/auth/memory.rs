//! In-process user store used by the workflow and router tests.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::auth::error::StoreError;
use crate::auth::repo::{UserGetter, UserSaver};
use crate::auth::repo_types::{NewUser, User};

#[derive(Default)]
pub struct MemoryUserStore {
    rows: Mutex<Vec<User>>,
    broken: AtomicBool,
}

impl MemoryUserStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent call fail with `StoreError::Unknown`.
    pub fn break_down(&self) {
        self.broken.store(true, Ordering::SeqCst);
    }

    pub fn len(&self) -> usize {
        self.rows.lock().unwrap().len()
    }

    /// Insert directly, bypassing the workflow's pre-check.
    pub fn insert_raw(&self, user: &NewUser) -> Result<i64, StoreError> {
        let mut rows = self.rows.lock().unwrap();
        if rows
            .iter()
            .any(|u| u.email == user.email || u.username == user.username)
        {
            return Err(StoreError::Conflict);
        }
        let id = rows.len() as i64 + 1;
        rows.push(User {
            id,
            email: user.email.clone(),
            username: user.username.clone(),
            password_hash: Some(user.password_hash.clone()),
        });
        Ok(id)
    }

    fn check(&self, op: &'static str) -> Result<(), StoreError> {
        if self.broken.load(Ordering::SeqCst) {
            return Err(StoreError::unknown(op, anyhow::anyhow!("store is down")));
        }
        Ok(())
    }

    fn find(&self, pred: impl Fn(&User) -> bool) -> Result<User, StoreError> {
        self.rows
            .lock()
            .unwrap()
            .iter()
            .find(|u| pred(u))
            .cloned()
            .ok_or(StoreError::NotFound)
    }
}

#[async_trait]
impl UserSaver for MemoryUserStore {
    async fn save(&self, user: &NewUser) -> Result<i64, StoreError> {
        self.check("memory.save")?;
        self.insert_raw(user)
    }
}

#[async_trait]
impl UserGetter for MemoryUserStore {
    async fn get_by_email(&self, email: &str) -> Result<User, StoreError> {
        self.check("memory.get_by_email")?;
        self.find(|u| u.email == email)
    }

    async fn get_by_username(&self, username: &str) -> Result<User, StoreError> {
        self.check("memory.get_by_username")?;
        self.find(|u| u.username == username)
    }

    async fn get_by_id(&self, id: i64) -> Result<User, StoreError> {
        self.check("memory.get_by_id")?;
        self.find(|u| u.id == id).map(|u| User {
            password_hash: None,
            ..u
        })
    }
}

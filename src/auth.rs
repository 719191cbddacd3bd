//! Local login session backed by the `usuarios` table.
//!
//! The password check is a plain equality against the stored value and the
//! resulting session is trusted as-is until logout.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::constants::USER_SESSION_KEY;
use crate::error::{EvidenceError, Result};
use crate::store::LocalStore;
use crate::supabase::{SupabaseClient, UserRow};

pub const ADMIN_ROLE: &str = "admin";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub username: String,
    pub role: String,
    /// Login time, milliseconds since the Unix epoch
    pub timestamp: i64,
}

#[async_trait]
pub trait UserDirectory: Send + Sync {
    async fn find_user(&self, username: &str) -> Result<Option<UserRow>>;
}

#[async_trait]
impl UserDirectory for SupabaseClient {
    async fn find_user(&self, username: &str) -> Result<Option<UserRow>> {
        SupabaseClient::find_user(self, username).await
    }
}

/// Directory with no users, for sessions read without a backend.
struct NoDirectory;

#[async_trait]
impl UserDirectory for NoDirectory {
    async fn find_user(&self, _username: &str) -> Result<Option<UserRow>> {
        Ok(None)
    }
}

pub struct AuthService {
    directory: Arc<dyn UserDirectory>,
    store: LocalStore,
}

impl AuthService {
    pub fn new(directory: Arc<dyn UserDirectory>, store: LocalStore) -> Self {
        Self { directory, store }
    }

    /// Session access over the local store alone. Logout and session reads
    /// work; every login attempt is rejected.
    pub fn local(store: LocalStore) -> Self {
        Self::new(Arc::new(NoDirectory), store)
    }

    pub async fn login(&self, username: &str, password: &str) -> Result<Session> {
        let user = self
            .directory
            .find_user(username.trim())
            .await?
            .filter(|user| user.password == password)
            .ok_or(EvidenceError::InvalidCredentials)?;

        let session = Session {
            username: user.username,
            role: user.role,
            timestamp: Utc::now().timestamp_millis(),
        };
        self.store.set(USER_SESSION_KEY, &session)?;
        info!(username = %session.username, role = %session.role, "logged in");
        Ok(session)
    }

    pub fn logout(&self) -> Result<()> {
        self.store.remove(USER_SESSION_KEY)
    }

    pub fn current_session(&self) -> Result<Option<Session>> {
        self.store.get(USER_SESSION_KEY)
    }

    pub fn is_admin(&self) -> Result<bool> {
        Ok(self
            .current_session()?
            .map_or(false, |s| s.role == ADMIN_ROLE))
    }
}

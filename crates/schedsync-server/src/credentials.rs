//! Typed access to sessions and login state in the credential store.
//!
//! Two records are kept per user:
//!
//! - `session:{user_id}` - the [`OAuthToken`] as JSON, never expiring
//! - `state:{user_id}` - the pending [`AuthState`], expiring after the
//!   configured state TTL

use std::sync::Arc;
use std::time::Duration;

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::{DateTime, Utc};
use rand::RngCore;
use schedsync_calendar::OAuthToken;
use schedsync_core::UserId;
use serde::{Deserialize, Serialize};

use crate::store::{CredentialStore, StoreResult};

/// Default lifetime of a pending login state.
pub const DEFAULT_STATE_TTL: Duration = Duration::from_secs(600);

/// Number of random bytes in a login nonce.
const NONCE_BYTES: usize = 16;

/// A pending authorization: the nonce handed out as the OAuth `state`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthState {
    pub nonce: String,
    pub issued_at: DateTime<Utc>,
}

impl AuthState {
    /// Creates a state with a fresh random nonce.
    pub fn generate() -> Self {
        let mut bytes = [0u8; NONCE_BYTES];
        rand::rng().fill_bytes(&mut bytes);
        Self {
            nonce: URL_SAFE_NO_PAD.encode(bytes),
            issued_at: Utc::now(),
        }
    }

    /// Returns true if the presented state matches this nonce.
    pub fn matches(&self, presented: &str) -> bool {
        self.nonce == presented
    }
}

/// Session and login-state records on top of a [`CredentialStore`].
#[derive(Clone)]
pub struct CredentialVault {
    store: Arc<dyn CredentialStore>,
    state_ttl: Duration,
}

impl CredentialVault {
    /// Creates a vault with the default state TTL.
    pub fn new(store: Arc<dyn CredentialStore>) -> Self {
        Self {
            store,
            state_ttl: DEFAULT_STATE_TTL,
        }
    }

    /// Builder: set the login state TTL.
    pub fn with_state_ttl(mut self, ttl: Duration) -> Self {
        self.state_ttl = ttl;
        self
    }

    /// Returns the stored session.
    pub async fn session(&self, user_id: UserId) -> StoreResult<Option<OAuthToken>> {
        match self.store.get(session_key(user_id)).await? {
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }

    /// Stores the session, overwriting any previous one.
    pub async fn put_session(&self, user_id: UserId, token: &OAuthToken) -> StoreResult<()> {
        let raw = serde_json::to_string(token)?;
        self.store
            .set(session_key(user_id), raw, Duration::ZERO)
            .await
    }

    /// Returns the pending login state.
    pub async fn auth_state(&self, user_id: UserId) -> StoreResult<Option<AuthState>> {
        match self.store.get(state_key(user_id)).await? {
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }

    /// Stores the pending login state with the configured TTL.
    pub async fn put_auth_state(&self, user_id: UserId, state: &AuthState) -> StoreResult<()> {
        let raw = serde_json::to_string(state)?;
        self.store.set(state_key(user_id), raw, self.state_ttl).await
    }

    /// Removes the pending login state.
    pub async fn delete_auth_state(&self, user_id: UserId) -> StoreResult<()> {
        self.store.delete(state_key(user_id)).await
    }
}

fn session_key(user_id: UserId) -> String {
    format!("session:{user_id}")
}

fn state_key(user_id: UserId) -> String {
    format!("state:{user_id}")
}

//! Bearer-token trust boundary.
//!
//! Tokens are 32 random bytes, hex encoded, handed to the client once. The
//! store keeps only their SHA-256 digest together with the owning user, an
//! expiry and the connection metadata seen at issuance.

use std::net::SocketAddr;

use axum::body::Body;
use axum::extract::{ConnectInfo, State};
use axum::http::{header, HeaderMap, Request};
use axum::middleware::Next;
use axum::response::Response;
use chrono::Utc;
use gophkeeper_core::crypto::{
    hash_password_with, verify_password, CryptoError, PasswordHashParams,
};
use gophkeeper_core::proto::{AUTHORIZATION_HEADER, BEARER_PREFIX};
use rand::rngs::OsRng;
use rand::RngCore;
use sha2::{Digest, Sha256};
use thiserror::Error;
use uuid::Uuid;

use crate::deadline;
use crate::error::ServerError;
use crate::server::AppState;
use crate::storage::{StorageError, Store, StoredToken, StoredUser};

const TOKEN_BYTES: usize = 32;

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("user not found")]
    UserNotFound,

    #[error("wrong password")]
    WrongAuth,

    #[error("invalid token")]
    InvalidToken,

    #[error(transparent)]
    Crypto(#[from] CryptoError),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Authenticated caller, inserted into request extensions by [`auth_middleware`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CallerId(pub i64);

/// Connection details recorded with each issued token.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConnectionMeta {
    pub remote_addr: Option<String>,
    pub user_agent: Option<String>,
}

impl ConnectionMeta {
    pub fn from_request(headers: &HeaderMap, extensions: &axum::http::Extensions) -> Self {
        Self {
            remote_addr: extensions
                .get::<ConnectInfo<SocketAddr>>()
                .map(|ConnectInfo(addr)| addr.to_string()),
            user_agent: headers
                .get(header::USER_AGENT)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string),
        }
    }
}

/// Issues and validates client tokens.
#[derive(Debug, Clone)]
pub struct AuthManager {
    token_ttl: chrono::Duration,
    hash_params: PasswordHashParams,
}

impl AuthManager {
    pub fn new(token_ttl: chrono::Duration) -> Self {
        Self {
            token_ttl,
            hash_params: PasswordHashParams::default(),
        }
    }

    pub fn with_hash_params(mut self, params: PasswordHashParams) -> Self {
        self.hash_params = params;
        self
    }

    /// Hash a new account password. CPU and memory heavy; never call it
    /// while holding the store.
    pub fn hash_password(&self, password: &str) -> Result<String, AuthError> {
        Ok(hash_password_with(password, &self.hash_params)?)
    }

    /// Check a login password against the stored hash.
    pub fn check_password(&self, user: &StoredUser, password: &str) -> Result<(), AuthError> {
        if verify_password(&user.password_hash, password) {
            Ok(())
        } else {
            tracing::warn!(email = %user.email, "rejected login: wrong password");
            Err(AuthError::WrongAuth)
        }
    }

    /// Issue a new token for an already verified user.
    pub fn issue_token(
        &self,
        store: &dyn Store,
        user_id: i64,
        meta: &ConnectionMeta,
    ) -> Result<String, AuthError> {
        let token = generate_token();
        let now = Utc::now();
        store.new_client_token(&StoredToken {
            token_id: Uuid::new_v4().to_string(),
            token_hash: hash_token(&token),
            user_id,
            expires_at: (now + self.token_ttl).timestamp(),
            issued_at: now.timestamp(),
            remote_addr: meta.remote_addr.clone(),
            user_agent: meta.user_agent.clone(),
        })?;
        tracing::debug!(user_id, "issued token");
        Ok(token)
    }

    /// Create a user from a finished password hash and issue its first token.
    ///
    /// Returns `None` when the email was registered concurrently.
    pub fn create_user(
        &self,
        store: &dyn Store,
        email: &str,
        password_hash: &str,
        meta: &ConnectionMeta,
    ) -> Result<Option<String>, AuthError> {
        let user = match store.new_user(email, password_hash) {
            Ok(user) => user,
            Err(StorageError::AlreadyExists(_)) => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        tracing::info!(user_id = user.id, "registered new user");
        self.issue_token(store, user.id, meta).map(Some)
    }

    /// Resolve a token to its user id. Unknown and expired tokens are invalid.
    pub fn authenticate(&self, store: &dyn Store, token: &str) -> Result<i64, AuthError> {
        let stored = store
            .find_token(&hash_token(token))?
            .ok_or(AuthError::InvalidToken)?;

        if stored.expires_at <= Utc::now().timestamp() {
            return Err(AuthError::InvalidToken);
        }
        Ok(stored.user_id)
    }

    pub fn revoke_token(&self, store: &dyn Store, token: &str) -> Result<bool, AuthError> {
        Ok(store.delete_token(&hash_token(token))?)
    }

    /// Remove a user with every token and record it owns.
    pub fn revoke_user(&self, store: &dyn Store, user_id: i64) -> Result<(), AuthError> {
        store.delete_user(user_id)?;
        tracing::info!(user_id, "user revoked");
        Ok(())
    }
}

/// Log in, creating the account on first contact.
///
/// The store is only held for the lookup and the token write; Argon2 runs
/// on the blocking pool in between.
pub async fn login_or_register(
    state: &AppState,
    email: String,
    password: String,
    meta: ConnectionMeta,
) -> Result<String, ServerError> {
    if let Some(user) = find_user(state, &email).await? {
        return login(state, user, password, meta).await;
    }

    let hash = state.hash_password(password.clone()).await?;
    let auth = state.auth.clone();
    let (new_email, new_meta) = (email.clone(), meta.clone());
    let created = state
        .call(move |store| auth.create_user(store, &new_email, &hash, &new_meta))
        .await?;

    match created {
        Some(token) => Ok(token),
        None => {
            let user = find_user(state, &email)
                .await?
                .ok_or(AuthError::UserNotFound)?;
            login(state, user, password, meta).await
        }
    }
}

async fn find_user(state: &AppState, email: &str) -> Result<Option<StoredUser>, ServerError> {
    let email = email.to_string();
    state
        .call(move |store| Ok::<_, AuthError>(store.get_user_by_email(&email)?))
        .await
}

async fn login(
    state: &AppState,
    user: StoredUser,
    password: String,
    meta: ConnectionMeta,
) -> Result<String, ServerError> {
    let user_id = user.id;
    let auth = state.auth.clone();
    deadline::run_blocking(state.operation_timeout, move |_| {
        auth.check_password(&user, &password)
    })
    .await?;

    let auth = state.auth.clone();
    state
        .call(move |store| auth.issue_token(store, user_id, &meta))
        .await
}

fn generate_token() -> String {
    let mut bytes = [0u8; TOKEN_BYTES];
    OsRng.fill_bytes(&mut bytes);
    hex::encode(bytes)
}

/// Storage key for a token.
pub fn hash_token(token: &str) -> String {
    hex::encode(Sha256::digest(token.as_bytes()))
}

/// Extract the bearer token from request headers.
pub fn bearer_token(headers: &HeaderMap) -> Result<&str, ServerError> {
    let value = headers
        .get(AUTHORIZATION_HEADER)
        .ok_or(ServerError::NoToken)?
        .to_str()
        .map_err(|_| ServerError::InvalidToken)?;

    value
        .strip_prefix(BEARER_PREFIX)
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .ok_or(ServerError::InvalidToken)
}

/// Auth middleware: resolves the bearer token to a [`CallerId`].
pub async fn auth_middleware(
    State(state): State<AppState>,
    mut request: Request<Body>,
    next: Next,
) -> Result<Response, ServerError> {
    let token = bearer_token(request.headers())?.to_string();

    let auth = state.auth.clone();
    let user_id = state
        .call(move |store| auth.authenticate(store, &token))
        .await
        .map_err(|e| {
            if matches!(e, ServerError::InvalidToken) {
                tracing::warn!("rejected request: invalid token");
            }
            e
        })?;

    request.extensions_mut().insert(CallerId(user_id));
    Ok(next.run(request).await)
}

//! Registration and account handlers.

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::{Extensions, HeaderMap};
use axum::{Extension, Json};
use gophkeeper_core::proto::{
    DeleteUserResponse, RegisterRequest, RegisterResponse, SyncUserMessage,
};
use gophkeeper_core::UserProfile;

use crate::auth::{self, CallerId, ConnectionMeta};
use crate::error::ServerError;
use crate::server::AppState;

fn validate_credentials(req: &RegisterRequest) -> Result<(), ServerError> {
    let email = req.email.trim();
    if email.is_empty() || !email.contains('@') {
        return Err(ServerError::Validation("a valid email is required".to_string()));
    }
    if req.password.is_empty() {
        return Err(ServerError::Validation("password is required".to_string()));
    }
    Ok(())
}

/// Log in, creating the account on first contact. No token required.
pub async fn register(
    State(state): State<AppState>,
    headers: HeaderMap,
    extensions: Extensions,
    body: Result<Json<RegisterRequest>, JsonRejection>,
) -> Result<Json<RegisterResponse>, ServerError> {
    let Json(req) = body?;
    validate_credentials(&req)?;

    let meta = ConnectionMeta::from_request(&headers, &extensions);
    let email = req.email.trim().to_string();
    let token = auth::login_or_register(&state, email, req.password, meta).await?;

    Ok(Json(RegisterResponse { token }))
}

pub async fn sync_user(
    State(state): State<AppState>,
    Extension(CallerId(user_id)): Extension<CallerId>,
    body: Result<Json<SyncUserMessage>, JsonRejection>,
) -> Result<Json<SyncUserMessage>, ServerError> {
    let Json(req) = body?;
    let incoming = UserProfile::from(req);

    let password_hash = match incoming.password.clone() {
        Some(password) => Some(state.hash_password(password).await?),
        None => None,
    };

    let engine = state.engine.clone();
    let profile = state
        .call(move |store| engine.sync_user(store, user_id, incoming, password_hash))
        .await?;

    Ok(Json(profile.into()))
}

pub async fn delete_user(
    State(state): State<AppState>,
    Extension(CallerId(user_id)): Extension<CallerId>,
) -> Result<Json<DeleteUserResponse>, ServerError> {
    let engine = state.engine.clone();
    let ok = state
        .call(move |store| engine.delete_user(store, user_id))
        .await?;
    Ok(Json(DeleteUserResponse { ok }))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn req(email: &str, password: &str) -> RegisterRequest {
        RegisterRequest {
            email: email.to_string(),
            password: password.to_string(),
        }
    }

    #[test]
    fn credentials_shape() {
        assert!(validate_credentials(&req("a@x.com", "pw")).is_ok());
        assert!(validate_credentials(&req("  ", "pw")).is_err());
        assert!(validate_credentials(&req("not-an-email", "pw")).is_err());
        assert!(validate_credentials(&req("a@x.com", "")).is_err());
    }
}

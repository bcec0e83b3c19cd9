//! HTTP sync client for communicating with the GophKeeper server.

use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::models::{DataItem, ItemSummary, ListQuery, UserProfile};
use crate::proto::{
    routes, DeleteUserResponse, ErrorBody, ErrorCode, ListRequest, ListResponse, RegisterRequest,
    RegisterResponse, SyncItemMessage, SyncUserMessage, AUTHORIZATION_HEADER, BEARER_PREFIX,
};
use crate::sync::ClientConfig;
use crate::{Result, VaultError};

/// HTTP client for the GophKeeper server.
pub struct SyncClient {
    client: reqwest::Client,
    server_url: String,
    token: Option<String>,
}

impl SyncClient {
    /// Create a new sync client.
    pub fn new(server_url: &str, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("gophkeeper/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| VaultError::Transport(e.to_string()))?;

        Ok(Self {
            client,
            server_url: server_url.trim_end_matches('/').to_string(),
            token: None,
        })
    }

    pub fn from_config(config: &ClientConfig) -> Result<Self> {
        Self::new(&config.server_url, config.operation_timeout())
    }

    pub fn set_token(&mut self, token: impl Into<String>) {
        self.token = Some(token.into());
    }

    pub fn token(&self) -> Option<&str> {
        self.token.as_deref()
    }

    /// Log in, creating the account on first use. Stores and returns the token.
    pub async fn register(&mut self, email: &str, password: &str) -> Result<String> {
        let request = RegisterRequest {
            email: email.to_string(),
            password: password.to_string(),
        };
        let response: RegisterResponse = self.post(routes::REGISTER, &request).await?;
        self.token = Some(response.token.clone());
        Ok(response.token)
    }

    /// List remote record metadata.
    pub async fn list(&self, query: &ListQuery) -> Result<(Vec<ItemSummary>, u64)> {
        let response: ListResponse = self.post(routes::LIST, &ListRequest::from(query)).await?;
        let items = response.items.into_iter().map(ItemSummary::from).collect();
        Ok((items, response.total))
    }

    /// Push one record and return the server's view of it.
    pub async fn sync_item(&self, item: &DataItem) -> Result<DataItem> {
        let request = SyncItemMessage::from(item.clone());
        match self
            .post::<_, SyncItemMessage>(routes::SYNC_ITEM, &request)
            .await
        {
            Ok(response) => Ok(response.into()),
            Err(VaultError::Remote {
                code: ErrorCode::SyncIdentityConflict,
                ..
            }) => Err(VaultError::SyncConflict {
                key: item.key().to_string(),
            }),
            Err(e) => Err(e),
        }
    }

    /// Push the account profile and return the server's view of it.
    pub async fn sync_user(&self, profile: &UserProfile) -> Result<UserProfile> {
        let request = SyncUserMessage::from(profile.clone());
        let response: SyncUserMessage = self.post(routes::SYNC_USER, &request).await?;
        Ok(response.into())
    }

    /// Delete the account and everything stored under it.
    pub async fn delete_user(&self) -> Result<bool> {
        let response: DeleteUserResponse = self
            .post(routes::DELETE_USER, &serde_json::json!({}))
            .await?;
        Ok(response.ok)
    }

    pub async fn health(&self) -> Result<()> {
        let url = format!("{}{}", self.server_url, routes::HEALTH);
        let resp = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| VaultError::Transport(e.to_string()))?;
        if !resp.status().is_success() {
            return Err(VaultError::Transport(format!(
                "health check failed: {}",
                resp.status()
            )));
        }
        Ok(())
    }

    // --- Internal helpers ---

    async fn post<Req, Resp>(&self, path: &str, body: &Req) -> Result<Resp>
    where
        Req: Serialize + ?Sized,
        Resp: DeserializeOwned,
    {
        let url = format!("{}{}", self.server_url, path);
        let mut request = self.client.post(&url).json(body);
        if let Some(token) = &self.token {
            request = request.header(AUTHORIZATION_HEADER, format!("{}{}", BEARER_PREFIX, token));
        }

        let resp = request
            .send()
            .await
            .map_err(|e| VaultError::Transport(e.to_string()))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let bytes = resp
                .bytes()
                .await
                .map_err(|e| VaultError::Transport(e.to_string()))?;
            return Err(remote_error(status, &bytes));
        }

        resp.json()
            .await
            .map_err(|e| VaultError::Serialization(format!("invalid response from {}: {}", path, e)))
    }
}

/// Map an error response body back to a typed error.
fn remote_error(status: reqwest::StatusCode, body: &[u8]) -> VaultError {
    match serde_json::from_slice::<ErrorBody>(body) {
        Ok(ErrorBody {
            code: ErrorCode::NotFound,
            error,
        }) => VaultError::NotFound(error),
        Ok(ErrorBody { code, error }) => VaultError::Remote {
            code,
            message: error,
        },
        Err(_) => VaultError::Transport(format!(
            "server error {}: {}",
            status,
            String::from_utf8_lossy(body)
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trailing_slash_is_trimmed() {
        let client = SyncClient::new("http://localhost:8080/", Duration::from_secs(1)).unwrap();
        assert_eq!(client.server_url, "http://localhost:8080");
        assert!(client.token().is_none());
    }

    #[test]
    fn error_body_maps_to_typed_error() {
        let body = br#"{"error":"wrong password","code":"WRONG_AUTH"}"#;
        match remote_error(reqwest::StatusCode::UNAUTHORIZED, body) {
            VaultError::Remote { code, message } => {
                assert_eq!(code, ErrorCode::WrongAuth);
                assert_eq!(message, "wrong password");
            }
            other => panic!("unexpected error: {:?}", other),
        }

        let body = br#"{"error":"no such record","code":"NOT_FOUND"}"#;
        assert!(matches!(
            remote_error(reqwest::StatusCode::NOT_FOUND, body),
            VaultError::NotFound(_)
        ));
    }

    #[test]
    fn non_json_error_is_transport() {
        assert!(matches!(
            remote_error(reqwest::StatusCode::BAD_GATEWAY, b"<html>"),
            VaultError::Transport(_)
        ));
    }
}

//! Wire schema for the sync API.
//!
//! JSON bodies use camelCase field names, RFC 3339 timestamps and base64 for
//! binary fields. Conversions to and from the core models live here so that
//! neither the handlers nor the HTTP client touch field-by-field mapping.

use crate::models::{DataItem, ItemMeta, ItemSummary, ListQuery, OrderBy, UserProfile};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Request header carrying the bearer token.
pub const AUTHORIZATION_HEADER: &str = "authorization";
/// Scheme prefix expected in [`AUTHORIZATION_HEADER`].
pub const BEARER_PREFIX: &str = "Bearer ";

/// HTTP routes, relative to the server base URL.
pub mod routes {
    pub const HEALTH: &str = "/health";
    pub const REGISTER: &str = "/api/v1/register";
    pub const LIST: &str = "/api/v1/items/list";
    pub const SYNC_ITEM: &str = "/api/v1/items/sync";
    pub const SYNC_USER: &str = "/api/v1/user/sync";
    pub const DELETE_USER: &str = "/api/v1/user/delete";
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterResponse {
    pub token: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub offset: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub order_by: Option<OrderBy>,
    #[serde(default)]
    pub include_deleted: bool,
}

impl ListRequest {
    /// Normalize into a [`ListQuery`], applying the default and max limit.
    pub fn into_query(self) -> ListQuery {
        let mut query = ListQuery::new(self.limit, self.offset);
        query.order_by = self.order_by.unwrap_or_default();
        query.include_deleted = self.include_deleted;
        query
    }
}

impl From<&ListQuery> for ListRequest {
    fn from(q: &ListQuery) -> Self {
        Self {
            limit: Some(q.limit),
            offset: Some(q.offset),
            order_by: Some(q.order_by),
            include_deleted: q.include_deleted,
        }
    }
}

/// Metadata-only listing row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemInfo {
    pub key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub deleted: bool,
}

impl From<ItemSummary> for ItemInfo {
    fn from(s: ItemSummary) -> Self {
        Self {
            key: s.meta.key,
            description: s.meta.description,
            created_at: s.meta.created_at,
            updated_at: s.meta.updated_at,
            deleted: s.deleted,
        }
    }
}

impl From<ItemInfo> for ItemSummary {
    fn from(i: ItemInfo) -> Self {
        Self {
            meta: ItemMeta {
                key: i.key,
                description: i.description,
                created_at: i.created_at,
                updated_at: i.updated_at,
            },
            deleted: i.deleted,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ListResponse {
    pub items: Vec<ItemInfo>,
    pub total: u64,
}

/// Request and response body of `SyncItem`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncItemMessage {
    /// Absent keys decode as empty so the engine reports `SYNC_NO_KEY`.
    #[serde(default)]
    pub key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "opt_base64_bytes"
    )]
    pub blob: Option<Vec<u8>>,
}

impl From<DataItem> for SyncItemMessage {
    fn from(item: DataItem) -> Self {
        Self {
            key: item.meta.key,
            description: item.meta.description,
            created_at: item.meta.created_at,
            updated_at: item.meta.updated_at,
            blob: item.blob,
        }
    }
}

impl From<SyncItemMessage> for DataItem {
    fn from(m: SyncItemMessage) -> Self {
        DataItem {
            meta: ItemMeta {
                key: m.key,
                description: m.description,
                created_at: m.created_at,
                updated_at: m.updated_at,
            },
            blob: m.blob,
        }
    }
}

/// Request and response body of `SyncUser`.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncUserMessage {
    pub email: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "opt_base64_bytes"
    )]
    pub packed_key: Option<Vec<u8>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl From<UserProfile> for SyncUserMessage {
    fn from(u: UserProfile) -> Self {
        Self {
            email: u.email,
            password: u.password,
            description: u.description,
            packed_key: u.packed_key,
            created_at: u.created_at,
            updated_at: u.updated_at,
        }
    }
}

impl From<SyncUserMessage> for UserProfile {
    fn from(m: SyncUserMessage) -> Self {
        Self {
            email: m.email,
            password: m.password.filter(|p| !p.is_empty()),
            description: m.description,
            packed_key: m.packed_key,
            created_at: m.created_at,
            updated_at: m.updated_at,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeleteUserResponse {
    pub ok: bool,
}

/// Machine-readable error kind carried in every error body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    NotFound,
    Validation,
    WrongAuth,
    NoToken,
    InvalidToken,
    SyncNoKey,
    SyncIdentityConflict,
    DeadlineExceeded,
    Internal,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NotFound => "NOT_FOUND",
            Self::Validation => "VALIDATION",
            Self::WrongAuth => "WRONG_AUTH",
            Self::NoToken => "NO_TOKEN",
            Self::InvalidToken => "INVALID_TOKEN",
            Self::SyncNoKey => "SYNC_NO_KEY",
            Self::SyncIdentityConflict => "SYNC_IDENTITY_CONFLICT",
            Self::DeadlineExceeded => "DEADLINE_EXCEEDED",
            Self::Internal => "INTERNAL",
        }
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// JSON error body: `{"error": "...", "code": "..."}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
    pub code: ErrorCode,
}

/// Custom base64 serialization for `Vec<u8>`.
pub(crate) mod base64_bytes {
    use base64::{engine::general_purpose::STANDARD, Engine};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<u8>, D::Error> {
        let s = String::deserialize(d)?;
        STANDARD.decode(&s).map_err(serde::de::Error::custom)
    }
}

/// Same as [`base64_bytes`] for optional fields.
pub(crate) mod opt_base64_bytes {
    use base64::{engine::general_purpose::STANDARD, Engine};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &Option<Vec<u8>>, s: S) -> Result<S::Ok, S::Error> {
        match bytes {
            Some(b) => s.serialize_some(&STANDARD.encode(b)),
            None => s.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Vec<u8>>, D::Error> {
        match Option::<String>::deserialize(d)? {
            Some(s) => STANDARD
                .decode(&s)
                .map(Some)
                .map_err(serde::de::Error::custom),
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn sync_item_message_uses_camel_case_and_base64() {
        let msg = SyncItemMessage {
            key: "k1".to_string(),
            description: None,
            created_at: Some(Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap()),
            updated_at: None,
            blob: Some(vec![1, 2, 3]),
        };

        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["key"], "k1");
        assert_eq!(json["createdAt"], "2024-01-02T03:04:05Z");
        assert_eq!(json["blob"], "AQID");
        assert!(json.get("updatedAt").is_none());
        assert!(json.get("description").is_none());

        let back: SyncItemMessage = serde_json::from_value(json).unwrap();
        assert_eq!(back, msg);
    }

    #[test]
    fn missing_blob_is_soft_deleted_item() {
        let msg: SyncItemMessage = serde_json::from_str(r#"{"key":"gone"}"#).unwrap();
        let item = DataItem::from(msg);
        assert!(item.is_deleted());
        assert_eq!(item.meta.created_at, None);
    }

    #[test]
    fn absent_key_decodes_as_empty() {
        let msg: SyncItemMessage = serde_json::from_str(r#"{"blob":"AQID"}"#).unwrap();
        assert_eq!(msg.key, "");
        assert_eq!(DataItem::from(msg).meta.key, "");
    }

    #[test]
    fn list_request_defaults() {
        let req: ListRequest = serde_json::from_str("{}").unwrap();
        let q = req.into_query();
        assert_eq!(q.limit, ListQuery::DEFAULT_LIMIT);
        assert_eq!(q.offset, 0);
        assert_eq!(q.order_by, OrderBy::Key);
        assert!(!q.include_deleted);

        let req: ListRequest =
            serde_json::from_str(r#"{"limit":5000,"orderBy":"updatedAt","includeDeleted":true}"#)
                .unwrap();
        let q = req.into_query();
        assert_eq!(q.limit, ListQuery::MAX_LIMIT);
        assert_eq!(q.order_by, OrderBy::UpdatedAt);
        assert!(q.include_deleted);
    }

    #[test]
    fn error_code_wire_names() {
        let body = ErrorBody {
            error: "nope".to_string(),
            code: ErrorCode::SyncIdentityConflict,
        };
        let json = serde_json::to_string(&body).unwrap();
        assert!(json.contains("\"SYNC_IDENTITY_CONFLICT\""));

        for code in [
            ErrorCode::NotFound,
            ErrorCode::Validation,
            ErrorCode::WrongAuth,
            ErrorCode::NoToken,
            ErrorCode::InvalidToken,
            ErrorCode::SyncNoKey,
            ErrorCode::DeadlineExceeded,
            ErrorCode::Internal,
        ] {
            let json = serde_json::to_string(&code).unwrap();
            assert_eq!(json, format!("\"{}\"", code.as_str()));
        }
    }

    #[test]
    fn empty_password_in_user_message_is_none() {
        let msg = SyncUserMessage {
            email: "a@x.com".to_string(),
            password: Some(String::new()),
            ..Default::default()
        };
        assert_eq!(UserProfile::from(msg).password, None);
    }
}

//! Typed record payloads and their tagged JSON envelope.
//!
//! A payload is serialized as `{"type": "...", "data": {...}, "fileName": ...}`
//! and then sealed with the vault key before it leaves the device. The server
//! only ever sees the sealed bytes.

use crate::crypto::VaultKey;
use crate::{Result, VaultError};
use serde::{Deserialize, Serialize};

/// Envelope tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PayloadKind {
    Auth,
    Text,
    Bin,
    Card,
}

impl PayloadKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Auth => "auth",
            Self::Text => "text",
            Self::Bin => "bin",
            Self::Card => "card",
        }
    }
}

/// Decrypted contents of a record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    Auth {
        login: String,
        password: String,
    },
    Text {
        text: String,
    },
    Bin {
        file_name: Option<String>,
        data: Vec<u8>,
    },
    Card {
        number: String,
        holder: String,
        expiry: String,
        cvv: String,
    },
}

#[derive(Serialize, Deserialize)]
struct AuthData {
    login: String,
    password: String,
}

#[derive(Serialize, Deserialize)]
struct TextData {
    text: String,
}

#[derive(Serialize, Deserialize)]
struct BinData {
    #[serde(with = "crate::proto::base64_bytes")]
    data: Vec<u8>,
}

#[derive(Serialize, Deserialize)]
struct CardData {
    number: String,
    holder: String,
    expiry: String,
    cvv: String,
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Envelope {
    #[serde(rename = "type")]
    kind: PayloadKind,
    data: serde_json::Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    file_name: Option<String>,
}

fn to_value<T: Serialize>(data: T) -> Result<serde_json::Value> {
    serde_json::to_value(data).map_err(|e| VaultError::Serialization(e.to_string()))
}

fn from_value<T: for<'de> Deserialize<'de>>(value: serde_json::Value) -> Result<T> {
    serde_json::from_value(value).map_err(|e| VaultError::Serialization(e.to_string()))
}

impl Payload {
    pub fn kind(&self) -> PayloadKind {
        match self {
            Self::Auth { .. } => PayloadKind::Auth,
            Self::Text { .. } => PayloadKind::Text,
            Self::Bin { .. } => PayloadKind::Bin,
            Self::Card { .. } => PayloadKind::Card,
        }
    }

    /// File name carried by binary payloads.
    pub fn file_name(&self) -> Option<&str> {
        match self {
            Self::Bin { file_name, .. } => file_name.as_deref(),
            _ => None,
        }
    }

    /// Serialize into the tagged JSON envelope.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let (data, file_name) = match self {
            Self::Auth { login, password } => (
                to_value(AuthData {
                    login: login.clone(),
                    password: password.clone(),
                })?,
                None,
            ),
            Self::Text { text } => (to_value(TextData { text: text.clone() })?, None),
            Self::Bin { file_name, data } => (
                to_value(BinData { data: data.clone() })?,
                file_name.clone(),
            ),
            Self::Card {
                number,
                holder,
                expiry,
                cvv,
            } => (
                to_value(CardData {
                    number: number.clone(),
                    holder: holder.clone(),
                    expiry: expiry.clone(),
                    cvv: cvv.clone(),
                })?,
                None,
            ),
        };

        let envelope = Envelope {
            kind: self.kind(),
            data,
            file_name,
        };
        serde_json::to_vec(&envelope).map_err(|e| VaultError::Serialization(e.to_string()))
    }

    /// Parse a tagged JSON envelope, dispatching on its `type`.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let envelope: Envelope =
            serde_json::from_slice(bytes).map_err(|e| VaultError::Serialization(e.to_string()))?;

        let payload = match envelope.kind {
            PayloadKind::Auth => {
                let d: AuthData = from_value(envelope.data)?;
                Self::Auth {
                    login: d.login,
                    password: d.password,
                }
            }
            PayloadKind::Text => {
                let d: TextData = from_value(envelope.data)?;
                Self::Text { text: d.text }
            }
            PayloadKind::Bin => {
                let d: BinData = from_value(envelope.data)?;
                Self::Bin {
                    file_name: envelope.file_name,
                    data: d.data,
                }
            }
            PayloadKind::Card => {
                let d: CardData = from_value(envelope.data)?;
                Self::Card {
                    number: d.number,
                    holder: d.holder,
                    expiry: d.expiry,
                    cvv: d.cvv,
                }
            }
        };
        Ok(payload)
    }

    /// Serialize and encrypt with the vault key.
    pub fn seal(&self, key: &VaultKey) -> Result<Vec<u8>> {
        let plain = self.to_bytes()?;
        Ok(key.seal(&plain)?)
    }

    /// Decrypt with the vault key and parse.
    pub fn open(sealed: &[u8], key: &VaultKey) -> Result<Self> {
        let plain = key.open(sealed)?;
        Self::from_bytes(&plain)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn envelope_shape() {
        let p = Payload::Text {
            text: "hello".to_string(),
        };
        let v: serde_json::Value = serde_json::from_slice(&p.to_bytes().unwrap()).unwrap();
        assert_eq!(v["type"], "text");
        assert_eq!(v["data"]["text"], "hello");
        assert!(v.get("fileName").is_none());
    }

    #[test]
    fn bin_carries_file_name() {
        let p = Payload::Bin {
            file_name: Some("photo.jpg".to_string()),
            data: vec![0xff, 0xd8, 0xff],
        };
        let bytes = p.to_bytes().unwrap();
        let v: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(v["type"], "bin");
        assert_eq!(v["fileName"], "photo.jpg");
        assert_eq!(v["data"]["data"], "/9j/");

        assert_eq!(Payload::from_bytes(&bytes).unwrap(), p);
        assert_eq!(p.file_name(), Some("photo.jpg"));
    }

    #[test]
    fn every_kind_decodes_by_tag() {
        let payloads = [
            Payload::Auth {
                login: "alice".to_string(),
                password: "s3cret".to_string(),
            },
            Payload::Card {
                number: "4111111111111111".to_string(),
                holder: "ALICE".to_string(),
                expiry: "12/30".to_string(),
                cvv: "123".to_string(),
            },
        ];
        for p in payloads {
            let decoded = Payload::from_bytes(&p.to_bytes().unwrap()).unwrap();
            assert_eq!(decoded.kind(), p.kind());
            assert_eq!(decoded, p);
        }
    }

    #[test]
    fn unknown_tag_is_rejected() {
        let raw = br#"{"type":"ssh","data":{}}"#;
        assert!(matches!(
            Payload::from_bytes(raw),
            Err(VaultError::Serialization(_))
        ));
    }

    #[test]
    fn mismatched_data_is_rejected() {
        let raw = br#"{"type":"card","data":{"text":"x"}}"#;
        assert!(Payload::from_bytes(raw).is_err());
    }

    #[test]
    fn seal_and_open() {
        let key = VaultKey::generate().unwrap();
        let p = Payload::Auth {
            login: "bob".to_string(),
            password: "hunter2".to_string(),
        };
        let sealed = p.seal(&key).unwrap();
        assert!(!sealed.windows(7).any(|w| w == b"hunter2"));
        assert_eq!(Payload::open(&sealed, &key).unwrap(), p);
    }
}

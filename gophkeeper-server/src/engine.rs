//! Server side of record and profile reconciliation.
//!
//! Every method expects to run inside one [`Storage::atomically`] call so the
//! read, the decision and the write see the same state.
//!
//! [`Storage::atomically`]: crate::storage::Storage::atomically

use gophkeeper_core::models::timestamp_now;
use gophkeeper_core::sync::{ConflictResolver, Resolution, Snapshot, SyncError};
use gophkeeper_core::{DataItem, ItemSummary, ListQuery, UserProfile};

use crate::error::ServerError;
use crate::storage::{StorageError, Store};

#[derive(Debug, Clone, Default)]
pub struct SyncEngine;

impl SyncEngine {
    /// Reconcile one pushed record and return the authoritative copy.
    pub fn sync_item(
        &self,
        store: &dyn Store,
        user_id: i64,
        incoming: DataItem,
    ) -> Result<DataItem, ServerError> {
        if incoming.meta.key.is_empty() {
            return Err(SyncError::NoKey.into());
        }

        let stored = store.get_data_item(user_id, &incoming.meta.key)?;
        let resolution = ConflictResolver::check(
            &incoming.meta.key,
            Snapshot::from(&incoming.meta),
            stored.as_ref().map(|s| Snapshot::from(&s.meta)),
        )?;

        tracing::debug!(
            user_id,
            key = %incoming.meta.key,
            resolution = resolution.as_str(),
            "sync item"
        );

        match (resolution, stored) {
            (Resolution::Adopt, _) => {
                let mut item = incoming;
                item.meta.created_at.get_or_insert_with(timestamp_now);
                store.save_data_item(user_id, &item)?;
                Ok(item)
            }
            (Resolution::Overwrite, _) => {
                let mut item = incoming;
                item.meta.created_at.get_or_insert_with(timestamp_now);
                store.save_data_item(user_id, &item)?;
                store
                    .get_data_item(user_id, &item.meta.key)?
                    .ok_or_else(|| StorageError::NotFound(format!("record {}", item.meta.key)).into())
            }
            (Resolution::NoOp, _) => Ok(incoming),
            (Resolution::EchoStored, Some(stored)) => Ok(stored),
            (Resolution::EchoStored, None) | (Resolution::IdentityConflict, _) => {
                Err(SyncError::IdentityConflict {
                    key: incoming.meta.key,
                }
                .into())
            }
        }
    }

    /// Reconcile the caller's profile and return the authoritative copy.
    ///
    /// `password_hash` is the already hashed `incoming.password`; it replaces
    /// the stored hash when the push wins. The password is never included in
    /// the result.
    pub fn sync_user(
        &self,
        store: &dyn Store,
        user_id: i64,
        incoming: UserProfile,
        password_hash: Option<String>,
    ) -> Result<UserProfile, ServerError> {
        let user = store
            .get_user_by_id(user_id)?
            .ok_or_else(|| ServerError::NotFound(format!("user {}", user_id)))?;

        if incoming.email.is_empty() {
            return Err(ServerError::Validation("email is required".to_string()));
        }
        if incoming.email != user.email {
            return Err(ServerError::Validation(
                "email does not match the authenticated user".to_string(),
            ));
        }

        let resolution = ConflictResolver::check(
            &user.email,
            Snapshot::from(&incoming),
            Some(Snapshot::new(user.created_at, user.updated_at)),
        )?;

        tracing::debug!(user_id, resolution = resolution.as_str(), "sync user");

        match resolution {
            Resolution::NoOp => Ok(UserProfile {
                password: None,
                ..incoming
            }),
            Resolution::EchoStored => Ok(user.to_profile()),
            Resolution::Adopt | Resolution::Overwrite => {
                let mut next = user;
                if let Some(hash) = password_hash {
                    next.password_hash = hash;
                }
                next.description = incoming.description;
                next.packed_key = incoming.packed_key;
                next.created_at = next
                    .created_at
                    .or(incoming.created_at)
                    .or_else(|| Some(timestamp_now()));
                next.updated_at = incoming.updated_at;
                store.save_user(&next)?;
                Ok(next.to_profile())
            }
            Resolution::IdentityConflict => {
                Err(SyncError::IdentityConflict { key: user.email }.into())
            }
        }
    }

    pub fn list(
        &self,
        store: &dyn Store,
        user_id: i64,
        query: &ListQuery,
    ) -> Result<(Vec<ItemSummary>, u64), ServerError> {
        let items = store.list_data_items(user_id, query)?;
        let total = store.count_data_items(user_id, query)?;
        Ok((items, total))
    }

    /// Delete the caller's account with all tokens and records.
    ///
    /// Deleting an account that is already gone still succeeds.
    pub fn delete_user(&self, store: &dyn Store, user_id: i64) -> Result<bool, ServerError> {
        match store.delete_user(user_id) {
            Ok(()) => tracing::info!(user_id, "user deleted"),
            Err(StorageError::NotFound(_)) => tracing::debug!(user_id, "user already deleted"),
            Err(e) => return Err(e.into()),
        }
        Ok(true)
    }
}

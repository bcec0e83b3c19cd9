//! Client vault: local cache, payload encryption and server sync in one place.

use std::sync::{Mutex, MutexGuard};

use crate::crypto::VaultKey;
use crate::database::{LocalItem, LocalStore};
use crate::models::{timestamp_now, DataItem, ItemMeta, ItemSummary, ListQuery, UserProfile};
use crate::payload::Payload;
use crate::proto::ErrorCode;
use crate::sync::client::SyncClient;
use crate::sync::conflict::{ConflictResolver, Resolution, Snapshot};
use crate::sync::models::SyncReport;
use crate::sync::pending::PendingSet;
use crate::sync::ClientConfig;
use crate::{Result, VaultError};

/// A logged-in vault profile.
pub struct VaultClient {
    store: Mutex<LocalStore>,
    remote: SyncClient,
    key: VaultKey,
    pending: PendingSet,
    profile: Mutex<UserProfile>,
}

impl VaultClient {
    /// Log in (registering on first use) and recover or publish the vault key.
    pub async fn login(config: &ClientConfig, email: &str, password: &str) -> Result<Self> {
        let mut remote = SyncClient::from_config(config)?;
        remote.register(email, password).await?;

        let probe = UserProfile {
            email: email.to_string(),
            ..UserProfile::default()
        };
        let mut profile = remote.sync_user(&probe).await?;

        let key = match &profile.packed_key {
            Some(packed) => VaultKey::unpack(packed, password)?,
            None => {
                let key = VaultKey::generate()?;
                let publish = UserProfile {
                    email: email.to_string(),
                    password: Some(password.to_string()),
                    description: profile.description.clone(),
                    packed_key: Some(key.pack(password)?),
                    created_at: Some(timestamp_now()),
                    updated_at: None,
                };
                profile = match remote.sync_user(&publish).await {
                    Ok(published) => published,
                    // Another device published first; take its key.
                    Err(VaultError::Remote {
                        code: ErrorCode::SyncIdentityConflict,
                        ..
                    }) => remote.sync_user(&probe).await?,
                    Err(e) => return Err(e),
                };
                match &profile.packed_key {
                    Some(packed) => VaultKey::unpack(packed, password)?,
                    None => {
                        return Err(VaultError::InvalidInput(
                            "server did not keep the vault key".to_string(),
                        ))
                    }
                }
            }
        };
        profile.password = None;

        let store = LocalStore::open(config)?;
        let client = Self::from_parts(store, remote, key, profile);
        let queued = client.store()?.pending_keys()?;
        for k in queued {
            if let Some(item) = client.store()?.get_local(&k)? {
                client.pending.insert(&k, item.meta.updated_at);
            }
        }

        tracing::info!(email = %email, pending = client.pending.len(), "vault opened");
        Ok(client)
    }

    fn from_parts(store: LocalStore, remote: SyncClient, key: VaultKey, profile: UserProfile) -> Self {
        Self {
            store: Mutex::new(store),
            remote,
            key,
            pending: PendingSet::new(),
            profile: Mutex::new(profile),
        }
    }

    fn store(&self) -> Result<MutexGuard<'_, LocalStore>> {
        self.store
            .lock()
            .map_err(|_| VaultError::LockPoisoned("local store".to_string()))
    }

    fn profile_guard(&self) -> Result<MutexGuard<'_, UserProfile>> {
        self.profile
            .lock()
            .map_err(|_| VaultError::LockPoisoned("profile".to_string()))
    }

    /// Encrypt and store a record locally; it is queued for sync.
    pub fn save(&self, key: &str, description: Option<&str>, payload: &Payload) -> Result<ItemMeta> {
        let sealed = payload.seal(&self.key)?;
        let meta = ItemMeta {
            key: key.to_string(),
            description: description.map(str::to_string),
            created_at: None,
            updated_at: None,
        };
        let stored = self.store()?.save(&meta, &sealed)?;
        self.pending.insert(key, stored.updated_at);
        Ok(stored)
    }

    /// Decrypt a local record. The payload is `None` for deleted records.
    pub fn view(&self, key: &str) -> Result<(ItemMeta, Option<Payload>)> {
        let item = self.store()?.get(key)?;
        let payload = match &item.blob {
            Some(sealed) => Some(Payload::open(sealed, &self.key)?),
            None => None,
        };
        Ok((item.meta, payload))
    }

    /// Soft-delete a local record; the deletion is queued for sync.
    pub fn delete(&self, key: &str) -> Result<ItemMeta> {
        let meta = self.store()?.delete(key)?;
        self.pending.insert(key, meta.updated_at);
        Ok(meta)
    }

    pub fn list(&self, query: &ListQuery) -> Result<(Vec<ItemSummary>, u64)> {
        self.store()?.list(query)
    }

    pub fn local_item(&self, key: &str) -> Result<Option<LocalItem>> {
        self.store()?.get_local(key)
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    pub fn profile(&self) -> Result<UserProfile> {
        Ok(self.profile_guard()?.clone())
    }

    /// Push one local record and apply the server's answer.
    pub async fn sync_key(&self, key: &str) -> Result<Resolution> {
        let local = self.store()?.get(key)?;

        let response = match self.remote.sync_item(&local).await {
            Ok(r) => r,
            Err(VaultError::SyncConflict { key }) => {
                self.store()?.mark_conflict(&key)?;
                tracing::warn!(key = %key, "record conflicts with the server copy");
                return Err(VaultError::SyncConflict { key });
            }
            Err(e) => return Err(e),
        };

        let resolution = self.apply_remote(&response)?;
        if resolution != Resolution::EchoStored {
            self.pending.confirm(key, local.meta.updated_at);
        }
        Ok(resolution)
    }

    /// Write a server snapshot into the local cache following the LWW rules.
    pub fn apply_remote(&self, remote: &DataItem) -> Result<Resolution> {
        let store = self.store()?;
        let local = store.get_local(remote.key())?;
        let resolution = ConflictResolver::resolve(
            Snapshot::from(&remote.meta),
            local.as_ref().map(|l| Snapshot::from(&l.meta)),
        );

        tracing::debug!(key = %remote.key(), resolution = resolution.as_str(), "applying server copy");

        match resolution {
            Resolution::Adopt | Resolution::Overwrite => {
                store.store_synced(remote, timestamp_now())?;
            }
            Resolution::NoOp => store.mark_synced(remote.key(), timestamp_now())?,
            Resolution::EchoStored => {}
            Resolution::IdentityConflict => {
                store.mark_conflict(remote.key())?;
                return Err(VaultError::SyncConflict {
                    key: remote.key().to_string(),
                });
            }
        }
        Ok(resolution)
    }

    /// Push every queued record. Conflicts are counted, other errors abort.
    pub async fn sync_pending(&self) -> Result<SyncReport> {
        let mut keys = self.pending.keys();
        let stored = self.store()?.pending_keys()?;
        for k in stored {
            if !keys.contains(&k) {
                keys.push(k);
            }
        }

        let mut report = SyncReport::default();
        for key in keys {
            Self::tally(&mut report, self.sync_key(&key).await, true)?;
        }
        Ok(report)
    }

    /// Fetch every remote record that is missing or differs locally.
    pub async fn pull_all(&self) -> Result<SyncReport> {
        let mut report = SyncReport::default();
        let mut offset = 0u32;

        loop {
            let query = ListQuery::new(Some(ListQuery::MAX_LIMIT), Some(offset)).including_deleted();
            let (page, total) = self.remote.list(&query).await?;
            let fetched = page.len() as u32;

            for remote in page {
                let local = self.store()?.get_local(&remote.meta.key)?;
                let differs = match &local {
                    None => true,
                    Some(l) => {
                        l.meta.created_at != remote.meta.created_at
                            || l.meta.updated_at != remote.meta.updated_at
                            || l.deleted != remote.deleted
                    }
                };
                if !differs {
                    report.unchanged += 1;
                    continue;
                }

                let pushed = local.is_some();
                let outcome = if pushed {
                    self.sync_key(&remote.meta.key).await
                } else {
                    self.fetch(&remote.meta.key).await
                };
                Self::tally(&mut report, outcome, pushed)?;
            }

            offset += fetched;
            if fetched == 0 || u64::from(offset) >= total {
                break;
            }
        }
        Ok(report)
    }

    /// Ask the server for a record we have never seen.
    async fn fetch(&self, key: &str) -> Result<Resolution> {
        let probe = DataItem::new(ItemMeta::new(key), None);
        let response = self.remote.sync_item(&probe).await?;
        self.apply_remote(&response)
    }

    fn tally(report: &mut SyncReport, outcome: Result<Resolution>, push: bool) -> Result<()> {
        match outcome {
            // After a push, a local no-op means the server now holds our copy.
            Ok(Resolution::NoOp) if push => report.pushed += 1,
            Ok(Resolution::NoOp) => report.unchanged += 1,
            Ok(Resolution::Adopt | Resolution::Overwrite) => report.pulled += 1,
            Ok(Resolution::EchoStored) => report.rejected += 1,
            Ok(Resolution::IdentityConflict) | Err(VaultError::SyncConflict { .. }) => {
                report.conflicts += 1
            }
            Err(e) => return Err(e),
        }
        Ok(())
    }

    /// Update the profile description on the server.
    pub async fn update_description(&self, description: Option<&str>) -> Result<UserProfile> {
        let mut next = self.profile()?;
        next.description = description.map(str::to_string);
        next.updated_at = Some(timestamp_now());
        self.push_profile(next).await
    }

    /// Change the account password and re-wrap the vault key with it.
    pub async fn change_password(&self, new_password: &str) -> Result<UserProfile> {
        let mut next = self.profile()?;
        next.password = Some(new_password.to_string());
        next.packed_key = Some(self.key.pack(new_password)?);
        next.updated_at = Some(timestamp_now());
        self.push_profile(next).await
    }

    async fn push_profile(&self, next: UserProfile) -> Result<UserProfile> {
        let mut confirmed = self.remote.sync_user(&next).await?;
        confirmed.password = None;
        *self.profile_guard()? = confirmed.clone();
        Ok(confirmed)
    }

    /// Delete the account on the server, including every record.
    pub async fn delete_account(&self) -> Result<bool> {
        let ok = self.remote.delete_user().await?;
        tracing::info!("account deleted");
        Ok(ok)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sync::SyncState;
    use chrono::{DateTime, TimeZone, Utc};
    use std::time::Duration;

    fn t(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    fn offline_client(dir: &tempfile::TempDir) -> VaultClient {
        let store = LocalStore::in_memory(&dir.path().join("blobs"), 1024).unwrap();
        // Nothing listens here; these tests never reach the network.
        let remote = SyncClient::new("http://127.0.0.1:9", Duration::from_secs(1)).unwrap();
        VaultClient::from_parts(
            store,
            remote,
            VaultKey::generate().unwrap(),
            UserProfile::default(),
        )
    }

    fn remote_item(key: &str, c: i64, u: Option<i64>, blob: &[u8]) -> DataItem {
        let mut meta = ItemMeta::new(key).with_created_at(t(c));
        meta.updated_at = u.map(t);
        DataItem::new(meta, Some(blob.to_vec()))
    }

    #[test]
    fn save_view_delete_locally() {
        let dir = tempfile::tempdir().unwrap();
        let client = offline_client(&dir);

        let payload = Payload::Text {
            text: "remember the milk".to_string(),
        };
        client.save("note", Some("groceries"), &payload).unwrap();
        assert_eq!(client.pending_count(), 1);

        let (meta, viewed) = client.view("note").unwrap();
        assert_eq!(meta.description.as_deref(), Some("groceries"));
        assert_eq!(viewed, Some(payload));

        client.delete("note").unwrap();
        let (_, viewed) = client.view("note").unwrap();
        assert_eq!(viewed, None);
        assert_eq!(client.pending_count(), 1);
    }

    #[test]
    fn apply_remote_adopts_unknown_record() {
        let dir = tempfile::tempdir().unwrap();
        let client = offline_client(&dir);

        let item = remote_item("k1", 0, None, b"sealed");
        assert_eq!(client.apply_remote(&item).unwrap(), Resolution::Adopt);

        let local = client.local_item("k1").unwrap().unwrap();
        assert_eq!(local.sync_state, SyncState::Synced);
        assert_eq!(local.meta.created_at, Some(t(0)));
    }

    #[test]
    fn apply_remote_overwrites_older_local() {
        let dir = tempfile::tempdir().unwrap();
        let client = offline_client(&dir);

        client
            .apply_remote(&remote_item("k1", 0, None, b"old"))
            .unwrap();
        assert_eq!(
            client
                .apply_remote(&remote_item("k1", 0, Some(2), b"new"))
                .unwrap(),
            Resolution::Overwrite
        );
        assert_eq!(
            client.store().unwrap().get("k1").unwrap().blob,
            Some(b"new".to_vec())
        );
    }

    #[test]
    fn apply_remote_keeps_newer_local_pending() {
        let dir = tempfile::tempdir().unwrap();
        let client = offline_client(&dir);

        client
            .apply_remote(&remote_item("k1", 0, None, b"base"))
            .unwrap();
        client
            .store()
            .unwrap()
            .save(&ItemMeta::new("k1").with_updated_at(t(9)), b"local edit")
            .unwrap();

        assert_eq!(
            client
                .apply_remote(&remote_item("k1", 0, Some(3), b"server"))
                .unwrap(),
            Resolution::EchoStored
        );
        let local = client.local_item("k1").unwrap().unwrap();
        assert_eq!(local.sync_state, SyncState::Pending);
        assert_eq!(local.meta.updated_at, Some(t(9)));
    }

    #[test]
    fn apply_remote_marks_identity_conflict() {
        let dir = tempfile::tempdir().unwrap();
        let client = offline_client(&dir);

        client
            .apply_remote(&remote_item("k1", 0, None, b"mine"))
            .unwrap();
        let err = client
            .apply_remote(&remote_item("k1", 5, None, b"theirs"))
            .unwrap_err();
        assert!(matches!(err, VaultError::SyncConflict { ref key } if key == "k1"));
        assert_eq!(
            client.local_item("k1").unwrap().unwrap().sync_state,
            SyncState::Conflict
        );
    }

    #[test]
    fn apply_remote_noop_marks_synced() {
        let dir = tempfile::tempdir().unwrap();
        let client = offline_client(&dir);

        client
            .store()
            .unwrap()
            .save(&ItemMeta::new("k1").with_created_at(t(0)), b"same")
            .unwrap();
        assert_eq!(
            client
                .apply_remote(&remote_item("k1", 0, None, b"same"))
                .unwrap(),
            Resolution::NoOp
        );
        assert_eq!(
            client.local_item("k1").unwrap().unwrap().sync_state,
            SyncState::Synced
        );
    }

    #[test]
    fn tally_counts_by_direction() {
        let mut report = SyncReport::default();
        VaultClient::tally(&mut report, Ok(Resolution::NoOp), true).unwrap();
        VaultClient::tally(&mut report, Ok(Resolution::NoOp), false).unwrap();
        VaultClient::tally(&mut report, Ok(Resolution::Overwrite), true).unwrap();
        VaultClient::tally(&mut report, Ok(Resolution::EchoStored), true).unwrap();
        VaultClient::tally(
            &mut report,
            Err(VaultError::SyncConflict { key: "k".into() }),
            true,
        )
        .unwrap();
        assert!(VaultClient::tally(&mut report, Err(VaultError::NotFound("k".into())), true).is_err());

        assert_eq!(
            report,
            SyncReport {
                pushed: 1,
                pulled: 1,
                unchanged: 1,
                rejected: 1,
                conflicts: 1,
            }
        );
    }
}

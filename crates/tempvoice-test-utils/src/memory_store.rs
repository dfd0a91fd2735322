//! In-memory stores standing in for Postgres.
//!
//! Same contracts as the `Pg*` implementations: `get_or_create` is atomic
//! per key, `update` reports a missing row as `Ok(None)`, access-list
//! listings are ordered by member id.

use async_trait::async_trait;
use chrono::Utc;
use common::types::{CommunityId, MemberId, OwnerKey, ResourceId};
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use tempvoice_service::errors::TempVoiceError;
use tempvoice_service::models::{
    AccessControlEntry, CommunityTriggerConfig, SessionDefaults, SessionPatch, TempVoiceSession,
};
use tempvoice_service::repositories::{AccessControlStore, SessionStore, TriggerConfigSource};

/// Session rows keyed by owner.
#[derive(Debug, Default)]
pub struct InMemorySessionStore {
    rows: Mutex<BTreeMap<OwnerKey, TempVoiceSession>>,
    failing_updates: AtomicUsize,
    live_update_delay: Mutex<Option<Duration>>,
}

impl InMemorySessionStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a row, replacing any existing one.
    pub fn insert(&self, session: TempVoiceSession) {
        self.rows.lock().unwrap().insert(session.key(), session);
    }

    /// Make the next `n` updates fail with a database error.
    pub fn fail_next_updates(&self, n: usize) {
        self.failing_updates.store(n, Ordering::SeqCst);
    }

    /// Hold every update that records a live room for `delay` before it
    /// applies.
    pub fn delay_live_updates(&self, delay: Duration) {
        *self.live_update_delay.lock().unwrap() = Some(delay);
    }

    #[must_use]
    pub fn row(&self, key: OwnerKey) -> Option<TempVoiceSession> {
        self.rows.lock().unwrap().get(&key).cloned()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.lock().unwrap().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A fresh row for `key` built from `defaults`.
#[must_use]
pub fn new_session(key: OwnerKey, defaults: &SessionDefaults) -> TempVoiceSession {
    let now = Utc::now();
    TempVoiceSession {
        community_id: key.community_id,
        owner_id: key.owner_id,
        live_resource_id: None,
        control_surface_id: None,
        room_name: defaults.room_name.clone(),
        soundboard_enabled: defaults.soundboard_enabled,
        streams_enabled: defaults.streams_enabled,
        activities_enabled: defaults.activities_enabled,
        is_private: defaults.is_private,
        retained_message_count: defaults.retained_message_count,
        created_at: now,
        updated_at: now,
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn get_or_create(
        &self,
        key: OwnerKey,
        defaults: &SessionDefaults,
    ) -> Result<(TempVoiceSession, bool), TempVoiceError> {
        let mut rows = self.rows.lock().unwrap();
        if let Some(existing) = rows.get(&key) {
            return Ok((existing.clone(), false));
        }
        let session = new_session(key, defaults);
        rows.insert(key, session.clone());
        Ok((session, true))
    }

    async fn get(&self, key: OwnerKey) -> Result<Option<TempVoiceSession>, TempVoiceError> {
        Ok(self.row(key))
    }

    async fn update(
        &self,
        key: OwnerKey,
        patch: &SessionPatch,
    ) -> Result<Option<TempVoiceSession>, TempVoiceError> {
        let failing = self
            .failing_updates
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
        if failing.is_ok() {
            return Err(TempVoiceError::Database("injected update failure".to_string()));
        }

        let delay = *self.live_update_delay.lock().unwrap();
        if let (Some(delay), Some(Some(_))) = (delay, patch.live_resource_id) {
            tokio::time::sleep(delay).await;
        }

        let mut rows = self.rows.lock().unwrap();
        Ok(rows.get_mut(&key).map(|session| {
            patch.apply_to(session);
            session.updated_at = Utc::now();
            session.clone()
        }))
    }

    async fn get_by_live_resource(
        &self,
        resource_id: ResourceId,
    ) -> Result<Option<TempVoiceSession>, TempVoiceError> {
        Ok(self
            .rows
            .lock()
            .unwrap()
            .values()
            .find(|s| s.live_resource_id == Some(resource_id))
            .cloned())
    }

    async fn delete(&self, key: OwnerKey) -> Result<bool, TempVoiceError> {
        Ok(self.rows.lock().unwrap().remove(&key).is_some())
    }
}

/// Access-list entries keyed by owner, then member.
#[derive(Debug, Default)]
pub struct InMemoryAccessControlStore {
    entries: Mutex<HashMap<OwnerKey, BTreeMap<MemberId, bool>>>,
}

impl InMemoryAccessControlStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// `has_access` per listed member of `key`.
    #[must_use]
    pub fn entries(&self, key: OwnerKey) -> BTreeMap<MemberId, bool> {
        self.entries
            .lock()
            .unwrap()
            .get(&key)
            .cloned()
            .unwrap_or_default()
    }
}

fn entry(key: OwnerKey, member_id: MemberId, has_access: bool) -> AccessControlEntry {
    AccessControlEntry {
        community_id: key.community_id,
        owner_id: key.owner_id,
        member_id,
        has_access,
    }
}

#[async_trait]
impl AccessControlStore for InMemoryAccessControlStore {
    async fn list_for_owner(
        &self,
        key: OwnerKey,
    ) -> Result<Vec<AccessControlEntry>, TempVoiceError> {
        Ok(self
            .entries(key)
            .into_iter()
            .map(|(member_id, has_access)| entry(key, member_id, has_access))
            .collect())
    }

    async fn upsert(
        &self,
        key: OwnerKey,
        member_id: MemberId,
        has_access: bool,
    ) -> Result<AccessControlEntry, TempVoiceError> {
        self.entries
            .lock()
            .unwrap()
            .entry(key)
            .or_default()
            .insert(member_id, has_access);
        Ok(entry(key, member_id, has_access))
    }

    async fn remove(&self, key: OwnerKey, member_id: MemberId) -> Result<bool, TempVoiceError> {
        let mut entries = self.entries.lock().unwrap();
        let removed = entries
            .get_mut(&key)
            .is_some_and(|members| members.remove(&member_id).is_some());
        if entries.get(&key).is_some_and(BTreeMap::is_empty) {
            entries.remove(&key);
        }
        Ok(removed)
    }

    async fn remove_all_for_owner(&self, key: OwnerKey) -> Result<u64, TempVoiceError> {
        let removed = self.entries.lock().unwrap().remove(&key);
        Ok(removed.map_or(0, |members| members.len() as u64))
    }
}

/// Fixed trigger configuration per community.
#[derive(Debug, Default)]
pub struct StaticTriggerConfig {
    configs: Mutex<HashMap<CommunityId, CommunityTriggerConfig>>,
}

impl StaticTriggerConfig {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder form of [`set`](Self::set).
    #[must_use]
    pub fn with_trigger(
        self,
        community_id: CommunityId,
        trigger_resource_id: ResourceId,
        parent_id: Option<ResourceId>,
    ) -> Self {
        self.set(CommunityTriggerConfig {
            community_id,
            trigger_resource_id: Some(trigger_resource_id),
            parent_id,
        });
        self
    }

    pub fn set(&self, config: CommunityTriggerConfig) {
        self.configs
            .lock()
            .unwrap()
            .insert(config.community_id, config);
    }
}

#[async_trait]
impl TriggerConfigSource for StaticTriggerConfig {
    async fn trigger_config(
        &self,
        community_id: CommunityId,
    ) -> Result<Option<CommunityTriggerConfig>, TempVoiceError> {
        Ok(self.configs.lock().unwrap().get(&community_id).copied())
    }
}

//! Repository layer for Temp Voice.
//!
//! The engine depends on the store traits only; the Postgres implementations
//! live next to them and in-memory ones live in `tempvoice-test-utils`. All
//! queries use parameterized statements.

pub mod access_list;
pub mod pool;
pub mod sessions;
pub mod trigger_config;

use crate::errors::TempVoiceError;
use crate::models::{
    AccessControlEntry, CommunityTriggerConfig, SessionDefaults, SessionPatch, TempVoiceSession,
};
use async_trait::async_trait;
use common::types::{CommunityId, MemberId, OwnerKey, ResourceId};

pub use access_list::{set_member_access, PgAccessControlStore};
pub use pool::connect;
pub use sessions::PgSessionStore;
pub use trigger_config::PgTriggerConfigSource;

/// One session row per (community, owner).
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Fetch the owner's session, creating it from `defaults` if missing.
    ///
    /// Atomic: concurrent calls for one key create exactly one row. The flag
    /// is `true` only for the call that created it.
    async fn get_or_create(
        &self,
        key: OwnerKey,
        defaults: &SessionDefaults,
    ) -> Result<(TempVoiceSession, bool), TempVoiceError>;

    async fn get(&self, key: OwnerKey) -> Result<Option<TempVoiceSession>, TempVoiceError>;

    /// Apply `patch`. `Ok(None)` when no row matched.
    async fn update(
        &self,
        key: OwnerKey,
        patch: &SessionPatch,
    ) -> Result<Option<TempVoiceSession>, TempVoiceError>;

    async fn get_by_live_resource(
        &self,
        resource_id: ResourceId,
    ) -> Result<Option<TempVoiceSession>, TempVoiceError>;

    /// Delete the row. Returns whether a row existed.
    async fn delete(&self, key: OwnerKey) -> Result<bool, TempVoiceError>;
}

/// Per-member allow/deny exceptions scoped to one owner.
#[async_trait]
pub trait AccessControlStore: Send + Sync {
    /// Entries ordered by member id.
    async fn list_for_owner(
        &self,
        key: OwnerKey,
    ) -> Result<Vec<AccessControlEntry>, TempVoiceError>;

    async fn upsert(
        &self,
        key: OwnerKey,
        member_id: MemberId,
        has_access: bool,
    ) -> Result<AccessControlEntry, TempVoiceError>;

    /// Returns whether an entry existed.
    async fn remove(&self, key: OwnerKey, member_id: MemberId) -> Result<bool, TempVoiceError>;

    /// Bulk delete for session destruction. Returns the number removed.
    async fn remove_all_for_owner(&self, key: OwnerKey) -> Result<u64, TempVoiceError>;
}

/// Read-only view of the configuration subsystem's trigger settings.
#[async_trait]
pub trait TriggerConfigSource: Send + Sync {
    async fn trigger_config(
        &self,
        community_id: CommunityId,
    ) -> Result<Option<CommunityTriggerConfig>, TempVoiceError>;
}

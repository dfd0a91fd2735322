//! Access-list repository (Postgres) and the minimal-list write rule.

use super::AccessControlStore;
use crate::errors::TempVoiceError;
use crate::models::AccessControlEntry;
use crate::observability::metrics;
use async_trait::async_trait;
use common::types::{CommunityId, MemberId, OwnerKey};
use sqlx::{PgPool, Row};
use std::time::Instant;
use tracing::instrument;

/// Postgres-backed [`AccessControlStore`].
#[derive(Debug, Clone)]
pub struct PgAccessControlStore {
    pool: PgPool,
}

impl PgAccessControlStore {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

/// Record `member`'s access for `key`'s room in the given mode.
///
/// An entry that matches the mode's default says nothing, so instead of
/// storing it the existing entry (if any) is removed. Returns the entry that
/// is now stored, or `None` when the member is back to the default.
pub async fn set_member_access(
    store: &dyn AccessControlStore,
    key: OwnerKey,
    member_id: MemberId,
    has_access: bool,
    is_private: bool,
) -> Result<Option<AccessControlEntry>, TempVoiceError> {
    let candidate = AccessControlEntry {
        community_id: key.community_id,
        owner_id: key.owner_id,
        member_id,
        has_access,
    };

    if candidate.is_redundant(is_private) {
        store.remove(key, member_id).await?;
        Ok(None)
    } else {
        store.upsert(key, member_id, has_access).await.map(Some)
    }
}

#[async_trait]
impl AccessControlStore for PgAccessControlStore {
    #[instrument(skip_all, name = "tv.repo.acl.list", fields(key = %key))]
    async fn list_for_owner(
        &self,
        key: OwnerKey,
    ) -> Result<Vec<AccessControlEntry>, TempVoiceError> {
        let start = Instant::now();

        let rows = sqlx::query(
            r#"
            SELECT community_id, owner_id, member_id, has_access
            FROM tempvoice_access_entries
            WHERE community_id = $1 AND owner_id = $2
            ORDER BY member_id
            "#,
        )
        .bind(key.community_id.to_db())
        .bind(key.owner_id.to_db())
        .fetch_all(&self.pool)
        .await;

        let status = if rows.is_ok() { "success" } else { "error" };
        metrics::record_db_query("acl_list", status, start.elapsed());

        rows?.iter().map(map_row_to_entry).collect()
    }

    #[instrument(skip_all, name = "tv.repo.acl.upsert", fields(key = %key, member_id = %member_id))]
    async fn upsert(
        &self,
        key: OwnerKey,
        member_id: MemberId,
        has_access: bool,
    ) -> Result<AccessControlEntry, TempVoiceError> {
        let start = Instant::now();

        let row = sqlx::query(
            r#"
            INSERT INTO tempvoice_access_entries (community_id, owner_id, member_id, has_access)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (community_id, owner_id, member_id) DO UPDATE SET
                has_access = EXCLUDED.has_access
            RETURNING community_id, owner_id, member_id, has_access
            "#,
        )
        .bind(key.community_id.to_db())
        .bind(key.owner_id.to_db())
        .bind(member_id.to_db())
        .bind(has_access)
        .fetch_one(&self.pool)
        .await;

        let status = if row.is_ok() { "success" } else { "error" };
        metrics::record_db_query("acl_upsert", status, start.elapsed());

        map_row_to_entry(&row?)
    }

    #[instrument(skip_all, name = "tv.repo.acl.remove", fields(key = %key, member_id = %member_id))]
    async fn remove(&self, key: OwnerKey, member_id: MemberId) -> Result<bool, TempVoiceError> {
        let start = Instant::now();

        let result = sqlx::query(
            r#"
            DELETE FROM tempvoice_access_entries
            WHERE community_id = $1 AND owner_id = $2 AND member_id = $3
            "#,
        )
        .bind(key.community_id.to_db())
        .bind(key.owner_id.to_db())
        .bind(member_id.to_db())
        .execute(&self.pool)
        .await;

        let status = if result.is_ok() { "success" } else { "error" };
        metrics::record_db_query("acl_remove", status, start.elapsed());

        Ok(result?.rows_affected() > 0)
    }

    #[instrument(skip_all, name = "tv.repo.acl.remove_all", fields(key = %key))]
    async fn remove_all_for_owner(&self, key: OwnerKey) -> Result<u64, TempVoiceError> {
        let start = Instant::now();

        let result = sqlx::query(
            r#"
            DELETE FROM tempvoice_access_entries
            WHERE community_id = $1 AND owner_id = $2
            "#,
        )
        .bind(key.community_id.to_db())
        .bind(key.owner_id.to_db())
        .execute(&self.pool)
        .await;

        let status = if result.is_ok() { "success" } else { "error" };
        metrics::record_db_query("acl_remove_all", status, start.elapsed());

        Ok(result?.rows_affected())
    }
}

fn map_row_to_entry(row: &sqlx::postgres::PgRow) -> Result<AccessControlEntry, TempVoiceError> {
    Ok(AccessControlEntry {
        community_id: CommunityId::from_db(row.try_get("community_id")?)?,
        owner_id: MemberId::from_db(row.try_get("owner_id")?)?,
        member_id: MemberId::from_db(row.try_get("member_id")?)?,
        has_access: row.try_get("has_access")?,
    })
}

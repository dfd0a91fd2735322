//! Sessions repository (Postgres).
//!
//! # Atomicity
//!
//! `get_or_create` is a single `INSERT .. ON CONFLICT DO NOTHING RETURNING`
//! followed by a plain `SELECT` for the losing side, so two concurrent
//! callers can never both insert. Updates are single statements; a patch
//! that matches no row returns `None`.

use super::SessionStore;
use crate::errors::TempVoiceError;
use crate::models::{SessionDefaults, SessionPatch, TempVoiceSession};
use crate::observability::metrics;
use async_trait::async_trait;
use common::types::{CommunityId, MemberId, OwnerKey, ResourceId, SurfaceId};
use sqlx::{PgPool, Row};
use std::time::Instant;
use tracing::instrument;

const SESSION_COLUMNS: &str = "community_id, owner_id, live_resource_id, control_surface_id, \
     room_name, soundboard_enabled, streams_enabled, activities_enabled, is_private, \
     retained_message_count, created_at, updated_at";

/// Postgres-backed [`SessionStore`].
#[derive(Debug, Clone)]
pub struct PgSessionStore {
    pool: PgPool,
}

impl PgSessionStore {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn finish<T>(
    operation: &'static str,
    start: Instant,
    result: Result<T, sqlx::Error>,
) -> Result<T, TempVoiceError> {
    let status = if result.is_ok() { "success" } else { "error" };
    metrics::record_db_query(operation, status, start.elapsed());
    result.map_err(TempVoiceError::from)
}

#[async_trait]
impl SessionStore for PgSessionStore {
    #[instrument(skip_all, name = "tv.repo.sessions.get_or_create", fields(key = %key))]
    async fn get_or_create(
        &self,
        key: OwnerKey,
        defaults: &SessionDefaults,
    ) -> Result<(TempVoiceSession, bool), TempVoiceError> {
        let start = Instant::now();
        let retained = i32::try_from(defaults.retained_message_count)
            .map_err(|_| TempVoiceError::InvalidInput("retained message count too large".into()))?;

        let inserted = sqlx::query(&format!(
            r#"
            INSERT INTO tempvoice_sessions (
                community_id, owner_id, room_name, soundboard_enabled,
                streams_enabled, activities_enabled, is_private, retained_message_count
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ON CONFLICT (community_id, owner_id) DO NOTHING
            RETURNING {SESSION_COLUMNS}
            "#
        ))
        .bind(key.community_id.to_db())
        .bind(key.owner_id.to_db())
        .bind(&defaults.room_name)
        .bind(defaults.soundboard_enabled)
        .bind(defaults.streams_enabled)
        .bind(defaults.activities_enabled)
        .bind(defaults.is_private)
        .bind(retained)
        .fetch_optional(&self.pool)
        .await;
        let inserted = finish("session_insert", start, inserted)?;

        if let Some(row) = inserted {
            tracing::info!(
                target: "tv.repo.sessions",
                community_id = %key.community_id,
                owner_id = %key.owner_id,
                "Session created"
            );
            return Ok((map_row_to_session(&row)?, true));
        }

        // Lost the insert race (or the row already existed): read the winner.
        match self.get(key).await? {
            Some(session) => Ok((session, false)),
            None => Err(TempVoiceError::PersistenceConflict(format!(
                "session {key} vanished during get_or_create"
            ))),
        }
    }

    #[instrument(skip_all, name = "tv.repo.sessions.get", fields(key = %key))]
    async fn get(&self, key: OwnerKey) -> Result<Option<TempVoiceSession>, TempVoiceError> {
        let start = Instant::now();

        let row = sqlx::query(&format!(
            r#"
            SELECT {SESSION_COLUMNS}
            FROM tempvoice_sessions
            WHERE community_id = $1 AND owner_id = $2
            "#
        ))
        .bind(key.community_id.to_db())
        .bind(key.owner_id.to_db())
        .fetch_optional(&self.pool)
        .await;
        let row = finish("session_get", start, row)?;

        row.as_ref().map(map_row_to_session).transpose()
    }

    #[instrument(skip_all, name = "tv.repo.sessions.update", fields(key = %key))]
    async fn update(
        &self,
        key: OwnerKey,
        patch: &SessionPatch,
    ) -> Result<Option<TempVoiceSession>, TempVoiceError> {
        let start = Instant::now();
        let retained = patch
            .retained_message_count
            .map(i32::try_from)
            .transpose()
            .map_err(|_| TempVoiceError::InvalidInput("retained message count too large".into()))?;

        let row = sqlx::query(&format!(
            r#"
            UPDATE tempvoice_sessions SET
                live_resource_id = CASE WHEN $3 THEN $4 ELSE live_resource_id END,
                control_surface_id = CASE WHEN $5 THEN $6 ELSE control_surface_id END,
                room_name = COALESCE($7, room_name),
                soundboard_enabled = COALESCE($8, soundboard_enabled),
                streams_enabled = COALESCE($9, streams_enabled),
                activities_enabled = COALESCE($10, activities_enabled),
                is_private = COALESCE($11, is_private),
                retained_message_count = COALESCE($12, retained_message_count),
                updated_at = NOW()
            WHERE community_id = $1 AND owner_id = $2
            RETURNING {SESSION_COLUMNS}
            "#
        ))
        .bind(key.community_id.to_db()) // $1
        .bind(key.owner_id.to_db()) // $2
        .bind(patch.live_resource_id.is_some()) // $3
        .bind(patch.live_resource_id.flatten().map(ResourceId::to_db)) // $4
        .bind(patch.control_surface_id.is_some()) // $5
        .bind(patch.control_surface_id.flatten().map(SurfaceId::to_db)) // $6
        .bind(patch.room_name.as_deref()) // $7
        .bind(patch.soundboard_enabled) // $8
        .bind(patch.streams_enabled) // $9
        .bind(patch.activities_enabled) // $10
        .bind(patch.is_private) // $11
        .bind(retained) // $12
        .fetch_optional(&self.pool)
        .await;
        let row = finish("session_update", start, row)?;

        row.as_ref().map(map_row_to_session).transpose()
    }

    #[instrument(skip_all, name = "tv.repo.sessions.get_by_live_resource", fields(resource_id = %resource_id))]
    async fn get_by_live_resource(
        &self,
        resource_id: ResourceId,
    ) -> Result<Option<TempVoiceSession>, TempVoiceError> {
        let start = Instant::now();

        let row = sqlx::query(&format!(
            r#"
            SELECT {SESSION_COLUMNS}
            FROM tempvoice_sessions
            WHERE live_resource_id = $1
            "#
        ))
        .bind(resource_id.to_db())
        .fetch_optional(&self.pool)
        .await;
        let row = finish("session_get_by_live_resource", start, row)?;

        row.as_ref().map(map_row_to_session).transpose()
    }

    #[instrument(skip_all, name = "tv.repo.sessions.delete", fields(key = %key))]
    async fn delete(&self, key: OwnerKey) -> Result<bool, TempVoiceError> {
        let start = Instant::now();

        let result = sqlx::query(
            r#"
            DELETE FROM tempvoice_sessions
            WHERE community_id = $1 AND owner_id = $2
            "#,
        )
        .bind(key.community_id.to_db())
        .bind(key.owner_id.to_db())
        .execute(&self.pool)
        .await;
        let result = finish("session_delete", start, result)?;

        Ok(result.rows_affected() > 0)
    }
}

/// Map a database row to a [`TempVoiceSession`].
pub fn map_row_to_session(row: &sqlx::postgres::PgRow) -> Result<TempVoiceSession, TempVoiceError> {
    let retained: i32 = row.try_get("retained_message_count")?;

    Ok(TempVoiceSession {
        community_id: CommunityId::from_db(row.try_get("community_id")?)?,
        owner_id: MemberId::from_db(row.try_get("owner_id")?)?,
        live_resource_id: row
            .try_get::<Option<i64>, _>("live_resource_id")?
            .map(ResourceId::from_db)
            .transpose()?,
        control_surface_id: row
            .try_get::<Option<i64>, _>("control_surface_id")?
            .map(SurfaceId::from_db)
            .transpose()?,
        room_name: row.try_get("room_name")?,
        soundboard_enabled: row.try_get("soundboard_enabled")?,
        streams_enabled: row.try_get("streams_enabled")?,
        activities_enabled: row.try_get("activities_enabled")?,
        is_private: row.try_get("is_private")?,
        retained_message_count: u32::try_from(retained)
            .map_err(|_| TempVoiceError::Database(format!("negative retained count {retained}")))?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

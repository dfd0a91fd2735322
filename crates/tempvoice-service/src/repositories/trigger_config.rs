//! Trigger-room settings, read from the configuration subsystem's table.

use super::TriggerConfigSource;
use crate::errors::TempVoiceError;
use crate::models::CommunityTriggerConfig;
use crate::observability::metrics;
use async_trait::async_trait;
use common::types::{CommunityId, ResourceId};
use sqlx::{PgPool, Row};
use std::time::Instant;
use tracing::instrument;

/// Postgres-backed [`TriggerConfigSource`].
#[derive(Debug, Clone)]
pub struct PgTriggerConfigSource {
    pool: PgPool,
}

impl PgTriggerConfigSource {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl TriggerConfigSource for PgTriggerConfigSource {
    #[instrument(skip_all, name = "tv.repo.trigger_config", fields(community_id = %community_id))]
    async fn trigger_config(
        &self,
        community_id: CommunityId,
    ) -> Result<Option<CommunityTriggerConfig>, TempVoiceError> {
        let start = Instant::now();

        let row = sqlx::query(
            r#"
            SELECT temp_voice_trigger_id, temp_voice_parent_id
            FROM community_configs
            WHERE community_id = $1
            "#,
        )
        .bind(community_id.to_db())
        .fetch_optional(&self.pool)
        .await;

        let status = if row.is_ok() { "success" } else { "error" };
        metrics::record_db_query("trigger_config_get", status, start.elapsed());

        let Some(row) = row? else {
            return Ok(None);
        };

        Ok(Some(CommunityTriggerConfig {
            community_id,
            trigger_resource_id: row
                .try_get::<Option<i64>, _>("temp_voice_trigger_id")?
                .map(ResourceId::from_db)
                .transpose()?,
            parent_id: row
                .try_get::<Option<i64>, _>("temp_voice_parent_id")?
                .map(ResourceId::from_db)
                .transpose()?,
        }))
    }
}

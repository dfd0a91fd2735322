//! Deprovisioning: empty room -> torn down, session kept as a template.
//!
//! Resolves the room's owner (including a room whose provisioning is still
//! in flight), waits for the owner's claim so that provisioning finishes
//! first, then re-checks that the session still names the room. Re-delivered notifications after the row was cleared are no-ops.

use super::delete_room;
use crate::context::EngineContext;
use crate::errors::TempVoiceError;
use crate::models::{SessionPatch, TempVoiceSession};
use crate::permissions::Subject;
use crate::provider::ProviderError;
use common::types::{OwnerKey, ResourceId};
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

/// How long teardown waits for a room's panel task to stop.
const PANEL_STOP_TIMEOUT: Duration = Duration::from_secs(5);

/// How a teardown request ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TeardownOutcome {
    /// The room was deleted and the session cleared.
    TornDown,
    /// No session names this room.
    NotTracked,
    /// The session moved on to another room (or none) while we waited.
    Stale,
}

/// Tear down `resource_id`, which just became empty.
#[instrument(skip_all, name = "tv.deprovisioning", fields(resource_id = %resource_id))]
pub async fn deprovision(
    engine: &EngineContext,
    resource_id: ResourceId,
) -> Result<TeardownOutcome, TempVoiceError> {
    let Some(key) = resolve_owner(engine, resource_id).await? else {
        return Ok(TeardownOutcome::NotTracked);
    };

    let _claim = engine.claims.claim(key).await;

    let current = engine.sessions.get(key).await?;
    let Some(session) = current.filter(|s| s.live_resource_id == Some(resource_id)) else {
        debug!(
            target: "tv.deprovisioning",
            resource_id = %resource_id,
            "Session no longer names this room"
        );
        return Ok(TeardownOutcome::Stale);
    };

    teardown(engine, &session, resource_id).await?;
    Ok(TeardownOutcome::TornDown)
}

/// Owner of `resource_id`. Rooms still being provisioned are only known in
/// memory; rooms from before a restart only in the session store.
async fn resolve_owner(
    engine: &EngineContext,
    resource_id: ResourceId,
) -> Result<Option<OwnerKey>, TempVoiceError> {
    if let Some(key) = engine.rooms.owner_of(resource_id) {
        return Ok(Some(key));
    }
    Ok(engine
        .sessions
        .get_by_live_resource(resource_id)
        .await?
        .map(|session| session.key()))
}

/// Destroy everything kept for an owner who left the community: their live
/// room if any, their access list and their session row.
#[instrument(skip_all, name = "tv.deprovisioning.destroy", fields(key = %key))]
pub async fn destroy_session(engine: &EngineContext, key: OwnerKey) -> Result<bool, TempVoiceError> {
    let _claim = engine.claims.claim(key).await;

    let Some(session) = engine.sessions.get(key).await? else {
        return Ok(false);
    };
    if let Some(resource_id) = session.live_resource_id {
        teardown(engine, &session, resource_id).await?;
    }

    let removed_entries = engine.access.remove_all_for_owner(key).await?;
    let deleted = engine.sessions.delete(key).await?;

    info!(
        target: "tv.deprovisioning",
        community_id = %key.community_id,
        owner_id = %key.owner_id,
        removed_entries,
        "Session destroyed"
    );
    Ok(deleted)
}

/// Caller holds the owner's claim.
async fn teardown(
    engine: &EngineContext,
    session: &TempVoiceSession,
    resource_id: ResourceId,
) -> Result<(), TempVoiceError> {
    let key = session.key();

    if let Some(room) = engine.rooms.remove(resource_id) {
        room.cancel.cancel();
        if let Some(task) = room.task {
            match tokio::time::timeout(PANEL_STOP_TIMEOUT, task).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => warn!(
                    target: "tv.deprovisioning",
                    resource_id = %resource_id,
                    error = ?e,
                    "Panel task panicked"
                ),
                Err(_) => warn!(
                    target: "tv.deprovisioning",
                    resource_id = %resource_id,
                    "Panel task did not stop in time"
                ),
            }
        }
    }
    if let Some(surface_id) = session.control_surface_id {
        engine.dialogs.retire(surface_id).await;
    }

    if !delete_room(engine, resource_id).await {
        return Err(TempVoiceError::Provider(format!(
            "room {resource_id} could not be deleted"
        )));
    }

    match engine.sessions.update(key, &SessionPatch::cleared()).await? {
        Some(_) => {}
        None => debug!(
            target: "tv.deprovisioning",
            resource_id = %resource_id,
            "Session vanished during teardown"
        ),
    }

    if engine.config.lock_trigger_while_open {
        unlock_trigger(engine, key).await;
    }

    info!(
        target: "tv.deprovisioning",
        community_id = %key.community_id,
        owner_id = %key.owner_id,
        resource_id = %resource_id,
        "Room torn down"
    );
    Ok(())
}

async fn unlock_trigger(engine: &EngineContext, key: OwnerKey) {
    let trigger_id = match engine.triggers.trigger_config(key.community_id).await {
        Ok(Some(config)) => config.trigger_resource_id,
        Ok(None) => None,
        Err(e) => {
            warn!(
                target: "tv.deprovisioning",
                community_id = %key.community_id,
                error = %e,
                "Failed to read trigger config, trigger stays locked"
            );
            None
        }
    };
    let Some(trigger_id) = trigger_id else {
        return;
    };

    match engine
        .provider
        .remove_overwrite(trigger_id, Subject::Member(key.owner_id))
        .await
    {
        Ok(()) | Err(ProviderError::Gone(_)) => {}
        Err(e) => warn!(
            target: "tv.deprovisioning",
            resource_id = %trigger_id,
            error = %e,
            "Failed to unlock trigger room"
        ),
    }
}

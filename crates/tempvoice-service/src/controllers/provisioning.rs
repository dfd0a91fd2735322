//! Provisioning: arrival in a trigger room -> the owner's live room.
//!
//! Runs under the owner's claim, taken with `try_claim`: a second trigger
//! for an owner already being provisioned is a duplicate and does nothing.
//!
//! Failure branches:
//!
//! | Step | Failure | Result |
//! |------|---------|--------|
//! | create room | any | `ResourceCreationFailed`, nothing persisted |
//! | move owner | gone | room deleted, session untouched, debug log |
//! | persist live id | error or no row | room deleted, error surfaced |
//! | control surface, trigger lock | any | logged, room stays usable |

use super::{delete_room, log_step_failure, supervise};
use crate::context::EngineContext;
use crate::errors::TempVoiceError;
use crate::models::{CommunityTriggerConfig, SessionPatch, TempVoiceSession};
use crate::observability::metrics;
use crate::permissions::{self, Overwrite, Permissions, Subject};
use crate::provider::ProviderError;
use crate::rooms::RoomState;
use common::types::{MemberId, OwnerKey, ResourceId, SurfaceId};
use std::time::Instant;
use tracing::{debug, info, instrument, warn};

/// How a provisioning attempt ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProvisionOutcome {
    /// A new room was created and the owner moved into it.
    Created(ResourceId),
    /// The owner already had a live room and was moved back into it.
    Attached(ResourceId),
    /// Another provisioning for this owner is in flight.
    Duplicate,
    /// The owner left before they could be moved; nothing remains.
    MemberGone,
}

impl ProvisionOutcome {
    fn as_label(self) -> &'static str {
        match self {
            ProvisionOutcome::Created(_) => "created",
            ProvisionOutcome::Attached(_) => "attached",
            ProvisionOutcome::Duplicate => "duplicate",
            ProvisionOutcome::MemberGone => "member_gone",
        }
    }
}

/// Provision a room for `member`, who just entered `trigger`'s trigger room.
#[instrument(
    skip_all,
    name = "tv.provisioning",
    fields(community_id = %trigger.community_id, member_id = %member_id)
)]
pub async fn provision(
    engine: &EngineContext,
    trigger: &CommunityTriggerConfig,
    member_id: MemberId,
    member_name: &str,
) -> Result<ProvisionOutcome, TempVoiceError> {
    let start = Instant::now();
    let key = OwnerKey::new(trigger.community_id, member_id);

    let Some(_claim) = engine.claims.try_claim(key) else {
        debug!(
            target: "tv.provisioning",
            community_id = %key.community_id,
            owner_id = %key.owner_id,
            "Provisioning already in flight, ignoring duplicate trigger"
        );
        metrics::record_provisioning("duplicate", start.elapsed());
        return Ok(ProvisionOutcome::Duplicate);
    };

    let result = provision_claimed(engine, trigger, key, member_name).await;

    let status = match &result {
        Ok(outcome) => outcome.as_label(),
        Err(e) if e.is_expected_race() => "race",
        Err(_) => "error",
    };
    metrics::record_provisioning(status, start.elapsed());

    result
}

async fn provision_claimed(
    engine: &EngineContext,
    trigger: &CommunityTriggerConfig,
    key: OwnerKey,
    member_name: &str,
) -> Result<ProvisionOutcome, TempVoiceError> {
    let provider = &*engine.provider;
    let defaults = engine.config.session_defaults(member_name);
    let (mut session, created) = engine.sessions.get_or_create(key, &defaults).await?;

    if let Some(existing) = session.live_resource_id {
        match provider
            .move_member(key.community_id, key.owner_id, existing)
            .await
        {
            Ok(()) => {
                adopt_if_untracked(engine, &session, existing);
                info!(
                    target: "tv.provisioning",
                    community_id = %key.community_id,
                    owner_id = %key.owner_id,
                    resource_id = %existing,
                    "Owner moved back into existing room"
                );
                return Ok(ProvisionOutcome::Attached(existing));
            }
            // The room is still ours, so it was the member who vanished.
            Err(ProviderError::Gone(_)) if engine.rooms.contains(existing) => {
                debug!(
                    target: "tv.provisioning",
                    resource_id = %existing,
                    "Owner left before attach"
                );
                return Ok(ProvisionOutcome::MemberGone);
            }
            Err(ProviderError::Gone(_)) => {
                debug!(
                    target: "tv.provisioning",
                    resource_id = %existing,
                    "Session named a room that no longer exists, clearing it"
                );
                session = engine
                    .sessions
                    .update(key, &SessionPatch::cleared())
                    .await?
                    .ok_or_else(|| {
                        TempVoiceError::PersistenceConflict(format!("session {key} vanished"))
                    })?;
            }
            Err(e) => return Err(e.into()),
        }
    }

    let acl = engine.access.list_for_owner(key).await?;
    let settings = session.settings();
    let overwrites = permissions::compile(&settings, &acl, key.owner_id);

    let resource_id = provider
        .create_resource(
            key.community_id,
            trigger.parent_id,
            &session.room_name,
            &overwrites,
        )
        .await
        .map_err(|e| TempVoiceError::ResourceCreationFailed(e.to_string()))?;
    metrics::record_room_created();
    // Held until the room is supervised or discarded.
    let _pending = engine.rooms.reserve(resource_id, key);

    match provider
        .move_member(key.community_id, key.owner_id, resource_id)
        .await
    {
        Ok(()) => {}
        Err(ProviderError::Gone(_)) => {
            debug!(
                target: "tv.provisioning",
                resource_id = %resource_id,
                "Owner left before the move, discarding new room"
            );
            delete_room(engine, resource_id).await;
            return Ok(ProvisionOutcome::MemberGone);
        }
        Err(e) => {
            delete_room(engine, resource_id).await;
            return Err(e.into());
        }
    }

    session = match engine
        .sessions
        .update(key, &SessionPatch::live(resource_id))
        .await
    {
        Ok(Some(updated)) => updated,
        Ok(None) => {
            delete_room(engine, resource_id).await;
            return Err(TempVoiceError::PersistenceConflict(format!(
                "session {key} vanished before the room was recorded"
            )));
        }
        Err(e) => {
            delete_room(engine, resource_id).await;
            return Err(e);
        }
    };

    let surface_id = send_control_surface(engine, key, resource_id, &session).await;

    if engine.config.lock_trigger_while_open {
        if let Some(trigger_id) = trigger.trigger_resource_id {
            if let Err(e) = provider
                .set_overwrite(
                    trigger_id,
                    Subject::Member(key.owner_id),
                    Overwrite::deny(Permissions::CONNECT),
                )
                .await
            {
                log_step_failure("lock_trigger", resource_id, &e);
            }
        }
    }

    let mut state = RoomState::from_session(&session);
    state.surface_id = surface_id;
    supervise(engine, resource_id, state, surface_id);

    info!(
        target: "tv.provisioning",
        community_id = %key.community_id,
        owner_id = %key.owner_id,
        resource_id = %resource_id,
        session_created = created,
        "Room provisioned"
    );

    Ok(ProvisionOutcome::Created(resource_id))
}

async fn send_control_surface(
    engine: &EngineContext,
    key: OwnerKey,
    resource_id: ResourceId,
    session: &TempVoiceSession,
) -> Option<SurfaceId> {
    let panel = RoomState::from_session(session).panel();
    let surface_id = match engine.provider.send_surface(resource_id, &panel).await {
        Ok(surface_id) => surface_id,
        Err(e) => {
            log_step_failure("send_control_surface", resource_id, &e);
            return None;
        }
    };

    let patch = SessionPatch {
        control_surface_id: Some(Some(surface_id)),
        ..SessionPatch::default()
    };
    match engine.sessions.update(key, &patch).await {
        Ok(Some(_)) => {}
        Ok(None) => debug!(
            target: "tv.provisioning",
            resource_id = %resource_id,
            "Session vanished before the control surface was recorded"
        ),
        Err(e) => warn!(
            target: "tv.provisioning",
            resource_id = %resource_id,
            error = %e,
            "Failed to record control surface"
        ),
    }

    Some(surface_id)
}

/// A room recorded in the session but not supervised here (left over from
/// before a restart) gets its panel back once the owner is in it again.
fn adopt_if_untracked(engine: &EngineContext, session: &TempVoiceSession, resource_id: ResourceId) {
    if engine.rooms.contains(resource_id) {
        return;
    }
    debug!(
        target: "tv.provisioning",
        resource_id = %resource_id,
        "Adopting untracked live room"
    );
    supervise(
        engine,
        resource_id,
        RoomState::from_session(session),
        session.control_surface_id,
    );
}

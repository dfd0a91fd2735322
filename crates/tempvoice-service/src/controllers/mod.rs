//! Room lifecycle controllers.
//!
//! Provisioning turns an arrival in a trigger room into a live room (or an
//! attach to the owner's existing one); deprovisioning tears a room down
//! once it is empty and destroys sessions of members who left the
//! community. Both run under the owner's claim.

pub mod deprovisioning;
pub mod provisioning;

pub use deprovisioning::{deprovision, destroy_session, TeardownOutcome};
pub use provisioning::{provision, ProvisionOutcome};

use crate::context::EngineContext;
use crate::flows;
use crate::provider::ProviderError;
use crate::rooms::RoomState;
use common::types::{ResourceId, SurfaceId};
use tracing::{debug, warn};

/// Start supervising a room: record it in the live-room table and, when it
/// has a control surface, spawn its panel task.
pub(crate) fn supervise(
    engine: &EngineContext,
    resource_id: ResourceId,
    state: RoomState,
    surface_id: Option<SurfaceId>,
) {
    let cancel = engine.shutdown.child_token();
    engine.rooms.insert(resource_id, state, cancel.clone());

    if let Some(surface_id) = surface_id {
        let task = flows::spawn_panel(engine.clone(), resource_id, surface_id, cancel);
        engine.rooms.attach_task(resource_id, task);
    }
}

/// Delete a room the engine created, treating "already gone" as success.
pub(crate) async fn delete_room(engine: &EngineContext, resource_id: ResourceId) -> bool {
    match engine.provider.delete_resource(resource_id).await {
        Ok(()) | Err(ProviderError::Gone(_)) => {
            crate::observability::metrics::record_room_deleted();
            true
        }
        Err(e) => {
            warn!(
                target: "tv.controllers",
                resource_id = %resource_id,
                error = %e,
                "Failed to delete room"
            );
            false
        }
    }
}

pub(crate) fn log_step_failure(step: &'static str, resource_id: ResourceId, error: &ProviderError) {
    if matches!(error, ProviderError::Gone(_)) {
        debug!(
            target: "tv.controllers",
            resource_id = %resource_id,
            step,
            error = %error,
            "Post-creation step hit a vanished target"
        );
    } else {
        warn!(
            target: "tv.controllers",
            resource_id = %resource_id,
            step,
            error = %error,
            "Post-creation step failed, room stays usable"
        );
    }
}

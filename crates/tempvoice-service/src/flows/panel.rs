//! The control-panel task of one live room.
//!
//! The panel is a long-lived dialog with unlimited uses on the room's
//! control surface. Each owner click runs the matching flow; afterwards the
//! panel is re-rendered from the live-room table and bound again. The task
//! ends when its cancellation token fires (room torn down, shutdown), when
//! the registry retires it, or when the panel deadline passes.

use super::{step_for, FlowContext};
use crate::context::EngineContext;
use crate::dialog::{Dialog, DialogOutcome};
use crate::errors::TempVoiceError;
use crate::provider::{Interaction, InteractionKind, InteractionPayload};
use crate::surface::ComponentId;
use common::types::{ResourceId, SurfaceId};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, warn, Instrument};

/// Spawn the panel task for a live room.
pub fn spawn_panel(
    engine: EngineContext,
    resource_id: ResourceId,
    surface_id: SurfaceId,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(run_panel(engine, resource_id, surface_id, cancel).in_current_span())
}

/// Drive the control panel until cancelled, retired or expired.
#[instrument(skip_all, name = "tv.panel", fields(resource_id = %resource_id, surface_id = %surface_id))]
pub async fn run_panel(
    engine: EngineContext,
    resource_id: ResourceId,
    surface_id: SurfaceId,
    cancel: CancellationToken,
) {
    let Some(room) = engine.rooms.get(resource_id) else {
        return;
    };
    let key = room.key;
    let mut panel = Dialog::unlimited(
        key.owner_id,
        surface_id,
        room.panel(),
        engine.config.panel_timeout,
    );

    debug!(target: "tv.panel", "Control panel started");

    loop {
        let binding = tokio::select! {
            () = cancel.cancelled() => break,
            binding = engine.dialogs.bind(surface_id) => binding,
        };
        let outcome = tokio::select! {
            () = cancel.cancelled() => break,
            outcome = panel.collect(&*engine.provider, InteractionKind::Button, &binding) => outcome,
        };
        drop(binding);

        let interaction = match outcome {
            Ok(DialogOutcome::Collected(interaction)) => interaction,
            Ok(DialogOutcome::Expired) => {
                debug!(target: "tv.panel", "Control panel expired");
                break;
            }
            Ok(DialogOutcome::Retired) => break,
            Err(e) => {
                warn!(target: "tv.panel", error = %e, "Control panel stopped");
                break;
            }
        };

        let action = match &interaction.payload {
            InteractionPayload::Component {
                id: ComponentId::Action(action),
            } => *action,
            InteractionPayload::Component { .. } | InteractionPayload::Members { .. } => {
                report(&engine, &interaction, &TempVoiceError::DialogExpired).await;
                continue;
            }
        };

        let flow = FlowContext {
            engine: &engine,
            key,
            resource_id,
            interaction: &interaction,
        };
        let result = tokio::select! {
            () = cancel.cancelled() => break,
            result = step_for(action).run(&flow) => result,
        };
        if let Err(e) = result {
            if e.is_expected_race() {
                debug!(target: "tv.panel", action = ?action, error = %e, "Flow ended early");
            } else {
                warn!(target: "tv.panel", action = ?action, error = %e, "Flow failed");
            }
            report(&engine, &interaction, &e).await;
        }

        let Some(room) = engine.rooms.get(resource_id) else {
            break;
        };
        let content = room.panel();
        if let Err(e) = engine.provider.edit_surface(surface_id, &content).await {
            debug!(target: "tv.panel", error = %e, "Failed to re-render control panel");
        }
        panel.set_content(content);
    }

    debug!(target: "tv.panel", "Control panel stopped");
}

async fn report(engine: &EngineContext, interaction: &Interaction, error: &TempVoiceError) {
    if let Err(e) = engine
        .provider
        .reply_ephemeral(interaction.id, &error.client_message())
        .await
    {
        debug!(target: "tv.panel", error = %e, "Failed to report flow error");
    }
}

use super::{recompile, room_gone, ConfigStep, FlowContext};
use crate::errors::TempVoiceError;
use crate::models::{SessionPatch, Toggle};
use async_trait::async_trait;
use tracing::{info, instrument};

/// Flip one feature toggle (or privacy) on the live room, then offer to
/// keep the new value as the owner's default.
#[derive(Debug, Clone, Copy)]
pub struct ToggleStep(pub Toggle);

#[async_trait]
impl ConfigStep for ToggleStep {
    #[instrument(skip_all, name = "tv.flows.toggle", fields(resource_id = %flow.resource_id, toggle = ?self.0))]
    async fn run(&self, flow: &FlowContext<'_>) -> Result<(), TempVoiceError> {
        let engine = flow.engine;
        let toggle = self.0;

        let before = engine
            .rooms
            .get(flow.resource_id)
            .ok_or_else(|| room_gone(flow.resource_id))?
            .settings;
        let after = before.toggled(toggle);

        let acl = engine.access.list_for_owner(flow.key).await?;
        let pushed = recompile(
            engine,
            flow.key,
            flow.resource_id,
            (&before, &acl),
            (&after, &acl),
        )
        .await?;

        // Only what the room actually received becomes its effective state.
        engine
            .rooms
            .update(flow.resource_id, |room| room.settings = after)
            .ok_or_else(|| room_gone(flow.resource_id))?;

        let value = after.get(toggle);
        info!(
            target: "tv.flows",
            resource_id = %flow.resource_id,
            toggle = ?toggle,
            enabled = value,
            overwrites_changed = pushed,
            "Room toggle applied"
        );

        let change = match (toggle, value) {
            (Toggle::Privacy, true) => "The room is now private".to_string(),
            (Toggle::Privacy, false) => "The room is now public".to_string(),
            (_, true) => format!("{} turned on", toggle.label()),
            (_, false) => format!("{} turned off", toggle.label()),
        };
        flow.offer_save_default(SessionPatch::toggle(toggle, value), &change)
            .await?;
        Ok(())
    }
}

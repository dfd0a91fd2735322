use super::{room_gone, ConfigStep, FlowContext};
use crate::errors::TempVoiceError;
use crate::models::SessionPatch;
use async_trait::async_trait;
use tracing::{info, instrument};

/// Longest room name the provider accepts.
pub const MAX_ROOM_NAME_CHARS: usize = 100;

/// Trim and check a proposed room name.
pub fn validate_room_name(raw: &str) -> Result<String, TempVoiceError> {
    let name = raw.trim();
    if name.is_empty() {
        return Err(TempVoiceError::InvalidInput(
            "The room name cannot be empty".to_string(),
        ));
    }
    if name.chars().count() > MAX_ROOM_NAME_CHARS {
        return Err(TempVoiceError::InvalidInput(format!(
            "The room name must be at most {MAX_ROOM_NAME_CHARS} characters"
        )));
    }
    Ok(name.to_string())
}

/// Rename the live room from a typed answer.
#[derive(Debug, Clone, Copy)]
pub struct RenameStep;

#[async_trait]
impl ConfigStep for RenameStep {
    #[instrument(skip_all, name = "tv.flows.rename", fields(resource_id = %flow.resource_id))]
    async fn run(&self, flow: &FlowContext<'_>) -> Result<(), TempVoiceError> {
        let engine = flow.engine;
        if !engine.rooms.contains(flow.resource_id) {
            return Err(room_gone(flow.resource_id));
        }

        let name = flow
            .prompt_text(
                "Type the new room name in this channel (1-100 characters).",
                validate_room_name,
            )
            .await?;

        engine
            .provider
            .rename_resource(flow.resource_id, &name)
            .await?;
        engine
            .rooms
            .update(flow.resource_id, |room| room.name.clone_from(&name))
            .ok_or_else(|| room_gone(flow.resource_id))?;

        info!(
            target: "tv.flows",
            resource_id = %flow.resource_id,
            "Room renamed"
        );

        let change = format!("Room renamed to {name}");
        let patch = SessionPatch {
            room_name: Some(name),
            ..SessionPatch::default()
        };
        flow.offer_save_default(patch, &change).await?;
        Ok(())
    }
}

use super::{room_gone, ConfigStep, FlowContext};
use crate::errors::TempVoiceError;
use crate::models::SessionPatch;
use async_trait::async_trait;
use tracing::{info, instrument};

/// Upper bound for the retained-message count.
pub const MAX_RETAINED_MESSAGES: u32 = 100;

/// Parse a typed retained-message count.
pub fn parse_retained_count(raw: &str) -> Result<u32, TempVoiceError> {
    let invalid = || {
        TempVoiceError::InvalidInput(format!(
            "Enter a whole number from 0 to {MAX_RETAINED_MESSAGES}"
        ))
    };

    let count: u32 = raw.trim().parse().map_err(|_| invalid())?;
    if count > MAX_RETAINED_MESSAGES {
        return Err(invalid());
    }
    Ok(count)
}

/// Set how many recent messages the room keeps.
///
/// Persisted straight to the session; there is no room-only variant.
#[derive(Debug, Clone, Copy)]
pub struct RetainedMessagesStep;

#[async_trait]
impl ConfigStep for RetainedMessagesStep {
    #[instrument(skip_all, name = "tv.flows.retained_messages", fields(resource_id = %flow.resource_id))]
    async fn run(&self, flow: &FlowContext<'_>) -> Result<(), TempVoiceError> {
        let engine = flow.engine;

        let count = flow
            .prompt_text(
                "How many recent messages should this room keep? Type a number from 0 to 100.",
                parse_retained_count,
            )
            .await?;

        let patch = SessionPatch {
            retained_message_count: Some(count),
            ..SessionPatch::default()
        };
        engine
            .sessions
            .update(flow.key, &patch)
            .await?
            .ok_or_else(|| {
                TempVoiceError::PersistenceConflict(format!("session {} missing", flow.key))
            })?;
        engine
            .rooms
            .update(flow.resource_id, |room| room.retained_message_count = count)
            .ok_or_else(|| room_gone(flow.resource_id))?;

        info!(
            target: "tv.flows",
            resource_id = %flow.resource_id,
            retained_message_count = count,
            "Retained message count updated"
        );
        flow.reply(&format!("This room now keeps the last {count} messages."))
            .await;
        Ok(())
    }
}

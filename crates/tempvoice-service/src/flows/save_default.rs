use super::FlowContext;
use crate::dialog::DialogOutcome;
use crate::errors::TempVoiceError;
use crate::models::SessionPatch;
use crate::provider::{InteractionKind, InteractionPayload};
use crate::surface::{self, ComponentId};
use tracing::{debug, info};

impl FlowContext<'_> {
    /// Ask whether a room change should become the owner's default.
    ///
    /// "Yes" writes `patch` to the session so the next room starts with it.
    /// "No", expiry or retirement leave it as a change to this room only.
    /// Returns whether the default was saved.
    pub async fn offer_save_default(
        &self,
        patch: SessionPatch,
        change: &str,
    ) -> Result<bool, TempVoiceError> {
        let engine = self.engine;
        let outcome = self
            .prompt_dialog(
                surface::save_default_prompt(change),
                InteractionKind::Button,
                engine.config.dialog_timeout,
            )
            .await?;

        let save = match outcome {
            DialogOutcome::Collected(interaction) => matches!(
                interaction.payload,
                InteractionPayload::Component {
                    id: ComponentId::Confirm(true)
                }
            ),
            DialogOutcome::Expired | DialogOutcome::Retired => false,
        };

        if !save {
            debug!(
                target: "tv.flows",
                resource_id = %self.resource_id,
                "Change kept for this room only"
            );
            return Ok(false);
        }

        engine
            .sessions
            .update(self.key, &patch)
            .await?
            .ok_or_else(|| {
                TempVoiceError::PersistenceConflict(format!("session {} missing", self.key))
            })?;

        info!(
            target: "tv.flows",
            community_id = %self.key.community_id,
            owner_id = %self.key.owner_id,
            "Room change saved as default"
        );
        Ok(true)
    }
}

//! Owner configuration flows.
//!
//! Every control-panel action maps to exactly one [`ConfigStep`] through
//! [`step_for`]. The match is exhaustive over [`ActionKind`], so a new
//! action does not compile until it has a step.
//!
//! Flows run inside the room's panel task. They change the room through the
//! provider, persist through the stores, and keep the live-room table's
//! effective settings in step with what was pushed.

mod access;
pub mod panel;
mod rename;
mod retained;
mod save_default;
mod toggle;

pub use access::EditAccessStep;
pub use panel::{run_panel, spawn_panel};
pub use rename::{validate_room_name, RenameStep, MAX_ROOM_NAME_CHARS};
pub use retained::{parse_retained_count, RetainedMessagesStep, MAX_RETAINED_MESSAGES};
pub use toggle::ToggleStep;

use crate::context::EngineContext;
use crate::dialog::{Dialog, DialogOutcome};
use crate::errors::TempVoiceError;
use crate::models::{AccessControlEntry, RoomSettings, Toggle};
use crate::permissions::{self, OverwriteChange, OverwriteSet};
use crate::provider::{Interaction, InteractionKind};
use crate::surface::{ActionKind, SurfaceContent};
use async_trait::async_trait;
use common::types::{OwnerKey, ResourceId};
use std::time::Duration;
use tracing::{debug, warn};

/// Invalid text answers tolerated before a text prompt gives up.
pub const TEXT_PROMPT_RETRIES: u32 = 2;

/// Inputs shared by every step.
pub struct FlowContext<'a> {
    pub engine: &'a EngineContext,
    pub key: OwnerKey,
    pub resource_id: ResourceId,
    /// The panel interaction that started the flow.
    pub interaction: &'a Interaction,
}

/// One owner action.
#[async_trait]
pub trait ConfigStep: Send + Sync {
    async fn run(&self, flow: &FlowContext<'_>) -> Result<(), TempVoiceError>;
}

static RENAME: RenameStep = RenameStep;
static TOGGLE_SOUNDBOARD: ToggleStep = ToggleStep(Toggle::Soundboard);
static TOGGLE_STREAMS: ToggleStep = ToggleStep(Toggle::Streams);
static TOGGLE_ACTIVITIES: ToggleStep = ToggleStep(Toggle::Activities);
static TOGGLE_PRIVACY: ToggleStep = ToggleStep(Toggle::Privacy);
static EDIT_ACCESS: EditAccessStep = EditAccessStep;
static RETAINED_MESSAGES: RetainedMessagesStep = RetainedMessagesStep;

/// The step that handles `action`.
#[must_use]
pub fn step_for(action: ActionKind) -> &'static dyn ConfigStep {
    match action {
        ActionKind::Rename => &RENAME,
        ActionKind::ToggleSoundboard => &TOGGLE_SOUNDBOARD,
        ActionKind::ToggleStreams => &TOGGLE_STREAMS,
        ActionKind::ToggleActivities => &TOGGLE_ACTIVITIES,
        ActionKind::TogglePrivacy => &TOGGLE_PRIVACY,
        ActionKind::EditAccess => &EDIT_ACCESS,
        ActionKind::SetRetainedMessages => &RETAINED_MESSAGES,
    }
}

impl FlowContext<'_> {
    /// Answer the owner privately on the interaction that started the flow.
    pub(crate) async fn reply(&self, text: &str) {
        if let Err(e) = self
            .engine
            .provider
            .reply_ephemeral(self.interaction.id, text)
            .await
        {
            debug!(
                target: "tv.flows",
                resource_id = %self.resource_id,
                error = %e,
                "Failed to reply to owner"
            );
        }
    }

    /// Ask the owner to type an answer in the room and parse it.
    ///
    /// Up to [`TEXT_PROMPT_RETRIES`] invalid answers are met with the
    /// validation message and another wait. Timing out is
    /// [`TempVoiceError::DialogExpired`].
    pub(crate) async fn prompt_text<T>(
        &self,
        prompt: &str,
        parse: fn(&str) -> Result<T, TempVoiceError>,
    ) -> Result<T, TempVoiceError> {
        self.reply(prompt).await;

        let mut retries = 0;
        loop {
            let text = self
                .engine
                .provider
                .await_text(
                    self.resource_id,
                    self.key.owner_id,
                    self.engine.config.dialog_timeout,
                )
                .await?
                .ok_or(TempVoiceError::DialogExpired)?;

            match parse(&text) {
                Ok(value) => return Ok(value),
                Err(e) if retries < TEXT_PROMPT_RETRIES => {
                    retries += 1;
                    self.reply(&e.client_message()).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Post `content` in the room as a one-shot dialog and wait for the
    /// owner. A collected prompt is deleted afterwards; an expired one stays
    /// behind disabled.
    pub(crate) async fn prompt_dialog(
        &self,
        content: SurfaceContent,
        kind: InteractionKind,
        timeout: Duration,
    ) -> Result<DialogOutcome, TempVoiceError> {
        let provider = &*self.engine.provider;
        let surface_id = provider.send_surface(self.resource_id, &content).await?;

        let binding = self.engine.dialogs.bind(surface_id).await;
        let mut dialog = Dialog::single(self.key.owner_id, surface_id, content, timeout);
        let outcome = dialog.collect(provider, kind, &binding).await;
        drop(binding);

        if matches!(outcome, Ok(DialogOutcome::Collected(_))) {
            if let Err(e) = provider.delete_surface(surface_id).await {
                debug!(
                    target: "tv.flows",
                    surface_id = %surface_id,
                    error = %e,
                    "Failed to delete answered prompt"
                );
            }
        }
        outcome
    }
}

/// Push the overwrite changes that move a room from `before` to `after`.
pub(crate) async fn push_overwrites(
    engine: &EngineContext,
    resource_id: ResourceId,
    before: &OverwriteSet,
    after: &OverwriteSet,
) -> Result<usize, TempVoiceError> {
    let changes = before.diff(after);
    for change in &changes {
        match *change {
            OverwriteChange::Set(subject, overwrite) => {
                engine
                    .provider
                    .set_overwrite(resource_id, subject, overwrite)
                    .await?;
            }
            OverwriteChange::Remove(subject) => {
                engine.provider.remove_overwrite(resource_id, subject).await?;
            }
        }
    }
    Ok(changes.len())
}

/// Recompile for a settings and/or access-list change and push the result.
///
/// When a push fails the changes already applied are pushed back, so the
/// room is left on the `before` set and callers commit nothing.
pub(crate) async fn recompile(
    engine: &EngineContext,
    key: OwnerKey,
    resource_id: ResourceId,
    (settings_before, acl_before): (&RoomSettings, &[AccessControlEntry]),
    (settings_after, acl_after): (&RoomSettings, &[AccessControlEntry]),
) -> Result<usize, TempVoiceError> {
    let before = permissions::compile(settings_before, acl_before, key.owner_id);
    let after = permissions::compile(settings_after, acl_after, key.owner_id);

    match push_overwrites(engine, resource_id, &before, &after).await {
        Ok(pushed) => Ok(pushed),
        Err(e) => {
            revert_overwrites(engine, resource_id, &after, &before).await;
            Err(e)
        }
    }
}

/// Best-effort push from `from` back to `to`.
pub(crate) async fn revert_overwrites(
    engine: &EngineContext,
    resource_id: ResourceId,
    from: &OverwriteSet,
    to: &OverwriteSet,
) {
    if let Err(e) = push_overwrites(engine, resource_id, from, to).await {
        warn!(
            target: "tv.flows",
            resource_id = %resource_id,
            error = %e,
            "Failed to roll back room permissions"
        );
    }
}

fn room_gone(resource_id: ResourceId) -> TempVoiceError {
    TempVoiceError::ResourceGone(format!("room {resource_id} is no longer live"))
}

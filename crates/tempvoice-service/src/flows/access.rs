use super::{recompile, revert_overwrites, room_gone, ConfigStep, FlowContext};
use crate::dialog::DialogOutcome;
use crate::errors::TempVoiceError;
use crate::models::AccessControlEntry;
use crate::permissions;
use crate::provider::{InteractionKind, InteractionPayload};
use crate::repositories::set_member_access;
use crate::surface;
use async_trait::async_trait;
use common::types::MemberId;
use std::collections::BTreeMap;
use tracing::{info, instrument, warn};

/// Edit the whitelist (private room) or blacklist (public room).
///
/// Every selected member flips between listed and unlisted for the current
/// mode. The owner is never listed.
#[derive(Debug, Clone, Copy)]
pub struct EditAccessStep;

#[async_trait]
impl ConfigStep for EditAccessStep {
    #[instrument(skip_all, name = "tv.flows.edit_access", fields(resource_id = %flow.resource_id))]
    async fn run(&self, flow: &FlowContext<'_>) -> Result<(), TempVoiceError> {
        let engine = flow.engine;
        let max = engine.config.max_member_selection;
        let settings = engine
            .rooms
            .get(flow.resource_id)
            .ok_or_else(|| room_gone(flow.resource_id))?
            .settings;
        let is_private = settings.is_private;

        let outcome = flow
            .prompt_dialog(
                surface::member_select_prompt(is_private, max),
                InteractionKind::MemberSelect,
                engine.config.member_select_timeout,
            )
            .await?;
        let selected = match outcome {
            DialogOutcome::Collected(interaction) => match interaction.payload {
                InteractionPayload::Members { members } => members,
                InteractionPayload::Component { .. } => Vec::new(),
            },
            DialogOutcome::Expired => return Err(TempVoiceError::DialogExpired),
            DialogOutcome::Retired => return Ok(()),
        };

        let before = engine.access.list_for_owner(flow.key).await?;
        let mut entries: BTreeMap<MemberId, AccessControlEntry> = before
            .iter()
            .filter(|entry| !entry.is_redundant(is_private))
            .map(|entry| (entry.member_id, *entry))
            .collect();

        let mut changes: Vec<(MemberId, bool)> = Vec::new();
        let (mut added, mut removed) = (0_usize, 0_usize);
        for member_id in selected.into_iter().take(max) {
            if member_id == flow.key.owner_id || changes.iter().any(|(m, _)| *m == member_id) {
                continue;
            }
            let list = !entries.contains_key(&member_id);
            // Listed means "the exception to this mode's default".
            let has_access = if list { is_private } else { !is_private };
            if list {
                entries.insert(
                    member_id,
                    AccessControlEntry {
                        community_id: flow.key.community_id,
                        owner_id: flow.key.owner_id,
                        member_id,
                        has_access,
                    },
                );
                added += 1;
            } else {
                entries.remove(&member_id);
                removed += 1;
            }
            changes.push((member_id, has_access));
        }
        let after: Vec<AccessControlEntry> = entries.into_values().collect();

        // The room gets the new list first; the store follows once it has.
        let pushed = recompile(
            engine,
            flow.key,
            flow.resource_id,
            (&settings, &before),
            (&settings, &after),
        )
        .await?;

        for (applied, &(member_id, has_access)) in changes.iter().enumerate() {
            if let Err(e) =
                set_member_access(&*engine.access, flow.key, member_id, has_access, is_private)
                    .await
            {
                let owner = flow.key.owner_id;
                revert_overwrites(
                    engine,
                    flow.resource_id,
                    &permissions::compile(&settings, &after, owner),
                    &permissions::compile(&settings, &before, owner),
                )
                .await;
                restore_entries(flow, &before, changes.iter().take(applied)).await;
                return Err(e);
            }
        }

        info!(
            target: "tv.flows",
            resource_id = %flow.resource_id,
            is_private,
            added,
            removed,
            overwrites_changed = pushed,
            "Access list updated"
        );

        let list_name = if is_private { "whitelist" } else { "blacklist" };
        flow.reply(&format!(
            "Updated the {list_name}: {added} added, {removed} removed."
        ))
        .await;
        Ok(())
    }
}

/// Put the stored entries of the members in `changed` back to `before`.
async fn restore_entries<'a>(
    flow: &FlowContext<'_>,
    before: &[AccessControlEntry],
    changed: impl Iterator<Item = &'a (MemberId, bool)>,
) {
    let access = &*flow.engine.access;
    for &(member_id, _) in changed {
        let previous = before.iter().find(|entry| entry.member_id == member_id);
        let result = match previous {
            Some(entry) => access
                .upsert(flow.key, member_id, entry.has_access)
                .await
                .map(|_| ()),
            None => access.remove(flow.key, member_id).await.map(|_| ()),
        };
        if let Err(e) = result {
            warn!(
                target: "tv.flows",
                resource_id = %flow.resource_id,
                member_id = %member_id,
                error = %e,
                "Failed to restore access entry"
            );
        }
    }
}

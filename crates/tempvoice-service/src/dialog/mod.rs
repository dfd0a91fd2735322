//! Interactive configuration engine.
//!
//! A [`Dialog`] is a time-boxed, owner-scoped selection bound to one control
//! surface:
//!
//! ```text
//!            owner interaction, uses left
//!          ┌──────────────┐
//!          ▼              │
//!        Open ────────────┴──► Collected   (last use consumed)
//!        │  │ ▲
//!        │  │ └── non-owner interaction: ephemeral rejection, no use
//!        │  │     consumed, deadline unchanged
//!        │  └───────────────► Expired     (deadline elapsed, components disabled)
//!        └──────────────────► Retired     (binding cancelled: rebind or teardown)
//! ```
//!
//! Terminal instances reject every further offer as stale. Cancelling a
//! dialog never touches the session or the live room; that is left to the
//! flow that opened it.

pub mod registry;

pub use registry::{DialogBinding, DialogRegistry};

use crate::errors::TempVoiceError;
use crate::observability::metrics::{self, DialogOutcomeLabel};
use crate::provider::{Interaction, InteractionKind, Provider};
use crate::surface::SurfaceContent;
use common::types::{MemberId, SurfaceId};
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

/// Lifecycle state of one dialog instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DialogState {
    /// Waiting for the owner. `uses_left: None` means unlimited.
    Open { uses_left: Option<u32> },
    Collected,
    Expired,
    Retired,
}

/// What happened to an interaction offered to a dialog.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Offer {
    /// From the owner while open; one use consumed.
    Accepted,
    /// From someone else; the dialog stays as it was.
    Unauthorized,
    /// The dialog already reached a terminal state.
    Stale,
}

impl DialogState {
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        !matches!(self, DialogState::Open { .. })
    }

    /// Offer an interaction by `actor` to a dialog owned by `owner`.
    pub fn offer(&mut self, actor: MemberId, owner: MemberId) -> Offer {
        let DialogState::Open { uses_left } = self else {
            return Offer::Stale;
        };
        if actor != owner {
            return Offer::Unauthorized;
        }

        if let Some(left) = uses_left {
            *left = left.saturating_sub(1);
            if *left == 0 {
                *self = DialogState::Collected;
            }
        }
        Offer::Accepted
    }

    /// Move an open dialog to `Expired`. Returns whether it was open.
    pub fn expire(&mut self) -> bool {
        self.finish(DialogState::Expired)
    }

    /// Move an open dialog to `Retired`. Returns whether it was open.
    pub fn retire(&mut self) -> bool {
        self.finish(DialogState::Retired)
    }

    fn finish(&mut self, terminal: DialogState) -> bool {
        if self.is_terminal() {
            return false;
        }
        *self = terminal;
        true
    }
}

/// Result of waiting on a dialog.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DialogOutcome {
    Collected(Interaction),
    Expired,
    Retired,
}

/// One dialog instance.
#[derive(Debug)]
pub struct Dialog {
    owner: MemberId,
    surface_id: SurfaceId,
    content: SurfaceContent,
    deadline: Instant,
    state: DialogState,
}

impl Dialog {
    /// A dialog that finishes after one collection.
    #[must_use]
    pub fn single(
        owner: MemberId,
        surface_id: SurfaceId,
        content: SurfaceContent,
        timeout: Duration,
    ) -> Self {
        Self::new(owner, surface_id, content, timeout, Some(1))
    }

    /// A dialog that keeps collecting until its deadline.
    #[must_use]
    pub fn unlimited(
        owner: MemberId,
        surface_id: SurfaceId,
        content: SurfaceContent,
        timeout: Duration,
    ) -> Self {
        Self::new(owner, surface_id, content, timeout, None)
    }

    fn new(
        owner: MemberId,
        surface_id: SurfaceId,
        content: SurfaceContent,
        timeout: Duration,
        max_uses: Option<u32>,
    ) -> Self {
        Self {
            owner,
            surface_id,
            content,
            deadline: Instant::now() + timeout,
            state: DialogState::Open {
                uses_left: max_uses,
            },
        }
    }

    #[must_use]
    pub fn state(&self) -> DialogState {
        self.state
    }

    #[must_use]
    pub fn surface_id(&self) -> SurfaceId {
        self.surface_id
    }

    /// Replace what the surface shows (used when disabling on expiry).
    pub fn set_content(&mut self, content: SurfaceContent) {
        self.content = content;
    }

    /// Wait for the owner's next interaction on this dialog's surface.
    ///
    /// Non-owner interactions are answered privately and ignored. When the
    /// deadline passes first, the surface is re-rendered with every
    /// component disabled. `binding` must be the registry binding for this
    /// dialog's surface; its cancellation retires the dialog.
    pub async fn collect(
        &mut self,
        provider: &dyn Provider,
        kind: InteractionKind,
        binding: &DialogBinding,
    ) -> Result<DialogOutcome, TempVoiceError> {
        loop {
            match self.state {
                DialogState::Open { .. } => {}
                DialogState::Expired => return Ok(DialogOutcome::Expired),
                DialogState::Retired => return Ok(DialogOutcome::Retired),
                DialogState::Collected => {
                    return Err(TempVoiceError::Internal(
                        "collect called on a finished dialog".to_string(),
                    ))
                }
            }

            let remaining = self.deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return self.expire(provider).await;
            }

            let next = tokio::select! {
                () = binding.cancelled() => {
                    self.state.retire();
                    metrics::record_dialog_outcome(DialogOutcomeLabel::Retired);
                    debug!(
                        target: "tv.dialog",
                        surface_id = %self.surface_id,
                        "Dialog retired"
                    );
                    return Ok(DialogOutcome::Retired);
                }
                next = provider.await_interaction(self.surface_id, kind, remaining) => next?,
            };

            let Some(interaction) = next else {
                return self.expire(provider).await;
            };

            match self.state.offer(interaction.actor, self.owner) {
                Offer::Accepted => {
                    metrics::record_dialog_outcome(DialogOutcomeLabel::Collected);
                    return Ok(DialogOutcome::Collected(interaction));
                }
                Offer::Unauthorized => {
                    debug!(
                        target: "tv.dialog",
                        surface_id = %self.surface_id,
                        actor_id = %interaction.actor,
                        "Rejected interaction from non-owner"
                    );
                    self.reject(provider, &interaction, &TempVoiceError::Unauthorized)
                        .await;
                }
                Offer::Stale => {
                    self.reject(provider, &interaction, &TempVoiceError::DialogExpired)
                        .await;
                }
            }
        }
    }

    async fn expire(&mut self, provider: &dyn Provider) -> Result<DialogOutcome, TempVoiceError> {
        if self.state.expire() {
            metrics::record_dialog_outcome(DialogOutcomeLabel::Expired);
            debug!(
                target: "tv.dialog",
                surface_id = %self.surface_id,
                "Dialog expired"
            );
            if let Err(e) = provider
                .edit_surface(self.surface_id, &self.content.disabled())
                .await
            {
                debug!(
                    target: "tv.dialog",
                    surface_id = %self.surface_id,
                    error = %e,
                    "Failed to disable expired surface"
                );
            }
        }
        Ok(DialogOutcome::Expired)
    }

    async fn reject(
        &self,
        provider: &dyn Provider,
        interaction: &Interaction,
        reason: &TempVoiceError,
    ) {
        if let Err(e) = provider
            .reply_ephemeral(interaction.id, &reason.client_message())
            .await
        {
            debug!(
                target: "tv.dialog",
                surface_id = %self.surface_id,
                error = %e,
                "Failed to answer rejected interaction"
            );
        }
    }
}

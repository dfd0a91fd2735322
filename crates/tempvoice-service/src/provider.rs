//! The provider capability interface.
//!
//! The engine never talks to the real-time platform directly. Everything it
//! needs (creating rooms, moving members, rendering surfaces, waiting for an
//! owner's next click or message) goes through [`Provider`], implemented by
//! the transport layer that embeds this crate.

use crate::permissions::{Overwrite, OverwriteSet, Subject};
use crate::surface::{ComponentId, SurfaceContent};
use async_trait::async_trait;
use common::types::{CommunityId, InteractionId, MemberId, ResourceId, SurfaceId};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// Provider call failures.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ProviderError {
    /// The target member or resource no longer exists (or the member is no
    /// longer connected).
    #[error("gone: {0}")]
    Gone(String),

    /// The platform refused the request (permissions, limits, validation).
    #[error("rejected: {0}")]
    Rejected(String),

    /// Transport failure.
    #[error("transport: {0}")]
    Transport(String),
}

/// Which interaction stream to wait on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InteractionKind {
    Button,
    MemberSelect,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InteractionPayload {
    Component { id: ComponentId },
    Members { members: Vec<MemberId> },
}

/// One click or selection on a surface.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Interaction {
    pub id: InteractionId,
    pub surface_id: SurfaceId,
    pub actor: MemberId,
    pub payload: InteractionPayload,
}

impl Interaction {
    #[must_use]
    pub fn kind(&self) -> InteractionKind {
        match self.payload {
            InteractionPayload::Component { .. } => InteractionKind::Button,
            InteractionPayload::Members { .. } => InteractionKind::MemberSelect,
        }
    }
}

#[async_trait]
pub trait Provider: Send + Sync {
    /// Create a room under `parent` carrying `overwrites`.
    async fn create_resource(
        &self,
        community_id: CommunityId,
        parent_id: Option<ResourceId>,
        name: &str,
        overwrites: &OverwriteSet,
    ) -> Result<ResourceId, ProviderError>;

    async fn delete_resource(&self, resource_id: ResourceId) -> Result<(), ProviderError>;

    async fn rename_resource(&self, resource_id: ResourceId, name: &str)
        -> Result<(), ProviderError>;

    async fn set_overwrite(
        &self,
        resource_id: ResourceId,
        subject: Subject,
        overwrite: Overwrite,
    ) -> Result<(), ProviderError>;

    async fn remove_overwrite(
        &self,
        resource_id: ResourceId,
        subject: Subject,
    ) -> Result<(), ProviderError>;

    /// Move a connected member into `resource_id`.
    ///
    /// Returns [`ProviderError::Gone`] when the member is no longer connected.
    async fn move_member(
        &self,
        community_id: CommunityId,
        member_id: MemberId,
        resource_id: ResourceId,
    ) -> Result<(), ProviderError>;

    async fn send_surface(
        &self,
        channel_id: ResourceId,
        content: &SurfaceContent,
    ) -> Result<SurfaceId, ProviderError>;

    async fn edit_surface(
        &self,
        surface_id: SurfaceId,
        content: &SurfaceContent,
    ) -> Result<(), ProviderError>;

    async fn delete_surface(&self, surface_id: SurfaceId) -> Result<(), ProviderError>;

    /// Wait up to `timeout` for the next interaction of `kind` on a surface.
    ///
    /// `Ok(None)` means the timeout elapsed.
    async fn await_interaction(
        &self,
        surface_id: SurfaceId,
        kind: InteractionKind,
        timeout: Duration,
    ) -> Result<Option<Interaction>, ProviderError>;

    /// Wait up to `timeout` for `author`'s next message in `channel_id`.
    async fn await_text(
        &self,
        channel_id: ResourceId,
        author_id: MemberId,
        timeout: Duration,
    ) -> Result<Option<String>, ProviderError>;

    /// Answer an interaction privately to its actor.
    async fn reply_ephemeral(
        &self,
        interaction_id: InteractionId,
        text: &str,
    ) -> Result<(), ProviderError>;
}

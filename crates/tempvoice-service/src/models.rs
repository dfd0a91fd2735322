//! Persisted records and the value types derived from them.

use chrono::{DateTime, Utc};
use common::types::{CommunityId, MemberId, OwnerKey, ResourceId, SurfaceId};
use serde::{Deserialize, Serialize};

/// Durable per-owner room template.
///
/// `live_resource_id` is set exactly while a room exists for this owner. The
/// row itself outlives every room and is only deleted along with the owner's
/// community membership.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TempVoiceSession {
    pub community_id: CommunityId,
    pub owner_id: MemberId,
    pub live_resource_id: Option<ResourceId>,
    pub control_surface_id: Option<SurfaceId>,
    pub room_name: String,
    pub soundboard_enabled: bool,
    pub streams_enabled: bool,
    pub activities_enabled: bool,
    pub is_private: bool,
    pub retained_message_count: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TempVoiceSession {
    #[must_use]
    pub fn key(&self) -> OwnerKey {
        OwnerKey::new(self.community_id, self.owner_id)
    }

    /// The permission-relevant settings of this session.
    #[must_use]
    pub fn settings(&self) -> RoomSettings {
        RoomSettings {
            soundboard_enabled: self.soundboard_enabled,
            streams_enabled: self.streams_enabled,
            activities_enabled: self.activities_enabled,
            is_private: self.is_private,
        }
    }
}

/// Values a session row starts with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionDefaults {
    pub room_name: String,
    pub soundboard_enabled: bool,
    pub streams_enabled: bool,
    pub activities_enabled: bool,
    pub is_private: bool,
    pub retained_message_count: u32,
}

impl Default for SessionDefaults {
    fn default() -> Self {
        Self {
            room_name: "Temporary Room".to_string(),
            soundboard_enabled: true,
            streams_enabled: true,
            activities_enabled: true,
            is_private: false,
            retained_message_count: 0,
        }
    }
}

/// Feature toggles and privacy mode, the inputs of the permission compiler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RoomSettings {
    pub soundboard_enabled: bool,
    pub streams_enabled: bool,
    pub activities_enabled: bool,
    pub is_private: bool,
}

impl Default for RoomSettings {
    fn default() -> Self {
        Self {
            soundboard_enabled: true,
            streams_enabled: true,
            activities_enabled: true,
            is_private: false,
        }
    }
}

/// One of the four owner-controlled switches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Toggle {
    Soundboard,
    Streams,
    Activities,
    Privacy,
}

impl Toggle {
    pub const ALL: [Toggle; 4] = [
        Toggle::Soundboard,
        Toggle::Streams,
        Toggle::Activities,
        Toggle::Privacy,
    ];

    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Toggle::Soundboard => "Soundboard",
            Toggle::Streams => "Streams",
            Toggle::Activities => "Activities",
            Toggle::Privacy => "Private room",
        }
    }
}

impl RoomSettings {
    #[must_use]
    pub fn get(&self, toggle: Toggle) -> bool {
        match toggle {
            Toggle::Soundboard => self.soundboard_enabled,
            Toggle::Streams => self.streams_enabled,
            Toggle::Activities => self.activities_enabled,
            Toggle::Privacy => self.is_private,
        }
    }

    /// Copy of these settings with `toggle` flipped.
    #[must_use]
    pub fn toggled(mut self, toggle: Toggle) -> Self {
        match toggle {
            Toggle::Soundboard => self.soundboard_enabled = !self.soundboard_enabled,
            Toggle::Streams => self.streams_enabled = !self.streams_enabled,
            Toggle::Activities => self.activities_enabled = !self.activities_enabled,
            Toggle::Privacy => self.is_private = !self.is_private,
        }
        self
    }
}

/// Partial update for a session row.
///
/// `None` leaves a column untouched. For the nullable columns the inner
/// `Option` distinguishes "set to this id" from "clear".
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionPatch {
    pub live_resource_id: Option<Option<ResourceId>>,
    pub control_surface_id: Option<Option<SurfaceId>>,
    pub room_name: Option<String>,
    pub soundboard_enabled: Option<bool>,
    pub streams_enabled: Option<bool>,
    pub activities_enabled: Option<bool>,
    pub is_private: Option<bool>,
    pub retained_message_count: Option<u32>,
}

impl SessionPatch {
    /// Record a freshly created room.
    #[must_use]
    pub fn live(resource_id: ResourceId) -> Self {
        Self {
            live_resource_id: Some(Some(resource_id)),
            ..Self::default()
        }
    }

    /// Forget the room and its control surface.
    #[must_use]
    pub fn cleared() -> Self {
        Self {
            live_resource_id: Some(None),
            control_surface_id: Some(None),
            ..Self::default()
        }
    }

    /// Persist one toggle's value as the owner's default.
    #[must_use]
    pub fn toggle(toggle: Toggle, value: bool) -> Self {
        let mut patch = Self::default();
        match toggle {
            Toggle::Soundboard => patch.soundboard_enabled = Some(value),
            Toggle::Streams => patch.streams_enabled = Some(value),
            Toggle::Activities => patch.activities_enabled = Some(value),
            Toggle::Privacy => patch.is_private = Some(value),
        }
        patch
    }

    /// Apply this patch to an in-memory row.
    pub fn apply_to(&self, session: &mut TempVoiceSession) {
        if let Some(value) = self.live_resource_id {
            session.live_resource_id = value;
        }
        if let Some(value) = self.control_surface_id {
            session.control_surface_id = value;
        }
        if let Some(value) = &self.room_name {
            session.room_name.clone_from(value);
        }
        if let Some(value) = self.soundboard_enabled {
            session.soundboard_enabled = value;
        }
        if let Some(value) = self.streams_enabled {
            session.streams_enabled = value;
        }
        if let Some(value) = self.activities_enabled {
            session.activities_enabled = value;
        }
        if let Some(value) = self.is_private {
            session.is_private = value;
        }
        if let Some(value) = self.retained_message_count {
            session.retained_message_count = value;
        }
    }
}

/// A per-member exception relative to the session's ambient default.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AccessControlEntry {
    pub community_id: CommunityId,
    pub owner_id: MemberId,
    pub member_id: MemberId,
    pub has_access: bool,
}

impl AccessControlEntry {
    /// Whether this entry says nothing the mode's default doesn't already say.
    ///
    /// Public rooms are open by default, private rooms closed.
    #[must_use]
    pub fn is_redundant(&self, is_private: bool) -> bool {
        self.has_access == !is_private
    }
}

/// Consumed from the configuration subsystem; never written here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommunityTriggerConfig {
    pub community_id: CommunityId,
    /// Entering this room provisions a temp room. `None` disables the feature.
    pub trigger_resource_id: Option<ResourceId>,
    /// Category new rooms are created under.
    pub parent_id: Option<ResourceId>,
}

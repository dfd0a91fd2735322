//! Live-room table.
//!
//! Tracks every room this process created and still supervises: its owner,
//! its control surface, the panel task driving that surface and the room's
//! effective settings. Effective settings start as the session's saved
//! defaults and additionally carry room-only changes the owner declined to
//! save; every permission compile for a live room uses them.
//!
//! A room that exists on the platform but is not recorded yet (created,
//! owner still being moved or persisted) is held as a [`PendingRoom`], so an
//! empty-room notification arriving in that window can still find its owner.

use crate::models::{RoomSettings, TempVoiceSession};
use crate::observability::metrics;
use crate::surface::{self, SurfaceContent};
use common::types::{OwnerKey, ResourceId, SurfaceId};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// What the engine knows about a live room.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoomState {
    pub key: OwnerKey,
    pub surface_id: Option<SurfaceId>,
    pub name: String,
    pub settings: RoomSettings,
    pub retained_message_count: u32,
}

impl RoomState {
    /// State of a freshly created room for `session`.
    #[must_use]
    pub fn from_session(session: &TempVoiceSession) -> Self {
        Self {
            key: session.key(),
            surface_id: session.control_surface_id,
            name: session.room_name.clone(),
            settings: session.settings(),
            retained_message_count: session.retained_message_count,
        }
    }

    /// The control panel for this room.
    #[must_use]
    pub fn panel(&self) -> SurfaceContent {
        surface::control_panel(&self.name, &self.settings, self.retained_message_count)
    }
}

#[derive(Debug)]
struct LiveRoom {
    state: RoomState,
    cancel: CancellationToken,
    task: Option<JoinHandle<()>>,
}

/// A room removed from the table, with its panel task handed back for
/// shutdown.
#[derive(Debug)]
pub struct DetachedRoom {
    pub resource_id: ResourceId,
    pub state: RoomState,
    pub cancel: CancellationToken,
    pub task: Option<JoinHandle<()>>,
}

/// Table of live rooms keyed by resource.
#[derive(Debug, Default)]
pub struct LiveRooms {
    rooms: Mutex<HashMap<ResourceId, LiveRoom>>,
    pending: Mutex<HashMap<ResourceId, OwnerKey>>,
}

/// A created room whose provisioning has not finished. Dropping it forgets
/// the reservation.
#[derive(Debug)]
pub struct PendingRoom {
    rooms: Arc<LiveRooms>,
    resource_id: ResourceId,
}

impl Drop for PendingRoom {
    fn drop(&mut self) {
        self.rooms.pending().remove(&self.resource_id);
    }
}

impl LiveRooms {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Start tracking a room. `cancel` stops its panel task.
    pub fn insert(&self, resource_id: ResourceId, state: RoomState, cancel: CancellationToken) {
        let mut rooms = self.rooms();
        rooms.insert(
            resource_id,
            LiveRoom {
                state,
                cancel,
                task: None,
            },
        );
        metrics::set_rooms_active(rooms.len());
    }

    /// Attach the panel task to a tracked room. Returns `false` (and the
    /// task is aborted) if the room is no longer tracked.
    pub fn attach_task(&self, resource_id: ResourceId, task: JoinHandle<()>) -> bool {
        match self.rooms().get_mut(&resource_id) {
            Some(room) => {
                room.task = Some(task);
                true
            }
            None => {
                task.abort();
                false
            }
        }
    }

    /// Stop tracking a room.
    pub fn remove(&self, resource_id: ResourceId) -> Option<DetachedRoom> {
        let mut rooms = self.rooms();
        let room = rooms.remove(&resource_id)?;
        metrics::set_rooms_active(rooms.len());
        Some(DetachedRoom {
            resource_id,
            state: room.state,
            cancel: room.cancel,
            task: room.task,
        })
    }

    /// Stop tracking every room (shutdown).
    pub fn drain(&self) -> Vec<DetachedRoom> {
        let mut rooms = self.rooms();
        let detached = rooms
            .drain()
            .map(|(resource_id, room)| DetachedRoom {
                resource_id,
                state: room.state,
                cancel: room.cancel,
                task: room.task,
            })
            .collect();
        metrics::set_rooms_active(0);
        detached
    }

    /// Remember that `key` owns `resource_id` while provisioning finishes.
    pub fn reserve(self: &Arc<Self>, resource_id: ResourceId, key: OwnerKey) -> PendingRoom {
        self.pending().insert(resource_id, key);
        PendingRoom {
            rooms: Arc::clone(self),
            resource_id,
        }
    }

    /// Owner of a tracked or still-provisioning room.
    #[must_use]
    pub fn owner_of(&self, resource_id: ResourceId) -> Option<OwnerKey> {
        if let Some(room) = self.rooms().get(&resource_id) {
            return Some(room.state.key);
        }
        self.pending().get(&resource_id).copied()
    }

    #[must_use]
    pub fn contains(&self, resource_id: ResourceId) -> bool {
        self.rooms().contains_key(&resource_id)
    }

    #[must_use]
    pub fn get(&self, resource_id: ResourceId) -> Option<RoomState> {
        self.rooms().get(&resource_id).map(|room| room.state.clone())
    }

    /// Mutate a room's state in place, returning what `f` returns.
    pub fn update<R>(
        &self,
        resource_id: ResourceId,
        f: impl FnOnce(&mut RoomState) -> R,
    ) -> Option<R> {
        self.rooms()
            .get_mut(&resource_id)
            .map(|room| f(&mut room.state))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.rooms().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rooms().is_empty()
    }

    fn rooms(&self) -> MutexGuard<'_, HashMap<ResourceId, LiveRoom>> {
        self.rooms.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn pending(&self) -> MutexGuard<'_, HashMap<ResourceId, OwnerKey>> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::models::Toggle;
    use common::types::{CommunityId, MemberId};

    fn state() -> RoomState {
        RoomState {
            key: OwnerKey::new(CommunityId(1), MemberId(2)),
            surface_id: Some(SurfaceId(9)),
            name: "Lounge".to_string(),
            settings: RoomSettings::default(),
            retained_message_count: 0,
        }
    }

    #[test]
    fn test_insert_update_remove() {
        let rooms = LiveRooms::new();
        rooms.insert(ResourceId(5), state(), CancellationToken::new());
        assert!(rooms.contains(ResourceId(5)));

        let after = rooms
            .update(ResourceId(5), |room| {
                room.settings = room.settings.toggled(Toggle::Privacy);
                room.settings
            })
            .unwrap();
        assert!(after.is_private);
        assert!(rooms.get(ResourceId(5)).unwrap().settings.is_private);

        let detached = rooms.remove(ResourceId(5)).unwrap();
        assert_eq!(detached.state.name, "Lounge");
        assert!(rooms.is_empty());
        assert!(rooms.update(ResourceId(5), |_| ()).is_none());
    }

    #[tokio::test]
    async fn test_attach_task_to_untracked_room_aborts_it() {
        let rooms = LiveRooms::new();
        let task = tokio::spawn(std::future::pending::<()>());

        assert!(!rooms.attach_task(ResourceId(5), task));
    }

    #[test]
    fn test_drain_empties_table() {
        let rooms = LiveRooms::new();
        rooms.insert(ResourceId(5), state(), CancellationToken::new());
        rooms.insert(ResourceId(6), state(), CancellationToken::new());

        assert_eq!(rooms.drain().len(), 2);
        assert!(rooms.is_empty());
    }

    #[test]
    fn test_reservation_names_owner_until_dropped() {
        let rooms = Arc::new(LiveRooms::new());
        let key = state().key;

        let pending = rooms.reserve(ResourceId(7), key);
        assert_eq!(rooms.owner_of(ResourceId(7)), Some(key));
        assert!(!rooms.contains(ResourceId(7)));

        drop(pending);
        assert_eq!(rooms.owner_of(ResourceId(7)), None);
    }

    #[test]
    fn test_owner_of_tracked_room() {
        let rooms = LiveRooms::new();
        rooms.insert(ResourceId(5), state(), CancellationToken::new());

        assert_eq!(rooms.owner_of(ResourceId(5)), Some(state().key));
        assert_eq!(rooms.owner_of(ResourceId(6)), None);
    }

    #[test]
    fn test_panel_reflects_state() {
        let panel = state().panel();
        assert!(panel.lines.contains(&"Room: Lounge".to_string()));
    }
}

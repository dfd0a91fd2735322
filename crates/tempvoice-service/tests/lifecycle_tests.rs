//! Room lifecycle tests against the mock provider and in-memory stores.
//!
//! Covers:
//! - Provisioning, attach and the provisioning failure branches
//! - Teardown when a room empties and session destruction
//! - Orchestrator dispatch and shutdown

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::collections::BTreeMap;
use std::time::Duration;

use common::types::{MemberId, OwnerKey, ResourceId, SurfaceId};
use tempvoice_service::controllers::{
    deprovision, destroy_session, provision, ProvisionOutcome, TeardownOutcome,
};
use tempvoice_service::models::{CommunityTriggerConfig, RoomSettings, SessionDefaults};
use tempvoice_service::permissions::{self, Overwrite, Permissions, Subject};
use tempvoice_service::provider::ProviderError;
use tempvoice_service::repositories::AccessControlStore;
use tempvoice_service::{OrchestratorHandle, TempVoiceError};
use tempvoice_test_utils::*;

fn trigger() -> CommunityTriggerConfig {
    CommunityTriggerConfig {
        community_id: G1,
        trigger_resource_id: Some(TRIGGER),
        parent_id: Some(CATEGORY),
    }
}

fn key(member: MemberId) -> OwnerKey {
    OwnerKey::new(G1, member)
}

// ============================================================================
// Provisioning
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_arrival_provisions_room() {
    let harness = TestEngine::new();
    let orchestrator = OrchestratorHandle::new(harness.engine.clone());

    orchestrator.notify(arrive(U1, "Ada")).await.unwrap();
    orchestrator.wait_idle().await.unwrap();

    let session = harness.session(U1).expect("session row created");
    let room = session.live_resource_id.expect("room recorded");
    let resource = harness.provider.resource(room).unwrap();

    assert_eq!(resource.name, "Ada's Room");
    assert_eq!(resource.parent_id, Some(CATEGORY));
    assert_eq!(harness.provider.location(U1), Some(room));

    let expected: BTreeMap<_, _> = permissions::compile(&RoomSettings::default(), &[], U1)
        .iter()
        .collect();
    assert_eq!(resource.overwrites, expected);

    // Control panel posted in the room and recorded
    let surface_id = session.control_surface_id.expect("control surface recorded");
    let surface = harness.provider.surface(surface_id).unwrap();
    assert_eq!(surface.channel_id, room);
    assert_eq!(surface.content.title, "Room controls");

    // Trigger locked for the owner while the room exists
    assert_eq!(
        harness.provider.overwrites(TRIGGER).get(&Subject::Member(U1)),
        Some(&Overwrite::deny(Permissions::CONNECT))
    );
    assert!(harness.engine.rooms.contains(room));
}

#[tokio::test(start_paused = true)]
async fn test_concurrent_arrivals_create_one_room() {
    let harness = TestEngine::with_provider(
        MockProvider::new().with_create_delay(Duration::from_millis(50)),
    );
    let orchestrator = OrchestratorHandle::new(harness.engine.clone());

    for _ in 0..5 {
        orchestrator.notify(arrive(U1, "Ada")).await.unwrap();
    }
    orchestrator.wait_idle().await.unwrap();

    assert_eq!(harness.provider.count(MockOp::CreateResource), 1);
    assert_eq!(harness.sessions.len(), 1);
    assert_eq!(harness.provider.location(U1), harness.live_room(U1));
    assert_eq!(harness.engine.rooms.len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_new_room_uses_saved_defaults() {
    let harness = TestEngine::new();
    let mut saved = new_session(key(U1), &SessionDefaults::default());
    saved.room_name = "Den".to_string();
    saved.streams_enabled = false;
    saved.is_private = true;
    harness.sessions.insert(saved.clone());

    let outcome = provision(&harness.engine, &trigger(), U1, "Ada").await.unwrap();
    let ProvisionOutcome::Created(room) = outcome else {
        unreachable!("expected a new room, got {outcome:?}");
    };

    let resource = harness.provider.resource(room).unwrap();
    assert_eq!(resource.name, "Den");
    let expected: BTreeMap<_, _> = permissions::compile(&saved.settings(), &[], U1)
        .iter()
        .collect();
    assert_eq!(resource.overwrites, expected);
}

#[tokio::test(start_paused = true)]
async fn test_second_arrival_attaches_to_existing_room() {
    let harness = TestEngine::new();

    let first = provision(&harness.engine, &trigger(), U1, "Ada").await.unwrap();
    let ProvisionOutcome::Created(room) = first else {
        unreachable!("expected a new room, got {first:?}");
    };
    let second = provision(&harness.engine, &trigger(), U1, "Ada").await.unwrap();

    assert_eq!(second, ProvisionOutcome::Attached(room));
    assert_eq!(harness.provider.count(MockOp::CreateResource), 1);
}

#[tokio::test(start_paused = true)]
async fn test_untracked_live_room_is_adopted() {
    let harness = TestEngine::new();
    let old_room = ResourceId(777);
    harness.provider.add_resource(old_room, G1, "Den");
    let mut saved = new_session(key(U1), &SessionDefaults::default());
    saved.live_resource_id = Some(old_room);
    harness.sessions.insert(saved);

    let outcome = provision(&harness.engine, &trigger(), U1, "Ada").await.unwrap();

    assert_eq!(outcome, ProvisionOutcome::Attached(old_room));
    assert!(harness.engine.rooms.contains(old_room));
    assert_eq!(harness.provider.count(MockOp::CreateResource), 0);
}

#[tokio::test(start_paused = true)]
async fn test_stale_live_room_is_replaced() {
    let harness = TestEngine::new();
    let mut saved = new_session(key(U1), &SessionDefaults::default());
    saved.live_resource_id = Some(ResourceId(777));
    saved.control_surface_id = Some(SurfaceId(778));
    harness.sessions.insert(saved);

    let outcome = provision(&harness.engine, &trigger(), U1, "Ada").await.unwrap();

    let ProvisionOutcome::Created(room) = outcome else {
        unreachable!("expected a new room, got {outcome:?}");
    };
    assert_ne!(room, ResourceId(777));
    assert_eq!(harness.live_room(U1), Some(room));
}

#[tokio::test(start_paused = true)]
async fn test_create_failure_persists_nothing() {
    let harness = TestEngine::new();
    harness.provider.fail_next(
        MockOp::CreateResource,
        ProviderError::Rejected("channel limit".to_string()),
    );

    let result = provision(&harness.engine, &trigger(), U1, "Ada").await;

    assert!(matches!(result, Err(TempVoiceError::ResourceCreationFailed(_))));
    assert_eq!(harness.live_room(U1), None);
    assert_eq!(harness.provider.resource_ids(), vec![TRIGGER]);
    assert!(!harness.engine.claims.is_claimed(key(U1)));
}

#[tokio::test(start_paused = true)]
async fn test_owner_gone_before_move_discards_room() {
    let harness = TestEngine::new();
    harness.provider.member_gone(U1);

    let outcome = provision(&harness.engine, &trigger(), U1, "Ada").await.unwrap();

    assert_eq!(outcome, ProvisionOutcome::MemberGone);
    assert_eq!(harness.provider.count(MockOp::CreateResource), 1);
    assert_eq!(harness.provider.count(MockOp::DeleteResource), 1);
    assert_eq!(harness.provider.resource_ids(), vec![TRIGGER]);
    assert_eq!(harness.live_room(U1), None);
    assert!(harness.engine.rooms.is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_persist_failure_deletes_room() {
    let harness = TestEngine::new();
    harness.sessions.fail_next_updates(1);

    let result = provision(&harness.engine, &trigger(), U1, "Ada").await;

    assert!(matches!(result, Err(TempVoiceError::Database(_))));
    assert_eq!(harness.provider.resource_ids(), vec![TRIGGER]);
    assert_eq!(harness.live_room(U1), None);
    assert!(harness.engine.rooms.is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_control_surface_failure_keeps_room() {
    let harness = TestEngine::new();
    harness.provider.fail_next(
        MockOp::SendSurface,
        ProviderError::Transport("timeout".to_string()),
    );

    let outcome = provision(&harness.engine, &trigger(), U1, "Ada").await.unwrap();

    let ProvisionOutcome::Created(room) = outcome else {
        unreachable!("expected a new room, got {outcome:?}");
    };
    let session = harness.session(U1).unwrap();
    assert_eq!(session.live_resource_id, Some(room));
    assert_eq!(session.control_surface_id, None);
    assert!(harness.engine.rooms.contains(room));
}

#[tokio::test(start_paused = true)]
async fn test_trigger_lock_can_be_disabled() {
    let harness = TestEngine::with_config(test_config_with(&[(
        "TEMPVOICE_LOCK_TRIGGER_WHILE_OPEN",
        "false",
    )]));

    provision(&harness.engine, &trigger(), U1, "Ada").await.unwrap();

    assert!(harness.provider.overwrites(TRIGGER).is_empty());
}

// ============================================================================
// Deprovisioning
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_empty_room_is_torn_down() {
    let harness = TestEngine::new();
    let orchestrator = OrchestratorHandle::new(harness.engine.clone());
    orchestrator.notify(arrive(U1, "Ada")).await.unwrap();
    orchestrator.wait_idle().await.unwrap();
    let room = harness.live_room(U1).unwrap();

    orchestrator.notify(leave(U1, room, 0)).await.unwrap();
    orchestrator.wait_idle().await.unwrap();

    assert!(harness.provider.resource(room).is_none());
    let session = harness.session(U1).expect("session outlives the room");
    assert_eq!(session.live_resource_id, None);
    assert_eq!(session.control_surface_id, None);
    assert!(harness.engine.rooms.is_empty());
    assert!(harness.engine.dialogs.is_empty());
    // Trigger unlocked again
    assert!(harness.provider.overwrites(TRIGGER).is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_redelivered_empty_room_notice_is_noop() {
    let harness = TestEngine::new();
    let orchestrator = OrchestratorHandle::new(harness.engine.clone());
    orchestrator.notify(arrive(U1, "Ada")).await.unwrap();
    orchestrator.wait_idle().await.unwrap();
    let room = harness.live_room(U1).unwrap();

    orchestrator.notify(leave(U1, room, 0)).await.unwrap();
    orchestrator.wait_idle().await.unwrap();
    let after_teardown = harness.session(U1).unwrap();

    orchestrator.notify(leave(U1, room, 0)).await.unwrap();
    orchestrator.wait_idle().await.unwrap();

    assert_eq!(harness.provider.count(MockOp::DeleteResource), 1);
    assert_eq!(harness.provider.count(MockOp::RemoveOverwrite), 1);
    assert_eq!(harness.session(U1), Some(after_teardown));
}

#[tokio::test(start_paused = true)]
async fn test_room_emptied_before_it_is_recorded_is_torn_down() {
    let harness = TestEngine::new();
    harness.sessions.delay_live_updates(Duration::from_millis(50));

    let engine = harness.engine.clone();
    let provisioning =
        tokio::spawn(async move { provision(&engine, &trigger(), U1, "Ada").await });

    // Owner is in the room, its id not yet persisted
    let room = harness
        .provider
        .wait_for(|state| {
            state.calls.iter().find_map(|call| match call {
                ProviderCall::MoveMember { resource_id, .. } => Some(*resource_id),
                _ => None,
            })
        })
        .await;
    assert_eq!(harness.live_room(U1), None);

    let outcome = deprovision(&harness.engine, room).await.unwrap();

    assert_eq!(
        provisioning.await.unwrap().unwrap(),
        ProvisionOutcome::Created(room)
    );
    assert_eq!(outcome, TeardownOutcome::TornDown);
    assert!(harness.provider.resource(room).is_none());
    assert_eq!(harness.live_room(U1), None);
    assert!(harness.engine.rooms.is_empty());
    assert!(harness.provider.overwrites(TRIGGER).is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_occupied_room_stays() {
    let harness = TestEngine::new();
    let orchestrator = OrchestratorHandle::new(harness.engine.clone());
    orchestrator.notify(arrive(U1, "Ada")).await.unwrap();
    orchestrator.wait_idle().await.unwrap();
    let room = harness.live_room(U1).unwrap();

    orchestrator.notify(leave(U1, room, 2)).await.unwrap();
    orchestrator.wait_idle().await.unwrap();

    assert!(harness.provider.resource(room).is_some());
    assert_eq!(harness.live_room(U1), Some(room));
}

#[tokio::test(start_paused = true)]
async fn test_rearrival_after_teardown_creates_fresh_room() {
    let harness = TestEngine::new();

    let first = provision(&harness.engine, &trigger(), U1, "Ada").await.unwrap();
    let ProvisionOutcome::Created(room) = first else {
        unreachable!("expected a new room, got {first:?}");
    };
    assert_eq!(
        deprovision(&harness.engine, room).await.unwrap(),
        TeardownOutcome::TornDown
    );

    let second = provision(&harness.engine, &trigger(), U1, "Ada").await.unwrap();

    assert!(matches!(second, ProvisionOutcome::Created(new_room) if new_room != room));
    assert_eq!(harness.sessions.len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_teardown_of_unknown_room_is_noop() {
    let harness = TestEngine::new();

    let outcome = deprovision(&harness.engine, ResourceId(999)).await.unwrap();

    assert_eq!(outcome, TeardownOutcome::NotTracked);
    assert_eq!(harness.provider.count(MockOp::DeleteResource), 0);
}

#[tokio::test(start_paused = true)]
async fn test_failed_delete_keeps_session_live() {
    let harness = TestEngine::new();
    let outcome = provision(&harness.engine, &trigger(), U1, "Ada").await.unwrap();
    let ProvisionOutcome::Created(room) = outcome else {
        unreachable!("expected a new room, got {outcome:?}");
    };
    harness.provider.fail_next(
        MockOp::DeleteResource,
        ProviderError::Transport("timeout".to_string()),
    );

    assert!(deprovision(&harness.engine, room).await.is_err());
    assert_eq!(harness.live_room(U1), Some(room));

    // A retry finishes the job
    assert_eq!(
        deprovision(&harness.engine, room).await.unwrap(),
        TeardownOutcome::TornDown
    );
    assert_eq!(harness.live_room(U1), None);
}

#[tokio::test(start_paused = true)]
async fn test_member_removed_destroys_session() {
    let harness = TestEngine::new();
    let orchestrator = OrchestratorHandle::new(harness.engine.clone());
    orchestrator.notify(arrive(U1, "Ada")).await.unwrap();
    orchestrator.wait_idle().await.unwrap();
    let room = harness.live_room(U1).unwrap();
    harness.access.upsert(key(U1), U2, false).await.unwrap();

    orchestrator.notify(member_removed(U1)).await.unwrap();
    orchestrator.wait_idle().await.unwrap();

    assert!(harness.provider.resource(room).is_none());
    assert!(harness.session(U1).is_none());
    assert!(harness.access.entries(key(U1)).is_empty());
    assert!(harness.engine.rooms.is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_destroy_without_session_is_noop() {
    let harness = TestEngine::new();

    assert!(!destroy_session(&harness.engine, key(U2)).await.unwrap());
}

// ============================================================================
// Orchestrator
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_arrival_in_other_room_is_ignored() {
    let harness = TestEngine::new();
    let orchestrator = OrchestratorHandle::new(harness.engine.clone());

    let mut elsewhere = arrive(U1, "Ada");
    if let tempvoice_service::Notification::LocationChanged(change) = &mut elsewhere {
        change.joined = Some(ResourceId(12));
    }
    orchestrator.notify(elsewhere).await.unwrap();
    orchestrator.wait_idle().await.unwrap();

    assert_eq!(harness.provider.count(MockOp::CreateResource), 0);
    assert_eq!(harness.sessions.len(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_status_reports_live_rooms() {
    let harness = TestEngine::new();
    let orchestrator = OrchestratorHandle::new(harness.engine.clone());
    orchestrator.notify(arrive(U1, "Ada")).await.unwrap();
    orchestrator.notify(arrive(U2, "Grace")).await.unwrap();
    orchestrator.wait_idle().await.unwrap();

    let status = orchestrator.status().await.unwrap();

    assert_eq!(status.live_rooms, 2);
    assert_eq!(status.in_flight, 0);
    assert!(status.accepting);
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_stops_panels_and_intake() {
    let harness = TestEngine::new();
    let orchestrator = OrchestratorHandle::new(harness.engine.clone());
    orchestrator.notify(arrive(U1, "Ada")).await.unwrap();
    orchestrator.wait_idle().await.unwrap();
    let room = harness.live_room(U1).unwrap();

    let report = orchestrator.shutdown().await.unwrap();

    assert_eq!(report.rooms_stopped, 1);
    assert_eq!(report.tasks_aborted, 0);
    assert!(orchestrator.is_cancelled());
    assert!(harness.engine.rooms.is_empty());
    // Rooms survive shutdown; the session still names them for the next start
    assert!(harness.provider.resource(room).is_some());
    assert_eq!(harness.live_room(U1), Some(room));

    // The actor is gone
    assert!(orchestrator.notify(arrive(U2, "Grace")).await.is_err());
}

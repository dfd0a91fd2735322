//! Control panel and owner dialog tests.
//!
//! Runs on a paused clock so dialog deadlines elapse instantly once every
//! task is waiting. Verifies:
//! - Toggles push exactly the compiled overwrites and offer "save as default"
//! - Rename and retained-message text prompts, including invalid input
//! - Whitelist / blacklist editing
//! - Expiry disables surfaces and later clicks are answered as stale
//! - Non-owners are turned away without consuming the dialog

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::collections::BTreeMap;
use std::time::Duration;

use common::types::{OwnerKey, ResourceId, SurfaceId};
use tempvoice_service::controllers::{deprovision, provision, ProvisionOutcome, TeardownOutcome};
use tempvoice_service::models::CommunityTriggerConfig;
use tempvoice_service::permissions::{self, Overwrite, Permissions, Subject};
use tempvoice_service::provider::ProviderError;
use tempvoice_service::repositories::AccessControlStore;
use tempvoice_service::surface::{ActionKind, ComponentId};
use tempvoice_service::{Notification, OrchestratorHandle, TempVoiceError};
use tempvoice_test_utils::*;

const SAVE_PROMPT: &str = "Save as default?";
const MEMBER_PICKER: &str = "Edit access";

fn push_failure() -> ProviderError {
    ProviderError::Transport("timeout".to_string())
}

fn owner_key() -> OwnerKey {
    OwnerKey::new(G1, U1)
}

/// Provision U1's room and return it with its control panel.
async fn live_room(harness: &TestEngine) -> (ResourceId, SurfaceId) {
    let trigger = CommunityTriggerConfig {
        community_id: G1,
        trigger_resource_id: Some(TRIGGER),
        parent_id: Some(CATEGORY),
    };
    let outcome = provision(&harness.engine, &trigger, U1, "Ada").await.unwrap();
    let ProvisionOutcome::Created(room) = outcome else {
        unreachable!("expected a new room, got {outcome:?}");
    };
    let panel = harness.session(U1).unwrap().control_surface_id.unwrap();
    (room, panel)
}

/// Wait until the panel shows `line`, i.e. the flow that changed it is done.
async fn wait_for_panel_line(provider: &MockProvider, panel: SurfaceId, line: &str) {
    provider
        .wait_for(|state| {
            state
                .surfaces
                .get(&panel)
                .filter(|s| s.content.lines.iter().any(|l| l == line))
                .map(|_| ())
        })
        .await;
}

async fn wait_until_disabled(provider: &MockProvider, surface_id: SurfaceId) {
    provider
        .wait_for(|state| {
            state
                .surfaces
                .get(&surface_id)
                .filter(|s| !s.content.has_enabled_components())
                .map(|_| ())
        })
        .await;
}

/// What the room's overwrites must be for its current settings and list.
async fn compiled(harness: &TestEngine, room: ResourceId) -> BTreeMap<Subject, Overwrite> {
    let settings = harness.engine.rooms.get(room).unwrap().settings;
    let acl = harness.access.list_for_owner(owner_key()).await.unwrap();
    permissions::compile(&settings, &acl, U1).iter().collect()
}

// ============================================================================
// Toggles
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_toggle_for_this_room_only() {
    let harness = TestEngine::new();
    let provider = &harness.provider;
    let (room, panel) = live_room(&harness).await;

    provider.click(panel, U1, ComponentId::Action(ActionKind::ToggleSoundboard));
    let prompt = provider.wait_for_prompt(SAVE_PROMPT).await;

    // Pushed before the owner is asked
    let ambient = *provider.overwrites(room).get(&Subject::Ambient).unwrap();
    assert!(ambient.deny.contains(Permissions::USE_SOUNDBOARD));
    assert!(!ambient.allow.contains(Permissions::USE_SOUNDBOARD));

    provider.click(prompt, U1, ComponentId::Confirm(false));
    wait_for_panel_line(provider, panel, "Soundboard: off").await;

    assert!(provider.surface(prompt).unwrap().deleted);
    assert!(harness.session(U1).unwrap().soundboard_enabled);
    assert_eq!(provider.overwrites(room), compiled(&harness, room).await);
}

#[tokio::test(start_paused = true)]
async fn test_toggle_saved_as_default() {
    let harness = TestEngine::new();
    let provider = &harness.provider;
    let (room, panel) = live_room(&harness).await;

    provider.click(panel, U1, ComponentId::Action(ActionKind::ToggleStreams));
    let prompt = provider.wait_for_prompt(SAVE_PROMPT).await;
    provider.click(prompt, U1, ComponentId::Confirm(true));
    wait_for_panel_line(provider, panel, "Streams: off").await;

    assert!(!harness.session(U1).unwrap().streams_enabled);
    assert_eq!(provider.overwrites(room), compiled(&harness, room).await);
}

#[tokio::test(start_paused = true)]
async fn test_toggle_pushes_only_the_difference() {
    let harness = TestEngine::new();
    let provider = &harness.provider;
    let (room, panel) = live_room(&harness).await;
    let before = provider.count(MockOp::SetOverwrite);

    provider.click(panel, U1, ComponentId::Action(ActionKind::ToggleActivities));
    let prompt = provider.wait_for_prompt(SAVE_PROMPT).await;
    provider.click(prompt, U1, ComponentId::Confirm(false));
    wait_for_panel_line(provider, panel, "Activities: off").await;

    // Only the ambient subject changed
    assert_eq!(provider.count(MockOp::SetOverwrite), before + 1);
    assert_eq!(provider.count(MockOp::RemoveOverwrite), 0);
    assert_eq!(provider.overwrites(room), compiled(&harness, room).await);
}

#[tokio::test(start_paused = true)]
async fn test_failed_toggle_push_keeps_room_state() {
    let harness = TestEngine::new();
    let provider = &harness.provider;
    let (room, panel) = live_room(&harness).await;
    let before = provider.overwrites(room);
    provider.fail_next(MockOp::SetOverwrite, push_failure());

    let toggle = provider.click(panel, U1, ComponentId::Action(ActionKind::ToggleSoundboard));

    assert_eq!(
        provider.wait_for_reply(toggle).await,
        TempVoiceError::from(push_failure()).client_message()
    );
    assert!(harness.engine.rooms.get(room).unwrap().settings.soundboard_enabled);
    assert_eq!(provider.overwrites(room), before);

    // The next toggle starts from what the room really has
    provider.click(panel, U1, ComponentId::Action(ActionKind::ToggleSoundboard));
    let prompt = provider.wait_for_prompt(SAVE_PROMPT).await;
    provider.click(prompt, U1, ComponentId::Confirm(false));
    wait_for_panel_line(provider, panel, "Soundboard: off").await;

    let ambient = *provider.overwrites(room).get(&Subject::Ambient).unwrap();
    assert!(ambient.deny.contains(Permissions::USE_SOUNDBOARD));
    assert_eq!(provider.overwrites(room), compiled(&harness, room).await);
}

#[tokio::test(start_paused = true)]
async fn test_unanswered_prompt_expires() {
    let harness = TestEngine::new();
    let provider = &harness.provider;
    let (room, panel) = live_room(&harness).await;
    let started = tokio::time::Instant::now();

    provider.click(panel, U1, ComponentId::Action(ActionKind::ToggleStreams));
    let prompt = provider.wait_for_prompt(SAVE_PROMPT).await;
    wait_until_disabled(provider, prompt).await;

    assert!(started.elapsed() >= Duration::from_secs(60));
    let expired = provider.surface(prompt).unwrap();
    assert!(!expired.deleted);
    assert!(expired.content.components.iter().all(|c| c.disabled));

    // The room keeps the change, the default does not
    wait_for_panel_line(provider, panel, "Streams: off").await;
    assert!(harness.session(U1).unwrap().streams_enabled);
    assert_eq!(provider.overwrites(room), compiled(&harness, room).await);

    // A click on the dead prompt reaches the orchestrator and is answered as stale
    let orchestrator = OrchestratorHandle::new(harness.engine.clone());
    let stale = provider.interaction(prompt, U1, ComponentId::Confirm(true));
    let stale_id = stale.id;
    orchestrator
        .notify(Notification::Interaction(stale))
        .await
        .unwrap();
    orchestrator.wait_idle().await.unwrap();

    assert_eq!(
        provider.replies_to(stale_id),
        vec![TempVoiceError::DialogExpired.client_message()]
    );
    assert!(harness.session(U1).unwrap().streams_enabled);
}

// ============================================================================
// Ownership
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_non_owner_panel_click_is_rejected() {
    let harness = TestEngine::new();
    let provider = &harness.provider;
    let (room, panel) = live_room(&harness).await;
    let before = provider.overwrites(room);

    let intruder = provider.click(panel, U3, ComponentId::Action(ActionKind::TogglePrivacy));
    let reply = provider.wait_for_reply(intruder).await;

    assert_eq!(reply, TempVoiceError::Unauthorized.client_message());
    assert_eq!(provider.overwrites(room), before);

    // The panel is still collecting for the owner
    provider.click(panel, U1, ComponentId::Action(ActionKind::TogglePrivacy));
    let prompt = provider.wait_for_prompt(SAVE_PROMPT).await;
    provider.click(prompt, U1, ComponentId::Confirm(false));
    wait_for_panel_line(provider, panel, "Private room: on").await;
}

#[tokio::test(start_paused = true)]
async fn test_non_owner_click_does_not_extend_prompt() {
    let harness = TestEngine::new();
    let provider = &harness.provider;
    let (_room, panel) = live_room(&harness).await;

    provider.click(panel, U1, ComponentId::Action(ActionKind::ToggleStreams));
    let prompt = provider.wait_for_prompt(SAVE_PROMPT).await;
    let shown = tokio::time::Instant::now();

    tokio::time::sleep(Duration::from_secs(30)).await;
    let intruder = provider.click(prompt, U3, ComponentId::Confirm(true));
    assert_eq!(
        provider.wait_for_reply(intruder).await,
        TempVoiceError::Unauthorized.client_message()
    );

    wait_until_disabled(provider, prompt).await;
    let lifetime = shown.elapsed();
    assert!(lifetime >= Duration::from_secs(60));
    assert!(lifetime < Duration::from_secs(90));
    assert!(harness.session(U1).unwrap().streams_enabled);
}

#[tokio::test(start_paused = true)]
async fn test_non_owner_rejected_during_rename() {
    let harness = TestEngine::new();
    let provider = &harness.provider;
    let (room, panel) = live_room(&harness).await;

    let rename = provider.click(panel, U1, ComponentId::Action(ActionKind::Rename));
    provider.say(room, U1, "Den");
    let prompt = provider.wait_for_prompt(SAVE_PROMPT).await;

    let intruder = provider.click(prompt, U3, ComponentId::Confirm(true));
    provider.click(prompt, U1, ComponentId::Confirm(false));
    wait_for_panel_line(provider, panel, "Room: Den").await;

    assert_eq!(
        provider.replies_to(intruder),
        vec![TempVoiceError::Unauthorized.client_message()]
    );
    assert_eq!(provider.replies_to(rename).len(), 1);
    assert_eq!(provider.resource(room).unwrap().name, "Den");
    assert_eq!(harness.session(U1).unwrap().room_name, "Ada's Room");
}

// ============================================================================
// Text prompts
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_invalid_name_is_retried() {
    let harness = TestEngine::new();
    let provider = &harness.provider;
    let (room, panel) = live_room(&harness).await;

    let rename = provider.click(panel, U1, ComponentId::Action(ActionKind::Rename));
    provider.say(room, U1, "   ");
    provider.say(room, U1, &"x".repeat(101));
    provider.say(room, U1, "Lounge");
    let prompt = provider.wait_for_prompt(SAVE_PROMPT).await;
    provider.click(prompt, U1, ComponentId::Confirm(true));
    wait_for_panel_line(provider, panel, "Room: Lounge").await;

    let replies = provider.replies_to(rename);
    assert_eq!(replies.len(), 3);
    assert_eq!(
        replies.get(1).map(String::as_str),
        Some("The room name cannot be empty")
    );
    assert_eq!(harness.session(U1).unwrap().room_name, "Lounge");
    assert_eq!(provider.resource(room).unwrap().name, "Lounge");
}

#[tokio::test(start_paused = true)]
async fn test_rename_gives_up_after_retries() {
    let harness = TestEngine::new();
    let provider = &harness.provider;
    let (room, panel) = live_room(&harness).await;

    let rename = provider.click(panel, U1, ComponentId::Action(ActionKind::Rename));
    for _ in 0..3 {
        provider.say(room, U1, "");
    }
    // Next click only runs once the failed flow has returned
    provider.click(panel, U1, ComponentId::Action(ActionKind::ToggleSoundboard));
    provider.wait_for_prompt(SAVE_PROMPT).await;

    // Prompt, two retry hints, then the final validation error
    assert_eq!(provider.replies_to(rename).len(), 4);
    assert_eq!(provider.count(MockOp::RenameResource), 0);
}

#[tokio::test(start_paused = true)]
async fn test_retained_messages_persist_directly() {
    let harness = TestEngine::new();
    let provider = &harness.provider;
    let (room, panel) = live_room(&harness).await;

    let click = provider.click(panel, U1, ComponentId::Action(ActionKind::SetRetainedMessages));
    provider.say(room, U1, "ten");
    provider.say(room, U1, "12");
    wait_for_panel_line(provider, panel, "Retained messages: 12").await;

    assert_eq!(harness.session(U1).unwrap().retained_message_count, 12);
    let replies = provider.replies_to(click);
    assert_eq!(
        replies.last().map(String::as_str),
        Some("This room now keeps the last 12 messages.")
    );
    // No save prompt for this one
    assert_eq!(provider.count(MockOp::SendSurface), 1);
}

// ============================================================================
// Access lists
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_private_room_whitelist() {
    let harness = TestEngine::new();
    let provider = &harness.provider;
    let (room, panel) = live_room(&harness).await;

    provider.click(panel, U1, ComponentId::Action(ActionKind::TogglePrivacy));
    let prompt = provider.wait_for_prompt(SAVE_PROMPT).await;
    provider.click(prompt, U1, ComponentId::Confirm(false));
    wait_for_panel_line(provider, panel, "Private room: on").await;

    // Owner and duplicates in the selection are ignored
    let edit = provider.click(panel, U1, ComponentId::Action(ActionKind::EditAccess));
    let picker = provider.wait_for_prompt(MEMBER_PICKER).await;
    provider.select_members(picker, U1, vec![U2, U1, U2]);

    assert_eq!(
        provider.wait_for_reply(edit).await,
        "Updated the whitelist: 1 added, 0 removed."
    );
    assert_eq!(
        harness.access.entries(owner_key()),
        BTreeMap::from([(U2, true)])
    );
    let overwrites = provider.overwrites(room);
    assert_eq!(
        overwrites.get(&Subject::Member(U2)),
        Some(&Overwrite::allow(Permissions::ENTRY))
    );
    assert_eq!(overwrites, compiled(&harness, room).await);

    // Selecting a listed member again removes them
    let edit = provider.click(panel, U1, ComponentId::Action(ActionKind::EditAccess));
    let picker = provider.wait_for_prompt(MEMBER_PICKER).await;
    provider.select_members(picker, U1, vec![U2]);

    assert_eq!(
        provider.wait_for_reply(edit).await,
        "Updated the whitelist: 0 added, 1 removed."
    );
    assert!(harness.access.entries(owner_key()).is_empty());
    let overwrites = provider.overwrites(room);
    assert!(!overwrites.contains_key(&Subject::Member(U2)));
    assert_eq!(overwrites, compiled(&harness, room).await);
}

#[tokio::test(start_paused = true)]
async fn test_public_room_blacklist() {
    let harness = TestEngine::new();
    let provider = &harness.provider;
    let (room, panel) = live_room(&harness).await;

    let edit = provider.click(panel, U1, ComponentId::Action(ActionKind::EditAccess));
    let picker = provider.wait_for_prompt(MEMBER_PICKER).await;
    provider.select_members(picker, U1, vec![U2, U3]);

    assert_eq!(
        provider.wait_for_reply(edit).await,
        "Updated the blacklist: 2 added, 0 removed."
    );
    assert_eq!(
        harness.access.entries(owner_key()),
        BTreeMap::from([(U2, false), (U3, false)])
    );
    assert_eq!(
        provider.overwrites(room).get(&Subject::Member(U3)),
        Some(&Overwrite::deny(Permissions::ENTRY))
    );
}

#[tokio::test(start_paused = true)]
async fn test_failed_access_push_stores_nothing() {
    let harness = TestEngine::new();
    let provider = &harness.provider;
    let (room, panel) = live_room(&harness).await;
    let before = provider.overwrites(room);

    let edit = provider.click(panel, U1, ComponentId::Action(ActionKind::EditAccess));
    let picker = provider.wait_for_prompt(MEMBER_PICKER).await;
    provider.fail_next(MockOp::SetOverwrite, push_failure());
    provider.select_members(picker, U1, vec![U2]);

    assert_eq!(
        provider.wait_for_reply(edit).await,
        TempVoiceError::from(push_failure()).client_message()
    );
    assert!(harness.access.entries(owner_key()).is_empty());
    assert_eq!(provider.overwrites(room), before);

    // Retrying applies the same edit cleanly
    let edit = provider.click(panel, U1, ComponentId::Action(ActionKind::EditAccess));
    let picker = provider.wait_for_prompt(MEMBER_PICKER).await;
    provider.select_members(picker, U1, vec![U2]);

    assert_eq!(
        provider.wait_for_reply(edit).await,
        "Updated the blacklist: 1 added, 0 removed."
    );
    assert_eq!(
        harness.access.entries(owner_key()),
        BTreeMap::from([(U2, false)])
    );
    assert_eq!(provider.overwrites(room), compiled(&harness, room).await);
}

#[tokio::test(start_paused = true)]
async fn test_member_picker_expires() {
    let harness = TestEngine::new();
    let provider = &harness.provider;
    let (_room, panel) = live_room(&harness).await;
    let started = tokio::time::Instant::now();

    let edit = provider.click(panel, U1, ComponentId::Action(ActionKind::EditAccess));
    let picker = provider.wait_for_prompt(MEMBER_PICKER).await;

    assert_eq!(
        provider.wait_for_reply(edit).await,
        TempVoiceError::DialogExpired.client_message()
    );
    assert!(started.elapsed() >= Duration::from_secs(120));
    assert!(!provider.surface(picker).unwrap().content.has_enabled_components());
    assert!(harness.access.entries(owner_key()).is_empty());
}

// ============================================================================
// Lifetimes
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_teardown_retires_open_prompt() {
    let harness = TestEngine::new();
    let provider = &harness.provider;
    let (room, panel) = live_room(&harness).await;

    provider.click(panel, U1, ComponentId::Action(ActionKind::ToggleSoundboard));
    provider.wait_for_prompt(SAVE_PROMPT).await;

    let outcome = deprovision(&harness.engine, room).await.unwrap();

    assert_eq!(outcome, TeardownOutcome::TornDown);
    assert!(harness.engine.dialogs.is_empty());
    assert!(harness.engine.rooms.is_empty());
    assert!(provider.resource(room).is_none());
    assert!(harness.session(U1).unwrap().soundboard_enabled);
}

#[tokio::test(start_paused = true)]
async fn test_panel_expires_after_its_lifetime() {
    let harness = TestEngine::with_config(test_config_with(&[(
        "TEMPVOICE_PANEL_TIMEOUT_SECONDS",
        "300",
    )]));
    let provider = &harness.provider;
    let (room, panel) = live_room(&harness).await;
    let started = tokio::time::Instant::now();

    wait_until_disabled(provider, panel).await;

    assert!(started.elapsed() >= Duration::from_secs(300));
    // The room itself lives on until it empties
    assert!(provider.resource(room).is_some());
    assert_eq!(harness.live_room(U1), Some(room));
}

//! Pre-configured test data fixtures for Temp Voice testing.
//!
//! Provides:
//! - Well-known ids for one community with a trigger room
//! - Test configuration built through `Config::from_vars`
//! - [`TestEngine`], an engine wired to the mock provider and in-memory stores
//! - Builders for the notifications the orchestrator consumes

use crate::memory_store::{InMemoryAccessControlStore, InMemorySessionStore, StaticTriggerConfig};
use crate::mock_provider::MockProvider;
use common::types::{CommunityId, MemberId, OwnerKey, ResourceId};
use std::collections::HashMap;
use std::sync::Arc;
use tempvoice_service::config::Config;
use tempvoice_service::models::TempVoiceSession;
use tempvoice_service::orchestrator::{LocationChange, Notification};
use tempvoice_service::EngineContext;

/// The test community.
pub const G1: CommunityId = CommunityId(1);

/// Room owners and bystanders.
pub const U1: MemberId = MemberId(101);
pub const U2: MemberId = MemberId(102);
pub const U3: MemberId = MemberId(103);

/// Entering this room provisions a temp room.
pub const TRIGGER: ResourceId = ResourceId(500);

/// Category new rooms are created under.
pub const CATEGORY: ResourceId = ResourceId(400);

/// Configuration with defaults and a placeholder database URL.
#[must_use]
pub fn test_config() -> Config {
    test_config_with(&[])
}

/// Configuration with `overrides` applied on top of the defaults.
#[must_use]
pub fn test_config_with(overrides: &[(&str, &str)]) -> Config {
    let mut vars = HashMap::from([(
        "DATABASE_URL".to_string(),
        "postgresql://localhost/tempvoice_test".to_string(),
    )]);
    for (name, value) in overrides {
        vars.insert((*name).to_string(), (*value).to_string());
    }
    Config::from_vars(&vars).expect("test configuration should be valid")
}

/// An engine over the mock provider and in-memory stores, with [`TRIGGER`]
/// configured as [`G1`]'s trigger room.
pub struct TestEngine {
    pub engine: EngineContext,
    pub provider: Arc<MockProvider>,
    pub sessions: Arc<InMemorySessionStore>,
    pub access: Arc<InMemoryAccessControlStore>,
    pub triggers: Arc<StaticTriggerConfig>,
}

impl Default for TestEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl TestEngine {
    #[must_use]
    pub fn new() -> Self {
        Self::build(test_config(), MockProvider::new())
    }

    #[must_use]
    pub fn with_config(config: Config) -> Self {
        Self::build(config, MockProvider::new())
    }

    #[must_use]
    pub fn with_provider(provider: MockProvider) -> Self {
        Self::build(test_config(), provider)
    }

    #[must_use]
    pub fn build(config: Config, provider: MockProvider) -> Self {
        provider.add_resource(TRIGGER, G1, "Join to create");

        let provider = Arc::new(provider);
        let sessions = Arc::new(InMemorySessionStore::new());
        let access = Arc::new(InMemoryAccessControlStore::new());
        let triggers = Arc::new(StaticTriggerConfig::new().with_trigger(G1, TRIGGER, Some(CATEGORY)));

        let engine = EngineContext::new(
            config,
            provider.clone(),
            sessions.clone(),
            access.clone(),
            triggers.clone(),
        );

        Self {
            engine,
            provider,
            sessions,
            access,
            triggers,
        }
    }

    /// Session of `member` in [`G1`].
    #[must_use]
    pub fn session(&self, member_id: MemberId) -> Option<TempVoiceSession> {
        self.sessions.row(OwnerKey::new(G1, member_id))
    }

    /// The room `member` owns right now, per the session row.
    #[must_use]
    pub fn live_room(&self, member_id: MemberId) -> Option<ResourceId> {
        self.session(member_id).and_then(|s| s.live_resource_id)
    }
}

/// `member` entered the trigger room from nowhere.
#[must_use]
pub fn arrive(member_id: MemberId, member_name: &str) -> Notification {
    Notification::LocationChanged(LocationChange {
        community_id: G1,
        member_id,
        member_name: member_name.to_string(),
        left: None,
        left_occupancy: 0,
        joined: Some(TRIGGER),
    })
}

/// `member` disconnected from `room`, leaving `remaining` members behind.
#[must_use]
pub fn leave(member_id: MemberId, room: ResourceId, remaining: usize) -> Notification {
    Notification::LocationChanged(LocationChange {
        community_id: G1,
        member_id,
        member_name: String::new(),
        left: Some(room),
        left_occupancy: remaining,
        joined: None,
    })
}

/// `member`'s membership of [`G1`] was deleted.
#[must_use]
pub fn member_removed(member_id: MemberId) -> Notification {
    Notification::MemberRemoved {
        community_id: G1,
        member_id,
    }
}

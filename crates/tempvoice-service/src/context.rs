//! Shared engine state handed to controllers, flows and panel tasks.

use crate::claims::ClaimTable;
use crate::config::Config;
use crate::dialog::DialogRegistry;
use crate::provider::Provider;
use crate::repositories::{AccessControlStore, SessionStore, TriggerConfigSource};
use crate::rooms::LiveRooms;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Everything a lifecycle operation needs. Cheap to clone.
#[derive(Clone)]
pub struct EngineContext {
    pub config: Arc<Config>,
    pub provider: Arc<dyn Provider>,
    pub sessions: Arc<dyn SessionStore>,
    pub access: Arc<dyn AccessControlStore>,
    pub triggers: Arc<dyn TriggerConfigSource>,
    pub claims: Arc<ClaimTable>,
    pub dialogs: Arc<DialogRegistry>,
    pub rooms: Arc<LiveRooms>,
    /// Root token; every panel task runs on a child of it.
    pub shutdown: CancellationToken,
}

impl EngineContext {
    #[must_use]
    pub fn new(
        config: Config,
        provider: Arc<dyn Provider>,
        sessions: Arc<dyn SessionStore>,
        access: Arc<dyn AccessControlStore>,
        triggers: Arc<dyn TriggerConfigSource>,
    ) -> Self {
        Self {
            config: Arc::new(config),
            provider,
            sessions,
            access,
            triggers,
            claims: Arc::new(ClaimTable::new()),
            dialogs: Arc::new(DialogRegistry::new()),
            rooms: Arc::new(LiveRooms::new()),
            shutdown: CancellationToken::new(),
        }
    }
}

impl std::fmt::Debug for EngineContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EngineContext")
            .field("live_rooms", &self.rooms.len())
            .field("bound_dialogs", &self.dialogs.len())
            .field("shutdown", &self.shutdown.is_cancelled())
            .finish_non_exhaustive()
    }
}

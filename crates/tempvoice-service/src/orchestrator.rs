//! Lifecycle orchestrator.
//!
//! Single entry point for platform notifications. The orchestrator is an
//! actor: notifications arrive one at a time through its mailbox and each is
//! dispatched, by [`NotificationKind`], to a [`NotificationHandler`] running
//! on its own task. Handlers interleave only where they await the provider
//! or the owner; the per-owner claim is the only thing they share.
//!
//! A handler error never stops the orchestrator: expected races are logged
//! at debug level, anything else is logged, counted and dropped.
//!
//! # Shutdown
//!
//! The orchestrator owns the engine's root [`CancellationToken`]. Shutdown
//! stops intake, cancels the root token (every room's panel task runs on a
//! child of it), then waits up to the configured timeout for panel tasks and
//! in-flight handlers before aborting what is left.

use crate::context::EngineContext;
use crate::controllers::{deprovision, destroy_session, provision};
use crate::errors::TempVoiceError;
use crate::observability::metrics;
use crate::provider::Interaction;
use async_trait::async_trait;
use common::types::{CommunityId, MemberId, OwnerKey, ResourceId};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinSet;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, info_span, instrument, warn, Instrument};

/// Default channel buffer size for the orchestrator mailbox.
const ORCHESTRATOR_CHANNEL_BUFFER: usize = 1000;

/// A member moved between rooms, joined, or left.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocationChange {
    pub community_id: CommunityId,
    pub member_id: MemberId,
    /// Display name, used for the default room name.
    pub member_name: String,
    pub left: Option<ResourceId>,
    /// Members still in `left` after the change.
    #[serde(default)]
    pub left_occupancy: usize,
    pub joined: Option<ResourceId>,
}

/// Platform notifications the engine reacts to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Notification {
    LocationChanged(LocationChange),
    /// An interaction no collector consumed.
    Interaction(Interaction),
    /// The member's community membership record was deleted.
    MemberRemoved {
        community_id: CommunityId,
        member_id: MemberId,
    },
}

/// Dispatch key for [`Notification`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NotificationKind {
    LocationChanged,
    Interaction,
    MemberRemoved,
}

impl NotificationKind {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            NotificationKind::LocationChanged => "location_changed",
            NotificationKind::Interaction => "interaction",
            NotificationKind::MemberRemoved => "member_removed",
        }
    }
}

impl Notification {
    #[must_use]
    pub fn kind(&self) -> NotificationKind {
        match self {
            Notification::LocationChanged(_) => NotificationKind::LocationChanged,
            Notification::Interaction(_) => NotificationKind::Interaction,
            Notification::MemberRemoved { .. } => NotificationKind::MemberRemoved,
        }
    }
}

/// Handles one kind of notification.
#[async_trait]
pub trait NotificationHandler: Send + Sync {
    async fn handle(
        &self,
        engine: &EngineContext,
        notification: Notification,
    ) -> Result<(), TempVoiceError>;
}

fn misrouted(kind: NotificationKind) -> TempVoiceError {
    TempVoiceError::Internal(format!("handler received {} notification", kind.as_str()))
}

/// Tears down a room that just emptied and provisions when the member
/// entered the community's trigger room.
#[derive(Debug, Default)]
pub struct LocationChangedHandler;

#[async_trait]
impl NotificationHandler for LocationChangedHandler {
    async fn handle(
        &self,
        engine: &EngineContext,
        notification: Notification,
    ) -> Result<(), TempVoiceError> {
        let kind = notification.kind();
        let Notification::LocationChanged(change) = notification else {
            return Err(misrouted(kind));
        };
        if change.left.is_some() && change.left == change.joined {
            return Ok(());
        }

        let mut left_result = Ok(());
        if let Some(left) = change.left {
            if change.left_occupancy == 0 {
                left_result = deprovision(engine, left).await.map(|_| ());
            }
        }

        if let Some(joined) = change.joined {
            if let Some(trigger) = engine.triggers.trigger_config(change.community_id).await? {
                if trigger.trigger_resource_id == Some(joined) {
                    provision(engine, &trigger, change.member_id, &change.member_name).await?;
                }
            }
        }

        left_result
    }
}

/// Answers interactions nobody is collecting as stale.
#[derive(Debug, Default)]
pub struct StrayInteractionHandler;

#[async_trait]
impl NotificationHandler for StrayInteractionHandler {
    async fn handle(
        &self,
        engine: &EngineContext,
        notification: Notification,
    ) -> Result<(), TempVoiceError> {
        let kind = notification.kind();
        let Notification::Interaction(interaction) = notification else {
            return Err(misrouted(kind));
        };

        debug!(
            target: "tv.orchestrator",
            surface_id = %interaction.surface_id,
            actor_id = %interaction.actor,
            bound = engine.dialogs.is_bound(interaction.surface_id),
            "Answering stale interaction"
        );
        engine
            .provider
            .reply_ephemeral(interaction.id, &TempVoiceError::DialogExpired.client_message())
            .await?;
        Ok(())
    }
}

/// Destroys the session of a member who left the community.
#[derive(Debug, Default)]
pub struct MemberRemovedHandler;

#[async_trait]
impl NotificationHandler for MemberRemovedHandler {
    async fn handle(
        &self,
        engine: &EngineContext,
        notification: Notification,
    ) -> Result<(), TempVoiceError> {
        let kind = notification.kind();
        let Notification::MemberRemoved {
            community_id,
            member_id,
        } = notification
        else {
            return Err(misrouted(kind));
        };
        destroy_session(engine, OwnerKey::new(community_id, member_id)).await?;
        Ok(())
    }
}

/// The standard dispatch table.
#[must_use]
pub fn default_handlers() -> HashMap<NotificationKind, Arc<dyn NotificationHandler>> {
    let mut handlers: HashMap<NotificationKind, Arc<dyn NotificationHandler>> = HashMap::new();
    handlers.insert(
        NotificationKind::LocationChanged,
        Arc::new(LocationChangedHandler),
    );
    handlers.insert(NotificationKind::Interaction, Arc::new(StrayInteractionHandler));
    handlers.insert(NotificationKind::MemberRemoved, Arc::new(MemberRemovedHandler));
    handlers
}

/// Snapshot of the orchestrator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OrchestratorStatus {
    pub live_rooms: usize,
    pub in_flight: usize,
    pub bound_dialogs: usize,
    pub accepting: bool,
}

/// What shutdown left behind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ShutdownReport {
    pub rooms_stopped: usize,
    pub tasks_aborted: usize,
}

enum OrchestratorMessage {
    Notify(Notification),
    WaitIdle {
        respond_to: oneshot::Sender<()>,
    },
    GetStatus {
        respond_to: oneshot::Sender<OrchestratorStatus>,
    },
    Shutdown {
        respond_to: oneshot::Sender<ShutdownReport>,
    },
}

/// Handle to the orchestrator actor.
#[derive(Clone)]
pub struct OrchestratorHandle {
    sender: mpsc::Sender<OrchestratorMessage>,
    cancel_token: CancellationToken,
}

impl OrchestratorHandle {
    /// Spawn the orchestrator with the standard dispatch table.
    #[must_use]
    pub fn new(engine: EngineContext) -> Self {
        Self::with_handlers(engine, default_handlers())
    }

    /// Spawn the orchestrator with a custom dispatch table. Notifications
    /// whose kind has no handler are dropped and counted.
    #[must_use]
    pub fn with_handlers(
        engine: EngineContext,
        handlers: HashMap<NotificationKind, Arc<dyn NotificationHandler>>,
    ) -> Self {
        let (sender, receiver) = mpsc::channel(ORCHESTRATOR_CHANNEL_BUFFER);
        let cancel_token = engine.shutdown.clone();

        let actor = Orchestrator {
            engine,
            receiver,
            handlers,
            in_flight: JoinSet::new(),
            accepting: true,
        };
        tokio::spawn(actor.run());

        Self {
            sender,
            cancel_token,
        }
    }

    /// Deliver a notification.
    pub async fn notify(&self, notification: Notification) -> Result<(), TempVoiceError> {
        self.sender
            .send(OrchestratorMessage::Notify(notification))
            .await
            .map_err(|e| TempVoiceError::Internal(format!("channel send failed: {e}")))
    }

    /// Wait until every notification delivered so far has been handled.
    pub async fn wait_idle(&self) -> Result<(), TempVoiceError> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(OrchestratorMessage::WaitIdle { respond_to: tx })
            .await
            .map_err(|e| TempVoiceError::Internal(format!("channel send failed: {e}")))?;

        rx.await
            .map_err(|e| TempVoiceError::Internal(format!("response receive failed: {e}")))
    }

    pub async fn status(&self) -> Result<OrchestratorStatus, TempVoiceError> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(OrchestratorMessage::GetStatus { respond_to: tx })
            .await
            .map_err(|e| TempVoiceError::Internal(format!("channel send failed: {e}")))?;

        rx.await
            .map_err(|e| TempVoiceError::Internal(format!("response receive failed: {e}")))
    }

    /// Stop intake, cancel every room task and wait (bounded) for them.
    pub async fn shutdown(&self) -> Result<ShutdownReport, TempVoiceError> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(OrchestratorMessage::Shutdown { respond_to: tx })
            .await
            .map_err(|e| TempVoiceError::Internal(format!("channel send failed: {e}")))?;

        rx.await
            .map_err(|e| TempVoiceError::Internal(format!("response receive failed: {e}")))
    }

    /// Cancel immediately (the actor still drains with its bounded wait).
    pub fn cancel(&self) {
        self.cancel_token.cancel();
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancel_token.is_cancelled()
    }
}

struct Orchestrator {
    engine: EngineContext,
    receiver: mpsc::Receiver<OrchestratorMessage>,
    handlers: HashMap<NotificationKind, Arc<dyn NotificationHandler>>,
    in_flight: JoinSet<()>,
    accepting: bool,
}

impl Orchestrator {
    #[instrument(skip_all, name = "tv.orchestrator")]
    async fn run(mut self) {
        info!(target: "tv.orchestrator", "Orchestrator started");

        loop {
            tokio::select! {
                () = self.engine.shutdown.cancelled(), if self.accepting => {
                    info!(
                        target: "tv.orchestrator",
                        "Orchestrator received cancellation signal"
                    );
                    self.graceful_shutdown().await;
                    break;
                }

                Some(joined) = self.in_flight.join_next(), if !self.in_flight.is_empty() => {
                    if let Err(e) = joined {
                        warn!(
                            target: "tv.orchestrator",
                            error = ?e,
                            "Notification handler task panicked"
                        );
                    }
                }

                msg = self.receiver.recv() => {
                    match msg {
                        Some(message) => {
                            if !self.handle_message(message).await {
                                break;
                            }
                        }
                        None => {
                            info!(
                                target: "tv.orchestrator",
                                "Orchestrator channel closed, exiting"
                            );
                            self.graceful_shutdown().await;
                            break;
                        }
                    }
                }
            }
        }

        info!(target: "tv.orchestrator", "Orchestrator stopped");
    }

    /// Returns `false` once the actor should stop.
    async fn handle_message(&mut self, message: OrchestratorMessage) -> bool {
        match message {
            OrchestratorMessage::Notify(notification) => {
                self.dispatch(notification);
                true
            }
            OrchestratorMessage::WaitIdle { respond_to } => {
                while let Some(joined) = self.in_flight.join_next().await {
                    if let Err(e) = joined {
                        warn!(
                            target: "tv.orchestrator",
                            error = ?e,
                            "Notification handler task panicked"
                        );
                    }
                }
                let _ = respond_to.send(());
                true
            }
            OrchestratorMessage::GetStatus { respond_to } => {
                let _ = respond_to.send(OrchestratorStatus {
                    live_rooms: self.engine.rooms.len(),
                    in_flight: self.in_flight.len(),
                    bound_dialogs: self.engine.dialogs.len(),
                    accepting: self.accepting,
                });
                true
            }
            OrchestratorMessage::Shutdown { respond_to } => {
                let report = self.graceful_shutdown().await;
                let _ = respond_to.send(report);
                false
            }
        }
    }

    fn dispatch(&mut self, notification: Notification) {
        let kind = notification.kind();

        if !self.accepting {
            debug!(
                target: "tv.orchestrator",
                kind = kind.as_str(),
                "Dropping notification during shutdown"
            );
            return;
        }

        let Some(handler) = self.handlers.get(&kind).cloned() else {
            warn!(
                target: "tv.orchestrator",
                kind = kind.as_str(),
                "No handler registered for notification"
            );
            metrics::record_notification_dropped(kind.as_str());
            return;
        };

        let engine = self.engine.clone();
        let span = info_span!("tv.orchestrator.notification", kind = kind.as_str());
        self.in_flight.spawn(
            async move {
                if let Err(e) = handler.handle(&engine, notification).await {
                    if e.is_expected_race() {
                        debug!(
                            target: "tv.orchestrator",
                            kind = kind.as_str(),
                            error = %e,
                            "Notification ended by expected race"
                        );
                    } else {
                        warn!(
                            target: "tv.orchestrator",
                            kind = kind.as_str(),
                            error = %e,
                            "Notification handler failed, operation dropped"
                        );
                        metrics::record_notification_dropped(kind.as_str());
                    }
                }
            }
            .instrument(span),
        );
    }

    async fn graceful_shutdown(&mut self) -> ShutdownReport {
        self.accepting = false;
        self.engine.shutdown.cancel();

        let deadline = Instant::now() + self.engine.config.shutdown_timeout;
        let rooms = self.engine.rooms.drain();
        let mut report = ShutdownReport {
            rooms_stopped: rooms.len(),
            tasks_aborted: 0,
        };

        info!(
            target: "tv.orchestrator",
            live_rooms = rooms.len(),
            in_flight = self.in_flight.len(),
            "Shutting down"
        );

        for room in rooms {
            room.cancel.cancel();
            let Some(mut task) = room.task else {
                continue;
            };
            if tokio::time::timeout_at(deadline, &mut task).await.is_err() {
                task.abort();
                report.tasks_aborted += 1;
            }
        }

        while !self.in_flight.is_empty() {
            match tokio::time::timeout_at(deadline, self.in_flight.join_next()).await {
                Ok(Some(_)) => {}
                Ok(None) => break,
                Err(_) => {
                    report.tasks_aborted += self.in_flight.len();
                    self.in_flight.shutdown().await;
                    break;
                }
            }
        }

        if report.tasks_aborted > 0 {
            warn!(
                target: "tv.orchestrator",
                tasks_aborted = report.tasks_aborted,
                "Shutdown deadline reached, aborted remaining tasks"
            );
        }
        report
    }
}

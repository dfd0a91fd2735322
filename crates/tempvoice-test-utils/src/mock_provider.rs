//! Scripted provider for engine tests.
//!
//! Keeps a small model of the platform: rooms with their overwrites, where
//! each member is connected, and every surface with its current content.
//! Every call is recorded in order. Interactions and typed messages are
//! queued by the test with [`MockProvider::click`], [`MockProvider::select_members`]
//! and [`MockProvider::say`] and handed out by `await_interaction` /
//! `await_text` exactly like a live collector would.
//!
//! # Example
//!
//! ```rust,ignore
//! use tempvoice_test_utils::{MockOp, MockProvider};
//!
//! let provider = MockProvider::new();
//! provider.fail_next(MockOp::CreateResource, ProviderError::Rejected("limit".into()));
//!
//! // ... drive the engine ...
//!
//! let prompt = provider.wait_for_prompt("Save as default?").await;
//! provider.click(prompt, U1, ComponentId::Confirm(true));
//! ```

use async_trait::async_trait;
use common::types::{CommunityId, InteractionId, MemberId, ResourceId, SurfaceId};
use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tempvoice_service::permissions::{Overwrite, OverwriteSet, Subject};
use tempvoice_service::provider::{
    Interaction, InteractionKind, InteractionPayload, Provider, ProviderError,
};
use tempvoice_service::surface::{ComponentId, SurfaceContent};
use tokio::sync::{mpsc, Notify};

/// Upper bound for [`MockProvider::wait_for`]. Tests run on a paused clock,
/// so this is virtual time.
pub const WAIT_LIMIT: Duration = Duration::from_secs(86_400);

/// Provider operations, for failure injection and call counting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MockOp {
    CreateResource,
    DeleteResource,
    RenameResource,
    SetOverwrite,
    RemoveOverwrite,
    MoveMember,
    SendSurface,
    EditSurface,
    DeleteSurface,
    ReplyEphemeral,
}

/// One recorded provider call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProviderCall {
    CreateResource {
        community_id: CommunityId,
        parent_id: Option<ResourceId>,
        name: String,
    },
    DeleteResource(ResourceId),
    RenameResource {
        resource_id: ResourceId,
        name: String,
    },
    SetOverwrite {
        resource_id: ResourceId,
        subject: Subject,
        overwrite: Overwrite,
    },
    RemoveOverwrite {
        resource_id: ResourceId,
        subject: Subject,
    },
    MoveMember {
        member_id: MemberId,
        resource_id: ResourceId,
    },
    SendSurface {
        channel_id: ResourceId,
        title: String,
    },
    EditSurface {
        surface_id: SurfaceId,
        content: SurfaceContent,
    },
    DeleteSurface(SurfaceId),
    ReplyEphemeral {
        interaction_id: InteractionId,
        text: String,
    },
}

impl ProviderCall {
    #[must_use]
    pub fn op(&self) -> MockOp {
        match self {
            ProviderCall::CreateResource { .. } => MockOp::CreateResource,
            ProviderCall::DeleteResource(_) => MockOp::DeleteResource,
            ProviderCall::RenameResource { .. } => MockOp::RenameResource,
            ProviderCall::SetOverwrite { .. } => MockOp::SetOverwrite,
            ProviderCall::RemoveOverwrite { .. } => MockOp::RemoveOverwrite,
            ProviderCall::MoveMember { .. } => MockOp::MoveMember,
            ProviderCall::SendSurface { .. } => MockOp::SendSurface,
            ProviderCall::EditSurface { .. } => MockOp::EditSurface,
            ProviderCall::DeleteSurface(_) => MockOp::DeleteSurface,
            ProviderCall::ReplyEphemeral { .. } => MockOp::ReplyEphemeral,
        }
    }
}

/// A room as the platform sees it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MockResource {
    pub community_id: CommunityId,
    pub parent_id: Option<ResourceId>,
    pub name: String,
    pub overwrites: BTreeMap<Subject, Overwrite>,
}

/// A rendered surface.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MockSurface {
    pub channel_id: ResourceId,
    pub content: SurfaceContent,
    pub deleted: bool,
}

/// Observable platform state.
#[derive(Debug, Default)]
pub struct MockState {
    pub resources: BTreeMap<ResourceId, MockResource>,
    pub surfaces: BTreeMap<SurfaceId, MockSurface>,
    pub locations: HashMap<MemberId, ResourceId>,
    pub calls: Vec<ProviderCall>,
}

#[derive(Debug, Default)]
struct Inner {
    state: MockState,
    next_id: u64,
    gone_members: HashSet<MemberId>,
    failures: HashMap<MockOp, VecDeque<ProviderError>>,
}

impl Inner {
    fn allocate(&mut self) -> u64 {
        self.next_id += 1;
        1_000 + self.next_id
    }

    fn resource_mut(&mut self, resource_id: ResourceId) -> Result<&mut MockResource, ProviderError> {
        self.state
            .resources
            .get_mut(&resource_id)
            .ok_or_else(|| ProviderError::Gone(format!("resource {resource_id}")))
    }
}

#[derive(Debug)]
struct Queue<T> {
    tx: mpsc::UnboundedSender<T>,
    rx: Arc<tokio::sync::Mutex<mpsc::UnboundedReceiver<T>>>,
}

impl<T> Queue<T> {
    fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            tx,
            rx: Arc::new(tokio::sync::Mutex::new(rx)),
        }
    }
}

async fn next_within<T>(
    rx: Arc<tokio::sync::Mutex<mpsc::UnboundedReceiver<T>>>,
    timeout: Duration,
) -> Option<T> {
    let mut rx = rx.lock().await;
    tokio::time::timeout(timeout, rx.recv()).await.ok().flatten()
}

/// Mock platform provider.
#[derive(Debug)]
pub struct MockProvider {
    inner: Mutex<Inner>,
    changed: Notify,
    interactions: Mutex<HashMap<SurfaceId, Queue<Interaction>>>,
    texts: Mutex<HashMap<(ResourceId, MemberId), Queue<String>>>,
    next_interaction: AtomicU64,
    create_delay: Option<Duration>,
}

impl Default for MockProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl MockProvider {
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
            changed: Notify::new(),
            interactions: Mutex::new(HashMap::new()),
            texts: Mutex::new(HashMap::new()),
            next_interaction: AtomicU64::new(9_000),
            create_delay: None,
        }
    }

    /// Make every `create_resource` take `delay`, widening race windows.
    #[must_use]
    pub fn with_create_delay(mut self, delay: Duration) -> Self {
        self.create_delay = Some(delay);
        self
    }

    /// Fail the next call of `op` with `error`. Calls queue up.
    pub fn fail_next(&self, op: MockOp, error: ProviderError) {
        self.lock()
            .failures
            .entry(op)
            .or_default()
            .push_back(error);
    }

    /// From now on `member` is disconnected: moves report `Gone`.
    pub fn member_gone(&self, member_id: MemberId) {
        let mut inner = self.lock();
        inner.gone_members.insert(member_id);
        inner.state.locations.remove(&member_id);
    }

    /// Register a room the engine did not create (a trigger room).
    pub fn add_resource(&self, resource_id: ResourceId, community_id: CommunityId, name: &str) {
        self.lock().state.resources.insert(
            resource_id,
            MockResource {
                community_id,
                parent_id: None,
                name: name.to_string(),
                overwrites: BTreeMap::new(),
            },
        );
    }

    // ---- Scripting owner input ----

    /// Queue a button press on `surface_id`.
    pub fn click(&self, surface_id: SurfaceId, actor: MemberId, id: ComponentId) -> InteractionId {
        self.push_interaction(surface_id, actor, InteractionPayload::Component { id })
    }

    /// Queue a member selection on `surface_id`.
    pub fn select_members(
        &self,
        surface_id: SurfaceId,
        actor: MemberId,
        members: Vec<MemberId>,
    ) -> InteractionId {
        self.push_interaction(surface_id, actor, InteractionPayload::Members { members })
    }

    /// Build an interaction without queueing it, for delivery as a
    /// notification.
    #[must_use]
    pub fn interaction(
        &self,
        surface_id: SurfaceId,
        actor: MemberId,
        id: ComponentId,
    ) -> Interaction {
        Interaction {
            id: InteractionId(self.next_interaction.fetch_add(1, Ordering::Relaxed)),
            surface_id,
            actor,
            payload: InteractionPayload::Component { id },
        }
    }

    fn push_interaction(
        &self,
        surface_id: SurfaceId,
        actor: MemberId,
        payload: InteractionPayload,
    ) -> InteractionId {
        let id = InteractionId(self.next_interaction.fetch_add(1, Ordering::Relaxed));
        let interaction = Interaction {
            id,
            surface_id,
            actor,
            payload,
        };
        self.interactions
            .lock()
            .unwrap()
            .entry(surface_id)
            .or_insert_with(Queue::new)
            .tx
            .send(interaction)
            .unwrap();
        id
    }

    /// Queue a message typed by `author` in `channel_id`.
    pub fn say(&self, channel_id: ResourceId, author: MemberId, text: &str) {
        self.texts
            .lock()
            .unwrap()
            .entry((channel_id, author))
            .or_insert_with(Queue::new)
            .tx
            .send(text.to_string())
            .unwrap();
    }

    // ---- Inspection ----

    #[must_use]
    pub fn calls(&self) -> Vec<ProviderCall> {
        self.lock().state.calls.clone()
    }

    #[must_use]
    pub fn count(&self, op: MockOp) -> usize {
        self.lock().state.calls.iter().filter(|c| c.op() == op).count()
    }

    /// Rooms that exist, trigger rooms included.
    #[must_use]
    pub fn resource_ids(&self) -> Vec<ResourceId> {
        self.lock().state.resources.keys().copied().collect()
    }

    #[must_use]
    pub fn resource(&self, resource_id: ResourceId) -> Option<MockResource> {
        self.lock().state.resources.get(&resource_id).cloned()
    }

    /// Current overwrites of a room (empty if it does not exist).
    #[must_use]
    pub fn overwrites(&self, resource_id: ResourceId) -> BTreeMap<Subject, Overwrite> {
        self.resource(resource_id)
            .map(|r| r.overwrites)
            .unwrap_or_default()
    }

    #[must_use]
    pub fn location(&self, member_id: MemberId) -> Option<ResourceId> {
        self.lock().state.locations.get(&member_id).copied()
    }

    #[must_use]
    pub fn surface(&self, surface_id: SurfaceId) -> Option<MockSurface> {
        self.lock().state.surfaces.get(&surface_id).cloned()
    }

    /// Ephemeral replies sent for `interaction_id`.
    #[must_use]
    pub fn replies_to(&self, interaction_id: InteractionId) -> Vec<String> {
        self.lock()
            .state
            .calls
            .iter()
            .filter_map(|call| match call {
                ProviderCall::ReplyEphemeral {
                    interaction_id: id,
                    text,
                } if *id == interaction_id => Some(text.clone()),
                _ => None,
            })
            .collect()
    }

    // ---- Waiting ----

    /// Wait until `probe` finds something in the platform state.
    ///
    /// # Panics
    ///
    /// Panics when nothing is found within [`WAIT_LIMIT`].
    pub async fn wait_for<T>(&self, mut probe: impl FnMut(&MockState) -> Option<T>) -> T {
        let wait = async {
            loop {
                let notified = self.changed.notified();
                tokio::pin!(notified);
                notified.as_mut().enable();
                if let Some(found) = probe(&self.lock().state) {
                    return found;
                }
                notified.await;
            }
        };
        tokio::time::timeout(WAIT_LIMIT, wait)
            .await
            .expect("mock provider never reached the expected state")
    }

    /// Wait for a live, clickable surface titled `title`.
    pub async fn wait_for_prompt(&self, title: &str) -> SurfaceId {
        self.wait_for(|state| {
            state
                .surfaces
                .iter()
                .rev()
                .find(|(_, s)| {
                    !s.deleted && s.content.title == title && s.content.has_enabled_components()
                })
                .map(|(id, _)| *id)
        })
        .await
    }

    /// Wait until at least `n` calls of `op` were made.
    pub async fn wait_for_count(&self, op: MockOp, n: usize) {
        self.wait_for(|state| {
            (state.calls.iter().filter(|c| c.op() == op).count() >= n).then_some(())
        })
        .await;
    }

    /// Wait for the first ephemeral reply to `interaction_id`.
    pub async fn wait_for_reply(&self, interaction_id: InteractionId) -> String {
        self.wait_for(|state| {
            state.calls.iter().find_map(|call| match call {
                ProviderCall::ReplyEphemeral {
                    interaction_id: id,
                    text,
                } if *id == interaction_id => Some(text.clone()),
                _ => None,
            })
        })
        .await
    }

    // ---- Internals ----

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap()
    }

    /// Record `call` and pop any injected failure for it.
    fn begin(&self, call: ProviderCall) -> Result<MutexGuard<'_, Inner>, ProviderError> {
        let mut inner = self.lock();
        let op = call.op();
        inner.state.calls.push(call);
        self.changed.notify_waiters();
        match inner.failures.get_mut(&op).and_then(VecDeque::pop_front) {
            Some(error) => Err(error),
            None => Ok(inner),
        }
    }

    fn finish<T>(&self, inner: MutexGuard<'_, Inner>, result: T) -> T {
        drop(inner);
        self.changed.notify_waiters();
        result
    }
}

#[async_trait]
impl Provider for MockProvider {
    async fn create_resource(
        &self,
        community_id: CommunityId,
        parent_id: Option<ResourceId>,
        name: &str,
        overwrites: &OverwriteSet,
    ) -> Result<ResourceId, ProviderError> {
        if let Some(delay) = self.create_delay {
            tokio::time::sleep(delay).await;
        }
        let mut inner = self.begin(ProviderCall::CreateResource {
            community_id,
            parent_id,
            name: name.to_string(),
        })?;
        let resource_id = ResourceId(inner.allocate());
        inner.state.resources.insert(
            resource_id,
            MockResource {
                community_id,
                parent_id,
                name: name.to_string(),
                overwrites: overwrites.iter().collect(),
            },
        );
        Ok(self.finish(inner, resource_id))
    }

    async fn delete_resource(&self, resource_id: ResourceId) -> Result<(), ProviderError> {
        let mut inner = self.begin(ProviderCall::DeleteResource(resource_id))?;
        let result = match inner.state.resources.remove(&resource_id) {
            Some(_) => {
                inner.state.locations.retain(|_, at| *at != resource_id);
                Ok(())
            }
            None => Err(ProviderError::Gone(format!("resource {resource_id}"))),
        };
        self.finish(inner, result)
    }

    async fn rename_resource(
        &self,
        resource_id: ResourceId,
        name: &str,
    ) -> Result<(), ProviderError> {
        let mut inner = self.begin(ProviderCall::RenameResource {
            resource_id,
            name: name.to_string(),
        })?;
        let result = inner.resource_mut(resource_id).map(|r| {
            r.name = name.to_string();
        });
        self.finish(inner, result)
    }

    async fn set_overwrite(
        &self,
        resource_id: ResourceId,
        subject: Subject,
        overwrite: Overwrite,
    ) -> Result<(), ProviderError> {
        let mut inner = self.begin(ProviderCall::SetOverwrite {
            resource_id,
            subject,
            overwrite,
        })?;
        let result = inner.resource_mut(resource_id).map(|r| {
            r.overwrites.insert(subject, overwrite);
        });
        self.finish(inner, result)
    }

    async fn remove_overwrite(
        &self,
        resource_id: ResourceId,
        subject: Subject,
    ) -> Result<(), ProviderError> {
        let mut inner = self.begin(ProviderCall::RemoveOverwrite {
            resource_id,
            subject,
        })?;
        let result = inner.resource_mut(resource_id).map(|r| {
            r.overwrites.remove(&subject);
        });
        self.finish(inner, result)
    }

    async fn move_member(
        &self,
        _community_id: CommunityId,
        member_id: MemberId,
        resource_id: ResourceId,
    ) -> Result<(), ProviderError> {
        let mut inner = self.begin(ProviderCall::MoveMember {
            member_id,
            resource_id,
        })?;
        let result = if inner.gone_members.contains(&member_id) {
            Err(ProviderError::Gone(format!("member {member_id}")))
        } else if inner.state.resources.contains_key(&resource_id) {
            inner.state.locations.insert(member_id, resource_id);
            Ok(())
        } else {
            Err(ProviderError::Gone(format!("resource {resource_id}")))
        };
        self.finish(inner, result)
    }

    async fn send_surface(
        &self,
        channel_id: ResourceId,
        content: &SurfaceContent,
    ) -> Result<SurfaceId, ProviderError> {
        let mut inner = self.begin(ProviderCall::SendSurface {
            channel_id,
            title: content.title.clone(),
        })?;
        let surface_id = SurfaceId(inner.allocate());
        inner.state.surfaces.insert(
            surface_id,
            MockSurface {
                channel_id,
                content: content.clone(),
                deleted: false,
            },
        );
        Ok(self.finish(inner, surface_id))
    }

    async fn edit_surface(
        &self,
        surface_id: SurfaceId,
        content: &SurfaceContent,
    ) -> Result<(), ProviderError> {
        let mut inner = self.begin(ProviderCall::EditSurface {
            surface_id,
            content: content.clone(),
        })?;
        let result = match inner.state.surfaces.get_mut(&surface_id) {
            Some(surface) if !surface.deleted => {
                surface.content = content.clone();
                Ok(())
            }
            _ => Err(ProviderError::Gone(format!("surface {surface_id}"))),
        };
        self.finish(inner, result)
    }

    async fn delete_surface(&self, surface_id: SurfaceId) -> Result<(), ProviderError> {
        let mut inner = self.begin(ProviderCall::DeleteSurface(surface_id))?;
        let result = match inner.state.surfaces.get_mut(&surface_id) {
            Some(surface) if !surface.deleted => {
                surface.deleted = true;
                Ok(())
            }
            _ => Err(ProviderError::Gone(format!("surface {surface_id}"))),
        };
        self.finish(inner, result)
    }

    async fn await_interaction(
        &self,
        surface_id: SurfaceId,
        _kind: InteractionKind,
        timeout: Duration,
    ) -> Result<Option<Interaction>, ProviderError> {
        let rx = self
            .interactions
            .lock()
            .unwrap()
            .entry(surface_id)
            .or_insert_with(Queue::new)
            .rx
            .clone();
        Ok(next_within(rx, timeout).await)
    }

    async fn await_text(
        &self,
        channel_id: ResourceId,
        author_id: MemberId,
        timeout: Duration,
    ) -> Result<Option<String>, ProviderError> {
        let rx = self
            .texts
            .lock()
            .unwrap()
            .entry((channel_id, author_id))
            .or_insert_with(Queue::new)
            .rx
            .clone();
        Ok(next_within(rx, timeout).await)
    }

    async fn reply_ephemeral(
        &self,
        interaction_id: InteractionId,
        text: &str,
    ) -> Result<(), ProviderError> {
        let inner = self.begin(ProviderCall::ReplyEphemeral {
            interaction_id,
            text: text.to_string(),
        })?;
        Ok(self.finish(inner, ()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_injected_failure_is_consumed_once() {
        let provider = MockProvider::new();
        provider.fail_next(MockOp::CreateResource, ProviderError::Rejected("limit".into()));

        let first = provider
            .create_resource(CommunityId(1), None, "a", &OverwriteSet::default())
            .await;
        assert_eq!(first, Err(ProviderError::Rejected("limit".into())));

        let second = provider
            .create_resource(CommunityId(1), None, "a", &OverwriteSet::default())
            .await
            .unwrap();
        assert!(provider.resource(second).is_some());
        assert_eq!(provider.count(MockOp::CreateResource), 2);
    }

    #[tokio::test]
    async fn test_move_of_gone_member_fails() {
        let provider = MockProvider::new();
        provider.add_resource(ResourceId(5), CommunityId(1), "room");
        provider.member_gone(MemberId(7));

        let result = provider
            .move_member(CommunityId(1), MemberId(7), ResourceId(5))
            .await;
        assert!(matches!(result, Err(ProviderError::Gone(_))));
        assert_eq!(provider.location(MemberId(7)), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_await_interaction_times_out_empty() {
        let provider = MockProvider::new();
        let got = provider
            .await_interaction(SurfaceId(1), InteractionKind::Button, Duration::from_secs(5))
            .await
            .unwrap();
        assert_eq!(got, None);
    }

    #[tokio::test]
    async fn test_queued_click_is_delivered() {
        let provider = MockProvider::new();
        let id = provider.click(SurfaceId(3), MemberId(1), ComponentId::Confirm(true));

        let got = provider
            .await_interaction(SurfaceId(3), InteractionKind::Button, Duration::from_secs(5))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(got.id, id);
        assert_eq!(got.actor, MemberId(1));
    }
}

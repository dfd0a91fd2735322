//! Dialog registry: at most one live dialog per control surface.
//!
//! Binding a surface that already has a dialog cancels the previous binding
//! and waits until its holder has dropped it before the new binding is
//! handed out, so two collectors never listen on one surface.

use common::types::SurfaceId;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio_util::sync::CancellationToken;
use tracing::debug;

#[derive(Debug)]
struct Slot {
    generation: u64,
    cancel: CancellationToken,
    retired: CancellationToken,
}

/// Registry of live dialog bindings keyed by surface.
#[derive(Debug, Default)]
pub struct DialogRegistry {
    slots: Mutex<HashMap<SurfaceId, Slot>>,
    next_generation: AtomicU64,
}

impl DialogRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind `surface_id`, retiring any dialog already bound to it first.
    pub async fn bind(self: &Arc<Self>, surface_id: SurfaceId) -> DialogBinding {
        loop {
            let previous = {
                let mut slots = self.slots();
                match slots.get(&surface_id) {
                    Some(slot) => (slot.cancel.clone(), slot.retired.clone()),
                    None => {
                        let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);
                        let cancel = CancellationToken::new();
                        let retired = CancellationToken::new();
                        slots.insert(
                            surface_id,
                            Slot {
                                generation,
                                cancel: cancel.clone(),
                                retired: retired.clone(),
                            },
                        );
                        return DialogBinding {
                            registry: Arc::clone(self),
                            surface_id,
                            generation,
                            cancel,
                            retired,
                        };
                    }
                }
            };

            debug!(
                target: "tv.dialog",
                surface_id = %surface_id,
                "Retiring previous dialog before rebind"
            );
            let (cancel, retired) = previous;
            cancel.cancel();
            retired.cancelled().await;
        }
    }

    /// Retire whatever dialog is bound to `surface_id` and wait until it is
    /// gone. No-op when nothing is bound.
    pub async fn retire(&self, surface_id: SurfaceId) {
        let previous = self
            .slots()
            .get(&surface_id)
            .map(|slot| (slot.cancel.clone(), slot.retired.clone()));

        if let Some((cancel, retired)) = previous {
            cancel.cancel();
            retired.cancelled().await;
        }
    }

    #[must_use]
    pub fn is_bound(&self, surface_id: SurfaceId) -> bool {
        self.slots().contains_key(&surface_id)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.slots().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.slots().is_empty()
    }

    fn slots(&self) -> MutexGuard<'_, HashMap<SurfaceId, Slot>> {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn unbind(&self, surface_id: SurfaceId, generation: u64) {
        let mut slots = self.slots();
        if slots
            .get(&surface_id)
            .is_some_and(|slot| slot.generation == generation)
        {
            slots.remove(&surface_id);
        }
    }
}

/// Exclusive right to collect interactions on one surface.
///
/// Dropping the binding unbinds the surface and signals retirement to
/// anyone waiting to rebind it.
#[derive(Debug)]
pub struct DialogBinding {
    registry: Arc<DialogRegistry>,
    surface_id: SurfaceId,
    generation: u64,
    cancel: CancellationToken,
    retired: CancellationToken,
}

impl DialogBinding {
    #[must_use]
    pub fn surface_id(&self) -> SurfaceId {
        self.surface_id
    }

    /// Whether a newer binding or a teardown asked this one to stop.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Completes once this binding has been asked to stop.
    pub async fn cancelled(&self) {
        self.cancel.cancelled().await;
    }
}

impl Drop for DialogBinding {
    fn drop(&mut self) {
        self.registry.unbind(self.surface_id, self.generation);
        self.retired.cancel();
    }
}

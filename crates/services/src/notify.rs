use std::sync::{Arc, Mutex, PoisonError, Weak};

use walkthrough_core::model::{ComponentId, CurrentStep};

/// Everything one logical operation changed, delivered as a single notification.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ChangeBatch {
    /// Step snapshot after the operation, present when tour progress changed.
    pub step: Option<CurrentStep>,
    /// Components whose UI-state bag was written or cleared, in write order.
    pub components: Vec<ComponentId>,
    /// Every bag was dropped.
    pub ui_reset: bool,
}

impl ChangeBatch {
    #[must_use]
    pub fn touches_step(&self) -> bool {
        self.step.is_some()
    }

    #[must_use]
    pub fn touches_component(&self, id: &ComponentId) -> bool {
        self.ui_reset || self.components.contains(id)
    }
}

type Listener = dyn Fn(&ChangeBatch) + Send + Sync;

#[derive(Default)]
struct ListenerList {
    next_id: u64,
    listeners: Vec<(u64, Arc<Listener>)>,
}

/// Registry of change listeners.
#[derive(Clone, Default)]
pub(crate) struct Subscribers {
    inner: Arc<Mutex<ListenerList>>,
}

impl Subscribers {
    pub(crate) fn subscribe(&self, listener: Arc<Listener>) -> Subscription {
        let mut guard = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        let id = guard.next_id;
        guard.next_id += 1;
        guard.listeners.push((id, listener));
        Subscription {
            id,
            registry: Arc::downgrade(&self.inner),
        }
    }

    /// Calls every listener outside the lock so listeners may (un)subscribe.
    pub(crate) fn publish(&self, batch: &ChangeBatch) {
        let snapshot: Vec<Arc<Listener>> = {
            let guard = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
            guard.listeners.iter().map(|(_, l)| Arc::clone(l)).collect()
        };
        for listener in snapshot {
            listener(batch);
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .listeners
            .len()
    }
}

/// Handle returned by `subscribe`. Dropping it keeps the listener registered.
#[derive(Debug)]
#[must_use = "keep the subscription to be able to unsubscribe"]
pub struct Subscription {
    id: u64,
    registry: Weak<Mutex<ListenerList>>,
}

impl Subscription {
    /// Remove the listener. Batches published afterwards are not delivered.
    pub fn unsubscribe(self) {
        if let Some(inner) = self.registry.upgrade() {
            let mut guard = inner.lock().unwrap_or_else(PoisonError::into_inner);
            guard.listeners.retain(|(id, _)| *id != self.id);
        }
    }
}

/// Listener adapter that fires only when the visible step moves or the tour
/// becomes inactive.
///
/// This is the hook an accessibility collaborator uses to read the new step
/// aloud without the tour engine knowing about speech.
pub struct StepAnnouncer<F> {
    last: Mutex<Option<(u32, bool)>>,
    on_step: F,
}

impl<F> StepAnnouncer<F>
where
    F: Fn(&CurrentStep) + Send + Sync,
{
    #[must_use]
    pub fn new(on_step: F) -> Self {
        Self {
            last: Mutex::new(None),
            on_step,
        }
    }

    pub fn observe(&self, batch: &ChangeBatch) {
        let Some(step) = batch.step else {
            return;
        };
        let key = (step.index, step.active);
        {
            let mut last = self.last.lock().unwrap_or_else(PoisonError::into_inner);
            if *last == Some(key) {
                return;
            }
            *last = Some(key);
        }
        (self.on_step)(&step);
    }
}

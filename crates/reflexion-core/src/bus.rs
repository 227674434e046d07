//! Synchronous delivery of [`ChangeEvent`]s to observers.
//!
//! # Delivery
//!
//! - Observers are called in subscription order, once per event, in the
//!   order the events were raised.
//! - Inside a batch (see [`EventBus::begin_batch`]) events are queued and
//!   delivered when the outermost batch closes. Queued events are exactly
//!   the events that unbatched delivery would have produced.
//! - Observers only ever see `&ChangeEvent`. The graph is mutably borrowed
//!   while it publishes, so an observer cannot re-enter it.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use crate::event::ChangeEvent;
use crate::id::SubscriberId;

/// Receives change events.
pub trait Observer {
    fn handle_change(&mut self, event: &ChangeEvent);
}

impl<F> Observer for F
where
    F: FnMut(&ChangeEvent),
{
    fn handle_change(&mut self, event: &ChangeEvent) {
        self(event)
    }
}

/// Observer list plus the batch queue.
#[derive(Default)]
pub struct EventBus {
    observers: Vec<(SubscriberId, Box<dyn Observer>)>,
    next_id: u32,
    batch_depth: u32,
    queued: Vec<ChangeEvent>,
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("observers", &self.observers.len())
            .field("batch_depth", &self.batch_depth)
            .field("queued", &self.queued.len())
            .finish()
    }
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&mut self, observer: impl Observer + 'static) -> SubscriberId {
        let id = SubscriberId(self.next_id);
        self.next_id += 1;
        self.observers.push((id, Box::new(observer)));
        id
    }

    /// Removes an observer. Returns `false` if the ID was not subscribed.
    pub fn unsubscribe(&mut self, id: SubscriberId) -> bool {
        let before = self.observers.len();
        self.observers.retain(|(sid, _)| *sid != id);
        self.observers.len() != before
    }

    pub fn observer_count(&self) -> usize {
        self.observers.len()
    }

    pub fn in_batch(&self) -> bool {
        self.batch_depth > 0
    }

    /// Opens a (possibly nested) batch.
    pub fn begin_batch(&mut self) {
        self.batch_depth += 1;
    }

    /// Closes a batch; closing the outermost one flushes the queue.
    pub fn end_batch(&mut self) {
        match self.batch_depth {
            0 => tracing::warn!("end_batch called without an open batch"),
            1 => {
                self.batch_depth = 0;
                let queued = std::mem::take(&mut self.queued);
                for event in &queued {
                    self.deliver(event);
                }
            }
            _ => self.batch_depth -= 1,
        }
    }

    pub fn publish(&mut self, event: ChangeEvent) {
        tracing::trace!(%event, "change");
        if self.batch_depth > 0 {
            self.queued.push(event);
        } else {
            self.deliver(&event);
        }
    }

    fn deliver(&mut self, event: &ChangeEvent) {
        for (_, observer) in &mut self.observers {
            observer.handle_change(event);
        }
    }
}

/// An observer that records every event it sees.
///
/// Clones share the same log, so one clone can be subscribed while another
/// is kept for inspection.
#[derive(Debug, Clone, Default)]
pub struct EventRecorder {
    events: Rc<RefCell<Vec<ChangeEvent>>>,
}

impl EventRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    /// A copy of all events recorded so far.
    pub fn events(&self) -> Vec<ChangeEvent> {
        self.events.borrow().clone()
    }

    /// Returns and clears the recorded events.
    pub fn take(&self) -> Vec<ChangeEvent> {
        std::mem::take(&mut *self.events.borrow_mut())
    }

    pub fn len(&self) -> usize {
        self.events.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.borrow().is_empty()
    }

    pub fn clear(&self) {
        self.events.borrow_mut().clear();
    }
}

impl Observer for EventRecorder {
    fn handle_change(&mut self, event: &ChangeEvent) {
        self.events.borrow_mut().push(event.clone());
    }
}

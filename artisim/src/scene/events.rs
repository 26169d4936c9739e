//! Listener lists for scene notifications

use super::ObjectId;
use std::fmt;

pub type ListenerId = u64;

/// Emitted once per completed step, after pass-2 cleanup and render sync
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StepEvent {
    /// Seconds advanced by the step
    pub timestep: f32,
    /// Number of completed steps, this one included
    pub step: u64,
}

/// Emitted when removal of an object is requested, before any teardown
#[derive(Debug, Clone, PartialEq)]
pub struct PreDestroyEvent {
    pub object: ObjectId,
    pub name: String,
}

/// Ordered list of listeners for one event type
pub struct EventEmitter<E> {
    listeners: Vec<(ListenerId, Box<dyn FnMut(&E)>)>,
    next_id: ListenerId,
}

impl<E> EventEmitter<E> {
    pub fn new() -> Self {
        Self {
            listeners: Vec::new(),
            next_id: 0,
        }
    }

    pub fn subscribe(&mut self, listener: impl FnMut(&E) + 'static) -> ListenerId {
        self.next_id += 1;
        self.listeners.push((self.next_id, Box::new(listener)));
        self.next_id
    }

    /// Returns whether the listener was registered
    pub fn unsubscribe(&mut self, id: ListenerId) -> bool {
        let before = self.listeners.len();
        self.listeners.retain(|(listener, _)| *listener != id);
        self.listeners.len() != before
    }

    /// Call every listener in subscription order
    pub fn emit(&mut self, event: &E) {
        for (_, listener) in &mut self.listeners {
            listener(event);
        }
    }

    pub fn len(&self) -> usize {
        self.listeners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.listeners.is_empty()
    }
}

impl<E> Default for EventEmitter<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E> fmt::Debug for EventEmitter<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventEmitter")
            .field("listeners", &self.listeners.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[test]
    fn test_emit_in_subscription_order() {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let mut emitter = EventEmitter::<u32>::new();

        let first = seen.clone();
        emitter.subscribe(move |e| first.borrow_mut().push(("first", *e)));
        let second = seen.clone();
        let id = emitter.subscribe(move |e| second.borrow_mut().push(("second", *e)));

        emitter.emit(&7);
        assert_eq!(*seen.borrow(), vec![("first", 7), ("second", 7)]);

        assert!(emitter.unsubscribe(id));
        assert!(!emitter.unsubscribe(id));
        emitter.emit(&8);
        assert_eq!(seen.borrow().len(), 3);
    }
}

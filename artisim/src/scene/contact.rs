//! Contact bookkeeping keyed by unordered shape pairs

use crate::engine::{ContactEvent, ContactKind, ShapeHandle};
use crate::error::{SimError, SimResult};
use std::collections::HashMap;

/// Unordered pair of shapes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ShapePair(ShapeHandle, ShapeHandle);

impl ShapePair {
    pub fn new(a: ShapeHandle, b: ShapeHandle) -> Self {
        if a <= b {
            Self(a, b)
        } else {
            Self(b, a)
        }
    }

    pub fn shapes(&self) -> (ShapeHandle, ShapeHandle) {
        (self.0, self.1)
    }
}

/// Latest state of an active contact
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ContactRecord {
    /// Shapes in the order of the most recent event
    pub shapes: (ShapeHandle, ShapeHandle),
    pub kind: ContactKind,
    /// Step during which the contact (re)started
    pub started: u64,
    /// Step of the most recent event
    pub updated: u64,
}

#[derive(Debug, Default)]
pub struct ContactMap {
    records: HashMap<ShapePair, ContactRecord>,
}

impl ContactMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply one engine event
    ///
    /// A start always (re)inserts. Persist or end without a record is a
    /// lifecycle inconsistency and changes nothing.
    pub fn apply(&mut self, event: ContactEvent, step: u64) -> SimResult<()> {
        let pair = ShapePair::new(event.shape_a, event.shape_b);
        let shapes = (event.shape_a, event.shape_b);

        match event.kind {
            ContactKind::Start => {
                self.records.insert(
                    pair,
                    ContactRecord {
                        shapes,
                        kind: ContactKind::Start,
                        started: step,
                        updated: step,
                    },
                );
                Ok(())
            }
            ContactKind::Persist => match self.records.get_mut(&pair) {
                Some(record) => {
                    record.shapes = shapes;
                    record.kind = ContactKind::Persist;
                    record.updated = step;
                    Ok(())
                }
                None => Err(SimError::LifecycleConsistency(format!(
                    "contact persist between {} and {} without a start",
                    event.shape_a, event.shape_b
                ))),
            },
            ContactKind::End => match self.records.remove(&pair) {
                Some(_) => Ok(()),
                None => Err(SimError::LifecycleConsistency(format!(
                    "contact end between {} and {} without a start",
                    event.shape_a, event.shape_b
                ))),
            },
        }
    }

    pub fn get(&self, a: ShapeHandle, b: ShapeHandle) -> Option<&ContactRecord> {
        self.records.get(&ShapePair::new(a, b))
    }

    pub fn iter(&self) -> impl Iterator<Item = &ContactRecord> {
        self.records.values()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const S1: ShapeHandle = ShapeHandle(1);
    const S2: ShapeHandle = ShapeHandle(2);

    fn event(kind: ContactKind, a: ShapeHandle, b: ShapeHandle) -> ContactEvent {
        ContactEvent::new(kind, a, b)
    }

    #[test]
    fn test_start_then_end_removes_record() {
        let mut contacts = ContactMap::new();
        contacts.apply(event(ContactKind::Start, S1, S2), 0).unwrap();
        assert_eq!(contacts.len(), 1);

        contacts.apply(event(ContactKind::End, S2, S1), 1).unwrap();
        assert!(contacts.is_empty());
    }

    #[test]
    fn test_persist_without_start_is_rejected() {
        let mut contacts = ContactMap::new();
        let err = contacts
            .apply(event(ContactKind::Persist, S1, S2), 0)
            .unwrap_err();
        assert!(!err.is_fatal());
        assert!(contacts.is_empty());

        assert!(contacts.apply(event(ContactKind::End, S1, S2), 0).is_err());
        assert!(contacts.is_empty());
    }

    #[test]
    fn test_restart_reinserts() {
        let mut contacts = ContactMap::new();
        contacts.apply(event(ContactKind::Start, S1, S2), 0).unwrap();
        contacts.apply(event(ContactKind::Persist, S1, S2), 1).unwrap();
        assert_eq!(contacts.get(S2, S1).map(|r| r.kind), Some(ContactKind::Persist));

        contacts.apply(event(ContactKind::Start, S2, S1), 2).unwrap();
        let record = contacts.get(S1, S2).unwrap();
        assert_eq!(record.kind, ContactKind::Start);
        assert_eq!(record.started, 2);
        assert_eq!(record.shapes, (S2, S1));
        assert_eq!(contacts.len(), 1);
    }
}

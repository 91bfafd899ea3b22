//! In-memory, change-notified entity store.
//!
//! Stands in for the replicated entity system the client normally reads.
//! Every attribute change bumps the record's revision and flags the
//! subscriptions whose filter overlaps the attributes before or after the
//! change.

use hudview_core::{AttributeSet, EntitySource, SubjectRecord, Subscription, TemporalSampleBuffer};
use hudview_env::{SubjectClass, SubjectId};
use std::collections::{BTreeMap, HashMap};
use tracing::warn;

use crate::error::SimError;

struct Watch {
    required: AttributeSet,
    dirty: bool,
    snapshot: Vec<SubjectRecord>,
}

/// Ordered store of subject records.
pub struct SimEntityStore {
    records: BTreeMap<SubjectId, SubjectRecord>,
    next_id: u64,
    watches: HashMap<u64, Watch>,
    next_watch: u64,
    history_capacity: usize,
}

impl SimEntityStore {
    /// Creates an empty store whose buffers hold `history_capacity` samples.
    pub fn new(history_capacity: usize) -> Self {
        Self {
            records: BTreeMap::new(),
            next_id: 0,
            watches: HashMap::new(),
            next_watch: 0,
            history_capacity,
        }
    }

    /// Adds a subject with no attributes.
    pub fn spawn(&mut self) -> SubjectId {
        self.next_id += 1;
        let id = SubjectId(self.next_id);
        let mut record = SubjectRecord::new(id);
        record.revision = 1;
        self.records.insert(id, record);
        id
    }

    pub fn set_name(&mut self, id: SubjectId, name: &str) -> Result<(), SimError> {
        self.modify(id, |record| record.name = Some(name.to_string()))
    }

    pub fn clear_name(&mut self, id: SubjectId) -> Result<(), SimError> {
        self.modify(id, |record| record.name = None)
    }

    pub fn set_class(&mut self, id: SubjectId, class: SubjectClass) -> Result<(), SimError> {
        self.modify(id, |record| record.class = Some(class))
    }

    /// Binds a fresh sample buffer and returns a handle for the producer.
    pub fn attach_history(&mut self, id: SubjectId) -> Result<TemporalSampleBuffer, SimError> {
        let buffer = TemporalSampleBuffer::new(self.history_capacity);
        let bound = buffer.clone();
        self.modify(id, move |record| record.buffer = Some(bound))?;
        Ok(buffer)
    }

    pub fn despawn(&mut self, id: SubjectId) -> Result<(), SimError> {
        let record = self
            .records
            .remove(&id)
            .ok_or(SimError::UnknownSubject(id))?;
        self.touch(record.attributes());
        Ok(())
    }

    pub fn buffer(&self, id: SubjectId) -> Option<TemporalSampleBuffer> {
        self.records.get(&id).and_then(|r| r.buffer.clone())
    }

    pub fn record(&self, id: SubjectId) -> Option<&SubjectRecord> {
        self.records.get(&id)
    }

    pub fn records(&self) -> impl Iterator<Item = &SubjectRecord> {
        self.records.values()
    }

    /// Subjects carrying every attribute in `required`.
    pub fn count_ready(&self, required: AttributeSet) -> usize {
        self.records
            .values()
            .filter(|r| r.attributes().contains_all(required))
            .count()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Subscriptions not yet released.
    pub fn active_subscriptions(&self) -> usize {
        self.watches.len()
    }

    fn modify<F>(&mut self, id: SubjectId, change: F) -> Result<(), SimError>
    where
        F: FnOnce(&mut SubjectRecord),
    {
        let record = self
            .records
            .get_mut(&id)
            .ok_or(SimError::UnknownSubject(id))?;
        let before = record.attributes();
        change(record);
        record.revision += 1;
        let after = record.attributes();
        self.touch(before.union(after));
        Ok(())
    }

    fn touch(&mut self, changed: AttributeSet) {
        for watch in self.watches.values_mut() {
            if watch.required.intersects(changed) {
                watch.dirty = true;
            }
        }
    }
}

impl EntitySource for SimEntityStore {
    fn subscribe(&mut self, required: AttributeSet) -> Subscription {
        self.next_watch += 1;
        self.watches.insert(
            self.next_watch,
            Watch {
                required,
                dirty: true,
                snapshot: Vec::new(),
            },
        );
        Subscription::new(self.next_watch, required)
    }

    fn apply_changes(&mut self, subscription: &Subscription) -> bool {
        let Some(watch) = self.watches.get_mut(&subscription.id()) else {
            warn!(id = subscription.id(), "apply_changes on unknown subscription");
            return false;
        };
        if !watch.dirty {
            return false;
        }
        watch.dirty = false;
        let required = watch.required;
        watch.snapshot = self
            .records
            .values()
            .filter(|r| r.attributes().intersects(required))
            .cloned()
            .collect();
        true
    }

    fn records(&self, subscription: &Subscription) -> &[SubjectRecord] {
        self.watches
            .get(&subscription.id())
            .map_or(&[][..], |w| w.snapshot.as_slice())
    }

    fn release(&mut self, subscription: Subscription) {
        if self.watches.remove(&subscription.id()).is_none() {
            warn!(id = subscription.id(), "released unknown subscription");
        }
    }
}

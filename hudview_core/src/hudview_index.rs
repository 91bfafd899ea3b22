//! The "INDEX" Engine - Live View Reconciliation
//!
//! Keeps exactly one locally owned view object per live subject of an
//! external source. Once per frame the current snapshot is diffed against
//! what the index already holds:
//!
//! ```text
//!   snapshot ids ─┬─ new & ready        → hooks.create   (added)
//!                 ├─ known, watch moved → hooks.update   (updated)
//!                 ├─ known, not ready   → hooks.destroy  (removed)
//!                 └─ missing            → hooks.destroy  (removed)
//! ```
//!
//! "Watch moved" means one of the subscription's required attributes holds a
//! different value than when the view was last built or updated. Changes to
//! other attributes of the same record never reach the hooks.
//!
//! Subjects that are present but lack a required attribute are deferred:
//! nothing is created until the attribute shows up.

use hudview_env::{SubjectClass, SubjectId};
use std::collections::{HashMap, HashSet};
use tracing::debug;

use crate::hudview_time::TemporalSampleBuffer;
use crate::source::{Attribute, AttributeSet, EntitySource, ReadySubject, SubjectRecord, Subscription};

/// Create/update/destroy callbacks for one kind of view object.
pub trait ViewHooks {
    type View;

    /// Builds the view for a subject that just became presentable.
    fn create(&mut self, subject: &ReadySubject<'_>) -> Self::View;

    /// Refreshes a view in place after a watched attribute changed.
    fn update(&mut self, view: &mut Self::View, subject: &ReadySubject<'_>);

    /// Releases everything the view holds.
    fn destroy(&mut self, view: Self::View);
}

/// Notifications dispatched by one reconciliation pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconcileStats {
    pub added: usize,
    pub updated: usize,
    pub removed: usize,

    /// Present but missing a required attribute
    pub deferred: usize,
}

impl ReconcileStats {
    /// Returns true if no hook ran.
    pub fn is_quiet(&self) -> bool {
        self.added == 0 && self.updated == 0 && self.removed == 0
    }
}

/// Values of the required attributes a view last saw.
struct Watched {
    name: Option<String>,
    buffer: Option<TemporalSampleBuffer>,
    class: Option<SubjectClass>,
}

impl Watched {
    fn of(record: &SubjectRecord, required: AttributeSet) -> Self {
        Self {
            name: record.name.clone().filter(|_| required.contains(Attribute::Name)),
            buffer: record
                .buffer
                .clone()
                .filter(|_| required.contains(Attribute::PositionHistory)),
            class: record.class.filter(|_| required.contains(Attribute::Classification)),
        }
    }

    fn matches(&self, record: &SubjectRecord, required: AttributeSet) -> bool {
        let name = !required.contains(Attribute::Name) || self.name == record.name;
        let class = !required.contains(Attribute::Classification) || self.class == record.class;
        let buffer = !required.contains(Attribute::PositionHistory)
            || match (&self.buffer, &record.buffer) {
                (Some(seen), Some(current)) => seen.same_history(current),
                (None, None) => true,
                _ => false,
            };
        name && class && buffer
    }
}

struct Entry<V> {
    view: V,
    watched: Watched,
}

/// Mapping `SubjectId → view` kept in step with an entity source.
///
/// The index is the only writer of the mapping; render steps borrow views
/// through `iter_mut`.
pub struct LiveViewIndex<V> {
    entries: HashMap<SubjectId, Entry<V>>,

    // Scratch, reused across passes
    seen: HashSet<SubjectId>,
    departed: Vec<SubjectId>,
}

impl<V> LiveViewIndex<V> {
    /// Creates an empty index.
    pub fn new() -> Self {
        Self {
            entries: HashMap::new(),
            seen: HashSet::new(),
            departed: Vec::new(),
        }
    }

    /// Diffs the source against the index and dispatches hooks for the delta.
    ///
    /// Does nothing unless the source reports a change for `subscription`.
    ///
    /// # Panics
    /// If the snapshot lists a subject twice.
    pub fn reconcile<S, H>(
        &mut self,
        source: &mut S,
        subscription: &Subscription,
        hooks: &mut H,
    ) -> ReconcileStats
    where
        S: EntitySource + ?Sized,
        H: ViewHooks<View = V>,
    {
        let mut stats = ReconcileStats::default();
        if !source.apply_changes(subscription) {
            return stats;
        }

        let required = subscription.required();
        self.seen.clear();

        for record in source.records(subscription) {
            if !self.seen.insert(record.id) {
                panic!("entity source listed {} twice in one snapshot", record.id);
            }

            let Some(subject) = record.ready(required) else {
                // No longer satisfies the filter: same as leaving the set
                if let Some(entry) = self.entries.remove(&record.id) {
                    hooks.destroy(entry.view);
                    stats.removed += 1;
                } else {
                    stats.deferred += 1;
                }
                continue;
            };

            match self.entries.get_mut(&record.id) {
                Some(entry) => {
                    if !entry.watched.matches(record, required) {
                        hooks.update(&mut entry.view, &subject);
                        entry.watched = Watched::of(record, required);
                        stats.updated += 1;
                    }
                }
                None => {
                    let view = hooks.create(&subject);
                    self.entries.insert(
                        record.id,
                        Entry {
                            view,
                            watched: Watched::of(record, required),
                        },
                    );
                    stats.added += 1;
                }
            }
        }

        let seen = &self.seen;
        self.departed
            .extend(self.entries.keys().filter(|id| !seen.contains(id)).copied());
        self.departed.sort_unstable();
        for id in self.departed.drain(..) {
            if let Some(entry) = self.entries.remove(&id) {
                hooks.destroy(entry.view);
                stats.removed += 1;
            }
        }

        if !stats.is_quiet() {
            debug!(
                added = stats.added,
                updated = stats.updated,
                removed = stats.removed,
                deferred = stats.deferred,
                live = self.entries.len(),
                "reconciled views"
            );
        }
        stats
    }

    /// Destroys every view. Returns how many were destroyed.
    pub fn teardown<H: ViewHooks<View = V>>(&mut self, hooks: &mut H) -> usize {
        let count = self.entries.len();
        for (_, entry) in self.entries.drain() {
            hooks.destroy(entry.view);
        }
        count
    }

    pub fn get(&self, id: SubjectId) -> Option<&V> {
        self.entries.get(&id).map(|e| &e.view)
    }

    pub fn get_mut(&mut self, id: SubjectId) -> Option<&mut V> {
        self.entries.get_mut(&id).map(|e| &mut e.view)
    }

    pub fn contains(&self, id: SubjectId) -> bool {
        self.entries.contains_key(&id)
    }

    pub fn iter(&self) -> impl Iterator<Item = (SubjectId, &V)> {
        self.entries.iter().map(|(id, e)| (*id, &e.view))
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (SubjectId, &mut V)> {
        self.entries.iter_mut().map(|(id, e)| (*id, &mut e.view))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<V> Default for LiveViewIndex<V> {
    fn default() -> Self {
        Self::new()
    }
}

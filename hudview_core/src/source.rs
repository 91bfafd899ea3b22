//! Contract of the external, change-notified entity source.
//!
//! The source owns the subjects and their sample buffers. The presentation
//! layer subscribes with the set of attributes it needs, polls once per
//! frame for changes and reads a snapshot of records. It never mutates the
//! source and must hand every subscription back through `release`.

use hudview_env::{SubjectClass, SubjectId};

use crate::hudview_time::TemporalSampleBuffer;

/// An attribute a subject may carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Attribute {
    /// Display name
    Name,

    /// Bound sample buffer
    PositionHistory,

    /// Model classification
    Classification,
}

impl Attribute {
    const fn bit(self) -> u8 {
        match self {
            Attribute::Name => 1 << 0,
            Attribute::PositionHistory => 1 << 1,
            Attribute::Classification => 1 << 2,
        }
    }
}

/// A set of attributes, used as a subscription filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct AttributeSet(u8);

impl AttributeSet {
    /// No attributes.
    pub const EMPTY: AttributeSet = AttributeSet(0);

    /// Adds an attribute.
    pub const fn with(self, attribute: Attribute) -> Self {
        Self(self.0 | attribute.bit())
    }

    /// Attributes in either set.
    pub const fn union(self, other: AttributeSet) -> Self {
        Self(self.0 | other.0)
    }

    /// Returns true if `attribute` is in the set.
    pub const fn contains(self, attribute: Attribute) -> bool {
        self.0 & attribute.bit() != 0
    }

    /// Returns true if the sets share an attribute.
    pub const fn intersects(self, other: AttributeSet) -> bool {
        self.0 & other.0 != 0
    }

    /// Returns true if every attribute of `other` is in the set.
    pub const fn contains_all(self, other: AttributeSet) -> bool {
        self.0 & other.0 == other.0
    }
}

impl FromIterator<Attribute> for AttributeSet {
    fn from_iter<I: IntoIterator<Item = Attribute>>(iter: I) -> Self {
        iter.into_iter().fold(AttributeSet::EMPTY, AttributeSet::with)
    }
}

/// One subject as currently known to the source.
///
/// `revision` changes whenever any attribute changes. Views do not key off
/// it, since it also moves for attributes outside their filter.
#[derive(Debug, Clone)]
pub struct SubjectRecord {
    pub id: SubjectId,
    pub revision: u64,
    pub name: Option<String>,
    pub buffer: Option<TemporalSampleBuffer>,
    pub class: Option<SubjectClass>,
}

impl SubjectRecord {
    /// Creates a record with no attributes.
    pub fn new(id: SubjectId) -> Self {
        Self {
            id,
            revision: 0,
            name: None,
            buffer: None,
            class: None,
        }
    }

    /// Attributes currently populated.
    pub fn attributes(&self) -> AttributeSet {
        let mut set = AttributeSet::EMPTY;
        if self.name.is_some() {
            set = set.with(Attribute::Name);
        }
        if self.buffer.is_some() {
            set = set.with(Attribute::PositionHistory);
        }
        if self.class.is_some() {
            set = set.with(Attribute::Classification);
        }
        set
    }

    /// Returns a checked view if every `required` attribute is populated.
    pub fn ready(&self, required: AttributeSet) -> Option<ReadySubject<'_>> {
        self.attributes()
            .contains_all(required)
            .then_some(ReadySubject {
                record: self,
                required,
            })
    }
}

/// A record whose required attributes are known to be present.
///
/// Accessors for attributes outside the checked set panic: asking for one
/// means a view hook and its subscription disagree.
#[derive(Debug, Clone, Copy)]
pub struct ReadySubject<'a> {
    record: &'a SubjectRecord,
    required: AttributeSet,
}

impl<'a> ReadySubject<'a> {
    pub fn id(&self) -> SubjectId {
        self.record.id
    }

    pub fn revision(&self) -> u64 {
        self.record.revision
    }

    pub fn name(&self) -> &'a str {
        self.check(Attribute::Name);
        self.record.name.as_deref().unwrap_or_default()
    }

    pub fn buffer(&self) -> &'a TemporalSampleBuffer {
        self.check(Attribute::PositionHistory);
        match &self.record.buffer {
            Some(buffer) => buffer,
            None => unreachable!("ready() verified the position history"),
        }
    }

    pub fn class(&self) -> SubjectClass {
        self.check(Attribute::Classification);
        match self.record.class {
            Some(class) => class,
            None => unreachable!("ready() verified the classification"),
        }
    }

    fn check(&self, attribute: Attribute) {
        assert!(
            self.required.contains(attribute),
            "{} read {:?} outside its subscription filter",
            self.record.id,
            attribute
        );
    }
}

/// A live watch on the source. Released by value, so it cannot be released
/// twice.
#[derive(Debug, PartialEq, Eq, Hash)]
pub struct Subscription {
    id: u64,
    required: AttributeSet,
}

impl Subscription {
    /// Issued by source implementations.
    pub fn new(id: u64, required: AttributeSet) -> Self {
        Self { id, required }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    /// The attributes a subject must carry to be presented.
    pub fn required(&self) -> AttributeSet {
        self.required
    }
}

/// Read-only, change-notified view of the simulation's subjects.
pub trait EntitySource {
    /// Starts watching subjects that carry any of `required`.
    ///
    /// The first `apply_changes` after subscribing reports a change if any
    /// matching subject exists.
    fn subscribe(&mut self, required: AttributeSet) -> Subscription;

    /// Latches pending changes for this subscription.
    ///
    /// Returns true if the set of subjects or any watched attribute changed
    /// since the previous call.
    fn apply_changes(&mut self, subscription: &Subscription) -> bool;

    /// The latched snapshot. A subject appears at most once.
    fn records(&self, subscription: &Subscription) -> &[SubjectRecord];

    /// Stops watching and frees the subscription.
    fn release(&mut self, subscription: Subscription);
}

//! Online player list.
//!
//! While open, the roster watches every named subject and keeps a sorted
//! list of entries. Closing it drops the list and the subscription.

use hudview_env::SubjectId;
use serde::Serialize;
use tracing::debug;

use crate::source::{Attribute, AttributeSet, EntitySource, Subscription};

const ROSTER_ATTRIBUTES: AttributeSet = AttributeSet::EMPTY.with(Attribute::Name);

/// One row of the player list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RosterEntry {
    pub id: SubjectId,
    pub name: String,
}

#[derive(Debug, Default)]
pub struct PlayerRoster {
    subscription: Option<Subscription>,
    entries: Vec<RosterEntry>,
}

impl PlayerRoster {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts watching names. No-op if already open.
    pub fn open<S: EntitySource + ?Sized>(&mut self, source: &mut S) {
        if self.subscription.is_none() {
            self.subscription = Some(source.subscribe(ROSTER_ATTRIBUTES));
            self.refresh(source);
        }
    }

    /// Releases the subscription. No-op if already closed.
    pub fn close<S: EntitySource + ?Sized>(&mut self, source: &mut S) {
        if let Some(subscription) = self.subscription.take() {
            source.release(subscription);
            self.entries.clear();
        }
    }

    /// Flips between open and closed. Returns true if now open.
    pub fn toggle<S: EntitySource + ?Sized>(&mut self, source: &mut S) -> bool {
        if self.is_open() {
            self.close(source);
        } else {
            self.open(source);
        }
        self.is_open()
    }

    /// Rebuilds the entries if the source changed. Returns true if rebuilt.
    pub fn refresh<S: EntitySource + ?Sized>(&mut self, source: &mut S) -> bool {
        let Some(subscription) = &self.subscription else {
            return false;
        };
        if !source.apply_changes(subscription) {
            return false;
        }

        self.entries.clear();
        self.entries.extend(
            source
                .records(subscription)
                .iter()
                .filter_map(|record| record.ready(ROSTER_ATTRIBUTES))
                .map(|subject| RosterEntry {
                    id: subject.id(),
                    name: subject.name().to_string(),
                }),
        );
        self.entries
            .sort_by(|a, b| a.name.cmp(&b.name).then(a.id.cmp(&b.id)));
        debug!(players = self.entries.len(), "roster refreshed");
        true
    }

    /// Sorted by name, then id. Empty while closed.
    pub fn entries(&self) -> &[RosterEntry] {
        &self.entries
    }

    pub fn is_open(&self) -> bool {
        self.subscription.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testkit::FakeSource;

    fn names(roster: &PlayerRoster) -> Vec<&str> {
        roster.entries().iter().map(|e| e.name.as_str()).collect()
    }

    #[test]
    fn test_open_lists_sorted_players() {
        let mut source = FakeSource::new();
        source.spawn_named("Zed");
        source.spawn_named("Ada");
        source.spawn_unnamed();

        let mut roster = PlayerRoster::new();
        roster.open(&mut source);
        assert!(roster.is_open());
        assert_eq!(names(&roster), vec!["Ada", "Zed"]);
    }

    #[test]
    fn test_duplicate_names_sort_by_id() {
        let mut source = FakeSource::new();
        let second = source.spawn_named("Twin");
        let first = source.spawn_named("Twin");

        let mut roster = PlayerRoster::new();
        roster.open(&mut source);
        let ids: Vec<_> = roster.entries().iter().map(|e| e.id).collect();
        assert_eq!(ids, vec![second.min(first), second.max(first)]);
    }

    #[test]
    fn test_refresh_only_on_change() {
        let mut source = FakeSource::new();
        let id = source.spawn_named("Ada");
        let mut roster = PlayerRoster::new();
        roster.open(&mut source);

        assert!(!roster.refresh(&mut source));
        source.rename(id, "Bea");
        assert!(roster.refresh(&mut source));
        assert_eq!(names(&roster), vec!["Bea"]);
    }

    #[test]
    fn test_toggle_releases_subscription() {
        let mut source = FakeSource::new();
        source.spawn_named("Ada");
        let mut roster = PlayerRoster::new();

        assert!(roster.toggle(&mut source));
        assert_eq!(source.live_subscriptions(), 1);
        assert!(!roster.toggle(&mut source));
        assert_eq!(source.live_subscriptions(), 0);
        assert!(roster.entries().is_empty());
        assert!(!roster.refresh(&mut source));

        // Closing twice is harmless
        roster.close(&mut source);
    }
}

//! Bookkeeping of detected and resolved conflict pairs.
//!
//! An entry only ever moves `detected -> resolved`. When a resolved pair
//! starts overlapping again a new `detected` entry is created.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::conflict;
use super::EventService;
use crate::models::{Conflict, ConflictFilter, Event, EventFilter};
use crate::utils::error::AppError;

/// New entries for every pair `(event, other)` that has no detected entry yet.
pub fn new_entries(
    event: &Event,
    conflicting: &[Event],
    detected: &[Conflict],
    now: DateTime<Utc>,
) -> Vec<Conflict> {
    let mut seen: HashSet<Uuid> = HashSet::new();
    conflicting
        .iter()
        .filter(|other| other.id != event.id)
        .filter(|other| seen.insert(other.id))
        .filter(|other| {
            !detected
                .iter()
                .any(|c| c.is_detected() && c.is_pair(event.id, other.id))
        })
        .map(|other| Conflict::detected(event, other, now))
        .collect()
}

/// Detected entries referencing `event_id` whose other member is no longer
/// in `still_conflicting`, already marked resolved.
pub fn resolutions(
    event_id: Uuid,
    still_conflicting: &[Event],
    detected: &[Conflict],
    now: DateTime<Utc>,
) -> Vec<Conflict> {
    let live: HashSet<Uuid> = still_conflicting.iter().map(|e| e.id).collect();
    detected
        .iter()
        .filter(|c| c.is_detected())
        .filter_map(|c| {
            let other = c.other(event_id)?;
            if live.contains(&other) {
                return None;
            }
            let mut resolved = c.clone();
            resolved.resolve(now);
            Some(resolved)
        })
        .collect()
}

impl EventService {
    /// Every stored event that collides with `event` right now.
    pub async fn find_conflicts(&self, event: &Event) -> Result<Vec<Event>, AppError> {
        let same_venue = self
            .store
            .list_events(&EventFilter::at_venue(event.venue.clone()))
            .await?;
        let found = conflict::find_conflicts(event, &same_venue);
        debug!(event_id = %event.id, venue = %event.venue, conflicts = found.len(), "Conflict scan");
        Ok(found)
    }

    /// Stores a detected entry for each new pair and returns the entries created.
    pub async fn record_conflicts(
        &self,
        event: &Event,
        conflicting: &[Event],
    ) -> Result<Vec<Conflict>, AppError> {
        if conflicting.is_empty() {
            return Ok(Vec::new());
        }
        let detected = self
            .store
            .list_conflicts(&ConflictFilter::detected_for(event.id))
            .await?;

        let mut recorded = Vec::new();
        for entry in new_entries(event, conflicting, &detected, self.now()) {
            match self.store.save_conflict(&entry).await {
                Ok(()) => {
                    warn!(
                        event1_id = %entry.event1_id,
                        event2_id = %entry.event2_id,
                        "Schedule conflict detected"
                    );
                    recorded.push(entry);
                }
                // Another request recorded the same pair first.
                Err(AppError::Duplicate(_)) => {}
                Err(e) => return Err(e),
            }
        }
        Ok(recorded)
    }

    /// Re-runs detection for `event`, records pairs that appeared and
    /// resolves pairs that disappeared. Returns the resolved entries.
    pub async fn reconcile(&self, event: &Event) -> Result<Vec<Conflict>, AppError> {
        let fresh = self.find_conflicts(event).await?;
        self.record_conflicts(event, &fresh).await?;

        let detected = self
            .store
            .list_conflicts(&ConflictFilter::detected_for(event.id))
            .await?;
        let resolved = resolutions(event.id, &fresh, &detected, self.now());
        for entry in &resolved {
            self.store.save_conflict(entry).await?;
            info!(
                event1_id = %entry.event1_id,
                event2_id = %entry.event2_id,
                "Schedule conflict resolved"
            );
        }
        Ok(resolved)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::event::tests::{at, new_event};
    use crate::models::ConflictStatus;

    fn event(start: u32, end: u32) -> Event {
        Event::from_new(new_event("Hall A", at(start), at(end)), Uuid::new_v4(), at(1)).unwrap()
    }

    #[test]
    fn test_no_duplicate_detected_pairs() {
        let a = event(10, 12);
        let b = event(11, 13);
        let existing = vec![Conflict::detected(&b, &a, at(1))];

        assert!(new_entries(&a, &[b.clone()], &existing, at(2)).is_empty());
        assert!(new_entries(&a, &[b.clone(), b.clone()], &[], at(2)).len() == 1);
    }

    #[test]
    fn test_resolved_pair_gets_a_fresh_entry() {
        let a = event(10, 12);
        let b = event(11, 13);
        let mut old = Conflict::detected(&a, &b, at(1));
        old.resolve(at(2));

        let fresh = new_entries(&a, &[b.clone()], &[old.clone()], at(3));
        assert_eq!(fresh.len(), 1);
        assert_ne!(fresh[0].id, old.id);
        assert_eq!(fresh[0].status, ConflictStatus::Detected);
    }

    #[test]
    fn test_only_vanished_pairs_resolve() {
        let a = event(10, 12);
        let b = event(11, 13);
        let c = event(9, 11);
        let ab = Conflict::detected(&a, &b, at(1));
        let ca = Conflict::detected(&c, &a, at(1));

        let resolved = resolutions(a.id, &[c.clone()], &[ab.clone(), ca.clone()], at(5));
        assert_eq!(resolved.len(), 1);
        assert_eq!(resolved[0].id, ab.id);
        assert_eq!(resolved[0].status, ConflictStatus::Resolved);
        assert_eq!(resolved[0].resolved_at, Some(at(5)));
    }

    #[test]
    fn test_resolutions_never_reopen() {
        let a = event(10, 12);
        let b = event(11, 13);
        let mut ab = Conflict::detected(&a, &b, at(1));
        ab.resolve(at(2));

        assert!(resolutions(a.id, &[b.clone()], &[ab.clone()], at(3)).is_empty());
        assert!(resolutions(a.id, &[], &[ab], at(3)).is_empty());
    }
}

//! Venue/time conflict detection.
//!
//! Windows are half-open: `[start, end)`. An event ending at 12:00 does not
//! collide with one starting at 12:00 in the same venue.

use chrono::{DateTime, Utc};

use crate::models::Event;

pub fn windows_overlap(
    (s1, e1): (DateTime<Utc>, DateTime<Utc>),
    (s2, e2): (DateTime<Utc>, DateTime<Utc>),
) -> bool {
    s1 < e2 && s2 < e1
}

/// True when `a` and `b` are distinct, both still compete for a venue, share
/// the exact same venue string and overlap in time.
pub fn collides(a: &Event, b: &Event) -> bool {
    a.id != b.id
        && a.status.competes_for_venue()
        && b.status.competes_for_venue()
        && a.venue == b.venue
        && windows_overlap((a.start_date, a.end_date), (b.start_date, b.end_date))
}

/// Every event in `events` that collides with `candidate`.
pub fn find_conflicts<'a, I>(candidate: &Event, events: I) -> Vec<Event>
where
    I: IntoIterator<Item = &'a Event>,
{
    events
        .into_iter()
        .filter(|other| collides(candidate, other))
        .cloned()
        .collect()
}

//! The optimistic projection.
//!
//! A pure overlay of pending actions onto a confirmed event list. Total and
//! side-effect free; the same inputs always produce the same output, and
//! the insertion comparator resolves ties deterministically, so the action
//! iteration order (the store's sorted-by-id order) only decides the order
//! of events with identical starts.

use std::collections::BTreeMap;

use calsync_core::CalendarEvent;

use crate::optimistic::OptimisticAction;

/// Overlay `actions` onto `confirmed`, producing the list to display.
pub fn apply(
    confirmed: &[CalendarEvent],
    actions: &BTreeMap<String, OptimisticAction>,
) -> Vec<CalendarEvent> {
    // Confirmed entries with a pending action get replaced or deleted by
    // that action, so they leave the working list first.
    let mut events: Vec<CalendarEvent> = confirmed
        .iter()
        .filter(|e| !actions.contains_key(&e.id))
        .cloned()
        .collect();

    for action in actions.values() {
        if let Some(proposed) = action.event() {
            insert_sorted(&mut events, proposed.clone());
        }
        // Delete needs no second pass: step one already excluded the id.
    }

    events
}

fn insert_sorted(events: &mut Vec<CalendarEvent>, event: CalendarEvent) {
    let start = event.start_utc();
    let at = events.partition_point(|e| e.start_utc() <= start);
    events.insert(at, event);
}

#[cfg(test)]
mod tests {
    use super::*;
    use calsync_core::{EventTime, ProviderId};
    use chrono::{TimeZone, Utc};

    fn event(id: &str, hour: u32) -> CalendarEvent {
        let start = Utc.with_ymd_and_hms(2024, 1, 1, hour, 0, 0).unwrap();
        CalendarEvent {
            id: id.to_string(),
            calendar_id: "cal1".to_string(),
            account_id: "work".to_string(),
            provider: ProviderId::Google,
            provider_account_id: "user@example.com".to_string(),
            title: id.to_string(),
            description: None,
            location: None,
            start: EventTime::utc(start),
            end: EventTime::utc(start + chrono::Duration::hours(1)),
            recurring_event_id: None,
            recurrence: None,
            read_only: false,
            organizer: None,
            attendees: Vec::new(),
            response_status: None,
            conference_url: None,
            updated: None,
        }
    }

    #[test]
    fn delete_excludes_the_event() {
        let confirmed = vec![event("a", 9), event("b", 10)];
        let mut actions = BTreeMap::new();
        actions.insert("a".to_string(), OptimisticAction::Delete);

        let projected = apply(&confirmed, &actions);
        let ids: Vec<&str> = projected.iter().map(|e| e.id.as_str()).collect();
        assert_eq!(ids, ["b"]);
    }

    #[test]
    fn update_replaces_exactly_one_and_repositions() {
        let confirmed = vec![event("a", 9), event("b", 10), event("c", 11)];
        let mut moved = event("b", 7);
        moved.title = "rescheduled".to_string();
        let mut actions = BTreeMap::new();
        actions.insert("b".to_string(), OptimisticAction::Update(moved.clone()));

        let projected = apply(&confirmed, &actions);
        let ids: Vec<&str> = projected.iter().map(|e| e.id.as_str()).collect();
        assert_eq!(ids, ["b", "a", "c"]);
        assert_eq!(projected[0], moved);
    }

    #[test]
    fn create_inserts_at_the_sorted_position() {
        let confirmed = vec![event("a", 8), event("c", 12)];
        let mut actions = BTreeMap::new();
        actions.insert(
            "local-1".to_string(),
            OptimisticAction::Create(event("local-1", 10)),
        );

        let projected = apply(&confirmed, &actions);
        let ids: Vec<&str> = projected.iter().map(|e| e.id.as_str()).collect();
        assert_eq!(ids, ["a", "local-1", "c"]);
    }

    #[test]
    fn same_inputs_give_the_same_output() {
        let confirmed = vec![event("a", 9), event("b", 9), event("c", 9)];
        let mut actions = BTreeMap::new();
        actions.insert("x".to_string(), OptimisticAction::Create(event("x", 9)));
        actions.insert("y".to_string(), OptimisticAction::Create(event("y", 9)));

        assert_eq!(apply(&confirmed, &actions), apply(&confirmed, &actions));
    }

    #[test]
    fn empty_actions_is_the_identity() {
        let confirmed = vec![event("a", 9), event("b", 10)];
        assert_eq!(apply(&confirmed, &BTreeMap::new()), confirmed);
    }
}

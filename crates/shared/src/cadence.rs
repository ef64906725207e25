use chrono::{DateTime, Utc};

use crate::models::Importance;

/// How far ahead the daily reminder run looks, in days.
pub const LOOKAHEAD_DAYS: i64 = 7;

/// Whole days between today's midnight and the event's midnight, both UTC.
/// Negative for events already past.
pub fn days_until(event_time: DateTime<Utc>, now: DateTime<Utc>) -> i64 {
    (event_time.date_naive() - now.date_naive()).num_days()
}

/// The importance-tiered cadence: whether today's run notifies about an event
/// `days_until_event` days out.
///
/// High reminds every day across the lookahead window, Medium on the day and
/// three days before, Low only on the day itself.
pub fn should_remind_today(importance: Importance, days_until_event: i64) -> bool {
    match importance {
        Importance::High => (0..=LOOKAHEAD_DAYS).contains(&days_until_event),
        Importance::Medium => days_until_event == 0 || days_until_event == 3,
        Importance::Low => days_until_event == 0,
    }
}

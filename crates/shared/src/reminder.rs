use std::collections::BTreeMap;

use chrono::{DateTime, Days, Utc};
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::cadence::{LOOKAHEAD_DAYS, days_until, should_remind_today};
use crate::models::{Event, Importance, ReminderStatus};
use crate::store::{EventStore, StoreError};
use crate::timezone::{format_event_clock, parse_time_zone_or_default};
use crate::transport::{Message, MessagingTransport};

/// Counters for one reminder run; the worker logs them and the manual
/// trigger renders them for the user.
#[derive(Debug, Default, Clone, Copy)]
pub struct ReminderRun {
    pub window_events: usize,
    pub due_events: usize,
    pub recipients_notified: usize,
    pub notify_failures: usize,
    pub marked_reminded: usize,
    pub mark_failures: usize,
}

/// One reminder pass: fetch the lookahead window, apply the cadence policy,
/// push one digest to every configured recipient, then mark same-day events
/// as reminded.
///
/// Marking happens strictly after notification so that a crash in between
/// produces at worst a duplicate same-day notification on the next run,
/// never a silently skipped reminder. Future-dated events stay unmarked on
/// purpose: High/Medium cadences re-send them on later days.
pub async fn run_once(
    store: &dyn EventStore,
    transport: &dyn MessagingTransport,
    recipients: &[String],
    display_time_zone: &str,
    now: DateTime<Utc>,
) -> Result<ReminderRun, StoreError> {
    let run_id = Uuid::new_v4();
    let today = now.date_naive();
    let window_start = today.and_hms_opt(0, 0, 0).unwrap_or_default().and_utc();
    let window_end = (today + Days::new(LOOKAHEAD_DAYS as u64))
        .and_hms_opt(23, 59, 59)
        .unwrap_or_default()
        .and_utc();

    let all_events = store.query_range(window_start, window_end).await?;

    let mut run = ReminderRun {
        window_events: all_events.len(),
        ..ReminderRun::default()
    };

    let due_events: Vec<&Event> = all_events
        .iter()
        .filter(|event| should_remind_today(event.importance, days_until(event.time, now)))
        .collect();
    run.due_events = due_events.len();

    if due_events.is_empty() {
        info!(run_id = %run_id, window_events = run.window_events, "no events due for reminding");
        return Ok(run);
    }

    if recipients.is_empty() {
        warn!(run_id = %run_id, "no reminder recipients configured; skipping dispatch");
    }

    let digest = format_reminder_digest(&due_events, display_time_zone);
    let messages = [Message::text(digest)];
    for recipient in recipients {
        match transport.push(recipient, &messages).await {
            Ok(()) => run.recipients_notified += 1,
            Err(err) => {
                run.notify_failures += 1;
                error!(run_id = %run_id, user_id = %recipient, "failed to push reminder: {err}");
            }
        }
    }

    for event in &due_events {
        if days_until(event.time, now) != 0 {
            continue;
        }
        match store
            .update_reminder_status(&event.id, ReminderStatus::Reminded)
            .await
        {
            Ok(()) => run.marked_reminded += 1,
            Err(err) => {
                run.mark_failures += 1;
                error!(
                    run_id = %run_id,
                    event_id = %event.id,
                    "failed to mark event reminded: {err}"
                );
            }
        }
    }

    info!(
        run_id = %run_id,
        window_events = run.window_events,
        due_events = run.due_events,
        recipients_notified = run.recipients_notified,
        notify_failures = run.notify_failures,
        marked_reminded = run.marked_reminded,
        mark_failures = run.mark_failures,
        "reminder run complete"
    );

    Ok(run)
}

/// One digest message covering the whole batch, grouped by calendar date in
/// the display timezone, ascending.
pub fn format_reminder_digest(events: &[&Event], display_time_zone: &str) -> String {
    let tz = parse_time_zone_or_default(display_time_zone);

    let mut by_date: BTreeMap<chrono::NaiveDate, Vec<&Event>> = BTreeMap::new();
    for event in events {
        by_date
            .entry(event.time.with_timezone(&tz).date_naive())
            .or_default()
            .push(event);
    }

    let mut message = String::from("📅 活動提醒：\n\n");
    for (date, events) in by_date {
        message.push_str(&format!("📆 {}:\n", date.format("%Y/%m/%d")));
        for event in events {
            message.push_str(&format!(
                "- {} ({})\n  [{}] {}\n",
                event.name,
                format_event_clock(event.time, display_time_zone),
                event.category.as_str(),
                importance_marker(event.importance),
            ));
            if !event.notes.is_empty() {
                message.push_str(&format!("  備註：{}\n", event.notes));
            }
            message.push('\n');
        }
    }

    message
}

/// The manual trigger runs the same algorithm and reports the outcome as a
/// human-readable string.
pub fn manual_outcome(outcome: &Result<ReminderRun, StoreError>) -> String {
    match outcome {
        Ok(run) if run.due_events == 0 => "今天沒有需要提醒的活動".to_string(),
        Ok(run) => format!(
            "已手動觸發活動提醒：共 {} 項活動，已通知 {} 位接收者",
            run.due_events, run.recipients_notified
        ),
        Err(_) => "提醒發送過程中出錯，請稍後再試".to_string(),
    }
}

fn importance_marker(importance: Importance) -> &'static str {
    match importance {
        Importance::High => "🔴 高重要性",
        Importance::Medium => "🟡 中重要性",
        Importance::Low => "🟢 低重要性",
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use async_trait::async_trait;
    use chrono::{DateTime, TimeZone, Utc};

    use super::{format_reminder_digest, manual_outcome, run_once};
    use crate::models::{Category, Event, Importance, NewEvent, ReminderStatus};
    use crate::store::{EventStore, StoreError};
    use crate::transport::{Message, MessagingTransport, TransportError};

    struct FakeStore {
        events: Vec<Event>,
        status_updates: Mutex<Vec<(String, ReminderStatus)>>,
    }

    #[async_trait]
    impl EventStore for FakeStore {
        async fn create_event(&self, _event: &NewEvent) -> Result<String, StoreError> {
            unreachable!("reminder runs never create events")
        }

        async fn query_range(
            &self,
            start: DateTime<Utc>,
            end: DateTime<Utc>,
        ) -> Result<Vec<Event>, StoreError> {
            let mut events: Vec<Event> = self
                .events
                .iter()
                .filter(|event| event.time >= start && event.time <= end)
                .cloned()
                .collect();
            events.sort_by_key(|event| event.time);
            Ok(events)
        }

        async fn update_reminder_status(
            &self,
            event_id: &str,
            status: ReminderStatus,
        ) -> Result<(), StoreError> {
            self.status_updates
                .lock()
                .expect("status updates lock")
                .push((event_id.to_string(), status));
            Ok(())
        }
    }

    #[derive(Default)]
    struct FakeTransport {
        pushes: Mutex<Vec<(String, String)>>,
    }

    #[async_trait]
    impl MessagingTransport for FakeTransport {
        async fn reply(
            &self,
            _reply_token: &str,
            _messages: &[Message],
        ) -> Result<(), TransportError> {
            unreachable!("reminder runs never reply")
        }

        async fn push(&self, user_id: &str, messages: &[Message]) -> Result<(), TransportError> {
            self.pushes
                .lock()
                .expect("pushes lock")
                .push((user_id.to_string(), messages[0].text.clone()));
            Ok(())
        }
    }

    fn event(id: &str, name: &str, importance: Importance, time: DateTime<Utc>) -> Event {
        Event {
            id: id.to_string(),
            name: name.to_string(),
            time,
            category: Category::Activity,
            importance,
            notes: String::new(),
            reminder_status: ReminderStatus::NotReminded,
        }
    }

    fn at(day: u32, hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, day, hour, 0, 0)
            .single()
            .expect("valid datetime")
    }

    #[tokio::test]
    async fn only_same_day_events_are_marked_reminded() {
        let store = FakeStore {
            events: vec![
                event("today-low", "今日", Importance::Low, at(1, 18)),
                event("in-three-days", "三天後", Importance::Medium, at(4, 10)),
                event("in-five-days", "五天後", Importance::High, at(6, 9)),
            ],
            status_updates: Mutex::new(Vec::new()),
        };
        let transport = FakeTransport::default();
        let recipients = vec!["admin".to_string()];

        let run = run_once(&store, &transport, &recipients, "UTC", at(1, 6))
            .await
            .expect("reminder run succeeds");

        assert_eq!(run.due_events, 3);
        assert_eq!(run.recipients_notified, 1);
        assert_eq!(run.marked_reminded, 1);

        let updates = store.status_updates.lock().expect("status updates lock");
        assert_eq!(updates.len(), 1);
        assert_eq!(updates[0].0, "today-low");
        assert_eq!(updates[0].1, ReminderStatus::Reminded);
    }

    #[tokio::test]
    async fn empty_batch_sends_nothing_and_changes_nothing() {
        let store = FakeStore {
            // Medium at day offset 2 is outside its cadence.
            events: vec![event("later", "之後", Importance::Medium, at(3, 10))],
            status_updates: Mutex::new(Vec::new()),
        };
        let transport = FakeTransport::default();
        let recipients = vec!["admin".to_string()];

        let run = run_once(&store, &transport, &recipients, "UTC", at(1, 6))
            .await
            .expect("reminder run succeeds");

        assert_eq!(run.due_events, 0);
        assert!(transport.pushes.lock().expect("pushes lock").is_empty());
        assert!(store.status_updates.lock().expect("status updates lock").is_empty());
    }

    #[tokio::test]
    async fn digest_is_pushed_to_every_recipient() {
        let store = FakeStore {
            events: vec![event("today", "開會", Importance::High, at(1, 14))],
            status_updates: Mutex::new(Vec::new()),
        };
        let transport = FakeTransport::default();
        let recipients = vec!["user-a".to_string(), "user-b".to_string()];

        let run = run_once(&store, &transport, &recipients, "UTC", at(1, 6))
            .await
            .expect("reminder run succeeds");

        assert_eq!(run.recipients_notified, 2);
        let pushes = transport.pushes.lock().expect("pushes lock");
        assert_eq!(pushes.len(), 2);
        assert!(pushes[0].1.contains("📅 活動提醒"));
        assert!(pushes[0].1.contains("開會"));
    }

    #[test]
    fn digest_groups_events_by_ascending_date() {
        let later = event("b", "尾牙", Importance::High, at(3, 18));
        let sooner = event("a", "晨會", Importance::High, at(2, 9));
        let events = vec![&later, &sooner];

        let digest = format_reminder_digest(&events, "UTC");
        let first = digest.find("2025/06/02").expect("sooner date present");
        let second = digest.find("2025/06/03").expect("later date present");
        assert!(first < second);
        assert!(digest.contains("🔴 高重要性"));
    }

    #[test]
    fn manual_outcome_distinguishes_empty_runs_and_failures() {
        let empty = Ok(super::ReminderRun::default());
        assert_eq!(manual_outcome(&empty), "今天沒有需要提醒的活動");

        let failed: Result<super::ReminderRun, StoreError> =
            Err(StoreError::Network("boom".to_string()));
        assert_eq!(manual_outcome(&failed), "提醒發送過程中出錯，請稍後再試");
    }
}

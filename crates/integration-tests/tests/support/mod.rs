#![allow(dead_code)]

use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use shared::dispatch::{Dispatcher, InboundEvent, InboundKind};
use shared::intent::PostbackParams;
use shared::models::{Event, NewEvent, ReminderStatus};
use shared::store::{EventStore, StoreError};
use shared::transport::{Message, MessagingTransport, TransportError};

pub const TEST_RECIPIENT: &str = "admin-user";

/// Event store double backed by a plain vector, with optional injected
/// create failures to exercise the retry path.
#[derive(Default)]
pub struct InMemoryEventStore {
    events: Mutex<Vec<Event>>,
    next_id: AtomicUsize,
    create_calls: AtomicUsize,
    failing_creates: AtomicUsize,
}

impl InMemoryEventStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn seed(&self, event: Event) {
        self.events.lock().expect("events lock").push(event);
    }

    /// The next `count` create calls fail with a server error.
    pub fn fail_next_creates(&self, count: usize) {
        self.failing_creates.store(count, Ordering::SeqCst);
    }

    pub fn create_calls(&self) -> usize {
        self.create_calls.load(Ordering::SeqCst)
    }

    pub fn events(&self) -> Vec<Event> {
        self.events.lock().expect("events lock").clone()
    }
}

#[async_trait]
impl EventStore for InMemoryEventStore {
    async fn create_event(&self, event: &NewEvent) -> Result<String, StoreError> {
        self.create_calls.fetch_add(1, Ordering::SeqCst);

        let failing = self.failing_creates.load(Ordering::SeqCst);
        if failing > 0 {
            self.failing_creates.store(failing - 1, Ordering::SeqCst);
            return Err(StoreError::Status {
                status: 503,
                message: "injected failure".to_string(),
            });
        }

        let id = format!("rec-{}", self.next_id.fetch_add(1, Ordering::SeqCst) + 1);
        self.events.lock().expect("events lock").push(Event {
            id: id.clone(),
            name: event.name.clone(),
            time: event.time,
            category: event.category,
            importance: event.importance,
            notes: event.notes.clone(),
            reminder_status: ReminderStatus::NotReminded,
        });
        Ok(id)
    }

    async fn query_range(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Event>, StoreError> {
        let mut events: Vec<Event> = self
            .events
            .lock()
            .expect("events lock")
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
        let mut events = self.events.lock().expect("events lock");
        match events.iter_mut().find(|event| event.id == event_id) {
            Some(event) => {
                event.reminder_status = status;
                Ok(())
            }
            None => Err(StoreError::Status {
                status: 404,
                message: format!("no record {event_id}"),
            }),
        }
    }
}

/// Captures every reply and push instead of calling the messaging API.
#[derive(Default)]
pub struct RecordingTransport {
    replies: Mutex<Vec<(String, Vec<Message>)>>,
    pushes: Mutex<Vec<(String, Vec<Message>)>>,
}

impl RecordingTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn replies(&self) -> Vec<(String, Vec<Message>)> {
        self.replies.lock().expect("replies lock").clone()
    }

    pub fn pushes(&self) -> Vec<(String, Vec<Message>)> {
        self.pushes.lock().expect("pushes lock").clone()
    }

    pub fn last_reply_text(&self) -> String {
        let replies = self.replies.lock().expect("replies lock");
        let (_, messages) = replies.last().expect("at least one reply recorded");
        messages
            .iter()
            .map(|message| message.text.as_str())
            .collect::<Vec<_>>()
            .join("\n")
    }
}

#[async_trait]
impl MessagingTransport for RecordingTransport {
    async fn reply(&self, reply_token: &str, messages: &[Message]) -> Result<(), TransportError> {
        self.replies
            .lock()
            .expect("replies lock")
            .push((reply_token.to_string(), messages.to_vec()));
        Ok(())
    }

    async fn push(&self, user_id: &str, messages: &[Message]) -> Result<(), TransportError> {
        self.pushes
            .lock()
            .expect("pushes lock")
            .push((user_id.to_string(), messages.to_vec()));
        Ok(())
    }
}

pub fn test_dispatcher(
    store: Arc<InMemoryEventStore>,
    transport: Arc<RecordingTransport>,
) -> Dispatcher {
    Dispatcher::new(
        3600,
        store,
        transport,
        vec![TEST_RECIPIENT.to_string()],
        "UTC".to_string(),
    )
}

pub fn utc(value: &str) -> DateTime<Utc> {
    NaiveDateTime::parse_from_str(value, "%Y/%m/%d %H:%M")
        .expect("valid test datetime")
        .and_utc()
}

pub async fn send_text(dispatcher: &Dispatcher, user_id: &str, text: &str, now: DateTime<Utc>) {
    dispatcher
        .handle_event(
            InboundEvent {
                user_id: user_id.to_string(),
                reply_token: format!("reply-{text}"),
                kind: InboundKind::Text {
                    text: text.to_string(),
                },
            },
            now,
        )
        .await;
}

pub async fn send_postback(
    dispatcher: &Dispatcher,
    user_id: &str,
    data: &str,
    params: PostbackParams,
    now: DateTime<Utc>,
) {
    dispatcher
        .handle_event(
            InboundEvent {
                user_id: user_id.to_string(),
                reply_token: format!("reply-{data}"),
                kind: InboundKind::Postback {
                    data: data.to_string(),
                    params,
                },
            },
            now,
        )
        .await;
}

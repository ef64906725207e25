use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Duration, NaiveDate, Utc};
use tokio::sync::Mutex;

use crate::flow::CreationFlow;

/// Per-user conversation state. Created lazily on first interaction and
/// cleared on commit, cancel, or TTL eviction.
#[derive(Debug, Default)]
pub struct Session {
    /// At most one creation flow is active per user; starting one replaces
    /// whatever flow was active before.
    pub creation: Option<CreationFlow>,
    /// Start date held between the two turns of a picked date-range query.
    pub pending_query_start: Option<NaiveDate>,
    pub last_activity: DateTime<Utc>,
}

/// Concurrency-safe session map. The outer lock only guards map membership;
/// each user's state sits behind its own lock so a read-modify-write turn is
/// atomic per user without blocking other users.
pub struct SessionStore {
    entries: Mutex<HashMap<String, Arc<Mutex<Session>>>>,
    ttl: Duration,
}

impl SessionStore {
    pub fn new(ttl_seconds: u64) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            ttl: Duration::seconds(ttl_seconds.min(i64::MAX as u64) as i64),
        }
    }

    /// Returns the user's session entry, creating an empty one on first
    /// access. Callers lock the returned entry for the whole turn.
    pub async fn entry(&self, user_id: &str) -> Arc<Mutex<Session>> {
        let mut entries = self.entries.lock().await;
        entries
            .entry(user_id.to_string())
            .or_insert_with(|| {
                Arc::new(Mutex::new(Session {
                    last_activity: Utc::now(),
                    ..Session::default()
                }))
            })
            .clone()
    }

    /// Drops sessions idle past the TTL. Entries whose lock is currently held
    /// are mid-turn and skipped; they get another full TTL.
    pub async fn evict_expired(&self, now: DateTime<Utc>) -> usize {
        let mut entries = self.entries.lock().await;
        let before = entries.len();

        entries.retain(|_, entry| match entry.try_lock() {
            Ok(session) => now - session.last_activity < self.ttl,
            Err(_) => true,
        });

        before - entries.len()
    }

    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.lock().await.is_empty()
    }
}

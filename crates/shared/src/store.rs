use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::models::{Event, NewEvent, ReminderStatus};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("records request failed: {0}")]
    Network(String),
    #[error("records api responded with status {status}: {message}")]
    Status { status: u16, message: String },
    #[error("invalid persisted data: {0}")]
    InvalidData(String),
}

/// The remote records table holding committed events. Reads issued
/// immediately after a write may not reflect it yet; callers never rely on
/// read-after-write.
#[async_trait]
pub trait EventStore: Send + Sync {
    /// Persists a new event and returns the id assigned by the service.
    async fn create_event(&self, event: &NewEvent) -> Result<String, StoreError>;

    /// Events whose time falls within `[start, end]`, sorted ascending by time.
    async fn query_range(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Event>, StoreError>;

    async fn update_reminder_status(
        &self,
        event_id: &str,
        status: ReminderStatus,
    ) -> Result<(), StoreError>;
}

/// HTTP client for the records service.
#[derive(Clone)]
pub struct RecordsClient {
    client: reqwest::Client,
    base_url: String,
    token: String,
    table_id: String,
}

#[derive(Serialize, Deserialize)]
struct RecordFields {
    name: String,
    time: DateTime<Utc>,
    category: String,
    importance: String,
    notes: String,
    reminder_status: String,
}

#[derive(Serialize)]
struct CreateRecordRequest {
    fields: RecordFields,
}

#[derive(Deserialize)]
struct CreateRecordResponse {
    id: Option<String>,
}

#[derive(Serialize)]
struct QueryRecordsRequest {
    filter: TimeRangeFilter,
    sort: &'static str,
}

#[derive(Serialize)]
struct TimeRangeFilter {
    time_on_or_after: DateTime<Utc>,
    time_on_or_before: DateTime<Utc>,
}

#[derive(Deserialize)]
struct QueryRecordsResponse {
    records: Vec<RecordEnvelope>,
}

#[derive(Deserialize)]
struct RecordEnvelope {
    id: String,
    fields: RecordFields,
}

#[derive(Serialize)]
struct UpdateStatusRequest {
    fields: StatusFields,
}

#[derive(Serialize)]
struct StatusFields {
    reminder_status: String,
}

impl RecordsClient {
    pub fn new(
        base_url: impl Into<String>,
        token: impl Into<String>,
        table_id: impl Into<String>,
    ) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
            token: token.into(),
            table_id: table_id.into(),
        }
    }

    fn records_url(&self) -> String {
        format!(
            "{}/v1/tables/{}/records",
            self.base_url.trim_end_matches('/'),
            self.table_id
        )
    }

    async fn read_failure(response: reqwest::Response) -> StoreError {
        let status = response.status().as_u16();
        let message = response.text().await.unwrap_or_default();
        StoreError::Status { status, message }
    }
}

#[async_trait]
impl EventStore for RecordsClient {
    async fn create_event(&self, event: &NewEvent) -> Result<String, StoreError> {
        let request = CreateRecordRequest {
            fields: RecordFields {
                name: event.name.clone(),
                time: event.time,
                category: event.category.as_str().to_string(),
                importance: event.importance.as_str().to_string(),
                notes: event.notes.clone(),
                reminder_status: ReminderStatus::NotReminded.as_str().to_string(),
            },
        };

        let response = self
            .client
            .post(self.records_url())
            .bearer_auth(&self.token)
            .json(&request)
            .send()
            .await
            .map_err(|err| StoreError::Network(err.to_string()))?;

        if !response.status().is_success() {
            return Err(Self::read_failure(response).await);
        }

        let body: CreateRecordResponse = response
            .json()
            .await
            .map_err(|err| StoreError::InvalidData(err.to_string()))?;
        body.id
            .ok_or_else(|| StoreError::InvalidData("create returned no record id".to_string()))
    }

    async fn query_range(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Event>, StoreError> {
        let request = QueryRecordsRequest {
            filter: TimeRangeFilter {
                time_on_or_after: start,
                time_on_or_before: end,
            },
            sort: "time_asc",
        };

        let response = self
            .client
            .post(format!("{}/query", self.records_url()))
            .bearer_auth(&self.token)
            .json(&request)
            .send()
            .await
            .map_err(|err| StoreError::Network(err.to_string()))?;

        if !response.status().is_success() {
            return Err(Self::read_failure(response).await);
        }

        let body: QueryRecordsResponse = response
            .json()
            .await
            .map_err(|err| StoreError::InvalidData(err.to_string()))?;
        body.records.into_iter().map(event_from_record).collect()
    }

    async fn update_reminder_status(
        &self,
        event_id: &str,
        status: ReminderStatus,
    ) -> Result<(), StoreError> {
        let request = UpdateStatusRequest {
            fields: StatusFields {
                reminder_status: status.as_str().to_string(),
            },
        };

        let response = self
            .client
            .patch(format!("{}/{event_id}", self.records_url()))
            .bearer_auth(&self.token)
            .json(&request)
            .send()
            .await
            .map_err(|err| StoreError::Network(err.to_string()))?;

        if !response.status().is_success() {
            return Err(Self::read_failure(response).await);
        }

        Ok(())
    }
}

fn event_from_record(record: RecordEnvelope) -> Result<Event, StoreError> {
    use crate::models::{Category, Importance};

    Ok(Event {
        id: record.id,
        name: record.fields.name,
        time: record.fields.time,
        category: Category::from_record(&record.fields.category)?,
        importance: Importance::from_record(&record.fields.importance)?,
        notes: record.fields.notes,
        reminder_status: ReminderStatus::from_record(&record.fields.reminder_status)?,
    })
}
